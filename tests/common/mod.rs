//! Shared fixtures for the integration tests
//!
//! Builds miniature parts libraries shaped like real LDraw installations:
//! `library_tree` lays the standard directories out on disk, and the
//! archive helpers pack the same content into `complete.zip` /
//! `ldrawunf.zip` style files. All fixture geometry uses integer
//! coordinates so extent assertions are exact in `f32`.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Solid stud primitive: two square caps, 12 wide, 4 tall
pub const STUD: &str = "\
0 Stud
0 Name: stud.dat
0 BFC CERTIFY CCW
4 16 6 0 6 6 0 -6 -6 0 -6 -6 0 6
4 16 6 -4 6 6 -4 -6 -6 -4 -6 -6 -4 6
";

/// Open stud, the low-resolution substitute for [`STUD`]
pub const STU2: &str = "\
0 Stud Open
0 Name: stu2.dat
0 BFC CERTIFY CCW
4 16 4 0 4 4 0 -4 -4 0 -4 -4 0 4
";

/// Circle outline, referenced by synthesized stud content
pub const EDGE_PRIMITIVE: &str = "\
0 Circle 1.0
0 Name: 4-4edge.dat
2 24 1 0 0 0 0 1
";

/// Cylinder shell, referenced by synthesized stud content
pub const CYLINDER_PRIMITIVE: &str = "\
0 Cylinder 1.0
0 Name: 4-4cyli.dat
0 BFC CERTIFY CCW
4 16 1 1 0 1 0 0 0 0 1 0 1 1
";

/// Disc cap, referenced by synthesized stud content
pub const DISC_PRIMITIVE: &str = "\
0 Disc 1.0
0 Name: 4-4disc.dat
0 BFC CERTIFY CCW
3 16 0 0 0 1 0 0 0 0 1
";

/// Part spanning x -40..40, y -28..0, z -20..20 once its studs and
/// sub-part resolve; the farthest actual point from the origin is the
/// body corner (40, -24, 20)
pub const BRICK: &str = "\
0 Brick 2 x 4
0 Name: 3001.dat
0 !LDRAW_ORG Part UPDATE 2004-03
0 BFC CERTIFY CCW
1 16 20 -24 0 1 0 0 0 1 0 0 0 1 stud.dat
1 16 -20 -24 0 1 0 0 0 1 0 0 0 1 stud.dat
1 16 0 0 0 1 0 0 0 1 0 0 0 1 s/3001s01.dat
4 16 40 0 20 40 0 -20 -40 0 -20 -40 0 20
4 16 40 -24 20 40 -24 -20 -40 -24 -20 -40 -24 20
";

/// Sub-part referenced by [`BRICK`]
pub const BRICK_STUD_GROUP: &str = "\
0 ~Brick 2 x 4 Stud Group
0 Name: s\\3001s01.dat
0 !LDRAW_ORG Subpart UPDATE 2004-03
0 BFC CERTIFY CCW
3 16 8 0 8 8 0 -8 -8 0 -8
";

/// Top-level model placing one [`BRICK`] at the origin
pub const CAR: &str = "\
0 Car
0 Name: car.ldr
0 BFC CERTIFY CCW
1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat
";

/// Unofficial part, only present under `unofficial/`
pub const FANCY: &str = "\
0 Fancy Widget
0 Name: fancy.dat
0 !LDRAW_ORG Unofficial_Part
0 BFC CERTIFY CCW
3 16 0 0 0 4 0 0 0 0 4
";

/// Official library files as (library-relative path, content) pairs
pub fn official_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("p/stud.dat", STUD),
        ("p/stu2.dat", STU2),
        ("p/4-4edge.dat", EDGE_PRIMITIVE),
        ("p/4-4cyli.dat", CYLINDER_PRIMITIVE),
        ("p/4-4disc.dat", DISC_PRIMITIVE),
        ("parts/3001.dat", BRICK),
        ("parts/s/3001s01.dat", BRICK_STUD_GROUP),
        ("models/car.ldr", CAR),
    ]
}

/// Build the standard on-disk library: `p/`, `parts/`, `parts/s/`,
/// `models/` and `unofficial/parts/`
pub fn library_tree() -> TempDir {
    let tree = tempfile::tempdir().unwrap();
    for (relative, content) in official_files() {
        write_file(&tree.path().join(relative), content);
    }
    write_file(&tree.path().join("unofficial/parts/fancy.dat"), FANCY);
    tree
}

/// Write `content` to `path`, creating parent directories
pub fn write_file(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    path.to_path_buf()
}

/// Write a zip archive of (inner path, content) entries to `path`
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    write_zip_dated(path, entries, None);
}

/// Like [`write_zip`], stamping every entry with January 1st of `year`
/// when one is given
pub fn write_zip_dated(path: &Path, entries: &[(&str, &str)], year: Option<u16>) {
    let mut options = SimpleFileOptions::default();
    if let Some(year) = year {
        let modified = zip::DateTime::from_date_and_time(year, 1, 1, 0, 0, 0).unwrap();
        options = options.last_modified_time(modified);
    }
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Pack the official fixture files into a `complete.zip` style archive
/// (everything nested under `ldraw/`) inside `dir`
pub fn official_archive(dir: &Path) -> PathBuf {
    let path = dir.join("complete.zip");
    let entries: Vec<(String, &str)> = official_files()
        .into_iter()
        .map(|(relative, content)| (format!("ldraw/{}", relative), content))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(name, content)| (name.as_str(), *content))
        .collect();
    write_zip(&path, &borrowed);
    path
}

/// Pack the unofficial fixture file into a `ldrawunf.zip` style archive
/// (no wrapping directory) inside `dir`
pub fn unofficial_archive(dir: &Path) -> PathBuf {
    let path = dir.join("ldrawunf.zip");
    write_zip(&path, &[("parts/fancy.dat", FANCY)]);
    path
}

/// A type 1 line placing `file` at the origin with the identity rotation
pub fn identity_ref(file: &str) -> String {
    format!("1 16 0 0 0 1 0 0 0 1 0 0 0 1 {}", file)
}
