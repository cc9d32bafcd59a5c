//! Search-directory configuration
//!
//! The set of directories searched for referenced files comes from an
//! ini-style configuration (the `[LDrawSearch]` section of an `ldraw.ini`
//! file), or from implicit defaults under the library root when no
//! configuration exists.
//!
//! Each entry is an ordered value `N=<flags><path>` where `<flags>` is a
//! possibly empty run of angle-bracketed markers:
//!
//! - `<DEFPRIM>`: files found here are classified as primitives
//! - `<DEFPART>`: files found here are classified as parts
//! - `<UNOFFIC>`: content here is unofficial
//! - `<SKIP>` / `<HIDE>`: entry is kept in the list but never searched
//!
//! A leading `<LDRAWDIR>` in the path substitutes the configured library
//! root. Flags a reader does not understand make the entry unusable, so
//! unknown markers degrade to skip.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// One ordered entry of the search-directory list.
///
/// Read-only once resolution begins; the resolver walks the list in order
/// and classifies matches by the entry's flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDirectory {
    /// Directory to search
    pub path: PathBuf,
    /// Files found here default to primitive classification
    pub default_primitive: bool,
    /// Files found here default to part classification
    pub default_part: bool,
    /// Content here is unofficial
    pub unofficial: bool,
    /// Entry is present but never searched
    pub skip: bool,
}

impl SearchDirectory {
    /// Plain directory entry with no classification flags
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_primitive: false,
            default_part: false,
            unofficial: false,
            skip: false,
        }
    }
}

/// The conventional layout under a library root, used when no
/// configuration file exists
pub fn default_search_directories(ldraw_dir: &Path) -> Vec<SearchDirectory> {
    let entry = |sub: &str, prim: bool, part: bool, unofficial: bool| SearchDirectory {
        path: ldraw_dir.join(sub),
        default_primitive: prim,
        default_part: part,
        unofficial,
        skip: false,
    };
    vec![
        entry("p", true, false, false),
        entry("parts", false, true, false),
        entry("models", false, false, false),
        entry("unofficial/p", true, false, true),
        entry("unofficial/parts", false, true, true),
    ]
}

/// Read and parse a configuration file
pub fn load_search_config(path: &Path, ldraw_dir: Option<&Path>) -> Result<Vec<SearchDirectory>> {
    let text = std::fs::read_to_string(path)?;
    parse_search_config(&text, ldraw_dir)
}

/// Parse the `[LDrawSearch]` section of an ini-style configuration.
///
/// Entries are returned sorted by their numeric key. Lines that are not
/// valid entries are logged and skipped so one stray line does not
/// invalidate the whole configuration; using `<LDRAWDIR>` without a
/// configured library root is an error because every affected path would
/// be wrong.
pub fn parse_search_config(
    text: &str,
    ldraw_dir: Option<&Path>,
) -> Result<Vec<SearchDirectory>> {
    let mut in_search_section = false;
    let mut keyed: Vec<(u32, SearchDirectory)> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_search_section = line.eq_ignore_ascii_case("[LDrawSearch]");
            continue;
        }
        if !in_search_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log::warn!("ignoring search config line without '=': {}", line);
            continue;
        };
        let Ok(order) = key.trim().parse::<u32>() else {
            log::warn!("ignoring search config entry with non-numeric key: {}", line);
            continue;
        };
        match parse_entry(value.trim(), ldraw_dir)? {
            Some(dir) => keyed.push((order, dir)),
            None => log::warn!("ignoring empty search config entry {}", order),
        }
    }

    keyed.sort_by_key(|(order, _)| *order);
    Ok(keyed.into_iter().map(|(_, dir)| dir).collect())
}

/// Parse one entry value: flag markers, then the path
fn parse_entry(value: &str, ldraw_dir: Option<&Path>) -> Result<Option<SearchDirectory>> {
    let mut rest = value;
    let mut dir = SearchDirectory::new("");

    loop {
        let Some(stripped) = rest.strip_prefix('<') else {
            break;
        };
        let Some(end) = stripped.find('>') else {
            break;
        };
        let marker = &stripped[..end];
        // <LDRAWDIR> starts the path, not the flag run
        if marker.eq_ignore_ascii_case("LDRAWDIR") {
            break;
        }
        if marker.eq_ignore_ascii_case("DEFPRIM") {
            dir.default_primitive = true;
        } else if marker.eq_ignore_ascii_case("DEFPART") {
            dir.default_part = true;
        } else if marker.eq_ignore_ascii_case("UNOFFIC") {
            dir.unofficial = true;
        } else if marker.eq_ignore_ascii_case("SKIP") || marker.eq_ignore_ascii_case("HIDE") {
            dir.skip = true;
        } else {
            log::warn!("unknown search config flag <{}>, skipping entry", marker);
            dir.skip = true;
        }
        rest = &stripped[end + 1..];
    }

    let mut path = rest.trim().replace('\\', "/");
    if path.is_empty() {
        return Ok(None);
    }
    let lowered = path.to_ascii_lowercase();
    if lowered.starts_with("<ldrawdir>") {
        let Some(base) = ldraw_dir else {
            return Err(Error::BadSearchConfig(
                "<LDRAWDIR> used but no library path configured".to_string(),
            ));
        };
        let tail = path.split_off("<LDRAWDIR>".len());
        let tail = tail.trim_start_matches('/');
        dir.path = base.join(tail);
    } else {
        dir.path = PathBuf::from(path);
    }
    Ok(Some(dir))
}
