//! Parts-library archive handling
//!
//! LDraw parts libraries ship as ZIP archives (`complete.zip`,
//! `ldrawunf.zip`) with 10,000+ entries. Looking a name up with a linear
//! scan per reference would dominate load time, so each archive gets a
//! [`ZipIndex`] built once: a map from lower-cased in-archive path to the
//! entry's position, size and modification timestamp.
//!
//! Indexes are cached process-wide, keyed by the lower-cased archive path,
//! so every load session opening the same library reuses the index while
//! still holding its own exclusive [`ZipArchive`] handle. [`deindex`]
//! evicts a cache entry when an archive is replaced on disk.
//!
//! Archive-format inconsistencies never abort a load: a bad entry simply
//! looks absent, and the resolver falls through to the filesystem.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use zip::ZipArchive;
use zip::extra_fields::ExtraField;

/// Readers an archive can be opened over: a buffered file on disk or an
/// in-memory cursor
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Metadata for one archive entry, recorded while indexing
#[derive(Debug, Clone, Copy)]
struct EntryInfo {
    /// Position of the entry in the archive's central directory
    index: usize,
    /// Uncompressed size in bytes
    size: u64,
    /// Modification time as unix seconds, 0 when the archive stores none
    timestamp: i64,
}

/// One-time index over an archive's entries.
///
/// Keys are the in-archive paths lower-cased; LDraw references are
/// case-insensitive while ZIP entries are not.
#[derive(Debug, Default)]
pub struct ZipIndex {
    entries: HashMap<String, EntryInfo>,
}

impl ZipIndex {
    /// Walk every entry once and record its lookup metadata.
    ///
    /// Entries that cannot be read are skipped rather than failing the
    /// whole index; they will resolve as absent.
    fn build<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Self {
        let mut entries = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!("skipping unreadable archive entry {}: {}", i, err);
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            let mut timestamp = 0i64;
            for field in entry.extra_data_fields() {
                if let ExtraField::ExtendedTimestamp(ext) = field {
                    if let Some(mod_time) = ext.mod_time() {
                        timestamp = i64::from(mod_time);
                    }
                }
            }
            if timestamp == 0 {
                if let Some(dos) = entry.last_modified() {
                    timestamp = dos_datetime_to_unix(&dos);
                }
            }
            entries.insert(
                entry.name().to_ascii_lowercase(),
                EntryInfo {
                    index: i,
                    size: entry.size(),
                    timestamp,
                },
            );
        }
        Self { entries }
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Convert a DOS-encoded archive date to unix seconds.
///
/// ZIP DOS dates have no time zone; they are treated as UTC, matching how
/// the parts-library archives are produced.
fn dos_datetime_to_unix(dt: &zip::DateTime) -> i64 {
    let year = i64::from(dt.year());
    let month = i64::from(dt.month());
    let day = i64::from(dt.day());
    // Days-from-civil, counting from 1970-01-01
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146097 + doe - 719468;
    days * 86_400
        + i64::from(dt.hour()) * 3_600
        + i64::from(dt.minute()) * 60
        + i64::from(dt.second())
}

/// Process-wide index cache, keyed by lower-cased archive path.
///
/// Indexes are immutable once built, so sharing them read-only across load
/// sessions is safe; each session still owns its own archive handle.
fn index_cache() -> &'static Mutex<HashMap<String, Arc<ZipIndex>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<ZipIndex>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cache_key(path: &Path) -> String {
    path.to_string_lossy().to_ascii_lowercase()
}

/// Evict the cached index for an archive path.
///
/// Call after replacing an archive on disk; the next open rebuilds the
/// index from the new file.
pub fn deindex(path: &Path) {
    if let Ok(mut cache) = index_cache().lock() {
        cache.remove(&cache_key(path));
    }
}

/// An opened, indexed parts-library archive.
///
/// The handle is exclusive to one load session; the index behind it may be
/// shared with other sessions that opened the same path.
pub struct PartsArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    index: Arc<ZipIndex>,
}

impl PartsArchive<Box<dyn ReadSeek>> {
    /// Open an archive from disk, reusing a cached index when one exists.
    ///
    /// The reader is boxed so disk-backed and in-memory archives share one
    /// handle type.
    pub fn open_path(path: &Path) -> Result<Self> {
        let key = cache_key(path);
        let file = File::open(path)?;
        let reader: Box<dyn ReadSeek> = Box::new(BufReader::new(file));
        let mut archive = ZipArchive::new(reader)?;
        let cached = index_cache().lock().ok().and_then(|c| c.get(&key).cloned());
        let index = match cached {
            Some(index) => index,
            None => {
                let index = Arc::new(ZipIndex::build(&mut archive));
                log::debug!("indexed {} entries from {}", index.len(), path.display());
                if let Ok(mut cache) = index_cache().lock() {
                    cache.insert(key, index.clone());
                }
                index
            }
        };
        Ok(Self { archive, index })
    }
}

impl<R: Read + Seek> PartsArchive<R> {
    /// Open an archive from any reader, building a fresh index.
    ///
    /// Used for in-memory archives; path-less archives are never cached.
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let index = Arc::new(ZipIndex::build(&mut archive));
        Ok(Self { archive, index })
    }

    /// Whether an entry exists for this lower-cased inner path
    pub fn contains(&self, inner_path: &str) -> bool {
        self.index
            .entries
            .contains_key(&inner_path.to_ascii_lowercase())
    }

    /// Modification time of an entry as unix seconds, 0 if absent.
    ///
    /// Prefers the extended-timestamp extra field (already captured at
    /// index time), falling back to the DOS-encoded date.
    pub fn timestamp(&self, inner_path: &str) -> i64 {
        self.index
            .entries
            .get(&inner_path.to_ascii_lowercase())
            .map(|info| info.timestamp)
            .unwrap_or(0)
    }

    /// Decompress an entry fully into memory.
    ///
    /// A stale index (archive replaced on disk without [`deindex`]) is
    /// detected by re-checking the entry name and reported as missing.
    pub fn load(&mut self, inner_path: &str) -> Result<Vec<u8>> {
        let key = inner_path.to_ascii_lowercase();
        let info = *self
            .index
            .entries
            .get(&key)
            .ok_or_else(|| Error::missing_entry(inner_path))?;
        let mut entry = self.archive.by_index(info.index)?;
        if !entry.name().eq_ignore_ascii_case(&key) {
            log::debug!("archive index stale for '{}', treating as absent", key);
            return Err(Error::missing_entry(inner_path));
        }
        let mut content = Vec::with_capacity(info.size as usize);
        entry.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the archive holds no indexed entries
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn build_archive(entries: &[(&str, &[u8])]) -> PartsArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        let cursor = zip.finish().unwrap();
        PartsArchive::new(cursor).unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut archive = build_archive(&[("PARTS/3001.DAT", b"0 Brick 2 x 4\n")]);
        assert!(archive.contains("parts/3001.dat"));
        assert!(archive.contains("Parts/3001.Dat"));
        let content = archive.load("parts/3001.dat").unwrap();
        assert_eq!(content, b"0 Brick 2 x 4\n");
    }

    #[test]
    fn test_missing_entry_reported_with_code() {
        let mut archive = build_archive(&[("p/stud.dat", b"0 Stud\n")]);
        let err = archive.load("p/nosuch.dat").unwrap_err();
        assert!(err.to_string().contains("[E1003]"));
        assert_eq!(archive.timestamp("p/nosuch.dat"), 0);
    }

    #[test]
    fn test_directories_are_not_indexed() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.add_directory("parts/", SimpleFileOptions::default())
            .unwrap();
        zip.start_file("parts/3001.dat", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"0 Brick 2 x 4\n").unwrap();
        let cursor = zip.finish().unwrap();
        let archive = PartsArchive::new(cursor).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_dos_timestamp_fallback() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let modified = zip::DateTime::from_date_and_time(2024, 1, 15, 10, 30, 0).unwrap();
        let options = SimpleFileOptions::default().last_modified_time(modified);
        zip.start_file("parts/3001.dat", options).unwrap();
        zip.write_all(b"0 Brick 2 x 4\n").unwrap();
        let cursor = zip.finish().unwrap();
        let archive = PartsArchive::new(cursor).unwrap();
        // 2024-01-15T10:30:00Z
        assert_eq!(archive.timestamp("parts/3001.dat"), 1_705_314_600);
    }

    #[test]
    fn test_dos_datetime_conversion_epoch_vicinity() {
        let dt = zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(dos_datetime_to_unix(&dt), 315_532_800);
        let dt = zip::DateTime::from_date_and_time(2000, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(dos_datetime_to_unix(&dt), 951_912_000);
    }

    #[test]
    fn test_deindex_unknown_path_is_harmless() {
        deindex(Path::new("/no/such/archive.zip"));
    }
}
