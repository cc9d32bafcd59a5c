//! Search-path file resolution
//!
//! Turns the file name written on a type 1 line into content plus
//! classification. Candidates are tried in a fixed order: the mounted
//! parts-library archives (official `p/`, `parts/`, `models/`, then the
//! unofficial archive), the configured search directories in their
//! configured order, and finally the caller's extra directories. Absolute
//! references bypass the search entirely.
//!
//! Names are case-insensitive with either slash direction, so lookups
//! normalize before touching the index or the filesystem. Case-sensitive
//! filesystems get a fallback dance: the name as written, lower-cased,
//! upper-cased, then a caller-supplied case-correction hook.

use crate::archive::{PartsArchive, ReadSeek};
use crate::config::SearchDirectory;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Hook fixing the case of a path that failed a case-sensitive lookup
pub type CaseCorrection = Arc<dyn Fn(&Path) -> Option<PathBuf> + Send + Sync>;

/// Archive handle type used by the resolver
pub type DynArchive = PartsArchive<Box<dyn ReadSeek>>;

/// Canonical form of an LDraw file name: trimmed, backslashes to forward
/// slashes, doubled slashes collapsed, lower-cased. Used as the registry
/// key and for all name comparisons.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .replace('\\', "/")
        .replace("//", "/")
        .to_ascii_lowercase()
}

/// Whether a normalized name refers to a sub-part (`s/` prefix)
pub fn is_sub_part_name(name: &str) -> bool {
    name.starts_with("s/") || name.starts_with("s\\")
}

/// Low-resolution substitute for a stud primitive name.
///
/// Only names starting with `stud` have one: the fourth character is
/// rewritten to `2`, mapping each solid stud onto its open-stud variant
/// (`stud.dat` to `stu2.dat`, `stud2.dat` to `stu22.dat`). Anything else
/// has no substitute and low-res lookup fails fast.
pub fn low_res_name(name: &str) -> Option<String> {
    if !name.get(..4)?.eq_ignore_ascii_case("stud") {
        return None;
    }
    let mut out = String::with_capacity(name.len());
    out.push_str(&name[..3]);
    out.push('2');
    out.push_str(&name[4..]);
    Some(out)
}

/// A successfully resolved file
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Full file content
    pub content: Vec<u8>,
    /// Filesystem path of the match; `None` for archive hits
    pub path: Option<PathBuf>,
    /// Matched a primitive location
    pub is_primitive: bool,
    /// Matched a part location
    pub is_part: bool,
    /// Name carries the sub-part prefix
    pub is_sub_part: bool,
    /// Came from official library content
    pub is_official: bool,
    /// Came from unofficial library content
    pub is_unofficial: bool,
}

impl ResolvedFile {
    fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            path: None,
            is_primitive: false,
            is_part: false,
            is_sub_part: false,
            is_official: false,
            is_unofficial: false,
        }
    }
}

/// Resolves referenced names against archives, search directories and
/// extra directories. Owned by one load session.
pub struct Resolver {
    search_dirs: Vec<SearchDirectory>,
    extra_dirs: Vec<PathBuf>,
    official: Option<DynArchive>,
    unofficial: Option<DynArchive>,
    case_correction: Option<CaseCorrection>,
    main_model_path: Option<PathBuf>,
    allow_unofficial: bool,
    known_unofficial: HashSet<String>,
}

/// Inner-archive prefixes probed for the official archive; `complete.zip`
/// nests everything under `ldraw/`
const OFFICIAL_PREFIXES: &[(&str, bool, bool)] = &[
    ("p/", true, false),
    ("parts/", false, true),
    ("models/", false, false),
    ("ldraw/p/", true, false),
    ("ldraw/parts/", false, true),
    ("ldraw/models/", false, false),
];

/// Inner-archive prefixes probed for the unofficial archive
/// (`ldrawunf.zip` has no wrapping directory)
const UNOFFICIAL_PREFIXES: &[(&str, bool, bool)] = &[("p/", true, false), ("parts/", false, true)];

impl Resolver {
    /// Build a resolver over a directory list
    pub fn new(
        search_dirs: Vec<SearchDirectory>,
        extra_dirs: Vec<PathBuf>,
        allow_unofficial: bool,
    ) -> Self {
        Self {
            search_dirs,
            extra_dirs,
            official: None,
            unofficial: None,
            case_correction: None,
            main_model_path: None,
            allow_unofficial,
            known_unofficial: HashSet::new(),
        }
    }

    /// Mount the official parts-library archive
    pub fn set_official_archive(&mut self, archive: DynArchive) {
        self.official = Some(archive);
    }

    /// Mount the unofficial parts-library archive
    pub fn set_unofficial_archive(&mut self, archive: DynArchive) {
        self.unofficial = Some(archive);
    }

    /// Install the case-correction hook
    pub fn set_case_correction(&mut self, hook: CaseCorrection) {
        self.case_correction = Some(hook);
    }

    /// Record the top-level model's own path for self-reference checks
    pub fn set_main_model_path(&mut self, path: Option<PathBuf>) {
        self.main_model_path = path;
    }

    /// Whether a name was previously classified unofficial by a skipped
    /// candidate
    pub fn was_classified_unofficial(&self, name: &str) -> bool {
        self.known_unofficial.contains(&normalize_name(name))
    }

    /// Resolve a referenced name to content and classification.
    ///
    /// `low_res` requests the open-stud substitute; non-stud names fail
    /// fast since no substitute exists for them.
    pub fn resolve(&mut self, name: &str, low_res: bool) -> Result<ResolvedFile> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Err(Error::missing_entry(name));
        }
        let lookup = if low_res {
            match low_res_name(&normalized) {
                Some(substitute) => substitute,
                None => {
                    log::trace!("no low-res substitute for '{}'", normalized);
                    return Err(Error::missing_entry(name));
                }
            }
        } else {
            normalized
        };

        if Path::new(&lookup).is_absolute() {
            return self.resolve_absolute(name, &lookup);
        }

        if let Some(mut resolved) = self.try_archives(&lookup) {
            resolved.is_sub_part = is_sub_part_name(&lookup);
            return Ok(resolved);
        }

        if let Some(mut resolved) = self.try_directories(&lookup)? {
            resolved.is_sub_part = is_sub_part_name(&lookup);
            return Ok(resolved);
        }

        log::debug!("'{}' not found on the search path", lookup);
        Err(Error::missing_entry(name))
    }

    /// Open an absolutely addressed file, skipping the search path
    fn resolve_absolute(&mut self, name: &str, lookup: &str) -> Result<ResolvedFile> {
        let original = PathBuf::from(normalize_slashes_only(name));
        let Some(path) = self.locate_file(&original) else {
            return Err(Error::missing_entry(name));
        };
        self.check_self_reference(&path, name)?;
        let content = std::fs::read(&path)?;
        let mut resolved = ResolvedFile::new(content);
        let (prim, part) = classify_by_convention(&path);
        resolved.is_primitive = prim;
        resolved.is_part = part;
        resolved.is_sub_part = is_sub_part_name(lookup);
        resolved.path = Some(path);
        Ok(resolved)
    }

    /// Probe the mounted archives in order: official sections first, then
    /// the unofficial archive (subject to the unofficial policy and the
    /// freshness negotiation)
    fn try_archives(&mut self, lookup: &str) -> Option<ResolvedFile> {
        if let Some(ref mut archive) = self.official {
            for (prefix, prim, part) in OFFICIAL_PREFIXES {
                let inner = format!("{}{}", prefix, lookup);
                if !archive.contains(&inner) {
                    continue;
                }
                if let Ok(content) = archive.load(&inner) {
                    let mut resolved = ResolvedFile::new(content);
                    resolved.is_primitive = *prim;
                    resolved.is_part = *part;
                    resolved.is_official = true;
                    return Some(resolved);
                }
            }
        }

        let unofficial_hit = match self.unofficial {
            Some(ref archive) => UNOFFICIAL_PREFIXES.iter().find_map(|(prefix, prim, part)| {
                let inner = format!("{}{}", prefix, lookup);
                archive
                    .contains(&inner)
                    .then(|| (inner, *prim, *part))
            }),
            None => None,
        };
        let Some((inner, prim, part)) = unofficial_hit else {
            return None;
        };

        if !self.allow_unofficial {
            self.known_unofficial.insert(lookup.to_string());
            return None;
        }

        // Freshness negotiation: a strictly newer local copy beats the
        // archive entry; ties favor the archive.
        let archive_ts = self
            .unofficial
            .as_ref()
            .map(|a| a.timestamp(&inner))
            .unwrap_or(0);
        if let Some(local) = self.fresher_local_copy(lookup, archive_ts) {
            log::debug!(
                "local copy of '{}' is newer than the archive entry",
                lookup
            );
            if let Ok(content) = std::fs::read(&local) {
                let mut resolved = ResolvedFile::new(content);
                resolved.is_primitive = prim;
                resolved.is_part = part;
                resolved.is_unofficial = true;
                resolved.path = Some(local);
                return Some(resolved);
            }
        }

        let archive = self.unofficial.as_mut()?;
        let content = archive.load(&inner).ok()?;
        let mut resolved = ResolvedFile::new(content);
        resolved.is_primitive = prim;
        resolved.is_part = part;
        resolved.is_unofficial = true;
        Some(resolved)
    }

    /// A local unofficial copy strictly newer than `archive_ts`, if any
    fn fresher_local_copy(&self, lookup: &str, archive_ts: i64) -> Option<PathBuf> {
        for dir in &self.search_dirs {
            if dir.skip || !dir.unofficial {
                continue;
            }
            let Some(path) = self.locate_in_dir(&dir.path, lookup) else {
                continue;
            };
            let mtime = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            if mtime > archive_ts {
                return Some(path);
            }
        }
        None
    }

    /// Walk the configured directories, then the extra directories.
    ///
    /// Extra-directory matches are the caller's own files, so they carry
    /// neither library flag.
    fn try_directories(&mut self, lookup: &str) -> Result<Option<ResolvedFile>> {
        let mut newly_unofficial: Vec<String> = Vec::new();
        let mut hit: Option<(PathBuf, bool, bool, bool, bool)> = None;

        for dir in &self.search_dirs {
            if dir.skip {
                continue;
            }
            if dir.unofficial && !self.allow_unofficial {
                if self.locate_in_dir(&dir.path, lookup).is_some() {
                    newly_unofficial.push(lookup.to_string());
                }
                continue;
            }
            if let Some(path) = self.locate_in_dir(&dir.path, lookup) {
                hit = Some((
                    path,
                    dir.default_primitive,
                    dir.default_part,
                    !dir.unofficial,
                    dir.unofficial,
                ));
                break;
            }
        }
        self.known_unofficial.extend(newly_unofficial);

        if hit.is_none() {
            for extra in &self.extra_dirs {
                if let Some(path) = self.locate_in_dir(extra, lookup) {
                    let (prim, part) = classify_by_convention(&path);
                    hit = Some((path, prim, part, false, false));
                    break;
                }
            }
        }

        let Some((path, prim, part, official, unofficial)) = hit else {
            return Ok(None);
        };
        self.check_self_reference(&path, lookup)?;
        let content = std::fs::read(&path)?;
        let mut resolved = ResolvedFile::new(content);
        resolved.is_primitive = prim;
        resolved.is_part = part;
        resolved.is_official = official;
        resolved.is_unofficial = unofficial;
        resolved.path = Some(path);
        Ok(Some(resolved))
    }

    /// Fail when a candidate is the top-level model itself
    fn check_self_reference(&self, candidate: &Path, name: &str) -> Result<()> {
        if let Some(ref main) = self.main_model_path {
            if same_path(candidate, main) {
                log::warn!("'{}' resolves to the model being loaded", name);
                return Err(Error::SelfReference(name.to_string()));
            }
        }
        Ok(())
    }

    /// Case-fallback lookup of `lookup` under `dir`
    fn locate_in_dir(&self, dir: &Path, lookup: &str) -> Option<PathBuf> {
        self.locate_file(&dir.join(lookup))
    }

    /// Try a path as given, lower-cased, upper-cased, then through the
    /// case-correction hook
    fn locate_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let lower = path.with_file_name(name.to_ascii_lowercase());
            if lower.is_file() {
                return Some(lower);
            }
            let upper = path.with_file_name(name.to_ascii_uppercase());
            if upper.is_file() {
                return Some(upper);
            }
        }
        if let Some(ref fix) = self.case_correction {
            if let Some(fixed) = fix(path) {
                if fixed.is_file() {
                    return Some(fixed);
                }
            }
        }
        None
    }
}

/// Lossy path equality: case-insensitive with slashes normalized
fn same_path(a: &Path, b: &Path) -> bool {
    let norm = |p: &Path| {
        p.to_string_lossy()
            .replace('\\', "/")
            .to_ascii_lowercase()
    };
    norm(a) == norm(b)
}

/// Slash normalization without lower-casing, for absolute references
/// whose on-disk case must be preserved for the first lookup
fn normalize_slashes_only(name: &str) -> String {
    name.trim().replace('\\', "/")
}

/// Infer primitive/part classification from path components, for matches
/// outside flagged search directories
fn classify_by_convention(path: &Path) -> (bool, bool) {
    let mut primitive = false;
    let mut part = false;
    for component in path.components() {
        let text = component.as_os_str().to_string_lossy();
        if text.eq_ignore_ascii_case("p") {
            primitive = true;
            part = false;
        } else if text.eq_ignore_ascii_case("parts") {
            part = true;
            primitive = false;
        }
    }
    (primitive, part)
}
