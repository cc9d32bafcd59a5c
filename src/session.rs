//! Load sessions: options, the model registry, and reference resolution
//!
//! A [`LoadSession`] drives a whole load. The top document is split on
//! its multi-part markers and every section is parsed and registered
//! first, so forward references inside the document are cheap; type 1
//! references are then chased depth-first through the resolver, each
//! loaded file registering under its canonical name before its own
//! references are followed. Names currently being resolved sit in an
//! in-flight set, and an edge that would lead back into that set (or
//! reach it through already-linked references) is refused instead of
//! recursed, so circular documents load without overflowing the stack.
//!
//! The registry doubles as a cache: loading two models that share parts
//! in one session parses each part once.

use crate::alert::{Alert, AlertChannel, AlertKind, AlertObserver, CancelHandle};
use crate::archive::PartsArchive;
use crate::config::{SearchDirectory, default_search_directories, load_search_config};
use crate::error::{Error, Result};
use crate::geometry::{self, BoundingBox};
use crate::line::LineKind;
use crate::model::{Model, ModelRegistry};
use crate::parser::{ReplacementProvider, parse_model, split_document};
use crate::resolve::{
    CaseCorrection, ResolvedFile, Resolver, is_sub_part_name, low_res_name, normalize_name,
};
use crate::search;
use crate::studs::{self, StudStyle};
use log::{debug, trace};
use nalgebra::Point3;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborator consulted when a referenced file cannot be found.
///
/// An interactive host can prompt the user for a replacement; a headless
/// one can map renamed parts from a table. Each name is offered at most
/// once per session and the flow as a whole is rate-limited, so a model
/// with hundreds of dead references does not stall loading.
pub trait SubstituteProvider: Send + Sync {
    /// Suggest an alternative reference for `name`, or `None` to give up
    fn substitute(&self, name: &str) -> Option<String>;
}

/// Prompt budget per session; once spent, a single warning is raised and
/// remaining missing files fail without consultation
const MAX_SUBSTITUTE_PROMPTS: usize = 16;

/// Everything configurable about a load, assembled builder-style.
///
/// ```
/// use libldraw::{LoadOptions, StudStyle};
///
/// let options = LoadOptions::new()
///     .with_ldraw_dir("/usr/share/ldraw")
///     .with_stud_style(StudStyle::HighContrast)
///     .with_low_res_studs(true);
/// ```
#[derive(Clone)]
pub struct LoadOptions {
    ldraw_dir: Option<PathBuf>,
    search_config: Option<PathBuf>,
    official_archive: Option<PathBuf>,
    unofficial_archive: Option<PathBuf>,
    extra_dirs: Vec<PathBuf>,
    allow_unofficial: bool,
    stud_style: StudStyle,
    low_res_studs: bool,
    boxes_only: bool,
    overlays: Vec<String>,
    scratch_dir: Option<PathBuf>,
    substitute_provider: Option<Arc<dyn SubstituteProvider>>,
    replacement_provider: Option<ReplacementProvider>,
    observer: Option<AlertObserver>,
    case_correction: Option<CaseCorrection>,
    cancel: CancelHandle,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            ldraw_dir: None,
            search_config: None,
            official_archive: None,
            unofficial_archive: None,
            extra_dirs: Vec::new(),
            allow_unofficial: true,
            stud_style: StudStyle::default(),
            low_res_studs: false,
            boxes_only: false,
            overlays: Vec::new(),
            scratch_dir: None,
            substitute_provider: None,
            replacement_provider: None,
            observer: None,
            case_correction: None,
            cancel: CancelHandle::new(),
        }
    }
}

impl LoadOptions {
    /// Options with nothing configured: no library, no archives, and
    /// unofficial parts allowed
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the LDraw library root; its conventional subdirectories
    /// become the search path unless a search configuration overrides it
    pub fn with_ldraw_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ldraw_dir = Some(dir.into());
        self
    }

    /// Use an ini-style search configuration file instead of the
    /// conventional directory layout
    pub fn with_search_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_config = Some(path.into());
        self
    }

    /// Mount the official parts-library archive (`complete.zip`)
    pub fn with_official_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.official_archive = Some(path.into());
        self
    }

    /// Mount the unofficial parts archive (`ldrawunf.zip`)
    pub fn with_unofficial_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.unofficial_archive = Some(path.into());
        self
    }

    /// Append a directory searched after the configured library locations
    pub fn with_extra_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_dirs.push(dir.into());
        self
    }

    /// Allow or refuse unofficial library content (allowed by default)
    pub fn with_unofficial_allowed(mut self, allow: bool) -> Self {
        self.allow_unofficial = allow;
        self
    }

    /// Select how stud primitives are rendered
    pub fn with_stud_style(mut self, style: StudStyle) -> Self {
        self.stud_style = style;
        self
    }

    /// Substitute low-resolution variants for stud primitives
    pub fn with_low_res_studs(mut self, low_res: bool) -> Self {
        self.low_res_studs = low_res;
        self
    }

    /// Aggregate bounding boxes from referenced parts' own boxes instead
    /// of their full geometry
    pub fn with_bounding_boxes_only(mut self, boxes_only: bool) -> Self {
        self.boxes_only = boxes_only;
        self
    }

    /// Inject a configuration line ahead of the main model's content;
    /// injected lines carry line number 0 and are excluded from geometry
    /// scans
    pub fn with_overlay_line(mut self, text: impl Into<String>) -> Self {
        self.overlays.push(text.into());
        self
    }

    /// Directory for generated scratch files (synthesized studs)
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Install the missing-file substitute hook
    pub fn with_substitute_provider(mut self, provider: Arc<dyn SubstituteProvider>) -> Self {
        self.substitute_provider = Some(provider);
        self
    }

    /// Install the malformed-line replacement hook
    pub fn with_replacement_provider(mut self, provider: ReplacementProvider) -> Self {
        self.replacement_provider = Some(provider);
        self
    }

    /// Observe alerts as they are emitted, in addition to collection
    pub fn with_alert_observer(mut self, observer: AlertObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Install a hook consulted when a file name's case does not match
    /// the filesystem
    pub fn with_case_correction(mut self, hook: CaseCorrection) -> Self {
        self.case_correction = Some(hook);
        self
    }

    /// Share a cancellation handle with the session
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("ldraw_dir", &self.ldraw_dir)
            .field("search_config", &self.search_config)
            .field("official_archive", &self.official_archive)
            .field("unofficial_archive", &self.unofficial_archive)
            .field("extra_dirs", &self.extra_dirs)
            .field("allow_unofficial", &self.allow_unofficial)
            .field("stud_style", &self.stud_style)
            .field("low_res_studs", &self.low_res_studs)
            .field("boxes_only", &self.boxes_only)
            .field("overlays", &self.overlays.len())
            .field("scratch_dir", &self.scratch_dir)
            .field("substitute_provider", &self.substitute_provider.is_some())
            .field("replacement_provider", &self.replacement_provider.is_some())
            .field("observer", &self.observer.is_some())
            .field("case_correction", &self.case_correction.is_some())
            .finish()
    }
}

/// Classification carried from the resolver (or synthesis) into a new
/// model before its headers are parsed
struct SourceInfo {
    path: Option<PathBuf>,
    primitive: bool,
    part: bool,
    sub_part: bool,
    official: bool,
    unofficial: bool,
}

impl SourceInfo {
    fn from_resolved(resolved: &ResolvedFile, known_unofficial: bool) -> Self {
        Self {
            path: resolved.path.clone(),
            primitive: resolved.is_primitive,
            part: resolved.is_part && !resolved.is_sub_part,
            sub_part: resolved.is_sub_part,
            official: resolved.is_official,
            unofficial: resolved.is_unofficial || known_unofficial,
        }
    }

    fn synthesized_primitive() -> Self {
        Self {
            path: None,
            primitive: true,
            part: false,
            sub_part: false,
            official: false,
            unofficial: false,
        }
    }
}

/// Outcome of resolving one referenced name
enum SubModel {
    /// Registered under this key
    Resolved(String),
    /// Nowhere to be found; the caller reports it against the line
    NotFound,
    /// Failed with a specific alert already emitted
    Reported,
}

/// One loading run and everything it accumulated.
///
/// ```no_run
/// use libldraw::{LoadOptions, LoadSession};
///
/// # fn main() -> libldraw::Result<()> {
/// let mut session = LoadSession::with_options(
///     LoadOptions::new().with_ldraw_dir("/usr/share/ldraw"),
/// )?;
/// let model = session.load("models/car.ldr")?;
/// println!("{} lines", model.lines.len());
/// # Ok(())
/// # }
/// ```
pub struct LoadSession {
    options: LoadOptions,
    resolver: Resolver,
    registry: ModelRegistry,
    channel: AlertChannel,
    in_flight: HashSet<String>,
    prompted: HashSet<String>,
    missing: HashSet<String>,
    substitute_prompts: usize,
    rate_limited: bool,
    main_key: Option<String>,
}

impl LoadSession {
    /// A session with default options: no library configured, so only
    /// multi-part-internal references resolve
    pub fn new() -> Self {
        Self::assemble(LoadOptions::default(), Vec::new())
    }

    /// Build a session from options.
    ///
    /// Fails when the search configuration file cannot be read or
    /// parsed. Archive problems do not fail construction; they degrade
    /// to [`AlertKind::Archive`] warnings and filesystem-only lookups.
    pub fn with_options(options: LoadOptions) -> Result<Self> {
        let search_dirs = Self::search_directories(&options)?;
        Ok(Self::assemble(options, search_dirs))
    }

    fn search_directories(options: &LoadOptions) -> Result<Vec<SearchDirectory>> {
        if let Some(ref config) = options.search_config {
            return load_search_config(config, options.ldraw_dir.as_deref());
        }
        Ok(options
            .ldraw_dir
            .as_deref()
            .map(default_search_directories)
            .unwrap_or_default())
    }

    fn assemble(options: LoadOptions, search_dirs: Vec<SearchDirectory>) -> Self {
        let mut channel = AlertChannel::with_observer(options.observer.clone(), options.cancel.clone());
        let mut resolver = Resolver::new(
            search_dirs,
            options.extra_dirs.clone(),
            options.allow_unofficial,
        );
        if let Some(ref path) = options.official_archive {
            match PartsArchive::open_path(path) {
                Ok(archive) => resolver.set_official_archive(archive),
                Err(error) => channel.emit(Alert::warning(
                    AlertKind::Archive,
                    format!("could not open parts archive {}: {}", path.display(), error),
                )),
            }
        }
        if let Some(ref path) = options.unofficial_archive {
            match PartsArchive::open_path(path) {
                Ok(archive) => resolver.set_unofficial_archive(archive),
                Err(error) => channel.emit(Alert::warning(
                    AlertKind::Archive,
                    format!("could not open parts archive {}: {}", path.display(), error),
                )),
            }
        }
        if let Some(hook) = options.case_correction.clone() {
            resolver.set_case_correction(hook);
        }
        Self {
            options,
            resolver,
            registry: ModelRegistry::new(),
            channel,
            in_flight: HashSet::new(),
            prompted: HashSet::new(),
            missing: HashSet::new(),
            substitute_prompts: 0,
            rate_limited: false,
            main_key: None,
        }
    }

    /// Load a model file from disk, following all references.
    ///
    /// Fails on unreadable input or cancellation; everything else is
    /// recovered per line and reported through [`Self::alerts`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&Model> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled.ldr".to_string());
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        self.resolver.set_main_model_path(Some(absolute.clone()));
        self.load_root(&name, &bytes, Some(absolute))
    }

    /// Load a model from memory under the given name
    pub fn load_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<&Model> {
        let name = if name.trim().is_empty() {
            "untitled.ldr"
        } else {
            name
        };
        self.resolver.set_main_model_path(None);
        self.load_root(name, bytes, None)
    }

    fn load_root(&mut self, name: &str, bytes: &[u8], path: Option<PathBuf>) -> Result<&Model> {
        let text = decode_text(bytes);
        let overlays = self.options.overlays.clone();
        let main_key = self.ingest_document(name, &text, path, None, &overlays, None)?;
        debug!(
            "loaded '{}': {} models registered, {} alerts",
            main_key,
            self.registry.len(),
            self.channel.alerts().len()
        );
        self.main_key = Some(main_key.clone());
        self.registry
            .get(&main_key)
            .ok_or_else(|| Error::missing_entry(&main_key))
    }

    /// Split, parse and register a document, then resolve the references
    /// of every section registered by this call. Returns the key of the
    /// document's first section (the `key_override` for loaded files).
    fn ingest_document(
        &mut self,
        default_name: &str,
        text: &str,
        path: Option<PathBuf>,
        info: Option<&SourceInfo>,
        overlays: &[String],
        key_override: Option<&str>,
    ) -> Result<String> {
        let (sections, saw_marker) = split_document(text, default_name);
        let mut seen: HashSet<String> = HashSet::new();
        let mut new_keys: Vec<String> = Vec::new();
        let mut doc_key = String::new();
        // Embedded sections travel with their document's library status
        let mut doc_official = (false, false);

        for (position, section) in sections.iter().enumerate() {
            let key = match (position, key_override) {
                (0, Some(key)) => key.to_string(),
                _ => normalize_name(&section.name),
            };
            if position == 0 {
                doc_key = key.clone();
            }
            if !seen.insert(key.clone()) {
                self.channel.emit(
                    Alert::warning(
                        AlertKind::Mpd,
                        format!(
                            "duplicate sub-file '{}'; keeping the first definition",
                            section.name
                        ),
                    )
                    .with_origin(default_name, section.start_line, ""),
                );
                continue;
            }
            if let Some(existing) = self.registry.get(&key) {
                trace!("'{}' already loaded; reusing", key);
                if position == 0 {
                    doc_official = (existing.is_official, existing.is_unofficial);
                }
                continue;
            }

            let mut model = Model::new(&key);
            model.display_name = section.name.clone();
            if position == 0 {
                model.path = path.clone();
                model.is_mpd = saw_marker;
                if let Some(info) = info {
                    model.is_primitive = info.primitive;
                    model.is_part = info.part;
                    model.is_sub_part = info.sub_part || is_sub_part_name(&key);
                    model.is_official = info.official;
                    model.is_unofficial = info.unofficial;
                }
                doc_official = (model.is_official, model.is_unofficial);
            } else {
                model.is_official = doc_official.0;
                model.is_unofficial = doc_official.1;
            }

            let section_overlays = if position == 0 { overlays } else { &[] };
            parse_model(
                &mut model,
                section,
                section_overlays,
                self.options.replacement_provider.as_ref(),
                &mut self.channel,
            )?;
            self.registry.insert(key.clone(), model);
            new_keys.push(key);
        }

        for key in &new_keys {
            self.resolve_texmaps(key)?;
        }
        for key in &new_keys {
            self.resolve_references(key)?;
        }
        Ok(doc_key)
    }

    /// Fill in the registry links for every unresolved type 1 line of a
    /// model, loading referenced files as needed. The model's key stays
    /// in the in-flight set for the duration, which is what catches
    /// reference cycles.
    fn resolve_references(&mut self, key: &str) -> Result<()> {
        let pending: Vec<(usize, String, usize, String)> = match self.registry.get(key) {
            Some(model) => model
                .lines
                .iter()
                .enumerate()
                .filter_map(|(index, line)| match &line.kind {
                    LineKind::PartRef(part) if line.valid && part.resolved.is_none() => {
                        Some((index, part.file.clone(), line.line_number, line.text.clone()))
                    }
                    _ => None,
                })
                .collect(),
            None => Vec::new(),
        };
        if pending.is_empty() {
            return Ok(());
        }
        let label = self
            .registry
            .get(key)
            .map(|model| model.display_name.clone())
            .unwrap_or_else(|| key.to_string());

        self.in_flight.insert(key.to_string());
        let mut failure = None;
        for (index, name, number, text) in pending {
            let outcome = match self.resolve_sub_model(&name, true) {
                Ok(outcome) => outcome,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            };
            let target = match outcome {
                SubModel::Resolved(target) => Some(target),
                SubModel::NotFound => {
                    self.channel.emit(
                        Alert::error(AlertKind::FindFile, format!("could not find '{}'", name))
                            .with_origin(&label, number, &text),
                    );
                    None
                }
                SubModel::Reported => None,
            };
            if let Some(model) = self.registry.get_mut(key) {
                if let Some(line) = model.lines.get_mut(index) {
                    match target {
                        Some(target) => {
                            if let LineKind::PartRef(part) = &mut line.kind {
                                part.resolved = Some(target);
                            }
                        }
                        None => line.valid = false,
                    }
                }
            }
        }
        self.in_flight.remove(key);
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Resolve one referenced name: registry first, then stud synthesis,
    /// then the search path, finally the substitute hook.
    fn resolve_sub_model(&mut self, name: &str, allow_prompt: bool) -> Result<SubModel> {
        if self.channel.is_canceled() {
            return Err(Error::LoadCanceled);
        }
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Ok(SubModel::NotFound);
        }
        if self.options.low_res_studs {
            match self.lookup_or_load(&normalized, name, true)? {
                SubModel::NotFound => {} // no low-res variant; use the full one
                hit => return Ok(hit),
            }
        }
        match self.lookup_or_load(&normalized, name, false)? {
            SubModel::NotFound => {}
            hit => return Ok(hit),
        }
        if allow_prompt {
            if let Some(substitute) = self.request_substitute(&normalized) {
                debug!("retrying '{}' as '{}'", normalized, substitute);
                return self.resolve_sub_model(&substitute, false);
            }
        }
        Ok(SubModel::NotFound)
    }

    fn lookup_or_load(&mut self, normalized: &str, display: &str, low_res: bool) -> Result<SubModel> {
        let key = if low_res {
            match low_res_name(normalized) {
                Some(key) => key,
                None => return Ok(SubModel::NotFound),
            }
        } else {
            normalized.to_string()
        };

        if self.in_flight.contains(&key)
            || (self.registry.contains_key(&key) && self.would_cycle(&key))
        {
            self.channel.emit(Alert::error(
                AlertKind::FindFile,
                format!("circular reference to '{}'", display),
            ));
            return Ok(SubModel::Reported);
        }
        if self.registry.contains_key(&key) {
            return Ok(SubModel::Resolved(key));
        }
        if self.missing.contains(&key) {
            return Ok(SubModel::NotFound);
        }

        if !low_res {
            if let Some(content) = studs::substitute(
                &key,
                self.options.stud_style,
                self.options.scratch_dir.as_deref(),
            ) {
                debug!("synthesized '{}' for {:?} studs", key, self.options.stud_style);
                self.ingest_document(
                    display,
                    &content,
                    None,
                    Some(&SourceInfo::synthesized_primitive()),
                    &[],
                    Some(&key),
                )?;
                return Ok(SubModel::Resolved(key));
            }
        }

        match self.resolver.resolve(normalized, low_res) {
            Ok(resolved) => {
                let info = SourceInfo::from_resolved(
                    &resolved,
                    self.resolver.was_classified_unofficial(normalized),
                );
                let text = decode_text(&resolved.content);
                self.ingest_document(display, &text, info.path.clone(), Some(&info), &[], Some(&key))?;
                Ok(SubModel::Resolved(key))
            }
            Err(Error::MissingEntry(_)) => {
                self.missing.insert(key);
                Ok(SubModel::NotFound)
            }
            Err(Error::SelfReference(_)) => {
                self.channel.emit(Alert::error(
                    AlertKind::FindFile,
                    format!("'{}' resolves to the model being loaded", display),
                ));
                Ok(SubModel::Reported)
            }
            Err(Error::LoadCanceled) => Err(Error::LoadCanceled),
            Err(other) => {
                self.channel.emit(
                    Alert::error(AlertKind::FindFile, format!("could not read '{}'", display))
                        .with_detail(other.to_string()),
                );
                Ok(SubModel::Reported)
            }
        }
    }

    /// Whether linking an edge to `target` would close a loop: true when
    /// `target` is being resolved right now, or reaches a name that is
    /// through already-resolved references.
    fn would_cycle(&self, target: &str) -> bool {
        let mut stack: Vec<&str> = vec![target];
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(name) = stack.pop() {
            if self.in_flight.contains(name) {
                return true;
            }
            if !visited.insert(name) {
                continue;
            }
            if let Some(model) = self.registry.get(name) {
                for line in &model.lines {
                    if let LineKind::PartRef(part) = &line.kind {
                        if let Some(resolved) = &part.resolved {
                            stack.push(resolved);
                        }
                    }
                }
            }
        }
        false
    }

    /// Load the texture images of a model's texmap scopes: embedded
    /// `!DATA` payloads first, then `textures/<name>`, then the name
    /// itself on the search path. A scope whose image cannot be found is
    /// invalidated along with its textured lines; fallback lines of a
    /// loaded scope are dropped instead, since the texture supersedes
    /// them.
    fn resolve_texmaps(&mut self, key: &str) -> Result<()> {
        if self.channel.is_canceled() {
            return Err(Error::LoadCanceled);
        }
        let wanted: Vec<(usize, String)> = match self.registry.get(key) {
            Some(model) => model
                .texmaps
                .iter()
                .enumerate()
                .filter(|(_, scope)| scope.valid && scope.image.is_none())
                .map(|(index, scope)| (index, scope.spec.texture.clone()))
                .collect(),
            None => Vec::new(),
        };
        for (index, texture) in wanted {
            let normalized = normalize_name(&texture);
            let mut image = self
                .registry
                .get(&normalized)
                .and_then(|model| model.payload.clone());
            if image.is_none() {
                image = self
                    .resolver
                    .resolve(&format!("textures/{}", normalized), false)
                    .ok()
                    .map(|resolved| resolved.content);
            }
            if image.is_none() {
                image = self
                    .resolver
                    .resolve(&normalized, false)
                    .ok()
                    .map(|resolved| resolved.content);
            }

            let mut failed = false;
            if let Some(model) = self.registry.get_mut(key) {
                let drop_lines = match image {
                    Some(bytes) => {
                        model.texmaps[index].image = Some(bytes);
                        model.texmaps[index].fallback_lines.clone()
                    }
                    None => {
                        failed = true;
                        model.texmaps[index].valid = false;
                        model.texmaps[index].textured_lines.clone()
                    }
                };
                for line_index in drop_lines {
                    if let Some(line) = model.lines.get_mut(line_index) {
                        line.valid = false;
                    }
                }
            }
            if failed {
                self.channel.emit(
                    Alert::error(
                        AlertKind::Texmap,
                        format!("could not load texture image '{}'", texture),
                    )
                    .with_detail(format!("referenced from '{}'", key)),
                );
            }
        }
        Ok(())
    }

    fn request_substitute(&mut self, normalized: &str) -> Option<String> {
        let provider = self.options.substitute_provider.clone()?;
        if !self.prompted.insert(normalized.to_string()) {
            return None;
        }
        if self.substitute_prompts >= MAX_SUBSTITUTE_PROMPTS {
            if !self.rate_limited {
                self.rate_limited = true;
                self.channel.emit(Alert::warning(
                    AlertKind::TooManyRequests,
                    format!(
                        "substitute lookups stopped after {} missing files",
                        MAX_SUBSTITUTE_PROMPTS
                    ),
                ));
            }
            return None;
        }
        self.substitute_prompts += 1;
        let substitute = provider.substitute(normalized)?;
        let substitute = substitute.trim();
        if substitute.is_empty() {
            None
        } else {
            Some(substitute.to_string())
        }
    }

    /// The options the session was built with
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// The model the last successful [`Self::load`] produced
    pub fn main_model(&self) -> Option<&Model> {
        self.registry.get(self.main_key.as_ref()?)
    }

    /// Look up any registered model by name
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.registry.get(&normalize_name(name))
    }

    /// Every model the session has loaded so far
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.registry.values()
    }

    /// The whole registry, for aggregate and search helpers
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Number of registered models
    pub fn model_count(&self) -> usize {
        self.registry.len()
    }

    /// Alerts accumulated across all loads in this session
    pub fn alerts(&self) -> &[Alert] {
        self.channel.alerts()
    }

    /// Whether any accumulated alert is an error
    pub fn has_errors(&self) -> bool {
        self.channel.has_errors()
    }

    /// Handle for requesting cancellation from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.channel.cancel_handle()
    }

    /// Bounding box of the main model, honoring the bounding-boxes-only
    /// option
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let model = self.main_model()?;
        geometry::bounding_box(model, &self.registry, self.options.boxes_only)
    }

    /// Largest distance from `center` to any point of the main model
    pub fn max_radius(&self, center: Point3<f32>, watch_bbox_ignore: bool) -> f32 {
        match self.main_model() {
            Some(model) => {
                geometry::max_radius(model, &self.registry, center, watch_bbox_ignore)
            }
            None => 0.0,
        }
    }

    /// Find the next line of the main model's tree containing `needle`;
    /// see [`search::search_forward`]
    pub fn search_forward(
        &self,
        needle: &str,
        after: Option<&[usize]>,
        wrap_to: Option<&[usize]>,
        mask: u32,
    ) -> Option<Vec<usize>> {
        let model = self.main_model()?;
        search::search_forward(model, &self.registry, needle, after, wrap_to, mask)
    }

    /// Find the previous matching line; see [`search::search_backward`]
    pub fn search_backward(
        &self,
        needle: &str,
        before: Option<&[usize]>,
        wrap_to: Option<&[usize]>,
        mask: u32,
    ) -> Option<Vec<usize>> {
        let model = self.main_model()?;
        search::search_backward(model, &self.registry, needle, before, wrap_to, mask)
    }
}

impl Default for LoadSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode file bytes as UTF-8 text, dropping a byte-order mark and
/// replacing invalid sequences
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
