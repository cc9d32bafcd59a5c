//! Parsed model records
//!
//! A [`Model`] is one parsed LDraw file: a part, sub-part, primitive,
//! top-level model, or a virtual file embedded in a multi-part document.
//! Models live in a load session's registry and are looked up by their
//! canonical (lower-cased, slash-normalized) name.
//!
//! Geometry aggregates are cached on the model itself. The core is
//! single-threaded, so plain `Cell`s hold the memoized values; the radius
//! caches remember the query center and are recomputed when it changes.

use crate::geometry::BoundingBox;
use crate::line::{BfcCertification, Line, TexmapSpec};
use nalgebra::Point3;
use std::cell::Cell;
use std::collections::HashMap;
use std::path::PathBuf;

/// Loaded models keyed by canonical name
pub type ModelRegistry = HashMap<String, Model>;

/// One texture-map scope recorded while parsing.
///
/// Lines inside the scope store an index into the owning model's scope
/// list. A scope whose image failed to load is invalid; its textured
/// geometry was invalidated at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTexmap {
    /// Projection and image names as written
    pub spec: TexmapSpec,
    /// Loaded image bytes; `None` when the image could not be resolved
    pub image: Option<Vec<u8>>,
    /// False when the image load failed
    pub valid: bool,
    /// Indices of the action lines the texture applies to
    pub textured_lines: Vec<usize>,
    /// Indices of the action lines forming the untextured fallback section
    pub fallback_lines: Vec<usize>,
}

impl ModelTexmap {
    /// Record a freshly opened scope; lines are attached as parsing
    /// reaches them
    pub fn new(spec: TexmapSpec) -> Self {
        Self {
            spec,
            image: None,
            valid: true,
            textured_lines: Vec::new(),
            fallback_lines: Vec::new(),
        }
    }
}

/// A cached center/radius pair; recomputed when the center moves
#[derive(Debug, Clone, Copy, PartialEq)]
struct RadiusCache {
    center: Point3<f32>,
    radius: f32,
}

/// One parsed LDraw file
#[derive(Debug, Clone)]
pub struct Model {
    /// Canonical name: lower-cased, slash-normalized registry key
    pub name: String,
    /// Name as written in the source (FILE marker, Name: header, or the
    /// referencing line)
    pub display_name: String,
    /// Resolved filesystem path, when the model came from disk
    pub path: Option<PathBuf>,
    /// Author from the `0 Author:` header
    pub author: Option<String>,
    /// First free-text comment line of the file
    pub description: Option<String>,
    /// All line records, in file order, including spliced replacements
    pub lines: Vec<Line>,
    /// Lines belonging to this model's own extent, kept in step with
    /// `lines` as replacements are spliced in; fixed once parsing ends
    pub active_lines: usize,
    /// Outcome of the BFC certification state machine
    pub certification: BfcCertification,
    /// Indices into `lines` of step boundaries, in order
    pub steps: Vec<usize>,
    /// Texture-map scopes opened in this model
    pub texmaps: Vec<ModelTexmap>,
    /// Decoded binary payload of a `!DATA` block
    pub payload: Option<Vec<u8>>,
    /// Classified as a part
    pub is_part: bool,
    /// Classified as a sub-part (`s/` prefix)
    pub is_sub_part: bool,
    /// Classified as a primitive
    pub is_primitive: bool,
    /// Promoted to a multi-part document by a FILE marker
    pub is_mpd: bool,
    /// Declared official library content
    pub is_official: bool,
    /// Found in (or declared as) unofficial library content
    pub is_unofficial: bool,
    /// References stud primitives, directly or through replacements
    pub has_studs: bool,
    /// Declared `!LPUB NOSHRINK`
    pub no_shrink: bool,

    bounding_box: Cell<Option<BoundingBox>>,
    radius_full: Cell<Option<RadiusCache>>,
    radius_watched: Cell<Option<RadiusCache>>,
}

impl Model {
    /// Create an empty model under its canonical name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            path: None,
            author: None,
            description: None,
            lines: Vec::new(),
            active_lines: 0,
            certification: BfcCertification::Unknown,
            steps: Vec::new(),
            texmaps: Vec::new(),
            payload: None,
            is_part: false,
            is_sub_part: false,
            is_primitive: false,
            is_mpd: false,
            is_official: false,
            is_unofficial: false,
            has_studs: false,
            no_shrink: false,
            bounding_box: Cell::new(None),
            radius_full: Cell::new(None),
            radius_watched: Cell::new(None),
        }
    }

    /// Whether the file is classified as a part or sub-part
    pub fn is_part_like(&self) -> bool {
        self.is_part || self.is_sub_part
    }

    /// Number of lines flagged valid
    pub fn valid_line_count(&self) -> usize {
        self.lines.iter().filter(|l| l.valid).count()
    }

    /// Cached bounding box, if one was computed
    pub(crate) fn cached_bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box.get()
    }

    /// Store the computed bounding box
    pub(crate) fn cache_bounding_box(&self, bbox: Option<BoundingBox>) {
        self.bounding_box.set(bbox);
    }

    /// Cached radius for `center`, honoring the bbox-ignore variant.
    ///
    /// Misses when nothing is cached or when the cached center differs.
    pub(crate) fn cached_radius(
        &self,
        center: Point3<f32>,
        watch_bbox_ignore: bool,
    ) -> Option<f32> {
        let cell = if watch_bbox_ignore {
            &self.radius_watched
        } else {
            &self.radius_full
        };
        cell.get()
            .filter(|cache| cache.center == center)
            .map(|cache| cache.radius)
    }

    /// Store a computed radius together with its query center
    pub(crate) fn cache_radius(&self, center: Point3<f32>, watch_bbox_ignore: bool, radius: f32) {
        let cell = if watch_bbox_ignore {
            &self.radius_watched
        } else {
            &self.radius_full
        };
        cell.set(Some(RadiusCache { center, radius }));
    }

    /// Drop all cached geometry aggregates
    pub fn invalidate_caches(&self) {
        self.bounding_box.set(None);
        self.radius_full.set(None);
        self.radius_watched.set(None);
    }
}
