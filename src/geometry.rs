//! Bounding-box and radius aggregation
//!
//! Both aggregates walk the reference tree depth-first, folding every
//! visible point under the transform accumulated along the path. Results
//! are memoized on the scanned model; the radius caches also remember the
//! query center and miss when it moves.
//!
//! Conditional-line geometry never contributes (control points are
//! rendering hints, not extent), and neither do synthetic injected lines
//! (line number 0) or lines flagged invalid. The bounding box always
//! honors `BBOX_IGNORE` regions; the radius computes both an ignoring and
//! a non-ignoring variant.

use crate::line::LineKind;
use crate::model::{Model, ModelRegistry};
use nalgebra::{Matrix4, Point3, Vector3};

/// An axis-aligned box given by its minimum and maximum corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Smallest coordinates on each axis
    pub min: Point3<f32>,
    /// Largest coordinates on each axis
    pub max: Point3<f32>,
}

impl BoundingBox {
    /// A degenerate box containing a single point
    pub fn from_point(point: Point3<f32>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Grow the box to contain `point`
    pub fn include(&mut self, point: Point3<f32>) {
        for i in 0..3 {
            if point[i] < self.min[i] {
                self.min[i] = point[i];
            }
            if point[i] > self.max[i] {
                self.max[i] = point[i];
            }
        }
    }

    /// The eight corner points
    pub fn corners(&self) -> [Point3<f32>; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Midpoint of the box
    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Edge lengths on each axis
    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }
}

/// Compute the bounding box of `model` and everything it references.
///
/// With `boxes_only` set, referenced parts contribute the eight corners of
/// their own (memoized) box instead of their full geometry. That keeps
/// large assemblies cheap at the cost of a slightly loose fit under
/// rotation. Returns `None` when no visible geometry exists.
pub fn bounding_box(
    model: &Model,
    registry: &ModelRegistry,
    boxes_only: bool,
) -> Option<BoundingBox> {
    if let Some(cached) = model.cached_bounding_box() {
        return Some(cached);
    }
    let mut acc = None;
    scan_box(model, registry, &Matrix4::identity(), boxes_only, &mut acc);
    if acc.is_some() {
        model.cache_bounding_box(acc);
    }
    acc
}

/// Compute the largest distance from `center` to any visible point.
///
/// With `watch_bbox_ignore` set, lines inside `BBOX_IGNORE` regions are
/// skipped, matching the bounding-box extent; without it every visible
/// point counts. Returns `0.0` when no geometry exists.
pub fn max_radius(
    model: &Model,
    registry: &ModelRegistry,
    center: Point3<f32>,
    watch_bbox_ignore: bool,
) -> f32 {
    if let Some(cached) = model.cached_radius(center, watch_bbox_ignore) {
        return cached;
    }
    let mut max_sq = 0.0f32;
    scan_radius(
        model,
        registry,
        &Matrix4::identity(),
        center,
        watch_bbox_ignore,
        &mut max_sq,
    );
    // One square root at the end instead of one per point
    let radius = max_sq.sqrt();
    model.cache_radius(center, watch_bbox_ignore, radius);
    radius
}

/// Whether a line takes part in extent scans at all
fn scannable(line: &crate::line::Line) -> bool {
    line.valid && line.line_number != 0
}

fn fold_point(acc: &mut Option<BoundingBox>, point: Point3<f32>) {
    match acc {
        Some(bbox) => bbox.include(point),
        None => *acc = Some(BoundingBox::from_point(point)),
    }
}

fn scan_box(
    model: &Model,
    registry: &ModelRegistry,
    transform: &Matrix4<f32>,
    boxes_only: bool,
    acc: &mut Option<BoundingBox>,
) {
    for line in model.lines.iter().take(model.active_lines) {
        if !scannable(line) || line.bbox_ignore {
            continue;
        }
        match &line.kind {
            LineKind::PartRef(part) => {
                let Some(child) = part.resolved.as_ref().and_then(|key| registry.get(key))
                else {
                    continue;
                };
                let composed = transform * part.transform;
                if boxes_only && child.is_part_like() {
                    if let Some(child_box) = bounding_box(child, registry, boxes_only) {
                        for corner in child_box.corners() {
                            fold_point(acc, composed.transform_point(&corner));
                        }
                    }
                } else {
                    scan_box(child, registry, &composed, boxes_only, acc);
                }
            }
            LineKind::SegLine(seg) => {
                for point in &seg.points {
                    fold_point(acc, transform.transform_point(point));
                }
            }
            LineKind::Triangle(tri) => {
                for point in &tri.points {
                    fold_point(acc, transform.transform_point(point));
                }
            }
            LineKind::Quad(quad) => {
                for point in &quad.points {
                    fold_point(acc, transform.transform_point(point));
                }
            }
            _ => {}
        }
    }
}

fn fold_radius(
    max_sq: &mut f32,
    transform: &Matrix4<f32>,
    center: Point3<f32>,
    point: &Point3<f32>,
) {
    let distance_sq = (transform.transform_point(point) - center).norm_squared();
    if distance_sq > *max_sq {
        *max_sq = distance_sq;
    }
}

fn scan_radius(
    model: &Model,
    registry: &ModelRegistry,
    transform: &Matrix4<f32>,
    center: Point3<f32>,
    watch_bbox_ignore: bool,
    max_sq: &mut f32,
) {
    for line in model.lines.iter().take(model.active_lines) {
        if !scannable(line) || (watch_bbox_ignore && line.bbox_ignore) {
            continue;
        }
        match &line.kind {
            LineKind::PartRef(part) => {
                let Some(child) = part.resolved.as_ref().and_then(|key| registry.get(key))
                else {
                    continue;
                };
                let composed = transform * part.transform;
                scan_radius(child, registry, &composed, center, watch_bbox_ignore, max_sq);
            }
            LineKind::SegLine(seg) => seg
                .points
                .iter()
                .for_each(|point| fold_radius(max_sq, transform, center, point)),
            LineKind::Triangle(tri) => tri
                .points
                .iter()
                .for_each(|point| fold_radius(max_sq, transform, center, point)),
            LineKind::Quad(quad) => quad
                .points
                .iter()
                .for_each(|point| fold_radius(max_sq, transform, center, point)),
            _ => {}
        }
    }
}
