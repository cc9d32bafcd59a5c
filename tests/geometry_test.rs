//! Extent aggregation over fully loaded models
//!
//! The per-module math is covered next to the implementation; these tests
//! run whole documents through a load session and check that transforms,
//! ignore regions and invalid lines combine correctly end to end.

mod common;

use libldraw::{LoadOptions, LoadSession};
use nalgebra::Point3;

fn session_from(text: &str) -> LoadSession {
    let mut session = LoadSession::new();
    session.load_bytes("main.ldr", text.as_bytes()).unwrap();
    session
}

#[test]
fn test_rotated_references_move_the_box() {
    // 90 degree rotation about Y: x maps to -z
    let session = session_from(
        "\
0 FILE main.ldr
1 16 100 -50 0 0 0 1 0 1 0 -1 0 0 wing.ldr
0 FILE wing.ldr
3 16 0 0 0 8 0 0 0 4 0
",
    );
    assert!(!session.has_errors());
    let bbox = session.bounding_box().unwrap();
    assert_eq!(bbox.min, Point3::new(100.0, -50.0, -8.0));
    assert_eq!(bbox.max, Point3::new(100.0, -46.0, 0.0));
}

#[test]
fn test_nested_translations_accumulate() {
    let session = session_from(
        "\
0 FILE main.ldr
1 16 10 0 0 1 0 0 0 1 0 0 0 1 mid.ldr
0 FILE mid.ldr
1 16 0 5 0 1 0 0 0 1 0 0 0 1 leaf.ldr
0 FILE leaf.ldr
4 16 0 0 0 1 0 0 1 1 0 0 1 0
",
    );
    assert!(!session.has_errors());
    let bbox = session.bounding_box().unwrap();
    assert_eq!(bbox.min, Point3::new(10.0, 5.0, 0.0));
    assert_eq!(bbox.max, Point3::new(11.0, 6.0, 0.0));
    assert_eq!(bbox.center(), Point3::new(10.5, 5.5, 0.0));
}

#[test]
fn test_ignore_regions_bound_the_box_and_watched_radius() {
    let session = session_from(
        "\
0 Main
0 !LDVIEW BBOX_IGNORE BEGIN
3 16 0 0 0 50 0 0 0 0 50
0 !LDVIEW BBOX_IGNORE END
3 16 0 0 0 2 0 0 0 0 2
",
    );
    assert!(!session.has_errors());
    let bbox = session.bounding_box().unwrap();
    assert_eq!(bbox.max, Point3::new(2.0, 0.0, 2.0));

    let full = session.max_radius(Point3::origin(), false);
    let watched = session.max_radius(Point3::origin(), true);
    assert_eq!(full, 50.0);
    assert_eq!(watched, 2.0);
}

#[test]
fn test_invalid_lines_never_contribute() {
    let session = session_from(
        "\
0 Main
3 16 these are not coordinates
4 16 0 0 0 1 0 0 1 1 0 0 1 0
",
    );
    // The malformed triangle is reported and excluded
    assert!(session.has_errors());
    let bbox = session.bounding_box().unwrap();
    assert_eq!(bbox.min, Point3::new(0.0, 0.0, 0.0));
    assert_eq!(bbox.max, Point3::new(1.0, 1.0, 0.0));
}

#[test]
fn test_boxes_only_matches_full_scans_for_axis_aligned_parts() {
    let tree = common::library_tree();

    let mut full =
        LoadSession::with_options(LoadOptions::new().with_ldraw_dir(tree.path())).unwrap();
    full.load(tree.path().join("models/car.ldr")).unwrap();

    let corners_options = LoadOptions::new()
        .with_ldraw_dir(tree.path())
        .with_bounding_boxes_only(true);
    let mut corners = LoadSession::with_options(corners_options).unwrap();
    corners.load(tree.path().join("models/car.ldr")).unwrap();

    // Identity placement: folding the part's eight corners is exact
    assert_eq!(full.bounding_box(), corners.bounding_box());
}

#[test]
fn test_sessions_without_a_model_have_no_extent() {
    let session = LoadSession::new();
    assert!(session.bounding_box().is_none());
    assert_eq!(session.max_radius(Point3::origin(), false), 0.0);
}
