//! # libldraw
//!
//! A pure Rust loader for LDraw model files (`.ldr`, `.dat`, `.mpd`).
//!
//! This library parses the line-based LDraw format: single parts,
//! primitives, multi-part documents (MPD) and the meta-commands layered
//! on top of them (BFC certification, `!TEXMAP` texture projections,
//! `!DATA` embedded payloads, step boundaries). Referenced sub-models are
//! resolved through a configurable search path backed by library
//! directories and the official/unofficial parts-library zip archives.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - Tolerant line-by-line parsing: malformed content is reported through
//!   a structured alert channel and the load keeps going
//! - Multi-part documents with forward references and cycle detection
//! - Parts-library resolution from directories and zip archives, with
//!   freshness negotiation between the two
//! - Bounding-box and radius aggregation over the reference graph
//! - Depth-first text search across nested sub-models
//!
//! ## Example
//!
//! ```no_run
//! use libldraw::{LoadOptions, LoadSession};
//!
//! # fn main() -> libldraw::Result<()> {
//! let options = LoadOptions::new().with_ldraw_dir("/usr/share/ldraw");
//! let mut session = LoadSession::with_options(options)?;
//!
//! let model = session.load("models/car.ldr")?;
//! println!("{}: {} lines", model.display_name, model.lines.len());
//!
//! if let Some(bbox) = session.bounding_box() {
//!     println!("size: {:?}", bbox.size());
//! }
//! for alert in session.alerts() {
//!     eprintln!("{}", alert);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alert;
pub mod archive;
pub mod config;
pub mod error;
pub mod geometry;
pub mod line;
pub mod model;
pub mod parser;
pub mod resolve;
pub mod search;
pub mod session;
pub mod studs;
pub mod writer;

pub use alert::{Alert, AlertKind, AlertObserver, AlertOrigin, CancelHandle, Severity};
pub use error::{Error, Result};
pub use geometry::BoundingBox;
pub use line::{ColorCode, Line, LineKind, DEFAULT_COLOR, EDGE_COLOR};
pub use model::{Model, ModelRegistry};
pub use search::{
    MATCH_ALL, MATCH_COMMENTS, MATCH_COND_LINES, MATCH_LINES, MATCH_PART_REFS, MATCH_QUADS,
    MATCH_TRIANGLES,
};
pub use session::{LoadOptions, LoadSession, SubstituteProvider};
pub use studs::StudStyle;
pub use writer::{format_line, write_model};

use std::path::Path;

/// Load a model file with default options.
///
/// Default options have no parts library configured, so only references
/// that resolve inside the document itself (MPD sub-files) link up. Use
/// [`load_file_with_options`] to point the loader at a library.
///
/// # Example
///
/// ```no_run
/// # fn main() -> libldraw::Result<()> {
/// let session = libldraw::load_file("models/car.ldr")?;
/// let model = session.main_model().unwrap();
/// println!("{} models loaded", session.model_count());
/// # let _ = model;
/// # Ok(())
/// # }
/// ```
pub fn load_file(path: impl AsRef<Path>) -> Result<LoadSession> {
    load_file_with_options(path, LoadOptions::new())
}

/// Load a model file with the given options, returning the session that
/// owns the resulting model registry.
///
/// # Example
///
/// ```no_run
/// use libldraw::{LoadOptions, StudStyle};
///
/// # fn main() -> libldraw::Result<()> {
/// let options = LoadOptions::new()
///     .with_ldraw_dir("/usr/share/ldraw")
///     .with_stud_style(StudStyle::Logo);
/// let session = libldraw::load_file_with_options("models/car.ldr", options)?;
/// # Ok(())
/// # }
/// ```
pub fn load_file_with_options(
    path: impl AsRef<Path>,
    options: LoadOptions,
) -> Result<LoadSession> {
    let mut session = LoadSession::with_options(options)?;
    session.load(path)?;
    Ok(session)
}
