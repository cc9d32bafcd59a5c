//! Typed line records
//!
//! Every physical line of an LDraw file becomes one [`Line`] record: the
//! classified [`LineKind`] plus bookkeeping shared by all kinds (origin,
//! raw text, validity, the BFC snapshot captured while parsing, step and
//! texmap association).
//!
//! Classification sniffs the first token: `0` is a meta/comment line,
//! `1`..`5` are geometry ("action") lines, anything else is invalid. Meta
//! lines are parsed into a [`Meta`] value; unrecognized meta commands fall
//! back to [`Meta::Comment`] rather than failing.

use crate::error::{Error, Result};
use nalgebra::{Matrix4, Point3};

/// LDraw color code as written on an action line
pub type ColorCode = u32;

/// The "current color" placeholder, inherited from the referencing line
pub const DEFAULT_COLOR: ColorCode = 16;

/// The "edge color" placeholder
pub const EDGE_COLOR: ColorCode = 24;

/// BFC certification of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BfcCertification {
    /// No BFC command seen yet
    #[default]
    Unknown,
    /// File declared NOCERTIFY, or violated the protocol
    Off,
    /// File is certified
    On,
    /// File is certified and classified as a part, so certification holds
    /// regardless of the parent's state
    ForcedOn,
}

/// The ordering of vertices in a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Winding {
    /// Counter-clockwise winding
    #[default]
    Ccw,
    /// Clockwise winding
    Cw,
}

/// BFC settings captured at the moment a line was parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BfcSnapshot {
    /// Certification state of the owning file at this line
    pub certification: BfcCertification,
    /// Whether backface culling applies
    pub clip: bool,
    /// Active winding direction
    pub winding: Winding,
    /// Whether this line consumed a one-shot INVERTNEXT
    pub invert_next: bool,
}

impl Default for BfcSnapshot {
    fn default() -> Self {
        Self {
            certification: BfcCertification::Unknown,
            clip: true,
            winding: Winding::Ccw,
            invert_next: false,
        }
    }
}

/// One directive of a `0 BFC ...` line.
///
/// A single line may carry several directives; `CERTIFY CCW` folds the
/// winding into the certify directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BfcCommand {
    /// Certify this file, optionally setting winding
    Certify(Option<Winding>),
    /// Declare the file not BFC compatible
    NoCertify,
    /// Enable culling, optionally setting winding
    Clip(Option<Winding>),
    /// Disable culling
    NoClip,
    /// Set the winding direction
    Winding(Winding),
    /// Invert the winding of the next action line
    InvertNext,
}

/// Texture projection methods of the `!TEXMAP` extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexmapProjection {
    /// Projection from a parallelogram; 9 numeric parameters
    Planar,
    /// Projection around an axis; 10 numeric parameters
    Cylindrical,
    /// Projection around a point; 11 numeric parameters
    Spherical,
}

impl TexmapProjection {
    /// Total numeric parameters the projection requires (3 reference
    /// points plus 0 to 2 angles)
    pub fn parameter_count(&self) -> usize {
        match self {
            TexmapProjection::Planar => 9,
            TexmapProjection::Cylindrical => 10,
            TexmapProjection::Spherical => 11,
        }
    }
}

/// Geometry of one texture projection
#[derive(Debug, Clone, PartialEq)]
pub struct TexmapSpec {
    /// Projection method
    pub projection: TexmapProjection,
    /// The three reference points
    pub points: [Point3<f32>; 3],
    /// Extra angles, 0 to 2 depending on the projection
    pub angles: Vec<f32>,
    /// Texture image file name
    pub texture: String,
    /// Optional gloss map image file name
    pub glossmap: Option<String>,
}

/// One `0 !TEXMAP ...` command
#[derive(Debug, Clone, PartialEq)]
pub enum TexmapCommand {
    /// Open a scope covering lines until END
    Start(TexmapSpec),
    /// Open a scope covering only the next line
    Next(TexmapSpec),
    /// Lines until END are the untextured fallback geometry
    Fallback,
    /// Close the scope
    End,
}

/// `0 ROTSTEP` viewing-angle step boundary
#[derive(Debug, Clone, PartialEq)]
pub enum RotStep {
    /// Rotation step with angles in degrees
    Rotate {
        /// X, Y, Z rotation angles
        angles: [f32; 3],
        /// How the angles combine with the current view
        mode: RotStepMode,
    },
    /// Return to the default view
    End,
}

/// How ROTSTEP angles combine with the current view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotStepMode {
    /// Angles are relative to the default view
    #[default]
    Relative,
    /// Angles are absolute
    Absolute,
    /// Angles add to the previous step's view
    Additive,
}

/// File classification declared by `!LDRAW_ORG` (or its legacy spellings)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// A part or shortcut
    Part,
    /// A sub-part (under `s/`)
    SubPart,
    /// A primitive (any resolution)
    Primitive,
}

/// Parsed `!LDRAW_ORG` / `Official` / `Unofficial` classification line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Declared kind, when one was named
    pub kind: Option<PartKind>,
    /// `Some(true)` for official library content (ORIGINAL/UPDATE
    /// qualifiers), `Some(false)` for unofficial, `None` when undeclared
    pub official: Option<bool>,
}

/// Bounding-box-ignore scope directives (`0 !LDVIEW BBOX_IGNORE ...`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BBoxIgnore {
    /// Ignore geometry until END
    Begin,
    /// Ignore only the next action line
    Next,
    /// Close the scope
    End,
}

/// A classified type 0 line
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    /// `0 FILE <name>`: start of an embedded MPD sub-file
    FileMarker(String),
    /// `0 NOFILE`: end of an embedded MPD sub-file
    NoFile,
    /// `0 !DATA <name>`: start of an embedded binary payload
    Data(String),
    /// `0 !: <base64>`: one row of an embedded payload, kept as written
    DataRow(String),
    /// `0 BFC <directives>`
    Bfc(Vec<BfcCommand>),
    /// `0 !TEXMAP <command>`
    Texmap(TexmapCommand),
    /// `0 STEP` building-step boundary
    Step,
    /// `0 ROTSTEP` viewing-angle step boundary
    RotStep(RotStep),
    /// `0 Name: <file>` header
    Name(String),
    /// `0 Author: <author>` header
    Author(String),
    /// `0 !LDRAW_ORG ...` and legacy classification lines
    Classification(Classification),
    /// `0 !LPUB NOSHRINK`: part must not be shrunk for seam width
    NoShrink,
    /// `0 !LDCAD <content>`: passed through untouched
    LdCad(String),
    /// `0 !LDVIEW BBOX_IGNORE <BEGIN|NEXT|END>`
    BBoxIgnore(BBoxIgnore),
    /// Any other type 0 line; the first such line is the description
    Comment(String),
}

/// A type 1 sub-model reference
#[derive(Debug, Clone, PartialEq)]
pub struct PartRef {
    /// Color code
    pub color: ColorCode,
    /// Placement of the referenced model, composed from the line's
    /// translation and 3x3 rotation fields
    pub transform: Matrix4<f32>,
    /// Referenced file name as written
    pub file: String,
    /// Registry key of the resolved model, filled in during parsing;
    /// `None` when the reference could not be resolved
    pub resolved: Option<String>,
}

/// A type 2 line segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegLine {
    /// Color code
    pub color: ColorCode,
    /// Endpoints
    pub points: [Point3<f32>; 2],
}

/// A type 3 triangle
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    /// Color code
    pub color: ColorCode,
    /// Vertices
    pub points: [Point3<f32>; 3],
}

/// A type 4 quadrilateral
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    /// Color code
    pub color: ColorCode,
    /// Vertices
    pub points: [Point3<f32>; 4],
}

/// A type 5 conditional line: drawn only when its control points project
/// to the same side
#[derive(Debug, Clone, PartialEq)]
pub struct CondLine {
    /// Color code
    pub color: ColorCode,
    /// Endpoints
    pub points: [Point3<f32>; 2],
    /// Control points; these never contribute to visible geometry
    pub controls: [Point3<f32>; 2],
}

/// Classified content of one line
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Type 0 meta or comment
    Comment(Meta),
    /// Type 1 sub-model reference
    PartRef(PartRef),
    /// Type 2 line segment
    SegLine(SegLine),
    /// Type 3 triangle
    Triangle(Triangle),
    /// Type 4 quadrilateral
    Quad(Quad),
    /// Type 5 conditional line
    CondLine(CondLine),
    /// Blank line
    Empty,
    /// Unparseable line
    Invalid,
}

impl LineKind {
    /// The LDraw line type digit, when the line has one
    pub fn line_type(&self) -> Option<u8> {
        match self {
            LineKind::Comment(_) => Some(0),
            LineKind::PartRef(_) => Some(1),
            LineKind::SegLine(_) => Some(2),
            LineKind::Triangle(_) => Some(3),
            LineKind::Quad(_) => Some(4),
            LineKind::CondLine(_) => Some(5),
            LineKind::Empty | LineKind::Invalid => None,
        }
    }

    /// Whether this is a geometry-producing ("action") line
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            LineKind::PartRef(_)
                | LineKind::SegLine(_)
                | LineKind::Triangle(_)
                | LineKind::Quad(_)
                | LineKind::CondLine(_)
        )
    }
}

/// One record per physical line of a source file
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Classified content
    pub kind: LineKind,
    /// Name of the file the line came from
    pub file: String,
    /// 1-based line number; 0 marks a synthetic injected line, which is
    /// excluded from bounding-box and radius scans
    pub line_number: usize,
    /// The line's text as read
    pub text: String,
    /// False when the line was malformed or invalidated later (e.g. by a
    /// failed texmap scope)
    pub valid: bool,
    /// BFC settings at the moment the line was parsed
    pub bfc: BfcSnapshot,
    /// Step index the line falls after, for action lines
    pub step: Option<usize>,
    /// Index into the owning model's texture list, when inside a scope
    pub texmap: Option<usize>,
    /// True when replacement lines were spliced in after this line
    pub replaced: bool,
    /// True when the line is excluded from tight bounding-box scans
    pub bbox_ignore: bool,
}

impl Line {
    /// Build a record for a physical line
    pub fn new(
        file: impl Into<String>,
        line_number: usize,
        text: impl Into<String>,
        kind: LineKind,
    ) -> Self {
        let valid = !matches!(kind, LineKind::Invalid);
        Self {
            kind,
            file: file.into(),
            line_number,
            text: text.into(),
            valid,
            bfc: BfcSnapshot::default(),
            step: None,
            texmap: None,
            replaced: false,
            bbox_ignore: false,
        }
    }

    /// Build a synthetic record (line number 0) for injected content
    pub fn synthetic(file: impl Into<String>, text: impl Into<String>, kind: LineKind) -> Self {
        Self::new(file, 0, text, kind)
    }

    /// Whether this is a geometry-producing line
    pub fn is_action(&self) -> bool {
        self.kind.is_action()
    }
}

/// Split off the first `n` whitespace-separated tokens, returning them and
/// the trimmed remainder of the line
fn split_tokens(text: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut tokens = Vec::with_capacity(n);
    let mut rest = text.trim_start();
    for _ in 0..n {
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        tokens.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((tokens, rest.trim_end()))
}

/// Parse a color code; direct colors use the `0x2RRGGBB` spelling
fn parse_color(token: &str) -> Result<ColorCode> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return ColorCode::from_str_radix(hex, 16).map_err(|_| {
            Error::parse_error_with_context("color", token, "color code")
        });
    }
    token
        .parse::<ColorCode>()
        .map_err(|_| Error::parse_error_with_context("color", token, "color code"))
}

/// Parse one coordinate field, rejecting non-finite values
fn parse_float(field_name: &str, token: &str) -> Result<f32> {
    let value: f32 = token
        .parse()
        .map_err(|_| Error::parse_error_with_context(field_name, token, "floating-point number"))?;
    if !value.is_finite() {
        return Err(Error::parse_error_with_context(
            field_name,
            token,
            "finite floating-point number",
        ));
    }
    Ok(value)
}

/// Parse three consecutive tokens into a point
fn parse_point(field_name: &str, tokens: &[&str]) -> Result<Point3<f32>> {
    Ok(Point3::new(
        parse_float(field_name, tokens[0])?,
        parse_float(field_name, tokens[1])?,
        parse_float(field_name, tokens[2])?,
    ))
}

/// Classify one physical line.
///
/// Never panics; malformed content returns an error which the caller
/// records against the line (marking it invalid) and reports as an alert.
pub fn classify(text: &str) -> Result<LineKind> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(LineKind::Empty);
    }
    let mut tokens = trimmed.split_whitespace();
    let first = tokens.next().unwrap_or_default();
    match first {
        "0" => classify_meta(trimmed),
        "1" => classify_part_ref(trimmed),
        "2" => classify_poly(trimmed, 2),
        "3" => classify_poly(trimmed, 3),
        "4" => classify_poly(trimmed, 4),
        "5" => classify_cond_line(trimmed),
        other => Err(Error::invalid_format_context(
            "line type",
            &format!("expected 0-5, got '{}'", other),
        )),
    }
}

/// Parse a type 1 line: color, 12 transform floats, file name
fn classify_part_ref(text: &str) -> Result<LineKind> {
    let Some((tokens, file)) = split_tokens(text, 14) else {
        return Err(Error::invalid_format_context(
            "line type 1",
            "expected color, 12 transform values and a file name",
        ));
    };
    if file.is_empty() {
        return Err(Error::invalid_format_context(
            "line type 1",
            "missing file name",
        ));
    }
    let color = parse_color(tokens[1])?;
    let mut m = [0f32; 12];
    for (i, token) in tokens[2..14].iter().enumerate() {
        let field = if i < 3 { "translation" } else { "rotation matrix" };
        m[i] = parse_float(field, token)?;
    }
    // Row-major: rotation columns a..i with translation x y z in the
    // fourth column, bottom row 0 0 0 1
    let transform = Matrix4::new(
        m[3], m[4], m[5], m[0], //
        m[6], m[7], m[8], m[1], //
        m[9], m[10], m[11], m[2], //
        0.0, 0.0, 0.0, 1.0,
    );
    Ok(LineKind::PartRef(PartRef {
        color,
        transform,
        file: file.to_string(),
        resolved: None,
    }))
}

/// Parse types 2-4: color plus `vertex_count` points
fn classify_poly(text: &str, vertex_count: usize) -> Result<LineKind> {
    let context = match vertex_count {
        2 => "line type 2",
        3 => "line type 3",
        _ => "line type 4",
    };
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let expected = 2 + vertex_count * 3;
    if tokens.len() != expected {
        return Err(Error::invalid_format_context(
            context,
            &format!("expected {} fields, got {}", expected, tokens.len()),
        ));
    }
    let color = parse_color(tokens[1])?;
    let mut points = Vec::with_capacity(vertex_count);
    for v in 0..vertex_count {
        points.push(parse_point(context, &tokens[2 + v * 3..5 + v * 3])?);
    }
    Ok(match vertex_count {
        2 => LineKind::SegLine(SegLine {
            color,
            points: [points[0], points[1]],
        }),
        3 => LineKind::Triangle(Triangle {
            color,
            points: [points[0], points[1], points[2]],
        }),
        _ => LineKind::Quad(Quad {
            color,
            points: [points[0], points[1], points[2], points[3]],
        }),
    })
}

/// Parse a type 5 line: color, 2 endpoints, 2 control points
fn classify_cond_line(text: &str) -> Result<LineKind> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 14 {
        return Err(Error::invalid_format_context(
            "line type 5",
            &format!("expected 14 fields, got {}", tokens.len()),
        ));
    }
    let color = parse_color(tokens[1])?;
    Ok(LineKind::CondLine(CondLine {
        color,
        points: [
            parse_point("line type 5", &tokens[2..5])?,
            parse_point("line type 5", &tokens[5..8])?,
        ],
        controls: [
            parse_point("line type 5", &tokens[8..11])?,
            parse_point("line type 5", &tokens[11..14])?,
        ],
    }))
}

/// Classify a type 0 line into a [`Meta`] value
fn classify_meta(text: &str) -> Result<LineKind> {
    let Some((_, rest)) = split_tokens(text, 1) else {
        return Ok(LineKind::Comment(Meta::Comment(String::new())));
    };
    if rest.is_empty() {
        return Ok(LineKind::Comment(Meta::Comment(String::new())));
    }
    let keyword_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let keyword = &rest[..keyword_end];
    let args = rest[keyword_end..].trim();

    let meta = match keyword.to_ascii_uppercase().as_str() {
        "FILE" => {
            if args.is_empty() {
                return Err(Error::invalid_format_context("FILE marker", "missing file name"));
            }
            Meta::FileMarker(args.to_string())
        }
        "NOFILE" => Meta::NoFile,
        "STEP" => Meta::Step,
        "ROTSTEP" => Meta::RotStep(parse_rotstep(args)?),
        "BFC" => Meta::Bfc(parse_bfc_commands(args)?),
        "!TEXMAP" => Meta::Texmap(parse_texmap_command(args)?),
        "!DATA" => {
            if args.is_empty() {
                return Err(Error::invalid_format_context("!DATA", "missing file name"));
            }
            Meta::Data(args.to_string())
        }
        "!:" => Meta::DataRow(args.to_string()),
        "!LDRAW_ORG" | "LDRAW_ORG" => Meta::Classification(parse_classification(args)),
        "OFFICIAL" => Meta::Classification(Classification {
            kind: None,
            official: Some(true),
        }),
        "UNOFFICIAL" => {
            let mut class = parse_classification(args);
            class.official = Some(false);
            Meta::Classification(class)
        }
        "NAME:" => Meta::Name(args.to_string()),
        "AUTHOR:" => Meta::Author(args.to_string()),
        "!LPUB" => {
            if args.eq_ignore_ascii_case("NOSHRINK") {
                Meta::NoShrink
            } else {
                Meta::Comment(rest.to_string())
            }
        }
        "!LDCAD" => Meta::LdCad(args.to_string()),
        "!LDVIEW" => match parse_bbox_ignore(args) {
            Some(cmd) => Meta::BBoxIgnore(cmd),
            None => Meta::Comment(rest.to_string()),
        },
        _ => Meta::Comment(rest.to_string()),
    };
    Ok(LineKind::Comment(meta))
}

/// Parse the directives of a `0 BFC ...` line.
///
/// `CERTIFY`/`CLIP` fold an immediately following winding token into the
/// directive; standalone `CW`/`CCW` become winding directives.
fn parse_bfc_commands(args: &str) -> Result<Vec<BfcCommand>> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(Error::invalid_format_context("BFC command", "missing directive"));
    }
    let winding_of = |token: &str| match token.to_ascii_uppercase().as_str() {
        "CCW" => Some(Winding::Ccw),
        "CW" => Some(Winding::Cw),
        _ => None,
    };
    let mut commands = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].to_ascii_uppercase().as_str() {
            "CERTIFY" => {
                let folded = tokens.get(i + 1).and_then(|t| winding_of(t));
                if folded.is_some() {
                    i += 1;
                }
                commands.push(BfcCommand::Certify(folded));
            }
            "NOCERTIFY" => commands.push(BfcCommand::NoCertify),
            "CLIP" => {
                let folded = tokens.get(i + 1).and_then(|t| winding_of(t));
                if folded.is_some() {
                    i += 1;
                }
                commands.push(BfcCommand::Clip(folded));
            }
            "NOCLIP" => commands.push(BfcCommand::NoClip),
            "CCW" => commands.push(BfcCommand::Winding(Winding::Ccw)),
            "CW" => commands.push(BfcCommand::Winding(Winding::Cw)),
            "INVERTNEXT" => commands.push(BfcCommand::InvertNext),
            other => {
                return Err(Error::invalid_format_context(
                    "BFC command",
                    &format!("unknown directive '{}'", other),
                ));
            }
        }
        i += 1;
    }
    Ok(commands)
}

/// Parse the arguments of a `0 !TEXMAP ...` line
fn parse_texmap_command(args: &str) -> Result<TexmapCommand> {
    let Some((op, rest)) = split_tokens(args, 1).map(|(t, r)| (t[0], r)) else {
        return Err(Error::invalid_format_context("TEXMAP command", "missing operation"));
    };
    match op.to_ascii_uppercase().as_str() {
        "FALLBACK" => Ok(TexmapCommand::Fallback),
        "END" => Ok(TexmapCommand::End),
        "START" => Ok(TexmapCommand::Start(parse_texmap_spec(rest)?)),
        "NEXT" => Ok(TexmapCommand::Next(parse_texmap_spec(rest)?)),
        other => Err(Error::invalid_format_context(
            "TEXMAP command",
            &format!("unknown operation '{}'", other),
        )),
    }
}

/// Parse `<projection> <parameters> <texture> [GLOSSMAP <texture>]`
fn parse_texmap_spec(args: &str) -> Result<TexmapSpec> {
    let Some((head, _)) = split_tokens(args, 1) else {
        return Err(Error::invalid_format_context("TEXMAP command", "missing projection"));
    };
    let projection = match head[0].to_ascii_uppercase().as_str() {
        "PLANAR" => TexmapProjection::Planar,
        "CYLINDRICAL" => TexmapProjection::Cylindrical,
        "SPHERICAL" => TexmapProjection::Spherical,
        other => {
            return Err(Error::invalid_format_context(
                "TEXMAP command",
                &format!(
                    "unknown projection '{}', expected PLANAR, CYLINDRICAL or SPHERICAL",
                    other
                ),
            ));
        }
    };
    let count = projection.parameter_count();
    let Some((tokens, file_part)) = split_tokens(args, 1 + count) else {
        return Err(Error::invalid_format_context(
            "TEXMAP command",
            &format!("expected {} numeric parameters", count),
        ));
    };
    let mut values = Vec::with_capacity(count);
    for token in &tokens[1..] {
        values.push(parse_float("TEXMAP parameter", token)?);
    }
    let points = [
        Point3::new(values[0], values[1], values[2]),
        Point3::new(values[3], values[4], values[5]),
        Point3::new(values[6], values[7], values[8]),
    ];
    let angles = values[9..].to_vec();
    if file_part.is_empty() {
        return Err(Error::invalid_format_context("TEXMAP command", "missing texture file name"));
    }
    // An optional GLOSSMAP marker splits texture from gloss image
    let upper = file_part.to_ascii_uppercase();
    let (texture, glossmap) = match upper.find(" GLOSSMAP ") {
        Some(pos) => {
            let gloss = file_part[pos + " GLOSSMAP ".len()..].trim();
            (file_part[..pos].trim_end().to_string(), Some(gloss.to_string()))
        }
        None => (file_part.to_string(), None),
    };
    Ok(TexmapSpec {
        projection,
        points,
        angles,
        texture,
        glossmap,
    })
}

/// Parse the arguments of a `0 ROTSTEP ...` line
fn parse_rotstep(args: &str) -> Result<RotStep> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if tokens.len() == 1 && tokens[0].eq_ignore_ascii_case("END") {
        return Ok(RotStep::End);
    }
    if tokens.len() < 3 || tokens.len() > 4 {
        return Err(Error::invalid_format_context(
            "ROTSTEP command",
            "expected three angles with an optional mode, or END",
        ));
    }
    let angles = [
        parse_float("ROTSTEP angle", tokens[0])?,
        parse_float("ROTSTEP angle", tokens[1])?,
        parse_float("ROTSTEP angle", tokens[2])?,
    ];
    let mode = match tokens.get(3).map(|t| t.to_ascii_uppercase()) {
        None => RotStepMode::Relative,
        Some(mode) => match mode.as_str() {
            "REL" => RotStepMode::Relative,
            "ABS" => RotStepMode::Absolute,
            "ADD" => RotStepMode::Additive,
            other => {
                return Err(Error::invalid_format_context(
                    "ROTSTEP command",
                    &format!("unknown mode '{}'", other),
                ));
            }
        },
    };
    Ok(RotStep::Rotate { angles, mode })
}

/// Parse `!LDRAW_ORG` arguments; unknown qualifiers are ignored
fn parse_classification(args: &str) -> Classification {
    let mut class = Classification {
        kind: None,
        official: None,
    };
    for token in args.split_whitespace() {
        let upper = token.to_ascii_uppercase();
        if let Some(kind_name) = upper.strip_prefix("UNOFFICIAL_") {
            class.official = Some(false);
            if let Some(kind) = part_kind_from(kind_name) {
                class.kind = Some(kind);
            }
            continue;
        }
        match upper.as_str() {
            "UNOFFICIAL" => class.official = Some(false),
            "ORIGINAL" | "UPDATE" => class.official = Some(true),
            other => {
                if let Some(kind) = part_kind_from(other) {
                    class.kind = Some(kind);
                }
            }
        }
    }
    class
}

/// Map an upper-cased `!LDRAW_ORG` kind token to a [`PartKind`]
fn part_kind_from(token: &str) -> Option<PartKind> {
    match token {
        "PART" | "SHORTCUT" => Some(PartKind::Part),
        "SUBPART" => Some(PartKind::SubPart),
        token if token.ends_with("PRIMITIVE") => Some(PartKind::Primitive),
        _ => None,
    }
}

/// Parse `!LDVIEW BBOX_IGNORE <BEGIN|NEXT|END>`; anything else is a plain
/// comment for other renderers' commands
fn parse_bbox_ignore(args: &str) -> Option<BBoxIgnore> {
    let mut tokens = args.split_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case("BBOX_IGNORE") {
        return None;
    }
    match tokens.next()?.to_ascii_uppercase().as_str() {
        "BEGIN" => Some(BBoxIgnore::Begin),
        "NEXT" => Some(BBoxIgnore::Next),
        "END" => Some(BBoxIgnore::End),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_blank_and_invalid() {
        assert_eq!(classify("   ").unwrap(), LineKind::Empty);
        assert!(classify("7 1 2 3").is_err());
        assert!(classify("hello").is_err());
    }

    #[test]
    fn test_classify_part_ref() {
        let kind = classify("1 16 10 -24 0 1 0 0 0 1 0 0 0 1 3001.dat").unwrap();
        let LineKind::PartRef(part_ref) = kind else {
            panic!("expected part reference");
        };
        assert_eq!(part_ref.color, 16);
        assert_eq!(part_ref.file, "3001.dat");
        let moved = part_ref.transform.transform_point(&Point3::new(0.0, 0.0, 0.0));
        assert_eq!(moved, Point3::new(10.0, -24.0, 0.0));
    }

    #[test]
    fn test_part_ref_rotation_layout() {
        // 90 degree rotation about Y: x' = z, z' = -x
        let kind = classify("1 16 0 0 0 0 0 1 0 1 0 -1 0 0 axis.dat").unwrap();
        let LineKind::PartRef(part_ref) = kind else {
            panic!("expected part reference");
        };
        let moved = part_ref.transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_eq!(moved, Point3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_part_ref_file_name_with_spaces() {
        let kind = classify("1 16 0 0 0 1 0 0 0 1 0 0 0 1 my model.ldr").unwrap();
        let LineKind::PartRef(part_ref) = kind else {
            panic!("expected part reference");
        };
        assert_eq!(part_ref.file, "my model.ldr");
    }

    #[test]
    fn test_classify_geometry_lines() {
        let kind = classify("2 24 1 0 0 0 1 0").unwrap();
        assert!(matches!(kind, LineKind::SegLine(_)));

        let kind = classify("3 16 0 0 0 1 0 0 0 1 0").unwrap();
        let LineKind::Triangle(tri) = kind else {
            panic!("expected triangle");
        };
        assert_eq!(tri.points[1], Point3::new(1.0, 0.0, 0.0));

        let kind = classify("4 16 0 0 0 1 0 0 1 1 0 0 1 0").unwrap();
        assert!(matches!(kind, LineKind::Quad(_)));

        let kind = classify("5 24 0 0 0 1 0 0 0 1 0 1 1 0").unwrap();
        let LineKind::CondLine(cond) = kind else {
            panic!("expected conditional line");
        };
        assert_eq!(cond.controls[1], Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_geometry_field_count_is_strict() {
        assert!(classify("3 16 0 0 0 1 0 0 0 1").is_err());
        assert!(classify("3 16 0 0 0 1 0 0 0 1 0 9").is_err());
        assert!(classify("1 16 0 0 0 1 0 0 0 1 0 0 0 1").is_err());
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        assert!(classify("3 16 nan 0 0 1 0 0 0 1 0").is_err());
        assert!(classify("2 24 inf 0 0 0 1 0").is_err());
    }

    #[test]
    fn test_direct_color_code() {
        let kind = classify("3 0x2FF00FF 0 0 0 1 0 0 0 1 0").unwrap();
        let LineKind::Triangle(tri) = kind else {
            panic!("expected triangle");
        };
        assert_eq!(tri.color, 0x2FF00FF);
    }

    #[test]
    fn test_meta_mpd_markers() {
        assert_eq!(
            classify("0 FILE main.ldr").unwrap(),
            LineKind::Comment(Meta::FileMarker("main.ldr".to_string()))
        );
        assert_eq!(
            classify("0 FILE my model.ldr").unwrap(),
            LineKind::Comment(Meta::FileMarker("my model.ldr".to_string()))
        );
        assert_eq!(classify("0 NOFILE").unwrap(), LineKind::Comment(Meta::NoFile));
        assert!(classify("0 FILE").is_err());
    }

    #[test]
    fn test_meta_bfc_certify_folds_winding() {
        let kind = classify("0 BFC CERTIFY CCW").unwrap();
        assert_eq!(
            kind,
            LineKind::Comment(Meta::Bfc(vec![BfcCommand::Certify(Some(Winding::Ccw))]))
        );
        let kind = classify("0 BFC CW CLIP").unwrap();
        assert_eq!(
            kind,
            LineKind::Comment(Meta::Bfc(vec![
                BfcCommand::Winding(Winding::Cw),
                BfcCommand::Clip(None),
            ]))
        );
        assert!(classify("0 BFC").is_err());
        assert!(classify("0 BFC FROBNICATE").is_err());
    }

    #[test]
    fn test_meta_texmap_planar() {
        let kind = classify(
            "0 !TEXMAP START PLANAR -20 -0.25 30 20 -0.25 30 -20 -0.25 -30 sticker.png",
        )
        .unwrap();
        let LineKind::Comment(Meta::Texmap(TexmapCommand::Start(spec))) = kind else {
            panic!("expected texmap start");
        };
        assert_eq!(spec.projection, TexmapProjection::Planar);
        assert_eq!(spec.points[0], Point3::new(-20.0, -0.25, 30.0));
        assert!(spec.angles.is_empty());
        assert_eq!(spec.texture, "sticker.png");
        assert_eq!(spec.glossmap, None);
    }

    #[test]
    fn test_meta_texmap_cylindrical_with_glossmap() {
        let kind = classify(
            "0 !TEXMAP NEXT CYLINDRICAL 0 0 0 0 -4 0 1 0 0 180 curve.png GLOSSMAP curve-g.png",
        )
        .unwrap();
        let LineKind::Comment(Meta::Texmap(TexmapCommand::Next(spec))) = kind else {
            panic!("expected texmap next");
        };
        assert_eq!(spec.projection, TexmapProjection::Cylindrical);
        assert_eq!(spec.angles, vec![180.0]);
        assert_eq!(spec.texture, "curve.png");
        assert_eq!(spec.glossmap.as_deref(), Some("curve-g.png"));
    }

    #[test]
    fn test_meta_texmap_bogus_projection() {
        let err = classify("0 !TEXMAP START BOGUS_TYPE 0 0 0 1 0 0 0 1 0 tex.png").unwrap_err();
        assert!(err.to_string().contains("BOGUS_TYPE"));
    }

    #[test]
    fn test_meta_steps() {
        assert_eq!(classify("0 STEP").unwrap(), LineKind::Comment(Meta::Step));
        assert_eq!(
            classify("0 ROTSTEP 0 90 0 ABS").unwrap(),
            LineKind::Comment(Meta::RotStep(RotStep::Rotate {
                angles: [0.0, 90.0, 0.0],
                mode: RotStepMode::Absolute,
            }))
        );
        assert_eq!(
            classify("0 ROTSTEP END").unwrap(),
            LineKind::Comment(Meta::RotStep(RotStep::End))
        );
        assert!(classify("0 ROTSTEP 1 2").is_err());
    }

    #[test]
    fn test_meta_headers() {
        assert_eq!(
            classify("0 Name: 3001.dat").unwrap(),
            LineKind::Comment(Meta::Name("3001.dat".to_string()))
        );
        assert_eq!(
            classify("0 Author: James Jessiman").unwrap(),
            LineKind::Comment(Meta::Author("James Jessiman".to_string()))
        );
    }

    #[test]
    fn test_meta_classification() {
        assert_eq!(
            classify("0 !LDRAW_ORG Part UPDATE 2023-05").unwrap(),
            LineKind::Comment(Meta::Classification(Classification {
                kind: Some(PartKind::Part),
                official: Some(true),
            }))
        );
        assert_eq!(
            classify("0 !LDRAW_ORG Unofficial_Primitive").unwrap(),
            LineKind::Comment(Meta::Classification(Classification {
                kind: Some(PartKind::Primitive),
                official: Some(false),
            }))
        );
        assert_eq!(
            classify("0 LDRAW_ORG 48_Primitive UPDATE 2012-01").unwrap(),
            LineKind::Comment(Meta::Classification(Classification {
                kind: Some(PartKind::Primitive),
                official: Some(true),
            }))
        );
        assert_eq!(
            classify("0 UNOFFICIAL PART").unwrap(),
            LineKind::Comment(Meta::Classification(Classification {
                kind: Some(PartKind::Part),
                official: Some(false),
            }))
        );
    }

    #[test]
    fn test_meta_data_and_rows() {
        assert_eq!(
            classify("0 !DATA sticker.png").unwrap(),
            LineKind::Comment(Meta::Data("sticker.png".to_string()))
        );
        assert_eq!(
            classify("0 !: iVBORw0KGgo=").unwrap(),
            LineKind::Comment(Meta::DataRow("iVBORw0KGgo=".to_string()))
        );
    }

    #[test]
    fn test_meta_tool_commands() {
        assert_eq!(classify("0 !LPUB NOSHRINK").unwrap(), LineKind::Comment(Meta::NoShrink));
        assert!(matches!(
            classify("0 !LPUB PLI BEGIN IGN").unwrap(),
            LineKind::Comment(Meta::Comment(_))
        ));
        assert_eq!(
            classify("0 !LDCAD GROUP_DEF [ID=1]").unwrap(),
            LineKind::Comment(Meta::LdCad("GROUP_DEF [ID=1]".to_string()))
        );
        assert_eq!(
            classify("0 !LDVIEW BBOX_IGNORE BEGIN").unwrap(),
            LineKind::Comment(Meta::BBoxIgnore(BBoxIgnore::Begin))
        );
        assert!(matches!(
            classify("0 !LDVIEW SOMETHING_ELSE").unwrap(),
            LineKind::Comment(Meta::Comment(_))
        ));
    }

    #[test]
    fn test_plain_comment_keeps_text() {
        assert_eq!(
            classify("0 Brick 2 x 4").unwrap(),
            LineKind::Comment(Meta::Comment("Brick 2 x 4".to_string()))
        );
    }

    #[test]
    fn test_line_record_defaults() {
        let line = Line::new("x.dat", 3, "0 STEP", classify("0 STEP").unwrap());
        assert!(line.valid);
        assert!(!line.is_action());
        assert_eq!(line.kind.line_type(), Some(0));
        let synthetic = Line::synthetic("x.dat", "2 24 0 0 0 1 0 0", classify("2 24 0 0 0 1 0 0").unwrap());
        assert_eq!(synthetic.line_number, 0);
        assert!(synthetic.is_action());
    }
}
