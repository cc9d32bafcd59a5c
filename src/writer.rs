//! LDraw text serialization
//!
//! Turns parsed lines back into `.ldr` text. Action lines are regenerated
//! from their typed fields; type 0 lines, blanks and malformed lines
//! reproduce the text they were read from. Floats print in the shortest
//! form that parses back to the same value, so a serialize/parse cycle is
//! lossless.

use crate::line::{ColorCode, Line, LineKind};
use crate::model::Model;
use nalgebra::{Matrix4, Point3};
use std::fmt::Write;

/// Lowest code treated as a direct `0x2RRGGBB` color
const DIRECT_COLOR_BASE: ColorCode = 0x200_0000;

fn push_color(out: &mut String, color: ColorCode) {
    if color >= DIRECT_COLOR_BASE {
        let _ = write!(out, "0x{color:X}");
    } else {
        let _ = write!(out, "{color}");
    }
}

fn push_float(out: &mut String, value: f32) {
    // -0.0 would survive a round trip but reads oddly in a text file
    let value = if value == 0.0 { 0.0 } else { value };
    let _ = write!(out, "{value}");
}

fn push_point(out: &mut String, point: &Point3<f32>) {
    push_float(out, point.x);
    out.push(' ');
    push_float(out, point.y);
    out.push(' ');
    push_float(out, point.z);
}

/// The twelve positional fields of a type 1 line: translation first, then
/// the rotation rows
fn push_placement(out: &mut String, transform: &Matrix4<f32>) {
    for &(row, column) in &[(0, 3), (1, 3), (2, 3)] {
        push_float(out, transform[(row, column)]);
        out.push(' ');
    }
    for row in 0..3 {
        for column in 0..3 {
            push_float(out, transform[(row, column)]);
            if (row, column) != (2, 2) {
                out.push(' ');
            }
        }
    }
}

/// Render one line as LDraw text.
///
/// Geometry and reference lines are rebuilt from their parsed fields, so
/// spliced replacement lines and edited transforms serialize correctly;
/// everything else passes through as read.
pub fn format_line(line: &Line) -> String {
    let mut out = String::new();
    match &line.kind {
        LineKind::PartRef(part) => {
            out.push_str("1 ");
            push_color(&mut out, part.color);
            out.push(' ');
            push_placement(&mut out, &part.transform);
            out.push(' ');
            out.push_str(&part.file);
        }
        LineKind::SegLine(seg) => {
            out.push_str("2 ");
            push_color(&mut out, seg.color);
            for point in &seg.points {
                out.push(' ');
                push_point(&mut out, point);
            }
        }
        LineKind::Triangle(tri) => {
            out.push_str("3 ");
            push_color(&mut out, tri.color);
            for point in &tri.points {
                out.push(' ');
                push_point(&mut out, point);
            }
        }
        LineKind::Quad(quad) => {
            out.push_str("4 ");
            push_color(&mut out, quad.color);
            for point in &quad.points {
                out.push(' ');
                push_point(&mut out, point);
            }
        }
        LineKind::CondLine(cond) => {
            out.push_str("5 ");
            push_color(&mut out, cond.color);
            for point in cond.points.iter().chain(cond.controls.iter()) {
                out.push(' ');
                push_point(&mut out, point);
            }
        }
        LineKind::Comment(_) | LineKind::Empty | LineKind::Invalid => {
            out.push_str(&line.text);
        }
    }
    out
}

/// Render a whole model in document order.
///
/// Lines that were replaced are dropped in favor of the substitutes that
/// follow them; malformed lines keep their original text so nothing is
/// silently lost.
pub fn write_model(model: &Model) -> String {
    let mut out = String::new();
    for line in model.lines.iter().take(model.active_lines) {
        if line.replaced {
            continue;
        }
        out.push_str(&format_line(line));
        out.push('\n');
    }
    out
}
