//! Text search across the reference tree
//!
//! Finds lines containing a substring, walking the line tree depth-first:
//! a type 1 line is visited before the lines of the model it references.
//! Matches are addressed by a path of line indices, one per nesting
//! level, so `[12, 3]` is line 3 inside the model referenced on line 12.
//! Comparison is case-insensitive on the line's original text.

use crate::line::LineKind;
use crate::model::{Model, ModelRegistry};

/// Match type 0 comment and meta lines
pub const MATCH_COMMENTS: u32 = 1 << 0;
/// Match type 1 sub-model references
pub const MATCH_PART_REFS: u32 = 1 << 1;
/// Match type 2 line segments
pub const MATCH_LINES: u32 = 1 << 2;
/// Match type 3 triangles
pub const MATCH_TRIANGLES: u32 = 1 << 3;
/// Match type 4 quadrilaterals
pub const MATCH_QUADS: u32 = 1 << 4;
/// Match type 5 conditional lines
pub const MATCH_COND_LINES: u32 = 1 << 5;
/// Match every line type
pub const MATCH_ALL: u32 = MATCH_COMMENTS
    | MATCH_PART_REFS
    | MATCH_LINES
    | MATCH_TRIANGLES
    | MATCH_QUADS
    | MATCH_COND_LINES;

/// Find the next match after `after` in depth-first order.
///
/// `after` of `None` searches from the top; otherwise the search resumes
/// directly behind that path (its own subtree first). When the end is
/// reached and `wrap_to` is given, the search restarts once from the top
/// and stops at that boundary, so repeated next-match calls cycle through
/// the document without looping forever.
pub fn search_forward(
    model: &Model,
    registry: &ModelRegistry,
    needle: &str,
    after: Option<&[usize]>,
    wrap_to: Option<&[usize]>,
    mask: u32,
) -> Option<Vec<usize>> {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    if let Some(found) = forward_from(model, registry, &needle, after, mask) {
        return Some(found);
    }
    // One wrap pass over the region the first pass skipped
    if let Some(boundary) = wrap_to {
        let found = forward_from(model, registry, &needle, None, mask)?;
        if found.as_slice() <= boundary {
            return Some(found);
        }
    }
    None
}

/// Find the previous match before `before` in depth-first order.
///
/// The mirror of [`search_forward`]: a referenced model's lines precede
/// the referencing line when walking backwards. `wrap_to` bounds a single
/// restart from the bottom.
pub fn search_backward(
    model: &Model,
    registry: &ModelRegistry,
    needle: &str,
    before: Option<&[usize]>,
    wrap_to: Option<&[usize]>,
    mask: u32,
) -> Option<Vec<usize>> {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    if let Some(found) = backward_from(model, registry, &needle, before, mask) {
        return Some(found);
    }
    if let Some(boundary) = wrap_to {
        let found = backward_from(model, registry, &needle, None, mask)?;
        if found.as_slice() >= boundary {
            return Some(found);
        }
    }
    None
}

fn matches(line: &crate::line::Line, needle: &str, mask: u32) -> bool {
    let Some(line_type) = line.kind.line_type() else {
        return false;
    };
    mask & (1 << line_type) != 0 && line.text.to_lowercase().contains(needle)
}

/// The model a line references, if it resolved
fn referenced<'a>(line: &crate::line::Line, registry: &'a ModelRegistry) -> Option<&'a Model> {
    match &line.kind {
        LineKind::PartRef(part) => part.resolved.as_ref().and_then(|key| registry.get(key)),
        _ => None,
    }
}

fn forward_from(
    model: &Model,
    registry: &ModelRegistry,
    needle: &str,
    after: Option<&[usize]>,
    mask: u32,
) -> Option<Vec<usize>> {
    let lines = &model.lines[..model.active_lines.min(model.lines.len())];
    let resume = match after {
        Some(path) if !path.is_empty() => {
            let index = path[0];
            // Finish the subtree the previous match sits in before moving
            // on to the following siblings
            if let Some(child) = lines.get(index).and_then(|l| referenced(l, registry)) {
                let rest = &path[1..];
                let inner = if rest.is_empty() { None } else { Some(rest) };
                if let Some(mut found) = forward_from(child, registry, needle, inner, mask) {
                    found.insert(0, index);
                    return Some(found);
                }
            }
            index.saturating_add(1)
        }
        _ => 0,
    };
    for (index, line) in lines.iter().enumerate().skip(resume) {
        if matches(line, needle, mask) {
            return Some(vec![index]);
        }
        if let Some(child) = referenced(line, registry) {
            if let Some(mut found) = forward_from(child, registry, needle, None, mask) {
                found.insert(0, index);
                return Some(found);
            }
        }
    }
    None
}

fn backward_from(
    model: &Model,
    registry: &ModelRegistry,
    needle: &str,
    before: Option<&[usize]>,
    mask: u32,
) -> Option<Vec<usize>> {
    let lines = &model.lines[..model.active_lines.min(model.lines.len())];
    let resume = match before {
        Some(path) if !path.is_empty() => {
            let index = path[0];
            let rest = &path[1..];
            if !rest.is_empty() {
                // Still inside the subtree: earlier matches there come
                // first, then the referencing line itself
                if let Some(child) = lines.get(index).and_then(|l| referenced(l, registry)) {
                    if let Some(mut found) =
                        backward_from(child, registry, needle, Some(rest), mask)
                    {
                        found.insert(0, index);
                        return Some(found);
                    }
                }
                if let Some(line) = lines.get(index) {
                    if matches(line, needle, mask) {
                        return Some(vec![index]);
                    }
                }
            }
            index.min(lines.len())
        }
        _ => lines.len(),
    };
    for index in (0..resume).rev() {
        let line = &lines[index];
        if let Some(child) = referenced(line, registry) {
            if let Some(mut found) = backward_from(child, registry, needle, None, mask) {
                found.insert(0, index);
                return Some(found);
            }
        }
        if matches(line, needle, mask) {
            return Some(vec![index]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{classify, Line};

    fn model_from(name: &str, lines: &[&str]) -> Model {
        let mut model = Model::new(name);
        for (offset, text) in lines.iter().enumerate() {
            let kind = classify(text).unwrap_or(LineKind::Invalid);
            model.lines.push(Line::new(name, offset + 1, *text, kind));
        }
        model.active_lines = model.lines.len();
        model
    }

    fn linked(model: &mut Model, index: usize, key: &str) {
        if let LineKind::PartRef(ref mut part) = model.lines[index].kind {
            part.resolved = Some(key.to_string());
        }
    }

    #[test]
    fn finds_first_match_from_top() {
        let model = model_from("a.ldr", &["0 red brick", "0 blue brick"]);
        let registry = ModelRegistry::new();
        let path = search_forward(&model, &registry, "BRICK", None, None, MATCH_ALL);
        assert_eq!(path, Some(vec![0]));
    }

    #[test]
    fn resumes_after_previous_match() {
        let model = model_from("a.ldr", &["0 brick", "0 plate", "0 brick"]);
        let registry = ModelRegistry::new();
        let path = search_forward(&model, &registry, "brick", Some(&[0]), None, MATCH_ALL);
        assert_eq!(path, Some(vec![2]));
    }

    #[test]
    fn descends_into_references() {
        let mut registry = ModelRegistry::new();
        registry.insert(
            "sub.ldr".to_string(),
            model_from("sub.ldr", &["0 hidden treasure"]),
        );
        let mut main = model_from("main.ldr", &["1 16 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr"]);
        linked(&mut main, 0, "sub.ldr");

        let path = search_forward(&main, &registry, "treasure", None, None, MATCH_ALL);
        assert_eq!(path, Some(vec![0, 0]));
    }

    #[test]
    fn reference_line_is_visited_before_its_subtree() {
        let mut registry = ModelRegistry::new();
        registry.insert(
            "brick.dat".to_string(),
            model_from("brick.dat", &["0 brick interior"]),
        );
        let mut main = model_from("main.ldr", &["1 16 0 0 0 1 0 0 0 1 0 0 0 1 brick.dat"]);
        linked(&mut main, 0, "brick.dat");

        // The type 1 line matches on the file name first
        let first = search_forward(&main, &registry, "brick", None, None, MATCH_ALL);
        assert_eq!(first, Some(vec![0]));
        // Resuming from it enters the subtree
        let second = search_forward(&main, &registry, "brick", Some(&[0]), None, MATCH_ALL);
        assert_eq!(second, Some(vec![0, 0]));
    }

    #[test]
    fn backward_mirrors_forward() {
        let mut registry = ModelRegistry::new();
        registry.insert(
            "sub.ldr".to_string(),
            model_from("sub.ldr", &["0 target inner"]),
        );
        let mut main = model_from(
            "main.ldr",
            &[
                "0 target first",
                "1 16 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr",
                "0 target last",
            ],
        );
        linked(&mut main, 1, "sub.ldr");

        let last = search_backward(&main, &registry, "target", None, None, MATCH_ALL);
        assert_eq!(last, Some(vec![2]));
        let inner = search_backward(&main, &registry, "target", Some(&[2]), None, MATCH_ALL);
        assert_eq!(inner, Some(vec![1, 0]));
        let first = search_backward(&main, &registry, "target", Some(&[1, 0]), None, MATCH_ALL);
        assert_eq!(first, Some(vec![0]));
    }

    #[test]
    fn mask_filters_line_types() {
        let model = model_from(
            "a.ldr",
            &["0 edge comment", "2 16 0 0 0 1 1 1", "3 16 0 0 0 1 0 0 0 1 0"],
        );
        let registry = ModelRegistry::new();
        let path = search_forward(&model, &registry, "16", None, None, MATCH_TRIANGLES);
        assert_eq!(path, Some(vec![2]));
        assert_eq!(
            search_forward(&model, &registry, "edge", None, None, MATCH_LINES),
            None
        );
    }

    #[test]
    fn wraps_once_up_to_the_boundary() {
        let model = model_from("a.ldr", &["0 brick", "0 plate", "0 tile"]);
        let registry = ModelRegistry::new();

        // Nothing after line 2, wrap back to the earlier match
        let wrapped = search_forward(&model, &registry, "brick", Some(&[2]), Some(&[2]), MATCH_ALL);
        assert_eq!(wrapped, Some(vec![0]));

        // A match beyond the boundary stays hidden: everything after the
        // start position was already covered by the first pass
        let out_of_reach =
            search_forward(&model, &registry, "tile", Some(&[2]), Some(&[1]), MATCH_ALL);
        assert_eq!(out_of_reach, None);
    }

    #[test]
    fn no_wrap_without_boundary() {
        let model = model_from("a.ldr", &["0 brick"]);
        let registry = ModelRegistry::new();
        assert_eq!(
            search_forward(&model, &registry, "brick", Some(&[0]), None, MATCH_ALL),
            None
        );
    }

    #[test]
    fn empty_needle_never_matches() {
        let model = model_from("a.ldr", &["0 something"]);
        let registry = ModelRegistry::new();
        assert_eq!(
            search_forward(&model, &registry, "", None, None, MATCH_ALL),
            None
        );
    }
}
