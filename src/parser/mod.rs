//! Line-oriented parsing of LDraw documents
//!
//! A document is first split on its multi-part (MPD) markers into
//! sub-files, then each sub-file's lines are classified and run through
//! the parse state machines: BFC certification, texture-map scoping,
//! bounding-box-ignore scoping, step numbering and header capture.
//!
//! Parsing is purely textual: type 1 references are recorded but not
//! resolved here. The load session resolves them afterwards, which keeps
//! forward references inside a multi-part document cheap (every embedded
//! sub-file is registered before any reference is chased).

mod bfc;
mod meta;
mod texmap;

use crate::alert::{Alert, AlertChannel, AlertKind};
use crate::error::{Error, Result};
use crate::line::{self, Line, LineKind, Meta};
use crate::model::Model;
use crate::resolve::normalize_name;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bfc::BfcTracker;
use meta::MetaTracker;
use std::collections::VecDeque;
use std::sync::Arc;
use texmap::{Association, TexmapTracker};

/// Hook producing substitute text for a malformed line. Returning a
/// non-empty list splices the substitutes in directly after the original,
/// which is then marked replaced.
pub type ReplacementProvider = Arc<dyn Fn(&Line) -> Option<Vec<String>> + Send + Sync>;

/// One section of a split document: a whole single-model file, or the
/// span between two MPD markers
#[derive(Debug, Clone)]
pub struct SubFile {
    /// Name from the marker, or the supplied default for the main section
    pub name: String,
    /// 1-based physical line number of the section's first line
    pub start_line: usize,
    /// The section's lines, markers included
    pub lines: Vec<String>,
    /// True for a `!DATA` payload section
    pub is_data: bool,
    /// True when the name came from a marker line
    pub named_by_marker: bool,
}

/// An MPD framing marker
enum Marker {
    File(String),
    NoFile,
    Data(String),
}

/// Cheap marker sniff, run on every raw line during splitting
fn mpd_marker(text: &str) -> Option<Marker> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('0')?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let keyword_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let keyword = &rest[..keyword_end];
    let args = rest[keyword_end..].trim();
    match keyword.to_ascii_uppercase().as_str() {
        "FILE" if !args.is_empty() => Some(Marker::File(args.to_string())),
        "NOFILE" => Some(Marker::NoFile),
        "!DATA" if !args.is_empty() => Some(Marker::Data(args.to_string())),
        _ => None,
    }
}

/// Split a document on its MPD markers.
///
/// The first FILE marker names the main section, whose preceding lines it
/// keeps; every further marker opens a new sub-file consisting of the
/// lines up to the next marker. NOFILE closes the current sub-file and
/// drops any content before the next marker. Returns the sections in
/// document order (the main section first) and whether any marker was
/// seen at all.
pub fn split_document(text: &str, default_name: &str) -> (Vec<SubFile>, bool) {
    let mut sub_files: Vec<SubFile> = Vec::new();
    let mut current = Some(SubFile {
        name: default_name.to_string(),
        start_line: 1,
        lines: Vec::new(),
        is_data: false,
        named_by_marker: false,
    });
    let mut saw_marker = false;

    for (index, raw) in text.lines().enumerate() {
        let number = index + 1;
        match mpd_marker(raw) {
            Some(Marker::File(name)) => {
                match current.as_mut() {
                    Some(main) if !saw_marker => {
                        main.name = name;
                        main.named_by_marker = true;
                        main.lines.push(raw.to_string());
                    }
                    _ => {
                        if let Some(sub) = current.take() {
                            sub_files.push(sub);
                        }
                        current = Some(SubFile {
                            name,
                            start_line: number,
                            lines: vec![raw.to_string()],
                            is_data: false,
                            named_by_marker: true,
                        });
                    }
                }
                saw_marker = true;
            }
            Some(Marker::Data(name)) => {
                if let Some(sub) = current.take() {
                    sub_files.push(sub);
                }
                current = Some(SubFile {
                    name,
                    start_line: number,
                    lines: vec![raw.to_string()],
                    is_data: true,
                    named_by_marker: true,
                });
                saw_marker = true;
            }
            Some(Marker::NoFile) => {
                if let Some(mut sub) = current.take() {
                    sub.lines.push(raw.to_string());
                    sub_files.push(sub);
                }
            }
            None => {
                if let Some(ref mut sub) = current {
                    sub.lines.push(raw.to_string());
                }
            }
        }
    }
    if let Some(sub) = current.take() {
        sub_files.push(sub);
    }
    (sub_files, saw_marker)
}

/// A line awaiting classification; replacements re-enter here
struct Pending {
    number: usize,
    text: String,
    expanded: bool,
}

/// Parse one sub-file's lines into `model`.
///
/// `overlays` are caller-injected configuration lines, processed ahead of
/// the file's own content with line number 0 so geometry scans can skip
/// them. Fails only on cancellation; malformed content is reported
/// through `channel` and recovered per line.
pub fn parse_model(
    model: &mut Model,
    source: &SubFile,
    overlays: &[String],
    replacements: Option<&ReplacementProvider>,
    channel: &mut AlertChannel,
) -> Result<()> {
    if source.is_data {
        return parse_data_block(model, source, channel);
    }

    let label = file_label(model);
    let mut queue: VecDeque<Pending> =
        VecDeque::with_capacity(overlays.len() + source.lines.len());
    for text in overlays {
        queue.push_back(Pending {
            number: 0,
            text: text.clone(),
            expanded: false,
        });
    }
    for (offset, text) in source.lines.iter().enumerate() {
        queue.push_back(Pending {
            number: source.start_line + offset,
            text: text.clone(),
            expanded: false,
        });
    }
    model.active_lines = queue.len();

    let mut bfc = BfcTracker::new();
    let mut texmaps = TexmapTracker::new();
    let mut metas = MetaTracker::new(source.named_by_marker);
    let mut geometry_started = false;

    while let Some(pending) = queue.pop_front() {
        if channel.is_canceled() {
            return Err(Error::LoadCanceled);
        }
        let (kind, parse_failure) = match line::classify(&pending.text) {
            Ok(kind) => (kind, None),
            Err(error) => (LineKind::Invalid, Some(error)),
        };
        let mut record = Line::new(&label, pending.number, &pending.text, kind);
        let line_index = model.lines.len();

        if !record.is_action() {
            bfc.break_invert_next(&record, channel);
            texmaps.break_one_shot(&record, channel);
        }

        match &record.kind {
            LineKind::Comment(Meta::Bfc(commands)) => {
                bfc.apply(
                    commands,
                    model.is_part_like(),
                    geometry_started,
                    &record,
                    channel,
                );
            }
            LineKind::Comment(Meta::Texmap(command)) => {
                texmaps.apply(command, model, &record, channel);
            }
            LineKind::Comment(other) => {
                metas.apply(other, model, line_index, &record, channel);
            }
            LineKind::Empty | LineKind::Invalid => {}
            _ => {
                geometry_started = true;
                record.bfc = bfc.snapshot_for_action();
                record.step = Some(model.steps.len());
                record.bbox_ignore = metas.bbox_flag_for_action();
                match texmaps.association_for_action() {
                    Association::Textured(index) => {
                        record.texmap = Some(index);
                        model.texmaps[index].textured_lines.push(line_index);
                    }
                    Association::Fallback(index) => {
                        model.texmaps[index].fallback_lines.push(line_index);
                    }
                    Association::None => {}
                }
                if let LineKind::PartRef(ref part) = record.kind {
                    if normalize_name(&part.file).starts_with("stud") {
                        model.has_studs = true;
                    }
                }
            }
        }

        if let Some(error) = parse_failure {
            channel.emit(
                Alert::error(failure_kind(&pending.text), error.to_string()).with_origin(
                    &label,
                    pending.number,
                    &pending.text,
                ),
            );
            if !pending.expanded {
                if let Some(substitutes) = replacements.and_then(|provider| provider(&record)) {
                    if !substitutes.is_empty() {
                        record.replaced = true;
                        model.active_lines += substitutes.len();
                        for text in substitutes.into_iter().rev() {
                            queue.push_front(Pending {
                                number: pending.number,
                                text,
                                expanded: true,
                            });
                        }
                    }
                }
            }
        }

        model.lines.push(record);
    }

    bfc.finish(&label, channel);
    texmaps.finish(&label, channel);
    model.certification = bfc.certification();
    Ok(())
}

/// Parse a `!DATA` payload section: base64 rows are stripped of
/// non-alphabet characters, concatenated, and decoded once at the end
fn parse_data_block(model: &mut Model, source: &SubFile, channel: &mut AlertChannel) -> Result<()> {
    let label = file_label(model);
    let mut encoded = String::new();
    for (offset, text) in source.lines.iter().enumerate() {
        if channel.is_canceled() {
            return Err(Error::LoadCanceled);
        }
        let number = source.start_line + offset;
        let kind = match line::classify(text) {
            Ok(kind) => kind,
            Err(error) => {
                channel.emit(
                    Alert::error(AlertKind::Parse, error.to_string())
                        .with_origin(&label, number, text),
                );
                LineKind::Invalid
            }
        };
        let mut record = Line::new(&label, number, text, kind);
        if let LineKind::Comment(Meta::DataRow(row)) = &record.kind {
            encoded.extend(
                row.chars()
                    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')),
            );
        } else if record.is_action() {
            record.valid = false;
            channel.emit(
                Alert::error(AlertKind::Parse, "geometry inside a data block").with_origin(
                    &label, number, text,
                ),
            );
        }
        model.lines.push(record);
    }
    model.active_lines = model.lines.len();
    match BASE64.decode(encoded.as_bytes()) {
        Ok(bytes) => model.payload = Some(bytes),
        Err(error) => {
            channel.emit(Alert::error(
                AlertKind::Parse,
                format!("invalid base64 payload in {}: {}", label, error),
            ));
        }
    }
    Ok(())
}

/// Alert kind for a line that failed classification. Bad geometry is a
/// parse error; a recognized meta command with malformed arguments is
/// reported under its own subsystem. Plain comments never fail.
fn failure_kind(text: &str) -> AlertKind {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('0') else {
        return AlertKind::Parse;
    };
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return AlertKind::Parse;
    }
    let keyword = rest
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    match keyword.as_str() {
        "!TEXMAP" => AlertKind::Texmap,
        "BFC" => AlertKind::Bfc,
        "" => AlertKind::Parse,
        _ => AlertKind::MetaCommand,
    }
}

fn file_label(model: &Model) -> String {
    if model.display_name.is_empty() {
        model.name.clone()
    } else {
        model.display_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Severity;
    use crate::line::BfcCertification;

    fn parse_fixture(text: &str) -> (Model, AlertChannel) {
        let (sub_files, _) = split_document(text, "test.ldr");
        let mut model = Model::new("test.ldr");
        let mut channel = AlertChannel::new();
        parse_model(&mut model, &sub_files[0], &[], None, &mut channel).unwrap();
        (model, channel)
    }

    #[test]
    fn test_split_single_file() {
        let (sub_files, is_mpd) = split_document("0 Brick\n1 16 0 0 0 1 0 0 0 1 0 0 0 1 stud.dat\n", "3001.dat");
        assert!(!is_mpd);
        assert_eq!(sub_files.len(), 1);
        assert_eq!(sub_files[0].name, "3001.dat");
        assert_eq!(sub_files[0].lines.len(), 2);
        assert!(!sub_files[0].named_by_marker);
    }

    #[test]
    fn test_split_multi_part_document() {
        let text = "\
0 FILE main.ldr
0 Main model
1 16 0 0 0 1 0 0 0 1 0 0 0 1 body.ldr
0 NOFILE
0 this line is in no file
0 FILE body.ldr
0 Body
0 NOFILE
0 !DATA pattern.png
0 !: aGVsbG8=
";
        let (sub_files, is_mpd) = split_document(text, "input.mpd");
        assert!(is_mpd);
        assert_eq!(sub_files.len(), 3);

        assert_eq!(sub_files[0].name, "main.ldr");
        assert!(sub_files[0].named_by_marker);
        assert_eq!(sub_files[0].start_line, 1);
        // marker, comment, reference, NOFILE
        assert_eq!(sub_files[0].lines.len(), 4);

        assert_eq!(sub_files[1].name, "body.ldr");
        assert_eq!(sub_files[1].start_line, 6);
        assert!(!sub_files[1].is_data);

        assert_eq!(sub_files[2].name, "pattern.png");
        assert!(sub_files[2].is_data);
        assert_eq!(sub_files[2].start_line, 9);
    }

    #[test]
    fn test_split_preamble_stays_with_main() {
        let text = "0 preamble comment\n0 FILE main.ldr\n0 Main\n0 FILE sub.ldr\n0 Sub\n";
        let (sub_files, is_mpd) = split_document(text, "input.mpd");
        assert!(is_mpd);
        assert_eq!(sub_files.len(), 2);
        assert_eq!(sub_files[0].name, "main.ldr");
        assert_eq!(sub_files[0].lines.len(), 3);
        assert_eq!(sub_files[0].start_line, 1);
        assert_eq!(sub_files[1].name, "sub.ldr");
    }

    #[test]
    fn test_parse_header_and_steps() {
        let (model, channel) = parse_fixture(
            "\
0 Brick 2 x 4
0 Name: 3001.dat
0 Author: James Jessiman
1 16 0 0 0 1 0 0 0 1 0 0 0 1 stud.dat
0 STEP
2 24 0 0 0 1 1 1
0 ROTSTEP 0 90 0 ABS
2 24 0 0 0 2 2 2
",
        );
        assert!(channel.alerts().is_empty());
        assert_eq!(model.description.as_deref(), Some("Brick 2 x 4"));
        assert_eq!(model.display_name, "3001.dat");
        assert_eq!(model.author.as_deref(), Some("James Jessiman"));
        assert_eq!(model.steps, vec![4, 6]);
        assert_eq!(model.lines[3].step, Some(0));
        assert_eq!(model.lines[5].step, Some(1));
        assert_eq!(model.lines[7].step, Some(2));
        assert!(model.has_studs);
        assert_eq!(model.active_lines, 8);
    }

    #[test]
    fn test_parse_bfc_certification() {
        let (model, channel) = parse_fixture(
            "\
0 Part
0 BFC CERTIFY CCW
0 BFC INVERTNEXT
1 16 0 0 0 1 0 0 0 1 0 0 0 1 box.dat
3 16 0 0 0 1 0 0 0 1 0
",
        );
        assert!(channel.alerts().is_empty());
        assert_eq!(model.certification, BfcCertification::On);
        assert!(model.lines[3].bfc.invert_next);
        assert!(!model.lines[4].bfc.invert_next);
    }

    #[test]
    fn test_parse_texmap_sections() {
        let (model, channel) = parse_fixture(
            "\
0 !TEXMAP START PLANAR 0 0 0 1 0 0 0 1 0 pattern.png
3 16 0 0 0 1 0 0 0 1 0
0 !TEXMAP FALLBACK
3 16 0 0 0 1 0 0 0 1 0
0 !TEXMAP END
",
        );
        assert!(channel.alerts().is_empty());
        assert_eq!(model.texmaps.len(), 1);
        assert_eq!(model.texmaps[0].textured_lines, vec![1]);
        assert_eq!(model.texmaps[0].fallback_lines, vec![3]);
        assert_eq!(model.lines[1].texmap, Some(0));
        assert_eq!(model.lines[3].texmap, None);
    }

    #[test]
    fn test_parse_bbox_ignore_region() {
        let (model, channel) = parse_fixture(
            "\
0 !LDVIEW BBOX_IGNORE BEGIN
2 24 0 0 0 1 1 1
0 !LDVIEW BBOX_IGNORE END
2 24 0 0 0 2 2 2
",
        );
        assert!(channel.alerts().is_empty());
        assert!(model.lines[1].bbox_ignore);
        assert!(!model.lines[3].bbox_ignore);
    }

    #[test]
    fn test_bogus_texmap_projection_reports_texmap_error() {
        let (model, channel) = parse_fixture(
            "\
0 Part
0 !TEXMAP START BOGUS_TYPE 0 0 0 1 0 0 0 1 0 tex.png
3 16 0 0 0 1 0 0 0 1 0
",
        );
        assert_eq!(channel.alerts().len(), 1);
        assert_eq!(channel.alerts()[0].kind, AlertKind::Texmap);
        assert_eq!(channel.alerts()[0].severity, Severity::Error);
        assert!(!model.lines[1].valid);
        assert!(model.texmaps.is_empty());
        assert!(model.lines[2].valid);
        assert_eq!(model.lines[2].texmap, None);
    }

    #[test]
    fn test_malformed_line_is_recovered() {
        let (model, channel) = parse_fixture(
            "\
0 Part
3 16 not numbers at all
2 24 0 0 0 1 1 1
",
        );
        assert_eq!(channel.alerts().len(), 1);
        assert_eq!(channel.alerts()[0].severity, Severity::Error);
        let origin = channel.alerts()[0].origin.as_ref().unwrap();
        assert_eq!(origin.line_number, 2);
        assert!(!model.lines[1].valid);
        assert!(model.lines[2].valid);
    }

    #[test]
    fn test_replacement_lines_spliced_after_original() {
        let (sub_files, _) = split_document("0 header\n9 garbage\n2 24 0 0 0 1 1 1\n", "test.ldr");
        let mut model = Model::new("test.ldr");
        let mut channel = AlertChannel::new();
        let provider: ReplacementProvider = Arc::new(|line: &Line| {
            if line.text.starts_with('9') {
                Some(vec![
                    "2 24 0 0 0 5 5 5".to_string(),
                    "2 24 5 5 5 9 9 9".to_string(),
                ])
            } else {
                None
            }
        });
        parse_model(&mut model, &sub_files[0], &[], Some(&provider), &mut channel).unwrap();

        assert_eq!(model.lines.len(), 5);
        assert!(model.lines[1].replaced);
        assert!(!model.lines[1].valid);
        assert!(model.lines[2].valid);
        assert_eq!(model.lines[2].line_number, 2);
        assert_eq!(model.lines[3].line_number, 2);
        assert_eq!(model.lines[4].line_number, 3);
        assert_eq!(model.active_lines, 5);
    }

    #[test]
    fn test_overlay_lines_are_synthetic() {
        let (sub_files, _) = split_document("2 24 0 0 0 1 1 1\n", "test.ldr");
        let mut model = Model::new("test.ldr");
        let mut channel = AlertChannel::new();
        let overlays = vec!["2 24 0 0 0 9 9 9".to_string()];
        parse_model(&mut model, &sub_files[0], &overlays, None, &mut channel).unwrap();
        assert_eq!(model.lines.len(), 2);
        assert_eq!(model.lines[0].line_number, 0);
        assert_eq!(model.lines[1].line_number, 1);
    }

    #[test]
    fn test_data_block_decodes_payload() {
        let text = "0 FILE main.ldr\n0 Main\n0 !DATA note.bin\n0 !: aGVs\n0 !: bG8=\n";
        let (sub_files, _) = split_document(text, "input.mpd");
        let mut model = Model::new("note.bin");
        let mut channel = AlertChannel::new();
        parse_model(&mut model, &sub_files[1], &[], None, &mut channel).unwrap();
        assert!(channel.alerts().is_empty());
        assert_eq!(model.payload.as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn test_data_block_rejects_geometry() {
        let text = "0 !DATA bad.bin\n0 !: aGVsbG8=\n3 16 0 0 0 1 0 0 0 1 0\n";
        let (sub_files, _) = split_document(text, "input.mpd");
        let mut model = Model::new("bad.bin");
        let mut channel = AlertChannel::new();
        parse_model(&mut model, &sub_files[0], &[], None, &mut channel).unwrap();
        assert_eq!(channel.alerts().len(), 1);
        assert!(!model.lines[2].valid);
        assert_eq!(model.payload.as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn test_cancellation_stops_parsing() {
        let (sub_files, _) = split_document("0 a\n0 b\n", "test.ldr");
        let mut model = Model::new("test.ldr");
        let mut channel = AlertChannel::new();
        channel.cancel_handle().cancel();
        let result = parse_model(&mut model, &sub_files[0], &[], None, &mut channel);
        assert!(matches!(result, Err(Error::LoadCanceled)));
        assert!(model.lines.is_empty());
    }
}
