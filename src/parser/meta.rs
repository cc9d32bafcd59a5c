//! Effects of header and bookkeeping meta-commands
//!
//! Applies classified type 0 lines to the owning model: header fields,
//! classification flags, step boundaries and bounding-box-ignore scoping.
//! BFC and texmap commands are handled by their own trackers.

use crate::alert::{Alert, AlertChannel, AlertKind};
use crate::line::{BBoxIgnore, Line, Meta, PartKind};
use crate::model::Model;

pub(crate) struct MetaTracker {
    name_locked: bool,
    bbox_region: bool,
    bbox_one_shot: bool,
}

impl MetaTracker {
    /// `name_from_marker` suppresses `0 Name:` headers for embedded
    /// sub-files, whose name is authoritative from the FILE marker
    pub fn new(name_from_marker: bool) -> Self {
        Self {
            name_locked: name_from_marker,
            bbox_region: false,
            bbox_one_shot: false,
        }
    }

    pub fn apply(
        &mut self,
        meta: &Meta,
        model: &mut Model,
        line_index: usize,
        line: &Line,
        channel: &mut AlertChannel,
    ) {
        match meta {
            Meta::Step | Meta::RotStep(_) => model.steps.push(line_index),
            Meta::Name(name) => {
                if !self.name_locked && !name.is_empty() {
                    model.display_name = name.clone();
                    self.name_locked = true;
                }
            }
            Meta::Author(author) => {
                if model.author.is_none() && !author.is_empty() {
                    model.author = Some(author.clone());
                }
            }
            Meta::Classification(class) => {
                match class.kind {
                    Some(PartKind::Part) => model.is_part = true,
                    Some(PartKind::SubPart) => model.is_sub_part = true,
                    Some(PartKind::Primitive) => model.is_primitive = true,
                    None => {}
                }
                match class.official {
                    Some(true) => model.is_official = true,
                    Some(false) => model.is_unofficial = true,
                    None => {}
                }
            }
            Meta::NoShrink => model.no_shrink = true,
            Meta::BBoxIgnore(BBoxIgnore::Begin) => self.bbox_region = true,
            Meta::BBoxIgnore(BBoxIgnore::Next) => self.bbox_one_shot = true,
            Meta::BBoxIgnore(BBoxIgnore::End) => {
                if !self.bbox_region {
                    channel.emit(
                        Alert::warning(AlertKind::MetaCommand, "BBOX_IGNORE END without BEGIN")
                            .with_origin(&line.file, line.line_number, &line.text),
                    );
                }
                self.bbox_region = false;
            }
            Meta::Comment(text) => {
                if model.description.is_none() && !text.is_empty() {
                    model.description = Some(text.clone());
                }
            }
            Meta::DataRow(_) => {
                channel.emit(
                    Alert::warning(
                        AlertKind::MetaCommand,
                        "base64 data row outside a data block",
                    )
                    .with_origin(&line.file, line.line_number, &line.text),
                );
            }
            // framing is resolved by the document splitter; BFC and texmap
            // commands go through their trackers
            Meta::FileMarker(_)
            | Meta::NoFile
            | Meta::Data(_)
            | Meta::LdCad(_)
            | Meta::Bfc(_)
            | Meta::Texmap(_) => {}
        }
    }

    /// Ignore flag for an action line, consuming a pending NEXT
    pub fn bbox_flag_for_action(&mut self) -> bool {
        if self.bbox_one_shot {
            self.bbox_one_shot = false;
            return true;
        }
        self.bbox_region
    }
}
