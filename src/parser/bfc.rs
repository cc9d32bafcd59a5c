//! BFC certification state machine
//!
//! Tracks the back-face-culling certification of one file while its lines
//! are parsed. The file starts out `Unknown`; the first `0 BFC` line
//! decides between `Off` (NOCERTIFY) and `On` (anything else, upgraded to
//! `ForcedOn` when the file is already classified as a part or sub-part).
//! A first BFC line arriving after geometry has started is a protocol
//! violation and forces `Off`.

use crate::alert::{Alert, AlertChannel, AlertKind};
use crate::line::{BfcCertification, BfcCommand, BfcSnapshot, Line, Winding};

pub(crate) struct BfcTracker {
    certification: BfcCertification,
    clip: bool,
    winding: Winding,
    invert_next: bool,
}

impl BfcTracker {
    pub fn new() -> Self {
        Self {
            certification: BfcCertification::Unknown,
            clip: true,
            winding: Winding::Ccw,
            invert_next: false,
        }
    }

    pub fn certification(&self) -> BfcCertification {
        self.certification
    }

    /// Apply the directives of one `0 BFC ...` line
    pub fn apply(
        &mut self,
        commands: &[BfcCommand],
        part_like: bool,
        geometry_started: bool,
        line: &Line,
        channel: &mut AlertChannel,
    ) {
        if self.certification == BfcCertification::Unknown {
            if geometry_started {
                channel.emit(located(
                    Alert::error(AlertKind::Bfc, "BFC command after geometry has started"),
                    line,
                ));
                self.certification = BfcCertification::Off;
                return;
            }
            if commands.iter().any(|c| matches!(c, BfcCommand::NoCertify)) {
                self.certification = BfcCertification::Off;
                if commands.iter().any(|c| matches!(c, BfcCommand::Certify(_))) {
                    channel.emit(located(
                        Alert::error(AlertKind::Bfc, "CERTIFY and NOCERTIFY on the same line"),
                        line,
                    ));
                }
                return;
            }
            self.certification = if part_like {
                BfcCertification::ForcedOn
            } else {
                BfcCertification::On
            };
            self.process(commands, true, line, channel);
            return;
        }
        if self.certification == BfcCertification::Off {
            channel.emit(located(
                Alert::error(AlertKind::Bfc, "BFC command after NOCERTIFY"),
                line,
            ));
            return;
        }
        self.process(commands, false, line, channel);
    }

    /// Process directives while certified. `first_line` marks the line
    /// that established certification, whose own CERTIFY is not redundant.
    fn process(
        &mut self,
        commands: &[BfcCommand],
        first_line: bool,
        line: &Line,
        channel: &mut AlertChannel,
    ) {
        let mut line_clip: Option<bool> = None;
        let mut line_winding: Option<Winding> = None;
        let mut certified_here = false;
        for command in commands {
            match command {
                BfcCommand::Certify(winding) => {
                    if !first_line || certified_here {
                        channel.emit(located(
                            Alert::warning(
                                AlertKind::Bfc,
                                "redundant CERTIFY in an already certified file",
                            ),
                            line,
                        ));
                    }
                    certified_here = true;
                    if let Some(w) = winding {
                        self.set_winding(*w, &mut line_winding, line, channel);
                    }
                }
                BfcCommand::NoCertify => {
                    channel.emit(located(
                        Alert::error(AlertKind::Bfc, "NOCERTIFY in an already certified file"),
                        line,
                    ));
                }
                BfcCommand::Clip(winding) => {
                    if line_clip == Some(false) {
                        channel.emit(located(
                            Alert::error(AlertKind::Bfc, "CLIP and NOCLIP on the same line"),
                            line,
                        ));
                    }
                    line_clip = Some(true);
                    self.clip = true;
                    if let Some(w) = winding {
                        self.set_winding(*w, &mut line_winding, line, channel);
                    }
                }
                BfcCommand::NoClip => {
                    if line_clip == Some(true) {
                        channel.emit(located(
                            Alert::error(AlertKind::Bfc, "CLIP and NOCLIP on the same line"),
                            line,
                        ));
                    }
                    line_clip = Some(false);
                    self.clip = false;
                }
                BfcCommand::Winding(w) => self.set_winding(*w, &mut line_winding, line, channel),
                BfcCommand::InvertNext => self.invert_next = true,
            }
        }
    }

    fn set_winding(
        &mut self,
        winding: Winding,
        seen_on_line: &mut Option<Winding>,
        line: &Line,
        channel: &mut AlertChannel,
    ) {
        if let Some(previous) = *seen_on_line {
            if previous != winding {
                channel.emit(located(
                    Alert::error(AlertKind::Bfc, "CCW and CW on the same line"),
                    line,
                ));
            }
        }
        *seen_on_line = Some(winding);
        self.winding = winding;
    }

    /// Snapshot the state for an action line, consuming a pending
    /// INVERTNEXT
    pub fn snapshot_for_action(&mut self) -> BfcSnapshot {
        let snapshot = BfcSnapshot {
            certification: self.certification,
            clip: self.clip,
            winding: self.winding,
            invert_next: self.invert_next,
        };
        self.invert_next = false;
        snapshot
    }

    /// A non-action line interrupts a pending INVERTNEXT
    pub fn break_invert_next(&mut self, line: &Line, channel: &mut AlertChannel) {
        if self.invert_next {
            self.invert_next = false;
            channel.emit(located(
                Alert::error(AlertKind::Bfc, "INVERTNEXT with nothing to invert"),
                line,
            ));
        }
    }

    /// End-of-file check for a dangling INVERTNEXT
    pub fn finish(&mut self, file: &str, channel: &mut AlertChannel) {
        if self.invert_next {
            self.invert_next = false;
            channel.emit(Alert::error(
                AlertKind::Bfc,
                format!("INVERTNEXT with nothing to invert at end of {}", file),
            ));
        }
    }
}

fn located(alert: Alert, line: &Line) -> Alert {
    alert.with_origin(&line.file, line.line_number, &line.text)
}
