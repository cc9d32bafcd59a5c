//! Texture-map scope tracking
//!
//! `0 !TEXMAP START` opens a scope whose action lines receive the texture;
//! `FALLBACK` switches to the untextured substitute geometry; `END`
//! closes. `NEXT` textures exactly the line that follows it. Nesting is
//! not permitted; a violation is reported and force-closes the open scope
//! before the new command takes effect.

use crate::alert::{Alert, AlertChannel, AlertKind};
use crate::line::{Line, TexmapCommand};
use crate::model::{Model, ModelTexmap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeState {
    Inactive,
    Started,
    Fallback,
}

/// Which texture section an action line lands in
pub(crate) enum Association {
    None,
    Textured(usize),
    Fallback(usize),
}

pub(crate) struct TexmapTracker {
    state: ScopeState,
    current: Option<usize>,
    one_shot: Option<usize>,
}

impl TexmapTracker {
    pub fn new() -> Self {
        Self {
            state: ScopeState::Inactive,
            current: None,
            one_shot: None,
        }
    }

    /// Apply one `0 !TEXMAP ...` command
    pub fn apply(
        &mut self,
        command: &TexmapCommand,
        model: &mut Model,
        line: &Line,
        channel: &mut AlertChannel,
    ) {
        match command {
            TexmapCommand::Start(spec) => {
                self.close_if_nested("START", line, channel);
                model.texmaps.push(ModelTexmap::new(spec.clone()));
                self.current = Some(model.texmaps.len() - 1);
                self.state = ScopeState::Started;
            }
            TexmapCommand::Next(spec) => {
                self.close_if_nested("NEXT", line, channel);
                model.texmaps.push(ModelTexmap::new(spec.clone()));
                self.one_shot = Some(model.texmaps.len() - 1);
            }
            TexmapCommand::Fallback => match self.state {
                ScopeState::Started => self.state = ScopeState::Fallback,
                ScopeState::Fallback => {
                    channel.emit(located(
                        Alert::error(AlertKind::Texmap, "second FALLBACK in a texture scope"),
                        line,
                    ));
                    self.force_close();
                }
                ScopeState::Inactive => {
                    channel.emit(located(
                        Alert::error(AlertKind::Texmap, "FALLBACK outside a texture scope"),
                        line,
                    ));
                }
            },
            TexmapCommand::End => {
                if self.state == ScopeState::Inactive && self.one_shot.is_none() {
                    channel.emit(located(
                        Alert::error(AlertKind::Texmap, "TEXMAP END outside a texture scope"),
                        line,
                    ));
                }
                self.force_close();
            }
        }
    }

    fn close_if_nested(&mut self, command: &str, line: &Line, channel: &mut AlertChannel) {
        if self.state != ScopeState::Inactive || self.one_shot.is_some() {
            channel.emit(located(
                Alert::error(
                    AlertKind::Texmap,
                    format!("TEXMAP {} inside an open texture scope", command),
                ),
                line,
            ));
            self.force_close();
        }
    }

    fn force_close(&mut self) {
        self.state = ScopeState::Inactive;
        self.current = None;
        self.one_shot = None;
    }

    /// Section membership for an action line, consuming a pending NEXT
    pub fn association_for_action(&mut self) -> Association {
        if let Some(index) = self.one_shot.take() {
            return Association::Textured(index);
        }
        match (self.state, self.current) {
            (ScopeState::Started, Some(index)) => Association::Textured(index),
            (ScopeState::Fallback, Some(index)) => Association::Fallback(index),
            _ => Association::None,
        }
    }

    /// A non-action line interrupts a pending NEXT
    pub fn break_one_shot(&mut self, line: &Line, channel: &mut AlertChannel) {
        if self.one_shot.take().is_some() {
            channel.emit(located(
                Alert::error(AlertKind::Texmap, "TEXMAP NEXT not followed by an action line"),
                line,
            ));
        }
    }

    /// End-of-file check for an unterminated scope
    pub fn finish(&mut self, file: &str, channel: &mut AlertChannel) {
        if self.state != ScopeState::Inactive {
            channel.emit(Alert::error(
                AlertKind::Texmap,
                format!("texture scope left open at end of {}", file),
            ));
        } else if self.one_shot.is_some() {
            channel.emit(Alert::error(
                AlertKind::Texmap,
                format!("TEXMAP NEXT without a following line at end of {}", file),
            ));
        }
        self.force_close();
    }
}

fn located(alert: Alert, line: &Line) -> Alert {
    alert.with_origin(&line.file, line.line_number, &line.text)
}
