//! Conditional-compilation state. Two kinds of frame share one stack
//! so the "current state" seen by a directive is always the innermost
//! open construct; symbol frames gate processing, language frames gate
//! backend fan-out.

use crate::error::SdlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolState {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LangState {
    If,
    Else,
}

#[derive(Debug)]
enum Frame {
    Symbol {
        state: SymbolState,
        /// Processing state outside this construct.
        outer: bool,
        /// Some branch of this construct already ran.
        taken: bool,
        /// The branch being read right now is live.
        live: bool,
    },
    Lang {
        state: LangState,
        /// Enable vector before the construct opened.
        saved: Vec<bool>,
        /// Enables selected by the `if` branch.
        if_mask: Vec<bool>,
    },
}

#[derive(Debug)]
pub struct Conditionals {
    frames: Vec<Frame>,
    lang_enabled: Vec<bool>,
    processing: bool,
}

impl Conditionals {
    pub fn new(language_count: usize) -> Self {
        Self {
            frames: Vec::new(),
            lang_enabled: vec![true; language_count],
            processing: true,
        }
    }

    /// The symbol gate: when false, dispatcher entries return without
    /// mutating state or emitting.
    pub fn processing(&self) -> bool {
        self.processing
    }

    /// The per-language gate for backend fan-out.
    pub fn lang_enabled(&self) -> &[bool] {
        &self.lang_enabled
    }

    pub fn open_depth(&self) -> usize {
        self.frames.len()
    }

    fn recompute_processing(&mut self) {
        self.processing = self
            .frames
            .iter()
            .rev()
            .find_map(|f| match f {
                Frame::Symbol { live, .. } => Some(*live),
                Frame::Lang { .. } => None,
            })
            .unwrap_or(true);
    }

    pub fn if_symbol(&mut self, value: bool) -> Result<(), SdlError> {
        // a new symbol conditional may not open inside an unfinished
        // if/else-if branch
        if matches!(
            self.frames.last(),
            Some(Frame::Symbol {
                state: SymbolState::If | SymbolState::ElseIf,
                ..
            })
        ) {
            return Err(SdlError::InvalidConditionalState {
                directive: "if-symbol",
            });
        }
        let outer = self.processing;
        let live = outer && value;
        self.frames.push(Frame::Symbol {
            state: SymbolState::If,
            outer,
            taken: live,
            live,
        });
        self.recompute_processing();
        Ok(())
    }

    pub fn else_if_symbol(&mut self, value: bool) -> Result<(), SdlError> {
        match self.frames.last_mut() {
            Some(Frame::Symbol {
                state: state @ (SymbolState::If | SymbolState::ElseIf),
                outer,
                taken,
                live,
            }) => {
                *state = SymbolState::ElseIf;
                *live = *outer && !*taken && value;
                *taken |= *live;
                self.recompute_processing();
                Ok(())
            }
            _ => Err(SdlError::InvalidConditionalState {
                directive: "else-if",
            }),
        }
    }

    pub fn else_branch(&mut self) -> Result<(), SdlError> {
        match self.frames.last_mut() {
            Some(Frame::Symbol {
                state: state @ (SymbolState::If | SymbolState::ElseIf),
                outer,
                taken,
                live,
            }) => {
                *state = SymbolState::Else;
                *live = *outer && !*taken;
                *taken = true;
                self.recompute_processing();
                Ok(())
            }
            Some(Frame::Lang {
                state: state @ LangState::If,
                saved,
                if_mask,
            }) => {
                *state = LangState::Else;
                let flipped: Vec<bool> = saved
                    .iter()
                    .zip(if_mask.iter())
                    .map(|(s, m)| *s && !*m)
                    .collect();
                self.lang_enabled = flipped;
                Ok(())
            }
            _ => Err(SdlError::InvalidConditionalState {
                directive: "else",
            }),
        }
    }

    pub fn end_if_symbol(&mut self) -> Result<(), SdlError> {
        match self.frames.last() {
            Some(Frame::Symbol { .. }) => {
                self.frames.pop();
                self.recompute_processing();
                Ok(())
            }
            _ => Err(SdlError::InvalidConditionalState {
                directive: "end-if-symbol",
            }),
        }
    }

    /// `language` is the index of the named backend, or `None` when no
    /// backend matches (the branch then enables nothing).
    pub fn if_language(
        &mut self,
        language: Option<usize>,
    ) -> Result<(), SdlError> {
        let saved = self.lang_enabled.clone();
        let if_mask: Vec<bool> = (0..saved.len())
            .map(|i| Some(i) == language)
            .collect();
        self.lang_enabled = saved
            .iter()
            .zip(if_mask.iter())
            .map(|(s, m)| *s && *m)
            .collect();
        self.frames.push(Frame::Lang {
            state: LangState::If,
            saved,
            if_mask,
        });
        Ok(())
    }

    pub fn end_if_language(&mut self) -> Result<(), SdlError> {
        match self.frames.last() {
            Some(Frame::Lang { .. }) => {
                let Some(Frame::Lang { saved, .. }) = self.frames.pop()
                else {
                    unreachable!();
                };
                self.lang_enabled = saved;
                Ok(())
            }
            _ => Err(SdlError::InvalidConditionalState {
                directive: "end-if-language",
            }),
        }
    }
}
