//! Live regex filter
//!
//! The filter is a three state machine driven by the text typed at the
//! filter prompt:
//!
//! | input                        | next state |
//! |------------------------------|------------|
//! | same text as stored, any case| `Idle`     |
//! | empty text                   | `Clear`    |
//! | anything else, compiles      | `Apply`    |
//! | anything else, invalid regex | unchanged  |
//!
//! `Apply` asks the caller to prune every snapshot it renders. `Clear` asks
//! it to throw the current snapshot away, load an unfiltered one and then
//! call [`RegexFilter::reset`].
//!
//! Patterns match case-insensitively.

use crate::error::{DashnetError, Result};
use regex::{Regex, RegexBuilder};

/// What the caller must do with the current snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterState {
    /// Nothing
    #[default]
    Idle,
    /// Reload an unfiltered snapshot, then reset
    Clear,
    /// Filter the snapshot with [`RegexFilter::pattern`]
    Apply,
}

#[derive(Debug, Clone, Default)]
pub struct RegexFilter {
    text: String,
    pattern: Option<Regex>,
    state: FilterState,
}

impl RegexFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the text submitted at the prompt
    ///
    /// An invalid pattern returns [`DashnetError::InvalidFilter`] and leaves
    /// the filter exactly as it was.
    pub fn handle_input(&mut self, text: &str) -> Result<FilterState> {
        if text.to_lowercase() == self.text.to_lowercase() {
            self.state = FilterState::Idle;
        } else if text.is_empty() {
            self.text.clear();
            self.pattern = None;
            self.state = FilterState::Clear;
        } else {
            let pattern = RegexBuilder::new(text)
                .case_insensitive(true)
                .build()
                .map_err(|source| DashnetError::InvalidFilter {
                    pattern: text.to_string(),
                    source,
                })?;
            self.text = text.to_string();
            self.pattern = Some(pattern);
            self.state = FilterState::Apply;
        }
        Ok(self.state)
    }

    /// Forget the stored text and go back to `Idle`
    pub fn reset(&mut self) {
        self.text.clear();
        self.pattern = None;
        self.state = FilterState::Idle;
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Last accepted filter text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Compiled pattern while the filter is applied
    pub fn pattern(&self) -> Option<&Regex> {
        match self.state {
            FilterState::Apply => self.pattern.as_ref(),
            _ => None,
        }
    }
}
