//! Contracts between the dashboard core and the terminal
//!
//! The core hands a fully built [`Screen`] to a [`RenderSink`] and reads key
//! presses from an [`InputSource`]. Neither side knows about borders,
//! colours or cursor positions; that is the sink's business.

use crate::error::Result;
use crate::toggle::ViewMode;
use serde::Serialize;
use std::time::SystemTime;

/// A key press, already decoded from the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Esc,
    /// Terminal was resized; the screen should be redrawn
    Resize,
}

/// Blocking source of key presses
pub trait InputSource {
    fn next_key(&mut self) -> Result<Key>;
}

/// A titled table of already formatted cells
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(title: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            title: title.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Widest cell of each column, headers included
    pub fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let len = cell.chars().count();
                match widths.get_mut(i) {
                    Some(width) => *width = (*width).max(len),
                    None => widths.push(len),
                }
            }
        }
        widths
    }
}

/// What the panels show
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Body {
    /// No snapshot has been published yet
    Loading(ViewMode),
    Utilization {
        by_process: Table,
        by_remote: Table,
        by_local: Table,
    },
    List(Table),
}

impl Body {
    /// Number of data rows across all tables
    pub fn row_count(&self) -> usize {
        match self {
            Body::Loading(_) => 0,
            Body::Utilization {
                by_process,
                by_remote,
                by_local,
            } => by_process.rows.len() + by_remote.rows.len() + by_local.rows.len(),
            Body::List(table) => table.rows.len(),
        }
    }
}

/// One complete frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Screen {
    pub header: String,
    pub body: Body,
    pub footer: String,
    /// Transient message shown in the footer
    pub status: Option<String>,
    /// Filter text being typed, when the prompt is open
    pub prompt: Option<String>,
    /// Render with the dimmed skin
    pub paused: bool,
    /// When the shown snapshot was published
    pub refreshed_at: Option<SystemTime>,
}

/// Something that can draw a [`Screen`]
///
/// Returning [`crate::DashnetError::TerminalTooSmall`] stops the dashboard.
pub trait RenderSink: Send {
    fn render(&mut self, screen: &Screen) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_widths() {
        let mut table = Table::new("Local", &["ADDRESS", "PORT"]);
        table.push_row(vec!["192.168.100.200".to_string(), "22".to_string()]);
        table.push_row(vec!["::1".to_string(), "postgresql".to_string()]);
        assert_eq!(table.column_widths(), vec![15, 10]);
    }

    #[test]
    fn test_row_count() {
        let mut list = Table::new("Connections", &["PROCESS"]);
        list.push_row(vec!["sshd".to_string()]);
        list.push_row(vec!["curl".to_string()]);
        assert_eq!(Body::List(list).row_count(), 2);
        assert_eq!(Body::Loading(ViewMode::List).row_count(), 0);
    }
}
