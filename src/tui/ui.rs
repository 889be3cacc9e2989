//! Screen drawing
//!
//! Layout:
//! - Header: title, row total and time of the last refresh
//! - Utilization view: traffic by process | by remote address, then by local address
//! - List view: one table of connections
//! - Footer: key help, the filter prompt or a transient status message

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table},
    Frame,
};

use crate::render::{Body, Screen, Table as TextTable};
use crate::toggle::ViewMode;

/// Smallest terminal the utilization layout fits in
pub const MIN_WIDTH: u16 = 80;
pub const MIN_HEIGHT: u16 = 20;

/// Colour skin; the dimmed one is used while paused
#[derive(Debug, Clone, Copy)]
struct Skin {
    title: Color,
    text: Color,
    border: Color,
    accent: Color,
}

const DEFAULT_SKIN: Skin = Skin {
    title: Color::Yellow,
    text: Color::White,
    border: Color::Gray,
    accent: Color::Cyan,
};

const PAUSED_SKIN: Skin = Skin {
    title: Color::DarkGray,
    text: Color::Gray,
    border: Color::DarkGray,
    accent: Color::DarkGray,
};

fn skin(screen: &Screen) -> Skin {
    if screen.paused {
        PAUSED_SKIN
    } else {
        DEFAULT_SKIN
    }
}

pub fn draw(f: &mut Frame, screen: &Screen) {
    let skin = skin(screen);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(5),    // Panels
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    draw_header(f, screen, skin, chunks[0]);
    match &screen.body {
        Body::Loading(view) => draw_loading(f, *view, skin, chunks[1]),
        Body::Utilization {
            by_process,
            by_remote,
            by_local,
        } => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(chunks[1]);
            let top = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
                .split(rows[0]);

            draw_table(f, by_process, skin, top[0]);
            draw_table(f, by_remote, skin, top[1]);
            draw_table(f, by_local, skin, rows[1]);
        }
        Body::List(table) => draw_table(f, table, skin, chunks[1]),
    }
    draw_footer(f, screen, skin, chunks[2]);
}

fn draw_header(f: &mut Frame, screen: &Screen, skin: Skin, area: Rect) {
    let mut spans = vec![Span::styled(
        screen.header.as_str(),
        Style::default().fg(skin.title).add_modifier(Modifier::BOLD),
    )];

    if !matches!(screen.body, Body::Loading(_)) {
        spans.push(Span::styled("  │  ", Style::default().fg(skin.border)));
        spans.push(Span::styled(
            format!("{} rows", screen.body.row_count()),
            Style::default().fg(skin.text),
        ));
    }

    if let Some(at) = screen.refreshed_at {
        let local: chrono::DateTime<chrono::Local> = at.into();
        spans.push(Span::styled("  │  ", Style::default().fg(skin.border)));
        spans.push(Span::styled(
            format!("refreshed {}", local.format("%H:%M:%S")),
            Style::default().fg(skin.text),
        ));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(skin.border)))
        .alignment(Alignment::Left);
    f.render_widget(header, area);
}

fn draw_loading(f: &mut Frame, view: ViewMode, skin: Skin, area: Rect) {
    let title = match view {
        ViewMode::Utilization => " Utilization ",
        ViewMode::List => " Connections ",
    };
    let loading = Paragraph::new("Loading...")
        .style(Style::default().fg(skin.text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(skin.border))
                .title(Span::styled(title, Style::default().fg(skin.title))),
        )
        .alignment(Alignment::Center);
    f.render_widget(loading, area);
}

fn draw_table(f: &mut Frame, table: &TextTable, skin: Skin, area: Rect) {
    let header_style = Style::default()
        .fg(skin.accent)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let header = Row::new(table.headers.iter().map(|h| Span::styled(h.as_str(), header_style)));

    let rows: Vec<Row> = table
        .rows
        .iter()
        .map(|row| Row::new(row.iter().map(|cell| cell.as_str())).style(Style::default().fg(skin.text)))
        .collect();

    let widths = column_constraints(&table.column_widths());

    let widget = Table::new(rows, widths).header(header).column_spacing(2).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(skin.border))
            .title(Span::styled(
                format!(" {} ", table.title),
                Style::default().fg(skin.title).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(widget, area);
}

/// Fixed widths for every column but the last, which takes the rest
fn column_constraints(widths: &[usize]) -> Vec<Constraint> {
    let last = widths.len().saturating_sub(1);
    widths
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i == last {
                Constraint::Min(u16::try_from(*w).unwrap_or(u16::MAX))
            } else {
                Constraint::Length(u16::try_from(*w).unwrap_or(u16::MAX))
            }
        })
        .collect()
}

fn draw_footer(f: &mut Frame, screen: &Screen, skin: Skin, area: Rect) {
    let line = if let Some(status) = &screen.status {
        Line::from(Span::styled(
            status.as_str(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
    } else if let Some(prompt) = &screen.prompt {
        Line::from(vec![
            Span::styled("Filter: ", Style::default().fg(skin.accent).add_modifier(Modifier::BOLD)),
            Span::raw(prompt.as_str()),
            Span::styled("█", Style::default().fg(skin.accent).add_modifier(Modifier::SLOW_BLINK)),
        ])
    } else {
        Line::from(Span::styled(screen.footer.as_str(), Style::default().fg(skin.text)))
    };

    let alignment = if screen.prompt.is_some() && screen.status.is_none() {
        Alignment::Left
    } else {
        Alignment::Center
    };

    let footer = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(skin.border)))
        .alignment(alignment);
    f.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn screen(body: Body) -> Screen {
        Screen {
            header: "TCP/UDP Connections".to_string(),
            body,
            footer: "[V]iews".to_string(),
            status: None,
            prompt: None,
            paused: false,
            refreshed_at: None,
        }
    }

    fn text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        buffer.content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn test_column_constraints() {
        assert_eq!(
            column_constraints(&[7, 4, 11]),
            vec![Constraint::Length(7), Constraint::Length(4), Constraint::Min(11)]
        );
        assert!(column_constraints(&[]).is_empty());
    }

    #[test]
    fn test_draw_loading() {
        let mut terminal = Terminal::new(TestBackend::new(MIN_WIDTH, MIN_HEIGHT)).unwrap();
        terminal
            .draw(|f| draw(f, &screen(Body::Loading(ViewMode::Utilization))))
            .unwrap();
        assert!(text(&terminal).contains("Loading..."));
    }

    #[test]
    fn test_draw_list_and_prompt() {
        let mut table = TextTable::new("TCP/UDP connections", &["PROCESS", "LOCAL ADDRESS"]);
        table.push_row(vec!["sshd".to_string(), "0.0.0.0".to_string()]);
        let mut s = screen(Body::List(table));
        s.prompt = Some("ssh".to_string());

        let mut terminal = Terminal::new(TestBackend::new(MIN_WIDTH, MIN_HEIGHT)).unwrap();
        terminal.draw(|f| draw(f, &s)).unwrap();

        let out = text(&terminal);
        assert!(out.contains("sshd"));
        assert!(out.contains("1 rows"));
        assert!(out.contains("Filter: ssh"));
    }
}
