//! Terminal User Interface (TUI) for dashnet
//!
//! This module wires the dashboard core to a real terminal: crossterm
//! supplies key presses, ratatui draws the screens. The terminal is put in
//! raw mode on an alternate screen and restored on every exit path, the
//! fatal "terminal too small" one included.

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;

use crate::config::Config;
use crate::dashboard::{Dashboard, Timing};
use crate::error::{DashnetError, Result};
use crate::render::{InputSource, Key, RenderSink, Screen};
use crate::snapshot::SnapshotLoader;
use crate::toggle::Toggles;

mod ui;

pub use ui::{MIN_HEIGHT, MIN_WIDTH};

/// Render sink drawing on the terminal
pub struct TerminalSink {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSink {
    pub fn new() -> Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        Ok(Self {
            terminal: Terminal::new(backend)?,
        })
    }
}

impl RenderSink for TerminalSink {
    fn render(&mut self, screen: &Screen) -> Result<()> {
        let size = self.terminal.size()?;
        if size.width < MIN_WIDTH || size.height < MIN_HEIGHT {
            return Err(DashnetError::TerminalTooSmall {
                width: size.width,
                height: size.height,
                min_width: MIN_WIDTH,
                min_height: MIN_HEIGHT,
            });
        }

        self.terminal.draw(|f| ui::draw(f, screen))?;
        Ok(())
    }
}

/// Key presses read from the terminal
#[derive(Debug, Default)]
pub struct TerminalInput;

impl InputSource for TerminalInput {
    fn next_key(&mut self) -> Result<Key> {
        loop {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let mapped = match key.code {
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Key::Esc,
                        KeyCode::Char(c) => Key::Char(c),
                        KeyCode::Enter => Key::Enter,
                        KeyCode::Backspace => Key::Backspace,
                        KeyCode::Esc => Key::Esc,
                        _ => continue,
                    };
                    return Ok(mapped);
                }
                Event::Resize(_, _) => return Ok(Key::Resize),
                _ => {}
            }
        }
    }
}

fn setup_terminal() -> Result<()> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)?;
    Ok(())
}

/// Leave raw mode and the alternate screen
pub fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, cursor::Show)?;
    Ok(())
}

/// Run the dashboard until the user quits
pub fn run(config: &Config, loader: SnapshotLoader) -> Result<()> {
    setup_terminal()?;

    let res = run_dashboard(config, loader);

    restore_terminal()?;
    res
}

fn run_dashboard(config: &Config, loader: SnapshotLoader) -> Result<()> {
    let sink = TerminalSink::new()?;
    let dashboard = Dashboard::new(
        Arc::new(loader),
        Box::new(sink),
        Toggles::from_config(&config.display),
        Timing::from(&config.general),
    );
    dashboard.render()?;

    // the refresher is never joined; it dies with the process
    dashboard.spawn_refresher(|err| {
        if let Err(e) = restore_terminal() {
            log::error!("failed to restore terminal: {}", e);
        }
        eprintln!("Error: {}", err);
        std::process::exit(1);
    })?;

    dashboard.run_input(&mut TerminalInput)
}
