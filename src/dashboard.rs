//! Refresh scheduling and input handling
//!
//! Two threads share one [`parking_lot::Mutex`]:
//!
//! - the foreground loop ([`Dashboard::run_input`]) blocks on key presses and
//!   updates toggles or the filter under the lock, then re-renders;
//! - the background loop ([`Dashboard::spawn_refresher`]) sleeps, loads a new
//!   snapshot without the lock, then waits a bounded time for the lock to
//!   publish and render it. When the wait runs out the snapshot is dropped and
//!   the next tick tries again.
//!
//! Snapshot reads, filter pruning and rendering all happen under the lock.

use crate::config::GeneralConfig;
use crate::error::{DashnetError, Result};
use crate::filter::{FilterState, RegexFilter};
use crate::render::{Body, InputSource, Key, RenderSink, Screen};
use crate::snapshot::{Snapshot, SnapshotLoader};
use crate::toggle::{Command, Toggles, ViewMode};
use crate::views::{self, TextOpts};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

/// Outcome of one background tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// A new snapshot is shown
    Published,
    /// Paused; nothing was loaded or the load was discarded
    Paused,
    /// The lock was busy past the publish timeout
    Contended,
}

/// Timing of the refresh loop
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub refresh_interval: Duration,
    pub publish_timeout: Duration,
    pub status_ttl: Duration,
}

impl From<&GeneralConfig> for Timing {
    fn from(config: &GeneralConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            publish_timeout: config.publish_timeout(),
            status_ttl: config.status_message_ttl(),
        }
    }
}

struct Shared {
    snapshot: Option<Snapshot>,
    refreshed_at: Option<SystemTime>,
    toggles: Toggles,
    filter: RegexFilter,
    prompt: Option<String>,
    status: Option<(String, Instant)>,
    sink: Box<dyn RenderSink>,
}

impl Shared {
    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
    }

    fn status(&self, ttl: Duration) -> Option<&str> {
        match &self.status {
            Some((message, at)) if at.elapsed() < ttl => Some(message.as_str()),
            _ => None,
        }
    }

    /// Honour the filter state, then draw
    fn render(&mut self, loader: &SnapshotLoader, status_ttl: Duration) -> Result<()> {
        match self.filter.state() {
            FilterState::Apply => {
                if let (Some(snapshot), Some(pattern)) = (self.snapshot.as_mut(), self.filter.pattern()) {
                    snapshot.filter_by_regex(pattern);
                }
            }
            FilterState::Clear => {
                match loader.load() {
                    Ok(fresh) => {
                        self.snapshot = Some(fresh);
                        self.refreshed_at = Some(SystemTime::now());
                    }
                    Err(e) => {
                        log::warn!("reload after clearing the filter failed: {}", e);
                        self.set_status(format!("Reload failed: {}", e));
                        // the pruned snapshot no longer matches any filter
                        self.snapshot = None;
                    }
                }
                self.filter.reset();
            }
            FilterState::Idle => {}
        }

        let screen = self.screen(status_ttl);
        self.sink.render(&screen)
    }

    fn screen(&self, status_ttl: Duration) -> Screen {
        let opts = TextOpts {
            resolve_dns: self.toggles.dns.resolve(),
            resolve_service: self.toggles.service.resolve(),
        };

        let body = match (&self.snapshot, self.toggles.view) {
            (None, view) => Body::Loading(view),
            (Some(snapshot), ViewMode::Utilization) => Body::Utilization {
                by_process: views::process_table(snapshot),
                by_remote: views::remote_address_table(snapshot, opts),
                by_local: views::local_address_table(snapshot, opts),
            },
            (Some(snapshot), ViewMode::List) => Body::List(views::connections_table(snapshot, opts)),
        };

        let paused = self.toggles.pause.is_paused();
        let mut header = String::from("TCP/UDP Connections");
        if paused {
            header.push_str(" (Paused)");
        }
        if self.filter.state() == FilterState::Apply {
            header.push_str(&format!(" [filter: {}]", self.filter.text()));
        }

        let footer = format!(
            "[V]iews  {}  [D]NS Resolution  [S]ervice Resolution  [/]Filter  [Q]uit",
            if paused { "<SPACE> Resume" } else { "<SPACE> Pause" }
        );

        Screen {
            header,
            body,
            footer,
            status: self.status(status_ttl).map(str::to_string),
            prompt: self.prompt.clone(),
            paused,
            refreshed_at: self.refreshed_at,
        }
    }
}

/// Render errors other than fatal ones are logged and otherwise ignored
fn keep_going(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            log::warn!("render failed: {}", e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Shared dashboard state plus the loader feeding it
#[derive(Clone)]
pub struct Dashboard {
    shared: Arc<Mutex<Shared>>,
    loader: Arc<SnapshotLoader>,
    timing: Timing,
}

impl Dashboard {
    pub fn new(
        loader: Arc<SnapshotLoader>,
        sink: Box<dyn RenderSink>,
        toggles: Toggles,
        timing: Timing,
    ) -> Self {
        let shared = Shared {
            snapshot: None,
            refreshed_at: None,
            toggles,
            filter: RegexFilter::new(),
            prompt: None,
            status: None,
            sink,
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
            loader,
            timing,
        }
    }

    /// Draw the current state
    pub fn render(&self) -> Result<()> {
        let mut shared = self.shared.lock();
        keep_going(shared.render(&self.loader, self.timing.status_ttl))
    }

    /// Current toggle states
    pub fn toggles(&self) -> Toggles {
        self.shared.lock().toggles
    }

    /// Current filter state
    pub fn filter_state(&self) -> FilterState {
        self.shared.lock().filter.state()
    }

    /// Load a snapshot unless paused and try to publish it
    ///
    /// Load failures are returned; contention is not an error.
    pub fn refresh_once(&self) -> Result<Refresh> {
        let paused = match self.shared.try_lock_for(self.timing.publish_timeout) {
            Some(shared) => shared.toggles.pause.is_paused(),
            None => return Ok(Refresh::Contended),
        };
        if paused {
            return Ok(Refresh::Paused);
        }

        let snapshot = self.loader.load()?;
        self.publish(snapshot)
    }

    /// Replace the shown snapshot, waiting at most the publish timeout
    pub fn publish(&self, snapshot: Snapshot) -> Result<Refresh> {
        let mut shared = match self.shared.try_lock_for(self.timing.publish_timeout) {
            Some(shared) => shared,
            None => {
                log::debug!(
                    "lock busy for {:?}, dropping this refresh",
                    self.timing.publish_timeout
                );
                return Ok(Refresh::Contended);
            }
        };

        // pause pressed while the snapshot was loading
        if shared.toggles.pause.is_paused() {
            return Ok(Refresh::Paused);
        }

        shared.snapshot = Some(snapshot);
        shared.refreshed_at = Some(SystemTime::now());
        keep_going(shared.render(&self.loader, self.timing.status_ttl))?;
        Ok(Refresh::Published)
    }

    /// Show a load failure without stopping the refresh cadence
    fn report(&self, error: &DashnetError) {
        if let Some(mut shared) = self.shared.try_lock_for(self.timing.publish_timeout) {
            shared.set_status(format!("Refresh failed: {}", error));
        }
    }

    /// Background loop; runs until a fatal render error, then calls `on_fatal`
    pub fn spawn_refresher<F>(&self, on_fatal: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(DashnetError) + Send + 'static,
    {
        let dashboard = self.clone();
        let handle = thread::Builder::new()
            .name("dashnet-refresh".to_string())
            .spawn(move || dashboard.refresh_loop(on_fatal))?;
        Ok(handle)
    }

    fn refresh_loop<F: FnOnce(DashnetError)>(&self, on_fatal: F) {
        loop {
            thread::sleep(self.timing.refresh_interval);

            let started = Instant::now();
            match self.refresh_once() {
                Ok(outcome) => {
                    log::trace!("refresh {:?} in {:?}", outcome, started.elapsed());
                }
                Err(e) if e.is_fatal() => {
                    log::error!("stopping refresh: {}", e);
                    on_fatal(e);
                    return;
                }
                Err(e) => {
                    log::warn!("refresh failed: {}", e);
                    self.report(&e);
                }
            }
        }
    }

    /// Foreground loop; returns when the user quits
    ///
    /// Errors are input failures and fatal render errors.
    pub fn run_input<I: InputSource>(&self, input: &mut I) -> Result<()> {
        loop {
            let key = input.next_key()?;

            let command = match key {
                Key::Resize => {
                    self.render()?;
                    continue;
                }
                key => match Command::from_key(key) {
                    Some(command) => command,
                    None => continue,
                },
            };

            match command {
                Command::Quit => return Ok(()),
                Command::Filter => self.read_filter(input)?,
                command => {
                    let mut shared = self.shared.lock();
                    shared.toggles.apply(command);
                    keep_going(shared.render(&self.loader, self.timing.status_ttl))?;
                }
            }
        }
    }

    fn set_prompt(&self, prompt: Option<String>) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.prompt = prompt;
        keep_going(shared.render(&self.loader, self.timing.status_ttl))
    }

    /// Read filter text key by key, echoing it in the prompt
    fn read_filter<I: InputSource>(&self, input: &mut I) -> Result<()> {
        let mut text = String::new();
        // a stale status would hide the echo
        self.shared.lock().status = None;
        self.set_prompt(Some(text.clone()))?;

        loop {
            match input.next_key()? {
                Key::Enter => break,
                Key::Esc => return self.set_prompt(None),
                Key::Backspace => {
                    text.pop();
                }
                Key::Char(c) => text.push(c),
                Key::Resize => {}
            }
            self.set_prompt(Some(text.clone()))?;
        }

        let mut shared = self.shared.lock();
        shared.prompt = None;
        match shared.filter.handle_input(&text) {
            Ok(state) => log::debug!("filter '{}' -> {:?}", text, state),
            Err(e) => {
                log::warn!("{}", e);
                shared.set_status(e.to_string());
            }
        }
        keep_going(shared.render(&self.loader, self.timing.status_ttl))
    }
}
