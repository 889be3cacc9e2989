//! Display toggles and key bindings
//!
//! Every toggle is a small enum advanced with [`Toggle::next`], which cycles
//! through the variants in declaration order. [`Toggles`] bundles the four
//! toggles the dashboard carries and [`Command`] maps key presses onto them.

use crate::render::Key;
use serde::{Deserialize, Serialize};

/// Cyclic two-or-more state toggle
pub trait Toggle: Copy + PartialEq + 'static {
    /// Variants in cycle order
    const STATES: &'static [Self];

    /// Following state, wrapping around
    fn next(self) -> Self {
        cycle(Self::STATES, self)
    }
}

/// State after `current` in `states`, wrapping to the first
fn cycle<T: Copy + PartialEq>(states: &[T], current: T) -> T {
    let index = states.iter().position(|s| *s == current).unwrap_or(0);
    states[(index + 1) % states.len()]
}

/// Which dashboard layout is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Three panels: by process, by remote address, by local address
    #[default]
    Utilization,
    /// One row per connection
    List,
}

impl Toggle for ViewMode {
    const STATES: &'static [Self] = &[ViewMode::Utilization, ViewMode::List];
}

/// Hostname or raw IP in address columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DnsMode {
    #[default]
    Hostname,
    Ip,
}

impl DnsMode {
    pub fn from_flag(resolve: bool) -> Self {
        if resolve {
            DnsMode::Hostname
        } else {
            DnsMode::Ip
        }
    }

    pub fn resolve(self) -> bool {
        self == DnsMode::Hostname
    }
}

impl Toggle for DnsMode {
    const STATES: &'static [Self] = &[DnsMode::Hostname, DnsMode::Ip];
}

/// Service name or raw port in port columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceMode {
    #[default]
    Service,
    Port,
}

impl ServiceMode {
    pub fn from_flag(resolve: bool) -> Self {
        if resolve {
            ServiceMode::Service
        } else {
            ServiceMode::Port
        }
    }

    pub fn resolve(self) -> bool {
        self == ServiceMode::Service
    }
}

impl Toggle for ServiceMode {
    const STATES: &'static [Self] = &[ServiceMode::Service, ServiceMode::Port];
}

/// Whether the background refresher publishes new snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pause {
    #[default]
    Running,
    Paused,
}

impl Pause {
    pub fn is_paused(self) -> bool {
        self == Pause::Paused
    }
}

impl Toggle for Pause {
    const STATES: &'static [Self] = &[Pause::Running, Pause::Paused];
}

/// Action bound to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleView,
    ShowUtilization,
    ShowList,
    ToggleDns,
    ToggleService,
    TogglePause,
    /// Open the filter prompt
    Filter,
    Quit,
}

impl Command {
    /// Command bound to `key`; letters are case-folded
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Esc => Some(Command::Quit),
            Key::Char(c) => match c.to_ascii_lowercase() {
                'v' => Some(Command::ToggleView),
                'u' => Some(Command::ShowUtilization),
                'l' => Some(Command::ShowList),
                'd' => Some(Command::ToggleDns),
                's' => Some(Command::ToggleService),
                'p' | ' ' => Some(Command::TogglePause),
                '/' => Some(Command::Filter),
                'q' => Some(Command::Quit),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Current state of every toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Toggles {
    pub view: ViewMode,
    pub dns: DnsMode,
    pub service: ServiceMode,
    pub pause: Pause,
}

impl Toggles {
    pub fn from_config(display: &crate::config::DisplayConfig) -> Self {
        Self {
            view: display.start_view,
            dns: DnsMode::from_flag(display.resolve_dns),
            service: ServiceMode::from_flag(display.resolve_service),
            pause: Pause::Running,
        }
    }

    /// Apply a toggle command; returns false for commands that are not toggles
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::ToggleView => self.view = self.view.next(),
            Command::ShowUtilization => self.view = ViewMode::Utilization,
            Command::ShowList => self.view = ViewMode::List,
            Command::ToggleDns => self.dns = self.dns.next(),
            Command::ToggleService => self.service = self.service.next(),
            Command::TogglePause => self.pause = self.pause.next(),
            Command::Filter | Command::Quit => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_cycle() {
        assert_eq!(ViewMode::Utilization.next(), ViewMode::List);
        assert_eq!(ViewMode::List.next(), ViewMode::Utilization);
        assert_eq!(DnsMode::Hostname.next().next(), DnsMode::Hostname);
        assert!(!ServiceMode::Service.next().resolve());
        assert!(Pause::Running.next().is_paused());
    }

    #[test]
    fn test_key_bindings_are_case_folded() {
        assert_eq!(Command::from_key(Key::Char('V')), Some(Command::ToggleView));
        assert_eq!(Command::from_key(Key::Char('d')), Some(Command::ToggleDns));
        assert_eq!(Command::from_key(Key::Char('S')), Some(Command::ToggleService));
        assert_eq!(Command::from_key(Key::Char(' ')), Some(Command::TogglePause));
        assert_eq!(Command::from_key(Key::Char('P')), Some(Command::TogglePause));
        assert_eq!(Command::from_key(Key::Char('/')), Some(Command::Filter));
        assert_eq!(Command::from_key(Key::Esc), Some(Command::Quit));
        assert_eq!(Command::from_key(Key::Char('x')), None);
        assert_eq!(Command::from_key(Key::Enter), None);
    }

    #[test]
    fn test_apply_changes_one_toggle() {
        let mut toggles = Toggles::default();
        assert!(toggles.apply(Command::ToggleDns));
        assert_eq!(
            toggles,
            Toggles {
                dns: DnsMode::Ip,
                ..Toggles::default()
            }
        );

        assert!(toggles.apply(Command::ShowList));
        assert!(toggles.apply(Command::ShowList));
        assert_eq!(toggles.view, ViewMode::List);

        assert!(!toggles.apply(Command::Quit));
        assert!(!toggles.apply(Command::Filter));
    }

    #[test]
    fn test_from_config() {
        let display = crate::config::DisplayConfig {
            resolve_dns: false,
            resolve_service: true,
            start_view: ViewMode::List,
        };
        let toggles = Toggles::from_config(&display);
        assert_eq!(toggles.view, ViewMode::List);
        assert!(!toggles.dns.resolve());
        assert!(toggles.service.resolve());
        assert!(!toggles.pause.is_paused());
    }
}
