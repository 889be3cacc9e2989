//! # dashnet
//!
//! A live terminal dashboard of the TCP and UDP sockets open on a Linux host,
//! attributed to the processes holding them.
//!
//! ## Features
//!
//! - **Process attribution**: sockets are matched to pids through `/proc/<pid>/fd`
//! - **Aggregated views**: connections by process, by remote address and by local address
//! - **Name resolution**: reverse DNS and service names, cached per snapshot with raw fallbacks
//! - **Live regex filter**: prunes the shown snapshot; clearing it reloads everything
//! - **Terminal UI**: ratatui dashboard refreshed in the background every second
//!
//! ## Quick Start
//!
//! ```no_run
//! use dashnet::{views, Config, SnapshotLoader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let snapshot = SnapshotLoader::system(&config).load()?;
//!
//! for row in views::traffic_by_process(&snapshot) {
//!     println!("{:<24} {}", row.process_name, row.count);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Filtering
//!
//! ```no_run
//! use dashnet::{Config, FilterState, RegexFilter, SnapshotLoader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = SnapshotLoader::system(&Config::default());
//! let mut snapshot = loader.load()?;
//! let mut filter = RegexFilter::new();
//!
//! if filter.handle_input("ssh|curl")? == FilterState::Apply {
//!     if let Some(pattern) = filter.pattern() {
//!         snapshot.filter_by_regex(pattern);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Command-line interface and TUI (default)

pub mod config; // Configuration management with TOML persistence
pub mod connections; // Socket tables (netstat-like) with pid attribution
pub mod dashboard; // Refresh scheduler and input loop
pub mod error;
pub mod filter; // Live regex filter state machine
pub mod interface; // Egress interface lookup
pub mod process; // Process table and display names
pub mod render; // Render sink and input source contracts
pub mod resolve; // DNS and service name resolution with per-snapshot cache
pub mod snapshot;
pub mod socket;
pub mod toggle; // Display toggles and key bindings
pub mod views; // Aggregation views

#[cfg(feature = "cli")]
pub mod tui; // Terminal UI

pub use config::{Config, DisplayConfig, GeneralConfig, ProcessConfig};
pub use connections::{ConnectionLister, ConnectionRecord, ConnectionState, ProcNetConnectionLister};
pub use dashboard::{Dashboard, Refresh, Timing};
pub use error::{DashnetError, Result};
pub use filter::{FilterState, RegexFilter};
pub use interface::{InterfaceResolver, RouteInterfaceResolver};
pub use process::{ProcFsProcessLister, ProcessEntry, ProcessLister, PROCESS_NOT_FOUND, UNKNOWN_PROCESS};
pub use render::{InputSource, Key, RenderSink, Screen};
pub use resolve::{NameResolver, ResolutionCache, SystemResolver};
pub use snapshot::{Snapshot, SnapshotLoader, SocketUse};
pub use socket::{LocalSocket, ProcessOwner, Protocol, RemoteSocket, Socket};
pub use toggle::{Command, Toggles, ViewMode};
