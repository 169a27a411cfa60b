//! Launcher and updater for the SHOE engine.
//!
//! Tracks the installed engine version per release channel, installs
//! updates from the channel's download server, keeps the local project list
//! and hands projects to the engine executable.

pub mod assets;
pub mod channels;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fs_ops;
pub mod installer;
pub mod logging;
pub mod paths;
pub mod payload;
pub mod projects;
pub mod runner;
pub mod state;
pub mod updater;
pub mod version;

pub use channels::{Channel, ChannelRegistry};
pub use config::LauncherConfig;
pub use error::{InstallStage, LauncherError, Result};
pub use fetch::{Downloader, HttpTransport, RetryPolicy, Transport, TransportError};
pub use projects::{Project, ProjectRegistry, RuntimeVariant};
pub use updater::{CheckOutcome, InstallOutcome, LauncherStatus, StatusReport, UpdateOrchestrator};
pub use version::Version;
