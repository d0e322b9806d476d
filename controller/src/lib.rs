//! Editor-side half of the Checkstyle integration.
//!
//! [`SessionManager`] owns the worker process and the channel to it. It
//! answers the worker's configuration queries from the settings store,
//! relays worker status to the host's [`StatusSurface`], and runs the user
//! commands.

pub mod commands;
pub mod configuration;
pub mod host;
pub mod session;
pub mod worker;

pub use commands::{Command, CommandContext, CommandError, error_message, run_command};
pub use configuration::ConfigurationResolver;
pub use host::{DiagnosticSink, HostFut, Prompter, StatusEvent, StatusSurface};
pub use session::{
    DocumentEvent, DownloadSubscription, Host, SessionError, SessionManager, SessionState,
};
pub use worker::{WorkerCommand, WorkerProcess};
