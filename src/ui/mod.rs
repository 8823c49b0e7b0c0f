// UI module - console shell and its bridge to the tokio runtime
//
// This module contains:
// - ShellBridge: Carries service results from tokio tasks back to the shell loop
// - Command: Parses one line of user input
// - ConsoleShell: The poll-driven loop that shows notifications and runs commands

pub mod bridge;
pub mod commands;
pub mod shell;

pub use bridge::{PendingUpdates, ShellBridge, ShellUpdate};
pub use commands::{Command, HELP};
pub use shell::{ConsoleShell, Flow, NotificationSink, ShellView, StdoutSink, spawn_stdin_reader};
