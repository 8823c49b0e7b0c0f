// GlobalDorm client - dorm room search with live push notifications
//
// This is the library crate containing the REST client, session state and the
// message-broker notification bridge. The binary crate (main.rs) provides the
// console shell entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{ClientConfig, ClientSettings, NotificationSettings};
pub use notifications::{BridgeError, LifecycleState, NotificationBridge};
pub use services::{ServiceClient, ServiceError};
pub use state::{SessionChange, SessionManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
