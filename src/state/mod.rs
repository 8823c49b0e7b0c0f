// Session management
//
// SessionManager wraps the Session (server table, selected server, logged-in
// user) with thread-safe access using Arc<RwLock<T>> and broadcasts change
// events. It is created at startup, handed to the ServiceClient, and mutated
// only through login/logout/server-switch.

use crate::models::ClientSettings;
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;

/// Change events emitted when the session is modified
#[derive(Clone, Debug, PartialEq)]
pub enum SessionChange {
    LoggedIn { username: String },
    LoggedOut,
    ServerChanged { name: String, address: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("No GlobalDorm servers are configured")]
    NoServers,

    #[error("Unknown server '{0}'")]
    UnknownServer(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Base URLs of the two GlobalDorm REST services on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// User, room and application resources
    pub database: String,
    /// Weather, crime and route lookups
    pub globaldorm: String,
}

impl Endpoints {
    pub fn for_address(address: &str) -> Self {
        let base = format!("http://{}/GlobalDorm/webresources", address);
        Self {
            database: format!("{}/database", base),
            globaldorm: format!("{}/globaldorm", base),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub servers: IndexMap<String, String>,
    pub current_server: String,
    pub credentials: Option<UserCredentials>,
}

impl Session {
    pub fn current_address(&self) -> &str {
        self.servers
            .get(&self.current_server)
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn resolve(&self, name: &str) -> Option<(&String, &String)> {
        self.servers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name.trim()))
    }
}

/// Thread-safe session holder with change events
///
/// Clones share the same session.
pub struct SessionManager {
    session: Arc<RwLock<Session>>,
    session_tx: broadcast::Sender<SessionChange>,
}

impl SessionManager {
    /// Create a logged-out session on the configured default server.
    ///
    /// An unknown `default_server` falls back to the first server in the table.
    pub fn new(settings: &ClientSettings) -> Result<Self, SessionError> {
        let Some(first) = settings.servers.keys().next() else {
            return Err(SessionError::NoServers);
        };

        let current_server = match settings
            .servers
            .keys()
            .find(|name| name.eq_ignore_ascii_case(&settings.default_server))
        {
            Some(name) => name.clone(),
            None => {
                tracing::warn!(
                    "Default server '{}' is not configured, using '{}'",
                    settings.default_server,
                    first
                );
                first.clone()
            }
        };

        let (session_tx, _) = broadcast::channel(100);
        Ok(Self {
            session: Arc::new(RwLock::new(Session {
                servers: settings.servers.clone(),
                current_server,
                credentials: None,
            })),
            session_tx,
        })
    }

    pub fn snapshot(&self) -> Session {
        self.read_lock().clone()
    }

    /// Execute a function with read access to the session
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Session) -> R,
    {
        f(&self.read_lock())
    }

    /// Apply `update_fn` and emit an event for each observable change.
    fn update<F>(&self, update_fn: F) -> Vec<SessionChange>
    where
        F: FnOnce(&mut Session),
    {
        let mut session = self.write_lock();
        let old = session.clone();

        update_fn(&mut session);

        let changes = Self::detect_changes(&old, &session);
        for change in &changes {
            // No subscribers is fine
            let _ = self.session_tx.send(change.clone());
        }
        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.session_tx.subscribe()
    }

    fn detect_changes(old: &Session, new: &Session) -> Vec<SessionChange> {
        let mut changes = Vec::new();

        if old.current_server != new.current_server {
            changes.push(SessionChange::ServerChanged {
                name: new.current_server.clone(),
                address: new.current_address().to_string(),
            });
        }

        if old.credentials != new.credentials {
            match &new.credentials {
                Some(credentials) => changes.push(SessionChange::LoggedIn {
                    username: credentials.username.clone(),
                }),
                None => changes.push(SessionChange::LoggedOut),
            }
        }

        changes
    }

    /// Record `username` as logged in. Credentials are verified by the caller.
    pub fn login(&self, username: &str, password: &str) -> Vec<SessionChange> {
        tracing::info!("User '{}' logged in", username);
        self.update(|session| {
            session.credentials = Some(UserCredentials {
                username: username.to_string(),
                password: password.to_string(),
            });
        })
    }

    pub fn logout(&self) -> Vec<SessionChange> {
        self.update(|session| session.credentials = None)
    }

    /// Select a server by name (case-insensitive). The login is kept.
    pub fn switch_server(&self, name: &str) -> Result<Vec<SessionChange>, SessionError> {
        let resolved = self
            .read(|session| session.resolve(name).map(|(key, _)| key.clone()))
            .ok_or_else(|| SessionError::UnknownServer(name.to_string()))?;

        tracing::info!("Switching to server '{}'", resolved);
        Ok(self.update(|session| session.current_server = resolved))
    }

    /// Select the server after the current one, wrapping around.
    pub fn next_server(&self) -> Vec<SessionChange> {
        self.update(|session| {
            let count = session.servers.len();
            if let Some(index) = session.servers.get_index_of(&session.current_server) {
                if let Some((name, _)) = session.servers.get_index((index + 1) % count) {
                    session.current_server = name.clone();
                }
            }
        })
    }

    /// Check `username`/`password` against the logged-in user.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.read(|session| {
            session
                .credentials
                .as_ref()
                .is_some_and(|c| c.username == username && c.password == password)
        })
    }

    pub fn current_user(&self) -> Option<String> {
        self.read(|session| session.credentials.as_ref().map(|c| c.username.clone()))
    }

    pub fn credentials(&self) -> Option<UserCredentials> {
        self.read(|session| session.credentials.clone())
    }

    /// Name and `host:port` of the selected server.
    pub fn current_server(&self) -> (String, String) {
        self.read(|session| {
            (
                session.current_server.clone(),
                session.current_address().to_string(),
            )
        })
    }

    pub fn server_names(&self) -> Vec<String> {
        self.read(|session| session.servers.keys().cloned().collect())
    }

    pub fn endpoints(&self) -> Endpoints {
        self.read(|session| Endpoints::for_address(session.current_address()))
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            session_tx: self.session_tx.clone(),
        }
    }
}
