use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration persisted as `GlobalDorm Client.yaml`.
///
/// Every field has a default, so a partial file (or no file at all) still
/// produces a usable configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client: ClientSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Known GlobalDorm servers, name -> `host:port`, in menu order.
    pub servers: IndexMap<String, String>,

    /// Server selected at startup. Falls back to the first entry of `servers`.
    pub default_server: String,

    pub request_timeout_secs: u64,

    pub debug_mode: bool,

    pub log_dir: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let mut servers = IndexMap::new();
        servers.insert("netbeans".to_string(), "localhost:8080".to_string());
        servers.insert("docker".to_string(), "localhost:8081".to_string());
        servers.insert("azure".to_string(), "20.162.251.254:8080".to_string());

        Self {
            servers,
            default_server: "netbeans".to_string(),
            request_timeout_secs: 10,
            debug_mode: false,
            log_dir: "logs".to_string(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// RabbitMQ connection and consumer settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Start listening as soon as the client starts.
    pub enabled: bool,

    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub password: String,

    /// Fanout exchange the server publishes room updates to.
    pub exchange: String,

    pub poll_interval_ms: u64,
    pub connect_timeout_secs: u64,
    pub close_timeout_ms: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,

    /// Broker deletes the queue after this long without a consumer
    /// (`x-expires`), so a crashed client does not leave it behind.
    pub queue_expiry_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 5672,
            virtual_host: "/".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            exchange: "hello".to_string(),
            poll_interval_ms: 100,
            connect_timeout_secs: 5,
            close_timeout_ms: 500,
            reconnect_attempts: 1,
            reconnect_delay_ms: 500,
            queue_expiry_secs: 300,
        }
    }
}

impl NotificationSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn queue_expiry(&self) -> Duration {
        Duration::from_secs(self.queue_expiry_secs)
    }
}

// Keep the broker password out of logs
impl std::fmt::Debug for NotificationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSettings")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("virtual_host", &self.virtual_host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("exchange", &self.exchange)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("close_timeout_ms", &self.close_timeout_ms)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("queue_expiry_secs", &self.queue_expiry_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_servers_in_menu_order() {
        let settings = ClientSettings::default();
        let names: Vec<&str> = settings.servers.keys().map(String::as_str).collect();

        assert_eq!(names, vec!["netbeans", "docker", "azure"]);
        assert_eq!(settings.servers["docker"], "localhost:8081");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "notifications:\n  host: rabbit.example\n";
        let config: ClientConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.notifications.host, "rabbit.example");
        assert_eq!(config.notifications.port, 5672);
        assert_eq!(config.notifications.exchange, "hello");
        assert_eq!(config.client.default_server, "netbeans");
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = NotificationSettings {
            password: "hunter2".to_string(),
            ..NotificationSettings::default()
        };

        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_duration_helpers() {
        let settings = NotificationSettings::default();

        assert_eq!(settings.poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.queue_expiry(), Duration::from_secs(300));
        assert_eq!(ClientSettings::default().request_timeout(), Duration::from_secs(10));
    }
}
