use crate::models::ClientConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat};
use std::fs;

pub const CONFIG_FILE_NAME: &str = "GlobalDorm Client.yaml";

/// Prefix of environment overrides, e.g. `GLOBALDORM_NOTIFICATIONS__HOST`.
pub const ENV_PREFIX: &str = "GLOBALDORM";

/// Configuration manager for the client's YAML settings file.
///
/// Settings are layered: built-in defaults, then `GlobalDorm Client.yaml`,
/// then `GLOBALDORM_*` environment variables (`__` separates nested keys).
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    client_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "GlobalDorm Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            client_config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the layered client configuration.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_client_config(&self) -> Result<ClientConfig> {
        let defaults = Config::try_from(&ClientConfig::default())
            .context("Failed to build default client config")?;

        let mut builder = Config::builder().add_source(defaults);

        if self.client_config_path.exists() {
            builder = builder.add_source(
                File::from(self.client_config_path.as_std_path()).format(FileFormat::Yaml),
            );
        } else {
            tracing::warn!(
                "Client config file not found at {}, using defaults",
                self.client_config_path
            );
        }

        let layered = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read client config: {}", self.client_config_path))?;

        let config: ClientConfig = layered.try_deserialize().with_context(|| {
            format!("Failed to parse client config: {}", self.client_config_path)
        })?;

        tracing::info!(
            "Loaded client config: {} server(s), broker {}:{}",
            config.client.servers.len(),
            config.notifications.host,
            config.notifications.port
        );
        Ok(config)
    }

    /// Save the client configuration file.
    pub fn save_client_config(&self, config: &ClientConfig) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(config)
            .context("Failed to serialize client config to YAML")?;

        fs::write(&self.client_config_path, yaml_string).with_context(|| {
            format!("Failed to write client config: {}", self.client_config_path)
        })?;

        tracing::info!("Saved client config to {}", self.client_config_path);
        Ok(())
    }

    /// Write the default configuration if no file exists yet.
    ///
    /// Returns `true` when a file was created.
    pub fn ensure_client_config(&self) -> Result<bool> {
        if self.client_config_path.exists() {
            return Ok(false);
        }
        self.save_client_config(&ClientConfig::default())?;
        Ok(true)
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn client_config_path(&self) -> &Utf8Path {
        &self.client_config_path
    }
}
