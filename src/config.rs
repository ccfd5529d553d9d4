//! Configuration management for the RAX upload server
//!
//! Loads startup configuration from `config.toml` with environment
//! overrides. Everything here is read once; nothing is reloaded at runtime.

use config::{Config, ConfigError, Environment, File};
use log::info;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::SettingsError;
use crate::storage::{AllowedExtensionSet, SizeLimit, StorageSettings};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "RAX_UPLOAD_CONFIG";

/// Prefix for overrides such as `RAX_UPLOAD__NETWORK__PORT=6000`
pub const ENV_PREFIX: &str = "RAX_UPLOAD";

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

/// Listener and connection handling
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// IP address to bind the listener
    pub bind_address: String,

    /// Port for client connections
    pub port: u16,

    /// Maximum concurrent clients
    pub max_clients: usize,

    /// Idle time before a connection is closed
    pub connection_timeout_secs: u64,

    /// Maximum command line length in bytes
    pub max_command_length: usize,
}

/// Storage root and upload rules
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory all files are stored in
    pub root: String,

    /// Largest accepted upload
    pub max_file_size_bytes: u64,

    /// File extensions accepted for upload
    pub allowed_extensions: Vec<String>,

    /// Chunk size for streaming transfers
    pub buffer_size: usize,
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from(&path);
        }

        // Try the packaged location first, then the working directory
        let config_paths = ["rax-upload-server/config", "config"];

        for config_path in config_paths {
            if Path::new(&format!("{config_path}.toml")).is_file() {
                info!("Loading configuration from {config_path}.toml");
                return Self::build(Some(config_path));
            }
        }

        info!("No config.toml found (tried {config_paths:?}), using defaults");
        Self::build(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        info!("Loading configuration from {path}");
        Self::build(Some(path))
    }

    fn build(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("network.bind_address", "127.0.0.1")?
            .set_default("network.port", 5000)?
            .set_default("network.max_clients", 32)?
            .set_default("network.connection_timeout_secs", 300)?
            .set_default("network.max_command_length", 512)?
            .set_default("storage.root", "uploads")?
            .set_default("storage.max_file_size_bytes", 5 * 1024 * 1024)?
            .set_default(
                "storage.allowed_extensions",
                vec!["png", "jpg", "jpeg", "gif", "pdf"],
            )?
            .set_default("storage.buffer_size", 8192)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.network.port == 0 {
            return Err(ConfigError::Message("port cannot be 0".into()));
        }

        if self.network.max_clients == 0 {
            return Err(ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.network.max_command_length == 0 {
            return Err(ConfigError::Message(
                "max_command_length must be greater than 0".into(),
            ));
        }

        if self.storage.root.trim().is_empty() {
            return Err(ConfigError::Message("storage root cannot be empty".into()));
        }

        if self.storage.max_file_size_bytes == 0 {
            return Err(ConfigError::Message(
                "max_file_size_bytes must be greater than 0".into(),
            ));
        }

        if self.storage.buffer_size == 0 {
            return Err(ConfigError::Message(
                "buffer_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl NetworkConfig {
    /// Bind address and port as a socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

impl StorageConfig {
    /// Validate into the immutable settings the storage gateway is built from
    pub fn to_settings(&self) -> Result<StorageSettings, SettingsError> {
        let size_limit = SizeLimit::new(self.max_file_size_bytes)?;
        let allowed = AllowedExtensionSet::new(&self.allowed_extensions)?;
        StorageSettings::new(&self.root, size_limit, allowed).with_buffer_size(self.buffer_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, PoisonError};

    /// Serializes tests that load configuration, since loading reads the
    /// process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn load(path: &str) -> Result<ServerConfig, ConfigError> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        ServerConfig::load_from(path)
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path.to_string_lossy().into_owned())
    }

    #[test]
    fn file_values_override_defaults() {
        let (_dir, path) = write_config(
            r#"
            [network]
            port = 7000

            [storage]
            root = "/tmp/rax-uploads"
            max_file_size_bytes = 1024
            allowed_extensions = ["png"]
            "#,
        );

        let config = load(&path).unwrap();
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.network.socket_addr(), "127.0.0.1:7000");
        assert_eq!(config.storage.max_file_size_bytes, 1024);
        assert_eq!(config.storage.allowed_extensions, vec!["png".to_string()]);
        assert_eq!(config.storage.buffer_size, 8192);
    }

    #[test]
    fn zero_port_is_rejected() {
        let (_dir, path) = write_config("[network]\nport = 0\n");
        assert!(load(&path).is_err());
    }

    #[test]
    fn zero_size_limit_is_rejected() {
        let (_dir, path) = write_config("[storage]\nmax_file_size_bytes = 0\n");
        assert!(load(&path).is_err());
    }

    #[test]
    fn storage_section_converts_to_settings() {
        let (_dir, path) = write_config(
            "[storage]\nroot = \"files\"\nallowed_extensions = [\"PNG\", \".pdf\"]\nbuffer_size = 4096\n",
        );
        let config = load(&path).unwrap();
        let settings = config.storage.to_settings().unwrap();

        assert_eq!(settings.root(), Path::new("files"));
        assert_eq!(settings.size_limit().bytes(), 5 * 1024 * 1024);
        assert_eq!(settings.buffer_size(), 4096);
        assert!(settings.allowed_extensions().contains("png"));
        assert!(settings.allowed_extensions().contains("pdf"));
        assert!(!settings.allowed_extensions().contains("jpg"));
    }

    #[test]
    fn blocked_extension_fails_settings_conversion() {
        let (_dir, path) = write_config("[storage]\nallowed_extensions = [\"png\", \"sh\"]\n");
        let config = load(&path).unwrap();
        assert!(matches!(
            config.storage.to_settings(),
            Err(SettingsError::BlockedExtension(_))
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let (_dir, path) = write_config("[network]\nport = 7000\nmax_clients = 4\n");

        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: ENV_LOCK keeps every other config test out while the
        // variables are set.
        unsafe {
            std::env::set_var("RAX_UPLOAD__NETWORK__PORT", "6123");
            std::env::set_var("RAX_UPLOAD__STORAGE__BUFFER_SIZE", "1024");
        }
        let loaded = ServerConfig::load_from(&path);
        unsafe {
            std::env::remove_var("RAX_UPLOAD__NETWORK__PORT");
            std::env::remove_var("RAX_UPLOAD__STORAGE__BUFFER_SIZE");
        }

        let config = loaded.unwrap();
        assert_eq!(config.network.port, 6123);
        assert_eq!(config.network.max_clients, 4);
        assert_eq!(config.storage.buffer_size, 1024);
    }
}
