use std::sync::Arc;
use std::{fs, path::PathBuf};

use common::prelude::{CacheConfig, Dispatcher, ObjectStore};
use object_store::{MailboxStore, ObjectStoreConfig};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "mailfs";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "mailbox.sqlite";
pub const MESSAGES_DIR_NAME: &str = "messages";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Names whose current version is remembered between lookups
    #[serde(default = "default_cache_entries")]
    pub cache_entries: u64,
    /// Default log level (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily log files (stdout only if not set)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Where messages are stored
    #[serde(default)]
    pub mailbox: MailboxConfig,
}

fn default_cache_entries() -> u64 {
    CacheConfig::default().max_entries
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_entries: default_cache_entries(),
            log_level: default_log_level(),
            log_dir: None,
            mailbox: MailboxConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parsed log level, falling back to INFO for anything unrecognized.
    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

/// Configuration for the mailbox backend.
/// The message index always lives in the state directory; this picks
/// where message bodies go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MailboxConfig {
    /// Process memory only. Everything is lost on exit.
    Memory,

    /// Local filesystem
    Local {
        /// Path for message bodies (defaults to mailfs_dir/messages/)
        path: Option<PathBuf>,
    },

    /// S3-compatible object storage
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

impl Default for MailboxConfig {
    fn default() -> Self {
        MailboxConfig::Local { path: None }
    }
}

impl MailboxConfig {
    /// Whether every connection starts from an empty mailbox.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, MailboxConfig::Memory)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the mailfs directory (~/.mailfs)
    pub mailfs_dir: PathBuf,
    /// Path to the SQLite message index
    pub db_path: PathBuf,
    /// Default path for message bodies
    pub messages_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the mailfs directory path (custom or default ~/.mailfs)
    pub fn mailfs_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new mailfs state directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let mailfs_dir = Self::mailfs_dir(custom_path)?;

        if mailfs_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&mailfs_dir)?;

        let messages_path = mailfs_dir.join(MESSAGES_DIR_NAME);
        if matches!(config.mailbox, MailboxConfig::Local { path: None }) {
            fs::create_dir_all(&messages_path)?;
        }

        let config_path = mailfs_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            db_path: mailfs_dir.join(DB_FILE_NAME),
            mailfs_dir,
            messages_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the mailfs directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let mailfs_dir = Self::mailfs_dir(custom_path)?;

        let config_path = mailfs_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            db_path: mailfs_dir.join(DB_FILE_NAME),
            messages_path: mailfs_dir.join(MESSAGES_DIR_NAME),
            mailfs_dir,
            config_path,
            config,
        })
    }

    /// Object storage settings for message bodies
    pub fn object_store_config(&self) -> ObjectStoreConfig {
        match &self.config.mailbox {
            MailboxConfig::Memory => ObjectStoreConfig::Memory,
            MailboxConfig::Local { path } => ObjectStoreConfig::Local {
                path: path.clone().unwrap_or_else(|| self.messages_path.clone()),
            },
            MailboxConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => ObjectStoreConfig::S3 {
                endpoint: endpoint.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                bucket: bucket.clone(),
                region: region.clone(),
            },
        }
    }

    /// Connect to the configured mailbox and start a filesystem session
    pub async fn open_dispatcher(&self) -> Result<Dispatcher, StateError> {
        let mailbox = match self.config.mailbox {
            MailboxConfig::Memory => MailboxStore::new_ephemeral().await?,
            _ => MailboxStore::new(&self.db_path, self.object_store_config()).await?,
        };
        let store = ObjectStore::with_cache_config(
            Arc::new(mailbox),
            CacheConfig {
                max_entries: self.config.cache_entries,
            },
        );
        Ok(Dispatcher::new(store))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("mailfs directory not initialized. Run 'mailfs init' first")]
    NotInitialized,

    #[error("mailfs directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("mailbox error: {0}")]
    Mailbox(#[from] object_store::MailboxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("state");

        let state = AppState::init(Some(dir.clone()), AppConfig::default()).unwrap();
        assert!(state.messages_path.exists());
        assert!(matches!(
            AppState::init(Some(dir.clone()), AppConfig::default()),
            Err(StateError::AlreadyInitialized)
        ));

        let loaded = AppState::load(Some(dir)).unwrap();
        assert_eq!(loaded.config.mailbox, MailboxConfig::Local { path: None });
        assert_eq!(loaded.config.cache_entries, 10_000);
        assert_eq!(
            loaded.object_store_config(),
            ObjectStoreConfig::Local {
                path: state.messages_path
            }
        );
    }

    #[test]
    fn test_load_uninitialized() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(temp_dir.path().to_path_buf())),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            log_level = "debug"

            [mailbox]
            type = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.mailbox, MailboxConfig::Memory);
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.cache_entries, 10_000);
        assert!(config.log_dir.is_none());
    }

    #[tokio::test]
    async fn test_open_dispatcher_on_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state =
            AppState::init(Some(temp_dir.path().to_path_buf()), AppConfig::default()).unwrap();

        let fs = state.open_dispatcher().await.unwrap();
        fs.init_filesystem().await.unwrap();
        fs.create_file("/hello").await.unwrap();
        fs.shutdown().await.unwrap();

        let fs = state.open_dispatcher().await.unwrap();
        assert_eq!(fs.list("/").await.unwrap(), vec![".", "..", "hello"]);
    }
}
