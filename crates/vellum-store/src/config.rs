//! Store configuration.

use vellum_chunk::{policy, SplitterConfig};
use vellum_core::FilePath;
use vellum_remote::RemoteConfig;

use crate::StoreError;

/// Recognized store options.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Remote server base URL
    pub url: String,
    /// HTTP Basic username
    pub username: String,
    /// HTTP Basic password
    pub password: String,
    /// Database name
    pub database: String,
    /// When set, chunk payloads are encrypted
    pub passphrase: Option<String>,
    /// When set, document ids and path text are obfuscated
    pub obfuscate_passphrase: Option<String>,
    /// Dynamic PBKDF2 iteration schedule
    pub use_dynamic_iteration_count: bool,
    /// Piece size multiplier
    pub custom_chunk_size: u32,
    /// Lower bound for piece bytes
    pub minimum_chunk_size: usize,
    /// Legacy chunking and encryption envelope
    pub use_v1: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            passphrase: None,
            obfuscate_passphrase: None,
            use_dynamic_iteration_count: false,
            custom_chunk_size: 0,
            minimum_chunk_size: 20,
            use_v1: false,
        }
    }
}

impl Settings {
    /// Rejects configurations the store cannot operate with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.url.is_empty() {
            return Err(StoreError::Config("remote url is not set".into()));
        }
        if self.database.is_empty() {
            return Err(StoreError::Config("database name is not set".into()));
        }
        if self.minimum_chunk_size == 0 {
            return Err(StoreError::Config(
                "minimum chunk size must be positive".into(),
            ));
        }
        self.splitter_config(&FilePath::new("probe.md"))
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        Ok(())
    }

    /// True when the legacy envelope iteration schedule applies.
    pub fn dynamic_iterations(&self) -> bool {
        self.use_dynamic_iteration_count && !self.use_v1
    }

    pub(crate) fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        }
    }

    pub(crate) fn splitter_config(&self, path: &FilePath) -> SplitterConfig {
        SplitterConfig {
            piece_size: policy::piece_size(self.custom_chunk_size, self.use_v1),
            minimum_chunk_size: self.minimum_chunk_size,
            plain_split: policy::is_plain_splittable(path),
        }
    }
}
