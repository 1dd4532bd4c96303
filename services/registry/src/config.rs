//! Registry explorer configuration

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

/// Default freshness of both the repository listing and each repository's
/// revisions, short enough that new pushes show up quickly.
pub const DEFAULT_LOAD_TTL: Duration = Duration::from_secs(3);

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No store directory was given
    #[error("registry_dir is not configured")]
    MissingRoot,

    /// A TTL is negative or not a number
    #[error("{key} must be a finite, non-negative number of seconds, got {value}")]
    InvalidTtl {
        /// Setting name
        key: &'static str,
        /// Rejected value
        value: f64,
    },

    /// A setting has the wrong type
    #[error("{key} must be {expected}")]
    InvalidValue {
        /// Setting name
        key: &'static str,
        /// What was expected
        expected: &'static str,
    },

    /// The settings file could not be read
    #[error("reading settings from {path}")]
    Read {
        /// Settings file
        path: Utf8PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The settings file is not valid TOML
    #[cfg(feature = "cli")]
    #[error("parsing settings")]
    Toml(#[from] toml_edit::TomlError),
}

/// Validated configuration of a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    root: Utf8PathBuf,
    registry_ttl: Duration,
    repository_ttl: Duration,
}

impl RegistryConfig {
    /// Configuration for the store at `root`, with default TTLs.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry_ttl: DEFAULT_LOAD_TTL,
            repository_ttl: DEFAULT_LOAD_TTL,
        }
    }

    /// Set how long the repository listing stays fresh.
    pub fn with_registry_ttl(mut self, ttl: Duration) -> Self {
        self.registry_ttl = ttl;
        self
    }

    /// Set how long each repository's revisions and tags stay fresh.
    pub fn with_repository_ttl(mut self, ttl: Duration) -> Self {
        self.repository_ttl = ttl;
        self
    }

    /// Directory holding `docker/registry/v2`.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Freshness of the repository listing.
    pub fn registry_ttl(&self) -> Duration {
        self.registry_ttl
    }

    /// Freshness of each repository's revisions and tags.
    pub fn repository_ttl(&self) -> Duration {
        self.repository_ttl
    }
}

/// Unvalidated settings, as collected from a file, the environment, or the
/// command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Directory holding `docker/registry/v2`
    pub registry_dir: Option<Utf8PathBuf>,

    /// Freshness of the repository listing, in seconds
    pub registry_load_ttl: Option<f64>,

    /// Freshness of each repository's revisions and tags, in seconds
    pub repository_load_ttl: Option<f64>,
}

impl Settings {
    /// Settings from `other` where present, falling back to ours.
    pub fn merge(self, other: Settings) -> Settings {
        Settings {
            registry_dir: other.registry_dir.or(self.registry_dir),
            registry_load_ttl: other.registry_load_ttl.or(self.registry_load_ttl),
            repository_load_ttl: other.repository_load_ttl.or(self.repository_load_ttl),
        }
    }

    /// Validate into a [`RegistryConfig`].
    pub fn build(self) -> Result<RegistryConfig, ConfigError> {
        let root = self.registry_dir.ok_or(ConfigError::MissingRoot)?;
        let mut config = RegistryConfig::new(root);
        if let Some(seconds) = self.registry_load_ttl {
            config = config.with_registry_ttl(ttl("registry_load_ttl", seconds)?);
        }
        if let Some(seconds) = self.repository_load_ttl {
            config = config.with_repository_ttl(ttl("repository_load_ttl", seconds)?);
        }
        Ok(config)
    }
}

fn ttl(key: &'static str, seconds: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidTtl {
        key,
        value: seconds,
    })
}

#[cfg(feature = "cli")]
impl Settings {
    /// Read settings from a TOML file.
    pub fn from_file(path: &Utf8Path) -> Result<Settings, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Settings::from_toml(&text)
    }

    /// Parse settings from TOML text.
    ///
    /// ```toml
    /// registry_dir = "/var/lib/registry"
    /// registry_load_ttl = 3
    /// repository_load_ttl = 1.5
    /// ```
    pub fn from_toml(text: &str) -> Result<Settings, ConfigError> {
        let document = text.parse::<toml_edit::DocumentMut>()?;

        let registry_dir = match document.get("registry_dir") {
            None => None,
            Some(item) => Some(Utf8PathBuf::from(item.as_str().ok_or(
                ConfigError::InvalidValue {
                    key: "registry_dir",
                    expected: "a string",
                },
            )?)),
        };

        Ok(Settings {
            registry_dir,
            registry_load_ttl: seconds(&document, "registry_load_ttl")?,
            repository_load_ttl: seconds(&document, "repository_load_ttl")?,
        })
    }
}

#[cfg(feature = "cli")]
fn seconds(document: &toml_edit::DocumentMut, key: &'static str) -> Result<Option<f64>, ConfigError> {
    let Some(item) = document.get(key) else {
        return Ok(None);
    };

    item.as_float()
        .or_else(|| item.as_integer().map(|value| value as f64))
        .map(Some)
        .ok_or(ConfigError::InvalidValue {
            key,
            expected: "a number of seconds",
        })
}
