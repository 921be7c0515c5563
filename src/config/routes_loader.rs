use std::{fs, path::PathBuf};

use config::{Config, File, FileFormat};
use thiserror::Error;

use crate::models::route::RouteSet;

/// Loads routing configuration (rules and override tables) from file.
pub struct RoutesLoader {
    path: PathBuf,
}

/// Errors that can occur while loading routing configuration.
#[derive(Debug, Error)]
pub enum RoutesLoaderError {
    /// Error when reading the routes configuration file.
    #[error("Failed to read routes configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when parsing the routes configuration file.
    #[error("Failed to parse routes configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Error when the routes configuration format is unsupported.
    #[error("Unsupported routes configuration format")]
    UnsupportedFormat,
}

impl RoutesLoader {
    /// Creates a new `RoutesLoader` instance.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the routing configuration from the specified file.
    pub fn load(&self) -> Result<RouteSet, RoutesLoaderError> {
        if !self.is_yaml_file() {
            return Err(RoutesLoaderError::UnsupportedFormat);
        }

        let config_str = fs::read_to_string(&self.path)?;
        let set: RouteSet = Config::builder()
            .add_source(File::from_str(&config_str, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        Ok(set)
    }

    /// Checks if the file has a YAML extension.
    fn is_yaml_file(&self) -> bool {
        matches!(self.path.extension().and_then(|ext| ext.to_str()), Some("yaml") | Some("yml"))
    }
}
