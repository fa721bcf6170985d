// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Pick the format from the file extension
    pub fn auto(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))?;

        Ok(Self::new(format))
    }

    /// Load configuration from file
    pub fn load_file(&self, path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)?;
        self.parse(&content)
    }

    /// Parse configuration from string
    pub fn parse(&self, content: &str) -> Result<Value> {
        match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e))),
            FileFormat::Toml => {
                let value: toml::Value = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
                serde_json::to_value(value).map_err(|e| {
                    ConfigError::ParseError(format!("TOML to JSON conversion error: {}", e))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let value = loader
            .parse(r#"{"amqp_message_broker": "amqp://rabbit:5672"}"#)
            .unwrap();

        assert_eq!(value["amqp_message_broker"], "amqp://rabbit:5672");
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let value = loader
            .parse("databasetype = \"memory\"\nreconnect_delay_secs = 2\n")
            .unwrap();

        assert_eq!(value["databasetype"], "memory");
        assert_eq!(value["reconnect_delay_secs"], 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ConfigLoader::new(FileFormat::Json).parse("{"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            ConfigLoader::new(FileFormat::Toml).parse("= nope"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_auto_format() {
        assert!(ConfigLoader::auto(Path::new("config.json")).is_ok());
        assert!(ConfigLoader::auto(Path::new("config.TOML")).is_ok());
        assert!(ConfigLoader::auto(Path::new("config.yaml")).is_err());
        assert!(ConfigLoader::auto(Path::new("config")).is_err());
    }
}
