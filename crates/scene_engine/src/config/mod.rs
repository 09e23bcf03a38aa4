//! Configuration system
//!
//! Renderer settings are plain serde structs that load from and save to
//! `.toml` or `.ron` files through the [`Config`] trait.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter passed to env_logger when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// RGBA clear color for the main pass
    pub clear_color: [f32; 4],
    /// Skip meshes whose world bounds fall outside the camera frustum
    pub frustum_culling: bool,
    /// Sort transparent meshes back-to-front
    pub sort_transparent: bool,
    /// Apply gamma correction in generated shaders
    pub gamma_correction: bool,
    /// Gamma exponent
    pub gamma_factor: f32,
    /// Tone-mapping exposure
    pub exposure: f32,
    /// Enable HDR output for materials that ask for it
    pub use_hdr: bool,
    /// Texture units available to one draw
    pub max_texture_units: u32,
    /// Shadow map size used when a light does not specify one
    pub default_shadow_map_size: u32,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frustum_culling: true,
            sort_transparent: true,
            gamma_correction: false,
            gamma_factor: 2.2,
            exposure: 1.0,
            use_hdr: false,
            max_texture_units: 16,
            default_shadow_map_size: 1024,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Check ranges the renderer relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_texture_units == 0 {
            return Err(ConfigError::Invalid {
                field: "max_texture_units",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.gamma_factor <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "gamma_factor",
                reason: format!("must be positive, got {}", self.gamma_factor),
            });
        }
        if !self.default_shadow_map_size.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "default_shadow_map_size",
                reason: format!("must be a power of two, got {}", self.default_shadow_map_size),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_texture_units() {
        let config = RendererConfig { max_texture_units: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "max_texture_units", .. })));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.toml");
        let path = path.to_str().unwrap();

        let config = RendererConfig {
            clear_color: [0.1, 0.2, 0.3, 1.0],
            gamma_correction: true,
            default_shadow_map_size: 2048,
            ..Default::default()
        };
        config.save_to_file(path).unwrap();

        let loaded = RendererConfig::load_from_file(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.ron");
        let path = path.to_str().unwrap();

        let config = RendererConfig { exposure: 1.5, ..Default::default() };
        config.save_to_file(path).unwrap();
        assert_eq!(RendererConfig::load_from_file(path).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "frustum_culling = false\n").unwrap();

        let loaded = RendererConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert!(!loaded.frustum_culling);
        assert_eq!(loaded.max_texture_units, 16);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = RendererConfig::default().save_to_file("renderer.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
