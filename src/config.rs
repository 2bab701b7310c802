//! Configuration for the EGL platform layer
//!
//! Loads configuration from TOML file at `~/.config/area/egl.toml`
//! Auto-generates default config file on first run if missing.
//! The library only reads the structs; the file is loaded by the binary.

use anyhow::{Context, Result};
use area_ipc::BufferProtocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub surface: SurfaceConfig,
    pub log: LogConfig,
    pub loopback: LoopbackConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;
        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("egl.toml"))
    }

    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Which buffer-exchange generation to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolPreference {
    /// Follow the compositor's capability flags
    #[default]
    Auto,
    Name,
    Prime,
}

/// Display initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub protocol: ProtocolPreference,
    /// Open an own allocator when the compositor does not share one
    pub local_allocator: bool,
    /// Byte cap for the memfd allocator
    pub allocator_budget_bytes: Option<u64>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolPreference::Auto,
            local_allocator: true,
            allocator_budget_bytes: None,
        }
    }
}

/// Window surface defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Format used by the plain get-buffers callback
    pub bits_per_pixel: u32,
    /// Interval applied to every new surface, if set
    pub swap_interval: Option<i32>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            bits_per_pixel: 32,
            swap_interval: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "area_egl=info,area_ipc=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopbackProtocol {
    Name,
    Prime,
}

impl From<LoopbackProtocol> for BufferProtocol {
    fn from(protocol: LoopbackProtocol) -> Self {
        match protocol {
            LoopbackProtocol::Name => BufferProtocol::Name,
            LoopbackProtocol::Prime => BufferProtocol::Prime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeConfig {
    /// Number of advances after which the compositor resizes the surface
    pub after: u32,
    pub width: u32,
    pub height: u32,
}

/// Demonstration compositor parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    pub protocol: LoopbackProtocol,
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    /// Zero geometry in buffer packages, like compositors predating it
    pub omit_geometry: bool,
    pub resize: Option<ResizeConfig>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            protocol: LoopbackProtocol::Prime,
            width: 800,
            height: 600,
            frames: 60,
            omit_geometry: false,
            resize: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [display]
            protocol = "name"

            [loopback]
            frames = 3
            resize = { after = 2, width = 1024, height = 768 }
            "#,
        )
        .unwrap();

        assert_eq!(config.display.protocol, ProtocolPreference::Name);
        assert!(config.display.local_allocator);
        assert_eq!(config.surface.bits_per_pixel, 32);
        assert_eq!(config.loopback.frames, 3);
        assert_eq!(config.loopback.width, 800);
        assert_eq!(config.loopback.resize.map(|r| r.width), Some(1024));
    }

    #[test]
    fn test_default_config_serializes_and_parses_back() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let config = Config::parse(&text).unwrap();
        assert_eq!(config.display.protocol, ProtocolPreference::Auto);
        assert_eq!(config.log.filter, "area_egl=info,area_ipc=info");
        assert_eq!(config.loopback.protocol, LoopbackProtocol::Prime);
    }

    #[test]
    fn test_unknown_protocol_is_rejected() {
        assert!(Config::parse("[display]\nprotocol = \"dri3\"\n").is_err());
    }
}
