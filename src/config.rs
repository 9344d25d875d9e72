// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to its defaults, so a missing file or a missing
// key never stops the renderer from starting.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upper bound on frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 3;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub shaders: ShaderConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Quad Renderer".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "quad_renderer.log".to_string(),
            show_fps: true,
        }
    }
}

/// Compiled SPIR-V locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/quad.vert.spv"),
            fragment: PathBuf::from("shaders/quad.frag.spv"),
        }
    }
}

/// Where the configuration came from. Built before the logger exists, so
/// it is reported afterwards with [`ConfigSource::log`].
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    /// The file exists but could not be read or parsed
    Invalid(anyhow::Error),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigSource::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigSource::Invalid(e) => {
                log::warn!("Failed to load config file: {:#}. Using defaults.", e)
            }
        }
    }
}

impl Config {
    /// Load config.toml from the working directory, falling back to defaults
    pub fn load() -> (Self, ConfigSource) {
        Self::load_or_default("config.toml")
    }

    /// Load configuration from `path`; any failure yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref();

        if !path.exists() {
            return (Config::default(), ConfigSource::Missing(path.to_path_buf()));
        }

        match Self::load_from_path(path) {
            Ok(config) => (config, ConfigSource::File(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigSource::Invalid(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Number of frame slots (command buffers, semaphores, fences) to create.
    pub fn frames_in_flight(&self) -> usize {
        let requested = self.graphics.max_frames_in_flight;
        let frames = requested.clamp(1, MAX_FRAMES_IN_FLIGHT_LIMIT);
        if frames != requested {
            log::warn!(
                "max_frames_in_flight = {} is out of range, using {}",
                requested,
                frames
            );
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.frames_in_flight(), 2);
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/quad.vert.spv"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Test"

            [graphics]
            max_frames_in_flight = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Test");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.graphics.present_mode, "mailbox");
        assert_eq!(config.frames_in_flight(), 3);
    }

    #[test]
    fn test_frames_in_flight_is_clamped() {
        let mut config = Config::default();

        config.graphics.max_frames_in_flight = 0;
        assert_eq!(config.frames_in_flight(), 1);

        config.graphics.max_frames_in_flight = 8;
        assert_eq!(config.frames_in_flight(), MAX_FRAMES_IN_FLIGHT_LIMIT);
    }

    #[test]
    fn test_present_mode_names() {
        let mut config = Config::default();

        config.graphics.present_mode = "FIFO_Relaxed".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO_RELAXED);

        config.graphics.present_mode = "immediate".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::IMMEDIATE);

        config.graphics.present_mode = "vsync-please".to_string();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (config, source) = Config::load_or_default("does/not/exist/config.toml");
        assert_eq!(config.window.title, "Quad Renderer");
        assert!(matches!(source, ConfigSource::Missing(_)));
        assert!(Config::load_from_path("does/not/exist/config.toml").is_err());
    }

    #[test]
    fn test_invalid_file_keeps_error_for_reporting() {
        let path = std::env::temp_dir().join(format!("quad-renderer-{}.toml", std::process::id()));
        std::fs::write(&path, "[graphics]\nmax_frames_in_flight = \"two\"").unwrap();

        let (config, source) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.frames_in_flight(), 2);
        let ConfigSource::Invalid(e) = &source else {
            panic!("expected an invalid config, got {:?}", source);
        };
        assert!(format!("{:#}", e).contains("Failed to parse config file"));
    }

    #[test]
    fn test_valid_file_is_loaded() {
        let path = std::env::temp_dir().join(format!("quad-renderer-ok-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = 1024").unwrap();

        let (config, source) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 1024);
        assert!(matches!(source, ConfigSource::File(p) if p == path));
    }
}
