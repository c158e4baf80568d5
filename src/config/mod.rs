use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Stream resolution settings
    pub resolver: ResolverConfig,

    /// Audio encoder settings
    pub encoder: EncoderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for produced audio files (current directory if not set)
    pub output_dir: Option<PathBuf>,

    /// Temporary directory for downloads (system temp directory if not set)
    pub temp_dir: Option<PathBuf>,

    /// Maximum tasks running at once
    pub max_concurrent_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// User agent sent with every HTTP request
    pub user_agent: String,

    /// Stream qualities to pick from the watch page, most preferred first
    pub preferred_qualities: Vec<String>,

    /// Ask yt-dlp when the watch page has no usable stream
    pub yt_dlp_fallback: bool,

    /// yt-dlp binary
    pub yt_dlp_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// ffmpeg binary
    pub ffmpeg_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                output_dir: None,
                temp_dir: None,
                max_concurrent_tasks: 8,
            },
            resolver: ResolverConfig {
                user_agent: concat!("yt2mp3/", env!("CARGO_PKG_VERSION")).to_string(),
                preferred_qualities: vec!["360p".to_string(), "240p".to_string()],
                yt_dlp_fallback: true,
                yt_dlp_path: "yt-dlp".to_string(),
            },
            encoder: EncoderConfig {
                ffmpeg_path: "ffmpeg".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("yt2mp3").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.app.max_concurrent_tasks == 0 {
            anyhow::bail!("app.max_concurrent_tasks must be at least 1");
        }

        if self.resolver.preferred_qualities.is_empty() {
            anyhow::bail!("resolver.preferred_qualities must list at least one quality");
        }

        if self.encoder.ffmpeg_path.trim().is_empty() {
            anyhow::bail!("encoder.ffmpeg_path must not be empty");
        }

        Ok(())
    }

    /// Pipeline settings, with directories resolved against the current directory
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let output_dir = match &self.app.output_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Could not determine current directory")?,
        };

        Ok(PipelineSettings {
            output_dir,
            temp_dir: self.app.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
            max_concurrent_tasks: self.app.max_concurrent_tasks,
        })
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        match &self.app.output_dir {
            Some(dir) => println!("  Output Directory: {}", dir.display()),
            None => println!("  Output Directory: (current directory)"),
        }
        match &self.app.temp_dir {
            Some(dir) => println!("  Temp Directory: {}", dir.display()),
            None => println!("  Temp Directory: (system default)"),
        }
        println!("  Max Concurrent Tasks: {}", self.app.max_concurrent_tasks);
        println!("  Preferred Qualities: {}", self.resolver.preferred_qualities.join(", "));
        println!(
            "  yt-dlp Fallback: {}",
            if self.resolver.yt_dlp_fallback { self.resolver.yt_dlp_path.as_str() } else { "disabled" }
        );
        println!("  ffmpeg: {}", self.encoder.ffmpeg_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.app.max_concurrent_tasks = 3;
        config.app.output_dir = Some(PathBuf::from("/music"));
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.app.max_concurrent_tasks = 0;
        config.save_to(&path).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("max_concurrent_tasks"));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "app: [not, a, map]").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_pipeline_settings_defaults() {
        let settings = Config::default().pipeline_settings().unwrap();
        assert_eq!(settings.output_dir, std::env::current_dir().unwrap());
        assert_eq!(settings.temp_dir, std::env::temp_dir());
        assert_eq!(settings.max_concurrent_tasks, 8);
    }
}
