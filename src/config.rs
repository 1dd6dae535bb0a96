use std::fs;
use std::path::{Path, PathBuf};

use kurbo::Size;
use serde::Deserialize;

use crate::backend::{DEFAULT_COMPRESSION_LEVEL, DEFAULT_DECODED_ENTRIES};
use crate::error::{AppError, AppResult};
use crate::render::{DEFAULT_WINDOW_SIZE, WindowConfig};

/// Upper bound for the completion broadcast buffer.
pub const MAX_RESULT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub save: SaveConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub result_channel_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1080.0,
            viewport_height: 1920.0,
            result_channel_capacity: 64,
        }
    }
}

impl RenderConfig {
    pub fn viewport(&self) -> Size {
        Size::new(self.viewport_width, self.viewport_height)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub window_size: usize,
    pub image_cache_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            image_cache_entries: DEFAULT_DECODED_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn window(&self) -> WindowConfig {
        WindowConfig::new(self.window_size)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SaveConfig {
    pub overwrite_original: bool,
    pub suffix: String,
    pub compression_level: u8,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            overwrite_original: true,
            suffix: "-edited".to_string(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl SaveConfig {
    /// Where a save of `original` lands.
    pub fn target_path(&self, original: &Path) -> PathBuf {
        if self.overwrite_original {
            return original.to_path_buf();
        }
        let stem = original
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        original.with_file_name(format!("{stem}{}.pdf", self.suffix))
    }
}

impl Config {
    pub fn load() -> AppResult<Self> {
        let Some(path) = default_config_path() else {
            return Ok(Self::default());
        };
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        if !path.is_file() {
            return Err(AppError::invalid_argument(format!(
                "config path is not a regular file: {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path).map_err(|source| {
            AppError::io_with_context(source, format!("failed to read config: {}", path.display()))
        })?;
        let parsed = toml::from_str::<Self>(&raw).map_err(|source| {
            AppError::invalid_argument(format!(
                "failed to parse config {}: {source}",
                path.display()
            ))
        })?;
        Ok(parsed.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        let defaults = RenderConfig::default();
        if !self.render.viewport_width.is_finite() || self.render.viewport_width < 1.0 {
            self.render.viewport_width = defaults.viewport_width;
        }
        if !self.render.viewport_height.is_finite() || self.render.viewport_height < 1.0 {
            self.render.viewport_height = defaults.viewport_height;
        }
        self.render.result_channel_capacity = self
            .render
            .result_channel_capacity
            .clamp(1, MAX_RESULT_CHANNEL_CAPACITY);
        self.cache.window_size = self.cache.window().size();
        self.cache.image_cache_entries = self.cache.image_cache_entries.max(1);
        self.save.compression_level = self.save.compression_level.min(10);
        if !self.save.overwrite_original && self.save.suffix.is_empty() {
            self.save.suffix = SaveConfig::default().suffix;
        }
        self
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os("PGED_CONFIG_PATH")
        && !explicit.is_empty()
    {
        return Some(PathBuf::from(explicit));
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join("pged").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Some(
            PathBuf::from(home)
                .join(".config")
                .join("pged")
                .join("config.toml"),
        );
    }
    if let Some(appdata) = std::env::var_os("APPDATA")
        && !appdata.is_empty()
    {
        return Some(PathBuf::from(appdata).join("pged").join("config.toml"));
    }
    None
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use kurbo::Size;

    use super::{Config, MAX_RESULT_CHANNEL_CAPACITY, RenderConfig, SaveConfig};
    use crate::backend::unique_temp_path;

    #[test]
    fn load_from_path_returns_defaults_for_missing_file() {
        let missing = unique_temp_path("missing.toml");
        let config = Config::load_from_path(&missing).expect("missing config should fallback");
        assert_eq!(config, Config::default());
        assert_eq!(config.render.viewport(), Size::new(1080.0, 1920.0));
        assert_eq!(config.cache.window().size(), 7);
    }

    #[test]
    fn load_from_path_applies_partial_overrides_and_sanitizes() {
        let path = unique_temp_path("custom.toml");
        fs::write(
            &path,
            r#"
            [render]
            viewport_width = 0.0
            result_channel_capacity = 0

            [cache]
            window_size = 4

            [save]
            overwrite_original = false
            suffix = ""
            compression_level = 42
            "#,
        )
        .expect("config file should be written");

        let config = Config::load_from_path(&path).expect("config should parse");
        assert_eq!(config.render.viewport_width, 1080.0);
        assert_eq!(config.render.viewport_height, 1920.0);
        assert_eq!(config.render.result_channel_capacity, 1);
        assert_eq!(config.cache.window_size, 5);
        assert_eq!(config.cache.image_cache_entries, 8);
        assert!(!config.save.overwrite_original);
        assert_eq!(config.save.suffix, "-edited");
        assert_eq!(config.save.compression_level, 10);

        fs::remove_file(&path).expect("config file should be removed");
    }

    #[test]
    fn sanitized_caps_result_channel_capacity() {
        let config = Config {
            render: RenderConfig {
                result_channel_capacity: usize::MAX,
                ..RenderConfig::default()
            },
            ..Config::default()
        }
        .sanitized();
        assert_eq!(
            config.render.result_channel_capacity,
            MAX_RESULT_CHANNEL_CAPACITY
        );
    }

    #[test]
    fn load_from_path_rejects_malformed_toml() {
        let path = unique_temp_path("broken.toml");
        fs::write(&path, "[cache\nwindow_size = ").expect("config file should be written");

        assert!(Config::load_from_path(&path).is_err());

        fs::remove_file(&path).expect("config file should be removed");
    }

    #[test]
    fn save_target_overwrites_or_appends_suffix() {
        let original = Path::new("/tmp/scans/report.pdf");
        assert_eq!(SaveConfig::default().target_path(original), original);

        let side_by_side = SaveConfig {
            overwrite_original: false,
            ..SaveConfig::default()
        };
        assert_eq!(
            side_by_side.target_path(original),
            Path::new("/tmp/scans/report-edited.pdf")
        );
    }
}
