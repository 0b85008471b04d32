use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

/// Audio formats yt-dlp can extract to.
pub const AUDIO_FORMATS: &[&str] = &["mp3", "m4a", "wav", "flac"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// What to play and how the pipeline paces itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Search query reused for every fetch.
    #[serde(default = "default_query")]
    pub query: String,
    /// Play one jingle every N tracks. 0 disables jingles.
    #[serde(default = "default_jingle_interval")]
    pub jingle_interval: u32,
    /// How many search results to ask yt-dlp for.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
    /// Shuffle search results before picking one.
    #[serde(default)]
    pub shuffle: bool,
    /// Keep played files in the cache (debug).
    #[serde(default)]
    pub keep_files: bool,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Rolling cache for downloaded tracks.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory of jingle clips (read only).
    #[serde(default = "default_jingles_dir")]
    pub jingles_dir: PathBuf,
}

/// External binaries. `None` means discover via [`platform`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yt_dlp: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpv: Option<PathBuf>,
    /// Cookie jar handed to yt-dlp via `--cookies`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<PathBuf>,
    /// Extra arguments appended to every yt-dlp download.
    #[serde(default)]
    pub ytdlp_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Transcode with `-x` instead of grabbing bestaudio as-is (needs ffmpeg).
    #[serde(default)]
    pub extract: bool,
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            jingle_interval: default_jingle_interval(),
            search_limit: default_search_limit(),
            shuffle: false,
            keep_files: false,
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            jingles_dir: default_jingles_dir(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            extract: false,
            audio_format: default_audio_format(),
            audio_quality: default_audio_quality(),
        }
    }
}

fn default_query() -> String {
    "synthwave 2024".to_string()
}

fn default_jingle_interval() -> u32 {
    2
}

fn default_search_limit() -> u32 {
    10
}

fn default_retry_backoff_secs() -> u64 {
    5
}

fn default_cache_dir() -> PathBuf {
    platform::cache_dir().join("tracks")
}

fn default_jingles_dir() -> PathBuf {
    platform::data_dir().join("jingles")
}

fn default_audio_format() -> String {
    "m4a".to_string()
}

fn default_audio_quality() -> String {
    "0".to_string()
}

impl StreamConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl Config {
    /// Load `config_path`, writing defaults there on first run.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing {}", config_path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stream.query.trim().is_empty() {
            anyhow::bail!("stream.query must not be empty");
        }
        if self.stream.search_limit == 0 {
            anyhow::bail!("stream.search_limit must be at least 1");
        }
        let format = self.download.audio_format.to_ascii_lowercase();
        if !AUDIO_FORMATS.contains(&format.as_str()) {
            anyhow::bail!(
                "download.audio_format must be one of {:?}, got {:?}",
                AUDIO_FORMATS,
                self.download.audio_format
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stream.jingle_interval, 2);
        assert_eq!(config.stream.retry_backoff(), Duration::from_secs(5));
        assert!(config.paths.cache_dir.ends_with("radio-roll/tracks"));
        assert!(config.paths.jingles_dir.ends_with("radio-roll/jingles"));
        assert!(config.tools.cookies_file.is_none());
        assert!(!config.download.extract);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [stream]
            query = "greek trap 2024"

            [tools]
            cookies_file = "/tmp/cookies.txt"
            ytdlp_args = ["--extractor-args", "youtube:player_client=android"]
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.query, "greek trap 2024");
        assert_eq!(config.stream.search_limit, 10);
        assert_eq!(
            config.tools.cookies_file.as_deref(),
            Some(Path::new("/tmp/cookies.txt"))
        );
        assert_eq!(config.tools.ytdlp_args.len(), 2);
        assert_eq!(config.download.audio_format, "m4a");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.stream.query = "   ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.download.audio_format = "ogg".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.search_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_writes_defaults_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.stream.query, config.stream.query);
        assert_eq!(reloaded.paths.cache_dir, config.paths.cache_dir);
    }
}
