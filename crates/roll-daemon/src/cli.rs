//! Command line and environment overlay on top of `config.toml`.

use std::path::PathBuf;

use clap::Parser;
use roll_proto::config::Config;

/// Endless search-driven radio: prefetches the next track while the current
/// one plays, with a jingle every N tracks.
#[derive(Debug, Parser)]
#[command(name = "radio-roll", version)]
pub struct Args {
    /// Config file (default: ~/.config/radio-roll/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Search query used for every track
    #[arg(short, long, env = "ROLL_QUERY")]
    pub query: Option<String>,

    /// Play one jingle every N tracks (0 = off)
    #[arg(short = 'n', long, env = "ROLL_JINGLE_INTERVAL")]
    pub jingle_interval: Option<u32>,

    #[arg(long, env = "ROLL_JINGLES_DIR")]
    pub jingles_dir: Option<PathBuf>,

    #[arg(long, env = "ROLL_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Path to yt-dlp
    #[arg(long = "yt-dlp", env = "YT_DLP_PATH")]
    pub yt_dlp: Option<PathBuf>,

    /// Path to mpv
    #[arg(long, env = "MPV_PATH")]
    pub mpv: Option<PathBuf>,

    /// Cookie file passed to yt-dlp
    #[arg(long, env = "ROLL_COOKIES")]
    pub cookies: Option<PathBuf>,

    /// Extra yt-dlp argument, repeatable (e.g. --ytdlp-arg=--extractor-args)
    #[arg(long = "ytdlp-arg", allow_hyphen_values = true)]
    pub ytdlp_args: Vec<String>,

    /// Shuffle search results before picking
    #[arg(long)]
    pub shuffle: bool,

    /// Transcode with ffmpeg instead of keeping bestaudio as-is
    #[arg(long)]
    pub extract: bool,

    /// Do not delete played tracks (debug)
    #[arg(long)]
    pub keep_files: bool,

    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::config_path)
    }

    /// Overlay flags and env vars onto a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(query) = &self.query {
            config.stream.query = query.clone();
        }
        if let Some(n) = self.jingle_interval {
            config.stream.jingle_interval = n;
        }
        if let Some(dir) = &self.jingles_dir {
            config.paths.jingles_dir = dir.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.paths.cache_dir = dir.clone();
        }
        if let Some(p) = &self.yt_dlp {
            config.tools.yt_dlp = Some(p.clone());
        }
        if let Some(p) = &self.mpv {
            config.tools.mpv = Some(p.clone());
        }
        if let Some(p) = &self.cookies {
            config.tools.cookies_file = Some(p.clone());
        }
        config.tools.ytdlp_args.extend(self.ytdlp_args.iter().cloned());
        config.stream.shuffle |= self.shuffle;
        config.download.extract |= self.extract;
        config.stream.keep_files |= self.keep_files;
    }
}
