//! yt-dlp wrapper: resolve a search query to one downloaded audio file.
//!
//! A fetch runs two yt-dlp invocations:
//!
//! ```text
//!   search   ytsearchN:<query> --dump-json   → one JSON object per candidate
//!   download <candidate url> -P <staging>    → prints after_move:filepath
//! ```
//!
//! Downloads land in a private staging directory inside the cache and are
//! renamed into the cache only once yt-dlp reports the finished path, so a
//! failed or aborted fetch never leaves a partial file where the scheduler
//! can see it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use roll_proto::config::Config;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::track::{HeldIds, Hold, Track};

/// Longest track we accept, in seconds (exclusive).
pub const MAX_DURATION_SECS: f64 = 900.0;

/// Match filter handed to yt-dlp; [`Candidate::is_playable`] re-checks it.
pub const MATCH_FILTER: &str = "!is_live & live_status!='is_upcoming' & duration < 900";

/// Output template relative to the staging dir. The `[id]` suffix keeps
/// names of live tracks unique.
pub const OUTPUT_TEMPLATE: &str = "%(title).200s [%(id)s].%(ext)s";

/// Anything that can turn a query into a downloaded [`Track`].
#[async_trait]
pub trait TrackSource: Send + Sync + 'static {
    async fn fetch(&self, query: &str) -> Result<Track, FetchError>;
}

/// One search hit as printed by `yt-dlp --dump-json`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub live_status: Option<String>,
    #[serde(default)]
    pub is_live: Option<bool>,
    #[serde(default)]
    pub webpage_url: Option<String>,
}

impl Candidate {
    pub fn is_playable(&self) -> bool {
        if self.is_live == Some(true) {
            return false;
        }
        if matches!(
            self.live_status.as_deref(),
            Some("is_live") | Some("is_upcoming")
        ) {
            return false;
        }
        matches!(self.duration, Some(d) if d < MAX_DURATION_SECS)
    }

    pub fn url(&self) -> String {
        self.webpage_url
            .clone()
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id))
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Parse `--dump-json` output, dropping unparsable lines and anything that
/// fails the live/duration filter. Order is preserved.
pub fn parse_candidates(stdout: &str) -> Vec<Candidate> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<Candidate>(line) {
            Ok(c) => Some(c),
            Err(e) => {
                debug!("yt-dlp: skipping unparsable search line: {}", e);
                None
            }
        })
        .filter(|c| {
            let ok = c.is_playable();
            if !ok {
                debug!(
                    "yt-dlp: filtered {} (duration={:?} live_status={:?})",
                    c.id, c.duration, c.live_status
                );
            }
            ok
        })
        .collect()
}

/// Last few stderr lines, for error messages.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

/// Extraction settings for `-x` mode.
#[derive(Debug, Clone)]
struct Extract {
    audio_format: String,
    audio_quality: String,
}

/// Production [`TrackSource`] backed by the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    yt_dlp: PathBuf,
    cache_dir: PathBuf,
    search_limit: u32,
    shuffle: bool,
    cookies_file: Option<PathBuf>,
    extra_args: Vec<String>,
    extract: Option<Extract>,
    held: HeldIds,
}

impl YtDlpFetcher {
    pub fn new(yt_dlp: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            yt_dlp,
            cache_dir,
            search_limit: 10,
            shuffle: false,
            cookies_file: None,
            extra_args: Vec::new(),
            extract: None,
            held: HeldIds::new(),
        }
    }

    /// Build from config, discovering yt-dlp when no path is configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let yt_dlp = match &config.tools.yt_dlp {
            Some(p) => p.clone(),
            None => roll_proto::platform::find_yt_dlp_binary()
                .context("yt-dlp not found (set tools.yt_dlp or YT_DLP_PATH)")?,
        };
        let mut fetcher = Self::new(yt_dlp, config.paths.cache_dir.clone())
            .with_search_limit(config.stream.search_limit)
            .with_shuffle(config.stream.shuffle)
            .with_extra_args(config.tools.ytdlp_args.clone());
        if let Some(cookies) = &config.tools.cookies_file {
            fetcher = fetcher.with_cookies(cookies.clone());
        }
        if config.download.extract {
            fetcher = fetcher.with_extract(
                config.download.audio_format.to_ascii_lowercase(),
                config.download.audio_quality.clone(),
            );
        }
        Ok(fetcher)
    }

    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_cookies(mut self, cookies_file: PathBuf) -> Self {
        self.cookies_file = Some(cookies_file);
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_extract(mut self, audio_format: String, audio_quality: String) -> Self {
        self.extract = Some(Extract {
            audio_format,
            audio_quality,
        });
        self
    }

    pub fn yt_dlp(&self) -> &Path {
        &self.yt_dlp
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Ids of the tracks this fetcher handed out that are still alive.
    pub fn held_ids(&self) -> &HeldIds {
        &self.held
    }

    /// Cookie jar and user-supplied args, shared by search and download.
    fn common_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.into());
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    pub fn search_args(&self, query: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--no-playlist".into(),
            "--skip-download".into(),
            "--dump-json".into(),
            "--no-progress".into(),
            "--match-filter".into(),
            MATCH_FILTER.into(),
        ];
        args.extend(self.common_args());
        args.push(format!("ytsearch{}:{}", self.search_limit, query).into());
        args
    }

    pub fn download_args(&self, candidate: &Candidate, staging: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--no-playlist".into()];
        match &self.extract {
            Some(x) => {
                args.push("-x".into());
                args.push("--audio-format".into());
                args.push(x.audio_format.clone().into());
                args.push("--audio-quality".into());
                args.push(x.audio_quality.clone().into());
            }
            None => {
                args.push("-f".into());
                args.push("bestaudio/best".into());
            }
        }
        args.extend([
            "--restrict-filenames".into(),
            "--no-progress".into(),
            "-P".into(),
            staging.as_os_str().to_os_string(),
            "-o".into(),
            OUTPUT_TEMPLATE.into(),
            "--print".into(),
            "after_move:filepath".into(),
        ]);
        args.extend(self.common_args());
        args.push("--".into());
        args.push(candidate.url().into());
        args
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>, FetchError> {
        debug!("yt-dlp: searching {:?} (limit {})", query, self.search_limit);
        let output = Command::new(&self.yt_dlp)
            .args(self.search_args(query))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                tool: "yt-dlp",
                source,
            })?;

        let candidates = parse_candidates(&String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            if candidates.is_empty() {
                return Err(FetchError::SearchFailed {
                    code: output.status.code(),
                    stderr: stderr_tail(&output.stderr),
                });
            }
            // yt-dlp exits nonzero when a single entry errors; keep the rest
            warn!(
                "yt-dlp search exited with {:?}, using {} candidate(s)",
                output.status.code(),
                candidates.len()
            );
        }
        Ok(candidates)
    }

    /// First candidate in tool order whose id no live track holds. The id
    /// stays reserved for the returned candidate until its track goes away.
    fn select(&self, mut candidates: Vec<Candidate>) -> Option<(Candidate, Hold)> {
        if self.shuffle {
            candidates.shuffle(&mut rand::thread_rng());
        }
        candidates.into_iter().find_map(|c| match self.held.try_hold(&c.id) {
            Some(hold) => Some((c, hold)),
            None => {
                debug!("yt-dlp: skipping {}, already held", c.id);
                None
            }
        })
    }

    async fn download(&self, candidate: &Candidate, hold: Hold) -> Result<Track, FetchError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        // Removed on drop, including when the owning task is aborted.
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.cache_dir)?;

        info!("Downloading: {} [{}]", candidate.display_title(), candidate.id);
        let output = Command::new(&self.yt_dlp)
            .args(self.download_args(candidate, staging.path()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                tool: "yt-dlp",
                source,
            })?;

        let failed = |detail: String| FetchError::DownloadFailed {
            id: candidate.id.clone(),
            code: output.status.code(),
            detail,
        };

        if !output.status.success() {
            return Err(failed(stderr_tail(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reported = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or_else(|| failed("yt-dlp reported no file path".to_string()))?;

        let staged = PathBuf::from(reported);
        if !staged.is_file() {
            return Err(failed(format!(
                "reported file is missing: {}",
                staged.display()
            )));
        }
        let file_name = staged
            .file_name()
            .ok_or_else(|| failed(format!("bad reported path: {}", staged.display())))?;

        let dest = self.cache_dir.join(file_name);
        tokio::fs::rename(&staged, &dest).await?;
        drop(staging);

        info!("Downloaded -> {}", dest.display());
        Ok(Track::new(
            dest,
            candidate.id.clone(),
            candidate.display_title().to_string(),
        )
        .with_hold(hold))
    }
}

#[async_trait]
impl TrackSource for YtDlpFetcher {
    async fn fetch(&self, query: &str) -> Result<Track, FetchError> {
        let candidates = self.search(query).await?;
        let (candidate, hold) = self
            .select(candidates)
            .ok_or_else(|| FetchError::NoResult {
                query: query.to_string(),
            })?;
        self.download(&candidate, hold).await
    }
}
