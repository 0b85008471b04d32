//! Error types for the playback pipeline.
//!
//! Only [`FatalError`] ever ends a run. Everything else is absorbed by the
//! scheduler and reported as a status line.

use thiserror::Error;

/// Why a single fetch produced no track. Always recoverable.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Search returned nothing usable (empty, all filtered, or all held).
    #[error("no usable search result for {query:?}")]
    NoResult { query: String },

    /// yt-dlp search run failed without producing candidates.
    #[error("yt-dlp search exited with {code:?}: {stderr}")]
    SearchFailed { code: Option<i32>, stderr: String },

    /// yt-dlp download run failed or did not report a usable file.
    #[error("yt-dlp download of {id} failed ({code:?}): {detail}")]
    DownloadFailed {
        id: String,
        code: Option<i32>,
        detail: String,
    },

    /// The tool binary could not be launched at all.
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cache I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Player failures. The scheduler treats these as end of playback.
#[derive(Error, Debug)]
pub enum PlayError {
    #[error("failed to spawn player: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("player exited with {code:?}")]
    Exited { code: Option<i32> },
}

/// Startup failures while priming both buffer slots.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("could not fetch the first track: {0}")]
    First(#[source] FetchError),

    #[error("fetched one track but not a second; the pipeline needs two: {0}")]
    Second(#[source] FetchError),
}

/// Conditions that end [`crate::scheduler::Scheduler::run`] with an error.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("seeding failed: {0}")]
    Seed(#[from] SeedError),
}
