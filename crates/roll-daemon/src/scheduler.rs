//! The playback loop.
//!
//! ```text
//!   Seeding ──▶ Playing ──▶ Rotating ──▶ (Jingle) ──▶ Playing …
//!                  │  ▲          ▲
//!      prefetch ◀──┘  │          │
//!                     └─ Stalled ┘   (inline retry, then backoff forever)
//! ```
//!
//! Exactly one background fetch overlaps each playback. It is started before
//! the player is invoked and resolved only after the played file is deleted.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use roll_proto::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::{PrefetchBuffer, Resolved};
use crate::error::FatalError;
use crate::fetcher::TrackSource;
use crate::jingle::{pick_jingle, JingleCounter};
use crate::player::Player;
use crate::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Seeding,
    /// Playing `current` while the next track downloads.
    Playing,
    Stalled,
    Rotating,
    Jingle,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub jingles_dir: PathBuf,
    /// Jingle every N rotations, 0 = never.
    pub jingle_interval: u32,
    pub retry_backoff: Duration,
    /// Leave played tracks on disk.
    pub keep_files: bool,
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jingles_dir: config.paths.jingles_dir.clone(),
            jingle_interval: config.stream.jingle_interval,
            retry_backoff: config.stream.retry_backoff(),
            keep_files: config.stream.keep_files,
        }
    }
}

/// What happened before the loop was cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tracks_played: u64,
    pub jingles_played: u64,
}

/// Marker for "the cancellation token fired while we were waiting".
#[derive(Debug)]
struct Cancelled;

async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}

pub struct Scheduler<S, P> {
    buffer: PrefetchBuffer<S>,
    player: P,
    options: SchedulerOptions,
    counter: JingleCounter,
    cancel: CancellationToken,
    state: LoopState,
    summary: RunSummary,
}

impl<S: TrackSource, P: Player> Scheduler<S, P> {
    pub fn new(
        source: Arc<S>,
        player: P,
        query: impl Into<Arc<str>>,
        options: SchedulerOptions,
        cancel: CancellationToken,
    ) -> Self {
        let counter = JingleCounter::new(options.jingle_interval);
        Self {
            buffer: PrefetchBuffer::new(source, query),
            player,
            options,
            counter,
            cancel,
            state: LoopState::Idle,
            summary: RunSummary::default(),
        }
    }

    fn enter(&mut self, state: LoopState) {
        if self.state != state {
            debug!("scheduler: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Run until cancelled. Only a failed seed returns an error.
    pub async fn run(mut self) -> Result<RunSummary, FatalError> {
        self.enter(LoopState::Seeding);
        let seeded = until_cancelled(&self.cancel, self.buffer.seed()).await;
        match seeded {
            Ok(result) => result?,
            Err(Cancelled) => return Ok(self.shutdown().await),
        }
        info!(
            "Buffer primed for {:?}; jingle every {} track(s)",
            self.buffer.query(),
            self.counter.interval()
        );

        let outcome = self.run_loop().await;
        match outcome {
            Ok(never) => match never {},
            Err(Cancelled) => Ok(self.shutdown().await),
        }
    }

    async fn run_loop(&mut self) -> Result<std::convert::Infallible, Cancelled> {
        loop {
            let Some(cur) = self.buffer.take_current() else {
                // Only after an abnormal rotation; refill before playing again.
                warn!("No current track buffered, refilling");
                let fresh = self.recover().await?;
                self.buffer.rotate(fresh);
                continue;
            };

            let pending = self.buffer.start_background_fetch();

            self.enter(LoopState::Playing);
            info!("Playing: {}", cur);
            let played = until_cancelled(&self.cancel, self.player.play(cur.path())).await;
            match &played {
                Ok(Ok(())) => self.summary.tracks_played += 1,
                Ok(Err(e)) => {
                    self.summary.tracks_played += 1;
                    warn!("Playback of {} ended with error: {}", cur, e);
                }
                Err(Cancelled) => {}
            }
            self.dispose(cur).await;
            if played.is_err() {
                if let Some(leftover) = pending.abort().await {
                    self.dispose(leftover).await;
                }
                return Err(Cancelled);
            }

            let resolved = self.buffer.resolve_until(pending, &self.cancel).await;
            let fresh = match resolved {
                Resolved::Done(Some(track)) => track,
                Resolved::Done(None) => self.recover().await?,
                Resolved::Cancelled(leftover) => {
                    if let Some(track) = leftover {
                        self.dispose(track).await;
                    }
                    return Err(Cancelled);
                }
            };

            self.enter(LoopState::Rotating);
            debug!("Next up: {}", fresh);
            if let Some(displaced) = self.buffer.rotate(fresh) {
                self.dispose(displaced).await;
            }

            if self.counter.record_track() {
                self.play_jingle().await?;
            }
        }
    }

    /// One inline retry, then a fixed backoff between attempts until a fetch
    /// succeeds. Neither the counter nor the jingle advance while stalled.
    async fn recover(&mut self) -> Result<Track, Cancelled> {
        self.enter(LoopState::Stalled);
        info!("Retrying fetch inline");
        if let Some(track) = until_cancelled(&self.cancel, self.buffer.fetch_inline()).await? {
            return Ok(track);
        }
        loop {
            warn!(
                "No track available; retrying in {}s",
                self.options.retry_backoff.as_secs_f32()
            );
            until_cancelled(&self.cancel, tokio::time::sleep(self.options.retry_backoff)).await?;
            if let Some(track) =
                until_cancelled(&self.cancel, self.buffer.fetch_inline()).await?
            {
                info!("Fetch recovered");
                return Ok(track);
            }
        }
    }

    async fn play_jingle(&mut self) -> Result<(), Cancelled> {
        self.enter(LoopState::Jingle);
        let Some(jingle) = pick_jingle(&self.options.jingles_dir) else {
            debug!("No jingle available in {}", self.options.jingles_dir.display());
            return Ok(());
        };
        info!("JINGLE: {}", display_name(&jingle));
        if let Err(e) = until_cancelled(&self.cancel, self.player.play(&jingle)).await? {
            warn!("Jingle playback failed: {}", e);
        }
        self.summary.jingles_played += 1;
        Ok(())
    }

    async fn dispose(&self, track: Track) {
        if self.options.keep_files {
            debug!("Keeping {}", track.forget().display());
            return;
        }
        let name = track.to_string();
        match track.remove().await {
            Ok(()) => info!("Deleted: {}", name),
            Err(e) => warn!("Could not delete {}: {}", name, e),
        }
    }

    async fn shutdown(mut self) -> RunSummary {
        for track in self.buffer.drain() {
            self.dispose(track).await;
        }
        self.enter(LoopState::Stopped);
        info!(
            "Stopped after {} track(s) and {} jingle(s)",
            self.summary.tracks_played, self.summary.jingles_played
        );
        self.summary
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
