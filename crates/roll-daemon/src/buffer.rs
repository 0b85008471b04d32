//! Two-slot prefetch buffer.
//!
//! ```text
//!   current ──play──▶ delete
//!      ▲
//!   next ◀── rotate ── PendingFetch (one background tokio task)
//! ```
//!
//! At most one [`PendingFetch`] exists at a time. The scheduler's loop
//! structure guarantees this: the handle is not `Clone`, and
//! [`PrefetchBuffer::resolve`], [`PrefetchBuffer::resolve_until`] and
//! [`PendingFetch::abort`] all consume it.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FetchError, SeedError};
use crate::fetcher::TrackSource;
use crate::track::Track;

/// Handle to the single in-flight background fetch.
#[derive(Debug)]
pub struct PendingFetch {
    handle: JoinHandle<Result<Track, FetchError>>,
}

impl PendingFetch {
    /// Abandon the fetch and wait for the task to wind down, which kills the
    /// child process and removes the staging directory. A track that
    /// finished before the abort landed is handed back for disposal.
    pub async fn abort(mut self) -> Option<Track> {
        self.handle.abort();
        match (&mut self.handle).await {
            Ok(Ok(track)) => Some(track),
            _ => None,
        }
    }
}

impl Drop for PendingFetch {
    fn drop(&mut self) {
        // No-op once the task has completed.
        self.handle.abort();
    }
}

/// How a [`PrefetchBuffer::resolve_until`] wait ended.
#[derive(Debug)]
pub enum Resolved {
    /// The fetch ran to the end; `None` if it failed.
    Done(Option<Track>),
    Cancelled(Option<Track>),
}

fn absorb(joined: Result<Result<Track, FetchError>, JoinError>) -> Option<Track> {
    match joined {
        Ok(Ok(track)) => Some(track),
        Ok(Err(e)) => {
            warn!("Background fetch failed: {}", e);
            None
        }
        Err(e) => {
            warn!("Background fetch task did not complete: {}", e);
            None
        }
    }
}

pub struct PrefetchBuffer<S> {
    source: Arc<S>,
    query: Arc<str>,
    current: Option<Track>,
    next: Option<Track>,
}

impl<S: TrackSource> PrefetchBuffer<S> {
    pub fn new(source: Arc<S>, query: impl Into<Arc<str>>) -> Self {
        Self {
            source,
            query: query.into(),
            current: None,
            next: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Prime both slots with two sequential fetches.
    ///
    /// Either failure is fatal to the caller. If only the second fetch
    /// fails, the first track is deleted before returning.
    pub async fn seed(&mut self) -> Result<(), SeedError> {
        info!("Seeding buffer for {:?}", &*self.query);
        let first = self
            .source
            .fetch(&self.query)
            .await
            .map_err(SeedError::First)?;
        debug!("seed: current = {}", first);

        let second = match self.source.fetch(&self.query).await {
            Ok(t) => t,
            Err(e) => {
                if let Err(rm) = first.remove().await {
                    warn!("seed: could not remove first track: {}", rm);
                }
                return Err(SeedError::Second(e));
            }
        };
        debug!("seed: next = {}", second);

        self.current = Some(first);
        self.next = Some(second);
        Ok(())
    }

    /// Spawn one fetch for the slot that becomes `next` after rotation.
    pub fn start_background_fetch(&self) -> PendingFetch {
        let source = Arc::clone(&self.source);
        let query = Arc::clone(&self.query);
        let handle = tokio::spawn(async move { source.fetch(&query).await });
        PendingFetch { handle }
    }

    /// Wait for the background fetch. Every failure becomes `None`.
    pub async fn resolve(&self, mut pending: PendingFetch) -> Option<Track> {
        absorb((&mut pending.handle).await)
    }

    /// [`Self::resolve`], unless `cancel` fires first. Then the fetch is
    /// aborted and any track it already produced comes back as
    /// [`Resolved::Cancelled`].
    pub async fn resolve_until(
        &self,
        mut pending: PendingFetch,
        cancel: &CancellationToken,
    ) -> Resolved {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Resolved::Cancelled(pending.abort().await),
            joined = &mut pending.handle => Resolved::Done(absorb(joined)),
        }
    }

    /// Fetch synchronously, absorbing failure the same way as [`Self::resolve`].
    pub async fn fetch_inline(&self) -> Option<Track> {
        match self.source.fetch(&self.query).await {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Fetch failed: {}", e);
                None
            }
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&Track> {
        self.next.as_ref()
    }

    pub fn take_current(&mut self) -> Option<Track> {
        self.current.take()
    }

    /// Move `next` into `current` and store `fresh` as the new `next`.
    ///
    /// If `current` is still occupied, its track is returned so the caller
    /// can dispose of it; in the normal loop it has already been taken.
    pub fn rotate(&mut self, fresh: Track) -> Option<Track> {
        let displaced = self.current.take();
        self.current = self.next.take();
        self.next = Some(fresh);
        if self.current.is_none() {
            // Only reachable if `next` was empty; keep the pipeline moving.
            self.current = self.next.take();
        }
        displaced
    }

    /// Take every held track, e.g. for cleanup on shutdown.
    pub fn drain(&mut self) -> Vec<Track> {
        self.current.take().into_iter().chain(self.next.take()).collect()
    }

    pub fn held(&self) -> usize {
        usize::from(self.current.is_some()) + usize::from(self.next.is_some())
    }
}
