//! Prefetching search-driven radio.
//!
//! The [`scheduler::Scheduler`] plays one track while the
//! [`buffer::PrefetchBuffer`] downloads the next through a
//! [`fetcher::TrackSource`], and drops in a jingle every N tracks.

pub mod buffer;
pub mod cli;
pub mod error;
pub mod fetcher;
pub mod jingle;
pub mod player;
pub mod scheduler;
pub mod status;
pub mod track;

pub use error::{FatalError, FetchError, PlayError, SeedError};
pub use track::Track;
