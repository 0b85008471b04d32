//! Jingle selection and pacing.

use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tracing::debug;

const JINGLE_EXTENSIONS: &[&str] = &["mp3", "m4a"];

fn is_jingle_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| JINGLE_EXTENSIONS.iter().any(|j| e.eq_ignore_ascii_case(j)))
        .unwrap_or(false)
}

/// Pick one jingle uniformly at random from the top level of `dir`.
///
/// A missing or unreadable directory, or one with no mp3/m4a files, yields
/// `None`. Nothing is created or modified.
pub fn pick_jingle(dir: &Path) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!("jingles: {} unavailable: {}", dir.display(), e);
            return None;
        }
    };

    let jingles: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_jingle_file(p))
        .collect();

    jingles.choose(&mut rand::thread_rng()).cloned()
}

/// Counts completed rotations and fires once every `interval` of them.
#[derive(Debug, Clone)]
pub struct JingleCounter {
    interval: u32,
    count: u32,
}

impl JingleCounter {
    /// `interval == 0` disables jingles.
    pub fn new(interval: u32) -> Self {
        Self { interval, count: 0 }
    }

    /// Record one rotation. Returns true when a jingle is due; the count
    /// resets to 0 at that point.
    pub fn record_track(&mut self) -> bool {
        if self.interval == 0 {
            return false;
        }
        self.count += 1;
        if self.count >= self.interval {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }
}
