use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

/// Media ids of the tracks currently alive in this process.
///
/// A fetcher reserves an id with [`HeldIds::try_hold`] before downloading and
/// moves the [`Hold`] into the resulting [`Track`]. The id is released when
/// the track is removed, forgotten or dropped. Files left in the cache by
/// earlier runs hold nothing.
#[derive(Debug, Clone, Default)]
pub struct HeldIds(Arc<Mutex<HashSet<String>>>);

impl HeldIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `id`, or `None` if a live track already holds it.
    pub fn try_hold(&self, id: &str) -> Option<Hold> {
        if !self.ids().insert(id.to_string()) {
            return None;
        }
        Some(Hold {
            ids: self.clone(),
            id: id.to_string(),
        })
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<String>> {
        // the set stays consistent even if a holder panicked
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reservation of one id in a [`HeldIds`] set, released on drop.
#[derive(Debug)]
pub struct Hold {
    ids: HeldIds,
    id: String,
}

impl Drop for Hold {
    fn drop(&mut self) {
        self.ids.ids().remove(&self.id);
    }
}

/// A downloaded audio file sitting in the cache directory.
///
/// Owned by exactly one buffer slot at a time and not `Clone`. The file is
/// removed with [`Track::remove`] or kept with [`Track::forget`]; a track
/// dropped any other way (an aborted prefetch, a cancelled seed) deletes its
/// file on the spot.
#[derive(Debug)]
pub struct Track {
    path: PathBuf,
    id: String,
    title: String,
    hold: Option<Hold>,
    owns_file: bool,
}

impl Track {
    pub fn new(path: PathBuf, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            path,
            id: id.into(),
            title: title.into(),
            hold: None,
            owns_file: true,
        }
    }

    /// Attach the id reservation this track releases when it goes away.
    pub fn with_hold(mut self, hold: Hold) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Media id as reported by the search tool.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Delete the backing file. A file that is already gone counts as removed.
    pub async fn remove(mut self) -> std::io::Result<()> {
        self.owns_file = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Drop the handle but leave the file on disk.
    pub fn forget(mut self) -> PathBuf {
        self.owns_file = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        if !self.owns_file {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Discarded unplayed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete {}: {}", self.path.display(), e),
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.title, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(dir: &Path, id: &str) -> PathBuf {
        let path = dir.join(format!("song [{id}].m4a"));
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[tokio::test]
    async fn test_remove_deletes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = song(dir.path(), "abc");

        let track = Track::new(path.clone(), "abc", "song");
        assert!(track.exists());
        track.remove().await.unwrap();
        assert!(!path.exists());

        let ghost = Track::new(path, "abc", "song");
        assert!(!ghost.exists());
        ghost.remove().await.unwrap();
    }

    #[test]
    fn test_display() {
        let track = Track::new(PathBuf::from("/tmp/x.m4a"), "id1", "Title");
        assert_eq!(track.to_string(), "Title [id1]");
        assert_eq!(track.forget(), PathBuf::from("/tmp/x.m4a"));
    }

    #[test]
    fn test_dropped_track_deletes_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = song(dir.path(), "abc");
        drop(Track::new(path.clone(), "abc", "song"));
        assert!(!path.exists());
    }

    #[test]
    fn test_forget_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = song(dir.path(), "abc");
        let kept = Track::new(path.clone(), "abc", "song").forget();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn test_hold_is_exclusive_until_released() {
        let held = HeldIds::new();
        let hold = held.try_hold("abc").unwrap();
        assert!(held.try_hold("abc").is_none());
        assert!(held.try_hold("def").is_some());
        drop(hold);
        assert!(held.try_hold("abc").is_some());
    }

    #[tokio::test]
    async fn test_track_releases_hold_on_remove_and_forget() {
        let dir = tempfile::tempdir().unwrap();
        let held = HeldIds::new();

        let a = Track::new(song(dir.path(), "a"), "a", "A").with_hold(held.try_hold("a").unwrap());
        let b = Track::new(song(dir.path(), "b"), "b", "B").with_hold(held.try_hold("b").unwrap());
        assert!(held.try_hold("a").is_none());
        assert!(held.try_hold("b").is_none());

        a.remove().await.unwrap();
        assert!(held.try_hold("a").is_some());

        let kept = b.forget();
        assert!(kept.exists());
        assert!(held.try_hold("b").is_some());
    }
}
