//! Blocking playback through mpv.
//!
//! Each call spawns one mpv process for one local file and waits for it to
//! exit. mpv inherits the terminal's stdin, so pressing `q` skips the
//! current track.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use roll_proto::config::Config;
use tokio::process::Command;
use tracing::debug;

use crate::error::PlayError;

#[async_trait]
pub trait Player: Send + Sync {
    /// Play `path` to completion.
    async fn play(&self, path: &Path) -> Result<(), PlayError>;
}

#[derive(Debug, Clone)]
pub struct MpvPlayer {
    mpv: PathBuf,
}

impl MpvPlayer {
    pub fn new(mpv: PathBuf) -> Self {
        Self { mpv }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mpv = match &config.tools.mpv {
            Some(p) => p.clone(),
            None => roll_proto::platform::find_mpv_binary()
                .context("mpv binary not found (set tools.mpv or MPV_PATH)")?,
        };
        Ok(Self::new(mpv))
    }

    pub fn mpv(&self) -> &Path {
        &self.mpv
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.mpv);
        cmd.arg("--no-video")
            .arg("--really-quiet")
            .arg("--force-seekable=yes")
            .arg("--")
            .arg(path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Player for MpvPlayer {
    async fn play(&self, path: &Path) -> Result<(), PlayError> {
        debug!("mpv: playing {}", path.display());
        let status = self
            .command(path)
            .status()
            .await
            .map_err(PlayError::Spawn)?;
        if status.success() {
            Ok(())
        } else {
            Err(PlayError::Exited {
                code: status.code(),
            })
        }
    }
}
