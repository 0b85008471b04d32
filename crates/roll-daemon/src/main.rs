use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use roll_daemon::cli::Args;
use roll_daemon::fetcher::YtDlpFetcher;
use roll_daemon::player::MpvPlayer;
use roll_daemon::scheduler::{Scheduler, SchedulerOptions};
use roll_daemon::status;
use roll_proto::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let log_path = status::init(
        &roll_proto::platform::data_dir(),
        status::status_threshold(args.verbose, args.quiet),
    )?;
    info!("Log file: {:?}", log_path);

    let config_path = args.config_path();
    let mut config = Config::load_from(&config_path)?;
    info!("Config loaded from: {:?}", config_path);
    args.apply(&mut config);
    config.validate()?;

    std::fs::create_dir_all(&config.paths.cache_dir)
        .with_context(|| format!("creating cache dir {}", config.paths.cache_dir.display()))?;

    let fetcher = YtDlpFetcher::from_config(&config)?;
    let player = MpvPlayer::from_config(&config)?;
    info!("Using yt-dlp: {}", fetcher.yt_dlp().display());
    info!("Using mpv   : {}", player.mpv().display());
    info!("Query       : {:?}", config.stream.query);
    info!("Cache dir   : {}", config.paths.cache_dir.display());
    if config.stream.jingle_interval > 0 {
        info!(
            "Jingles     : {} every {} track(s)",
            config.paths.jingles_dir.display(),
            config.stream.jingle_interval
        );
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stopping…");
                cancel.cancel();
            }
        });
    }

    let scheduler = Scheduler::new(
        Arc::new(fetcher),
        player,
        config.stream.query.as_str(),
        SchedulerOptions::from_config(&config),
        cancel,
    );

    match scheduler.run().await {
        Ok(summary) => {
            info!("Done. Played {} song(s).", summary.tracks_played);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
