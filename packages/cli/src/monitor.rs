//! `status`, `load-model`, `watch` and `analyze`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fightwatch_auth::Session;
use fightwatch_cli_utils::{MultiProgress, spinner, status_line};
use fightwatch_incident_models::SourceFilter;
use fightwatch_monitor::MonitorContext;
use fightwatch_sampler::{DirectoryFrameSource, FrameSource, SnapshotFileSource};

use crate::WatchArgs;
use crate::account::require_user;
use crate::render;

/// Queries the service and prints the feature catalog.
///
/// # Errors
///
/// Returns an error if nobody is logged in or the service is unreachable.
pub async fn status(
    ctx: &MonitorContext,
    session: &Session,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    require_user(session)?;

    let bar = spinner(multi, &format!("Contacting {}", ctx.client().base_url()));
    let overview = ctx.bootstrap().await;
    bar.finish_and_clear();

    render::overview(&overview?);
    Ok(())
}

/// Triggers a model load and reports the resulting flag.
///
/// # Errors
///
/// Returns an error if nobody is logged in or the request fails.
pub async fn load_model(
    ctx: &MonitorContext,
    session: &Session,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    require_user(session)?;

    let bar = spinner(multi, "Loading detection model");
    let response = ctx.load_model().await;
    bar.finish_and_clear();
    let response = response?;

    if response.model_loaded {
        println!("Model loaded.");
    } else {
        println!(
            "Model not loaded: {}",
            response.message.as_deref().unwrap_or("no reason given")
        );
    }
    Ok(())
}

/// Runs a live sampler until Ctrl-C or `--duration`, then prints the
/// dashboard (admins) or the incident count (everyone else).
///
/// # Errors
///
/// Returns an error if nobody is logged in, the source arguments are
/// invalid, or Ctrl-C cannot be listened for.
pub async fn watch(
    ctx: &MonitorContext,
    session: &Session,
    multi: &MultiProgress,
    args: WatchArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = require_user(session)?;
    let WatchArgs {
        source,
        snapshot,
        frames,
        looping,
        url,
        camera_id,
        duration,
        filter,
    } = args;

    let config = ctx.sampler_config(source.into(), camera_id, url.as_deref())?;
    let frames: Arc<dyn FrameSource> = match (snapshot, frames) {
        (Some(file), _) => Arc::new(SnapshotFileSource::new(file)),
        (None, Some(dir)) => {
            let frames = DirectoryFrameSource::open(&dir, looping)?;
            if frames.frame_count() == 0 {
                log::warn!("{} contains no JPEG frames", dir.display());
            }
            Arc::new(frames)
        }
        (None, None) => return Err("either --snapshot or --frames is required".into()),
    };

    let handle = ctx.start_sampler(config, frames);
    let status = status_line(multi, "Watching (Ctrl-C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut refresh = tokio::time::interval(Duration::from_millis(500));

    let signal = loop {
        tokio::select! {
            result = &mut ctrl_c => break result,
            () = &mut deadline => break Ok(()),
            _ = refresh.tick() => {
                let stats = handle.stats();
                status.set_message(format!(
                    "{} frame(s) classified, {} incident(s), {} failed, {} skipped",
                    stats.classified, stats.incidents, stats.failed, stats.skipped
                ));
            }
        }
    };

    let stats = handle.stop();
    status.finish_and_clear();
    signal?;

    println!(
        "Stopped after {} tick(s): {} classified, {} failed, {} skipped, {} incident(s).",
        stats.ticks, stats.classified, stats.failed, stats.skipped, stats.incidents
    );

    if user.role.is_admin() {
        render::dashboard(&ctx.dashboard(filter));
    } else {
        println!("{} incident(s) recorded.", ctx.incidents().len());
    }
    Ok(())
}

/// Uploads one video for analysis and prints the result.
///
/// # Errors
///
/// Returns an error if nobody is logged in, the model is not loaded, or
/// the analysis fails.
pub async fn analyze(
    ctx: &MonitorContext,
    session: &Session,
    multi: &MultiProgress,
    file: &Path,
    filter: SourceFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = require_user(session)?;

    let bar = spinner(multi, &format!("Analyzing {}", file.display()));
    let report = ctx.analyze_upload(file).await;
    bar.finish_and_clear();

    match report? {
        Some(report) => render::upload_report(&report),
        None => {
            println!("{} is not a readable video file; nothing analyzed.", file.display());
            return Ok(());
        }
    }

    if user.role.is_admin() {
        println!();
        render::dashboard(&ctx.dashboard(filter));
    }
    Ok(())
}
