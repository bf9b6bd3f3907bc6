//! Upload, status and download commands

use std::path::Path;

use anyhow::{Context, Result, bail};
use mu_core::{JobId, JobStatus, Stem, format_duration, strip_extension};
use mu_jobs::{PollEvent, PollOutcome, SelectedFile};
use tokio::sync::broadcast;

use crate::app::App;

pub async fn upload(app: &App, path: &Path, wait: bool) -> Result<()> {
    app.require_login()?;
    let file = SelectedFile::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // Jobs still processing on the server keep the gate closed
    app.tracker.resume().await?;

    let events = app.tracker.subscribe();
    let id = app.tracker.upload(Some(file)).await?;
    println!("Uploaded. Job id: {id}");

    if wait {
        follow(app, &id, events).await
    } else {
        println!("Follow it with `melody-unmix status {id} --watch`.");
        Ok(())
    }
}

pub async fn status(app: &App, id: &str, watch: bool) -> Result<()> {
    app.require_login()?;
    let id = JobId::from(id);

    if !watch {
        let report = app.api.job_status(&id).await?;
        let status = report.normalized();
        println!("Job {id}: {status}");
        if let Some(title) = report.title.as_deref() {
            println!("Title:    {}", strip_extension(title));
        }
        println!("Duration: {}", format_duration(report.duration));
        if let Some(stems) = report.stem_count {
            println!("Stems:    {stems}");
        }
        return Ok(());
    }

    let events = app.tracker.subscribe();
    app.tracker.resume().await?;
    match app.tracker.board().find(&id) {
        None => bail!("Job {id} not found"),
        Some(job) if !app.tracker.registry().is_polling(&id) => {
            println!("Job {id}: {}", job.status);
            Ok(())
        }
        Some(_) => follow(app, &id, events).await,
    }
}

pub async fn list(app: &App) -> Result<()> {
    app.require_login()?;
    let entries = app.api.list_jobs().await?;
    if entries.is_empty() {
        println!("No tracks uploaded yet.");
        return Ok(());
    }

    println!("{:<8} {:<12} {:>8} {:>9}  TITLE", "ID", "STATUS", "LENGTH", "SIZE");
    for entry in &entries {
        println!(
            "{:<8} {:<12} {:>8} {:>9}  {}",
            entry.audio_id.as_str(),
            JobStatus::normalize(&entry.status).label(),
            format_duration(entry.duration),
            entry
                .size_mb
                .map(|mb| format!("{mb:.2} MB"))
                .unwrap_or_else(|| "-".to_string()),
            strip_extension(&entry.title),
        );
    }
    Ok(())
}

pub async fn download(app: &App, id: &str, stem: Stem, out: &Path) -> Result<()> {
    app.require_login()?;
    let id = JobId::from(id);

    let title = app
        .api
        .list_jobs()
        .await?
        .into_iter()
        .find(|entry| entry.audio_id == id)
        .map(|entry| strip_extension(&entry.title).to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| format!("track-{id}"));

    let download = app.api.download_stem(&id, stem, &title).await?;
    let path = download.save_to(out).await?;
    println!("Saved {}", path.display());
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    app.require_login()?;
    app.tracker.delete(&JobId::from(id)).await?;
    println!("Deleted job {id}.");
    Ok(())
}

/// Print progress for `id` until its poller finishes.
async fn follow(app: &App, id: &JobId, mut events: broadcast::Receiver<PollEvent>) -> Result<()> {
    let mut last = None;
    let outcome = loop {
        match events.recv().await {
            Ok(PollEvent::Updated { id: job, status, .. }) if &job == id => {
                if last != Some(status) {
                    println!("{status}");
                    last = Some(status);
                }
            }
            Ok(PollEvent::Scheduled { id: job, delay }) if &job == id => {
                log::debug!("[Cli] Next check in {:?}", delay);
            }
            Ok(PollEvent::Finished { id: job, outcome }) if &job == id => break outcome,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {
                if !app.tracker.registry().is_polling(id) {
                    break PollOutcome::Cancelled;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break PollOutcome::Cancelled,
        }
    };

    match outcome {
        PollOutcome::Processed => {
            println!("Stems are ready. Fetch them with `melody-unmix download {id}`.");
            Ok(())
        }
        other => bail!("Job {id} {}", other.describe()),
    }
}
