use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tallystore::{
    AutoSaveCounter, Bounds, MutationKind, PendingReason, PersistOutcome, ReconcileOutcome,
    RemoteApi, backup_file_name,
};
use tokio::time::timeout;

pub fn show(counter: &AutoSaveCounter) -> Result<()> {
    let snapshot = counter.current_snapshot();
    println!(
        "{} (version {}, updated {}, from {:?})",
        snapshot.value,
        snapshot.version,
        snapshot.timestamp.to_rfc3339(),
        counter.load_source()
    );
    Ok(())
}

pub async fn mutate(counter: &AutoSaveCounter, kind: MutationKind, times: u32) -> Result<()> {
    // `-n 0` still applies the mutation once.
    let requested = times.max(1);
    let mut applied = 0;
    for _ in 0..requested {
        let accepted = match kind {
            MutationKind::Increment => counter.increment(),
            MutationKind::Decrement => counter.decrement(),
            MutationKind::Reset => counter.reset(),
        };
        if !accepted {
            break;
        }
        applied += 1;
    }

    counter.flush().await.context("failed to flush pending change")?;
    println!("value: {}", counter.current_snapshot().value);
    if let Some(outcome) = counter.last_outcome() {
        println!("{}", describe_outcome(&outcome));
    }
    if applied < requested {
        bail!(shortfall(kind, applied, requested, counter.config().bounds));
    }
    Ok(())
}

fn shortfall(kind: MutationKind, applied: u32, requested: u32, bounds: Bounds) -> String {
    format!(
        "{} stopped after {} of {}: value must stay within [{}, {}]",
        kind,
        applied,
        requested,
        bounds.min(),
        bounds.max()
    )
}

pub fn describe_outcome(outcome: &PersistOutcome) -> String {
    match outcome {
        PersistOutcome::Synced(snapshot) => format!("synced (version {})", snapshot.version),
        PersistOutcome::PendingSync { reason, .. } => match reason {
            PendingReason::Offline => "saved locally, pending sync (offline)".to_string(),
            PendingReason::Remote(err) => format!("saved locally, pending sync ({})", err),
        },
    }
}

pub fn session(counter: &AutoSaveCounter) -> Result<()> {
    let current = counter.session();
    println!("session {}", current.session_id);
    println!("  started:    {}", current.start_time.to_rfc3339());

    match counter.previous_session() {
        Some(previous) => {
            println!("previous session {}", previous.session_id);
            println!("  started:    {}", previous.start_time.to_rfc3339());
            println!("  last seen:  {}", previous.last_activity.to_rfc3339());
            println!(
                "  operations: {} ({} increments, {} decrements, {} resets)",
                previous.operations_count,
                previous.increments,
                previous.decrements,
                previous.resets
            );
        }
        None => println!("no previous session recorded"),
    }
    Ok(())
}

pub fn export(counter: &AutoSaveCounter, out: Option<PathBuf>) -> Result<()> {
    let path = out.unwrap_or_else(|| PathBuf::from(backup_file_name(Utc::now())));
    let body = counter.export_backup().context("failed to encode backup")?;
    ensure_parent_dir(&path)?;
    fs::write(&path, body)
        .with_context(|| format!("failed to write backup '{}'", path.display()))?;
    println!("backup written to {}", path.display());
    Ok(())
}

pub async fn import(counter: &AutoSaveCounter, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read backup '{}'", file.display()))?;
    counter
        .import_backup(&raw)
        .with_context(|| format!("backup '{}' rejected", file.display()))?;
    counter.flush().await.context("failed to flush imported state")?;
    println!("restored value {}", counter.current_snapshot().value);
    if let Some(outcome) = counter.last_outcome() {
        println!("{}", describe_outcome(&outcome));
    }
    Ok(())
}

pub async fn sync(counter: &AutoSaveCounter) -> Result<()> {
    match counter.sync_now().await {
        ReconcileOutcome::Skipped => println!("offline, nothing to reconcile"),
        ReconcileOutcome::RemoteAdopted(snapshot) => println!(
            "adopted remote value {} (version {})",
            snapshot.value, snapshot.version
        ),
        ReconcileOutcome::LocalPushed(outcome) => {
            println!("pushed local value: {}", describe_outcome(&outcome))
        }
        ReconcileOutcome::UpToDate => println!("already up to date"),
        ReconcileOutcome::Failed(err) => bail!("reconciliation failed: {}", err),
    }
    Ok(())
}

pub async fn health(remote: Option<Arc<dyn RemoteApi>>, call_timeout: Duration) -> Result<()> {
    let Some(remote) = remote else {
        bail!("no remote configured; set TALLY_REMOTE_URL or pass --remote-url");
    };
    match timeout(call_timeout, remote.health()).await {
        Ok(Ok(())) => {
            println!("remote is healthy");
            Ok(())
        }
        Ok(Err(err)) => bail!("remote is unhealthy: {}", err),
        Err(_) => bail!("remote did not answer within {:?}", call_timeout),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}
