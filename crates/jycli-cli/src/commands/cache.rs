use super::{json_pretty, CliError, EXIT_FAILURE, EXIT_SUCCESS};
use jycli_core::{install_signal_handler, shutdown_requested, StoreLock};
use jycli_remote::CancelToken;
use jycli_schema::Coordinate;
use jycli_store::{verify_cache_integrity, ArtifactStore, CacheGc, CacheLayout, LockIndex};

fn store_error(e: impl std::fmt::Display) -> CliError {
    CliError::from(format!("cache: {e}"))
}

/// Cached artifacts with their size and fetch time.
pub fn list(layout: &CacheLayout, json: bool) -> Result<u8, CliError> {
    let records = ArtifactStore::new(layout.clone())
        .list()
        .map_err(store_error)?;
    let locks = LockIndex::new(layout.clone())
        .list_keys()
        .map_err(store_error)?;

    if json {
        let payload = serde_json::json!({
            "root": layout.root(),
            "artifacts": records,
            "locks": locks,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    if records.is_empty() {
        println!("cache is empty ({})", layout.root().display());
        return Ok(EXIT_SUCCESS);
    }
    println!("{:<56} {:<4} {:>10}  FETCHED", "COORDINATE", "KIND", "SIZE");
    let mut total = 0u64;
    for record in &records {
        total += record.digests.size;
        println!(
            "{:<56} {:<4} {:>10}  {}",
            record.coordinate.to_string(),
            record.kind.to_string(),
            record.digests.size,
            record.fetched_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!(
        "{} files, {total} bytes, {} resolution locks",
        records.len(),
        locks.len()
    );
    Ok(EXIT_SUCCESS)
}

/// Re-hash every artifact and re-check every lock.
pub fn verify(layout: &CacheLayout, json: bool) -> Result<u8, CliError> {
    let report = verify_cache_integrity(layout).map_err(store_error)?;

    if json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|f| serde_json::json!({ "item": f.item, "reason": f.reason }))
            .collect();
        let payload = serde_json::json!({
            "artifacts_checked": report.artifacts_checked,
            "artifacts_passed": report.artifacts_passed,
            "locks_checked": report.locks_checked,
            "locks_passed": report.locks_passed,
            "failed": failed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "cache integrity: {}/{} artifacts, {}/{} locks passed",
            report.artifacts_passed,
            report.artifacts_checked,
            report.locks_passed,
            report.locks_checked
        );
        for f in &report.failed {
            println!("  FAIL {}: {}", f.item, f.reason);
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}

pub fn gc(layout: &CacheLayout, dry_run: bool, json: bool) -> Result<u8, CliError> {
    install_signal_handler(&CancelToken::new());
    let _lock = StoreLock::acquire(&layout.lock_file()).map_err(|e| format!("cache lock: {e}"))?;
    let report = CacheGc::new(layout.clone())
        .collect_with_cancel(dry_run, shutdown_requested)
        .map_err(store_error)?;

    if json {
        let payload = serde_json::json!({
            "dry_run": dry_run,
            "orphaned_artifacts": report.orphaned_artifacts,
            "unrecorded_files": report.unrecorded_files,
            "stale_staging": report.stale_staging,
            "removed_artifacts": report.removed_artifacts,
            "removed_files": report.removed_files,
            "freed_bytes": report.freed_bytes,
        });
        println!("{}", json_pretty(&payload)?);
    } else if dry_run {
        println!(
            "gc: would remove {} artifacts, {} unrecorded files, {} staging files",
            report.orphaned_artifacts.len(),
            report.unrecorded_files.len(),
            report.stale_staging.len()
        );
        for coordinate in &report.orphaned_artifacts {
            println!("  {coordinate}");
        }
    } else {
        println!(
            "gc: removed {} artifacts and {} other files, freed {} bytes",
            report.removed_artifacts, report.removed_files, report.freed_bytes
        );
    }
    Ok(EXIT_SUCCESS)
}

pub fn evict(layout: &CacheLayout, coordinate: &str, json: bool) -> Result<u8, CliError> {
    let coordinate = Coordinate::parse(coordinate).map_err(|e| format!("invalid coordinate: {e}"))?;
    let _lock = StoreLock::acquire(&layout.lock_file()).map_err(|e| format!("cache lock: {e}"))?;
    let report = CacheGc::new(layout.clone())
        .evict(&coordinate)
        .map_err(store_error)?;

    if json {
        let payload = serde_json::json!({
            "coordinate": coordinate,
            "removed_artifact": report.removed_artifact,
            "removed_locks": report.removed_locks,
        });
        println!("{}", json_pretty(&payload)?);
    } else if report.removed_artifact {
        println!(
            "evicted {coordinate} and {} resolution locks",
            report.removed_locks.len()
        );
    } else {
        println!("{coordinate} is not cached");
    }
    Ok(EXIT_SUCCESS)
}
