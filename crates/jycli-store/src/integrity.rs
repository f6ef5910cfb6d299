use crate::artifacts::ArtifactStore;
use crate::layout::CacheLayout;
use crate::locks::LockIndex;
use crate::StoreError;
use jycli_schema::ArtifactKind;

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub artifacts_checked: usize,
    pub artifacts_passed: usize,
    pub locks_checked: usize,
    pub locks_passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct IntegrityFailure {
    pub item: String,
    pub reason: String,
}

/// Recompute every artifact digest and check every stored lock: its key must
/// match its roots and each of its jars must be cached with the recorded digest.
pub fn verify_cache_integrity(layout: &CacheLayout) -> Result<IntegrityReport, StoreError> {
    let artifacts = ArtifactStore::new(layout.clone());
    let locks = LockIndex::new(layout.clone());

    let records = artifacts.list()?;
    let all_locks = locks.list_with_errors()?;

    let mut report = IntegrityReport {
        artifacts_checked: records.len(),
        locks_checked: all_locks.len(),
        ..Default::default()
    };

    for record in &records {
        let item = format!("{} ({})", record.coordinate, record.kind);
        match artifacts.verify(&record.coordinate, record.kind) {
            Ok(_) => report.artifacts_passed += 1,
            Err(StoreError::IntegrityFailure { actual, .. }) => {
                report.failed.push(IntegrityFailure {
                    item,
                    reason: format!("digest mismatch: got {actual}"),
                });
            }
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    item,
                    reason: format!("read error: {e}"),
                });
            }
        }
    }

    for entry in all_locks {
        let lock = match entry {
            Ok(lock) => lock,
            Err((key, e)) => {
                report.failed.push(IntegrityFailure {
                    item: format!("lock {}", key.short()),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let mut ok = true;
        for module in &lock.modules {
            let problem = match artifacts.record(&module.coordinate, ArtifactKind::Jar)? {
                None => Some("module is no longer cached".to_owned()),
                Some(r) if r.digests.blake3 != module.blake3 => Some(format!(
                    "cached digest {} differs from locked {}",
                    r.digests.blake3, module.blake3
                )),
                Some(_) => None,
            };
            if let Some(reason) = problem {
                ok = false;
                report.failed.push(IntegrityFailure {
                    item: format!("lock {} -> {}", lock.lock_key.short(), module.coordinate),
                    reason,
                });
            }
        }
        if ok {
            report.locks_passed += 1;
        }
    }

    Ok(report)
}
