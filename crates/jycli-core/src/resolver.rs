use crate::concurrency::{CoordinateLock, CoordinateLockError};
use crate::flight::FlightTable;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use jycli_remote::{ArtifactSource, CancelToken, Interrupted, RemoteError};
use jycli_schema::{
    compute_lock_key, interpreter_coordinate, ArtifactKind, Checksum, ChecksumAlgorithm,
    Coordinate, Exclusion, LockKey, LockedModule, Manifest, ModuleId, ModuleOrigin, Pom,
    ResolutionLock, INTERPRETER_ARTIFACT, INTERPRETER_GROUP,
};
use jycli_store::{ArtifactDigests, ArtifactRecord, ArtifactStore, CacheLayout, LockIndex, StoreError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Fetches running at once while walking one level of the graph.
pub const DEFAULT_PARALLELISM: usize = 8;

/// Parent POM chains longer than this are treated as cyclic.
const MAX_PARENT_DEPTH: usize = 16;

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("{coordinate} not found (tried: {})", .tried.join(", "))]
    NotFound {
        coordinate: Coordinate,
        tried: Vec<String>,
    },
    #[error("checksum mismatch for {coordinate}: expected {expected}, got {actual}")]
    Integrity {
        coordinate: Coordinate,
        expected: String,
        actual: String,
    },
    #[error("dependency resolution cancelled")]
    Cancelled,
    #[error("dependency resolution timed out")]
    TimedOut,
    #[error("fetching {coordinate} failed: {error}")]
    Source {
        coordinate: Coordinate,
        error: Arc<RemoteError>,
    },
    #[error("cache error: {0}")]
    Store(Arc<StoreError>),
    #[error("unusable POM of {coordinate}: {reason}")]
    Pom {
        coordinate: Coordinate,
        reason: String,
    },
    #[error("invalid root coordinate: {0}")]
    InvalidRoot(String),
}

impl From<StoreError> for ResolveError {
    fn from(e: StoreError) -> Self {
        ResolveError::Store(Arc::new(e))
    }
}

impl From<Interrupted> for ResolveError {
    fn from(e: Interrupted) -> Self {
        match e {
            Interrupted::Cancelled => ResolveError::Cancelled,
            Interrupted::TimedOut => ResolveError::TimedOut,
        }
    }
}

impl From<CoordinateLockError> for ResolveError {
    fn from(e: CoordinateLockError) -> Self {
        match e {
            CoordinateLockError::Io(io) => StoreError::Io(io).into(),
            CoordinateLockError::Interrupted(i) => i.into(),
        }
    }
}

impl ResolveError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ResolveError::Cancelled | ResolveError::TimedOut)
    }
}

/// One module on the resolved classpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModule {
    pub coordinate: Coordinate,
    pub path: PathBuf,
    pub digests: ArtifactDigests,
    pub depth: u32,
    pub origin: ModuleOrigin,
}

impl ResolvedModule {
    fn to_locked(&self) -> LockedModule {
        LockedModule {
            coordinate: self.coordinate.clone(),
            blake3: self.digests.blake3.clone(),
            sha256: self.digests.sha256.clone(),
            size: self.digests.size,
            depth: self.depth,
            origin: self.origin.clone(),
        }
    }
}

/// Ordered, deduplicated outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModuleSet {
    pub lock_key: LockKey,
    /// Roots in declaration order.
    pub roots: Vec<Coordinate>,
    /// Classpath order: roots first, then by distance.
    pub modules: Vec<ResolvedModule>,
    /// True when served from a stored lock without walking POMs.
    pub from_lock: bool,
}

impl ResolvedModuleSet {
    pub fn classpath(&self) -> Vec<PathBuf> {
        self.modules.iter().map(|m| m.path.clone()).collect()
    }

    pub fn coordinates(&self) -> Vec<&Coordinate> {
        self.modules.iter().map(|m| &m.coordinate).collect()
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ResolvedModule> {
        self.modules.iter().find(|m| &m.coordinate.module_id() == id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn to_lock(&self) -> ResolutionLock {
        ResolutionLock::new(
            &self.roots,
            self.modules.iter().map(ResolvedModule::to_locked).collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Never contact a source; everything must already be cached.
    pub offline: bool,
    /// Ignore stored locks and re-download every file, pinning each to the
    /// digest the previous lock recorded.
    pub refresh: bool,
    pub parallelism: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            offline: false,
            refresh: false,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

type FetchOutcome = Result<ArtifactRecord, ResolveError>;

/// Maven dependency resolver over an explicit cache and an ordered list of
/// sources.
///
/// Safe to share behind an `Arc`: concurrent requests for the same file are
/// collapsed in-process by a single-flight table and across processes by a
/// per-coordinate file lock.
pub struct Resolver {
    store: ArtifactStore,
    locks: LockIndex,
    sources: Vec<Arc<dyn ArtifactSource>>,
    options: ResolveOptions,
    flights: FlightTable<(Coordinate, ArtifactKind), FetchOutcome>,
}

/// State of one resolution call.
struct Walk<'a> {
    cancel: &'a CancelToken,
    expected: HashMap<Coordinate, Checksum>,
    /// With `refresh`, cache entries older than this are re-downloaded.
    fresh_after: Option<DateTime<Utc>>,
    poms: Mutex<HashMap<Coordinate, Option<Arc<Pom>>>>,
}

struct Pending {
    coordinate: Coordinate,
    depth: u32,
    origin: ModuleOrigin,
    exclusions: Arc<Vec<Exclusion>>,
}

impl Resolver {
    pub fn new(store: ArtifactStore, locks: LockIndex, sources: Vec<Arc<dyn ArtifactSource>>) -> Self {
        Self {
            store,
            locks,
            sources,
            options: ResolveOptions::default(),
            flights: FlightTable::new(),
        }
    }

    /// Resolver over the cache at `layout`, creating its directories.
    pub fn open(
        layout: &CacheLayout,
        sources: Vec<Arc<dyn ArtifactSource>>,
    ) -> Result<Self, ResolveError> {
        layout.initialize()?;
        Ok(Self::new(
            ArtifactStore::new(layout.clone()),
            LockIndex::new(layout.clone()),
            sources,
        ))
    }

    #[must_use]
    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn locks(&self) -> &LockIndex {
        &self.locks
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_owned()).collect()
    }

    /// Manifest dependencies in declaration order, then the interpreter jar
    /// unless the manifest pins one itself.
    pub fn roots(manifest: &Manifest) -> Result<Vec<Coordinate>, ResolveError> {
        let mut roots = manifest.dependencies.clone();
        let declares_interpreter = roots
            .iter()
            .any(|c| c.group() == INTERPRETER_GROUP && c.artifact() == INTERPRETER_ARTIFACT);
        if !declares_interpreter {
            let interpreter = interpreter_coordinate(&manifest.interpreter_version)
                .map_err(|e| ResolveError::InvalidRoot(e.to_string()))?;
            roots.push(interpreter);
        }
        Ok(roots)
    }

    /// Resolve everything a manifest needs on the classpath.
    pub fn resolve(
        &self,
        manifest: &Manifest,
        cancel: &CancelToken,
    ) -> Result<ResolvedModuleSet, ResolveError> {
        let roots = Self::roots(manifest)?;
        self.resolve_roots(&roots, &manifest.checksums, cancel)
    }

    pub fn resolve_roots(
        &self,
        roots: &[Coordinate],
        checksums: &BTreeMap<Coordinate, Checksum>,
        cancel: &CancelToken,
    ) -> Result<ResolvedModuleSet, ResolveError> {
        cancel.check()?;
        let lock_key = compute_lock_key(roots);
        let previous = match self.locks.get(&lock_key) {
            Ok(lock) => lock,
            Err(e) => {
                warn!("ignoring unreadable lock {}: {e}", lock_key.short());
                None
            }
        };

        if !self.options.refresh {
            match previous {
                Some(ref lock) if lock.matches_declaration(roots) => {
                    return self.from_lock(lock, roots, checksums, cancel);
                }
                // Same roots in another order: walk again so the classpath
                // and tie-breaks follow this declaration. Files come from the cache.
                Some(_) => debug!("lock {} was recorded for another root order", lock_key.short()),
                None => {}
            }
        }

        let mut expected = HashMap::new();
        if self.options.refresh {
            if let Some(ref lock) = previous {
                for m in &lock.modules {
                    expected.insert(m.coordinate.clone(), Checksum::blake3(m.blake3.clone()));
                }
            }
        }
        for (coordinate, sum) in checksums {
            expected.insert(coordinate.clone(), sum.clone());
        }

        let walk = Walk {
            cancel,
            expected,
            fresh_after: self.options.refresh.then(Utc::now),
            poms: Mutex::new(HashMap::new()),
        };
        let modules = self.walk(roots, &walk)?;
        let set = ResolvedModuleSet {
            lock_key,
            roots: roots.to_vec(),
            modules,
            from_lock: false,
        };
        self.locks.put(&set.to_lock())?;
        info!(
            "resolved {} modules for {} roots (lock {})",
            set.len(),
            roots.len(),
            set.lock_key.short()
        );
        Ok(set)
    }

    /// Make one file available in the cache, fetching it if needed.
    pub fn fetch(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        cancel: &CancelToken,
    ) -> Result<ArtifactRecord, ResolveError> {
        self.ensure(coordinate, kind, None, None, cancel)
    }

    fn from_lock(
        &self,
        lock: &ResolutionLock,
        roots: &[Coordinate],
        checksums: &BTreeMap<Coordinate, Checksum>,
        cancel: &CancelToken,
    ) -> Result<ResolvedModuleSet, ResolveError> {
        let mut modules = Vec::with_capacity(lock.modules.len());
        for locked in &lock.modules {
            cancel.check()?;
            let pinned = Checksum::blake3(locked.blake3.clone());
            let record = self.ensure(&locked.coordinate, ArtifactKind::Jar, Some(&pinned), None, cancel)?;
            check_expected(&locked.coordinate, &record.digests, checksums.get(&locked.coordinate))?;
            modules.push(ResolvedModule {
                path: self.store.path(&locked.coordinate, ArtifactKind::Jar),
                coordinate: locked.coordinate.clone(),
                digests: record.digests,
                depth: locked.depth,
                origin: locked.origin.clone(),
            });
        }
        debug!("reusing lock {} ({} modules)", lock.lock_key.short(), modules.len());
        Ok(ResolvedModuleSet {
            lock_key: lock.lock_key.clone(),
            roots: roots.to_vec(),
            modules,
            from_lock: true,
        })
    }

    /// Breadth-first walk; the nearest declaration of a module wins and ties
    /// go to the first one discovered.
    fn walk(&self, roots: &[Coordinate], walk: &Walk<'_>) -> Result<Vec<ResolvedModule>, ResolveError> {
        let mut selected: IndexMap<ModuleId, ResolvedModule> = IndexMap::new();
        let no_exclusions = Arc::new(Vec::new());
        let mut level: Vec<Pending> = roots
            .iter()
            .map(|c| Pending {
                coordinate: c.clone(),
                depth: 0,
                origin: ModuleOrigin::Declared,
                exclusions: Arc::clone(&no_exclusions),
            })
            .collect();

        while !level.is_empty() {
            walk.cancel.check()?;
            let mut claimed = HashSet::new();
            let accepted: Vec<Pending> = level
                .into_iter()
                .filter(|p| {
                    let id = p.coordinate.module_id();
                    if selected.contains_key(&id) || !claimed.insert(id) {
                        trace!("{} omitted for a nearer declaration", p.coordinate);
                        return false;
                    }
                    true
                })
                .collect();

            let fetched = self.fetch_level(&accepted, walk)?;
            let mut next = Vec::new();
            for (pending, (record, pom)) in accepted.into_iter().zip(fetched) {
                let id = pending.coordinate.module_id();
                if let Some(pom) = pom {
                    let deps = pom.runtime_dependencies().map_err(|e| ResolveError::Pom {
                        coordinate: pending.coordinate.clone(),
                        reason: e.to_string(),
                    })?;
                    for dep in deps {
                        let dep_id = dep.coordinate.module_id();
                        if dep_id == id || selected.contains_key(&dep_id) {
                            continue;
                        }
                        if pending.exclusions.iter().any(|x| x.matches(&dep_id)) {
                            debug!("{} excluded below {}", dep.coordinate, pending.coordinate);
                            continue;
                        }
                        let exclusions = if dep.exclusions.is_empty() {
                            Arc::clone(&pending.exclusions)
                        } else {
                            let mut all = (*pending.exclusions).clone();
                            all.extend(dep.exclusions);
                            Arc::new(all)
                        };
                        next.push(Pending {
                            coordinate: dep.coordinate,
                            depth: pending.depth + 1,
                            origin: ModuleOrigin::Transitive {
                                parent: pending.coordinate.clone(),
                            },
                            exclusions,
                        });
                    }
                }
                selected.insert(
                    id,
                    ResolvedModule {
                        path: self.store.path(&pending.coordinate, ArtifactKind::Jar),
                        coordinate: pending.coordinate,
                        digests: record.digests,
                        depth: pending.depth,
                        origin: pending.origin,
                    },
                );
            }
            level = next;
        }
        Ok(selected.into_values().collect())
    }

    /// Fetch the jar and effective POM of every module in one level, up to
    /// `parallelism` at a time. Results keep the input order.
    fn fetch_level(
        &self,
        level: &[Pending],
        walk: &Walk<'_>,
    ) -> Result<Vec<(ArtifactRecord, Option<Arc<Pom>>)>, ResolveError> {
        let width = self.options.parallelism.max(1);
        let mut out = Vec::with_capacity(level.len());
        for chunk in level.chunks(width) {
            let results: Vec<Result<_, ResolveError>> = if chunk.len() == 1 {
                vec![self.fetch_module(&chunk[0], walk)]
            } else {
                std::thread::scope(|s| {
                    let handles: Vec<_> = chunk
                        .iter()
                        .map(|p| s.spawn(move || self.fetch_module(p, walk)))
                        .collect();
                    handles
                        .into_iter()
                        .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                        .collect()
                })
            };
            for result in results {
                out.push(result?);
            }
        }
        Ok(out)
    }

    fn fetch_module(
        &self,
        pending: &Pending,
        walk: &Walk<'_>,
    ) -> Result<(ArtifactRecord, Option<Arc<Pom>>), ResolveError> {
        let jar = self.ensure(
            &pending.coordinate,
            ArtifactKind::Jar,
            walk.expected.get(&pending.coordinate),
            walk.fresh_after,
            walk.cancel,
        )?;
        let pom = self.effective_pom(&pending.coordinate, walk, 0)?;
        Ok((jar, pom))
    }

    /// The POM of `coordinate` with its parents and imported BOMs applied.
    /// `None` when no source publishes a POM for it.
    fn effective_pom(
        &self,
        coordinate: &Coordinate,
        walk: &Walk<'_>,
        chain: usize,
    ) -> Result<Option<Arc<Pom>>, ResolveError> {
        if let Some(cached) = walk
            .poms
            .lock()
            .ok()
            .and_then(|p| p.get(coordinate).cloned())
        {
            return Ok(cached);
        }
        if chain > MAX_PARENT_DEPTH {
            warn!("POM parent chain of {coordinate} is too deep; ignoring the rest");
            return Ok(None);
        }

        match self.ensure(coordinate, ArtifactKind::Pom, None, walk.fresh_after, walk.cancel) {
            Ok(_) => {}
            Err(ResolveError::NotFound { .. }) => {
                warn!("no POM published for {coordinate}; assuming it has no dependencies");
                self.remember_pom(walk, coordinate, None);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        let bytes = self.store.read(coordinate, ArtifactKind::Pom)?;
        let mut pom = Pom::parse(&String::from_utf8_lossy(&bytes)).map_err(|e| ResolveError::Pom {
            coordinate: coordinate.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = pom.parent.clone() {
            if let Some(parent_pom) = self.effective_pom(&parent, walk, chain + 1)? {
                pom.inherit_from(&parent_pom);
            }
        }
        for bom in pom.imports() {
            if let Some(bom_pom) = self.effective_pom(&bom, walk, chain + 1)? {
                pom.import_managed(&bom_pom);
            }
        }

        let pom = Arc::new(pom);
        self.remember_pom(walk, coordinate, Some(Arc::clone(&pom)));
        Ok(Some(pom))
    }

    fn remember_pom(&self, walk: &Walk<'_>, coordinate: &Coordinate, pom: Option<Arc<Pom>>) {
        if let Ok(mut poms) = walk.poms.lock() {
            poms.insert(coordinate.clone(), pom);
        }
    }

    /// Cache lookup, then single-flight fetch.
    fn ensure(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        expected: Option<&Checksum>,
        fresh_after: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> Result<ArtifactRecord, ResolveError> {
        if let Some(record) = self.cached(coordinate, kind, fresh_after) {
            check_expected(coordinate, &record.digests, expected)?;
            return Ok(record);
        }
        if self.options.offline {
            return Err(ResolveError::NotFound {
                coordinate: coordinate.clone(),
                tried: vec![format!("local cache ({kind}, offline)")],
            });
        }

        let key = (coordinate.clone(), kind);
        let (outcome, led) = self.flights.run(&key, || {
            self.fetch_exclusive(coordinate, kind, expected, fresh_after, cancel)
        });
        let record = outcome?;
        if !led {
            check_expected(coordinate, &record.digests, expected)?;
        }
        Ok(record)
    }

    fn cached(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        fresh_after: Option<DateTime<Utc>>,
    ) -> Option<ArtifactRecord> {
        let record = match self.store.record(coordinate, kind) {
            Ok(record) => record?,
            Err(e) => {
                warn!("unreadable cache record for {coordinate} ({kind}): {e}");
                return None;
            }
        };
        if fresh_after.is_some_and(|t| record.fetched_at < t) {
            return None;
        }
        Some(record)
    }

    /// Fetch under the cross-process coordinate lock, re-checking the cache
    /// once the lock is held.
    fn fetch_exclusive(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        expected: Option<&Checksum>,
        fresh_after: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> FetchOutcome {
        let lock_path = self.store.layout().coordinate_lock_path(coordinate);
        let _lock = CoordinateLock::acquire(&lock_path, cancel)?;
        if let Some(record) = self.cached(coordinate, kind, fresh_after) {
            debug!("{coordinate} ({kind}) was cached while waiting");
            check_expected(coordinate, &record.digests, expected)?;
            return Ok(record);
        }
        self.download(coordinate, kind, expected, cancel)
    }

    /// Try each source in order; the first that has the file wins. Nothing is
    /// recorded unless the bytes match `expected`.
    fn download(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        expected: Option<&Checksum>,
        cancel: &CancelToken,
    ) -> FetchOutcome {
        let mut tried = Vec::new();
        let mut failure: Option<RemoteError> = None;
        for source in &self.sources {
            cancel.check()?;
            let mut staged = self.store.stage()?;
            match source.fetch(coordinate, kind, &mut staged, cancel) {
                Ok(size) => {
                    check_expected(coordinate, &staged.digests(), expected)?;
                    let record = self.store.commit(coordinate, kind, staged, source.name())?;
                    info!("fetched {coordinate} ({kind}, {size} bytes) from {}", source.name());
                    return Ok(record);
                }
                Err(e) if e.is_not_found() => {
                    debug!("{e}");
                    tried.push(source.name().to_owned());
                }
                Err(RemoteError::Interrupted(i)) => return Err(i.into()),
                Err(e) => {
                    warn!("{}: {e}", source.name());
                    tried.push(source.name().to_owned());
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(ResolveError::Source {
                coordinate: coordinate.clone(),
                error: Arc::new(e),
            }),
            None => Err(ResolveError::NotFound {
                coordinate: coordinate.clone(),
                tried,
            }),
        }
    }
}

fn check_expected(
    coordinate: &Coordinate,
    digests: &ArtifactDigests,
    expected: Option<&Checksum>,
) -> Result<(), ResolveError> {
    let Some(sum) = expected else {
        return Ok(());
    };
    if sum.matches(&digests.blake3, &digests.sha256) {
        return Ok(());
    }
    let actual = match sum.algorithm {
        ChecksumAlgorithm::Blake3 => &digests.blake3,
        ChecksumAlgorithm::Sha256 => &digests.sha256,
    };
    Err(ResolveError::Integrity {
        coordinate: coordinate.clone(),
        expected: sum.to_string(),
        actual: format!("{}:{actual}", sum.algorithm),
    })
}
