use crate::{ArtifactSource, CancelToken, RemoteError};
use jycli_schema::{ArtifactKind, Coordinate};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type FileKey = (Coordinate, ArtifactKind);

/// In-memory source for tests: counts fetches, can delay them and can be told
/// to fail for chosen coordinates.
#[derive(Default)]
pub struct MemorySource {
    name: String,
    files: Mutex<HashMap<FileKey, Vec<u8>>>,
    failing: Mutex<HashSet<Coordinate>>,
    counts: Mutex<HashMap<FileKey, usize>>,
    total: AtomicUsize,
    latency: Option<Duration>,
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, coordinate: &Coordinate, kind: ArtifactKind, bytes: &[u8]) {
        if let Ok(mut files) = self.files.lock() {
            files.insert((coordinate.clone(), kind), bytes.to_vec());
        }
    }

    /// Publish a jar and a POM declaring `dependencies` as compile scope.
    pub fn add_module(&self, coordinate: &Coordinate, jar: &[u8], dependencies: &[Coordinate]) {
        self.insert(coordinate, ArtifactKind::Jar, jar);
        self.insert(
            coordinate,
            ArtifactKind::Pom,
            simple_pom(coordinate, dependencies).as_bytes(),
        );
    }

    /// Make every fetch of `coordinate` fail with a transport error.
    pub fn fail(&self, coordinate: &Coordinate) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(coordinate.clone());
        }
    }

    /// Total number of fetch calls, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn fetch_count_of(&self, coordinate: &Coordinate, kind: ArtifactKind) -> usize {
        self.counts
            .lock()
            .ok()
            .and_then(|c| c.get(&(coordinate.clone(), kind)).copied())
            .unwrap_or(0)
    }
}

impl ArtifactSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, RemoteError> {
        cancel.check()?;
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry((coordinate.clone(), kind)).or_insert(0) += 1;
        }
        if let Some(latency) = self.latency {
            cancel.sleep(latency)?;
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(coordinate))
            .unwrap_or(false);
        if failing {
            return Err(RemoteError::Http(format!(
                "injected failure for {coordinate}"
            )));
        }
        let bytes = self
            .files
            .lock()
            .ok()
            .and_then(|f| f.get(&(coordinate.clone(), kind)).cloned());
        let Some(bytes) = bytes else {
            return Err(RemoteError::NotFound {
                coordinate: coordinate.clone(),
                kind,
                source_name: self.name.clone(),
            });
        };
        out.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// A minimal POM for `coordinate` with compile-scope `dependencies`.
pub fn simple_pom(coordinate: &Coordinate, dependencies: &[Coordinate]) -> String {
    let mut deps = String::new();
    for dep in dependencies {
        deps.push_str(&format!(
            "    <dependency>\n      <groupId>{}</groupId>\n      <artifactId>{}</artifactId>\n      <version>{}</version>\n    </dependency>\n",
            dep.group(),
            dep.artifact(),
            dep.version()
        ));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<project>\n  <modelVersion>4.0.0</modelVersion>\n  <groupId>{}</groupId>\n  <artifactId>{}</artifactId>\n  <version>{}</version>\n  <dependencies>\n{deps}  </dependencies>\n</project>\n",
        coordinate.group(),
        coordinate.artifact(),
        coordinate.version()
    )
}
