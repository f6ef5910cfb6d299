use crate::{copy_with_cancel, ArtifactSource, CancelToken, RemoteError};
use jycli_schema::{ArtifactKind, Coordinate};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;

/// A directory in Maven repository layout, such as `~/.m2/repository`.
pub struct LocalRepository {
    name: String,
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_owned(),
            root: root.into(),
        }
    }
}

impl ArtifactSource for LocalRepository {
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
        let path = self.root.join(coordinate.repository_path(kind.extension()));
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RemoteError::NotFound {
                    coordinate: coordinate.clone(),
                    kind,
                    source_name: self.name.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        debug!("reading {}", path.display());
        copy_with_cancel(&mut file, out, cancel)
    }
}
