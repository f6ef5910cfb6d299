use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("'{0}' is not a 'group:artifact:version' coordinate")]
    WrongShape(String),
    #[error("coordinate '{coordinate}' has an empty {field}")]
    EmptyField {
        coordinate: String,
        field: &'static str,
    },
    #[error("coordinate '{coordinate}' has an illegal character in its {field}")]
    IllegalCharacter {
        coordinate: String,
        field: &'static str,
    },
}

/// Identity of a module: the `(group, artifact)` pair. The version is resolved
/// data, not identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    pub group: String,
    pub artifact: String,
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

/// A `group:artifact:version` dependency coordinate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    group: String,
    artifact: String,
    version: String,
}

impl Coordinate {
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, CoordinateError> {
        let coord = Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        };
        coord.validate()?;
        Ok(coord)
    }

    pub fn parse(input: &str) -> Result<Self, CoordinateError> {
        let trimmed = input.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        let [group, artifact, version] = parts.as_slice() else {
            return Err(CoordinateError::WrongShape(input.to_owned()));
        };
        Self::new(*group, *artifact, *version)
    }

    fn validate(&self) -> Result<(), CoordinateError> {
        for (field, value) in [
            ("group", &self.group),
            ("artifact", &self.artifact),
            ("version", &self.version),
        ] {
            if value.is_empty() {
                return Err(CoordinateError::EmptyField {
                    coordinate: self.to_string(),
                    field,
                });
            }
            // Fields become path segments in repositories and in the cache.
            let illegal = value == "."
                || value == ".."
                || value
                    .chars()
                    .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | ':'));
            if illegal {
                return Err(CoordinateError::IllegalCharacter {
                    coordinate: self.to_string(),
                    field,
                });
            }
        }
        Ok(())
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn module_id(&self) -> ModuleId {
        ModuleId {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
        }
    }

    /// Same module at another version.
    #[must_use]
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            version: version.to_owned(),
        }
    }

    /// `artifact-version.ext`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}-{}.{extension}", self.artifact, self.version)
    }

    /// Maven repository layout: `org/python/jython-slim/2.7.4/jython-slim-2.7.4.jar`.
    pub fn repository_path(&self, extension: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name(extension)
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Coordinate {
    type Error = CoordinateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Coordinate> for String {
    fn from(value: Coordinate) -> Self {
        value.to_string()
    }
}

/// The two files a repository serves per coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Jar,
    Pom,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Jar => "jar",
            ArtifactKind::Pom => "pom",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
