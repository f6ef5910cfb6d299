use crate::RemoteError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MAVEN_CENTRAL_URL: &str = "https://repo1.maven.org/maven2";

/// One artifact repository: an HTTP(S) Maven repository, or a local
/// directory in Maven layout (`file://` URL or plain path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryLocation {
    Http(String),
    Local(PathBuf),
}

impl RepositoryConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_owned(),
            url: url.trim_end_matches('/').to_owned(),
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    pub fn maven_central() -> Self {
        Self::new("central", MAVEN_CENTRAL_URL)
    }

    /// Build a repository from a `--repository` argument; the argument doubles
    /// as its name.
    pub fn from_arg(arg: &str) -> Self {
        Self::new(arg, arg)
    }

    pub fn location(&self) -> RepositoryLocation {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            RepositoryLocation::Http(self.url.clone())
        } else if let Some(path) = self.url.strip_prefix("file://") {
            RepositoryLocation::Local(PathBuf::from(path))
        } else {
            RepositoryLocation::Local(PathBuf::from(&self.url))
        }
    }
}

/// Ordered repository list; the first source that has an artifact wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryList {
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for RepositoryList {
    fn default() -> Self {
        Self {
            repositories: vec![RepositoryConfig::maven_central()],
        }
    }
}

impl RepositoryList {
    /// Load `~/.config/jython-cli/repositories.json`, falling back to Maven
    /// Central when the file does not exist.
    pub fn load_default() -> Result<Self, RemoteError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        let content = std::fs::read_to_string(path)?;
        let list: Self = serde_json::from_str(&content).map_err(|e| {
            RemoteError::Config(format!("invalid repository config {}: {e}", path.display()))
        })?;
        if list.repositories.is_empty() {
            return Err(RemoteError::Config(format!(
                "{} lists no repositories",
                path.display()
            )));
        }
        Ok(list)
    }

    pub fn save(&self, path: &Path) -> Result<(), RemoteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RemoteError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, RemoteError> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir).join("jython-cli/repositories.json"));
    }
    let home = std::env::var("HOME").map_err(|_| RemoteError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/jython-cli/repositories.json"))
}
