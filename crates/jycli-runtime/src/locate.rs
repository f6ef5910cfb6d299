use crate::RuntimeError;
use jycli_schema::HostVersion;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// A Java installation found on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JavaInstallation {
    pub home: PathBuf,
    pub executable: PathBuf,
    /// Full version string, e.g. `21.0.2` or `1.8.0_402`.
    pub version: String,
    pub major: u32,
}

pub fn java_executable_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Major version of a Java version string: `1.8.0_402` is 8, `21.0.2` is 21,
/// `22-ea` is 22.
pub fn major_of(version: &str) -> Option<u32> {
    let version = version.strip_prefix("1.").unwrap_or(version);
    let digits: String = version.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// `JAVA_VERSION="21.0.2"` from a JDK `release` file.
fn parse_release(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("JAVA_VERSION=")?;
        Some(value.trim_matches('"').to_owned())
    })
}

/// The quoted version in the first line of `java -version` output:
/// `openjdk version "21.0.2" 2024-01-16`.
fn parse_version_output(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains(" version "))?;
    let start = line.find('"')? + 1;
    let end = start + line[start..].find('"')?;
    Some(line[start..end].to_owned())
}

/// Inspect one Java home. Reads `release`, falling back to running the
/// executable when the file is absent.
pub fn inspect_home(home: &Path) -> Option<JavaInstallation> {
    let executable = home.join("bin").join(java_executable_name());
    if !executable.is_file() {
        return None;
    }
    let version = match std::fs::read_to_string(home.join("release")) {
        Ok(content) => parse_release(&content)?,
        Err(_) => {
            let output = Command::new(&executable).arg("-version").output().ok()?;
            parse_version_output(&String::from_utf8_lossy(&output.stderr))?
        }
    };
    let major = major_of(&version)?;
    Some(JavaInstallation {
        home: home.to_path_buf(),
        executable,
        version,
        major,
    })
}

/// Where a candidate home came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub origin: String,
    pub home: PathBuf,
}

/// Ordered list of Java homes to try.
#[derive(Debug, Clone, Default)]
pub struct JavaLocator {
    candidates: Vec<Candidate>,
}

impl JavaLocator {
    /// Search order: `JYCLI_JAVA_HOME`, `JAVA_HOME`, `java` on `PATH`, then
    /// the usual per-platform install directories.
    pub fn from_env() -> Self {
        let mut locator = Self::default();
        for var in ["JYCLI_JAVA_HOME", "JAVA_HOME"] {
            if let Some(home) = std::env::var_os(var).filter(|v| !v.is_empty()) {
                locator.push(var, PathBuf::from(home));
            }
        }
        if let Some(home) = home_of_path_java() {
            locator.push("PATH", home);
        }
        for dir in install_dirs() {
            let origin = dir.display().to_string();
            for home in homes_below(&dir) {
                locator.push(&origin, home);
            }
        }
        locator
    }

    pub fn with_homes(homes: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut locator = Self::default();
        for home in homes {
            locator.push("explicit", home);
        }
        locator
    }

    fn push(&mut self, origin: &str, home: PathBuf) {
        if self.candidates.iter().any(|c| c.home == home) {
            return;
        }
        self.candidates.push(Candidate {
            origin: origin.to_owned(),
            home,
        });
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Every valid installation among the candidates, in search order.
    pub fn installations(&self) -> Vec<JavaInstallation> {
        self.candidates
            .iter()
            .filter_map(|c| inspect_home(&c.home))
            .collect()
    }

    /// First installation that satisfies `requirement`.
    pub fn find(&self, requirement: &HostVersion) -> Result<JavaInstallation, RuntimeError> {
        let mut inspected = String::from("inspected:");
        for candidate in &self.candidates {
            match inspect_home(&candidate.home) {
                Some(java) if requirement.accepts(java.major) => {
                    debug!(
                        "using Java {} at {} ({})",
                        java.version,
                        java.home.display(),
                        candidate.origin
                    );
                    return Ok(java);
                }
                Some(java) => {
                    let _ = write!(
                        inspected,
                        "\n  - {} ({}): Java {}",
                        candidate.home.display(),
                        candidate.origin,
                        java.version
                    );
                }
                None => {
                    let _ = write!(
                        inspected,
                        "\n  - {} ({}): not a Java installation",
                        candidate.home.display(),
                        candidate.origin
                    );
                }
            }
        }
        if self.candidates.is_empty() {
            inspected.push_str(" nothing (set JAVA_HOME or JYCLI_JAVA_HOME)");
        }
        Err(RuntimeError::HostUnavailable {
            requirement: requirement.to_string(),
            inspected,
        })
    }
}

fn home_of_path_java() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let java = std::env::split_paths(&path)
        .map(|dir| dir.join(java_executable_name()))
        .find(|p| p.is_file())?;
    // /usr/bin/java is usually a symlink chain into the real home.
    let real = std::fs::canonicalize(&java).unwrap_or(java);
    real.parent()?.parent().map(Path::to_path_buf)
}

fn install_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/lib/jvm"),
        PathBuf::from("/usr/java"),
        PathBuf::from("/opt/java"),
    ];
    if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/Library/Java/JavaVirtualMachines"));
    }
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".sdkman/candidates/java"));
        dirs.push(home.join(".jdks"));
    }
    dirs
}

/// Immediate subdirectories that look like Java homes, newest name first.
fn homes_below(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut homes: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .map(|p| {
            let mac_home = p.join("Contents/Home");
            if mac_home.is_dir() {
                mac_home
            } else {
                p
            }
        })
        .filter(|p| p.join("bin").join(java_executable_name()).is_file())
        .collect();
    homes.sort();
    homes.reverse();
    homes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_home(root: &Path, name: &str, version: &str) -> PathBuf {
        let home = root.join(name);
        std::fs::create_dir_all(home.join("bin")).unwrap();
        std::fs::write(home.join("bin").join(java_executable_name()), b"").unwrap();
        std::fs::write(
            home.join("release"),
            format!("IMPLEMENTOR=\"Eclipse Adoptium\"\nJAVA_VERSION=\"{version}\"\n"),
        )
        .unwrap();
        home
    }

    fn requirement(s: &str) -> HostVersion {
        s.parse().unwrap()
    }

    #[test]
    fn major_version_forms() {
        assert_eq!(major_of("21.0.2"), Some(21));
        assert_eq!(major_of("1.8.0_402"), Some(8));
        assert_eq!(major_of("22-ea"), Some(22));
        assert_eq!(major_of("17"), Some(17));
        assert_eq!(major_of("abc"), None);
    }

    #[test]
    fn version_output_parsing() {
        let out = "openjdk version \"21.0.2\" 2024-01-16\nOpenJDK Runtime Environment\n";
        assert_eq!(parse_version_output(out).as_deref(), Some("21.0.2"));
        assert_eq!(parse_version_output("garbage"), None);
    }

    #[test]
    fn inspect_reads_release_file() {
        let dir = tempfile::tempdir().unwrap();
        let home = fake_home(dir.path(), "jdk-21", "21.0.2");
        let java = inspect_home(&home).unwrap();
        assert_eq!(java.major, 21);
        assert_eq!(java.version, "21.0.2");
        assert_eq!(java.executable, home.join("bin").join(java_executable_name()));
    }

    #[test]
    fn inspect_rejects_dir_without_java() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect_home(dir.path()).is_none());
    }

    #[test]
    fn find_exact_major_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        let j17 = fake_home(dir.path(), "jdk-17", "17.0.10");
        let j21 = fake_home(dir.path(), "jdk-21", "21.0.2");
        let locator = JavaLocator::with_homes([j17, j21.clone()]);
        let java = locator.find(&requirement("21")).unwrap();
        assert_eq!(java.home, j21);
    }

    #[test]
    fn find_minimum_major_takes_first_acceptable() {
        let dir = tempfile::tempdir().unwrap();
        let j11 = fake_home(dir.path(), "jdk-11", "11.0.22");
        let j22 = fake_home(dir.path(), "jdk-22", "22.0.1");
        let j21 = fake_home(dir.path(), "jdk-21", "21.0.2");
        let locator = JavaLocator::with_homes([j11, j22.clone(), j21]);
        assert_eq!(locator.find(&requirement("17+")).unwrap().home, j22);
    }

    #[test]
    fn no_match_lists_inspected_homes() {
        let dir = tempfile::tempdir().unwrap();
        let j17 = fake_home(dir.path(), "jdk-17", "17.0.10");
        let locator = JavaLocator::with_homes([j17, dir.path().join("missing")]);
        let err = locator.find(&requirement("21")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("requires-java = \"21\""), "{msg}");
        assert!(msg.contains("Java 17.0.10"), "{msg}");
        assert!(msg.contains("not a Java installation"), "{msg}");
    }

    #[test]
    fn duplicate_homes_are_collapsed() {
        let locator = JavaLocator::with_homes([PathBuf::from("/a"), PathBuf::from("/a")]);
        assert_eq!(locator.candidates().len(), 1);
    }

    #[test]
    fn homes_below_prefers_newest_name() {
        let dir = tempfile::tempdir().unwrap();
        fake_home(dir.path(), "jdk-17", "17.0.10");
        fake_home(dir.path(), "jdk-21", "21.0.2");
        std::fs::create_dir_all(dir.path().join("not-a-jdk")).unwrap();
        let homes = homes_below(dir.path());
        assert_eq!(homes.len(), 2);
        assert!(homes[0].ends_with("jdk-21"));
    }
}
