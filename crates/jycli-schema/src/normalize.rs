use crate::checksum::Checksum;
use crate::coordinate::Coordinate;
use crate::manifest::{ManifestError, ScriptManifest};
use crate::options::RuntimeOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_INTERPRETER_VERSION: &str = "2.7.4";
pub const DEFAULT_HOST_MAJOR: u32 = 21;

/// Required Java major version: `"21"` means exactly 21, `"21+"` at least 21.
/// Legacy `"1.8"` reads as 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostVersion {
    pub major: u32,
    pub at_least: bool,
}

impl HostVersion {
    pub fn accepts(&self, major: u32) -> bool {
        if self.at_least {
            major >= self.major
        } else {
            major == self.major
        }
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.major, if self.at_least { "+" } else { "" })
    }
}

impl FromStr for HostVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (digits, at_least) = match trimmed.strip_suffix('+') {
            Some(d) => (d, true),
            None => (trimmed, false),
        };
        let digits = digits.strip_prefix("1.").unwrap_or(digits);
        let major: u32 = digits
            .parse()
            .map_err(|_| format!("'{s}' is not a Java version such as \"21\" or \"17+\""))?;
        if major < 8 {
            return Err(format!("Java {major} is not supported, 8 or higher is required"));
        }
        Ok(Self { major, at_least })
    }
}

impl TryFrom<String> for HostVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HostVersion> for String {
    fn from(value: HostVersion) -> Self {
        value.to_string()
    }
}

/// Validated, immutable manifest of one script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub interpreter_version: String,
    pub host_version: HostVersion,
    /// Declaration order, identical duplicates removed.
    pub dependencies: Vec<Coordinate>,
    pub runtime_options: RuntimeOptions,
    pub debug: bool,
    pub checksums: BTreeMap<Coordinate, Checksum>,
}

impl Default for Manifest {
    /// Configuration used when a script carries no manifest block.
    fn default() -> Self {
        Self {
            interpreter_version: DEFAULT_INTERPRETER_VERSION.to_owned(),
            host_version: HostVersion {
                major: DEFAULT_HOST_MAJOR,
                at_least: false,
            },
            dependencies: Vec::new(),
            runtime_options: RuntimeOptions::new(),
            debug: false,
            checksums: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ScriptManifest {
    /// Validate required fields and coordinates, and flatten runtime options.
    pub fn normalize(&self) -> Result<Manifest, ManifestError> {
        let interpreter_version = required(self.requires_jython.as_deref(), "requires-jython")?;
        if interpreter_version
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ':' | '/' | '\\'))
        {
            return Err(ManifestError::Invalid(format!(
                "requires-jython '{interpreter_version}' is not a version"
            )));
        }

        let host_raw = required(self.requires_java.as_deref(), "requires-java")?;
        let host_version: HostVersion = host_raw
            .parse()
            .map_err(|e| ManifestError::Invalid(format!("requires-java: {e}")))?;

        let dependencies = normalize_dependencies(&self.dependencies)?;

        let mut runtime_options = RuntimeOptions::new();
        for (section, value) in [
            ("runtime-options", &self.runtime_options),
            ("java.runtime-options", &self.java.runtime_options),
            ("jython-cli.runtime-options", &self.launcher.runtime_options),
        ] {
            if let Some(value) = value {
                runtime_options.merge_from(&options_from_value(section, value)?);
            }
        }

        let mut checksums = BTreeMap::new();
        for (coord, sum) in &self.launcher.checksums {
            let coordinate = Coordinate::parse(coord)
                .map_err(|e| ManifestError::Invalid(format!("jython-cli.checksums: {e}")))?;
            let checksum: Checksum = sum
                .parse()
                .map_err(|e| ManifestError::Invalid(format!("jython-cli.checksums: {e}")))?;
            checksums.insert(coordinate, checksum);
        }

        Ok(Manifest {
            interpreter_version,
            host_version,
            dependencies,
            runtime_options,
            debug: self.launcher.debug,
            checksums,
        })
    }
}

fn required(value: Option<&str>, key: &str) -> Result<String, ManifestError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_owned()),
        _ => Err(ManifestError::Invalid(format!("'{key}' is required"))),
    }
}

fn normalize_dependencies(raw: &[String]) -> Result<Vec<Coordinate>, ManifestError> {
    let mut out: Vec<Coordinate> = Vec::with_capacity(raw.len());
    let mut seen: HashMap<(String, String), String> = HashMap::new();
    for entry in raw {
        let coord = Coordinate::parse(entry)
            .map_err(|e| ManifestError::Invalid(format!("dependencies: {e}")))?;
        let key = (coord.group().to_owned(), coord.artifact().to_owned());
        if let Some(version) = seen.get(&key) {
            if version != coord.version() {
                return Err(ManifestError::Invalid(format!(
                    "dependencies: {} is declared with conflicting versions '{version}' and '{}'",
                    coord.module_id(),
                    coord.version()
                )));
            }
            continue;
        }
        seen.insert(key, coord.version().to_owned());
        out.push(coord);
    }
    Ok(out)
}

/// One option area: a flat string, an array of tokens, or named groups applied
/// in declaration order.
fn options_from_value(section: &str, value: &toml::Value) -> Result<RuntimeOptions, ManifestError> {
    let mut options = RuntimeOptions::new();
    match value {
        toml::Value::Table(groups) => {
            for (group, group_value) in groups {
                let path = format!("{section}.{group}");
                insert_group(&mut options, &path, group_value)?;
            }
        }
        other => insert_group(&mut options, section, other)?,
    }
    Ok(options)
}

fn insert_group(
    options: &mut RuntimeOptions,
    path: &str,
    value: &toml::Value,
) -> Result<(), ManifestError> {
    match value {
        toml::Value::String(s) => options.insert_tokens(s.split_whitespace()),
        toml::Value::Array(items) => {
            for item in items {
                let toml::Value::String(s) = item else {
                    return Err(ManifestError::Invalid(format!(
                        "{path}: array entries must be strings, found {}",
                        item.type_str()
                    )));
                };
                options.insert_tokens(s.split_whitespace());
            }
        }
        other => {
            return Err(ManifestError::Invalid(format!(
                "{path}: expected a string or an array of strings, found {}",
                other.type_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::manifest::parse_manifest_str;
    use crate::ManifestError;

    fn normalize(input: &str) -> Result<crate::Manifest, ManifestError> {
        parse_manifest_str(input).unwrap().normalize()
    }

    #[test]
    fn normalizes_versions_and_dependencies() {
        let m = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
dependencies = ["io.leego:banana:2.1.0", "org.springframework.boot:spring-boot-starter-web:3.4.6"]
"#,
        )
        .unwrap();
        assert_eq!(m.interpreter_version, "2.7.4");
        assert_eq!(m.host_version.major, 21);
        assert!(!m.host_version.at_least);
        assert_eq!(m.dependencies.len(), 2);
        assert_eq!(m.dependencies[0].artifact(), "banana");
        assert!(!m.debug);
    }

    #[test]
    fn missing_host_version_is_invalid() {
        let err = normalize("requires-jython = \"2.7.4\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::Invalid(_)));
        assert!(err.to_string().contains("requires-java"));
    }

    #[test]
    fn missing_interpreter_version_is_invalid() {
        let err = normalize("requires-java = \"21\"\n").unwrap_err();
        assert!(err.to_string().contains("requires-jython"));
    }

    #[test]
    fn blank_version_is_invalid() {
        assert!(normalize("requires-jython = \" \"\nrequires-java = \"21\"\n").is_err());
    }

    #[test]
    fn identical_duplicate_collapses() {
        let m = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
dependencies = ["a:b:1.0", "a:b:1.0"]
"#,
        )
        .unwrap();
        assert_eq!(m.dependencies.len(), 1);
    }

    #[test]
    fn conflicting_duplicate_is_invalid() {
        let err = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
dependencies = ["a:b:1.0", "a:b:2.0"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Invalid(_)));
        assert!(err.to_string().contains("a:b"));
    }

    #[test]
    fn malformed_coordinate_is_invalid() {
        let err = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
dependencies = ["not-a-coordinate"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Invalid(_)));
    }

    #[test]
    fn host_version_forms() {
        let m = normalize("requires-jython = \"2.7.4\"\nrequires-java = \"17+\"\n").unwrap();
        assert!(m.host_version.at_least);
        assert!(m.host_version.accepts(21));
        assert!(!m.host_version.accepts(11));

        let legacy = normalize("requires-jython = \"2.7.4\"\nrequires-java = \"1.8\"\n").unwrap();
        assert_eq!(legacy.host_version.major, 8);

        assert!(normalize("requires-jython = \"2.7.4\"\nrequires-java = \"7\"\n").is_err());
        assert!(normalize("requires-jython = \"2.7.4\"\nrequires-java = \"latest\"\n").is_err());
    }

    #[test]
    fn array_options_match_flat_options() {
        let flat = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
runtime-options = "-Dpython.console.encoding=UTF-8 -server -Xmx2g -XX:+UseZGC -XX:+ZGenerational"
"#,
        )
        .unwrap();
        let array = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
runtime-options = [
  "-Dpython.console.encoding=UTF-8",
  "-server",
  "-Xmx2g",
  "-XX:+UseZGC",
  "-XX:+ZGenerational"
]
"#,
        )
        .unwrap();
        assert_eq!(flat.runtime_options, array.runtime_options);
        assert_eq!(flat.runtime_options.len(), 5);
    }

    #[test]
    fn grouped_options_match_flat_options() {
        let flat = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
[java]
runtime-options = "-server -Xms2g -Xmx2g -XX:+UseZGC"
"#,
        )
        .unwrap();
        let grouped = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
[java.runtime-options]
mode = "-server"
memory = ["-Xms2g", "-Xmx2g"]
gc = "-XX:+UseZGC"
"#,
        )
        .unwrap();
        assert_eq!(flat.runtime_options, grouped.runtime_options);
    }

    #[test]
    fn later_group_overrides_earlier_group() {
        let m = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
[java.runtime-options]
defaults = "-Xmx1g -XX:+UseG1GC"
tuned = "-Xmx4g"
"#,
        )
        .unwrap();
        assert_eq!(m.runtime_options.get("-Xmx"), Some("4g"));
        assert_eq!(m.runtime_options.get("-XX:UseG1GC"), Some("+"));
    }

    #[test]
    fn launcher_section_overrides_host_section_overrides_generic() {
        let m = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
runtime-options = "-Xmx1g -Xss1m -Dlevel=generic"
[java]
runtime-options = "-Xmx2g -Dlevel=host"
[jython-cli]
runtime-options = "-Dlevel=launcher"
"#,
        )
        .unwrap();
        assert_eq!(m.runtime_options.get("-Xmx"), Some("2g"));
        assert_eq!(m.runtime_options.get("-Xss"), Some("1m"));
        assert_eq!(m.runtime_options.get("-Dlevel"), Some("launcher"));
    }

    #[test]
    fn unsupported_option_type_is_invalid() {
        let err = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
runtime-options = 42
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Invalid(_)));

        let err = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
[java.runtime-options]
memory = { max = "2g" }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("java.runtime-options.memory"));
    }

    #[test]
    fn debug_and_checksums_from_launcher_section() {
        let m = normalize(&format!(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
dependencies = ["a:b:1.0"]
[jython-cli]
debug = true
[jython-cli.checksums]
"a:b:1.0" = "blake3:{}"
"#,
            "ab".repeat(32)
        ))
        .unwrap();
        assert!(m.debug);
        assert_eq!(m.checksums.len(), 1);
    }

    #[test]
    fn bad_checksum_is_invalid() {
        let err = normalize(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
[jython-cli.checksums]
"a:b:1.0" = "md5:abc"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Invalid(_)));
    }

    #[test]
    fn default_manifest_uses_launcher_defaults() {
        let m = crate::Manifest::default();
        assert_eq!(m.interpreter_version, "2.7.4");
        assert_eq!(m.host_version.to_string(), "21");
        assert!(m.dependencies.is_empty());
    }
}
