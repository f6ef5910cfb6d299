use crate::normalize::Manifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Comment line opening the embedded manifest block.
pub const BLOCK_OPEN: &str = "# /// jbang";
/// Comment line closing any PEP 723 style block.
pub const BLOCK_CLOSE: &str = "# ///";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("no '{BLOCK_OPEN}' block found")]
    NotFound,
    #[error("malformed manifest ({location}): {reason}")]
    Malformed { location: String, reason: String },
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

impl ManifestError {
    fn malformed_at(line: usize, reason: impl Into<String>) -> Self {
        ManifestError::Malformed {
            location: format!("line {line}"),
            reason: reason.into(),
        }
    }
}

/// The inner text of an embedded block, with the source line of every inner line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBlock {
    /// 1-based line of the opening delimiter.
    pub open_line: usize,
    /// 1-based line of the closing delimiter.
    pub close_line: usize,
    /// `(source line, text without the "# " prefix)`.
    pub lines: Vec<(usize, String)>,
}

impl EmbeddedBlock {
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|(_, l)| l.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Map a byte offset inside [`text`](Self::text) back to its source line.
    pub fn source_line_at(&self, offset: usize) -> usize {
        let mut consumed = 0;
        for (line_no, line) in &self.lines {
            consumed += line.len() + 1;
            if offset < consumed {
                return *line_no;
            }
        }
        self.close_line
    }
}

/// Locate the single `# /// jbang` block in a script. Never interprets the
/// script itself.
pub fn extract_block(source: &str) -> Result<EmbeddedBlock, ManifestError> {
    let mut found: Option<EmbeddedBlock> = None;
    let mut open: Option<EmbeddedBlock> = None;
    // Another tool's block; it swallows everything up to its closer,
    // including an opener of ours.
    let mut foreign = false;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end();

        if foreign {
            if line == BLOCK_CLOSE || !line.starts_with('#') {
                foreign = false;
            }
            continue;
        }

        if let Some(block) = open.as_mut() {
            if line == BLOCK_OPEN {
                return Err(ManifestError::malformed_at(
                    line_no,
                    format!("nested block opener inside block started at line {}", block.open_line),
                ));
            }
            if line == BLOCK_CLOSE {
                block.close_line = line_no;
                found = open.take();
                continue;
            }
            if line == "#" {
                block.lines.push((line_no, String::new()));
            } else if let Some(inner) = raw.strip_prefix("# ") {
                block.lines.push((line_no, inner.to_owned()));
            } else {
                return Err(ManifestError::malformed_at(
                    line_no,
                    format!(
                        "block started at line {} is not terminated by '{BLOCK_CLOSE}'",
                        block.open_line
                    ),
                ));
            }
            continue;
        }

        if line == BLOCK_OPEN {
            if let Some(first) = &found {
                return Err(ManifestError::malformed_at(
                    line_no,
                    format!("second block; the first one starts at line {}", first.open_line),
                ));
            }
            open = Some(EmbeddedBlock {
                open_line: line_no,
                close_line: 0,
                lines: Vec::new(),
            });
        } else if is_block_opener(line) {
            foreign = true;
        }
    }

    if let Some(block) = open {
        return Err(ManifestError::malformed_at(
            block.open_line,
            format!("block is not terminated by '{BLOCK_CLOSE}'"),
        ));
    }
    found.ok_or(ManifestError::NotFound)
}

/// `# /// <type>` for any block type.
fn is_block_opener(line: &str) -> bool {
    line.strip_prefix("# /// ").is_some_and(|kind| {
        !kind.is_empty()
            && kind
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// TOML document carried by the embedded block, before validation.
///
/// Unknown keys are tolerated so newer scripts keep running on older launchers.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptManifest {
    #[serde(default)]
    pub requires_jython: Option<String>,
    #[serde(default)]
    pub requires_java: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Generic options: a string, an array of strings, or a table of named groups.
    #[serde(default)]
    pub runtime_options: Option<toml::Value>,
    #[serde(default)]
    pub java: HostSection,
    #[serde(default, rename = "jython-cli")]
    pub launcher: LauncherSection,
}

/// `[java]`: options for the host runtime.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct HostSection {
    #[serde(default)]
    pub runtime_options: Option<toml::Value>,
}

/// `[jython-cli]`: options for the launcher itself.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct LauncherSection {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub runtime_options: Option<toml::Value>,
    /// Coordinate -> `blake3:<hex>` / `sha256:<hex>`.
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

/// Parse the TOML text of a block (without comment prefixes).
pub fn parse_manifest_str(input: &str) -> Result<ScriptManifest, ManifestError> {
    toml::from_str(input).map_err(|e| ManifestError::Malformed {
        location: "block".to_owned(),
        reason: e.message().to_owned(),
    })
}

/// Parse an extracted block, reporting TOML errors at their script line.
pub fn parse_block(block: &EmbeddedBlock) -> Result<ScriptManifest, ManifestError> {
    let text = block.text();
    toml::from_str(&text).map_err(|e| {
        let line = e
            .span()
            .map_or(block.open_line, |span| block.source_line_at(span.start));
        ManifestError::malformed_at(line, e.message())
    })
}

/// Extract, parse and validate the manifest embedded in script source text.
pub fn parse_script_str(source: &str) -> Result<Manifest, ManifestError> {
    let block = extract_block(source)?;
    parse_block(&block)?.normalize()
}

pub fn parse_script_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_script_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTTPSERVICE: &str = r#"#!/usr/bin/env jython-cli

# /// jbang
# requires-jython = "2.7.4"
# requires-java = "21"
# dependencies = [
#   "io.undertow:undertow-core:2.3.18.Final"
# ]
# [java]
#   runtime-options = "-server -Xms2g -Xmx2g -XX:+UseZGC -XX:+ZGenerational"
# [jython-cli]
#   debug = false
# ///

import io.undertow.Undertow as Undertow
"#;

    #[test]
    fn extracts_block_lines_with_source_positions() {
        let block = extract_block(HTTPSERVICE).unwrap();
        assert_eq!(block.open_line, 3);
        assert_eq!(block.close_line, 13);
        assert_eq!(block.lines[0], (4, "requires-jython = \"2.7.4\"".to_owned()));
        assert!(block.text().contains("[jython-cli]"));
    }

    #[test]
    fn parses_example_header() {
        let raw = parse_block(&extract_block(HTTPSERVICE).unwrap()).unwrap();
        assert_eq!(raw.requires_jython.as_deref(), Some("2.7.4"));
        assert_eq!(raw.requires_java.as_deref(), Some("21"));
        assert_eq!(raw.dependencies.len(), 1);
        assert!(raw.java.runtime_options.is_some());
        assert!(!raw.launcher.debug);
    }

    #[test]
    fn missing_block_is_not_found() {
        let err = extract_block("print('hi')\n# just a comment\n").unwrap_err();
        assert!(matches!(err, ManifestError::NotFound));
    }

    #[test]
    fn unterminated_block_is_malformed() {
        let script = "# /// jbang\n# requires-jython = \"2.7.2\"\n# requires-java = \"17\"\nimport sys\n";
        let err = extract_block(script).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn block_at_end_of_file_without_closer_is_malformed() {
        let err = extract_block("# /// jbang\n# requires-java = \"17\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }

    #[test]
    fn two_blocks_are_malformed() {
        let script = "\
# /// jbang
# requires-jython = \"2.7.2\"
# requires-java = \"8\"
# ///

# /// script
# requires-python = \">=3.11\"
# ///

# /// jbang
# requires-jython = \"2.7.3\"
# ///
";
        let err = extract_block(script).unwrap_err();
        assert!(err.to_string().contains("second block"));
    }

    #[test]
    fn foreign_block_before_ours_is_ignored() {
        let script = "\
# /// script
# requires-python = \">=3.11\"
# ///
# /// jbang
# requires-jython = \"2.7.2\"
# requires-java = \"8\"
# ///
";
        let block = extract_block(script).unwrap();
        assert_eq!(block.open_line, 4);
        assert_eq!(block.lines.len(), 2);
    }

    #[test]
    fn unterminated_foreign_block_swallows_ours() {
        let script = "\
# /// script
# requires-python = \">=3.11\"
# /// jbang
# requires-jython = \"2.7.2\"
# requires-java = \"8\"
# ///
";
        assert!(matches!(extract_block(script), Err(ManifestError::NotFound)));
    }

    #[test]
    fn foreign_block_ends_at_first_code_line() {
        let script = "\
# /// script
# requires-python = \">=3.11\"
import sys
# /// jbang
# requires-jython = \"2.7.2\"
# requires-java = \"8\"
# ///
";
        let block = extract_block(script).unwrap();
        assert_eq!(block.open_line, 4);
    }

    #[test]
    fn colliding_foreign_block_surfaces_as_toml_error() {
        let script = "\
# /// jbang
# requires-jython = \"2.7.2\"
# requires-java = \"8\"
# /// script
# requires-python = \">=3.11\"
# ///
";
        // "# /// script" is not our closer; it ends up inside the TOML text.
        let err = parse_script_str(script).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }

    #[test]
    fn invalid_toml_reports_script_line() {
        let script = "\
#!/usr/bin/env jython-cli
# /// jbang
# requires-java = \"8\"
# stuff = {
#   nonsense = 42
#   Quatsch =::
# }
# ///
print(\"Hello World!\")
";
        let err = parse_script_str(script).unwrap_err();
        let ManifestError::Malformed { location, .. } = err else {
            panic!("expected malformed, got {err:?}");
        };
        assert!(location.starts_with("line "), "{location}");
    }

    #[test]
    fn empty_comment_lines_are_kept_as_blank() {
        let script = "# /// jbang\n# requires-jython = \"2.7.4\"\n#\n# requires-java = \"21\"\n# ///\n";
        let block = extract_block(script).unwrap();
        assert_eq!(block.lines[1], (3, String::new()));
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let raw = parse_manifest_str(
            r#"
requires-jython = "2.7.4"
requires-java = "21"
future-key = "whatever"
[future-section]
x = 1
"#,
        )
        .unwrap();
        assert_eq!(raw.requires_java.as_deref(), Some("21"));
    }

    #[test]
    fn wrongly_typed_known_key_is_malformed() {
        let err = parse_manifest_str("requires-java = 21\n").unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }
}
