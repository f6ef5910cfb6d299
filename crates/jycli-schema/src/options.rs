//! Host runtime options keyed by the flag they affect.
//!
//! Two tokens that set the same JVM setting (`-Xmx1g` and `-Xmx2g`, or
//! `-XX:+UseZGC` and `-XX:-UseZGC`) share one key, so a later declaration
//! replaces an earlier one instead of both reaching the command line.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Size-style flags whose value is glued to the flag name.
const SIZED_FLAGS: &[&str] = &["-Xmx", "-Xms", "-Xss", "-Xmn"];

/// Agent flags whose key includes the agent name and whose value follows `=`.
const AGENT_FLAGS: &[&str] = &["-agentlib:", "-agentpath:", "-javaagent:"];

/// Ordered mapping from effective flag to value. An empty value means the flag
/// takes no argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeOptions {
    entries: IndexMap<String, String>,
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a space-separated option string such as `"-server -Xmx2g"`.
    pub fn parse_flat(input: &str) -> Self {
        let mut options = Self::new();
        options.insert_tokens(input.split_whitespace());
        options
    }

    pub fn insert_tokens<'a>(&mut self, tokens: impl IntoIterator<Item = &'a str>) {
        for token in tokens {
            self.insert_token(token);
        }
    }

    pub fn insert_token(&mut self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        let (key, value) = split_flag(token);
        self.set(key, value);
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Apply `other` on top of `self`; `other` wins on collisions.
    pub fn merge_from(&mut self, other: &RuntimeOptions) {
        for (key, value) in &other.entries {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render back to command-line flags in insertion order.
    pub fn to_flags(&self) -> Vec<String> {
        self.iter().map(|(k, v)| render_flag(k, v)).collect()
    }
}

/// Split one command-line token into `(effective flag, value)`.
pub fn split_flag(token: &str) -> (String, String) {
    if let Some(rest) = token.strip_prefix("-XX:") {
        if let Some(name) = rest.strip_prefix('+') {
            return (format!("-XX:{name}"), "+".to_owned());
        }
        if let Some(name) = rest.strip_prefix('-') {
            return (format!("-XX:{name}"), "-".to_owned());
        }
        if let Some((name, value)) = rest.split_once('=') {
            return (format!("-XX:{name}"), value.to_owned());
        }
        return (token.to_owned(), String::new());
    }

    for prefix in SIZED_FLAGS {
        if let Some(value) = token.strip_prefix(prefix) {
            if !value.is_empty() {
                return ((*prefix).to_owned(), value.to_owned());
            }
        }
    }

    if token.starts_with("-D") || AGENT_FLAGS.iter().any(|p| token.starts_with(p)) {
        if let Some((key, value)) = token.split_once('=') {
            return (key.to_owned(), value.to_owned());
        }
    }

    (token.to_owned(), String::new())
}

/// Inverse of [`split_flag`].
pub fn render_flag(key: &str, value: &str) -> String {
    if value.is_empty() {
        return key.to_owned();
    }
    if let Some(name) = key.strip_prefix("-XX:") {
        return match value {
            "+" | "-" => format!("-XX:{value}{name}"),
            _ => format!("{key}={value}"),
        };
    }
    if SIZED_FLAGS.contains(&key) {
        return format!("{key}{value}");
    }
    format!("{key}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sized_flags() {
        assert_eq!(split_flag("-Xmx2g"), ("-Xmx".into(), "2g".into()));
        assert_eq!(split_flag("-Xms512m"), ("-Xms".into(), "512m".into()));
    }

    #[test]
    fn splits_xx_boolean_and_valued_flags() {
        assert_eq!(split_flag("-XX:+UseZGC"), ("-XX:UseZGC".into(), "+".into()));
        assert_eq!(
            split_flag("-XX:-ZGenerational"),
            ("-XX:ZGenerational".into(), "-".into())
        );
        assert_eq!(
            split_flag("-XX:MaxMetaspaceSize=256m"),
            ("-XX:MaxMetaspaceSize".into(), "256m".into())
        );
    }

    #[test]
    fn splits_system_properties() {
        assert_eq!(
            split_flag("-Dpython.console.encoding=UTF-8"),
            ("-Dpython.console.encoding".into(), "UTF-8".into())
        );
        assert_eq!(split_flag("-Dflag"), ("-Dflag".into(), String::new()));
    }

    #[test]
    fn splits_agent_flags_on_first_equals() {
        assert_eq!(
            split_flag("-agentlib:jdwp=transport=dt_socket,server=y"),
            ("-agentlib:jdwp".into(), "transport=dt_socket,server=y".into())
        );
    }

    #[test]
    fn unknown_tokens_are_whole_keys() {
        assert_eq!(split_flag("-server"), ("-server".into(), String::new()));
        assert_eq!(
            split_flag("--enable-preview"),
            ("--enable-preview".into(), String::new())
        );
    }

    #[test]
    fn render_inverts_split() {
        for token in [
            "-Xmx2g",
            "-XX:+UseZGC",
            "-XX:-ZGenerational",
            "-XX:MaxMetaspaceSize=256m",
            "-Dpython.console.encoding=UTF-8",
            "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address=5005",
            "-server",
            "-verbose:gc",
        ] {
            let (k, v) = split_flag(token);
            assert_eq!(render_flag(&k, &v), token);
        }
    }

    #[test]
    fn later_token_replaces_same_flag() {
        let opts = RuntimeOptions::parse_flat("-Xmx1g -server -Xmx2g");
        assert_eq!(opts.len(), 2);
        assert_eq!(opts.get("-Xmx"), Some("2g"));
        assert_eq!(opts.to_flags(), vec!["-Xmx2g", "-server"]);
    }

    #[test]
    fn merge_overrides_on_collision() {
        let mut base = RuntimeOptions::parse_flat("-Xmx1g -XX:+UseG1GC");
        let top = RuntimeOptions::parse_flat("-Xmx4g -XX:+UseZGC");
        base.merge_from(&top);
        assert_eq!(base.get("-Xmx"), Some("4g"));
        assert_eq!(base.get("-XX:UseG1GC"), Some("+"));
        assert_eq!(base.get("-XX:UseZGC"), Some("+"));
    }

    #[test]
    fn empty_string_yields_no_options() {
        assert!(RuntimeOptions::parse_flat("").is_empty());
        assert!(RuntimeOptions::parse_flat("   ").is_empty());
    }
}
