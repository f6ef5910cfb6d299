//! Minimal reader for Maven POM files.
//!
//! Only the parts that decide a runtime classpath are read: project
//! coordinates, the parent reference, properties, `dependencyManagement`
//! and direct dependencies with their exclusions. Plugins, profiles and
//! reporting sections are dropped before anything else is looked at.

use crate::coordinate::{Coordinate, ModuleId};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PomError {
    #[error("malformed POM: {0}")]
    Malformed(String),
    #[error("{pom}: dependency {module} has no version and none is managed")]
    MissingVersion { pom: String, module: String },
    #[error("{pom}: dependency {module} has invalid coordinates: {reason}")]
    InvalidDependency {
        pom: String,
        module: String,
        reason: String,
    },
}

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static IGNORED_SECTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(build|profiles|reporting)>.*?</(?:build|profiles|reporting)>").unwrap()
});
static MANAGEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<dependencyManagement>(.*?)</dependencyManagement>").unwrap()
});
static DEPENDENCIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<dependencies>(.*?)</dependencies>").unwrap());
static DEPENDENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<dependency>(.*?)</dependency>").unwrap());
static EXCLUSIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<exclusions>(.*?)</exclusions>").unwrap());
static EXCLUSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<exclusion>(.*?)</exclusion>").unwrap());
static PARENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<parent>(.*?)</parent>").unwrap());
static PROPERTIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<properties>(.*?)</properties>").unwrap());
static LEAF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z_][\w.\-]*)>\s*([^<]*?)\s*</([A-Za-z_][\w.\-]*)>").unwrap()
});
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// An `<exclusion>`; either field may be the `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Exclusion {
    pub group_id: String,
    pub artifact_id: String,
}

impl Exclusion {
    pub fn matches(&self, id: &ModuleId) -> bool {
        (self.group_id == "*" || self.group_id == id.group)
            && (self.artifact_id == "*" || self.artifact_id == id.artifact)
    }
}

/// One `<dependency>` element as written, before interpolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub kind: Option<String>,
    pub classifier: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<Exclusion>,
}

impl PomDependency {
    fn key(&self) -> (&str, &str) {
        (&self.group_id, &self.artifact_id)
    }

    fn is_import(&self) -> bool {
        self.scope.as_deref() == Some("import") && self.kind.as_deref() == Some("pom")
    }
}

/// A dependency edge that belongs on the runtime classpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDependency {
    pub coordinate: Coordinate,
    pub exclusions: Vec<Exclusion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pom {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub parent: Option<Coordinate>,
    pub properties: BTreeMap<String, String>,
    pub dependency_management: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
}

impl Pom {
    pub fn parse(xml: &str) -> Result<Self, PomError> {
        if !xml.contains("<project") {
            return Err(PomError::Malformed("missing <project> element".to_owned()));
        }
        let text = COMMENT.replace_all(xml, "");
        let text = IGNORED_SECTIONS.replace_all(&text, "");

        let dependency_management = MANAGEMENT
            .captures(&text)
            .map(|c| parse_dependencies(&c[1]))
            .unwrap_or_default();
        let without_management = MANAGEMENT.replace_all(&text, "");

        let dependencies = DEPENDENCIES
            .captures(&without_management)
            .map(|c| parse_dependencies(&c[1]))
            .unwrap_or_default();

        let properties = PROPERTIES
            .captures(&without_management)
            .map(|c| leaves(&c[1]))
            .unwrap_or_default();

        let parent = match PARENT.captures(&without_management) {
            Some(c) => {
                let fields = leaves(&c[1]);
                let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
                Some(
                    Coordinate::new(field("groupId"), field("artifactId"), field("version"))
                        .map_err(|e| PomError::Malformed(format!("parent: {e}")))?,
                )
            }
            None => None,
        };

        // What is left at top level after removing every nested section.
        let mut top = DEPENDENCIES.replace_all(&without_management, "").into_owned();
        for section in [&*PARENT, &*PROPERTIES] {
            top = section.replace_all(&top, "").into_owned();
        }
        let top = leaves(&top);

        Ok(Self {
            group_id: top.get("groupId").cloned(),
            artifact_id: top.get("artifactId").cloned(),
            version: top.get("version").cloned(),
            parent,
            properties,
            dependency_management,
            dependencies,
        })
    }

    /// Merge an already effective parent into this model.
    ///
    /// The child keeps its own values; the parent contributes missing
    /// coordinates, properties, managed versions and inherited dependencies.
    pub fn inherit_from(&mut self, parent: &Pom) {
        if self.group_id.is_none() {
            self.group_id.clone_from(&parent.group_id);
        }
        if self.version.is_none() {
            self.version.clone_from(&parent.version);
        }
        for (key, value) in &parent.properties {
            self.properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if let Some(version) = &parent.version {
            self.properties
                .entry("project.parent.version".to_owned())
                .or_insert_with(|| version.clone());
        }
        if let Some(group) = &parent.group_id {
            self.properties
                .entry("project.parent.groupId".to_owned())
                .or_insert_with(|| group.clone());
        }
        append_missing(&mut self.dependency_management, &parent.dependency_management);
        append_missing(&mut self.dependencies, &parent.dependencies);
    }

    /// BOMs named by `<scope>import</scope>` entries in `dependencyManagement`.
    pub fn imports(&self) -> Vec<Coordinate> {
        self.dependency_management
            .iter()
            .filter(|d| d.is_import())
            .filter_map(|d| {
                let version = self.interpolate(d.version.as_deref()?);
                Coordinate::new(
                    self.interpolate(&d.group_id),
                    self.interpolate(&d.artifact_id),
                    version,
                )
                .ok()
            })
            .collect()
    }

    /// Add the managed versions of an imported BOM. Entries already managed
    /// here win.
    pub fn import_managed(&mut self, bom: &Pom) {
        let resolved: Vec<PomDependency> = bom
            .dependency_management
            .iter()
            .filter(|d| !d.is_import())
            .map(|d| bom.interpolated(d))
            .collect();
        append_missing(&mut self.dependency_management, &resolved);
    }

    /// Direct dependencies that belong on the runtime classpath: compile and
    /// runtime scope, not optional, plain jars without a classifier.
    pub fn runtime_dependencies(&self) -> Result<Vec<RuntimeDependency>, PomError> {
        let mut out = Vec::new();
        for raw in &self.dependencies {
            let dep = self.with_management(&self.interpolated(raw));
            let scope = dep.scope.as_deref().unwrap_or("compile");
            if !matches!(scope, "compile" | "runtime") || dep.optional {
                continue;
            }
            if !matches!(dep.kind.as_deref(), None | Some("jar" | "bundle")) {
                continue;
            }
            if dep.classifier.is_some() {
                continue;
            }
            let module = format!("{}:{}", dep.group_id, dep.artifact_id);
            let Some(version) = dep.version.as_deref() else {
                return Err(PomError::MissingVersion {
                    pom: self.label(),
                    module,
                });
            };
            let coordinate = Coordinate::new(&dep.group_id, &dep.artifact_id, version_of(version))
                .map_err(|e| PomError::InvalidDependency {
                    pom: self.label(),
                    module,
                    reason: e.to_string(),
                })?;
            out.push(RuntimeDependency {
                coordinate,
                exclusions: dep.exclusions,
            });
        }
        Ok(out)
    }

    fn label(&self) -> String {
        format!(
            "{}:{}:{}",
            self.group_id.as_deref().unwrap_or("?"),
            self.artifact_id.as_deref().unwrap_or("?"),
            self.version.as_deref().unwrap_or("?")
        )
    }

    fn with_management(&self, dep: &PomDependency) -> PomDependency {
        let mut dep = dep.clone();
        let managed = self
            .dependency_management
            .iter()
            .filter(|m| !m.is_import())
            .find(|m| {
                self.interpolate(&m.group_id) == dep.group_id
                    && self.interpolate(&m.artifact_id) == dep.artifact_id
            });
        if let Some(managed) = managed {
            let managed = self.interpolated(managed);
            if dep.version.is_none() {
                dep.version = managed.version;
            }
            if dep.scope.is_none() {
                dep.scope = managed.scope;
            }
            if dep.exclusions.is_empty() {
                dep.exclusions = managed.exclusions;
            }
        }
        dep
    }

    fn interpolated(&self, dep: &PomDependency) -> PomDependency {
        PomDependency {
            group_id: self.interpolate(&dep.group_id),
            artifact_id: self.interpolate(&dep.artifact_id),
            version: dep.version.as_deref().map(|v| self.interpolate(v)),
            scope: dep.scope.as_deref().map(|v| self.interpolate(v)),
            kind: dep.kind.as_deref().map(|v| self.interpolate(v)),
            classifier: dep.classifier.as_deref().map(|v| self.interpolate(v)),
            optional: dep.optional,
            exclusions: dep.exclusions.clone(),
        }
    }

    /// Expand `${...}` placeholders. Unknown names are left as written.
    pub fn interpolate(&self, value: &str) -> String {
        let mut current = value.to_owned();
        // Properties may refer to other properties; bounded to stop cycles.
        for _ in 0..8 {
            if !current.contains("${") {
                break;
            }
            let next = PLACEHOLDER
                .replace_all(&current, |caps: &regex::Captures<'_>| {
                    self.lookup(&caps[1])
                        .unwrap_or_else(|| caps[0].to_owned())
                })
                .into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "project.version" | "pom.version" | "version" => self.version.clone(),
            "project.groupId" | "pom.groupId" | "groupId" => self.group_id.clone(),
            "project.artifactId" | "pom.artifactId" | "artifactId" => self.artifact_id.clone(),
            _ => self.properties.get(name).cloned(),
        }
    }
}

/// Version ranges such as `[1.2,2.0)` are pinned to their lower bound; a
/// bare `[1.2]` is exact.
fn version_of(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed.strip_prefix('[').or_else(|| trimmed.strip_prefix('(')) {
        let inner = inner.trim_end_matches([']', ')']);
        let lower = inner.split(',').next().unwrap_or(inner).trim();
        if !lower.is_empty() {
            return lower;
        }
    }
    trimmed
}

fn append_missing(target: &mut Vec<PomDependency>, from: &[PomDependency]) {
    for dep in from {
        if !target.iter().any(|d| d.key() == dep.key()) {
            target.push(dep.clone());
        }
    }
}

fn parse_dependencies(section: &str) -> Vec<PomDependency> {
    DEPENDENCY
        .captures_iter(section)
        .map(|c| {
            let body = &c[1];
            let exclusions = EXCLUSIONS
                .captures(body)
                .map(|e| {
                    EXCLUSION
                        .captures_iter(&e[1])
                        .map(|x| {
                            let fields = leaves(&x[1]);
                            Exclusion {
                                group_id: fields.get("groupId").cloned().unwrap_or_default(),
                                artifact_id: fields
                                    .get("artifactId")
                                    .cloned()
                                    .unwrap_or_default(),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            let fields = leaves(&EXCLUSIONS.replace_all(body, ""));
            PomDependency {
                group_id: fields.get("groupId").cloned().unwrap_or_default(),
                artifact_id: fields.get("artifactId").cloned().unwrap_or_default(),
                version: fields.get("version").cloned(),
                scope: fields.get("scope").cloned(),
                kind: fields.get("type").cloned(),
                classifier: fields.get("classifier").cloned(),
                optional: fields.get("optional").is_some_and(|v| v == "true"),
                exclusions,
            }
        })
        .collect()
}

/// Leaf elements `<name>text</name>`; the first occurrence of a name wins.
fn leaves(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for caps in LEAF.captures_iter(text) {
        if caps[1] != caps[3] {
            continue;
        }
        out.entry(caps[1].to_owned())
            .or_insert_with(|| caps[2].to_owned());
    }
    out
}
