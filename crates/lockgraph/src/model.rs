//! In-memory form of the lock document.
//!
//! A lock document records, per (framework, runtime) target, the exact set of
//! libraries a project resolved to, together with the metadata of every
//! package and sibling project those libraries came from. The composite
//! `name/version` and `framework/runtime` keys of the on-disk format are
//! parsed into [`LibraryKey`] and [`TargetKey`] as soon as they are read.

use crate::version::{display_version, parse_version, VersionError, VersionRange};
use semver::Version;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The lock document format version this crate reads and writes.
pub const CURRENT_VERSION: i32 = 2;

/// Format version given to documents that do not declare one.
///
/// Distinct from every valid version, so such documents are always stale.
pub const UNKNOWN_VERSION: i32 = i32::MIN;

/// Default lock document file name.
pub const LOCK_FILE: &str = "project.lock.json";

/// Errors that can occur when parsing composite keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("library key '{0}' must have the form <name>/<version>")]
    MalformedLibraryKey(String),

    #[error("target key '{0}' must have the form <framework> or <framework>/<runtime>")]
    MalformedTargetKey(String),

    #[error("unknown library type '{0}', expected 'package', 'project' or 'referenceAssembly'")]
    UnknownKind(String),

    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Where a library comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LibraryKind {
    /// A pre-built, content-addressed package.
    Package,
    /// A sibling project built from source.
    Project,
    /// An assembly provided by the target framework itself.
    ReferenceAssembly,
}

impl LibraryKind {
    /// Returns the kind as written in lock documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Project => "project",
            Self::ReferenceAssembly => "referenceAssembly",
        }
    }
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LibraryKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(Self::Package),
            "project" => Ok(Self::Project),
            "referenceAssembly" => Ok(Self::ReferenceAssembly),
            _ => Err(KeyError::UnknownKind(s.to_string())),
        }
    }
}

/// Identity of a library: `name/version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryKey {
    pub name: String,
    pub version: Version,
}

impl LibraryKey {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parse a `name/version` key.
    ///
    /// # Errors
    ///
    /// Returns an error if the separator is missing, the name is empty, or
    /// the version does not parse.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let (name, version) = key
            .split_once('/')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| KeyError::MalformedLibraryKey(key.to_string()))?;
        Ok(Self::new(name, parse_version(version)?))
    }
}

impl fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, display_version(&self.version))
    }
}

/// Identity of a target: `framework` or `framework/runtime`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub framework: String,
    pub runtime: Option<String>,
}

impl TargetKey {
    #[must_use]
    pub fn new(framework: impl Into<String>, runtime: Option<String>) -> Self {
        Self {
            framework: framework.into(),
            runtime: runtime.filter(|r| !r.is_empty()),
        }
    }

    /// Parse a `framework[/runtime]` key.
    ///
    /// # Errors
    ///
    /// Returns an error if the framework part is empty.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let (framework, runtime) = match key.split_once('/') {
            Some((framework, runtime)) => (framework, Some(runtime.to_string())),
            None => (key, None),
        };
        if framework.is_empty() {
            return Err(KeyError::MalformedTargetKey(key.to_string()));
        }
        Ok(Self::new(framework, runtime))
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.runtime {
            Some(runtime) => write!(f, "{}/{runtime}", self.framework),
            None => f.write_str(&self.framework),
        }
    }
}

/// A dependency edge: a library name and the versions it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: String,
    pub range: VersionRange,
}

impl Dependency {
    #[must_use]
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

/// A file inside a library, with free-form metadata such as a locale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockItem {
    /// Path relative to the library root, using host separators.
    pub path: PathBuf,
    pub properties: BTreeMap<String, String>,
}

impl LockItem {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// The dependencies a project declared, for one framework or for all of them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyGroup {
    /// `None` for the group shared by all frameworks.
    pub framework: Option<String>,
    /// Rendered `"<name> <constraint>"` entries.
    pub dependencies: Vec<String>,
}

impl DependencyGroup {
    #[must_use]
    pub fn new(framework: Option<String>, dependencies: Vec<String>) -> Self {
        Self {
            framework: framework.filter(|f| !f.is_empty()),
            dependencies,
        }
    }

    /// Returns true if this group applies to every framework.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.framework.is_none()
    }
}

/// Metadata of a resolved package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLibrary {
    pub name: String,
    pub version: Version,
    pub serviceable: bool,
    pub content_hash: Option<String>,
    /// Package-relative file paths, kept sorted.
    pub files: Vec<PathBuf>,
}

impl PackageLibrary {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            serviceable: false,
            content_hash: None,
            files: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(self.name.clone(), self.version.clone())
    }
}

/// Metadata of a sibling project referenced by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLibrary {
    pub name: String,
    pub version: Version,
    /// Path to the referenced project's document, relative to the lock document.
    pub path: Option<PathBuf>,
}

impl ProjectLibrary {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            path: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(self.name.clone(), self.version.clone())
    }
}

/// A library as selected for one target, with its asset buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTargetLibrary {
    pub name: String,
    pub version: Version,
    pub kind: LibraryKind,
    /// The library's own framework folder chosen for this target.
    pub target_framework: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub framework_assemblies: BTreeSet<String>,
    pub runtime_assemblies: Vec<LockItem>,
    pub compile_time_assemblies: Vec<LockItem>,
    pub resource_assemblies: Vec<LockItem>,
    pub native_libraries: Vec<LockItem>,
}

impl LockTargetLibrary {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version, kind: LibraryKind) -> Self {
        Self {
            name: name.into(),
            version,
            kind,
            target_framework: None,
            dependencies: Vec::new(),
            framework_assemblies: BTreeSet::new(),
            runtime_assemblies: Vec::new(),
            compile_time_assemblies: Vec::new(),
            resource_assemblies: Vec::new(),
            native_libraries: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(self.name.clone(), self.version.clone())
    }
}

/// The resolved library set for one (framework, runtime) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTarget {
    pub framework: String,
    pub runtime: Option<String>,
    pub libraries: Vec<LockTargetLibrary>,
}

impl LockTarget {
    #[must_use]
    pub fn new(framework: impl Into<String>, runtime: Option<String>) -> Self {
        Self {
            framework: framework.into(),
            runtime: runtime.filter(|r| !r.is_empty()),
            libraries: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.framework.clone(), self.runtime.clone())
    }

    /// Returns true for a runtime closure, false for a compile-only closure.
    #[must_use]
    pub fn is_runtime_specific(&self) -> bool {
        self.runtime.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Exact match on framework and runtime; `None` only matches `None`.
    #[must_use]
    pub fn matches(&self, framework: &str, runtime: Option<&str>) -> bool {
        self.framework == framework && self.runtime.as_deref() == runtime
    }
}

/// The persisted, versioned dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LockDocument {
    pub format_version: i32,
    /// Carried through untouched.
    pub compilation_options: Option<Map<String, Value>>,
    /// Carried through untouched.
    pub runtime_options: Option<Map<String, Value>>,
    pub dependency_groups: Vec<DependencyGroup>,
    pub package_libraries: Vec<PackageLibrary>,
    pub project_libraries: Vec<ProjectLibrary>,
    pub targets: Vec<LockTarget>,
}

impl Default for LockDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl LockDocument {
    /// Create an empty document at the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            format_version: CURRENT_VERSION,
            compilation_options: None,
            runtime_options: None,
            dependency_groups: Vec::new(),
            package_libraries: Vec::new(),
            project_libraries: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Returns true if this document can be trusted beyond raw inspection.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.format_version == CURRENT_VERSION
    }

    /// Find the target for an exact (framework, runtime) pair.
    #[must_use]
    pub fn target(&self, framework: &str, runtime: Option<&str>) -> Option<&LockTarget> {
        self.targets.iter().find(|t| t.matches(framework, runtime))
    }

    /// Build a lookup index over the libraries section.
    #[must_use]
    pub fn lookup(&self) -> LockLookup<'_> {
        LockLookup::new(self)
    }
}

/// Index over a document's package and project libraries, built once.
///
/// Packages are keyed by (name, version), projects by name. The first entry
/// wins when the document repeats a key.
#[derive(Debug)]
pub struct LockLookup<'a> {
    packages: HashMap<(&'a str, &'a Version), &'a PackageLibrary>,
    projects: HashMap<&'a str, &'a ProjectLibrary>,
}

impl<'a> LockLookup<'a> {
    #[must_use]
    pub fn new(document: &'a LockDocument) -> Self {
        let mut packages = HashMap::with_capacity(document.package_libraries.len());
        for package in &document.package_libraries {
            packages
                .entry((package.name.as_str(), &package.version))
                .or_insert(package);
        }

        let mut projects = HashMap::with_capacity(document.project_libraries.len());
        for project in &document.project_libraries {
            projects.entry(project.name.as_str()).or_insert(project);
        }

        Self { packages, projects }
    }

    #[must_use]
    pub fn package(&self, name: &str, version: &Version) -> Option<&'a PackageLibrary> {
        self.packages.get(&(name, version)).copied()
    }

    #[must_use]
    pub fn project(&self, name: &str) -> Option<&'a ProjectLibrary> {
        self.projects.get(name).copied()
    }
}
