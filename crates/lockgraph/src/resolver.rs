//! Project context resolution.
//!
//! This module provides:
//! - Target selection: the lock target matching a (framework, runtime) pair
//! - Library classification against the document's package and project metadata
//! - The resulting [`ProjectContext`] handed to compilation

use crate::config::Settings;
use crate::context::{CompilationOptions, DependencyContext};
use crate::declaration::ProjectDeclaration;
use crate::export::{self, ExportedDependency, LibraryExport};
use crate::fs::{self, DocumentError};
use crate::model::{
    Dependency, LibraryKey, LibraryKind, LockDocument, LockItem, LockLookup, LockTargetLibrary,
};
use crate::version::{display_version, VersionRange};
use semver::Version;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The lock document could not be read.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// No lock target for the requested framework and runtime.
    #[error("lock document has no target for {}", describe_target(.framework, .runtime.as_deref()))]
    NoMatchingTarget {
        framework: String,
        runtime: Option<String>,
    },

    /// Target libraries with neither package nor project metadata.
    #[error("unresolved libraries: {}", format_keys(.0))]
    UnresolvedLibraries(Vec<LibraryKey>),
}

fn describe_target(framework: &str, runtime: Option<&str>) -> String {
    match runtime {
        Some(runtime) => format!("'{framework}' on runtime '{runtime}'"),
        None => format!("'{framework}'"),
    }
}

fn format_keys(keys: &[LibraryKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A file contributed by a library, with metadata such as a locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryAsset {
    /// Path relative to the library root; absolute for project outputs.
    pub path: PathBuf,
    pub metadata: BTreeMap<String, String>,
}

impl LibraryAsset {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Returns true for the `_._` marker a package uses to say "no asset here".
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.path.to_string_lossy().ends_with("_._")
    }
}

impl From<&LockItem> for LibraryAsset {
    fn from(item: &LockItem) -> Self {
        Self {
            path: item.path.clone(),
            metadata: item.properties.clone(),
        }
    }
}

/// A resolved library with the assets it contributes to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDescription {
    pub name: String,
    pub version: Version,
    pub kind: LibraryKind,
    pub target_framework: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub compilation_assets: Vec<LibraryAsset>,
    pub runtime_assets: Vec<LibraryAsset>,
    pub resource_assets: Vec<LibraryAsset>,
    pub native_assets: Vec<LibraryAsset>,
    /// Shared source files compiled straight into the consumer.
    pub source_assets: Vec<LibraryAsset>,
    pub framework_references: Vec<String>,
    pub content_hash: Option<String>,
    pub serviceable: bool,
    /// Project libraries: the referenced project's document.
    pub project_path: Option<PathBuf>,
}

impl LibraryDescription {
    fn from_target_library(library: &LockTargetLibrary, kind: LibraryKind) -> Self {
        Self {
            name: library.name.clone(),
            version: library.version.clone(),
            kind,
            target_framework: library.target_framework.clone(),
            dependencies: library.dependencies.clone(),
            compilation_assets: Vec::new(),
            runtime_assets: Vec::new(),
            resource_assets: Vec::new(),
            native_assets: Vec::new(),
            source_assets: Vec::new(),
            framework_references: library.framework_assemblies.iter().cloned().collect(),
            content_hash: None,
            serviceable: false,
            project_path: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(self.name.clone(), self.version.clone())
    }

    /// Describe this library as an export for `framework`.
    ///
    /// Placeholder assets are left out and framework references become
    /// dependencies on reference assemblies.
    #[must_use]
    pub fn to_export(&self, framework: &str) -> LibraryExport {
        let assets = |assets: &[LibraryAsset]| -> Vec<PathBuf> {
            assets
                .iter()
                .filter(|a| !a.is_placeholder())
                .map(|a| a.path.clone())
                .collect()
        };

        let mut export =
            LibraryExport::new(self.name.clone(), self.version.clone(), self.kind, framework);
        export.target_framework = self.target_framework.clone();
        export.content_hash = self.content_hash.clone();
        export.serviceable = self.serviceable;
        export.dependencies = self
            .dependencies
            .iter()
            .map(|d| ExportedDependency::new(d.name.clone(), d.range.clone()))
            .chain(self.framework_references.iter().map(|name| {
                ExportedDependency::new(name.clone(), VersionRange::ANY)
                    .with_target(LibraryKind::ReferenceAssembly)
            }))
            .collect();
        export.compile_assemblies = assets(&self.compilation_assets);
        export.runtime_assemblies = assets(&self.runtime_assets);
        export.native_libraries = assets(&self.native_assets);
        export
    }
}

/// The libraries a project resolved to for one (framework, runtime) target.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    name: String,
    project_directory: PathBuf,
    output_directory: PathBuf,
    target_framework: String,
    runtime_identifier: Option<String>,
    libraries: BTreeMap<String, LibraryDescription>,
}

impl ProjectContext {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn project_directory(&self) -> &Path {
        &self.project_directory
    }

    /// The project's own build output directory.
    #[must_use]
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    #[must_use]
    pub fn target_framework(&self) -> &str {
        &self.target_framework
    }

    #[must_use]
    pub fn runtime_identifier(&self) -> Option<&str> {
        self.runtime_identifier.as_deref()
    }

    /// All resolved libraries, ordered by name.
    pub fn libraries(&self) -> impl Iterator<Item = &LibraryDescription> {
        self.libraries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Look up a library by name.
    #[must_use]
    pub fn resolve_library(&self, name: &str) -> Option<&LibraryDescription> {
        self.libraries.get(name)
    }

    /// Exports of every resolved library for this context's framework.
    #[must_use]
    pub fn exports(&self) -> Vec<LibraryExport> {
        self.libraries()
            .map(|library| library.to_export(&self.target_framework))
            .collect()
    }

    /// Flatten this context into a dependency context; see [`export::build_context`].
    #[must_use]
    pub fn dependency_context(
        &self,
        compilation_options: CompilationOptions,
        runtime_options: Option<Map<String, Value>>,
    ) -> DependencyContext {
        export::build_context(
            &self.exports(),
            &self.target_framework,
            self.runtime_identifier.as_deref(),
            compilation_options,
            runtime_options,
        )
    }
}

/// Builds [`ProjectContext`]s from lock documents.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    settings: Settings,
}

impl Resolver {
    /// Create a resolver with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Path of the lock document belonging to `project`.
    #[must_use]
    pub fn lock_path(&self, project: &ProjectDeclaration) -> PathBuf {
        project.directory.join(&self.settings.lock_file)
    }

    /// Read the project's lock document and resolve it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read, or as [`Resolver::resolve`].
    pub fn load(
        &self,
        project: &ProjectDeclaration,
        framework: &str,
        runtime: Option<&str>,
    ) -> Result<ProjectContext, ResolveError> {
        let document = fs::read_document(&self.lock_path(project), &self.settings.retry.policy())?;
        self.resolve(project, &document, framework, runtime)
    }

    /// Resolve `project` against the lock target for `framework` and `runtime`.
    ///
    /// Each library of the target is matched first against package metadata
    /// by name and version, then against project metadata by name. Libraries
    /// the framework provides need no metadata. Anything else is unresolved.
    ///
    /// # Errors
    ///
    /// Returns an error if no target matches exactly, or if any library is
    /// unresolved.
    pub fn resolve(
        &self,
        project: &ProjectDeclaration,
        document: &LockDocument,
        framework: &str,
        runtime: Option<&str>,
    ) -> Result<ProjectContext, ResolveError> {
        let target = document
            .target(framework, runtime)
            .ok_or_else(|| ResolveError::NoMatchingTarget {
                framework: framework.to_string(),
                runtime: runtime.map(str::to_string),
            })?;
        tracing::debug!(
            project = %project.name,
            target = %target.key(),
            libraries = target.libraries.len(),
            "selected lock target"
        );

        let lookup = document.lookup();
        let mut libraries: BTreeMap<String, LibraryDescription> = BTreeMap::new();
        let mut unresolved = Vec::new();
        for library in &target.libraries {
            let Some(description) = self.describe(project, framework, library, &lookup) else {
                unresolved.push(library.key());
                continue;
            };

            tracing::trace!(library = %description.key(), kind = %description.kind, "resolved library");
            if let Some(existing) = libraries.get(&description.name) {
                tracing::warn!(
                    library = %description.name,
                    kept = %display_version(&existing.version),
                    ignored = %display_version(&description.version),
                    "lock target lists a library twice"
                );
                continue;
            }
            libraries.insert(description.name.clone(), description);
        }

        if !unresolved.is_empty() {
            return Err(ResolveError::UnresolvedLibraries(unresolved));
        }

        Ok(ProjectContext {
            name: project.name.clone(),
            project_directory: project.directory.clone(),
            output_directory: project.directory.join(&self.settings.output_dir),
            target_framework: framework.to_string(),
            runtime_identifier: runtime.map(str::to_string),
            libraries,
        })
    }

    fn describe(
        &self,
        project: &ProjectDeclaration,
        framework: &str,
        library: &LockTargetLibrary,
        lookup: &LockLookup<'_>,
    ) -> Option<LibraryDescription> {
        if let Some(package) = lookup.package(&library.name, &library.version) {
            let mut description = LibraryDescription::from_target_library(library, LibraryKind::Package);
            description.compilation_assets = assets(&library.compile_time_assemblies);
            description.runtime_assets = assets(&library.runtime_assemblies);
            description.resource_assets = assets(&library.resource_assemblies);
            description.native_assets = assets(&library.native_libraries);
            description.source_assets = package
                .files
                .iter()
                .filter(|file| file.starts_with(&self.settings.shared_sources_dir))
                .map(|file| {
                    let mut asset = LibraryAsset::new(file.clone());
                    asset
                        .metadata
                        .insert("language".to_string(), self.settings.source_language.clone());
                    asset
                })
                .collect();
            description.content_hash = package.content_hash.clone();
            description.serviceable = package.serviceable;
            return Some(description);
        }

        if let Some(sibling) = lookup.project(&library.name) {
            let sibling_directory = match &sibling.path {
                Some(path) => project
                    .directory
                    .join(path)
                    .parent()
                    .map_or_else(|| project.directory.clone(), Path::to_path_buf),
                None => project.directory.join("..").join(&library.name),
            };
            let output = sibling_directory
                .join(&self.settings.output_dir)
                .join(library.target_framework.as_deref().unwrap_or(framework))
                .join(format!("{}.dll", library.name));

            let mut description = LibraryDescription::from_target_library(library, LibraryKind::Project);
            description.compilation_assets = vec![LibraryAsset::new(output.clone())];
            description.runtime_assets = vec![LibraryAsset::new(output)];
            description.project_path = sibling.path.clone();
            return Some(description);
        }

        if library.kind == LibraryKind::ReferenceAssembly {
            return Some(LibraryDescription::from_target_library(
                library,
                LibraryKind::ReferenceAssembly,
            ));
        }

        tracing::debug!(library = %library.key(), "no package or project metadata");
        None
    }
}

fn assets(items: &[LockItem]) -> Vec<LibraryAsset> {
    items.iter().map(LibraryAsset::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    const LOCK: &str = r#"{
  "version": 2,
  "targets": {
    "net452": {
      "Newtonsoft.Json/7.0.1": {
        "type": "package",
        "compile": { "lib/net45/Newtonsoft.Json.dll": {} }
      },
      "Lib/1.0.0": { "type": "project", "framework": "net451" }
    },
    "net452/win7-x64": {
      "Newtonsoft.Json/7.0.1": {
        "type": "package",
        "dependencies": { "System.Runtime": "4.0.0" },
        "frameworkAssemblies": [ "System.Xml" ],
        "compile": { "ref/net45/_._": {} },
        "runtime": { "lib/net45/Newtonsoft.Json.dll": {} },
        "resource": { "lib/net45/de/Newtonsoft.Json.resources.dll": { "locale": "de" } },
        "native": { "runtimes/win7-x64/native/json.dll": {} }
      },
      "Lib/1.0.0": { "type": "project" },
      "System.Runtime/4.0.0": { "type": "referenceAssembly" }
    }
  },
  "libraries": {
    "Lib/1.0.0": { "type": "project", "path": "../Lib/project.json" },
    "Newtonsoft.Json/7.0.1": {
      "type": "package",
      "serviceable": true,
      "sha512": "abc==",
      "files": [ "lib/net45/Newtonsoft.Json.dll", "shared/Helpers.cs", "shared/sub/More.cs" ]
    }
  }
}"#;

    fn project() -> ProjectDeclaration {
        ProjectDeclaration::new("App", PathBuf::from("/work/App"))
    }

    fn document() -> LockDocument {
        codec::decode(LOCK.as_bytes()).unwrap()
    }

    #[test]
    fn test_selects_exact_target() {
        let resolver = Resolver::new();
        let context = resolver
            .resolve(&project(), &document(), "net452", Some("win7-x64"))
            .unwrap();
        assert_eq!(context.len(), 3);
        assert_eq!(context.runtime_identifier(), Some("win7-x64"));

        let compile_only = resolver.resolve(&project(), &document(), "net452", None).unwrap();
        assert_eq!(compile_only.len(), 2);
        assert!(compile_only.resolve_library("System.Runtime").is_none());
    }

    #[test]
    fn test_no_matching_target() {
        let err = Resolver::new()
            .resolve(&project(), &document(), "net452", Some("osx-x64"))
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::NoMatchingTarget { ref runtime, .. } if runtime.as_deref() == Some("osx-x64")
        ));
        assert!(err.to_string().contains("osx-x64"));

        assert!(Resolver::new()
            .resolve(&project(), &document(), "net46", None)
            .is_err());
    }

    #[test]
    fn test_package_library() {
        let context = Resolver::new()
            .resolve(&project(), &document(), "net452", Some("win7-x64"))
            .unwrap();
        let json = context.resolve_library("Newtonsoft.Json").unwrap();

        assert_eq!(json.kind, LibraryKind::Package);
        assert_eq!(json.content_hash.as_deref(), Some("abc=="));
        assert!(json.serviceable);
        assert_eq!(json.dependencies.len(), 1);
        assert_eq!(json.framework_references, ["System.Xml"]);
        assert!(json.compilation_assets[0].is_placeholder());
        assert_eq!(json.runtime_assets.len(), 1);
        assert_eq!(json.native_assets.len(), 1);
        assert_eq!(
            json.resource_assets[0].metadata.get("locale").map(String::as_str),
            Some("de")
        );

        let sources: Vec<PathBuf> = json.source_assets.iter().map(|a| a.path.clone()).collect();
        assert_eq!(
            sources,
            [
                Path::new("shared").join("Helpers.cs"),
                Path::new("shared").join("sub").join("More.cs")
            ]
        );
        assert_eq!(
            json.source_assets[0].metadata.get("language").map(String::as_str),
            Some("csharp")
        );
    }

    #[test]
    fn test_project_library_output_path() {
        let resolver = Resolver::new();

        let context = resolver.resolve(&project(), &document(), "net452", None).unwrap();
        let lib = context.resolve_library("Lib").unwrap();
        assert_eq!(lib.kind, LibraryKind::Project);
        let expected = Path::new("/work/App/../Lib/bin/net451/Lib.dll");
        assert_eq!(lib.compilation_assets[0].path, expected);
        assert_eq!(lib.runtime_assets[0].path, expected);
        assert!(lib.project_path.is_some());

        // without a library framework the requested framework is used
        let context = resolver
            .resolve(&project(), &document(), "net452", Some("win7-x64"))
            .unwrap();
        assert_eq!(
            context.resolve_library("Lib").unwrap().runtime_assets[0].path,
            Path::new("/work/App/../Lib/bin/net452/Lib.dll")
        );
    }

    #[test]
    fn test_reference_assembly_has_no_assets() {
        let context = Resolver::new()
            .resolve(&project(), &document(), "net452", Some("win7-x64"))
            .unwrap();
        let runtime = context.resolve_library("System.Runtime").unwrap();
        assert_eq!(runtime.kind, LibraryKind::ReferenceAssembly);
        assert!(runtime.compilation_assets.is_empty());
        assert!(runtime.runtime_assets.is_empty());
    }

    #[test]
    fn test_unresolved_library_is_an_error() {
        let mut doc = document();
        doc.targets[0]
            .libraries
            .push(LockTargetLibrary::new("Foo", Version::new(1, 0, 0), LibraryKind::Package));

        let err = Resolver::new()
            .resolve(&project(), &doc, "net452", None)
            .unwrap_err();
        let ResolveError::UnresolvedLibraries(keys) = &err else {
            panic!("expected unresolved libraries, got {err:?}");
        };
        assert_eq!(keys.iter().map(ToString::to_string).collect::<Vec<_>>(), ["Foo/1.0.0"]);
        assert_eq!(err.to_string(), "unresolved libraries: Foo/1.0.0");
    }

    #[test]
    fn test_custom_settings() {
        let settings = Settings::parse("output-dir = \"out\"\nshared-sources-dir = \"lib\"\n").unwrap();
        let resolver = Resolver::new().with_settings(settings);
        let context = resolver
            .resolve(&project(), &document(), "net452", Some("win7-x64"))
            .unwrap();

        assert_eq!(context.output_directory(), Path::new("/work/App/out"));
        let json = context.resolve_library("Newtonsoft.Json").unwrap();
        assert_eq!(json.source_assets.len(), 1);
        assert_eq!(
            context.resolve_library("Lib").unwrap().runtime_assets[0].path,
            Path::new("/work/App/../Lib/out/net452/Lib.dll")
        );
    }

    #[test]
    fn test_dependency_context_from_exports() {
        let context = Resolver::new()
            .resolve(&project(), &document(), "net452", Some("win7-x64"))
            .unwrap();
        let deps = context.dependency_context(CompilationOptions::default(), None);

        assert_eq!(deps.target_framework, "net452");
        assert_eq!(deps.runtime_libraries.len(), 3);

        let json = deps.runtime_library("Newtonsoft.Json").unwrap();
        assert_eq!(json.library.framework_assemblies, ["System.Xml"]);
        assert_eq!(
            json.library.dependencies,
            [Dependency::new(
                "System.Runtime",
                VersionRange::at_least(Version::new(4, 0, 0))
            )]
        );
        // placeholder compile asset is dropped
        assert!(deps.compile_library("Newtonsoft.Json").unwrap().assemblies.is_empty());

        let lib = deps.runtime_library("Lib").unwrap();
        assert_eq!(lib.assemblies, [PathBuf::from("Lib.dll")]);
    }
}
