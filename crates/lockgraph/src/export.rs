//! Flattening resolved library exports into a dependency context.
//!
//! An export is a library as handed to a build for one target framework,
//! with its assets already selected. Several exports can share a name when
//! the framework itself provides an assembly that a package also ships; the
//! framework's reference assembly always wins, so the application never
//! carries a second copy.

use crate::context::{CompilationLibrary, CompilationOptions, DependencyContext, Library, RuntimeLibrary};
use crate::model::{Dependency, LibraryKind};
use crate::version::VersionRange;
use semver::Version;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// A dependency edge of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDependency {
    pub name: String,
    pub range: VersionRange,
    /// The kind of library the edge must resolve to, if restricted.
    pub target: Option<LibraryKind>,
}

impl ExportedDependency {
    #[must_use]
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
            target: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: LibraryKind) -> Self {
        self.target = Some(target);
        self
    }

    /// Returns true if the framework satisfies this dependency.
    #[must_use]
    pub fn is_framework_reference(&self) -> bool {
        self.target == Some(LibraryKind::ReferenceAssembly)
    }
}

/// A resolved library with the assets it contributes to one framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryExport {
    pub name: String,
    pub version: Version,
    pub kind: LibraryKind,
    /// The framework this export was resolved for.
    pub framework: String,
    /// The library's own framework folder chosen for `framework`.
    pub target_framework: Option<String>,
    pub content_hash: Option<String>,
    pub serviceable: bool,
    pub dependencies: Vec<ExportedDependency>,
    /// Project exports only: the project builds an executable.
    pub emits_entry_point: bool,
    pub compile_assemblies: Vec<PathBuf>,
    pub runtime_assemblies: Vec<PathBuf>,
    pub native_libraries: Vec<PathBuf>,
}

impl LibraryExport {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: Version,
        kind: LibraryKind,
        framework: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            kind,
            framework: framework.into(),
            target_framework: None,
            content_hash: None,
            serviceable: false,
            dependencies: Vec::new(),
            emits_entry_point: false,
            compile_assemblies: Vec::new(),
            runtime_assemblies: Vec::new(),
            native_libraries: Vec::new(),
        }
    }
}

/// Keep one export per name.
///
/// A reference assembly replaces any other export of the same name; among
/// the rest the first one wins. Survivors keep the position of the first
/// export with their name.
#[must_use]
pub fn deduplicate<'a, I>(exports: I) -> Vec<&'a LibraryExport>
where
    I: IntoIterator<Item = &'a LibraryExport>,
{
    let mut kept: Vec<&LibraryExport> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for export in exports {
        match index.get(export.name.as_str()) {
            None => {
                index.insert(&export.name, kept.len());
                kept.push(export);
            }
            Some(&slot) => {
                let current = kept[slot];
                let replace = export.kind == LibraryKind::ReferenceAssembly
                    && current.kind != LibraryKind::ReferenceAssembly;
                let (winner, loser) = if replace { (export, current) } else { (current, export) };
                tracing::debug!(
                    library = %export.name,
                    kept = %winner.kind,
                    dropped = %loser.kind,
                    "dropping duplicate export"
                );
                kept[slot] = winner;
            }
        }
    }

    kept
}

/// Returns true for frameworks of the desktop runtime family, such as `net451`.
#[must_use]
pub fn is_desktop_framework(framework: &str) -> bool {
    if framework.starts_with(".NETFramework") {
        return true;
    }
    ["net", "dnx"].iter().any(|prefix| {
        framework
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Build a dependency context straight from a set of exports.
///
/// Exports for other frameworks are ignored and the rest are
/// de-duplicated with [`deduplicate`]. Dependency edges are kept only when
/// they point at a surviving export, and then require at least its version;
/// edges to the framework become framework assembly references. A project
/// contributes a single assembly named after it: `<name>.exe` when it emits
/// an entry point for a desktop framework, `<name>.dll` otherwise.
#[must_use]
pub fn build_context(
    exports: &[LibraryExport],
    framework: &str,
    runtime: Option<&str>,
    compilation_options: CompilationOptions,
    runtime_options: Option<Map<String, Value>>,
) -> DependencyContext {
    let selected = deduplicate(exports.iter().filter(|e| e.framework == framework));
    let versions: HashMap<&str, &Version> = selected
        .iter()
        .map(|e| (e.name.as_str(), &e.version))
        .collect();

    let mut compile_libraries = Vec::with_capacity(selected.len());
    let mut runtime_libraries = Vec::with_capacity(selected.len());
    for export in &selected {
        let library = context_library(export, &versions);

        let (compile, runtime) = if export.kind == LibraryKind::Project {
            let extension = if export.emits_entry_point && is_desktop_framework(framework) {
                "exe"
            } else {
                "dll"
            };
            let assembly = PathBuf::from(format!("{}.{extension}", export.name));
            (vec![assembly.clone()], vec![assembly])
        } else {
            (export.compile_assemblies.clone(), export.runtime_assemblies.clone())
        };

        compile_libraries.push(CompilationLibrary {
            library: library.clone(),
            assemblies: compile,
        });
        runtime_libraries.push(RuntimeLibrary {
            library,
            assemblies: runtime,
            native_libraries: export.native_libraries.clone(),
        });
    }

    tracing::debug!(
        framework,
        runtime,
        exports = exports.len(),
        libraries = selected.len(),
        "flattened exports into dependency context"
    );

    DependencyContext {
        target_framework: framework.to_string(),
        runtime_identifier: runtime.map(str::to_string),
        compilation_options,
        runtime_options,
        compile_libraries,
        runtime_libraries,
    }
}

fn context_library(export: &LibraryExport, versions: &HashMap<&str, &Version>) -> Library {
    let dependencies = export
        .dependencies
        .iter()
        .filter(|d| !d.is_framework_reference())
        .filter_map(|d| {
            versions
                .get(d.name.as_str())
                .map(|&version| Dependency::new(d.name.clone(), VersionRange::at_least(version.clone())))
        })
        .collect();
    let framework_assemblies = export
        .dependencies
        .iter()
        .filter(|d| d.is_framework_reference())
        .map(|d| d.name.clone())
        .collect();

    Library {
        kind: export.kind,
        name: export.name.clone(),
        version: export.version.clone(),
        target_framework: export.target_framework.clone(),
        content_hash: export.content_hash.clone(),
        dependencies,
        framework_assemblies,
        serviceable: export.serviceable,
    }
}
