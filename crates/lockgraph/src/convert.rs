//! Conversion between lock documents and dependency contexts.

use crate::context::{CompilationLibrary, CompilationOptions, DependencyContext, Library, RuntimeLibrary};
use crate::model::{
    LibraryKind, LockDocument, LockItem, LockLookup, LockTarget, LockTargetLibrary, PackageLibrary,
    ProjectLibrary,
};
use semver::Version;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when building a context from a lock document.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("lock document has no runtime-specific target")]
    MissingRuntimeTarget,

    #[error("invalid compilation options: {0}")]
    CompilationOptions(#[source] serde_json::Error),
}

/// Build a dependency context from a lock document.
///
/// The first target with a runtime identifier supplies the runtime
/// libraries; the first target without one supplies the compile libraries,
/// which stay empty when there is no such target. Content hashes and the
/// serviceable flag come from the matching package library, if any.
///
/// # Errors
///
/// Returns an error if the document has no runtime-specific target or its
/// compilation options are malformed.
pub fn from_lock_document(document: &LockDocument) -> Result<DependencyContext, ConvertError> {
    let runtime_target = document
        .targets
        .iter()
        .find(|t| t.is_runtime_specific())
        .ok_or(ConvertError::MissingRuntimeTarget)?;
    let compile_target = document.targets.iter().find(|t| !t.is_runtime_specific());

    let compilation_options = match &document.compilation_options {
        Some(options) => {
            CompilationOptions::from_json(options).map_err(ConvertError::CompilationOptions)?
        }
        None => CompilationOptions::default(),
    };

    let lookup = document.lookup();
    let runtime_libraries: Vec<RuntimeLibrary> = runtime_target
        .libraries
        .iter()
        .map(|library| RuntimeLibrary {
            library: context_library(library, &lookup),
            assemblies: paths(&library.runtime_assemblies),
            native_libraries: paths(&library.native_libraries),
        })
        .collect();
    let compile_libraries: Vec<CompilationLibrary> = compile_target
        .map(|target| {
            target
                .libraries
                .iter()
                .map(|library| CompilationLibrary {
                    library: context_library(library, &lookup),
                    assemblies: paths(&library.compile_time_assemblies),
                })
                .collect()
        })
        .unwrap_or_default();

    tracing::debug!(
        runtime_target = %runtime_target.key(),
        compile_target = compile_target.map(|t| t.key().to_string()),
        runtime_libraries = runtime_libraries.len(),
        compile_libraries = compile_libraries.len(),
        "built dependency context from lock document"
    );

    Ok(DependencyContext {
        target_framework: compile_target
            .unwrap_or(runtime_target)
            .framework
            .clone(),
        runtime_identifier: runtime_target.runtime.clone(),
        compilation_options,
        runtime_options: document.runtime_options.clone(),
        compile_libraries,
        runtime_libraries,
    })
}

/// Convert a dependency context to a lock document.
///
/// The runtime libraries always form a target keyed by the context's
/// framework and runtime. With `preserve_compilation_context`, the compile
/// libraries form an additional compile-only target and the compilation
/// options are kept. A context without a runtime identifier already uses the
/// bare framework key for its runtime target, so no compile target is written
/// for it; its compile libraries still get libraries section entries. The libraries section holds one entry per distinct
/// (name, version) across both targets, the first occurrence winning.
/// Reference assemblies are provided by the framework and get no entry.
#[must_use]
pub fn to_lock_document(context: &DependencyContext, preserve_compilation_context: bool) -> LockDocument {
    let mut document = LockDocument::new();
    document.runtime_options = context.runtime_options.clone();

    let mut runtime_target = LockTarget::new(
        context.target_framework.clone(),
        context.runtime_identifier.clone(),
    );
    runtime_target.libraries = context
        .runtime_libraries
        .iter()
        .map(|runtime| {
            let mut library = target_library(&runtime.library);
            library.runtime_assemblies = items(&runtime.assemblies);
            library.native_libraries = items(&runtime.native_libraries);
            library
        })
        .collect();
    document.targets.push(runtime_target);

    let mut emitted: Vec<&Library> = context.runtime_libraries.iter().map(|l| &l.library).collect();
    if preserve_compilation_context {
        document.compilation_options =
            Some(context.compilation_options.to_json()).filter(|o| !o.is_empty());

        if context.runtime_identifier.is_some() {
            let mut compile_target = LockTarget::new(context.target_framework.clone(), None);
            compile_target.libraries = context
                .compile_libraries
                .iter()
                .map(|compile| {
                    let mut library = target_library(&compile.library);
                    library.compile_time_assemblies = items(&compile.assemblies);
                    library
                })
                .collect();
            document.targets.push(compile_target);
        } else {
            tracing::debug!(
                framework = %context.target_framework,
                "no runtime identifier, compile target shares the runtime target key and is not written"
            );
        }
        emitted.extend(context.compile_libraries.iter().map(|l| &l.library));
    }

    let mut seen: HashSet<(&str, &Version)> = HashSet::new();
    for library in emitted {
        if !seen.insert((library.name.as_str(), &library.version)) {
            continue;
        }
        match library.kind {
            LibraryKind::Package => {
                let mut package = PackageLibrary::new(library.name.clone(), library.version.clone());
                package.serviceable = library.serviceable;
                package.content_hash = library.content_hash.clone();
                document.package_libraries.push(package);
            }
            LibraryKind::Project => {
                document
                    .project_libraries
                    .push(ProjectLibrary::new(library.name.clone(), library.version.clone()));
            }
            LibraryKind::ReferenceAssembly => {
                tracing::debug!(
                    library = %library.name,
                    "skipping reference assembly in libraries section"
                );
            }
        }
    }

    document
}

fn context_library(library: &LockTargetLibrary, lookup: &LockLookup<'_>) -> Library {
    let package = lookup.package(&library.name, &library.version);
    Library {
        kind: library.kind,
        name: library.name.clone(),
        version: library.version.clone(),
        target_framework: library.target_framework.clone(),
        content_hash: package.and_then(|p| p.content_hash.clone()),
        dependencies: library.dependencies.clone(),
        framework_assemblies: library.framework_assemblies.iter().cloned().collect(),
        serviceable: package.is_some_and(|p| p.serviceable),
    }
}

fn target_library(library: &Library) -> LockTargetLibrary {
    let mut target = LockTargetLibrary::new(library.name.clone(), library.version.clone(), library.kind);
    target.target_framework = library.target_framework.clone();
    target.dependencies = library.dependencies.clone();
    target.framework_assemblies = library.framework_assemblies.iter().cloned().collect();
    target
}

fn paths(items: &[LockItem]) -> Vec<PathBuf> {
    items.iter().map(|item| item.path.clone()).collect()
}

fn items(paths: &[PathBuf]) -> Vec<LockItem> {
    paths.iter().map(LockItem::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::model::Dependency;
    use crate::version::VersionRange;
    use serde_json::{json, Map, Value};

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn library(kind: LibraryKind, name: &str, version: &str) -> Library {
        Library::new(kind, name, v(version))
    }

    fn runtime(library: Library, assemblies: &[&str]) -> RuntimeLibrary {
        RuntimeLibrary {
            library,
            assemblies: assemblies.iter().map(PathBuf::from).collect(),
            native_libraries: Vec::new(),
        }
    }

    fn compile(library: Library, assemblies: &[&str]) -> CompilationLibrary {
        CompilationLibrary {
            library,
            assemblies: assemblies.iter().map(PathBuf::from).collect(),
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn sample_context() -> DependencyContext {
        let mut json = library(LibraryKind::Package, "Newtonsoft.Json", "7.0.1");
        json.content_hash = Some("abc==".to_string());
        json.serviceable = true;
        json.dependencies = vec![Dependency::new("System.Runtime", VersionRange::at_least(v("4.0.0")))];
        json.framework_assemblies = vec!["System.Xml".to_string()];

        let app_lib = library(LibraryKind::Project, "AppLib", "1.0.0");
        let mscorlib = library(LibraryKind::ReferenceAssembly, "mscorlib", "4.0.0");

        DependencyContext {
            target_framework: "net451".to_string(),
            runtime_identifier: Some("win7-x64".to_string()),
            compilation_options: CompilationOptions {
                emit_entry_point: Some(true),
                ..CompilationOptions::default()
            },
            runtime_options: Some(object(json!({ "gcServer": true }))),
            compile_libraries: vec![
                compile(json.clone(), &["lib/net45/Newtonsoft.Json.dll"]),
                compile(app_lib.clone(), &["AppLib.dll"]),
                compile(mscorlib, &[]),
                compile(library(LibraryKind::Package, "CompileOnly", "2.0.0"), &["ref/c.dll"]),
            ],
            runtime_libraries: vec![
                runtime(json, &["lib/net45/Newtonsoft.Json.dll"]),
                runtime(app_lib, &["AppLib.dll"]),
            ],
        }
    }

    #[test]
    fn test_to_lock_document_runtime_only() {
        let doc = to_lock_document(&sample_context(), false);

        assert_eq!(doc.targets.len(), 1);
        let target = doc.target("net451", Some("win7-x64")).unwrap();
        assert_eq!(target.libraries.len(), 2);
        assert_eq!(target.libraries[0].runtime_assemblies.len(), 1);
        assert!(target.libraries[0].compile_time_assemblies.is_empty());
        assert!(doc.compilation_options.is_none());
        assert_eq!(doc.runtime_options, Some(object(json!({ "gcServer": true }))));

        assert_eq!(doc.package_libraries.len(), 1);
        assert_eq!(doc.project_libraries.len(), 1);
        assert!(doc.package_libraries[0].serviceable);
        assert_eq!(doc.package_libraries[0].content_hash.as_deref(), Some("abc=="));
        assert!(doc.project_libraries[0].path.is_none());
    }

    #[test]
    fn test_to_lock_document_preserves_compilation_context() {
        let doc = to_lock_document(&sample_context(), true);

        assert_eq!(doc.targets.len(), 2);
        let compile = doc.target("net451", None).unwrap();
        assert_eq!(compile.libraries.len(), 4);
        assert_eq!(compile.libraries[0].compile_time_assemblies.len(), 1);
        assert_eq!(
            doc.compilation_options,
            Some(object(json!({ "emitEntryPoint": true })))
        );

        // each (name, version) once; reference assemblies never
        let names: Vec<&str> = doc.package_libraries.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Newtonsoft.Json", "CompileOnly"]);
        assert_eq!(doc.project_libraries.len(), 1);
    }

    #[test]
    fn test_portable_context_keeps_runtime_target_when_preserving() {
        let mut context = sample_context();
        context.runtime_identifier = None;

        let doc = to_lock_document(&context, true);
        assert_eq!(doc.targets.len(), 1);
        let target = doc.target("net451", None).unwrap();
        assert_eq!(target.libraries.len(), 2);
        assert_eq!(target.libraries[0].runtime_assemblies.len(), 1);
        assert!(doc.compilation_options.is_some());

        let names: Vec<&str> = doc.package_libraries.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Newtonsoft.Json", "CompileOnly"]);

        let encoded = codec::encode(&doc).unwrap();
        let reread = codec::decode(&encoded).unwrap();
        assert_eq!(reread, doc);
        let runtime = &reread.target("net451", None).unwrap().libraries[0];
        assert_eq!(runtime.runtime_assemblies[0].path, PathBuf::from("lib/net45/Newtonsoft.Json.dll"));
    }

    #[test]
    fn test_from_lock_document_selects_first_targets() {
        let doc = to_lock_document(&sample_context(), true);
        let context = from_lock_document(&doc).unwrap();

        assert_eq!(context.target_framework, "net451");
        assert_eq!(context.runtime_identifier.as_deref(), Some("win7-x64"));
        assert_eq!(context.runtime_libraries.len(), 2);
        assert_eq!(context.compile_libraries.len(), 4);
        assert_eq!(context.compilation_options.emit_entry_point, Some(true));

        let json = context.runtime_library("Newtonsoft.Json").unwrap();
        assert!(json.library.serviceable);
        assert_eq!(json.library.content_hash.as_deref(), Some("abc=="));
        assert_eq!(json.library.framework_assemblies, ["System.Xml"]);

        let app_lib = context.compile_library("AppLib").unwrap();
        assert_eq!(app_lib.library.kind, LibraryKind::Project);
        assert!(app_lib.library.content_hash.is_none());
        assert!(!app_lib.library.serviceable);
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let context = sample_context();
        let reloaded = DependencyContext::load(&context.to_bytes(true).unwrap()).unwrap();
        assert_eq!(reloaded, context);
    }

    #[test]
    fn test_missing_runtime_target() {
        let mut doc = LockDocument::new();
        doc.targets.push(LockTarget::new("net451", None));
        assert!(matches!(
            from_lock_document(&doc),
            Err(ConvertError::MissingRuntimeTarget)
        ));
    }

    #[test]
    fn test_without_compile_target() {
        let doc = codec::decode(
            br#"{"version": 2, "targets": {"dnxcore50/osx-x64": {"A/1.0.0": {"type": "package"}}}}"#,
        )
        .unwrap();
        let context = from_lock_document(&doc).unwrap();
        assert_eq!(context.target_framework, "dnxcore50");
        assert!(context.compile_libraries.is_empty());
        assert_eq!(context.runtime_libraries.len(), 1);
        assert!(context.runtime_libraries[0].library.content_hash.is_none());
    }

    #[test]
    fn test_malformed_compilation_options() {
        let doc = codec::decode(
            br#"{"version": 2, "compilationOptions": {"defines": "DEBUG"}, "targets": {"net451/win7-x64": {}}}"#,
        )
        .unwrap();
        assert!(matches!(
            from_lock_document(&doc),
            Err(ConvertError::CompilationOptions(_))
        ));
    }
}
