//! Implementation of the `lockgraph resolve` and `lockgraph export` commands.

use anyhow::{Context, Result};
use lockgraph::{
    display_version, fs, CompilationOptions, DependencyContext, LibraryAsset, LockDocument, ProjectContext,
    ProjectDeclaration, Resolver, TargetKey,
};
use std::path::{Path, PathBuf};

/// Options for the resolve command.
#[derive(Debug)]
pub struct ResolveOptions {
    /// Path to the project declaration.
    pub project: PathBuf,
    pub framework: String,
    pub runtime: Option<String>,
}

/// Options for the export command.
#[derive(Debug)]
pub struct ExportOptions {
    pub resolve: ResolveOptions,
    /// Where to write the dependency context.
    pub output: PathBuf,
    pub preserve_compilation_context: bool,
}

/// Resolve the project named by `options`.
pub fn resolve(options: &ResolveOptions, config: Option<&Path>) -> Result<ProjectContext> {
    let (context, _) = resolve_with_document(options, config)?;
    Ok(context)
}

/// Resolve the project and write its flattened dependency context.
///
/// Compilation and runtime options are carried over from the lock document.
pub fn export(options: &ExportOptions, config: Option<&Path>) -> Result<DependencyContext> {
    let (context, document) = resolve_with_document(&options.resolve, config)?;

    let compilation_options = match &document.compilation_options {
        Some(options) => CompilationOptions::from_json(options)
            .context("lock document has invalid compilation options")?,
        None => CompilationOptions::default(),
    };
    let dependencies =
        context.dependency_context(compilation_options, document.runtime_options.clone());

    dependencies
        .write(&options.output, options.preserve_compilation_context)
        .with_context(|| format!("failed to write '{}'", options.output.display()))?;
    Ok(dependencies)
}

fn resolve_with_document(
    options: &ResolveOptions,
    config: Option<&Path>,
) -> Result<(ProjectContext, LockDocument)> {
    let project = ProjectDeclaration::load(&options.project).with_context(|| {
        format!("failed to load project '{}'", options.project.display())
    })?;
    let settings = crate::load_settings(config, &project.directory)?;
    let resolver = Resolver::new().with_settings(settings);

    let lock = resolver.lock_path(&project);
    let document = fs::read_document(&lock, &resolver.settings().retry.policy())
        .with_context(|| format!("failed to read lock document '{}'", lock.display()))?;

    let context = resolver
        .resolve(
            &project,
            &document,
            &options.framework,
            options.runtime.as_deref(),
        )
        .with_context(|| format!("failed to resolve project '{}'", project.name))?;
    Ok((context, document))
}

/// List each library with its kind and assets.
pub fn describe(context: &ProjectContext) -> String {
    let target = TargetKey::new(
        context.target_framework(),
        context.runtime_identifier().map(str::to_string),
    );
    let mut lines = vec![format!("{} ({target})", context.name())];

    for library in context.libraries() {
        lines.push(format!(
            "  {} {} ({})",
            library.name,
            display_version(&library.version),
            library.kind
        ));
        let sections: [(&str, &[LibraryAsset]); 5] = [
            ("compile", &library.compilation_assets),
            ("runtime", &library.runtime_assets),
            ("resource", &library.resource_assets),
            ("native", &library.native_assets),
            ("source", &library.source_assets),
        ];
        for (label, assets) in sections {
            for asset in assets.iter().filter(|a| !a.is_placeholder()) {
                lines.push(format!("    {label}: {}", asset.path.display()));
            }
        }
        for reference in &library.framework_references {
            lines.push(format!("    framework: {reference}"));
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
