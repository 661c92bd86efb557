//! Implementation of the `lockgraph inspect` command.

use anyhow::{Context, Result};
use lockgraph::{fs, LockDocument, RetryPolicy, CURRENT_VERSION, UNKNOWN_VERSION};
use std::path::Path;

/// Read a lock document and summarize it.
pub fn inspect(path: &Path, retry: &RetryPolicy) -> Result<String> {
    let document = fs::read_document(path, retry)
        .with_context(|| format!("failed to read lock document '{}'", path.display()))?;
    Ok(summarize(&document))
}

/// One line per dependency group and per target, then library counts.
pub fn summarize(document: &LockDocument) -> String {
    let mut lines = Vec::new();

    let version = match document.format_version {
        UNKNOWN_VERSION => "missing".to_string(),
        CURRENT_VERSION => CURRENT_VERSION.to_string(),
        other => format!("{other} (expected {CURRENT_VERSION})"),
    };
    lines.push(format!("version: {version}"));

    lines.push(format!("dependency groups: {}", document.dependency_groups.len()));
    for group in &document.dependency_groups {
        lines.push(format!(
            "  {}: {}",
            group.framework.as_deref().unwrap_or("(shared)"),
            group.dependencies.join(", ")
        ));
    }

    lines.push(format!("targets: {}", document.targets.len()));
    for target in &document.targets {
        lines.push(format!(
            "  {}: {} libraries",
            target.key(),
            target.libraries.len()
        ));
    }

    lines.push(format!(
        "libraries: {} packages, {} projects",
        document.package_libraries.len(),
        document.project_libraries.len()
    ));

    let mut summary = lines.join("\n");
    summary.push('\n');
    summary
}
