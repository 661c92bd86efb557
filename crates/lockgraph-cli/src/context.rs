//! Implementation of the `lockgraph context` command.

use anyhow::{Context, Result};
use lockgraph::{ContextLoader, DependencyContext, FileContextLoader, RetryPolicy};
use std::io::Write;
use std::path::PathBuf;

/// Options for the context command.
#[derive(Debug)]
pub struct ContextOptions {
    /// Lock document to load.
    pub lock: PathBuf,
    /// Output file; stdout when unset.
    pub output: Option<PathBuf>,
    pub preserve_compilation_context: bool,
}

/// Load a dependency context and write it back in canonical form.
pub fn rewrite(options: &ContextOptions, retry: &RetryPolicy) -> Result<DependencyContext> {
    let context = FileContextLoader::new(options.lock.clone())
        .with_retry(*retry)
        .load()
        .with_context(|| format!("failed to load context from '{}'", options.lock.display()))?;

    match &options.output {
        Some(output) => context
            .write(output, options.preserve_compilation_context)
            .with_context(|| format!("failed to write '{}'", output.display()))?,
        None => {
            let bytes = context
                .to_bytes(options.preserve_compilation_context)
                .context("failed to encode context")?;
            std::io::stdout()
                .lock()
                .write_all(&bytes)
                .context("failed to write to stdout")?;
        }
    }

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: &str = r#"{
  "version": 2,
  "compilationOptions": { "defines": [ "DEBUG" ] },
  "targets": {
    "net452/win7-x64": {
      "Lib/1.0.0": { "type": "project", "runtime": { "Lib.dll": {} } }
    },
    "net452": {
      "Lib/1.0.0": { "type": "project", "compile": { "Lib.dll": {} } }
    }
  },
  "libraries": { "Lib/1.0.0": { "type": "project", "path": "../Lib/project.json" } }
}"#;

    #[test]
    fn test_rewrite_to_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let lock = temp.path().join("project.lock.json");
        std::fs::write(&lock, LOCK).unwrap();

        let output = temp.path().join("App.deps.json");
        let options = ContextOptions {
            lock,
            output: Some(output.clone()),
            preserve_compilation_context: false,
        };
        let context = rewrite(&options, &RetryPolicy::NONE).unwrap();
        assert_eq!(context.runtime_identifier.as_deref(), Some("win7-x64"));

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("\"net452/win7-x64\""));
        assert!(!written.contains("compilationOptions"));
        assert!(!written.contains("project.json"));
    }

    #[test]
    fn test_rewrite_missing_lock() {
        let temp = tempfile::TempDir::new().unwrap();
        let options = ContextOptions {
            lock: temp.path().join("project.lock.json"),
            output: None,
            preserve_compilation_context: false,
        };
        let err = rewrite(&options, &RetryPolicy::NONE).unwrap_err();
        assert!(err.to_string().contains("failed to load context"));
    }
}
