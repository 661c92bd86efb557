//! Implementation of the `lockgraph check` command.

use anyhow::{Context, Result};
use lockgraph::{fs, validate, ProjectDeclaration, Staleness};
use std::path::{Path, PathBuf};

/// Options for the check command.
#[derive(Debug)]
pub struct CheckOptions {
    /// Path to the project declaration.
    pub project: PathBuf,
    /// Lock document; the project's own when unset.
    pub lock: Option<PathBuf>,
}

/// Result of a check.
#[derive(Debug)]
pub struct CheckOutcome {
    /// The lock document that was checked.
    pub lock: PathBuf,
    /// Why the document is stale, if it is.
    pub staleness: Option<Staleness>,
}

/// Check a project's lock document against its declaration.
pub fn check(options: &CheckOptions, config: Option<&Path>) -> Result<CheckOutcome> {
    let project = ProjectDeclaration::load(&options.project).with_context(|| {
        format!("failed to load project '{}'", options.project.display())
    })?;
    let settings = crate::load_settings(config, &project.directory)?;

    let lock = options
        .lock
        .clone()
        .unwrap_or_else(|| project.directory.join(&settings.lock_file));
    let document = fs::read_document(&lock, &settings.retry.policy())
        .with_context(|| format!("failed to read lock document '{}'", lock.display()))?;

    let staleness = validate::check(&document, &project).err();
    if let Some(staleness) = &staleness {
        tracing::debug!(project = %project.name, %staleness, "lock document is stale");
    }

    Ok(CheckOutcome { lock, staleness })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
[project]
name = "App"

[dependencies]
"Newtonsoft.Json" = "7.0.1"
"#;

    const LOCK: &str = r#"{
  "version": 2,
  "projectFileDependencyGroups": {
    "": [ "Newtonsoft.Json >= 7.0.1" ]
  }
}"#;

    fn setup(lock: &str) -> (TempDir, CheckOptions) {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("project.toml"), PROJECT).unwrap();
        std::fs::write(temp.path().join("project.lock.json"), lock).unwrap();
        let options = CheckOptions {
            project: temp.path().join("project.toml"),
            lock: None,
        };
        (temp, options)
    }

    #[test]
    fn test_up_to_date() {
        let (temp, options) = setup(LOCK);
        let outcome = check(&options, None).unwrap();
        assert_eq!(outcome.lock, temp.path().join("project.lock.json"));
        assert!(outcome.staleness.is_none());
    }

    #[test]
    fn test_stale() {
        let (_temp, options) = setup(&LOCK.replace("7.0.1", "6.0.0"));
        let outcome = check(&options, None).unwrap();
        assert_eq!(
            outcome.staleness,
            Some(Staleness::DependenciesChanged { framework: None })
        );
    }

    #[test]
    fn test_explicit_lock_and_settings() {
        let (temp, mut options) = setup(LOCK);
        std::fs::write(temp.path().join("deps.lock.json"), "{}").unwrap();

        options.lock = Some(temp.path().join("deps.lock.json"));
        let outcome = check(&options, None).unwrap();
        assert!(matches!(
            outcome.staleness,
            Some(Staleness::VersionMismatch { .. })
        ));

        std::fs::write(temp.path().join("lockgraph.toml"), "lock-file = \"deps.lock.json\"\n")
            .unwrap();
        options.lock = None;
        let outcome = check(&options, None).unwrap();
        assert_eq!(outcome.lock, temp.path().join("deps.lock.json"));
    }

    #[test]
    fn test_missing_lock_is_an_error() {
        let (temp, options) = setup(LOCK);
        std::fs::remove_file(temp.path().join("project.lock.json")).unwrap();
        let err = check(&options, None).unwrap_err();
        assert!(err.to_string().contains("failed to read lock document"));
    }
}
