//! Deciding whether a lock document still matches its project.
//!
//! A lock document records, per framework plus once for the shared
//! dependencies, the dependency list the project declared when it was
//! resolved. The document is stale as soon as those lists differ from what
//! the project declares now. Staleness is an outcome, not an error: callers
//! re-run resolution when they see one.

use crate::declaration::{DeclaredDependency, ProjectDeclaration};
use crate::model::{LockDocument, CURRENT_VERSION};
use std::cmp::Ordering;
use std::fmt;

/// Why a lock document no longer matches its project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// The document was written by a different format version.
    VersionMismatch { expected: i32, found: i32 },
    /// The document does not have one group per framework plus a shared group.
    GroupCountMismatch { expected: usize, found: usize },
    /// A group names a framework the project no longer declares.
    UnknownFramework(String),
    /// A group's dependencies differ from the declared ones; `None` is the shared group.
    DependenciesChanged { framework: Option<String> },
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionMismatch { expected, found } => write!(
                f,
                "the expected lock document version ({expected}) does not match the actual version ({})",
                render_version(*found)
            ),
            Self::GroupCountMismatch { expected, found } => write!(
                f,
                "the lock document has {found} dependency groups, expected {expected}"
            ),
            Self::UnknownFramework(framework) => write!(
                f,
                "the lock document records dependencies for '{framework}', which the project no longer targets"
            ),
            Self::DependenciesChanged { framework: None } => {
                write!(f, "the project's shared dependencies were modified")
            }
            Self::DependenciesChanged {
                framework: Some(framework),
            } => write!(f, "the project's dependencies for '{framework}' were modified"),
        }
    }
}

fn render_version(version: i32) -> String {
    if version == crate::model::UNKNOWN_VERSION {
        "missing".to_string()
    } else {
        version.to_string()
    }
}

/// Check a lock document against a project declaration.
///
/// # Errors
///
/// Returns the first reason the document is stale.
pub fn check(document: &LockDocument, project: &ProjectDeclaration) -> Result<(), Staleness> {
    if document.format_version != CURRENT_VERSION {
        return Err(Staleness::VersionMismatch {
            expected: CURRENT_VERSION,
            found: document.format_version,
        });
    }

    let expected = project.frameworks.len() + 1;
    if document.dependency_groups.len() != expected {
        return Err(Staleness::GroupCountMismatch {
            expected,
            found: document.dependency_groups.len(),
        });
    }

    for group in &document.dependency_groups {
        let declared = match &group.framework {
            None => &project.dependencies,
            Some(framework) => {
                &project
                    .framework(framework)
                    .ok_or_else(|| Staleness::UnknownFramework(framework.clone()))?
                    .dependencies
            }
        };

        if sorted(group.dependencies.clone()) != render_sorted(declared) {
            tracing::debug!(
                framework = group.framework.as_deref().unwrap_or("*"),
                "dependency group differs from declaration"
            );
            return Err(Staleness::DependenciesChanged {
                framework: group.framework.clone(),
            });
        }
    }

    Ok(())
}

/// Render declared dependencies as a dependency group, in canonical order.
#[must_use]
pub fn render_sorted(dependencies: &[DeclaredDependency]) -> Vec<String> {
    sorted(dependencies.iter().map(DeclaredDependency::render).collect())
}

fn sorted(mut entries: Vec<String>) -> Vec<String> {
    entries.sort_by(|a, b| compare_ignore_case(a, b));
    entries
}

/// Case-insensitive ordering, falling back to ordinal order for ties so the
/// result is total.
fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

impl LockDocument {
    /// Returns true if this document still matches `project`.
    #[must_use]
    pub fn is_valid_for_project(&self, project: &ProjectDeclaration) -> bool {
        check(self, project).is_ok()
    }
}
