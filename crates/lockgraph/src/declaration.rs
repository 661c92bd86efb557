//! Project declarations: a project's identity and the dependencies it asks for.
//!
//! Declarations are read from a small TOML file:
//!
//! ```toml
//! [project]
//! name = "App"
//!
//! [dependencies]
//! "Newtonsoft.Json" = "7.0.0"
//!
//! [frameworks.net451.dependencies]
//! "Lib" = { version = "1.0.0", target = "project" }
//!
//! [frameworks.net451.framework-assemblies]
//! "System.Xml" = ""
//! ```

use crate::model::LibraryKind;
use crate::version::{VersionError, VersionRange};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default project declaration file name.
pub const PROJECT_FILE: &str = "project.toml";

/// Errors that can occur when loading a project declaration.
#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("failed to read project declaration '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse project declaration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid project name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid constraint for dependency '{name}': {source}")]
    InvalidConstraint {
        name: String,
        #[source]
        source: VersionError,
    },
}

/// A dependency as the project declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    pub name: String,
    pub range: VersionRange,
    /// The kind of library the dependency must resolve to, if restricted.
    pub target: Option<LibraryKind>,
}

impl DeclaredDependency {
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

    /// Render the dependency as recorded in lock document dependency groups:
    /// `Name >= 1.0.0`, with an `fx/` prefix for framework references.
    #[must_use]
    pub fn render(&self) -> String {
        let prefix = if self.is_framework_reference() { "fx/" } else { "" };
        if self.range.is_any() {
            format!("{prefix}{}", self.name)
        } else {
            format!("{prefix}{} {}", self.name, self.range)
        }
    }
}

/// The dependencies declared for one target framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkDeclaration {
    pub framework: String,
    pub dependencies: Vec<DeclaredDependency>,
}

/// A project's identity and declared dependencies, partitioned by framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDeclaration {
    pub name: String,
    /// Directory holding the project; sibling project paths are relative to it.
    pub directory: PathBuf,
    /// Dependencies shared by every framework.
    pub dependencies: Vec<DeclaredDependency>,
    pub frameworks: Vec<FrameworkDeclaration>,
}

impl ProjectDeclaration {
    #[must_use]
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            dependencies: Vec::new(),
            frameworks: Vec::new(),
        }
    }

    /// Load a declaration file; the project directory is the file's parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid declaration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeclarationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DeclarationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&content, directory)
    }

    /// Parse a declaration from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, the name is empty, or a
    /// constraint does not parse.
    pub fn parse(content: &str, directory: impl Into<PathBuf>) -> Result<Self, DeclarationError> {
        let file: DeclarationFile = toml::from_str(content)?;

        let name = file.project.name.trim();
        if name.is_empty() {
            return Err(DeclarationError::InvalidName(name.to_string(), "name cannot be empty"));
        }
        if name.contains('/') {
            return Err(DeclarationError::InvalidName(name.to_string(), "name cannot contain '/'"));
        }

        let mut declaration = Self::new(name, directory);
        declaration.dependencies = convert_dependencies(&file.dependencies, None)?;
        for (framework, section) in &file.frameworks {
            let mut dependencies = convert_dependencies(&section.dependencies, None)?;
            dependencies.extend(convert_dependencies(
                &section.framework_assemblies,
                Some(LibraryKind::ReferenceAssembly),
            )?);
            declaration.frameworks.push(FrameworkDeclaration {
                framework: framework.clone(),
                dependencies,
            });
        }
        Ok(declaration)
    }

    /// Declared framework names, in declaration order.
    pub fn framework_names(&self) -> impl Iterator<Item = &str> {
        self.frameworks.iter().map(|f| f.framework.as_str())
    }

    #[must_use]
    pub fn framework(&self, name: &str) -> Option<&FrameworkDeclaration> {
        self.frameworks.iter().find(|f| f.framework == name)
    }

    /// Shared and framework-specific dependencies that apply to `framework`.
    pub fn dependencies_for<'a>(
        &'a self,
        framework: &str,
    ) -> impl Iterator<Item = &'a DeclaredDependency> {
        let specific = self
            .framework(framework)
            .map(|f| f.dependencies.as_slice())
            .unwrap_or_default();
        self.dependencies.iter().chain(specific)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationFile {
    project: ProjectSection,

    #[serde(default)]
    dependencies: BTreeMap<String, DependencySpec>,

    #[serde(default)]
    frameworks: BTreeMap<String, FrameworkSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectSection {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FrameworkSection {
    #[serde(default)]
    dependencies: BTreeMap<String, DependencySpec>,

    #[serde(default)]
    framework_assemblies: BTreeMap<String, DependencySpec>,
}

/// Either `"1.0.0"` or `{ version = "1.0.0", target = "package" }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencySpec {
    Simple(String),
    Detailed(DetailedDependency),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedDependency {
    #[serde(default)]
    version: Option<String>,

    #[serde(default)]
    target: Option<DependencyTarget>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum DependencyTarget {
    Package,
    Project,
    ReferenceAssembly,
}

impl From<DependencyTarget> for LibraryKind {
    fn from(target: DependencyTarget) -> Self {
        match target {
            DependencyTarget::Package => Self::Package,
            DependencyTarget::Project => Self::Project,
            DependencyTarget::ReferenceAssembly => Self::ReferenceAssembly,
        }
    }
}

fn convert_dependencies(
    specs: &BTreeMap<String, DependencySpec>,
    forced_target: Option<LibraryKind>,
) -> Result<Vec<DeclaredDependency>, DeclarationError> {
    specs
        .iter()
        .map(|(name, spec)| {
            let (version, target) = match spec {
                DependencySpec::Simple(version) => (Some(version.as_str()), None),
                DependencySpec::Detailed(detail) => {
                    (detail.version.as_deref(), detail.target.map(LibraryKind::from))
                }
            };
            let range = VersionRange::parse(version.unwrap_or_default()).map_err(|source| {
                DeclarationError::InvalidConstraint {
                    name: name.clone(),
                    source,
                }
            })?;
            Ok(DeclaredDependency {
                name: name.clone(),
                range,
                target: forced_target.or(target),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    const SAMPLE: &str = r#"
[project]
name = "App"

[dependencies]
"Newtonsoft.Json" = "7.0.0"
"Microsoft.Extensions.Logging" = { version = "[1.0.0, 2.0.0)" }

[frameworks.net451.dependencies]
"Lib" = { version = "1.0.0", target = "project" }

[frameworks.net451.framework-assemblies]
"System.Xml" = ""

[frameworks."netstandard1.3"]
"#;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_parse_declaration() {
        let project = ProjectDeclaration::parse(SAMPLE, "/work/App").unwrap();
        assert_eq!(project.name, "App");
        assert_eq!(project.directory, PathBuf::from("/work/App"));
        assert_eq!(project.dependencies.len(), 2);
        assert_eq!(
            project.framework_names().collect::<Vec<_>>(),
            ["net451", "netstandard1.3"]
        );

        let net451 = project.framework("net451").unwrap();
        assert_eq!(net451.dependencies.len(), 2);
        assert_eq!(net451.dependencies[0].target, Some(LibraryKind::Project));
        assert!(net451.dependencies[1].is_framework_reference());
        assert!(project.framework("netstandard1.3").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_dependencies_for_framework() {
        let project = ProjectDeclaration::parse(SAMPLE, ".").unwrap();
        let names: Vec<&str> = project
            .dependencies_for("net451")
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["Microsoft.Extensions.Logging", "Newtonsoft.Json", "Lib", "System.Xml"]
        );
        assert_eq!(project.dependencies_for("net46").count(), 2);
    }

    #[test]
    fn test_render() {
        let json = DeclaredDependency::new("Newtonsoft.Json", VersionRange::at_least(v("7.0.0")));
        assert_eq!(json.render(), "Newtonsoft.Json >= 7.0.0");

        let xml = DeclaredDependency::new("System.Xml", VersionRange::at_least(v("4.0.0")))
            .with_target(LibraryKind::ReferenceAssembly);
        assert_eq!(xml.render(), "fx/System.Xml >= 4.0.0");

        let any = DeclaredDependency::new("System.Xml", VersionRange::ANY)
            .with_target(LibraryKind::ReferenceAssembly);
        assert_eq!(any.render(), "fx/System.Xml");

        let pinned = DeclaredDependency::new("Lib", VersionRange::exact(v("1.0.0")))
            .with_target(LibraryKind::Project);
        assert_eq!(pinned.render(), "Lib [1.0.0]");
    }

    #[test]
    fn test_rejects_invalid_declarations() {
        assert!(matches!(
            ProjectDeclaration::parse("[project]\nname = \"\"\n", "."),
            Err(DeclarationError::InvalidName(..))
        ));
        assert!(matches!(
            ProjectDeclaration::parse("[project]\nname = \"a/b\"\n", "."),
            Err(DeclarationError::InvalidName(..))
        ));
        assert!(matches!(
            ProjectDeclaration::parse("[project]\nname = \"A\"\n[dependencies]\nB = \"~> 1\"\n", "."),
            Err(DeclarationError::InvalidConstraint { .. })
        ));
        assert!(matches!(
            ProjectDeclaration::parse("[project]\nname = \"A\"\nversion = \"1\"\n", "."),
            Err(DeclarationError::Parse(_))
        ));
        assert!(matches!(
            ProjectDeclaration::parse(
                "[project]\nname = \"A\"\n[dependencies]\nB = { target = \"widget\" }\n",
                "."
            ),
            Err(DeclarationError::Parse(_))
        ));
    }

    #[test]
    fn test_load_uses_parent_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(PROJECT_FILE);
        std::fs::write(&path, SAMPLE).unwrap();

        let project = ProjectDeclaration::load(&path).unwrap();
        assert_eq!(project.directory, temp.path());
    }
}
