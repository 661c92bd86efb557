//! The dependency context: what a running application needs to know about
//! the libraries it was built against.
//!
//! A [`DependencyContext`] is persisted in lock document form, holding a
//! single runtime target and, when the compilation context is preserved, a
//! compile-only target plus the compilation options. Loading is explicit:
//! callers pick a [`ContextLoader`] and pass the resulting context along.

use crate::codec::{self, FormatError};
use crate::convert::{self, ConvertError};
use crate::fs::{self, DocumentError, RetryPolicy};
use crate::model::{Dependency, LibraryKind, LockDocument};
use semver::Version;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of a persisted context next to an application binary.
pub const RUNTIME_CONFIG_FILE: &str = "runtime.config.json";

/// Errors that can occur when loading a dependency context.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Identity and metadata shared by compile and runtime libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub kind: LibraryKind,
    pub name: String,
    pub version: Version,
    pub target_framework: Option<String>,
    /// Package content hash; `None` for project libraries.
    pub content_hash: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub framework_assemblies: Vec<String>,
    pub serviceable: bool,
}

impl Library {
    #[must_use]
    pub fn new(kind: LibraryKind, name: impl Into<String>, version: Version) -> Self {
        Self {
            kind,
            name: name.into(),
            version,
            target_framework: None,
            content_hash: None,
            dependencies: Vec::new(),
            framework_assemblies: Vec::new(),
            serviceable: false,
        }
    }
}

/// A library as seen by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationLibrary {
    pub library: Library,
    /// Reference assemblies, relative to the library root.
    pub assemblies: Vec<PathBuf>,
}

/// A library as loaded at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLibrary {
    pub library: Library,
    /// Loadable assemblies, relative to the library root.
    pub assemblies: Vec<PathBuf>,
    pub native_libraries: Vec<PathBuf>,
}

/// Compiler settings carried in a preserved compilation context.
///
/// Every field is optional; absent fields are not written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationOptions {
    pub defines: Option<Vec<String>>,
    pub language_version: Option<String>,
    pub platform: Option<String>,
    pub allow_unsafe: Option<bool>,
    pub warnings_as_errors: Option<bool>,
    pub optimize: Option<bool>,
    pub key_file: Option<String>,
    pub delay_sign: Option<bool>,
    pub public_sign: Option<bool>,
    pub emit_entry_point: Option<bool>,
    pub xml_doc: Option<bool>,
}

impl CompilationOptions {
    /// Read options from their JSON object form. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a known key has the wrong type.
    pub fn from_json(options: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(options.clone()))
    }

    /// Render the options as a JSON object, leaving out unset fields.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        let mut json = Map::new();
        if let Some(defines) = &self.defines {
            json.insert("defines".into(), Value::from(defines.clone()));
        }
        let strings = [
            ("languageVersion", &self.language_version),
            ("platform", &self.platform),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                json.insert(key.into(), Value::from(value.as_str()));
            }
        }
        let flags = [
            ("allowUnsafe", self.allow_unsafe),
            ("warningsAsErrors", self.warnings_as_errors),
            ("optimize", self.optimize),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                json.insert(key.into(), Value::Bool(value));
            }
        }
        if let Some(key_file) = &self.key_file {
            json.insert("keyFile".into(), Value::from(key_file.as_str()));
        }
        let flags = [
            ("delaySign", self.delay_sign),
            ("publicSign", self.public_sign),
            ("emitEntryPoint", self.emit_entry_point),
            ("xmlDoc", self.xml_doc),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                json.insert(key.into(), Value::Bool(value));
            }
        }
        json
    }

    /// Returns true if no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The resolved libraries of one (framework, runtime) selection.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyContext {
    pub target_framework: String,
    pub runtime_identifier: Option<String>,
    pub compilation_options: CompilationOptions,
    /// Carried through untouched.
    pub runtime_options: Option<Map<String, Value>>,
    pub compile_libraries: Vec<CompilationLibrary>,
    pub runtime_libraries: Vec<RuntimeLibrary>,
}

impl DependencyContext {
    /// Build a context from the first runtime and first compile-only target of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no runtime target or carries
    /// malformed compilation options.
    pub fn from_lock_document(document: &LockDocument) -> Result<Self, ConvertError> {
        convert::from_lock_document(document)
    }

    /// Convert to a lock document; see [`convert::to_lock_document`].
    #[must_use]
    pub fn to_lock_document(&self, preserve_compilation_context: bool) -> LockDocument {
        convert::to_lock_document(self, preserve_compilation_context)
    }

    /// Decode and convert a persisted context.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a lock document or it cannot be converted.
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        let document = codec::decode(bytes)?;
        Ok(Self::from_lock_document(&document)?)
    }

    /// Encode the context in lock document form.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has duplicate keys; see [`codec::encode`].
    pub fn to_bytes(&self, preserve_compilation_context: bool) -> Result<Vec<u8>, FormatError> {
        codec::encode(&self.to_lock_document(preserve_compilation_context))
    }

    /// Write the context to `path` in lock document form.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded or the file cannot be written.
    pub fn write(&self, path: &Path, preserve_compilation_context: bool) -> Result<(), DocumentError> {
        fs::write_document(path, &self.to_lock_document(preserve_compilation_context))
    }

    #[must_use]
    pub fn compile_library(&self, name: &str) -> Option<&CompilationLibrary> {
        self.compile_libraries.iter().find(|l| l.library.name == name)
    }

    #[must_use]
    pub fn runtime_library(&self, name: &str) -> Option<&RuntimeLibrary> {
        self.runtime_libraries.iter().find(|l| l.library.name == name)
    }
}

/// A source of a persisted [`DependencyContext`].
pub trait ContextLoader {
    /// Load the context.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be read, decoded or converted.
    fn load(&self) -> Result<DependencyContext, LoadError>;
}

/// Loads a context from a file on disk.
#[derive(Debug, Clone)]
pub struct FileContextLoader {
    path: PathBuf,
    retry: RetryPolicy,
}

impl FileContextLoader {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Load from [`RUNTIME_CONFIG_FILE`] in the directory of `binary`.
    #[must_use]
    pub fn beside(binary: &Path) -> Self {
        let dir = binary.parent().unwrap_or_else(|| Path::new(""));
        Self::new(dir.join(RUNTIME_CONFIG_FILE))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextLoader for FileContextLoader {
    fn load(&self) -> Result<DependencyContext, LoadError> {
        let document = fs::read_document(&self.path, &self.retry)?;
        let context = DependencyContext::from_lock_document(&document)?;
        tracing::debug!(
            path = %self.path.display(),
            framework = %context.target_framework,
            libraries = context.runtime_libraries.len(),
            "loaded dependency context"
        );
        Ok(context)
    }
}

/// Loads a context from bytes already in memory, such as an embedded resource.
#[derive(Debug, Clone, Copy)]
pub struct BytesContextLoader<'a> {
    bytes: &'a [u8],
}

impl<'a> BytesContextLoader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl ContextLoader for BytesContextLoader<'_> {
    fn load(&self) -> Result<DependencyContext, LoadError> {
        DependencyContext::load(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONTEXT: &str = r#"{
  "version": 2,
  "targets": {
    "net451/win7-x64": {
      "Newtonsoft.Json/7.0.1": {
        "type": "package",
        "runtime": { "lib/net45/Newtonsoft.Json.dll": {} }
      }
    }
  },
  "libraries": {
    "Newtonsoft.Json/7.0.1": { "type": "package", "sha512": "abc==" }
  }
}"#;

    #[test]
    fn test_compilation_options_json() {
        let options = CompilationOptions {
            defines: Some(vec!["DEBUG".to_string(), "TRACE".to_string()]),
            language_version: Some("csharp6".to_string()),
            allow_unsafe: Some(true),
            emit_entry_point: Some(false),
            xml_doc: Some(true),
            ..CompilationOptions::default()
        };

        let json = options.to_json();
        assert_eq!(json["defines"], serde_json::json!(["DEBUG", "TRACE"]));
        assert_eq!(json["languageVersion"], "csharp6");
        assert_eq!(json["allowUnsafe"], true);
        assert_eq!(json["emitEntryPoint"], false);
        assert_eq!(json["xmlDoc"], true);
        assert!(!json.contains_key("platform"));
        assert!(!json.contains_key("optimize"));

        assert_eq!(CompilationOptions::from_json(&json).unwrap(), options);
    }

    #[test]
    fn test_compilation_options_reject_wrong_types() {
        let json = serde_json::json!({ "optimize": "yes" });
        let Value::Object(map) = json else { unreachable!() };
        assert!(CompilationOptions::from_json(&map).is_err());
    }

    #[test]
    fn test_empty_compilation_options() {
        assert!(CompilationOptions::default().is_empty());
        assert!(CompilationOptions::default().to_json().is_empty());
    }

    #[test]
    fn test_bytes_loader() {
        let context = BytesContextLoader::new(CONTEXT.as_bytes()).load().unwrap();
        assert_eq!(context.target_framework, "net451");
        assert_eq!(context.runtime_identifier.as_deref(), Some("win7-x64"));
        let json = context.runtime_library("Newtonsoft.Json").unwrap();
        assert_eq!(json.library.content_hash.as_deref(), Some("abc=="));
        assert!(context.compile_libraries.is_empty());
    }

    #[test]
    fn test_file_loader_beside_binary() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(RUNTIME_CONFIG_FILE), CONTEXT).unwrap();

        let loader = FileContextLoader::beside(&temp.path().join("app.dll")).with_retry(RetryPolicy::NONE);
        assert_eq!(loader.path(), temp.path().join(RUNTIME_CONFIG_FILE));
        let context = loader.load().unwrap();
        assert_eq!(context.runtime_libraries.len(), 1);
    }

    #[test]
    fn test_file_loader_missing_file() {
        let temp = TempDir::new().unwrap();
        let loader = FileContextLoader::new(temp.path().join("missing.json")).with_retry(RetryPolicy::NONE);
        assert!(matches!(loader.load(), Err(LoadError::Document(_))));
    }

    #[test]
    fn test_write_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(RUNTIME_CONFIG_FILE);

        let context = DependencyContext::load(CONTEXT.as_bytes()).unwrap();
        context.write(&path, false).unwrap();
        let reloaded = FileContextLoader::new(&path)
            .with_retry(RetryPolicy::NONE)
            .load()
            .unwrap();
        assert_eq!(reloaded, context);
    }
}
