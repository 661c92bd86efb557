//! JSON encoding of lock documents.
//!
//! The wire format keys libraries by `name/version` and targets by
//! `framework[/runtime]`, stores every relative path with `/` separators and
//! leaves out empty containers. Decoding is strict: anything that is not a
//! well-formed lock document is a [`FormatError`] pointing at the offending
//! line and column. A document without a `version` field is not an error; it
//! decodes with [`UNKNOWN_VERSION`] and is therefore never current.

use crate::model::{
    Dependency, DependencyGroup, KeyError, LibraryKey, LibraryKind, LockDocument, LockItem, LockTarget,
    LockTargetLibrary, PackageLibrary, ProjectLibrary, TargetKey, UNKNOWN_VERSION,
};
use crate::version::VersionRange;
use serde_json::map::Entry;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

const VERSION: &str = "version";
const COMPILATION_OPTIONS: &str = "compilationOptions";
const RUNTIME_OPTIONS: &str = "runtimeOptions";
const DEPENDENCY_GROUPS: &str = "projectFileDependencyGroups";
const LIBRARIES: &str = "libraries";
const TARGETS: &str = "targets";
const TYPE: &str = "type";
const PATH: &str = "path";
const FILES: &str = "files";
const SHA512: &str = "sha512";
const SERVICEABLE: &str = "serviceable";
const FRAMEWORK: &str = "framework";
const DEPENDENCIES: &str = "dependencies";
const FRAMEWORK_ASSEMBLIES: &str = "frameworkAssemblies";
const COMPILE: &str = "compile";
const RUNTIME: &str = "runtime";
const RESOURCE: &str = "resource";
const NATIVE: &str = "native";

/// A malformed lock document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", render(.path.as_deref(), *.line, *.column, .message))]
pub struct FormatError {
    /// The file the document was read from, when known.
    pub path: Option<PathBuf>,
    /// 1-based line of the problem, 0 when unknown.
    pub line: usize,
    /// 1-based column of the problem, 0 when unknown.
    pub column: usize,
    pub message: String,
}

impl FormatError {
    fn at(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            path: None,
            line,
            column,
            message: message.into(),
        }
    }

    /// Attach the path of the file the document came from.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

fn render(path: Option<&Path>, line: usize, column: usize, message: &str) -> String {
    let location = match (path, line) {
        (Some(path), 0) => format!("{}: ", path.display()),
        (Some(path), _) => format!("{}({line},{column}): ", path.display()),
        (None, 0) => String::new(),
        (None, _) => format!("({line},{column}): "),
    };
    format!("{location}{message}")
}

/// Decode a lock document from UTF-8 JSON.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8, not JSON, not a JSON object,
/// or contain a key, version, constraint or field of the wrong shape.
pub fn decode(bytes: &[u8]) -> Result<LockDocument, FormatError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let (line, column) = line_column(bytes, e.valid_up_to());
        FormatError::at(line, column, format!("document is not valid UTF-8: {e}"))
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let value: Value = serde_json::from_str(text)
        .map_err(|e| FormatError::at(e.line(), e.column(), e.to_string()))?;

    Decoder { text }.document(&value)
}

/// Encode a lock document as indented JSON.
///
/// # Errors
///
/// Returns an error if two targets share a key, if two libraries of one
/// target share a key, or if two entries of the libraries section do.
pub fn encode(document: &LockDocument) -> Result<Vec<u8>, FormatError> {
    let value = Value::Object(encode_document(document)?);
    let mut out = format!("{value:#}");
    out.push('\n');
    Ok(out.into_bytes())
}

/// Convert a wire path (`/`-separated) to a host path.
#[must_use]
pub fn path_from_wire(path: &str) -> PathBuf {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Convert a relative host path to its wire form.
#[must_use]
pub fn path_to_wire(path: &Path) -> String {
    path.iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn line_column(bytes: &[u8], offset: usize) -> (usize, usize) {
    let before = &bytes[..offset.min(bytes.len())];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;
    (line, column)
}

struct Decoder<'a> {
    text: &'a str,
}

impl Decoder<'_> {
    /// Build an error positioned at the key path `at`.
    ///
    /// Each key is searched for after the position of the one before it, so a
    /// key that appears in several sections resolves inside its own section.
    fn error(&self, at: &[&str], message: impl Into<String>) -> FormatError {
        let mut from = 0;
        let mut offset = None;
        for key in at {
            let needle = Value::String((*key).to_string()).to_string();
            let Some(found) = self.text[from..].find(&needle) else {
                break;
            };
            offset = Some(from + found);
            from += found + needle.len();
        }

        match offset {
            Some(offset) => {
                let (line, column) = line_column(self.text.as_bytes(), offset);
                FormatError::at(line, column, message)
            }
            None => FormatError::at(0, 0, message),
        }
    }

    fn document(&self, value: &Value) -> Result<LockDocument, FormatError> {
        let Value::Object(root) = value else {
            return Err(FormatError::at(1, 1, "lock document must be a JSON object"));
        };

        let mut document = LockDocument::new();
        document.format_version = match root.get(VERSION) {
            None | Some(Value::Null) => UNKNOWN_VERSION,
            Some(version) => version
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| self.error(&[VERSION], "'version' must be an integer"))?,
        };
        document.compilation_options = self.object(&[], root, COMPILATION_OPTIONS)?.cloned();
        document.runtime_options = self.object(&[], root, RUNTIME_OPTIONS)?.cloned();

        if let Some(groups) = self.object(&[], root, DEPENDENCY_GROUPS)? {
            for (framework, dependencies) in groups {
                let at = [DEPENDENCY_GROUPS, framework.as_str()];
                let dependencies = self.strings(&at, dependencies)?;
                document
                    .dependency_groups
                    .push(DependencyGroup::new(Some(framework.clone()), dependencies));
            }
        }

        if let Some(libraries) = self.object(&[], root, LIBRARIES)? {
            for (key, library) in libraries {
                self.library(&mut document, &[LIBRARIES, key.as_str()], library)?;
            }
        }

        if let Some(targets) = self.object(&[], root, TARGETS)? {
            for (key, target) in targets {
                document.targets.push(self.target(&[TARGETS, key.as_str()], target)?);
            }
        }

        Ok(document)
    }

    fn library(
        &self,
        document: &mut LockDocument,
        at: &[&str],
        value: &Value,
    ) -> Result<(), FormatError> {
        let key = last(at);
        let LibraryKey { name, version } =
            LibraryKey::parse(key).map_err(|e| self.error(at, e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(self.error(at, format!("library '{key}' must be an object")));
        };

        match self.kind(at, fields)? {
            LibraryKind::Package => {
                let mut package = PackageLibrary::new(name, version);
                package.serviceable = match fields.get(SERVICEABLE) {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(flag)) => *flag,
                    Some(_) => {
                        return Err(self.error(
                            &within(at, SERVICEABLE),
                            format!("'{SERVICEABLE}' of '{key}' must be a boolean"),
                        ));
                    }
                };
                package.content_hash = self.string(at, fields, SHA512)?;
                if let Some(files) = fields.get(FILES) {
                    package.files = self
                        .strings(&within(at, FILES), files)?
                        .iter()
                        .map(|file| path_from_wire(file))
                        .collect();
                }
                document.package_libraries.push(package);
            }
            LibraryKind::Project => {
                let mut project = ProjectLibrary::new(name, version);
                project.path = self.string(at, fields, PATH)?.map(|p| path_from_wire(&p));
                document.project_libraries.push(project);
            }
            LibraryKind::ReferenceAssembly => {
                return Err(self.error(
                    at,
                    format!("library '{key}' is a reference assembly, which cannot be locked"),
                ));
            }
        }
        Ok(())
    }

    fn target(&self, at: &[&str], value: &Value) -> Result<LockTarget, FormatError> {
        let key = last(at);
        let TargetKey { framework, runtime } =
            TargetKey::parse(key).map_err(|e| self.error(at, e.to_string()))?;
        let Value::Object(libraries) = value else {
            return Err(self.error(at, format!("target '{key}' must be an object")));
        };

        let mut target = LockTarget::new(framework, runtime);
        for (library_key, library) in libraries {
            target
                .libraries
                .push(self.target_library(&within(at, library_key), library)?);
        }
        Ok(target)
    }

    fn target_library(&self, at: &[&str], value: &Value) -> Result<LockTargetLibrary, FormatError> {
        let key = last(at);
        let LibraryKey { name, version } =
            LibraryKey::parse(key).map_err(|e| self.error(at, e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(self.error(at, format!("library '{key}' must be an object")));
        };

        let mut library = LockTargetLibrary::new(name, version, self.kind(at, fields)?);
        library.target_framework = self.string(at, fields, FRAMEWORK)?;

        if let Some(dependencies) = self.object(at, fields, DEPENDENCIES)? {
            let at = within(at, DEPENDENCIES);
            for (dependency, range) in dependencies {
                let range = match range {
                    Value::Null => VersionRange::ANY,
                    Value::String(text) => VersionRange::parse(text)
                        .map_err(|e| self.error(&within(&at, dependency), e.to_string()))?,
                    _ => {
                        return Err(self.error(
                            &within(&at, dependency),
                            format!("version of dependency '{dependency}' must be a string"),
                        ))
                    }
                };
                library.dependencies.push(Dependency::new(dependency.clone(), range));
            }
        }

        if let Some(assemblies) = fields.get(FRAMEWORK_ASSEMBLIES) {
            library.framework_assemblies = self
                .strings(&within(at, FRAMEWORK_ASSEMBLIES), assemblies)?
                .into_iter()
                .collect();
        }

        library.compile_time_assemblies = self.items(at, fields, COMPILE)?;
        library.runtime_assemblies = self.items(at, fields, RUNTIME)?;
        library.resource_assemblies = self.items(at, fields, RESOURCE)?;
        library.native_libraries = self.items(at, fields, NATIVE)?;
        Ok(library)
    }

    fn kind(&self, at: &[&str], fields: &Map<String, Value>) -> Result<LibraryKind, FormatError> {
        match self.string(at, fields, TYPE)? {
            None => Ok(LibraryKind::Package),
            Some(kind) => kind
                .parse()
                .map_err(|e: KeyError| self.error(&within(at, TYPE), e.to_string())),
        }
    }

    fn items(
        &self,
        at: &[&str],
        fields: &Map<String, Value>,
        bucket: &str,
    ) -> Result<Vec<LockItem>, FormatError> {
        let Some(items) = self.object(at, fields, bucket)? else {
            return Ok(Vec::new());
        };

        let key = last(at);
        let at = within(at, bucket);
        let mut result = Vec::with_capacity(items.len());
        for (path, properties) in items {
            let mut item = LockItem::new(path_from_wire(path));
            match properties {
                Value::Null => {}
                Value::Object(properties) => {
                    for (name, value) in properties {
                        let Value::String(value) = value else {
                            return Err(self.error(
                                &within(&within(&at, path), name),
                                format!("property '{name}' of '{path}' in '{key}' must be a string"),
                            ));
                        };
                        item.properties.insert(name.clone(), value.clone());
                    }
                }
                _ => {
                    return Err(self.error(
                        &within(&at, path),
                        format!("asset '{path}' in '{key}' must be an object"),
                    ))
                }
            }
            result.push(item);
        }
        Ok(result)
    }

    /// Look up an optional object-valued field of the object at `at`; `null`
    /// counts as absent.
    fn object<'v>(
        &self,
        at: &[&str],
        fields: &'v Map<String, Value>,
        field: &str,
    ) -> Result<Option<&'v Map<String, Value>>, FormatError> {
        match fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(self.error(&within(at, field), format!("'{field}' must be an object"))),
        }
    }

    fn string(
        &self,
        at: &[&str],
        fields: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<String>, FormatError> {
        match fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(_) => Err(self.error(
                &within(at, field),
                format!("'{field}' of '{}' must be a string", last(at)),
            )),
        }
    }

    fn strings(&self, at: &[&str], value: &Value) -> Result<Vec<String>, FormatError> {
        let invalid = || {
            let name = match last(at) {
                "" => DEPENDENCY_GROUPS,
                name => name,
            };
            self.error(at, format!("'{name}' must be an array of strings"))
        };
        let Value::Array(entries) = value else {
            return Err(invalid());
        };
        entries
            .iter()
            .map(|entry| entry.as_str().map(str::to_string).ok_or_else(invalid))
            .collect()
    }
}

fn within<'k>(at: &[&'k str], key: &'k str) -> Vec<&'k str> {
    let mut path = at.to_vec();
    path.push(key);
    path
}

fn last<'k>(at: &[&'k str]) -> &'k str {
    at.last().copied().unwrap_or_default()
}

fn encode_document(document: &LockDocument) -> Result<Map<String, Value>, FormatError> {
    let mut root = Map::new();
    if document.format_version != UNKNOWN_VERSION {
        root.insert(VERSION.into(), Value::from(document.format_version));
    }

    if let Some(options) = document.runtime_options.as_ref().filter(|o| !o.is_empty()) {
        root.insert(RUNTIME_OPTIONS.into(), Value::Object(options.clone()));
    }
    if let Some(options) = document.compilation_options.as_ref().filter(|o| !o.is_empty()) {
        root.insert(COMPILATION_OPTIONS.into(), Value::Object(options.clone()));
    }

    if !document.targets.is_empty() {
        let mut targets = Map::new();
        for target in &document.targets {
            let fields = encode_target(target)?;
            insert_unique(&mut targets, target.key().to_string(), fields, "target")?;
        }
        root.insert(TARGETS.into(), Value::Object(targets));
    }

    if !document.package_libraries.is_empty() || !document.project_libraries.is_empty() {
        let mut libraries = Map::new();
        for project in &document.project_libraries {
            let mut fields = Map::new();
            fields.insert(TYPE.into(), Value::from(LibraryKind::Project.as_str()));
            if let Some(path) = &project.path {
                fields.insert(PATH.into(), Value::from(path_to_wire(path)));
            }
            insert_unique(&mut libraries, project.key().to_string(), fields, "library")?;
        }
        for package in &document.package_libraries {
            let fields = encode_package(package);
            insert_unique(&mut libraries, package.key().to_string(), fields, "library")?;
        }
        root.insert(LIBRARIES.into(), Value::Object(libraries));
    }

    if !document.dependency_groups.is_empty() {
        let groups = document
            .dependency_groups
            .iter()
            .map(|group| {
                let dependencies = group.dependencies.iter().cloned().map(Value::from).collect();
                (group.framework.clone().unwrap_or_default(), Value::Array(dependencies))
            })
            .collect();
        root.insert(DEPENDENCY_GROUPS.into(), Value::Object(groups));
    }

    Ok(root)
}

fn insert_unique(
    map: &mut Map<String, Value>,
    key: String,
    fields: Map<String, Value>,
    what: &str,
) -> Result<(), FormatError> {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(Value::Object(fields));
            Ok(())
        }
        Entry::Occupied(slot) => Err(FormatError::at(
            0,
            0,
            format!("duplicate {what} '{}' cannot be encoded", slot.key()),
        )),
    }
}

fn encode_package(package: &PackageLibrary) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(TYPE.into(), Value::from(LibraryKind::Package.as_str()));
    if package.serviceable {
        fields.insert(SERVICEABLE.into(), Value::Bool(true));
    }
    if let Some(hash) = &package.content_hash {
        fields.insert(SHA512.into(), Value::from(hash.as_str()));
    }
    if !package.files.is_empty() {
        let mut files: Vec<String> = package.files.iter().map(|f| path_to_wire(f)).collect();
        files.sort();
        fields.insert(FILES.into(), Value::Array(files.into_iter().map(Value::from).collect()));
    }
    fields
}

fn encode_target(target: &LockTarget) -> Result<Map<String, Value>, FormatError> {
    let mut libraries = Map::new();
    for library in &target.libraries {
        let fields = encode_target_library(library);
        let key = library.key().to_string();
        insert_unique(&mut libraries, key, fields, "library").map_err(|e| FormatError {
            message: format!("{} in target '{}'", e.message, target.key()),
            ..e
        })?;
    }
    Ok(libraries)
}

fn encode_target_library(library: &LockTargetLibrary) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(TYPE.into(), Value::from(library.kind.as_str()));

    if let Some(framework) = &library.target_framework {
        fields.insert(FRAMEWORK.into(), Value::from(framework.as_str()));
    }

    if !library.dependencies.is_empty() {
        let mut dependencies: Vec<&Dependency> = library.dependencies.iter().collect();
        dependencies.sort_by(|a, b| a.name.cmp(&b.name));
        let dependencies = dependencies
            .into_iter()
            .map(|d| (d.name.clone(), Value::from(d.range.to_short_string())))
            .collect();
        fields.insert(DEPENDENCIES.into(), Value::Object(dependencies));
    }

    if !library.framework_assemblies.is_empty() {
        let assemblies = library.framework_assemblies.iter().cloned().map(Value::from).collect();
        fields.insert(FRAMEWORK_ASSEMBLIES.into(), Value::Array(assemblies));
    }

    for (bucket, items) in [
        (COMPILE, &library.compile_time_assemblies),
        (RUNTIME, &library.runtime_assemblies),
        (RESOURCE, &library.resource_assemblies),
        (NATIVE, &library.native_libraries),
    ] {
        if !items.is_empty() {
            fields.insert(bucket.into(), Value::Object(encode_items(items)));
        }
    }

    fields
}

fn encode_items(items: &[LockItem]) -> Map<String, Value> {
    items
        .iter()
        .map(|item| {
            let properties = item
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect();
            (path_to_wire(&item.path), Value::Object(properties))
        })
        .collect()
}
