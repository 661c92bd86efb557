//! Dependency resolution core: lock documents and the contexts built from them.
//!
//! This crate provides:
//! - The lock document model and its canonical JSON codec (`project.lock.json`)
//! - Dependency contexts, and conversion to and from lock documents
//! - Export flattening with per-name de-duplication
//! - Project context resolution for a (framework, runtime) target
//! - Staleness checks of a lock document against its project declaration

pub mod codec;
mod config;
mod context;
pub mod convert;
mod declaration;
pub mod export;
pub mod fs;
mod model;
mod resolver;
pub mod validate;
mod version;

pub use codec::{decode, encode, FormatError};
pub use config::{ConfigError, RetrySettings, Settings, CONFIG_FILE};
pub use context::{
    BytesContextLoader, CompilationLibrary, CompilationOptions, ContextLoader, DependencyContext,
    FileContextLoader, Library, LoadError, RuntimeLibrary, RUNTIME_CONFIG_FILE,
};
pub use convert::ConvertError;
pub use declaration::{
    DeclarationError, DeclaredDependency, FrameworkDeclaration, ProjectDeclaration, PROJECT_FILE,
};
pub use export::{ExportedDependency, LibraryExport};
pub use fs::{DocumentError, RetryPolicy};
pub use model::{
    Dependency, DependencyGroup, KeyError, LibraryKey, LibraryKind, LockDocument, LockItem,
    LockLookup, LockTarget, LockTargetLibrary, PackageLibrary, ProjectLibrary, TargetKey,
    CURRENT_VERSION, LOCK_FILE, UNKNOWN_VERSION,
};
pub use resolver::{LibraryAsset, LibraryDescription, ProjectContext, ResolveError, Resolver};
pub use validate::Staleness;
pub use version::{display_version, parse_version, Bound, VersionError, VersionRange};
