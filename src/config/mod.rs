//! Declarative patch files.
//!
//! A patch file names target methods and, for each, the cursor steps that
//! rewrite it. See `patches/more-fertilizers.toml` for the shipped set.

pub mod applicator;
pub mod loader;
pub mod schema;
pub mod script;
pub mod version;

pub use applicator::{apply_patches, check_patches, ApplicationError, PatchReport, PatchResult};
pub use loader::{
    discover_patch_files, load_bundled, load_from_path, load_from_str, ConfigError,
    BUNDLED_PATCHES,
};
pub use schema::{
    Conversion, InstructionTemplate, Metadata, NameKind, PatchConfig, PatchDefinition, Step,
    ValidationError, ValidationIssue,
};
pub use script::{run_steps, ScriptError};
pub use version::{matches_requirement, normalize_host_version, VersionError};
