//! IL Patcher: landmark-driven rewriting of compiled method bodies
//!
//! Changes the behavior of a pre-compiled method without its source: find a
//! structural landmark in the method's instruction stream, splice new
//! instructions in, and prove the result is still well formed before anything
//! is installed.
//!
//! # Architecture
//!
//! - [`il`]: host-neutral instructions, operands, labels and exception-region
//!   markers. Labels live on the instruction they mark, so moving an
//!   instruction moves its branch-target identity with it.
//! - [`pattern`]: windowed matching with exact and wildcard elements and
//!   named captures.
//! - [`cursor`]: the chainable editor and the render-time invariant checks.
//! - [`host`]: the capability traits a host implements to supply bodies and
//!   install rewritten ones.
//! - [`config`]: TOML patch files that describe cursor scripts as data.
//!
//! # Failure policy
//!
//! A missing landmark is recoverable: the patch is skipped, the original body
//! stays, and a warning names the method and step. A body that would break an
//! invariant is fatal for that patch only. Other patches are unaffected.
//!
//! # Example
//!
//! ```
//! use il_patcher::{Cursor, Instruction, MethodBody, MethodRef, MethodTarget, Opcode, Operand};
//! use il_patcher::pattern::{Pattern, PatternElement};
//!
//! let body = MethodBody::new(
//!     MethodTarget::new("Game.Tree", "dayUpdate"),
//!     vec![
//!         Instruction::ldarg(0),
//!         Instruction::ldc_i4(1),
//!         Instruction::new(Opcode::Sub),
//!         Instruction::new(Opcode::Ret),
//!     ],
//! );
//!
//! let mut cursor = Cursor::new(body);
//! cursor
//!     .find_next(&Pattern::new([PatternElement::exact(Opcode::LdcI4, Operand::Int(1))]))?
//!     .advance(1)?
//!     .insert(
//!         [
//!             Instruction::ldarg(0),
//!             Instruction::call(MethodRef::new("Mod.Hooks", "extraGrowth")),
//!             Instruction::new(Opcode::Add),
//!         ],
//!         None,
//!     )?;
//! let rendered = cursor.render()?;
//! assert_eq!(rendered.body.len(), 7);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod cursor;
pub mod diagnostic;
pub mod host;
pub mod il;
pub mod pattern;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_bundled, load_from_path, load_from_str,
    matches_requirement, ApplicationError, ConfigError, PatchConfig, PatchReport, PatchResult,
    VersionError,
};
pub use cursor::{Cursor, CursorError, EditSummary, InvariantViolation, RenderError, RenderedBody};
pub use diagnostic::{Diagnostic, Severity};
pub use host::{BodyInstaller, HostError, ListingDirectory, ListingWriter, MemoryHost, MethodSource};
pub use il::{
    Instruction, Label, MethodBody, MethodRef, MethodTarget, Opcode, Operand, OperandKind,
    TypeRef,
};
pub use pattern::{Match, Pattern, PatternElement};
