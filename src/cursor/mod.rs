//! Transactional editing of one method body.
//!
//! A [`Cursor`] owns a working copy of a [`MethodBody`](crate::il::MethodBody)
//! and exposes chainable search and edit operations. Nothing reaches the host
//! until [`Cursor::render`] has checked that every label still resolves, every
//! exception region is still well ordered, and every operand fits its opcode.
//!
//! ```
//! use il_patcher::cursor::Cursor;
//! use il_patcher::il::{Instruction, MethodBody, MethodRef, MethodTarget, Opcode};
//! use il_patcher::pattern::{Pattern, PatternElement};
//!
//! let body = MethodBody::new(
//!     MethodTarget::new("Game.Tree", "dayUpdate"),
//!     vec![Instruction::ldarg(0), Instruction::new(Opcode::Ret)],
//! );
//!
//! let mut cursor = Cursor::new(body);
//! cursor
//!     .find_next(&Pattern::new([PatternElement::op(Opcode::Ret)]))?
//!     .insert(
//!         [
//!             Instruction::ldarg(0),
//!             Instruction::call(MethodRef::new("Mod.Hooks", "onDayUpdate")),
//!         ],
//!         None,
//!     )?;
//!
//! let rendered = cursor.render()?;
//! assert_eq!(rendered.body.len(), 4);
//! assert_eq!(rendered.summary.inserted, 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod editor;
pub mod errors;
pub mod reconcile;
pub mod render;

pub use editor::Cursor;
pub use errors::{CursorError, InvariantViolation, RenderError};
pub use reconcile::{LabelIndex, RegionTable};
pub use render::{Edit, EditSummary, RenderedBody};
