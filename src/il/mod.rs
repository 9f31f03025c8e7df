//! Host-neutral instruction model.
//!
//! An [`Instruction`] is a plain value: opcode, optional typed operand, and
//! the labels and exception-region markers attached to it. Because labels and
//! markers travel with the instruction value, moving an instruction inside a
//! `Vec` moves its branch-target identity with it.

pub mod instruction;
pub mod method;
pub mod opcode;
pub mod operand;

pub use instruction::{Instruction, MarkerKind, RegionMarker};
pub use method::{format_fingerprint, MethodBody, MethodTarget};
pub use opcode::{Opcode, OperandKind, UnknownOpcode};
pub use operand::{FieldRef, Label, LocalSlot, MethodRef, Operand, ReferenceError, TypeRef};
