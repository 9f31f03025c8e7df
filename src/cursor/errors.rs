use crate::diagnostic::Severity;
use crate::il::{Label, LocalSlot, MarkerKind, MethodTarget, Opcode, OperandKind};
use thiserror::Error;

/// Failures raised while a cursor chain runs. Once raised, the cursor is
/// halted and every later operation returns the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("step {step}: pattern {pattern} not found at or after position {from}")]
    PatternNotFound {
        step: usize,
        from: usize,
        pattern: String,
    },

    #[error("step {step}: cannot move {by:+} from position {position} in a sequence of {len}")]
    OutOfRange {
        step: usize,
        position: usize,
        by: isize,
        len: usize,
    },

    #[error("step {step}: no instruction at position {position} (sequence has {len})")]
    NoInstruction {
        step: usize,
        position: usize,
        len: usize,
    },

    #[error("step {step}: pattern is empty")]
    EmptyPattern { step: usize },

    #[error("step {step}: every label id is already in use")]
    LabelsExhausted { step: usize },
}

impl CursorError {
    pub fn step(&self) -> usize {
        match self {
            CursorError::PatternNotFound { step, .. }
            | CursorError::OutOfRange { step, .. }
            | CursorError::NoInstruction { step, .. }
            | CursorError::EmptyPattern { step }
            | CursorError::LabelsExhausted { step } => *step,
        }
    }

    /// Shape mismatches are recoverable; an empty pattern or running out of
    /// label ids is a bug in the patch.
    pub fn severity(&self) -> Severity {
        match self {
            CursorError::PatternNotFound { .. }
            | CursorError::OutOfRange { .. }
            | CursorError::NoInstruction { .. } => Severity::Recoverable,
            CursorError::EmptyPattern { .. } | CursorError::LabelsExhausted { .. } => {
                Severity::Fatal
            }
        }
    }
}

/// A structural invariant the rendered body would break.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("label {label} referenced at {referenced_at} is not attached to any instruction")]
    DanglingLabel { label: Label, referenced_at: usize },

    #[error("label {label} is attached to several instructions: {positions:?}")]
    DuplicateLabel { label: Label, positions: Vec<usize> },

    #[error("label {label} was detached and never reattached")]
    UnassignedLabel { label: Label },

    #[error("region {region} has no {kind} marker")]
    MissingRegionMarker { region: u32, kind: MarkerKind },

    #[error("region {region} has {count} {kind} markers")]
    DuplicateRegionMarker {
        region: u32,
        kind: MarkerKind,
        count: usize,
    },

    #[error("region {region}: {first} at {first_at} must precede {second} at {second_at}")]
    RegionOrder {
        region: u32,
        first: MarkerKind,
        first_at: usize,
        second: MarkerKind,
        second_at: usize,
    },

    #[error("{kind} marker of region {region} was removed with its instruction")]
    OrphanedRegionMarker { region: u32, kind: MarkerKind },

    #[error("instruction {position} ({opcode}) needs {expected}, found {}", describe_kind(.found))]
    OperandShape {
        position: usize,
        opcode: Opcode,
        expected: OperandKind,
        found: Option<OperandKind>,
    },

    #[error("instruction {position} uses {slot} but the method declares {locals} local(s)")]
    LocalOutOfRange {
        position: usize,
        slot: LocalSlot,
        locals: usize,
    },

    #[error("sequence has {actual} instructions, edits account for {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Why [`Cursor::render`](crate::cursor::Cursor::render) refused to produce a body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error(transparent)]
    Halted(#[from] CursorError),

    #[error("invalid rewrite of {target}: {}", join_violations(.violations))]
    Invariants {
        target: MethodTarget,
        violations: Vec<InvariantViolation>,
    },
}

impl RenderError {
    pub fn severity(&self) -> Severity {
        match self {
            RenderError::Halted(err) => err.severity(),
            RenderError::Invariants { .. } => Severity::Fatal,
        }
    }

    /// Cursor step the chain stopped at, when it stopped early.
    pub fn step(&self) -> Option<usize> {
        match self {
            RenderError::Halted(err) => Some(err.step()),
            RenderError::Invariants { .. } => None,
        }
    }
}

fn describe_kind(kind: &Option<OperandKind>) -> String {
    match kind {
        Some(kind) => kind.to_string(),
        None => "no operand".to_string(),
    }
}

fn join_violations(violations: &[InvariantViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
