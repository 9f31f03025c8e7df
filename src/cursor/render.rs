//! Final validation of an edited body.

use crate::cursor::errors::{InvariantViolation, RenderError};
use crate::cursor::reconcile::{check_labels, Pending, RegionTable};
use crate::il::{MethodBody, Operand, OperandKind};
use serde::Serialize;
use std::fmt;

/// One edit applied to the working sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "edit", rename_all = "kebab-case")]
pub enum Edit {
    Insert { at: usize, count: usize },
    Replace { at: usize },
    Remove { at: usize, count: usize },
}

/// What a cursor did to its method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EditSummary {
    pub inserted: usize,
    pub removed: usize,
    pub replaced: usize,
    /// Cursor operations issued, including searches and moves
    pub steps: usize,
}

impl EditSummary {
    pub fn from_journal(journal: &[Edit], steps: usize) -> Self {
        let mut summary = EditSummary {
            steps,
            ..Default::default()
        };
        for edit in journal {
            match edit {
                Edit::Insert { count, .. } => summary.inserted += count,
                Edit::Remove { count, .. } => summary.removed += count,
                Edit::Replace { .. } => summary.replaced += 1,
            }
        }
        summary
    }

    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.removed == 0 && self.replaced == 0
    }

    /// Accumulate the summary of a later patch on the same method.
    pub fn merge(&mut self, other: &EditSummary) {
        self.inserted += other.inserted;
        self.removed += other.removed;
        self.replaced += other.replaced;
        self.steps += other.steps;
    }
}

impl fmt::Display for EditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} -{} ~{} in {} step(s)",
            self.inserted, self.removed, self.replaced, self.steps
        )
    }
}

/// A validated body, ready for a [`BodyInstaller`](crate::host::BodyInstaller).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBody {
    pub body: MethodBody,
    pub summary: EditSummary,
}

/// Every instruction carries the operand its opcode requires, and local
/// slots stay inside the local-variable table.
pub(crate) fn check_operands(body: &MethodBody, out: &mut Vec<InvariantViolation>) {
    for (position, insn) in body.instructions.iter().enumerate() {
        let expected = insn.opcode.operand_kind();
        let found = insn.operand_kind();
        let shaped = match expected {
            OperandKind::None => found.is_none(),
            kind => found == Some(kind),
        };
        if !shaped {
            out.push(InvariantViolation::OperandShape {
                position,
                opcode: insn.opcode,
                expected,
                found,
            });
            continue;
        }

        if let Some(Operand::Local(slot)) = &insn.operand {
            if slot.index() >= body.locals.len() {
                out.push(InvariantViolation::LocalOutOfRange {
                    position,
                    slot: *slot,
                    locals: body.locals.len(),
                });
            }
        }
    }
}

/// Run every invariant check and hand back the body or all violations at once.
pub(crate) fn render(
    body: MethodBody,
    pending: &Pending,
    original_len: usize,
    journal: &[Edit],
    steps: usize,
) -> Result<RenderedBody, RenderError> {
    let mut violations = Vec::new();
    let summary = EditSummary::from_journal(journal, steps);

    check_labels(&body.instructions, pending, &mut violations);
    for marker in pending.markers() {
        violations.push(InvariantViolation::OrphanedRegionMarker {
            region: marker.region,
            kind: marker.kind,
        });
    }
    RegionTable::build(&body.instructions).validate(pending.markers(), &mut violations);
    check_operands(&body, &mut violations);

    let expected = (original_len + summary.inserted).saturating_sub(summary.removed);
    if expected != body.len() {
        violations.push(InvariantViolation::LengthMismatch {
            expected,
            actual: body.len(),
        });
    }

    if violations.is_empty() {
        Ok(RenderedBody { body, summary })
    } else {
        Err(RenderError::Invariants {
            target: body.target,
            violations,
        })
    }
}
