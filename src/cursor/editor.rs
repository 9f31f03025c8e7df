use crate::cursor::errors::{CursorError, RenderError};
use crate::cursor::reconcile::Pending;
use crate::cursor::render::{self, Edit, RenderedBody};
use crate::il::{Instruction, Label, MethodBody, MethodTarget, Opcode, Operand, RegionMarker};
use crate::pattern::{find, Match, Pattern};
use std::fmt::Write as _;
use tracing::debug;

/// Chainable editing handle over one method's working instruction list.
///
/// Operations return `Result<&mut Cursor, CursorError>` so a patch reads as a
/// `?` chain. The first failure halts the cursor; every later operation
/// returns a clone of that same error without touching the sequence, and
/// [`render`](Cursor::render) reports it.
///
/// After a successful [`find_next`](Cursor::find_next) the position sits on
/// the first instruction of the match, so `copy`, `get_labels` and `insert`
/// act on the landmark itself. A following `find_next` resumes one past that
/// position.
#[derive(Debug)]
pub struct Cursor {
    body: MethodBody,
    original_len: usize,
    position: usize,
    /// Whether the instruction under the cursor was already visited by a
    /// search or move; searches start past it.
    anchored: bool,
    last_match: Option<Match>,
    pending: Pending,
    /// `None` once the id space is used up.
    next_label: Option<u32>,
    step: usize,
    halted: Option<CursorError>,
    journal: Vec<Edit>,
}

impl Cursor {
    pub fn new(body: MethodBody) -> Self {
        let next_label = match body.max_label() {
            Some(label) => label.0.checked_add(1),
            None => Some(0),
        };
        Self {
            original_len: body.len(),
            body,
            position: 0,
            anchored: false,
            last_match: None,
            pending: Pending::default(),
            next_label,
            step: 0,
            halted: None,
            journal: Vec::new(),
        }
    }

    pub fn target(&self) -> &MethodTarget {
        &self.body.target
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.body.instructions
    }

    /// Instruction under the cursor, `None` at the end of the sequence.
    pub fn current(&self) -> Option<&Instruction> {
        self.body.instructions.get(self.position)
    }

    pub fn last_match(&self) -> Option<&Match> {
        self.last_match.as_ref()
    }

    /// Instruction bound to `name` by the most recent successful search.
    pub fn capture(&self, name: &str) -> Option<&Instruction> {
        self.last_match.as_ref()?.capture(name)
    }

    /// Number of operations issued so far.
    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn halted(&self) -> Option<&CursorError> {
        self.halted.as_ref()
    }

    pub fn journal(&self) -> &[Edit] {
        &self.journal
    }

    /// Search forward for `pattern` and move onto the start of the match.
    pub fn find_next(&mut self, pattern: &Pattern) -> Result<&mut Self, CursorError> {
        let from = if self.anchored {
            self.position + 1
        } else {
            self.position
        };
        self.search(from, pattern, "find-next")
    }

    /// Search from the start of the sequence regardless of the position.
    pub fn find_first(&mut self, pattern: &Pattern) -> Result<&mut Self, CursorError> {
        self.search(0, pattern, "find-first")
    }

    fn search(
        &mut self,
        from: usize,
        pattern: &Pattern,
        op: &'static str,
    ) -> Result<&mut Self, CursorError> {
        let step = self.begin()?;
        if pattern.is_empty() {
            return Err(self.halt(CursorError::EmptyPattern { step }));
        }

        let found = find(&self.body.instructions, &self.body.locals, from, pattern);
        let Some(found) = found else {
            return Err(self.halt(CursorError::PatternNotFound {
                step,
                from,
                pattern: pattern.to_string(),
            }));
        };

        debug!(
            method = %self.body.target,
            step,
            start = found.start,
            end = found.end,
            "{op} matched {pattern}"
        );
        self.position = found.start;
        self.anchored = true;
        self.last_match = Some(found);
        Ok(self)
    }

    /// Move forward exactly `count` instructions. Landing on the end of the
    /// sequence is allowed, so a following insert appends.
    pub fn advance(&mut self, count: usize) -> Result<&mut Self, CursorError> {
        let step = self.begin()?;
        let len = self.body.len();
        let target = self.position.saturating_add(count);
        if target > len {
            return Err(self.halt(CursorError::OutOfRange {
                step,
                position: self.position,
                by: signed(count),
                len,
            }));
        }
        debug!(method = %self.body.target, step, from = self.position, to = target, "advance");
        self.position = target;
        self.anchored = true;
        Ok(self)
    }

    pub fn retreat(&mut self, count: usize) -> Result<&mut Self, CursorError> {
        let step = self.begin()?;
        let Some(target) = self.position.checked_sub(count) else {
            let err = CursorError::OutOfRange {
                step,
                position: self.position,
                by: -signed(count),
                len: self.body.len(),
            };
            return Err(self.halt(err));
        };
        debug!(method = %self.body.target, step, from = self.position, to = target, "retreat");
        self.position = target;
        self.anchored = true;
        Ok(self)
    }

    /// Labels attached to the instruction under the cursor. With `clear`, they
    /// are detached and must be handed back through
    /// [`insert`](Cursor::insert) or [`attach_labels`](Cursor::attach_labels)
    /// before rendering.
    pub fn get_labels(&mut self, clear: bool) -> Result<Vec<Label>, CursorError> {
        let step = self.begin()?;
        let position = self.position;
        let len = self.body.len();
        let Some(insn) = self.body.instructions.get_mut(position) else {
            return Err(self.halt(CursorError::NoInstruction {
                step,
                position,
                len,
            }));
        };

        let labels = if clear {
            self.pending.detach_labels(insn)
        } else {
            insn.labels.clone()
        };
        debug!(method = %self.body.target, step, position, clear, ?labels, "get-labels");
        Ok(labels)
    }

    /// Attach labels to the instruction under the cursor.
    pub fn attach_labels(&mut self, labels: &[Label]) -> Result<&mut Self, CursorError> {
        let step = self.begin()?;
        let position = self.position;
        let len = self.body.len();
        let Some(insn) = self.body.instructions.get_mut(position) else {
            return Err(self.halt(CursorError::NoInstruction {
                step,
                position,
                len,
            }));
        };
        self.pending.attach_labels(insn, labels);
        debug!(method = %self.body.target, step, position, ?labels, "attach-labels");
        Ok(self)
    }

    /// Detach the region markers of the instruction under the cursor.
    pub fn take_markers(&mut self) -> Result<Vec<RegionMarker>, CursorError> {
        let step = self.begin()?;
        let position = self.position;
        let len = self.body.len();
        let Some(insn) = self.body.instructions.get_mut(position) else {
            return Err(self.halt(CursorError::NoInstruction {
                step,
                position,
                len,
            }));
        };
        Ok(self.pending.detach_markers(insn))
    }

    pub fn attach_markers(&mut self, markers: &[RegionMarker]) -> Result<&mut Self, CursorError> {
        let step = self.begin()?;
        let position = self.position;
        let len = self.body.len();
        let Some(insn) = self.body.instructions.get_mut(position) else {
            return Err(self.halt(CursorError::NoInstruction {
                step,
                position,
                len,
            }));
        };
        self.pending.attach_markers(insn, markers);
        Ok(self)
    }

    /// Copies of the next `count` instructions, labels and markers stripped.
    /// The working sequence is not touched.
    pub fn copy(&mut self, count: usize) -> Result<Vec<Instruction>, CursorError> {
        let step = self.begin()?;
        let range = self.position..self.position.saturating_add(count);
        let Some(window) = self.body.instructions.get(range) else {
            let err = CursorError::OutOfRange {
                step,
                position: self.position,
                by: signed(count),
                len: self.body.len(),
            };
            return Err(self.halt(err));
        };
        let copied: Vec<_> = window.iter().map(Instruction::bare).collect();
        debug!(method = %self.body.target, step, position = self.position, count, "copy");
        Ok(copied)
    }

    /// Splice `instructions` in before the instruction under the cursor and
    /// move past them, so the cursor stays on the same instruction. Labels in
    /// `with_labels` go onto the first inserted instruction.
    pub fn insert<I>(
        &mut self,
        instructions: I,
        with_labels: Option<&[Label]>,
    ) -> Result<&mut Self, CursorError>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let step = self.begin()?;
        let mut block: Vec<Instruction> = instructions.into_iter().collect();
        self.pending.settle(&block);
        if let (Some(labels), Some(first)) = (with_labels, block.first_mut()) {
            self.pending.attach_labels(first, labels);
        }

        let at = self.position;
        let count = block.len();
        self.body.instructions.splice(at..at, block);
        self.journal.push(Edit::Insert { at, count });
        debug!(method = %self.body.target, step, at, count, ?with_labels, "insert");

        self.position = at + count;
        self.anchored = true;
        Ok(self)
    }

    /// Swap opcode and operand of the instruction under the cursor, keeping
    /// its labels and region markers.
    pub fn replace_instruction(
        &mut self,
        opcode: Opcode,
        operand: Option<Operand>,
    ) -> Result<&mut Self, CursorError> {
        let step = self.begin()?;
        let position = self.position;
        let len = self.body.len();
        let Some(insn) = self.body.instructions.get_mut(position) else {
            return Err(self.halt(CursorError::NoInstruction {
                step,
                position,
                len,
            }));
        };
        insn.opcode = opcode;
        insn.operand = operand;
        debug!(method = %self.body.target, step, position, replacement = %insn, "replace");
        self.journal.push(Edit::Replace { at: position });
        Ok(self)
    }

    /// Delete `count` instructions starting at the cursor. Their labels become
    /// pending and their region markers orphaned; the cursor then sits on the
    /// instruction that followed the removed block.
    pub fn remove(&mut self, count: usize) -> Result<&mut Self, CursorError> {
        let step = self.begin()?;
        let at = self.position;
        let len = self.body.len();
        if at.saturating_add(count) > len {
            return Err(self.halt(CursorError::OutOfRange {
                step,
                position: at,
                by: signed(count),
                len,
            }));
        }
        let removed: Vec<_> = self.body.instructions.drain(at..at + count).collect();
        self.pending.absorb_removed(&removed);
        self.journal.push(Edit::Remove { at, count });
        debug!(method = %self.body.target, step, at, count, "remove");
        self.anchored = false;
        Ok(self)
    }

    /// A label id not used anywhere in the method. Fails once `Label(u32::MAX)`
    /// is taken.
    pub fn define_label(&mut self) -> Result<Label, CursorError> {
        let step = self.begin()?;
        let Some(id) = self.next_label else {
            return Err(self.halt(CursorError::LabelsExhausted { step }));
        };
        self.next_label = id.checked_add(1);
        debug!(method = %self.body.target, step, label = %Label(id), "define-label");
        Ok(Label(id))
    }

    /// The working sequence with the cursor marked, for diagnostics.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (idx, insn) in self.body.instructions.iter().enumerate() {
            let pointer = if idx == self.position { ">" } else { " " };
            let _ = writeln!(out, "{pointer} {idx:04}  {insn}");
        }
        if self.position == self.body.len() {
            let _ = writeln!(out, "> {:04}  <end>", self.position);
        }
        out
    }

    /// Validate every invariant and hand back the finished body.
    pub fn render(self) -> Result<RenderedBody, RenderError> {
        if let Some(err) = self.halted {
            return Err(err.into());
        }
        render::render(
            self.body,
            &self.pending,
            self.original_len,
            &self.journal,
            self.step,
        )
    }

    fn begin(&mut self) -> Result<usize, CursorError> {
        if let Some(err) = &self.halted {
            return Err(err.clone());
        }
        self.step += 1;
        Ok(self.step)
    }

    fn halt(&mut self, err: CursorError) -> CursorError {
        debug!(method = %self.body.target, position = self.position, "cursor halted: {err}");
        self.halted = Some(err.clone());
        err
    }
}

fn signed(count: usize) -> isize {
    isize::try_from(count).unwrap_or(isize::MAX)
}
