use crate::il::{Instruction, TypeRef};
use crate::pattern::element::ElementMatch;
use crate::pattern::Pattern;
use std::collections::HashMap;
use tracing::trace;

/// A window of the sequence that satisfied every element of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// First instruction of the window (inclusive)
    pub start: usize,
    /// One past the last instruction of the window
    pub end: usize,
    /// Instructions bound by capturing elements: name -> matched instruction
    pub captures: HashMap<String, Instruction>,
}

impl Match {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn capture(&self, name: &str) -> Option<&Instruction> {
        self.captures.get(name)
    }
}

/// Stateless windowed matcher over one instruction sequence.
///
/// Scans left to right and returns the lowest window that satisfies every
/// element. A failing element abandons that start position; there is no
/// backtracking inside a window.
pub struct PatternMatcher<'a> {
    instructions: &'a [Instruction],
    locals: &'a [TypeRef],
}

impl<'a> PatternMatcher<'a> {
    pub fn new(instructions: &'a [Instruction], locals: &'a [TypeRef]) -> Self {
        Self {
            instructions,
            locals,
        }
    }

    /// First match whose window starts at or after `from`.
    pub fn find_next(&self, from: usize, pattern: &Pattern) -> Option<Match> {
        let width = pattern.len();
        if width == 0 || width > self.instructions.len() {
            return None;
        }
        let last_start = self.instructions.len() - width;
        (from..=last_start).find_map(|start| self.match_at(start, pattern))
    }

    /// All non-overlapping matches, lowest first.
    pub fn find_all(&self, pattern: &Pattern) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut from = 0;
        while let Some(m) = self.find_next(from, pattern) {
            from = m.end;
            matches.push(m);
        }
        matches
    }

    /// Try the pattern with its first element at `start`.
    pub fn match_at(&self, start: usize, pattern: &Pattern) -> Option<Match> {
        let window = self.instructions.get(start..start + pattern.len())?;
        let mut captures = HashMap::new();

        for (offset, (element, insn)) in pattern.elements().iter().zip(window).enumerate() {
            match element.matcher.test(insn, self.locals) {
                ElementMatch::Hit => {
                    if let Some(name) = &element.capture {
                        captures.insert(name.clone(), insn.clone());
                    }
                }
                ElementMatch::Miss => return None,
                ElementMatch::Unsupported(reason) => {
                    trace!(
                        position = start + offset,
                        element = %element,
                        instruction = %insn,
                        "treating unclassifiable operand as a miss: {reason}"
                    );
                    return None;
                }
            }
        }

        Some(Match {
            start,
            end: start + pattern.len(),
            captures,
        })
    }
}

/// Convenience wrapper: `find(sequence, from, pattern)`.
pub fn find(
    instructions: &[Instruction],
    locals: &[TypeRef],
    from: usize,
    pattern: &Pattern,
) -> Option<Match> {
    PatternMatcher::new(instructions, locals).find_next(from, pattern)
}
