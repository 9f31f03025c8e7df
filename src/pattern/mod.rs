//! Windowed instruction patterns.
//!
//! A [`Pattern`] is an ordered list of [`PatternElement`]s; it matches a
//! contiguous window of the same length whose instructions each satisfy the
//! corresponding element. Elements are either exact opcode matchers or one of
//! the closed set of wildcard kinds in [`Matcher`].
//!
//! ```
//! use il_patcher::il::{Instruction, Opcode, Operand, TypeRef};
//! use il_patcher::pattern::{find, Pattern, PatternElement};
//!
//! let code = vec![
//!     Instruction::ldloc(1),
//!     Instruction::ldc_r8(1.1),
//!     Instruction::new(Opcode::Mul),
//!     Instruction::stloc(1),
//! ];
//! let locals = vec![TypeRef::new("System.Int32"), TypeRef::new("System.Double")];
//! let double = Some(TypeRef::new("System.Double"));
//!
//! let pattern = Pattern::new([
//!     PatternElement::load_local(double.clone()).capture("chance"),
//!     PatternElement::exact(Opcode::LdcR8, Operand::Float(1.1)),
//!     PatternElement::op(Opcode::Mul),
//!     PatternElement::store_local(double),
//! ]);
//!
//! let m = find(&code, &locals, 0, &pattern).unwrap();
//! assert_eq!((m.start, m.end), (0, 4));
//! assert_eq!(m.capture("chance"), Some(&Instruction::ldloc(1)));
//! ```

pub mod element;
pub mod matcher;

pub use element::{Matcher, PatternElement};
pub use matcher::{find, Match, PatternMatcher};

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered sequence of pattern elements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(Vec<PatternElement>);

impl Pattern {
    pub fn new(elements: impl IntoIterator<Item = PatternElement>) -> Self {
        Self(elements.into_iter().collect())
    }

    pub fn elements(&self) -> &[PatternElement] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names bound by capturing elements, in pattern order.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|e| e.capture.as_deref())
    }
}

impl From<Vec<PatternElement>> for Pattern {
    fn from(elements: Vec<PatternElement>) -> Self {
        Self(elements)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, element) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{element}")?;
        }
        f.write_str("]")
    }
}
