use crate::il::instruction::Instruction;
use crate::il::operand::{Label, LocalSlot, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use xxhash_rust::xxh3::xxh3_64;

/// Names a method on the host: declaring type plus method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodTarget {
    #[serde(rename = "type")]
    pub declaring_type: String,
    pub method: String,
}

impl MethodTarget {
    pub fn new(declaring_type: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.method)
    }
}

/// A disassembled method: its instructions plus the parameter and
/// local-variable type tables the pattern matcher consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    pub target: MethodTarget,
    /// Parameter types; slot 0 is `this` for instance methods.
    #[serde(default)]
    pub params: Vec<TypeRef>,
    /// Local-variable types indexed by slot.
    #[serde(default)]
    pub locals: Vec<TypeRef>,
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    pub fn new(target: MethodTarget, instructions: Vec<Instruction>) -> Self {
        Self {
            target,
            params: Vec::new(),
            locals: Vec::new(),
            instructions,
        }
    }

    pub fn with_params<I, T>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeRef>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_locals<I, T>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeRef>,
    {
        self.locals = locals.into_iter().map(Into::into).collect();
        self
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn local_type(&self, slot: LocalSlot) -> Option<&TypeRef> {
        self.locals.get(slot.index())
    }

    /// Highest label id that is attached or referenced anywhere in the body.
    pub fn max_label(&self) -> Option<Label> {
        self.instructions
            .iter()
            .flat_map(|insn| insn.labels.iter().chain(insn.branch_targets()))
            .copied()
            .max()
    }

    /// One instruction per line, prefixed with its position.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (idx, insn) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "{idx:04}  {insn}");
        }
        out
    }

    /// xxh3 of the listing, used to pin a patch to a known method shape.
    pub fn fingerprint(&self) -> u64 {
        let mut text = String::new();
        for ty in &self.locals {
            let _ = writeln!(text, ".local {ty}");
        }
        text.push_str(&self.listing());
        xxh3_64(text.as_bytes())
    }
}

/// Render a fingerprint the way patch files spell it.
pub fn format_fingerprint(fingerprint: u64) -> String {
    format!("{fingerprint:016x}")
}
