use crate::il::opcode::{Opcode, OperandKind};
use crate::il::operand::{FieldRef, Label, LocalSlot, MethodRef, Operand, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boundary kinds of an exception region.
///
/// Markers are inclusive: `TryStart` sits on the first instruction of the
/// protected block and `TryEnd` on its last; likewise for the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerKind {
    TryStart,
    TryEnd,
    FilterStart,
    HandlerStart,
    HandlerEnd,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkerKind::TryStart => "try-start",
            MarkerKind::TryEnd => "try-end",
            MarkerKind::FilterStart => "filter-start",
            MarkerKind::HandlerStart => "handler-start",
            MarkerKind::HandlerEnd => "handler-end",
        };
        f.write_str(name)
    }
}

/// One boundary of exception region `region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionMarker {
    pub region: u32,
    pub kind: MarkerKind,
}

impl fmt::Display for RegionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.region)
    }
}

/// A single instruction: opcode, operand, and the labels and region markers
/// that point *at* it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Operand>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<RegionMarker>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: None,
            labels: Vec::new(),
            regions: Vec::new(),
        }
    }

    pub fn with_operand(opcode: Opcode, operand: Operand) -> Self {
        Self {
            operand: Some(operand),
            ..Self::new(opcode)
        }
    }

    pub fn ldarg(index: i64) -> Self {
        Self::with_operand(Opcode::LdArg, Operand::Int(index))
    }

    pub fn ldloc(slot: u16) -> Self {
        Self::with_operand(Opcode::LdLoc, Operand::Local(LocalSlot(slot)))
    }

    pub fn stloc(slot: u16) -> Self {
        Self::with_operand(Opcode::StLoc, Operand::Local(LocalSlot(slot)))
    }

    pub fn ldc_i4(value: i64) -> Self {
        Self::with_operand(Opcode::LdcI4, Operand::Int(value))
    }

    pub fn ldc_r8(value: f64) -> Self {
        Self::with_operand(Opcode::LdcR8, Operand::Float(value))
    }

    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::with_operand(Opcode::LdStr, Operand::Str(value.into()))
    }

    pub fn field(opcode: Opcode, field: FieldRef) -> Self {
        Self::with_operand(opcode, Operand::Field(field))
    }

    pub fn method(opcode: Opcode, method: MethodRef) -> Self {
        Self::with_operand(opcode, Operand::Method(method))
    }

    pub fn call(method: MethodRef) -> Self {
        Self::method(Opcode::Call, method)
    }

    pub fn typed(opcode: Opcode, ty: TypeRef) -> Self {
        Self::with_operand(opcode, Operand::Type(ty))
    }

    pub fn branch(opcode: Opcode, target: Label) -> Self {
        Self::with_operand(opcode, Operand::Label(target))
    }

    /// Attach `label` to this instruction.
    pub fn labeled(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    pub fn marked(mut self, region: u32, kind: MarkerKind) -> Self {
        self.regions.push(RegionMarker { region, kind });
        self
    }

    /// Same opcode and operand, ignoring labels and region markers.
    pub fn same_code(&self, other: &Instruction) -> bool {
        self.opcode == other.opcode && self.operand == other.operand
    }

    /// A copy without labels or region markers.
    pub fn bare(&self) -> Instruction {
        Instruction {
            opcode: self.opcode,
            operand: self.operand.clone(),
            labels: Vec::new(),
            regions: Vec::new(),
        }
    }

    pub fn operand_kind(&self) -> Option<OperandKind> {
        self.operand.as_ref().map(Operand::kind)
    }

    pub fn is_load_local(&self) -> bool {
        self.opcode.is_load_local()
    }

    pub fn is_store_local(&self) -> bool {
        self.opcode.is_store_local()
    }

    pub fn is_load_arg(&self) -> bool {
        self.opcode.is_load_arg()
    }

    pub fn is_branch(&self) -> bool {
        self.opcode.is_branch()
    }

    pub fn is_call(&self) -> bool {
        self.opcode.is_call()
    }

    pub fn is_constant(&self) -> bool {
        self.opcode.is_constant()
    }

    /// Whether this instruction carries integer literal `value`.
    pub fn carries_int(&self, value: i64) -> bool {
        matches!(self.operand, Some(Operand::Int(v)) if v == value)
    }

    /// The local slot of an `ldloc`/`ldloca`/`stloc`.
    pub fn local_slot(&self) -> Option<LocalSlot> {
        match (&self.operand, self.opcode) {
            (Some(Operand::Local(slot)), Opcode::LdLoc | Opcode::LdLocA | Opcode::StLoc) => {
                Some(*slot)
            }
            _ => None,
        }
    }

    pub fn method_ref(&self) -> Option<&MethodRef> {
        match &self.operand {
            Some(Operand::Method(method)) => Some(method),
            _ => None,
        }
    }

    /// Labels this instruction transfers control to.
    pub fn branch_targets(&self) -> &[Label] {
        match &self.operand {
            Some(Operand::Label(label)) => std::slice::from_ref(label),
            Some(Operand::Switch(labels)) => labels,
            _ => &[],
        }
    }

    /// Mirror a local access as a load of the same slot.
    pub fn to_load_local(&self) -> Option<Instruction> {
        let slot = self.local_slot()?;
        Some(Instruction::with_operand(Opcode::LdLoc, Operand::Local(slot)))
    }

    /// Mirror a local access as a store to the same slot.
    pub fn to_store_local(&self) -> Option<Instruction> {
        let slot = self.local_slot()?;
        Some(Instruction::with_operand(Opcode::StLoc, Operand::Local(slot)))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.labels.is_empty() {
            for (idx, label) in self.labels.iter().enumerate() {
                if idx > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{label}")?;
            }
            f.write_str(": ")?;
        }
        write!(f, "{}", self.opcode)?;
        if let Some(operand) = &self.operand {
            write!(f, " {operand}")?;
        }
        if !self.regions.is_empty() {
            f.write_str("  [")?;
            for (idx, marker) in self.regions.iter().enumerate() {
                if idx > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{marker}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}
