//! The closed opcode set and the operand shape each opcode carries.
//!
//! Opcodes are host-neutral: argument indices, local slots and constants are
//! always carried as operands, so `ldarg 0` and `ldarg 3` share one opcode.
//! Every opcode has a stable mnemonic used for listings, patch files and
//! JSON method listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The shape of operand an opcode requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    None,
    Int,
    Float,
    Str,
    Field,
    Method,
    Type,
    Local,
    Label,
    Switch,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperandKind::None => "no operand",
            OperandKind::Int => "integer",
            OperandKind::Float => "float",
            OperandKind::Str => "string",
            OperandKind::Field => "field reference",
            OperandKind::Method => "method reference",
            OperandKind::Type => "type reference",
            OperandKind::Local => "local slot",
            OperandKind::Label => "label",
            OperandKind::Switch => "label table",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown opcode mnemonic '{0}'")]
pub struct UnknownOpcode(pub String);

macro_rules! opcodes {
    ($( $variant:ident => $mnemonic:literal, $kind:ident; )*) => {
        /// One operation from the fixed instruction set.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum Opcode {
            $( $variant, )*
        }

        impl Opcode {
            /// Every opcode, in declaration order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$variant, )* ];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $mnemonic, )*
                }
            }

            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $( Opcode::$variant => OperandKind::$kind, )*
                }
            }
        }
    };
}

opcodes! {
    Nop => "nop", None;
    Dup => "dup", None;
    Pop => "pop", None;
    Ret => "ret", None;
    Throw => "throw", None;
    Rethrow => "rethrow", None;
    EndFinally => "endfinally", None;
    EndFilter => "endfilter", None;

    LdArg => "ldarg", Int;
    LdArgA => "ldarga", Int;
    StArg => "starg", Int;
    LdLoc => "ldloc", Local;
    LdLocA => "ldloca", Local;
    StLoc => "stloc", Local;

    LdNull => "ldnull", None;
    LdcI4 => "ldc.i4", Int;
    LdcI8 => "ldc.i8", Int;
    LdcR4 => "ldc.r4", Float;
    LdcR8 => "ldc.r8", Float;
    LdStr => "ldstr", Str;

    LdFld => "ldfld", Field;
    LdFldA => "ldflda", Field;
    StFld => "stfld", Field;
    LdsFld => "ldsfld", Field;
    StsFld => "stsfld", Field;

    Call => "call", Method;
    CallVirt => "callvirt", Method;
    NewObj => "newobj", Method;
    LdFtn => "ldftn", Method;

    Box => "box", Type;
    UnboxAny => "unbox.any", Type;
    CastClass => "castclass", Type;
    IsInst => "isinst", Type;
    NewArr => "newarr", Type;
    InitObj => "initobj", Type;

    LdIndRef => "ldind.ref", None;
    StIndRef => "stind.ref", None;
    LdIndI4 => "ldind.i4", None;
    LdElemRef => "ldelem.ref", None;
    StElemRef => "stelem.ref", None;
    LdLen => "ldlen", None;

    Add => "add", None;
    Sub => "sub", None;
    Mul => "mul", None;
    Div => "div", None;
    Rem => "rem", None;
    Neg => "neg", None;
    And => "and", None;
    Or => "or", None;
    Xor => "xor", None;
    Not => "not", None;
    Shl => "shl", None;
    Shr => "shr", None;
    ConvI4 => "conv.i4", None;
    ConvR8 => "conv.r8", None;

    Ceq => "ceq", None;
    Cgt => "cgt", None;
    Clt => "clt", None;

    Br => "br", Label;
    BrTrue => "brtrue", Label;
    BrFalse => "brfalse", Label;
    Beq => "beq", Label;
    BneUn => "bne.un", Label;
    Bge => "bge", Label;
    Bgt => "bgt", Label;
    Ble => "ble", Label;
    Blt => "blt", Label;
    Leave => "leave", Label;
    Switch => "switch", Switch;
}

impl Opcode {
    /// Branches, `leave` and `switch`: everything that names a label.
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::Label | OperandKind::Switch
        )
    }

    pub fn is_load_local(self) -> bool {
        matches!(self, Opcode::LdLoc)
    }

    pub fn is_load_local_address(self) -> bool {
        matches!(self, Opcode::LdLocA)
    }

    pub fn is_store_local(self) -> bool {
        matches!(self, Opcode::StLoc)
    }

    pub fn is_load_arg(self) -> bool {
        matches!(self, Opcode::LdArg)
    }

    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::CallVirt)
    }

    /// Pushes a literal value.
    pub fn is_constant(self) -> bool {
        matches!(
            self,
            Opcode::LdNull
                | Opcode::LdcI4
                | Opcode::LdcI8
                | Opcode::LdcR4
                | Opcode::LdcR8
                | Opcode::LdStr
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for Opcode {
    type Err = UnknownOpcode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic() == wanted)
            .ok_or_else(|| UnknownOpcode(s.to_string()))
    }
}

impl TryFrom<String> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Opcode> for String {
    fn from(op: Opcode) -> Self {
        op.mnemonic().to_string()
    }
}
