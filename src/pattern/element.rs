use crate::il::{Instruction, MethodRef, Opcode, Operand, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a single pattern position accepts.
///
/// A closed set: exact opcode matchers plus the wildcard kinds landmarks are
/// usually described with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "kebab-case")]
pub enum Matcher {
    /// Exact opcode; the operand must match too when one is given.
    Opcode {
        opcode: Opcode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operand: Option<Operand>,
    },
    /// Consumes exactly one instruction of any kind.
    Any,
    /// Any argument load, optionally of one argument index.
    LoadArg {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<i64>,
    },
    /// Any local load, optionally restricted to locals declared as `local_type`.
    LoadLocal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_type: Option<TypeRef>,
    },
    LoadLocalAddress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_type: Option<TypeRef>,
    },
    StoreLocal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_type: Option<TypeRef>,
    },
    /// `call` or `callvirt`, optionally to one method.
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<MethodRef>,
    },
    Branch,
    Constant,
}

/// Outcome of testing one instruction against one matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementMatch {
    Hit,
    Miss,
    /// The instruction's operand could not be classified for this matcher.
    Unsupported(&'static str),
}

impl ElementMatch {
    fn from_bool(hit: bool) -> Self {
        if hit {
            ElementMatch::Hit
        } else {
            ElementMatch::Miss
        }
    }
}

impl Matcher {
    pub(crate) fn test(&self, insn: &Instruction, locals: &[TypeRef]) -> ElementMatch {
        match self {
            Matcher::Opcode { opcode, operand } => {
                if insn.opcode != *opcode {
                    return ElementMatch::Miss;
                }
                let Some(wanted) = operand else {
                    return ElementMatch::Hit;
                };
                match &insn.operand {
                    Some(actual) if actual.kind() != insn.opcode.operand_kind() => {
                        ElementMatch::Unsupported("operand shape does not fit its opcode")
                    }
                    Some(actual) => ElementMatch::from_bool(actual.matches(wanted)),
                    None => ElementMatch::Unsupported("opcode is missing its operand"),
                }
            }
            Matcher::Any => ElementMatch::Hit,
            Matcher::LoadArg { index } => {
                if !insn.is_load_arg() {
                    return ElementMatch::Miss;
                }
                match (index, &insn.operand) {
                    (None, _) => ElementMatch::Hit,
                    (Some(wanted), Some(Operand::Int(actual))) => {
                        ElementMatch::from_bool(wanted == actual)
                    }
                    (Some(_), _) => ElementMatch::Unsupported("argument load without an index"),
                }
            }
            Matcher::LoadLocal { local_type } => {
                test_local(insn, insn.is_load_local(), local_type.as_ref(), locals)
            }
            Matcher::LoadLocalAddress { local_type } => test_local(
                insn,
                insn.opcode.is_load_local_address(),
                local_type.as_ref(),
                locals,
            ),
            Matcher::StoreLocal { local_type } => {
                test_local(insn, insn.is_store_local(), local_type.as_ref(), locals)
            }
            Matcher::Call { method } => {
                if !insn.is_call() {
                    return ElementMatch::Miss;
                }
                match (method, insn.method_ref()) {
                    (None, _) => ElementMatch::Hit,
                    (Some(wanted), Some(actual)) => {
                        ElementMatch::from_bool(actual.same_method(wanted))
                    }
                    (Some(_), None) => ElementMatch::Unsupported("call without a method operand"),
                }
            }
            Matcher::Branch => ElementMatch::from_bool(insn.is_branch()),
            Matcher::Constant => ElementMatch::from_bool(insn.is_constant()),
        }
    }
}

fn test_local(
    insn: &Instruction,
    opcode_fits: bool,
    local_type: Option<&TypeRef>,
    locals: &[TypeRef],
) -> ElementMatch {
    if !opcode_fits {
        return ElementMatch::Miss;
    }
    let Some(wanted) = local_type else {
        return ElementMatch::Hit;
    };
    let Some(slot) = insn.local_slot() else {
        return ElementMatch::Unsupported("local access without a slot operand");
    };
    match locals.get(slot.index()) {
        Some(declared) => ElementMatch::from_bool(declared == wanted),
        None => ElementMatch::Unsupported("local slot outside the local-variable table"),
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Opcode { opcode, operand } => match operand {
                Some(operand) => write!(f, "{opcode} {operand}"),
                None => write!(f, "{opcode}"),
            },
            Matcher::Any => f.write_str("<any>"),
            Matcher::LoadArg { index } => match index {
                Some(index) => write!(f, "<ldarg {index}>"),
                None => f.write_str("<ldarg>"),
            },
            Matcher::LoadLocal { local_type } => fmt_local(f, "ldloc", local_type.as_ref()),
            Matcher::LoadLocalAddress { local_type } => {
                fmt_local(f, "ldloca", local_type.as_ref())
            }
            Matcher::StoreLocal { local_type } => fmt_local(f, "stloc", local_type.as_ref()),
            Matcher::Call { method } => match method {
                Some(method) => write!(f, "<call {method}>"),
                None => f.write_str("<call>"),
            },
            Matcher::Branch => f.write_str("<branch>"),
            Matcher::Constant => f.write_str("<constant>"),
        }
    }
}

fn fmt_local(f: &mut fmt::Formatter<'_>, what: &str, ty: Option<&TypeRef>) -> fmt::Result {
    match ty {
        Some(ty) => write!(f, "<{what} {ty}>"),
        None => write!(f, "<{what}>"),
    }
}

/// One position of a [`Pattern`](crate::pattern::Pattern), optionally bound
/// to a capture name so the caller can reuse the matched instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternElement {
    #[serde(flatten)]
    pub matcher: Matcher,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
}

impl PatternElement {
    pub fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            capture: None,
        }
    }

    /// Exact opcode, any operand.
    pub fn op(opcode: Opcode) -> Self {
        Self::new(Matcher::Opcode {
            opcode,
            operand: None,
        })
    }

    /// Exact opcode and operand.
    pub fn exact(opcode: Opcode, operand: Operand) -> Self {
        Self::new(Matcher::Opcode {
            opcode,
            operand: Some(operand),
        })
    }

    pub fn any() -> Self {
        Self::new(Matcher::Any)
    }

    pub fn load_arg(index: Option<i64>) -> Self {
        Self::new(Matcher::LoadArg { index })
    }

    pub fn load_local(local_type: Option<TypeRef>) -> Self {
        Self::new(Matcher::LoadLocal { local_type })
    }

    pub fn store_local(local_type: Option<TypeRef>) -> Self {
        Self::new(Matcher::StoreLocal { local_type })
    }

    pub fn call(method: Option<MethodRef>) -> Self {
        Self::new(Matcher::Call { method })
    }

    pub fn branch() -> Self {
        Self::new(Matcher::Branch)
    }

    /// Bind the instruction this element matches to `name`.
    pub fn capture(mut self, name: impl Into<String>) -> Self {
        self.capture = Some(name.into());
        self
    }
}

impl From<&Instruction> for PatternElement {
    /// Exact matcher for the instruction's opcode and operand.
    fn from(insn: &Instruction) -> Self {
        Self::new(Matcher::Opcode {
            opcode: insn.opcode,
            operand: insn.operand.clone(),
        })
    }
}

impl fmt::Display for PatternElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.matcher)?;
        if let Some(name) = &self.capture {
            write!(f, " @{name}")?;
        }
        Ok(())
    }
}
