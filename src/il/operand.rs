//! Typed operands and the reference types they name.
//!
//! Reference operands (fields, methods, types) are compared by name, never
//! structurally: two `MethodRef`s denote the same method when their declaring
//! type and name agree, and, if both list parameters, their parameter types.

use crate::il::opcode::OperandKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A branch target marker. Attached to exactly one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Index into a method's local-variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalSlot(pub u16);

impl LocalSlot {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for LocalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V_{}", self.0)
    }
}

/// A type by its fully qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(String);

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("reference '{0}' must have the form Type::member")]
    MissingSeparator(String),

    #[error("reference '{0}' has an unterminated parameter list")]
    UnterminatedParams(String),

    #[error("reference '{0}' has an empty type or member name")]
    EmptyName(String),
}

/// A field, written `Declaring.Type::name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldRef {
    pub declaring_type: TypeRef,
    pub name: String,
}

impl FieldRef {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: TypeRef::new(declaring_type),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

impl FromStr for FieldRef {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = split_member(s)?;
        Ok(FieldRef::new(owner, name))
    }
}

impl TryFrom<String> for FieldRef {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldRef> for String {
    fn from(field: FieldRef) -> Self {
        field.to_string()
    }
}

/// A method, written `Declaring.Type::name` or `Declaring.Type::name(P1,P2)`.
///
/// Without a parameter list the reference names every overload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodRef {
    pub declaring_type: TypeRef,
    pub name: String,
    pub params: Option<Vec<TypeRef>>,
}

impl MethodRef {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: TypeRef::new(declaring_type),
            name: name.into(),
            params: None,
        }
    }

    pub fn with_params<I, T>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeRef>,
    {
        self.params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Name-based identity. A side without a parameter list matches any overload.
    pub fn same_method(&self, other: &MethodRef) -> bool {
        if self.declaring_type != other.declaring_type || self.name != other.name {
            return false;
        }
        match (&self.params, &other.params) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)?;
        if let Some(params) = &self.params {
            f.write_str("(")?;
            for (idx, param) in params.iter().enumerate() {
                if idx > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{param}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl FromStr for MethodRef {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, params) = match s.find('(') {
            Some(open) => {
                let rest = &s[open + 1..];
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| ReferenceError::UnterminatedParams(s.to_string()))?;
                let params: Vec<TypeRef> = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(TypeRef::new)
                    .collect();
                (&s[..open], Some(params))
            }
            None => (s, None),
        };
        let (owner, name) = split_member(head)?;
        Ok(MethodRef {
            declaring_type: TypeRef::new(owner),
            name: name.to_string(),
            params,
        })
    }
}

impl TryFrom<String> for MethodRef {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MethodRef> for String {
    fn from(method: MethodRef) -> Self {
        method.to_string()
    }
}

fn split_member(s: &str) -> Result<(&str, &str), ReferenceError> {
    let s = s.trim();
    let (owner, name) = s
        .rsplit_once("::")
        .ok_or_else(|| ReferenceError::MissingSeparator(s.to_string()))?;
    if owner.trim().is_empty() || name.trim().is_empty() {
        return Err(ReferenceError::EmptyName(s.to_string()));
    }
    Ok((owner.trim(), name.trim()))
}

/// The operand of one instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    Int(i64),
    Float(f64),
    Str(String),
    Field(FieldRef),
    Method(MethodRef),
    Type(TypeRef),
    Local(LocalSlot),
    Label(Label),
    Switch(Vec<Label>),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Int(_) => OperandKind::Int,
            Operand::Float(_) => OperandKind::Float,
            Operand::Str(_) => OperandKind::Str,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
            Operand::Type(_) => OperandKind::Type,
            Operand::Local(_) => OperandKind::Local,
            Operand::Label(_) => OperandKind::Label,
            Operand::Switch(_) => OperandKind::Switch,
        }
    }

    /// Whether this operand satisfies `pattern` for exact matching.
    ///
    /// Kinds must agree. Methods use [`MethodRef::same_method`], so a pattern
    /// without a parameter list accepts every overload.
    pub fn matches(&self, pattern: &Operand) -> bool {
        match (self, pattern) {
            (Operand::Method(actual), Operand::Method(wanted)) => actual.same_method(wanted),
            _ => self == pattern,
        }
    }
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::Int(a), Operand::Int(b)) => a == b,
            (Operand::Float(a), Operand::Float(b)) => a.to_bits() == b.to_bits(),
            (Operand::Str(a), Operand::Str(b)) => a == b,
            (Operand::Field(a), Operand::Field(b)) => a == b,
            (Operand::Method(a), Operand::Method(b)) => a == b,
            (Operand::Type(a), Operand::Type(b)) => a == b,
            (Operand::Local(a), Operand::Local(b)) => a == b,
            (Operand::Label(a), Operand::Label(b)) => a == b,
            (Operand::Switch(a), Operand::Switch(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Operand {}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(v) => write!(f, "{v}"),
            Operand::Float(v) => write!(f, "{v:?}"),
            Operand::Str(v) => write!(f, "{v:?}"),
            Operand::Field(v) => write!(f, "{v}"),
            Operand::Method(v) => write!(f, "{v}"),
            Operand::Type(v) => write!(f, "{v}"),
            Operand::Local(v) => write!(f, "{v}"),
            Operand::Label(v) => write!(f, "{v}"),
            Operand::Switch(labels) => {
                f.write_str("(")?;
                for (idx, label) in labels.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{label}")?;
                }
                f.write_str(")")
            }
        }
    }
}
