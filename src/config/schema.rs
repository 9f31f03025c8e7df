use crate::il::{Instruction, MethodTarget, Opcode, Operand};
use crate::pattern::Pattern;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen_ids = HashSet::new();
        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen_ids.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: "patch id is used more than once".to_string(),
                });
            }
            patch.validate_into(&mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement on the host version, e.g. `">=1.5.0, <1.6.0"`.
    #[serde(default)]
    pub host_version_range: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub target: MethodTarget,
    /// xxh3 of the target body as this patch expects to find it
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Skip instead of failing when the target method does not exist.
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl PatchDefinition {
    fn validate_into(&self, issues: &mut Vec<ValidationIssue>) {
        let id = Some(self.id.clone());

        if self.target.declaring_type.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                patch_id: id.clone(),
                field: "target.type",
            });
        }
        if self.target.method.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                patch_id: id.clone(),
                field: "target.method",
            });
        }
        if let Some(fingerprint) = &self.fingerprint {
            if fingerprint.len() != 16 || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: id.clone(),
                    message: format!("fingerprint '{fingerprint}' is not 16 hex digits"),
                });
            }
        }
        if self.steps.is_empty() {
            issues.push(ValidationIssue::MissingField {
                patch_id: id.clone(),
                field: "steps",
            });
        }

        let mut names = Names::default();
        for (idx, step) in self.steps.iter().enumerate() {
            let number = idx + 1;
            match step {
                Step::FindNext { pattern } | Step::FindFirst { pattern } => {
                    if pattern.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id.clone(),
                            field: "steps.pattern",
                        });
                    }
                    names.bindings.extend(pattern.capture_names().map(str::to_string));
                }
                Step::Advance { count } | Step::Retreat { count } => {
                    if *count == 0 {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: format!("step {number} moves by zero instructions"),
                        });
                    }
                }
                Step::Remember { name, .. } => {
                    names.bindings.insert(name.clone());
                }
                Step::GetLabels { into, .. } => {
                    names.labels.insert(into.clone());
                }
                Step::AttachLabels { from } => {
                    names.require(NameKind::Labels, from, &id, number, issues);
                }
                Step::Copy { count, into } => {
                    if *count == 0 {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: format!("step {number} copies zero instructions"),
                        });
                    }
                    names.copies.insert(into.clone());
                }
                Step::Insert {
                    instructions,
                    with_labels,
                } => {
                    if instructions.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id.clone(),
                            field: "steps.instructions",
                        });
                    }
                    for template in instructions {
                        match template {
                            InstructionTemplate::Captured { capture, .. } => {
                                names.require(NameKind::Binding, capture, &id, number, issues);
                            }
                            InstructionTemplate::Copied { copied } => {
                                names.require(NameKind::Copy, copied, &id, number, issues);
                            }
                            InstructionTemplate::Literal(_) => {}
                        }
                    }
                    if let Some(labels) = with_labels {
                        names.require(NameKind::Labels, labels, &id, number, issues);
                    }
                }
                Step::Replace { .. } => {}
                Step::Remove { count } => {
                    if *count == 0 {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: format!("step {number} removes zero instructions"),
                        });
                    }
                }
            }
        }
    }
}

/// Names a patch script has defined so far, by kind.
#[derive(Default)]
struct Names {
    bindings: HashSet<String>,
    labels: HashSet<String>,
    copies: HashSet<String>,
}

impl Names {
    fn require(
        &self,
        kind: NameKind,
        name: &str,
        patch_id: &Option<String>,
        step: usize,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let known = match kind {
            NameKind::Binding => &self.bindings,
            NameKind::Labels => &self.labels,
            NameKind::Copy => &self.copies,
        };
        if !known.contains(name) {
            issues.push(ValidationIssue::UnknownName {
                patch_id: patch_id.clone(),
                step,
                kind,
                name: name.to_string(),
            });
        }
    }
}

/// One cursor operation in a patch script.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    FindNext {
        pattern: Pattern,
    },
    FindFirst {
        pattern: Pattern,
    },
    Advance {
        #[serde(default = "one")]
        count: usize,
    },
    Retreat {
        #[serde(default = "one")]
        count: usize,
    },
    /// Bind the instruction under the cursor to `name`.
    Remember {
        name: String,
    },
    GetLabels {
        into: String,
        #[serde(default = "yes")]
        clear: bool,
    },
    AttachLabels {
        from: String,
    },
    Copy {
        count: usize,
        into: String,
    },
    Insert {
        instructions: Vec<InstructionTemplate>,
        #[serde(default)]
        with_labels: Option<String>,
    },
    Replace {
        opcode: Opcode,
        #[serde(default)]
        operand: Option<Operand>,
    },
    Remove {
        #[serde(default = "one")]
        count: usize,
    },
}

fn one() -> usize {
    1
}

fn yes() -> bool {
    true
}

impl Step {
    /// Kebab-case name as written in patch files.
    pub fn name(&self) -> &'static str {
        match self {
            Step::FindNext { .. } => "find-next",
            Step::FindFirst { .. } => "find-first",
            Step::Advance { .. } => "advance",
            Step::Retreat { .. } => "retreat",
            Step::Remember { .. } => "remember",
            Step::GetLabels { .. } => "get-labels",
            Step::AttachLabels { .. } => "attach-labels",
            Step::Copy { .. } => "copy",
            Step::Insert { .. } => "insert",
            Step::Replace { .. } => "replace",
            Step::Remove { .. } => "remove",
        }
    }
}

/// An instruction to insert: written out literally or derived from an
/// instruction the script bound earlier.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum InstructionTemplate {
    Captured {
        capture: String,
        #[serde(rename = "as", default)]
        conversion: Conversion,
    },
    Copied {
        copied: String,
    },
    Literal(Instruction),
}

/// How a bound instruction is turned into the inserted one.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Conversion {
    /// Insert an unlabelled copy.
    #[default]
    Same,
    /// Load the local the bound instruction reads or writes.
    LoadLocal,
    /// Store to the local the bound instruction reads or writes.
    StoreLocal,
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Same => write!(f, "same"),
            Conversion::LoadLocal => write!(f, "load-local"),
            Conversion::StoreLocal => write!(f, "store-local"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Binding,
    Labels,
    Copy,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Binding => write!(f, "capture"),
            NameKind::Labels => write!(f, "label set"),
            NameKind::Copy => write!(f, "copied block"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
    /// A step refers to a name no earlier step defines.
    UnknownName {
        patch_id: Option<String>,
        step: usize,
        kind: NameKind,
        name: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
            ValidationIssue::UnknownName {
                patch_id,
                step,
                kind,
                name,
            } => {
                let id = patch_id.as_deref().unwrap_or("?");
                write!(
                    f,
                    "patch '{id}' step {step} uses {kind} '{name}' before any step defines it"
                )
            }
        }
    }
}
