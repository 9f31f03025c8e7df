//! Runs the steps of one patch against a [`Cursor`].

use crate::config::schema::{Conversion, InstructionTemplate, Step};
use crate::cursor::{Cursor, CursorError};
use crate::il::{Instruction, Label};
use std::collections::HashMap;
use std::fmt;

/// Why a patch script stopped before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The cursor refused an operation (landmark missing, out of range, ...)
    Cursor { step: usize, source: CursorError },
    /// A name was used that no earlier step bound at run time
    Unbound {
        step: usize,
        kind: &'static str,
        name: String,
    },
    /// A bound instruction cannot be converted as requested
    Conversion {
        step: usize,
        name: String,
        conversion: Conversion,
        instruction: String,
    },
}

impl ScriptError {
    /// 1-based index of the failing step in the patch's step list.
    pub fn step(&self) -> usize {
        match self {
            ScriptError::Cursor { step, .. }
            | ScriptError::Unbound { step, .. }
            | ScriptError::Conversion { step, .. } => *step,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Cursor errors carry their own step; it drifts from the script's
            // numbering once a step runs without touching the cursor.
            ScriptError::Cursor { step, source } if source.step() == *step => {
                write!(f, "{source}")
            }
            ScriptError::Cursor { step, source } => write!(f, "script step {step}: {source}"),
            ScriptError::Unbound { step, kind, name } => {
                write!(f, "step {step}: no {kind} named '{name}' is bound")
            }
            ScriptError::Conversion {
                step,
                name,
                conversion,
                instruction,
            } => write!(
                f,
                "step {step}: cannot use '{name}' ({instruction}) as {conversion}"
            ),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::Cursor { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Values the script has bound by name while running.
#[derive(Debug, Default)]
struct Bindings {
    instructions: HashMap<String, Instruction>,
    labels: HashMap<String, Vec<Label>>,
    copies: HashMap<String, Vec<Instruction>>,
}

/// Execute `steps` in order, stopping at the first failure.
pub fn run_steps(cursor: &mut Cursor, steps: &[Step]) -> Result<(), ScriptError> {
    let mut bound = Bindings::default();

    for (idx, step) in steps.iter().enumerate() {
        let number = idx + 1;
        let at = |source: CursorError| ScriptError::Cursor {
            step: number,
            source,
        };

        match step {
            Step::FindNext { pattern } => {
                cursor.find_next(pattern).map_err(at)?;
                bind_captures(cursor, &mut bound);
            }
            Step::FindFirst { pattern } => {
                cursor.find_first(pattern).map_err(at)?;
                bind_captures(cursor, &mut bound);
            }
            Step::Advance { count } => {
                cursor.advance(*count).map_err(at)?;
            }
            Step::Retreat { count } => {
                cursor.retreat(*count).map_err(at)?;
            }
            Step::Remember { name } => {
                let current = cursor.current().cloned().ok_or_else(|| {
                    at(CursorError::NoInstruction {
                        step: cursor.steps(),
                        position: cursor.position(),
                        len: cursor.instructions().len(),
                    })
                })?;
                bound.instructions.insert(name.clone(), current);
            }
            Step::GetLabels { into, clear } => {
                let labels = cursor.get_labels(*clear).map_err(at)?;
                bound.labels.insert(into.clone(), labels);
            }
            Step::AttachLabels { from } => {
                let labels = lookup(&bound.labels, from, "label set", number)?;
                cursor.attach_labels(labels).map_err(at)?;
            }
            Step::Copy { count, into } => {
                let copied = cursor.copy(*count).map_err(at)?;
                bound.copies.insert(into.clone(), copied);
            }
            Step::Insert {
                instructions,
                with_labels,
            } => {
                let block = expand(instructions, &bound, number)?;
                let labels = match with_labels {
                    Some(name) => {
                        Some(lookup(&bound.labels, name, "label set", number)?.as_slice())
                    }
                    None => None,
                };
                cursor.insert(block, labels).map_err(at)?;
            }
            Step::Replace { opcode, operand } => {
                cursor
                    .replace_instruction(*opcode, operand.clone())
                    .map_err(at)?;
            }
            Step::Remove { count } => {
                cursor.remove(*count).map_err(at)?;
            }
        }
    }
    Ok(())
}

fn bind_captures(cursor: &Cursor, bound: &mut Bindings) {
    if let Some(found) = cursor.last_match() {
        for (name, insn) in &found.captures {
            bound.instructions.insert(name.clone(), insn.clone());
        }
    }
}

fn lookup<'a, T>(
    map: &'a HashMap<String, T>,
    name: &str,
    kind: &'static str,
    step: usize,
) -> Result<&'a T, ScriptError> {
    map.get(name).ok_or_else(|| ScriptError::Unbound {
        step,
        kind,
        name: name.to_string(),
    })
}

/// Turn templates into concrete instructions.
fn expand(
    templates: &[InstructionTemplate],
    bound: &Bindings,
    step: usize,
) -> Result<Vec<Instruction>, ScriptError> {
    let mut block = Vec::with_capacity(templates.len());
    for template in templates {
        match template {
            InstructionTemplate::Literal(insn) => block.push(insn.clone()),
            InstructionTemplate::Copied { copied } => {
                let copies = lookup(&bound.copies, copied, "copied block", step)?;
                block.extend(copies.iter().cloned());
            }
            InstructionTemplate::Captured {
                capture,
                conversion,
            } => {
                let source = lookup(&bound.instructions, capture, "capture", step)?;
                let converted = match conversion {
                    Conversion::Same => Some(source.bare()),
                    Conversion::LoadLocal => source.to_load_local(),
                    Conversion::StoreLocal => source.to_store_local(),
                };
                let insn = converted.ok_or_else(|| ScriptError::Conversion {
                    step,
                    name: capture.clone(),
                    conversion: *conversion,
                    instruction: source.to_string(),
                })?;
                block.push(insn);
            }
        }
    }
    Ok(block)
}
