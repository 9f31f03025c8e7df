use crate::config::schema::{PatchConfig, PatchDefinition};
use crate::config::script::{run_steps, ScriptError};
use crate::config::version::{matches_requirement, VersionError};
use crate::cursor::{Cursor, EditSummary, RenderError, RenderedBody};
use crate::diagnostic::{Diagnostic, Severity};
use crate::host::{BodyInstaller, HostError, MethodSource};
use crate::il::{format_fingerprint, MethodBody, MethodTarget};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

/// Result of applying a single patch
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// The rewrite rendered (and, unless checking, was installed)
    Applied {
        target: MethodTarget,
        summary: EditSummary,
    },
    /// The host version is outside the patch file's range
    SkippedVersion { reason: String },
    /// An optional patch whose target method does not exist
    SkippedMissing { target: MethodTarget },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { target, summary } => {
                write!(f, "Applied to {} ({})", target, summary)
            }
            PatchResult::SkippedVersion { reason } => write!(f, "Skipped (version): {}", reason),
            PatchResult::SkippedMissing { target } => {
                write!(f, "Skipped (optional target {} not present)", target)
            }
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    Version(VersionError),
    /// The target method could not be loaded
    Lookup {
        target: MethodTarget,
        source: HostError,
    },
    /// The body no longer has the shape the patch was written against
    Fingerprint {
        target: MethodTarget,
        expected: String,
        found: String,
    },
    /// A step failed before rendering
    Script {
        target: MethodTarget,
        source: ScriptError,
    },
    /// The edited body broke a structural invariant
    Render {
        target: MethodTarget,
        source: RenderError,
    },
    /// The host refused the rendered body
    Install {
        target: MethodTarget,
        reason: String,
    },
}

impl ApplicationError {
    /// Recoverable failures mean the host changed under the patch; fatal ones
    /// mean the patch itself is wrong.
    pub fn severity(&self) -> Severity {
        match self {
            ApplicationError::Lookup { .. } | ApplicationError::Fingerprint { .. } => {
                Severity::Recoverable
            }
            ApplicationError::Script { source, .. } => match source {
                ScriptError::Cursor { source, .. } => source.severity(),
                _ => Severity::Fatal,
            },
            ApplicationError::Render { source, .. } => source.severity(),
            ApplicationError::Version(_) | ApplicationError::Install { .. } => Severity::Fatal,
        }
    }

    /// 1-based patch step the failure happened at, if it happened in a step.
    pub fn step(&self) -> Option<usize> {
        match self {
            ApplicationError::Script { source, .. } => Some(source.step()),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&MethodTarget> {
        match self {
            ApplicationError::Version(_) => None,
            ApplicationError::Lookup { target, .. }
            | ApplicationError::Fingerprint { target, .. }
            | ApplicationError::Script { target, .. }
            | ApplicationError::Render { target, .. }
            | ApplicationError::Install { target, .. } => Some(target),
        }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Version(e) => write!(f, "version error: {}", e),
            ApplicationError::Lookup { source, .. } => write!(f, "lookup failed: {}", source),
            ApplicationError::Fingerprint {
                target,
                expected,
                found,
            } => write!(
                f,
                "{} has fingerprint {}, patch expects {}",
                target, found, expected
            ),
            ApplicationError::Script { target, source } => {
                write!(f, "rewrite of {} stopped at {}", target, source)
            }
            ApplicationError::Render { source, .. } => write!(f, "{}", source),
            ApplicationError::Install { target, reason } => {
                write!(f, "failed to install {}: {}", target, reason)
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Version(e) => Some(e),
            ApplicationError::Lookup { source, .. } => Some(source),
            ApplicationError::Script { source, .. } => Some(source),
            ApplicationError::Render { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<VersionError> for ApplicationError {
    fn from(e: VersionError) -> Self {
        ApplicationError::Version(e)
    }
}

/// Outcome of a whole patch file.
#[derive(Debug, Default)]
pub struct PatchReport {
    /// One entry per patch, in file order
    pub results: Vec<(String, Result<PatchResult, ApplicationError>)>,
    /// Targets whose rewritten body was produced (and installed, unless checking)
    pub patched: BTreeSet<MethodTarget>,
    /// Final body per patched target, in the order targets were first named
    pub bodies: Vec<RenderedBody>,
}

impl PatchReport {
    pub fn applied(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(PatchResult::Applied { .. })))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| {
                matches!(
                    r,
                    Ok(PatchResult::SkippedVersion { .. } | PatchResult::SkippedMissing { .. })
                )
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Apply every patch in `config` and install each changed body once.
///
/// Patches are grouped by target and run in file order against the evolving
/// body: each patch gets its own [`Cursor`] over the output of the previous
/// successful one. A failing patch is reported and logged, and the body it
/// started from is kept. `host_version` is checked against
/// `meta.host_version_range`; without one, every patch runs.
pub fn apply_patches(
    config: &PatchConfig,
    source: &dyn MethodSource,
    installer: &mut dyn BodyInstaller,
    host_version: Option<&str>,
) -> PatchReport {
    run(config, source, Some(installer), host_version)
}

/// Same as [`apply_patches`] without installing anything.
pub fn check_patches(
    config: &PatchConfig,
    source: &dyn MethodSource,
    host_version: Option<&str>,
) -> PatchReport {
    run(config, source, None, host_version)
}

fn run(
    config: &PatchConfig,
    source: &dyn MethodSource,
    mut installer: Option<&mut dyn BodyInstaller>,
    host_version: Option<&str>,
) -> PatchReport {
    if let Some(version) = host_version {
        let range = config.meta.host_version_range.as_deref();
        match matches_requirement(version, range) {
            Ok(true) => {}
            Ok(false) => {
                let reason = format!(
                    "host version {version} does not satisfy host_version_range {}",
                    range.unwrap_or("").trim()
                );
                return PatchReport {
                    results: config
                        .patches
                        .iter()
                        .map(|patch| {
                            (
                                patch.id.clone(),
                                Ok(PatchResult::SkippedVersion {
                                    reason: reason.clone(),
                                }),
                            )
                        })
                        .collect(),
                    ..Default::default()
                };
            }
            Err(e) => {
                return PatchReport {
                    results: config
                        .patches
                        .iter()
                        .map(|patch| (patch.id.clone(), Err(ApplicationError::Version(e.clone()))))
                        .collect(),
                    ..Default::default()
                };
            }
        }
    }

    let mut slots: Vec<Option<Result<PatchResult, ApplicationError>>> =
        config.patches.iter().map(|_| None).collect();
    let mut report = PatchReport::default();

    for (target, indices) in group_by_target(&config.patches) {
        let group: Vec<(usize, &PatchDefinition)> =
            indices.iter().map(|&i| (i, &config.patches[i])).collect();

        let original = match source.load(&target) {
            Ok(body) => body,
            Err(err) => {
                for (idx, patch) in group {
                    slots[idx] = Some(if patch.optional {
                        debug!(patch = %patch.id, %target, "optional target missing: {err}");
                        Ok(PatchResult::SkippedMissing {
                            target: target.clone(),
                        })
                    } else {
                        let lookup = ApplicationError::Lookup {
                            target: target.clone(),
                            source: clone_host_error(&err),
                        };
                        report_failure(patch, &lookup);
                        Err(lookup)
                    });
                }
                continue;
            }
        };

        let mut body = original;
        let mut total = EditSummary::default();
        let mut applied = Vec::new();

        for (idx, patch) in group {
            let outcome = apply_one(patch, &body);
            slots[idx] = Some(match outcome {
                Ok(rendered) => {
                    info!(patch = %patch.id, %target, summary = %rendered.summary, "patch applied");
                    total.merge(&rendered.summary);
                    body = rendered.body;
                    applied.push(idx);
                    Ok(PatchResult::Applied {
                        target: target.clone(),
                        summary: rendered.summary,
                    })
                }
                Err(err) => {
                    report_failure(patch, &err);
                    Err(err)
                }
            });
        }

        if applied.is_empty() {
            continue;
        }

        let rendered = RenderedBody {
            body,
            summary: total,
        };
        if let Some(installer) = installer.as_deref_mut() {
            if let Err(err) = installer.install(&target, &rendered) {
                for idx in applied {
                    let failure = ApplicationError::Install {
                        target: target.clone(),
                        reason: err.to_string(),
                    };
                    report_failure(&config.patches[idx], &failure);
                    slots[idx] = Some(Err(failure));
                }
                continue;
            }
        }
        report.patched.insert(target);
        report.bodies.push(rendered);
    }

    report.results = config
        .patches
        .iter()
        .zip(slots)
        .map(|(patch, slot)| {
            let result = slot.unwrap_or_else(|| {
                Ok(PatchResult::SkippedMissing {
                    target: patch.target.clone(),
                })
            });
            (patch.id.clone(), result)
        })
        .collect();
    report
}

/// Run one patch script on its own cursor and render it.
fn apply_one(patch: &PatchDefinition, body: &MethodBody) -> Result<RenderedBody, ApplicationError> {
    let target = body.target.clone();

    if let Some(expected) = &patch.fingerprint {
        let found = format_fingerprint(body.fingerprint());
        if !found.eq_ignore_ascii_case(expected) {
            return Err(ApplicationError::Fingerprint {
                target,
                expected: expected.clone(),
                found,
            });
        }
    }

    let mut cursor = Cursor::new(body.clone());
    run_steps(&mut cursor, &patch.steps).map_err(|source| ApplicationError::Script {
        target: target.clone(),
        source,
    })?;
    cursor
        .render()
        .map_err(|source| ApplicationError::Render { target, source })
}

fn report_failure(patch: &PatchDefinition, err: &ApplicationError) {
    let target = err.target().cloned().unwrap_or_else(|| patch.target.clone());
    Diagnostic::new(target, err.severity(), err.to_string())
        .for_patch(patch.id.clone())
        .at_step(err.step())
        .emit();
}

/// Distinct targets in order of first appearance, with the patches naming them.
fn group_by_target(patches: &[PatchDefinition]) -> Vec<(MethodTarget, Vec<usize>)> {
    let mut groups: Vec<(MethodTarget, Vec<usize>)> = Vec::new();
    for (idx, patch) in patches.iter().enumerate() {
        match groups.iter_mut().find(|(target, _)| *target == patch.target) {
            Some((_, indices)) => indices.push(idx),
            None => groups.push((patch.target.clone(), vec![idx])),
        }
    }
    groups
}

/// `HostError` holds `io::Error`, which is not `Clone`; every patch in a
/// group gets its own copy of the lookup failure.
fn clone_host_error(err: &HostError) -> HostError {
    match err {
        HostError::MethodNotFound { target, suggestion } => HostError::MethodNotFound {
            target: target.clone(),
            suggestion: suggestion.clone(),
        },
        HostError::Rejected { target, reason } => HostError::Rejected {
            target: target.clone(),
            reason: reason.clone(),
        },
        HostError::Io { path, source } => HostError::Io {
            path: path.clone(),
            source: std::io::Error::new(source.kind(), source.to_string()),
        },
        HostError::Listing { path, source } => HostError::Io {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source.to_string()),
        },
    }
}
