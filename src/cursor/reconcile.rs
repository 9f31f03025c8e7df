//! Label and exception-region bookkeeping.
//!
//! Labels and region markers are stored on the instruction values, so an
//! insert or delete moves them together with the instruction they mark and no
//! index shifting is ever needed. What remains to track is:
//!
//! - labels a caller detached (or that lost their instruction to a delete)
//!   and has not reattached yet,
//! - region markers removed together with their instruction,
//! - the checks that every label resolves exactly once and every region stays
//!   well ordered.

use crate::cursor::errors::InvariantViolation;
use crate::il::{Instruction, Label, MarkerKind, RegionMarker};
use std::collections::{BTreeMap, BTreeSet};

/// Where every attached label currently sits.
#[derive(Debug, Default)]
pub struct LabelIndex {
    positions: BTreeMap<Label, Vec<usize>>,
}

impl LabelIndex {
    pub fn build(instructions: &[Instruction]) -> Self {
        let mut positions: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
        for (idx, insn) in instructions.iter().enumerate() {
            for label in &insn.labels {
                positions.entry(*label).or_default().push(idx);
            }
        }
        Self { positions }
    }

    /// Position of the single instruction carrying `label`.
    pub fn resolve(&self, label: Label) -> Option<usize> {
        match self.positions.get(&label).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    pub fn positions(&self, label: Label) -> &[usize] {
        self.positions.get(&label).map_or(&[], Vec::as_slice)
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.positions.keys().copied()
    }
}

/// Marker positions per exception region.
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: BTreeMap<u32, BTreeMap<MarkerKind, Vec<usize>>>,
}

impl RegionTable {
    pub fn build(instructions: &[Instruction]) -> Self {
        let mut regions: BTreeMap<u32, BTreeMap<MarkerKind, Vec<usize>>> = BTreeMap::new();
        for (idx, insn) in instructions.iter().enumerate() {
            for marker in &insn.regions {
                regions
                    .entry(marker.region)
                    .or_default()
                    .entry(marker.kind)
                    .or_default()
                    .push(idx);
            }
        }
        Self { regions }
    }

    pub fn region_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.regions.keys().copied()
    }

    /// Position of the single `kind` marker of `region`.
    pub fn marker(&self, region: u32, kind: MarkerKind) -> Option<usize> {
        match self
            .regions
            .get(&region)
            .and_then(|kinds| kinds.get(&kind))
            .map(Vec::as_slice)
        {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    /// Check presence, uniqueness and ordering of every region's markers.
    /// Markers listed in `orphaned` are reported by the caller and not
    /// reported again as missing.
    pub fn validate(&self, orphaned: &[RegionMarker], out: &mut Vec<InvariantViolation>) {
        const REQUIRED: [MarkerKind; 4] = [
            MarkerKind::TryStart,
            MarkerKind::TryEnd,
            MarkerKind::HandlerStart,
            MarkerKind::HandlerEnd,
        ];

        let mut ids: BTreeSet<u32> = self.regions.keys().copied().collect();
        ids.extend(orphaned.iter().map(|m| m.region));

        for region in ids {
            let kinds = self.regions.get(&region);
            let mut complete = true;

            for kind in REQUIRED {
                let count = kinds.and_then(|k| k.get(&kind)).map_or(0, Vec::len);
                let was_orphaned = orphaned
                    .iter()
                    .any(|m| m.region == region && m.kind == kind);
                if count == 0 {
                    complete = false;
                    if !was_orphaned {
                        out.push(InvariantViolation::MissingRegionMarker { region, kind });
                    }
                }
            }

            if let Some(kinds) = kinds {
                for (kind, positions) in kinds {
                    if positions.len() > 1 {
                        complete = false;
                        out.push(InvariantViolation::DuplicateRegionMarker {
                            region,
                            kind: *kind,
                            count: positions.len(),
                        });
                    }
                }
            }

            if complete {
                self.check_order(region, out);
            }
        }
    }

    fn check_order(&self, region: u32, out: &mut Vec<InvariantViolation>) {
        let at = |kind| self.marker(region, kind);
        let mut chain = vec![
            (MarkerKind::TryStart, false),
            (MarkerKind::TryEnd, false),
        ];
        if at(MarkerKind::FilterStart).is_some() {
            chain.push((MarkerKind::FilterStart, true));
        }
        chain.push((MarkerKind::HandlerStart, true));
        chain.push((MarkerKind::HandlerEnd, false));

        // `strict` on an entry means it must come strictly after its predecessor.
        for pair in chain.windows(2) {
            let (first, _) = pair[0];
            let (second, strict) = pair[1];
            let (Some(first_at), Some(second_at)) = (at(first), at(second)) else {
                continue;
            };
            let ordered = if strict {
                first_at < second_at
            } else {
                first_at <= second_at
            };
            if !ordered {
                out.push(InvariantViolation::RegionOrder {
                    region,
                    first,
                    first_at,
                    second,
                    second_at,
                });
            }
        }
    }
}

/// Labels and markers that currently have no instruction.
#[derive(Debug, Default, Clone)]
pub(crate) struct Pending {
    labels: BTreeSet<Label>,
    markers: Vec<RegionMarker>,
}

impl Pending {
    /// Detach every label from `insn`, returning them; they stay pending
    /// until reattached.
    pub(crate) fn detach_labels(&mut self, insn: &mut Instruction) -> Vec<Label> {
        let labels = std::mem::take(&mut insn.labels);
        self.labels.extend(labels.iter().copied());
        labels
    }

    /// Detach every region marker from `insn`.
    pub(crate) fn detach_markers(&mut self, insn: &mut Instruction) -> Vec<RegionMarker> {
        let markers = std::mem::take(&mut insn.regions);
        self.markers.extend(markers.iter().copied());
        markers
    }

    /// Record what removed instructions carried.
    pub(crate) fn absorb_removed(&mut self, removed: &[Instruction]) {
        for insn in removed {
            self.labels.extend(insn.labels.iter().copied());
            self.markers.extend(insn.regions.iter().copied());
        }
    }

    /// Attach `labels` to `insn`, skipping ones it already carries.
    pub(crate) fn attach_labels(&mut self, insn: &mut Instruction, labels: &[Label]) {
        for label in labels {
            self.labels.remove(label);
            if !insn.labels.contains(label) {
                insn.labels.push(*label);
            }
        }
    }

    pub(crate) fn attach_markers(&mut self, insn: &mut Instruction, markers: &[RegionMarker]) {
        for marker in markers {
            if let Some(idx) = self.markers.iter().position(|m| m == marker) {
                self.markers.remove(idx);
            }
            if !insn.regions.contains(marker) {
                insn.regions.push(*marker);
            }
        }
    }

    /// Forget pending entries that were attached directly on inserted
    /// instructions.
    pub(crate) fn settle(&mut self, inserted: &[Instruction]) {
        for insn in inserted {
            for label in &insn.labels {
                self.labels.remove(label);
            }
            for marker in &insn.regions {
                if let Some(idx) = self.markers.iter().position(|m| m == marker) {
                    self.markers.remove(idx);
                }
            }
        }
    }

    pub(crate) fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.labels.iter().copied()
    }

    pub(crate) fn markers(&self) -> &[RegionMarker] {
        &self.markers
    }
}

/// Every referenced label resolves exactly once and no detached label is
/// left without an instruction.
pub(crate) fn check_labels(
    instructions: &[Instruction],
    pending: &Pending,
    out: &mut Vec<InvariantViolation>,
) {
    let index = LabelIndex::build(instructions);

    for label in index.labels() {
        let positions = index.positions(label);
        if positions.len() > 1 {
            out.push(InvariantViolation::DuplicateLabel {
                label,
                positions: positions.to_vec(),
            });
        }
    }

    let mut reported = BTreeSet::new();
    for (idx, insn) in instructions.iter().enumerate() {
        for &label in insn.branch_targets() {
            if index.positions(label).is_empty() && reported.insert(label) {
                out.push(InvariantViolation::DanglingLabel {
                    label,
                    referenced_at: idx,
                });
            }
        }
    }

    for label in pending.labels() {
        if index.positions(label).is_empty() && !reported.contains(&label) {
            out.push(InvariantViolation::UnassignedLabel { label });
        }
    }
}
