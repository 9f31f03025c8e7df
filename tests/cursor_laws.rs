//! Property tests for the cursor's editing laws.
//!
//! Bodies are generated from small integer constants with labels on some
//! instructions and a branch to each label, so every generated body is well
//! formed before the cursor touches it. Guarded bodies add one protected
//! region with a handler, both leaving to a labelled `ret`.

use il_patcher::cursor::{Cursor, CursorError, RenderError};
use il_patcher::il::{
    Instruction, Label, MarkerKind, MethodBody, MethodTarget, Opcode, Operand, RegionMarker,
};
use il_patcher::pattern::{Pattern, PatternElement};
use proptest::prelude::*;

/// Value no generated constant takes, used as a unique landmark.
const SENTINEL: i64 = 1_000_000;

fn build_body(values: &[i64], labelled: &[bool]) -> MethodBody {
    let mut instructions = Vec::new();
    let mut targets = Vec::new();
    for (idx, value) in values.iter().enumerate() {
        let mut insn = Instruction::ldc_i4(*value);
        if labelled.get(idx).copied().unwrap_or(false) {
            let label = Label(idx as u32);
            insn = insn.labeled(label);
            targets.push(label);
        }
        instructions.push(insn);
    }
    for label in targets {
        instructions.push(Instruction::branch(Opcode::Br, label));
    }
    instructions.push(Instruction::new(Opcode::Ret));
    MethodBody::new(MethodTarget::new("Game.Generated", "run"), instructions)
}

fn body_strategy() -> impl Strategy<Value = MethodBody> {
    (1usize..24).prop_flat_map(|len| {
        (
            prop::collection::vec(-50i64..50, len),
            prop::collection::vec(any::<bool>(), len),
        )
            .prop_map(|(values, labelled)| build_body(&values, &labelled))
    })
}

/// Label both `leave`s of a guarded body jump to.
const EXIT: Label = Label(1_000);

/// `prefix` constants, a try block over `guarded` ending in `leave`, a
/// handler that pops and leaves, then the labelled `ret`.
fn build_guarded_body(prefix: &[i64], guarded: &[i64]) -> MethodBody {
    let mut instructions: Vec<Instruction> =
        prefix.iter().map(|v| Instruction::ldc_i4(*v)).collect();

    let mut protected: Vec<Instruction> =
        guarded.iter().map(|v| Instruction::ldc_i4(*v)).collect();
    protected.push(Instruction::branch(Opcode::Leave, EXIT).marked(0, MarkerKind::TryEnd));
    protected[0].regions.insert(
        0,
        RegionMarker {
            region: 0,
            kind: MarkerKind::TryStart,
        },
    );
    instructions.extend(protected);

    instructions.push(Instruction::new(Opcode::Pop).marked(0, MarkerKind::HandlerStart));
    instructions.push(Instruction::branch(Opcode::Leave, EXIT).marked(0, MarkerKind::HandlerEnd));
    instructions.push(Instruction::new(Opcode::Ret).labeled(EXIT));
    MethodBody::new(MethodTarget::new("Game.Generated", "guarded"), instructions)
}

fn guarded_strategy() -> impl Strategy<Value = (Vec<i64>, Vec<i64>)> {
    (
        prop::collection::vec(-50i64..50, 0..8),
        prop::collection::vec(-50i64..50, 0..8),
    )
}

/// Position of the instruction carrying `kind`.
fn marker_at(body: &MethodBody, kind: MarkerKind) -> Option<usize> {
    body.instructions
        .iter()
        .position(|insn| insn.regions.iter().any(|m| m.kind == kind))
}

fn nops(count: usize) -> impl Iterator<Item = Instruction> {
    (0..count).map(|_| Instruction::new(Opcode::Nop))
}

fn constant(value: i64) -> Pattern {
    Pattern::new([PatternElement::exact(Opcode::LdcI4, Operand::Int(value))])
}

proptest! {
    #[test]
    fn rendering_without_edits_returns_the_input(body in body_strategy()) {
        let rendered = Cursor::new(body.clone()).render().unwrap();
        prop_assert_eq!(rendered.body, body);
        prop_assert!(rendered.summary.is_unchanged());
    }

    #[test]
    fn insert_grows_by_block_length(
        body in body_strategy(),
        at in 0usize..64,
        block in prop::collection::vec(-50i64..50, 0..6),
    ) {
        let at = at % (body.len() + 1);
        let expected = body.len() + block.len();
        let mut cursor = Cursor::new(body);
        cursor
            .advance(at)
            .and_then(|c| c.insert(block.iter().map(|v| Instruction::ldc_i4(*v)), None))
            .unwrap();
        prop_assert_eq!(cursor.position(), at + block.len());

        let rendered = cursor.render().unwrap();
        prop_assert_eq!(rendered.body.len(), expected);
        prop_assert_eq!(rendered.summary.inserted, block.len());
    }

    #[test]
    fn labels_stay_on_their_instruction_across_inserts(
        body in body_strategy(),
        at in 0usize..64,
        count in 1usize..5,
    ) {
        let at = at % (body.len() + 1);
        let before: Vec<(usize, Instruction)> = body
            .instructions
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, insn)| !insn.labels.is_empty())
            .collect();

        let mut cursor = Cursor::new(body);
        cursor
            .advance(at)
            .and_then(|c| c.insert((0..count).map(|_| Instruction::new(Opcode::Nop)), None))
            .unwrap();
        let rendered = cursor.render().unwrap();

        for (idx, insn) in before {
            let moved = if idx >= at { idx + count } else { idx };
            prop_assert_eq!(&rendered.body.instructions[moved], &insn);
        }
    }

    #[test]
    fn a_unique_landmark_is_found_where_it_sits(
        values in prop::collection::vec(-50i64..50, 1..24),
        slot in 0usize..64,
    ) {
        let slot = slot % (values.len() + 1);
        let mut values = values;
        values.insert(slot, SENTINEL);
        let body = build_body(&values, &[]);

        let mut cursor = Cursor::new(body);
        cursor.find_next(&constant(SENTINEL)).unwrap();
        prop_assert_eq!(cursor.position(), slot);

        let found = cursor.last_match().unwrap();
        prop_assert_eq!((found.start, found.end), (slot, slot + 1));

        // The landmark is unique, so searching again must fail.
        prop_assert!(cursor.find_next(&constant(SENTINEL)).is_err());
    }

    #[test]
    fn a_missing_landmark_halts_the_chain(body in body_strategy(), extra in 1usize..4) {
        let mut cursor = Cursor::new(body);
        let err = cursor.find_next(&constant(SENTINEL)).map(|_| ()).unwrap_err();
        prop_assert!(
            matches!(err, CursorError::PatternNotFound { step: 1, .. }),
            "unexpected error: {}",
            err
        );

        // Nothing after a failure runs; every operation reports the first error.
        for _ in 0..extra {
            let again = cursor
                .insert([Instruction::new(Opcode::Nop)], None)
                .map(|_| ())
                .unwrap_err();
            prop_assert_eq!(&again, &err);
        }
        prop_assert_eq!(cursor.steps(), 1);
        prop_assert_eq!(cursor.render().unwrap_err(), RenderError::Halted(err));
    }

    #[test]
    fn rendering_a_guarded_body_without_edits_returns_the_input(
        (prefix, guarded) in guarded_strategy(),
    ) {
        let body = build_guarded_body(&prefix, &guarded);
        let rendered = Cursor::new(body.clone()).render().unwrap();
        prop_assert_eq!(rendered.body, body);
        prop_assert!(rendered.summary.is_unchanged());
    }

    #[test]
    fn region_markers_stay_on_their_instruction_across_inserts(
        (prefix, guarded) in guarded_strategy(),
        at in 0usize..64,
        count in 1usize..5,
    ) {
        let body = build_guarded_body(&prefix, &guarded);
        let at = at % (body.len() + 1);
        let before: Vec<(usize, Instruction)> = body
            .instructions
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, insn)| !insn.regions.is_empty() || !insn.labels.is_empty())
            .collect();

        let mut cursor = Cursor::new(body);
        cursor.advance(at).and_then(|c| c.insert(nops(count), None)).unwrap();
        let rendered = cursor.render().unwrap();

        for (idx, insn) in before {
            let moved = if idx >= at { idx + count } else { idx };
            prop_assert_eq!(&rendered.body.instructions[moved], &insn);
        }
        let inserted = &rendered.body.instructions[at..at + count];
        prop_assert!(inserted.iter().all(|insn| insn.regions.is_empty()));
    }

    #[test]
    fn insert_before_try_start_stays_outside_the_region(
        (prefix, guarded) in guarded_strategy(),
        count in 1usize..5,
    ) {
        let body = build_guarded_body(&prefix, &guarded);
        let try_start = prefix.len();
        let handler_end = marker_at(&body, MarkerKind::HandlerEnd).unwrap();

        let mut cursor = Cursor::new(body);
        cursor.advance(try_start).and_then(|c| c.insert(nops(count), None)).unwrap();
        let rendered = cursor.render().unwrap();

        prop_assert_eq!(
            marker_at(&rendered.body, MarkerKind::TryStart),
            Some(try_start + count)
        );
        prop_assert_eq!(
            marker_at(&rendered.body, MarkerKind::HandlerEnd),
            Some(handler_end + count)
        );
        let first = &rendered.body.instructions[try_start];
        prop_assert!(first.same_code(&Instruction::new(Opcode::Nop)));
        prop_assert!(first.regions.is_empty());
    }

    #[test]
    fn insert_inside_the_try_block_grows_the_region(
        (prefix, guarded) in guarded_strategy(),
        offset in 1usize..64,
        count in 1usize..5,
    ) {
        let body = build_guarded_body(&prefix, &guarded);
        let try_start = prefix.len();
        let try_end = marker_at(&body, MarkerKind::TryEnd).unwrap();
        // Any gap after the first protected instruction, up to the `leave`.
        let at = try_start + 1 + (offset - 1) % (try_end - try_start).max(1);
        prop_assume!(at <= try_end);

        let mut cursor = Cursor::new(body);
        cursor.advance(at).and_then(|c| c.insert(nops(count), None)).unwrap();
        let rendered = cursor.render().unwrap();

        let new_start = marker_at(&rendered.body, MarkerKind::TryStart).unwrap();
        let new_end = marker_at(&rendered.body, MarkerKind::TryEnd).unwrap();
        prop_assert_eq!(new_start, try_start);
        prop_assert_eq!(new_end, try_end + count);
        prop_assert!(new_start < at && at + count <= new_end);
    }
}
