//! Integration tests for the command-line interface: apply, check, show,
//! fingerprint and list.

use il_patcher::host::{listing_file_name, read_listing, write_listing_atomic};
use il_patcher::il::{format_fingerprint, Instruction, Label, MethodBody, MethodTarget, Opcode};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const PATCH: &str = r#"
[meta]
name = "test-patches"
host_version_range = ">=1.0"

[[patches]]
id = "mark-return"
target = { type = "Game.Counter", method = "tick" }

[[patches.steps]]
op = "find-next"
pattern = [{ match = "opcode", opcode = "ret" }]

[[patches.steps]]
op = "get-labels"
into = "exit"

[[patches.steps]]
op = "insert"
with_labels = "exit"
instructions = [{ opcode = "call", operand = { method = "Mod.Hooks::OnExit" } }]
"#;

const BROKEN_PATCH: &str = r#"
[[patches]]
id = "wrong-landmark"
target = { type = "Game.Counter", method = "tick" }

[[patches.steps]]
op = "find-next"
pattern = [{ match = "opcode", opcode = "ldstr" }]
"#;

const MISUSED_CAPTURE_PATCH: &str = r#"
[[patches]]
id = "ret-as-local"
target = { type = "Game.Counter", method = "tick" }

[[patches.steps]]
op = "find-next"
pattern = [{ match = "opcode", opcode = "ret" }]

[[patches.steps]]
op = "remember"
name = "exit"

[[patches.steps]]
op = "insert"
instructions = [{ capture = "exit", as = "load-local" }]
"#;

fn counter_body() -> MethodBody {
    MethodBody::new(
        MethodTarget::new("Game.Counter", "tick"),
        vec![
            Instruction::branch(Opcode::BrFalse, Label(0)),
            Instruction::ldloc(0),
            Instruction::ldc_i4(1),
            Instruction::new(Opcode::Add),
            Instruction::stloc(0),
            Instruction::new(Opcode::Ret).labeled(Label(0)),
        ],
    )
    .with_locals(["System.Int32"])
}

/// Temp workspace with `listings/`, and `patches/` holding `patch`.
fn setup_workspace(patch: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let listings = dir.path().join("listings");
    fs::create_dir(&listings).unwrap();
    write_listing_atomic(&listings.join("counter.json"), &counter_body()).unwrap();

    let patches = dir.path().join("patches");
    fs::create_dir(&patches).unwrap();
    fs::write(patches.join("test.toml"), patch).unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_il-patcher"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["apply", "check", "show", "fingerprint", "list"] {
        assert!(stdout.contains(command), "missing {command}: {stdout}");
    }
}

#[test]
fn test_check_does_not_write() {
    let dir = setup_workspace(PATCH);
    let output = run(dir.path(), &["check", "--listings", "listings", "--diff"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("Would apply to Game.Counter::tick"), "{stdout}");
    assert!(stdout.contains("+0005  L0: call Mod.Hooks::OnExit"), "{stdout}");
    assert!(!dir.path().join("patched").exists());
}

#[test]
fn test_apply_writes_rewritten_listing() {
    let dir = setup_workspace(PATCH);
    let output = run(
        dir.path(),
        &[
            "apply",
            "--listings",
            "listings",
            "--patches",
            "patches/test.toml",
            "--out",
            "out",
            "--host-version",
            "1.2",
        ],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("1 applied"), "{stdout}");

    let target = MethodTarget::new("Game.Counter", "tick");
    let written = dir.path().join("out").join(listing_file_name(&target));
    let body = read_listing(&written).unwrap();
    assert_eq!(body.len(), 7);
    assert_eq!(body.instructions[5].labels, vec![Label(0)]);
    assert!(body.instructions[6].labels.is_empty());
}

#[test]
fn test_version_mismatch_skips() {
    let dir = setup_workspace(PATCH);
    let output = run(
        dir.path(),
        &["check", "--listings", "listings", "--host-version", "0.9"],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("1 skipped"), "{stdout}");
}

#[test]
fn test_failed_patch_exits_nonzero() {
    let dir = setup_workspace(BROKEN_PATCH);
    let output = run(dir.path(), &["apply", "--listings", "listings", "--out", "out"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("wrong-landmark"), "{stderr}");
    assert!(stderr.contains("not found"), "{stderr}");
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_landmark_miss_is_reported_as_conflict() {
    let dir = setup_workspace(BROKEN_PATCH);
    let output = run(dir.path(), &["check", "--listings", "listings"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CONFLICT"), "{stderr}");
}

#[test]
fn test_broken_script_is_not_reported_as_conflict() {
    let dir = setup_workspace(MISUSED_CAPTURE_PATCH);
    let output = run(dir.path(), &["check", "--listings", "listings"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ret-as-local"), "{stderr}");
    assert!(stderr.contains("as load-local"), "{stderr}");
    assert!(stderr.contains("The patch script itself is broken"), "{stderr}");
    assert!(!stderr.contains("CONFLICT"), "{stderr}");
}

#[test]
fn test_show_and_fingerprint() {
    let dir = setup_workspace(PATCH);

    let output = run(dir.path(), &["show", "listings/counter.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Game.Counter::tick"), "{stdout}");
    assert!(stdout.contains("0005  L0: ret"), "{stdout}");

    let output = run(dir.path(), &["fingerprint", "listings/counter.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let expected = format_fingerprint(counter_body().fingerprint());
    assert!(stdout.starts_with(&expected), "{stdout}");
}

#[test]
fn test_list_shows_patch_ids() {
    let dir = setup_workspace(PATCH);
    let output = run(dir.path(), &["list"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("test-patches"), "{stdout}");
    assert!(stdout.contains("mark-return: Game.Counter::tick"), "{stdout}");
}

#[test]
fn test_list_falls_back_to_bundled_patches() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["list"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("more-fertilizers"), "{stdout}");
    assert!(stdout.contains("fish-pond-growth"), "{stdout}");
}

fn insert_before_ret(patch_id: &str, opcode: &str) -> String {
    format!(
        r#"
[meta]
name = "{patch_id}-set"

[[patches]]
id = "{patch_id}"
target = {{ type = "Game.Counter", method = "tick" }}

[[patches.steps]]
op = "find-next"
pattern = [{{ match = "opcode", opcode = "ret" }}]

[[patches.steps]]
op = "get-labels"
into = "exit"

[[patches.steps]]
op = "insert"
with_labels = "exit"
instructions = [{{ opcode = "{opcode}" }}]
"#
    )
}

#[test]
fn test_later_patch_file_builds_on_earlier_output() {
    let dir = setup_workspace(&insert_before_ret("first", "nop"));
    fs::write(
        dir.path().join("patches/z.toml"),
        insert_before_ret("second", "ldnull"),
    )
    .unwrap();

    let output = run(dir.path(), &["apply", "--listings", "listings", "--out", "out"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("2 applied"), "{stdout}");

    let target = MethodTarget::new("Game.Counter", "tick");
    let body = read_listing(&dir.path().join("out").join(listing_file_name(&target))).unwrap();
    let ops: Vec<Opcode> = body.instructions.iter().map(|insn| insn.opcode).collect();
    assert_eq!(
        ops,
        vec![
            Opcode::BrFalse,
            Opcode::LdLoc,
            Opcode::LdcI4,
            Opcode::Add,
            Opcode::StLoc,
            Opcode::Nop,
            Opcode::LdNull,
            Opcode::Ret,
        ]
    );
    assert_eq!(body.instructions[5].labels, vec![Label(0)]);
}

#[test]
fn test_check_chains_patch_files_in_order() {
    let dir = setup_workspace(&insert_before_ret("first", "nop"));
    fs::write(
        dir.path().join("patches/z.toml"),
        insert_before_ret("second", "ldnull"),
    )
    .unwrap();

    let output = run(dir.path(), &["check", "--listings", "listings", "--diff"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("+0005  L0: nop"), "{stdout}");
    assert!(stdout.contains("+0006  ldnull"), "{stdout}");
    assert!(!stdout.contains("+0005  L0: ldnull"), "{stdout}");
}
