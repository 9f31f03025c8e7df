//! The bundled fertilizer patches against hand-built bodies shaped like the
//! host methods they target.

use il_patcher::config::{apply_patches, check_patches, load_bundled, PatchResult};
use il_patcher::host::MemoryHost;
use il_patcher::il::{
    FieldRef, Instruction, Label, MethodBody, MethodRef, MethodTarget, Opcode, TypeRef,
};

const FISH_POND: &str = "StardewValley.Buildings.FishPond";
const GAME_LOCATION: &str = "StardewValley.GameLocation";
const FRUIT_TREE: &str = "StardewValley.TerrainFeatures.FruitTree";
const DGA_FRUIT_TREE: &str = "DynamicGameAssets.Game.CustomFruitTree";
const AUTOMATE_MACHINE: &str =
    "Pathoschild.Stardew.Automate.Framework.GenericObjectMachine`1<StardewValley.Object>";
const HOOKS: &str = "MoreFertilizers.Hooks";
const NET_INT: &str = "Netcode.NetFieldBase`2<System.Int32,Netcode.NetInt>";

fn hook(name: &str) -> MethodRef {
    MethodRef::new(HOOKS, name)
}

fn calls(insn: &Instruction, method: &MethodRef) -> bool {
    insn.method_ref().is_some_and(|m| m.same_method(method))
}

fn fish_pond_day_update() -> MethodBody {
    let days = FieldRef::new(FISH_POND, "daysSinceSpawn");
    MethodBody::new(
        MethodTarget::new(FISH_POND, "dayUpdate"),
        vec![
            Instruction::ldc_i4(17),
            Instruction::method(
                Opcode::NewObj,
                MethodRef::new("System.Random", ".ctor").with_params(["System.Int32"]),
            ),
            Instruction::stloc(0),
            Instruction::ldarg(0),
            Instruction::field(Opcode::LdFld, days.clone()),
            Instruction::ldarg(0),
            Instruction::field(Opcode::LdFld, days),
            Instruction::method(Opcode::CallVirt, MethodRef::new(NET_INT, "get_Value")),
            Instruction::ldc_i4(1).labeled(Label(0)),
            Instruction::new(Opcode::Add),
            Instruction::method(Opcode::CallVirt, MethodRef::new(NET_INT, "set_Value")),
            Instruction::branch(Opcode::Br, Label(0)),
            Instruction::new(Opcode::Ret),
        ],
    )
    .with_params([FISH_POND])
    .with_locals(["System.Random", "System.Int32"])
}

fn get_fish() -> MethodBody {
    let chance_slot = 0;
    MethodBody::new(
        MethodTarget::new(GAME_LOCATION, "getFish"),
        vec![
            Instruction::field(Opcode::LdsFld, FieldRef::new("StardewValley.Game1", "content")),
            Instruction::ldstr("Data\\Fish"),
            Instruction::method(Opcode::CallVirt, MethodRef::new("ContentManager", "Load")),
            Instruction::stloc(1),
            Instruction::ldloc(chance_slot),
            Instruction::ldc_r8(1.1),
            Instruction::new(Opcode::Mul),
            Instruction::stloc(chance_slot),
            Instruction::ldloc(chance_slot).labeled(Label(1)),
            Instruction::ldc_r8(0.9),
            Instruction::call(
                MethodRef::new("System.Math", "Min")
                    .with_params(["System.Double", "System.Double"]),
            ),
            Instruction::stloc(chance_slot),
            Instruction::branch(Opcode::BrTrue, Label(1)),
            Instruction::new(Opcode::Ret),
        ],
    )
    .with_params([GAME_LOCATION])
    .with_locals(["System.Double", "System.Object"])
}

fn fruit_tree_day_update(declaring_type: &str) -> MethodBody {
    MethodBody::new(
        MethodTarget::new(declaring_type, "dayUpdate"),
        vec![
            Instruction::ldarg(0),
            Instruction::ldarg(1),
            Instruction::call(MethodRef::new(FRUIT_TREE, "IsGrowthBlocked")),
            Instruction::stloc(0),
            Instruction::ldarg(0),
            Instruction::field(Opcode::LdFld, FieldRef::new(FRUIT_TREE, "daysUntilMature")),
            Instruction::new(Opcode::Dup),
            Instruction::method(Opcode::CallVirt, MethodRef::new(NET_INT, "get_Value")),
            Instruction::stloc(1),
            Instruction::ldloc(1),
            Instruction::ldc_i4(1),
            Instruction::new(Opcode::Sub),
            Instruction::method(Opcode::CallVirt, MethodRef::new(NET_INT, "set_Value")),
            Instruction::new(Opcode::Ret),
        ],
    )
    .with_locals(["System.Boolean", "System.Int32"])
}

fn fruit_tree_draw(declaring_type: &str) -> MethodBody {
    MethodBody::new(
        MethodTarget::new(declaring_type, "draw"),
        vec![
            Instruction::ldarg(0),
            Instruction::field(Opcode::LdFld, FieldRef::new(FRUIT_TREE, "growthStage")),
            Instruction::call(MethodRef::new(NET_INT, "op_Implicit")),
            Instruction::ldc_i4(4),
            Instruction::branch(Opcode::Bge, Label(2)),
            Instruction::ldarg(1),
            Instruction::call(MethodRef::new("Microsoft.Xna.Framework.Color", "get_White")),
            Instruction::method(
                Opcode::CallVirt,
                MethodRef::new("Microsoft.Xna.Framework.Graphics.SpriteBatch", "Draw"),
            ),
            Instruction::new(Opcode::Ret).labeled(Label(2)),
        ],
    )
}

fn generic_pull_recipe() -> MethodBody {
    MethodBody::new(
        MethodTarget::new(AUTOMATE_MACHINE, "GenericPullRecipe"),
        vec![
            Instruction::ldarg(0),
            Instruction::call(MethodRef::new(AUTOMATE_MACHINE, "get_Machine")),
            Instruction::typed(Opcode::Box, TypeRef::new("StardewValley.Object")),
            Instruction::ldarg(1),
            Instruction::method(Opcode::CallVirt, MethodRef::new("IStorage", "TryGetIngredient")),
            Instruction::branch(Opcode::BrTrue, Label(4)),
            Instruction::ldc_i4(0),
            Instruction::new(Opcode::Ret),
            Instruction::ldc_i4(1).labeled(Label(4)),
            Instruction::new(Opcode::Ret),
        ],
    )
}

fn vanilla_host() -> MemoryHost {
    MemoryHost::new()
        .with_method(fish_pond_day_update())
        .with_method(get_fish())
        .with_method(fruit_tree_day_update(FRUIT_TREE))
        .with_method(fruit_tree_draw(FRUIT_TREE))
}

fn result_of<'a>(
    report: &'a il_patcher::config::PatchReport,
    id: &str,
) -> &'a Result<PatchResult, il_patcher::config::ApplicationError> {
    report
        .results
        .iter()
        .find(|(patch_id, _)| patch_id == id)
        .map(|(_, result)| result)
        .unwrap_or_else(|| panic!("no result for {id}"))
}

#[test]
fn test_bundled_file_loads() {
    let config = load_bundled().unwrap();
    assert_eq!(config.meta.name, "more-fertilizers");
    assert_eq!(config.patches.len(), 7);
    assert!(config
        .patches
        .iter()
        .filter(|p| p.target.declaring_type == DGA_FRUIT_TREE)
        .all(|p| p.optional));
}

#[test]
fn test_vanilla_host_applies_required_patches() {
    let config = load_bundled().unwrap();
    let mut host = vanilla_host();
    let source = host.clone();

    let report = apply_patches(&config, &source, &mut host, Some("1.5.6.22018"));
    assert!(report.is_success(), "{:#?}", report.results);
    assert_eq!(report.applied(), 4);
    // Both DGA patches and the Automate patch target methods that are absent.
    assert_eq!(report.skipped(), 3);
    assert!(matches!(
        result_of(&report, "automate-organic"),
        Ok(PatchResult::SkippedMissing { .. })
    ));
    assert_eq!(host.installed_targets().count(), 4);
}

#[test]
fn test_fish_pond_growth_hook() {
    let config = load_bundled().unwrap();
    let mut host = vanilla_host();
    let source = host.clone();
    apply_patches(&config, &source, &mut host, None);

    let body = host
        .installed(&MethodTarget::new(FISH_POND, "dayUpdate"))
        .unwrap();
    let insns = &body.instructions;
    assert_eq!(insns.len(), 15);

    // The branch that targeted the constant now lands on the hook's arguments.
    assert_eq!(insns[8], Instruction::ldloc(0).labeled(Label(0)));
    assert!(insns[9].same_code(&Instruction::ldarg(0)));
    assert!(calls(&insns[10], &hook("GetAdditionalGrowthFactor")));
    assert!(insns[10].labels.is_empty());
    assert!(insns[11].same_code(&Instruction::new(Opcode::Add)));
}

#[test]
fn test_fish_catch_chance_hook() {
    let config = load_bundled().unwrap();
    let report = check_patches(&config, &vanilla_host(), None);
    assert!(matches!(
        result_of(&report, "fish-catch-chance"),
        Ok(PatchResult::Applied { .. })
    ));

    let rendered = report
        .bodies
        .iter()
        .find(|r| r.body.target.method == "getFish")
        .unwrap();
    let insns = &rendered.body.instructions;
    assert_eq!(insns.len(), 18);
    assert_eq!(insns[8], Instruction::ldloc(0).labeled(Label(1)));
    assert!(insns[9].same_code(&Instruction::ldarg(0)));
    assert!(calls(&insns[10], &hook("AlterFishChance")));
    assert!(insns[11].same_code(&Instruction::stloc(0)));
    // The original clamp follows, unlabelled.
    assert!(insns[12].same_code(&Instruction::ldloc(0)));
    assert!(insns[12].labels.is_empty());
    assert_eq!(rendered.summary.inserted, 4);
}

#[test]
fn test_fruit_tree_growth_and_color_hooks() {
    let config = load_bundled().unwrap();
    let report = check_patches(&config, &vanilla_host(), None);

    let growth = report
        .bodies
        .iter()
        .find(|r| r.body.target == MethodTarget::new(FRUIT_TREE, "dayUpdate"))
        .unwrap();
    let insns = &growth.body.instructions;
    assert!(insns[10].same_code(&Instruction::ldc_i4(1)));
    assert!(insns[11].same_code(&Instruction::ldarg(0)));
    assert!(calls(&insns[12], &hook("CalculateExtraGrowth")));
    assert!(insns[13].same_code(&Instruction::new(Opcode::Add)));
    assert!(insns[14].same_code(&Instruction::new(Opcode::Sub)));

    let draw = report
        .bodies
        .iter()
        .find(|r| r.body.target == MethodTarget::new(FRUIT_TREE, "draw"))
        .unwrap();
    let insns = &draw.body.instructions;
    assert_eq!(insns.len(), 11);
    assert!(calls(&insns[8], &hook("ReplaceColorIfNeeded")));
    assert_eq!(insns[10], Instruction::new(Opcode::Ret).labeled(Label(2)));
}

#[test]
fn test_dga_trees_are_patched_when_present() {
    let config = load_bundled().unwrap();
    let host = vanilla_host()
        .with_method(fruit_tree_day_update(DGA_FRUIT_TREE))
        .with_method(fruit_tree_draw(DGA_FRUIT_TREE));

    let report = check_patches(&config, &host, None);
    assert!(report.is_success(), "{:#?}", report.results);
    assert_eq!(report.applied(), 6);
    assert!(report
        .patched
        .contains(&MethodTarget::new(DGA_FRUIT_TREE, "draw")));
}

#[test]
fn test_automate_machine_copies_the_landmark() {
    let config = load_bundled().unwrap();
    let host = vanilla_host().with_method(generic_pull_recipe());

    let report = check_patches(&config, &host, None);
    assert!(matches!(
        result_of(&report, "automate-organic"),
        Ok(PatchResult::Applied { .. })
    ));

    let rendered = report
        .bodies
        .iter()
        .find(|r| r.body.target.method == "GenericPullRecipe")
        .unwrap();
    let insns = &rendered.body.instructions;
    assert_eq!(insns.len(), 20);

    // The success branch now enters the copied machine load.
    assert_eq!(insns[8], Instruction::ldarg(0).labeled(Label(4)));
    assert!(insns[9].same_code(&insns[1]));
    assert!(insns[10].same_code(&insns[2]));
    assert!(calls(&insns[16], &hook("MakeOrganic")));
    assert!(insns[18].same_code(&Instruction::ldc_i4(1)));
    assert!(insns[18].labels.is_empty());
    assert!(insns[19].same_code(&Instruction::new(Opcode::Ret)));
}

#[test]
fn test_changed_host_method_fails_soft() {
    let config = load_bundled().unwrap();
    let mut changed = get_fish();
    // A newer host dropped the training-rod multiplier.
    changed.instructions[5] = Instruction::ldc_r8(1.2);
    let host = vanilla_host().with_method(changed.clone());

    let report = check_patches(&config, &host, None);
    let Err(err) = result_of(&report, "fish-catch-chance") else {
        panic!("landmark should be missing");
    };
    assert_eq!(err.step(), Some(2));
    assert!(report
        .bodies
        .iter()
        .all(|r| r.body.target != changed.target));

    // The other patches still apply.
    assert_eq!(report.applied(), 3);
}

#[test]
fn test_out_of_range_host_version_skips_everything() {
    let config = load_bundled().unwrap();
    let mut host = vanilla_host();
    let source = host.clone();

    let report = apply_patches(&config, &source, &mut host, Some("1.6.8"));
    assert_eq!(report.skipped(), 7);
    assert_eq!(host.installed_targets().count(), 0);
}
