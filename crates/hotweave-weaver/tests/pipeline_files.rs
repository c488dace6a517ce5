//! File-level weaving: in-place and redirected output, symbols, references

mod common;

use common::*;
use hotweave_bytecode::{
    DebugSymbols, Instruction, MethodBuilder, MethodSymbols, Module, SequencePoint, TypeBuilder,
    TypeRef,
};
use hotweave_weaver::{WeaveError, WeaveOptions, WeavePolicy, Weaver};
use std::path::Path;

fn write_module(path: &Path, module: &Module) {
    std::fs::write(path, module.encode()).unwrap();
}

fn speak_symbols() -> DebugSymbols {
    let mut symbols = DebugSymbols::new();
    let file = symbols.add_source_file("src/Animal.cs");
    symbols.methods.push(MethodSymbols {
        type_name: "Zoo.Animal".to_string(),
        method_key: "Speak()".to_string(),
        source_file_index: file,
        points: vec![
            SequencePoint {
                instruction: 0,
                line: 12,
                column: 9,
            },
            SequencePoint {
                instruction: 2,
                line: 13,
                column: 9,
            },
        ],
    });
    symbols
}

// ===== In-place and redirected output =====

#[test]
fn test_weave_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Zoo.hwm");
    write_module(&path, &zoo());

    let weaver = Weaver::new(WeaveOptions::new(&path), WeavePolicy::default());
    let report = weaver.execute().unwrap();
    assert!(report.methods_woven > 0);

    let woven = Module::load(&path).unwrap();
    assert!(woven.is_woven());
    assert!(!DebugSymbols::path_for(&path).exists());

    // A second pass is refused and leaves the file alone
    let before = std::fs::read(&path).unwrap();
    assert!(matches!(weaver.execute(), Err(WeaveError::AlreadyWoven(_))));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_project_dir_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Zoo.hwm");
    write_module(&input, &zoo());

    let mut options = WeaveOptions::new("Zoo.hwm");
    options.project_dir = Some(dir.path().to_path_buf());
    options.output = Some(dir.path().join("Zoo.woven.hwm"));
    Weaver::new(options, WeavePolicy::default()).execute().unwrap();

    assert!(!Module::load(&input).unwrap().is_woven());
    assert!(Module::load(&dir.path().join("Zoo.woven.hwm"))
        .unwrap()
        .is_woven());
}

// ===== Debug symbols =====

#[test]
fn test_sequence_points_follow_original_instructions() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Zoo.hwm");
    let output = dir.path().join("Zoo.out.hwm");
    write_module(&input, &zoo());
    std::fs::write(DebugSymbols::path_for(&input), speak_symbols().encode()).unwrap();

    let mut options = WeaveOptions::new(&input);
    options.output = Some(output.clone());
    options.debug_symbols = true;
    Weaver::new(options, WeavePolicy::default()).execute().unwrap();

    let module = Module::load(&output).unwrap();
    assert!(module.flags & hotweave_bytecode::module::flags::HAS_DEBUG_INFO != 0);
    let animal = module.type_def(module.find_type("Zoo.Animal").unwrap());
    let code = &animal.find_method("Speak", &[]).unwrap().body.instructions;
    let original_start = code
        .iter()
        .position(|i| *i == Instruction::ldstr("..."))
        .unwrap() as u32;

    let symbols = DebugSymbols::read_from(&DebugSymbols::path_for(&output)).unwrap();
    let points = &symbols.find("Zoo.Animal", "Speak()").unwrap().points;
    assert_eq!(points[0].instruction, original_start);
    assert_eq!(points[1].instruction, original_start + 2);
    assert_eq!(points[1].line, 13);
}

#[test]
fn test_debug_type_none_writes_no_symbols() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Zoo.hwm");
    write_module(&path, &zoo());

    let mut options = WeaveOptions::new(&path);
    options.debug_type = Some("none".to_string());
    Weaver::new(options, WeavePolicy::default()).execute().unwrap();
    assert!(!DebugSymbols::path_for(&path).exists());
}

// ===== References =====

fn creature_module() -> Module {
    let mut module = Module::new("Zoo.Common");
    module.add_type(
        TypeBuilder::class("Zoo.Creature")
            .method(
                MethodBuilder::constructor()
                    .code(vec![Instruction::ret()])
                    .build(),
            )
            .method(
                MethodBuilder::new("Eat")
                    .virtual_slot()
                    .code(vec![Instruction::ret()])
                    .build(),
            )
            .build(),
    );
    module
}

fn pet_module() -> Module {
    let mut module = Module::new("Zoo.Pets");
    module.add_reference("Zoo.Common");
    module.add_type(
        TypeBuilder::class("Zoo.Cat")
            .extends(TypeRef::class("Zoo.Creature"))
            .build(),
    );
    module
}

#[test]
fn test_base_type_from_referenced_module() {
    let dir = tempfile::tempdir().unwrap();
    write_module(&dir.path().join("Zoo.Common.hwm"), &creature_module());
    let path = dir.path().join("Zoo.Pets.hwm");
    write_module(&path, &pet_module());

    let mut options = WeaveOptions::new(&path);
    options.allow_override = true;
    let report = Weaver::new(options, WeavePolicy::default())
        .execute()
        .unwrap();
    assert!(report.overrides_synthesized >= 1);

    let module = Module::load(&path).unwrap();
    let cat = module.type_def(module.find_type("Zoo.Cat").unwrap());
    assert!(cat.find_method("Eat", &[]).is_some());
    assert!(cat.find_method("HotReloadingBase_Eat", &[]).is_some());
}

#[test]
fn test_unresolvable_base_type_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Zoo.Pets.hwm");
    write_module(&path, &pet_module());

    let mut options = WeaveOptions::new(&path);
    options.allow_override = true;
    let result = Weaver::new(options, WeavePolicy::default()).execute();
    assert!(matches!(result, Err(WeaveError::Resolve(_))));
    assert!(!Module::load(&path).unwrap().is_woven());
}

#[test]
fn test_missing_reference_directory_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Zoo.hwm");
    write_module(&path, &zoo());

    let mut options = WeaveOptions::new(&path);
    options.references = "does/not/exist/Lib.hwm;".to_string();
    assert!(Weaver::new(options, WeavePolicy::default()).execute().is_ok());
}
