//! Integration tests for the `hotweave` binary

use assert_cmd::Command;
use hotweave_bytecode::{Instruction, MethodBuilder, MethodRef, Module, Opcode, TypeBuilder, TypeRef};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn cart() -> TypeRef {
    TypeRef::class("Shop.Cart")
}

/// `Shop.Gift : Shop.Cart`, declared without members
fn shop_module() -> Module {
    let mut module = Module::new("Shop");
    module.add_type(
        TypeBuilder::class("Shop.Cart")
            .method(
                MethodBuilder::constructor()
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::call(MethodRef::constructor(TypeRef::object(), vec![])),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .method(
                MethodBuilder::new("Total")
                    .virtual_slot()
                    .returns(TypeRef::int32())
                    .code(vec![Instruction::ldc_i4(42), Instruction::ret()])
                    .build(),
            )
            .method(
                MethodBuilder::new("Tax")
                    .static_member()
                    .param("amount", TypeRef::int32())
                    .returns(TypeRef::int32())
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::ldc_i4(10),
                        Instruction::simple(Opcode::Div),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .build(),
    );
    module.add_type(
        TypeBuilder::class("Shop.Gift")
            .extends(cart())
            .method(
                MethodBuilder::constructor()
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::call(MethodRef::constructor(cart(), vec![])),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .build(),
    );
    module
}

fn setup() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Shop.hwm");
    std::fs::write(&path, shop_module().encode()).unwrap();
    (dir, path)
}

fn hotweave() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("hotweave").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn gift_has_total(path: &Path) -> bool {
    let module = Module::load(path).unwrap();
    let gift = module.type_def(module.find_type("Shop.Gift").unwrap());
    gift.find_method("Total", &[]).is_some()
}

// ===== weave =====

#[test]
fn test_weave_in_place() {
    let (_dir, path) = setup();

    hotweave()
        .arg("weave")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Woven"))
        .stdout(predicate::str::contains("methods"));

    assert!(Module::load(&path).unwrap().is_woven());
    assert!(!gift_has_total(&path));
}

#[test]
fn test_weave_twice_is_refused() {
    let (_dir, path) = setup();
    hotweave().arg("weave").arg(&path).assert().success();

    hotweave()
        .arg("weave")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already been woven"));
}

#[test]
fn test_weave_project_dir_and_output() {
    let (dir, path) = setup();

    hotweave()
        .args(["weave", "Shop.hwm", "--allow-override", "--output"])
        .arg(dir.path().join("Shop.woven.hwm"))
        .arg("--project-dir")
        .arg(dir.path())
        .assert()
        .success();

    assert!(!Module::load(&path).unwrap().is_woven());
    assert!(gift_has_total(&dir.path().join("Shop.woven.hwm")));
}

#[test]
fn test_weave_reads_config_from_project_dir() {
    let (dir, path) = setup();
    std::fs::write(
        dir.path().join("weave.toml"),
        "[options]\nallow_override = true\n",
    )
    .unwrap();

    hotweave()
        .args(["weave", "Shop.hwm", "--project-dir"])
        .arg(dir.path())
        .assert()
        .success();

    assert!(gift_has_total(&path));
}

#[test]
fn test_weave_invalid_config_fails() {
    let (dir, path) = setup();
    let config = dir.path().join("broken.toml");
    std::fs::write(&config, "[policy]\ndelegate_suffix = \"\"\n").unwrap();

    hotweave()
        .arg("weave")
        .arg(&path)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));

    assert!(!Module::load(&path).unwrap().is_woven());
}

#[test]
fn test_weave_missing_module_fails() {
    let dir = tempfile::tempdir().unwrap();
    hotweave()
        .arg("weave")
        .arg(dir.path().join("Nope.hwm"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_weave_verbose_logs_each_type() {
    let (_dir, path) = setup();
    hotweave()
        .args(["--verbose", "weave"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("Weaving Type: Shop.Cart"));
}

// ===== inspect =====

#[test]
fn test_inspect_lists_types() {
    let (_dir, path) = setup();

    hotweave()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Module Shop"))
        .stdout(predicate::str::contains("Shop.Gift : Shop.Cart"))
        .stdout(predicate::str::contains("Total()"))
        .stdout(predicate::str::contains("flags      none"));
}

#[test]
fn test_inspect_woven_type_detail() {
    let (_dir, path) = setup();
    hotweave().arg("weave").arg(&path).assert().success();

    hotweave()
        .args(["inspect", "--type", "Shop.Cart"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[replaceable]"))
        .stdout(predicate::str::contains("GetMethodDelegate"))
        .stdout(predicate::str::contains("ldc.i4 42"));
}

#[test]
fn test_inspect_unknown_type_fails() {
    let (_dir, path) = setup();
    hotweave()
        .args(["inspect", "--type", "Shop.Missing"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Shop.Missing"));
}

// ===== verify =====

#[test]
fn test_verify_woven_module() {
    let (_dir, path) = setup();
    hotweave().arg("weave").arg(&path).assert().success();

    hotweave()
        .arg("verify")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Verified"))
        .stdout(predicate::str::contains("not been woven").not());
}

#[test]
fn test_verify_notes_unwoven_module() {
    let (_dir, path) = setup();
    hotweave()
        .arg("verify")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("not been woven"));
}

#[test]
fn test_verify_detects_corruption() {
    let (_dir, path) = setup();
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    hotweave()
        .arg("verify")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));
}
