//! Integration tests for running modules loaded from disk

use hotweave_bytecode::{Instruction, MethodBuilder, MethodRef, Module, Opcode, TypeBuilder, TypeRef};
use hotweave_runtime::{HostRuntime, Interpreter, Value, VmError};

fn counter_module() -> Module {
    let mut module = Module::new("Demo");
    module.add_type(
        TypeBuilder::class("Demo.Counter")
            .method(
                MethodBuilder::new("Sum")
                    .static_member()
                    .param("n", TypeRef::int32())
                    .returns(TypeRef::int32())
                    .local(TypeRef::int32())
                    .code(vec![
                        // while (n > 0) { acc += n; n -= 1; }
                        Instruction::ldarg(0),
                        Instruction::ldc_i4(0),
                        Instruction::simple(Opcode::Cgt),
                        Instruction::brfalse(13),
                        Instruction::ldloc(0),
                        Instruction::ldarg(0),
                        Instruction::simple(Opcode::Add),
                        Instruction::stloc(0),
                        Instruction::ldarg(0),
                        Instruction::ldc_i4(1),
                        Instruction::simple(Opcode::Sub),
                        Instruction::starg(0),
                        Instruction::br(0),
                        Instruction::ldloc(0),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .method(
                MethodBuilder::new("Fail")
                    .static_member()
                    .code(vec![
                        Instruction::newobj(MethodRef::constructor(
                            TypeRef::class("System.Exception"),
                            vec![],
                        )),
                        Instruction::throw(),
                    ])
                    .build(),
            )
            .build(),
    );
    module
}

fn sum() -> MethodRef {
    MethodRef::static_method(
        TypeRef::class("Demo.Counter"),
        "Sum",
        TypeRef::int32(),
        vec![TypeRef::int32()],
    )
}

#[test]
fn test_run_module_loaded_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Demo.hwm");
    std::fs::write(&path, counter_module().encode()).unwrap();

    let module = Module::load(&path).unwrap();
    let mut vm = Interpreter::new(HostRuntime::new());
    vm.load(&module);

    assert_eq!(vm.call(&sum(), vec![Value::I32(4)]).unwrap(), Value::I32(10));
    assert_eq!(vm.call(&sum(), vec![Value::I32(0)]).unwrap(), Value::I32(0));
}

#[test]
fn test_throw_surfaces_exception_type() {
    let mut vm = Interpreter::new(HostRuntime::new());
    vm.load(&counter_module());

    let fail = MethodRef::static_method(
        TypeRef::class("Demo.Counter"),
        "Fail",
        TypeRef::void(),
        vec![],
    );
    match vm.call(&fail, vec![]) {
        Err(VmError::Thrown(name)) => assert_eq!(name, "System.Exception"),
        other => panic!("expected exception, got {:?}", other),
    }
}

#[test]
fn test_unknown_type() {
    let mut vm = Interpreter::new(HostRuntime::new());
    let missing = MethodRef::constructor(TypeRef::class("Demo.Missing"), vec![]);
    assert!(matches!(
        vm.construct(&missing, vec![]),
        Err(VmError::TypeNotFound(_))
    ));
}
