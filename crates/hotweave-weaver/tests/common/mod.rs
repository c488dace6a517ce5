//! Shared fixtures: a small zoo module

#![allow(dead_code)]

use hotweave_bytecode::{contract, FieldRef, Instruction, MethodBuilder, MethodRef, Module, Opcode, TypeBuilder, TypeRef};
use hotweave_weaver::{ModuleResolver, WeaveOptions, WeavePolicy, WeaveReport, Weaver};

pub fn animal() -> TypeRef {
    TypeRef::class("Zoo.Animal")
}

pub fn dog() -> TypeRef {
    TypeRef::class("Zoo.Dog")
}

pub fn puppy() -> TypeRef {
    TypeRef::class("Zoo.Puppy")
}

pub fn math() -> TypeRef {
    TypeRef::class("Zoo.MathUtil")
}

pub fn dog_name() -> FieldRef {
    FieldRef::new(dog(), "name", TypeRef::string())
}

pub fn dog_age() -> FieldRef {
    FieldRef::new(dog(), "age", TypeRef::int32())
}

pub fn ctor_parameters(owner: TypeRef) -> FieldRef {
    FieldRef::new(owner, contract::CTOR_PARAMETERS_FIELD, contract::array_list())
}

pub fn dog_ctor() -> MethodRef {
    MethodRef::constructor(dog(), vec![TypeRef::string(), TypeRef::int32()])
}

pub fn speak(owner: TypeRef) -> MethodRef {
    MethodRef::instance(owner, "Speak", TypeRef::string(), vec![])
}

pub fn add() -> MethodRef {
    MethodRef::static_method(
        math(),
        "Add",
        TypeRef::int32(),
        vec![TypeRef::int32(), TypeRef::int32()],
    )
}

/// `Puppy : Dog : Animal`, declared derived-first, plus a static helper class
pub fn zoo() -> Module {
    let mut module = Module::new("Zoo");

    module.add_type(
        TypeBuilder::class("Zoo.Puppy")
            .extends(dog())
            .method(
                MethodBuilder::constructor()
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::ldstr("pup"),
                        Instruction::ldc_i4(0),
                        Instruction::call(dog_ctor()),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .build(),
    );

    module.add_type(
        TypeBuilder::class("Zoo.Dog")
            .extends(animal())
            .field("name", TypeRef::string())
            .field("age", TypeRef::int32())
            .method(
                MethodBuilder::constructor()
                    .param("name", TypeRef::string())
                    .param("age", TypeRef::int32())
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::call(MethodRef::constructor(animal(), vec![])),
                        Instruction::ldarg(0),
                        Instruction::ldarg(1),
                        Instruction::stfld(dog_name()),
                        Instruction::ldarg(0),
                        Instruction::ldarg(2),
                        Instruction::stfld(dog_age()),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .build(),
    );

    module.add_type(
        TypeBuilder::class("Zoo.Animal")
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
                MethodBuilder::new("Speak")
                    .virtual_slot()
                    .returns(TypeRef::string())
                    .local(TypeRef::string())
                    .code(vec![
                        Instruction::ldstr("..."),
                        Instruction::stloc(0),
                        Instruction::ldloc(0),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .build(),
    );

    module.add_type(
        TypeBuilder::class("Zoo.MathUtil")
            .method(
                MethodBuilder::new("Add")
                    .static_member()
                    .param("a", TypeRef::int32())
                    .param("b", TypeRef::int32())
                    .returns(TypeRef::int32())
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::ldarg(1),
                        Instruction::simple(Opcode::Add),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .build(),
    );

    module
}

/// Weave the zoo in memory
pub fn woven_zoo(allow_override: bool) -> (Module, WeaveReport) {
    let mut options = WeaveOptions::new("Zoo.hwm");
    options.allow_override = allow_override;
    let weaver = Weaver::new(options, WeavePolicy::default());
    let mut module = zoo();
    let report = weaver
        .weave_module(&mut module, &ModuleResolver::new(Vec::new()), None)
        .unwrap();
    (module, report)
}
