//! Runtime service contract
//!
//! Names and references shared between the weaver, which emits calls to the
//! hot-reload runtime, and the runtime, which implements them. Both sides
//! must agree on these exactly.

use crate::builder::{MethodBuilder, TypeBuilder};
use crate::corlib;
use crate::instruction::{MethodRef, TypeRef};
use crate::module::{Module, PropertyDef};

/// Module providing the runtime services
pub const RUNTIME_MODULE: &str = "HotReloading.Core";
/// Static class exposing the registry lookups
pub const RUNTIME_TYPE: &str = "HotReloading.Core.Runtime";
/// Produces the initial per-instance method map
pub const GET_INITIAL_INSTANCE_METHODS: &str = "GetInitialInstanceMethods";
/// Looks up a replacement for a static method
pub const GET_METHOD_DELEGATE: &str = "GetMethodDelegate";

/// Capability interface implemented by woven classes
pub const INSTANCE_CLASS_INTERFACE: &str = "HotReloading.Core.IInstanceClass";
/// Accessor property of the capability interface
pub const INSTANCE_METHODS_PROPERTY: &str = "InstanceMethods";
/// Getter of [`INSTANCE_METHODS_PROPERTY`]
pub const INSTANCE_METHODS_GETTER: &str = "get_InstanceMethods";
/// Backing field of the per-instance method map
pub const INSTANCE_METHODS_FIELD: &str = "instanceMethods";
/// Helper returning the delegate for a key or null
pub const GET_INSTANCE_METHOD: &str = "GetInstanceMethod";
/// Field receiving captured constructor arguments
pub const CTOR_PARAMETERS_FIELD: &str = "hotReloading_Ctor_Parameters";
/// Prefix of base-call shims
pub const BASE_CALL_PREFIX: &str = "HotReloadingBase_";

/// Reference to the capability interface
pub fn instance_class() -> TypeRef {
    TypeRef::class(INSTANCE_CLASS_INTERFACE)
}

/// Reference to the method map type
pub fn method_map() -> TypeRef {
    TypeRef::class(corlib::METHOD_MAP)
}

/// Reference to the constructor argument list type
pub fn array_list() -> TypeRef {
    TypeRef::class(corlib::ARRAY_LIST)
}

/// `Runtime.GetInitialInstanceMethods(IInstanceClass)`
pub fn get_initial_instance_methods() -> MethodRef {
    MethodRef::static_method(
        TypeRef::class(RUNTIME_TYPE),
        GET_INITIAL_INSTANCE_METHODS,
        method_map(),
        vec![instance_class()],
    )
}

/// `Runtime.GetMethodDelegate(Type, string)`
pub fn get_method_delegate() -> MethodRef {
    MethodRef::static_method(
        TypeRef::class(RUNTIME_TYPE),
        GET_METHOD_DELEGATE,
        TypeRef::delegate(),
        vec![TypeRef::system_type(), TypeRef::string()],
    )
}

/// `IInstanceClass.get_InstanceMethods()`
pub fn interface_getter() -> MethodRef {
    MethodRef::instance(
        instance_class(),
        INSTANCE_METHODS_GETTER,
        method_map(),
        vec![],
    )
}

/// `Object.GetType()`
pub fn get_type() -> MethodRef {
    MethodRef::instance(TypeRef::object(), "GetType", TypeRef::system_type(), vec![])
}

/// `Type.GetTypeFromHandle(RuntimeTypeHandle)`
pub fn get_type_from_handle() -> MethodRef {
    MethodRef::static_method(
        TypeRef::system_type(),
        "GetTypeFromHandle",
        TypeRef::system_type(),
        vec![TypeRef::value(corlib::RUNTIME_TYPE_HANDLE)],
    )
}

/// `Type.GetMethodDeclaringType(string)`: nearest class on the chain
/// declaring an instance method with the key, or null
pub fn get_method_declaring_type() -> MethodRef {
    MethodRef::instance(
        TypeRef::system_type(),
        "GetMethodDeclaringType",
        TypeRef::system_type(),
        vec![TypeRef::string()],
    )
}

/// `Delegate.DynamicInvoke(object[])`
pub fn dynamic_invoke() -> MethodRef {
    MethodRef::instance(
        TypeRef::delegate(),
        "DynamicInvoke",
        TypeRef::object(),
        vec![TypeRef::object_array()],
    )
}

/// Method map `ContainsKey(string)`
pub fn map_contains_key() -> MethodRef {
    MethodRef::instance(
        method_map(),
        "ContainsKey",
        TypeRef::boolean(),
        vec![TypeRef::string()],
    )
}

/// Method map `get_Item(string)`
pub fn map_get_item() -> MethodRef {
    MethodRef::instance(
        method_map(),
        "get_Item",
        TypeRef::delegate(),
        vec![TypeRef::string()],
    )
}

/// `ArrayList..ctor()`
pub fn array_list_ctor() -> MethodRef {
    MethodRef::constructor(array_list(), vec![])
}

/// `ArrayList.Add(object)`
pub fn array_list_add() -> MethodRef {
    MethodRef::instance(array_list(), "Add", TypeRef::int32(), vec![TypeRef::object()])
}

/// Build the runtime contract module the weaver references
pub fn module() -> Module {
    let mut module = Module::new(RUNTIME_MODULE);
    module.add_type(
        TypeBuilder::interface(INSTANCE_CLASS_INTERFACE)
            .method(
                MethodBuilder::new(INSTANCE_METHODS_GETTER)
                    .abstract_member()
                    .special_name()
                    .returns(method_map())
                    .build(),
            )
            .property(PropertyDef {
                name: INSTANCE_METHODS_PROPERTY.to_string(),
                property_type: method_map(),
                getter: Some(INSTANCE_METHODS_GETTER.to_string()),
                setter: None,
            })
            .build(),
    );
    module.add_type(
        TypeBuilder::class(RUNTIME_TYPE)
            .abstract_type()
            .sealed()
            .method(
                MethodBuilder::new(GET_INITIAL_INSTANCE_METHODS)
                    .static_member()
                    .internal_call()
                    .param("instance", instance_class())
                    .returns(method_map())
                    .build(),
            )
            .method(
                MethodBuilder::new(GET_METHOD_DELEGATE)
                    .static_member()
                    .internal_call()
                    .param("type", TypeRef::system_type())
                    .param("methodKey", TypeRef::string())
                    .returns(TypeRef::delegate())
                    .build(),
            )
            .build(),
    );
    module.add_reference(corlib::MODULE_NAME);
    module
}
