//! Core library
//!
//! Names and definitions of the root types every module implicitly links
//! against. Method bodies that the runtime provides are marked internal-call.

use crate::builder::{MethodBuilder, TypeBuilder};
use crate::instruction::{Instruction, TypeRef};
use crate::module::Module;

/// Name of the core library module
pub const MODULE_NAME: &str = "System.Runtime";

/// `System.Object`
pub const OBJECT: &str = "System.Object";
/// `System.Void`
pub const VOID: &str = "System.Void";
/// `System.String`
pub const STRING: &str = "System.String";
/// `System.Boolean`
pub const BOOLEAN: &str = "System.Boolean";
/// `System.Int32`
pub const INT32: &str = "System.Int32";
/// `System.Int64`
pub const INT64: &str = "System.Int64";
/// `System.Double`
pub const DOUBLE: &str = "System.Double";
/// `System.ValueType`
pub const VALUE_TYPE: &str = "System.ValueType";
/// `System.Enum`
pub const ENUM: &str = "System.Enum";
/// `System.Type`
pub const TYPE: &str = "System.Type";
/// `System.RuntimeTypeHandle`
pub const RUNTIME_TYPE_HANDLE: &str = "System.RuntimeTypeHandle";
/// `System.Delegate`
pub const DELEGATE: &str = "System.Delegate";
/// `System.MulticastDelegate`
pub const MULTICAST_DELEGATE: &str = "System.MulticastDelegate";
/// `System.Collections.ArrayList`
pub const ARRAY_LIST: &str = "System.Collections.ArrayList";
/// Key to delegate dictionary used for per-instance method maps
pub const METHOD_MAP: &str = "System.Collections.Generic.Dictionary`2<System.String,System.Delegate>";
/// `System.Exception`
pub const EXCEPTION: &str = "System.Exception";

/// Name of the finalizer method
pub const FINALIZE: &str = "Finalize";

/// Check if a type name belongs to the core library
pub fn is_core_type(name: &str) -> bool {
    module_type_names().any(|n| n == name)
}

fn module_type_names() -> impl Iterator<Item = &'static str> {
    [
        OBJECT,
        VALUE_TYPE,
        ENUM,
        STRING,
        TYPE,
        DELEGATE,
        MULTICAST_DELEGATE,
        ARRAY_LIST,
        METHOD_MAP,
        EXCEPTION,
    ]
    .into_iter()
}

/// Build the core library module
pub fn module() -> Module {
    let object = TypeRef::object();
    let mut module = Module::new(MODULE_NAME);

    module.add_type(
        TypeBuilder::root(OBJECT)
            .method(
                MethodBuilder::constructor()
                    .code(vec![Instruction::ret()])
                    .build(),
            )
            .method(
                MethodBuilder::new("ToString")
                    .virtual_slot()
                    .internal_call()
                    .returns(TypeRef::string())
                    .build(),
            )
            .method(
                MethodBuilder::new("Equals")
                    .virtual_slot()
                    .internal_call()
                    .param("obj", object.clone())
                    .returns(TypeRef::boolean())
                    .build(),
            )
            .method(
                MethodBuilder::new("GetHashCode")
                    .virtual_slot()
                    .internal_call()
                    .returns(TypeRef::int32())
                    .build(),
            )
            .method(
                MethodBuilder::new(FINALIZE)
                    .virtual_slot()
                    .family()
                    .internal_call()
                    .build(),
            )
            .method(
                MethodBuilder::new("GetType")
                    .internal_call()
                    .returns(TypeRef::system_type())
                    .build(),
            )
            .build(),
    );

    module.add_type(TypeBuilder::class(VALUE_TYPE).abstract_type().build());
    module.add_type(
        TypeBuilder::class(ENUM)
            .abstract_type()
            .extends(TypeRef::class(VALUE_TYPE))
            .build(),
    );
    module.add_type(TypeBuilder::class(STRING).sealed().build());

    module.add_type(
        TypeBuilder::class(TYPE)
            .abstract_type()
            .method(
                MethodBuilder::new("GetTypeFromHandle")
                    .static_member()
                    .internal_call()
                    .param("handle", TypeRef::value(RUNTIME_TYPE_HANDLE))
                    .returns(TypeRef::system_type())
                    .build(),
            )
            .method(
                MethodBuilder::new("GetMethodDeclaringType")
                    .internal_call()
                    .param("key", TypeRef::string())
                    .returns(TypeRef::system_type())
                    .build(),
            )
            .build(),
    );

    module.add_type(
        TypeBuilder::class(DELEGATE)
            .abstract_type()
            .method(
                MethodBuilder::new("DynamicInvoke")
                    .internal_call()
                    .param("args", TypeRef::object_array())
                    .returns(object.clone())
                    .build(),
            )
            .build(),
    );
    module.add_type(
        TypeBuilder::class(MULTICAST_DELEGATE)
            .abstract_type()
            .extends(TypeRef::delegate())
            .build(),
    );

    module.add_type(
        TypeBuilder::class(ARRAY_LIST)
            .method(MethodBuilder::constructor().internal_call().build())
            .method(
                MethodBuilder::new("Add")
                    .virtual_slot()
                    .internal_call()
                    .param("value", object.clone())
                    .returns(TypeRef::int32())
                    .build(),
            )
            .method(
                MethodBuilder::new("get_Count")
                    .virtual_slot()
                    .special_name()
                    .internal_call()
                    .returns(TypeRef::int32())
                    .build(),
            )
            .method(
                MethodBuilder::new("get_Item")
                    .virtual_slot()
                    .special_name()
                    .internal_call()
                    .param("index", TypeRef::int32())
                    .returns(object.clone())
                    .build(),
            )
            .build(),
    );

    let string = TypeRef::string();
    module.add_type(
        TypeBuilder::class(METHOD_MAP)
            .method(MethodBuilder::constructor().internal_call().build())
            .method(
                MethodBuilder::new("ContainsKey")
                    .internal_call()
                    .param("key", string.clone())
                    .returns(TypeRef::boolean())
                    .build(),
            )
            .method(
                MethodBuilder::new("get_Item")
                    .special_name()
                    .internal_call()
                    .param("key", string.clone())
                    .returns(TypeRef::delegate())
                    .build(),
            )
            .method(
                MethodBuilder::new("set_Item")
                    .special_name()
                    .internal_call()
                    .param("key", string)
                    .param("value", TypeRef::delegate())
                    .build(),
            )
            .build(),
    );

    module.add_type(
        TypeBuilder::class(EXCEPTION)
            .method(
                MethodBuilder::constructor()
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::call(crate::instruction::MethodRef::constructor(
                            object,
                            vec![],
                        )),
                        Instruction::ret(),
                    ])
                    .build(),
            )
            .build(),
    );

    module
}
