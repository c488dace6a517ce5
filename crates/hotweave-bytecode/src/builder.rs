//! Fluent builders for type and method definitions
//!
//! Used by the core library, the weaver's synthesized members and test
//! fixtures to assemble definitions without spelling out every field.

use crate::instruction::{Instruction, TypeRef};
use crate::module::{
    field_flags, method_flags, param_flags, type_flags, FieldDef, MethodBody, MethodDef,
    ParamDef, PropertyDef, TypeDef, CONSTRUCTOR_NAME,
};

/// Builder for [`TypeDef`]
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    def: TypeDef,
}

impl TypeBuilder {
    /// Public class deriving from `System.Object`
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            def: TypeDef::new(name, type_flags::PUBLIC, Some(TypeRef::object())),
        }
    }

    /// Public interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            def: TypeDef::new(
                name,
                type_flags::PUBLIC | type_flags::INTERFACE | type_flags::ABSTRACT,
                None,
            ),
        }
    }

    /// Root type without base (only `System.Object` has one)
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            def: TypeDef::new(name, type_flags::PUBLIC, None),
        }
    }

    /// Set the base type
    pub fn extends(mut self, base: TypeRef) -> Self {
        self.def.base = Some(base);
        self
    }

    /// Add type attribute flags
    pub fn flags(mut self, flags: u32) -> Self {
        self.def.attributes |= flags;
        self
    }

    /// Mark abstract
    pub fn abstract_type(self) -> Self {
        self.flags(type_flags::ABSTRACT)
    }

    /// Mark sealed
    pub fn sealed(self) -> Self {
        self.flags(type_flags::SEALED)
    }

    /// Value type deriving from `System.ValueType`
    pub fn value_type(self) -> Self {
        self.flags(type_flags::VALUE_TYPE | type_flags::SEALED)
            .extends(TypeRef::class(crate::corlib::VALUE_TYPE))
    }

    /// Add an implemented interface
    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.def.interfaces.push(interface);
        self
    }

    /// Add a custom attribute
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.def.custom_attributes.push(name.into());
        self
    }

    /// Add a private instance field
    pub fn field(mut self, name: impl Into<String>, field_type: TypeRef) -> Self {
        self.def.fields.push(FieldDef {
            name: name.into(),
            field_type,
            attributes: field_flags::PRIVATE,
        });
        self
    }

    /// Add a field with explicit attributes
    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.def.fields.push(field);
        self
    }

    /// Add a method
    pub fn method(mut self, method: MethodDef) -> Self {
        self.def.methods.push(method);
        self
    }

    /// Add a property
    pub fn property(mut self, property: PropertyDef) -> Self {
        self.def.properties.push(property);
        self
    }

    /// Finish the definition
    pub fn build(self) -> TypeDef {
        self.def
    }
}

/// Builder for [`MethodDef`]
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    def: MethodDef,
}

impl MethodBuilder {
    /// Public instance method returning `void`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            def: MethodDef::new(
                name,
                method_flags::PUBLIC | method_flags::HIDE_BY_SIG,
                TypeRef::void(),
            ),
        }
    }

    /// Public instance constructor
    pub fn constructor() -> Self {
        Self::new(CONSTRUCTOR_NAME)
            .flags(method_flags::SPECIAL_NAME | method_flags::RT_SPECIAL_NAME)
    }

    /// Add method attribute flags
    pub fn flags(mut self, flags: u32) -> Self {
        self.def.attributes |= flags;
        self
    }

    /// Replace the access level
    pub fn access(mut self, access: u32) -> Self {
        self.def.attributes =
            (self.def.attributes & !method_flags::ACCESS_MASK) | (access & method_flags::ACCESS_MASK);
        self
    }

    /// Private access
    pub fn private(self) -> Self {
        self.access(method_flags::PRIVATE)
    }

    /// Protected access
    pub fn family(self) -> Self {
        self.access(method_flags::FAMILY)
    }

    /// Internal access
    pub fn assembly(self) -> Self {
        self.access(method_flags::ASSEMBLY)
    }

    /// Virtual method introducing a new slot
    pub fn virtual_slot(self) -> Self {
        self.flags(method_flags::VIRTUAL | method_flags::NEW_SLOT)
    }

    /// Virtual method overriding an inherited slot
    pub fn override_slot(self) -> Self {
        self.flags(method_flags::VIRTUAL)
    }

    /// Abstract virtual method
    pub fn abstract_member(self) -> Self {
        self.flags(method_flags::ABSTRACT | method_flags::VIRTUAL | method_flags::NEW_SLOT)
    }

    /// Sealed override
    pub fn final_member(self) -> Self {
        self.flags(method_flags::FINAL)
    }

    /// Static method
    pub fn static_member(self) -> Self {
        self.flags(method_flags::STATIC)
    }

    /// Special name (accessors)
    pub fn special_name(self) -> Self {
        self.flags(method_flags::SPECIAL_NAME)
    }

    /// Runtime-implemented method
    pub fn internal_call(self) -> Self {
        self.flags(method_flags::INTERNAL_CALL)
    }

    /// Set the return type
    pub fn returns(mut self, return_type: TypeRef) -> Self {
        self.def.return_type = return_type;
        self
    }

    /// Add a parameter
    pub fn param(mut self, name: impl Into<String>, param_type: TypeRef) -> Self {
        self.def.params.push(ParamDef::new(name, param_type));
        self
    }

    /// Add a parameter with a default value
    pub fn optional_param(mut self, name: impl Into<String>, param_type: TypeRef) -> Self {
        let mut param = ParamDef::new(name, param_type);
        param.attributes |= param_flags::OPTIONAL;
        self.def.params.push(param);
        self
    }

    /// Add a local variable
    pub fn local(mut self, local_type: TypeRef) -> Self {
        self.def.body.locals.push(local_type);
        self
    }

    /// Add a custom attribute
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.def.custom_attributes.push(name.into());
        self
    }

    /// Set the instruction stream
    pub fn code(mut self, instructions: Vec<Instruction>) -> Self {
        self.def.body.instructions = instructions;
        self
    }

    /// Replace the whole body
    pub fn body(mut self, body: MethodBody) -> Self {
        self.def.body = body;
        self
    }

    /// Finish the definition
    pub fn build(mut self) -> MethodDef {
        self.def.body.init_locals = !self.def.body.locals.is_empty();
        self.def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_defaults() {
        let ty = TypeBuilder::class("Zoo.Dog")
            .extends(TypeRef::class("Zoo.Animal"))
            .build();
        assert_eq!(ty.base, Some(TypeRef::class("Zoo.Animal")));
        assert!(!ty.is_abstract());
        assert!(!ty.is_interface());
    }

    #[test]
    fn test_interface_has_no_base() {
        let ty = TypeBuilder::interface("Zoo.IPet").build();
        assert!(ty.base.is_none());
        assert!(ty.is_interface());
    }

    #[test]
    fn test_method_flags() {
        let m = MethodBuilder::new("Speak")
            .virtual_slot()
            .family()
            .returns(TypeRef::string())
            .build();
        assert!(m.is_virtual());
        assert!(m.is_new_slot());
        assert_eq!(m.access(), method_flags::FAMILY);
        assert_eq!(m.key(), "Speak()");

        let ctor = MethodBuilder::constructor()
            .param("name", TypeRef::string())
            .optional_param("age", TypeRef::int32())
            .build();
        assert!(ctor.is_constructor());
        assert!(ctor.is_special_name());
        assert!(ctor.has_optional_params());
        assert_eq!(ctor.param_slot(1), Some(2));
    }
}
