//! Stack-machine interpreter
//!
//! Executes method bodies of loaded modules. Each call gets its own frame
//! holding the evaluation stack, the argument slots and the locals. Virtual
//! calls resolve on the runtime class of the receiver, walking base types
//! until a concrete method with a matching signature is found.

use crate::error::{VmError, VmResult};
use crate::host::HostRuntime;
use crate::intrinsics;
use crate::object::Object;
use crate::value::Value;
use hotweave_bytecode::{
    contract, corlib, FieldRef, Instruction, MethodDef, MethodRef, Module, Opcode, Operand,
    TypeDef, TypeRef,
};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};

/// Maximum nested call depth before `StackOverflow`
pub const MAX_CALL_DEPTH: usize = 128;

/// Activation record of a running method
struct Frame {
    context: String,
    stack: Vec<Value>,
    args: Vec<Value>,
    locals: Vec<Value>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| VmError::StackUnderflow(self.context.clone()))
    }

    fn pop_n(&mut self, count: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < count {
            return Err(VmError::StackUnderflow(self.context.clone()));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn slot<'a>(slots: &'a mut [Value], index: u16, context: &str) -> VmResult<&'a mut Value> {
        slots.get_mut(usize::from(index)).ok_or_else(|| {
            VmError::InvalidProgram(format!("{}: slot {} out of range", context, index))
        })
    }
}

/// Interpreter over a set of loaded modules
pub struct Interpreter {
    types: FxHashMap<String, Rc<TypeDef>>,
    host: HostRuntime,
    depth: usize,
}

impl Interpreter {
    /// Create an interpreter with the core library and runtime contract loaded
    pub fn new(host: HostRuntime) -> Self {
        let mut vm = Self {
            types: FxHashMap::default(),
            host,
            depth: 0,
        };
        vm.load(&corlib::module());
        vm.load(&contract::module());
        vm
    }

    /// Make the types of `module` available
    pub fn load(&mut self, module: &Module) {
        debug!("Loading module {} ({} types)", module.name(), module.types.len());
        for ty in &module.types {
            self.types.insert(ty.name.clone(), Rc::new(ty.clone()));
        }
    }

    /// Replacement registry
    pub fn host(&self) -> &HostRuntime {
        &self.host
    }

    /// Mutable replacement registry
    pub fn host_mut(&mut self) -> &mut HostRuntime {
        &mut self.host
    }

    /// Look up a loaded type
    pub fn type_def(&self, name: &str) -> VmResult<Rc<TypeDef>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::TypeNotFound(name.to_string()))
    }

    /// `class` followed by its loaded base types
    pub fn class_chain(&self, class: &str) -> Vec<String> {
        let mut chain = vec![class.to_string()];
        let mut current = self.types.get(class);
        while let Some(base) = current.and_then(|ty| ty.base.as_ref()) {
            if chain.contains(&base.full_name) {
                break;
            }
            chain.push(base.full_name.clone());
            current = self.types.get(&base.full_name);
        }
        chain
    }

    /// Nearest class on the chain of `class` declaring an instance method `key`
    pub fn method_declaring_type(&self, class: &str, key: &str) -> Option<String> {
        self.class_chain(class).into_iter().find(|name| {
            self.types.get(name).is_some_and(|ty| {
                ty.methods
                    .iter()
                    .any(|method| method.has_this() && method.key() == key)
            })
        })
    }

    /// Allocate an object and run `ctor` on it
    pub fn construct(&mut self, ctor: &MethodRef, args: Vec<Value>) -> VmResult<Value> {
        let ty = self.type_def(&ctor.declaring_type.full_name)?;
        let def = ty
            .find_method(&ctor.name, &ctor.params)
            .ok_or_else(|| VmError::MethodNotFound(ctor.to_string()))?;
        if def.is_internal_call() {
            return intrinsics::construct(&ty.name);
        }
        if ty.is_abstract() {
            return Err(VmError::TypeError(format!(
                "cannot instantiate abstract type {}",
                ty.name
            )));
        }

        let this = Value::Object(Rc::new(RefCell::new(Object::new(ty.name.clone()))));
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(this.clone());
        full_args.extend(args);
        self.invoke_def(&ty, def, full_args)?;
        Ok(this)
    }

    /// Non-virtual call; `args` includes `this` for instance methods
    pub fn call(&mut self, method: &MethodRef, args: Vec<Value>) -> VmResult<Value> {
        let owner = self
            .resolve(&method.declaring_type.full_name, method)?
            .ok_or_else(|| VmError::MethodNotFound(method.to_string()))?;
        self.dispatch(&owner, method, args)
    }

    /// Virtual call dispatched on the runtime class of `args[0]`
    pub fn call_virtual(&mut self, method: &MethodRef, args: Vec<Value>) -> VmResult<Value> {
        let receiver = match args.first() {
            Some(Value::Null) | None => {
                return Err(VmError::NullReference(method.to_string()));
            }
            Some(value) => value.type_name(),
        };
        match self.resolve(&receiver, method)? {
            Some(owner) => self.dispatch(&owner, method, args),
            None => self.call(method, args),
        }
    }

    /// Read an instance field
    pub fn field(&self, target: &Value, field: &FieldRef) -> VmResult<Value> {
        match target {
            Value::Object(obj) => Ok(obj.borrow().get_field(field)),
            Value::Null => Err(VmError::NullReference(field.to_string())),
            other => Err(VmError::TypeError(format!(
                "{} has no field {}",
                other.type_name(),
                field.name
            ))),
        }
    }

    /// First type in the chain of `start` declaring a concrete `method`
    fn resolve(&self, start: &str, method: &MethodRef) -> VmResult<Option<Rc<TypeDef>>> {
        for class in self.class_chain(start) {
            let Some(ty) = self.types.get(&class) else {
                continue;
            };
            let found = ty
                .find_method(&method.name, &method.params)
                .is_some_and(|def| !def.is_abstract() && def.has_this() == method.has_this);
            if found {
                return Ok(Some(ty.clone()));
            }
        }
        Ok(None)
    }

    fn dispatch(&mut self, owner: &TypeDef, method: &MethodRef, args: Vec<Value>) -> VmResult<Value> {
        let def = owner
            .find_method(&method.name, &method.params)
            .ok_or_else(|| VmError::MethodNotFound(method.to_string()))?;
        self.invoke_def(owner, def, args)
    }

    fn invoke_def(&mut self, owner: &TypeDef, def: &MethodDef, args: Vec<Value>) -> VmResult<Value> {
        if def.is_internal_call() {
            return intrinsics::call(self, &owner.name, def, args);
        }
        if def.is_abstract() || def.body.is_empty() {
            return Err(VmError::InvalidProgram(format!(
                "{}::{} has no body",
                owner.name,
                def.key()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(VmError::StackOverflow);
        }

        self.depth += 1;
        let result = self.execute(owner, def, args);
        self.depth -= 1;
        result
    }

    /// Run a method body to its `ret`
    fn execute(&mut self, owner: &TypeDef, method: &MethodDef, args: Vec<Value>) -> VmResult<Value> {
        let context = format!("{}::{}", owner.name, method.key());
        trace!("Executing {}", context);
        if args.len() != method.arg_count() {
            return Err(VmError::InvalidProgram(format!(
                "{}: expected {} arguments, got {}",
                context,
                method.arg_count(),
                args.len()
            )));
        }

        let code = &method.body.instructions;
        let mut frame = Frame {
            context,
            stack: Vec::new(),
            args,
            locals: method.body.locals.iter().map(Value::default_for).collect(),
        };
        let mut ip = 0usize;

        loop {
            let instr = code.get(ip).ok_or_else(|| {
                VmError::InvalidProgram(format!("{}: fell off the end", frame.context))
            })?;
            ip += 1;

            match instr.opcode {
                // ===== Stack Manipulation & Constants =====
                Opcode::Nop => {}
                Opcode::Pop => {
                    frame.pop()?;
                }
                Opcode::Dup => {
                    let value = frame.pop()?;
                    frame.push(value.clone());
                    frame.push(value);
                }
                Opcode::LdNull => frame.push(Value::Null),
                Opcode::LdcI4 | Opcode::LdcI8 | Opcode::LdcR8 | Opcode::LdStr => {
                    frame.push(constant(instr)?)
                }

                // ===== Arguments and Locals =====
                Opcode::LdArg => {
                    let value = Frame::slot(&mut frame.args, variable(instr)?, &frame.context)?.clone();
                    frame.push(value);
                }
                Opcode::StArg => {
                    let value = frame.pop()?;
                    *Frame::slot(&mut frame.args, variable(instr)?, &frame.context)? = value;
                }
                Opcode::LdLoc => {
                    let value =
                        Frame::slot(&mut frame.locals, variable(instr)?, &frame.context)?.clone();
                    frame.push(value);
                }
                Opcode::StLoc => {
                    let value = frame.pop()?;
                    *Frame::slot(&mut frame.locals, variable(instr)?, &frame.context)? = value;
                }

                // ===== Arithmetic & Comparison =====
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Rem => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    frame.push(arithmetic(instr.opcode, a, b)?);
                }
                Opcode::Ceq | Opcode::Cgt | Opcode::CgtUn | Opcode::Clt => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    frame.push(Value::Bool(compare(instr.opcode, &a, &b)?));
                }

                // ===== Control Flow =====
                Opcode::Br => ip = target(instr)?,
                Opcode::BrTrue | Opcode::BrFalse => {
                    let condition = frame.pop()?.is_truthy();
                    if condition == (instr.opcode == Opcode::BrTrue) {
                        ip = target(instr)?;
                    }
                }
                Opcode::Ret => {
                    return if method.return_type.is_void() {
                        Ok(Value::Null)
                    } else {
                        frame.pop()
                    };
                }
                Opcode::Throw => {
                    let exception = frame.pop()?;
                    return Err(VmError::Thrown(exception.type_name()));
                }

                // ===== Calls =====
                Opcode::Call | Opcode::CallVirt => {
                    let callee = method_operand(instr)?;
                    let call_args = frame.pop_n(callee.stack_arguments())?;
                    let result = if instr.opcode == Opcode::CallVirt {
                        self.call_virtual(callee, call_args)?
                    } else {
                        self.call(callee, call_args)?
                    };
                    if callee.returns_value() {
                        frame.push(result);
                    }
                }
                Opcode::NewObj => {
                    let ctor = method_operand(instr)?;
                    let ctor_args = frame.pop_n(ctor.params.len())?;
                    let object = self.construct(ctor, ctor_args)?;
                    frame.push(object);
                }

                // ===== Fields =====
                Opcode::LdFld => {
                    let field = field_operand(instr)?;
                    let target = frame.pop()?;
                    frame.push(self.field(&target, field)?);
                }
                Opcode::StFld => {
                    let field = field_operand(instr)?;
                    let value = frame.pop()?;
                    match frame.pop()? {
                        Value::Object(obj) => obj.borrow_mut().set_field(field, value),
                        Value::Null => return Err(VmError::NullReference(field.to_string())),
                        other => {
                            return Err(VmError::TypeError(format!(
                                "{} has no field {}",
                                other.type_name(),
                                field.name
                            )))
                        }
                    }
                }

                // ===== Type Operations =====
                Opcode::Box => {
                    type_operand(instr)?;
                }
                Opcode::UnboxAny => {
                    let ty = type_operand(instr)?;
                    let value = frame.pop()?;
                    frame.push(unbox(ty, value)?);
                }
                Opcode::CastClass => {
                    let ty = type_operand(instr)?;
                    let value = frame.pop()?;
                    if !self.is_instance_of(&value, ty) {
                        return Err(VmError::InvalidCast {
                            expected: ty.full_name.clone(),
                            actual: value.type_name(),
                        });
                    }
                    frame.push(value);
                }
                Opcode::LdToken => {
                    let ty = type_operand(instr)?;
                    frame.push(Value::Type(Rc::from(ty.full_name.as_str())));
                }

                // ===== Arrays =====
                Opcode::NewArr => {
                    type_operand(instr)?;
                    let len = intrinsics::index(&frame.pop()?)?;
                    frame.push(Value::Array(Rc::new(RefCell::new(vec![Value::Null; len]))));
                }
                Opcode::LdElemRef => {
                    let index = intrinsics::index(&frame.pop()?)?;
                    let items = array(frame.pop()?)?;
                    let element = intrinsics::element(&items.borrow(), index)?;
                    frame.push(element);
                }
                Opcode::StElemRef => {
                    let value = frame.pop()?;
                    let index = intrinsics::index(&frame.pop()?)?;
                    let items = array(frame.pop()?)?;
                    let mut items = items.borrow_mut();
                    let len = items.len();
                    let slot = items.get_mut(index).ok_or(VmError::IndexOutOfRange {
                        index: index as i64,
                        len,
                    })?;
                    *slot = value;
                }
                Opcode::LdLen => {
                    let items = array(frame.pop()?)?;
                    let len = items.borrow().len() as i32;
                    frame.push(Value::I32(len));
                }
            }
        }
    }

    /// `castclass` compatibility: null, the class chain, or an implemented interface
    fn is_instance_of(&self, value: &Value, ty: &TypeRef) -> bool {
        if value.is_null() || ty.full_name == corlib::OBJECT {
            return true;
        }
        self.class_chain(&value.type_name()).iter().any(|class| {
            *class == ty.full_name
                || self
                    .types
                    .get(class)
                    .is_some_and(|def| def.implements(&ty.full_name))
        })
    }
}

fn constant(instr: &Instruction) -> VmResult<Value> {
    Ok(match &instr.operand {
        Operand::I32(v) => Value::I32(*v),
        Operand::I64(v) => Value::I64(*v),
        Operand::F64(v) => Value::F64(*v),
        Operand::String(s) => Value::string(s),
        _ => return Err(bad_operand(instr)),
    })
}

fn variable(instr: &Instruction) -> VmResult<u16> {
    instr.variable().ok_or_else(|| bad_operand(instr))
}

fn target(instr: &Instruction) -> VmResult<usize> {
    instr
        .branch_target()
        .map(|t| t as usize)
        .ok_or_else(|| bad_operand(instr))
}

fn method_operand(instr: &Instruction) -> VmResult<&MethodRef> {
    instr.method().ok_or_else(|| bad_operand(instr))
}

fn field_operand(instr: &Instruction) -> VmResult<&FieldRef> {
    match &instr.operand {
        Operand::Field(field) => Ok(field),
        _ => Err(bad_operand(instr)),
    }
}

fn type_operand(instr: &Instruction) -> VmResult<&TypeRef> {
    match &instr.operand {
        Operand::Type(ty) => Ok(ty),
        _ => Err(bad_operand(instr)),
    }
}

fn bad_operand(instr: &Instruction) -> VmError {
    VmError::InvalidProgram(format!("bad operand for {}", instr.opcode.name()))
}

fn array(value: Value) -> VmResult<Rc<RefCell<Vec<Value>>>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Err(VmError::NullReference("array".to_string())),
        other => Err(VmError::TypeError(format!(
            "expected array, found {}",
            other.type_name()
        ))),
    }
}

fn unbox(ty: &TypeRef, value: Value) -> VmResult<Value> {
    let primitive = matches!(
        ty.full_name.as_str(),
        corlib::INT32 | corlib::INT64 | corlib::DOUBLE | corlib::BOOLEAN
    );
    match value {
        Value::Null => Err(VmError::NullReference(format!("unbox {}", ty))),
        value if primitive && value.type_name() != ty.full_name => Err(VmError::InvalidCast {
            expected: ty.full_name.clone(),
            actual: value.type_name(),
        }),
        value => Ok(value),
    }
}

fn arithmetic(op: Opcode, a: Value, b: Value) -> VmResult<Value> {
    match (a, b) {
        (Value::I32(a), Value::I32(b)) => Ok(Value::I32(match op {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mul => a.wrapping_mul(b),
            Opcode::Div => a.checked_div(b).ok_or(VmError::DivideByZero)?,
            _ => a.checked_rem(b).ok_or(VmError::DivideByZero)?,
        })),
        (Value::I64(a), Value::I64(b)) => Ok(Value::I64(match op {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mul => a.wrapping_mul(b),
            Opcode::Div => a.checked_div(b).ok_or(VmError::DivideByZero)?,
            _ => a.checked_rem(b).ok_or(VmError::DivideByZero)?,
        })),
        (Value::F64(a), Value::F64(b)) => Ok(Value::F64(match op {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::Mul => a * b,
            Opcode::Div => a / b,
            _ => a % b,
        })),
        (a, b) => Err(VmError::TypeError(format!(
            "{} on {} and {}",
            op.name(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn compare(op: Opcode, a: &Value, b: &Value) -> VmResult<bool> {
    if op == Opcode::Ceq {
        return Ok(a == b);
    }
    match (a, b) {
        (Value::I32(x), Value::I32(y)) => Ok(match op {
            Opcode::Cgt => x > y,
            Opcode::CgtUn => (*x as u32) > (*y as u32),
            _ => x < y,
        }),
        (Value::I64(x), Value::I64(y)) => Ok(match op {
            Opcode::Cgt => x > y,
            Opcode::CgtUn => (*x as u64) > (*y as u64),
            _ => x < y,
        }),
        (Value::F64(x), Value::F64(y)) => Ok(match op {
            Opcode::Cgt => x > y,
            Opcode::CgtUn => x > y || x.is_nan() || y.is_nan(),
            _ => x < y,
        }),
        // `ref cgt.un null` tests for non-null
        (x, Value::Null) if op == Opcode::CgtUn => Ok(!x.is_null()),
        _ => Err(VmError::TypeError(format!(
            "{} on {} and {}",
            op.name(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Delegate;
    use hotweave_bytecode::{MethodBuilder, TypeBuilder};

    fn point() -> TypeRef {
        TypeRef::class("Geo.Point")
    }

    fn x_field() -> FieldRef {
        FieldRef::new(point(), "x", TypeRef::int32())
    }

    fn base_ctor() -> MethodRef {
        MethodRef::constructor(TypeRef::object(), vec![])
    }

    fn geometry() -> Module {
        let mut module = Module::new("Geo");
        module.add_type(
            TypeBuilder::class("Geo.Point")
                .field("x", TypeRef::int32())
                .method(
                    MethodBuilder::constructor()
                        .param("x", TypeRef::int32())
                        .code(vec![
                            Instruction::ldarg(0),
                            Instruction::call(base_ctor()),
                            Instruction::ldarg(0),
                            Instruction::ldarg(1),
                            Instruction::stfld(x_field()),
                            Instruction::ret(),
                        ])
                        .build(),
                )
                .method(
                    MethodBuilder::new("Describe")
                        .virtual_slot()
                        .returns(TypeRef::string())
                        .code(vec![Instruction::ldstr("point"), Instruction::ret()])
                        .build(),
                )
                .method(
                    MethodBuilder::new("Abs")
                        .static_member()
                        .param("v", TypeRef::int32())
                        .returns(TypeRef::int32())
                        .code(vec![
                            Instruction::ldarg(0),
                            Instruction::ldc_i4(0),
                            Instruction::simple(Opcode::Clt),
                            Instruction::brfalse(8),
                            Instruction::ldc_i4(0),
                            Instruction::ldarg(0),
                            Instruction::simple(Opcode::Sub),
                            Instruction::ret(),
                            Instruction::ldarg(0),
                            Instruction::ret(),
                        ])
                        .build(),
                )
                .method(
                    MethodBuilder::new("Forever")
                        .static_member()
                        .code(vec![
                            Instruction::call(forever()),
                            Instruction::ret(),
                        ])
                        .build(),
                )
                .build(),
        );
        module.add_type(
            TypeBuilder::class("Geo.Origin")
                .extends(point())
                .method(
                    MethodBuilder::constructor()
                        .code(vec![
                            Instruction::ldarg(0),
                            Instruction::ldc_i4(0),
                            Instruction::call(MethodRef::constructor(
                                point(),
                                vec![TypeRef::int32()],
                            )),
                            Instruction::ret(),
                        ])
                        .build(),
                )
                .method(
                    MethodBuilder::new("Describe")
                        .override_slot()
                        .returns(TypeRef::string())
                        .code(vec![Instruction::ldstr("origin"), Instruction::ret()])
                        .build(),
                )
                .build(),
        );
        module
    }

    fn forever() -> MethodRef {
        MethodRef::static_method(point(), "Forever", TypeRef::void(), vec![])
    }

    fn describe() -> MethodRef {
        MethodRef::instance(point(), "Describe", TypeRef::string(), vec![])
    }

    fn abs() -> MethodRef {
        MethodRef::static_method(point(), "Abs", TypeRef::int32(), vec![TypeRef::int32()])
    }

    fn vm() -> Interpreter {
        let mut vm = Interpreter::new(HostRuntime::new());
        vm.load(&geometry());
        vm
    }

    // ===== Execution =====

    #[test]
    fn test_static_call_with_branch() {
        let mut vm = vm();
        assert_eq!(vm.call(&abs(), vec![Value::I32(-5)]).unwrap(), Value::I32(5));
        assert_eq!(vm.call(&abs(), vec![Value::I32(3)]).unwrap(), Value::I32(3));
    }

    #[test]
    fn test_constructor_sets_field() {
        let mut vm = vm();
        let ctor = MethodRef::constructor(point(), vec![TypeRef::int32()]);
        let p = vm.construct(&ctor, vec![Value::I32(7)]).unwrap();
        assert_eq!(vm.field(&p, &x_field()).unwrap(), Value::I32(7));
    }

    #[test]
    fn test_virtual_dispatch_uses_runtime_class() {
        let mut vm = vm();
        let origin = vm
            .construct(&MethodRef::constructor(TypeRef::class("Geo.Origin"), vec![]), vec![])
            .unwrap();
        assert_eq!(vm.field(&origin, &x_field()).unwrap(), Value::I32(0));

        let virt = vm.call_virtual(&describe(), vec![origin.clone()]).unwrap();
        assert_eq!(virt.as_str(), Some("origin"));
        let direct = vm.call(&describe(), vec![origin]).unwrap();
        assert_eq!(direct.as_str(), Some("point"));
    }

    #[test]
    fn test_inherited_object_methods() {
        let mut vm = vm();
        let p = vm
            .construct(&MethodRef::constructor(point(), vec![TypeRef::int32()]), vec![Value::I32(1)])
            .unwrap();
        let to_string = MethodRef::instance(point(), "ToString", TypeRef::string(), vec![]);
        let text = vm.call_virtual(&to_string, vec![p.clone()]).unwrap();
        assert_eq!(text.as_str(), Some("Geo.Point"));

        let equals = MethodRef::instance(
            TypeRef::object(),
            "Equals",
            TypeRef::boolean(),
            vec![TypeRef::object()],
        );
        let same = vm.call_virtual(&equals, vec![p.clone(), p]).unwrap();
        assert_eq!(same, Value::Bool(true));
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        let mut vm = vm();
        assert!(matches!(
            vm.call(&forever(), vec![]),
            Err(VmError::StackOverflow)
        ));
    }

    #[test]
    fn test_null_receiver() {
        let mut vm = vm();
        assert!(matches!(
            vm.call_virtual(&describe(), vec![Value::Null]),
            Err(VmError::NullReference(_))
        ));
    }

    // ===== Runtime contract =====

    #[test]
    fn test_method_delegate_lookup() {
        let mut host = HostRuntime::new();
        host.register_static(
            "Geo.Point",
            "Abs(System.Int32)",
            Delegate::new("abs", |_, args| Ok(args[0].clone())),
        );
        let mut vm = Interpreter::new(host);

        let handle = Value::Type(Rc::from("Geo.Point"));
        let found = vm
            .call(
                &contract::get_method_delegate(),
                vec![handle.clone(), Value::string("Abs(System.Int32)")],
            )
            .unwrap();
        assert!(matches!(found, Value::Delegate(_)));

        let missing = vm
            .call(&contract::get_method_delegate(), vec![handle, Value::string("Nope()")])
            .unwrap();
        assert!(missing.is_null());
    }

    #[test]
    fn test_method_declaring_type() {
        let mut vm = vm();
        let mut declarer = |class: &str, key: &str| {
            vm.call(
                &contract::get_method_declaring_type(),
                vec![Value::Type(Rc::from(class)), Value::string(key)],
            )
            .unwrap()
        };
        let origin = Value::Type(Rc::from("Geo.Origin"));
        assert_eq!(declarer("Geo.Origin", "Describe()"), origin);
        assert_eq!(
            declarer("Geo.Point", "Describe()"),
            Value::Type(Rc::from("Geo.Point"))
        );
        assert_eq!(
            declarer("Geo.Origin", "ToString()"),
            Value::Type(Rc::from(corlib::OBJECT))
        );
        // static methods never occupy an instance slot
        assert!(declarer("Geo.Origin", "Abs(System.Int32)").is_null());
        assert!(declarer("Geo.Origin", "Nope()").is_null());
    }

    #[test]
    fn test_dynamic_invoke_passes_array() {
        let mut vm = Interpreter::new(HostRuntime::new());
        let delegate = Value::Delegate(Delegate::new("count", |_, args| {
            Ok(Value::I32(args.len() as i32))
        }));
        let array = Value::Array(Rc::new(RefCell::new(vec![Value::Null, Value::I32(2)])));
        let result = vm
            .call_virtual(&contract::dynamic_invoke(), vec![delegate, array])
            .unwrap();
        assert_eq!(result, Value::I32(2));
    }

    #[test]
    fn test_collections() {
        let mut vm = Interpreter::new(HostRuntime::new());
        let list = vm.construct(&contract::array_list_ctor(), vec![]).unwrap();
        let index = vm
            .call_virtual(&contract::array_list_add(), vec![list.clone(), Value::I32(4)])
            .unwrap();
        assert_eq!(index, Value::I32(0));
        assert_eq!(list.list_items().unwrap(), vec![Value::I32(4)]);

        let map = vm
            .construct(&MethodRef::constructor(contract::method_map(), vec![]), vec![])
            .unwrap();
        let has = vm
            .call_virtual(&contract::map_contains_key(), vec![map.clone(), Value::string("k")])
            .unwrap();
        assert_eq!(has, Value::Bool(false));
        assert!(matches!(
            vm.call_virtual(&contract::map_get_item(), vec![map, Value::string("k")]),
            Err(VmError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_arithmetic_and_compare() {
        assert_eq!(
            arithmetic(Opcode::Mul, Value::I32(6), Value::I32(7)).unwrap(),
            Value::I32(42)
        );
        assert!(matches!(
            arithmetic(Opcode::Div, Value::I32(1), Value::I32(0)),
            Err(VmError::DivideByZero)
        ));
        assert!(compare(Opcode::CgtUn, &Value::string("x"), &Value::Null).unwrap());
        assert!(!compare(Opcode::CgtUn, &Value::Null, &Value::Null).unwrap());
        assert!(compare(Opcode::Ceq, &Value::I64(3), &Value::I64(3)).unwrap());
    }
}
