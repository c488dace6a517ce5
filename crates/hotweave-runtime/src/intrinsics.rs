//! Internal-call implementations
//!
//! Core library and runtime contract methods have no instruction stream; the
//! interpreter routes them here by declaring type and name.

use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::value::Value;
use hotweave_bytecode::{contract, corlib, MethodDef};
use rustc_hash::{FxHashMap, FxHasher};
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Run the internal-call method `owner::method`
pub(crate) fn call(
    vm: &mut Interpreter,
    owner: &str,
    method: &MethodDef,
    args: Vec<Value>,
) -> VmResult<Value> {
    match (owner, method.name.as_str()) {
        // ===== System.Object =====
        (corlib::OBJECT, "ToString") => Ok(Value::string(&arg(&args, 0)?.to_string())),
        (corlib::OBJECT, "Equals") => Ok(Value::Bool(arg(&args, 0)? == arg(&args, 1)?)),
        (corlib::OBJECT, "GetHashCode") => Ok(Value::I32(hash_code(arg(&args, 0)?))),
        (corlib::OBJECT, "GetType") => {
            let this = non_null(&args, 0, "GetType")?;
            Ok(Value::Type(Rc::from(this.type_name())))
        }
        (corlib::OBJECT, corlib::FINALIZE) => Ok(Value::Null),

        // ===== System.Type / System.Delegate =====
        (corlib::TYPE, "GetTypeFromHandle") => match arg(&args, 0)? {
            handle @ Value::Type(_) => Ok(handle.clone()),
            other => Err(type_error("type handle", other)),
        },
        (corlib::TYPE, "GetMethodDeclaringType") => {
            let class = match non_null(&args, 0, "GetMethodDeclaringType")? {
                Value::Type(name) => name.clone(),
                other => return Err(type_error("System.Type", other)),
            };
            let key = string(&args, 1)?;
            Ok(vm
                .method_declaring_type(&class, &key)
                .map_or(Value::Null, |name| Value::Type(Rc::from(name))))
        }
        (corlib::DELEGATE, "DynamicInvoke") => {
            let delegate = match non_null(&args, 0, "DynamicInvoke")? {
                Value::Delegate(delegate) => delegate.clone(),
                other => return Err(type_error("delegate", other)),
            };
            let items = match arg(&args, 1)? {
                Value::Null => Vec::new(),
                other => other
                    .list_items()
                    .ok_or_else(|| type_error("object[]", other))?,
            };
            delegate.invoke(vm, &items)
        }

        // ===== Collections =====
        (corlib::ARRAY_LIST, "Add") => {
            let list = list(&args)?;
            let mut items = list.borrow_mut();
            items.push(arg(&args, 1)?.clone());
            Ok(Value::I32(items.len() as i32 - 1))
        }
        (corlib::ARRAY_LIST, "get_Count") => Ok(Value::I32(list(&args)?.borrow().len() as i32)),
        (corlib::ARRAY_LIST, "get_Item") => {
            let index = index(arg(&args, 1)?)?;
            element(&list(&args)?.borrow(), index)
        }
        (corlib::METHOD_MAP, "ContainsKey") => {
            let key = string(&args, 1)?;
            Ok(Value::Bool(map(&args)?.borrow().contains_key(&key)))
        }
        (corlib::METHOD_MAP, "get_Item") => {
            let key = string(&args, 1)?;
            map(&args)?
                .borrow()
                .get(&key)
                .cloned()
                .ok_or(VmError::KeyNotFound(key))
        }
        (corlib::METHOD_MAP, "set_Item") => {
            let key = string(&args, 1)?;
            let value = arg(&args, 2)?.clone();
            map(&args)?.borrow_mut().insert(key, value);
            Ok(Value::Null)
        }

        // ===== Hot-reload runtime =====
        (contract::RUNTIME_TYPE, contract::GET_INITIAL_INSTANCE_METHODS) => {
            let instance = non_null(&args, 0, "GetInitialInstanceMethods")?;
            let chain = vm.class_chain(&instance.type_name());
            let methods = vm.host().initial_instance_methods(&chain);
            Ok(Value::Map(Rc::new(RefCell::new(methods))))
        }
        (contract::RUNTIME_TYPE, contract::GET_METHOD_DELEGATE) => {
            let type_name = match arg(&args, 0)? {
                Value::Type(name) => name.clone(),
                other => return Err(type_error("System.Type", other)),
            };
            let key = string(&args, 1)?;
            Ok(vm
                .host()
                .method_delegate(&type_name, &key)
                .map_or(Value::Null, Value::Delegate))
        }

        _ => Err(VmError::MissingIntrinsic(format!("{}::{}", owner, method.key()))),
    }
}

/// Allocate an instance of a type whose constructor is an internal call
pub(crate) fn construct(type_name: &str) -> VmResult<Value> {
    match type_name {
        corlib::ARRAY_LIST => Ok(Value::List(Rc::new(RefCell::new(Vec::new())))),
        corlib::METHOD_MAP => Ok(Value::Map(Rc::new(RefCell::new(FxHashMap::default())))),
        _ => Err(VmError::MissingIntrinsic(format!("{}::.ctor", type_name))),
    }
}

/// Read element `index` of an array or list
pub(crate) fn element(items: &[Value], index: usize) -> VmResult<Value> {
    items
        .get(index)
        .cloned()
        .ok_or(VmError::IndexOutOfRange {
            index: index as i64,
            len: items.len(),
        })
}

/// Convert an `int32` operand to an index
pub(crate) fn index(value: &Value) -> VmResult<usize> {
    match value {
        Value::I32(i) if *i >= 0 => Ok(*i as usize),
        Value::I32(i) => Err(VmError::IndexOutOfRange {
            index: i64::from(*i),
            len: 0,
        }),
        other => Err(type_error("int32 index", other)),
    }
}

fn arg(args: &[Value], index: usize) -> VmResult<&Value> {
    args.get(index)
        .ok_or_else(|| VmError::InvalidProgram(format!("missing argument {}", index)))
}

fn non_null<'a>(args: &'a [Value], index: usize, context: &str) -> VmResult<&'a Value> {
    match arg(args, index)? {
        Value::Null => Err(VmError::NullReference(context.to_string())),
        value => Ok(value),
    }
}

fn string(args: &[Value], index: usize) -> VmResult<String> {
    match arg(args, index)? {
        Value::Str(s) => Ok(s.to_string()),
        Value::Null => Err(VmError::NullReference("string argument".to_string())),
        other => Err(type_error("string", other)),
    }
}

fn list(args: &[Value]) -> VmResult<Rc<RefCell<Vec<Value>>>> {
    match non_null(args, 0, "ArrayList")? {
        Value::List(items) => Ok(items.clone()),
        other => Err(type_error("ArrayList", other)),
    }
}

fn map(args: &[Value]) -> VmResult<Rc<RefCell<FxHashMap<String, Value>>>> {
    match non_null(args, 0, "method map")? {
        Value::Map(entries) => Ok(entries.clone()),
        other => Err(type_error("method map", other)),
    }
}

fn hash_code(value: &Value) -> i32 {
    let mut hasher = FxHasher::default();
    match value {
        Value::Null => return 0,
        Value::Bool(b) => b.hash(&mut hasher),
        Value::I32(v) => return *v,
        Value::I64(v) => v.hash(&mut hasher),
        Value::F64(v) => v.to_bits().hash(&mut hasher),
        Value::Str(s) | Value::Type(s) => s.hash(&mut hasher),
        Value::Object(obj) => (Rc::as_ptr(obj) as usize).hash(&mut hasher),
        Value::Array(items) | Value::List(items) => (Rc::as_ptr(items) as usize).hash(&mut hasher),
        Value::Map(entries) => (Rc::as_ptr(entries) as usize).hash(&mut hasher),
        Value::Delegate(delegate) => delegate.name().hash(&mut hasher),
    }
    hasher.finish() as i32
}

fn type_error(expected: &str, actual: &Value) -> VmError {
    VmError::TypeError(format!("expected {}, found {}", expected, actual.type_name()))
}
