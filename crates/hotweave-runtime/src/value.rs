//! Runtime values
//!
//! Value types are held inline; `box` leaves them as they are and `unbox.any`
//! checks the variant. Reference types share their payload through `Rc`, so
//! cloning a value copies the reference, not the object.

use crate::error::VmResult;
use crate::interpreter::Interpreter;
use crate::object::Object;
use hotweave_bytecode::{corlib, TypeRef};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Host function backing a delegate; receives the `DynamicInvoke` arguments
pub type HandlerFn = dyn Fn(&mut Interpreter, &[Value]) -> VmResult<Value>;

/// Shared mutable list (`object[]` and `ArrayList`)
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Shared method map (`Dictionary<string, Delegate>`)
pub type MapRef = Rc<RefCell<FxHashMap<String, Value>>>;

/// A callable replacement
#[derive(Clone)]
pub struct Delegate {
    name: Rc<str>,
    handler: Rc<HandlerFn>,
}

impl Delegate {
    /// Wrap a host function
    pub fn new<F>(name: &str, handler: F) -> Self
    where
        F: Fn(&mut Interpreter, &[Value]) -> VmResult<Value> + 'static,
    {
        Self {
            name: Rc::from(name),
            handler: Rc::new(handler),
        }
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the handler
    pub fn invoke(&self, vm: &mut Interpreter, args: &[Value]) -> VmResult<Value> {
        (self.handler)(vm, args)
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delegate({})", self.name)
    }
}

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// Null reference
    Null,
    /// `System.Boolean`
    Bool(bool),
    /// `System.Int32`
    I32(i32),
    /// `System.Int64`
    I64(i64),
    /// `System.Double`
    F64(f64),
    /// `System.String`
    Str(Rc<str>),
    /// `System.Type` / runtime type handle, by full name
    Type(Rc<str>),
    /// Class instance
    Object(Rc<RefCell<Object>>),
    /// `object[]`
    Array(ListRef),
    /// `System.Collections.ArrayList`
    List(ListRef),
    /// Method map
    Map(MapRef),
    /// Delegate
    Delegate(Delegate),
}

impl Value {
    /// String value
    pub fn string(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Zero value for a slot of type `ty`
    pub fn default_for(ty: &TypeRef) -> Self {
        match ty.full_name.as_str() {
            corlib::INT32 => Value::I32(0),
            corlib::INT64 => Value::I64(0),
            corlib::DOUBLE => Value::F64(0.0),
            corlib::BOOLEAN => Value::Bool(false),
            _ => Value::Null,
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Branch condition: false, zero and null are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I32(v) => *v != 0,
            Value::I64(v) => *v != 0,
            Value::F64(v) => *v != 0.0,
            _ => true,
        }
    }

    /// Extract a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an i32
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Snapshot of an array or list
    pub fn list_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) | Value::List(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    /// Full name of the runtime type
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => corlib::BOOLEAN.to_string(),
            Value::I32(_) => corlib::INT32.to_string(),
            Value::I64(_) => corlib::INT64.to_string(),
            Value::F64(_) => corlib::DOUBLE.to_string(),
            Value::Str(_) => corlib::STRING.to_string(),
            Value::Type(_) => corlib::TYPE.to_string(),
            Value::Object(obj) => obj.borrow().class.clone(),
            Value::Array(_) => TypeRef::object_array().full_name,
            Value::List(_) => corlib::ARRAY_LIST.to_string(),
            Value::Map(_) => corlib::METHOD_MAP.to_string(),
            Value::Delegate(_) => corlib::DELEGATE.to_string(),
        }
    }
}

/// Value equality for value types, identity for references
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) | (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Delegate(a), Value::Delegate(b)) => Rc::ptr_eq(&a.handler, &b.handler),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Type(name) => write!(f, "{}", name),
            other => write!(f, "{}", other.type_name()),
        }
    }
}
