//! JavaScript-like values exchanged with the guest
//!
//! The guest runtime sees a JavaScript host. On our side that host is a closed
//! set of variants: primitives, property-bag objects, byte arrays (the only
//! ordered container the guest indexes into) and native functions. Objects,
//! arrays and functions are shared by reference and compared by identity.

pub mod codec;
pub mod table;

use crate::error::{Error, Result};
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use codec::{decode, encode, load_value, store_value};
pub use table::RefTable;

/// Type alias for native function implementations
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// Shared handle to an object
pub type ObjectRef = Rc<RefCell<Object>>;

/// Shared handle to a byte array
pub type ArrayRef = Rc<RefCell<Array>>;

/// Shared handle to a native function
pub type FunctionRef = Rc<Function>;

/// A value on the host side of the boundary
#[derive(Clone)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(Rc<str>),
    /// Property-bag object
    Object(ObjectRef),
    /// Byte array (Uint8Array-like)
    Array(ArrayRef),
    /// Native function
    Function(FunctionRef),
}

/// A property-bag object, optionally usable as a constructor
pub struct Object {
    name: String,
    props: HashMap<String, Value>,
    constructor: Option<NativeFn>,
    class: Option<ObjectRef>,
}

/// A byte buffer exposed to the guest as a typed array
#[derive(Default)]
pub struct Array {
    pub buf: Vec<u8>,
    class: Option<ObjectRef>,
}

/// A host-side callable
pub struct Function {
    name: String,
    func: NativeFn,
}

impl Object {
    /// Create an empty object; `name` only shows up in diagnostics
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: HashMap::default(),
            constructor: None,
            class: None,
        }
    }

    /// Builder-style property insertion
    pub fn with(mut self, prop: impl Into<String>, value: Value) -> Self {
        self.props.insert(prop.into(), value);
        self
    }

    /// Give the object a constructor capability (`new X(...)`)
    pub fn with_constructor(
        mut self,
        ctor: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.constructor = Some(Rc::new(ctor));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, prop: &str) -> Option<&Value> {
        self.props.get(prop)
    }

    pub fn set(&mut self, prop: impl Into<String>, value: Value) {
        self.props.insert(prop.into(), value);
    }

    pub fn remove(&mut self, prop: &str) -> Option<Value> {
        self.props.remove(prop)
    }

    pub fn contains(&self, prop: &str) -> bool {
        self.props.contains_key(prop)
    }

    pub fn is_constructor(&self) -> bool {
        self.constructor.is_some()
    }
}

impl Array {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, class: None }
    }
}

impl Function {
    pub fn new(name: impl Into<String>, func: impl Fn(&[Value]) -> Result<Value> + 'static) -> Self {
        Self {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Wrap an object
    pub fn object(obj: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Create a byte array value
    pub fn array(buf: impl Into<Vec<u8>>) -> Self {
        Value::Array(Rc::new(RefCell::new(Array::new(buf.into()))))
    }

    /// Create a native function value
    pub fn function(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Self {
        Value::Function(Rc::new(Function::new(name, func)))
    }

    /// Name of the value's kind, as used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The `Error`-shaped object a failed host call throws to the guest
    pub fn thrown(err: &Error) -> Self {
        let (name, message) = match err {
            Error::TypeError(message) => ("TypeError", message.clone()),
            other => ("Error", other.to_string()),
        };
        Value::object(
            Object::new(name)
                .with("name", Value::string(name))
                .with("message", Value::string(message)),
        )
    }

    fn expect_object(&self) -> Result<&ObjectRef> {
        self.as_object().ok_or(Error::TypeMismatch {
            expected: "object",
            found: self.kind(),
        })
    }

    /// Read a property (valueGet)
    pub fn get(&self, prop: &str) -> Result<Value> {
        self.expect_object()?
            .borrow()
            .get(prop)
            .cloned()
            .ok_or_else(|| Error::PropertyMissing(prop.to_string()))
    }

    /// Insert or overwrite a property (valueSet)
    pub fn set(&self, prop: &str, value: Value) -> Result<()> {
        self.expect_object()?.borrow_mut().set(prop, value);
        Ok(())
    }

    /// Remove a property (valueDelete); removing an absent property is a no-op
    pub fn delete(&self, prop: &str) -> Result<()> {
        self.expect_object()?.borrow_mut().remove(prop);
        Ok(())
    }

    /// Positional read from an ordered container (valueIndex)
    pub fn index(&self, index: i64) -> Result<Value> {
        let arr = self.as_array().ok_or(Error::UnsupportedType {
            operation: "index",
            kind: self.kind(),
        })?;
        let arr = arr.borrow();
        let byte = usize::try_from(index).ok().and_then(|i| arr.buf.get(i).copied());
        byte.map(|b| Value::Number(f64::from(b)))
            .ok_or(Error::IndexOutOfRange {
                index,
                len: arr.buf.len(),
            })
    }

    /// Positional write (valueSetIndex); not provided
    pub fn set_index(&self, _index: i64, _value: Value) -> Result<()> {
        Err(Error::not_implemented("valueSetIndex"))
    }

    /// Element count of an ordered container (valueLength)
    pub fn length(&self) -> Result<usize> {
        match self {
            Value::Array(arr) => Ok(arr.borrow().buf.len()),
            other => Err(Error::UnsupportedType {
                operation: "length",
                kind: other.kind(),
            }),
        }
    }

    /// Call a method looked up on this object (valueCall)
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let Value::Object(obj) = self else {
            return Err(Error::type_error(format!(
                "cannot call method '{}' of {}",
                method,
                self.kind()
            )));
        };
        // Release the borrow before running host code, which may touch the receiver.
        let callee = {
            let obj = obj.borrow();
            match obj.get(method) {
                Some(Value::Function(func)) => Rc::clone(func),
                Some(other) => {
                    return Err(Error::type_error(format!(
                        "'{}.{}' is not a function (found {})",
                        obj.name(),
                        method,
                        other.kind()
                    )))
                }
                None => {
                    return Err(Error::type_error(format!(
                        "'{}.{}' is not a function",
                        obj.name(),
                        method
                    )))
                }
            }
        };
        callee.call(args)
    }

    /// Call this value as a function (valueInvoke)
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        match self {
            Value::Function(func) => func.call(args),
            other => Err(Error::type_error(format!("{} is not a function", other.kind()))),
        }
    }

    /// Construct a new instance with this object's constructor (valueNew)
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        let Value::Object(class) = self else {
            return Err(Error::type_error(format!("{} is not a constructor", self.kind())));
        };
        let ctor = {
            let class = class.borrow();
            class.constructor.clone().ok_or_else(|| {
                Error::type_error(format!("'{}' is not a constructor", class.name()))
            })?
        };
        let instance = ctor(args)?;
        match &instance {
            Value::Object(obj) => obj.borrow_mut().class = Some(Rc::clone(class)),
            Value::Array(arr) => arr.borrow_mut().class = Some(Rc::clone(class)),
            _ => {}
        }
        Ok(instance)
    }

    /// Whether this value was produced by `ctor` (valueInstanceOf)
    pub fn instance_of(&self, ctor: &Value) -> bool {
        let Value::Object(ctor) = ctor else {
            return false;
        };
        let class = match self {
            Value::Object(obj) => obj.borrow().class.clone(),
            Value::Array(arr) => arr.borrow().class.clone(),
            _ => None,
        };
        class.is_some_and(|class| Rc::ptr_eq(&class, ctor))
    }

    /// JavaScript `ToString` of the value
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Array(arr) => arr
                .borrow()
                .buf
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(","),
            Value::Function(func) => format!("function {}() {{ [native code] }}", func.name()),
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(obj) => write!(f, "[object {}]", obj.borrow().name()),
            Value::Array(arr) => write!(f, "Uint8Array({:?})", arr.borrow().buf),
            Value::Function(func) => write!(f, "[function {}]", func.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}
