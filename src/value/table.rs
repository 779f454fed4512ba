//! Reference table
//!
//! Maps the numeric handles the guest holds to host-side values. The first
//! seven ids are hard-coded in the guest runtime; everything else is handed out
//! in increasing order and never reclaimed, so a handle stays valid for the
//! lifetime of the bridge.

use super::Value;
use crate::error::{Error, Result};
use rustc_hash::FxHashMap as HashMap;
use std::rc::Rc;

/// NaN
pub const NAN_ID: u32 = 0;
/// The number zero (a raw zero cell means `undefined`)
pub const ZERO_ID: u32 = 1;
pub const NULL_ID: u32 = 2;
pub const TRUE_ID: u32 = 3;
pub const FALSE_ID: u32 = 4;
/// The global object
pub const GLOBAL_ID: u32 = 5;
/// The object standing for the runtime instance itself
pub const RUNTIME_ID: u32 = 6;
/// First id handed out for guest-visible values
pub const FIRST_DYNAMIC_ID: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
    Str(Rc<str>),
    Ref(usize),
}

impl Identity {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Identity::Str(Rc::clone(s))),
            Value::Object(obj) => Some(Identity::Ref(Rc::as_ptr(obj) as *const () as usize)),
            Value::Array(arr) => Some(Identity::Ref(Rc::as_ptr(arr) as *const () as usize)),
            Value::Function(func) => Some(Identity::Ref(Rc::as_ptr(func) as *const () as usize)),
            _ => None,
        }
    }
}

/// Append-only id ↔ value mapping
pub struct RefTable {
    values: Vec<Value>,
    ids: HashMap<Identity, u32>,
}

impl RefTable {
    /// Create a table with the reserved ids populated
    pub fn new(global: Value, runtime: Value) -> Self {
        let mut table = Self {
            values: vec![
                Value::Number(f64::NAN),
                Value::Number(0.0),
                Value::Null,
                Value::Boolean(true),
                Value::Boolean(false),
            ],
            ids: HashMap::default(),
        };
        table.push(global);
        table.push(runtime);
        debug_assert_eq!(table.values.len() as u32, FIRST_DYNAMIC_ID);
        table
    }

    fn push(&mut self, value: Value) -> u32 {
        let id = self.values.len() as u32;
        if let Some(identity) = Identity::of(&value) {
            self.ids.insert(identity, id);
        }
        self.values.push(value);
        id
    }

    /// Id for `value`, allocating one the first time a value is seen
    ///
    /// Objects, arrays and functions are matched by identity, strings by
    /// content. `undefined` and ordinary numbers travel inline and have no id.
    pub fn id_for(&mut self, value: &Value) -> Result<u32> {
        match value {
            Value::Null => Ok(NULL_ID),
            Value::Boolean(true) => Ok(TRUE_ID),
            Value::Boolean(false) => Ok(FALSE_ID),
            Value::Number(n) if n.is_nan() => Ok(NAN_ID),
            Value::Number(n) if n.to_bits() == 0 => Ok(ZERO_ID),
            Value::Undefined | Value::Number(_) => Err(Error::abi(format!(
                "{:?} is passed inline and has no reference id",
                value
            ))),
            _ => {
                let identity = Identity::of(value)
                    .ok_or_else(|| Error::abi(format!("{:?} has no identity", value)))?;
                if let Some(&id) = self.ids.get(&identity) {
                    return Ok(id);
                }
                let id = self.push(value.clone());
                tracing::trace!(id, kind = value.kind(), "allocated reference");
                Ok(id)
            }
        }
    }

    /// Value stored under `id`
    pub fn value_for(&self, id: u32) -> Result<Value> {
        self.values
            .get(id as usize)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    /// The global object
    pub fn global(&self) -> Value {
        self.values[GLOBAL_ID as usize].clone()
    }

    /// Number of ids allocated so far, reserved ones included
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
