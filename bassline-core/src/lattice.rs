//! Join-semilattices over JSON values.
//!
//! Every contact is typed by a [`Lattice`]. Values only ever move upward:
//! an update is the join of the incoming value with the current one, so
//! the order in which updates arrive never changes the fixed point.
//!
//! `Value::Null` is the bottom element of every built-in lattice.
//!
//! | Name | Type | Join |
//! |------|------|------|
//! | `max` | [`MaxLattice`] | numeric maximum |
//! | `min` | [`MinLattice`] | numeric minimum (dual order) |
//! | `set-union` | [`SetUnionLattice`] | union of arrays treated as sets |
//! | `or` | [`OrLattice`] | boolean disjunction |
//! | (user) | [`RecordLattice`] | pointwise join of object fields |

use crate::error::LatticeError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A join-semilattice over [`serde_json::Value`].
///
/// `join` must be commutative, associative and idempotent. `equivalent`
/// decides whether a join produced anything new; it is what suppresses
/// no-op updates, so structured lattices must override it when two
/// different JSON encodings denote the same element (e.g. `[1,2]` and
/// `[2,1]` for a set).
pub trait Lattice: Send + Sync + fmt::Debug {
    /// Registry name of this lattice.
    fn name(&self) -> &str;

    /// The least element.
    fn bottom(&self) -> Value {
        Value::Null
    }

    /// Least upper bound of `current` and `incoming`.
    fn join(&self, current: &Value, incoming: &Value) -> Result<Value, LatticeError>;

    /// Whether `a` and `b` denote the same lattice element.
    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// JSON type name of a value, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(lattice: &str, value: &Value) -> LatticeError {
    LatticeError::TypeMismatch {
        lattice: lattice.to_owned(),
        found: json_type_name(value).to_owned(),
    }
}

fn as_number(lattice: &str, value: &Value) -> Result<Option<f64>, LatticeError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| mismatch(lattice, value)),
        other => Err(mismatch(lattice, other)),
    }
}

fn numbers_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numeric maximum. The larger input is returned unchanged, so integers
/// stay integers.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxLattice;

impl Lattice for MaxLattice {
    fn name(&self) -> &str {
        "max"
    }

    fn join(&self, current: &Value, incoming: &Value) -> Result<Value, LatticeError> {
        match (as_number("max", current)?, as_number("max", incoming)?) {
            (None, _) => Ok(incoming.clone()),
            (_, None) => Ok(current.clone()),
            (Some(c), Some(i)) if i > c => Ok(incoming.clone()),
            _ => Ok(current.clone()),
        }
    }

    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        numbers_equivalent(a, b)
    }
}

/// Numeric minimum: the dual order, moving "up" means getting smaller.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinLattice;

impl Lattice for MinLattice {
    fn name(&self) -> &str {
        "min"
    }

    fn join(&self, current: &Value, incoming: &Value) -> Result<Value, LatticeError> {
        match (as_number("min", current)?, as_number("min", incoming)?) {
            (None, _) => Ok(incoming.clone()),
            (_, None) => Ok(current.clone()),
            (Some(c), Some(i)) if i < c => Ok(incoming.clone()),
            _ => Ok(current.clone()),
        }
    }

    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        numbers_equivalent(a, b)
    }
}

/// Arrays treated as sets. Joins are deduplicated and sorted by their
/// JSON encoding so the result is canonical.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetUnionLattice;

impl SetUnionLattice {
    fn elements(value: &Value) -> Result<BTreeMap<String, Value>, LatticeError> {
        match value {
            Value::Null => Ok(BTreeMap::new()),
            Value::Array(items) => Ok(items
                .iter()
                .map(|item| (item.to_string(), item.clone()))
                .collect()),
            other => Err(mismatch("set-union", other)),
        }
    }
}

impl Lattice for SetUnionLattice {
    fn name(&self) -> &str {
        "set-union"
    }

    fn join(&self, current: &Value, incoming: &Value) -> Result<Value, LatticeError> {
        let mut merged = Self::elements(current)?;
        merged.extend(Self::elements(incoming)?);
        Ok(Value::Array(merged.into_values().collect()))
    }

    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        match (Self::elements(a), Self::elements(b)) {
            (Ok(x), Ok(y)) => x.keys().eq(y.keys()),
            _ => a == b,
        }
    }
}

/// Boolean disjunction: once true, always true.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrLattice;

impl Lattice for OrLattice {
    fn name(&self) -> &str {
        "or"
    }

    fn join(&self, current: &Value, incoming: &Value) -> Result<Value, LatticeError> {
        let flag = |v: &Value| match v {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("or", other)),
        };
        Ok(Value::Bool(flag(current)? || flag(incoming)?))
    }

    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        let flag = |v: &Value| matches!(v, Value::Bool(true));
        flag(a) == flag(b)
    }
}

/// Pointwise join over JSON objects.
///
/// Listed fields are joined with their own lattice. Unlisted fields that
/// disagree keep the value whose JSON encoding sorts last, which is still
/// a join (maximum over a total order).
#[derive(Debug, Clone)]
pub struct RecordLattice {
    name: String,
    fields: BTreeMap<String, Arc<dyn Lattice>>,
}

impl RecordLattice {
    /// Create a record lattice with no field lattices.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Join `field` with `lattice`.
    pub fn field(mut self, field: impl Into<String>, lattice: Arc<dyn Lattice>) -> Self {
        self.fields.insert(field.into(), lattice);
        self
    }

    fn join_field(&self, key: &str, a: &Value, b: &Value) -> Result<Value, LatticeError> {
        match self.fields.get(key) {
            Some(lattice) => lattice.join(a, b),
            None if a == b => Ok(a.clone()),
            None if a.to_string() >= b.to_string() => Ok(a.clone()),
            None => Ok(b.clone()),
        }
    }
}

impl Lattice for RecordLattice {
    fn name(&self) -> &str {
        &self.name
    }

    fn join(&self, current: &Value, incoming: &Value) -> Result<Value, LatticeError> {
        let (cur, inc) = match (current, incoming) {
            (Value::Null, _) => return Ok(incoming.clone()),
            (_, Value::Null) => return Ok(current.clone()),
            (Value::Object(c), Value::Object(i)) => (c, i),
            (Value::Object(_), other) | (other, _) => return Err(mismatch(&self.name, other)),
        };
        let mut out = cur.clone();
        for (key, value) in inc {
            let joined = match cur.get(key) {
                Some(existing) => self.join_field(key, existing, value)?,
                None => value.clone(),
            };
            out.insert(key.clone(), joined);
        }
        Ok(Value::Object(out))
    }

    fn equivalent(&self, a: &Value, b: &Value) -> bool {
        let (Value::Object(x), Value::Object(y)) = (a, b) else {
            return a == b;
        };
        if !x.keys().eq(y.keys()) {
            return false;
        }
        x.iter().all(|(key, xv)| {
            let yv = &y[key];
            match self.fields.get(key) {
                Some(lattice) => lattice.equivalent(xv, yv),
                None => xv == yv,
            }
        })
    }
}

/// Name → lattice lookup, injected into the runtime so contact types stay
/// pluggable.
#[derive(Debug, Clone, Default)]
pub struct LatticeRegistry {
    lattices: HashMap<String, Arc<dyn Lattice>>,
}

impl LatticeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `max`, `min`, `set-union` and `or`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MaxLattice));
        registry.register(Arc::new(MinLattice));
        registry.register(Arc::new(SetUnionLattice));
        registry.register(Arc::new(OrLattice));
        registry
    }

    /// Register a lattice under its own name, replacing any previous one.
    pub fn register(&mut self, lattice: Arc<dyn Lattice>) {
        self.lattices.insert(lattice.name().to_owned(), lattice);
    }

    /// Look a lattice up by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Lattice>, LatticeError> {
        self.lattices
            .get(name)
            .cloned()
            .ok_or_else(|| LatticeError::Unknown(name.to_owned()))
    }
}
