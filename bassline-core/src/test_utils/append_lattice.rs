//! AppendLattice: a deliberately broken "lattice" for divergence tests.

use crate::error::LatticeError;
use crate::lattice::{Lattice, json_type_name};
use serde_json::Value;

/// Concatenates arrays. Not idempotent, so every join is a change and a
/// cyclic wiring never settles on its own. Only the propagation engine's
/// bounds stop it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendLattice;

impl Lattice for AppendLattice {
    fn name(&self) -> &str {
        "append"
    }

    fn join(&self, current: &Value, incoming: &Value) -> Result<Value, LatticeError> {
        let items = |v: &Value| match v {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items.clone()),
            other => Err(LatticeError::TypeMismatch {
                lattice: "append".into(),
                found: json_type_name(other).into(),
            }),
        };
        let mut out = items(current)?;
        out.extend(items(incoming)?);
        Ok(Value::Array(out))
    }
}
