#![deny(missing_docs)]
//! Aspect manifests and the registry that orders and composes them.
//!
//! An aspect is a cross-cutting behavior attached to a wire. Data-plane
//! aspects lower to a shim gadget spliced into the wire; control-plane
//! aspects only annotate it. The [`AspectRegistry`] is the single source
//! of truth for canonical ordering: two wires carrying the same aspects
//! in any declared order lower to the same shim chain.
//!
//! When several instances of one aspect land on the same wire they are
//! folded into one shim. If the manifest declares a `compose` lattice the
//! parameters are joined through it, otherwise the last instance in
//! canonical order wins.

use bassline_core::error::AspectError;
use bassline_core::id::AspectId;
use bassline_core::ir::AspectInstance;
use bassline_core::lattice::{Lattice, MinLattice, RecordLattice, json_type_name};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Where an aspect may be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectScope {
    /// On a wire.
    Wire,
    /// On a single pin.
    Pin,
    /// On a slot.
    Slot,
    /// On a whole board.
    Board,
    /// On the binder itself.
    Binder,
}

/// Where a data-plane shim sits relative to the wire's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPoint {
    /// Just in front of the target's input pin.
    BeforeInput,
    /// Just behind the source's output pin.
    AfterOutput,
    /// Wrapping the whole wire.
    Around,
}

impl JoinPoint {
    /// Tag form, e.g. `after-output`.
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinPoint::BeforeInput => "before-input",
            JoinPoint::AfterOutput => "after-output",
            JoinPoint::Around => "around",
        }
    }
}

/// What an aspect lowers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AspectKind {
    /// Lowers to a shim node running `shim` from the gadget library.
    DataPlane {
        /// Position of the shim.
        join_point: JoinPoint,
        /// Gadget library name of the shim.
        shim: String,
    },
    /// Annotates edges; no shim.
    ControlPlane,
}

/// Static description of an aspect.
#[derive(Debug, Clone)]
pub struct AspectManifest {
    /// Aspect id.
    pub id: AspectId,
    /// Where the aspect may be attached.
    pub scopes: BTreeSet<AspectScope>,
    /// Position in canonical order. Lower runs earlier.
    pub order_key: i64,
    /// Traits the aspect needs on the wire.
    pub requires: BTreeSet<String>,
    /// Traits that must not be present alongside it.
    pub forbids: BTreeSet<String>,
    /// JSON-schema-shaped description of the params.
    pub schema: Option<Value>,
    /// Lattice used to fold params of several instances on one wire.
    pub compose: Option<Arc<dyn Lattice>>,
    /// Data or control plane.
    pub kind: AspectKind,
}

impl AspectManifest {
    /// A data-plane aspect scoped to wires.
    pub fn data_plane(
        id: impl Into<AspectId>,
        join_point: JoinPoint,
        shim: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            id.into(),
            AspectKind::DataPlane {
                join_point,
                shim: shim.into(),
            },
        )
    }

    /// A control-plane aspect scoped to wires.
    pub fn control_plane(id: impl Into<AspectId>) -> Self {
        Self::with_kind(id.into(), AspectKind::ControlPlane)
    }

    fn with_kind(id: AspectId, kind: AspectKind) -> Self {
        Self {
            id,
            scopes: BTreeSet::from([AspectScope::Wire]),
            order_key: 0,
            requires: BTreeSet::new(),
            forbids: BTreeSet::new(),
            schema: None,
            compose: None,
            kind,
        }
    }

    /// Set the canonical order key.
    pub fn with_order(mut self, order_key: i64) -> Self {
        self.order_key = order_key;
        self
    }

    /// Replace the allowed scopes.
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = AspectScope>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    /// Add a required trait.
    pub fn requiring(mut self, trait_name: impl Into<String>) -> Self {
        self.requires.insert(trait_name.into());
        self
    }

    /// Add a forbidden trait.
    pub fn forbidding(mut self, trait_name: impl Into<String>) -> Self {
        self.forbids.insert(trait_name.into());
        self
    }

    /// Set the params schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the composition lattice.
    pub fn with_compose(mut self, lattice: Arc<dyn Lattice>) -> Self {
        self.compose = Some(lattice);
        self
    }

    /// Whether the aspect may be attached at `scope`.
    pub fn allows(&self, scope: AspectScope) -> bool {
        self.scopes.contains(&scope)
    }

    /// Shim template, if this is a data-plane aspect.
    pub fn shim(&self) -> Option<&str> {
        match &self.kind {
            AspectKind::DataPlane { shim, .. } => Some(shim),
            AspectKind::ControlPlane => None,
        }
    }
}

/// Outcome of a compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compatibility {
    /// Whether the aspects can share a wire.
    pub compatible: bool,
    /// Why not, when they can't.
    pub reason: Option<String>,
}

impl Compatibility {
    fn ok() -> Self {
        Self {
            compatible: true,
            reason: None,
        }
    }

    fn conflict(reason: String) -> Self {
        Self {
            compatible: false,
            reason: Some(reason),
        }
    }
}

/// Several instances of one aspect folded into one.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedAspect {
    /// Aspect id.
    pub aspect: AspectId,
    /// Merged params.
    pub params: Value,
    /// Indices into the input slice of the instances that contributed.
    pub contributors: Vec<usize>,
    /// Indices of dropped instances and why they were dropped.
    pub dropped: Vec<(usize, String)>,
}

/// Registry of aspect manifests.
#[derive(Debug, Clone, Default)]
pub struct AspectRegistry {
    manifests: BTreeMap<AspectId, Arc<AspectManifest>>,
}

impl AspectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `tap`, `rate-limit` and `audit`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for manifest in builtins() {
            // Ids are distinct, registration cannot fail.
            let _ = registry.register(manifest);
        }
        registry
    }

    /// Register a manifest. A second manifest with the same id is rejected.
    pub fn register(&mut self, manifest: AspectManifest) -> Result<(), AspectError> {
        if self.manifests.contains_key(&manifest.id) {
            return Err(AspectError::Duplicate(manifest.id.to_string()));
        }
        tracing::debug!(aspect = %manifest.id, "bassline.aspects.registered");
        self.manifests.insert(manifest.id.clone(), Arc::new(manifest));
        Ok(())
    }

    /// Look a manifest up.
    pub fn get(&self, id: &AspectId) -> Option<Arc<AspectManifest>> {
        self.manifests.get(id).cloned()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &AspectId> {
        self.manifests.keys()
    }

    /// Sort ids by `(order_key, id)`. Unknown ids sort last, by id.
    pub fn sort_canonically(&self, ids: &mut [AspectId]) {
        ids.sort_by(|a, b| self.sort_key(a).cmp(&self.sort_key(b)));
    }

    /// Sort aspect instances by their aspect's canonical position. Stable,
    /// so instances of the same aspect keep their declared order.
    pub fn sort_instances(&self, instances: &mut [AspectInstance]) {
        instances.sort_by(|a, b| self.sort_key(&a.aspect).cmp(&self.sort_key(&b.aspect)));
    }

    fn sort_key<'a>(&self, id: &'a AspectId) -> (bool, i64, &'a str) {
        match self.manifests.get(id) {
            Some(m) => (false, m.order_key, id.as_str()),
            None => (true, 0, id.as_str()),
        }
    }

    /// Whether the aspects can coexist on one wire: no trait may be both
    /// required and forbidden across the set.
    pub fn check_compatibility(&self, ids: &[AspectId]) -> Compatibility {
        let mut requires: BTreeMap<&str, &AspectId> = BTreeMap::new();
        let mut forbids: BTreeMap<&str, &AspectId> = BTreeMap::new();
        for id in ids {
            let Some(manifest) = self.manifests.get(id) else {
                return Compatibility::conflict(format!("unknown aspect: {id}"));
            };
            for t in &manifest.requires {
                requires.entry(t).or_insert(id);
            }
            for t in &manifest.forbids {
                forbids.entry(t).or_insert(id);
            }
        }
        for (t, needer) in &requires {
            if let Some(forbidder) = forbids.get(t) {
                return Compatibility::conflict(format!(
                    "{needer} requires '{t}' which {forbidder} forbids"
                ));
            }
        }
        Compatibility::ok()
    }

    /// Check params against the manifest schema. No schema accepts anything.
    pub fn validate_params(
        &self,
        manifest: &AspectManifest,
        params: &Value,
    ) -> Result<(), AspectError> {
        let Some(schema) = &manifest.schema else {
            return Ok(());
        };
        validate_against(params, schema).map_err(|message| AspectError::InvalidParams {
            aspect: manifest.id.to_string(),
            message,
        })
    }

    /// Fold several instances of one aspect.
    ///
    /// Each instance is validated first; invalid ones are reported in
    /// `dropped`. Survivors are joined through the manifest's `compose`
    /// lattice, or the last survivor wins. Returns `None` when nothing
    /// survives.
    pub fn compose(
        &self,
        manifest: &AspectManifest,
        instances: &[AspectInstance],
    ) -> Option<ComposedAspect> {
        let mut contributors = Vec::new();
        let mut dropped = Vec::new();
        let mut params = Value::Null;

        for (index, instance) in instances.iter().enumerate() {
            if let Err(e) = self.validate_params(manifest, &instance.params) {
                tracing::warn!(aspect = %manifest.id, index, error = %e, "bassline.aspects.instance_dropped");
                dropped.push((index, e.to_string()));
                continue;
            }
            let merged = match &manifest.compose {
                Some(lattice) => lattice.join(&params, &instance.params),
                None => Ok(instance.params.clone()),
            };
            match merged {
                Ok(merged) => {
                    params = merged;
                    contributors.push(index);
                }
                Err(e) => {
                    tracing::warn!(aspect = %manifest.id, index, error = %e, "bassline.aspects.instance_dropped");
                    dropped.push((index, e.to_string()));
                }
            }
        }

        if contributors.is_empty() {
            return None;
        }
        Some(ComposedAspect {
            aspect: manifest.id.clone(),
            params,
            contributors,
            dropped,
        })
    }
}

fn builtins() -> Vec<AspectManifest> {
    vec![
        AspectManifest::data_plane("tap", JoinPoint::AfterOutput, "tap")
            .with_order(100)
            .with_scopes([AspectScope::Wire, AspectScope::Pin]),
        AspectManifest::data_plane("rate-limit", JoinPoint::BeforeInput, "rate-limit")
            .with_order(200)
            .with_schema(json!({
                "type": "object",
                "properties": {"rps": {"type": "number"}},
                "required": ["rps"]
            }))
            .with_compose(Arc::new(
                RecordLattice::new("rate-limit").field("rps", Arc::new(MinLattice)),
            )),
        AspectManifest::control_plane("audit")
            .with_order(0)
            .with_scopes([AspectScope::Wire, AspectScope::Board, AspectScope::Binder]),
    ]
}

/// Shallow JSON-schema check: top-level `type`, `required` and property
/// `type`s.
fn validate_against(params: &Value, schema: &Value) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(Value::String(ty)) = schema_obj.get("type")
        && !json_type_matches(params, ty)
    {
        return Err(format!("expected {ty} params, got {}", json_type_name(params)));
    }

    let Some(params_obj) = params.as_object() else {
        return Ok(());
    };

    if let Some(Value::Array(required)) = schema_obj.get("required") {
        for field in required {
            if let Some(name) = field.as_str()
                && !params_obj.contains_key(name)
            {
                return Err(format!("missing required field: {name}"));
            }
        }
    }

    if let Some(Value::Object(properties)) = schema_obj.get("properties") {
        for (name, prop) in properties {
            if let Some(value) = params_obj.get(name)
                && let Some(Value::String(expected)) = prop.get("type")
                && !json_type_matches(value, expected)
            {
                return Err(format!(
                    "field '{name}' expected type '{expected}', got '{}'",
                    json_type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn json_type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_wrong_property_type() {
        let err = validate_against(
            &json!({"rps": "fast"}),
            &json!({"type": "object", "properties": {"rps": {"type": "number"}}}),
        )
        .unwrap_err();
        assert_eq!(err, "field 'rps' expected type 'number', got 'string'");
    }

    #[test]
    fn schema_rejects_non_object_params() {
        let err = validate_against(&Value::Null, &json!({"type": "object"})).unwrap_err();
        assert_eq!(err, "expected object params, got null");
    }

    #[test]
    fn non_object_schema_accepts_anything() {
        assert!(validate_against(&json!(5), &json!(true)).is_ok());
    }
}
