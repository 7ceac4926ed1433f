//! Map raw feature nodes to resolved features.
//!
//! The server reports each resource as
//! `{"spec": "...", "id": {...}, "params": {...}, "children": [...]}`.
//! Spec names are not consistent across models: domain profiles prefix
//! subsystem specs with `profile.`, and some specs only exist without a
//! `domain.` or `host.` prefix. Resolution tries the reported name first and
//! then the name with exactly one of those prefixes removed.

use crate::error::{Error, Result};
use crate::registry::{FeatureSpec, SpecRegistry};
use crate::types::{FeatureId, ResolvedFeature, SpecId};
use dmr::ModelNode;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Prefixes stripped, in order, when the reported spec name is unknown.
pub const SPEC_PREFIXES: [&str; 3] = ["profile.", "domain.", "host."];

/// Spec name of path features.
pub const PATH_SPEC: &str = "path";

/// Environment-derived paths that are never provisioned state.
pub const READ_ONLY_PATHS: &[&str] = &[
    "java.home",
    "user.home",
    "user.dir",
    "jboss.home.dir",
    "jboss.server.base.dir",
    "jboss.server.config.dir",
    "jboss.server.data.dir",
    "jboss.server.log.dir",
    "jboss.server.temp.dir",
    "jboss.controller.temp.dir",
    "jboss.domain.base.dir",
    "jboss.domain.config.dir",
    "jboss.domain.data.dir",
    "jboss.domain.log.dir",
    "jboss.domain.temp.dir",
    "jboss.domain.deployment.dir",
    "jboss.domain.servers.dir",
];

const SPEC_KEY: &str = "spec";
const ID_KEY: &str = "id";
const PARAMS_KEY: &str = "params";
const CHILDREN_KEY: &str = "children";

/// Names to look up for `name`, most specific first.
pub fn spec_candidates(name: &str) -> Vec<String> {
    let mut candidates = vec![name.to_string()];
    if let Some(stripped) = SPEC_PREFIXES.iter().find_map(|p| name.strip_prefix(p))
        && !stripped.is_empty()
    {
        candidates.push(stripped.to_string());
    }
    candidates
}

/// Resolve a reported spec name against `registry`.
pub fn resolve_spec<'r>(registry: &'r dyn SpecRegistry, name: &str) -> Result<&'r FeatureSpec> {
    let candidates = spec_candidates(name);
    for candidate in &candidates {
        if let Some(spec) = registry.resolve(candidate).and_then(|id| registry.spec(&id)) {
            if candidate != name {
                debug!("Resolved feature spec '{}' as '{}'", name, candidate);
            }
            return Ok(spec);
        }
    }
    Err(Error::SpecNotFound {
        name: name.to_string(),
        tried: candidates,
    })
}

/// Whether `spec` names the path feature, possibly model-prefixed.
pub fn is_path_spec(spec: &str) -> bool {
    spec == PATH_SPEC
        || SPEC_PREFIXES
            .iter()
            .any(|p| spec.strip_prefix(p) == Some(PATH_SPEC))
}

/// Whether a path feature with these parameters is one of [`READ_ONLY_PATHS`].
pub fn is_read_only_path(params: &Map<String, Value>) -> bool {
    params
        .get(PATH_SPEC)
        .and_then(Value::as_str)
        .is_some_and(|p| READ_ONLY_PATHS.contains(&p))
}

/// Resolve every node of a read-as-features result, depth first.
pub fn resolve_features(registry: &dyn SpecRegistry, nodes: &[ModelNode]) -> Result<Vec<ResolvedFeature>> {
    let mut features = Vec::new();
    for node in nodes {
        resolve_node(registry, node, &mut features)?;
    }
    Ok(features)
}

fn resolve_node(registry: &dyn SpecRegistry, node: &ModelNode, out: &mut Vec<ResolvedFeature>) -> Result<()> {
    let raw_spec = node
        .get(SPEC_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed(None, format!("node without a spec name: {}", node)))?;

    let params = raw_params(raw_spec, node)?;
    if is_path_spec(raw_spec) && is_read_only_path(&params) {
        debug!("Skipping read-only path {}", params.get(PATH_SPEC).unwrap_or(&Value::Null));
    } else {
        let spec = resolve_spec(registry, raw_spec)?;
        out.push(build_feature(spec, params)?);
    }

    if let Some(children) = node.get(CHILDREN_KEY) {
        let children = children
            .as_array()
            .ok_or_else(|| Error::malformed(Some(raw_spec), "children is not a list"))?;
        for child in children {
            resolve_node(registry, child, out)?;
        }
    }
    Ok(())
}

/// Merge `params` and `id`, dropping undefined values. Id values win.
fn raw_params(spec: &str, node: &ModelNode) -> Result<Map<String, Value>> {
    let mut merged = Map::new();
    for key in [PARAMS_KEY, ID_KEY] {
        match node.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    if !value.is_null() {
                        merged.insert(name.clone(), value.clone());
                    }
                }
            }
            Some(other) => {
                return Err(Error::malformed(
                    Some(spec),
                    format!("'{}' is not an object: {}", key, other),
                ));
            }
        }
    }
    Ok(merged)
}

fn build_feature(spec: &FeatureSpec, raw: Map<String, Value>) -> Result<ResolvedFeature> {
    let mut params = BTreeMap::new();
    for (name, value) in raw {
        if spec.param(&name).is_some() {
            params.insert(name, value);
        } else {
            warn!("Dropping parameter '{}' unknown to feature spec '{}'", name, spec.name);
        }
    }

    let mut id_params = BTreeMap::new();
    for param in spec.id_params() {
        // address segments left at their default are not always reported
        let value = params
            .get(&param.name)
            .or(param.default.as_ref())
            .ok_or_else(|| {
                Error::malformed(Some(&spec.name), format!("missing id parameter '{}'", param.name))
            })?;
        id_params.insert(param.name.clone(), value.clone());
    }

    let spec_id = SpecId::new(spec.name.clone());
    let id = (!id_params.is_empty()).then(|| FeatureId {
        spec: spec_id.clone(),
        params: id_params,
    });
    Ok(ResolvedFeature {
        spec: spec_id,
        id,
        params,
    })
}
