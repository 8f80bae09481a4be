//! Policy normalizer — raw orchestrator document to typed [`Policy`].
//!
//! # Document shape
//!
//! ```text
//! source:   string        (optional, empty means "local")
//! query:    string        (optional)
//! interval: string        (optional duration, e.g. "10s")
//! strategy: [ { name: string, min: number, max: number, config: [ {..} ] } ]
//! target:   [ { name: string, config: [ {..} ] } ]   (optional)
//! ```
//!
//! Decoding never panics on a malformed document: each shape mismatch is
//! recorded as a [`FieldError`](crate::FieldError) and all of them are
//! returned together.
//!
//! # Canonicalization
//!
//! After a successful decode, unset fields are filled from the job's
//! identity. The group name is the second-to-last segment of the
//! orchestrator's slash-delimited target path.
//!
//! ```text
//! target.name == ""  →  target = { name: "local", config: { job_id, group } }
//! source      == ""  →  source = "local"
//!                       query  = "<op>_<metric>" → "<metric key>/<job_id>/<group>/<op>"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use gridscale_orchestrator::ScalingPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult, ValidationErrors};
use crate::types::{Policy, Strategy, Target};

/// Built-in target that scales the job through the orchestrator itself.
pub const LOCAL_TARGET: &str = "local";

/// Built-in metrics source backed by the orchestrator's own telemetry.
pub const LOCAL_SOURCE: &str = "local";

/// Telemetry key for the `cpu` metric keyword.
pub const CPU_METRIC: &str = "nomad.client.allocs.cpu.total_percent";

/// Telemetry key for the `memory` metric keyword.
pub const MEMORY_METRIC: &str = "nomad.client.allocs.memory.usage";

/// Names used when a policy leaves its target or source unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalDefaults {
    pub target: String,
    pub source: String,
}

impl Default for CanonicalDefaults {
    fn default() -> Self {
        Self {
            target: LOCAL_TARGET.to_string(),
            source: LOCAL_SOURCE.to_string(),
        }
    }
}

/// Decodes and canonicalizes raw policy documents.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    defaults: CanonicalDefaults,
}

impl Normalizer {
    pub fn new(defaults: CanonicalDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &CanonicalDefaults {
        &self.defaults
    }

    /// Turn a raw orchestrator policy into a typed [`Policy`].
    ///
    /// Returns [`PolicyError::Validation`] carrying every problem found; no
    /// partial policy is ever returned.
    pub fn normalize(&self, raw: &ScalingPolicy) -> PolicyResult<Policy> {
        let mut errors = ValidationErrors::default();
        let doc = &raw.policy;

        let strategy = decode_strategy(doc.get("strategy"), &mut errors);
        let target = decode_target(doc.get("target"), &mut errors);
        let source = optional_string(doc, "source", &mut errors);
        let query = optional_string(doc, "query", &mut errors);
        let interval = decode_interval(doc.get("interval"), &mut errors);

        let mut policy = match (strategy, target, source, query, interval) {
            (Some(strategy), Some(target), Some(source), Some(query), Some(interval))
                if errors.is_empty() =>
            {
                Policy {
                    id: raw.id.clone(),
                    source,
                    query,
                    interval,
                    target,
                    strategy,
                }
            }
            _ => return Err(PolicyError::validation(&raw.id, errors)),
        };

        self.canonicalize(raw, &mut policy)
            .map_err(|errors| PolicyError::validation(&raw.id, errors))?;

        debug!(
            policy_id = %policy.id,
            source = %policy.source,
            target = %policy.target.name,
            strategy = %policy.strategy.name,
            "policy normalized"
        );
        Ok(policy)
    }

    /// Fill unset target and source from the job's identity.
    fn canonicalize(&self, raw: &ScalingPolicy, policy: &mut Policy) -> Result<(), ValidationErrors> {
        let default_target = policy.target.name.is_empty();
        let default_source = policy.source.is_empty();
        if !default_target && !default_source {
            return Ok(());
        }

        let mut errors = ValidationErrors::default();
        let Some(group) = group_name(&raw.target) else {
            errors.push(
                "target path",
                format!("{:?} has no task group segment", raw.target),
            );
            return Err(errors);
        };

        if default_target {
            policy.target.name = self.defaults.target.clone();
            policy.target.config = Some(BTreeMap::from([
                ("job_id".to_string(), raw.job_id.clone()),
                ("group".to_string(), group.to_string()),
            ]));
        }

        if default_source {
            match split_query(&policy.query) {
                Some((op, metric)) => {
                    policy.source = self.defaults.source.clone();
                    policy.query = format!(
                        "{}/{}/{}/{}",
                        telemetry_key(metric),
                        raw.job_id,
                        group,
                        op
                    );
                }
                None => errors.push(
                    "query",
                    format!(
                        "{:?} is not of the form <operation>_<metric>",
                        policy.query
                    ),
                ),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Second-to-last segment of a slash-delimited target path.
fn group_name(path: &str) -> Option<&str> {
    path.rsplit('/').nth(1).filter(|group| !group.is_empty())
}

/// Split a `<operation>_<metric>` query into its two tokens.
fn split_query(query: &str) -> Option<(&str, &str)> {
    let mut parts = query.split('_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(op), Some(metric), None) if !op.is_empty() && !metric.is_empty() => {
            Some((op, metric))
        }
        _ => None,
    }
}

/// Map a metric keyword onto its telemetry key. Unknown keywords pass
/// through unchanged.
fn telemetry_key(metric: &str) -> &str {
    match metric {
        "cpu" => CPU_METRIC,
        "memory" => MEMORY_METRIC,
        other => other,
    }
}

// ── Decoding ───────────────────────────────────────────────────────

fn decode_strategy(value: Option<&Value>, errors: &mut ValidationErrors) -> Option<Strategy> {
    let value = match value {
        None | Some(Value::Null) => {
            errors.push("strategy", "missing");
            return None;
        }
        Some(value) => value,
    };
    let block = single_block(value, "strategy", errors)?;

    let name = required_string(block, "name", "strategy[0].name", errors);
    let min = required_int(block, "min", "strategy[0].min", errors);
    let max = required_int(block, "max", "strategy[0].max", errors);
    let config = optional_config(block.get("config"), "strategy[0].config", errors);

    let (Some(name), Some(min), Some(max), Some(config)) = (name, min, max, config) else {
        return None;
    };
    Some(Strategy {
        name,
        min,
        max,
        config: config.unwrap_or_default(),
    })
}

fn decode_target(value: Option<&Value>, errors: &mut ValidationErrors) -> Option<Target> {
    let value = match value {
        None | Some(Value::Null) => return Some(Target::default()),
        Some(value) => value,
    };
    let block = single_block(value, "target", errors)?;

    let name = required_string(block, "name", "target[0].name", errors);
    let config = optional_config(block.get("config"), "target[0].config", errors);

    let (Some(name), Some(config)) = (name, config) else {
        return None;
    };
    Some(Target { name, config })
}

fn decode_interval(value: Option<&Value>, errors: &mut ValidationErrors) -> Option<Duration> {
    match value {
        None | Some(Value::Null) => Some(Duration::ZERO),
        Some(Value::String(s)) if s.is_empty() => Some(Duration::ZERO),
        Some(Value::String(s)) => match humantime::parse_duration(s) {
            Ok(interval) => Some(interval),
            Err(e) => {
                errors.push("interval", format!("invalid duration {s:?}: {e}"));
                None
            }
        },
        Some(other) => {
            errors.push("interval", format!("expected a string, found {}", kind(other)));
            None
        }
    }
}

/// Unwrap the `[ { .. } ]` shape block-style config parsers produce.
fn single_block<'a>(
    value: &'a Value,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<&'a Map<String, Value>> {
    let Value::Array(items) = value else {
        errors.push(field, format!("expected a list, found {}", kind(value)));
        return None;
    };
    let Some(first) = items.first() else {
        errors.push(field, "expected one block, found an empty list");
        return None;
    };
    match first {
        Value::Object(block) => Some(block),
        other => {
            errors.push(
                format!("{field}[0]"),
                format!("expected a mapping, found {}", kind(other)),
            );
            None
        }
    }
}

/// Decode an optional `config` block, stringifying every value.
///
/// Returns `Some(None)` when absent and `None` when malformed.
fn optional_config(
    value: Option<&Value>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<Option<BTreeMap<String, String>>> {
    let value = match value {
        None | Some(Value::Null) => return Some(None),
        Some(value) => value,
    };
    let block = single_block(value, field, errors)?;

    let mut config = BTreeMap::new();
    let mut ok = true;
    for (key, value) in block {
        match stringify(value) {
            Some(s) => {
                config.insert(key.clone(), s);
            }
            None => {
                errors.push(
                    format!("{field}[0].{key}"),
                    format!("expected a scalar, found {}", kind(value)),
                );
                ok = false;
            }
        }
    }
    ok.then_some(Some(config))
}

fn required_string(
    block: &Map<String, Value>,
    key: &str,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<String> {
    match block.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => {
            errors.push(field, "missing");
            None
        }
        Some(other) => {
            errors.push(field, format!("expected a string, found {}", kind(other)));
            None
        }
    }
}

/// Decode a required number, truncating toward zero.
fn required_int(
    block: &Map<String, Value>,
    key: &str,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<i64> {
    match block.get(key) {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Some(f.trunc() as i64)
                }
                _ => {
                    errors.push(field, format!("{n} is out of range"));
                    None
                }
            }
        }
        None | Some(Value::Null) => {
            errors.push(field, "missing");
            None
        }
        Some(other) => {
            errors.push(field, format!("expected a number, found {}", kind(other)));
            None
        }
    }
}

fn optional_string(
    doc: &Map<String, Value>,
    key: &str,
    errors: &mut ValidationErrors,
) -> Option<String> {
    match doc.get(key) {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            errors.push(key, format!("expected a string, found {}", kind(other)));
            None
        }
    }
}

/// Uniform textual form of a scalar config value.
fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(doc: Value) -> ScalingPolicy {
        ScalingPolicy {
            id: "p1".to_string(),
            job_id: "web".to_string(),
            target: "default/web/group/web".to_string(),
            policy: doc.as_object().cloned().unwrap_or_default(),
        }
    }

    fn normalize(doc: Value) -> PolicyResult<Policy> {
        Normalizer::default().normalize(&raw(doc))
    }

    fn validation_errors(doc: Value) -> ValidationErrors {
        match normalize(doc) {
            Err(PolicyError::Validation { errors, .. }) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn strategy_block() -> Value {
        json!([{ "name": "target-value", "min": 1, "max": 10 }])
    }

    #[test]
    fn defaults_local_source_and_target() {
        let policy = normalize(json!({
            "strategy": [{
                "name": "target-value",
                "min": 1,
                "max": 10,
                "config": [{ "target": 5 }],
            }],
            "source": "",
            "query": "avg_memory",
            "target": null,
        }))
        .unwrap();

        assert_eq!(policy.id, "p1");
        assert_eq!(policy.source, "local");
        assert_eq!(policy.query, format!("{MEMORY_METRIC}/web/group/avg"));
        assert_eq!(policy.interval, Duration::ZERO);
        assert_eq!(policy.target.name, "local");
        assert_eq!(
            policy.target.config,
            Some(BTreeMap::from([
                ("job_id".to_string(), "web".to_string()),
                ("group".to_string(), "group".to_string()),
            ]))
        );
        assert_eq!(
            policy.strategy,
            Strategy {
                name: "target-value".to_string(),
                min: 1,
                max: 10,
                config: BTreeMap::from([("target".to_string(), "5".to_string())]),
            }
        );
    }

    #[test]
    fn cpu_query_rewritten_to_telemetry_path() {
        let policy = normalize(json!({ "strategy": strategy_block(), "query": "avg_cpu" })).unwrap();
        assert_eq!(policy.source, LOCAL_SOURCE);
        assert_eq!(policy.query, format!("{CPU_METRIC}/web/group/avg"));
    }

    #[test]
    fn unknown_metric_passes_through() {
        let policy =
            normalize(json!({ "strategy": strategy_block(), "query": "max_requests" })).unwrap();
        assert_eq!(policy.query, "requests/web/group/max");
    }

    #[test]
    fn explicit_source_and_target_are_kept_verbatim() {
        let policy = normalize(json!({
            "source": "prometheus",
            "query": "sum(rate(http_requests_total[1m]))",
            "interval": "30s",
            "strategy": strategy_block(),
            "target": [{
                "name": "aws-asg",
                "config": [{ "asg_name": "workers", "dry_run": true, "retries": 3 }],
            }],
        }))
        .unwrap();

        assert_eq!(policy.source, "prometheus");
        assert_eq!(policy.query, "sum(rate(http_requests_total[1m]))");
        assert_eq!(policy.interval, Duration::from_secs(30));
        assert_eq!(policy.target.name, "aws-asg");
        assert_eq!(
            policy.target.config,
            Some(BTreeMap::from([
                ("asg_name".to_string(), "workers".to_string()),
                ("dry_run".to_string(), "true".to_string()),
                ("retries".to_string(), "3".to_string()),
            ]))
        );
    }

    #[test]
    fn target_without_config_keeps_config_absent() {
        let policy = normalize(json!({
            "source": "prometheus",
            "query": "up",
            "strategy": strategy_block(),
            "target": [{ "name": "aws-asg" }],
        }))
        .unwrap();
        assert_eq!(policy.target.name, "aws-asg");
        assert!(policy.target.config.is_none());
    }

    #[test]
    fn explicit_target_with_default_source() {
        let policy = normalize(json!({
            "query": "avg_cpu",
            "strategy": strategy_block(),
            "target": [{ "name": "aws-asg" }],
        }))
        .unwrap();
        assert_eq!(policy.target.name, "aws-asg");
        assert!(policy.target.config.is_none());
        assert_eq!(policy.source, LOCAL_SOURCE);
    }

    #[test]
    fn numbers_are_truncated_and_stringified() {
        let policy = normalize(json!({
            "source": "prometheus",
            "query": "up",
            "strategy": [{
                "name": "threshold",
                "min": 1.9,
                "max": 10.0,
                "config": [{ "ratio": 0.5, "whole": 4.0, "enabled": false, "label": "x" }],
            }],
        }))
        .unwrap();

        assert_eq!(policy.strategy.min, 1);
        assert_eq!(policy.strategy.max, 10);
        assert_eq!(policy.strategy.config["ratio"], "0.5");
        assert_eq!(policy.strategy.config["whole"], "4");
        assert_eq!(policy.strategy.config["enabled"], "false");
        assert_eq!(policy.strategy.config["label"], "x");
    }

    #[test]
    fn missing_strategy_is_a_validation_error() {
        let errors = validation_errors(json!({ "query": "avg_cpu" }));
        assert!(errors.has_field("strategy"));
    }

    #[test]
    fn strategy_not_a_list_is_a_validation_error() {
        let errors = validation_errors(json!({
            "query": "avg_cpu",
            "strategy": { "name": "target-value", "min": 1, "max": 2 },
        }));
        assert!(errors.has_field("strategy"));
    }

    #[test]
    fn empty_strategy_list_is_reported() {
        let errors = validation_errors(json!({ "query": "avg_cpu", "strategy": [] }));
        assert_eq!(errors.len(), 1);
        assert!(errors.has_field("strategy"));
    }

    #[test]
    fn strategy_element_must_be_a_mapping() {
        let errors = validation_errors(json!({ "query": "avg_cpu", "strategy": ["target-value"] }));
        assert!(errors.has_field("strategy[0]"));
    }

    #[test]
    fn all_field_errors_are_aggregated() {
        let errors = validation_errors(json!({
            "source": 7,
            "interval": "soon",
            "strategy": [{ "min": "one", "config": [{ "nested": [1, 2] }] }],
            "target": [{ "config": [{}] }],
        }));

        for field in [
            "source",
            "interval",
            "strategy[0].name",
            "strategy[0].min",
            "strategy[0].max",
            "strategy[0].config[0].nested",
            "target[0].name",
        ] {
            assert!(errors.has_field(field), "missing error for {field}: {errors}");
        }
    }

    #[test]
    fn invalid_interval_is_a_hard_error() {
        let errors = validation_errors(json!({
            "source": "prometheus",
            "query": "up",
            "interval": "every so often",
            "strategy": strategy_block(),
        }));
        assert!(errors.has_field("interval"));
    }

    #[test]
    fn empty_interval_means_default() {
        let policy = normalize(json!({
            "source": "prometheus",
            "query": "up",
            "interval": "",
            "strategy": strategy_block(),
        }))
        .unwrap();
        assert_eq!(policy.interval, Duration::ZERO);
    }

    #[test]
    fn interval_units() {
        for (text, expected) in [
            ("500ms", Duration::from_millis(500)),
            ("10s", Duration::from_secs(10)),
            ("5m", Duration::from_secs(300)),
            ("1h", Duration::from_secs(3600)),
        ] {
            let policy = normalize(json!({
                "source": "prometheus",
                "query": "up",
                "interval": text,
                "strategy": strategy_block(),
            }))
            .unwrap();
            assert_eq!(policy.interval, expected, "interval {text}");
        }
    }

    #[test]
    fn malformed_queries_are_rejected_when_source_defaults() {
        for query in ["", "avg", "avg_", "_cpu", "avg_cpu_total"] {
            let errors = validation_errors(json!({ "query": query, "strategy": strategy_block() }));
            assert!(errors.has_field("query"), "query {query:?} accepted");
        }
    }

    #[test]
    fn malformed_query_is_fine_with_explicit_source() {
        let policy = normalize(json!({
            "source": "prometheus",
            "query": "avg_cpu_total",
            "strategy": strategy_block(),
            "target": [{ "name": "aws-asg" }],
        }))
        .unwrap();
        assert_eq!(policy.query, "avg_cpu_total");
    }

    #[test]
    fn short_target_path_is_rejected_when_defaulting() {
        let mut policy = raw(json!({ "query": "avg_cpu", "strategy": strategy_block() }));
        policy.target = "web".to_string();

        let err = Normalizer::default().normalize(&policy).unwrap_err();
        assert!(err.field_errors().unwrap().has_field("target path"));
    }

    #[test]
    fn custom_canonical_defaults() {
        let normalizer = Normalizer::new(CanonicalDefaults {
            target: "nomad-target".to_string(),
            source: "nomad-apm".to_string(),
        });
        let policy = normalizer
            .normalize(&raw(json!({ "query": "avg_cpu", "strategy": strategy_block() })))
            .unwrap();
        assert_eq!(policy.target.name, "nomad-target");
        assert_eq!(policy.source, "nomad-apm");
    }

    #[test]
    fn normalization_is_deterministic() {
        let doc = raw(json!({
            "query": "avg_cpu",
            "strategy": [{ "name": "target-value", "min": 1, "max": 3, "config": [{ "target": 70 }] }],
        }));
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.normalize(&doc).unwrap(),
            normalizer.normalize(&doc).unwrap()
        );
    }

    #[test]
    fn group_and_query_helpers() {
        assert_eq!(group_name("default/web/group/web"), Some("group"));
        assert_eq!(group_name("a/b"), Some("a"));
        assert_eq!(group_name("web"), None);
        assert_eq!(group_name("a//b"), None);

        assert_eq!(split_query("avg_cpu"), Some(("avg", "cpu")));
        assert_eq!(split_query("avg"), None);
        assert_eq!(split_query("a_b_c"), None);

        assert_eq!(telemetry_key("cpu"), CPU_METRIC);
        assert_eq!(telemetry_key("memory"), MEMORY_METRIC);
        assert_eq!(telemetry_key("disk"), "disk");
    }
}
