//! Delay node.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::plugin::{
    NodeCategory, NodeDefinition, NodePlugin, NodeResult, PortSpec, RunContext, ValidationOutcome,
};

/// Suspends the execution for a configured duration.
///
/// The node returns `waiting` with its input already forwarded to the
/// output port, so the engine records and fans out the value before
/// freezing. When the resume job fires the traversal simply continues; the
/// delay node itself is never re-entered.
pub struct DelayNode;

impl DelayNode {
    fn duration_ms(config: &JsonValue) -> Option<i64> {
        config.get("duration_ms").and_then(JsonValue::as_i64)
    }

    fn passthrough(ctx: &RunContext) -> HashMap<String, JsonValue> {
        let value = ctx.input("input").cloned().unwrap_or(JsonValue::Null);
        [("output".to_string(), value)].into_iter().collect()
    }
}

#[async_trait]
impl NodePlugin for DelayNode {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            sub_type: "core.delay".to_string(),
            title: "Delay".to_string(),
            category: NodeCategory::Action,
            inputs: vec![PortSpec::required("input")],
            outputs: vec![PortSpec::output("output")],
            config_schema: serde_json::json!({
                "type": "object",
                "required": ["duration_ms"],
                "properties": {
                    "duration_ms": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "How long to pause before downstream nodes run"
                    }
                }
            }),
            activation: None,
        }
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        match Self::duration_ms(config) {
            Some(ms) if ms > 0 => ValidationOutcome::ok(),
            Some(_) => ValidationOutcome::fail_at("duration_ms", "must be positive"),
            None => ValidationOutcome::fail_at("duration_ms", "duration_ms is required"),
        }
    }

    async fn run(&self, ctx: RunContext) -> NodeResult {
        let outputs = Self::passthrough(&ctx);

        if ctx.test_mode {
            // Test runs never suspend.
            return NodeResult::success(outputs);
        }

        match Self::duration_ms(&ctx.config) {
            Some(ms) if ms > 0 => {
                let resume_at = Utc::now() + Duration::milliseconds(ms);
                NodeResult::waiting(resume_at, outputs)
            }
            _ => NodeResult::error("delay requires a positive duration_ms"),
        }
    }
}
