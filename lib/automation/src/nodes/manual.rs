//! Manual trigger node.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::plugin::{
    NodeCategory, NodeDefinition, NodePlugin, NodeResult, PortSpec, RunContext, ValidationOutcome,
};

/// A user-initiated entry point. Fired through the job submission API with
/// whatever payload the caller supplies; requires no external activation.
pub struct ManualTriggerNode;

#[async_trait]
impl NodePlugin for ManualTriggerNode {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            sub_type: "core.manual_trigger".to_string(),
            title: "Manual trigger".to_string(),
            category: NodeCategory::Trigger,
            inputs: vec![],
            outputs: vec![PortSpec::output("output")],
            config_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "sample": {
                        "type": "object",
                        "description": "Payload returned by test-mode runs"
                    }
                }
            }),
            activation: None,
        }
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        if config.is_null() || config.is_object() {
            ValidationOutcome::ok()
        } else {
            ValidationOutcome::fail_at("", "config must be an object")
        }
    }

    async fn run(&self, ctx: RunContext) -> NodeResult {
        // Triggers are seeded from the triggering payload during real
        // executions; run is only reached in test mode.
        let sample = ctx
            .config
            .get("sample")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let outputs: HashMap<String, JsonValue> =
            [("output".to_string(), sample)].into_iter().collect();
        NodeResult::success(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::NodeStatus;

    #[test]
    fn definition_is_a_trigger_without_activation() {
        let def = ManualTriggerNode.definition();
        assert_eq!(def.category, NodeCategory::Trigger);
        assert!(def.activation.is_none());
        assert!(def.inputs.is_empty());
    }

    #[test]
    fn validates_object_configs() {
        assert!(ManualTriggerNode.validate(&serde_json::json!({})).valid);
        assert!(ManualTriggerNode.validate(&JsonValue::Null).valid);
        assert!(!ManualTriggerNode.validate(&serde_json::json!(42)).valid);
    }

    #[tokio::test]
    async fn test_mode_returns_configured_sample() {
        let ctx = RunContext::test(serde_json::json!({"sample": {"record_id": 7}}));
        let result = ManualTriggerNode.run(ctx).await;

        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(
            result.outputs.get("output"),
            Some(&serde_json::json!({"record_id": 7}))
        );
    }
}
