//! Webhook trigger node.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use ulid::Ulid;

use crate::plugin::{
    ActivationContext, ActivationState, ActivationType, NodeCategory, NodeDefinition, NodePlugin,
    NodeResult, PluginError, PortSpec, RunContext, ValidationOutcome,
};

/// An externally-invoked entry point. Activation registers the receiving
/// endpoint and returns its handle; the scheduler's webhook router maps
/// receipts on that path back to Execute jobs.
pub struct WebhookTriggerNode;

impl WebhookTriggerNode {
    fn path_from(config: &JsonValue) -> Option<&str> {
        config.get("path").and_then(JsonValue::as_str)
    }
}

#[async_trait]
impl NodePlugin for WebhookTriggerNode {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            sub_type: "core.webhook_trigger".to_string(),
            title: "Webhook trigger".to_string(),
            category: NodeCategory::Trigger,
            inputs: vec![],
            outputs: vec![PortSpec::output("output")],
            config_schema: serde_json::json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Receiving path, e.g. /hooks/my-workflow"
                    },
                    "secret": {
                        "type": "string",
                        "description": "Optional shared secret for receipt validation"
                    }
                }
            }),
            activation: Some(ActivationType::Webhook),
        }
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        match Self::path_from(config) {
            Some(path) if path.starts_with('/') && path.len() > 1 => ValidationOutcome::ok(),
            Some(_) => ValidationOutcome::fail_at("path", "path must start with '/'"),
            None => ValidationOutcome::fail_at("path", "path is required"),
        }
    }

    async fn run(&self, _ctx: RunContext) -> NodeResult {
        // Reached only in test mode; live executions are seeded from the
        // received payload.
        let outputs: HashMap<String, JsonValue> = [(
            "output".to_string(),
            serde_json::json!({"headers": {}, "body": {}}),
        )]
        .into_iter()
        .collect();
        NodeResult::success(outputs)
    }

    async fn on_activate(&self, ctx: &ActivationContext) -> Result<ActivationState, PluginError> {
        let path = Self::path_from(&ctx.config).ok_or_else(|| PluginError::InvalidConfig {
            message: "path is required".to_string(),
        })?;

        Ok(ActivationState::new(serde_json::json!({
            "webhook_id": format!("whk_{}", Ulid::new()),
            "path": path,
            "created_at": Utc::now(),
        })))
    }

    async fn on_deactivate(
        &self,
        _ctx: &ActivationContext,
        state: ActivationState,
    ) -> Result<(), PluginError> {
        if state.as_value().get("webhook_id").is_none() {
            return Err(PluginError::Hook {
                message: "activation state has no webhook_id".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use slatebase_core::WorkflowId;

    fn ctx(config: JsonValue) -> ActivationContext {
        ActivationContext {
            workflow_id: WorkflowId::new(),
            node_id: NodeId::new(),
            config,
        }
    }

    #[test]
    fn validates_path() {
        let node = WebhookTriggerNode;
        assert!(node.validate(&serde_json::json!({"path": "/hooks/x"})).valid);
        assert!(!node.validate(&serde_json::json!({"path": "hooks/x"})).valid);
        assert!(!node.validate(&serde_json::json!({})).valid);
    }

    #[tokio::test]
    async fn activation_returns_webhook_handle() {
        let node = WebhookTriggerNode;
        let state = node
            .on_activate(&ctx(serde_json::json!({"path": "/hooks/x"})))
            .await
            .expect("should activate");

        let value = state.as_value();
        assert!(value["webhook_id"].as_str().unwrap().starts_with("whk_"));
        assert_eq!(value["path"], "/hooks/x");
    }

    #[tokio::test]
    async fn activation_rejects_missing_path() {
        let node = WebhookTriggerNode;
        let result = node.on_activate(&ctx(serde_json::json!({}))).await;
        assert!(matches!(result, Err(PluginError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn deactivation_accepts_prior_state() {
        let node = WebhookTriggerNode;
        let config = serde_json::json!({"path": "/hooks/x"});
        let state = node.on_activate(&ctx(config.clone())).await.unwrap();

        let result = node.on_deactivate(&ctx(config), state).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn deactivation_rejects_foreign_state() {
        let node = WebhookTriggerNode;
        let state = ActivationState::new(serde_json::json!({"something": "else"}));

        let result = node
            .on_deactivate(&ctx(serde_json::json!({"path": "/hooks/x"})), state)
            .await;
        assert!(matches!(result, Err(PluginError::Hook { .. })));
    }
}
