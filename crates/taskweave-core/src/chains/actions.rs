//! Step actions - the capability interface chain steps execute through
//!
//! Actions are selected by tag, not by runtime type inspection: a step
//! definition names an action, the registry resolves it, and the engine
//! invokes it with the accumulated chain data. The built-in `prompt`
//! action routes the step through the reasoning provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ChainError;
use crate::provider::{ExecuteOptions, PromptRequest, ReasoningProvider};
use crate::tasks::Task;

/// Input handed to an action invocation
#[derive(Debug, Clone)]
pub struct StepInput {
    pub chain_id: String,
    pub step_index: usize,
    pub task: Task,
    /// Accumulated chain data at the time the step became ready
    pub chain_data: serde_json::Map<String, serde_json::Value>,
}

/// Output of an action invocation
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub content: String,
    /// Entries merged into the chain data before dependents run
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl StepOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: serde_json::Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// A capability invocable as a chain step
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn invoke(&self, input: StepInput) -> Result<StepOutput, ChainError>;
}

/// Registry resolving action tags to implementations
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn StepAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `prompt` action wired to the provider
    pub fn with_builtins(provider: Arc<ReasoningProvider>) -> Self {
        let mut registry = Self::new();
        registry.register("prompt", Arc::new(PromptAction::new(provider)));
        registry
    }

    pub fn register(&mut self, tag: impl Into<String>, action: Arc<dyn StepAction>) {
        self.actions.insert(tag.into(), action);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn StepAction>> {
        self.actions.get(tag).cloned()
    }
}

/// Built-in action executing the step's description as a prompt
pub struct PromptAction {
    provider: Arc<ReasoningProvider>,
}

impl PromptAction {
    pub fn new(provider: Arc<ReasoningProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StepAction for PromptAction {
    async fn invoke(&self, input: StepInput) -> Result<StepOutput, ChainError> {
        let mut prompt = input.task.description.clone();
        if !input.chain_data.is_empty() {
            let data = serde_json::to_string_pretty(&input.chain_data)
                .map_err(|e| ChainError::DataMapping(e.to_string()))?;
            prompt.push_str("\n\nAccumulated chain data:\n");
            prompt.push_str(&data);
        }

        debug!(
            chain_id = %input.chain_id,
            step_index = input.step_index,
            "prompt action invoking provider"
        );

        let response = self
            .provider
            .execute(PromptRequest::new(prompt), ExecuteOptions::default())
            .await
            .map_err(|e| ChainError::StepExecutionFailed {
                step_index: input.step_index,
                reason: e.to_string(),
            })?;

        let output_key = format!("step_{}_output", input.step_index);
        Ok(StepOutput::new(response.content.clone())
            .with_data(output_key, response.content.clone().into())
            .with_data("last_output", response.content.into()))
    }
}
