//! Reasoning-provider abstraction
//!
//! The chain engine asks a provider to execute a prompt and treats any
//! failure as a step failure subject to the active error strategy. The
//! provider is a tagged union, not a trait object, so callers can
//! pattern-match on the kind:
//!
//! - [`ReasoningProvider::CurrentExecution`] is a sentinel, not a real
//!   backend: it returns a marker response instructing the caller to route
//!   the prompt to the invoking agent instead of a remote service.
//! - [`ReasoningProvider::Http`] is an OpenAI-compatible chat-completions
//!   client.

pub mod http;
pub mod types;

use tracing::debug;

use crate::error::Result;

pub use http::HttpProvider;
pub use types::{ExecuteOptions, PromptRequest, ProviderResponse};

/// Metadata key carrying the routing marker of the sentinel provider
pub const ROUTE_METADATA_KEY: &str = "route";

/// Marker value telling the caller to execute the prompt itself
pub const ROUTE_TO_CALLER: &str = "caller";

/// The configured reasoning backend
pub enum ReasoningProvider {
    /// Route prompts back to the invoking agent
    CurrentExecution,
    /// Remote OpenAI-compatible API
    Http(HttpProvider),
}

impl ReasoningProvider {
    /// Execute a prompt through the configured backend
    pub async fn execute(
        &self,
        request: PromptRequest,
        options: ExecuteOptions,
    ) -> Result<ProviderResponse> {
        match self {
            Self::CurrentExecution => {
                debug!("current-execution provider: returning routing marker");
                let mut response = ProviderResponse::marker(request.prompt);
                response
                    .metadata
                    .insert(ROUTE_METADATA_KEY.into(), ROUTE_TO_CALLER.into());
                Ok(response)
            }
            Self::Http(provider) => provider.execute(request, options).await,
        }
    }

    /// Whether this provider routes prompts back to the caller
    pub fn is_current_execution(&self) -> bool {
        matches!(self, Self::CurrentExecution)
    }
}
