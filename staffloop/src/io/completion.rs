//! Completion endpoint abstraction.
//!
//! The [`CompletionClient`] trait decouples the planner, generator, and reviewer
//! from the transport that actually produces text (an HTTP API or a local
//! command). Tests use scripted clients that return predetermined replies.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::io::anthropic::AnthropicClient;
use crate::io::command::CommandClient;
use crate::io::config::{Backend, EndpointConfig};
use crate::io::openai::OpenAiClient;

/// One request/response exchange with a completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Role/instruction text, sent separately where the backend supports it.
    pub system: Option<String>,
    /// User message.
    pub prompt: String,
    /// Upper bound on response tokens.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// System text and prompt joined for backends with a single input channel.
    pub fn combined_input(&self) -> String {
        match self.system.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(system) => format!("{system}\n\n{}", self.prompt),
            None => self.prompt.clone(),
        }
    }
}

/// Abstraction over completion backends.
pub trait CompletionClient {
    /// Send the request and return the reply text. Transport failures, non-success
    /// statuses, and timeouts are errors.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

impl<T: CompletionClient + ?Sized> CompletionClient for Box<T> {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request)
    }
}

impl<T: CompletionClient + ?Sized> CompletionClient for &T {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request)
    }
}

/// Build the client for one endpoint, reading its API key from the environment.
pub fn build_client(
    role: &str,
    endpoint: &EndpointConfig,
    workdir: &Path,
) -> Result<Box<dyn CompletionClient>> {
    debug!(role, backend = ?endpoint.backend, model = %endpoint.model, "building completion client");
    let client: Box<dyn CompletionClient> = match endpoint.backend {
        Backend::Anthropic => {
            let key = api_key(endpoint.backend)?;
            Box::new(AnthropicClient::new(endpoint, key).with_context(|| format!("{role} client"))?)
        }
        Backend::Openai => {
            let key = api_key(endpoint.backend)?;
            Box::new(OpenAiClient::new(endpoint, key).with_context(|| format!("{role} client"))?)
        }
        Backend::Command => Box::new(CommandClient::new(endpoint, workdir)),
    };
    Ok(client)
}

fn api_key(backend: Backend) -> Result<String> {
    let var = backend
        .api_key_var()
        .ok_or_else(|| anyhow!("{backend:?} backend takes no API key"))?;
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(anyhow!("missing {var} (required by the configured backend)")),
    }
}
