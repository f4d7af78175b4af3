//! Model query port implementations and provider selection.

pub mod openai;
pub mod stub;

pub use openai::*;
pub use stub::*;

use prompt_lab_core::{CoreError, ModelQueryPort, ProviderKind, ProviderSettings, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the query port selected by `settings`.
///
/// A networked provider without an API key is a configuration error unless
/// `allow_stub_fallback` is set, in which case the stub is used and a warning
/// is logged.
pub fn resolve_provider(settings: &ProviderSettings) -> Result<Arc<dyn ModelQueryPort>> {
    match settings.kind {
        ProviderKind::Stub => {
            info!("Using stub provider");
            Ok(Arc::new(StubProvider::new()))
        }
        ProviderKind::Networked => {
            let has_key = settings
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty());

            if !has_key {
                if settings.allow_stub_fallback {
                    warn!("No API key configured for networked provider, falling back to stub");
                    return Ok(Arc::new(StubProvider::new()));
                }
                return Err(CoreError::Config(
                    "networked provider selected but no API key is configured \
                     (set PROMPT_LAB_API_KEY or provider.api_key)"
                        .to_string(),
                ));
            }

            let provider = OpenAiCompatibleProvider::new(settings)
                .map_err(|e| CoreError::Config(e.to_string()))?;
            info!(model = %settings.model, api_base = %settings.api_base, "Using networked provider");
            Ok(Arc::new(provider))
        }
    }
}
