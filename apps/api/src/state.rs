use std::sync::Arc;

use crate::chat::engine::AssistantEngine;
use crate::context::assembler::ContextAssembler;
use crate::storage::PortfolioStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PortfolioStore>,
    pub assembler: Arc<ContextAssembler>,
    /// The one assistant every visitor talks to.
    pub engine: Arc<AssistantEngine>,
    pub admin_token: Arc<str>,
}
