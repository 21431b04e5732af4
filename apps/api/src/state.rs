use std::sync::Arc;

use crate::auth::{IdentityStore, SessionStore};
use crate::config::Config;
use crate::llm_client::ChatModel;
use crate::reports::ReportStore;
use crate::storage::FileStore;

/// Shared application state injected into all route handlers via Axum extractors.
/// Every external collaborator sits behind a trait object so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn ChatModel>,
    pub files: Arc<dyn FileStore>,
    pub reports: Arc<dyn ReportStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub config: Config,
}
