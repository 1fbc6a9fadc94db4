use std::sync::Arc;

use super::config::LoginSettings;
use super::orchestrator::Orchestrator;
use crate::wechat::WebhookVerifier;

/// Shared state for login route handlers.
pub(super) struct LoginState<P, S> {
    pub(super) orchestrator: Arc<Orchestrator<P, S>>,
    pub(super) webhook: Arc<WebhookVerifier>,
    pub(super) settings: LoginSettings,
}

// Manual Clone: avoid derive adding `P: Clone, S: Clone` bounds.
impl<P, S> Clone for LoginState<P, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            webhook: self.webhook.clone(),
            settings: self.settings.clone(),
        }
    }
}
