use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::{PortalConfig, WebSettings};
use crate::provision::Provisioner;
use crate::sso::SsoClient;
use crate::traits::{DnsProvider, PortalStore};

/// Shared state for route handlers.
pub struct AppState<S, D> {
    pub(super) sso: Arc<SsoClient>,
    pub(super) provisioner: Arc<Provisioner<S, D>>,
    pub(super) store: Arc<S>,
    pub(super) settings: WebSettings,
}

// Manual Clone: avoid derive adding `S: Clone, D: Clone` bounds.
impl<S, D> Clone for AppState<S, D> {
    fn clone(&self) -> Self {
        Self {
            sso: self.sso.clone(),
            provisioner: self.provisioner.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: PortalStore, D: DnsProvider> AppState<S, D> {
    #[must_use]
    pub fn new(config: &PortalConfig, store: Arc<S>, dns: Arc<D>) -> Self {
        Self {
            sso: Arc::new(SsoClient::new(config.sso.clone())),
            provisioner: Arc::new(Provisioner::new(
                store.clone(),
                dns,
                config.provision.clone(),
            )),
            store,
            settings: config.web.clone(),
        }
    }

    /// Shared provisioner, e.g. for a background reconciliation task.
    #[must_use]
    pub fn provisioner(&self) -> Arc<Provisioner<S, D>> {
        self.provisioner.clone()
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<S, D> FromRef<AppState<S, D>> for Key {
    fn from_ref(state: &AppState<S, D>) -> Self {
        state.settings.cookie_key.clone()
    }
}
