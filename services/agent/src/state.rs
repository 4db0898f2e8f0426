//! Application state shared across API request handlers.

use std::sync::Arc;

use crate::accounting::AccountingLog;
use crate::config::ConfigStore;
use crate::store::Store;

/// Shared application state.
///
/// Built once at server startup; the token key is read from config here so
/// nothing reaches for ambient configuration after boot.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Store,
    config: Arc<ConfigStore>,
    accounting: Arc<AccountingLog>,
    token_key: String,
}

impl AppState {
    pub fn new(
        store: Store,
        config: Arc<ConfigStore>,
        accounting: Arc<AccountingLog>,
        token_key: String,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                config,
                accounting,
                token_key,
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn config(&self) -> &ConfigStore {
        &self.inner.config
    }

    pub fn accounting(&self) -> &AccountingLog {
        &self.inner.accounting
    }

    /// Key used to sign and verify session tokens.
    pub fn token_key(&self) -> &str {
        &self.inner.token_key
    }
}
