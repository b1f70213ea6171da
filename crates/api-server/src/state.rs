//! Application state

use std::sync::Arc;

use ledger_core::credit::{CreditRepository, FileCreditStore};
use ledger_core::ledger::CreditLedger;

use crate::auth::JwtAuth;
use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    ledger: CreditLedger,
    auth: JwtAuth,
}

impl AppState {
    /// Open the file-backed ledger under the configured data directory
    pub async fn new(config: ServerConfig) -> ledger_core::Result<Self> {
        let store = FileCreditStore::new(config.data_dir.join("ledger.json")).await?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn CreditRepository>) -> Self {
        let auth = JwtAuth::new(config.jwt_secret.clone());
        Self {
            inner: Arc::new(AppStateInner {
                ledger: CreditLedger::new(store),
                auth,
                config,
            }),
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.inner.ledger
    }

    pub fn auth(&self) -> &JwtAuth {
        &self.inner.auth
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }
}
