use std::sync::Arc;

use crate::clients::http::BackendClient;
use crate::core::{config::Settings, session::SessionContext};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    session: SessionContext,
    backend: Arc<BackendClient>,
}

impl AppState {
    pub fn new(settings: Settings, session: SessionContext, backend: BackendClient) -> Self {
        Self { inner: Arc::new(InnerState { settings, session, backend: Arc::new(backend) }) }
    }

    /// Builds the backend client over a fresh, empty session.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let session = SessionContext::new();
        let backend = BackendClient::from_settings(&settings, session.clone())?;
        Ok(Self::new(settings, session, backend))
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    pub fn backend(&self) -> Arc<BackendClient> {
        Arc::clone(&self.inner.backend)
    }
}
