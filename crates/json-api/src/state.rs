//! State

use std::sync::Arc;

use magiclink_app::context::AppContext;

use crate::config::runtime::AppEnv;

/// Deployment facts handlers branch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Runtime {
    pub(crate) environment: AppEnv,
    pub(crate) site_url: String,
}

impl Runtime {
    pub(crate) fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    /// `path` on the public site.
    pub(crate) fn site_path(&self, path: &str) -> String {
        format!("{}{path}", self.site_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct State {
    pub(crate) app: AppContext,
    pub(crate) runtime: Runtime,
}

impl State {
    #[must_use]
    pub(crate) fn new(app: AppContext, runtime: Runtime) -> Self {
        Self { app, runtime }
    }

    #[must_use]
    pub(crate) fn shared(app: AppContext, runtime: Runtime) -> Arc<Self> {
        Arc::new(Self::new(app, runtime))
    }
}
