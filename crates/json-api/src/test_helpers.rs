//! Test helpers.

use std::sync::Arc;

use magiclink_app::{
    context::AppContext,
    domain::{
        magic_links::MockMagicLinkService, maintenance::MockMaintenanceService,
        rate_limits::MockRateLimitService, tokens::MockTokensService,
    },
};
use salvo::{affix_state::inject, prelude::*};

use crate::{
    config::runtime::AppEnv,
    state::{Runtime, State},
};

pub(crate) const TEST_SITE_URL: &str = "https://app.example.com";

/// Service mocks; any call without a matching expectation fails the test.
#[derive(Default)]
pub(crate) struct Mocks {
    pub(crate) tokens: MockTokensService,
    pub(crate) rate_limits: MockRateLimitService,
    pub(crate) magic_links: MockMagicLinkService,
    pub(crate) maintenance: MockMaintenanceService,
}

pub(crate) fn runtime(environment: AppEnv) -> Runtime {
    Runtime {
        environment,
        site_url: TEST_SITE_URL.to_string(),
    }
}

pub(crate) fn state(mocks: Mocks, environment: AppEnv) -> Arc<State> {
    State::shared(
        AppContext {
            tokens: Arc::new(mocks.tokens),
            rate_limits: Arc::new(mocks.rate_limits),
            magic_links: Arc::new(mocks.magic_links),
            maintenance: Arc::new(mocks.maintenance),
        },
        runtime(environment),
    )
}

pub(crate) fn service(mocks: Mocks, environment: AppEnv, route: Router) -> Service {
    Service::new(
        Router::new()
            .hoop(inject(state(mocks, environment)))
            .push(route),
    )
}
