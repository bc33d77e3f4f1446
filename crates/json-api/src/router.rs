//! App Router

use salvo::Router;

use crate::{debug, sign_in};

pub fn app_router() -> Router {
    Router::new()
        .push(sign_in::router())
        .push(debug::router())
}
