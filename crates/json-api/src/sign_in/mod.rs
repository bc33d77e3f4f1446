//! Passwordless sign-in endpoints.

use salvo::Router;

mod callback;
mod magic_link;
mod session;

pub(crate) fn router() -> Router {
    Router::new()
        .push(Router::with_path("api/auth/magic-link").post(magic_link::handler))
        .push(Router::with_path("auth/callback").get(callback::handler))
        .push(Router::with_path("auth/session").post(session::handler))
}
