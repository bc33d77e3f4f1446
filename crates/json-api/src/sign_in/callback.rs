//! Sign-in Callback Handler

use salvo::{http::header::LOCATION, oapi::extract::QueryParam, prelude::*};
use tracing::{info, warn};
use url::form_urlencoded;

use magiclink_app::domain::magic_links::SignInCallback;

use crate::{extensions::*, state::Runtime};

const LOGIN_PATH: &str = "/login";
const ERROR_PATH: &str = "/auth/error";

/// Only same-site paths are followed; anything else lands on the site root.
fn safe_next(next: Option<String>) -> String {
    next.filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

fn landing_url(runtime: &Runtime, forwarded_host: Option<&str>, next: &str) -> String {
    match forwarded_host {
        Some(host) if runtime.is_production() => format!("https://{host}{next}"),
        _ => runtime.site_path(next),
    }
}

fn error_url(runtime: &Runtime, message: &str) -> String {
    let message: String = form_urlencoded::byte_serialize(message.as_bytes()).collect();

    runtime.site_path(&format!("{ERROR_PATH}?message={message}"))
}

fn redirect(res: &mut Response, location: String) -> Result<(), StatusError> {
    res.add_header(LOCATION, location, true)
        .or_500("failed to set location header")?
        .status_code(StatusCode::FOUND);

    Ok(())
}

/// Sign-in Callback Handler
///
/// Exchanges the authorization code from an emailed link for a session and
/// redirects the browser back to the site.
#[endpoint(
    tags("sign-in"),
    summary = "Complete Sign-in",
    responses(
        (status_code = StatusCode::FOUND, description = "Redirect to the site"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    code: QueryParam<String, false>,
    next: QueryParam<String, false>,
    code_verifier: QueryParam<String, false>,
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), StatusError> {
    let state = depot.state_or_500()?;
    let runtime = &state.runtime;

    let Some(code) = code.into_inner().filter(|code| !code.trim().is_empty()) else {
        return redirect(res, runtime.site_path(LOGIN_PATH));
    };

    let next = safe_next(next.into_inner());

    let result = state
        .app
        .magic_links
        .complete_sign_in(SignInCallback {
            code,
            code_verifier: code_verifier.into_inner(),
            context: req.token_context(),
        })
        .await;

    match result {
        Ok(signed_in) => {
            info!(user_id = %signed_in.user_id, "sign-in completed");

            let location = landing_url(runtime, req.header_str(FORWARDED_HOST_HEADER), &next);

            redirect(res, location)
        }
        Err(error) => {
            warn!(error = %error, rejected = error.is_rejection(), "sign-in callback failed");

            redirect(res, error_url(runtime, &error.to_string()))
        }
    }
}
