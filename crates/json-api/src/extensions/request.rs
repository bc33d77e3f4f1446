//! Client context extraction from request headers.

use magiclink_app::domain::tokens::records::TokenContext;
use salvo::{Request, http::header::USER_AGENT};

/// Forwarded client addresses, leftmost is the original client.
pub(crate) const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub(crate) const REAL_IP_HEADER: &str = "x-real-ip";
pub(crate) const FINGERPRINT_HEADER: &str = "x-browser-fingerprint";
pub(crate) const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

pub(crate) trait RequestContextExt {
    fn header_str(&self, name: &str) -> Option<&str>;

    fn client_ip(&self) -> Option<String>;

    fn token_context(&self) -> TokenContext;
}

impl RequestContextExt for Request {
    fn header_str(&self, name: &str) -> Option<&str> {
        self.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn client_ip(&self) -> Option<String> {
        self.header_str(FORWARDED_FOR_HEADER)
            .and_then(|forwarded| forwarded.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| self.header_str(REAL_IP_HEADER))
            .map(str::to_string)
    }

    fn token_context(&self) -> TokenContext {
        TokenContext {
            user_agent: self.header_str(USER_AGENT.as_str()).map(str::to_string),
            ip_address: self.client_ip(),
            browser_fingerprint: self.header_str(FINGERPRINT_HEADER).map(str::to_string),
        }
    }
}
