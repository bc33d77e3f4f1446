//! Extension traits

mod depot;
mod request;
mod result;

pub(crate) use depot::DepotExt as _;
pub(crate) use request::{FINGERPRINT_HEADER, FORWARDED_HOST_HEADER, RequestContextExt as _};
pub(crate) use result::ResultExt as _;
