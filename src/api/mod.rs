//! REST endpoints used to refresh authoritative state
//!
//! Each submodule adds methods to [`Client`](crate::client::Client) for one area of
//! the claims API.

mod claims;
mod dashboard;
mod fraud;
