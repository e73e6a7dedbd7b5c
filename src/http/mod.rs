//! HTTP boundary: the one place where "no response at all" is told apart
//! from "the server said no".

mod client;
#[cfg(test)]
pub mod fake;
mod types;

pub use client::{HttpClient, Transport};
pub use types::{HttpRequest, HttpResponse, Method, ResponseOrigin, TransportError};
