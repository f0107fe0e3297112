//! HTTP handlers for the relay endpoints
//!
//! Thin adapters between actix-web and the core engine: the send handler
//! turns a request body into a registered byte stream and streams progress
//! lines back; the receive handler claims the paired sender and streams its
//! bytes out with a disconnect-triggered cancellation signal.

pub mod receive;
pub mod send;
