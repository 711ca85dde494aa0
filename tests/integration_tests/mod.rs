//! Integration tests module
//!
//! End-to-end tests of the gateway with a scripted renderer standing in for
//! the headless browser:
//! - Request dispatch across crawler classes
//! - Routing, headers and status codes through the axum router
//! - Redis-backed cache behaviour

pub mod dispatcher_test;
pub mod fixtures;
pub mod redis_cache_test;
pub mod server_test;
