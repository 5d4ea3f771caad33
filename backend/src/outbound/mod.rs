//! Outbound adapters: persistence, provider HTTP clients, and the cache.

pub mod cache;
pub mod persistence;
pub mod providers;
