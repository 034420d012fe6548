//! Engine Integration Tests
//!
//! End-to-end scenarios through the `Warden` facade: atomicity, capability
//! enforcement, optimistic concurrency, policy escalation and zones.

#[path = "../common/mod.rs"]
mod common;

mod atomicity;
mod capabilities;
mod concurrency;
mod policy;
mod zones;
