//! # Signal Test Utilities
//!
//! Shared test utilities for the signal service.
//!
//! This crate provides:
//! - In-memory invitation cache with TTL expiry on the tokio clock
//! - In-memory invitation store with the same transition rules as PostgreSQL
//! - Fake RTC room provider (rooms, participants, issued tokens)
//! - Static user directory and recording relay
//! - Request fixtures for every signaling verb
//! - `SignalHarness` wiring all of the above into a real engine and router
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signal_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = SignalHarness::new();
//!
//!     let (resp, envelope) = harness
//!         .engine
//!         .assemble(invite("A", &["B"], "r1"))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(envelope.unwrap().recv_id, "B");
//!     assert!(harness.cache.is_unhandled("B").await.unwrap());
//! }
//! ```

pub mod fake_clients;
pub mod fake_provider;
pub mod fixtures;
pub mod harness;
pub mod memory_cache;
pub mod memory_store;

// Re-export commonly used items
pub use fake_clients::*;
pub use fake_provider::*;
pub use fixtures::*;
pub use harness::*;
pub use memory_cache::*;
pub use memory_store::*;
