//! Signal Service Library
//!
//! Call and meeting signaling engine. Turns invite, accept, reject, cancel
//! and hang-up requests into:
//!
//! - an invitation state transition (Redis cache plus PostgreSQL history)
//! - an RTC room provider action (create or join a room, mint a token,
//!   remove a participant)
//! - a notification envelope for the counterpart, forwarded to the
//!   messaging relay
//!
//! # Architecture
//!
//! ```text
//! routes -> handlers -> engine -> { repository -> { cache, store },
//!                                   rtc::RoomOrchestrator -> rtc::RoomProvider,
//!                                   notification }
//! ```
//!
//! Every external system sits behind an `async_trait` seam so tests can
//! swap in fakes.

pub mod cache;
pub mod clients;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notification;
pub mod observability;
pub mod repository;
pub mod routes;
pub mod rtc;
pub mod store;
