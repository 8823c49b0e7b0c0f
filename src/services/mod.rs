//! Services module - talking to the GlobalDorm REST API and filtering its results.
//!
//! # Components
//!
//! - [`ServiceClient`]: async request/response operations against the database
//!   and area-information services of the current server. Every call is bounded
//!   by one timeout and fails with a distinguishable [`ServiceError`].
//! - [`RoomFilter`]: predicate evaluation over the room list, with tri-state
//!   [`Preference`]s for yes/no features.
//!
//! Neither component knows about the shell; results are plain values and
//! `Display`able models.

pub mod client;
pub mod filter;

pub use client::{NO_MATCHING_ROOMS, ROOMS_UPDATED, RoomInfo, RoomListing, ServiceClient, ServiceError};
pub use filter::{FilterError, Preference, RoomFilter};
