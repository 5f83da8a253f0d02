//! Core domain types and utilities for the copper-relay engine.
//!
//! This crate provides the foundational identifier types and error handling
//! shared by the flow engine, scheduler, and service crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    AutomationId, BookingId, ChannelId, ContactId, ConversationId, EventId, RunId, ServiceId,
};
