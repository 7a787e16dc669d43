//! Dialr - outbound survey call scheduler
//!
//! Dialr calls research participants at scheduled times, follows each call
//! through provider webhooks and only counts a participant as done once a
//! recording from a call where they actually spoke has been transcribed.

pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod recovery;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod telephony;
pub mod webhook;

pub use error::{DialrError, Result};
