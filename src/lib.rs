//! linkpool - bounded, priority-preempting fetches of link-preview metadata
//!
//! Requests for the same URL are deduplicated, the freshest requests win
//! contested slots, and preempted work is resumed when capacity frees up.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod link;
pub mod pool;
pub mod preview;

pub use error::{LinkpoolError, Result};
