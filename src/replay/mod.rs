//! Event replay for late joiners
//!
//! This module provides the bounded history that the hub hands to newly
//! registered subscribers before they start receiving live batches.

pub mod buffer;

pub use buffer::{Chunks, Iter, ReplayBuffer};
