//! Core types and utilities for the ratewatch monitor
//!
//! This crate provides shared types used across all components:
//! - Source and quote definitions
//! - Fetch error taxonomy
//! - Monitor configuration

pub mod config;
pub mod errors;
pub mod quote;
pub mod source;

pub use config::*;
pub use errors::*;
pub use quote::*;
pub use source::*;
