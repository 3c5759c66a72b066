//! Common utilities and types shared across Dark Tower SFU client components.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for common configuration
pub mod config;
