//! Docket - Rate-Limited Document Submission
//!
//! This crate submits signed documents to a document registration endpoint
//! while enforcing a ceiling of N requests per time window. Callers that hit
//! the ceiling are blocked until the window resets instead of receiving an
//! error.

pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
