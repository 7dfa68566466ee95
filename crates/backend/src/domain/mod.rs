//! Domain types
//!
//! Editor-facing document types and the configuration that shapes how they
//! are synchronized to the worker. Independent of the worker protocol.

pub mod config;
pub mod document;
