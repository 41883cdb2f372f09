//! Common types and traits shared across `snowgeo` crates.
//!
//! This crate holds the upstream seam between the translation engine in
//! `snowgeo-core` and whatever talks to the remote ticket store, so that test
//! doubles and alternative transports do not need to depend on the engine.

pub mod source;

// Re-export commonly used types
pub use source::{
    DictionaryQuery, RawRecord, SourceError, TableQuery, TableSource, describe_value,
};
