//! Remote source module.
//!
//! This module provides the `TableSource` seam and `HttpSource`, which
//! fetches the reference table with one bounded GET and parses it into a
//! `Table`. The document may be a bare array of objects or an object
//! holding the array under a configured field (`PayloadShape`).

pub mod client;
pub mod payload;

pub use client::{HttpSource, TableSource};
pub use payload::{parse_payload, PayloadShape};
