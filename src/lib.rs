//! Atom to RSS 2.0 conversion.
//!
//! - [`convert`] - the conversion pipeline (parse, map, serialize)
//! - [`feed`] - fetching source feeds and saving results
//! - [`session`] - request tracking that drops stale results
//! - [`config`] - optional TOML configuration

pub mod config;
pub mod convert;
pub mod feed;
pub mod session;
pub mod util;
