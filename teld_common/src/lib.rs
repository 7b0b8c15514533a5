//! Teld Common Library
//!
//! This crate provides the shared vocabulary of the telescope mount daemon:
//! wire constants, configuration loading, the error taxonomy and the
//! capability traits the axis motion core is written against.
//!
//! # Module Structure
//!
//! - [`consts`] - Hardware counter width, sidereal constants, motion limits
//! - [`config`] - Configuration loading traits and types
//! - [`hal`] - Mount/axis configuration, error types, capability traits
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! teld_common = { path = "../teld_common" }
//! ```
//!
//! ```rust
//! use teld_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
