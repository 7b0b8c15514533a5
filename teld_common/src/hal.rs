//! Mount hardware abstraction: configuration, errors, capability traits and
//! the plain data types exchanged with the outer event loop.

pub mod config;
pub mod driver;
pub mod types;
