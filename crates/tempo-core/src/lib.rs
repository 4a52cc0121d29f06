//! # tempo-core
//!
//! Core abstractions for the tempo cluster job scheduler.
//!
//! This crate provides the foundational types shared across tempo components:
//!
//! - **Identifiers**: The versioned, structured task identifier that keys the
//!   whole task lifecycle
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging bootstrap and span constructors
//!
//! ## Crate Boundary
//!
//! `tempo-core` is the **only** crate allowed to define shared primitives.
//! The scheduling engine (`tempo-sched`) and any future service crates
//! interact through the contracts defined here.
//!
//! ## Example
//!
//! ```rust
//! use tempo_core::TaskId;
//!
//! let id = TaskId::new("nightly-report", 1_704_067_200_000, 0);
//! assert_eq!(id.to_string(), "tt1:nightly-report:1704067200000:0");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

pub use error::{Error, Result};
pub use id::TaskId;
pub use observability::{LogFormat, init_logging};
