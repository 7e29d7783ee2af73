//! # dbfkit Testkit
//!
//! Test utilities for dbfkit.
//!
//! This crate provides:
//! - Table fixtures written to temporary directories
//! - A registry harness that keeps its directory alive
//! - A reference model of GOTO navigation
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dbfkit_testkit::prelude::*;
//!
//! #[test]
//! fn locate_in_cust() {
//!     let mut harness = TestRegistry::new();
//!     let path = cust_table(harness.dir());
//!     let session = harness.session();
//!     session.open_table(&path, None, OpenOptions::new()).unwrap();
//!     assert!(session.locate("BALANCE > 0").unwrap());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use dbfkit_core::{GotoTarget, OpenOptions, SessionConfig, SessionId};
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
