//! Shared domain types for netlab: node and link descriptions, lifecycle phases,
//! exec commands and results, management credentials.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::{CoreError, Result};
