//! Defines the error/status taxonomy and numeric constants

mod constants;
mod error;
pub use crate::base::constants::*;
pub use crate::base::error::*;
