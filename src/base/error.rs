use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code corresponding to a successful operation
pub const SUCCESS: i32 = 0;

/// Defines the error taxonomy surfaced to the host
///
/// Every failure maps to a stable integer status code (see [Error::code]);
/// `0` is reserved for success. The XML-related variants exist for the
/// (external) model deserializer and are never constructed by this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum Error {
    /// Submodels with conflicting interfaces were combined (construction time only)
    IncompatibleModels,

    /// A dense linear solve failed (singular Jacobian)
    LinalgFailure,

    /// The nonlinear solver exceeded its iteration budget
    MaxIterations,

    /// A rate-independent update converged to a point violating the Kuhn-Tucker conditions
    KtViolation,

    /// XML node not found (deserializer collaborator)
    NodeNotFound,

    /// More than one XML node found (deserializer collaborator)
    TooManyNodes,

    /// XML attribute not found (deserializer collaborator)
    AttributeNotFound,

    /// Unknown model type string (registry collaborator)
    UnknownType,
}

impl Error {
    /// Returns the integer status code associated with this error
    pub fn code(&self) -> i32 {
        match self {
            Error::IncompatibleModels => -1,
            Error::LinalgFailure => -2,
            Error::MaxIterations => -3,
            Error::KtViolation => -4,
            Error::NodeNotFound => -5,
            Error::TooManyNodes => -6,
            Error::AttributeNotFound => -7,
            Error::UnknownType => -8,
        }
    }

    /// Returns a human-readable message for this error
    pub fn message(&self) -> &'static str {
        status_message(self.code())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for Error {}

/// Translates a status code to a message string
pub fn status_message(code: i32) -> &'static str {
    match code {
        SUCCESS => "success",
        -1 => "incompatible submodels",
        -2 => "linear algebra call failed",
        -3 => "maximum iteration count exceeded",
        -4 => "integration of rate-independent model violated the Kuhn-Tucker conditions",
        -5 => "XML node not found",
        -6 => "more than one XML node found",
        -7 => "XML attribute not found",
        -8 => "unknown model type",
        _ => "unknown error",
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
