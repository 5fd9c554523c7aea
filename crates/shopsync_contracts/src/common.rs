#![forbid(unsafe_code)]

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    MissingField {
        field: String,
    },
    InvalidIdentifier {
        field: String,
        reason: &'static str,
    },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::InvalidValue { field, reason } => {
                write!(f, "invalid value for {field}: {reason}")
            }
            ContractViolation::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ContractViolation::InvalidIdentifier { field, reason } => {
                write!(f, "invalid identifier in '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn validate_name(
    field: &'static str,
    s: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if s.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if s.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "too long",
        });
    }
    if s.chars().any(char::is_control) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain control characters",
        });
    }
    Ok(())
}
