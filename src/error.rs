//! Error taxonomy for the portal core.
//!
//! Everything a caller can act on is a [`PortalError`]. Domain rule
//! violations carry a [`ValidationError`] so forms can render field-level
//! messages; `BadRequest` is reserved for structurally malformed input.

#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("could not send email: {0}")]
    CouldNotSendEmail(String),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("codec error: {0}")]
    Codec(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("A comment is required when requesting changes")]
    MissingComment,
    #[error("Workday ID is required")]
    MissingWorkdayId,
    #[error("Enter a valid integer.")]
    InvalidWorkdayId,
    #[error("Workday ID already exist")]
    DuplicateWorkdayId,
    #[error("The invoice {0} already exists")]
    DuplicateInvoiceNumber(String),
    #[error("{0}: This field is required.")]
    MissingField(&'static str),
    #[error("{field}: Ensure this value is greater than or equal to {min}.")]
    AmountBelowMinimum { field: &'static str, min: &'static str },
    #[error("{}", .0.join("\n"))]
    InvalidFile(Vec<String>),
    #[error("Taxpayer not approved yet")]
    TaxpayerNotApproved,
}

impl PortalError {
    /// True when the failure happened before any state was written and the
    /// caller should surface it as a 400-equivalent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PortalError::BadRequest(_) | PortalError::Validation(_) | PortalError::Forbidden
        )
    }
}

impl From<minicbor::decode::Error> for PortalError {
    fn from(err: minicbor::decode::Error) -> Self {
        PortalError::Codec(err.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for PortalError {
    fn from(err: minicbor::encode::Error<E>) -> Self {
        PortalError::Codec(err.to_string())
    }
}
