//! Status enumerations and their wire contract.
//!
//! Invoice codes `"1"`..`"6"` and their labels are stored data; they must
//! round-trip exactly or existing records become unreadable.
use std::fmt;

use super::error::PortalError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum InvoiceStatus {
    #[n(0)]
    Approved,
    #[n(1)]
    Pending,
    #[n(2)]
    ChangesRequested,
    #[n(3)]
    Rejected,
    #[n(4)]
    Paid,
    #[n(5)]
    InProgress,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Approved,
        InvoiceStatus::Pending,
        InvoiceStatus::ChangesRequested,
        InvoiceStatus::Rejected,
        InvoiceStatus::Paid,
        InvoiceStatus::InProgress,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            InvoiceStatus::Approved => "1",
            InvoiceStatus::Pending => "2",
            InvoiceStatus::ChangesRequested => "3",
            InvoiceStatus::Rejected => "4",
            InvoiceStatus::Paid => "5",
            InvoiceStatus::InProgress => "6",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InvoiceStatus::Approved => "APPROVED",
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::ChangesRequested => "CHANGES REQUESTED",
            InvoiceStatus::Rejected => "REJECTED",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::InProgress => "IN PROGRESS",
        }
    }

    /// Resolve a wire code. An unknown code is a malformed request, not a
    /// domain violation.
    pub fn from_code(code: &str) -> Result<Self, PortalError> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or_else(|| PortalError::BadRequest(format!("unknown invoice status '{code}'")))
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Taxpayer states are stored by label; there is no numeric wire code.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TaxpayerStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    ChangeRequired,
    #[n(3)]
    ChangesPending,
    #[n(4)]
    Denied,
}

impl TaxpayerStatus {
    pub const ALL: [TaxpayerStatus; 5] = [
        TaxpayerStatus::Pending,
        TaxpayerStatus::Approved,
        TaxpayerStatus::ChangeRequired,
        TaxpayerStatus::ChangesPending,
        TaxpayerStatus::Denied,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TaxpayerStatus::Pending => "PENDING",
            TaxpayerStatus::Approved => "APPROVED",
            TaxpayerStatus::ChangeRequired => "CHANGE REQUIRED",
            TaxpayerStatus::ChangesPending => "CHANGES PENDING",
            TaxpayerStatus::Denied => "DENIED",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }
}

impl fmt::Display for TaxpayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_codes_are_the_wire_contract() {
        let expected = [
            ("1", "APPROVED"),
            ("2", "PENDING"),
            ("3", "CHANGES REQUESTED"),
            ("4", "REJECTED"),
            ("5", "PAID"),
            ("6", "IN PROGRESS"),
        ];
        for (status, (code, label)) in InvoiceStatus::ALL.into_iter().zip(expected) {
            assert_eq!(status.code(), code);
            assert_eq!(status.label(), label);
            assert_eq!(InvoiceStatus::from_code(code).unwrap(), status);
            assert_eq!(InvoiceStatus::from_label(label), Some(status));
        }
    }

    #[test]
    fn unknown_code_is_a_bad_request() {
        let err = InvoiceStatus::from_code("NOT_STATUS").unwrap_err();
        assert!(matches!(err, PortalError::BadRequest(_)));
    }

    #[test]
    fn status_cbor_roundtrip() {
        for status in InvoiceStatus::ALL {
            let bytes = minicbor::to_vec(status).unwrap();
            let back: InvoiceStatus = minicbor::decode(&bytes).unwrap();
            assert_eq!(status, back);
        }
    }
}
