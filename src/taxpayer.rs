//! Taxpayers, their country-specific extensions and the companies that own
//! them.
//!
//! A taxpayer is a base record plus an optional country extension resolved by
//! country code. Extra fields such as the Argentinian CUIT live in the
//! extension variant, keyed by the same taxpayer id.

use super::error::{PortalError, ValidationError};
use super::status::TaxpayerStatus;
use super::types::TimeStamp;
use chrono::Utc;

/// Days until an invoice falls due when the country extension does not say
/// otherwise.
pub const DEFAULT_PAYMENT_TERM_DAYS: i64 = 30;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct TaxPayer {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub workday_id: Option<String>,
    #[n(2)]
    pub business_name: String,
    #[n(3)]
    pub country: String,
    #[n(4)]
    pub status: TaxpayerStatus,
    #[n(5)]
    pub company_id: String,
    #[n(6)]
    pub extension: Option<CountryExtension>,
}

/// Country-specific fields, one variant per supported country.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub enum CountryExtension {
    #[n(0)]
    Argentina {
        #[n(0)]
        cuit: String,
        #[n(1)]
        payment_term_days: i64,
    },
}

impl CountryExtension {
    pub fn country(&self) -> &'static str {
        match self {
            CountryExtension::Argentina { .. } => "AR",
        }
    }
}

impl TaxPayer {
    pub fn new(
        id: String,
        business_name: String,
        country: String,
        company_id: String,
        extension: Option<CountryExtension>,
    ) -> Result<Self, PortalError> {
        if business_name.is_empty() {
            return Err(ValidationError::MissingField("Business Name").into());
        }
        if let Some(ext) = &extension {
            if ext.country() != country {
                return Err(PortalError::BadRequest(format!(
                    "extension for {} does not match country {}",
                    ext.country(),
                    country
                )));
            }
        }
        Ok(Self {
            id,
            workday_id: None,
            business_name,
            country,
            status: TaxpayerStatus::Pending,
            company_id,
            extension,
        })
    }

    /// Replace the editable fields, running the same validation as
    /// construction. Status handling stays with the caller.
    pub fn update(
        &mut self,
        business_name: String,
        extension: Option<CountryExtension>,
    ) -> Result<(), PortalError> {
        if business_name.is_empty() {
            return Err(ValidationError::MissingField("Business Name").into());
        }
        if let Some(ext) = &extension {
            if ext.country() != self.country {
                return Err(PortalError::BadRequest(format!(
                    "extension for {} does not match country {}",
                    ext.country(),
                    self.country
                )));
            }
        }
        self.business_name = business_name;
        self.extension = extension;
        Ok(())
    }

    pub fn payment_term_days(&self) -> i64 {
        match &self.extension {
            Some(CountryExtension::Argentina {
                payment_term_days, ..
            }) => *payment_term_days,
            None => DEFAULT_PAYMENT_TERM_DAYS,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Company {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub description: String,
}

/// Grants a user access to a company's taxpayers and invoices. Insertion
/// order matters: the most recently granted user decides notification
/// language.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct CompanyUserPermission {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    pub company_id: String,
    #[n(2)]
    pub granted_at: TimeStamp<Utc>,
}
