//! Invoice entity, its draft builder and user comments.
use chrono::Utc;

use super::attachment::validate_file;
use super::error::{PortalError, ValidationError};
use super::status::InvoiceStatus;
use super::taxpayer::TaxPayer;
use super::types::{Amount, Currency, InvoiceType, TimeStamp};
use super::utils::new_uuid_to_bech32;

pub const COMMENT_MAX_LEN: usize = 200;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Invoice {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub taxpayer_id: String,
    #[n(2)]
    pub currency: Currency,
    #[n(3)]
    pub status: InvoiceStatus,
    #[n(4)]
    pub po_number: String,
    #[n(5)]
    pub invoice_date: TimeStamp<Utc>,
    #[n(6)]
    pub invoice_due_date: TimeStamp<Utc>,
    #[n(7)]
    pub invoice_date_received: TimeStamp<Utc>,
    #[n(8)]
    pub invoice_number: String,
    #[n(9)]
    pub invoice_type: InvoiceType,
    #[n(10)]
    pub net_amount: Amount,
    #[n(11)]
    pub vat: Amount,
    #[n(12)]
    pub total_amount: Amount,
    #[n(13)]
    pub user_id: String,
    #[n(14)]
    pub invoice_file: Option<String>,
    #[n(15)]
    pub po_file: Option<String>,
    // assigned by the IN PROGRESS transition, unique across invoices
    #[n(16)]
    pub workday_id: Option<u64>,
}

/// Draft form data for creating or editing an invoice. Setters consume and
/// return the draft so call sites read like the submission form.
#[derive(Default)]
pub struct InvoiceDraft {
    currency: Option<Currency>,
    po_number: Option<String>,
    invoice_date: Option<TimeStamp<Utc>>,
    invoice_due_date: Option<TimeStamp<Utc>>,
    invoice_number: Option<String>,
    invoice_type: Option<InvoiceType>,
    net_amount: Option<Amount>,
    vat: Option<Amount>,
    total_amount: Option<Amount>,
    invoice_file: Option<(String, u64)>,
    po_file: Option<(String, u64)>,
}

impl InvoiceDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }
    pub fn set_po_number(mut self, po_number: &str) -> Self {
        self.po_number = Some(po_number.to_string());
        self
    }
    pub fn set_invoice_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.invoice_date = Some(date);
        self
    }
    pub fn set_invoice_due_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.invoice_due_date = Some(date);
        self
    }
    pub fn set_invoice_number(mut self, invoice_number: &str) -> Self {
        self.invoice_number = Some(invoice_number.to_string());
        self
    }
    pub fn set_invoice_type(mut self, invoice_type: InvoiceType) -> Self {
        self.invoice_type = Some(invoice_type);
        self
    }
    pub fn set_net_amount(mut self, amount: Amount) -> Self {
        self.net_amount = Some(amount);
        self
    }
    pub fn set_vat(mut self, amount: Amount) -> Self {
        self.vat = Some(amount);
        self
    }
    pub fn set_total_amount(mut self, amount: Amount) -> Self {
        self.total_amount = Some(amount);
        self
    }
    pub fn set_invoice_file(mut self, name: &str, size: u64) -> Self {
        self.invoice_file = Some((name.to_string(), size));
        self
    }
    pub fn set_po_file(mut self, name: &str, size: u64) -> Self {
        self.po_file = Some((name.to_string(), size));
        self
    }

    pub fn invoice_number(&self) -> Option<&str> {
        self.invoice_number.as_deref()
    }

    fn validated_fields(&self) -> Result<ValidatedFields, PortalError> {
        let currency = self
            .currency
            .ok_or(ValidationError::MissingField("Currency"))?;
        let po_number = self
            .po_number
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(ValidationError::MissingField("PO number"))?;
        let invoice_date = self
            .invoice_date
            .clone()
            .ok_or(ValidationError::MissingField("Invoice date"))?;
        let invoice_number = self
            .invoice_number
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or(ValidationError::MissingField("Invoice Number"))?;
        let invoice_type = self
            .invoice_type
            .ok_or(ValidationError::MissingField("Invoice Type"))?;
        let net_amount = self
            .net_amount
            .ok_or(ValidationError::MissingField("Net amount"))?;
        let vat = self.vat.ok_or(ValidationError::MissingField("Tax Liens"))?;
        let total_amount = self
            .total_amount
            .ok_or(ValidationError::MissingField("Total"))?;

        net_amount.require_at_least(Amount::min_positive(), "Net amount", "0.01")?;
        vat.require_at_least(rust_decimal::Decimal::ZERO, "Tax Liens", "0.00")?;
        total_amount.require_at_least(Amount::min_positive(), "Total", "0.01")?;

        let invoice_file = self.checked_file(&self.invoice_file)?;
        let po_file = self.checked_file(&self.po_file)?;

        Ok(ValidatedFields {
            currency,
            po_number,
            invoice_date,
            invoice_number,
            invoice_type,
            net_amount,
            vat,
            total_amount,
            invoice_file,
            po_file,
        })
    }

    fn checked_file(&self, file: &Option<(String, u64)>) -> Result<Option<String>, PortalError> {
        match file {
            Some((name, size)) => {
                validate_file(name, *size)?;
                Ok(Some(name.clone()))
            }
            None => Ok(None),
        }
    }

    /// Validate the draft and produce a fresh invoice in the initial status.
    /// The due date falls back to the taxpayer's payment term when the form
    /// left it blank.
    pub fn build(self, taxpayer: &TaxPayer, user_id: &str) -> Result<Invoice, PortalError> {
        let fields = self.validated_fields()?;
        let invoice_due_date = match self.invoice_due_date {
            Some(date) => date,
            None => fields.invoice_date.plus_days(taxpayer.payment_term_days()),
        };
        let id = new_uuid_to_bech32("invoice_")
            .map_err(|err| PortalError::Codec(err.to_string()))?;

        Ok(Invoice {
            id,
            taxpayer_id: taxpayer.id.clone(),
            currency: fields.currency,
            status: InvoiceStatus::Pending,
            po_number: fields.po_number,
            invoice_date: fields.invoice_date,
            invoice_due_date,
            invoice_date_received: TimeStamp::new(),
            invoice_number: fields.invoice_number,
            invoice_type: fields.invoice_type,
            net_amount: fields.net_amount,
            vat: fields.vat,
            total_amount: fields.total_amount,
            user_id: user_id.to_string(),
            invoice_file: fields.invoice_file,
            po_file: fields.po_file,
            workday_id: None,
        })
    }

    /// Re-apply form data over an existing invoice. Identity, status,
    /// ownership and the workday id are untouched; the caller decides any
    /// status side effect of the edit.
    pub fn apply(self, invoice: &mut Invoice) -> Result<(), PortalError> {
        let fields = self.validated_fields()?;
        if let Some(date) = self.invoice_due_date {
            invoice.invoice_due_date = date;
        }
        invoice.currency = fields.currency;
        invoice.po_number = fields.po_number;
        invoice.invoice_date = fields.invoice_date;
        invoice.invoice_number = fields.invoice_number;
        invoice.invoice_type = fields.invoice_type;
        invoice.net_amount = fields.net_amount;
        invoice.vat = fields.vat;
        invoice.total_amount = fields.total_amount;
        if fields.invoice_file.is_some() {
            invoice.invoice_file = fields.invoice_file;
        }
        if fields.po_file.is_some() {
            invoice.po_file = fields.po_file;
        }
        Ok(())
    }
}

struct ValidatedFields {
    currency: Currency,
    po_number: String,
    invoice_date: TimeStamp<Utc>,
    invoice_number: String,
    invoice_type: InvoiceType,
    net_amount: Amount,
    vat: Amount,
    total_amount: Amount,
    invoice_file: Option<String>,
    po_file: Option<String>,
}

/// A free-text message attached to exactly one invoice by exactly one user.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Comment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub invoice_id: String,
    #[n(2)]
    pub user_id: String,
    #[n(3)]
    pub message: String,
    #[n(4)]
    pub comment_date_received: TimeStamp<Utc>,
    #[n(5)]
    pub comment_file: Option<String>,
}

impl Comment {
    pub fn new(
        invoice_id: &str,
        user_id: &str,
        message: &str,
        comment_file: Option<String>,
    ) -> Result<Self, PortalError> {
        if message.is_empty() {
            return Err(PortalError::BadRequest("message is required".to_string()));
        }
        if message.len() > COMMENT_MAX_LEN {
            return Err(PortalError::BadRequest(format!(
                "message exceeds {COMMENT_MAX_LEN} characters"
            )));
        }
        let id = new_uuid_to_bech32("comment_")
            .map_err(|err| PortalError::Codec(err.to_string()))?;
        Ok(Self {
            id,
            invoice_id: invoice_id.to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            comment_date_received: TimeStamp::new(),
            comment_file,
        })
    }
}
