//! Status transition engine.
//!
//! The wire code is resolved first, then an exhaustive match dispatches to
//! the target status's strategy; an unhandled status is impossible by
//! construction. Strategies are pure: they validate the request payload
//! against the entity and describe the outcome, leaving persistence and
//! notification to the service layer. Authorization is the caller's problem,
//! deliberately separate from domain validation.

use super::error::{PortalError, ValidationError};
use super::invoice::Invoice;
use super::status::{InvoiceStatus, TaxpayerStatus};
use super::taxpayer::TaxPayer;

/// Payload of a status-change request as it arrives off the wire.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    pub target: String,
    pub comment: Option<String>,
    pub workday_id: Option<String>,
}

impl TransitionRequest {
    pub fn to(target: InvoiceStatus) -> Self {
        Self {
            target: target.code().to_string(),
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn with_workday_id(mut self, workday_id: &str) -> Self {
        self.workday_id = Some(workday_id.to_string());
        self
    }
}

/// The engine does not restrict which status an invoice moves from; any
/// status may reach any other. Whether PAID and REJECTED behave as terminal
/// is left to configuration rather than hard-coded.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionPolicy {
    pub enforce_terminal: bool,
}

impl TransitionPolicy {
    const TERMINAL: [InvoiceStatus; 2] = [InvoiceStatus::Paid, InvoiceStatus::Rejected];

    fn check_leaving(&self, current: InvoiceStatus) -> Result<(), PortalError> {
        if self.enforce_terminal && Self::TERMINAL.contains(&current) {
            return Err(PortalError::BadRequest(format!(
                "invoice in terminal status {current} cannot change status"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub status: InvoiceStatus,
    /// Free-text reason recorded on the snapshot (the CHANGES REQUESTED
    /// comment).
    pub change_reason: Option<String>,
}

/// Apply an invoice transition in place. `workday_taken` probes the
/// uniqueness index; the store behind it is the service's concern and a
/// failing probe fails the transition.
pub fn apply_invoice_transition(
    invoice: &mut Invoice,
    request: &TransitionRequest,
    policy: &TransitionPolicy,
    workday_taken: impl Fn(u64) -> Result<bool, PortalError>,
) -> Result<TransitionOutcome, PortalError> {
    let target = InvoiceStatus::from_code(&request.target)?;
    policy.check_leaving(invoice.status)?;

    let mut change_reason = None;
    match target {
        InvoiceStatus::Approved
        | InvoiceStatus::Pending
        | InvoiceStatus::Rejected
        | InvoiceStatus::Paid => {}
        InvoiceStatus::ChangesRequested => {
            let comment = request
                .comment
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or(ValidationError::MissingComment)?;
            change_reason = Some(comment.to_string());
        }
        InvoiceStatus::InProgress => {
            let raw = request
                .workday_id
                .as_deref()
                .filter(|w| !w.is_empty())
                .ok_or(ValidationError::MissingWorkdayId)?;
            let workday_id: u64 = raw
                .parse()
                .map_err(|_| ValidationError::InvalidWorkdayId)?;
            if workday_id == 0 {
                return Err(ValidationError::InvalidWorkdayId.into());
            }
            if workday_taken(workday_id)? {
                return Err(ValidationError::DuplicateWorkdayId.into());
            }
            invoice.workday_id = Some(workday_id);
        }
    }

    invoice.status = target;
    Ok(TransitionOutcome {
        status: target,
        change_reason,
    })
}

/// Taxpayer review actions and the status each one lands on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TaxpayerAction {
    Approve,
    RequestChanges,
    Deny,
}

impl TaxpayerAction {
    pub fn target(&self) -> TaxpayerStatus {
        match self {
            TaxpayerAction::Approve => TaxpayerStatus::Approved,
            TaxpayerAction::RequestChanges => TaxpayerStatus::ChangeRequired,
            TaxpayerAction::Deny => TaxpayerStatus::Denied,
        }
    }
}

/// Apply a taxpayer review action, returning the change reason to record on
/// the snapshot. Requesting changes demands a comment, mirroring the invoice
/// strategy.
pub fn apply_taxpayer_transition(
    taxpayer: &mut TaxPayer,
    action: TaxpayerAction,
    comment: Option<&str>,
) -> Result<Option<String>, PortalError> {
    let mut change_reason = None;
    if action == TaxpayerAction::RequestChanges {
        let comment = comment
            .filter(|c| !c.is_empty())
            .ok_or(ValidationError::MissingComment)?;
        change_reason = Some(comment.to_string());
    }
    taxpayer.status = action.target();
    Ok(change_reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Amount, Currency, InvoiceType, TimeStamp};

    fn invoice() -> Invoice {
        Invoice {
            id: "invoice_tr".into(),
            taxpayer_id: "taxpayer_tr".into(),
            currency: Currency::ARS,
            status: InvoiceStatus::Pending,
            po_number: "98876".into(),
            invoice_date: TimeStamp::new(),
            invoice_due_date: TimeStamp::new(),
            invoice_date_received: TimeStamp::new(),
            invoice_number: "1234".into(),
            invoice_type: InvoiceType::A,
            net_amount: Amount::parse("1000.00").unwrap(),
            vat: Amount::parse("210.00").unwrap(),
            total_amount: Amount::parse("1210.00").unwrap(),
            user_id: "user_tr".into(),
            invoice_file: None,
            po_file: None,
            workday_id: None,
        }
    }

    fn no_clash(_: u64) -> Result<bool, PortalError> {
        Ok(false)
    }

    #[test]
    fn default_strategy_sets_status() {
        for target in [
            InvoiceStatus::Approved,
            InvoiceStatus::Pending,
            InvoiceStatus::Rejected,
            InvoiceStatus::Paid,
        ] {
            let mut invoice = invoice();
            let outcome = apply_invoice_transition(
                &mut invoice,
                &TransitionRequest::to(target),
                &TransitionPolicy::default(),
                no_clash,
            )
            .unwrap();
            assert_eq!(invoice.status, target);
            assert_eq!(outcome.status, target);
            assert_eq!(outcome.change_reason, None);
        }
    }

    #[test]
    fn changes_requested_needs_a_comment() {
        let mut invoice = invoice();
        let err = apply_invoice_transition(
            &mut invoice,
            &TransitionRequest::to(InvoiceStatus::ChangesRequested),
            &TransitionPolicy::default(),
            no_clash,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationError::MissingComment)
        ));
        assert_eq!(invoice.status, InvoiceStatus::Pending);

        let outcome = apply_invoice_transition(
            &mut invoice,
            &TransitionRequest::to(InvoiceStatus::ChangesRequested)
                .with_comment("please fix the PO number"),
            &TransitionPolicy::default(),
            no_clash,
        )
        .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::ChangesRequested);
        assert_eq!(
            outcome.change_reason.as_deref(),
            Some("please fix the PO number")
        );
    }

    #[test]
    fn in_progress_validates_the_workday_id() {
        let mut invoice = invoice();
        let request = TransitionRequest::to(InvoiceStatus::InProgress);

        let err = apply_invoice_transition(
            &mut invoice,
            &request,
            &TransitionPolicy::default(),
            no_clash,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationError::MissingWorkdayId)
        ));

        let err = apply_invoice_transition(
            &mut invoice,
            &request.clone().with_workday_id("invalid id"),
            &TransitionPolicy::default(),
            no_clash,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationError::InvalidWorkdayId)
        ));

        let err = apply_invoice_transition(
            &mut invoice,
            &request.clone().with_workday_id("123123"),
            &TransitionPolicy::default(),
            |_| Ok(true),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationError::DuplicateWorkdayId)
        ));
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.workday_id, None);

        apply_invoice_transition(
            &mut invoice,
            &request.with_workday_id("123123"),
            &TransitionPolicy::default(),
            no_clash,
        )
        .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::InProgress);
        assert_eq!(invoice.workday_id, Some(123123));
    }

    #[test]
    fn failing_workday_probe_fails_the_transition() {
        let mut invoice = invoice();
        let err = apply_invoice_transition(
            &mut invoice,
            &TransitionRequest::to(InvoiceStatus::InProgress).with_workday_id("55"),
            &TransitionPolicy::default(),
            |_| Err(PortalError::Storage(sled::Error::Unsupported("index read failed".into()))),
        )
        .unwrap_err();
        assert!(matches!(err, PortalError::Storage(_)));
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.workday_id, None);
    }

    #[test]
    fn unknown_code_is_rejected_before_dispatch() {
        let mut invoice = invoice();
        let request = TransitionRequest {
            target: "NOT_STATUS".into(),
            ..TransitionRequest::default()
        };
        let err = apply_invoice_transition(
            &mut invoice,
            &request,
            &TransitionPolicy::default(),
            no_clash,
        )
        .unwrap_err();
        assert!(matches!(err, PortalError::BadRequest(_)));
    }

    #[test]
    fn terminal_states_stay_open_unless_configured() {
        let mut invoice = invoice();
        invoice.status = InvoiceStatus::Paid;

        // flat design: PAID may move again by default
        apply_invoice_transition(
            &mut invoice,
            &TransitionRequest::to(InvoiceStatus::Approved),
            &TransitionPolicy::default(),
            no_clash,
        )
        .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Approved);

        invoice.status = InvoiceStatus::Rejected;
        let strict = TransitionPolicy {
            enforce_terminal: true,
        };
        let err = apply_invoice_transition(
            &mut invoice,
            &TransitionRequest::to(InvoiceStatus::Approved),
            &strict,
            no_clash,
        )
        .unwrap_err();
        assert!(matches!(err, PortalError::BadRequest(_)));
        assert_eq!(invoice.status, InvoiceStatus::Rejected);
    }

    #[test]
    fn taxpayer_actions_map_to_statuses() {
        let mut taxpayer = TaxPayer::new(
            "taxpayer_tr".into(),
            "ACME".into(),
            "AR".into(),
            "company_tr".into(),
            None,
        )
        .unwrap();

        apply_taxpayer_transition(&mut taxpayer, TaxpayerAction::Approve, None).unwrap();
        assert_eq!(taxpayer.status, TaxpayerStatus::Approved);

        let err =
            apply_taxpayer_transition(&mut taxpayer, TaxpayerAction::RequestChanges, None)
                .unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationError::MissingComment)
        ));
        assert_eq!(taxpayer.status, TaxpayerStatus::Approved);

        apply_taxpayer_transition(
            &mut taxpayer,
            TaxpayerAction::RequestChanges,
            Some("missing CUIT document"),
        )
        .unwrap();
        assert_eq!(taxpayer.status, TaxpayerStatus::ChangeRequired);

        apply_taxpayer_transition(&mut taxpayer, TaxpayerAction::Deny, None).unwrap();
        assert_eq!(taxpayer.status, TaxpayerStatus::Denied);
    }
}
