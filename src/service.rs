//! Service layer API for the supplier/invoice workflow.
//!
//! Every state-changing operation follows the same shape: authorize against
//! the caller's [`AccessContext`], validate the domain rules, stage the
//! entity write plus its snapshot and audit comment into one [`sled::Batch`],
//! apply the batch, then enqueue the notification. Validation failures happen
//! before the batch is applied, so a failed operation persists nothing.
//! Notification delivery is decoupled and may fail without rolling anything
//! back.

use std::sync::Arc;

use sled::{Batch, Db};

use super::access::{AccessContext, Capability, Role, User};
use super::attachment::validate_file;
use super::error::{PortalError, ValidationError};
use super::history::{self, TimelineEntry};
use super::invoice::{Comment, Invoice, InvoiceDraft};
use super::notify::{ChangeType, NotificationJob, NotificationQueue};
use super::snapshot::{self, EntityImage, Snapshot};
use super::status::{InvoiceStatus, TaxpayerStatus};
use super::taxpayer::{Company, CompanyUserPermission, CountryExtension, TaxPayer};
use super::transition::{
    self, TaxpayerAction, TransitionPolicy, TransitionRequest,
};
use super::types::{Language, TimeStamp};
use super::utils::new_uuid_to_bech32;

fn user_key(id: &str) -> Vec<u8> {
    format!("user/{id}").into_bytes()
}
fn company_key(id: &str) -> Vec<u8> {
    format!("company/{id}").into_bytes()
}
fn taxpayer_key(id: &str) -> Vec<u8> {
    format!("taxpayer/{id}").into_bytes()
}
fn invoice_key(id: &str) -> Vec<u8> {
    format!("invoice/{id}").into_bytes()
}
fn perm_prefix(company_id: &str) -> String {
    format!("perm/{company_id}/")
}
fn member_key(user_id: &str, company_id: &str) -> Vec<u8> {
    format!("member/{user_id}/{company_id}").into_bytes()
}
fn member_prefix(user_id: &str) -> String {
    format!("member/{user_id}/")
}
fn comment_prefix(invoice_id: &str) -> String {
    format!("comment/{invoice_id}/")
}
fn invoice_number_key(taxpayer_id: &str, invoice_number: &str) -> Vec<u8> {
    format!("invno/{taxpayer_id}/{invoice_number}").into_bytes()
}
fn workday_key(workday_id: u64) -> Vec<u8> {
    format!("wd/{workday_id}").into_bytes()
}

fn decode<T>(bytes: &[u8]) -> Result<T, PortalError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

pub struct PortalService {
    instance: Arc<Db>,
    queue: NotificationQueue,
    policy: TransitionPolicy,
}

impl PortalService {
    pub fn new(instance: Arc<Db>, queue: NotificationQueue) -> Self {
        Self {
            instance,
            queue,
            policy: TransitionPolicy::default(),
        }
    }

    /// Override the transition policy, e.g. to treat PAID and REJECTED as
    /// terminal.
    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    // ---- account & company setup ----

    pub fn register_user(
        &self,
        email: &str,
        preferred_language: Language,
        role: Role,
    ) -> anyhow::Result<User> {
        let user = User {
            id: new_uuid_to_bech32("user_")?,
            email: email.to_string(),
            preferred_language,
            role,
        };
        self.instance
            .insert(user_key(&user.id), minicbor::to_vec(&user)?)?;
        Ok(user)
    }

    pub fn create_company(&self, name: &str, description: &str) -> anyhow::Result<Company> {
        let company = Company {
            id: new_uuid_to_bech32("company_")?,
            name: name.to_string(),
            description: description.to_string(),
        };
        self.instance
            .insert(company_key(&company.id), minicbor::to_vec(&company)?)?;
        Ok(company)
    }

    /// Grant a user access to a company. Grants are kept in insertion order;
    /// the newest one decides notification language for the whole company.
    pub fn add_user_to_company(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> anyhow::Result<CompanyUserPermission> {
        self.load_user(user_id)?;
        self.load_company(company_id)?;

        let permission = CompanyUserPermission {
            user_id: user_id.to_string(),
            company_id: company_id.to_string(),
            granted_at: TimeStamp::new(),
        };
        let seq = self.instance.generate_id()?;
        let key = format!("{}{seq:020}", perm_prefix(company_id)).into_bytes();

        let mut batch = Batch::default();
        batch.insert(key, minicbor::to_vec(&permission)?);
        batch.insert(member_key(user_id, company_id), company_id.as_bytes());
        self.instance.apply_batch(batch)?;

        Ok(permission)
    }

    /// Resolve the acting user's capabilities and company memberships into
    /// the explicit context every operation is authorized against.
    pub fn access_context(&self, user_id: &str) -> anyhow::Result<AccessContext> {
        let user = self.load_user(user_id)?;
        let mut companies = Vec::new();
        for entry in self.instance.scan_prefix(member_prefix(user_id).as_bytes()) {
            let (_, value) = entry?;
            companies.push(String::from_utf8_lossy(&value).to_string());
        }
        Ok(AccessContext::for_user(&user, companies))
    }

    pub fn invite_to_company(
        &self,
        ctx: &AccessContext,
        company_id: &str,
        email: &str,
    ) -> anyhow::Result<()> {
        ctx.require_company(company_id, Capability::ViewAllTaxpayers)?;
        let company = self.load_company(company_id)?;

        self.queue.enqueue(NotificationJob {
            change_type: ChangeType::CompanyInvitation,
            language: ctx.language,
            recipients: vec![email.to_string()],
            business_name: company.name,
            invoice_number: String::new(),
            status_label: String::new(),
            comment: String::new(),
        });
        Ok(())
    }

    // ---- taxpayers ----

    pub fn create_taxpayer(
        &self,
        ctx: &AccessContext,
        company_id: &str,
        business_name: &str,
        country: &str,
        extension: Option<CountryExtension>,
    ) -> anyhow::Result<TaxPayer> {
        ctx.require(Capability::CreateTaxpayer)?;
        ctx.require_company(company_id, Capability::ViewAllTaxpayers)?;
        self.load_company(company_id)?;

        let taxpayer = TaxPayer::new(
            new_uuid_to_bech32("taxpayer_")?,
            business_name.to_string(),
            country.to_string(),
            company_id.to_string(),
            extension,
        )?;

        let mut batch = Batch::default();
        batch.insert(taxpayer_key(&taxpayer.id), minicbor::to_vec(&taxpayer)?);
        let link = snapshot::stage(
            &self.instance,
            &mut batch,
            EntityImage::Taxpayer(taxpayer.clone()),
            &ctx.user_id,
            None,
        )?;
        self.instance.apply_batch(batch)?;
        link.commit(&self.instance)?;

        tracing::info!(taxpayer = %taxpayer.id, company = %company_id, "taxpayer registered");
        Ok(taxpayer)
    }

    /// AP review of a taxpayer: approve, request changes or deny. Each action
    /// snapshots the taxpayer and emails the owning company.
    pub fn review_taxpayer(
        &self,
        ctx: &AccessContext,
        taxpayer_id: &str,
        action: TaxpayerAction,
        comment: Option<&str>,
    ) -> anyhow::Result<TaxPayer> {
        ctx.require(Capability::ChangeTaxpayerStatus)?;
        let mut taxpayer = self.load_taxpayer(taxpayer_id)?;

        let change_reason = transition::apply_taxpayer_transition(&mut taxpayer, action, comment)?;

        let mut batch = Batch::default();
        batch.insert(taxpayer_key(&taxpayer.id), minicbor::to_vec(&taxpayer)?);
        let link = snapshot::stage(
            &self.instance,
            &mut batch,
            EntityImage::Taxpayer(taxpayer.clone()),
            &ctx.user_id,
            change_reason.clone(),
        )?;
        self.instance.apply_batch(batch)?;
        link.commit(&self.instance)?;

        tracing::info!(taxpayer = %taxpayer.id, status = %taxpayer.status, "taxpayer status changed");

        let change_type = match action {
            TaxpayerAction::Approve => ChangeType::TaxpayerApproval,
            TaxpayerAction::RequestChanges => ChangeType::TaxpayerChangeRequired,
            TaxpayerAction::Deny => ChangeType::TaxpayerDenial,
        };
        self.notify_company(
            &taxpayer.company_id,
            change_type,
            &taxpayer.business_name,
            "",
            taxpayer.status.label(),
            change_reason.as_deref().unwrap_or(""),
        );

        Ok(taxpayer)
    }

    /// Edit a taxpayer's details. AP may edit in any status; a supplier may
    /// edit only while changes are required, which resubmits the taxpayer
    /// for review as CHANGES PENDING.
    pub fn edit_taxpayer(
        &self,
        ctx: &AccessContext,
        taxpayer_id: &str,
        business_name: &str,
        extension: Option<CountryExtension>,
    ) -> anyhow::Result<TaxPayer> {
        let mut taxpayer = self.load_taxpayer(taxpayer_id)?;

        let editor_is_ap = ctx.can(Capability::EditTaxpayer);
        if !editor_is_ap {
            ctx.require_company(&taxpayer.company_id, Capability::EditTaxpayer)?;
            if taxpayer.status != TaxpayerStatus::ChangeRequired {
                return Err(PortalError::Forbidden.into());
            }
        }

        taxpayer.update(business_name.to_string(), extension)?;
        if !editor_is_ap {
            taxpayer.status = TaxpayerStatus::ChangesPending;
        }

        let mut batch = Batch::default();
        batch.insert(taxpayer_key(&taxpayer.id), minicbor::to_vec(&taxpayer)?);
        let link = snapshot::stage(
            &self.instance,
            &mut batch,
            EntityImage::Taxpayer(taxpayer.clone()),
            &ctx.user_id,
            None,
        )?;
        self.instance.apply_batch(batch)?;
        link.commit(&self.instance)?;

        tracing::info!(taxpayer = %taxpayer.id, actor = %ctx.email, "taxpayer edited");
        Ok(taxpayer)
    }

    // ---- invoices ----

    /// Supplier submits an invoice against an approved taxpayer. The
    /// (taxpayer, invoice number) pair must be unique.
    pub fn create_invoice(
        &self,
        ctx: &AccessContext,
        taxpayer_id: &str,
        draft: InvoiceDraft,
    ) -> anyhow::Result<Invoice> {
        ctx.require(Capability::CreateInvoice)?;
        let taxpayer = self.load_taxpayer(taxpayer_id)?;
        ctx.require_company(&taxpayer.company_id, Capability::ViewAllInvoices)?;

        if taxpayer.status != TaxpayerStatus::Approved {
            return Err(PortalError::from(ValidationError::TaxpayerNotApproved).into());
        }

        let invoice = draft.build(&taxpayer, &ctx.user_id)?;

        let number_key = invoice_number_key(taxpayer_id, &invoice.invoice_number);
        if self.instance.contains_key(&number_key)? {
            return Err(PortalError::from(ValidationError::DuplicateInvoiceNumber(
                invoice.invoice_number.clone(),
            ))
            .into());
        }

        let mut batch = Batch::default();
        batch.insert(invoice_key(&invoice.id), minicbor::to_vec(&invoice)?);
        batch.insert(number_key, invoice.id.as_bytes());
        let link = snapshot::stage(
            &self.instance,
            &mut batch,
            EntityImage::Invoice(invoice.clone()),
            &ctx.user_id,
            None,
        )?;
        self.instance.apply_batch(batch)?;
        link.commit(&self.instance)?;

        tracing::info!(invoice = %invoice.id, taxpayer = %taxpayer_id, "invoice submitted");
        Ok(invoice)
    }

    /// Apply a status-change request. On success the invoice, one new
    /// snapshot and one audit comment commit atomically, then the owning
    /// company is notified.
    pub fn change_invoice_status(
        &self,
        ctx: &AccessContext,
        invoice_id: &str,
        request: &TransitionRequest,
    ) -> anyhow::Result<Invoice> {
        ctx.require(Capability::ChangeInvoiceStatus)?;
        let mut invoice = self.load_invoice(invoice_id)?;
        let taxpayer = self.load_taxpayer(&invoice.taxpayer_id)?;
        let previous_workday = invoice.workday_id;

        let outcome = transition::apply_invoice_transition(
            &mut invoice,
            request,
            &self.policy,
            |workday_id| {
                self.instance
                    .contains_key(workday_key(workday_id))
                    .map_err(PortalError::from)
            },
        )?;

        let audit = Comment::new(
            invoice_id,
            &ctx.user_id,
            &format!(
                "{} has changed the invoice status to {}",
                ctx.email,
                outcome.status.label()
            ),
            None,
        )?;

        let mut batch = Batch::default();
        batch.insert(invoice_key(&invoice.id), minicbor::to_vec(&invoice)?);
        if invoice.workday_id != previous_workday {
            // a reassigned workday id frees the old one for other invoices
            if let Some(old) = previous_workday {
                batch.remove(workday_key(old));
            }
            if let Some(workday_id) = invoice.workday_id {
                batch.insert(workday_key(workday_id), invoice.id.as_bytes());
            }
        }
        let link = snapshot::stage(
            &self.instance,
            &mut batch,
            EntityImage::Invoice(invoice.clone()),
            &ctx.user_id,
            outcome.change_reason.clone(),
        )?;
        self.stage_comment(&mut batch, &audit)?;
        self.instance.apply_batch(batch)?;
        link.commit(&self.instance)?;

        tracing::info!(
            invoice = %invoice.id,
            status = %invoice.status,
            actor = %ctx.email,
            "invoice status changed"
        );

        self.notify_company(
            &taxpayer.company_id,
            ChangeType::InvoiceStatusChange,
            &taxpayer.business_name,
            &invoice.invoice_number,
            invoice.status.label(),
            outcome.change_reason.as_deref().unwrap_or(""),
        );

        Ok(invoice)
    }

    /// Edit an invoice's form fields. AP may edit in any status and the
    /// company is emailed; a supplier may edit only while changes are
    /// requested, which sends the invoice back to PENDING review.
    pub fn edit_invoice(
        &self,
        ctx: &AccessContext,
        invoice_id: &str,
        draft: InvoiceDraft,
    ) -> anyhow::Result<Invoice> {
        let mut invoice = self.load_invoice(invoice_id)?;
        let taxpayer = self.load_taxpayer(&invoice.taxpayer_id)?;

        let editor_is_ap = ctx.can(Capability::EditInvoice);
        if !editor_is_ap {
            ctx.require_company(&taxpayer.company_id, Capability::EditInvoice)?;
            if invoice.status != InvoiceStatus::ChangesRequested {
                return Err(PortalError::Forbidden.into());
            }
        }

        let old_number = invoice.invoice_number.clone();
        draft.apply(&mut invoice)?;

        let mut batch = Batch::default();
        if invoice.invoice_number != old_number {
            let number_key = invoice_number_key(&invoice.taxpayer_id, &invoice.invoice_number);
            if self.instance.contains_key(&number_key)? {
                return Err(PortalError::from(ValidationError::DuplicateInvoiceNumber(
                    invoice.invoice_number.clone(),
                ))
                .into());
            }
            batch.remove(invoice_number_key(&invoice.taxpayer_id, &old_number));
            batch.insert(number_key, invoice.id.as_bytes());
        }

        if !editor_is_ap {
            invoice.status = InvoiceStatus::Pending;
            let audit = Comment::new(
                invoice_id,
                &ctx.user_id,
                &format!("{} has changed the invoice", ctx.email),
                None,
            )?;
            self.stage_comment(&mut batch, &audit)?;
        }

        batch.insert(invoice_key(&invoice.id), minicbor::to_vec(&invoice)?);
        let link = snapshot::stage(
            &self.instance,
            &mut batch,
            EntityImage::Invoice(invoice.clone()),
            &ctx.user_id,
            None,
        )?;
        self.instance.apply_batch(batch)?;
        link.commit(&self.instance)?;

        tracing::info!(invoice = %invoice.id, actor = %ctx.email, "invoice edited");

        if editor_is_ap {
            self.notify_company(
                &taxpayer.company_id,
                ChangeType::InvoiceEdited,
                &taxpayer.business_name,
                &invoice.invoice_number,
                invoice.status.label(),
                "",
            );
        }

        Ok(invoice)
    }

    /// Post a free-text comment, optionally with a pdf attachment. Nothing
    /// persists if either the message or the file is invalid.
    pub fn post_comment(
        &self,
        ctx: &AccessContext,
        invoice_id: &str,
        message: &str,
        file: Option<(&str, u64)>,
    ) -> anyhow::Result<Comment> {
        ctx.require(Capability::PostComment)?;
        let invoice = self.load_invoice(invoice_id)?;
        let taxpayer = self.load_taxpayer(&invoice.taxpayer_id)?;
        ctx.require_company(&taxpayer.company_id, Capability::ViewAllInvoices)?;

        let comment_file = match file {
            Some((name, size)) => {
                validate_file(name, size).map_err(PortalError::from)?;
                Some(name.to_string())
            }
            None => None,
        };

        let comment = Comment::new(invoice_id, &ctx.user_id, message, comment_file)?;

        let mut batch = Batch::default();
        self.stage_comment(&mut batch, &comment)?;
        self.instance.apply_batch(batch)?;

        self.notify_company(
            &taxpayer.company_id,
            ChangeType::CommentPosted,
            &taxpayer.business_name,
            &invoice.invoice_number,
            invoice.status.label(),
            &comment.message,
        );

        Ok(comment)
    }

    // ---- reads ----

    pub fn get_invoice(&self, ctx: &AccessContext, invoice_id: &str) -> anyhow::Result<Invoice> {
        let invoice = self.load_invoice(invoice_id)?;
        let taxpayer = self.load_taxpayer(&invoice.taxpayer_id)?;
        // conceal other tenants' invoices rather than confirming they exist
        ctx.require_company_or_not_found(&taxpayer.company_id, Capability::ViewAllInvoices)?;
        Ok(invoice)
    }

    /// Explicit comments on an invoice, most recent first.
    pub fn invoice_comments(
        &self,
        ctx: &AccessContext,
        invoice_id: &str,
    ) -> anyhow::Result<Vec<Comment>> {
        let invoice = self.load_invoice(invoice_id)?;
        let taxpayer = self.load_taxpayer(&invoice.taxpayer_id)?;
        ctx.require_company_or_not_found(&taxpayer.company_id, Capability::ViewAllInvoices)?;

        let mut comments = Vec::new();
        for entry in self
            .instance
            .scan_prefix(comment_prefix(invoice_id).as_bytes())
        {
            let (_, value) = entry?;
            comments.push(decode::<Comment>(&value)?);
        }
        comments.reverse();
        Ok(comments)
    }

    /// Raw snapshot chain, oldest first.
    pub fn invoice_history(
        &self,
        ctx: &AccessContext,
        invoice_id: &str,
    ) -> anyhow::Result<Vec<Snapshot>> {
        ctx.require(Capability::ViewInvoiceHistory)?;
        self.load_invoice(invoice_id)?;
        Ok(snapshot::get_history(&self.instance, invoice_id)?)
    }

    /// Unified audit trail: explicit comments merged with per-snapshot-pair
    /// diff records.
    pub fn invoice_timeline(
        &self,
        ctx: &AccessContext,
        invoice_id: &str,
    ) -> anyhow::Result<Vec<TimelineEntry>> {
        let invoice = self.load_invoice(invoice_id)?;
        let taxpayer = self.load_taxpayer(&invoice.taxpayer_id)?;
        if !ctx.can(Capability::ViewInvoiceHistory) {
            ctx.require_company_or_not_found(&taxpayer.company_id, Capability::ViewInvoiceHistory)?;
        }

        let comments = self.invoice_comments(ctx, invoice_id)?;
        let chain = snapshot::get_history(&self.instance, invoice_id)?;
        Ok(history::unified_timeline(comments, &chain))
    }

    pub fn taxpayer_history(
        &self,
        ctx: &AccessContext,
        taxpayer_id: &str,
    ) -> anyhow::Result<Vec<Snapshot>> {
        ctx.require(Capability::ViewInvoiceHistory)?;
        self.load_taxpayer(taxpayer_id)?;
        Ok(snapshot::get_history(&self.instance, taxpayer_id)?)
    }

    // ---- internals ----

    fn load_user(&self, id: &str) -> Result<User, PortalError> {
        let bytes = self.instance.get(user_key(id))?.ok_or(PortalError::NotFound)?;
        decode(&bytes)
    }

    fn load_company(&self, id: &str) -> Result<Company, PortalError> {
        let bytes = self
            .instance
            .get(company_key(id))?
            .ok_or(PortalError::NotFound)?;
        decode(&bytes)
    }

    fn load_taxpayer(&self, id: &str) -> Result<TaxPayer, PortalError> {
        let bytes = self
            .instance
            .get(taxpayer_key(id))?
            .ok_or(PortalError::NotFound)?;
        decode(&bytes)
    }

    fn load_invoice(&self, id: &str) -> Result<Invoice, PortalError> {
        let bytes = self
            .instance
            .get(invoice_key(id))?
            .ok_or(PortalError::NotFound)?;
        decode(&bytes)
    }

    fn stage_comment(&self, batch: &mut Batch, comment: &Comment) -> Result<(), PortalError> {
        // keys sort by receipt time so a prefix scan returns chronological
        // order
        let nanos = comment
            .comment_date_received
            .to_datetime_utc()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let key = format!(
            "{}{nanos:020}/{}",
            comment_prefix(&comment.invoice_id),
            comment.id
        );
        batch.insert(key.into_bytes(), minicbor::to_vec(comment)?);
        Ok(())
    }

    /// Everyone permissioned on the company gets the email; the language of
    /// the most recently added permission's user is applied to the whole
    /// notification. Delivery is best effort: the triggering operation has
    /// already committed, so a bad permission record is logged and skipped
    /// rather than surfaced to the caller.
    fn notify_company(
        &self,
        company_id: &str,
        change_type: ChangeType,
        business_name: &str,
        invoice_number: &str,
        status_label: &str,
        comment: &str,
    ) {
        let mut recipients = Vec::new();
        let mut language = Language::En;
        for entry in self
            .instance
            .scan_prefix(perm_prefix(company_id).as_bytes())
        {
            let value = match entry {
                Ok((_, value)) => value,
                Err(error) => {
                    tracing::warn!(company = %company_id, %error, "permission scan failed, notification truncated");
                    break;
                }
            };
            let permission: CompanyUserPermission = match decode(&value) {
                Ok(permission) => permission,
                Err(error) => {
                    tracing::warn!(company = %company_id, %error, "skipping undecodable permission record");
                    continue;
                }
            };
            let user = match self.load_user(&permission.user_id) {
                Ok(user) => user,
                Err(error) => {
                    tracing::warn!(
                        company = %company_id,
                        user = %permission.user_id,
                        %error,
                        "skipping permission without a user record"
                    );
                    continue;
                }
            };
            language = user.preferred_language;
            recipients.push(user.email);
        }

        if recipients.is_empty() {
            return;
        }

        self.queue.enqueue(NotificationJob {
            change_type,
            language,
            recipients,
            business_name: business_name.to_string(),
            invoice_number: invoice_number.to_string(),
            status_label: status_label.to_string(),
            comment: comment.to_string(),
        });
    }
}
