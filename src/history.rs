//! Derives the human-readable audit trail from an entity's snapshot chain.
//!
//! Diffing is schema-aware: each entity type declares the fields it tracks
//! together with a display label, and consecutive snapshot pairs are compared
//! field by field. Enumerated fields render their display label, never the
//! raw code. The generator is read-time only; it persists nothing.

use chrono::Utc;

use super::invoice::{Comment, Invoice};
use super::snapshot::{EntityImage, Snapshot};
use super::taxpayer::TaxPayer;
use super::types::TimeStamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub label: &'static str,
    pub old: String,
    pub new: String,
}

/// A synthetic comment derived from one consecutive snapshot pair,
/// attributed to the user who made that change.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedComment {
    pub user_id: String,
    pub message: String,
    pub taken_at: TimeStamp<Utc>,
}

/// One row of the unified audit timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Comment(Comment),
    Change(DerivedComment),
}

fn push_change<T: PartialEq>(
    changes: &mut Vec<FieldChange>,
    label: &'static str,
    old: &T,
    new: &T,
    render: impl Fn(&T) -> String,
) {
    if old != new {
        changes.push(FieldChange {
            label,
            old: render(old),
            new: render(new),
        });
    }
}

fn opt_string(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

pub fn diff_invoice(prev: &Invoice, next: &Invoice) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    push_change(&mut changes, "Currency", &prev.currency, &next.currency, |v| {
        v.to_string()
    });
    push_change(&mut changes, "Status", &prev.status, &next.status, |v| {
        v.label().to_string()
    });
    push_change(
        &mut changes,
        "PO number",
        &prev.po_number,
        &next.po_number,
        |v| v.clone(),
    );
    push_change(
        &mut changes,
        "Invoice date",
        &prev.invoice_date,
        &next.invoice_date,
        |v| v.date_string(),
    );
    push_change(
        &mut changes,
        "Due Date",
        &prev.invoice_due_date,
        &next.invoice_due_date,
        |v| v.date_string(),
    );
    push_change(
        &mut changes,
        "Invoice Number",
        &prev.invoice_number,
        &next.invoice_number,
        |v| v.clone(),
    );
    push_change(
        &mut changes,
        "Invoice Type",
        &prev.invoice_type,
        &next.invoice_type,
        |v| v.to_string(),
    );
    push_change(
        &mut changes,
        "Net amount",
        &prev.net_amount,
        &next.net_amount,
        |v| v.to_string(),
    );
    push_change(&mut changes, "Tax Liens", &prev.vat, &next.vat, |v| {
        v.to_string()
    });
    push_change(
        &mut changes,
        "Total",
        &prev.total_amount,
        &next.total_amount,
        |v| v.to_string(),
    );
    push_change(
        &mut changes,
        "Invoice File",
        &prev.invoice_file,
        &next.invoice_file,
        opt_string,
    );
    push_change(
        &mut changes,
        "PO file",
        &prev.po_file,
        &next.po_file,
        opt_string,
    );
    push_change(
        &mut changes,
        "Workday ID",
        &prev.workday_id,
        &next.workday_id,
        |v| v.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
    );
    changes
}

pub fn diff_taxpayer(prev: &TaxPayer, next: &TaxPayer) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    push_change(
        &mut changes,
        "Business Name",
        &prev.business_name,
        &next.business_name,
        |v| v.clone(),
    );
    push_change(
        &mut changes,
        "Workday ID",
        &prev.workday_id,
        &next.workday_id,
        opt_string,
    );
    push_change(&mut changes, "Country", &prev.country, &next.country, |v| {
        v.clone()
    });
    push_change(&mut changes, "Status", &prev.status, &next.status, |v| {
        v.label().to_string()
    });
    changes
}

pub fn diff_images(prev: &EntityImage, next: &EntityImage) -> Vec<FieldChange> {
    match (prev, next) {
        (EntityImage::Invoice(a), EntityImage::Invoice(b)) => diff_invoice(a, b),
        (EntityImage::Taxpayer(a), EntityImage::Taxpayer(b)) => diff_taxpayer(a, b),
        // mixed kinds never share a chain
        _ => Vec::new(),
    }
}

/// Render one pair's changes into a single message. Deterministic: the same
/// pair always produces the identical string.
pub fn render_changes(changes: &[FieldChange]) -> String {
    let mut message = String::from("Changed: \n");
    for change in changes {
        message.push_str(&format!(
            "{} from {} to {}\n",
            change.label, change.old, change.new
        ));
    }
    message
}

/// Walk the chain oldest to newest and produce one derived comment per
/// consecutive snapshot pair. A one-snapshot chain yields nothing.
pub fn history_comments(chain: &[Snapshot]) -> Vec<DerivedComment> {
    chain
        .windows(2)
        .map(|pair| {
            let changes = diff_images(&pair[0].image, &pair[1].image);
            DerivedComment {
                user_id: pair[1].actor.clone(),
                message: render_changes(&changes),
                taken_at: pair[1].taken_at.clone(),
            }
        })
        .collect()
}

/// Merge explicit comments (newest first, as displayed) with derived diff
/// records (chain order). Final interleaving belongs to the consuming view.
pub fn unified_timeline(comments: Vec<Comment>, chain: &[Snapshot]) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = Vec::new();
    let mut explicit = comments;
    explicit.sort_by(|a, b| {
        b.comment_date_received
            .to_datetime_utc()
            .cmp(&a.comment_date_received.to_datetime_utc())
    });
    entries.extend(explicit.into_iter().map(TimelineEntry::Comment));
    entries.extend(history_comments(chain).into_iter().map(TimelineEntry::Change));
    entries
}
