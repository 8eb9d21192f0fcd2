//! Property-based tests for snapshot diffing and the transition engine
//!
//! This module uses proptest to verify that audit derivation and the status
//! transition logic behave correctly across a wide variety of invoice values.
//! The diff generator is read-time only, so a bug here silently corrupts the
//! audit trail users see without corrupting storage.
//!
//! These tests focus on invariants that should hold regardless of the
//! specific field values, helping catch edge cases that would be difficult
//! to find with manual test case selection.

use proptest::prelude::*;

use britesu::history::{diff_invoice, history_comments, render_changes};
use britesu::invoice::Invoice;
use britesu::snapshot::{EntityImage, Snapshot};
use britesu::status::InvoiceStatus;
use britesu::transition::{apply_invoice_transition, TransitionPolicy, TransitionRequest};
use britesu::types::{Amount, Currency, InvoiceType, TimeStamp};
use rust_decimal::Decimal;

// These property tests cover:
//
// 1. Self-diff emptiness - an unchanged invoice never produces audit noise
// 2. Diff symmetry - reversing a pair swaps old/new but nothing else
// 3. Chain length - N snapshots always derive exactly N-1 comments
// 4. Render determinism - the same pair always renders the same message
// 5. Payload-free transitions - only the status field moves
// 6. Wire code roundtrip - code() and from_code() agree for every status
//
// What these tests DON'T cover (deliberately):
//
// - Database persistence (requires tempfile, better in integration tests)
// - Authorization checks (handled by the service layer, not diffing)
//

fn status_strategy() -> impl Strategy<Value = InvoiceStatus> {
    prop_oneof![
        Just(InvoiceStatus::Approved),
        Just(InvoiceStatus::Pending),
        Just(InvoiceStatus::ChangesRequested),
        Just(InvoiceStatus::Rejected),
        Just(InvoiceStatus::Paid),
        Just(InvoiceStatus::InProgress),
    ]
}

fn invoice_strategy() -> impl Strategy<Value = Invoice> {
    (
        prop_oneof![Just(Currency::ARS), Just(Currency::USD)],
        status_strategy(),
        "PO-[0-9]{1,5}",
        0i64..3650,
        "[0-9]{4}-[0-9]{1,8}",
        prop_oneof![Just(InvoiceType::A), Just(InvoiceType::C)],
        (1u32..1_000_000, 0u32..1_000_000, 1u32..1_000_000),
        proptest::option::of(1u64..100_000),
    )
        .prop_map(
            |(currency, status, po_number, day_offset, invoice_number, invoice_type, amounts, workday_id)| {
                let invoice_date = TimeStamp::new_with(2024, 1, 1, 0, 0, 0).plus_days(day_offset);
                Invoice {
                    id: "invoice_prop".to_string(),
                    taxpayer_id: "taxpayer_prop".to_string(),
                    currency,
                    status,
                    po_number,
                    invoice_date: invoice_date.clone(),
                    invoice_due_date: invoice_date.plus_days(30),
                    invoice_date_received: invoice_date,
                    invoice_number,
                    invoice_type,
                    net_amount: Amount::new(Decimal::from(amounts.0)),
                    vat: Amount::new(Decimal::from(amounts.1)),
                    total_amount: Amount::new(Decimal::from(amounts.2)),
                    user_id: "user_prop".to_string(),
                    invoice_file: Some("invoice.pdf".to_string()),
                    po_file: None,
                    workday_id,
                }
            },
        )
}

fn chain_strategy() -> impl Strategy<Value = Vec<Snapshot>> {
    proptest::collection::vec(invoice_strategy(), 1..8).prop_map(|invoices| {
        invoices
            .into_iter()
            .enumerate()
            .map(|(seq, invoice)| Snapshot {
                entity_id: "invoice_prop".to_string(),
                seq: seq as u64,
                prev: (seq > 0).then(|| format!("hash_{}", seq - 1)),
                actor: format!("user_{seq}"),
                taken_at: TimeStamp::new_with(2024, 1, 1, 0, 0, 0).plus_days(seq as i64),
                change_reason: None,
                image: EntityImage::Invoice(invoice),
            })
            .collect()
    })
}

proptest! {
    /// An invoice diffed against itself never produces changes
    #[test]
    fn self_diff_is_empty(invoice in invoice_strategy()) {
        prop_assert!(diff_invoice(&invoice, &invoice).is_empty());
    }

    /// Reversing a pair swaps old and new, field for field
    #[test]
    fn diff_is_symmetric(a in invoice_strategy(), b in invoice_strategy()) {
        let forward = diff_invoice(&a, &b);
        let backward = diff_invoice(&b, &a);
        prop_assert_eq!(forward.len(), backward.len());
        for (f, b) in forward.iter().zip(backward.iter()) {
            prop_assert_eq!(f.label, b.label);
            prop_assert_eq!(&f.old, &b.new);
            prop_assert_eq!(&f.new, &b.old);
        }
    }

    /// A chain of N snapshots derives exactly N-1 comments, attributed to
    /// the actor of the later snapshot in each pair
    #[test]
    fn chain_derives_one_comment_per_pair(chain in chain_strategy()) {
        let derived = history_comments(&chain);
        prop_assert_eq!(derived.len(), chain.len() - 1);
        for (i, comment) in derived.iter().enumerate() {
            prop_assert_eq!(&comment.user_id, &chain[i + 1].actor);
            prop_assert!(comment.message.starts_with("Changed: \n"));
        }
    }

    /// Rendering is deterministic for a given pair
    #[test]
    fn render_is_deterministic(a in invoice_strategy(), b in invoice_strategy()) {
        let first = render_changes(&diff_invoice(&a, &b));
        let second = render_changes(&diff_invoice(&a, &b));
        prop_assert_eq!(first, second);
    }

    /// Payload-free transitions move the status field and nothing else
    #[test]
    fn payload_free_transition_touches_only_status(
        invoice in invoice_strategy(),
        target in prop_oneof![
            Just(InvoiceStatus::Approved),
            Just(InvoiceStatus::Pending),
            Just(InvoiceStatus::Rejected),
            Just(InvoiceStatus::Paid),
        ],
    ) {
        let mut after = invoice.clone();
        let outcome = apply_invoice_transition(
            &mut after,
            &TransitionRequest::to(target),
            &TransitionPolicy::default(),
            |_| Ok(false),
        )
        .unwrap();

        prop_assert_eq!(outcome.status, target);
        prop_assert_eq!(outcome.change_reason, None);

        let mut expected = invoice;
        expected.status = target;
        prop_assert_eq!(after, expected);
    }

    /// Every status roundtrips through its wire code and display label
    #[test]
    fn wire_code_roundtrips(status in status_strategy()) {
        prop_assert_eq!(InvoiceStatus::from_code(status.code()).unwrap(), status);
        prop_assert_eq!(InvoiceStatus::from_label(status.label()).unwrap(), status);
    }
}
