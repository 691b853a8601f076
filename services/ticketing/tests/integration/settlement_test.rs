use chrono::{Duration, Utc};
use gather_domain::access::{AccessTier, EventAccess};
use gather_domain::payment::PaymentStatus;
use gather_domain::job::JobKind;
use gather_ticketing::domain::types::{AccountSnapshot, ProcessorEvent, RefundNotice};
use gather_ticketing::error::TicketingError;
use gather_ticketing::usecase::checkout::CheckoutInput;
use gather_ticketing::usecase::settlement::ReconcileOutcome;

use crate::helpers::{MockEmail, ORGANISER_EMAIL, World, guest};

async fn open_session(world: &World, email: &str, quantity: u32) -> String {
    world
        .checkout()
        .execute(CheckoutInput {
            event_id: world.event_id,
            ticket_id: world.ticket_id,
            quantity,
            buyer: guest("Guest", email),
        })
        .await
        .unwrap()
        .session_id
}

// ── Checkout completed ───────────────────────────────────────────────────────

#[tokio::test]
async fn should_settle_happy_path() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 2).await;

    let outcome = world
        .reconciler()
        .handle(world.completion(&session))
        .await
        .unwrap();

    let registrations = world.store.registrations();
    assert_eq!(registrations.len(), 1);
    let registration = &registrations[0];
    assert_eq!(
        outcome,
        ReconcileOutcome::Settled {
            registration_id: registration.id
        }
    );
    assert_eq!(registration.quantity, 2);
    assert_eq!(registration.holder_email, "ana@example.com");
    assert_eq!(registration.payment_status, Some(PaymentStatus::Succeeded));

    let payment = world.store.payment_by_session(&session).unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.registration_id, Some(registration.id));
    assert_eq!(payment.payment_reference.as_deref(), Some("pi_cs_test_1"));
    assert_eq!(
        (payment.fee.gross, payment.fee.platform_fee, payment.fee.payee_share),
        (2_000, 200, 1_800)
    );
}

#[tokio::test]
async fn should_email_buyer_and_organiser_and_schedule_notifications() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 1).await;

    world
        .reconciler()
        .handle(world.completion(&session))
        .await
        .unwrap();

    let sent = world.email.sent();
    assert_eq!(sent.len(), 2);
    let confirmation = sent.iter().find(|m| m.to == "ana@example.com").unwrap();
    assert_eq!(confirmation.attachments[0].filename, "event.ics");
    assert!(sent.iter().any(|m| m.to == ORGANISER_EMAIL));

    assert_eq!(world.queue.named(JobKind::UserReminder).len(), 1);
    assert_eq!(world.queue.named(JobKind::OrganizerSummary).len(), 1);
    // guests are external and the event has a forwarding address
    assert_eq!(world.queue.named(JobKind::ExternalForwarding).len(), 1);
}

#[tokio::test]
async fn should_treat_redelivered_completion_as_success() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 2).await;
    let reconciler = world.reconciler();

    reconciler.handle(world.completion(&session)).await.unwrap();
    let replay = reconciler.handle(world.completion(&session)).await.unwrap();

    assert_eq!(replay, ReconcileOutcome::AlreadySettled);
    assert_eq!(world.store.registrations().len(), 1);
    assert_eq!(world.email.sent().len(), 2, "no second round of emails");
}

#[tokio::test]
async fn should_settle_captured_payment_for_event_that_has_since_ended() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 1).await;
    world.store.update_event(world.event_id, |event| {
        event.start_at = Utc::now() - Duration::hours(5);
        event.end_at = Utc::now() - Duration::hours(1);
    });

    let outcome = world
        .reconciler()
        .handle(world.completion(&session))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Settled { .. }));
    assert_eq!(world.store.registrations().len(), 1);
    let payment = world.store.payment_by_session(&session).unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert!(world.queue.all().is_empty(), "nothing left to notify about");
}

#[tokio::test]
async fn should_not_fail_settlement_when_email_is_down() {
    let mut world = World::new(Some(10));
    world.email = MockEmail::failing();
    let session = open_session(&world, "ana@example.com", 1).await;

    let outcome = world
        .reconciler()
        .handle(world.completion(&session))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Settled { .. }));
    assert_eq!(world.email.attempts(), 2);
    assert_eq!(world.store.registrations().len(), 1);
}

#[tokio::test]
async fn should_not_notify_sentinel_organiser() {
    let mut world = World::new(Some(10));
    world.sentinel_account = Some(world.organiser_id);
    let session = open_session(&world, "ana@example.com", 1).await;

    world
        .reconciler()
        .handle(world.completion(&session))
        .await
        .unwrap();

    let sent = world.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ana@example.com");
}

#[tokio::test]
async fn should_wait_for_uncleared_payment() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 1).await;
    let mut event = world.completion(&session);
    if let ProcessorEvent::CheckoutCompleted(completion) = &mut event {
        completion.paid = false;
    }

    let outcome = world.reconciler().handle(event).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::AwaitingPayment);
    assert_eq!(
        world.store.payment_by_session(&session).unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn should_reject_and_fail_payment_with_incomplete_metadata() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 1).await;
    let mut event = world.completion(&session);
    if let ProcessorEvent::CheckoutCompleted(completion) = &mut event {
        completion.metadata.remove("ticket_id");
    }

    let outcome = world.reconciler().handle(event).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Rejected {
            reason: "incomplete metadata: ticket_id".to_owned()
        }
    );
    let payment = world.store.payment_by_session(&session).unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(world.store.registrations().is_empty());
}

#[tokio::test]
async fn should_reject_completion_without_local_payment() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 1).await;
    let mut event = world.completion(&session);
    if let ProcessorEvent::CheckoutCompleted(completion) = &mut event {
        completion.session_id = "cs_unknown".to_owned();
    }

    let outcome = world.reconciler().handle(event).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Rejected { .. }));
    assert!(world.store.registrations().is_empty());
}

// ── Inventory ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_not_oversell_under_sequential_access() {
    let stock = 3;
    let world = World::new(Some(stock));
    let reconciler = world.reconciler();

    for n in 0..stock {
        let session = open_session(&world, &format!("buyer{n}@example.com"), 1).await;
        let outcome = reconciler.handle(world.completion(&session)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Settled { .. }));
    }

    let result = world
        .checkout()
        .execute(CheckoutInput {
            event_id: world.event_id,
            ticket_id: world.ticket_id,
            quantity: 1,
            buyer: guest("Late", "late@example.com"),
        })
        .await;
    assert!(
        matches!(result, Err(TicketingError::SoldOut)),
        "expected SoldOut, got {result:?}"
    );
}

#[tokio::test]
async fn should_settle_only_one_of_two_racing_buyers_for_last_ticket() {
    let world = World::new(Some(1));
    // Both pass the gate: nothing is registered yet.
    let first = open_session(&world, "ana@example.com", 1).await;
    let second = open_session(&world, "bea@example.com", 1).await;
    let reconciler = world.reconciler();

    let (a, b) = tokio::join!(
        reconciler.handle(world.completion(&first)),
        reconciler.handle(world.completion(&second)),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let settled = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::Settled { .. }))
        .count();
    let rejected: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            ReconcileOutcome::Rejected { reason } => Some(reason.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(settled, 1);
    assert_eq!(rejected, ["sold out"]);
    assert_eq!(world.store.registrations().len(), 1);

    let statuses = [
        world.store.payment_by_session(&first).unwrap().status,
        world.store.payment_by_session(&second).unwrap().status,
    ];
    assert!(statuses.contains(&PaymentStatus::Succeeded));
    assert!(statuses.contains(&PaymentStatus::Failed));
}

#[tokio::test]
async fn should_reject_second_payment_for_same_holder() {
    let world = World::new(None);
    let first = open_session(&world, "ana@example.com", 1).await;
    let second = open_session(&world, "ana@example.com", 1).await;
    let reconciler = world.reconciler();

    reconciler.handle(world.completion(&first)).await.unwrap();
    let outcome = reconciler.handle(world.completion(&second)).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Rejected {
            reason: "holder already registered for this event".to_owned()
        }
    );
    assert_eq!(world.store.registrations().len(), 1);
}

// ── Refunds, expiry, accounts ────────────────────────────────────────────────

fn refund(reference: &str) -> ProcessorEvent {
    ProcessorEvent::ChargeRefunded(RefundNotice {
        payment_reference: reference.to_owned(),
        amount_refunded: 1_000,
        refund_reference: "re_1".to_owned(),
    })
}

#[tokio::test]
async fn should_refund_settled_payment_and_cascade_to_registration() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 1).await;
    let reconciler = world.reconciler();
    reconciler.handle(world.completion(&session)).await.unwrap();

    let outcome = reconciler.handle(refund("pi_cs_test_1")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Refunded);

    let payment = world.store.payment_by_session(&session).unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refund_amount_minor, Some(1_000));
    assert_eq!(payment.refund_reference.as_deref(), Some("re_1"));
    assert_eq!(
        world.store.registrations()[0].payment_status,
        Some(PaymentStatus::Refunded)
    );

    let replay = reconciler.handle(refund("pi_cs_test_1")).await.unwrap();
    assert_eq!(replay, ReconcileOutcome::Refunded);
}

#[tokio::test]
async fn should_ignore_refund_for_unknown_payment() {
    let world = World::new(Some(10));

    let outcome = world.reconciler().handle(refund("pi_missing")).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::RefundIgnored);
}

#[tokio::test]
async fn should_fail_pending_payment_on_session_expiry() {
    let world = World::new(Some(10));
    let session = open_session(&world, "ana@example.com", 1).await;
    let reconciler = world.reconciler();

    let outcome = reconciler
        .handle(ProcessorEvent::CheckoutExpired {
            session_id: session.clone(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Expired);

    let payment = world.store.payment_by_session(&session).unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_reason.as_deref(), Some("expired"));

    let again = reconciler
        .handle(ProcessorEvent::CheckoutExpired {
            session_id: session.clone(),
        })
        .await
        .unwrap();
    assert_eq!(again, ReconcileOutcome::ExpiryIgnored);

    // a late completion for the expired session is acknowledged without effect
    let late = reconciler.handle(world.completion(&session)).await.unwrap();
    assert_eq!(late, ReconcileOutcome::AlreadySettled);
    assert!(world.store.registrations().is_empty());
}

#[tokio::test]
async fn should_sync_organiser_account_flags() {
    let world = World::new(Some(10));

    let outcome = world
        .reconciler()
        .handle(ProcessorEvent::AccountUpdated(AccountSnapshot {
            account_id: "acct_dance".to_owned(),
            charges_enabled: true,
            payouts_enabled: false,
            details_submitted: true,
        }))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::AccountSynced);
    let account = world
        .store
        .organiser(world.organiser_id)
        .and_then(|o| o.account)
        .unwrap();
    assert!(!account.payouts_enabled);
    assert!(!account.is_ready());
}

#[tokio::test]
async fn should_report_unknown_account() {
    let world = World::new(Some(10));

    let outcome = world
        .reconciler()
        .handle(ProcessorEvent::AccountUpdated(AccountSnapshot {
            account_id: "acct_other".to_owned(),
            charges_enabled: true,
            payouts_enabled: true,
            details_submitted: true,
        }))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::AccountUnknown);
}

#[tokio::test]
async fn should_acknowledge_unhandled_event_kinds() {
    let world = World::new(Some(10));

    let outcome = world
        .reconciler()
        .handle(ProcessorEvent::Unhandled("invoice.paid".to_owned()))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Unhandled("invoice.paid".to_owned()));
}

#[test]
fn should_refuse_registration_tier_looser_than_visibility() {
    assert!(EventAccess::new(AccessTier::Members, AccessTier::Public, vec![]).is_err());
    assert!(EventAccess::new(AccessTier::Public, AccessTier::Members, vec![]).is_ok());
}
