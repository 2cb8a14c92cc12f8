use anyhow::Context;
use chrono::Duration;
use sled::open;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tempfile::{TempDir, tempdir};
use ticket_inventory::{
    catalog::TicketFilter,
    clock::{Clock, FixedClock, SystemClock},
    error::{TicketError, ValidationError},
    order::{OrderStatus, PaymentStatus},
    policy::{DenyReason, Verdict},
    service::TicketService,
    ticket::{TicketPatch, TicketTypeInput},
    types::{BuyerId, EventId, OrderId, TicketTypeId, TimeStamp},
    utils::{OrderNumberSource, TimestampOrderNumbers},
};

// Sled uses file-based locking to prevent concurrent access, so every test gets
// its own database in a temp directory. The TempDir must outlive the service.
fn open_service(name: &str) -> anyhow::Result<(TempDir, TicketService)> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join(name))?);
    let service = TicketService::new(db)?;
    Ok((temp_dir, service))
}

fn denied(result: Result<impl std::fmt::Debug, TicketError>) -> Option<DenyReason> {
    result.err().and_then(|e| e.deny_reason())
}

#[test]
fn paid_order_lifecycle() -> anyhow::Result<()> {
    let (_dir, service) = open_service("paid_order_lifecycle.db")?;
    let event = EventId::new("evt-1");

    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("Standing", 4_500, "GBP").set_total_quantity(10),
    )?;
    assert_eq!(ticket.available_count, Some(10));

    let order = service
        .create_order(&event, &ticket.id, 3, &BuyerId::new("buyer-1"))
        .context("Order failed on create: ")?;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.payment_method, None);
    assert_eq!(order.total_price, 13_500);
    assert_eq!(order.currency.code(), "GBP");
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(7));

    // the payment channel confirms
    let order = service.complete_order(&order.id, Some("card".to_string()))?;
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_method.as_deref(), Some("card"));

    // a completed order cannot be cancelled, and stock stays where it is
    let err = service.cancel_order(&order.id).unwrap_err();
    assert!(matches!(
        err,
        TicketError::InvalidTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Cancelled
        }
    ));
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(7));

    // completing twice is rejected too
    assert!(matches!(
        service.complete_order(&order.id, None),
        Err(TicketError::InvalidTransition { .. })
    ));

    Ok(())
}

#[test]
fn cancel_and_fail_release_stock_once() -> anyhow::Result<()> {
    let (_dir, service) = open_service("cancel_and_fail.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("Balcony", 2_000, "EUR").set_total_quantity(5),
    )?;
    let buyer = BuyerId::new("buyer-1");

    let first = service.create_order(&event, &ticket.id, 2, &buyer)?;
    let second = service.create_order(&event, &ticket.id, 2, &buyer)?;
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(1));

    let cancelled = service.cancel_order(&first.id)?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(3));

    assert!(matches!(
        service.cancel_order(&first.id),
        Err(TicketError::InvalidTransition { .. })
    ));
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(3));

    let failed = service.fail_order(&second.id, "card declined")?;
    assert_eq!(failed.status, OrderStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    assert_eq!(failed.payment_status, PaymentStatus::Pending);
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(5));

    assert!(matches!(
        service.fail_order(&second.id, "again"),
        Err(TicketError::InvalidTransition { .. })
    ));
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(5));

    Ok(())
}

#[test]
fn free_order_completes_without_confirmation() -> anyhow::Result<()> {
    let (_dir, service) = open_service("free_order.db")?;
    let event = EventId::new("evt-free");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("Community", 0, "USD").set_total_quantity(2),
    )?;

    let order = service.create_order(&event, &ticket.id, 2, &BuyerId::new("buyer-1"))?;

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_method.as_deref(), Some("free"));
    assert_eq!(order.total_price, 0);
    assert_eq!(service.get_order(&order.id)?, order);
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(0));

    Ok(())
}

/// Reads the system time until `jump_at` calls have been made, then a time the
/// store cannot encode.
struct JumpingClock {
    calls: AtomicUsize,
    jump_at: usize,
}

impl Clock for JumpingClock {
    fn now(&self) -> TimeStamp {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.jump_at {
            TimeStamp::new_with(2300, 1, 1, 0, 0, 0).unwrap_or_default()
        } else {
            TimeStamp::new()
        }
    }
}

fn open_with_clock(name: &str, clock: Arc<dyn Clock>) -> anyhow::Result<(TempDir, TicketService)> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join(name))?);
    let service = TicketService::with_clock(db, clock)?;
    Ok((temp_dir, service))
}

#[test]
fn free_order_is_stored_completed_in_one_write() -> anyhow::Result<()> {
    // calls: create_ticket, availability check, order write
    let clock = Arc::new(JumpingClock {
        calls: AtomicUsize::new(0),
        jump_at: 4,
    });
    let (_dir, service) = open_with_clock("free_single_write.db", clock)?;
    let event = EventId::new("evt-free");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("RSVP", 0, "USD").set_total_quantity(1),
    )?;
    let buyer = BuyerId::new("buyer-1");

    let order = service.create_order(&event, &ticket.id, 1, &buyer)?;

    assert_eq!(order.status, OrderStatus::Completed);
    let stored = service.orders_for_buyer(&buyer)?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, OrderStatus::Completed);
    assert_eq!(stored[0].payment_method.as_deref(), Some("free"));

    Ok(())
}

#[test]
fn failed_free_order_write_leaves_nothing_behind() -> anyhow::Result<()> {
    let clock = Arc::new(JumpingClock {
        calls: AtomicUsize::new(0),
        jump_at: 3,
    });
    let (_dir, service) = open_with_clock("free_write_fails.db", clock)?;
    let event = EventId::new("evt-free");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("RSVP", 0, "USD").set_total_quantity(1),
    )?;
    let buyer = BuyerId::new("buyer-1");

    let err = service.create_order(&event, &ticket.id, 1, &buyer).unwrap_err();

    assert!(err.is_infrastructure());
    assert!(service.orders_for_buyer(&buyer)?.is_empty());
    assert_eq!(service.stock_level(&ticket.id)?.held, 0);
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(1));

    Ok(())
}

#[test]
fn sale_window_denials_reserve_nothing() -> anyhow::Result<()> {
    let (_dir, service) = open_service("sale_window.db")?;
    let event = EventId::new("evt-1");
    let now = TimeStamp::new();

    let upcoming = service.create_ticket(
        &event,
        TicketTypeInput::new("Early Bird", 1_000, "USD")
            .set_kind("EarlyBird")
            .set_total_quantity(50)
            .set_sale_window(Some(now.plus(Duration::hours(24))), None),
    )?;
    let over = service.create_ticket(
        &event,
        TicketTypeInput::new("Presale", 1_000, "USD")
            .set_total_quantity(50)
            .set_sale_window(None, Some(now.plus(Duration::hours(-1)))),
    )?;

    let buyer = BuyerId::new("buyer-1");
    assert_eq!(
        denied(service.create_order(&event, &upcoming.id, 1, &buyer)),
        Some(DenyReason::SalesNotStarted)
    );
    assert_eq!(
        denied(service.create_order(&event, &over.id, 1, &buyer)),
        Some(DenyReason::SalesEnded)
    );

    assert_eq!(service.get_ticket(&upcoming.id)?.available_count, Some(50));
    assert_eq!(service.get_ticket(&over.id)?.available_count, Some(50));
    assert!(service.orders_for_buyer(&buyer)?.is_empty());

    Ok(())
}

#[test]
fn sale_opens_when_the_clock_reaches_it() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("clock.db"))?);
    let start = TimeStamp::new_with(2026, 3, 1, 9, 0, 0).context("bad date")?;
    let clock = Arc::new(FixedClock::new(start.plus(Duration::minutes(-1))));
    let service = TicketService::with_clock(db, clock.clone())?;
    let event = EventId::new("evt-1");

    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("GA", 500, "USD").set_sale_window(Some(start), None),
    )?;
    assert_eq!(
        service.check_availability(&ticket.id, 1)?,
        Verdict::Denied(DenyReason::SalesNotStarted)
    );

    clock.set(start);
    assert_eq!(service.check_availability(&ticket.id, 1)?, Verdict::Allowed);
    let order = service.create_order(&event, &ticket.id, 1, &BuyerId::new("buyer-1"))?;
    assert_eq!(order.created_at, clock.now());

    Ok(())
}

#[test]
fn limits_are_checked_after_stock() -> anyhow::Result<()> {
    let (_dir, service) = open_service("limits.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("Table", 10_000, "USD")
            .set_total_quantity(8)
            .set_limits(2, Some(4)),
    )?;
    let buyer = BuyerId::new("buyer-1");

    assert_eq!(
        denied(service.create_order(&event, &ticket.id, 1, &buyer)),
        Some(DenyReason::BelowMinimum)
    );
    assert_eq!(
        denied(service.create_order(&event, &ticket.id, 5, &buyer)),
        Some(DenyReason::AboveMaximum)
    );
    // more than is left outranks the per-order maximum
    assert_eq!(
        denied(service.create_order(&event, &ticket.id, 9, &buyer)),
        Some(DenyReason::InsufficientInventory)
    );
    assert_eq!(
        denied(service.create_order(&event, &ticket.id, 0, &buyer)),
        Some(DenyReason::BelowMinimum)
    );

    service.create_order(&event, &ticket.id, 4, &buyer)?;
    service.create_order(&event, &ticket.id, 4, &buyer)?;
    assert_eq!(
        denied(service.create_order(&event, &ticket.id, 2, &buyer)),
        Some(DenyReason::InsufficientInventory)
    );

    Ok(())
}

#[test]
fn inactive_ticket_is_denied() -> anyhow::Result<()> {
    let (_dir, service) = open_service("inactive.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("Backstage", 0, "USD").set_active(false),
    )?;

    assert_eq!(
        denied(service.create_order(&event, &ticket.id, 1, &BuyerId::new("b"))),
        Some(DenyReason::TicketInactive)
    );

    service.update_ticket(&ticket.id, TicketPatch::new().set_active(true))?;
    assert!(service.check_availability(&ticket.id, 1)?.is_allowed());

    Ok(())
}

#[test]
fn price_edits_do_not_touch_existing_orders() -> anyhow::Result<()> {
    let (_dir, service) = open_service("price_snapshot.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("GA", 3_000, "USD").set_total_quantity(100),
    )?;

    let order = service.create_order(&event, &ticket.id, 2, &BuyerId::new("buyer-1"))?;

    let updated = service.update_ticket(&ticket.id, TicketPatch::new().set_unit_price(9_900))?;
    assert_eq!(updated.unit_price, 9_900);
    assert_eq!(updated.available_count, Some(98));

    let stored = service.get_order(&order.id)?;
    assert_eq!(stored.unit_price, 3_000);
    assert_eq!(stored.total_price, 6_000);

    let later = service.create_order(&event, &ticket.id, 1, &BuyerId::new("buyer-2"))?;
    assert_eq!(later.total_price, 9_900);

    Ok(())
}

#[test]
fn total_quantity_cannot_drop_below_held_units() -> anyhow::Result<()> {
    let (_dir, service) = open_service("resize.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("GA", 1_000, "USD").set_total_quantity(10),
    )?;
    let buyer = BuyerId::new("buyer-1");

    let pending = service.create_order(&event, &ticket.id, 3, &buyer)?;
    let done = service.create_order(&event, &ticket.id, 2, &buyer)?;
    service.complete_order(&done.id, Some("card".into()))?;

    let err = service
        .update_ticket(&ticket.id, TicketPatch::new().set_total_quantity(Some(4)))
        .unwrap_err();
    assert!(matches!(
        err,
        TicketError::Validation(ValidationError::QuantityBelowCommitted {
            requested: 4,
            committed: 5
        })
    ));
    assert_eq!(service.get_ticket(&ticket.id)?.total_quantity, Some(10));

    let resized = service.update_ticket(&ticket.id, TicketPatch::new().set_total_quantity(Some(5)))?;
    assert_eq!(resized.available_count, Some(0));

    service.cancel_order(&pending.id)?;
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(3));

    // going unlimited drops the count altogether
    let unlimited = service.update_ticket(&ticket.id, TicketPatch::new().set_total_quantity(None))?;
    assert_eq!(unlimited.available_count, None);
    assert_eq!(service.stock_level(&ticket.id)?.held, 2);

    Ok(())
}

#[test]
fn invalid_catalog_input_is_rejected() -> anyhow::Result<()> {
    let (_dir, service) = open_service("invalid_input.db")?;
    let event = EventId::new("evt-1");

    let err = service
        .create_ticket(&event, TicketTypeInput::new("", 100, "USD"))
        .unwrap_err();
    assert!(matches!(err, TicketError::Validation(ValidationError::MissingName)));

    let err = service
        .create_ticket(&event, TicketTypeInput::new("GA", -5, "USD"))
        .unwrap_err();
    assert!(matches!(
        err,
        TicketError::Validation(ValidationError::NegativePrice(-5))
    ));

    let ticket = service.create_ticket(&event, TicketTypeInput::new("GA", 100, "USD"))?;
    let err = service
        .update_ticket(&ticket.id, TicketPatch::new().set_limits(3, Some(2)))
        .unwrap_err();
    assert!(matches!(
        err,
        TicketError::Validation(ValidationError::MinimumAboveMaximum { min: 3, max: 2 })
    ));
    assert!(service.list_tickets(&event, TicketFilter::all())?.len() == 1);

    Ok(())
}

#[test]
fn sale_dates_beyond_the_storable_range_are_invalid() -> anyhow::Result<()> {
    let (_dir, service) = open_service("far_dates.db")?;
    let event = EventId::new("evt-1");
    let far = TimeStamp::new_with(2300, 1, 1, 0, 0, 0).context("bad date")?;

    let err = service
        .create_ticket(
            &event,
            TicketTypeInput::new("GA", 100, "USD").set_sale_window(None, Some(far)),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TicketError::Validation(ValidationError::SaleDateOutOfRange(at)) if at == far
    ));
    assert!(!err.is_infrastructure());

    let ticket = service.create_ticket(&event, TicketTypeInput::new("GA", 100, "USD"))?;
    let err = service
        .update_ticket(&ticket.id, TicketPatch::new().set_sale_window(Some(far), None))
        .unwrap_err();
    assert!(matches!(
        err,
        TicketError::Validation(ValidationError::SaleDateOutOfRange(_))
    ));
    assert_eq!(service.get_ticket(&ticket.id)?.sale_start_at, None);

    Ok(())
}

#[test]
fn listing_follows_display_order() -> anyhow::Result<()> {
    let (_dir, service) = open_service("listing.db")?;
    let event = EventId::new("evt-1");
    let other = EventId::new("evt-2");

    service.create_ticket(&event, TicketTypeInput::new("VIP", 9_000, "USD").set_sort_order(1))?;
    service.create_ticket(&event, TicketTypeInput::new("Student", 1_500, "USD").set_sort_order(1))?;
    service.create_ticket(&event, TicketTypeInput::new("GA", 5_000, "USD").set_sort_order(0))?;
    service.create_ticket(
        &event,
        TicketTypeInput::new("Crew", 0, "USD")
            .set_sort_order(0)
            .set_visible(false),
    )?;
    service.create_ticket(
        &event,
        TicketTypeInput::new("Retired", 0, "USD")
            .set_sort_order(2)
            .set_active(false),
    )?;
    service.create_ticket(&other, TicketTypeInput::new("Elsewhere", 0, "USD"))?;

    let names = |tickets: Vec<ticket_inventory::ticket::TicketType>| {
        tickets.into_iter().map(|t| t.name).collect::<Vec<_>>()
    };

    assert_eq!(
        names(service.list_tickets(&event, TicketFilter::all())?),
        ["Crew", "GA", "Student", "VIP", "Retired"]
    );
    assert_eq!(
        names(service.list_tickets(&event, TicketFilter::storefront())?),
        ["GA", "Student", "VIP"]
    );
    assert_eq!(
        names(service.list_tickets(
            &event,
            TicketFilter {
                active_only: true,
                visible_only: false
            }
        )?),
        ["Crew", "GA", "Student", "VIP"]
    );
    assert_eq!(names(service.list_tickets(&other, TicketFilter::all())?), ["Elsewhere"]);

    Ok(())
}

#[test]
fn metadata_and_kind_are_preserved() -> anyhow::Result<()> {
    let (_dir, service) = open_service("metadata.db")?;
    let event = EventId::new("evt-1");

    let created = service.create_ticket(
        &event,
        TicketTypeInput::new("Sunrise Session", 2_000, "USD")
            .set_kind("Golden Hour (limited)")
            .set_description("Doors at 5am")
            .insert_metadata("gate", "B")
            .insert_metadata("wristband", "orange"),
    )?;

    let fetched = service.get_ticket(&created.id)?;
    assert_eq!(fetched.kind, "Golden Hour (limited)");
    assert_eq!(fetched.description.as_deref(), Some("Doors at 5am"));
    assert_eq!(fetched.metadata.get("gate").map(String::as_str), Some("B"));
    assert_eq!(fetched.metadata.len(), 2);
    assert_eq!(fetched, created);

    Ok(())
}

#[test]
fn delete_is_blocked_while_orders_hold_units() -> anyhow::Result<()> {
    let (_dir, service) = open_service("delete.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("GA", 1_000, "USD").set_total_quantity(10),
    )?;
    let completed = service.create_ticket(&event, TicketTypeInput::new("Free", 0, "USD"))?;

    let order = service.create_order(&event, &ticket.id, 2, &BuyerId::new("buyer-1"))?;
    assert!(matches!(
        service.delete_ticket(&ticket.id),
        Err(TicketError::TicketInUse { held: 2, .. })
    ));

    service.cancel_order(&order.id)?;
    service.delete_ticket(&ticket.id)?;
    assert!(matches!(
        service.get_ticket(&ticket.id),
        Err(TicketError::TicketNotFound(_))
    ));
    assert!(matches!(
        service.delete_ticket(&ticket.id),
        Err(TicketError::TicketNotFound(_))
    ));
    // the cancelled order keeps its snapshot
    assert_eq!(service.get_order(&order.id)?.total_price, 2_000);

    // completed orders block deletion for good
    service.create_order(&event, &completed.id, 1, &BuyerId::new("buyer-2"))?;
    assert!(matches!(
        service.delete_ticket(&completed.id),
        Err(TicketError::TicketInUse { held: 1, .. })
    ));

    let remaining = service.list_tickets(&event, TicketFilter::all())?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, completed.id);

    Ok(())
}

#[test]
fn unknown_ids_are_not_found() -> anyhow::Result<()> {
    let (_dir, service) = open_service("not_found.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(&event, TicketTypeInput::new("GA", 100, "USD"))?;

    let missing = TicketTypeId::from_raw("tkt_1missing");
    assert!(matches!(
        service.create_order(&event, &missing, 1, &BuyerId::new("b")),
        Err(TicketError::TicketNotFound(_))
    ));
    assert!(matches!(
        service.update_ticket(&missing, TicketPatch::new().set_name("x")),
        Err(TicketError::TicketNotFound(_))
    ));
    // a real ticket type asked for under the wrong event
    assert!(matches!(
        service.create_order(&EventId::new("evt-2"), &ticket.id, 1, &BuyerId::new("b")),
        Err(TicketError::TicketNotFound(_))
    ));

    let unknown = OrderId::from_raw("ord_1missing");
    for result in [
        service.complete_order(&unknown, None),
        service.cancel_order(&unknown),
        service.fail_order(&unknown, "timeout"),
        service.get_order(&unknown),
    ] {
        assert!(matches!(result, Err(TicketError::OrderNotFound(_))));
    }
    assert!(service.find_order_by_number("ORD-NOPE")?.is_none());

    Ok(())
}

#[test]
fn orders_are_found_by_buyer_and_number() -> anyhow::Result<()> {
    let (_dir, service) = open_service("lookup.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(&event, TicketTypeInput::new("GA", 100, "USD"))?;
    let alice = BuyerId::new("alice");
    let bob = BuyerId::new("bob");

    let a1 = service.create_order(&event, &ticket.id, 1, &alice)?;
    let b1 = service.create_order(&event, &ticket.id, 1, &bob)?;
    let a2 = service.create_order(&event, &ticket.id, 2, &alice)?;

    let alice_orders: Vec<_> = service
        .orders_for_buyer(&alice)?
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(alice_orders, [a1.id.clone(), a2.id.clone()]);
    assert_eq!(service.orders_for_buyer(&bob)?.len(), 1);

    let found = service
        .find_order_by_number(&b1.order_number)?
        .context("order number should resolve")?;
    assert_eq!(found.id, b1.id);
    assert_eq!(found.buyer_id, bob);
    assert!(a1.order_number.starts_with("ORD-"));

    Ok(())
}

#[test]
fn ids_with_embedded_nul_stay_separate() -> anyhow::Result<()> {
    let (_dir, service) = open_service("nul_ids.db")?;
    let event = EventId::new("evt");
    let nested_event = EventId::new("evt\0x");
    let ticket = service.create_ticket(&event, TicketTypeInput::new("GA", 100, "USD"))?;
    service.create_ticket(&nested_event, TicketTypeInput::new("Nested", 100, "USD"))?;

    let plain = BuyerId::new("a");
    let nested = BuyerId::new("a\0x");
    let first = service.create_order(&event, &ticket.id, 1, &plain)?;
    let second = service.create_order(&event, &ticket.id, 1, &nested)?;

    let plain_orders = service.orders_for_buyer(&plain)?;
    assert_eq!(plain_orders.len(), 1);
    assert_eq!(plain_orders[0].id, first.id);
    let nested_orders = service.orders_for_buyer(&nested)?;
    assert_eq!(nested_orders.len(), 1);
    assert_eq!(nested_orders[0].id, second.id);

    let listed = service.list_tickets(&event, TicketFilter::all())?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, ticket.id);

    Ok(())
}

#[test]
fn refund_marks_payment_only() -> anyhow::Result<()> {
    let (_dir, service) = open_service("refund.db")?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("GA", 2_500, "USD").set_total_quantity(4),
    )?;

    let order = service.create_order(&event, &ticket.id, 1, &BuyerId::new("buyer-1"))?;
    assert!(matches!(
        service.refund_order(&order.id),
        Err(TicketError::InvalidPaymentTransition { .. })
    ));

    service.complete_order(&order.id, Some("card".into()))?;
    let refunded = service.refund_order(&order.id)?;
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(refunded.status, OrderStatus::Completed);
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(3));

    Ok(())
}

/// Hands out a fixed number a set amount of times, then real ones.
struct CollidingNumbers {
    repeats: AtomicUsize,
}

impl OrderNumberSource for CollidingNumbers {
    fn next_number(&self, now: TimeStamp) -> String {
        let left = self.repeats.load(Ordering::SeqCst);
        if left > 0 {
            self.repeats.store(left - 1, Ordering::SeqCst);
            "ORD-FIXED".to_string()
        } else {
            TimestampOrderNumbers.next_number(now)
        }
    }
}

#[test]
fn order_number_collisions_are_retried() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("collisions.db"))?);
    let numbers = Arc::new(CollidingNumbers {
        repeats: AtomicUsize::new(2),
    });
    let service = TicketService::with_parts(db, Arc::new(SystemClock), numbers, 4)?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("GA", 100, "USD").set_total_quantity(10),
    )?;

    let first = service.create_order(&event, &ticket.id, 1, &BuyerId::new("a"))?;
    assert_eq!(first.order_number, "ORD-FIXED");

    // second order draws "ORD-FIXED" again, is refused by the store and retried
    let second = service.create_order(&event, &ticket.id, 1, &BuyerId::new("b"))?;
    assert_ne!(second.order_number, first.order_number);
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(8));

    Ok(())
}

#[test]
fn exhausted_order_numbers_roll_back_the_reservation() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("exhausted.db"))?);
    let numbers = Arc::new(CollidingNumbers {
        repeats: AtomicUsize::new(usize::MAX),
    });
    let service = TicketService::with_parts(db, Arc::new(SystemClock), numbers, 3)?;
    let event = EventId::new("evt-1");
    let ticket = service.create_ticket(
        &event,
        TicketTypeInput::new("GA", 100, "USD").set_total_quantity(10),
    )?;

    service.create_order(&event, &ticket.id, 1, &BuyerId::new("a"))?;
    let err = service
        .create_order(&event, &ticket.id, 4, &BuyerId::new("b"))
        .unwrap_err();
    assert!(matches!(err, TicketError::DuplicateOrderNumber(_)));
    assert!(!err.is_denial());

    // only the first order's unit is gone
    assert_eq!(service.get_ticket(&ticket.id)?.available_count, Some(9));
    assert!(service.orders_for_buyer(&BuyerId::new("b"))?.is_empty());

    Ok(())
}

#[test]
fn state_survives_reopening_the_database() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("reopen.db");
    let event = EventId::new("evt-1");

    let (ticket_id, order_id) = {
        let service = TicketService::new(Arc::new(open(&path)?))?;
        let ticket = service.create_ticket(
            &event,
            TicketTypeInput::new("GA", 700, "USD").set_total_quantity(3),
        )?;
        let order = service.create_order(&event, &ticket.id, 2, &BuyerId::new("a"))?;
        service.flush()?;
        (ticket.id, order.id)
    };

    let service = TicketService::new(Arc::new(open(&path)?))?;
    assert_eq!(service.get_ticket(&ticket_id)?.available_count, Some(1));
    assert_eq!(service.get_order(&order_id)?.status, OrderStatus::Pending);
    service.cancel_order(&order_id)?;
    assert_eq!(service.get_ticket(&ticket_id)?.available_count, Some(3));

    Ok(())
}
