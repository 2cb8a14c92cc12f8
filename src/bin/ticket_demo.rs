//! Walks through a small sale against a throwaway database.
//!
//! Run with: `TICKETS_LOG=ticket_inventory=debug cargo run --bin ticket_demo`

use anyhow::Context;
use std::sync::Arc;
use std::thread;
use ticket_inventory::{
    catalog::TicketFilter,
    config::Config,
    service::TicketService,
    ticket::TicketTypeInput,
    types::{BuyerId, EventId},
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(db = %config.db_path.display(), "opening ticket store");
    let db = config.open_db().context("failed to open sled database")?;
    // start from an empty store on every run
    for name in db.tree_names() {
        if name != b"__sled__default" {
            db.drop_tree(name)?;
        }
    }
    let service = Arc::new(TicketService::with_parts(
        Arc::new(db),
        Arc::new(ticket_inventory::clock::SystemClock),
        Arc::new(ticket_inventory::utils::TimestampOrderNumbers),
        config.order_number_attempts,
    )?);

    let event = EventId::new("evt-demo");
    let vip = service.create_ticket(
        &event,
        TicketTypeInput::new("Front Row", 15_000, "USD")
            .set_kind("VIP")
            .set_total_quantity(3)
            .set_limits(1, Some(2))
            .set_sort_order(0),
    )?;
    let free = service.create_ticket(
        &event,
        TicketTypeInput::new("Livestream", 0, "USD").set_sort_order(1),
    )?;

    for ticket in service.list_tickets(&event, TicketFilter::storefront())? {
        info!(name = %ticket.name, price = ticket.unit_price, available = ?ticket.available_count, "on sale");
    }

    // eight buyers race for three seats
    let outcomes: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                let event = event.clone();
                let vip = vip.id.clone();
                s.spawn(move || service.create_order(&event, &vip, 1, &BuyerId::new(format!("buyer-{i}"))))
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut sold = 0;
    for outcome in outcomes {
        match outcome {
            Ok(Ok(order)) => {
                sold += 1;
                service.complete_order(&order.id, Some("card".to_string()))?;
            }
            Ok(Err(err)) => info!(error = %err, "purchase refused"),
            Err(_) => anyhow::bail!("buyer thread panicked"),
        }
    }
    info!(sold, left = ?service.stock_level(&vip.id)?.available(), "vip sale finished");

    let order = service.create_order(&event, &free.id, 1, &BuyerId::new("buyer-free"))?;
    info!(order = %order.order_number, status = ?order.status, method = ?order.payment_method, "free order");

    service.flush()?;
    Ok(())
}
