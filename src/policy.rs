//! Purchase eligibility rules
//!
//! [`evaluate`] is the only place that decides whether a purchase may go ahead.
//! It is pure: the same ticket, time and quantity always give the same verdict,
//! so it serves both the order workflow and read-only "can I buy this" queries.
use super::ticket::TicketType;
use super::types::TimeStamp;
use std::fmt;

/// Why a purchase was refused. Variants are listed in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    TicketInactive,
    SalesNotStarted,
    SalesEnded,
    InsufficientInventory,
    BelowMinimum,
    AboveMaximum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied(DenyReason),
}

pub fn evaluate(ticket: &TicketType, now: TimeStamp, quantity: u64) -> Verdict {
    match first_failure(ticket, now, quantity) {
        Some(reason) => Verdict::Denied(reason),
        None => Verdict::Allowed,
    }
}

fn first_failure(ticket: &TicketType, now: TimeStamp, quantity: u64) -> Option<DenyReason> {
    if !ticket.is_active {
        return Some(DenyReason::TicketInactive);
    }
    if ticket.sale_start_at.is_some_and(|start| now < start) {
        return Some(DenyReason::SalesNotStarted);
    }
    if ticket.sale_end_at.is_some_and(|end| now > end) {
        return Some(DenyReason::SalesEnded);
    }
    if ticket.total_quantity.is_some() && ticket.available_count.unwrap_or(0) < quantity {
        return Some(DenyReason::InsufficientInventory);
    }
    if quantity < ticket.min_per_order {
        return Some(DenyReason::BelowMinimum);
    }
    if ticket.max_per_order.is_some_and(|max| quantity > max) {
        return Some(DenyReason::AboveMaximum);
    }
    None
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Verdict::Allowed => None,
            Verdict::Denied(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DenyReason::TicketInactive => "ticket is not on sale",
            DenyReason::SalesNotStarted => "sales have not started yet",
            DenyReason::SalesEnded => "sales have ended",
            DenyReason::InsufficientInventory => "not enough tickets left",
            DenyReason::BelowMinimum => "quantity is below the minimum per order",
            DenyReason::AboveMaximum => "quantity is above the maximum per order",
        };
        f.write_str(msg)
    }
}
