//! Orders and their status state machine
use super::error::{TicketError, ValidationError};
use super::ticket::TicketType;
use super::types::{BuyerId, Currency, EventId, OrderId, TicketTypeId, TimeStamp};

pub const FREE_PAYMENT_METHOD: &str = "free";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum OrderStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Completed,
    #[n(2)]
    Cancelled,
    #[n(3)]
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum PaymentStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Paid,
    #[n(2)]
    Refunded,
}

/// A requested move out of `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Complete { payment_method: Option<String> },
    Cancel,
    Fail { reason: String },
}

/// A buyer's commitment to a quantity of one ticket type.
///
/// Price and currency are copied from the ticket type when the order is
/// created and never follow later edits to it.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Order {
    #[n(0)]
    pub id: OrderId,
    #[n(1)]
    pub order_number: String,
    #[n(2)]
    pub event_id: EventId,
    #[n(3)]
    pub ticket_type_id: TicketTypeId,
    #[n(4)]
    pub buyer_id: BuyerId,
    #[n(5)]
    pub quantity: u64,
    #[n(6)]
    pub unit_price: u64,
    #[n(7)]
    pub total_price: u64,
    #[n(8)]
    pub currency: Currency,
    #[n(9)]
    pub status: OrderStatus,
    #[n(10)]
    pub payment_status: PaymentStatus,
    #[n(11)]
    pub payment_method: Option<String>,
    #[n(12)]
    pub failure_reason: Option<String>,
    #[n(13)]
    pub created_at: TimeStamp,
    #[n(14)]
    pub updated_at: TimeStamp,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
    /// Orders in these states no longer own their units.
    pub fn releases_stock(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Failed)
    }
}

impl StatusChange {
    pub fn target(&self) -> OrderStatus {
        match self {
            StatusChange::Complete { .. } => OrderStatus::Completed,
            StatusChange::Cancel => OrderStatus::Cancelled,
            StatusChange::Fail { .. } => OrderStatus::Failed,
        }
    }
}

impl Order {
    /// A fresh `Pending` order priced from `ticket`. Fails only if the total overflows.
    pub fn pending(
        id: OrderId,
        order_number: String,
        ticket: &TicketType,
        buyer_id: BuyerId,
        quantity: u64,
        now: TimeStamp,
    ) -> Result<Self, TicketError> {
        let total_price = ticket.unit_price.checked_mul(quantity).ok_or(
            ValidationError::PriceOverflow {
                unit_price: ticket.unit_price,
                quantity,
            },
        )?;

        Ok(Self {
            id,
            order_number,
            event_id: ticket.event_id.clone(),
            ticket_type_id: ticket.id.clone(),
            buyer_id,
            quantity,
            unit_price: ticket.unit_price,
            total_price,
            currency: ticket.currency.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_free(&self) -> bool {
        self.total_price == 0
    }

    /// Moves the order out of `Pending`. Every other starting state is rejected,
    /// including a repeat of the same change.
    pub fn apply(&mut self, change: &StatusChange, now: TimeStamp) -> Result<(), TicketError> {
        if self.status != OrderStatus::Pending {
            return Err(TicketError::InvalidTransition {
                from: self.status,
                to: change.target(),
            });
        }

        match change {
            StatusChange::Complete { payment_method } => {
                self.payment_status = PaymentStatus::Paid;
                self.payment_method = if self.is_free() {
                    Some(FREE_PAYMENT_METHOD.to_string())
                } else {
                    payment_method.clone()
                };
            }
            StatusChange::Cancel => {}
            StatusChange::Fail { reason } => {
                self.failure_reason = Some(reason.clone());
            }
        }
        self.status = change.target();
        self.updated_at = now;
        Ok(())
    }

    /// Paid -> Refunded on a completed order. Stock is not returned.
    pub fn refund(&mut self, now: TimeStamp) -> Result<(), TicketError> {
        if self.status != OrderStatus::Completed || self.payment_status != PaymentStatus::Paid {
            return Err(TicketError::InvalidPaymentTransition {
                from: self.payment_status,
                to: PaymentStatus::Refunded,
            });
        }
        self.payment_status = PaymentStatus::Refunded;
        self.updated_at = now;
        Ok(())
    }
}
