use super::order::{OrderStatus, PaymentStatus};
use super::policy::DenyReason;
use super::types::{OrderId, TicketTypeId, TimeStamp};

/// Malformed catalog input or an order that cannot be priced.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Ticket name is required")]
    MissingName,
    #[error("Unit price must not be negative, got {0}")]
    NegativePrice(i64),
    #[error("'{0}' is not a three letter currency code")]
    InvalidCurrency(String),
    #[error("Minimum per order must be at least 1")]
    InvalidMinimum,
    #[error("Minimum per order ({min}) exceeds maximum per order ({max})")]
    MinimumAboveMaximum { min: u64, max: u64 },
    #[error("Sale start must not be after sale end")]
    InvertedSaleWindow,
    #[error("Sale date {0} is outside the supported range")]
    SaleDateOutOfRange(TimeStamp),
    #[error("Total quantity must be at least 1")]
    InvalidQuantity,
    #[error("Total quantity {requested} is below the {committed} units held by live orders")]
    QuantityBelowCommitted { requested: u64, committed: u64 },
    #[error("Order total overflows: {unit_price} x {quantity}")]
    PriceOverflow { unit_price: u64, quantity: u64 },
}

/// Failures of the storage layer. Never an expected outcome of a purchase.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error(transparent)]
    Decode(#[from] minicbor::decode::Error),
    #[error("Failed to generate identifier: {0}")]
    Identifier(String),
    #[error("Stock ledger is inconsistent: {0}")]
    Inconsistent(String),
}

/// Result error of every catalog, ledger and order operation.
///
/// `Denied` carries the expected "no" answers (sold out, outside the sale
/// window, ...). `Infrastructure` is the only variant that signals a fault.
#[derive(thiserror::Error, Debug)]
pub enum TicketError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Ticket type {0} not found")]
    TicketNotFound(TicketTypeId),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Purchase denied: {0}")]
    Denied(DenyReason),
    #[error("Order cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Payment cannot move from {from:?} to {to:?}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },
    #[error("Ticket type {id} still has {held} units held by live orders")]
    TicketInUse { id: TicketTypeId, held: u64 },
    #[error("Order number {0} is already taken")]
    DuplicateOrderNumber(String),
    #[error(transparent)]
    Infrastructure(#[from] StoreError),
}

impl TicketError {
    pub fn is_denial(&self) -> bool {
        matches!(self, TicketError::Denied(_))
    }
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, TicketError::Infrastructure(_))
    }
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            TicketError::Denied(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<sled::Error> for TicketError {
    fn from(value: sled::Error) -> Self {
        TicketError::Infrastructure(StoreError::Sled(value))
    }
}
