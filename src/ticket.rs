//! Ticket type definitions, creation input and partial updates
use super::error::ValidationError;
use super::types::{Currency, EventId, TicketTypeId, TimeStamp};
use std::collections::BTreeMap;

pub const DEFAULT_KIND: &str = "General";

/// A purchasable category of admission for an event.
///
/// Prices are integers in the currency's minor unit. `available_count` is not
/// part of the stored record; it is filled from the stock ledger on read and is
/// `None` for unlimited types.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TicketType {
    #[n(0)]
    pub id: TicketTypeId,
    #[n(1)]
    pub event_id: EventId,
    #[n(2)]
    pub kind: String, // General, VIP, EarlyBird... kept verbatim
    #[n(3)]
    pub name: String,
    #[n(4)]
    pub description: Option<String>,
    #[n(5)]
    pub unit_price: u64,
    #[n(6)]
    pub currency: Currency,
    #[n(7)]
    pub total_quantity: Option<u64>, // None = unlimited
    #[n(8)]
    pub min_per_order: u64,
    #[n(9)]
    pub max_per_order: Option<u64>,
    #[n(10)]
    pub sale_start_at: Option<TimeStamp>,
    #[n(11)]
    pub sale_end_at: Option<TimeStamp>,
    #[n(12)]
    pub is_active: bool,
    #[n(13)]
    pub is_visible: bool,
    #[n(14)]
    pub sort_order: i32,
    #[n(15)]
    pub metadata: BTreeMap<String, String>,
    #[n(16)]
    pub created_at: TimeStamp,
    #[n(17)]
    pub updated_at: TimeStamp,
    #[cbor(skip)]
    pub available_count: Option<u64>,
}

/// Input for creating a ticket type. Built up with the `set_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketTypeInput {
    pub kind: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: i64,
    pub currency: String,
    pub total_quantity: Option<u64>,
    pub min_per_order: u64,
    pub max_per_order: Option<u64>,
    pub sale_start_at: Option<TimeStamp>,
    pub sale_end_at: Option<TimeStamp>,
    pub is_active: bool,
    pub is_visible: bool,
    pub sort_order: i32,
    pub metadata: BTreeMap<String, String>,
}

/// A partial update. Outer `None` leaves a field alone; for optional fields
/// `Some(None)` clears the value (e.g. makes the type unlimited).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketPatch {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub unit_price: Option<i64>,
    pub currency: Option<String>,
    pub total_quantity: Option<Option<u64>>,
    pub min_per_order: Option<u64>,
    pub max_per_order: Option<Option<u64>>,
    pub sale_start_at: Option<Option<TimeStamp>>,
    pub sale_end_at: Option<Option<TimeStamp>>,
    pub is_active: Option<bool>,
    pub is_visible: Option<bool>,
    pub sort_order: Option<i32>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl TicketTypeInput {
    /// Construct a new input: active, visible, unlimited, one per order minimum.
    pub fn new(name: &str, unit_price: i64, currency: &str) -> Self {
        Self {
            kind: DEFAULT_KIND.to_string(),
            name: name.to_string(),
            description: None,
            unit_price,
            currency: currency.to_string(),
            total_quantity: None,
            min_per_order: 1,
            max_per_order: None,
            sale_start_at: None,
            sale_end_at: None,
            is_active: true,
            is_visible: true,
            sort_order: 0,
            metadata: BTreeMap::new(),
        }
    }
    pub fn set_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_total_quantity(mut self, quantity: u64) -> Self {
        self.total_quantity = Some(quantity);
        self
    }
    pub fn set_limits(mut self, min_per_order: u64, max_per_order: Option<u64>) -> Self {
        self.min_per_order = min_per_order;
        self.max_per_order = max_per_order;
        self
    }
    pub fn set_sale_window(mut self, start: Option<TimeStamp>, end: Option<TimeStamp>) -> Self {
        self.sale_start_at = start;
        self.sale_end_at = end;
        self
    }
    pub fn set_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
    pub fn set_visible(mut self, visible: bool) -> Self {
        self.is_visible = visible;
        self
    }
    pub fn set_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }
    pub fn insert_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Validates the input and produces the ticket type it describes.
    pub fn into_ticket_type(
        self,
        id: TicketTypeId,
        event_id: EventId,
        now: TimeStamp,
    ) -> Result<TicketType, ValidationError> {
        let ticket = TicketType {
            id,
            event_id,
            kind: self.kind,
            name: self.name,
            description: self.description,
            unit_price: checked_price(self.unit_price)?,
            currency: Currency::parse(&self.currency)?,
            total_quantity: self.total_quantity,
            min_per_order: self.min_per_order,
            max_per_order: self.max_per_order,
            sale_start_at: self.sale_start_at,
            sale_end_at: self.sale_end_at,
            is_active: self.is_active,
            is_visible: self.is_visible,
            sort_order: self.sort_order,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
            available_count: self.total_quantity,
        };
        ticket.validate()?;
        Ok(ticket)
    }
}

impl TicketPatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn set_unit_price(mut self, unit_price: i64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
    pub fn set_total_quantity(mut self, quantity: Option<u64>) -> Self {
        self.total_quantity = Some(quantity);
        self
    }
    pub fn set_limits(mut self, min_per_order: u64, max_per_order: Option<u64>) -> Self {
        self.min_per_order = Some(min_per_order);
        self.max_per_order = Some(max_per_order);
        self
    }
    pub fn set_sale_window(mut self, start: Option<TimeStamp>, end: Option<TimeStamp>) -> Self {
        self.sale_start_at = Some(start);
        self.sale_end_at = Some(end);
        self
    }
    pub fn set_active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }
    pub fn set_visible(mut self, visible: bool) -> Self {
        self.is_visible = Some(visible);
        self
    }
    pub fn set_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    /// Applies the patch to a copy of `current` and validates the result.
    pub fn apply_to(
        &self,
        current: &TicketType,
        now: TimeStamp,
    ) -> Result<TicketType, ValidationError> {
        let mut next = current.clone();
        if let Some(kind) = &self.kind {
            next.kind = kind.clone();
        }
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(price) = self.unit_price {
            next.unit_price = checked_price(price)?;
        }
        if let Some(currency) = &self.currency {
            next.currency = Currency::parse(currency)?;
        }
        if let Some(total) = self.total_quantity {
            next.total_quantity = total;
        }
        if let Some(min) = self.min_per_order {
            next.min_per_order = min;
        }
        if let Some(max) = self.max_per_order {
            next.max_per_order = max;
        }
        if let Some(start) = self.sale_start_at {
            next.sale_start_at = start;
        }
        if let Some(end) = self.sale_end_at {
            next.sale_end_at = end;
        }
        if let Some(active) = self.is_active {
            next.is_active = active;
        }
        if let Some(visible) = self.is_visible {
            next.is_visible = visible;
        }
        if let Some(sort_order) = self.sort_order {
            next.sort_order = sort_order;
        }
        if let Some(metadata) = &self.metadata {
            next.metadata = metadata.clone();
        }
        next.updated_at = now;
        next.validate()?;
        Ok(next)
    }
}

impl TicketType {
    /// Catalog rules that can be checked without looking at the ledger.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.min_per_order < 1 {
            return Err(ValidationError::InvalidMinimum);
        }
        if let Some(max) = self.max_per_order {
            if self.min_per_order > max {
                return Err(ValidationError::MinimumAboveMaximum {
                    min: self.min_per_order,
                    max,
                });
            }
        }
        for at in [self.sale_start_at, self.sale_end_at].into_iter().flatten() {
            if !at.is_storable() {
                return Err(ValidationError::SaleDateOutOfRange(at));
            }
        }
        if let (Some(start), Some(end)) = (&self.sale_start_at, &self.sale_end_at) {
            if start > end {
                return Err(ValidationError::InvertedSaleWindow);
            }
        }
        if self.total_quantity == Some(0) {
            return Err(ValidationError::InvalidQuantity);
        }
        Ok(())
    }

    pub fn is_unlimited(&self) -> bool {
        self.total_quantity.is_none()
    }

    /// Display order: `sort_order`, then cheapest first, then oldest first.
    pub fn display_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_order
            .cmp(&other.sort_order)
            .then(self.unit_price.cmp(&other.unit_price))
            .then(self.created_at.cmp(&other.created_at))
            .then(self.id.cmp(&other.id))
    }
}

fn checked_price(price: i64) -> Result<u64, ValidationError> {
    u64::try_from(price).map_err(|_| ValidationError::NegativePrice(price))
}
