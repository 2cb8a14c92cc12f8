//! Authoritative stock per ticket type
//!
//! Every change to a [`StockLevel`] happens inside a sled transaction: the check
//! "enough left?" and the write of the new level commit together or not at all,
//! and sled serializes transactions touching the same key. Two buyers racing
//! for the last unit therefore see exactly one success.
use super::error::{StoreError, TicketError, ValidationError};
use super::policy::DenyReason;
use super::store::{Store, abort, decode, encode, settle};
use super::types::TicketTypeId;
use sled::Tree;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use tracing::{debug, warn};

/// Units held by live (Pending or Completed) orders against an optional cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StockLevel {
    #[n(0)]
    pub total: Option<u64>, // None = unlimited
    #[n(1)]
    pub held: u64,
}

/// Proof that `quantity` units were taken from a ticket type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u64,
    /// Units left after this reservation, `None` when unlimited
    pub remaining: Option<u64>,
}

impl StockLevel {
    pub fn new(total: Option<u64>) -> Self {
        Self { total, held: 0 }
    }

    /// `availableCount`; absent for unlimited stock.
    pub fn available(&self) -> Option<u64> {
        self.total.map(|total| total.saturating_sub(self.held))
    }

    /// The level after holding `quantity` more units, `None` if that would oversell.
    pub fn hold(self, quantity: u64) -> Option<Self> {
        let held = self.held.checked_add(quantity)?;
        match self.total {
            Some(total) if held > total => None,
            _ => Some(Self { held, ..self }),
        }
    }

    pub fn release(self, quantity: u64) -> Result<Self, StoreError> {
        let held = self.held.checked_sub(quantity).ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "releasing {quantity} units but only {} are held",
                self.held
            ))
        })?;
        Ok(Self { held, ..self })
    }

    /// Change the cap, refusing to go below what live orders already hold.
    pub fn resize(self, total: Option<u64>) -> Result<Self, ValidationError> {
        match total {
            Some(requested) if requested < self.held => Err(ValidationError::QuantityBelowCommitted {
                requested,
                committed: self.held,
            }),
            _ => Ok(Self { total, ..self }),
        }
    }
}

#[derive(Clone)]
pub struct InventoryLedger {
    stock: Tree,
}

impl InventoryLedger {
    pub fn new(store: &Store) -> Self {
        Self {
            stock: store.stock.clone(),
        }
    }

    /// Current level. Good for display only: never decide a reservation on it.
    pub fn level(&self, id: &TicketTypeId) -> Result<StockLevel, TicketError> {
        let raw = self
            .stock
            .get(id.as_str().as_bytes())?
            .ok_or_else(|| TicketError::TicketNotFound(id.clone()))?;
        Ok(decode(&raw)?)
    }

    pub fn reserve(&self, id: &TicketTypeId, quantity: u64) -> Result<Reservation, TicketError> {
        let result = settle(self.stock.transaction(|tx| Self::reserve_in(tx, id, quantity)));

        match result {
            Ok(level) => {
                debug!(ticket_type = %id, quantity, remaining = ?level.available(), "stock reserved");
                Ok(Reservation {
                    ticket_type_id: id.clone(),
                    quantity,
                    remaining: level.available(),
                })
            }
            Err(err) => {
                if err.deny_reason() == Some(DenyReason::InsufficientInventory) {
                    warn!(ticket_type = %id, quantity, "reservation lost: insufficient inventory");
                }
                Err(err)
            }
        }
    }

    /// Give `quantity` units back.
    ///
    /// Callers are responsible for releasing a given order's units only once;
    /// the order workflow does so by tying the release to the order's single
    /// transition out of `Pending`.
    pub fn release(&self, id: &TicketTypeId, quantity: u64) -> Result<StockLevel, TicketError> {
        let level = settle(self.stock.transaction(|tx| Self::release_in(tx, id, quantity)))?;
        debug!(ticket_type = %id, quantity, remaining = ?level.available(), "stock released");
        Ok(level)
    }

    pub(crate) fn load_in(
        tx: &TransactionalTree,
        id: &TicketTypeId,
    ) -> ConflictableTransactionResult<StockLevel, TicketError> {
        let raw = tx
            .get(id.as_str().as_bytes())?
            .ok_or_else(|| abort(TicketError::TicketNotFound(id.clone())))?;
        decode(&raw).map_err(abort)
    }

    pub(crate) fn store_in(
        tx: &TransactionalTree,
        id: &TicketTypeId,
        level: &StockLevel,
    ) -> ConflictableTransactionResult<(), TicketError> {
        let bytes = encode(level).map_err(abort)?;
        tx.insert(id.as_str().as_bytes(), bytes)?;
        Ok(())
    }

    pub(crate) fn reserve_in(
        tx: &TransactionalTree,
        id: &TicketTypeId,
        quantity: u64,
    ) -> ConflictableTransactionResult<StockLevel, TicketError> {
        let next = Self::load_in(tx, id)?
            .hold(quantity)
            .ok_or_else(|| abort(TicketError::Denied(DenyReason::InsufficientInventory)))?;
        Self::store_in(tx, id, &next)?;
        Ok(next)
    }

    pub(crate) fn release_in(
        tx: &TransactionalTree,
        id: &TicketTypeId,
        quantity: u64,
    ) -> ConflictableTransactionResult<StockLevel, TicketError> {
        let next = Self::load_in(tx, id)?.release(quantity).map_err(abort)?;
        Self::store_in(tx, id, &next)?;
        Ok(next)
    }
}
