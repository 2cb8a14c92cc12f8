//! Ticket type definitions per event
use super::clock::Clock;
use super::error::TicketError;
use super::ledger::{InventoryLedger, StockLevel};
use super::store::{Store, abort, decode, encode, index_child, index_key, index_prefix, settle};
use super::ticket::{TicketPatch, TicketType, TicketTypeInput};
use super::types::{EventId, TicketTypeId};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TicketFilter {
    pub active_only: bool,
    pub visible_only: bool,
}

impl TicketFilter {
    pub fn all() -> Self {
        Self::default()
    }
    /// What a buyer gets to see: active and visible types only.
    pub fn storefront() -> Self {
        Self {
            active_only: true,
            visible_only: true,
        }
    }
    fn admits(&self, ticket: &TicketType) -> bool {
        (!self.active_only || ticket.is_active) && (!self.visible_only || ticket.is_visible)
    }
}

#[derive(Clone)]
pub struct TicketCatalog {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl TicketCatalog {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn create(
        &self,
        event_id: &EventId,
        input: TicketTypeInput,
    ) -> Result<TicketType, TicketError> {
        let ticket = input.into_ticket_type(TicketTypeId::generate()?, event_id.clone(), self.clock.now())?;
        let level = StockLevel::new(ticket.total_quantity);
        let bytes = encode(&ticket)?;
        let index = index_key(event_id.as_str(), ticket.id.as_str());

        let result = (
            &self.store.ticket_types,
            &self.store.stock,
            &self.store.event_tickets,
        )
            .transaction(|(types, stock, events)| {
                types.insert(ticket.id.as_str().as_bytes(), &bytes[..])?;
                InventoryLedger::store_in(stock, &ticket.id, &level)?;
                events.insert(&index[..], &b""[..])?;
                Ok(())
            });
        settle(result)?;

        info!(
            ticket_type = %ticket.id,
            event = %event_id,
            kind = %ticket.kind,
            total = ?ticket.total_quantity,
            "ticket type created"
        );
        Ok(ticket)
    }

    /// Applies `patch`. Stock is resized in the same transaction, so a
    /// concurrent purchase either lands before the resize (and counts against
    /// the new total) or after it.
    pub fn update(&self, id: &TicketTypeId, patch: TicketPatch) -> Result<TicketType, TicketError> {
        let now = self.clock.now();

        let result = (&self.store.ticket_types, &self.store.stock).transaction(|(types, stock)| {
            let current = Self::load_in(types, id)?;
            let mut next = patch.apply_to(&current, now).map_err(abort)?;
            let level = InventoryLedger::load_in(stock, id)?
                .resize(next.total_quantity)
                .map_err(abort)?;

            InventoryLedger::store_in(stock, id, &level)?;
            types.insert(id.as_str().as_bytes(), encode(&next).map_err(abort)?)?;

            next.available_count = level.available();
            Ok(next)
        });
        let ticket = settle(result)?;

        info!(ticket_type = %id, total = ?ticket.total_quantity, available = ?ticket.available_count, "ticket type updated");
        Ok(ticket)
    }

    /// Removes a ticket type that no live order holds units of.
    ///
    /// Types with Pending or Completed orders are refused with
    /// [`TicketError::TicketInUse`]; cancel or fail those orders first.
    pub fn delete(&self, id: &TicketTypeId) -> Result<(), TicketError> {
        let result = (
            &self.store.ticket_types,
            &self.store.stock,
            &self.store.event_tickets,
        )
            .transaction(|(types, stock, events)| {
                let current = Self::load_in(types, id)?;
                let level = InventoryLedger::load_in(stock, id)?;
                if level.held > 0 {
                    return Err(abort(TicketError::TicketInUse {
                        id: id.clone(),
                        held: level.held,
                    }));
                }

                types.remove(id.as_str().as_bytes())?;
                stock.remove(id.as_str().as_bytes())?;
                events.remove(index_key(current.event_id.as_str(), id.as_str()))?;
                Ok(())
            });
        settle(result)?;

        info!(ticket_type = %id, "ticket type deleted");
        Ok(())
    }

    pub fn get(&self, id: &TicketTypeId) -> Result<TicketType, TicketError> {
        let result = (&self.store.ticket_types, &self.store.stock).transaction(|(types, stock)| {
            let mut ticket = Self::load_in(types, id)?;
            ticket.available_count = InventoryLedger::load_in(stock, id)?.available();
            Ok(ticket)
        });
        settle(result)
    }

    /// Ticket types of an event in display order: `sort_order`, then price.
    pub fn list(
        &self,
        event_id: &EventId,
        filter: TicketFilter,
    ) -> Result<Vec<TicketType>, TicketError> {
        let mut tickets = Vec::new();

        for entry in self.store.event_tickets.scan_prefix(index_prefix(event_id.as_str())) {
            let (key, _) = entry?;
            let Some(child) = index_child(&key) else {
                continue;
            };
            let id = TicketTypeId::from_raw(child);
            match self.get(&id) {
                Ok(ticket) if filter.admits(&ticket) => tickets.push(ticket),
                Ok(_) => {}
                // deleted between the index scan and the read
                Err(TicketError::TicketNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        tickets.sort_by(|a, b| a.display_cmp(b));
        Ok(tickets)
    }

    fn load_in(
        tx: &TransactionalTree,
        id: &TicketTypeId,
    ) -> ConflictableTransactionResult<TicketType, TicketError> {
        let raw = tx
            .get(id.as_str().as_bytes())?
            .ok_or_else(|| abort(TicketError::TicketNotFound(id.clone())))?;
        decode(&raw).map_err(abort)
    }
}
