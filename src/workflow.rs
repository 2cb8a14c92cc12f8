//! Purchase orchestration: policy check, reservation, order persistence and
//! the transitions out of `Pending`.
use super::catalog::TicketCatalog;
use super::clock::Clock;
use super::error::{StoreError, TicketError};
use super::ledger::InventoryLedger;
use super::order::{Order, StatusChange};
use super::policy::{self, Verdict};
use super::ticket::TicketType;
use super::store::{Store, abort, decode, encode, index_child, index_key, index_prefix, settle};
use super::types::{BuyerId, EventId, OrderId, TicketTypeId};
use super::utils::OrderNumberSource;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct OrderWorkflow {
    store: Store,
    catalog: TicketCatalog,
    ledger: InventoryLedger,
    clock: Arc<dyn Clock>,
    numbers: Arc<dyn OrderNumberSource>,
    number_attempts: u32,
}

impl OrderWorkflow {
    pub fn new(
        store: Store,
        catalog: TicketCatalog,
        clock: Arc<dyn Clock>,
        numbers: Arc<dyn OrderNumberSource>,
        number_attempts: u32,
    ) -> Self {
        Self {
            ledger: InventoryLedger::new(&store),
            store,
            catalog,
            clock,
            numbers,
            number_attempts: number_attempts.max(1),
        }
    }

    /// Attempts a purchase.
    ///
    /// Returns the stored order (already `Completed` when it costs nothing) or
    /// an error. When an error is returned after stock was reserved, the
    /// reservation has been given back before this function returns.
    #[tracing::instrument(skip(self, event_id, ticket_type_id, buyer_id), fields(event = %event_id, ticket_type = %ticket_type_id, buyer = %buyer_id))]
    pub fn create_order(
        &self,
        event_id: &EventId,
        ticket_type_id: &TicketTypeId,
        quantity: u64,
        buyer_id: &BuyerId,
    ) -> Result<Order, TicketError> {
        let ticket = self.catalog.get(ticket_type_id)?;
        if &ticket.event_id != event_id {
            return Err(TicketError::TicketNotFound(ticket_type_id.clone()));
        }

        let now = self.clock.now();
        if let Verdict::Denied(reason) = policy::evaluate(&ticket, now, quantity) {
            warn!(%reason, quantity, "purchase denied");
            return Err(TicketError::Denied(reason));
        }

        // The policy read of availability was only advisory; this is the real check.
        let reservation = self.ledger.reserve(ticket_type_id, quantity)?;

        let order = match self.persist_order(&ticket, buyer_id, quantity) {
            Ok(order) => order,
            Err(err) => {
                self.roll_back(ticket_type_id, quantity);
                return Err(err);
            }
        };
        info!(
            order = %order.id,
            order_number = %order.order_number,
            status = ?order.status,
            total = order.total_price,
            remaining = ?reservation.remaining,
            "order created"
        );
        Ok(order)
    }

    /// Whether a purchase of `quantity` could go ahead right now. Read-only.
    pub fn check_availability(
        &self,
        ticket_type_id: &TicketTypeId,
        quantity: u64,
    ) -> Result<Verdict, TicketError> {
        let ticket = self.catalog.get(ticket_type_id)?;
        Ok(policy::evaluate(&ticket, self.clock.now(), quantity))
    }

    /// Marks a pending order paid. Free orders always record the method `"free"`.
    pub fn complete_order(
        &self,
        order_id: &OrderId,
        payment_method: Option<String>,
    ) -> Result<Order, TicketError> {
        self.transition(order_id, StatusChange::Complete { payment_method })
    }

    pub fn cancel_order(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        self.transition(order_id, StatusChange::Cancel)
    }

    pub fn fail_order(&self, order_id: &OrderId, reason: &str) -> Result<Order, TicketError> {
        self.transition(
            order_id,
            StatusChange::Fail {
                reason: reason.to_string(),
            },
        )
    }

    pub fn refund_order(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        let now = self.clock.now();
        let result = self.store.orders.transaction(|orders| {
            let mut order = Self::load_in(orders, order_id)?;
            order.refund(now).map_err(abort)?;
            orders.insert(order_id.as_str().as_bytes(), encode(&order).map_err(abort)?)?;
            Ok(order)
        });
        let order = settle(result)?;
        info!(order = %order_id, "order refunded");
        Ok(order)
    }

    pub fn get_order(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        let raw = self
            .store
            .orders
            .get(order_id.as_str().as_bytes())?
            .ok_or_else(|| TicketError::OrderNotFound(order_id.clone()))?;
        Ok(decode(&raw)?)
    }

    pub fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, TicketError> {
        match self.store.order_numbers.get(order_number.as_bytes())? {
            Some(raw) => {
                let id = String::from_utf8(raw.to_vec()).map_err(|e| {
                    StoreError::Inconsistent(format!("order number index: {e}"))
                })?;
                self.get_order(&OrderId::from_raw(id)).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Orders placed by `buyer_id`, oldest first.
    pub fn orders_for_buyer(&self, buyer_id: &BuyerId) -> Result<Vec<Order>, TicketError> {
        let mut orders = Vec::new();
        for entry in self.store.buyer_orders.scan_prefix(index_prefix(buyer_id.as_str())) {
            let (key, _) = entry?;
            if let Some(id) = index_child(&key) {
                orders.push(self.get_order(&OrderId::from_raw(id))?);
            }
        }
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    /// Stores a new order under a fresh order number. A number that is already
    /// taken is detected by the `order_numbers` tree and retried.
    ///
    /// Paid orders are stored `Pending`. Free orders are completed before the
    /// write, so they are only ever stored `Completed`.
    fn persist_order(
        &self,
        ticket: &TicketType,
        buyer_id: &BuyerId,
        quantity: u64,
    ) -> Result<Order, TicketError> {
        let mut last_err = None;

        for _ in 0..self.number_attempts {
            let now = self.clock.now();
            let mut order = Order::pending(
                OrderId::generate()?,
                self.numbers.next_number(now),
                ticket,
                buyer_id.clone(),
                quantity,
                now,
            )?;
            if order.is_free() {
                order.apply(
                    &StatusChange::Complete {
                        payment_method: None,
                    },
                    now,
                )?;
            }
            let bytes = encode(&order)?;
            let buyer_key = index_key(buyer_id.as_str(), order.id.as_str());

            let result = (
                &self.store.orders,
                &self.store.order_numbers,
                &self.store.buyer_orders,
            )
                .transaction(|(orders, numbers, buyers)| {
                    let number = order.order_number.as_bytes();
                    if numbers.get(number)?.is_some() {
                        return Err(abort(TicketError::DuplicateOrderNumber(
                            order.order_number.clone(),
                        )));
                    }
                    numbers.insert(number, order.id.as_str().as_bytes())?;
                    orders.insert(order.id.as_str().as_bytes(), &bytes[..])?;
                    buyers.insert(&buyer_key[..], &b""[..])?;
                    Ok(())
                });

            match settle(result) {
                Ok(()) => return Ok(order),
                Err(TicketError::DuplicateOrderNumber(number)) => {
                    warn!(%number, "order number collision, retrying");
                    last_err = Some(TicketError::DuplicateOrderNumber(number));
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| TicketError::DuplicateOrderNumber(String::new())))
    }

    /// Moves an order out of `Pending` and, for cancel/fail, hands its units
    /// back, all in one transaction. Two racing calls for the same order see
    /// one success and one `InvalidTransition`, so units are released once.
    fn transition(&self, order_id: &OrderId, change: StatusChange) -> Result<Order, TicketError> {
        let now = self.clock.now();

        let result = (&self.store.orders, &self.store.stock).transaction(|(orders, stock)| {
            let mut order = Self::load_in(orders, order_id)?;
            order.apply(&change, now).map_err(abort)?;
            if order.status.releases_stock() {
                InventoryLedger::release_in(stock, &order.ticket_type_id, order.quantity)?;
            }
            orders.insert(order_id.as_str().as_bytes(), encode(&order).map_err(abort)?)?;
            Ok(order)
        });
        let order = settle(result)?;

        info!(
            order = %order.id,
            status = ?order.status,
            payment_status = ?order.payment_status,
            released = order.status.releases_stock(),
            "order transitioned"
        );
        Ok(order)
    }

    fn roll_back(&self, ticket_type_id: &TicketTypeId, quantity: u64) {
        match self.ledger.release(ticket_type_id, quantity) {
            Ok(_) => warn!(ticket_type = %ticket_type_id, quantity, "reservation rolled back"),
            Err(err) => error!(
                ticket_type = %ticket_type_id,
                quantity,
                error = %err,
                "failed to roll back reservation"
            ),
        }
    }

    fn load_in(
        tx: &TransactionalTree,
        id: &OrderId,
    ) -> ConflictableTransactionResult<Order, TicketError> {
        let raw = tx
            .get(id.as_str().as_bytes())?
            .ok_or_else(|| abort(TicketError::OrderNotFound(id.clone())))?;
        decode(&raw).map_err(abort)
    }
}
