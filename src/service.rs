//! Service layer API consumed by the rest of the application
use super::catalog::{TicketCatalog, TicketFilter};
use super::clock::{Clock, SystemClock};
use super::config::Config;
use super::error::TicketError;
use super::ledger::{InventoryLedger, StockLevel};
use super::order::Order;
use super::policy::Verdict;
use super::store::Store;
use super::ticket::{TicketPatch, TicketType, TicketTypeInput};
use super::types::{BuyerId, EventId, OrderId, TicketTypeId};
use super::utils::{OrderNumberSource, TimestampOrderNumbers};
use super::workflow::OrderWorkflow;
use std::sync::Arc;

/// One handle over the catalog, the stock ledger and the order workflow.
///
/// Built once at start-up around a sled instance and passed to whoever needs
/// it; there is no process-wide state.
pub struct TicketService {
    store: Store,
    catalog: TicketCatalog,
    ledger: InventoryLedger,
    workflow: OrderWorkflow,
}

impl TicketService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, TicketError> {
        Self::with_parts(
            instance,
            Arc::new(SystemClock),
            Arc::new(TimestampOrderNumbers),
            Config::default().order_number_attempts,
        )
    }

    pub fn with_clock(instance: Arc<sled::Db>, clock: Arc<dyn Clock>) -> Result<Self, TicketError> {
        Self::with_parts(
            instance,
            clock,
            Arc::new(TimestampOrderNumbers),
            Config::default().order_number_attempts,
        )
    }

    pub fn from_config(config: &Config) -> Result<Self, TicketError> {
        let instance = Arc::new(config.open_db()?);
        Self::with_parts(
            instance,
            Arc::new(SystemClock),
            Arc::new(TimestampOrderNumbers),
            config.order_number_attempts,
        )
    }

    pub fn with_parts(
        instance: Arc<sled::Db>,
        clock: Arc<dyn Clock>,
        numbers: Arc<dyn OrderNumberSource>,
        number_attempts: u32,
    ) -> Result<Self, TicketError> {
        let store = Store::open(instance)?;
        let catalog = TicketCatalog::new(store.clone(), clock.clone());
        let ledger = InventoryLedger::new(&store);
        let workflow = OrderWorkflow::new(
            store.clone(),
            catalog.clone(),
            clock,
            numbers,
            number_attempts,
        );
        Ok(Self {
            store,
            catalog,
            ledger,
            workflow,
        })
    }

    pub fn list_tickets(
        &self,
        event_id: &EventId,
        filter: TicketFilter,
    ) -> Result<Vec<TicketType>, TicketError> {
        self.catalog.list(event_id, filter)
    }

    pub fn get_ticket(&self, id: &TicketTypeId) -> Result<TicketType, TicketError> {
        self.catalog.get(id)
    }

    pub fn create_ticket(
        &self,
        event_id: &EventId,
        input: TicketTypeInput,
    ) -> Result<TicketType, TicketError> {
        self.catalog.create(event_id, input)
    }

    pub fn update_ticket(
        &self,
        id: &TicketTypeId,
        patch: TicketPatch,
    ) -> Result<TicketType, TicketError> {
        self.catalog.update(id, patch)
    }

    pub fn delete_ticket(&self, id: &TicketTypeId) -> Result<(), TicketError> {
        self.catalog.delete(id)
    }

    /// Stock for display ("3 left"). Not authoritative.
    pub fn stock_level(&self, id: &TicketTypeId) -> Result<StockLevel, TicketError> {
        self.ledger.level(id)
    }

    pub fn check_availability(
        &self,
        id: &TicketTypeId,
        quantity: u64,
    ) -> Result<Verdict, TicketError> {
        self.workflow.check_availability(id, quantity)
    }

    pub fn create_order(
        &self,
        event_id: &EventId,
        ticket_type_id: &TicketTypeId,
        quantity: u64,
        buyer_id: &BuyerId,
    ) -> Result<Order, TicketError> {
        self.workflow
            .create_order(event_id, ticket_type_id, quantity, buyer_id)
    }

    pub fn complete_order(
        &self,
        order_id: &OrderId,
        payment_method: Option<String>,
    ) -> Result<Order, TicketError> {
        self.workflow.complete_order(order_id, payment_method)
    }

    pub fn cancel_order(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        self.workflow.cancel_order(order_id)
    }

    pub fn fail_order(&self, order_id: &OrderId, reason: &str) -> Result<Order, TicketError> {
        self.workflow.fail_order(order_id, reason)
    }

    pub fn refund_order(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        self.workflow.refund_order(order_id)
    }

    pub fn get_order(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        self.workflow.get_order(order_id)
    }

    pub fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>, TicketError> {
        self.workflow.find_by_number(order_number)
    }

    pub fn orders_for_buyer(&self, buyer_id: &BuyerId) -> Result<Vec<Order>, TicketError> {
        self.workflow.orders_for_buyer(buyer_id)
    }

    pub fn flush(&self) -> Result<usize, TicketError> {
        Ok(self.store.flush()?)
    }
}
