//! Sled trees backing the catalog, the stock ledger and orders
use super::error::{StoreError, TicketError};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, Tree};
use std::sync::Arc;

/// Handle to every tree the subsystem uses. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    instance: Arc<Db>,
    pub(crate) ticket_types: Tree,
    pub(crate) stock: Tree,
    pub(crate) event_tickets: Tree,
    pub(crate) orders: Tree,
    pub(crate) order_numbers: Tree,
    pub(crate) buyer_orders: Tree,
}

impl Store {
    pub fn open(instance: Arc<Db>) -> Result<Self, StoreError> {
        Ok(Self {
            ticket_types: instance.open_tree("ticket_types")?,
            stock: instance.open_tree("stock")?,
            event_tickets: instance.open_tree("event_tickets")?,
            orders: instance.open_tree("orders")?,
            order_numbers: instance.open_tree("order_numbers")?,
            buyer_orders: instance.open_tree("buyer_orders")?,
            instance,
        })
    }

    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.instance.flush()?)
    }
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))
}

pub(crate) fn decode<'b, T: minicbor::Decode<'b, ()>>(bytes: &'b [u8]) -> Result<T, StoreError> {
    Ok(minicbor::decode(bytes)?)
}

/// Secondary index key: `<owner length, u64 BE><owner><child>`.
///
/// The length prefix keeps owners apart even when one id is a prefix of
/// another or contains arbitrary bytes.
pub(crate) fn index_key(owner: &str, child: &str) -> Vec<u8> {
    let mut key = index_prefix(owner);
    key.extend_from_slice(child.as_bytes());
    key
}

pub(crate) fn index_prefix(owner: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + owner.len());
    key.extend_from_slice(&(owner.len() as u64).to_be_bytes());
    key.extend_from_slice(owner.as_bytes());
    key
}

/// Child half of an index key.
pub(crate) fn index_child(key: &[u8]) -> Option<String> {
    let len = u64::from_be_bytes(key.get(..8)?.try_into().ok()?);
    let start = usize::try_from(len).ok()?.checked_add(8)?;
    String::from_utf8(key.get(start..)?.to_vec()).ok()
}

/// Abort the surrounding transaction with `err`.
pub(crate) fn abort<E: Into<TicketError>>(err: E) -> ConflictableTransactionError<TicketError> {
    ConflictableTransactionError::Abort(err.into())
}

pub(crate) fn settle<T>(result: TransactionResult<T, TicketError>) -> Result<T, TicketError> {
    result.map_err(|e| match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => TicketError::Infrastructure(StoreError::Sled(err)),
    })
}
