//! Ticket inventory and order allocation for event management.
//!
//! [`service::TicketService`] is the entry point. Underneath it the
//! [`catalog`] owns ticket type definitions, [`policy`] decides whether a
//! purchase may proceed, [`ledger`] holds the authoritative stock and
//! [`workflow`] drives orders through their lifecycle.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod order;
pub mod policy;
pub mod service;
pub mod store;
pub mod ticket;
pub mod types;
pub mod utils;
pub mod workflow;
