//! Identifiers, timestamps and currency codes shared by the catalog and orders
use super::error::{StoreError, ValidationError};
use super::utils;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;

/// Identifier of a ticket type, bech32 encoded with the `tkt_` prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(array)]
pub struct TicketTypeId(#[n(0)] String);

/// Identifier of an order, bech32 encoded with the `ord_` prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(array)]
pub struct OrderId(#[n(0)] String);

// Event and buyer ids are handed to us by collaborators and kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(array)]
pub struct EventId(#[n(0)] String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(array)]
pub struct BuyerId(#[n(0)] String);

/// ISO-like currency code, three upper-case ASCII letters (e.g. `USD`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(array)]
pub struct Currency(#[n(0)] String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TicketTypeId {
    /// Wrap an id previously handed out by [`TicketTypeId::generate`].
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn generate() -> Result<Self, StoreError> {
        Ok(Self(utils::new_uuid_to_bech32("tkt_")?))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl OrderId {
    /// Wrap an id previously handed out by [`OrderId::generate`].
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn generate() -> Result<Self, StoreError> {
        Ok(Self(utils::new_uuid_to_bech32("ord_")?))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl BuyerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Currency {
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(ValidationError::InvalidCurrency(code.to_string()))
        }
    }
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// Builds a timestamp from calendar fields, `None` when they do not name a real instant.
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn plus(&self, offset: Duration) -> Self {
        Self(self.0 + offset)
    }
    /// Whether the instant fits the i64 nanosecond encoding (years 1677 to 2262).
    pub fn is_storable(&self) -> bool {
        self.0.timestamp_nanos_opt().is_some()
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_as_str!(TicketTypeId, OrderId, EventId, BuyerId, Currency);

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
