//! Utility functions for identifiers and order numbers

use super::error::StoreError;
use super::types::TimeStamp;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, StoreError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| StoreError::Identifier(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| StoreError::Identifier(e.to_string()))?;
    Ok(encode)
}

/// Produces human-referenceable order numbers.
///
/// Numbers only need to be *likely* unique: the store rejects a number that is
/// already taken and the workflow asks for another one.
pub trait OrderNumberSource: Send + Sync {
    fn next_number(&self, now: TimeStamp) -> String;
}

/// `ORD-<yyyymmddHHMMSS>-<8 hex>`, the suffix taken from the random tail of a uuid7.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampOrderNumbers;

impl OrderNumberSource for TimestampOrderNumbers {
    fn next_number(&self, now: TimeStamp) -> String {
        let uuid = uuid7();
        let suffix = hex::encode_upper(&uuid.as_bytes()[12..]);
        format!(
            "ORD-{}-{}",
            now.to_datetime_utc().format("%Y%m%d%H%M%S"),
            suffix
        )
    }
}
