pub(crate) mod filesystem;
pub(crate) mod postgres;
pub(crate) mod sqlite;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use scommon::Role;

use crate::error::LedgerError;

pub(crate) fn encode_system_time(value: SystemTime) -> Result<(i64, i64), LedgerError> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        LedgerError::invalid_request(format!("timestamp predates unix epoch: {error}"))
    })?;
    Ok((
        duration.as_secs() as i64,
        i64::from(duration.subsec_nanos()),
    ))
}

pub(crate) fn decode_system_time(seconds: i64, nanos: i64) -> Result<SystemTime, LedgerError> {
    if seconds < 0 {
        return Err(LedgerError::storage(format!(
            "timestamp seconds must be non-negative, got {seconds}"
        )));
    }
    if !(0..1_000_000_000).contains(&nanos) {
        return Err(LedgerError::storage(format!(
            "timestamp nanos must be in [0, 1_000_000_000), got {nanos}"
        )));
    }
    Ok(UNIX_EPOCH + Duration::new(seconds as u64, nanos as u32))
}

pub(crate) fn encode_sequence(sequence: u64) -> Result<i64, LedgerError> {
    i64::try_from(sequence).map_err(|_| {
        LedgerError::invalid_request(format!("sequence {sequence} exceeds storable range"))
    })
}

pub(crate) fn decode_sequence(value: i64) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::storage(format!("stored sequence is negative: {value}")))
}

pub(crate) fn decode_count(value: i64) -> Result<u32, LedgerError> {
    u32::try_from(value)
        .map_err(|_| LedgerError::storage(format!("stored token count out of range: {value}")))
}

pub(crate) fn decode_role(value: &str) -> Result<Role, LedgerError> {
    Role::parse(value).ok_or_else(|| LedgerError::storage(format!("unknown stored role '{value}'")))
}

/// Counter increments as (user, assistant, system).
pub(crate) fn role_increments(role: Role) -> (i64, i64, i64) {
    match role {
        Role::User => (1, 0, 0),
        Role::Assistant => (0, 1, 0),
        Role::System => (0, 0, 1),
    }
}
