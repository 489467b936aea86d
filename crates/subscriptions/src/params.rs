//! Request parameter parsing: subject, starting position and filter fields.

use crate::chain::Chain;
use crate::error::SubscriptionError;
use crate::filter::{EventFilter, Match, TransferFilter};
use alloy::primitives::{Address, B256};
use std::fmt::Display;
use std::str::FromStr;

/// Kind of data a connection subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Block,
    Event,
    Transfer,
}

impl FromStr for Subject {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Subject::Block),
            "event" => Ok(Subject::Event),
            "transfer" => Ok(Subject::Transfer),
            other => Err(SubscriptionError::NotFound(other.to_string())),
        }
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Subject::Block => "block",
            Subject::Event => "event",
            Subject::Transfer => "transfer",
        })
    }
}

/// Decoded query string. Lookups return the first value, or "" when absent.
#[derive(Debug, Clone, Default)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Query(pairs)
    }

    pub fn get(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }
}

/// Resolve `pos`: empty means the current best block, read now.
pub fn resolve_position(chain: &dyn Chain, raw: &str) -> Result<B256, SubscriptionError> {
    if raw.is_empty() {
        return Ok(chain.best_block().id);
    }
    raw.parse::<B256>()
        .map_err(|e| SubscriptionError::invalid("pos", e))
}

/// Empty value is a wildcard; anything else must parse as `T`.
pub fn parse_field<T>(query: &Query, param: &'static str) -> Result<Match<T>, SubscriptionError>
where
    T: FromStr,
    T::Err: Display,
{
    match query.get(param) {
        "" => Ok(Match::Any),
        raw => raw
            .parse::<T>()
            .map(Match::Exact)
            .map_err(|e| SubscriptionError::invalid(param, e)),
    }
}

impl EventFilter {
    /// From `addr` and `t0`..`t4`.
    pub fn from_query(query: &Query) -> Result<Self, SubscriptionError> {
        Ok(EventFilter {
            address: parse_field::<Address>(query, "addr")?,
            topics: [
                parse_field::<B256>(query, "t0")?,
                parse_field::<B256>(query, "t1")?,
                parse_field::<B256>(query, "t2")?,
                parse_field::<B256>(query, "t3")?,
                parse_field::<B256>(query, "t4")?,
            ],
        })
    }
}

impl TransferFilter {
    /// From `txOrigin`, `sender` and `recipient`.
    pub fn from_query(query: &Query) -> Result<Self, SubscriptionError> {
        Ok(TransferFilter {
            tx_origin: parse_field::<Address>(query, "txOrigin")?,
            sender: parse_field::<Address>(query, "sender")?,
            recipient: parse_field::<Address>(query, "recipient")?,
        })
    }
}
