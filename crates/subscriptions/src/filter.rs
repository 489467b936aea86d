//! Subscription filters.
//!
//! Every field is either a wildcard or an exact value; a wildcard matches every record,
//! an exact value matches by byte equality.

use crate::block::{Event, Transfer};
use alloy::primitives::{Address, B256};

/// One filter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match<T> {
    /// No constraint.
    Any,
    /// Field must equal the value.
    Exact(T),
}

impl<T> Default for Match<T> {
    fn default() -> Self {
        Match::Any
    }
}

impl<T: PartialEq> Match<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Match::Any => true,
            Match::Exact(expected) => expected == value,
        }
    }

    /// Like [`Match::matches`], for fields the record may lack. An absent value only
    /// satisfies a wildcard.
    pub fn matches_opt(&self, value: Option<&T>) -> bool {
        match (self, value) {
            (Match::Any, _) => true,
            (Match::Exact(expected), Some(value)) => expected == value,
            (Match::Exact(_), None) => false,
        }
    }
}

/// Number of topic slots an event filter constrains.
pub const TOPIC_SLOTS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub address: Match<Address>,
    pub topics: [Match<B256>; TOPIC_SLOTS],
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.address.matches(&event.address)
            && self
                .topics
                .iter()
                .enumerate()
                .all(|(slot, topic)| topic.matches_opt(event.topics.get(slot)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferFilter {
    pub tx_origin: Match<Address>,
    pub sender: Match<Address>,
    pub recipient: Match<Address>,
}

impl TransferFilter {
    /// `tx_origin` is the origin of the transaction that performed the transfer.
    pub fn matches(&self, tx_origin: &Address, transfer: &Transfer) -> bool {
        self.tx_origin.matches(tx_origin)
            && self.sender.matches(&transfer.sender)
            && self.recipient.matches(&transfer.recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};

    fn event(address: Address, topics: &[B256]) -> Event {
        Event {
            address,
            topics: topics.to_vec(),
            data: Bytes::new(),
        }
    }

    #[test]
    fn empty_event_filter_matches_everything() {
        let filter = EventFilter::default();
        assert!(filter.matches(&event(Address::ZERO, &[])));
        assert!(filter.matches(&event(
            Address::repeat_byte(9),
            &[B256::repeat_byte(1), B256::repeat_byte(2)]
        )));
    }

    #[test]
    fn address_and_first_topic() {
        let addr = Address::repeat_byte(0xab);
        let t0 = B256::repeat_byte(0xde);
        let filter = EventFilter {
            address: Match::Exact(addr),
            topics: [Match::Exact(t0), Match::Any, Match::Any, Match::Any, Match::Any],
        };
        assert!(filter.matches(&event(addr, &[t0, B256::repeat_byte(0x11)])));
        assert!(!filter.matches(&event(addr, &[B256::repeat_byte(0x22)])));
        assert!(!filter.matches(&event(Address::repeat_byte(1), &[t0])));
    }

    #[test]
    fn topic_slot_missing_from_event() {
        let mut filter = EventFilter::default();
        filter.topics[2] = Match::Exact(B256::repeat_byte(3));
        assert!(!filter.matches(&event(Address::ZERO, &[B256::repeat_byte(1)])));
        assert!(filter.matches(&event(
            Address::ZERO,
            &[B256::ZERO, B256::ZERO, B256::repeat_byte(3)]
        )));
    }

    #[test]
    fn zero_value_is_not_wildcard() {
        let filter = EventFilter {
            address: Match::Exact(Address::ZERO),
            ..Default::default()
        };
        assert!(filter.matches(&event(Address::ZERO, &[])));
        assert!(!filter.matches(&event(Address::repeat_byte(1), &[])));
    }

    #[test]
    fn transfer_fields_independent() {
        let origin = Address::repeat_byte(1);
        let transfer = Transfer {
            sender: Address::repeat_byte(2),
            recipient: Address::repeat_byte(3),
            amount: U256::from(5),
        };
        assert!(TransferFilter::default().matches(&origin, &transfer));

        let by_sender = TransferFilter {
            sender: Match::Exact(Address::repeat_byte(2)),
            ..Default::default()
        };
        assert!(by_sender.matches(&origin, &transfer));

        let by_recipient = TransferFilter {
            recipient: Match::Exact(Address::repeat_byte(2)),
            ..Default::default()
        };
        assert!(!by_recipient.matches(&origin, &transfer));

        let by_origin = TransferFilter {
            tx_origin: Match::Exact(Address::repeat_byte(4)),
            ..Default::default()
        };
        assert!(!by_origin.matches(&origin, &transfer));
    }
}
