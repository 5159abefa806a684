//! Tag-indexed acknowledgement ledger.
//!
//! Deliveries correlate by delivery tag, not FIFO by kind: acknowledging tag
//! N with the multiple flag settles every unacknowledged delivery with tag
//! <= N on the channel, and none above.

use std::collections::BTreeMap;

use crate::method::DeliveryTag;

pub(crate) struct UnackedDelivery {
    #[allow(dead_code /* diagnostic field, read by operators via logs */)]
    pub consumer_tag: String,
}

pub(crate) struct DeliveryLedger {
    unacked: BTreeMap<DeliveryTag, UnackedDelivery>,
    // tags grow strictly per channel; a repeat is a protocol anomaly
    highest: DeliveryTag,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self {
            unacked: BTreeMap::new(),
            highest: 0,
        }
    }

    /// false: the tag is not strictly increasing, caller must treat the
    /// channel as corrupted.
    pub fn record(&mut self, tag: DeliveryTag, delivery: UnackedDelivery) -> bool {
        if tag <= self.highest {
            return false;
        }
        self.highest = tag;
        self.unacked.insert(tag, delivery);
        true
    }

    /// Settle `tag`, or with `multiple` every unacknowledged tag up to and
    /// including it. Returns the settled tags, ascending; empty means the
    /// acknowledgement matched nothing.
    pub fn settle(&mut self, tag: DeliveryTag, multiple: bool) -> Vec<DeliveryTag> {
        if multiple {
            let keep = match tag.checked_add(1) {
                Some(next) => self.unacked.split_off(&next),
                None => BTreeMap::new(),
            };
            let settled = std::mem::replace(&mut self.unacked, keep);
            settled.into_keys().collect()
        } else {
            match self.unacked.remove(&tag) {
                Some(_) => vec![tag],
                None => vec![],
            }
        }
    }

    /// Outstanding tags, ascending; diagnostics only.
    pub fn tags(&self) -> Vec<DeliveryTag> {
        self.unacked.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.unacked.clear();
    }
}

/////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::{DeliveryLedger, UnackedDelivery};

    fn delivery() -> UnackedDelivery {
        UnackedDelivery {
            consumer_tag: "ctag".to_string(),
        }
    }

    fn ledger_with(tags: &[u64]) -> DeliveryLedger {
        let mut ledger = DeliveryLedger::new();
        for tag in tags {
            assert_eq!(true, ledger.record(*tag, delivery()));
        }
        ledger
    }

    #[test]
    fn test_multiple_settles_up_to_and_including() {
        let mut ledger = ledger_with(&[1, 2, 3, 4, 5]);

        assert_eq!(vec![1, 2, 3], ledger.settle(3, true));
        assert_eq!(vec![4, 5], ledger.tags());
    }

    #[test]
    fn test_multiple_skips_already_settled() {
        let mut ledger = ledger_with(&[1, 2, 3, 4]);
        assert_eq!(vec![2], ledger.settle(2, false));

        // 2 already gone, nothing above 3 settles
        assert_eq!(vec![1, 3], ledger.settle(3, true));
        assert_eq!(vec![4], ledger.tags());
    }

    #[test]
    fn test_single_settles_exactly_one() {
        let mut ledger = ledger_with(&[7, 8]);

        assert_eq!(vec![7], ledger.settle(7, false));
        assert_eq!(true, ledger.settle(7, false).is_empty());
        assert_eq!(vec![8], ledger.tags());
    }

    #[test]
    fn test_record_rejects_non_increasing_tags() {
        let mut ledger = ledger_with(&[5]);

        assert_eq!(false, ledger.record(5, delivery()));
        assert_eq!(false, ledger.record(4, delivery()));
        assert_eq!(true, ledger.record(6, delivery()));
    }
}
