//! Sequences.
//!
//! A sequence vends monotonically advancing integers. The persistent
//! high-watermark is leased in blocks: `next` bumps the stored watermark
//! once per lease through the transaction's session, and `release`
//! writes back the exact last vended value so the on-disk watermark is
//! at least the last value handed out. The in-memory lease is shared by
//! every catalog snapshot holding the sequence.

use std::sync::Arc;

use parking_lot::Mutex;

use oolong_common::namespace::SEQUENCE_STORE_NAMESPACE;
use oolong_common::types::Value;
use oolong_common::{Error, Result};

use crate::schema::SequenceInfo;
use crate::transaction::Transaction;

/// Builds the watermark key of sequence `name`.
pub(crate) fn watermark_key(name: &str) -> Vec<u8> {
    let mut key = oolong_encoding::namespace_prefix(SEQUENCE_STORE_NAMESPACE);
    oolong_encoding::encode_value(&mut key, &Value::Text(name.to_string()));
    key
}

#[derive(Debug, Default)]
struct SequenceState {
    /// Last vended value.
    current: Option<i64>,
    /// Last value covered by the persistent watermark lease.
    lease_end: Option<i64>,
}

/// A named monotonic counter with a leased persistent watermark.
#[derive(Debug, Clone)]
pub struct Sequence {
    info: Arc<SequenceInfo>,
    state: Arc<Mutex<SequenceState>>,
}

impl Sequence {
    pub(crate) fn new(info: SequenceInfo) -> Self {
        Self {
            info: Arc::new(info),
            state: Arc::new(Mutex::new(SequenceState::default())),
        }
    }

    /// The sequence's persistent description.
    #[must_use]
    pub fn info(&self) -> &SequenceInfo {
        &self.info
    }

    /// Vends the next value, extending the watermark lease through `tx`
    /// when the current lease is exhausted.
    pub fn next(&self, tx: &Transaction) -> Result<i64> {
        let mut state = self.state.lock();
        let step = self.info.increment_by;
        let next = match state.current {
            Some(current) => current + step,
            None => match self.read_watermark(tx)? {
                Some(watermark) => watermark + step,
                None => self.info.start,
            },
        };

        let lease_exhausted = match state.lease_end {
            Some(end) => {
                if step >= 0 {
                    next > end
                } else {
                    next < end
                }
            }
            None => true,
        };
        if lease_exhausted {
            let lease_end = next + step * (self.info.lease - 1).max(0);
            tx.session_put(
                watermark_key(&self.info.name),
                oolong_encoding::encoded_value(&Value::Int(lease_end)),
            )?;
            state.lease_end = Some(lease_end);
        }

        state.current = Some(next);
        Ok(next)
    }

    /// Writes the exact last vended value back as the watermark and drops
    /// the lease. Called for every sequence when the database closes.
    pub fn release(&self, tx: &Transaction) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(current) = state.current {
            tx.session_put(
                watermark_key(&self.info.name),
                oolong_encoding::encoded_value(&Value::Int(current)),
            )?;
        }
        state.lease_end = None;
        Ok(())
    }

    fn read_watermark(&self, tx: &Transaction) -> Result<Option<i64>> {
        let Some(raw) = tx.session_get(&watermark_key(&self.info.name))? else {
            return Ok(None);
        };
        match oolong_encoding::decode_value(&raw)? {
            (Value::Int(watermark), _) => Ok(Some(watermark)),
            _ => Err(Error::corruption(format!(
                "sequence '{}' watermark is not an integer",
                self.info.name
            ))),
        }
    }
}
