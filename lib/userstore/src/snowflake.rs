//! Snowflake-style 64-bit uid generator: 42 bits monotonic-ms since epoch,
//! 10 bits worker id, 12 bits intra-ms sequence. A standalone reusable type
//! rather than a single registration-path detail, since both the gateway
//! and any future id-minting caller need the same guarantees.

use std::sync::Mutex;

use flux::error::{ChatError, ChatResult};
use flux::time::timestamp_ms;

const WORKER_BITS: u32 = 10;
const SEQ_BITS: u32 = 12;
const SEQ_MASK: u16 = (1 << SEQ_BITS) - 1;
const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;

/// Attempts to wait out a backwards clock jump before giving up.
const MAX_REGRESSION_RETRIES: u32 = 5;

struct State {
    last_ms: u64,
    seq: u16,
}

/// Generates strictly-increasing 64-bit ids. One instance per backend
/// process (or per gateway, for registration); `worker_id` should be unique
/// across concurrently running generators to avoid collisions.
pub struct SnowflakeGen {
    worker_id: u16,
    state: Mutex<State>,
}

impl SnowflakeGen {
    pub fn new(worker_id: u16) -> SnowflakeGen {
        assert!(worker_id <= MAX_WORKER_ID, "worker_id exceeds 10 bits");
        SnowflakeGen {
            worker_id,
            state: Mutex::new(State { last_ms: 0, seq: 0 }),
        }
    }

    /// Mints the next id. On a backwards clock jump, spins (briefly
    /// sleeping) waiting for the clock to catch back up; if it hasn't
    /// resolved after `MAX_REGRESSION_RETRIES` attempts, surfaces
    /// `ClockRegression` rather than spinning forever.
    pub fn next_id(&self) -> ChatResult<u64> {
        let mut state = self.state.lock().unwrap();
        let mut now = timestamp_ms();

        let mut retries = 0;
        while now < state.last_ms {
            if retries >= MAX_REGRESSION_RETRIES {
                return Err(ChatError::ClockRegression);
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
            now = timestamp_ms();
            retries += 1;
        }

        if now == state.last_ms {
            state.seq = (state.seq + 1) & SEQ_MASK;
            if state.seq == 0 {
                // Sequence exhausted within this millisecond; wait for the
                // next one so ids stay strictly increasing.
                while now <= state.last_ms {
                    now = timestamp_ms();
                }
            }
        } else {
            state.seq = 0;
        }

        state.last_ms = now;

        let id = (now << (WORKER_BITS + SEQ_BITS))
            | ((self.worker_id as u64) << SEQ_BITS)
            | (state.seq as u64);

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ids_are_strictly_increasing_single_threaded() {
        let gen = SnowflakeGen::new(1);
        let mut last = 0u64;
        for _ in 0..10_000 {
            let id = gen.next_id().unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let gen = Arc::new(SnowflakeGen::new(2));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let gen = gen.clone();
            handles.push(thread::spawn(move || {
                (0..2_000).map(|_| gen.next_id().unwrap()).collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate id generated");
            }
        }
    }

    #[test]
    fn worker_id_is_embedded_in_every_id() {
        let gen = SnowflakeGen::new(7);
        let id = gen.next_id().unwrap();
        let extracted_worker = (id >> SEQ_BITS) & (MAX_WORKER_ID as u64);
        assert_eq!(extracted_worker, 7);
    }
}
