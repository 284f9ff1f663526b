use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Timestamps are offset from 2025-01-01T00:00:00Z so the 42-bit field lasts
/// well past the service's lifetime.
const EPOCH_OFFSET_MS: u64 = 1_735_689_600_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Generator of 64-bit time-ordered message ids.
///
/// An id packs, high to low: 42 bits of milliseconds since the custom epoch,
/// a 10-bit worker id, and a 12-bit per-millisecond sequence. Ids from one
/// generator are strictly increasing; ids across workers are unique as long
/// as worker ids are.
pub struct SnowflakeGenerator {
    worker_id: u64,
    clock: Mutex<Clock>,
}

struct Clock {
    millis: u64,
    sequence: u64,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Self {
        assert!(
            (worker_id as u64) <= (1 << WORKER_BITS) - 1,
            "worker_id must fit in {WORKER_BITS} bits"
        );
        Self {
            worker_id: worker_id as u64,
            clock: Mutex::new(Clock {
                millis: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut clock = self.clock.lock().unwrap();
        let mut now = unix_millis();

        if now < clock.millis {
            panic!("clock moved backwards: {} -> {now}", clock.millis);
        }

        if now == clock.millis {
            clock.sequence = (clock.sequence + 1) & MAX_SEQUENCE;
            if clock.sequence == 0 {
                // 4096 ids issued within one millisecond; wait it out.
                while now == clock.millis {
                    now = unix_millis();
                }
            }
        } else {
            clock.sequence = 0;
        }
        clock.millis = now;

        let id = ((now - EPOCH_OFFSET_MS) << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | clock.sequence;
        id as i64
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before Unix epoch")
        .as_millis() as u64
}

/// The creation time (ms since the Unix epoch) packed into a snowflake id.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    ((id as u64) >> (WORKER_BITS + SEQUENCE_BITS)) + EPOCH_OFFSET_MS
}
