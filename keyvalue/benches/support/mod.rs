// Each bench target uses a different subset of these helpers.
#![allow(dead_code)]

use bytes::Bytes;
use criterion::{Criterion, black_box};
use rand::Rng;
use redis_keyvalue::{Config, KeyValueDb, KeyValueRead};

pub const DEFAULT_SAMPLE_SIZE: usize = 10;

const LOAD_BATCH_SIZE: usize = 10_000;

pub fn default_criterion() -> Criterion {
    Criterion::default().sample_size(DEFAULT_SAMPLE_SIZE)
}

/// Big-endian encoding, so key order matches numeric order.
pub fn int_key(i: u64) -> Bytes {
    Bytes::copy_from_slice(&i.to_be_bytes())
}

/// Opens an in-memory store.
pub async fn open_store() -> KeyValueDb {
    KeyValueDb::open(Config::default())
        .await
        .expect("failed to open store")
}

/// Opens an in-memory store holding keys `0..size` with random 10-byte values.
pub async fn populated_store(size: u64) -> KeyValueDb {
    let kv = open_store().await;
    let keys: Vec<u64> = (0..size).collect();
    for chunk in keys.chunks(LOAD_BATCH_SIZE) {
        let mut batch = kv.new_batch();
        for &i in chunk {
            let mut value = [0u8; 10];
            rand::thread_rng().fill(&mut value[..]);
            batch
                .set(int_key(i), Bytes::copy_from_slice(&value))
                .expect("failed to queue write");
        }
        batch.write().await.expect("failed to load batch");
    }
    kv
}

/// Iterates keys `[start, end)` and returns how many pairs were read.
pub async fn scan(kv: &KeyValueDb, start: u64, end: u64) -> u64 {
    let mut iter = kv
        .iterator(Some(int_key(start)), Some(int_key(end)))
        .await
        .expect("failed to start iterator");
    let mut count = 0;
    while iter.valid() {
        black_box(iter.value());
        count += 1;
        iter.next().await;
    }
    assert!(iter.error().is_none(), "scan failed: {:?}", iter.error());
    iter.close().await.expect("failed to close iterator");
    count
}
