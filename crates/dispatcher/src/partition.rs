//! Partition computation
//!
//! A product's output subject space is split into 256 partitions. The
//! partition of a message is the jump consistent hash of its primary-key
//! bytes, seeded through CRC-64 so the same key always lands on the same
//! partition. The empty key hashes like any other value: all keyless
//! messages share one partition.

use crc::{CRC_64_XZ, Crc};

/// Number of partitions per product
pub const PARTITION_COUNT: i32 = 256;

/// Per-processor partition hasher
///
/// The CRC instance carries only lookup tables; keeping one per processor
/// amortizes their setup across messages.
pub struct Partitioner {
    crc: Crc<u64>,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Partitioner {
    /// Create a partitioner
    pub fn new() -> Self {
        Self {
            // CRC-64/XZ is the ECMA polynomial in reflected form, matching
            // the seed existing deployments partition with
            crc: Crc::<u64>::new(&CRC_64_XZ),
        }
    }

    /// Map primary-key bytes onto a partition in `[0, PARTITION_COUNT)`
    #[inline]
    pub fn partition(&self, key: &[u8]) -> i32 {
        jump_hash(self.crc.checksum(key), PARTITION_COUNT)
    }
}

/// Jump consistent hash (Lamping & Veach)
///
/// Deterministically maps a 64-bit key onto one of `buckets` slots with
/// minimal movement when the bucket count changes.
fn jump_hash(key: u64, buckets: i32) -> i32 {
    let mut k = key;
    let mut b: i64 = -1;
    let mut j: i64 = 0;

    while j < buckets as i64 {
        b = j;
        k = k.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        j = ((b.wrapping_add(1) as f64) * ((1u64 << 31) as f64 / ((k >> 33) as f64 + 1.0))) as i64;
    }

    b as i32
}

#[cfg(test)]
#[path = "partition_test.rs"]
mod partition_test;
