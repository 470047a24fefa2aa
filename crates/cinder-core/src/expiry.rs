//! Active expiration via random sampling.
//!
//! No time wheel, no sorted expiry index: every cycle samples a
//! handful of TTL-carrying keys and evicts the expired ones, repeating
//! while the sample keeps coming back dirty. The same algorithm Redis
//! ships: constant memory, effective across TTL distributions.

use crate::keyspace::Keyspace;

/// Runs one active expiration cycle.
///
/// Samples up to `sample_size` keys among those carrying deadlines and
/// removes the expired ones; while at least a quarter of the sample
/// was expired, samples again. Returns the total number removed.
///
/// Callers invoke this from the shard's serving loop, so the sweep is
/// serialized with command execution by construction.
pub fn run_expiration_cycle(ks: &mut Keyspace, sample_size: usize) -> usize {
    if sample_size == 0 {
        return 0;
    }

    let mut total_removed = 0;
    loop {
        let removed = ks.expire_sample(sample_size);
        total_removed += removed;

        // under 25% expired means the TTL population is mostly clean
        if removed < sample_size.div_ceil(4) {
            break;
        }
    }
    total_removed
}
