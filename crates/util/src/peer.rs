use rand::Rng;

/// Peer ids below this value are reserved (tests and well-known replicas).
pub const MIN_PEER_ID: u64 = 0x10000;

/// Generates a random peer id in the range `[MIN_PEER_ID, u64::MAX)`.
pub fn random_peer_id() -> u64 {
    let mut rng = rand::thread_rng();
    rng.gen_range(MIN_PEER_ID..u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_peer_id_skips_reserved_range() {
        for _ in 0..64 {
            assert!(random_peer_id() >= MIN_PEER_ID);
        }
    }

    #[test]
    fn random_peer_ids_differ() {
        assert_ne!(random_peer_id(), random_peer_id());
    }
}
