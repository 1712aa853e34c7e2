//! Tunable constants of the lookup core, collected so a caller can shrink
//! them (e.g. in tests) instead of depending on bare crate constants.

use crate::identifier::ID_SIZE_BITS;

/// Maximum concurrent outstanding queries per lookup session.
pub const MAX_PARALLEL_QUERIES: usize = 16;
/// Number of nearest tokened responders addressed during announce.
pub const ANNOUNCE_REDUNDANCY: usize = 3;
/// Size cap of the candidate queue.
pub const QUEUED_QNODES_CAP: usize = 8;
/// Size cap of the responded-nodes list.
pub const RESPONDED_QNODES_CAP: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupConfig {
    pub max_parallel_queries: usize,
    pub announce_redundancy: usize,
    pub queued_qnodes_cap: usize,
    pub responded_qnodes_cap: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_parallel_queries: MAX_PARALLEL_QUERIES,
            announce_redundancy: ANNOUNCE_REDUNDANCY,
            queued_qnodes_cap: QUEUED_QNODES_CAP,
            responded_qnodes_cap: RESPONDED_QNODES_CAP,
        }
    }
}

/// Log-distance mark meaning "anything goes" — used when a responder at
/// the relevant index does not yet exist.
pub const NO_MARK: u8 = ID_SIZE_BITS;
