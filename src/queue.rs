//! Per-lookup priority frontier: candidates to query next, responders seen
//! so far, and the IP-deduplication state and adaptive parallelism throttle
//! that decide which candidates to probe.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Instant;

use bytes::Bytes;
use tracing::trace;

use crate::config::{LookupConfig, NO_MARK};
use crate::identifier::Identifier;
use crate::node::Node;
use crate::queued_node::QueuedNode;

/// Per-lookup bookkeeping: a bounded priority queue of candidates to query,
/// a bounded priority queue of responders, and the two IP deduplication
/// sets.
///
/// Invariant upheld by every public method: for any IP address, it belongs
/// to at most one of `queued_ips` / `queried_ips`, and once an IP joins
/// `queried_ips` it never re-enters `queued_ips`.
#[derive(Debug)]
pub struct LookupQueue {
    info_hash: Identifier,
    config: LookupConfig,

    queued: Vec<QueuedNode>,
    responded: Vec<QueuedNode>,

    queued_ips: HashSet<Ipv4Addr>,
    queried_ips: HashSet<Ipv4Addr>,

    slow_down: bool,
    pop_counter: u64,
    last_query_ts: Instant,
    sequence: u64,
}

impl LookupQueue {
    pub fn new(info_hash: Identifier, config: LookupConfig) -> Self {
        Self {
            info_hash,
            config,
            queued: Vec::new(),
            responded: Vec::new(),
            queued_ips: HashSet::new(),
            queried_ips: HashSet::new(),
            slow_down: false,
            pop_counter: 0,
            last_query_ts: Instant::now(),
            sequence: 0,
        }
    }

    pub fn slow_down(&self) -> bool {
        self.slow_down
    }

    /// Latches `slow_down`. Idempotent; never clears it.
    pub fn set_slow_down(&mut self) {
        self.slow_down = true;
    }

    pub fn responded_len(&self) -> usize {
        self.responded.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Marks every seed IP as queried and returns the seeds unchanged.
    /// Seeds are assumed id-bearing and IP-unique by contract.
    pub fn bootstrap(&mut self, seed_nodes: &[Node]) -> Vec<Node> {
        for n in seed_nodes {
            self.queried_ips.insert(n.ip);
        }
        seed_nodes.to_vec()
    }

    /// Records `src` as a responder, merges `nodes` into the candidate
    /// frontier, then pops. Returns the nodes to query next.
    ///
    /// A call that changes neither `responded` nor `queued` (a duplicate of
    /// a previously seen `(src, nodes, token)`) does not pop: popping is
    /// itself a state change (it advances `pop_counter` and can move
    /// entries from `queued` to `queried_ips`), so calling `on_response`
    /// twice with identical arguments would otherwise leave the queue in a
    /// different state than a single call.
    pub fn on_response(&mut self, src: Node, nodes: &[Node], token: Option<Bytes>) -> Vec<Node> {
        let added_responder = self.add_responded(src, token.clone());
        let added_candidate = self.add_queued_candidates(nodes, token);
        if !added_responder && !added_candidate {
            return Vec::new();
        }
        self.pop_nodes_to_query()
    }

    /// Pops; the caller is expected to have already latched `slow_down`.
    pub fn on_timeout(&mut self, _src: Node) -> Vec<Node> {
        self.pop_nodes_to_query()
    }

    /// Up to `n` of the nearest responders that supplied a token, in
    /// ascending log-distance order. `responded` is kept sorted, so this is
    /// a straight filter-and-take.
    pub fn closest_with_token(&self, n: usize) -> Vec<QueuedNode> {
        self.responded
            .iter()
            .filter(|qnode| qnode.token.is_some())
            .take(n)
            .cloned()
            .collect()
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Returns whether `src` was newly recorded as a responder. A node that
    /// has already responded in this lookup is not added again: this keeps
    /// `on_response` idempotent when called twice with the same responder,
    /// which a flaky transport can trigger (a duplicate datagram) even
    /// though the querier is expected to de-duplicate by transaction id
    /// upstream.
    fn add_responded(&mut self, src: Node, token: Option<Bytes>) -> bool {
        if self.responded.iter().any(|qnode| qnode.node.id == src.id) {
            return false;
        }
        let log_distance = src.id.log_distance(&self.info_hash);
        let sequence = self.next_sequence();
        let qnode = QueuedNode::new(src, log_distance, token, sequence);
        self.responded.push(qnode);
        self.responded.sort();
        self.responded.truncate(self.config.responded_qnodes_cap);
        true
    }

    /// Returns whether any candidate in `nodes` was newly added to `queued`.
    fn add_queued_candidates(&mut self, nodes: &[Node], token: Option<Bytes>) -> bool {
        let mut added_any = false;
        for n in nodes {
            if self.queued_ips.contains(&n.ip) || self.queried_ips.contains(&n.ip) {
                continue;
            }
            let log_distance = n.id.log_distance(&self.info_hash);
            let sequence = self.next_sequence();
            let qnode = QueuedNode::new(*n, log_distance, token.clone(), sequence);
            self.queued_ips.insert(n.ip);
            self.queued.push(qnode);
            added_any = true;
        }
        self.queued.sort();
        for evicted in self.queued.iter().skip(self.config.queued_qnodes_cap) {
            self.queued_ips.remove(&evicted.node.ip);
        }
        self.queued.truncate(self.config.queued_qnodes_cap);
        added_any
    }

    /// The heart of the adaptive parallelism throttle. See spec §4.1.
    fn pop_nodes_to_query(&mut self) -> Vec<Node> {
        self.pop_counter += 1;
        let mark_indices: &[usize] = if !self.slow_down && self.pop_counter % 2 == 1 {
            &[3, 0]
        } else {
            &[3]
        };

        let mut emitted = Vec::new();
        for &mark_index in mark_indices {
            let mark = self
                .responded
                .get(mark_index)
                .map(|qnode| qnode.log_distance)
                .unwrap_or(NO_MARK);

            let Some(head) = self.queued.first() else {
                break;
            };
            if head.log_distance < mark {
                let qnode = self.queued.remove(0);
                self.queued_ips.remove(&qnode.node.ip);
                self.queried_ips.insert(qnode.node.ip);
                trace!(ip = %qnode.node.ip, log_distance = qnode.log_distance, mark, "popped candidate");
                emitted.push(qnode.node);
            } else {
                break;
            }
        }

        self.last_query_ts = Instant::now();
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;
    use std::net::Ipv4Addr;

    fn id_at_distance(distance: u8) -> Identifier {
        // target is all-zero; set the single bit that makes log_distance == distance
        let mut bytes = [0u8; 20];
        if distance > 0 {
            let bit_from_lsb = distance - 1;
            let byte_idx = 19 - (bit_from_lsb / 8) as usize;
            let bit_in_byte = bit_from_lsb % 8;
            bytes[byte_idx] = 1 << bit_in_byte;
        }
        Identifier::from_bytes(bytes)
    }

    fn target() -> Identifier {
        Identifier::from_bytes([0u8; 20])
    }

    fn node_at(distance: u8, ip_last_octet: u8) -> Node {
        Node::new(
            id_at_distance(distance),
            Ipv4Addr::new(10, 0, 0, ip_last_octet),
            6881,
        )
    }

    #[test]
    fn bootstrap_marks_ips_queried_and_returns_seeds() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        let seeds = vec![node_at(140, 1), node_at(120, 2)];
        let returned = queue.bootstrap(&seeds);
        assert_eq!(returned, seeds);
        assert!(queue.queried_ips.contains(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(queue.queried_ips.contains(&Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn caps_are_enforced() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        let src = node_at(150, 0);
        let candidates: Vec<Node> = (1..=20).map(|i| node_at(100 + i, i)).collect();
        queue.on_response(src, &candidates, None);
        assert!(queue.queued_len() <= queue.config.queued_qnodes_cap);
        assert!(queue.responded_len() <= queue.config.responded_qnodes_cap);
    }

    #[test]
    fn ip_never_appears_in_both_sets() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        let src = node_at(150, 0);
        let candidates = vec![node_at(130, 1), node_at(131, 1)]; // duplicate IP
        queue.on_response(src, &candidates, None);
        assert!(queue.queued_ips.is_disjoint(&queue.queried_ips));
        // only one entry for the duplicated IP
        let count = queue
            .queued
            .iter()
            .filter(|q| q.node.ip == Ipv4Addr::new(10, 0, 0, 1))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn queried_ip_never_reenters_queued() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        queue.bootstrap(&[node_at(150, 5)]);
        // offering the same ip again as a candidate must not move it to queued
        queue.on_response(node_at(100, 9), &[node_at(90, 5)], None);
        assert!(!queue.queued_ips.contains(&Ipv4Addr::new(10, 0, 0, 5)));
        assert!(queue.queried_ips.contains(&Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn popped_nodes_are_strictly_nearer_than_mark() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        // Five responders at distances 146..150 so mark index 3 (4th nearest)
        // settles at 149; each call advances pop_counter by one, so after
        // five calls the next pop (the sixth) lands on an even counter and
        // uses only the index-3 mark.
        let responders: Vec<Node> = (0..5).map(|i| node_at(150 - i, 100 + i)).collect();
        for r in &responders {
            queue.on_response(*r, &[], None);
        }
        let mark = queue.responded[3].log_distance;
        assert_eq!(mark, 149);

        // `src` sorts past index 3 (distance 151, farther than all five
        // existing responders) so it does not itself shift the mark.
        let src = node_at(151, 200);
        let nearer = node_at(mark - 5, 1);
        let farther = node_at(mark + 5, 2);
        let emitted = queue.on_response(src, &[nearer, farther], None);

        assert!(emitted.iter().any(|n| n.ip == nearer.ip));
        assert!(!emitted.iter().any(|n| n.ip == farther.ip));
        for n in &emitted {
            assert!(n.id.log_distance(&target()) < mark);
        }
        // the candidate at or past the mark must remain queued, not popped
        assert!(queue.queued.iter().any(|q| q.node.ip == farther.ip));
    }

    #[test]
    fn idempotent_merge_of_same_response() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        // Four pre-existing responders at distances 60/70/80/90 so the
        // first real call below has a mark index 3 (= 80) and a mark index
        // 0 (= 60) to pop against, exercising the pop path rather than just
        // the merge path.
        let pre_responders: Vec<Node> = [60u8, 70, 80, 90]
            .iter()
            .enumerate()
            .map(|(i, d)| node_at(*d, 10 + i as u8))
            .collect();
        for r in &pre_responders {
            queue.on_response(*r, &[], None);
        }

        let src = node_at(65, 1);
        let candidates = [node_at(75, 3), node_at(50, 2)];

        let emitted_first = queue.on_response(src, &candidates, None);
        assert!(!emitted_first.is_empty());

        let responded_after_first = queue.responded.clone();
        let queued_after_first = queue.queued.clone();
        let queued_ips_after_first = queue.queued_ips.clone();
        let queried_ips_after_first = queue.queried_ips.clone();

        // A second call with the identical (src, nodes, token) must leave
        // the queue exactly as it was, and must not pop again: the merge
        // contributes nothing new (src already responded, both candidates
        // already queued or queried), so there is nothing to converge on.
        let emitted_second = queue.on_response(src, &candidates, None);
        assert!(emitted_second.is_empty());
        assert_eq!(queue.responded, responded_after_first);
        assert_eq!(queue.queued, queued_after_first);
        assert_eq!(queue.queued_ips, queued_ips_after_first);
        assert_eq!(queue.queried_ips, queried_ips_after_first);
    }

    #[test]
    fn closest_with_token_is_ascending_and_bounded() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        let dists = [10u8, 12, 14, 16, 18];
        for (i, d) in dists.iter().enumerate() {
            queue.on_response(
                node_at(*d, i as u8),
                &[],
                Some(Bytes::from_static(b"tok")),
            );
        }
        let closest = queue.closest_with_token(3);
        assert_eq!(closest.len(), 3);
        assert_eq!(closest[0].log_distance, 10);
        assert_eq!(closest[1].log_distance, 12);
        assert_eq!(closest[2].log_distance, 14);
    }

    #[test]
    fn adaptive_parallelism_disables_best_mark_under_slow_down() {
        let mut queue = LookupQueue::new(target(), LookupConfig::default());
        // three responders at close distances so both marks exist loosely
        for i in 0..4 {
            queue.on_response(node_at(150 - i, 50 + i), &[], None);
        }
        // candidates strictly nearer than both marks
        let candidates: Vec<Node> = (0..5).map(|i| node_at(5 + i, i)).collect();

        // odd pop_counter with slow_down false can emit up to 2
        let emitted_before = queue.on_response(node_at(149, 99), &candidates, None);
        assert!(emitted_before.len() <= 2);

        queue.set_slow_down();
        let more_candidates: Vec<Node> = (0..5).map(|i| node_at(1 + i, 200 + i)).collect();
        let emitted_after = queue.on_response(node_at(148, 98), &more_candidates, None);
        assert!(emitted_after.len() <= 1);
    }
}
