//! The thread-safe driver of one lookup: holds a queue, counts in-flight
//! queries, applies the parallelism policy, and exposes callbacks for
//! response/timeout/error.
//!
//! Two flavours share this one driver — a peer lookup (`SessionKind::Peers`,
//! issues `get_peers`, announces at the end) and a bootstrap lookup
//! (`SessionKind::Bootstrap`, issues `find_node`, never announces).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::LookupConfig;
use crate::error::LookupError;
use crate::identifier::Identifier;
use crate::interfaces::{IncomingResponse, OutgoingMessage, PeerSink, Query};
use crate::node::{Node, PeerAddress};
use crate::queue::LookupQueue;

/// Which outbound message template a session uses, and whether it
/// announces at the end. A tagged variant rather than a trait object: the
/// set of flavours is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Issues `get_peers`; announces to the nearest tokened responders.
    Peers,
    /// Issues `find_node`; never announces.
    Bootstrap,
}

#[derive(Debug, Default)]
struct SharedState {
    num_parallel_queries: AtomicI64,
    is_done: AtomicBool,
}

/// Read-only, cross-thread-safe view of a session's progress. Everything
/// else about a session is confined to the dispatch thread that calls
/// `start` / `on_response` / `on_timeout` / `on_error`.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SharedState>,
}

impl SessionHandle {
    pub fn num_parallel_queries(&self) -> i64 {
        self.shared.num_parallel_queries.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.shared.is_done.load(Ordering::Acquire)
    }
}

pub struct LookupSession {
    my_id: Identifier,
    target: Identifier,
    bt_port: Option<u16>,
    kind: SessionKind,
    config: LookupConfig,
    queue: LookupQueue,
    peer_sink: Box<dyn PeerSink + Send>,
    shared: Arc<SharedState>,
    started: bool,

    pub num_queries: u64,
    pub num_responses: u64,
    pub num_timeouts: u64,
    pub num_errors: u64,
}

impl LookupSession {
    fn new(
        my_id: Identifier,
        target: Identifier,
        bt_port: Option<u16>,
        kind: SessionKind,
        config: LookupConfig,
        peer_sink: Box<dyn PeerSink + Send>,
    ) -> Self {
        debug!(target = ?target, ?kind, "new lookup session");
        Self {
            my_id,
            target,
            bt_port,
            kind,
            config,
            queue: LookupQueue::new(target, config),
            peer_sink,
            shared: Arc::new(SharedState::default()),
            started: false,
            num_queries: 0,
            num_responses: 0,
            num_timeouts: 0,
            num_errors: 0,
        }
    }

    /// A peer lookup: issues `get_peers`, announces at the end if `bt_port`
    /// is given.
    pub fn new_peer_lookup(
        my_id: Identifier,
        info_hash: Identifier,
        bt_port: Option<u16>,
        config: LookupConfig,
        peer_sink: Box<dyn PeerSink + Send>,
    ) -> Self {
        Self::new(
            my_id,
            info_hash,
            bt_port,
            SessionKind::Peers,
            config,
            peer_sink,
        )
    }

    /// A bootstrap lookup: issues `find_node`, never announces regardless
    /// of the `bt_port` the caller might pass elsewhere.
    pub fn new_bootstrap_lookup(
        my_id: Identifier,
        target: Identifier,
        config: LookupConfig,
    ) -> Self {
        Self::new(
            my_id,
            target,
            None,
            SessionKind::Bootstrap,
            config,
            Box::new(|_: &[PeerAddress]| {}),
        )
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.shared.is_done.load(Ordering::Acquire)
    }

    pub fn num_parallel_queries(&self) -> i64 {
        self.shared.num_parallel_queries.load(Ordering::Acquire)
    }

    /// Seeds the queue from the bootstrap set, pops, and returns the
    /// initial batch of outbound queries.
    pub fn start(&mut self, bootstrap_nodes: &[Node]) -> Result<Vec<Query>, LookupError> {
        if self.started {
            return Err(LookupError::AlreadyStarted);
        }
        self.started = true;
        let nodes_to_query = self.queue.bootstrap(bootstrap_nodes);
        let queries = self.build_queries(&nodes_to_query);
        Ok(self.finish_if_done(queries))
    }

    pub fn on_response(&mut self, response: IncomingResponse, node: Node) -> Vec<Query> {
        if self.is_done() {
            return Vec::new();
        }
        self.shared.num_parallel_queries.fetch_sub(1, Ordering::AcqRel);
        self.num_responses += 1;
        debug!(?node, "response received");

        if let Some(peers) = &response.peers {
            if !peers.is_empty() {
                self.queue.set_slow_down();
                self.peer_sink.accept(peers);
            }
        }

        let nodes_to_query = self
            .queue
            .on_response(node, &response.all_nodes, response.token);
        let queries = self.build_queries(&nodes_to_query);
        self.finish_if_done(queries)
    }

    pub fn on_timeout(&mut self, node: Node) -> Vec<Query> {
        if self.is_done() {
            return Vec::new();
        }
        self.queue.set_slow_down();
        let nodes_to_query = self.queue.on_timeout(node);
        let queries = self.build_queries(&nodes_to_query);

        self.num_timeouts += 1;
        debug!(?node, "query timed out");
        self.shared.num_parallel_queries.fetch_sub(1, Ordering::AcqRel);
        self.finish_if_done(queries)
    }

    pub fn on_error(&mut self, node: Node) -> Vec<Query> {
        if self.is_done() {
            return Vec::new();
        }
        self.num_errors += 1;
        debug!(?node, "query errored");
        self.shared.num_parallel_queries.fetch_sub(1, Ordering::AcqRel);
        self.finish_if_done(Vec::new())
    }

    fn outgoing_message(&self) -> OutgoingMessage {
        match self.kind {
            SessionKind::Peers => OutgoingMessage::GetPeers {
                my_id: self.my_id,
                info_hash: self.target,
            },
            SessionKind::Bootstrap => OutgoingMessage::FindNode {
                my_id: self.my_id,
                target: self.target,
            },
        }
    }

    fn build_queries(&mut self, nodes: &[Node]) -> Vec<Query> {
        let message = self.outgoing_message();
        let mut result = Vec::new();
        for node in nodes {
            if node.id == self.my_id {
                // never probe self
                continue;
            }
            self.shared.num_parallel_queries.fetch_add(1, Ordering::AcqRel);
            self.num_queries += 1;
            result.push(Query {
                message: message.clone(),
                destination: *node,
            });
        }
        result
    }

    /// Checks termination after emission; if the lookup has no more
    /// in-flight queries, transitions to the announce phase and appends
    /// any announce queries to `queries`. No-op (and returns `queries`
    /// unchanged) if the session is already done or still has in-flight
    /// queries.
    fn finish_if_done(&mut self, mut queries: Vec<Query>) -> Vec<Query> {
        if self.shared.num_parallel_queries.load(Ordering::Acquire) != 0 {
            return queries;
        }
        if self
            .shared
            .is_done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return queries;
        }
        debug!(
            responses = self.num_responses,
            timeouts = self.num_timeouts,
            "end of lookup"
        );
        queries.extend(self.announce());
        queries
    }

    fn announce(&self) -> Vec<Query> {
        if self.kind != SessionKind::Peers {
            return Vec::new();
        }
        let Some(port) = self.bt_port else {
            return Vec::new();
        };
        self.queue
            .closest_with_token(self.config.announce_redundancy)
            .into_iter()
            .filter_map(|qnode| {
                let token = qnode.token?;
                Some(Query {
                    message: OutgoingMessage::AnnouncePeer {
                        my_id: self.my_id,
                        info_hash: self.target,
                        port,
                        token,
                    },
                    destination: qnode.node,
                })
            })
            .collect()
    }
}
