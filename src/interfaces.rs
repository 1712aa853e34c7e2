//! The boundary between the lookup core and its out-of-scope collaborators:
//! the routing table, the querier/transport, and the wire codec.
//!
//! None of these traits are implemented in this crate; a node process
//! embedding the core supplies the implementations and drives the
//! callbacks on [`crate::session::LookupSession`].

use bytes::Bytes;

use crate::identifier::Identifier;
use crate::node::{Node, PeerAddress};

/// Supplies an initial bootstrap set of nodes close to a target.
pub trait RoutingTable {
    /// Returns up to the routing table's configured closest-set size,
    /// each node carrying a valid id.
    fn closest_nodes(&self, target: Identifier) -> Vec<Node>;
}

/// The querier/transport collaborator. The lookup core never calls this
/// directly except to relay a caller-initiated `stop()` through
/// [`crate::manager::LookupManager`] — sending, transaction binding, and
/// timeout tracking are entirely the querier's responsibility.
pub trait Querier {
    fn stop(&mut self);
}

/// Receives peer contacts discovered during a lookup. Invoked zero or more
/// times over a session's lifetime, once per response that carried peers.
/// Implementations must be fast and non-blocking: the core does not
/// serialize concurrent invocations, because the session itself is serial.
pub trait PeerSink {
    fn accept(&mut self, peers: &[PeerAddress]);
}

impl<F: FnMut(&[PeerAddress])> PeerSink for F {
    fn accept(&mut self, peers: &[PeerAddress]) {
        self(peers)
    }
}

/// One of the three outbound message kinds the wire codec can construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    FindNode {
        my_id: Identifier,
        target: Identifier,
    },
    GetPeers {
        my_id: Identifier,
        info_hash: Identifier,
    },
    AnnouncePeer {
        my_id: Identifier,
        info_hash: Identifier,
        port: u16,
        token: Bytes,
    },
}

/// A query the caller hands to the querier: a message paired with its
/// destination. The querier binds a transaction id, sends it, tracks the
/// timeout, and invokes the matching `LookupSession` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub message: OutgoingMessage,
    pub destination: Node,
}

/// The fields the lookup core reads off an inbound response. Unknown
/// fields are ignored by construction: this type only carries what the
/// core needs.
#[derive(Debug, Clone, Default)]
pub struct IncomingResponse {
    pub token: Option<Bytes>,
    pub peers: Option<Vec<PeerAddress>>,
    pub all_nodes: Vec<Node>,
}
