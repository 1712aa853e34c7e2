//! Iterative lookup core of a Kademlia-style DHT used for peer discovery
//! in a content-distribution overlay.
//!
//! Given a 160-bit target key (an info-hash), this crate discovers the set
//! of overlay nodes closest to that key in XOR metric, collects peer
//! contacts associated with the key along the way, and optionally
//! announces the local node's availability to the closest responders.
//!
//! The routing table, querier/transport, wire codec, local peer tracker,
//! controller main loop, state persistence, and CLI that surround this
//! core in a full node are out of scope here and are represented only as
//! the traits in [`interfaces`].

pub mod config;
pub mod error;
pub mod identifier;
pub mod interfaces;
pub mod manager;
pub mod node;
pub mod queue;
pub mod queued_node;
pub mod session;

pub use config::LookupConfig;
pub use error::LookupError;
pub use identifier::Identifier;
pub use interfaces::{IncomingResponse, OutgoingMessage, PeerSink, Query, Querier, RoutingTable};
pub use manager::LookupManager;
pub use node::{Node, PeerAddress};
pub use queue::LookupQueue;
pub use queued_node::QueuedNode;
pub use session::{LookupSession, SessionHandle, SessionKind};
