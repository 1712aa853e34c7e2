//! Factory and lifecycle root: given a target, seeds a [`LookupSession`]
//! with bootstrap nodes obtained from the routing table.

use crate::config::LookupConfig;
use crate::error::LookupError;
use crate::identifier::Identifier;
use crate::interfaces::{PeerSink, Querier, RoutingTable};
use crate::node::Node;
use crate::session::LookupSession;

/// Thin factory over [`LookupSession`]. Owns no mutable lookup state
/// itself; each call constructs a fresh session backed by the routing
/// table's current closest-set.
pub struct LookupManager<R: RoutingTable, Q: Querier> {
    my_id: Identifier,
    routing_table: R,
    querier: Q,
    config: LookupConfig,
}

impl<R: RoutingTable, Q: Querier> LookupManager<R, Q> {
    pub fn new(my_id: Identifier, routing_table: R, querier: Q, config: LookupConfig) -> Self {
        Self {
            my_id,
            routing_table,
            querier,
            config,
        }
    }

    /// Delegates to the querier; the manager itself owns no sockets or
    /// timers to tear down.
    pub fn stop(&mut self) {
        self.querier.stop();
    }

    /// Builds a peer-lookup session seeded from the routing table's closest
    /// known nodes to `info_hash`, ready to `start()`.
    pub fn get_peers(
        &self,
        info_hash: Identifier,
        bt_port: Option<u16>,
        peer_sink: Box<dyn PeerSink + Send>,
    ) -> Result<(LookupSession, Vec<Node>), LookupError> {
        let bootstrap_nodes = self.routing_table.closest_nodes(info_hash);
        if bootstrap_nodes.is_empty() {
            return Err(LookupError::NoBootstrapNodes);
        }
        let session =
            LookupSession::new_peer_lookup(self.my_id, info_hash, bt_port, self.config, peer_sink);
        Ok((session, bootstrap_nodes))
    }

    /// Builds a bootstrap-lookup session, defaulting `target` to the local
    /// id (routing-table self-maintenance) when none is given.
    pub fn bootstrap_lookup(
        &self,
        target: Option<Identifier>,
    ) -> Result<(LookupSession, Vec<Node>), LookupError> {
        let target = target.unwrap_or(self.my_id);
        let bootstrap_nodes = self.routing_table.closest_nodes(target);
        if bootstrap_nodes.is_empty() {
            return Err(LookupError::NoBootstrapNodes);
        }
        let session = LookupSession::new_bootstrap_lookup(self.my_id, target, self.config);
        Ok((session, bootstrap_nodes))
    }
}
