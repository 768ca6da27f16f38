//! Inbound message pipeline: wire packet → [`GameCommand`] → handler → shard queue,
//! plus the event formatters that turn shard events back into packets.

pub mod dispatcher;
pub mod formatters;
pub mod handlers;
pub mod processor;

pub use dispatcher::MessageDispatcher;
pub use formatters::{install_formatters, FormatterContext};
pub use handlers::{JoinRequestHandler, JoinTicket, PingHandler, ShardCommandHandler};
pub use processor::{translate_packet, PacketProcessor};

use crate::commands::GameCommand;
use crate::error::RoutingError;
use crate::queue::CommandQueue;
use crate::session::{SessionRegistry, ShardId};
use shared::Packet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Handles one [`CommandKind`](crate::commands::CommandKind).
///
/// A handler either answers directly with a packet for `sender`, forwards the
/// command elsewhere and returns `Ok(None)`, or rejects it.
pub trait MessageHandler: Send + Sync {
    fn process(
        &self,
        command: &GameCommand,
        sender: SocketAddr,
    ) -> Result<Option<Packet>, RoutingError>;
}

/// Finds the command queue of the shard a player lives in.
pub struct ShardRouter {
    sessions: Arc<SessionRegistry>,
    queues: HashMap<ShardId, Arc<CommandQueue>>,
}

impl ShardRouter {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            queues: HashMap::new(),
        }
    }

    pub fn add_shard(&mut self, shard_id: ShardId, queue: Arc<CommandQueue>) {
        self.queues.insert(shard_id, queue);
    }

    /// Pushes `command` onto its player's shard queue.
    pub fn route(&self, command: GameCommand) -> Result<ShardId, RoutingError> {
        let player_id = command.originating_player_id;
        let shard_id = self
            .sessions
            .shard_for_player(player_id)
            .ok_or(RoutingError::UnknownPlayer(player_id))?;
        let queue = self
            .queues
            .get(&shard_id)
            .ok_or(RoutingError::UnknownPlayer(player_id))?;
        queue.push(command);
        Ok(shard_id)
    }
}
