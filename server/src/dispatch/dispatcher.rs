use super::MessageHandler;
use crate::commands::{CommandKind, GameCommand};
use crate::error::RoutingError;
use log::debug;
use shared::Packet;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Registry of handlers keyed by command kind.
#[derive(Default)]
pub struct MessageDispatcher {
    handlers: HashMap<CommandKind, Box<dyn MessageHandler>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any earlier one.
    pub fn register(&mut self, kind: CommandKind, handler: Box<dyn MessageHandler>) {
        if self.handlers.insert(kind, handler).is_some() {
            debug!("Replaced handler for {:?}", kind);
        }
    }

    pub fn has_handler(&self, kind: CommandKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn dispatch(
        &self,
        command: &GameCommand,
        sender: SocketAddr,
    ) -> Result<Option<Packet>, RoutingError> {
        let kind = command.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(RoutingError::UnregisteredHandler(kind))?;
        handler.process(command, sender)
    }
}
