use super::MessageDispatcher;
use crate::commands::{
    BasicAttackIntent, CommandData, GameCommand, JoinRequest, MovementInput, Ping, PlayerId,
    RiftStepActivation, RiftStepDirectionalIntent, TurnIntent, UseAbility, NO_PLAYER,
};
use crate::error::RoutingError;
use crate::math::from_wire_vec3;
use crate::queue::SwapQueue;
use crate::session::SessionRegistry;
use log::{debug, warn};
use shared::{rift_intent, Packet};
use std::net::SocketAddr;
use std::sync::Arc;

/// Entry point for every decoded datagram.
pub struct PacketProcessor {
    dispatcher: MessageDispatcher,
    sessions: Arc<SessionRegistry>,
    disconnects: Arc<SwapQueue<SocketAddr>>,
}

impl PacketProcessor {
    pub fn new(
        dispatcher: MessageDispatcher,
        sessions: Arc<SessionRegistry>,
        disconnects: Arc<SwapQueue<SocketAddr>>,
    ) -> Self {
        Self {
            dispatcher,
            sessions,
            disconnects,
        }
    }

    /// Resolves the sender, converts the packet to a command and dispatches it.
    /// Returns a packet to send straight back to `sender`, if the handler had one.
    pub fn process_incoming(&self, sender: SocketAddr, packet: Packet) -> Option<Packet> {
        match self.try_process(sender, packet) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Dropped packet from {}: {}", sender, e);
                None
            }
        }
    }

    fn try_process(
        &self,
        sender: SocketAddr,
        packet: Packet,
    ) -> Result<Option<Packet>, RoutingError> {
        if !packet.is_client_message() {
            debug!("Ignoring server-only packet from {}", sender);
            return Ok(None);
        }

        let player_id = match packet {
            Packet::JoinRequest { .. } => NO_PLAYER,
            _ => {
                let player_id = self
                    .sessions
                    .player_for_endpoint(sender)
                    .ok_or(RoutingError::UnknownSender(sender))?;
                self.sessions.touch(sender);
                player_id
            }
        };

        if let Packet::Disconnect = packet {
            debug!("Player {} asked to disconnect", player_id);
            self.disconnects.push(sender);
            return Ok(None);
        }

        let Some(data) = translate_packet(packet) else {
            return Ok(None);
        };
        self.dispatcher
            .dispatch(&GameCommand::new(player_id, data), sender)
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }
}

fn directional_intent(code: u8) -> RiftStepDirectionalIntent {
    match code {
        rift_intent::FORWARD => RiftStepDirectionalIntent::Forward,
        rift_intent::BACKWARD => RiftStepDirectionalIntent::Backward,
        rift_intent::LEFT => RiftStepDirectionalIntent::Left,
        rift_intent::RIGHT => RiftStepDirectionalIntent::Right,
        _ => RiftStepDirectionalIntent::DefaultBackward,
    }
}

fn target_entity(id: u64) -> Option<PlayerId> {
    (id != shared::NO_ENTITY).then_some(id)
}

/// Wire packet to command payload. `None` for packets that carry no command.
pub fn translate_packet(packet: Packet) -> Option<CommandData> {
    let data = match packet {
        Packet::JoinRequest {
            client_version,
            character_id,
        } => CommandData::JoinRequest(JoinRequest {
            client_version,
            character_id,
        }),
        Packet::MovementInput {
            client_timestamp_ms,
            local_direction,
            is_sprinting,
        } => CommandData::MovementInput(MovementInput {
            client_timestamp_ms,
            local_direction: from_wire_vec3(local_direction),
            is_sprinting,
        }),
        Packet::TurnIntent {
            client_timestamp_ms,
            turn_delta_degrees,
        } => CommandData::TurnIntent(TurnIntent {
            client_timestamp_ms,
            turn_delta_degrees,
        }),
        Packet::RiftStepActivation {
            client_timestamp_ms,
            directional_intent: code,
        } => CommandData::RiftStepActivation(RiftStepActivation {
            client_timestamp_ms,
            directional_intent: directional_intent(code),
        }),
        Packet::BasicAttack {
            client_timestamp_ms,
            aim_direction,
            target_entity_id,
        } => CommandData::BasicAttack(BasicAttackIntent {
            client_timestamp_ms,
            aim_direction: from_wire_vec3(aim_direction),
            target_entity_id: target_entity(target_entity_id),
        }),
        Packet::UseAbility {
            client_timestamp_ms,
            ability_id,
            target_entity_id,
            target_position,
        } => CommandData::UseAbility(UseAbility {
            client_timestamp_ms,
            ability_id,
            target_entity_id: target_entity(target_entity_id),
            target_position: target_position.map(from_wire_vec3),
        }),
        Packet::Ping {
            client_timestamp_ms,
        } => CommandData::Ping(Ping {
            client_timestamp_ms,
        }),
        _ => return None,
    };
    Some(data)
}
