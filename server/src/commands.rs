//! Player intents accepted by a shard.
//!
//! A [`GameCommand`] is what remains of an inbound packet once the sender has been
//! resolved to a player. Nothing in here knows about sockets or encodings.

use glam::Vec3;

pub type PlayerId = u64;
pub type EntityId = u64;

/// Originating id carried by a join request, before any player exists.
pub const NO_PLAYER: PlayerId = 0;

pub const RIFTSTEP_ABILITY_ID: u32 = 1;
pub const BASIC_ATTACK_ABILITY_ID: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RiftStepDirectionalIntent {
    #[default]
    DefaultBackward,
    Forward,
    Backward,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementInput {
    pub client_timestamp_ms: u64,
    /// Desired direction in the player's local frame; need not be normalized.
    pub local_direction: Vec3,
    pub is_sprinting: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnIntent {
    pub client_timestamp_ms: u64,
    pub turn_delta_degrees: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiftStepActivation {
    pub client_timestamp_ms: u64,
    pub directional_intent: RiftStepDirectionalIntent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicAttackIntent {
    pub client_timestamp_ms: u64,
    pub aim_direction: Vec3,
    pub target_entity_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseAbility {
    pub client_timestamp_ms: u64,
    pub ability_id: u32,
    pub target_entity_id: Option<EntityId>,
    pub target_position: Option<Vec3>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    pub client_timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub client_version: u32,
    pub character_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandData {
    MovementInput(MovementInput),
    TurnIntent(TurnIntent),
    RiftStepActivation(RiftStepActivation),
    BasicAttack(BasicAttackIntent),
    UseAbility(UseAbility),
    Ping(Ping),
    JoinRequest(JoinRequest),
}

/// Variant tag of [`CommandData`], used as the handler registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    MovementInput,
    TurnIntent,
    RiftStepActivation,
    BasicAttack,
    UseAbility,
    Ping,
    JoinRequest,
}

impl CommandKind {
    /// Kinds that are resolved inside a shard's tick rather than answered directly.
    pub const SHARD_BOUND: [CommandKind; 5] = [
        CommandKind::MovementInput,
        CommandKind::TurnIntent,
        CommandKind::RiftStepActivation,
        CommandKind::BasicAttack,
        CommandKind::UseAbility,
    ];
}

impl CommandData {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandData::MovementInput(_) => CommandKind::MovementInput,
            CommandData::TurnIntent(_) => CommandKind::TurnIntent,
            CommandData::RiftStepActivation(_) => CommandKind::RiftStepActivation,
            CommandData::BasicAttack(_) => CommandKind::BasicAttack,
            CommandData::UseAbility(_) => CommandKind::UseAbility,
            CommandData::Ping(_) => CommandKind::Ping,
            CommandData::JoinRequest(_) => CommandKind::JoinRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameCommand {
    pub originating_player_id: PlayerId,
    pub data: CommandData,
}

impl GameCommand {
    pub fn new(originating_player_id: PlayerId, data: CommandData) -> Self {
        Self {
            originating_player_id,
            data,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.data.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let command = GameCommand::new(
            7,
            CommandData::TurnIntent(TurnIntent {
                client_timestamp_ms: 10,
                turn_delta_degrees: 15.0,
            }),
        );
        assert_eq!(command.kind(), CommandKind::TurnIntent);

        let join = GameCommand::new(
            NO_PLAYER,
            CommandData::JoinRequest(JoinRequest {
                client_version: 1,
                character_id: "a".into(),
            }),
        );
        assert_eq!(join.kind(), CommandKind::JoinRequest);
        assert_eq!(join.originating_player_id, NO_PLAYER);
    }

    #[test]
    fn test_shard_bound_kinds_exclude_request_response() {
        assert!(!CommandKind::SHARD_BOUND.contains(&CommandKind::Ping));
        assert!(!CommandKind::SHARD_BOUND.contains(&CommandKind::JoinRequest));
        assert!(CommandKind::SHARD_BOUND.contains(&CommandKind::UseAbility));
    }

    #[test]
    fn test_default_intent_is_backward() {
        assert_eq!(
            RiftStepDirectionalIntent::default(),
            RiftStepDirectionalIntent::DefaultBackward
        );
    }
}
