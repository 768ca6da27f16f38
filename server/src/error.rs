//! Error types for the server and its collaborators.
//!
//! Expected gameplay failures (cooldowns, missing targets) are not errors; they are
//! reported through outcome values. The types here cover routing, joins, the physics,
//! terrain and cache collaborators, and process startup.

use crate::commands::{CommandKind, PlayerId};
use std::net::SocketAddr;

/// Failures reported by a physics world.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("Physics scene unavailable")]
    SceneUnavailable,

    #[error("No character controller for entity {0}")]
    ControllerNotFound(u64),

    #[error("Character controller already exists for entity {0}")]
    ControllerExists(u64),

    #[error("Invalid body: {0}")]
    InvalidBody(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("Unknown terrain asset '{0}'")]
    UnknownAsset(String),

    #[error("Terrain asset '{asset}' produced no geometry")]
    EmptyMesh { asset: String },

    #[error("Heightmap for '{asset}' has {actual} samples, expected {expected}")]
    SampleCount {
        asset: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to read heightmap: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store is not connected")]
    Disconnected,

    #[error("Cache write failed for key '{key}': {reason}")]
    WriteFailed { key: String, reason: String },
}

/// Why an inbound message never reached a handler or shard.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("Packet from unknown sender {0}")]
    UnknownSender(SocketAddr),

    #[error("Player {0} is not in any shard")]
    UnknownPlayer(PlayerId),

    #[error("No handler registered for {0:?}")]
    UnregisteredHandler(CommandKind),

    #[error("Handler for {expected:?} received {actual:?}")]
    PayloadMismatch {
        expected: CommandKind,
        actual: CommandKind,
    },

    #[error("Malformed {0:?} payload")]
    InvalidPayload(CommandKind),
}

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("Endpoint {endpoint} is already associated with player {player_id}")]
    EndpointInUse {
        endpoint: SocketAddr,
        player_id: PlayerId,
    },

    #[error("Player {0} already exists")]
    PlayerExists(PlayerId),

    #[error("Server is full")]
    ServerFull,

    #[error("Failed to place player in world: {0}")]
    Physics(#[from] PhysicsError),
}

impl JoinError {
    /// Numeric code sent to the client in `JoinFailed`.
    pub fn code(&self) -> u32 {
        match self {
            JoinError::EndpointInUse { .. } => 1,
            JoinError::PlayerExists(_) | JoinError::Physics(_) => 2,
            JoinError::ServerFull => 3,
        }
    }

    /// Text sent to the client in `JoinFailed`.
    pub fn client_message(&self) -> &'static str {
        match self {
            JoinError::EndpointInUse { .. } => "This endpoint is already in the world.",
            JoinError::ServerFull => "Server is full.",
            _ => "Server failed to process join request.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("Zone load failed: {0}")]
    Terrain(#[from] TerrainError),

    #[error("Zone physics setup failed: {0}")]
    Physics(#[from] PhysicsError),
}

/// Top-level errors surfaced by server startup and the network loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Shard {shard_id} failed to start: {source}")]
    Shard {
        shard_id: u32,
        #[source]
        source: ShardError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_error_codes() {
        let endpoint: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(
            JoinError::EndpointInUse {
                endpoint,
                player_id: 1
            }
            .code(),
            1
        );
        assert_eq!(JoinError::Physics(PhysicsError::SceneUnavailable).code(), 2);
        assert_eq!(JoinError::ServerFull.code(), 3);
        assert_eq!(
            JoinError::PlayerExists(4).client_message(),
            "Server failed to process join request."
        );
    }

    #[test]
    fn test_error_display() {
        let err = RoutingError::PayloadMismatch {
            expected: CommandKind::TurnIntent,
            actual: CommandKind::Ping,
        };
        assert_eq!(err.to_string(), "Handler for TurnIntent received Ping");

        let err = ServerError::Shard {
            shard_id: 2,
            source: ShardError::Terrain(TerrainError::UnknownAsset("x".into())),
        };
        assert!(err.to_string().contains("Shard 2"));
    }
}
