//! Endpoint ↔ player identity mapping shared between the network tasks and the
//! simulation thread.

use crate::commands::PlayerId;
use crate::error::JoinError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub type ShardId = u32;

/// One connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub endpoint: SocketAddr,
    pub player_id: PlayerId,
    pub shard_id: ShardId,
    /// Last time any datagram arrived from this endpoint.
    pub last_seen: Instant,
}

impl Session {
    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    by_endpoint: DashMap<SocketAddr, Session>,
    by_player: DashMap<PlayerId, SocketAddr>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new association. Fails if the endpoint already has a player.
    pub fn associate(
        &self,
        endpoint: SocketAddr,
        player_id: PlayerId,
        shard_id: ShardId,
    ) -> Result<(), JoinError> {
        match self.by_endpoint.entry(endpoint) {
            Entry::Occupied(existing) => Err(JoinError::EndpointInUse {
                endpoint,
                player_id: existing.get().player_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Session {
                    endpoint,
                    player_id,
                    shard_id,
                    last_seen: Instant::now(),
                });
                self.by_player.insert(player_id, endpoint);
                info!(
                    "Player {} associated with {} on shard {}",
                    player_id, endpoint, shard_id
                );
                Ok(())
            }
        }
    }

    pub fn remove_by_endpoint(&self, endpoint: SocketAddr) -> Option<Session> {
        let (_, session) = self.by_endpoint.remove(&endpoint)?;
        self.by_player.remove(&session.player_id);
        info!("Player {} at {} removed", session.player_id, endpoint);
        Some(session)
    }

    pub fn session(&self, endpoint: SocketAddr) -> Option<Session> {
        self.by_endpoint.get(&endpoint).map(|s| *s)
    }

    pub fn player_for_endpoint(&self, endpoint: SocketAddr) -> Option<PlayerId> {
        self.by_endpoint.get(&endpoint).map(|s| s.player_id)
    }

    pub fn endpoint_for_player(&self, player_id: PlayerId) -> Option<SocketAddr> {
        self.by_player.get(&player_id).map(|e| *e)
    }

    pub fn shard_for_player(&self, player_id: PlayerId) -> Option<ShardId> {
        let endpoint = self.endpoint_for_player(player_id)?;
        self.by_endpoint.get(&endpoint).map(|s| s.shard_id)
    }

    /// Refreshes `last_seen`. Returns false for unknown endpoints.
    pub fn touch(&self, endpoint: SocketAddr) -> bool {
        match self.by_endpoint.get_mut(&endpoint) {
            Some(mut session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Endpoints that have been silent for longer than `timeout`.
    pub fn timed_out(&self, timeout: Duration) -> Vec<SocketAddr> {
        let now = Instant::now();
        self.by_endpoint
            .iter()
            .filter(|s| s.is_timed_out(timeout, now))
            .map(|s| s.endpoint)
            .collect()
    }

    /// Every endpoint in `shard_id`, optionally leaving one player out.
    pub fn endpoints_in_shard(
        &self,
        shard_id: ShardId,
        exclude: Option<PlayerId>,
    ) -> Vec<SocketAddr> {
        self.by_endpoint
            .iter()
            .filter(|s| s.shard_id == shard_id && Some(s.player_id) != exclude)
            .map(|s| s.endpoint)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_endpoint.is_empty()
    }
}
