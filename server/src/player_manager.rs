//! Per-shard player roster and identifier allocation
//!
//! The player manager is the shard's entity store. It:
//! - Creates and removes players as they join and leave
//! - Hands out player and projectile ids from counters owned by the shard
//! - Provides lookups and deterministic, id-ordered iteration for tick phases
//!
//! It is only ever touched from the owning shard's tick thread. Code running on
//! other threads goes through the session registry or the shard's command queue.

use crate::commands::{EntityId, PlayerId};
use crate::error::JoinError;
use crate::player::Player;
use glam::{Quat, Vec3};
use log::info;
use std::collections::BTreeMap;

/// Identifier space reserved for each shard; shard `n` allocates from `n << 32`.
const SHARD_ID_SHIFT: u32 = 32;

/// Owns every player of one shard.
///
/// Players are kept in a `BTreeMap` so iteration follows id order, which keeps
/// command resolution and publication deterministic from tick to tick.
pub struct PlayerManager {
    /// Connected players indexed by id
    players: BTreeMap<PlayerId, Player>,
    /// Next id handed out to a joining player
    next_player_id: PlayerId,
    /// Next id handed out to a spawned projectile
    next_projectile_id: EntityId,
    /// Maximum number of players this shard accepts
    max_players: usize,
}

impl PlayerManager {
    /// Creates an empty roster whose ids are scoped to `shard_id`.
    ///
    /// Ids start at one past the shard's base so that zero stays free as the
    /// "no player yet" marker and ids never collide between shards.
    pub fn new(shard_id: u32, max_players: usize) -> Self {
        let base = (shard_id as u64) << SHARD_ID_SHIFT;
        Self {
            players: BTreeMap::new(),
            next_player_id: base + 1,
            next_projectile_id: base + 1,
            max_players,
        }
    }

    /// Allocates the next player id. Ids are never reused.
    pub fn next_player_id(&mut self) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        id
    }

    /// Allocates the next projectile id. Ids are never reused.
    pub fn next_projectile_id(&mut self) -> EntityId {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        id
    }

    /// Inserts a new player at the spawn pose.
    ///
    /// Fails if the id is already taken or the shard is at capacity.
    pub fn create_player(
        &mut self,
        id: PlayerId,
        spawn_position: Vec3,
        spawn_orientation: Quat,
    ) -> Result<&mut Player, JoinError> {
        if self.players.contains_key(&id) {
            return Err(JoinError::PlayerExists(id));
        }
        if self.is_full() {
            return Err(JoinError::ServerFull);
        }

        info!("Player {} created at {}", id, spawn_position);
        Ok(self
            .players
            .entry(id)
            .or_insert_with(|| Player::new(id, spawn_position, spawn_orientation)))
    }

    /// Removes a player. Returns false if they were already gone.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        if self.players.remove(&id).is_some() {
            info!("Player {} removed", id);
            true
        } else {
            false
        }
    }

    pub fn find_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn find_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// Iterates players in id order.
    pub fn all_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn all_players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Snapshot of current ids, safe to hold while players are mutated.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
