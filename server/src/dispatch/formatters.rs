//! Event subscribers that turn shard events into outbound packets and cache blobs.

use crate::cache::CacheReplicator;
use crate::commands::{PlayerId, BASIC_ATTACK_ABILITY_ID, RIFTSTEP_ABILITY_ID};
use crate::event_bus::EventBus;
use crate::events::{
    AbilityFailed, AttackMissed, BasicAttackFailed, EntityDealtDamage, EntityRemoved,
    EntityStateUpdated, ProjectileSpawned, RiftStepExecuted, RiftStepFailed,
};
use crate::gameplay::outcome::{EffectPayload, FailureReason, GameplayEffectInstance};
use crate::math::{to_wire_quat, to_wire_vec3};
use crate::network::GameMessage;
use crate::player::DamageType;
use crate::session::{SessionRegistry, ShardId};
use log::{debug, warn};
use shared::{CombatEventKind, EntityState, Packet, PlayerStateCache, WireEffect, WireEffectKind};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a shard's formatters need to reach clients and the cache.
#[derive(Clone)]
pub struct FormatterContext {
    pub shard_id: ShardId,
    pub sessions: Arc<SessionRegistry>,
    pub outbound: mpsc::UnboundedSender<GameMessage>,
    pub cache: Option<CacheReplicator>,
}

impl FormatterContext {
    fn broadcast(&self, packet: Packet) {
        let message = GameMessage::BroadcastPacket {
            packet,
            shard: self.shard_id,
            exclude: None,
        };
        if self.outbound.send(message).is_err() {
            debug!("Outbound channel closed, dropping broadcast");
        }
    }

    fn reply_to(&self, player_id: PlayerId, packet: Packet) {
        let Some(addr) = self.sessions.endpoint_for_player(player_id) else {
            debug!("No endpoint for player {}, dropping reply", player_id);
            return;
        };
        if self.outbound.send(GameMessage::SendPacket { packet, addr }).is_err() {
            debug!("Outbound channel closed, dropping reply");
        }
    }

    fn ability_failed(&self, player_id: PlayerId, ability_id: u32, reason: FailureReason) {
        self.reply_to(
            player_id,
            Packet::AbilityFailed {
                ability_id,
                reason: reason.code().to_string(),
            },
        );
    }
}

/// Subscribes one formatter per outbound event kind on `bus`.
pub fn install_formatters(bus: &mut EventBus, ctx: FormatterContext) {
    let c = ctx.clone();
    bus.subscribe(move |e: &EntityStateUpdated| {
        if let Some(cache) = &c.cache {
            match bincode::serialize(&state_cache_blob(e, c.shard_id)) {
                Ok(blob) => {
                    cache.enqueue(e.entity_id, blob);
                }
                Err(err) => warn!("Failed to encode cache blob for {}: {}", e.entity_id, err),
            }
        }
        c.broadcast(Packet::EntityStateUpdate {
            server_timestamp_ms: shared::timestamp_ms(),
            state: entity_state(e),
        });
    });

    let c = ctx.clone();
    bus.subscribe(move |e: &RiftStepExecuted| {
        c.broadcast(rift_step_packet(e));
    });

    let c = ctx.clone();
    bus.subscribe(move |e: &RiftStepFailed| {
        c.ability_failed(e.player_id, RIFTSTEP_ABILITY_ID, e.reason);
    });

    let c = ctx.clone();
    bus.subscribe(move |e: &EntityDealtDamage| {
        let d = &e.details;
        c.broadcast(Packet::CombatEvent {
            kind: CombatEventKind::DamageDealt,
            source_id: d.source_id,
            target_id: d.target_id,
            damage: d.final_damage,
            damage_type: d.damage_type as u8,
            was_crit: d.was_crit,
            was_kill: d.was_kill,
            server_timestamp_ms: shared::timestamp_ms(),
        });
    });

    let c = ctx.clone();
    bus.subscribe(move |e: &AttackMissed| {
        c.broadcast(Packet::CombatEvent {
            kind: CombatEventKind::Miss,
            source_id: e.attacker_id,
            target_id: shared::NO_ENTITY,
            damage: 0,
            damage_type: DamageType::None as u8,
            was_crit: false,
            was_kill: false,
            server_timestamp_ms: shared::timestamp_ms(),
        });
    });

    let c = ctx.clone();
    bus.subscribe(move |e: &BasicAttackFailed| {
        c.ability_failed(e.player_id, BASIC_ATTACK_ABILITY_ID, e.reason);
    });

    let c = ctx.clone();
    bus.subscribe(move |e: &ProjectileSpawned| {
        let p = &e.projectile;
        c.broadcast(Packet::ProjectileSpawned {
            projectile_id: p.projectile_id,
            owner_id: p.owner_id,
            start_position: to_wire_vec3(p.start_position),
            direction: to_wire_vec3(p.direction),
            speed: p.speed,
            max_range: p.max_range,
            vfx_tag: p.vfx_tag.clone(),
        });
    });

    let c = ctx.clone();
    bus.subscribe(move |e: &AbilityFailed| {
        c.ability_failed(e.player_id, e.ability_id, e.reason);
    });

    let c = ctx;
    bus.subscribe(move |e: &EntityRemoved| {
        c.broadcast(Packet::EntityRemoved {
            entity_id: e.entity_id,
        });
    });
}

fn entity_state(e: &EntityStateUpdated) -> EntityState {
    EntityState {
        entity_id: e.entity_id,
        position: to_wire_vec3(e.position),
        orientation: to_wire_quat(e.orientation),
        health: e.health,
        max_health: e.max_health,
        will: e.will,
        max_will: e.max_will,
        animation_state: e.animation_state as u32,
        movement_state: e.movement_state as u8,
        status_effects: e.status_effects.iter().map(|s| *s as u8).collect(),
    }
}

fn state_cache_blob(e: &EntityStateUpdated, shard_id: ShardId) -> PlayerStateCache {
    PlayerStateCache {
        player_id: e.entity_id,
        shard_id,
        position: to_wire_vec3(e.position),
        orientation: to_wire_quat(e.orientation),
        health: e.health,
        max_health: e.max_health,
        will: e.will,
        max_will: e.max_will,
        movement_state: e.movement_state as u8,
        status_effects: e.status_effects.iter().map(|s| *s as u8).collect(),
        updated_at_ms: shared::timestamp_ms(),
    }
}

fn rift_step_packet(e: &RiftStepExecuted) -> Packet {
    let o = &e.outcome;
    Packet::RiftStepInitiated {
        instigator_id: o.instigator_id,
        start_position: to_wire_vec3(o.start_position),
        intended_target_position: to_wire_vec3(o.intended_target_position),
        final_position: to_wire_vec3(o.final_position),
        travel_duration_sec: o.travel_duration_secs,
        entry_effects: o.entry_effects.iter().map(wire_effect).collect(),
        exit_effects: o.exit_effects.iter().map(wire_effect).collect(),
        start_vfx_id: o.start_vfx_id.clone(),
        travel_vfx_id: o.travel_vfx_id.clone(),
        end_vfx_id: o.end_vfx_id.clone(),
    }
}

/// Flattens an effect instance into its wire form.
pub fn wire_effect(effect: &GameplayEffectInstance) -> WireEffect {
    let mut wire = WireEffect {
        kind: WireEffectKind::AreaDamage,
        center: to_wire_vec3(effect.center),
        radius: effect.radius,
        duration_ms: effect.duration_ms,
        damage: 0,
        damage_type: DamageType::None as u8,
        stun_duration_ms: 0,
        status_effect: None,
        vfx_tag: effect.vfx_tag.clone(),
    };
    match &effect.payload {
        EffectPayload::AreaDamage(damage) => {
            wire.damage = damage.amount;
            wire.damage_type = damage.damage_type as u8;
        }
        EffectPayload::AreaStun { stun_duration_ms } => {
            wire.kind = WireEffectKind::AreaStun;
            wire.stun_duration_ms = *stun_duration_ms;
        }
        EffectPayload::ApplyStatus(status) => {
            wire.kind = WireEffectKind::ApplyStatus;
            wire.status_effect = Some(*status as u8);
        }
        EffectPayload::PersistentArea {
            status,
            periodic_damage,
        } => {
            wire.kind = WireEffectKind::PersistentArea;
            wire.status_effect = status.map(|s| s as u8);
            if let Some(damage) = periodic_damage {
                wire.damage = damage.amount;
                wire.damage_type = damage.damage_type as u8;
            }
        }
    }
    wire
}
