//! Broadcast entry points for simulation events.
//!
//! The thinker and combat code that lives outside the core (monster AI,
//! line specials, item pickups) reports through these; the handful the core
//! itself simulates call them directly.

use ichor_game::{ActorId, ActorKind};
use ichor_protocol::messages::{
    ActorStateS2c, ActorTargetS2c, AnnouncerEventS2c, CubeSpawnedS2c, LineActivatedS2c,
    MonsterActiveS2c, MonsterAwakenedS2c, PlayerTouchedSpecialS2c, PlayerWeaponStateS2c,
};
use ichor_protocol::types::{
    ActivationKind, ActorTargetKind, AnnouncerEvent, NetId,
};

use crate::Server;

impl Server {
    /// A weapon sprite state change: raise, lower, or muzzle flash.
    pub fn broadcast_player_weapon_state(
        &mut self,
        player_number: usize,
        psprite_position: u8,
        state_number: u32,
    ) {
        self.broadcast(&PlayerWeaponStateS2c {
            world_index: self.session.world_index,
            player_number: player_number as u32,
            psprite_position,
            state_number,
        });
    }

    /// A player picked up (or touched) a special thing.
    pub fn broadcast_player_touched_special(&mut self, player_number: usize, thing: NetId) {
        self.broadcast(&PlayerTouchedSpecialS2c {
            world_index: self.session.world_index,
            player_number: player_number as u32,
            thing_net_id: thing,
        });
    }

    pub fn broadcast_announcer_event(&mut self, event: AnnouncerEvent, source: NetId) {
        self.broadcast(&AnnouncerEventS2c {
            world_index: self.session.world_index,
            event,
            source_net_id: source,
        });
    }

    /// An actor re-targeted; `kind` says which back-reference changed.
    pub fn broadcast_actor_target(&mut self, actor: NetId, kind: ActorTargetKind, target: NetId) {
        self.broadcast(&ActorTargetS2c {
            world_index: self.session.world_index,
            net_id: actor,
            target_kind: kind,
            target_net_id: target,
        });
    }

    /// An actor jumped to a new state table entry.
    pub fn broadcast_actor_state(&mut self, actor: NetId, state_number: u32) {
        self.broadcast(&ActorStateS2c {
            world_index: self.session.world_index,
            net_id: actor,
            state_number,
        });
    }

    /// A line special fired.
    pub fn broadcast_line_activated(
        &mut self,
        actor: NetId,
        line_number: u32,
        side: u8,
        activation: ActivationKind,
    ) {
        self.broadcast(&LineActivatedS2c {
            world_index: self.session.world_index,
            actor_net_id: actor,
            line_number,
            side,
            activation,
        });
    }

    /// A monster went active (left its spawn state).
    pub fn broadcast_monster_active(&mut self, monster: NetId) {
        self.broadcast(&MonsterActiveS2c {
            world_index: self.session.world_index,
            net_id: monster,
        });
    }

    /// A monster heard or saw a player.
    pub fn broadcast_monster_awakened(&mut self, monster: NetId) {
        self.broadcast(&MonsterAwakenedS2c {
            world_index: self.session.world_index,
            net_id: monster,
        });
    }

    /// A boss-brain spawn cube is in flight toward its target pad.
    pub fn broadcast_cube_spawned(&mut self, cube: NetId, target: NetId) {
        self.broadcast(&CubeSpawnedS2c {
            world_index: self.session.world_index,
            net_id: cube,
            target_net_id: target,
        });
    }

    /// Flag pickup check for one player's body after it moved. Touching a
    /// flag is the one special the core simulates itself; everything else
    /// reports through [`broadcast_player_touched_special`].
    ///
    /// [`broadcast_player_touched_special`]: Self::broadcast_player_touched_special
    pub(crate) fn check_special_touches(&mut self, player_number: usize) {
        if !self.session.settings.game_type.has_teams() {
            return;
        }

        let Some(actor_id) = self.session.players[player_number]
            .as_ref()
            .and_then(|p| p.actor)
        else {
            return;
        };

        let Some((x, y, radius)) = self
            .session
            .world
            .get(actor_id)
            .map(|a| (a.x, a.y, a.radius))
        else {
            return;
        };

        let touched: Vec<(ActorId, NetId)> = self
            .session
            .world
            .actors()
            .filter(|(id, a)| {
                *id != actor_id
                    && a.kind == ActorKind::Flag
                    && (a.x - x).abs() <= radius + a.radius
                    && (a.y - y).abs() <= radius + a.radius
            })
            .map(|(id, a)| (id, a.net_id))
            .collect();

        for (_, net_id) in touched {
            self.broadcast_player_touched_special(player_number, net_id);
            self.broadcast_announcer_event(AnnouncerEvent::FlagTaken, net_id);
        }
    }
}
