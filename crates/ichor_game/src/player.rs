//! Per-player gameplay state and command application.

use ichor_protocol::math::{Angle, Fixed};
use ichor_protocol::types::{PlayerCommand, PlayerState, WeaponType};
use serde::{Deserialize, Serialize};

use crate::actor::{ActorFlags, ActorId};

/// Forward/side thrust per move unit, matching the classic run speed.
const MOVE_SCALE: i32 = 2048;

/// Angle units per turn unit.
const TURN_SCALE: u32 = 1 << 16;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub skin: String,
    pub player_class: String,
    pub colormap: u8,
    pub frags: i32,
    pub health: i32,
    pub armor: i32,
    pub state: PlayerState,
    pub ready_weapon: WeaponType,
    pub pending_weapon: Option<WeaponType>,
    pub owned_weapons: [bool; WeaponType::COUNT],
    pub ammo: [i32; 4],
    /// The player's body in the actor table, while spawned.
    pub actor: Option<ActorId>,
    /// Tics to wait before the next shot.
    pub refire_wait: i32,
    pub death_tic: u32,
}

impl Player {
    pub fn new(number: u32) -> Self {
        let mut owned_weapons = [false; WeaponType::COUNT];
        owned_weapons[WeaponType::Fist as usize] = true;
        owned_weapons[WeaponType::Pistol as usize] = true;

        Self {
            name: format!("Player{number}"),
            skin: String::from("base"),
            player_class: String::from("doomguy"),
            colormap: 0,
            frags: 0,
            health: 100,
            armor: 0,
            state: PlayerState::Reborn,
            ready_weapon: WeaponType::Pistol,
            pending_weapon: None,
            owned_weapons,
            ammo: [50, 0, 0, 0],
            actor: None,
            refire_wait: 0,
            death_tic: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == PlayerState::Live
    }

    /// Applies the steering part of one command to the player's body.
    /// Weapon fire is evaluated by the caller so it can wrap the damage
    /// check in the unlagged rewind.
    pub fn apply_command_movement(
        &mut self,
        cmd: &PlayerCommand,
        actor_angle: Angle,
    ) -> MovementDelta {
        let angle = actor_angle + Angle((i32::from(cmd.angle_turn) as u32).wrapping_mul(TURN_SCALE));

        let (fwd_x, fwd_y) = angle.direction();
        let (side_x, side_y) = (angle - Angle::NORTH).direction();

        let forward = i32::from(cmd.forward_move) * MOVE_SCALE;
        let side = i32::from(cmd.side_move) * MOVE_SCALE;

        MovementDelta {
            angle,
            pitch: Fixed(i32::from(cmd.look) << 12),
            thrust_x: fwd_x.fixed_mul(Fixed(forward)) + side_x.fixed_mul(Fixed(side)),
            thrust_y: fwd_y.fixed_mul(Fixed(forward)) + side_y.fixed_mul(Fixed(side)),
            jump: cmd.has_button(PlayerCommand::BT_JUMP),
        }
    }

    /// Handles a weapon-change request from a command.
    pub fn select_weapon(&mut self, slot: u8) {
        let Some(&weapon) = WeaponType::ALL.get(slot as usize) else {
            return;
        };

        if self.owned_weapons[weapon as usize] && weapon != self.ready_weapon {
            self.pending_weapon = Some(weapon);
        }
    }

    /// Weapon switches resolve between tics; instant response is the
    /// client's prediction, this is the authority catching up.
    pub fn resolve_pending_weapon(&mut self) {
        if let Some(weapon) = self.pending_weapon.take() {
            self.ready_weapon = weapon;
        }
    }
}

/// What one command does to the player's body, before physics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MovementDelta {
    pub angle: Angle,
    pub pitch: Fixed,
    pub thrust_x: Fixed,
    pub thrust_y: Fixed,
    pub jump: bool,
}

/// The flag set that makes a body a spectator: flying, intangible, and
/// invisible to damage.
pub fn spectator_flags() -> u32 {
    ActorFlags::NOGRAVITY | ActorFlags::NOCLIP | ActorFlags::FLY | ActorFlags::SPECTATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_command_thrusts_along_angle() {
        let mut player = Player::new(1);
        let cmd = PlayerCommand {
            forward_move: 50,
            ..Default::default()
        };

        let delta = player.apply_command_movement(&cmd, Angle::EAST);

        assert!(delta.thrust_x > Fixed::ZERO);
        assert_eq!(delta.thrust_y, Fixed::ZERO);
    }

    #[test]
    fn turn_applies_to_angle() {
        let mut player = Player::new(1);
        let cmd = PlayerCommand {
            angle_turn: 1024,
            ..Default::default()
        };

        let delta = player.apply_command_movement(&cmd, Angle::EAST);
        assert_ne!(delta.angle, Angle::EAST);
    }

    #[test]
    fn weapon_selection_requires_ownership() {
        let mut player = Player::new(1);

        player.select_weapon(WeaponType::Bfg as u8);
        assert_eq!(player.pending_weapon, None);

        player.owned_weapons[WeaponType::Bfg as usize] = true;
        player.select_weapon(WeaponType::Bfg as u8);
        assert_eq!(player.pending_weapon, Some(WeaponType::Bfg));

        player.resolve_pending_weapon();
        assert_eq!(player.ready_weapon, WeaponType::Bfg);
    }
}
