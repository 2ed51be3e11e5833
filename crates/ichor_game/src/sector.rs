//! Sectors and the moving-plane thinkers that animate them.

use ichor_protocol::math::Fixed;
use ichor_protocol::types::SectorPosition;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Sector {
    pub floor_height: Fixed,
    pub ceiling_height: Fixed,
}

impl Sector {
    pub fn new(floor_height: Fixed, ceiling_height: Fixed) -> Self {
        Self {
            floor_height,
            ceiling_height,
        }
    }

    pub fn save_position(&self, world_index: u32) -> SectorPosition {
        SectorPosition {
            world_index,
            ceiling_height: self.ceiling_height,
            floor_height: self.floor_height,
        }
    }

    pub fn load_position(&mut self, pos: &SectorPosition) {
        self.ceiling_height = pos.ceiling_height;
        self.floor_height = pos.floor_height;
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum MoverKind {
    /// Moves the ceiling between the closed and open heights.
    Door,
    /// Moves the floor between the low and high heights.
    Lift,
}

/// A thinker that moves one plane of one sector every tic. This is the
/// entire class of map state the unlagged rewind has to reconstruct, which
/// is why sector positions are ring-buffered alongside player positions.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Mover {
    pub sector: usize,
    pub kind: MoverKind,
    pub speed: Fixed,
    pub low: Fixed,
    pub high: Fixed,
    /// 1 opening/rising, -1 closing/falling, 0 waiting.
    pub direction: i32,
    /// Tics left to wait at an extreme before reversing.
    pub wait: i32,
    pub wait_time: i32,
    pub finished: bool,
}

impl Mover {
    pub fn door(sector: usize, closed: Fixed, open: Fixed, speed: Fixed, wait_time: i32) -> Self {
        Self {
            sector,
            kind: MoverKind::Door,
            speed,
            low: closed,
            high: open,
            direction: 1,
            wait: 0,
            wait_time,
            finished: false,
        }
    }

    pub fn lift(sector: usize, low: Fixed, high: Fixed, speed: Fixed, wait_time: i32) -> Self {
        Self {
            sector,
            kind: MoverKind::Lift,
            speed,
            low,
            high,
            direction: -1,
            wait: 0,
            wait_time,
            finished: false,
        }
    }

    /// Advances the plane one tic. Returns true while the sector changed.
    pub fn tick(&mut self, sector: &mut Sector) -> bool {
        if self.finished {
            return false;
        }

        if self.wait > 0 {
            self.wait -= 1;
            if self.wait == 0 {
                self.direction = -self.direction;
            }
            return false;
        }

        let plane = match self.kind {
            MoverKind::Door => &mut sector.ceiling_height,
            MoverKind::Lift => &mut sector.floor_height,
        };

        let before = *plane;

        if self.direction > 0 {
            *plane = (*plane + self.speed).min(self.high);
            if *plane == self.high {
                match self.kind {
                    // An open door waits and then closes for good.
                    MoverKind::Door => self.wait = self.wait_time,
                    MoverKind::Lift => self.wait = self.wait_time,
                }
            }
        } else {
            *plane = (*plane - self.speed).max(self.low);
            if *plane == self.low {
                match self.kind {
                    MoverKind::Door => self.finished = true,
                    MoverKind::Lift => self.wait = self.wait_time,
                }
            }
        }

        before != *plane
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn door_opens_waits_and_closes() {
        let mut sector = Sector::new(Fixed::ZERO, Fixed::ZERO);
        let mut door = Mover::door(
            0,
            Fixed::ZERO,
            Fixed::from_int(72),
            Fixed::from_int(8),
            4,
        );

        // Opening.
        for _ in 0..9 {
            door.tick(&mut sector);
        }
        assert_eq!(sector.ceiling_height, Fixed::from_int(72));

        // Waiting.
        for _ in 0..4 {
            assert!(!door.tick(&mut sector));
        }

        // Closing.
        for _ in 0..9 {
            door.tick(&mut sector);
        }
        assert_eq!(sector.ceiling_height, Fixed::ZERO);
        assert!(door.finished);
        assert!(!door.tick(&mut sector));
    }

    #[test]
    fn lift_cycles() {
        let mut sector = Sector::new(Fixed::from_int(64), Fixed::from_int(128));
        let mut lift = Mover::lift(
            0,
            Fixed::ZERO,
            Fixed::from_int(64),
            Fixed::from_int(4),
            2,
        );

        // Going down to low.
        for _ in 0..16 {
            lift.tick(&mut sector);
        }
        assert_eq!(sector.floor_height, Fixed::ZERO);

        // Wait, then back up.
        for _ in 0..2 {
            lift.tick(&mut sector);
        }
        for _ in 0..16 {
            lift.tick(&mut sector);
        }
        assert_eq!(sector.floor_height, Fixed::from_int(64));
    }

    #[test]
    fn sector_position_round_trips() {
        let sector = Sector::new(Fixed::from_int(8), Fixed::from_int(120));
        let saved = sector.save_position(9);

        let mut other = Sector::new(Fixed::ZERO, Fixed::ZERO);
        other.load_position(&saved);

        assert_eq!(other, sector);
    }
}
