//! Engine data layouts the stubs read.
//!
//! Only the prefixes the bridge touches are declared; everything past them
//! is reached through pointers and never sized by us.

use bridge_events::ThinkInput;
use std::os::raw::{c_char, c_int};

pub const MAX_CLIENTS: i32 = 64;
pub const MAX_INFO_STRING: usize = 1024;
pub const MAX_STRING_CHARS: usize = 1024;
pub const MAX_RELIABLE_COMMANDS: usize = 64;

pub type QBoolean = c_int;

/// `clientState_t`
pub mod client_state {
    pub const FREE: i32 = 0;
    pub const ZOMBIE: i32 = 1;
    pub const CONNECTED: i32 = 2;
    pub const PRIMED: i32 = 3;
    pub const ACTIVE: i32 = 4;
}

/// `usercmd_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCmd {
    pub server_time: c_int,
    pub angles: [c_int; 3],
    pub buttons: c_int,
    pub weapon: u8,
    pub weapon_primary: u8,
    pub fov: u8,
    pub forwardmove: i8,
    pub rightmove: i8,
    pub upmove: i8,
}

/// Leading fields of `client_t`, up to the game entity pointer.
#[repr(C)]
pub struct ClientHead {
    pub state: c_int,
    pub userinfo: [c_char; MAX_INFO_STRING],
    pub reliable_commands: [[c_char; MAX_STRING_CHARS]; MAX_RELIABLE_COMMANDS],
    pub reliable_sequence: c_int,
    pub reliable_acknowledge: c_int,
    pub reliable_sent: c_int,
    pub message_acknowledge: c_int,
    pub gamestate_message_num: c_int,
    pub challenge: c_int,
    pub last_usercmd: UserCmd,
    pub last_message_num: c_int,
    pub last_client_command: c_int,
    pub last_client_command_string: [c_char; MAX_STRING_CHARS],
    pub gentity: *mut EntityHead,
}

/// Leading field of `gentity_t`: `s.number`.
#[repr(C)]
pub struct EntityHead {
    pub number: c_int,
}

/// Leading field of `gitem_t`.
#[repr(C)]
pub struct ItemHead {
    pub classname: *const c_char,
}

pub fn short_to_angle(x: c_int) -> f32 {
    (x as f32) * (360.0 / 65536.0)
}

pub fn angle_to_short(x: f32) -> c_int {
    ((x * (65536.0 / 360.0)) as c_int) & 65535
}

impl UserCmd {
    pub fn to_think(&self) -> ThinkInput {
        ThinkInput {
            server_time: self.server_time,
            pitch: short_to_angle(self.angles[0]),
            yaw: short_to_angle(self.angles[1]),
            roll: short_to_angle(self.angles[2]),
            buttons: self.buttons,
            weapon: self.weapon,
            weapon_primary: self.weapon_primary,
            fov: self.fov,
            forwardmove: self.forwardmove,
            rightmove: self.rightmove,
            upmove: self.upmove,
        }
    }

    pub fn from_think(input: &ThinkInput) -> Self {
        Self {
            server_time: input.server_time,
            angles: [
                angle_to_short(input.pitch),
                angle_to_short(input.yaw),
                angle_to_short(input.roll),
            ],
            buttons: input.buttons,
            weapon: input.weapon,
            weapon_primary: input.weapon_primary,
            fov: input.fov,
            forwardmove: input.forwardmove,
            rightmove: input.rightmove,
            upmove: input.upmove,
        }
    }
}

/// Entity number of a game entity, if the pointer is set.
///
/// # Safety
/// `entity` must be null or point at a live `gentity_t`.
pub unsafe fn entity_number(entity: *const EntityHead) -> Option<i32> {
    entity.as_ref().map(|e| e.number)
}

/// Client number of an entity that belongs to a player.
///
/// # Safety
/// Same as [`entity_number`].
pub unsafe fn client_number(entity: *const EntityHead) -> Option<i32> {
    entity_number(entity).filter(|n| (0..MAX_CLIENTS).contains(n))
}

/// Client number of a `client_t`, through its game entity.
///
/// # Safety
/// `client` must be null or point at a live `client_t`.
pub unsafe fn client_id(client: *const ClientHead) -> Option<i32> {
    client.as_ref().and_then(|c| client_number(c.gentity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn usercmd_layout() {
        assert_eq!(size_of::<UserCmd>(), 28);
        assert_eq!(offset_of!(UserCmd, weapon), 20);
        assert_eq!(offset_of!(UserCmd, upmove), 25);
    }

    #[test]
    fn client_head_reaches_gentity() {
        let before_ptr = 4 + MAX_INFO_STRING + MAX_STRING_CHARS * MAX_RELIABLE_COMMANDS + 6 * 4 + 28 + 2 * 4 + MAX_STRING_CHARS;
        let aligned = before_ptr.next_multiple_of(std::mem::align_of::<usize>());
        assert_eq!(offset_of!(ClientHead, gentity), aligned);
    }

    #[test]
    fn angles_convert_in_both_directions() {
        assert_eq!(short_to_angle(16384), 90.0);
        assert_eq!(angle_to_short(90.0), 16384);
        assert_eq!(angle_to_short(-90.0), 49152);
        assert_eq!(angle_to_short(360.0), 0);
    }

    #[test]
    fn think_round_trip_keeps_representable_angles() {
        let cmd = UserCmd {
            server_time: 1200,
            angles: [0, 16384, 32768],
            buttons: 1,
            weapon: 7,
            fov: 100,
            forwardmove: 127,
            upmove: -127,
            ..Default::default()
        };
        let think = cmd.to_think();
        assert_eq!(think.yaw, 90.0);
        assert_eq!(think.roll, 180.0);
        assert_eq!(UserCmd::from_think(&think), cmd);
    }

    #[test]
    fn client_ids_come_from_the_entity() {
        let mut player = EntityHead { number: 5 };
        let mut world = EntityHead { number: 1022 };
        unsafe {
            assert_eq!(client_number(&mut player), Some(5));
            assert_eq!(client_number(&mut world), None);
            assert_eq!(entity_number(&mut world), Some(1022));
            assert_eq!(client_number(std::ptr::null()), None);
        }
    }
}
