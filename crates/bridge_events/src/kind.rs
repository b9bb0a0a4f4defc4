//! The fixed set of event kinds and what each one may do.

use crate::error::EventError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ClientCommand,
    ServerCommand,
    ConsolePrint,
    SetConfigstring,
    ClientConnect,
    ClientLoaded,
    ClientDisconnect,
    ClientSpawn,
    ClientThink,
    Frame,
    NewGame,
    Damage,
    LaunchItem,
    KamikazeUse,
    KamikazeExplode,
    Rcon,
}

/// Which data a REPLACE verdict may carry for an event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceShape {
    None,
    Text,
    Think,
}

/// What a handler's return value is allowed to change.
///
/// This table is the single source of truth for verdict downgrading: a
/// verdict an event does not support is interpreted as PASSTHROUGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub suppress: bool,
    pub replace: ReplaceShape,
}

impl Capabilities {
    const NOTIFY: Self = Self {
        suppress: false,
        replace: ReplaceShape::None,
    };
    const GATE: Self = Self {
        suppress: true,
        replace: ReplaceShape::None,
    };
    const GATE_TEXT: Self = Self {
        suppress: true,
        replace: ReplaceShape::Text,
    };
    const THINK: Self = Self {
        suppress: false,
        replace: ReplaceShape::Think,
    };
}

impl EventKind {
    pub const ALL: [EventKind; 16] = [
        EventKind::ClientCommand,
        EventKind::ServerCommand,
        EventKind::ConsolePrint,
        EventKind::SetConfigstring,
        EventKind::ClientConnect,
        EventKind::ClientLoaded,
        EventKind::ClientDisconnect,
        EventKind::ClientSpawn,
        EventKind::ClientThink,
        EventKind::Frame,
        EventKind::NewGame,
        EventKind::Damage,
        EventKind::LaunchItem,
        EventKind::KamikazeUse,
        EventKind::KamikazeExplode,
        EventKind::Rcon,
    ];

    /// Name handlers register under.
    pub const fn script_name(self) -> &'static str {
        match self {
            EventKind::ClientCommand => "client_command",
            EventKind::ServerCommand => "server_command",
            EventKind::ConsolePrint => "console_print",
            EventKind::SetConfigstring => "set_configstring",
            EventKind::ClientConnect => "player_connect",
            EventKind::ClientLoaded => "player_loaded",
            EventKind::ClientDisconnect => "player_disconnect",
            EventKind::ClientSpawn => "player_spawn",
            EventKind::ClientThink => "client_think",
            EventKind::Frame => "frame",
            EventKind::NewGame => "new_game",
            EventKind::Damage => "damage",
            EventKind::LaunchItem => "launch_item",
            EventKind::KamikazeUse => "kamikaze_use",
            EventKind::KamikazeExplode => "kamikaze_explode",
            EventKind::Rcon => "rcon",
        }
    }

    pub const fn capabilities(self) -> Capabilities {
        match self {
            EventKind::ClientCommand
            | EventKind::ServerCommand
            | EventKind::ConsolePrint
            | EventKind::SetConfigstring => Capabilities::GATE_TEXT,
            EventKind::ClientConnect => Capabilities::GATE,
            EventKind::ClientThink => Capabilities::THINK,
            EventKind::ClientLoaded
            | EventKind::ClientDisconnect
            | EventKind::ClientSpawn
            | EventKind::Frame
            | EventKind::NewGame
            | EventKind::Damage
            | EventKind::LaunchItem
            | EventKind::KamikazeUse
            | EventKind::KamikazeExplode
            | EventKind::Rcon => Capabilities::NOTIFY,
        }
    }

    /// Whether the acting client is made queryable while the handler runs.
    pub const fn opens_query_window(self) -> bool {
        matches!(self, EventKind::ClientConnect | EventKind::ClientDisconnect)
    }

    pub(crate) const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.script_name()).collect()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.script_name() == name)
            .ok_or_else(|| EventError::UnknownEvent(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.script_name().parse::<EventKind>().unwrap(), kind);
        }
        assert!("player_kick".parse::<EventKind>().is_err());
    }

    #[test]
    fn bits_are_distinct() {
        let mut seen = 0u32;
        for kind in EventKind::ALL {
            assert_eq!(seen & kind.bit(), 0);
            seen |= kind.bit();
        }
    }

    #[test]
    fn only_documented_events_may_rewrite() {
        let rewriters: Vec<_> = EventKind::ALL
            .into_iter()
            .filter(|k| k.capabilities().replace != ReplaceShape::None)
            .collect();
        assert_eq!(
            rewriters,
            vec![
                EventKind::ClientCommand,
                EventKind::ServerCommand,
                EventKind::ConsolePrint,
                EventKind::SetConfigstring,
                EventKind::ClientThink,
            ]
        );
    }

    #[test]
    fn notifications_cannot_be_suppressed() {
        for kind in [
            EventKind::ClientDisconnect,
            EventKind::Frame,
            EventKind::Damage,
            EventKind::KamikazeUse,
            EventKind::KamikazeExplode,
            EventKind::NewGame,
        ] {
            assert!(!kind.capabilities().suppress, "{kind} must not be suppressible");
        }
    }
}
