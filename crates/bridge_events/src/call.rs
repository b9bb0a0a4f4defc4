//! Per-invocation event records.
//!
//! An [`EventCall`] can only be built through the constructors below, one
//! per event kind, so the argument tuple shape for a kind never varies at
//! runtime. Optional values are passed as [`EventArg::Nil`] in a fixed
//! position rather than being left out.

use crate::kind::EventKind;
use crate::think::ThinkInput;
use serde::Serialize;

/// One marshaled argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventArg {
    Nil,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
    Vec3([f32; 3]),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventCall {
    kind: EventKind,
    args: Vec<EventArg>,
    client: Option<i32>,
}

/// Native text is decoded permissively: invalid sequences are replaced.
fn text(raw: &[u8]) -> EventArg {
    EventArg::Text(String::from_utf8_lossy(raw).into_owned())
}

fn id(client_id: i32) -> EventArg {
    EventArg::Int(client_id.into())
}

impl EventCall {
    fn new(kind: EventKind, args: Vec<EventArg>, client: Option<i32>) -> Self {
        Self { kind, args, client }
    }

    pub fn client_command(client_id: i32, command: &[u8]) -> Self {
        Self::new(EventKind::ClientCommand, vec![id(client_id), text(command)], Some(client_id))
    }

    /// `client_id` is `None` for a broadcast to every client.
    pub fn server_command(client_id: Option<i32>, command: &[u8]) -> Self {
        let target = client_id.map(id).unwrap_or(EventArg::Nil);
        Self::new(EventKind::ServerCommand, vec![target, text(command)], client_id)
    }

    pub fn console_print(line: &[u8]) -> Self {
        Self::new(EventKind::ConsolePrint, vec![text(line)], None)
    }

    pub fn set_configstring(index: i32, value: &[u8]) -> Self {
        Self::new(EventKind::SetConfigstring, vec![EventArg::Int(index.into()), text(value)], None)
    }

    pub fn client_connect(client_id: i32, is_bot: bool) -> Self {
        Self::new(EventKind::ClientConnect, vec![id(client_id), EventArg::Bool(is_bot)], Some(client_id))
    }

    pub fn client_loaded(client_id: i32) -> Self {
        Self::new(EventKind::ClientLoaded, vec![id(client_id)], Some(client_id))
    }

    pub fn client_disconnect(client_id: i32, reason: &[u8]) -> Self {
        Self::new(EventKind::ClientDisconnect, vec![id(client_id), text(reason)], Some(client_id))
    }

    pub fn client_spawn(client_id: i32) -> Self {
        Self::new(EventKind::ClientSpawn, vec![id(client_id)], Some(client_id))
    }

    pub fn client_think(client_id: i32, input: &ThinkInput) -> Self {
        let mut args = Vec::with_capacity(12);
        args.push(id(client_id));
        args.extend(input.to_args());
        Self::new(EventKind::ClientThink, args, Some(client_id))
    }

    pub fn frame() -> Self {
        Self::new(EventKind::Frame, Vec::new(), None)
    }

    pub fn new_game(is_restart: bool) -> Self {
        Self::new(EventKind::NewGame, vec![EventArg::Bool(is_restart)], None)
    }

    /// `attacker_id` is `None` for world damage (falling, lava, triggers).
    pub fn damage(target_id: i32, attacker_id: Option<i32>, damage: i32, dflags: i32, means_of_death: i32) -> Self {
        Self::new(
            EventKind::Damage,
            vec![
                id(target_id),
                attacker_id.map(id).unwrap_or(EventArg::Nil),
                EventArg::Int(damage.into()),
                EventArg::Int(dflags.into()),
                EventArg::Int(means_of_death.into()),
            ],
            None,
        )
    }

    pub fn launch_item(classname: &[u8], origin: [f32; 3], velocity: [f32; 3]) -> Self {
        Self::new(
            EventKind::LaunchItem,
            vec![text(classname), EventArg::Vec3(origin), EventArg::Vec3(velocity)],
            None,
        )
    }

    pub fn kamikaze_use(client_id: i32) -> Self {
        Self::new(EventKind::KamikazeUse, vec![id(client_id)], Some(client_id))
    }

    pub fn kamikaze_explode(client_id: i32, is_used_on_demand: bool) -> Self {
        Self::new(
            EventKind::KamikazeExplode,
            vec![id(client_id), EventArg::Bool(is_used_on_demand)],
            Some(client_id),
        )
    }

    pub fn rcon(command: &[u8]) -> Self {
        Self::new(EventKind::Rcon, vec![text(command)], None)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn args(&self) -> &[EventArg] {
        &self.args
    }

    /// The acting client, if the event has one.
    pub fn client_id(&self) -> Option<i32> {
        self.client
    }
}
