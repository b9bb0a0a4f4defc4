//! What each hooked engine function does with a verdict.
//!
//! The functions here take already-decoded arguments and a [`Dispatcher`],
//! and return what the native stub should do next. Nothing in this module
//! touches raw engine memory.

use crate::engine::types::{client_state, UserCmd, MAX_CLIENTS};
use bridge_events::{Dispatcher, EventCall, Replacement, Verdict};
use std::ffi::CString;

/// Shown to a refused player when a connect handler returns `false`.
pub const BANNED_MESSAGE: &str = "You are banned from this server.";

/// Outcome for events that gate a line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextAction {
    /// Call through with the engine's own text.
    Original,
    /// Call through with this text instead.
    Replace(CString),
    /// Skip the call-through entirely.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectAction {
    Proceed,
    /// Return this message from `ClientConnect` without calling through.
    Refuse(CString),
}

/// Converts handler text for the engine. C strings end at the first NUL, so
/// anything after one is dropped.
pub fn c_text(text: String) -> CString {
    let mut bytes = text.into_bytes();
    if let Some(nul) = bytes.iter().position(|&b| b == 0) {
        bytes.truncate(nul);
    }
    CString::new(bytes).unwrap_or_default()
}

fn text_action(verdict: Verdict) -> TextAction {
    match verdict {
        Verdict::Passthrough => TextAction::Original,
        Verdict::Suppress => TextAction::Drop,
        Verdict::Replace(Replacement::Text(text)) => TextAction::Replace(c_text(text)),
        Verdict::Replace(Replacement::Think(_)) => TextAction::Original,
    }
}

/// `client` is `None` when the client has no game entity yet.
pub fn client_command(dispatcher: &dyn Dispatcher, client: Option<i32>, client_ok: bool, command: &[u8]) -> TextAction {
    match client {
        Some(id) if client_ok => text_action(dispatcher.dispatch(EventCall::client_command(id, command))),
        _ => TextAction::Original,
    }
}

/// Recipient of a server command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTarget {
    Broadcast,
    Client(i32),
    /// A client pointer we could not resolve to an id.
    Unknown,
}

pub fn server_command(dispatcher: &dyn Dispatcher, target: ServerTarget, command: &[u8]) -> TextAction {
    let call = match target {
        ServerTarget::Broadcast => EventCall::server_command(None, command),
        ServerTarget::Client(id) => EventCall::server_command(Some(id), command),
        ServerTarget::Unknown => return TextAction::Original,
    };
    text_action(dispatcher.dispatch(call))
}

pub fn console_print(dispatcher: &dyn Dispatcher, line: &[u8]) -> TextAction {
    text_action(dispatcher.dispatch(EventCall::console_print(line)))
}

/// Indices in `skip` are written every frame and are never dispatched. A
/// null value is presented as the empty string.
pub fn set_configstring(dispatcher: &dyn Dispatcher, skip: &[i32], index: i32, value: Option<&[u8]>) -> TextAction {
    if skip.contains(&index) {
        return TextAction::Original;
    }
    text_action(dispatcher.dispatch(EventCall::set_configstring(index, value.unwrap_or_default())))
}

/// Only first-time connections are dispatched, and bots are never refused.
pub fn client_connect(dispatcher: &dyn Dispatcher, client_id: i32, first_time: bool, is_bot: bool) -> ConnectAction {
    if !first_time {
        return ConnectAction::Proceed;
    }
    match dispatcher.dispatch(EventCall::client_connect(client_id, is_bot)) {
        Verdict::Suppress if !is_bot => ConnectAction::Refuse(c_text(BANNED_MESSAGE.to_string())),
        _ => ConnectAction::Proceed,
    }
}

/// Dispatched after the engine has entered the client into the world, and
/// only when it was primed beforehand (a first entry, not a map change).
pub fn client_loaded(dispatcher: &dyn Dispatcher, client: Option<i32>, state_before: i32) {
    if let Some(id) = client.filter(|_| state_before == client_state::PRIMED) {
        dispatcher.dispatch(EventCall::client_loaded(id));
    }
}

pub fn client_disconnect(dispatcher: &dyn Dispatcher, client: Option<i32>, reason: &[u8]) {
    if let Some(id) = client {
        dispatcher.dispatch(EventCall::client_disconnect(id, reason));
    }
}

pub fn client_spawn(dispatcher: &dyn Dispatcher, client: Option<i32>) {
    if let Some(id) = client {
        dispatcher.dispatch(EventCall::client_spawn(id));
    }
}

/// Returns the command to write back when a handler replaced it.
pub fn client_think(dispatcher: &dyn Dispatcher, client: Option<i32>, cmd: &UserCmd) -> Option<UserCmd> {
    let id = client?;
    match dispatcher.dispatch(EventCall::client_think(id, &cmd.to_think())) {
        Verdict::Replace(Replacement::Think(input)) => Some(UserCmd::from_think(&input)),
        _ => None,
    }
}

/// Frames run while a map is spawning are not dispatched.
pub fn frame(dispatcher: &dyn Dispatcher, spawning: bool) {
    if !spawning {
        dispatcher.dispatch(EventCall::frame());
    }
}

pub fn new_game(dispatcher: &dyn Dispatcher, is_restart: bool) {
    dispatcher.dispatch(EventCall::new_game(is_restart));
}

/// `target` is the damaged entity's number; `attacker` is dropped to nil
/// unless it is a player.
pub fn damage(
    dispatcher: &dyn Dispatcher,
    target: Option<i32>,
    attacker: Option<i32>,
    amount: i32,
    dflags: i32,
    means_of_death: i32,
) {
    let Some(target) = target else {
        return;
    };
    let attacker = attacker.filter(|n| (0..MAX_CLIENTS).contains(n));
    dispatcher.dispatch(EventCall::damage(target, attacker, amount, dflags, means_of_death));
}

pub fn launch_item(dispatcher: &dyn Dispatcher, classname: &[u8], origin: [f32; 3], velocity: [f32; 3]) {
    dispatcher.dispatch(EventCall::launch_item(classname, origin, velocity));
}

pub fn kamikaze_use(dispatcher: &dyn Dispatcher, client: Option<i32>) {
    if let Some(id) = client {
        dispatcher.dispatch(EventCall::kamikaze_use(id));
    }
}

pub fn kamikaze_explode(dispatcher: &dyn Dispatcher, client: Option<i32>, is_used_on_demand: bool) {
    if let Some(id) = client {
        dispatcher.dispatch(EventCall::kamikaze_explode(id, is_used_on_demand));
    }
}

pub fn rcon(dispatcher: &dyn Dispatcher, command: &[u8]) {
    dispatcher.dispatch(EventCall::rcon(command));
}
