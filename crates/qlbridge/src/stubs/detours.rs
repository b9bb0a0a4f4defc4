//! The native side of every hook.
//!
//! Each stub decodes its engine arguments, hands them to [`translate`], and
//! calls through to the original function unless a verdict says otherwise.
//! The variadic print functions enter through [`variadic`](super::variadic)
//! shims so that an unhandled call reaches the engine exactly as it was made.
//! Only the decoding and dispatch run under [`shielded`]; a call-through is
//! never wrapped, so engine behaviour is unchanged when the bridge fails.

use super::variadic::{variadic_entry, CapturedCall, RegisterFrame};
use super::{printf, translate};
use crate::app;
use crate::engine::functions::*;
use crate::engine::types::{client_id, client_number, entity_number, ClientHead, EntityHead, ItemHead, QBoolean, UserCmd};
use crate::engine::vm::{INIT_GAME_SLOT, RUN_FRAME_SLOT};
use bridge_events::{DiagnosticSink, EventKind, TracingSink};
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use translate::{ConnectAction, ServerTarget, TextAction};

/// Address that runs an original function, published once its hook is in.
pub struct CallThrough(AtomicUsize);

impl CallThrough {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn set(&self, address: usize) {
        self.0.store(address, Ordering::Release);
    }

    pub fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            address => Some(address),
        }
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

impl Default for CallThrough {
    fn default() -> Self {
        Self::new()
    }
}

/// Reinterprets a published address as the function type `F`.
macro_rules! original {
    ($slot:expr, $ty:ty) => {
        // SAFETY: the slot only ever holds the original of a function with
        // this signature.
        $slot.get().map(|address| unsafe { std::mem::transmute::<usize, $ty>(address) })
    };
}

/// Runs bridge logic, turning a panic into a diagnostic and `fallback`.
pub fn shielded<T>(context: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        TracingSink.report(context, &format!("bridge panicked: {message}"));
        fallback
    })
}

/// # Safety
/// `ptr` must be null or a NUL-terminated string that outlives `'a`.
unsafe fn c_bytes<'a>(ptr: *const c_char) -> Option<&'a [u8]> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_bytes())
}

fn read_c_string(address: usize) -> Option<Vec<u8>> {
    // SAFETY: printf arguments consumed by %s are C strings or null.
    unsafe { c_bytes(address as *const c_char) }.map(<[u8]>::to_vec)
}

const PERCENT_S: &[u8] = b"%s\0";

type ComPrintfFn = unsafe extern "C" fn(*const c_char, ...);
type CmdAddCommandFn = unsafe extern "C" fn(*const c_char, unsafe extern "C" fn());
type CmdArgsFn = unsafe extern "C" fn() -> *const c_char;
type SetModuleOffsetFn = unsafe extern "C" fn(*mut c_char, *mut c_void);
type ExecuteClientCommandFn = unsafe extern "C" fn(*mut ClientHead, *const c_char, QBoolean);
type SendServerCommandFn = unsafe extern "C" fn(*mut ClientHead, *const c_char, ...);
type ClientEnterWorldFn = unsafe extern "C" fn(*mut ClientHead, *mut UserCmd);
type SetConfigstringFn = unsafe extern "C" fn(c_int, *const c_char);
type DropClientFn = unsafe extern "C" fn(*mut ClientHead, *const c_char);
type SpawnServerFn = unsafe extern "C" fn(*mut c_char, QBoolean);
type ClientThinkFn = unsafe extern "C" fn(*mut ClientHead, *mut UserCmd);
type ClientConnectFn = unsafe extern "C" fn(c_int, QBoolean, QBoolean) -> *const c_char;
type ClientSpawnFn = unsafe extern "C" fn(*mut EntityHead);
type DamageFn = unsafe extern "C" fn(
    *mut EntityHead,
    *mut EntityHead,
    *mut EntityHead,
    *const [f32; 3],
    *const [f32; 3],
    c_int,
    c_int,
    c_int,
);
type LaunchItemFn = unsafe extern "C" fn(*const ItemHead, *const [f32; 3], *const [f32; 3]) -> *mut EntityHead;
type StartKamikazeFn = unsafe extern "C" fn(*mut EntityHead);
type InitGameFn = unsafe extern "C" fn(c_int, c_int, c_int);
type RunFrameFn = unsafe extern "C" fn(c_int);

pub static COM_PRINTF_ORIGINAL: CallThrough = CallThrough::new();
pub static CMD_ADD_COMMAND_ORIGINAL: CallThrough = CallThrough::new();
/// Not hooked, only called.
pub static CMD_ARGS_FUNCTION: CallThrough = CallThrough::new();
pub static SET_MODULE_OFFSET_ORIGINAL: CallThrough = CallThrough::new();
pub static EXECUTE_CLIENT_COMMAND_ORIGINAL: CallThrough = CallThrough::new();
pub static SEND_SERVER_COMMAND_ORIGINAL: CallThrough = CallThrough::new();
pub static CLIENT_ENTER_WORLD_ORIGINAL: CallThrough = CallThrough::new();
pub static SET_CONFIGSTRING_ORIGINAL: CallThrough = CallThrough::new();
pub static DROP_CLIENT_ORIGINAL: CallThrough = CallThrough::new();
pub static SPAWN_SERVER_ORIGINAL: CallThrough = CallThrough::new();
pub static CLIENT_THINK_ORIGINAL: CallThrough = CallThrough::new();
pub static CLIENT_CONNECT_ORIGINAL: CallThrough = CallThrough::new();
pub static CLIENT_SPAWN_ORIGINAL: CallThrough = CallThrough::new();
pub static DAMAGE_ORIGINAL: CallThrough = CallThrough::new();
pub static LAUNCH_ITEM_ORIGINAL: CallThrough = CallThrough::new();
pub static START_KAMIKAZE_ORIGINAL: CallThrough = CallThrough::new();
pub static INIT_GAME_ORIGINAL: CallThrough = CallThrough::new();
pub static RUN_FRAME_ORIGINAL: CallThrough = CallThrough::new();

/// Set while `SV_SpawnServer` runs; the frames it drives are not dispatched.
static SPAWNING: AtomicBool = AtomicBool::new(false);
static COMMANDS_REGISTERED: AtomicBool = AtomicBool::new(false);
/// `ClientConnect` returns a pointer the engine reads after we return.
static REFUSAL: Mutex<Option<std::ffi::CString>> = Mutex::new(None);

/// An inline hook: the function named `name` is redirected to `stub`.
pub struct HookBinding {
    pub name: &'static str,
    pub stub: usize,
    pub call_through: &'static CallThrough,
}

/// A pointer in the game module's VM call table.
pub struct SlotBinding {
    pub name: &'static str,
    pub offset: usize,
    pub stub: usize,
    pub call_through: &'static CallThrough,
}

pub fn engine_bindings() -> Vec<HookBinding> {
    vec![
        HookBinding {
            name: COM_PRINTF,
            stub: qlbridge_com_printf_entry as usize,
            call_through: &COM_PRINTF_ORIGINAL,
        },
        HookBinding { name: CMD_ADD_COMMAND, stub: cmd_add_command as usize, call_through: &CMD_ADD_COMMAND_ORIGINAL },
        HookBinding { name: SYS_SET_MODULE_OFFSET, stub: sys_set_module_offset as usize, call_through: &SET_MODULE_OFFSET_ORIGINAL },
        HookBinding {
            name: SV_EXECUTE_CLIENT_COMMAND,
            stub: sv_execute_client_command as usize,
            call_through: &EXECUTE_CLIENT_COMMAND_ORIGINAL,
        },
        HookBinding {
            name: SV_SEND_SERVER_COMMAND,
            stub: qlbridge_send_server_command_entry as usize,
            call_through: &SEND_SERVER_COMMAND_ORIGINAL,
        },
        HookBinding {
            name: SV_CLIENT_ENTER_WORLD,
            stub: sv_client_enter_world as usize,
            call_through: &CLIENT_ENTER_WORLD_ORIGINAL,
        },
        HookBinding { name: SV_SET_CONFIGSTRING, stub: sv_set_configstring as usize, call_through: &SET_CONFIGSTRING_ORIGINAL },
        HookBinding { name: SV_DROP_CLIENT, stub: sv_drop_client as usize, call_through: &DROP_CLIENT_ORIGINAL },
        HookBinding { name: SV_SPAWN_SERVER, stub: sv_spawn_server as usize, call_through: &SPAWN_SERVER_ORIGINAL },
        HookBinding { name: SV_CLIENT_THINK, stub: sv_client_think as usize, call_through: &CLIENT_THINK_ORIGINAL },
    ]
}

pub fn game_bindings() -> Vec<HookBinding> {
    vec![
        HookBinding { name: CLIENT_CONNECT, stub: client_connect as usize, call_through: &CLIENT_CONNECT_ORIGINAL },
        HookBinding { name: CLIENT_SPAWN, stub: client_spawn as usize, call_through: &CLIENT_SPAWN_ORIGINAL },
        HookBinding { name: G_DAMAGE, stub: g_damage as usize, call_through: &DAMAGE_ORIGINAL },
        HookBinding { name: LAUNCH_ITEM, stub: launch_item as usize, call_through: &LAUNCH_ITEM_ORIGINAL },
        HookBinding { name: G_START_KAMIKAZE, stub: g_start_kamikaze as usize, call_through: &START_KAMIKAZE_ORIGINAL },
    ]
}

pub fn slot_bindings() -> Vec<SlotBinding> {
    vec![
        SlotBinding { name: G_INIT_GAME, offset: INIT_GAME_SLOT, stub: g_init_game as usize, call_through: &INIT_GAME_ORIGINAL },
        SlotBinding { name: G_RUN_FRAME, offset: RUN_FRAME_SLOT, stub: g_run_frame as usize, call_through: &RUN_FRAME_ORIGINAL },
    ]
}

/// Stops the stubs from calling into a game module that is being replaced.
pub fn clear_game_call_throughs() {
    for binding in game_bindings() {
        binding.call_through.clear();
    }
    for binding in slot_bindings() {
        binding.call_through.clear();
    }
}

// Console commands

unsafe extern "C" fn qlx_command() {
    let Some(args) = original!(CMD_ARGS_FUNCTION, CmdArgsFn) else {
        return;
    };
    let line = c_bytes(args()).unwrap_or_default();
    shielded(RCON_CONTEXT, (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::rcon(dispatcher, line);
        }
    });
}

unsafe extern "C" fn reload_command() {
    shielded(RELOAD_COMMAND, (), app::reload);
}

const RCON_CONTEXT: &str = "rcon";
pub const RCON_COMMAND: &str = "qlx";
pub const RELOAD_COMMAND: &str = "qlbridge_reload";

// Engine hooks

variadic_entry!("qlbridge_com_printf_entry", com_printf);

extern "C" {
    fn qlbridge_com_printf_entry();
}

/// `Com_Printf(fmt, ...)`. Forwarded untouched unless a handler listens.
unsafe extern "C" fn com_printf(frame: *const RegisterFrame, stack: *const u8) -> usize {
    let Some(original) = COM_PRINTF_ORIGINAL.get() else {
        return 0;
    };
    let action = shielded("console_print", TextAction::Original, || {
        let Some(dispatcher) = app::dispatcher().filter(|d| d.is_listening(EventKind::ConsolePrint)) else {
            return TextAction::Original;
        };
        let Some(call) = CapturedCall::new(frame, stack, 1) else {
            return TextAction::Original;
        };
        let Some(format) = c_bytes(call.fixed(0) as *const c_char) else {
            return TextAction::Original;
        };
        let line = printf::render(format, &mut call.varargs(), read_c_string);
        translate::console_print(dispatcher, &line)
    });

    match action {
        TextAction::Original => original,
        TextAction::Drop => 0,
        TextAction::Replace(text) => {
            let print = std::mem::transmute::<usize, ComPrintfFn>(original);
            print(PERCENT_S.as_ptr().cast(), text.as_ptr());
            0
        }
    }
}

unsafe extern "C" fn cmd_add_command(name: *const c_char, function: unsafe extern "C" fn()) {
    let Some(original) = original!(CMD_ADD_COMMAND_ORIGINAL, CmdAddCommandFn) else {
        return;
    };

    // The first registration means the command system is up.
    if !COMMANDS_REGISTERED.swap(true, Ordering::AcqRel) {
        original(c"qlx".as_ptr(), qlx_command);
        original(c"qlbridge_reload".as_ptr(), reload_command);
        shielded("scripting", (), app::start_scripting);
    }
    original(name, function);
}

unsafe extern "C" fn sys_set_module_offset(name: *mut c_char, offset: *mut c_void) {
    let Some(original) = original!(SET_MODULE_OFFSET_ORIGINAL, SetModuleOffsetFn) else {
        return;
    };
    let is_game = c_bytes(name) == Some(b"qagame".as_slice());
    if is_game {
        clear_game_call_throughs();
    }

    original(name, offset);

    // Despite the name, `offset` is the game module's dllEntry.
    if is_game {
        shielded("game_module", (), || app::on_game_module_loaded(offset as usize));
    }
}

unsafe extern "C" fn sv_execute_client_command(client: *mut ClientHead, command: *const c_char, client_ok: QBoolean) {
    let Some(original) = original!(EXECUTE_CLIENT_COMMAND_ORIGINAL, ExecuteClientCommandFn) else {
        return;
    };
    let action = shielded("client_command", TextAction::Original, || {
        match (app::dispatcher(), c_bytes(command)) {
            (Some(dispatcher), Some(text)) => {
                translate::client_command(dispatcher, client_id(client), client_ok != 0, text)
            }
            _ => TextAction::Original,
        }
    });
    match action {
        TextAction::Drop => {}
        TextAction::Replace(text) => original(client, text.as_ptr(), client_ok),
        TextAction::Original => original(client, command, client_ok),
    }
}

variadic_entry!("qlbridge_send_server_command_entry", sv_send_server_command);

extern "C" {
    fn qlbridge_send_server_command_entry();
}

/// `SV_SendServerCommand(client, fmt, ...)`.
unsafe extern "C" fn sv_send_server_command(frame: *const RegisterFrame, stack: *const u8) -> usize {
    let Some(original) = SEND_SERVER_COMMAND_ORIGINAL.get() else {
        return 0;
    };
    let mut client: *mut ClientHead = ptr::null_mut();
    let action = shielded("server_command", TextAction::Original, || {
        let Some(dispatcher) = app::dispatcher().filter(|d| d.is_listening(EventKind::ServerCommand)) else {
            return TextAction::Original;
        };
        let Some(call) = CapturedCall::new(frame, stack, 2) else {
            return TextAction::Original;
        };
        client = call.fixed(0) as *mut ClientHead;
        let Some(format) = c_bytes(call.fixed(1) as *const c_char) else {
            return TextAction::Original;
        };
        let target = if client.is_null() {
            ServerTarget::Broadcast
        } else {
            client_id(client).map_or(ServerTarget::Unknown, ServerTarget::Client)
        };
        let line = printf::render(format, &mut call.varargs(), read_c_string);
        translate::server_command(dispatcher, target, &line)
    });

    match action {
        TextAction::Original => original,
        TextAction::Drop => 0,
        TextAction::Replace(text) => {
            let send = std::mem::transmute::<usize, SendServerCommandFn>(original);
            send(client, PERCENT_S.as_ptr().cast(), text.as_ptr());
            0
        }
    }
}

unsafe extern "C" fn sv_client_enter_world(client: *mut ClientHead, cmd: *mut UserCmd) {
    let Some(original) = original!(CLIENT_ENTER_WORLD_ORIGINAL, ClientEnterWorldFn) else {
        return;
    };
    let state_before = client.as_ref().map(|c| c.state);

    original(client, cmd);

    if let Some(state) = state_before {
        shielded("player_loaded", (), || {
            if let Some(dispatcher) = app::dispatcher() {
                translate::client_loaded(dispatcher, client_id(client), state);
            }
        });
    }
}

unsafe extern "C" fn sv_set_configstring(index: c_int, value: *const c_char) {
    let Some(original) = original!(SET_CONFIGSTRING_ORIGINAL, SetConfigstringFn) else {
        return;
    };
    let action = shielded("set_configstring", TextAction::Original, || match app::dispatcher() {
        Some(dispatcher) => translate::set_configstring(dispatcher, app::configstring_skip(), index, c_bytes(value)),
        None => TextAction::Original,
    });
    match action {
        TextAction::Drop => {}
        TextAction::Replace(text) => original(index, text.as_ptr()),
        TextAction::Original => original(index, value),
    }
}

unsafe extern "C" fn sv_drop_client(client: *mut ClientHead, reason: *const c_char) {
    let Some(original) = original!(DROP_CLIENT_ORIGINAL, DropClientFn) else {
        return;
    };
    shielded("player_disconnect", (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::client_disconnect(dispatcher, client_id(client), c_bytes(reason).unwrap_or_default());
        }
    });
    original(client, reason);
}

unsafe extern "C" fn sv_spawn_server(server: *mut c_char, kill_bots: QBoolean) {
    let Some(original) = original!(SPAWN_SERVER_ORIGINAL, SpawnServerFn) else {
        return;
    };
    SPAWNING.store(true, Ordering::Release);
    original(server, kill_bots);
    SPAWNING.store(false, Ordering::Release);

    shielded("new_game", (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::new_game(dispatcher, false);
        }
    });
}

unsafe extern "C" fn sv_client_think(client: *mut ClientHead, cmd: *mut UserCmd) {
    let Some(original) = original!(CLIENT_THINK_ORIGINAL, ClientThinkFn) else {
        return;
    };
    let Some(input) = cmd.as_ref().copied() else {
        return original(client, cmd);
    };
    let replaced = shielded("client_think", None, || {
        app::dispatcher().and_then(|dispatcher| translate::client_think(dispatcher, client_id(client), &input))
    });
    match replaced {
        Some(mut replacement) => original(client, &mut replacement),
        None => original(client, cmd),
    }
}

// Game module hooks

unsafe extern "C" fn client_connect(client_num: c_int, first_time: QBoolean, is_bot: QBoolean) -> *const c_char {
    let Some(original) = original!(CLIENT_CONNECT_ORIGINAL, ClientConnectFn) else {
        return ptr::null();
    };
    let action = shielded("player_connect", ConnectAction::Proceed, || match app::dispatcher() {
        Some(dispatcher) => translate::client_connect(dispatcher, client_num, first_time != 0, is_bot != 0),
        None => ConnectAction::Proceed,
    });
    match action {
        ConnectAction::Proceed => original(client_num, first_time, is_bot),
        ConnectAction::Refuse(message) => {
            let mut slot = REFUSAL.lock().unwrap_or_else(|e| e.into_inner());
            slot.insert(message).as_ptr()
        }
    }
}

unsafe extern "C" fn client_spawn(entity: *mut EntityHead) {
    let Some(original) = original!(CLIENT_SPAWN_ORIGINAL, ClientSpawnFn) else {
        return;
    };
    original(entity);
    shielded("player_spawn", (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::client_spawn(dispatcher, client_number(entity));
        }
    });
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn g_damage(
    target: *mut EntityHead,
    inflictor: *mut EntityHead,
    attacker: *mut EntityHead,
    dir: *const [f32; 3],
    point: *const [f32; 3],
    damage: c_int,
    dflags: c_int,
    means_of_death: c_int,
) {
    let Some(original) = original!(DAMAGE_ORIGINAL, DamageFn) else {
        return;
    };
    original(target, inflictor, attacker, dir, point, damage, dflags, means_of_death);
    shielded("damage", (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::damage(
                dispatcher,
                entity_number(target),
                entity_number(attacker),
                damage,
                dflags,
                means_of_death,
            );
        }
    });
}

unsafe extern "C" fn launch_item(
    item: *const ItemHead,
    origin: *const [f32; 3],
    velocity: *const [f32; 3],
) -> *mut EntityHead {
    let Some(original) = original!(LAUNCH_ITEM_ORIGINAL, LaunchItemFn) else {
        return ptr::null_mut();
    };
    let entity = original(item, origin, velocity);
    shielded("launch_item", (), || {
        let (Some(dispatcher), Some(item)) = (app::dispatcher(), item.as_ref()) else {
            return;
        };
        let classname = c_bytes(item.classname).unwrap_or_default();
        let origin = origin.as_ref().copied().unwrap_or_default();
        let velocity = velocity.as_ref().copied().unwrap_or_default();
        translate::launch_item(dispatcher, classname, origin, velocity);
    });
    entity
}

unsafe extern "C" fn g_start_kamikaze(entity: *mut EntityHead) {
    let Some(original) = original!(START_KAMIKAZE_ORIGINAL, StartKamikazeFn) else {
        return;
    };
    let client = client_number(entity);
    shielded("kamikaze_use", (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::kamikaze_use(dispatcher, client);
        }
    });
    original(entity);
    shielded("kamikaze_explode", (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::kamikaze_explode(dispatcher, client, true);
        }
    });
}

unsafe extern "C" fn g_init_game(level_time: c_int, random_seed: c_int, restart: c_int) {
    let Some(original) = original!(INIT_GAME_ORIGINAL, InitGameFn) else {
        return;
    };
    if restart != 0 {
        shielded("new_game", (), || {
            if let Some(dispatcher) = app::dispatcher() {
                translate::new_game(dispatcher, true);
            }
        });
    }
    original(level_time, random_seed, restart);
}

unsafe extern "C" fn g_run_frame(level_time: c_int) {
    let Some(original) = original!(RUN_FRAME_ORIGINAL, RunFrameFn) else {
        return;
    };
    shielded("frame", (), || {
        if let Some(dispatcher) = app::dispatcher() {
            translate::frame(dispatcher, SPAWNING.load(Ordering::Acquire));
        }
    });
    original(level_time);
}
