//! Signatures of the engine and game functions the bridge needs.
//!
//! `patch_len` is the length of the instruction-aligned prologue span an
//! inline hook replaces; none of these spans contains RIP-relative
//! operands. Functions that are only called, never hooked, use 0.

use bridge_hooks::FunctionSpec;

pub const COM_PRINTF: &str = "Com_Printf";
pub const CMD_ADD_COMMAND: &str = "Cmd_AddCommand";
pub const CMD_ARGS: &str = "Cmd_Args";
pub const SYS_SET_MODULE_OFFSET: &str = "Sys_SetModuleOffset";
pub const SV_EXECUTE_CLIENT_COMMAND: &str = "SV_ExecuteClientCommand";
pub const SV_SEND_SERVER_COMMAND: &str = "SV_SendServerCommand";
pub const SV_CLIENT_ENTER_WORLD: &str = "SV_ClientEnterWorld";
pub const SV_SET_CONFIGSTRING: &str = "SV_SetConfigstring";
pub const SV_DROP_CLIENT: &str = "SV_DropClient";
pub const SV_SPAWN_SERVER: &str = "SV_SpawnServer";
pub const SV_CLIENT_THINK: &str = "SV_ClientThink";

pub const CLIENT_CONNECT: &str = "ClientConnect";
pub const CLIENT_SPAWN: &str = "ClientSpawn";
pub const G_DAMAGE: &str = "G_Damage";
pub const LAUNCH_ITEM: &str = "LaunchItem";
pub const G_START_KAMIKAZE: &str = "G_StartKamikaze";
pub const G_INIT_GAME: &str = "G_InitGame";
pub const G_RUN_FRAME: &str = "G_RunFrame";

#[cfg(target_arch = "x86_64")]
pub const ENGINE_FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        name: COM_PRINTF,
        pattern: Some("41 54 55 53 48 81 EC ?? ?? ?? ?? 84 C0 48 89 B4 24 ?? ?? ?? ?? 48 89 94 24 ?? ?? ?? ?? 48 89 8C 24 ?? ?? ?? ?? 4C 89 84 24 ?? ?? ?? ??"),
        patch_len: 21,
    },
    FunctionSpec {
        name: CMD_ADD_COMMAND,
        pattern: Some("41 55 49 89 F5 41 54 49 89 FC 55 53 48 83 EC ?? 48 8B 1D ?? ?? ?? ?? 48 85 DB 75 ?? EB ?? 66 90 48 8B 1B 48 85 DB 74 ?? 48 8B 73 ?? 4C 89 E7"),
        patch_len: 16,
    },
    FunctionSpec {
        name: CMD_ARGS,
        pattern: Some("8B 05 ?? ?? ?? ?? C6 05 ?? ?? ?? ?? ?? 83 F8 ?? 0F 8E ?? ?? ?? ?? 41 54 44 8D 60 ?? 83 E8 ?? 55 48 8D 68 ?? 53 31 DB 66 0F 1F 84 ?? ?? ?? ?? ??"),
        patch_len: 0,
    },
    FunctionSpec {
        name: SYS_SET_MODULE_OFFSET,
        pattern: Some("55 48 89 F2 31 C0 48 89 F5 48 89 FE 53 48 89 FB BF ?? ?? ?? ?? 48 83 EC ?? E8 ?? ?? ?? ?? BF ?? ?? ?? ?? B9 ?? ?? ?? ?? 48 89 DE F3 A6 74 ??"),
        patch_len: 16,
    },
    FunctionSpec {
        name: SV_EXECUTE_CLIENT_COMMAND,
        pattern: Some("41 55 41 89 D5 41 54 49 89 FC 48 89 F7 55 BD ?? ?? ?? ?? 53 48 83 EC ?? E8 ?? ?? ?? ?? 48 8B 1D ?? ?? ?? ?? 48 85 DB 75 ?? E9 ?? ?? ?? ?? 66 90"),
        patch_len: 14,
    },
    FunctionSpec {
        name: SV_SEND_SERVER_COMMAND,
        pattern: Some("41 55 41 54 55 48 89 FD 53 48 81 EC ?? ?? ?? ?? 84 C0 48 89 94 24 ?? ?? ?? ?? 48 89 8C 24 ?? ?? ?? ?? 4C 89 84 24 ?? ?? ?? ?? 4C 89 8C 24 ?? ?? ?? ??"),
        patch_len: 16,
    },
    FunctionSpec {
        name: SV_CLIENT_ENTER_WORLD,
        pattern: Some("41 55 31 C0 49 BD ?? ?? ?? ?? ?? ?? ?? ?? 41 54 49 89 F4 48 8D B7 ?? ?? ?? ?? 55 53 48 89 FB BF ?? ?? ?? ?? 48 89 DD 48 83 EC ?? E8 ?? ?? ?? ??"),
        patch_len: 14,
    },
    FunctionSpec {
        name: SV_SET_CONFIGSTRING,
        pattern: Some("41 57 41 56 41 55 41 54 41 89 FC 55 53 48 81 EC ?? ?? ?? ?? 64 48 8B 04 25 ?? ?? ?? ?? 48 89 84 24 ?? ?? ?? ?? 31 C0 81 FF ?? ?? ?? ?? 48 89 74 24 ??"),
        patch_len: 20,
    },
    FunctionSpec {
        name: SV_DROP_CLIENT,
        pattern: Some("41 54 55 48 89 FD 53 48 83 EC ?? 83 3F ?? 0F 84 ?? ?? ?? ?? 48 8B 87 ?? ?? ?? ?? 49 89 F4 48 85 C0 74 ?? F6 80 E0 01 00 00 00 75 ?? BB ?? ?? ?? ??"),
        patch_len: 14,
    },
    FunctionSpec {
        name: SV_SPAWN_SERVER,
        pattern: Some("41 55 41 54 41 89 F4 55 48 89 FD 53 48 81 EC ?? ?? ?? ?? 64 48 8B 04 25 ?? ?? ?? ?? 48 89 84 24 ?? ?? ?? ?? 31 C0 E8 ?? ?? ?? ?? 31 C0 BF ?? ?? ?? ??"),
        patch_len: 19,
    },
    FunctionSpec {
        name: SV_CLIENT_THINK,
        pattern: None,
        patch_len: 14,
    },
];

#[cfg(target_arch = "x86_64")]
pub const GAME_FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        name: CLIENT_CONNECT,
        pattern: Some("41 57 4C 63 FF 41 56 41 89 F6 41 55 41 54 55 4C 89 FD 48 C1 E5 ?? 53 89 FB 48 81 EC ?? ?? ?? ?? 4C 8B 2D ?? ?? ?? ?? 64 48 8B 04 25 ?? ?? ?? ??"),
        patch_len: 14,
    },
    FunctionSpec {
        name: CLIENT_SPAWN,
        pattern: Some("41 57 41 56 49 89 FE 41 55 41 54 55 53 48 81 EC ?? ?? ?? ?? 4C 8B BF ?? ?? ?? ?? 64 48 8B 04 25 ?? ?? ?? ?? 48 89 84 24 ?? ?? ?? ?? 31 C0"),
        patch_len: 20,
    },
    FunctionSpec {
        name: G_DAMAGE,
        pattern: Some("41 57 41 56 41 55 41 54 55 53 48 89 FB 48 81 EC ?? ?? ?? ?? 44 8B 97 ?? ?? ?? ?? 48 8B AF ?? ?? ?? ?? 64 48 8B 04 25 ?? ?? ?? ??"),
        patch_len: 20,
    },
    FunctionSpec {
        name: LAUNCH_ITEM,
        pattern: None,
        patch_len: 14,
    },
    FunctionSpec {
        name: G_START_KAMIKAZE,
        pattern: None,
        patch_len: 14,
    },
];

// 32-bit builds carry no known signatures; everything resolves through the
// offset table.
#[cfg(not(target_arch = "x86_64"))]
pub const ENGINE_FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec { name: COM_PRINTF, pattern: None, patch_len: 5 },
    FunctionSpec { name: CMD_ADD_COMMAND, pattern: None, patch_len: 5 },
    FunctionSpec { name: CMD_ARGS, pattern: None, patch_len: 0 },
    FunctionSpec { name: SYS_SET_MODULE_OFFSET, pattern: None, patch_len: 5 },
    FunctionSpec { name: SV_EXECUTE_CLIENT_COMMAND, pattern: None, patch_len: 5 },
    FunctionSpec { name: SV_SEND_SERVER_COMMAND, pattern: None, patch_len: 5 },
    FunctionSpec { name: SV_CLIENT_ENTER_WORLD, pattern: None, patch_len: 5 },
    FunctionSpec { name: SV_SET_CONFIGSTRING, pattern: None, patch_len: 5 },
    FunctionSpec { name: SV_DROP_CLIENT, pattern: None, patch_len: 5 },
    FunctionSpec { name: SV_SPAWN_SERVER, pattern: None, patch_len: 5 },
    FunctionSpec { name: SV_CLIENT_THINK, pattern: None, patch_len: 5 },
];

#[cfg(not(target_arch = "x86_64"))]
pub const GAME_FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec { name: CLIENT_CONNECT, pattern: None, patch_len: 5 },
    FunctionSpec { name: CLIENT_SPAWN, pattern: None, patch_len: 5 },
    FunctionSpec { name: G_DAMAGE, pattern: None, patch_len: 5 },
    FunctionSpec { name: LAUNCH_ITEM, pattern: None, patch_len: 5 },
    FunctionSpec { name: G_START_KAMIKAZE, pattern: None, patch_len: 5 },
];
