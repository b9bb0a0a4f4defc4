//! Process lifecycle of the injected library.
//!
//! Loading happens in three steps, each driven by the engine itself:
//!
//! 1. The library constructor resolves and hooks the engine functions.
//! 2. The engine's first `Cmd_AddCommand` means its command system is up;
//!    the bridge registers its console commands and starts scripting.
//! 3. Every `Sys_SetModuleOffset("qagame", ..)` means a game module was
//!    (re)loaded; its functions and call table are hooked afresh.

use crate::config::BridgeConfig;
use crate::engine::functions::{CMD_ARGS, ENGINE_FUNCTIONS, GAME_FUNCTIONS};
use crate::engine::vm;
use crate::error::BridgeError;
use crate::logging::setup_logging;
use crate::stubs::detours::{self, HookBinding, CMD_ARGS_FUNCTION, RCON_COMMAND, RELOAD_COMMAND};
use bridge_events::{DiagnosticSink, Dispatcher, TracingSink};
use bridge_hooks::maps::current_process_maps;
use bridge_hooks::{
    BuildId, CodeMemory, FunctionLocator, FunctionSpec, HookInstaller, ModuleDescriptor, ProcessMemory, ResolvedTable,
};
use once_cell::sync::OnceCell;
use script_runtime::ScriptHost;
use std::sync::Mutex;
use tracing::{error, info, warn};

pub struct BridgeState {
    config: BridgeConfig,
    installer: HookInstaller<ProcessMemory>,
    /// The game module currently hooked, if any.
    game_module: Mutex<Option<ModuleDescriptor>>,
    host: OnceCell<ScriptHost>,
}

static STATE: OnceCell<BridgeState> = OnceCell::new();

/// Whether the current executable is the one the bridge should hook.
pub fn is_target_process(process_name: &str) -> bool {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|name| name == process_name))
        .unwrap_or(false)
}

/// Library constructor entry point. Any failure leaves the server running
/// unhooked.
pub fn on_library_load() {
    let config = BridgeConfig::load_or_default(&BridgeConfig::default_path());
    if !is_target_process(&config.hooks.process_name) {
        return;
    }

    setup_logging(&config.logging, config.logging.json_format);
    info!("🚀 qlbridge {} loading", env!("CARGO_PKG_VERSION"));

    if let Err(e) = initialize(config) {
        error!("❌ Bridge initialization failed, server continues unhooked: {}", e);
        TracingSink.report("initialization", &e.to_string());
    }
}

fn initialize(config: BridgeConfig) -> Result<(), BridgeError> {
    let state = BridgeState {
        config,
        installer: HookInstaller::new(ProcessMemory),
        game_module: Mutex::new(None),
        host: OnceCell::new(),
    };
    let state = match STATE.try_insert(state) {
        Ok(state) => state,
        Err(_) => {
            warn!("⚠️ Bridge already initialized");
            return Ok(());
        }
    };

    let module = ModuleDescriptor::locate(&state.config.hooks.process_name)?;
    info!("📦 Engine image {} at {:#x} (+{:#x})", module.path, module.base, module.size);

    let table = resolve(state, &module, ENGINE_FUNCTIONS)?;
    if let Some(address) = table.address(CMD_ARGS) {
        CMD_ARGS_FUNCTION.set(address);
    }
    let installed = install_bindings(state, &table, &detours::engine_bindings());
    info!("✅ {} engine hooks installed, {} unresolved", installed, table.missing.len());
    Ok(())
}

/// Scans `module` for `specs`, falling back to the configured offsets for
/// the module's build.
fn resolve(state: &BridgeState, module: &ModuleDescriptor, specs: &[FunctionSpec]) -> Result<ResolvedTable, BridgeError> {
    let code = state.installer.memory().read(module.base, module.size)?;
    let build = match BuildId::from_file(&module.path) {
        Ok(build) => {
            info!("🔖 Build {} for {}", build.as_str(), module.path);
            Some(build)
        }
        Err(e) => {
            warn!("⚠️ No build id for {}: {}", module.path, e);
            None
        }
    };

    let table = FunctionLocator::new(module, &code, build.as_ref(), &state.config.hooks.offsets).locate_all(specs);
    for name in &table.missing {
        TracingSink.report(name, "function not found; its events will not fire");
    }
    Ok(table)
}

/// Installs every binding whose function resolved and is not disabled, and
/// publishes the call-through addresses. Returns the number installed.
fn install_bindings(state: &BridgeState, table: &ResolvedTable, bindings: &[HookBinding]) -> usize {
    let mut installed = 0;
    for binding in bindings {
        if state.config.hooks.is_disabled(binding.name) {
            info!("⏭️ {} disabled by configuration", binding.name);
            continue;
        }
        let Some(resolution) = table.get(binding.name) else {
            continue;
        };
        match state.installer.install(resolution.address, binding.stub, resolution.patch_len) {
            Ok(record) => {
                binding.call_through.set(record.call_through());
                installed += 1;
            }
            Err(e) => {
                error!("❌ Failed to hook {}: {}", binding.name, e);
                TracingSink.report(binding.name, &e.to_string());
            }
        }
    }
    installed
}

/// Called once the engine has registered a game module. `dll_entry` is the
/// module's `dllEntry` export.
pub fn on_game_module_loaded(dll_entry: usize) {
    let Some(state) = STATE.get() else {
        return;
    };
    if let Err(e) = hook_game_module(state, dll_entry) {
        error!("❌ Game module hooks failed: {}", e);
        TracingSink.report("game_module", &e.to_string());
    }
}

fn hook_game_module(state: &BridgeState, dll_entry: usize) -> Result<(), BridgeError> {
    let module = ModuleDescriptor::containing(&current_process_maps()?, dll_entry)?;
    if !module.path.ends_with(&state.config.hooks.game_module) {
        warn!("⚠️ Game module {} is not the configured {}", module.path, state.config.hooks.game_module);
    }

    let mut current = state.game_module.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(previous) = current.take() {
        let forgotten = state.installer.forget_range(previous.image_base, previous.image_end);
        info!("🧹 Forgot {} hooks of the previous game module", forgotten);
    }

    let table = resolve(state, &module, GAME_FUNCTIONS)?;
    let installed = install_bindings(state, &table, &detours::game_bindings());

    let call_table = vm::call_table(state.installer.memory(), dll_entry)?;
    let mut slots = 0;
    for binding in detours::slot_bindings() {
        if state.config.hooks.is_disabled(binding.name) {
            continue;
        }
        match state.installer.install_slot(call_table + binding.offset, binding.stub) {
            Ok(record) => {
                binding.call_through.set(record.call_through());
                slots += 1;
            }
            Err(e) => {
                error!("❌ Failed to hook {}: {}", binding.name, e);
                TracingSink.report(binding.name, &e.to_string());
            }
        }
    }

    info!(
        "🎮 Game module {} hooked: {} functions, {} call table slots",
        module.path, installed, slots
    );
    *current = Some(module);
    Ok(())
}

/// Builds the script host and, unless disabled, loads the scripts.
pub fn start_scripting() {
    let Some(state) = STATE.get() else {
        return;
    };
    let host = match state
        .host
        .get_or_try_init(|| ScriptHost::new(state.config.script_settings(), state.config.bridge_settings()))
    {
        Ok(host) => host,
        Err(e) => {
            error!("❌ Failed to start scripting: {}", e);
            TracingSink.report("scripting", &e.to_string());
            return;
        }
    };
    info!("🧩 Console commands: {}, {}", RCON_COMMAND, RELOAD_COMMAND);

    if !state.config.scripts.auto_load {
        info!("Script auto-load disabled; use {} to load", RELOAD_COMMAND);
        return;
    }
    match host.load_directory() {
        Ok(report) => info!(
            "📜 Loaded {}/{} scripts from {}",
            report.loaded,
            report.discovered,
            host.settings().directory.display()
        ),
        Err(e) => error!("❌ Failed to load scripts: {}", e),
    }
}

/// Tears down and rebuilds the scripting layer.
pub fn reload() {
    let Some(state) = STATE.get() else {
        return;
    };
    let Some(host) = state.host.get() else {
        start_scripting();
        return;
    };
    match host.reinitialize() {
        Ok(report) => info!("🔄 Scripts reloaded: {}/{}", report.loaded, report.discovered),
        Err(e) => {
            error!("❌ Reload failed: {}", e);
            TracingSink.report("reload", &e.to_string());
        }
    }
}

/// The dispatcher stubs consult, once scripting is up.
pub fn dispatcher() -> Option<&'static dyn Dispatcher> {
    let host = STATE.get()?.host.get()?;
    let bridge: &'static dyn Dispatcher = &**host.bridge();
    Some(bridge)
}

pub fn configstring_skip() -> &'static [i32] {
    STATE
        .get()
        .map(|state| state.config.dispatch.configstring_skip.as_slice())
        .unwrap_or(&[])
}
