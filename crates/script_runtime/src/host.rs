//! Lifecycle of the scripting layer: building the bridge, loading scripts,
//! and tearing everything down for a reinitialize.

use crate::error::ScriptError;
use crate::runtime::LuaRuntime;
use bridge_events::{
    BridgeSettings, DiagnosticSink, EventBridge, EventCall, HandlerRegistry, QueryableClient, TracingSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    pub directory: PathBuf,
    /// Loaded before every other script when present.
    pub entry: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("scripts"),
            entry: "init.lua".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub discovered: usize,
    pub loaded: usize,
    pub failed: Vec<PathBuf>,
}

pub struct ScriptHost {
    bridge: Arc<EventBridge<LuaRuntime>>,
    settings: ScriptSettings,
}

impl ScriptHost {
    pub fn new(settings: ScriptSettings, bridge_settings: BridgeSettings) -> Result<Self, ScriptError> {
        Self::with_sink(settings, bridge_settings, Arc::new(TracingSink))
    }

    pub fn with_sink(
        settings: ScriptSettings,
        bridge_settings: BridgeSettings,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ScriptError> {
        let registry = Arc::new(HandlerRegistry::new());
        let queryable = Arc::new(QueryableClient::new());
        let runtime = LuaRuntime::new(Arc::clone(&registry), Arc::clone(&queryable))?;
        let bridge = EventBridge::with_sink(runtime, registry, queryable, bridge_settings, sink);
        Ok(Self {
            bridge: Arc::new(bridge),
            settings,
        })
    }

    pub fn bridge(&self) -> &Arc<EventBridge<LuaRuntime>> {
        &self.bridge
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.settings
    }

    /// Loads every script in the configured directory.
    ///
    /// A missing directory is not an error; a script that fails to load is
    /// logged and skipped.
    pub fn load_directory(&self) -> Result<LoadReport, ScriptError> {
        self.bridge.with_runtime(|runtime| load_scripts(runtime, &self.settings))?
    }

    /// Replaces the Lua state and every registered handler, reloads the
    /// scripts, then replays `new_game(false)` so scripts can pick up a game
    /// that is already running.
    pub fn reinitialize(&self) -> Result<LoadReport, ScriptError> {
        info!("🔄 Reinitializing scripting runtime");
        let report = self.bridge.with_runtime(|runtime| {
            let registry = self.bridge.registry();
            registry.clear();
            *runtime = LuaRuntime::new(Arc::clone(registry), Arc::clone(self.bridge.queryable()))?;
            load_scripts(runtime, &self.settings)
        })??;

        self.bridge.dispatch(EventCall::new_game(false));
        Ok(report)
    }

    /// Drops every handler; later events short-circuit.
    pub fn shutdown(&self) -> Result<(), ScriptError> {
        self.bridge.with_runtime(|_| self.bridge.registry().clear())?;
        info!("🛑 Scripting runtime shut down");
        Ok(())
    }
}

fn load_scripts(runtime: &LuaRuntime, settings: &ScriptSettings) -> Result<LoadReport, ScriptError> {
    let dir = settings.directory.as_path();
    if !dir.exists() {
        warn!("Script directory does not exist: {}", dir.display());
        return Ok(LoadReport::default());
    }

    info!("📜 Loading scripts from: {}", dir.display());
    let files = discover_script_files(dir, &settings.entry)?;
    let mut report = LoadReport {
        discovered: files.len(),
        ..Default::default()
    };

    for file in files {
        match runtime.exec_file(&file) {
            Ok(()) => {
                info!("✅ Loaded script: {}", file.display());
                report.loaded += 1;
            }
            Err(e) => {
                error!("❌ Failed to load script {}: {}", file.display(), e);
                report.failed.push(file);
            }
        }
    }

    info!(
        "🎉 Script loading complete: {}/{} scripts loaded",
        report.loaded, report.discovered
    );
    Ok(report)
}

/// `*.lua` files in `dir`, the entry script first and the rest sorted by name.
pub fn discover_script_files(dir: &Path, entry: &str) -> Result<Vec<PathBuf>, ScriptError> {
    if !dir.is_dir() {
        return Err(ScriptError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "lua") {
            files.push(path);
        }
    }
    files.sort();
    if let Some(pos) = files.iter().position(|p| p.file_name().is_some_and(|n| n == entry)) {
        let first = files.remove(pos);
        files.insert(0, first);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_events::{CollectingSink, EventKind, Verdict};
    use std::fs;
    use tempfile::TempDir;

    fn host_for(dir: &TempDir) -> (ScriptHost, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let settings = ScriptSettings {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let host = ScriptHost::with_sink(settings, BridgeSettings::default(), sink.clone()).unwrap();
        (host, sink)
    }

    #[test]
    fn entry_script_is_loaded_first() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.lua"), "").unwrap();
        fs::write(dir.path().join("init.lua"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = discover_script_files(dir.path(), "init.lua").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["init.lua", "a.lua"]);
    }

    #[test]
    fn broken_script_does_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a_broken.lua"), "this is not lua").unwrap();
        fs::write(
            dir.path().join("b_ok.lua"),
            "qlbridge.register_handler('client_command', function() return false end)",
        )
        .unwrap();
        let (host, _) = host_for(&dir);

        let report = host.load_directory().unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(
            host.bridge().dispatch(EventCall::client_command(0, b"kill")),
            Verdict::Suppress
        );
    }

    #[test]
    fn missing_directory_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let settings = ScriptSettings {
            directory: dir.path().join("absent"),
            ..Default::default()
        };
        let host = ScriptHost::new(settings, BridgeSettings::default()).unwrap();
        assert_eq!(host.load_directory().unwrap(), LoadReport::default());
    }

    #[test]
    fn connect_ban_scenario() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("init.lua"),
            r#"
            qlbridge.register_handler('player_connect', function(client_id, is_bot)
                return client_id ~= 3
            end)
            "#,
        )
        .unwrap();
        let (host, _) = host_for(&dir);
        host.load_directory().unwrap();

        assert_eq!(host.bridge().dispatch(EventCall::client_connect(3, false)), Verdict::Suppress);
        assert_eq!(host.bridge().dispatch(EventCall::client_connect(4, false)), Verdict::Passthrough);
    }

    #[test]
    fn reinitialize_rebuilds_state_and_replays_new_game() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("init.lua"),
            r#"
            games = (games or 0)
            qlbridge.register_handler('new_game', function(restart)
                games = games + 1
                qlbridge.register_handler('rcon', function() end)
            end)
            "#,
        )
        .unwrap();
        let (host, sink) = host_for(&dir);
        host.load_directory().unwrap();
        host.bridge().registry().register(
            EventKind::Frame,
            host.bridge()
                .with_runtime(|rt| rt.lua().load("return function() end").eval().unwrap())
                .unwrap(),
        );

        host.reinitialize().unwrap();

        // The frame handler belonged to the old state and is gone; the
        // replayed new_game ran in the new one and registered rcon.
        let registry = host.bridge().registry();
        assert!(!registry.contains(EventKind::Frame));
        assert!(registry.contains(EventKind::Rcon));
        let games: i64 = host
            .bridge()
            .with_runtime(|rt| rt.lua().globals().get("games").unwrap())
            .unwrap();
        assert_eq!(games, 1);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn shutdown_clears_handlers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("init.lua"), "qlbridge.register_handler('frame', function() end)").unwrap();
        let (host, _) = host_for(&dir);
        host.load_directory().unwrap();

        host.shutdown().unwrap();
        assert!(host.bridge().registry().is_empty());
        assert_eq!(host.bridge().stats().token_acquisitions, host.bridge().stats().token_releases);
    }
}
