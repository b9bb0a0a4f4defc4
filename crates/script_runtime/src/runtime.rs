//! One Lua state and the handlers it registered.

use crate::api::register_api;
use crate::convert::{args_to_lua, lua_to_script};
use crate::error::ScriptError;
use crate::sandbox::apply_sandbox;
use bridge_events::{EventCall, EventError, HandlerRegistry, QueryableClient, ScriptRuntime, ScriptValue};
use mlua::prelude::*;
use std::path::Path;
use std::sync::Arc;

pub struct LuaRuntime {
    lua: Lua,
}

impl LuaRuntime {
    /// A fresh, sandboxed state with the `qlbridge` table installed.
    pub fn new(
        registry: Arc<HandlerRegistry<LuaFunction>>,
        queryable: Arc<QueryableClient>,
    ) -> Result<Self, ScriptError> {
        let lua = Lua::new();
        apply_sandbox(&lua)?;
        register_api(&lua, registry, queryable)?;
        Ok(Self { lua })
    }

    pub fn exec_file(&self, path: &Path) -> Result<(), ScriptError> {
        let source = std::fs::read_to_string(path)?;
        self.exec_source(&path.display().to_string(), &source)
    }

    pub fn exec_source(&self, name: &str, source: &str) -> Result<(), ScriptError> {
        self.lua.load(source).set_name(name).exec()?;
        Ok(())
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl ScriptRuntime for LuaRuntime {
    type Handler = LuaFunction;

    fn invoke(&mut self, handler: &LuaFunction, call: &EventCall) -> Result<ScriptValue, EventError> {
        let args = args_to_lua(&self.lua, call.args()).map_err(|e| EventError::RuntimeError(e.to_string()))?;
        let result: LuaValue = handler
            .call(args)
            .map_err(|e| EventError::HandlerExecution(e.to_string()))?;
        Ok(lua_to_script(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_events::{EventKind, ThinkInput};

    fn runtime() -> (LuaRuntime, Arc<HandlerRegistry<LuaFunction>>) {
        let registry = Arc::new(HandlerRegistry::new());
        let runtime = LuaRuntime::new(registry.clone(), Arc::new(QueryableClient::new())).unwrap();
        (runtime, registry)
    }

    #[test]
    fn handler_receives_the_fixed_argument_shape() {
        let (mut rt, registry) = runtime();
        rt.exec_source(
            "test",
            r#"
            qlbridge.register_handler('damage', function(target, attacker, dmg, dflags, mod)
                return tostring(target) .. ':' .. tostring(attacker) .. ':' .. dmg
            end)
            "#,
        )
        .unwrap();

        let handler = registry.get(EventKind::Damage).unwrap();
        let result = rt.invoke(&handler, &EventCall::damage(3, None, 40, 0, 7)).unwrap();
        assert_eq!(result, ScriptValue::Text("3:nil:40".into()));
    }

    #[test]
    fn think_handler_gets_twelve_values() {
        let (mut rt, registry) = runtime();
        rt.exec_source(
            "test",
            "qlbridge.register_handler('client_think', function(...) return select('#', ...) end)",
        )
        .unwrap();

        let handler = registry.get(EventKind::ClientThink).unwrap();
        let result = rt
            .invoke(&handler, &EventCall::client_think(0, &ThinkInput::default()))
            .unwrap();
        assert_eq!(result, ScriptValue::Integer(12));
    }

    #[test]
    fn raised_errors_become_handler_failures() {
        let (mut rt, registry) = runtime();
        rt.exec_source("test", "qlbridge.register_handler('frame', function() error('nope') end)")
            .unwrap();

        let handler = registry.get(EventKind::Frame).unwrap();
        match rt.invoke(&handler, &EventCall::frame()) {
            Err(EventError::HandlerExecution(msg)) => assert!(msg.contains("nope")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn syntax_errors_surface_on_load() {
        let (rt, _) = runtime();
        assert!(matches!(rt.exec_source("broken", "function ("), Err(ScriptError::Lua(_))));
    }
}
