//! The `qlbridge` global table scripts talk to.

use bridge_events::{EventKind, HandlerRegistry, QueryableClient};
use mlua::prelude::*;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

pub const GLOBAL_NAME: &str = "qlbridge";

fn parse_kind(name: &str) -> LuaResult<EventKind> {
    name.parse::<EventKind>().map_err(|_| {
        LuaError::external(format!(
            "unknown event: '{}'. Valid events: {}",
            name,
            EventKind::valid_names().join(", ")
        ))
    })
}

/// Installs the `qlbridge` global table into `lua`.
///
/// # Arguments
///
/// * `lua` - The state scripts run in
/// * `registry` - Where `register_handler` stores handlers
/// * `queryable` - Backs `is_queryable`
///
/// # Lua API
///
/// * `qlbridge.register_handler(name, fn)` - replaces any earlier handler for
///   `name`; unknown names raise an error listing the valid ones
/// * `qlbridge.unregister_handler(name)`
/// * `qlbridge.is_queryable(client_id)`
/// * `qlbridge.log(level, message)` - routed to `tracing`
///
/// # Examples
///
/// ```
/// use bridge_events::{EventKind, HandlerRegistry, QueryableClient};
/// use mlua::Lua;
/// use std::sync::Arc;
///
/// let lua = Lua::new();
/// let registry = Arc::new(HandlerRegistry::new());
/// script_runtime::api::register_api(&lua, registry.clone(), Arc::new(QueryableClient::new())).unwrap();
///
/// lua.load("qlbridge.register_handler('frame', function() end)").exec().unwrap();
/// assert!(registry.contains(EventKind::Frame));
/// ```
pub fn register_api(
    lua: &Lua,
    registry: Arc<HandlerRegistry<LuaFunction>>,
    queryable: Arc<QueryableClient>,
) -> LuaResult<()> {
    let api = lua.create_table()?;

    {
        let registry = Arc::clone(&registry);
        let register = lua.create_function(move |_, (name, handler): (String, LuaFunction)| {
            let kind = parse_kind(&name)?;
            if registry.register(kind, handler).is_some() {
                debug!("Handler for {} replaced", kind);
            } else {
                debug!("Handler for {} registered", kind);
            }
            Ok(())
        })?;
        api.set("register_handler", register)?;
    }

    {
        let registry = Arc::clone(&registry);
        let unregister = lua.create_function(move |_, name: String| {
            let kind = parse_kind(&name)?;
            Ok(registry.unregister(kind).is_some())
        })?;
        api.set("unregister_handler", unregister)?;
    }

    let is_queryable = lua.create_function(move |_, client_id: i32| Ok(queryable.is_queryable(client_id)))?;
    api.set("is_queryable", is_queryable)?;

    let log = lua.create_function(|_, (level, message): (String, String)| {
        match level.to_ascii_lowercase().as_str() {
            "trace" => trace!(target: "qlbridge::script", "{}", message),
            "debug" => debug!(target: "qlbridge::script", "{}", message),
            "warn" => warn!(target: "qlbridge::script", "{}", message),
            "error" => error!(target: "qlbridge::script", "{}", message),
            _ => info!(target: "qlbridge::script", "{}", message),
        }
        Ok(())
    })?;
    api.set("log", log)?;

    lua.globals().set(GLOBAL_NAME, api)
}
