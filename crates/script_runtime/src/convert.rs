//! Moving values across the Lua boundary.

use bridge_events::{EventArg, ScriptValue};
use mlua::prelude::*;
use std::collections::BTreeMap;

/// How deep nested tables are followed when converting a return value.
const MAX_RECORD_DEPTH: usize = 4;

pub fn arg_to_lua(lua: &Lua, arg: &EventArg) -> LuaResult<LuaValue> {
    Ok(match arg {
        EventArg::Nil => LuaValue::Nil,
        EventArg::Bool(b) => LuaValue::Boolean(*b),
        EventArg::Int(i) => LuaValue::Integer(*i),
        EventArg::Number(n) => LuaValue::Number(*n),
        EventArg::Text(s) => LuaValue::String(lua.create_string(s)?),
        EventArg::Vec3([x, y, z]) => {
            let table = lua.create_table()?;
            table.set("x", *x)?;
            table.set("y", *y)?;
            table.set("z", *z)?;
            LuaValue::Table(table)
        }
    })
}

pub fn args_to_lua(lua: &Lua, args: &[EventArg]) -> LuaResult<LuaMultiValue> {
    let values = args
        .iter()
        .map(|arg| arg_to_lua(lua, arg))
        .collect::<LuaResult<Vec<_>>>()?;
    Ok(LuaMultiValue::from_vec(values))
}

pub fn lua_to_script(value: &LuaValue) -> ScriptValue {
    convert(value, MAX_RECORD_DEPTH)
}

fn convert(value: &LuaValue, depth: usize) -> ScriptValue {
    match value {
        LuaValue::Nil => ScriptValue::Nil,
        LuaValue::Boolean(b) => ScriptValue::Bool(*b),
        LuaValue::Integer(i) => ScriptValue::Integer(*i),
        LuaValue::Number(n) => ScriptValue::Number(*n),
        LuaValue::String(s) => ScriptValue::Text(s.to_string_lossy()),
        LuaValue::Table(table) if depth > 0 => {
            let mut record = BTreeMap::new();
            for (key, value) in table.clone().pairs::<LuaValue, LuaValue>().flatten() {
                let name = match &key {
                    LuaValue::String(s) => s.to_string_lossy(),
                    other => format!("[{}]", describe_key(other)),
                };
                record.insert(name, convert(&value, depth - 1));
            }
            ScriptValue::Record(record)
        }
        other => ScriptValue::Other(other.type_name()),
    }
}

fn describe_key(key: &LuaValue) -> String {
    match key {
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => n.to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        other => other.type_name().to_string(),
    }
}
