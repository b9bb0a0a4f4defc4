//! Blocks native module loading inside the server process.
//!
//! Scripts are operator-provided and otherwise trusted, but a C module built
//! against a different Lua ABI would crash the game server.

use mlua::prelude::*;

pub fn apply_sandbox(lua: &Lua) -> LuaResult<()> {
    lua.load(
        r#"
        package.loadlib = nil
        package.cpath = ''
    "#,
    )
    .set_name("sandbox")
    .exec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loadlib_and_cpath_are_gone() {
        let lua = Lua::new();
        apply_sandbox(&lua).unwrap();

        let package: LuaTable = lua.globals().get("package").unwrap();
        assert_eq!(package.get::<LuaValue>("loadlib").unwrap(), LuaValue::Nil);
        assert_eq!(package.get::<String>("cpath").unwrap(), "");
    }

    #[test]
    fn pure_lua_still_works() {
        let lua = Lua::new();
        apply_sandbox(&lua).unwrap();

        let joined: String = lua.load("table.concat({'a', 'b'}, ',')").eval().unwrap();
        assert_eq!(joined, "a,b");
    }
}
