//! Loaded check handlers and their invocation.
//!
//! A handler is one generation of a Lua script, living in its own Lua
//! state. It is either a `Plugin` instance with an `execute(self, args)`
//! method or a plain `main(args)` function; both are invoked through
//! [`Handler::invoke`].

use mlua::{FromLua, Function, Lua, Result as LuaResult, Table, Value};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::check::CheckResult;

/// Which entry point a script exposed
pub enum HandlerKind {
    /// Instantiated once from `Plugin`, reused for every call
    Instance { instance: Table, execute: Function },
    /// Free `main(args)` function
    Function { main: Function },
}

/// A callable handler bound to the Lua state it was loaded into.
pub struct Handler {
    lua: Lua,
    kind: HandlerKind,
}

impl Handler {
    pub(crate) fn new(lua: Lua, kind: HandlerKind) -> Self {
        Self { lua, kind }
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.kind, HandlerKind::Instance { .. })
    }

    /// Run the handler with the argument tokens that followed its name.
    pub fn invoke(&self, args: &[String]) -> LuaResult<CheckResult> {
        let args_table = self
            .lua
            .create_sequence_from(args.iter().map(String::as_str))?;

        let value: Value = match &self.kind {
            HandlerKind::Instance { instance, execute } => {
                execute.call((instance.clone(), args_table))?
            }
            HandlerKind::Function { main } => main.call(args_table)?,
        };

        CheckResult::from_lua(value, &self.lua)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            HandlerKind::Instance { .. } => "instance",
            HandlerKind::Function { .. } => "function",
        };
        f.debug_struct("Handler").field("kind", &kind).finish()
    }
}

/// Cache value: one loaded generation of a named handler.
///
/// Never mutated after load; a reload produces a new entry.
#[derive(Debug)]
pub struct HandlerEntry {
    pub name: String,
    /// Script the handler was loaded from
    pub source: PathBuf,
    /// Modification time of `source` when it was loaded
    pub loaded_at_mtime: SystemTime,
    pub handler: Handler,
}

impl HandlerEntry {
    /// Current modification time of the backing script, if it can still be read.
    pub fn current_mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.source)
            .and_then(|m| m.modified())
            .ok()
    }

    /// True when the script changed on disk after this generation was loaded.
    pub fn is_stale(&self) -> bool {
        self.current_mtime()
            .is_some_and(|mtime| mtime > self.loaded_at_mtime)
    }
}

impl FromLua for CheckResult {
    fn from_lua(value: Value, _lua: &Lua) -> LuaResult<Self> {
        let table = match value {
            Value::Table(table) => table,
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "handler must return a result table, got {}",
                    other.type_name()
                )))
            }
        };

        let return_code = match table.get::<Value>("return_code")? {
            Value::Integer(i) => i32::try_from(i).map_err(|_| {
                mlua::Error::RuntimeError(format!("return_code {} out of range", i))
            })?,
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => n as i32,
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "return_code must be an integer, got {}",
                    other.type_name()
                )))
            }
        };

        let output = match table.get::<Value>("output")? {
            Value::String(s) => s.to_str()?.to_string(),
            Value::Nil => String::new(),
            other => {
                return Err(mlua::Error::RuntimeError(format!(
                    "output must be a string, got {}",
                    other.type_name()
                )))
            }
        };

        let perf_datas = lua_value_to_string_vec(table.get::<Value>("perf_datas")?)?;

        Ok(CheckResult {
            return_code,
            output,
            perf_datas,
        })
    }
}

/// Convert a Lua array of strings or numbers to a Vec<String>
pub fn lua_value_to_string_vec(value: Value) -> LuaResult<Vec<String>> {
    match value {
        Value::Table(table) => {
            let mut result = Vec::new();
            let len = table.raw_len();

            for i in 1..=len {
                let v: Value = table.get(i)?;
                match v {
                    Value::String(s) => result.push(s.to_str()?.to_string()),
                    Value::Integer(i) => result.push(i.to_string()),
                    Value::Number(n) => result.push(n.to_string()),
                    _ => {
                        return Err(mlua::Error::RuntimeError(format!(
                            "perf_datas element {} must be a string or number, got {}",
                            i,
                            v.type_name()
                        )))
                    }
                }
            }

            Ok(result)
        }
        Value::Nil => Ok(Vec::new()),
        _ => Err(mlua::Error::RuntimeError(format!(
            "perf_datas must be an array, got {}",
            value.type_name()
        ))),
    }
}
