//! Resolving handler names to freshly loaded Lua handlers.
//!
//! A name is either a path to a `.lua` file or a dotted module path
//! (`net.check_http`) looked up as `<dir>/net/check_http.lua` or
//! `<dir>/net/check_http/init.lua` in each search directory in turn.
//!
//! Every load gets a brand new Lua state. Top-level code runs again on
//! every reload, and anything the script `require`s is cached only in
//! that generation's `package.loaded`.

use mlua::{Lua, Table, Value};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::LoadError;
use crate::handler::{Handler, HandlerEntry, HandlerKind};

/// Extension handler scripts must carry
pub const HANDLER_EXTENSION: &str = "lua";

/// Turns a handler name into a loaded [`HandlerEntry`].
pub trait HandlerLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<HandlerEntry, LoadError>;
}

/// Loads handlers from Lua scripts found on a search path.
#[derive(Debug, Default)]
pub struct LuaLoader {
    search_path: RwLock<Vec<PathBuf>>,
}

impl LuaLoader {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path: RwLock::new(search_path),
        }
    }

    pub fn search_path(&self) -> Vec<PathBuf> {
        self.search_path.read().clone()
    }

    /// Append a directory to the search path unless it is already there.
    pub fn add_search_dir(&self, dir: &Path) {
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir.to_path_buf()
        };

        let mut path = self.search_path.write();
        if !path.contains(&dir) {
            debug!("Adding {} to handler search path", dir.display());
            path.push(dir);
        }
    }

    /// Find the script a name refers to.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LoadError> {
        let as_path = Path::new(name);
        let is_script = as_path
            .extension()
            .is_some_and(|ext| ext == HANDLER_EXTENSION);

        if is_script && as_path.is_file() {
            if let Some(parent) = as_path.parent() {
                self.add_search_dir(parent);
            }
            return Ok(as_path.to_path_buf());
        }

        let searched = self.search_path();
        let not_found = || LoadError::NotFound {
            name: name.to_string(),
            searched: searched.clone(),
        };

        if name.is_empty() || name.split('.').any(|part| part.is_empty() || part.contains(['/', '\\'])) {
            return Err(not_found());
        }

        let relative: PathBuf = name.split('.').collect();
        for dir in &searched {
            let base = dir.join(&relative);
            let candidates = [
                base.with_extension(HANDLER_EXTENSION),
                base.join("init").with_extension(HANDLER_EXTENSION),
            ];
            if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
                return Ok(found);
            }
        }

        Err(not_found())
    }

    /// Load one fresh generation of the script at `path`.
    pub fn load_file(&self, name: &str, path: &Path) -> Result<HandlerEntry, LoadError> {
        // Take the mtime before reading so an edit racing the read is seen as stale later.
        let loaded_at_mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|source| LoadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let code = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let lua_err = |e: mlua::Error| LoadError::Lua {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let lua = Lua::new();
        self.export_search_path(&lua).map_err(lua_err)?;

        let exported: Value = lua
            .load(code.as_str())
            .set_name(path.to_string_lossy())
            .eval()
            .map_err(lua_err)?;
        let module = match exported {
            Value::Table(table) => Some(table),
            _ => None,
        };

        let kind = find_entry_point(&lua, module.as_ref())
            .map_err(lua_err)?
            .ok_or_else(|| LoadError::NoEntryPoint {
                path: path.to_path_buf(),
            })?;

        Ok(HandlerEntry {
            name: name.to_string(),
            source: path.to_path_buf(),
            loaded_at_mtime,
            handler: Handler::new(lua, kind),
        })
    }

    /// Make `require` look in the same directories the loader searches.
    fn export_search_path(&self, lua: &Lua) -> mlua::Result<()> {
        let package: Table = lua.globals().get("package")?;
        let existing: String = package.get("path")?;

        let mut path = String::new();
        for dir in self.search_path.read().iter() {
            let dir = dir.display();
            path.push_str(&format!("{dir}/?.lua;{dir}/?/init.lua;"));
        }
        path.push_str(&existing);

        package.set("path", path)
    }
}

impl HandlerLoader for LuaLoader {
    fn load(&self, name: &str) -> Result<HandlerEntry, LoadError> {
        let path = self.resolve(name)?;
        info!("Loading handler '{}' from {}", name, path.display());
        self.load_file(name, &path)
    }
}

/// Look `key` up on the chunk's returned table first, then in globals.
fn lookup(lua: &Lua, module: Option<&Table>, key: &str) -> mlua::Result<Value> {
    if let Some(module) = module {
        let value: Value = module.get(key)?;
        if !value.is_nil() {
            return Ok(value);
        }
    }
    lua.globals().get(key)
}

/// Pick the entry point: a `Plugin` type first, a `main` function second.
fn find_entry_point(lua: &Lua, module: Option<&Table>) -> mlua::Result<Option<HandlerKind>> {
    if let Value::Table(plugin) = lookup(lua, module, "Plugin")? {
        let instance = match plugin.get::<Value>("new")? {
            Value::Function(new) => match new.call::<Value>(())? {
                Value::Table(instance) => instance,
                other => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "Plugin.new() must return a table, got {}",
                        other.type_name()
                    )))
                }
            },
            _ => plugin,
        };

        if let Value::Function(execute) = instance.get::<Value>("execute")? {
            return Ok(Some(HandlerKind::Instance { instance, execute }));
        }
    }

    if let Value::Function(main) = lookup(lua, module, "main")? {
        return Ok(Some(HandlerKind::Function { main }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests;
