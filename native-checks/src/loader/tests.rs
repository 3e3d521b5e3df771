use super::*;
use std::fs;
use tempfile::TempDir;

fn write(dir: &Path, rel: &str, code: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, code).unwrap();
    path
}

const MAIN_HANDLER: &str = r#"
function main(args)
    return { return_code = 0, output = "main " .. (args[1] or "") }
end
"#;

#[test]
fn test_resolve_module_name_in_search_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(temp_dir.path(), "check_disk.lua", MAIN_HANDLER);

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    assert_eq!(loader.resolve("check_disk").unwrap(), path);
}

#[test]
fn test_resolve_dotted_module_and_init() {
    let temp_dir = TempDir::new().unwrap();
    let nested = write(temp_dir.path(), "net/check_http.lua", MAIN_HANDLER);
    let package = write(temp_dir.path(), "db/init.lua", MAIN_HANDLER);

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    assert_eq!(loader.resolve("net.check_http").unwrap(), nested);
    assert_eq!(loader.resolve("db").unwrap(), package);
}

#[test]
fn test_resolve_first_search_dir_wins() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let winner = write(first.path(), "check_load.lua", MAIN_HANDLER);
    write(second.path(), "check_load.lua", MAIN_HANDLER);

    let loader = LuaLoader::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
    assert_eq!(loader.resolve("check_load").unwrap(), winner);
}

#[test]
fn test_resolve_file_path_adds_parent_to_search_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(temp_dir.path(), "custom/check_mem.lua", MAIN_HANDLER);

    let loader = LuaLoader::default();
    let name = path.to_string_lossy().to_string();
    assert_eq!(loader.resolve(&name).unwrap(), path);
    assert_eq!(loader.search_path(), vec![temp_dir.path().join("custom")]);

    // Resolving again does not duplicate the entry
    loader.resolve(&name).unwrap();
    assert_eq!(loader.search_path().len(), 1);
}

#[test]
fn test_resolve_missing_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);

    let err = loader.resolve("missing_plugin").unwrap_err();
    assert!(matches!(err, LoadError::NotFound { .. }));
    assert!(err.to_string().contains("missing_plugin"));

    for bad in ["", "a..b", ".hidden", "../escape"] {
        assert!(
            matches!(loader.resolve(bad), Err(LoadError::NotFound { .. })),
            "{:?} should not resolve",
            bad
        );
    }
}

#[test]
fn test_load_main_function() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "check_disk.lua", MAIN_HANDLER);

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let entry = loader.load("check_disk").unwrap();

    assert_eq!(entry.name, "check_disk");
    assert!(!entry.handler.is_instance());
    assert!(matches!(entry.handler.kind(), HandlerKind::Function { .. }));
    assert_eq!(
        entry.handler.invoke(&["/".to_string()]).unwrap().output,
        "main /"
    );
    assert!(!entry.is_stale());
}

#[test]
fn test_plugin_type_preferred_over_main() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "both.lua",
        r#"
        Plugin = {}
        Plugin.__index = Plugin
        function Plugin.new()
            return setmetatable({ prefix = "type" }, Plugin)
        end
        function Plugin:execute(args)
            return { return_code = 0, output = self.prefix }
        end
        function main(args)
            return { return_code = 0, output = "main" }
        end
    "#,
    );

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let entry = loader.load("both").unwrap();
    assert!(entry.handler.is_instance());
    assert_eq!(entry.handler.invoke(&[]).unwrap().output, "type");
}

#[test]
fn test_returned_module_table_is_searched() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "moduled.lua",
        r#"
        local M = {}
        M.Plugin = {}
        function M.Plugin:execute(args)
            return { return_code = 2, output = "from module" }
        end
        return M
    "#,
    );

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let entry = loader.load("moduled").unwrap();
    let result = entry.handler.invoke(&[]).unwrap();
    assert_eq!(result.return_code, 2);
    assert_eq!(result.output, "from module");
}

#[test]
fn test_plugin_constructed_once_per_load() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "counted.lua",
        r#"
        constructed = 0
        Plugin = {}
        function Plugin.new()
            constructed = constructed + 1
            return { execute = function(self, args)
                return { return_code = 0, output = tostring(constructed) }
            end }
        end
    "#,
    );

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let entry = loader.load("counted").unwrap();
    assert_eq!(entry.handler.invoke(&[]).unwrap().output, "1");
    assert_eq!(entry.handler.invoke(&[]).unwrap().output, "1");
}

#[test]
fn test_plugin_constructor_gets_no_arguments() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "argless.lua",
        r##"
        Plugin = {}
        function Plugin.new(...)
            local count = select("#", ...)
            return { execute = function(self, args)
                return { return_code = 0, output = tostring(count) }
            end }
        end
    "##,
    );

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let entry = loader.load("argless").unwrap();
    assert!(matches!(entry.handler.kind(), HandlerKind::Instance { .. }));
    assert_eq!(entry.handler.invoke(&[]).unwrap().output, "0");
}

#[test]
fn test_no_entry_point() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "empty.lua", "local x = 1");

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let err = loader.load("empty").unwrap_err();
    assert!(matches!(err, LoadError::NoEntryPoint { .. }), "got {err}");
}

#[test]
fn test_syntax_error_is_lua_error() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "broken.lua", "function main(args");

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let err = loader.load("broken").unwrap_err();
    assert!(matches!(err, LoadError::Lua { .. }), "got {err}");
}

#[test]
fn test_require_sees_search_path_and_is_fresh_per_load() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "helpers.lua", r#"return { label = "v1" }"#);
    write(
        temp_dir.path(),
        "uses_helper.lua",
        r#"
        local helpers = require("helpers")
        function main(args)
            return { return_code = 0, output = helpers.label }
        end
    "#,
    );

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    let first = loader.load("uses_helper").unwrap();
    assert_eq!(first.handler.invoke(&[]).unwrap().output, "v1");

    write(temp_dir.path(), "helpers.lua", r#"return { label = "v2" }"#);
    let second = loader.load("uses_helper").unwrap();
    assert_eq!(second.handler.invoke(&[]).unwrap().output, "v2");

    // The first generation keeps what it loaded
    assert_eq!(first.handler.invoke(&[]).unwrap().output, "v1");
}

#[test]
fn test_top_level_code_reruns_on_reload() {
    let temp_dir = TempDir::new().unwrap();
    let counter = temp_dir.path().join("counter");
    let code = format!(
        r#"
        local f = io.open("{}", "a")
        f:write("x")
        f:close()
        function main(args) return {{ return_code = 0 }} end
    "#,
        counter.display()
    );
    write(temp_dir.path(), "side_effect.lua", &code);

    let loader = LuaLoader::new(vec![temp_dir.path().to_path_buf()]);
    loader.load("side_effect").unwrap();
    loader.load("side_effect").unwrap();
    assert_eq!(fs::read_to_string(&counter).unwrap(), "xx");
}
