//! Handler scripts on a temporary directory

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// A temporary handler directory. Removed on drop.
pub struct HandlerDir {
    dir: TempDir,
}

impl HandlerDir {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Script path for a dotted handler name (`a.b` → `<dir>/a/b.lua`)
    pub fn script_path(&self, name: &str) -> PathBuf {
        let mut path = self.dir.path().to_path_buf();
        path.extend(name.split('.'));
        path.set_extension("lua");
        path
    }

    /// Write a handler script, creating parent directories as needed.
    pub fn write(&self, name: &str, source: &str) -> io::Result<PathBuf> {
        let path = self.script_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, source)?;
        Ok(path)
    }

    /// Handler whose `main` always returns the given code and output.
    pub fn write_fixed(&self, name: &str, return_code: i32, output: &str) -> io::Result<PathBuf> {
        self.write(
            name,
            &format!(
                "function main(args)\n  return {{ return_code = {}, output = {:?} }}\nend\n",
                return_code, output
            ),
        )
    }

    /// Path of the gate file named `gate`
    pub fn gate_path(&self, gate: &str) -> PathBuf {
        self.dir.path().join(format!("{}.gate", gate))
    }

    /// Handler that spins until the gate file exists, then returns code 0
    /// with `output`. Gives up after ten seconds with code 3.
    pub fn write_gated(&self, name: &str, gate: &str, output: &str) -> io::Result<PathBuf> {
        let gate_path = self.gate_path(gate);
        self.write(
            name,
            &format!(
                r#"function main(args)
  local deadline = os.time() + 10
  while os.time() < deadline do
    local f = io.open({gate:?}, "r")
    if f then
      f:close()
      return {{ return_code = 0, output = {output:?} }}
    end
  end
  return {{ return_code = 3, output = "gate never opened" }}
end
"#,
                gate = gate_path.to_string_lossy(),
                output = output
            ),
        )
    }

    /// Release every handler waiting on `gate`.
    pub fn open_gate(&self, gate: &str) -> io::Result<()> {
        fs::write(self.gate_path(gate), "")
    }

    pub fn mtime(&self, name: &str) -> io::Result<SystemTime> {
        fs::metadata(self.script_path(name))?.modified()
    }

    pub fn set_mtime(&self, name: &str, mtime: SystemTime) -> io::Result<()> {
        File::options()
            .write(true)
            .open(self.script_path(name))?
            .set_modified(mtime)
    }

    /// Push the script's mtime into the past, so a later rewrite is
    /// detectably newer even on filesystems with coarse timestamps.
    pub fn backdate(&self, name: &str, by: Duration) -> io::Result<()> {
        self.set_mtime(name, SystemTime::now() - by)
    }

    /// Replace the script body and move its mtime strictly forward.
    pub fn rewrite(&self, name: &str, source: &str) -> io::Result<()> {
        let before = self.mtime(name)?;
        self.write(name, source)?;
        let after = self.mtime(name)?;
        if after <= before {
            self.set_mtime(name, before + Duration::from_secs(2))?;
        }
        Ok(())
    }

    pub fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.script_path(name))
    }
}
