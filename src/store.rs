use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ir::Quadruple;
use crate::memory::MemoryManager;
use crate::symbols::SymbolTable;
use crate::vm::VirtualMachine;

/// Everything the VM needs: the quadruples, the function records (for
/// `param` resolution), and the memory manager with its counters and
/// interned constants. Round-trips through JSON; a loaded artifact must
/// execute identically to the in-memory one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub quads: Vec<Quadruple>,
    pub symbols: SymbolTable,
    pub memory: MemoryManager,
}

impl Artifact {
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path).map_err(|e| Error::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::to_writer(&mut file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_reader(&mut file)?)
    }

    pub fn into_vm<W: Write>(self, out: W) -> VirtualMachine<W> {
        VirtualMachine::new(self.quads, self.symbols, self.memory, out)
    }
}

/// The numbered quadruple listing.
impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, quad) in self.quads.iter().enumerate() {
            writeln!(f, "{:4}: {}", i, quad)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    const SRC: &str = "program p; \
                       var i : int; \
                       func shout(n : int) { print(\"tick\", n); }; \
                       begin i = 0; while (i < 3) { shout(i); i = i + 1; } end";

    fn output_of(artifact: Artifact) -> String {
        let mut out = Vec::new();
        artifact.into_vm(&mut out).run().unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn json_round_trip_preserves_behavior() {
        let artifact = compile(SRC).unwrap();
        let json = serde_json::to_string(&artifact).unwrap();
        let reloaded: Artifact = serde_json::from_str(&json).unwrap();

        assert_eq!(artifact.quads, reloaded.quads);
        assert_eq!(output_of(artifact), output_of(reloaded));
    }

    #[test]
    fn save_and_load_through_a_file() {
        let artifact = compile(SRC).unwrap();
        let path = std::env::temp_dir().join("quetzal-store-test.json");
        artifact.save(&path).unwrap();
        let reloaded = Artifact::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(artifact.quads, reloaded.quads);
        assert_eq!(output_of(artifact), output_of(reloaded));
    }

    #[test]
    fn listing_numbers_every_quad() {
        let artifact = compile("program p; begin print(1); end").unwrap();
        let listing = artifact.to_string();
        assert!(listing.lines().count() == artifact.quads.len());
        assert!(listing.starts_with("   0: (goto"));
    }

    #[test]
    fn loading_garbage_fails() {
        let path = std::env::temp_dir().join("quetzal-garbage-test.json");
        std::fs::write(&path, b"not json").unwrap();
        let result = Artifact::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::Artifact(_))));
    }
}
