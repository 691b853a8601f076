//! Webhook fixture loader.
//!
//! Loads recorded processor payloads from `contracts/webhooks/` so tests replay the
//! exact JSON shapes the processor sends.

use std::path::{Path, PathBuf};

use serde_json::Value;

pub struct Fixture;

impl Fixture {
    /// Load and parse `contracts/webhooks/<name>.json`, replacing every
    /// `{{key}}` placeholder with the matching value first.
    ///
    /// Panics if the file is missing or the result is invalid JSON.
    pub fn webhook(name: &str, vars: &[(&str, String)]) -> Value {
        let path = workspace_root()
            .join("contracts/webhooks")
            .join(format!("{name}.json"));
        let mut contents = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("fixture not found at {}: {}", path.display(), e));
        for (key, value) in vars {
            contents = contents.replace(&format!("{{{{{key}}}}}"), value);
        }
        serde_json::from_str(&contents)
            .unwrap_or_else(|e| panic!("invalid JSON in fixture {}: {}", name, e))
    }
}

fn workspace_root() -> PathBuf {
    let dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap());
    // Walk up from the crate dir to the first ancestor holding `contracts/`.
    dir.ancestors()
        .find(|a| a.join("contracts").is_dir())
        .map(Path::to_path_buf)
        .unwrap_or(dir)
}
