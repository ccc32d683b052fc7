//! Arcade short-name lookup (`sf2` -> `Street Fighter II: The World Warrior`).
//!
//! The database is a JSON object of short name to title. It is read the
//! first time a lookup needs it and kept for the life of the process. A
//! failed read is returned to the caller and retried on the next lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::opt::*;

type NameMap = HashMap<String, String>;

pub struct NameDatabase {
    path: PathBuf,
    names: Mutex<Option<Arc<NameMap>>>,
}

fn load_names(path: &Path) -> Res<NameMap> {
    let data = std::fs::read_to_string(path)
        .map_err(|err| format!("Failed to read name database {}: {}", path.display(), err))?;
    let names: NameMap = serde_json::from_str(&data)
        .map_err(|err| format!("Failed to parse name database {}: {}", path.display(), err))?;

    Ok(names
        .into_iter()
        .map(|(short, title)| (short.to_lowercase(), title))
        .collect())
}

impl NameDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        NameDatabase {
            path: path.into(),
            names: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn names(&self) -> Res<Arc<NameMap>> {
        let mut cached = self
            .names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(names) = cached.as_ref() {
            return Ok(names.clone());
        }

        let names = Arc::new(load_names(&self.path)?);
        log_if(
            &format!("Loaded {} names from {}", names.len(), self.path.display()),
            DbgFlg::Cli,
        );
        *cached = Some(names.clone());
        Ok(names)
    }

    pub fn is_loaded(&self) -> bool {
        self.names
            .lock()
            .map(|cached| cached.is_some())
            .unwrap_or(false)
    }

    pub fn resolve(&self, short_name: &str) -> Res<Option<String>> {
        Ok(self.names()?.get(&short_name.to_lowercase()).cloned())
    }

    /// The full title if one is known, otherwise `name` unchanged.
    pub fn display_name_for(&self, name: &str) -> Res<String> {
        Ok(self.resolve(name)?.unwrap_or_else(|| name.to_string()))
    }
}
