//! Data directory layout and resource discovery.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::character::NO_CHARACTER;
use crate::extensions::builtin_names;

/// Directories under the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDirs {
    root: PathBuf,
}

impl ResourceDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn torch_dumps(&self) -> PathBuf {
        self.root.join("torch-dumps")
    }

    pub fn presets(&self) -> PathBuf {
        self.root.join("presets")
    }

    pub fn characters(&self) -> PathBuf {
        self.root.join("characters")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Model names: entries of `models/` and `torch-dumps/` with `.pt`
    /// removed, excluding `.txt` files.
    pub fn available_models(&self) -> Vec<String> {
        let names = entry_names(&self.models())
            .into_iter()
            .chain(entry_names(&self.torch_dumps()))
            .filter(|name| !name.ends_with(".txt"))
            .map(|name| name.replace(".pt", ""));
        sorted_case_insensitive(names)
    }

    /// Preset names: stems of `presets/*.txt`.
    pub fn available_presets(&self) -> Vec<String> {
        sorted_case_insensitive(stems_with_extension(&self.presets(), "txt"))
    }

    /// Character names: `None` followed by stems of `characters/*.json`.
    pub fn available_characters(&self) -> Vec<String> {
        let mut characters = vec![NO_CHARACTER.to_string()];
        characters.extend(sorted_case_insensitive(stems_with_extension(
            &self.characters(),
            "json",
        )));
        characters
    }

    /// Extensions that can be named in `--extensions`.
    pub fn available_extensions(&self) -> Vec<String> {
        sorted_case_insensitive(builtin_names().into_iter().map(String::from))
    }
}

fn entry_names(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            debug!("Cannot list {:?}: {}", dir, e);
            Vec::new()
        }
    }
}

fn stems_with_extension(dir: &Path, extension: &str) -> Vec<String> {
    entry_names(dir)
        .into_iter()
        .filter_map(|name| {
            let path = Path::new(&name);
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                return None;
            }
            path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
        })
        .collect()
}

fn sorted_case_insensitive(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let unique: BTreeSet<String> = names.into_iter().collect();
    let mut names: Vec<String> = unique.into_iter().collect();
    names.sort_by_key(|name| name.to_lowercase());
    names
}
