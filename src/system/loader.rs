// src/system/loader.rs
//
// The module loader seam. The engine never touches a filesystem directly;
// it asks a `ModuleLoader` for modules, directory checks and directory
// listings against opaque paths. The bundled `StaticLoader` serves a tree
// built in code, which is also how embedders are expected to ship their
// commands.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::errors::CliError;
use crate::models::CommandModule;

/// Abstract source of command modules.
///
/// The naming convention mirrors a filesystem layout: `name` is a leaf
/// module, a directory is a pass-through parent, `[name]` captures one
/// token and `[...name]` captures the rest. A loader that finds something
/// at a path but cannot produce a command from it should return
/// [`CliError::MissingModule`] rather than `Ok(None)`.
pub trait ModuleLoader {
    /// Loads the module at `path`, or `Ok(None)` when nothing exists there.
    fn load(&self, path: &Path) -> Result<Option<CommandModule>, CliError>;

    /// Whether `path` is a directory (a pass-through parent).
    fn is_dir(&self, path: &Path) -> bool;

    /// Entry names of `dir`, in directory order. Route-parameter matching
    /// takes the first matching entry, so order is semantic.
    fn entries(&self, dir: &Path) -> Vec<String>;
}

/// An in-memory module tree.
///
/// Paths are logical: `module("users/[id]/delete", ...)` registers the
/// leaf and implicitly creates the `users` and `users/[id]` directories.
/// Sibling order is insertion order.
#[derive(Default)]
pub struct StaticLoader {
    root: PathBuf,
    modules: HashMap<PathBuf, CommandModule>,
    dirs: HashSet<PathBuf>,
    children: HashMap<PathBuf, Vec<String>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from(crate::constants::DEFAULT_COMMANDS_DIR),
            ..Self::default()
        }
    }

    /// Uses a different logical root than `commands`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Registers a module at a `/`-separated logical path under the root.
    pub fn module(mut self, path: &str, module: CommandModule) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = self.root.clone();
        self.dirs.insert(current.clone());

        for (position, segment) in segments.iter().enumerate() {
            self.register_child(&current, segment);
            current = current.join(segment);
            if position < segments.len() - 1 {
                self.dirs.insert(current.clone());
            }
        }
        self.modules.insert(current, module);
        self
    }

    /// Registers an empty directory (a pass-through parent with no
    /// children yet).
    pub fn dir(mut self, path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = self.root.clone();
        self.dirs.insert(current.clone());
        for segment in segments {
            self.register_child(&current, segment);
            current = current.join(segment);
            self.dirs.insert(current.clone());
        }
        self
    }

    fn register_child(&mut self, parent: &Path, name: &str) {
        let siblings = self.children.entry(parent.to_path_buf()).or_default();
        if !siblings.iter().any(|existing| existing == name) {
            siblings.push(name.to_string());
        }
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, path: &Path) -> Result<Option<CommandModule>, CliError> {
        Ok(self.modules.get(path).cloned())
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    fn entries(&self, dir: &Path) -> Vec<String> {
        self.children.get(dir).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> CommandModule {
        CommandModule::new(|_| Ok(()))
    }

    #[test]
    fn test_module_registration_creates_parent_dirs() {
        let loader = StaticLoader::new().module("users/[id]/delete", noop());
        let root = Path::new("commands");

        assert!(loader.is_dir(root));
        assert!(loader.is_dir(&root.join("users")));
        assert!(loader.is_dir(&root.join("users/[id]")));
        assert!(
            loader
                .load(&root.join("users/[id]/delete"))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_entries_preserve_insertion_order() {
        let loader = StaticLoader::new()
            .module("deploy/prod", noop())
            .module("deploy/[env]", noop())
            .module("build", noop());

        assert_eq!(
            loader.entries(&Path::new("commands").join("deploy")),
            vec!["prod", "[env]"]
        );
        assert_eq!(loader.entries(Path::new("commands")), vec!["deploy", "build"]);
    }

    #[test]
    fn test_missing_path_loads_as_none() {
        let loader = StaticLoader::new().module("build", noop());
        assert!(loader.load(Path::new("commands/nope")).unwrap().is_none());
        assert!(!loader.is_dir(Path::new("commands/nope")));
    }
}
