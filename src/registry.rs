//! Name → grammar index.
//!
//! Readers load an immutable snapshot, so `lookup` never blocks. Writers
//! serialize on a mutex, copy the snapshot, and publish the copy with one
//! swap; a failed registration publishes nothing.

use crate::grammar::version::{parse_requirement, select};
use crate::grammar::{
    closest_name, compile_builtins, load_artifact, load_path, Grammar, GrammarLoadError,
    VersionError,
};
use arc_swap::{ArcSwap, ArcSwapOption};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(
        "grammar '{name}' is not registered{}",
        .suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default()
    )]
    NotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error(
        "no registered version of '{name}' satisfies '{requirement}' (available: {})",
        .available.join(", ")
    )]
    NoMatchingVersion {
        name: String,
        requirement: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    InvalidRequirement(#[from] VersionError),

    #[error("artifact does not define grammar '{name}' (found: {})", .available.join(", "))]
    NotInArtifact { name: String, available: Vec<String> },

    #[error(transparent)]
    Load(#[from] GrammarLoadError),

    #[error("failed to scan grammar directory {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Every registered version of every grammar, versions ascending.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    grammars: HashMap<String, Vec<Grammar>>,
}

impl Snapshot {
    /// Add or replace (same name and version) a grammar.
    fn insert(&mut self, grammar: Grammar) {
        let versions = self.grammars.entry(grammar.name().to_string()).or_default();
        match versions.binary_search_by(|g| g.version().cmp(grammar.version())) {
            Ok(index) => {
                debug!(
                    grammar = grammar.name(),
                    version = %grammar.version(),
                    "replacing registered grammar"
                );
                versions[index] = grammar;
            }
            Err(index) => {
                debug!(
                    grammar = grammar.name(),
                    version = %grammar.version(),
                    "registered grammar"
                );
                versions.insert(index, grammar);
            }
        }
    }
}

/// A concurrency-safe set of compiled grammars.
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    snap: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `grammars` in one swap.
    fn publish(&self, grammars: impl IntoIterator<Item = Grammar>) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Snapshot::clone(&self.snap.load());
        for grammar in grammars {
            next.insert(grammar);
        }
        self.snap.store(Arc::new(next));
    }

    /// Compile `data` and register the grammar called `name` from it.
    ///
    /// The artifact may define several grammars; only `name` is registered.
    pub fn register(&self, name: &str, data: &[u8]) -> Result<Grammar, RegistryError> {
        let grammars = load_artifact(data)?;
        let Some(grammar) = grammars.iter().find(|g| g.name() == name).cloned() else {
            return Err(RegistryError::NotInArtifact {
                name: name.to_string(),
                available: grammars.iter().map(|g| g.name().to_string()).collect(),
            });
        };
        self.publish([grammar.clone()]);
        Ok(grammar)
    }

    /// Register an already compiled grammar.
    pub fn register_grammar(&self, grammar: Grammar) -> Grammar {
        self.publish([grammar.clone()]);
        grammar
    }

    /// Compile `data` and register every grammar it defines, or none.
    pub fn register_bundle(&self, data: &[u8]) -> Result<Vec<Grammar>, RegistryError> {
        let grammars = load_artifact(data)?;
        self.publish(grammars.iter().cloned());
        Ok(grammars)
    }

    /// Register the grammars embedded in the crate.
    pub fn register_builtins(&self) -> Result<Vec<Grammar>, RegistryError> {
        let grammars = compile_builtins()?;
        self.publish(grammars.iter().cloned());
        Ok(grammars)
    }

    /// Register every `*.toml` and `*.json` artifact directly inside `dir`.
    ///
    /// Files are compiled in name order. If any fails, nothing is
    /// registered.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<Grammar>, RegistryError> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).max_depth(1) {
            let entry = entry.map_err(|source| RegistryError::Scan {
                path: dir.to_path_buf(),
                source,
            })?;
            let extension = entry.path().extension().and_then(|s| s.to_str());
            if entry.file_type().is_file() && matches!(extension, Some("toml" | "json")) {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();

        let mut grammars = Vec::new();
        for file in &files {
            grammars.extend(load_path(file)?);
        }
        info!(
            dir = %dir.display(),
            files = files.len(),
            grammars = grammars.len(),
            "loaded grammar directory"
        );
        self.publish(grammars.iter().cloned());
        Ok(grammars)
    }

    /// The highest registered version of `name`.
    pub fn lookup(&self, name: &str) -> Result<Grammar, RegistryError> {
        let snap = self.snap.load();
        snap.grammars
            .get(name)
            .and_then(|versions| versions.last())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                suggestion: closest_name(name, snap.grammars.keys().map(String::as_str)),
            })
    }

    /// The highest registered version of `name` satisfying `requirement`,
    /// e.g. `">=1.2, <2"`.
    pub fn lookup_version(&self, name: &str, requirement: &str) -> Result<Grammar, RegistryError> {
        let req = parse_requirement(requirement)?;
        let snap = self.snap.load();
        let versions = snap
            .grammars
            .get(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                suggestion: closest_name(name, snap.grammars.keys().map(String::as_str)),
            })?;
        select(versions, &req, Grammar::version)
            .cloned()
            .ok_or_else(|| RegistryError::NoMatchingVersion {
                name: name.to_string(),
                requirement: requirement.to_string(),
                available: versions.iter().map(|g| g.version().to_string()).collect(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snap.load().grammars.contains_key(name)
    }

    /// Registered grammar names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.snap.load().grammars.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snap.load().grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.snap.store(Arc::new(Snapshot::default()));
    }
}

static GLOBAL: ArcSwapOption<GrammarRegistry> = ArcSwapOption::const_empty();
static LIFECYCLE: Mutex<()> = Mutex::new(());

/// Create the process-wide registry, or return the existing one.
pub fn init() -> Arc<GrammarRegistry> {
    let _guard = LIFECYCLE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(registry) = GLOBAL.load_full() {
        return registry;
    }
    let registry = Arc::new(GrammarRegistry::new());
    GLOBAL.store(Some(Arc::clone(&registry)));
    debug!("initialized global grammar registry");
    registry
}

/// The process-wide registry, if initialized.
pub fn global() -> Option<Arc<GrammarRegistry>> {
    GLOBAL.load_full()
}

/// Drop the process-wide registry. Handles already returned stay usable.
pub fn shutdown() {
    let _guard = LIFECYCLE.lock().unwrap_or_else(PoisonError::into_inner);
    if GLOBAL.swap(None).is_some() {
        debug!("shut down global grammar registry");
    }
}

/// Register into the process-wide registry, initializing it if needed.
pub fn register(name: &str, data: &[u8]) -> Result<Grammar, RegistryError> {
    init().register(name, data)
}

/// Look up in the process-wide registry, initializing it if needed.
pub fn lookup(name: &str) -> Result<Grammar, RegistryError> {
    init().lookup(name)
}
