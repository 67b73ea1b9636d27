//! Named strategies and their compiled handles.
//!
//! Built-ins are always listed first and cannot be changed. Uploaded and
//! generated strategies follow in registration order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use web_time::Instant;

use crate::ai::builtin::{BuiltinKind, BuiltinStrategy};
use crate::config::HarnessConfig;
use crate::error::{RegistryError, UploadError};
use crate::sandbox::{PLAYER_ENTRY_POINT, ScriptStrategy, StrategyHandle, validate_strategy_upload};
use crate::script::Limits;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Uploaded,
    /// Produced by the analysis pipeline. The handle cannot be rebuilt
    /// from source.
    Generated,
}

#[derive(Debug, Clone)]
struct Entry {
    source: String,
    checksum: u32,
    origin: Origin,
}

/// A stored source as handed back by a persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStrategy {
    pub name: String,
    pub source: String,
}

pub struct StrategyRegistry {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    cache: HashMap<String, StrategyHandle>,
    limits: Limits,
    seed: u64,
    compile_timeout: Duration,
}

impl StrategyRegistry {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
            cache: HashMap::new(),
            limits: config.script_limits,
            seed: config.rng_seed,
            compile_timeout: config.time_budget(),
        }
    }

    pub fn is_builtin(name: &str) -> bool {
        BuiltinKind::from_name(name).is_some()
    }

    /// Registers or replaces an uploaded strategy. The source is compiled
    /// up front so a broken upload is never stored.
    #[instrument(skip(self, source), fields(bytes = source.len()))]
    pub fn register(&mut self, name: &str, source: &str) -> Result<(), RegistryError> {
        let name = checked_name(name)?;
        validate_strategy_upload(source)?;
        let checksum = crc32fast::hash(source.as_bytes());

        if let Some(entry) = self.entries.get(name)
            && entry.checksum == checksum
            && self.cache.contains_key(name)
        {
            debug!(name, "source unchanged; keeping compiled handle");
            return Ok(());
        }

        let handle = self.compile(source)?;
        self.insert(name, source, checksum, Origin::Uploaded);
        self.cache.insert(name.to_string(), handle);
        info!(name, checksum, "strategy registered");
        Ok(())
    }

    /// Stores a handle built by the analysis pipeline under `name`.
    #[instrument(skip(self, source, handle))]
    pub fn register_generated(
        &mut self,
        name: &str,
        source: &str,
        handle: StrategyHandle,
    ) -> Result<(), RegistryError> {
        let name = checked_name(name)?;
        let checksum = crc32fast::hash(source.as_bytes());
        self.insert(name, source, checksum, Origin::Generated);
        self.cache.insert(name.to_string(), handle);
        info!(name, "generated strategy registered");
        Ok(())
    }

    /// Source text of an uploaded or generated strategy; `None` for
    /// built-ins and unknown names.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.source.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        Self::is_builtin(name) || self.entries.contains_key(name)
    }

    /// Compiled handle for `name`, compiling on first use.
    pub fn handle(&mut self, name: &str) -> Result<StrategyHandle, RegistryError> {
        if let Some(handle) = self.cache.get(name) {
            return Ok(Rc::clone(handle));
        }
        let handle: StrategyHandle = if let Some(kind) = BuiltinKind::from_name(name) {
            Rc::new(RefCell::new(BuiltinStrategy::new(kind, self.seed)))
        } else {
            let entry = self
                .entries
                .get(name)
                .ok_or_else(|| RegistryError::UnknownStrategy(name.to_string()))?;
            if entry.origin == Origin::Generated {
                return Err(RegistryError::UnknownStrategy(name.to_string()));
            }
            let source = entry.source.clone();
            self.compile(&source)?
        };
        self.cache.insert(name.to_string(), Rc::clone(&handle));
        Ok(handle)
    }

    #[instrument(skip(self))]
    pub fn delete(&mut self, name: &str) -> Result<(), RegistryError> {
        if Self::is_builtin(name) {
            return Err(RegistryError::BuiltinProtected(name.to_string()));
        }
        if self.entries.remove(name).is_none() {
            return Err(RegistryError::UnknownStrategy(name.to_string()));
        }
        self.order.retain(|n| n != name);
        self.cache.remove(name);
        info!(name, "strategy deleted");
        Ok(())
    }

    /// Built-ins first, then everything else in registration order.
    pub fn list(&self) -> Vec<String> {
        BuiltinKind::ALL
            .iter()
            .map(|kind| kind.name().to_string())
            .chain(self.order.iter().cloned())
            .collect()
    }

    /// Re-registers stored sources. Entries that fail validation or do not
    /// compile are skipped and returned with their reason.
    #[instrument(skip_all, fields(count = stored.len()))]
    pub fn restore(&mut self, stored: &[StoredStrategy]) -> Vec<(String, RegistryError)> {
        let mut skipped = Vec::new();
        for entry in stored {
            if let Err(err) = self.register(&entry.name, &entry.source) {
                warn!(name = %entry.name, error = %err, "stored strategy skipped");
                skipped.push((entry.name.clone(), err));
            }
        }
        skipped
    }

    /// Uploaded and generated entries as `(name, source)`, for persistence.
    pub fn export(&self) -> Vec<StoredStrategy> {
        self.order
            .iter()
            .filter_map(|name| {
                let entry = self.entries.get(name)?;
                (entry.origin == Origin::Uploaded).then(|| StoredStrategy {
                    name: name.clone(),
                    source: entry.source.clone(),
                })
            })
            .collect()
    }

    fn compile(&self, source: &str) -> Result<StrategyHandle, RegistryError> {
        let strategy = ScriptStrategy::compile(
            source,
            PLAYER_ENTRY_POINT,
            self.limits,
            self.seed,
            Instant::now() + self.compile_timeout,
        )?;
        Ok(Rc::new(RefCell::new(strategy)))
    }

    fn insert(&mut self, name: &str, source: &str, checksum: u32, origin: Origin) {
        let entry = Entry {
            source: source.to_string(),
            checksum,
            origin,
        };
        if self.entries.insert(name.to_string(), entry).is_none() {
            self.order.push(name.to_string());
        }
        self.cache.remove(name);
    }
}

fn checked_name(name: &str) -> Result<&str, UploadError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(UploadError::EmptyName);
    }
    if StrategyRegistry::is_builtin(name) {
        return Err(UploadError::ReservedName(name.to_string()));
    }
    Ok(name)
}
