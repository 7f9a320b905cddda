//! Process-wide stream constructor registration
//!
//! Hosts that expose stream constructors by name (scripting bridges, plugin
//! hosts) look them up in a [`GlobalScope`]. [`install`] adds
//! `CompressionStream` and `DecompressionStream` to a scope unless the scope
//! already defines them, so a native implementation is never replaced.
//!
//! ```rust
//! use armature_compression_streams::global::{self, GlobalScope, COMPRESSION_STREAM};
//! use serde_json::json;
//!
//! let scope = GlobalScope::new();
//! let installation = global::install(&scope);
//! assert_eq!(installation.installed, vec!["CompressionStream", "DecompressionStream"]);
//!
//! let stream = scope.construct(COMPRESSION_STREAM, &json!("gzip")).unwrap();
//! assert_eq!(stream.format().as_str(), "gzip");
//! ```

use crate::adapter::{CompressionStream, DecompressionStream, TransformStream};
use crate::{CompressionError, Result};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Name under which the compression constructor is installed.
pub const COMPRESSION_STREAM: &str = "CompressionStream";
/// Name under which the decompression constructor is installed.
pub const DECOMPRESSION_STREAM: &str = "DecompressionStream";

/// Constructor taking a dynamically typed format argument.
pub type StreamConstructor = fn(&serde_json::Value) -> Result<TransformStream>;

/// How a binding may be used once defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// The binding's value may be reassigned
    pub writable: bool,
    /// The binding shows up in [`GlobalScope::enumerable_names`]
    pub enumerable: bool,
    /// The binding may be redefined or removed
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Attributes used for installed stream constructors.
    pub const fn hidden() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    constructor: StreamConstructor,
    attributes: PropertyAttributes,
}

/// Named constructor bindings.
#[derive(Debug, Default)]
pub struct GlobalScope {
    bindings: RwLock<HashMap<String, Binding>>,
}

static GLOBAL_SCOPE: Lazy<GlobalScope> = Lazy::new(GlobalScope::new);
static GLOBAL_INSTALLATION: OnceCell<Installation> = OnceCell::new();

impl GlobalScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide scope.
    pub fn global() -> &'static GlobalScope {
        &GLOBAL_SCOPE
    }

    /// Define (or redefine) a binding.
    ///
    /// Fails if an existing binding is not configurable.
    pub fn define(
        &self,
        name: impl Into<String>,
        constructor: StreamConstructor,
        attributes: PropertyAttributes,
    ) -> Result<()> {
        let name = name.into();
        let mut bindings = self.bindings.write();
        if let Some(existing) = bindings.get(&name) {
            if !existing.attributes.configurable {
                return Err(CompressionError::Config(format!(
                    "cannot redefine non-configurable binding {}",
                    name
                )));
            }
        }
        bindings.insert(
            name,
            Binding {
                constructor,
                attributes,
            },
        );
        Ok(())
    }

    /// Reassign the constructor of an existing writable binding.
    pub fn assign(&self, name: &str, constructor: StreamConstructor) -> Result<()> {
        let mut bindings = self.bindings.write();
        match bindings.get_mut(name) {
            Some(binding) if binding.attributes.writable => {
                binding.constructor = constructor;
                Ok(())
            }
            Some(_) => Err(CompressionError::Config(format!(
                "binding {} is not writable",
                name
            ))),
            None => Err(CompressionError::Config(format!("no binding named {}", name))),
        }
    }

    /// Look up a constructor.
    pub fn get(&self, name: &str) -> Option<StreamConstructor> {
        self.bindings.read().get(name).map(|b| b.constructor)
    }

    /// Attributes of a binding.
    pub fn attributes(&self, name: &str) -> Option<PropertyAttributes> {
        self.bindings.read().get(name).map(|b| b.attributes)
    }

    /// Whether a binding exists.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    /// Remove a configurable binding. Returns whether it was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut bindings = self.bindings.write();
        match bindings.get(name) {
            Some(binding) if binding.attributes.configurable => {
                bindings.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Names of enumerable bindings, sorted.
    pub fn enumerable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .bindings
            .read()
            .iter()
            .filter(|(_, b)| b.attributes.enumerable)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Call the constructor bound to `name`.
    pub fn construct(&self, name: &str, format: &serde_json::Value) -> Result<TransformStream> {
        let constructor = self
            .get(name)
            .ok_or_else(|| CompressionError::Config(format!("no binding named {}", name)))?;
        constructor(format)
    }
}

/// Outcome of [`install`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Installation {
    /// Names this call defined
    pub installed: Vec<&'static str>,
    /// Names left alone because the scope already defined them
    pub skipped: Vec<&'static str>,
}

fn construct_compression(format: &serde_json::Value) -> Result<TransformStream> {
    CompressionStream::from_value(format).map(TransformStream::from)
}

fn construct_decompression(format: &serde_json::Value) -> Result<TransformStream> {
    DecompressionStream::from_value(format).map(TransformStream::from)
}

/// Install the stream constructors into `scope` where absent.
pub fn install(scope: &GlobalScope) -> Installation {
    let constructors: [(&'static str, StreamConstructor); 2] = [
        (COMPRESSION_STREAM, construct_compression),
        (DECOMPRESSION_STREAM, construct_decompression),
    ];

    let mut installation = Installation::default();
    for (name, constructor) in constructors {
        // Hold the write lock across check and insert so concurrent installs
        // cannot both define the same name.
        let mut bindings = scope.bindings.write();
        if bindings.contains_key(name) {
            debug!(name, "constructor already defined, skipping");
            installation.skipped.push(name);
            continue;
        }
        bindings.insert(
            name.to_string(),
            Binding {
                constructor,
                attributes: PropertyAttributes::hidden(),
            },
        );
        installation.installed.push(name);
    }

    info!(
        installed = ?installation.installed,
        skipped = ?installation.skipped,
        "compression stream constructors registered"
    );
    installation
}

/// Install into the process-wide scope.
///
/// Runs at most once per process; later calls return the first result.
pub fn install_global() -> &'static Installation {
    GLOBAL_INSTALLATION.get_or_init(|| install(GlobalScope::global()))
}
