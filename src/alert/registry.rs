//! Construction of alerts from saved records.
//!
//! Configuration persistence lives outside the engine; what the engine side
//! provides is the mapping from a saved record back to a live alert. The
//! registry is an explicit, closed map from a string kind tag to a factory
//! function, populated once at startup by the composition root. There is no
//! runtime reflection: an unrecognized kind is a typed error, not a missing
//! class.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::alert::AlertRef;
use crate::error::RegistryError;

/// A persisted alert description: which kind of alert, and its configuration
/// as an opaque JSON string interpreted by that kind's factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAlert {
    /// The registered kind tag, e.g. `"twitch-chat"`.
    pub kind: String,
    /// Kind-specific configuration, JSON-encoded.
    pub config: String,
}

impl SavedAlert {
    /// Creates a saved-alert record.
    #[must_use]
    pub fn new(kind: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: config.into(),
        }
    }
}

/// Factory producing a live alert from its JSON configuration string.
pub type AlertFactory = Box<dyn Fn(&str) -> Result<AlertRef, RegistryError> + Send + Sync>;

/// Maps alert kind tags to factory functions.
///
/// Registered once at startup; later lookups are read-only. Registering the
/// same kind twice replaces the earlier factory, which keeps startup
/// idempotent for composition roots that run registration on every launch.
#[derive(Default)]
pub struct AlertRegistry {
    factories: HashMap<String, AlertFactory>,
}

impl AlertRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for a kind tag, replacing any previous one.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&str) -> Result<AlertRef, RegistryError> + Send + Sync + 'static,
    ) {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Whether a factory is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// The registered kind tags, in arbitrary order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds a live alert from a saved record.
    ///
    /// # Errors
    ///
    /// `RegistryError::UnknownKind` when no factory is registered for the
    /// record's kind; whatever the factory itself returns (typically
    /// `RegistryError::InvalidConfig`) when the config string does not parse.
    pub fn build(&self, saved: &SavedAlert) -> Result<AlertRef, RegistryError> {
        let factory = self
            .factories
            .get(&saved.kind)
            .ok_or_else(|| RegistryError::UnknownKind {
                kind: saved.kind.clone(),
            })?;

        factory(&saved.config)
    }

    /// Convenience for JSON-configured kinds: registers a factory that
    /// deserializes the config string into `C` before constructing.
    pub fn register_json<C, F>(&mut self, kind: impl Into<String>, construct: F)
    where
        C: for<'de> Deserialize<'de>,
        F: Fn(C) -> AlertRef + Send + Sync + 'static,
    {
        let kind = kind.into();
        let kind_for_errors = kind.clone();
        self.register(kind, move |config| {
            let parsed: C =
                serde_json::from_str(config).map_err(|e| RegistryError::InvalidConfig {
                    kind: kind_for_errors.clone(),
                    reason: e.to_string(),
                })?;
            Ok(construct(parsed))
        });
    }
}

impl std::fmt::Debug for AlertRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
