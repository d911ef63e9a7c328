// SPDX-License-Identifier: PMPL-1.0-or-later
//! Driver registry and per-app driver selection.
//!
//! Drivers are built by name from a registry. A manager always has the
//! document-store driver as its default and may add one custom driver,
//! which serves the apps it claims. Selection is a pure function of the
//! app name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use datagate_storage::InMemoryBackend;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::document::{DocumentStoreDriver, MemoryDocumentServer};
use crate::driver::Driver;
use crate::embedded::EmbeddedDriver;
use crate::error::GatewayError;
use crate::kind::{BackendKindStore, KindStoreDriver};

pub const DOCUMENT_DRIVER: &str = "document";
pub const KIND_DRIVER: &str = "kind";
pub const EMBEDDED_DRIVER: &str = "embedded";

/// Which apps a driver serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppScope {
    #[default]
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl AppScope {
    pub fn includes(&self, app_name: &str) -> bool {
        match self {
            AppScope::All => true,
            AppScope::Only(apps) => apps.iter().any(|a| a == app_name),
            AppScope::Except(apps) => !apps.iter().any(|a| a == app_name),
        }
    }
}

type DriverFactory =
    Arc<dyn Fn(&GatewayConfig, AppScope) -> Result<Arc<dyn Driver>, GatewayError> + Send + Sync>;

/// Named driver constructors.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// `document`, `kind` and `embedded`, each over an in-process backend.
    ///
    /// Data in the document and kind backends is shared by every driver this
    /// registry builds, so it survives connection reaping and manager
    /// restarts for the life of the registry.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        let server = MemoryDocumentServer::new();
        registry.register(DOCUMENT_DRIVER, move |config, scope| {
            let driver =
                DocumentStoreDriver::new(Arc::new(server.clone()), config.unified_database.clone())
                    .with_scope(scope);
            Ok(Arc::new(driver) as Arc<dyn Driver>)
        });

        let kinds = InMemoryBackend::new();
        registry.register(KIND_DRIVER, move |_, scope| {
            let store = BackendKindStore::new(Arc::new(kinds.clone()));
            let driver = KindStoreDriver::new(Arc::new(store)).with_scope(scope);
            Ok(Arc::new(driver) as Arc<dyn Driver>)
        });

        registry.register(EMBEDDED_DRIVER, |config, scope| {
            let driver = match &config.embedded_path {
                Some(path) => EmbeddedDriver::open(path)?,
                None => EmbeddedDriver::in_memory(),
            };
            Ok(Arc::new(driver.with_scope(scope)) as Arc<dyn Driver>)
        });

        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&GatewayConfig, AppScope) -> Result<Arc<dyn Driver>, GatewayError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(
        &self,
        name: &str,
        config: &GatewayConfig,
        scope: AppScope,
    ) -> Result<Arc<dyn Driver>, GatewayError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GatewayError::UnknownDriver(name.to_string()))?;
        factory(config, scope)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

/// The drivers instantiated for one manager.
pub struct DriverSet {
    default: Arc<dyn Driver>,
    custom: Option<Arc<dyn Driver>>,
}

impl DriverSet {
    pub fn new(default: Arc<dyn Driver>, custom: Option<Arc<dyn Driver>>) -> Self {
        Self { default, custom }
    }

    /// Build the default document driver plus the configured custom driver.
    pub fn resolve(config: &GatewayConfig, registry: &DriverRegistry) -> Result<Self, GatewayError> {
        let default = registry.build(DOCUMENT_DRIVER, config, AppScope::All)?;
        let custom = config
            .custom_driver
            .as_ref()
            .map(|custom| registry.build(&custom.name, config, custom.apps.clone()))
            .transpose()?;
        Ok(Self::new(default, custom))
    }

    pub fn default_driver(&self) -> &Arc<dyn Driver> {
        &self.default
    }

    pub fn custom_driver(&self) -> Option<&Arc<dyn Driver>> {
        self.custom.as_ref()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Driver>> {
        std::iter::once(&self.default).chain(self.custom.iter())
    }
}

/// The custom driver if it serves `app_name`, otherwise the default.
pub fn select_driver<'a>(drivers: &'a DriverSet, app_name: &str) -> &'a Arc<dyn Driver> {
    match &drivers.custom {
        Some(custom) if custom.supports_app(app_name) => custom,
        _ => &drivers.default,
    }
}
