//! Maps device type names to constructors.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::device::{DeviceProtocol, PetkitFountain, PETKIT_FOUNTAIN};
use crate::error::RegistryError;
use crate::transport::Transport;

/// Everything a factory needs to build a device.
pub struct DeviceSpec {
    /// Name used in logs and metric labels.
    pub name: String,
    pub transport: Arc<dyn Transport>,
    pub config: EngineConfig,
}

/// Builds a device from a [`DeviceSpec`].
pub type DeviceFactory = fn(DeviceSpec) -> Box<dyn DeviceProtocol>;

/// Known device types. Built at startup and passed to whoever creates devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    factories: BTreeMap<String, DeviceFactory>,
}

impl DeviceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every device type this crate implements.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PETKIT_FOUNTAIN, petkit_fountain);
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, device_type: impl Into<String>, factory: DeviceFactory) {
        self.factories.insert(device_type.into(), factory);
    }

    pub fn contains(&self, device_type: &str) -> bool {
        self.factories.contains_key(device_type)
    }

    /// Registered type names, sorted.
    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build a device of the given type.
    pub fn create(
        &self,
        device_type: &str,
        spec: DeviceSpec,
    ) -> Result<Box<dyn DeviceProtocol>, RegistryError> {
        let factory = self
            .factories
            .get(device_type)
            .ok_or_else(|| RegistryError::UnknownDeviceType(device_type.to_string()))?;
        Ok(factory(spec))
    }
}

fn petkit_fountain(spec: DeviceSpec) -> Box<dyn DeviceProtocol> {
    Box::new(PetkitFountain::new(spec.name, spec.transport, spec.config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn spec() -> DeviceSpec {
        DeviceSpec {
            name: "kitchen".to_string(),
            transport: Arc::new(ScriptedTransport::new()),
            config: EngineConfig::default(),
        }
    }

    #[test]
    fn test_defaults_include_fountain() {
        let registry = DeviceRegistry::with_defaults();
        assert!(registry.contains(PETKIT_FOUNTAIN));
        assert_eq!(registry.device_types().collect::<Vec<_>>(), vec![PETKIT_FOUNTAIN]);

        let device = registry.create(PETKIT_FOUNTAIN, spec()).expect("registered");
        assert_eq!(device.device_type(), PETKIT_FOUNTAIN);
        assert_eq!(device.name(), "kitchen");
    }

    #[test]
    fn test_unknown_type() {
        let registry = DeviceRegistry::new();
        assert_eq!(
            registry.create("s06_soil", spec()).err(),
            Some(RegistryError::UnknownDeviceType("s06_soil".to_string()))
        );
    }
}
