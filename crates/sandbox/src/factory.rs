//! Backend selection.

use std::sync::Arc;

use cellbox_core::{Error, Result, SandboxConfig};

use crate::container::ContainerSandbox;
use crate::engine::Sandbox;
use crate::local::LocalProcessSandbox;

/// Constructs the sandbox backend named in the configuration.
///
/// This is the single extension point for new backends: implement
/// [`Sandbox`], add an arm here, and no caller changes.
pub struct SandboxFactory {
    config: SandboxConfig,
}

impl SandboxFactory {
    /// Create a factory over a resolved configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Build the configured backend.
    ///
    /// Unknown backend names fail here, before any execution is attempted;
    /// they are never silently defaulted.
    pub fn get_sandbox(&self) -> Result<Arc<dyn Sandbox>> {
        match self.config.backend.to_lowercase().as_str() {
            "local" => Ok(Arc::new(LocalProcessSandbox::new(self.config.clone()))),
            "container" => Ok(Arc::new(ContainerSandbox::new(self.config.clone())?)),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_local_backend() {
        let factory = SandboxFactory::new(SandboxConfig::default());
        let sandbox = factory.get_sandbox().unwrap();
        assert_eq!(sandbox.backend(), "local");
    }

    #[test]
    fn selects_container_backend() {
        let mut config = SandboxConfig::default();
        config.backend = "container".to_string();
        let factory = SandboxFactory::new(config);
        // Client construction is lazy; no daemon is contacted here.
        let sandbox = factory.get_sandbox().unwrap();
        assert_eq!(sandbox.backend(), "container");
    }

    #[test]
    fn backend_name_is_case_insensitive() {
        let mut config = SandboxConfig::default();
        config.backend = "Local".to_string();
        assert!(SandboxFactory::new(config).get_sandbox().is_ok());
    }

    #[test]
    fn unknown_backend_fails_at_selection_time() {
        let mut config = SandboxConfig::default();
        config.backend = "microvm".to_string();
        let err = match SandboxFactory::new(config).get_sandbox() {
            Ok(_) => panic!("expected unknown backend to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::UnknownBackend(name) if name == "microvm"));
    }
}
