//! The set of collaborators a bring-up runs against

use std::sync::Arc;
use tessera_interfaces::{CollectiveProvider, ComputeProvider, DeviceBackend, SamplerFactory};

/// Collaborator bundle handed to [`ResourceManager`](crate::ResourceManager)
#[derive(Clone)]
pub struct Platform {
    pub backend: Arc<dyn DeviceBackend>,
    pub compute: Arc<dyn ComputeProvider>,
    /// Required only when more than one device is brought up
    pub collective: Option<Arc<dyn CollectiveProvider>>,
    pub sampler_factory: Arc<dyn SamplerFactory>,
}

impl Platform {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        compute: Arc<dyn ComputeProvider>,
        sampler_factory: Arc<dyn SamplerFactory>,
    ) -> Self {
        Self {
            backend,
            compute,
            collective: None,
            sampler_factory,
        }
    }

    pub fn with_collective(mut self, collective: Arc<dyn CollectiveProvider>) -> Self {
        self.collective = Some(collective);
        self
    }

    /// Every collaborator served by one simulated platform
    #[cfg(feature = "simulated")]
    pub fn simulated(sim: Arc<tessera_runtime::SimulatedPlatform>) -> Self {
        Self::new(sim.clone(), sim.clone(), sim.clone()).with_collective(sim)
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("backend", &self.backend.name())
            .field("compute", &self.compute.name())
            .field("collective", &self.collective.as_ref().map(|c| c.name()))
            .finish()
    }
}
