use crate::analyzer::{AnalyzerProvider, AnalyzerSet};
use crate::config::CoordinatorConfig;
use crate::context::CoordinatorServices;
use crate::coordinator::WorkCoordinator;
use crate::error::Result;
use crate::work_item::ReanalyzeScope;
use crawler_workspace::Workspace;
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide set of analyzer providers and the coordinator running for
/// each registered workspace
#[derive(Default)]
pub struct AnalyzerRegistry {
    providers: Mutex<Vec<Arc<dyn AnalyzerProvider>>>,
    coordinators: Mutex<Vec<(Arc<Workspace>, WorkCoordinator)>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(self, provider: Arc<dyn AnalyzerProvider>) -> Self {
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(provider);
        self
    }

    /// Start a coordinator for `workspace` with one analyzer per applicable
    /// provider. Registering the same workspace twice returns the running one.
    pub fn register(
        &self,
        workspace: Arc<Workspace>,
        config: CoordinatorConfig,
        services: CoordinatorServices,
    ) -> Result<WorkCoordinator> {
        let mut coordinators = self.coordinators.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, running)) = coordinators.iter().find(|(ws, _)| Arc::ptr_eq(ws, &workspace)) {
            log::warn!("workspace already registered; reusing its coordinator");
            return Ok(running.clone());
        }

        let mut analyzers = AnalyzerSet::new();
        for provider in self.providers.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            let metadata = provider.metadata();
            if metadata.applies_to(workspace.kind()) {
                analyzers.push(metadata, provider.create(&workspace));
            }
        }

        let coordinator = WorkCoordinator::start(Arc::clone(&workspace), config, analyzers, services)?;
        coordinators.push((workspace, coordinator.clone()));
        Ok(coordinator)
    }

    /// Stop and forget the coordinator of `workspace`, if any
    pub async fn unregister(&self, workspace: &Arc<Workspace>, blocking: bool) -> Result<()> {
        let removed = {
            let mut coordinators = self.coordinators.lock().unwrap_or_else(PoisonError::into_inner);
            coordinators
                .iter()
                .position(|(ws, _)| Arc::ptr_eq(ws, workspace))
                .map(|idx| coordinators.remove(idx).1)
        };
        match removed {
            Some(coordinator) => coordinator.shutdown(blocking).await,
            None => Ok(()),
        }
    }

    /// Add a provider at runtime. Every registered coordinator whose
    /// workspace it applies to gets the analyzer and a full reanalysis
    /// restricted to it.
    pub fn add_provider(&self, provider: Arc<dyn AnalyzerProvider>) -> Result<()> {
        let metadata = provider.metadata();
        log::info!("analyzer provider '{}' added", metadata.name);
        let coordinators: Vec<_> = self
            .coordinators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&provider));

        for (workspace, coordinator) in coordinators {
            if !metadata.applies_to(workspace.kind()) {
                continue;
            }
            let analyzer = provider.create(&workspace);
            if let Some(id) = coordinator.add_analyzer(metadata.clone(), analyzer) {
                coordinator.reanalyze(Some(id), ReanalyzeScope::Solution, false)?;
            }
        }
        Ok(())
    }

    pub fn coordinator_for(&self, workspace: &Arc<Workspace>) -> Option<WorkCoordinator> {
        self.coordinators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(ws, _)| Arc::ptr_eq(ws, workspace))
            .map(|(_, coordinator)| coordinator.clone())
    }

    pub fn provider_count(&self) -> usize {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
