use crate::{CameraPipelineModule, PipelineError, Result};

/// Ordered collection of pipeline modules keyed by unique name.
///
/// Registration order is invocation order for every lifecycle event and is
/// never rearranged.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn CameraPipelineModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `module`. Fails without touching the registry if the name is
    /// already taken.
    pub fn register(&mut self, module: Box<dyn CameraPipelineModule>) -> Result<()> {
        if self.contains(module.name()) {
            return Err(PipelineError::DuplicateModuleName(module.name().to_string()));
        }
        tracing::debug!(module = module.name(), position = self.modules.len(), "module registered");
        self.modules.push(module);
        Ok(())
    }

    /// Removes and returns the named module. Absent names are a no-op.
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn CameraPipelineModule>> {
        let index = self.modules.iter().position(|module| module.name() == name)?;
        tracing::debug!(module = name, "module unregistered");
        Some(self.modules.remove(index))
    }

    /// Snapshot of module names in invocation order.
    pub fn list(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|module| module.name().to_string())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.iter().any(|module| module.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn CameraPipelineModule + 'static)> {
        self.modules
            .iter_mut()
            .find(|module| module.name() == name)
            .map(|module| module.as_mut())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut Box<dyn CameraPipelineModule>> {
        self.modules.iter_mut()
    }

    /// Removes every module, preserving registration order in the result.
    pub(crate) fn drain(&mut self) -> Vec<Box<dyn CameraPipelineModule>> {
        std::mem::take(&mut self.modules)
    }
}
