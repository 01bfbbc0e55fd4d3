//! Page instances and the runtime that owns them.
//!
//! Each instance has its own variable store, placement rules and node
//! namespace on the shared surface. The runtime is the entry point hosts
//! call into; everything funnels through [`Runtime::apply`].

use super::engine::{self, CascadeReport};
use super::error::{Result, WeftError};
use super::path;
use super::types::{PageBundle, PlacementTable, RuntimeOptions, Value, VariableStore};
use crate::surface::memory::MemorySurface;
use crate::surface::RenderSurface;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

/// One running copy of a compiled page.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub store: VariableStore,
    pub placements: PlacementTable,
    pub options: RuntimeOptions,
}

impl Instance {
    pub fn new(id: &str, store: VariableStore) -> Self {
        Self {
            id: id.to_string(),
            store,
            placements: PlacementTable::new(),
            options: RuntimeOptions::default(),
        }
    }

    pub fn from_bundle(bundle: &PageBundle) -> Self {
        Self {
            id: bundle.instance.clone(),
            store: bundle.variables.clone(),
            placements: bundle.external_children.clone(),
            options: bundle.options.clone(),
        }
    }
}

/// Instances sharing one render surface.
#[derive(Debug)]
pub struct Runtime<S: RenderSurface> {
    surface: S,
    instances: IndexMap<String, Instance>,
}

impl<S: RenderSurface> Runtime<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            instances: IndexMap::new(),
        }
    }

    /// Register an instance. Replaces any instance with the same id.
    pub fn init(&mut self, instance: Instance) {
        info!(
            instance = %instance.id,
            variables = instance.store.len(),
            placements = instance.placements.len(),
            "instance initialized"
        );
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    pub(crate) fn instance_or_err(&self, id: &str) -> Result<&Instance> {
        self.instances.get(id).ok_or_else(|| {
            warn!(instance = %id, "unknown instance");
            WeftError::MissingInstance(id.to_string())
        })
    }

    /// Write `value` to `variable` in `instance` and run the cascade.
    ///
    /// Unknown instances and variables are refused before anything changes.
    pub fn apply(&mut self, instance: &str, variable: &str, value: Value) -> Result<CascadeReport> {
        let inst = self.instances.get_mut(instance).ok_or_else(|| {
            warn!(instance = %instance, "unknown instance");
            WeftError::MissingInstance(instance.to_string())
        })?;
        let base = path::base_name(variable);
        if !inst.store.contains_key(&base) {
            warn!(instance = %instance, variable = %variable, "variable not in store, ignoring");
            return Err(WeftError::MissingVariable(base));
        }
        let report = engine::apply(inst, &mut self.surface, variable, value);
        debug!(
            instance = %instance,
            variable = %variable,
            applied = report.applied.len(),
            refused = report.refused.len(),
            "cascade finished"
        );
        Ok(report)
    }

    /// Read the raw value at `variable`.
    pub fn get_value(&self, instance: &str, variable: &str) -> Result<Value> {
        path::get(&self.instance_or_err(instance)?.store, variable)
    }

    /// Apply `value` to `variable` in every instance that has it.
    pub fn set_for_all(&mut self, variable: &str, value: &Value) -> Vec<CascadeReport> {
        let base = path::base_name(variable);
        let ids: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, inst)| inst.store.contains_key(&base))
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.apply(id, variable, value.clone()).ok())
            .collect()
    }
}

impl Runtime<MemorySurface> {
    /// Mount a bundle's node tree and register its instance.
    pub fn from_bundle(bundle: &PageBundle) -> Self {
        let mut runtime = Self::new(MemorySurface::new());
        runtime.mount(bundle);
        runtime
    }

    pub fn mount(&mut self, bundle: &PageBundle) {
        self.surface.mount(&bundle.instance, &bundle.nodes);
        self.init(Instance::from_bundle(bundle));
    }
}
