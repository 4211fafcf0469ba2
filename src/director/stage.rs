//! Stages
//!
//! A stage is a named, ordered list of passes with a visibility flag.
//! Stages execute in registration order; hiding a stage skips its passes
//! without unregistering them.

use rustc_hash::FxHashSet;

use crate::errors::{Error, Result};
use crate::handles::PassHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: String,
    pub passes: Vec<PassHandle>,
    /// Visible stages default to `true`.
    pub visible: bool,
}

impl StageDescriptor {
    #[must_use]
    pub fn new(name: &str, passes: impl IntoIterator<Item = PassHandle>) -> Self {
        Self {
            name: name.to_string(),
            passes: passes.into_iter().collect(),
            visible: true,
        }
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    name: String,
    passes: Vec<PassHandle>,
    visible: bool,
}

impl Stage {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn passes(&self) -> &[PassHandle] {
        &self.passes
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

#[derive(Debug, Default)]
pub(crate) struct StageRegistry {
    stages: Vec<Stage>,
}

impl StageRegistry {
    pub fn add(&mut self, desc: StageDescriptor) -> Result<()> {
        if desc.name.is_empty() {
            return Err(Error::MissingField {
                context: "stage description".to_string(),
                field: "name",
            });
        }
        if self.get(&desc.name).is_some() {
            return Err(Error::DuplicateStage(desc.name));
        }
        self.stages.push(Stage {
            name: desc.name,
            passes: desc.passes,
            visible: desc.visible,
        });
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Stage> {
        let index = self.stages.iter().position(|s| s.name == name)?;
        Some(self.stages.remove(index))
    }

    /// Returns `false` for an unknown stage.
    pub fn set_visible(&mut self, name: &str, visible: bool) -> bool {
        match self.stages.iter_mut().find(|s| s.name == name) {
            Some(stage) => {
                stage.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    /// Passes of every visible stage in execution order. A pass listed in
    /// several stages runs once, at its first position.
    pub fn visible_passes(&self) -> Vec<PassHandle> {
        let mut seen = FxHashSet::default();
        self.stages
            .iter()
            .filter(|s| s.visible)
            .flat_map(|s| s.passes.iter().copied())
            .filter(|p| seen.insert(*p))
            .collect()
    }

    pub fn remove_pass(&mut self, pass: PassHandle) {
        for stage in &mut self.stages {
            stage.passes.retain(|p| *p != pass);
        }
    }
}
