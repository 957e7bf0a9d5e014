//! Initial values applied while a model is being initialized.

use crate::clock::FloatValue;
use crate::errors::{CosimError, CosimResult};
use crate::model::ModelInstance;
use std::collections::BTreeMap;

/// Ordered set of `(variable name, value)` pairs applied during initialization.
///
/// Initial conditions are applied before model parameters, so a parameter
/// overrides an initial condition of the same name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartValues {
    values: Vec<(String, FloatValue)>,
}

impl StartValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine the initial conditions and parameters from the settings.
    pub fn from_settings(
        initial_conditions: &BTreeMap<String, FloatValue>,
        model_params: &BTreeMap<String, FloatValue>,
    ) -> Self {
        let values = initial_conditions
            .iter()
            .chain(model_params.iter())
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        Self { values }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: FloatValue) -> Self {
        self.values.push((name.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FloatValue)> {
        self.values.iter()
    }

    /// Set every value on `instance`.
    ///
    /// Fails with a configuration error if a name is not a model variable.
    pub fn apply(&self, instance: &mut dyn ModelInstance) -> CosimResult<()> {
        for (name, value) in &self.values {
            let reference = instance.description().value_reference(name).ok_or_else(|| {
                CosimError::configuration(format!(
                    "Cannot set start value for '{}': model '{}' has no such variable",
                    name,
                    instance.description().model_name
                ))
            })?;
            instance.set_real(&[reference], &[*value])?;
        }
        Ok(())
    }
}
