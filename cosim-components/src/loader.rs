use crate::models::{IncrementModel, OscillatorModel};
use cosim_core::errors::{CosimError, CosimResult};
use cosim_core::model::{ModelInstance, ModelPackageLoader};
use log::debug;
use std::path::Path;

const BUILTIN_PREFIX: &str = "builtin:";

/// Resolves `builtin:<name>` references to the models in this crate.
///
/// Packaged models (`.fmu` archives) need a model runtime, which is not part
/// of this crate, and are rejected with a configuration error.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinModels;

impl BuiltinModels {
    pub const NAMES: [&'static str; 2] = ["increment", "oscillator"];

    pub fn new() -> Self {
        Self
    }
}

impl ModelPackageLoader for BuiltinModels {
    fn load(&self, reference: &str, instance_name: &str) -> CosimResult<Box<dyn ModelInstance>> {
        let Some(name) = reference.strip_prefix(BUILTIN_PREFIX) else {
            let is_package = Path::new(reference)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("fmu"));
            return Err(CosimError::Configuration(if is_package {
                format!(
                    "Cannot load model package '{}': no FMI runtime is available, use one of the builtin models ({})",
                    reference,
                    builtin_list()
                )
            } else {
                format!(
                    "Unknown model reference '{}': expected '{}<name>' with one of {}",
                    reference,
                    BUILTIN_PREFIX,
                    builtin_list()
                )
            }));
        };

        debug!("Instantiating builtin model '{}' as '{}'", name, instance_name);
        match name {
            "increment" => Ok(Box::new(IncrementModel::default())),
            "oscillator" => Ok(Box::new(OscillatorModel::default())),
            _ => Err(CosimError::Configuration(format!(
                "Unknown builtin model '{}': expected one of {}",
                name,
                builtin_list()
            ))),
        }
    }
}

fn builtin_list() -> String {
    BuiltinModels::NAMES
        .iter()
        .map(|name| format!("{}{}", BUILTIN_PREFIX, name))
        .collect::<Vec<_>>()
        .join(", ")
}
