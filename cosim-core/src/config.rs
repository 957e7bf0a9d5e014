//! Settings documents for a coupled run.
//!
//! A run is described by two documents: the model settings (which model
//! package, which variables are exchanged, start values, driving signals and
//! where results go) and the coupling settings (participant, mesh and the
//! exchanged fields). Both can be written as JSON or TOML; the format is
//! chosen from the file extension.

use crate::clock::{FloatValue, Time};
use crate::coupling::{CouplingScheme, ImplicitSettings};
use crate::errors::{CosimError, CosimResult};
use crate::field::{DataField, DataType};
use crate::model::StartValues;
use crate::signals::{InterpolationStrategy, SignalTable};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Parse a settings document, choosing the format from the extension.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> CosimResult<T> {
    let contents = fs::read_to_string(path).map_err(|e| {
        CosimError::configuration(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => serde_json::from_str(&contents).map_err(|e| {
            CosimError::configuration(format!("Invalid JSON in {}: {}", path.display(), e))
        }),
        Some("toml") => toml::from_str(&contents).map_err(|e| {
            CosimError::configuration(format!("Invalid TOML in {}: {}", path.display(), e))
        }),
        _ => Err(CosimError::configuration(format!(
            "Unsupported settings format for {} (expected .json or .toml)",
            path.display()
        ))),
    }
}

fn require_name(value: &str, what: &str) -> CosimResult<()> {
    if value.trim().is_empty() {
        return Err(CosimError::configuration(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn require_names(values: &[String], what: &str) -> CosimResult<()> {
    if values.is_empty() {
        return Err(CosimError::configuration(format!(
            "{} must name at least one variable",
            what
        )));
    }
    for value in values {
        require_name(value, what)?;
    }
    Ok(())
}

// ============================================================================
// Model settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Model package reference
    pub fmu_file_name: String,
    pub fmu_instance_name: String,
    pub output_file_name: PathBuf,
    /// Variables recorded for every committed window.
    /// Defaults to the written variables when empty.
    #[serde(default)]
    pub output: Vec<String>,
    /// Model inputs set from the read field, in component order
    pub fmu_read_data_names: Vec<String>,
    /// Model outputs sent as the write field, in component order
    pub fmu_write_data_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSignalSettings {
    /// Column names; the first column is the time
    pub names: Vec<String>,
    pub data: Vec<Vec<FloatValue>>,
    #[serde(default)]
    pub interpolation: InterpolationStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub simulation_params: SimulationParams,
    #[serde(default)]
    pub initial_conditions: BTreeMap<String, FloatValue>,
    #[serde(default)]
    pub model_params: BTreeMap<String, FloatValue>,
    #[serde(default)]
    pub input_signals: Option<InputSignalSettings>,
}

impl ModelSettings {
    /// Load and validate model settings.
    pub fn from_file(path: &Path) -> CosimResult<Self> {
        let settings: Self = load_document(path)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> CosimResult<()> {
        let params = &self.simulation_params;
        require_name(&params.fmu_file_name, "fmu_file_name")?;
        require_name(&params.fmu_instance_name, "fmu_instance_name")?;
        if params.output_file_name.as_os_str().is_empty() {
            return Err(CosimError::configuration(
                "output_file_name must not be empty",
            ));
        }
        require_names(&params.fmu_read_data_names, "fmu_read_data_names")?;
        require_names(&params.fmu_write_data_names, "fmu_write_data_names")?;
        for name in &params.output {
            require_name(name, "output")?;
        }
        self.signal_table()?;
        Ok(())
    }

    pub fn start_values(&self) -> StartValues {
        StartValues::from_settings(&self.initial_conditions, &self.model_params)
    }

    /// Variables recorded for every committed window.
    pub fn recorded_variables(&self) -> &[String] {
        let params = &self.simulation_params;
        if params.output.is_empty() {
            &params.fmu_write_data_names
        } else {
            &params.output
        }
    }

    /// The driving signals, if any were configured.
    pub fn signal_table(&self) -> CosimResult<Option<SignalTable>> {
        self.input_signals
            .as_ref()
            .map(|signals| {
                SignalTable::from_rows(&signals.names, &signals.data, signals.interpolation)
            })
            .transpose()
    }
}

// ============================================================================
// Coupling settings
// ============================================================================

/// Declaration of an exchanged field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Number of components. Vector fields may leave this to the participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl FieldSettings {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Scalar,
            dimensions: None,
        }
    }

    pub fn vector(name: impl Into<String>, dimensions: Option<usize>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Vector,
            dimensions,
        }
    }

    /// Fix the field's dimensionality.
    ///
    /// `reported` is the number of components known to the participant.
    /// A declared value must agree with it.
    pub fn resolve(&self, reported: Option<usize>) -> CosimResult<DataField> {
        let dimensions = match (self.data_type, self.dimensions, reported) {
            (_, Some(declared), Some(reported)) if declared != reported => {
                return Err(CosimError::configuration(format!(
                    "Field '{}' is declared with {} components but the participant reports {}",
                    self.name, declared, reported
                )))
            }
            (_, Some(declared), _) => declared,
            (DataType::Scalar, None, reported) => reported.unwrap_or(1),
            (DataType::Vector, None, Some(reported)) => reported,
            (DataType::Vector, None, None) => {
                return Err(CosimError::configuration(format!(
                    "Vector field '{}' needs its number of dimensions declared",
                    self.name
                )))
            }
        };
        DataField::declare(&self.name, self.data_type, dimensions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingParams {
    pub participant_name: String,
    /// Configuration file of the coupling middleware
    #[serde(default)]
    pub config_file_name: String,
    pub mesh_name: String,
    pub read_data: FieldSettings,
    pub write_data: FieldSettings,
}

fn default_peer_instance() -> String {
    "peer".to_string()
}

/// A peer model coupled in the same process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSettings {
    /// Model package reference
    pub model: String,
    #[serde(default = "default_peer_instance")]
    pub instance_name: String,
    /// Peer inputs receiving the local model's written field
    pub read_data_names: Vec<String>,
    /// Peer outputs sent as the local model's read field
    pub write_data_names: Vec<String>,
    #[serde(default)]
    pub initial_conditions: BTreeMap<String, FloatValue>,
    #[serde(default)]
    pub model_params: BTreeMap<String, FloatValue>,
    pub window_size: Time,
    pub end_time: Time,
    #[serde(default)]
    pub scheme: CouplingScheme,
    #[serde(default)]
    pub implicit: ImplicitSettings,
    /// Send the local model's initial outputs to the peer before it starts
    #[serde(default)]
    pub initial_data: bool,
}

impl PeerSettings {
    pub fn validate(&self) -> CosimResult<()> {
        require_name(&self.model, "peer.model")?;
        require_names(&self.read_data_names, "peer.read_data_names")?;
        require_names(&self.write_data_names, "peer.write_data_names")?;
        if !(self.window_size > 0.0) {
            return Err(CosimError::configuration(format!(
                "peer.window_size must be positive, got {}",
                self.window_size
            )));
        }
        if !(self.end_time > 0.0) {
            return Err(CosimError::configuration(format!(
                "peer.end_time must be positive, got {}",
                self.end_time
            )));
        }
        Ok(())
    }

    pub fn start_values(&self) -> StartValues {
        StartValues::from_settings(&self.initial_conditions, &self.model_params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingSettings {
    pub coupling_params: CouplingParams,
    #[serde(default)]
    pub peer: Option<PeerSettings>,
}

impl CouplingSettings {
    /// Load and validate coupling settings.
    pub fn from_file(path: &Path) -> CosimResult<Self> {
        let settings: Self = load_document(path)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> CosimResult<()> {
        let params = &self.coupling_params;
        require_name(&params.participant_name, "participant_name")?;
        require_name(&params.mesh_name, "mesh_name")?;
        require_name(&params.read_data.name, "read_data.name")?;
        require_name(&params.write_data.name, "write_data.name")?;
        // Catch contradictory declarations before anything is instantiated
        for field in [&params.read_data, &params.write_data] {
            if let Some(dimensions) = field.dimensions {
                DataField::declare(&field.name, field.data_type, dimensions)?;
            }
        }
        if let Some(peer) = &self.peer {
            peer.validate()?;
        }
        Ok(())
    }
}
