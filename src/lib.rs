//! Run a co-simulation from a pair of settings files.
//!
//! The model settings name the model package, its channel mappings, start
//! values and where to write results. The coupling settings name the mesh,
//! the exchanged fields and the coupling backend.
//! [`run`] loads both, couples the model and writes the results of a
//! successful run.

use cosim_core::config::{CouplingSettings, ModelSettings, PeerSettings};
use cosim_core::coupling::{CouplingParticipant, CouplingScheme, SerialCoupling};
use cosim_core::cosim::{CoSimulationBuilder, RunSummary};
use cosim_core::errors::{CosimError, CosimResult};
use cosim_core::model::{instantiate_adapter, ModelPackageLoader};
use cosim_core::recorder::ResultTable;
use log::{info, warn};
use std::path::{Path, PathBuf};

pub use cosim_components::BuiltinModels;
pub use cosim_core;

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub results: ResultTable,
    /// Where the results were written, or why they could not be.
    pub result_file: Result<PathBuf, CosimError>,
}

/// Load the settings, run the coupled simulation and write its results.
///
/// A relative output file name is resolved against the directory of the
/// model settings file. Nothing is written if the run fails.
pub fn run(
    model_settings_path: &Path,
    coupling_settings_path: &Path,
    loader: &dyn ModelPackageLoader,
) -> CosimResult<RunReport> {
    let model_settings = ModelSettings::from_file(model_settings_path)?;
    let coupling_settings = CouplingSettings::from_file(coupling_settings_path)?;
    let params = &model_settings.simulation_params;

    info!(
        "Coupling '{}' as participant '{}'",
        params.fmu_file_name, coupling_settings.coupling_params.participant_name
    );
    let instance = loader.load(&params.fmu_file_name, &params.fmu_instance_name)?;
    let model = instantiate_adapter(
        instance,
        &params.fmu_read_data_names,
        &params.fmu_write_data_names,
        &model_settings.start_values(),
    )?;
    let participant = connect(&coupling_settings, loader)?;

    let mut cosim = CoSimulationBuilder::new()
        .with_model(model)
        .with_participant(participant)
        .with_settings(&model_settings, &coupling_settings)?
        .build()?;
    let summary = cosim.run()?;
    let results = cosim.result();

    let output = output_path(model_settings_path, &params.output_file_name);
    let result_file = results.write_csv(&output).map(|_| output);
    if let Err(err) = &result_file {
        warn!("{}", err);
    }

    Ok(RunReport {
        summary,
        results,
        result_file,
    })
}

/// Create the coupling participant named by the coupling settings.
fn connect(
    settings: &CouplingSettings,
    loader: &dyn ModelPackageLoader,
) -> CosimResult<Box<dyn CouplingParticipant>> {
    let params = &settings.coupling_params;
    let peer = settings.peer.as_ref().ok_or_else(|| {
        CosimError::Configuration(format!(
            "No coupling middleware backend is available for '{}'; add a 'peer' section to couple with an in-process model",
            if params.config_file_name.is_empty() {
                params.participant_name.as_str()
            } else {
                params.config_file_name.as_str()
            }
        ))
    })?;

    let coupling = serial_coupling(&params.participant_name, peer, loader)?
        .with_data_names(params.read_data.name.clone(), params.write_data.name.clone());
    Ok(Box::new(coupling))
}

fn serial_coupling(
    name: &str,
    peer: &PeerSettings,
    loader: &dyn ModelPackageLoader,
) -> CosimResult<SerialCoupling> {
    let instance = loader.load(&peer.model, &peer.instance_name)?;
    let adapter = instantiate_adapter(
        instance,
        &peer.read_data_names,
        &peer.write_data_names,
        &peer.start_values(),
    )?;
    let coupling = match peer.scheme {
        CouplingScheme::Explicit => {
            SerialCoupling::explicit(name, adapter, peer.window_size, peer.end_time)?
        }
        CouplingScheme::Implicit => SerialCoupling::implicit(
            name,
            adapter,
            peer.window_size,
            peer.end_time,
            peer.implicit,
        )?,
    };
    if peer.initial_data {
        return Ok(coupling.with_initial_data());
    }
    Ok(coupling)
}

fn output_path(model_settings_path: &Path, output_file_name: &Path) -> PathBuf {
    match model_settings_path.parent() {
        Some(dir) if output_file_name.is_relative() => dir.join(output_file_name),
        _ => output_file_name.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_next_to_settings() {
        assert_eq!(
            output_path(Path::new("demo/model.json"), Path::new("output/result.csv")),
            PathBuf::from("demo/output/result.csv")
        );
        assert_eq!(
            output_path(Path::new("model.json"), Path::new("result.csv")),
            PathBuf::from("result.csv")
        );
        assert_eq!(
            output_path(Path::new("demo/model.json"), Path::new("/tmp/result.csv")),
            PathBuf::from("/tmp/result.csv")
        );
    }
}
