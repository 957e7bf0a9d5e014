//! Building a co-simulation and what happens before the first window.

use super::{adapter, adapter_with, builder, count, cosimulation};
use crate::config::FieldSettings;
use crate::coupling::{Call, ScriptedParticipant};
use crate::cosim::CoSimulationBuilder;
use crate::errors::CosimError;
use crate::example_components::TestModel;
use crate::model::{ModelGeneration, StartValues};
use crate::signals::{InterpolationStrategy, SignalTable};
use is_close::is_close;

fn signals(name: &str, rows: Vec<Vec<f64>>) -> Box<SignalTable> {
    let names = vec!["time".to_string(), name.to_string()];
    Box::new(SignalTable::from_rows(&names, &rows, InterpolationStrategy::Previous).unwrap())
}

#[test]
fn field_must_match_channel_mapping() {
    let participant = ScriptedParticipant::explicit("Mass-Left", 0.1, 1);
    let err = builder(adapter(TestModel::new(ModelGeneration::Fmi2)), participant)
        .with_read_field(FieldSettings::vector("Force", Some(2)))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        CosimError::DataShape {
            declared: 2,
            actual: 1,
            ..
        }
    ));
}

#[test]
fn missing_parts() {
    let err = CoSimulationBuilder::new().build().unwrap_err();
    assert!(matches!(err, CosimError::Configuration(_)));

    let err = builder(
        adapter(TestModel::new(ModelGeneration::Fmi2)),
        ScriptedParticipant::explicit("Mass-Left", 0.1, 1),
    )
    .with_mesh_name("")
    .build()
    .unwrap_err();
    assert!(err.to_string().contains("mesh name"));
}

#[test]
fn vector_dimensions_from_participant() {
    let participant = ScriptedParticipant::explicit("Mass-Left", 0.5, 1)
        .with_data_dimensions("Force", 3)
        .with_read_source(|field, _| vec![1.0; field.dimensionality()]);
    let journal = participant.journal();
    let model = adapter_with(
        TestModel::new(ModelGeneration::Fmi2),
        &["u0", "u1", "u2"],
        &["y0", "y1", "y2"],
        StartValues::new(),
    );
    let mut cosim = builder(model, participant)
        .with_read_field(FieldSettings::vector("Force", None))
        .with_write_field(FieldSettings::vector("Displacement", Some(3)))
        .build()
        .unwrap();
    assert_eq!(cosim.read_field().dimensionality(), 3);

    cosim.run().unwrap();
    assert_eq!(count(&journal, &Call::WriteData(vec![0.5, 0.5, 0.5])), 1);
}

#[test]
fn declared_dimensions_contradict_participant() {
    let participant = ScriptedParticipant::explicit("Mass-Left", 0.5, 1).with_data_dimensions("Force", 3);
    let model = adapter_with(
        TestModel::new(ModelGeneration::Fmi2),
        &["u0", "u1"],
        &["y0"],
        StartValues::new(),
    );
    let err = builder(model, participant)
        .with_read_field(FieldSettings::vector("Force", Some(2)))
        .build()
        .unwrap_err();
    assert!(matches!(err, CosimError::Configuration(_)));
}

#[test]
fn initial_data_is_the_initialized_output() {
    let participant = ScriptedParticipant::explicit("Mass-Left", 0.1, 1).with_initial_data_required();
    let journal = participant.journal();
    let model = adapter_with(
        TestModel::new(ModelGeneration::Fmi2),
        &["u0"],
        &["y0"],
        StartValues::new().with_value("state", 0.25),
    );
    let mut cosim = builder(model, participant).build().unwrap();
    cosim.run().unwrap();

    let journal = journal.borrow();
    let written = journal
        .iter()
        .position(|c| *c == Call::WriteInitialData(vec![0.25]))
        .unwrap();
    let initialized = journal.iter().position(|c| *c == Call::Initialize).unwrap();
    assert!(written < initialized);
}

#[test]
fn signals_drive_the_model() {
    let model = TestModel::new(ModelGeneration::Fmi2);
    let observed = model.observed();
    let participant = ScriptedParticipant::explicit("Mass-Left", 0.5, 2);
    let mut cosim = builder(adapter(model), participant)
        .with_signals(signals("signal", vec![vec![0.0, 1.0], vec![0.5, 3.0]]))
        .build()
        .unwrap();
    cosim.run().unwrap();

    // Applied at the start of each window
    assert_eq!(observed.borrow().signal_at_step, vec![1.0, 3.0]);
    let y = cosim.result().column("y0").unwrap();
    assert!(is_close!(y[2], 2.0));
}

#[test]
fn coupled_input_wins_over_signal() {
    let model = TestModel::new(ModelGeneration::Fmi2);
    let observed = model.observed();
    let participant =
        ScriptedParticipant::explicit("Mass-Left", 0.5, 1).with_read_source(|_, _| vec![4.0]);
    let mut cosim = builder(adapter(model), participant)
        .with_signals(signals("u0", vec![vec![0.0, -1.0]]))
        .build()
        .unwrap();
    cosim.run().unwrap();

    assert_eq!(observed.borrow().inputs_at_step[0][0], 4.0);
}

#[test]
fn unknown_signal_variable() {
    let err = builder(
        adapter(TestModel::new(ModelGeneration::Fmi2)),
        ScriptedParticipant::explicit("Mass-Left", 0.5, 1),
    )
    .with_signals(signals("wind", vec![vec![0.0, 1.0]]))
    .build()
    .unwrap_err();
    assert!(err.to_string().contains("'wind'"));
}

#[test]
fn recorded_variables() {
    let participant =
        ScriptedParticipant::explicit("Mass-Left", 0.5, 1).with_read_source(|_, _| vec![2.0]);
    let mut cosim = builder(adapter(TestModel::new(ModelGeneration::Fmi2)), participant)
        .with_recorded_variables(vec!["u0".to_string(), "y0".to_string()])
        .build()
        .unwrap();
    cosim.run().unwrap();

    let result = cosim.result();
    assert_eq!(result.names, vec!["u0", "y0"]);
    assert_eq!(result.rows[1], (0.5, vec![2.0, 1.0]));
}

#[test]
fn default_recording_uses_outputs() {
    let mut cosim = cosimulation(
        TestModel::new(ModelGeneration::Fmi2),
        ScriptedParticipant::explicit("Mass-Left", 0.5, 1),
    );
    cosim.run().unwrap();
    assert_eq!(cosim.result().names, vec!["y0"]);
}
