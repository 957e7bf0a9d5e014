//! Scenario tests for the co-simulation loop.
//!
//! A [`TestModel`] accumulator is coupled to a [`ScriptedParticipant`]:
//! the read field `Force` drives input `u0` and output `y0` is written as
//! `Displacement`.

#[cfg(test)]
mod explicit;
#[cfg(test)]
mod setup;

use crate::config::FieldSettings;
use crate::coupling::{Call, Journal, ScriptedParticipant};
use crate::cosim::{CoSimulation, CoSimulationBuilder};
use crate::example_components::TestModel;
use crate::model::{instantiate_adapter, ModelAdapter, StartValues};

pub(super) fn adapter(model: TestModel) -> Box<dyn ModelAdapter> {
    adapter_with(model, &["u0"], &["y0"], StartValues::new())
}

pub(super) fn adapter_with(
    model: TestModel,
    inputs: &[&str],
    outputs: &[&str],
    start_values: StartValues,
) -> Box<dyn ModelAdapter> {
    let names = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    instantiate_adapter(
        Box::new(model),
        &names(inputs),
        &names(outputs),
        &start_values,
    )
    .unwrap()
}

pub(super) fn builder(
    model: Box<dyn ModelAdapter>,
    participant: ScriptedParticipant,
) -> CoSimulationBuilder {
    CoSimulationBuilder::new()
        .with_model(model)
        .with_participant(Box::new(participant))
        .with_mesh_name("Mass-Mesh")
        .with_read_field(FieldSettings::scalar("Force"))
        .with_write_field(FieldSettings::scalar("Displacement"))
}

pub(super) fn cosimulation(model: TestModel, participant: ScriptedParticipant) -> CoSimulation {
    builder(adapter(model), participant).build().unwrap()
}

pub(super) fn count(journal: &Journal, call: &Call) -> usize {
    journal.borrow().iter().filter(|c| *c == call).count()
}

pub(super) fn reads(journal: &Journal) -> usize {
    journal
        .borrow()
        .iter()
        .filter(|c| matches!(c, Call::ReadData(_)))
        .count()
}
