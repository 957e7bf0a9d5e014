//! Explicit coupling: every window commits after one exchange.

use super::{cosimulation, count};
use crate::coupling::{Call, ScriptedParticipant, WindowAttempt};
use crate::example_components::TestModel;
use crate::model::ModelGeneration;
use is_close::is_close;

fn participant() -> ScriptedParticipant {
    ScriptedParticipant::explicit("Mass-Left", 0.1, 5).with_read_source(|_, _| vec![1.0])
}

#[test]
fn five_windows_six_samples() {
    let model = TestModel::new(ModelGeneration::Fmi2);
    let observed = model.observed();
    let mut cosim = cosimulation(model, participant());

    let summary = cosim.run().unwrap();
    assert!(is_close!(summary.final_time, 0.5));
    assert_eq!(summary.committed_windows, 5);
    assert_eq!(summary.rollbacks, 0);
    assert_eq!(summary.checkpoints_taken, 0);

    let result = cosim.result();
    assert_eq!(result.len(), 6);
    let expected = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
    for (time, expected) in result.times().iter().zip(expected) {
        assert!(is_close!(*time, expected));
    }
    // Unit gain and unit force, so y tracks t
    for (time, values) in &result.rows {
        assert!(is_close!(values[0], *time));
    }

    assert_eq!(observed.borrow().steps, 5);
    assert_eq!(observed.borrow().snapshots, 0);
    assert_eq!(observed.borrow().terminated, 1);
}

#[test]
fn never_queries_reading_checkpoint() {
    let participant = participant();
    let journal = participant.journal();
    let mut cosim = cosimulation(TestModel::new(ModelGeneration::Fmi1), participant);

    cosim.run().unwrap();
    assert_eq!(count(&journal, &Call::RequiresReadingCheckpoint), 0);
    assert_eq!(count(&journal, &Call::RequiresWritingCheckpoint), 5);
    assert_eq!(count(&journal, &Call::Finalize), 1);
}

#[test]
fn call_sequence() {
    let participant = ScriptedParticipant::explicit("Mass-Left", 0.5, 1)
        .with_read_source(|_, _| vec![2.0]);
    let journal = participant.journal();
    let mut cosim = cosimulation(TestModel::new(ModelGeneration::Fmi3), participant);

    cosim.run().unwrap();
    assert_eq!(
        *journal.borrow(),
        vec![
            Call::MeshDimensions,
            Call::SetMeshVertex,
            Call::RequiresInitialData,
            Call::Initialize,
            Call::IsCouplingOngoing,
            Call::RequiresWritingCheckpoint,
            Call::MaxTimeStepSize,
            Call::ReadData(WindowAttempt {
                window: 1,
                iteration: 0
            }),
            Call::WriteData(vec![1.0]),
            Call::Advance(0.5),
            Call::IsCouplingOngoing,
            Call::Finalize,
        ]
    );
}

#[test]
fn step_times_follow_the_windows() {
    let model = TestModel::new(ModelGeneration::Fmi2);
    let observed = model.observed();
    let mut cosim = cosimulation(
        model,
        ScriptedParticipant::explicit("Mass-Left", 0.25, 3),
    );
    cosim.run().unwrap();

    let observed = observed.borrow();
    let starts: Vec<_> = observed.step_times.iter().map(|(t, _)| *t).collect();
    assert_eq!(starts, vec![0.0, 0.25, 0.5]);
    assert!(observed.step_times.iter().all(|(_, dt)| *dt == 0.25));
}

#[test]
fn runs_only_once() {
    let mut cosim = cosimulation(TestModel::new(ModelGeneration::Fmi2), participant());
    cosim.run().unwrap();
    assert!(cosim.run().is_err());
    assert_eq!(cosim.result().len(), 6);
}
