#![allow(dead_code)]

use crate::clock::{FloatValue, Time};
use crate::coupling::{Action, ActionInterface, DataId, MeshId};
use crate::errors::{CosimError, CosimResult};
use crate::field::ValueReference;
use crate::model::{ModelDescription, ModelGeneration, ModelInstance, ModelVariable};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

// ============================================================================
// TestModel - a three channel accumulator used throughout the tests
// ============================================================================

const U: [ValueReference; 3] = [1, 2, 3];
const Y: [ValueReference; 3] = [11, 12, 13];
const GAIN: ValueReference = 20;
const SIGNAL: ValueReference = 21;
const STATE: ValueReference = 22;

/// Calls observed on a [`TestModel`], shared with the test after the model
/// has been moved into an adapter.
#[derive(Debug, Default)]
pub(crate) struct Observations {
    pub steps: usize,
    pub step_times: Vec<(Time, Time)>,
    pub inputs_at_step: Vec<[FloatValue; 3]>,
    pub signal_at_step: Vec<FloatValue>,
    pub snapshots: usize,
    pub restores: usize,
    pub initialization_mode_entered: usize,
    pub start_values_in_initialization_mode: bool,
    pub terminated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TestState {
    x: [FloatValue; 3],
}

/// Accumulates `x_i += gain * (u_i + signal) * dt` and exposes `y_i = x_i`.
///
/// Variables: `u0..u2` inputs, `y0..y2` outputs, `gain`, `signal` and `state`
/// (an alias of `x_0` that can be set as an initial condition).
#[derive(Debug)]
pub(crate) struct TestModel {
    description: ModelDescription,
    u: [FloatValue; 3],
    gain: FloatValue,
    signal: FloatValue,
    state: TestState,
    in_initialization_mode: bool,
    fail_at_step: Option<usize>,
    observed: Rc<RefCell<Observations>>,
}

impl TestModel {
    pub fn new(generation: ModelGeneration) -> Self {
        let mut variables: Vec<ModelVariable> = (0..3)
            .map(|i| ModelVariable::new(format!("u{}", i), U[i]))
            .chain((0..3).map(|i| ModelVariable::new(format!("y{}", i), Y[i])))
            .collect();
        variables.push(ModelVariable::new("gain", GAIN));
        variables.push(ModelVariable::new("signal", SIGNAL));
        variables.push(ModelVariable::new("state", STATE));

        Self {
            description: ModelDescription {
                model_name: "TestModel".to_string(),
                generation,
                can_get_and_set_state: true,
                variables,
            },
            u: [0.0; 3],
            gain: 1.0,
            signal: 0.0,
            state: TestState { x: [0.0; 3] },
            in_initialization_mode: false,
            fail_at_step: None,
            observed: Rc::new(RefCell::new(Observations::default())),
        }
    }

    /// Clear the state capture flag in the description.
    pub fn without_state_support(mut self) -> Self {
        self.description.can_get_and_set_state = false;
        self
    }

    /// Reject the `n`th call to `do_step` (1-based).
    pub fn failing_at_step(mut self, n: usize) -> Self {
        self.fail_at_step = Some(n);
        self
    }

    pub fn observed(&self) -> Rc<RefCell<Observations>> {
        self.observed.clone()
    }

    pub fn gain(&self) -> FloatValue {
        self.gain
    }

    pub fn state(&self) -> FloatValue {
        self.state.x[0]
    }
}

impl ModelInstance for TestModel {
    fn description(&self) -> &ModelDescription {
        &self.description
    }

    fn enter_initialization_mode(&mut self) -> CosimResult<()> {
        self.in_initialization_mode = true;
        self.observed.borrow_mut().initialization_mode_entered += 1;
        Ok(())
    }

    fn exit_initialization_mode(&mut self) -> CosimResult<()> {
        self.in_initialization_mode = false;
        Ok(())
    }

    fn set_real(
        &mut self,
        references: &[ValueReference],
        values: &[FloatValue],
    ) -> CosimResult<()> {
        if references.len() != values.len() {
            return Err(CosimError::ModelAccess(format!(
                "{} references but {} values",
                references.len(),
                values.len()
            )));
        }
        for (reference, value) in references.iter().zip(values) {
            match *reference {
                GAIN | STATE if self.in_initialization_mode => {
                    self.observed.borrow_mut().start_values_in_initialization_mode = true;
                }
                _ => {}
            }
            match *reference {
                r if U.contains(&r) => self.u[(r - U[0]) as usize] = *value,
                GAIN => self.gain = *value,
                SIGNAL => self.signal = *value,
                STATE => self.state.x[0] = *value,
                r => {
                    return Err(CosimError::ModelAccess(format!(
                        "variable {} cannot be set",
                        r
                    )))
                }
            }
        }
        Ok(())
    }

    fn get_real(&self, references: &[ValueReference]) -> CosimResult<Vec<FloatValue>> {
        references
            .iter()
            .map(|reference| match *reference {
                r if U.contains(&r) => Ok(self.u[(r - U[0]) as usize]),
                r if Y.contains(&r) => Ok(self.state.x[(r - Y[0]) as usize]),
                GAIN => Ok(self.gain),
                SIGNAL => Ok(self.signal),
                STATE => Ok(self.state.x[0]),
                r => Err(CosimError::ModelAccess(format!("unknown variable {}", r))),
            })
            .collect()
    }

    fn do_step(&mut self, t: Time, dt: Time) -> CosimResult<()> {
        let mut observed = self.observed.borrow_mut();
        observed.steps += 1;
        observed.step_times.push((t, dt));
        observed.inputs_at_step.push(self.u);
        observed.signal_at_step.push(self.signal);
        if self.fail_at_step == Some(observed.steps) {
            return Err(CosimError::ModelStep {
                t,
                dt,
                reason: "integration diverged".to_string(),
            });
        }
        for i in 0..3 {
            self.state.x[i] += self.gain * (self.u[i] + self.signal) * dt;
        }
        Ok(())
    }

    fn get_state(&mut self) -> CosimResult<Box<dyn Any>> {
        self.observed.borrow_mut().snapshots += 1;
        Ok(Box::new(self.state))
    }

    fn set_state(&mut self, state: &dyn Any) -> CosimResult<()> {
        let state = state
            .downcast_ref::<TestState>()
            .ok_or_else(|| CosimError::ModelAccess("foreign state token".to_string()))?;
        self.state = *state;
        self.observed.borrow_mut().restores += 1;
        Ok(())
    }

    fn terminate(&mut self) -> CosimResult<()> {
        self.observed.borrow_mut().terminated += 1;
        Ok(())
    }
}

// ============================================================================
// FakeActionInterface - an action based middleware with a fixed plan
// ============================================================================

/// Implicit coupling over `windows` windows where the first window is rolled
/// back `rollbacks` times.
///
/// Reads of a scalar field return its data id (`Force` is 1, anything else
/// 2). Every call with a side effect is logged to a journal that stays
/// readable after the interface has been moved into a participant.
#[derive(Debug)]
pub(crate) struct FakeActionInterface {
    calls: Rc<RefCell<Vec<String>>>,
    pending: HashSet<Action>,
    windows_left: usize,
    rollbacks_left: usize,
    next_window: Time,
    pub written: Vec<(DataId, Vec<FloatValue>)>,
}

impl FakeActionInterface {
    pub fn new(windows: usize, rollbacks: usize) -> Self {
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            pending: HashSet::from([Action::WriteInitialData]),
            windows_left: windows,
            rollbacks_left: rollbacks,
            next_window: 0.5,
            written: Vec::new(),
        }
    }

    /// Window size proposed after every advance; the first is always 0.5.
    pub fn with_next_window(mut self, dt: Time) -> Self {
        self.next_window = dt;
        self
    }

    pub fn calls(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.calls)
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl ActionInterface for FakeActionInterface {
    fn participant_name(&self) -> &str {
        "Mass"
    }

    fn mesh_id(&mut self, mesh_name: &str) -> CosimResult<MeshId> {
        self.log(format!("mesh_id {}", mesh_name));
        Ok(7)
    }

    fn dimensions(&mut self) -> CosimResult<usize> {
        Ok(2)
    }

    fn set_mesh_vertex(&mut self, mesh: MeshId, position: &[f64]) -> CosimResult<i32> {
        assert_eq!(mesh, 7);
        assert_eq!(position.len(), 2);
        Ok(0)
    }

    fn data_id(&mut self, data_name: &str, _mesh: MeshId) -> CosimResult<DataId> {
        self.log(format!("data_id {}", data_name));
        Ok(if data_name == "Force" { 1 } else { 2 })
    }

    fn initialize(&mut self) -> CosimResult<Time> {
        self.log("initialize".to_string());
        self.pending.insert(Action::WriteIterationCheckpoint);
        Ok(0.5)
    }

    fn initialize_data(&mut self) -> CosimResult<()> {
        self.log("initialize_data".to_string());
        Ok(())
    }

    fn is_coupling_ongoing(&mut self) -> CosimResult<bool> {
        Ok(self.windows_left > 0)
    }

    fn is_action_required(&mut self, action: Action) -> CosimResult<bool> {
        Ok(self.pending.contains(&action))
    }

    fn mark_action_fulfilled(&mut self, action: Action) -> CosimResult<()> {
        if !self.pending.remove(&action) {
            return Err(CosimError::CouplingProtocol(format!(
                "{:?} fulfilled but not required",
                action
            )));
        }
        self.log(format!("fulfilled {:?}", action));
        Ok(())
    }

    fn read_scalar_data(&mut self, data: DataId, _vertex: i32) -> CosimResult<FloatValue> {
        Ok(data as FloatValue)
    }

    fn read_vector_data(&mut self, _data: DataId, _vertex: i32) -> CosimResult<Vec<FloatValue>> {
        Ok(vec![1.0, 2.0])
    }

    fn write_scalar_data(
        &mut self,
        data: DataId,
        _vertex: i32,
        value: FloatValue,
    ) -> CosimResult<()> {
        self.written.push((data, vec![value]));
        Ok(())
    }

    fn write_vector_data(
        &mut self,
        data: DataId,
        _vertex: i32,
        values: &[FloatValue],
    ) -> CosimResult<()> {
        self.written.push((data, values.to_vec()));
        Ok(())
    }

    fn advance(&mut self, dt: Time) -> CosimResult<Time> {
        self.log(format!("advance {}", dt));
        if self.rollbacks_left > 0 {
            self.rollbacks_left -= 1;
            self.pending.insert(Action::ReadIterationCheckpoint);
        } else {
            self.windows_left -= 1;
            if self.windows_left > 0 {
                self.pending.insert(Action::WriteIterationCheckpoint);
            }
        }
        Ok(self.next_window)
    }

    fn finalize(&mut self) -> CosimResult<()> {
        self.log("finalize".to_string());
        Ok(())
    }
}
