use cosim_core::clock::{FloatValue, Time};
use cosim_core::errors::{CosimError, CosimResult};
use cosim_core::field::ValueReference;
use cosim_core::model::{ModelDescription, ModelGeneration, ModelInstance, ModelVariable};
use ode_solvers::{Rk4, System, Vector2};
use serde::{Deserialize, Serialize};
use std::any::Any;

// Displacement and velocity
type ModelState = Vector2<FloatValue>;

const VR_FORCE: ValueReference = 0;
const VR_DISPLACEMENT: ValueReference = 1;
const VR_VELOCITY: ValueReference = 2;
const VR_MASS: ValueReference = 3;
const VR_STIFFNESS: ValueReference = 4;
const VR_DAMPING: ValueReference = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OscillatorParameters {
    /// Mass (kg)
    pub mass: FloatValue,
    /// Spring stiffness (N/m)
    pub stiffness: FloatValue,
    /// Viscous damping (N s/m)
    pub damping: FloatValue,
    /// Largest internal integration step (s)
    pub step_size: Time,
}

impl Default for OscillatorParameters {
    fn default() -> Self {
        Self {
            mass: 1.0,
            stiffness: 4.0 * std::f64::consts::PI.powi(2),
            damping: 0.0,
            step_size: 1e-3,
        }
    }
}

/// Right hand side for one step; the force is held constant over the step.
struct Dynamics<'a> {
    parameters: &'a OscillatorParameters,
    force: FloatValue,
}

impl System<Time, ModelState> for Dynamics<'_> {
    fn system(&self, _t: Time, y: &ModelState, dy: &mut ModelState) {
        let p = self.parameters;
        dy[0] = y[1];
        dy[1] = (self.force - p.stiffness * y[0] - p.damping * y[1]) / p.mass;
    }
}

/// A driven mass-spring-damper.
///
/// Variables: `force` (input), `displacement` and `velocity` (outputs that
/// can also be set as initial conditions) and the parameters `mass`,
/// `stiffness` and `damping`.
#[derive(Debug)]
pub struct OscillatorModel {
    description: ModelDescription,
    parameters: OscillatorParameters,
    force: FloatValue,
    y: ModelState,
}

impl OscillatorModel {
    pub fn from_parameters(parameters: OscillatorParameters) -> Self {
        let variables = [
            ("force", VR_FORCE),
            ("displacement", VR_DISPLACEMENT),
            ("velocity", VR_VELOCITY),
            ("mass", VR_MASS),
            ("stiffness", VR_STIFFNESS),
            ("damping", VR_DAMPING),
        ]
        .into_iter()
        .map(|(name, reference)| ModelVariable::new(name, reference))
        .collect();

        Self {
            description: ModelDescription {
                model_name: "Oscillator".to_string(),
                generation: ModelGeneration::Fmi2,
                can_get_and_set_state: true,
                variables,
            },
            parameters,
            force: 0.0,
            y: ModelState::new(0.0, 0.0),
        }
    }

    fn check_parameters(&self, t: Time, dt: Time) -> CosimResult<()> {
        let p = &self.parameters;
        let reason = if p.mass <= 0.0 {
            "mass must be positive"
        } else if !(p.step_size > 0.0) {
            "step size must be positive"
        } else {
            return Ok(());
        };
        Err(CosimError::ModelStep {
            t,
            dt,
            reason: reason.to_string(),
        })
    }
}

impl Default for OscillatorModel {
    fn default() -> Self {
        Self::from_parameters(OscillatorParameters::default())
    }
}

impl ModelInstance for OscillatorModel {
    fn description(&self) -> &ModelDescription {
        &self.description
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
            let value = *value;
            match *reference {
                VR_FORCE => self.force = value,
                VR_DISPLACEMENT => self.y[0] = value,
                VR_VELOCITY => self.y[1] = value,
                VR_MASS => self.parameters.mass = value,
                VR_STIFFNESS => self.parameters.stiffness = value,
                VR_DAMPING => self.parameters.damping = value,
                r => {
                    return Err(CosimError::ModelAccess(format!(
                        "model 'Oscillator' has no variable {}",
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
                VR_FORCE => Ok(self.force),
                VR_DISPLACEMENT => Ok(self.y[0]),
                VR_VELOCITY => Ok(self.y[1]),
                VR_MASS => Ok(self.parameters.mass),
                VR_STIFFNESS => Ok(self.parameters.stiffness),
                VR_DAMPING => Ok(self.parameters.damping),
                r => Err(CosimError::ModelAccess(format!(
                    "model 'Oscillator' has no variable {}",
                    r
                ))),
            })
            .collect()
    }

    fn do_step(&mut self, t: Time, dt: Time) -> CosimResult<()> {
        self.check_parameters(t, dt)?;

        // Whole number of equal sub-steps so the last one lands on t + dt
        let n = (dt / self.parameters.step_size).ceil().max(1.0);
        let h = dt / n;
        let t_next = t + dt;

        let dynamics = Dynamics {
            parameters: &self.parameters,
            force: self.force,
        };
        let mut solver = Rk4::new(dynamics, t, self.y, t_next, h);
        solver
            .integrate()
            .map_err(|err| CosimError::ModelStep {
                t,
                dt,
                reason: format!("{:?}", err),
            })?;

        let y = last_step(solver.x_out(), solver.y_out(), t_next).ok_or_else(|| {
            CosimError::ModelStep {
                t,
                dt,
                reason: "solver produced no output".to_string(),
            }
        })?;
        if !(y[0].is_finite() && y[1].is_finite()) {
            return Err(CosimError::ModelStep {
                t,
                dt,
                reason: "integration diverged".to_string(),
            });
        }
        self.y = y;
        Ok(())
    }

    fn get_state(&mut self) -> CosimResult<Box<dyn Any>> {
        Ok(Box::new(self.y))
    }

    fn set_state(&mut self, state: &dyn Any) -> CosimResult<()> {
        self.y = *state
            .downcast_ref::<ModelState>()
            .ok_or_else(|| CosimError::ModelAccess("foreign state token".to_string()))?;
        Ok(())
    }
}

/// The solver output closest to `t_end`.
///
/// Rounding in the step count can leave one extra output past `t_end`.
fn last_step(x_out: &[Time], y_out: &[ModelState], t_end: Time) -> Option<ModelState> {
    x_out
        .iter()
        .zip(y_out)
        .min_by(|(a, _), (b, _)| (*a - t_end).abs().total_cmp(&(*b - t_end).abs()))
        .map(|(_, y)| *y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn oscillator(damping: FloatValue) -> OscillatorModel {
        OscillatorModel::from_parameters(OscillatorParameters {
            damping,
            ..OscillatorParameters::default()
        })
    }

    #[test]
    fn free_oscillation_has_unit_period() {
        let mut model = oscillator(0.0);
        model.set_real(&[VR_DISPLACEMENT], &[1.0]).unwrap();

        let mut t = 0.0;
        for _ in 0..10 {
            model.do_step(t, 0.1).unwrap();
            t += 0.1;
        }
        let y = model.get_real(&[VR_DISPLACEMENT, VR_VELOCITY]).unwrap();
        assert_relative_eq!(y[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(y[1], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn constant_force_settles_at_static_deflection() {
        let mut model = OscillatorModel::from_parameters(OscillatorParameters {
            mass: 1.0,
            stiffness: 2.0,
            damping: 3.0,
            step_size: 1e-2,
        });
        model.set_real(&[VR_FORCE], &[4.0]).unwrap();
        model.do_step(0.0, 30.0).unwrap();

        let y = model.get_real(&[VR_DISPLACEMENT]).unwrap();
        assert_relative_eq!(y[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn replayed_step_is_identical() {
        let mut model = oscillator(0.5);
        model.set_real(&[VR_FORCE], &[1.0]).unwrap();
        let state = model.get_state().unwrap();

        model.do_step(0.0, 0.3).unwrap();
        let first = model.get_real(&[VR_DISPLACEMENT, VR_VELOCITY]).unwrap();

        model.set_state(state.as_ref()).unwrap();
        model.do_step(0.0, 0.3).unwrap();
        assert_eq!(
            model.get_real(&[VR_DISPLACEMENT, VR_VELOCITY]).unwrap(),
            first
        );
    }

    #[test]
    fn invalid_mass_fails_the_step() {
        let mut model = oscillator(0.0);
        model.set_real(&[VR_MASS], &[0.0]).unwrap();
        let err = model.do_step(0.0, 0.1).unwrap_err();
        assert!(matches!(err, CosimError::ModelStep { .. }));
        assert!(err.to_string().contains("mass"));
    }

    #[test]
    fn closest_output_wins() {
        let x = [0.0, 0.05, 0.1, 0.15];
        let y: Vec<_> = x.iter().map(|x| ModelState::new(*x, 0.0)).collect();
        let last = last_step(&x, &y, 0.1).unwrap();
        assert_eq!(last[0], 0.1);
        assert!(last_step(&[], &[], 0.1).is_none());
    }
}
