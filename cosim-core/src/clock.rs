/// Simulation time.
pub type Time = f64;

/// Value type exchanged with models and participants.
pub type FloatValue = f64;

/// The committed simulation time and the size of the current coupling window.
///
/// Only the loop owns a clock. It is moved forward tentatively once per
/// attempt and either kept (commit) or reset to the checkpoint time (rollback).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationClock {
    t: Time,
    dt: Time,
}

impl SimulationClock {
    pub fn start(t: Time) -> Self {
        Self { t, dt: 0.0 }
    }

    /// Current time.
    pub fn time(&self) -> Time {
        self.t
    }

    /// Size of the most recent window.
    pub fn window_size(&self) -> Time {
        self.dt
    }

    /// Tentatively advance by `dt`.
    pub fn advance(&mut self, dt: Time) {
        self.dt = dt;
        self.t += dt;
    }

    /// Return to the time a checkpoint was taken at.
    pub fn rollback(&mut self, t_cp: Time) {
        self.t = t_cp;
    }
}
