mod increment;
mod oscillator;

pub use increment::{IncrementModel, IncrementParameters};
pub use oscillator::{OscillatorModel, OscillatorParameters};
