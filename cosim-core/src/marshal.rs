//! Conversion between model channel values and coupling buffers.
//!
//! The model always sees an ordered sequence with one value per mapped channel.
//! The coupling participant sees a single number for scalar fields and a
//! sequence of exactly `dimensionality` numbers for vector fields.
//! The representation is chosen from the field's declared dimensionality,
//! never from the number of values at hand.

use crate::clock::FloatValue;
use crate::errors::{CosimError, CosimResult};
use crate::field::DataField;
use serde::{Deserialize, Serialize};

/// Field data as exchanged with the coupling participant for one vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CouplingBuffer {
    Scalar(FloatValue),
    Vector(Vec<FloatValue>),
}

impl CouplingBuffer {
    /// Number of components held by the buffer.
    pub fn len(&self) -> usize {
        match self {
            CouplingBuffer::Scalar(_) => 1,
            CouplingBuffer::Vector(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Components as a slice, regardless of representation.
    pub fn as_slice(&self) -> &[FloatValue] {
        match self {
            CouplingBuffer::Scalar(value) => std::slice::from_ref(value),
            CouplingBuffer::Vector(values) => values,
        }
    }
}

/// Stateless converter between model values and coupling buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataMarshaller;

impl DataMarshaller {
    pub fn new() -> Self {
        Self
    }

    /// Convert a buffer received for `field` into ordered model input values.
    pub fn to_model_inputs(
        &self,
        field: &DataField,
        buffer: &CouplingBuffer,
    ) -> CosimResult<Vec<FloatValue>> {
        match (field.is_scalar(), buffer) {
            (true, CouplingBuffer::Scalar(value)) => Ok(vec![*value]),
            (false, CouplingBuffer::Vector(values)) => {
                check_length(field, values.len())?;
                Ok(values.clone())
            }
            (true, CouplingBuffer::Vector(values)) => Err(CosimError::protocol(format!(
                "received a vector of {} values for scalar field '{}'",
                values.len(),
                field.name()
            ))),
            (false, CouplingBuffer::Scalar(_)) => Err(CosimError::protocol(format!(
                "received a scalar for vector field '{}' with {} components",
                field.name(),
                field.dimensionality()
            ))),
        }
    }

    /// Convert ordered model output values into the buffer for `field`.
    pub fn to_coupling_buffer(
        &self,
        field: &DataField,
        values: &[FloatValue],
    ) -> CosimResult<CouplingBuffer> {
        check_length(field, values.len())?;
        if field.is_scalar() {
            Ok(CouplingBuffer::Scalar(values[0]))
        } else {
            Ok(CouplingBuffer::Vector(values.to_vec()))
        }
    }
}

fn check_length(field: &DataField, actual: usize) -> CosimResult<()> {
    if actual != field.dimensionality() {
        return Err(CosimError::DataShape {
            field: field.name().to_string(),
            declared: field.dimensionality(),
            actual,
        });
    }
    Ok(())
}
