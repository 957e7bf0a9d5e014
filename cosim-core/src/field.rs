//! Exchanged quantities and where they attach.
//!
//! A [`DataField`] names a quantity exchanged with the coupling participant and
//! fixes its dimensionality for the whole run.
//! A [`ChannelMapping`] associates each component of a field with a model variable.

use crate::errors::{CosimError, CosimResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a model variable, as declared in the model description.
pub type ValueReference = u32;

/// Declared kind of an exchanged quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Scalar,
    Vector,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Scalar => write!(f, "scalar"),
            DataType::Vector => write!(f, "vector"),
        }
    }
}

/// A named exchange quantity with a fixed number of components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FieldDeclaration")]
pub struct DataField {
    name: String,
    dimensionality: usize,
}

/// Serialized form of a [`DataField`], validated on the way in.
#[derive(Deserialize)]
struct FieldDeclaration {
    name: String,
    dimensionality: usize,
}

impl TryFrom<FieldDeclaration> for DataField {
    type Error = CosimError;

    fn try_from(declaration: FieldDeclaration) -> CosimResult<Self> {
        let data_type = if declaration.dimensionality == 1 {
            DataType::Scalar
        } else {
            DataType::Vector
        };
        Self::declare(declaration.name, data_type, declaration.dimensionality)
    }
}

impl DataField {
    /// A scalar field (dimensionality 1).
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimensionality: 1,
        }
    }

    /// A vector field.
    ///
    /// Vector fields have at least two components. A one-component vector is
    /// rejected instead of being treated as a scalar.
    pub fn vector(name: impl Into<String>, dimensionality: usize) -> CosimResult<Self> {
        let name = name.into();
        if dimensionality < 2 {
            return Err(CosimError::configuration(format!(
                "Vector field '{}' must have at least 2 components, got {}. \
                 Declare the field as scalar instead.",
                name, dimensionality
            )));
        }
        Ok(Self {
            name,
            dimensionality,
        })
    }

    /// Build a field from its declared type and dimensionality.
    pub fn declare(
        name: impl Into<String>,
        data_type: DataType,
        dimensionality: usize,
    ) -> CosimResult<Self> {
        let name = name.into();
        match data_type {
            DataType::Scalar if dimensionality == 1 => Ok(Self::scalar(name)),
            DataType::Scalar => Err(CosimError::configuration(format!(
                "Scalar field '{}' cannot have {} components",
                name, dimensionality
            ))),
            DataType::Vector => Self::vector(name, dimensionality),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    pub fn data_type(&self) -> DataType {
        if self.dimensionality == 1 {
            DataType::Scalar
        } else {
            DataType::Vector
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.data_type() == DataType::Scalar
    }
}

impl fmt::Display for DataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.data_type(), self.dimensionality)
    }
}

/// The vertex that all field values are attached to.
///
/// Every participant currently registers exactly one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexBinding(pub i32);

impl VertexBinding {
    pub fn id(&self) -> i32 {
        self.0
    }
}

/// Order-preserving association between field components and model variables.
///
/// Component `i` of a field maps to `references()[i]`.
/// The mapping is resolved once at startup and is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelMapping {
    names: Vec<String>,
    references: Vec<ValueReference>,
}

impl ChannelMapping {
    /// Resolve variable names to value references.
    ///
    /// Returns a configuration error naming the first unknown variable.
    pub fn resolve<F>(names: &[String], mut lookup: F) -> CosimResult<Self>
    where
        F: FnMut(&str) -> Option<ValueReference>,
    {
        let references = names
            .iter()
            .map(|name| {
                lookup(name).ok_or_else(|| {
                    CosimError::configuration(format!(
                        "Variable '{}' is not defined by the model",
                        name
                    ))
                })
            })
            .collect::<CosimResult<Vec<_>>>()?;

        Ok(Self {
            names: names.to_vec(),
            references,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn references(&self) -> &[ValueReference] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Check that this mapping has one channel per component of `field`.
    pub fn check_matches(&self, field: &DataField) -> CosimResult<()> {
        if self.len() != field.dimensionality() {
            return Err(CosimError::DataShape {
                field: field.name().to_string(),
                declared: field.dimensionality(),
                actual: self.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn variables() -> HashMap<&'static str, ValueReference> {
        HashMap::from([("x", 1), ("y", 2), ("z", 3)])
    }

    #[test]
    fn one_component_vector_is_rejected() {
        let err = DataField::vector("Displacement", 1).unwrap_err();
        assert!(matches!(err, CosimError::Configuration(_)));
    }

    #[test]
    fn declare_scalar_with_components() {
        assert!(DataField::declare("Force", DataType::Scalar, 1)
            .unwrap()
            .is_scalar());
        assert!(DataField::declare("Force", DataType::Scalar, 2).is_err());

        let field = DataField::declare("Force", DataType::Vector, 3).unwrap();
        assert_eq!(field.data_type(), DataType::Vector);
        assert_eq!(field.dimensionality(), 3);
    }

    #[test]
    fn data_type_from_settings() {
        let parsed: DataType = serde_json::from_str("\"vector\"").unwrap();
        assert_eq!(parsed, DataType::Vector);
        assert!(serde_json::from_str::<DataType>("\"tensor\"").is_err());
    }

    #[test]
    fn deserialized_fields_are_validated() {
        let field: DataField =
            serde_json::from_str(r#"{"name": "Velocity", "dimensionality": 3}"#).unwrap();
        assert_eq!(field, DataField::vector("Velocity", 3).unwrap());
        let field: DataField =
            serde_json::from_str(r#"{"name": "Force", "dimensionality": 1}"#).unwrap();
        assert!(field.is_scalar());

        let err = serde_json::from_str::<DataField>(r#"{"name": "Force", "dimensionality": 0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("at least 2 components"));
    }

    #[test]
    fn resolve_preserves_order() {
        let vars = variables();
        let names = vec!["z".to_string(), "x".to_string()];
        let mapping = ChannelMapping::resolve(&names, |n| vars.get(n).copied()).unwrap();
        assert_eq!(mapping.references(), &[3, 1]);
        assert_eq!(mapping.names(), names.as_slice());
    }

    #[test]
    fn resolve_unknown_name() {
        let vars = variables();
        let names = vec!["x".to_string(), "missing".to_string()];
        let err = ChannelMapping::resolve(&names, |n| vars.get(n).copied()).unwrap_err();
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn mapping_length_must_match_field() {
        let vars = variables();
        let names = vec!["x".to_string(), "y".to_string()];
        let mapping = ChannelMapping::resolve(&names, |n| vars.get(n).copied()).unwrap();

        mapping
            .check_matches(&DataField::vector("Position", 2).unwrap())
            .unwrap();
        let err = mapping
            .check_matches(&DataField::vector("Position", 3).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            CosimError::DataShape {
                declared: 3,
                actual: 2,
                ..
            }
        ));
    }
}
