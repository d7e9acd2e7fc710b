//! Search-space model
//!
//! A [`SearchSpace`] is an ordered list of typed dimensions describing the
//! domain of admissible fault plans. Conditional dimensions use the expand
//! strategy: every dimension always occupies a coordinate in the point
//! vector, and an unmet condition pins the coordinate to the dimension's
//! default. This keeps the vector shape fixed so the surrogate trains on a
//! homogeneous matrix.

use crate::error::{Error, Result};
use crate::plan::{ParamValue, PlanParams};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One point in the search space, one coordinate per dimension
pub type Point = Vec<ParamValue>;

/// Activation rule: the owning dimension participates only when `field`
/// equals `value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: ParamValue,
}

/// A typed search-space dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Dimension {
    Categorical {
        name: String,
        values: Vec<String>,
        default: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
    },
    Integer {
        name: String,
        bounds: (i64, i64),
        default: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
    },
    Real {
        name: String,
        bounds: (f64, f64),
        default: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
    },
}

impl Dimension {
    pub fn name(&self) -> &str {
        match self {
            Dimension::Categorical { name, .. }
            | Dimension::Integer { name, .. }
            | Dimension::Real { name, .. } => name,
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Dimension::Categorical { condition, .. }
            | Dimension::Integer { condition, .. }
            | Dimension::Real { condition, .. } => condition.as_ref(),
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match self {
            Dimension::Categorical { default, .. } => ParamValue::Str(default.clone()),
            Dimension::Integer { default, .. } => ParamValue::Int(*default),
            Dimension::Real { default, .. } => ParamValue::Float(*default),
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, Dimension::Categorical { .. })
    }

    /// Coerce a raw value into this dimension's domain
    fn coerce(&self, value: &ParamValue) -> Result<ParamValue> {
        match self {
            Dimension::Categorical { name, values, .. } => {
                let s = value.as_str().ok_or_else(|| {
                    Error::Validation(format!("dimension '{name}' expects a string"))
                })?;
                if !values.iter().any(|v| v == s) {
                    return Err(Error::Validation(format!(
                        "value '{s}' not in dimension '{name}'"
                    )));
                }
                Ok(ParamValue::Str(s.to_string()))
            }
            Dimension::Integer { name, bounds, .. } => {
                let i = value.as_i64().ok_or_else(|| {
                    Error::Validation(format!("dimension '{name}' expects an integer"))
                })?;
                if i < bounds.0 || i > bounds.1 {
                    return Err(Error::Validation(format!(
                        "value {i} outside bounds [{}, {}] of dimension '{name}'",
                        bounds.0, bounds.1
                    )));
                }
                Ok(ParamValue::Int(i))
            }
            Dimension::Real { name, bounds, .. } => {
                let f = value.as_f64().ok_or_else(|| {
                    Error::Validation(format!("dimension '{name}' expects a number"))
                })?;
                if !f.is_finite() || f < bounds.0 || f > bounds.1 {
                    return Err(Error::Validation(format!(
                        "value {f} outside bounds [{}, {}] of dimension '{name}'",
                        bounds.0, bounds.1
                    )));
                }
                Ok(ParamValue::Float(f))
            }
        }
    }
}

/// Declarative constraint carried alongside the dimensions. Accepted and
/// persisted for forward compatibility; not interpreted by the proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub description: String,
    #[serde(default)]
    pub rules: serde_json::Map<String, serde_json::Value>,
}

/// The typed domain of all admissible fault plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub name: String,
    pub dimensions: Vec<Dimension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl SearchSpace {
    /// Parse a JSON space definition and validate it
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let space: SearchSpace = serde_json::from_value(value)
            .map_err(|e| Error::Validation(format!("invalid search space: {e}")))?;
        space.validate()?;
        Ok(space)
    }

    /// Parse a YAML space definition and validate it
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let space: SearchSpace = serde_yaml::from_str(input)
            .map_err(|e| Error::Validation(format!("invalid search space: {e}")))?;
        space.validate()?;
        Ok(space)
    }

    /// Check structural invariants: unique names, ordered bounds, defaults
    /// in range, categorical cardinality, conditions referencing known
    /// dimensions
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(Error::Validation(
                "search space must declare at least one dimension".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for dim in &self.dimensions {
            if dim.name().is_empty() {
                return Err(Error::Validation(
                    "dimension names must not be empty".to_string(),
                ));
            }
            if !seen.insert(dim.name().to_string()) {
                return Err(Error::Validation(format!(
                    "duplicate dimension name '{}'",
                    dim.name()
                )));
            }
        }

        for dim in &self.dimensions {
            match dim {
                Dimension::Categorical {
                    name,
                    values,
                    default,
                    ..
                } => {
                    if values.len() < 2 {
                        return Err(Error::Validation(format!(
                            "categorical dimension '{name}' needs at least 2 values"
                        )));
                    }
                    let unique: HashSet<&String> = values.iter().collect();
                    if unique.len() != values.len() {
                        return Err(Error::Validation(format!(
                            "categorical dimension '{name}' has duplicate values"
                        )));
                    }
                    if !values.contains(default) {
                        return Err(Error::Validation(format!(
                            "default '{default}' not in values of dimension '{name}'"
                        )));
                    }
                }
                Dimension::Integer {
                    name,
                    bounds,
                    default,
                    ..
                } => {
                    if bounds.0 >= bounds.1 {
                        return Err(Error::Validation(format!(
                            "dimension '{name}' bounds [{}, {}] are not ordered",
                            bounds.0, bounds.1
                        )));
                    }
                    if *default < bounds.0 || *default > bounds.1 {
                        return Err(Error::Validation(format!(
                            "default {default} outside bounds of dimension '{name}'"
                        )));
                    }
                }
                Dimension::Real {
                    name,
                    bounds,
                    default,
                    ..
                } => {
                    if !(bounds.0 < bounds.1) {
                        return Err(Error::Validation(format!(
                            "dimension '{name}' bounds [{}, {}] are not ordered",
                            bounds.0, bounds.1
                        )));
                    }
                    if !default.is_finite() || *default < bounds.0 || *default > bounds.1 {
                        return Err(Error::Validation(format!(
                            "default {default} outside bounds of dimension '{name}'"
                        )));
                    }
                }
            }

            if let Some(condition) = dim.condition() {
                if !seen.contains(&condition.field) {
                    return Err(Error::Validation(format!(
                        "dimension '{}' condition references unknown dimension '{}'",
                        dim.name(),
                        condition.field
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name() == name)
    }

    /// Draw one point uniformly at random
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        self.dimensions
            .iter()
            .map(|dim| match dim {
                Dimension::Categorical { values, .. } => {
                    ParamValue::Str(values[rng.gen_range(0..values.len())].clone())
                }
                Dimension::Integer { bounds, .. } => {
                    ParamValue::Int(rng.gen_range(bounds.0..=bounds.1))
                }
                Dimension::Real { bounds, .. } => {
                    ParamValue::Float(rng.gen_range(bounds.0..=bounds.1))
                }
            })
            .collect()
    }

    /// Encode named plan fields into a point vector. Dimensions whose
    /// condition is unmet are pinned to their default.
    pub fn encode(&self, params: &PlanParams) -> Result<Point> {
        self.dimensions
            .iter()
            .map(|dim| {
                if !self.condition_met(dim, params) {
                    return Ok(dim.default_value());
                }
                match params.get(dim.name()) {
                    Some(value) => dim.coerce(value),
                    None => Ok(dim.default_value()),
                }
            })
            .collect()
    }

    /// Decode a point vector into named plan fields. Dimensions whose
    /// condition is unmet are omitted.
    pub fn decode(&self, point: &Point) -> Result<PlanParams> {
        if point.len() != self.dimensions.len() {
            return Err(Error::Validation(format!(
                "point has {} coordinates, space has {} dimensions",
                point.len(),
                self.dimensions.len()
            )));
        }

        let mut full = PlanParams::new();
        for (dim, value) in self.dimensions.iter().zip(point) {
            full.insert(dim.name().to_string(), dim.coerce(value)?);
        }

        let mut params = PlanParams::new();
        for dim in &self.dimensions {
            if self.condition_met(dim, &full) {
                if let Some(value) = full.get(dim.name()) {
                    params.insert(dim.name().to_string(), value.clone());
                }
            }
        }
        Ok(params)
    }

    /// Map a point to the surrogate's feature row. Categorical coordinates
    /// use their stable index into the value list.
    pub fn encode_features(&self, point: &Point) -> Result<Vec<f64>> {
        if point.len() != self.dimensions.len() {
            return Err(Error::Validation(format!(
                "point has {} coordinates, space has {} dimensions",
                point.len(),
                self.dimensions.len()
            )));
        }
        self.dimensions
            .iter()
            .zip(point)
            .map(|(dim, value)| match dim {
                Dimension::Categorical { name, values, .. } => {
                    let s = value.as_str().ok_or_else(|| {
                        Error::Validation(format!("dimension '{name}' expects a string"))
                    })?;
                    values
                        .iter()
                        .position(|v| v == s)
                        .map(|idx| idx as f64)
                        .ok_or_else(|| {
                            Error::Validation(format!("value '{s}' not in dimension '{name}'"))
                        })
                }
                Dimension::Integer { name, .. } | Dimension::Real { name, .. } => {
                    value.as_f64().ok_or_else(|| {
                        Error::Validation(format!("dimension '{name}' expects a number"))
                    })
                }
            })
            .collect()
    }

    /// True per column when the dimension is categorical
    pub fn categorical_mask(&self) -> Vec<bool> {
        self.dimensions.iter().map(Dimension::is_categorical).collect()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    fn condition_met(&self, dim: &Dimension, params: &PlanParams) -> bool {
        match dim.condition() {
            None => true,
            Some(condition) => params
                .get(&condition.field)
                .map(|actual| param_eq(actual, &condition.value))
                .unwrap_or(false),
        }
    }
}

/// Equality with numeric coercion, so an integer condition value matches a
/// real coordinate and vice versa
fn param_eq(a: &ParamValue, b: &ParamValue) -> bool {
    match (a, b) {
        (ParamValue::Str(x), ParamValue::Str(y)) => x == y,
        (ParamValue::Str(_), _) | (_, ParamValue::Str(_)) => false,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}
