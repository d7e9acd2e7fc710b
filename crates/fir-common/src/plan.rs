//! Fault plans and their field-map form
//!
//! A [`FaultPlan`] is one immutable candidate: target service, API path,
//! impact percentage, and a tagged fault kind carrying its kind-specific
//! parameters. Plans also convert to and from an ordered field map
//! ([`PlanParams`]) which is what the search-space encoder operates on.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One coordinate value inside a plan or a search-space point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; real-valued coordinates round to the nearest integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.is_finite() => Some(f.round() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

/// Named plan fields, ordered by name
pub type PlanParams = BTreeMap<String, ParamValue>;

/// Fault kinds with their kind-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fault_type", rename_all = "snake_case")]
pub enum FaultKind {
    /// Delay responses by a fixed amount
    Delay { delay_ms: u64 },
    /// Abort requests with an HTTP status
    Abort { abort_status: u16 },
    /// Inject an error code into responses
    ErrorInjection {
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<u16>,
    },
}

impl FaultKind {
    pub fn name(&self) -> &'static str {
        match self {
            FaultKind::Delay { .. } => "delay",
            FaultKind::Abort { .. } => "abort",
            FaultKind::ErrorInjection { .. } => "error_injection",
        }
    }
}

/// One candidate fault plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultPlan {
    pub service: String,
    pub api_path: String,
    /// Share of matching requests the fault applies to, in percent
    pub percentage: u8,
    /// Injection window; bounds how long the fault stays active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(flatten)]
    pub kind: FaultKind,
}

/// Plan field names the search space may declare dimensions for
const KNOWN_FIELDS: &[&str] = &[
    "service",
    "api_path",
    "percentage",
    "duration_ms",
    "fault_type",
    "delay_ms",
    "abort_status",
    "error_code",
];

pub fn is_known_field(name: &str) -> bool {
    KNOWN_FIELDS.contains(&name)
}

impl FaultPlan {
    /// Construct a validated plan
    pub fn new(
        service: impl Into<String>,
        api_path: impl Into<String>,
        percentage: u8,
        duration_ms: Option<u64>,
        kind: FaultKind,
    ) -> Result<Self> {
        let plan = Self {
            service: service.into(),
            api_path: api_path.into(),
            percentage,
            duration_ms,
            kind,
        };
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        if self.service.is_empty() {
            return Err(Error::Validation("plan service must not be empty".to_string()));
        }
        if self.api_path.is_empty() {
            return Err(Error::Validation("plan api_path must not be empty".to_string()));
        }
        if self.percentage > 100 {
            return Err(Error::Validation(format!(
                "percentage {} exceeds 100",
                self.percentage
            )));
        }
        match &self.kind {
            FaultKind::Delay { delay_ms } => {
                if *delay_ms == 0 {
                    return Err(Error::Validation("delay_ms must be positive".to_string()));
                }
                if let Some(duration) = self.duration_ms {
                    if *delay_ms >= duration {
                        return Err(Error::Validation(format!(
                            "delay_ms {} must be less than duration_ms {}",
                            delay_ms, duration
                        )));
                    }
                }
            }
            FaultKind::Abort { abort_status } => {
                if !(400..=599).contains(abort_status) {
                    return Err(Error::Validation(format!(
                        "abort_status {} must be within [400, 599]",
                        abort_status
                    )));
                }
            }
            FaultKind::ErrorInjection { error_code } => {
                if let Some(code) = error_code {
                    if !(400..=599).contains(code) {
                        return Err(Error::Validation(format!(
                            "error_code {} must be within [400, 599]",
                            code
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Build a plan from decoded search-space parameters. `service` is the
    /// session's target and is used unless the space declares a `service`
    /// dimension of its own.
    pub fn from_params(service: &str, params: &PlanParams) -> Result<Self> {
        if let Some(unknown) = params.keys().find(|name| !is_known_field(name)) {
            return Err(Error::Validation(format!(
                "unknown plan field '{unknown}'"
            )));
        }

        let service = params
            .get("service")
            .and_then(ParamValue::as_str)
            .unwrap_or(service)
            .to_string();
        let api_path = params
            .get("api_path")
            .and_then(ParamValue::as_str)
            .unwrap_or("/")
            .to_string();
        let percentage = match int_field(params, "percentage")? {
            Some(value) => u8::try_from(value).map_err(|_| {
                Error::Validation(format!("percentage {value} out of range"))
            })?,
            None => 100,
        };
        let duration_ms = match int_field(params, "duration_ms")? {
            Some(value) if value > 0 => Some(value as u64),
            Some(value) => {
                return Err(Error::Validation(format!(
                    "duration_ms {value} must be positive"
                )))
            }
            None => None,
        };

        let fault_type = params
            .get("fault_type")
            .and_then(ParamValue::as_str)
            .ok_or_else(|| Error::Validation("missing fault_type".to_string()))?;

        let kind = match fault_type {
            "delay" => {
                let delay_ms = int_field(params, "delay_ms")?
                    .ok_or_else(|| Error::Validation("delay plan requires delay_ms".to_string()))?;
                if delay_ms <= 0 {
                    return Err(Error::Validation(format!(
                        "delay_ms {delay_ms} must be positive"
                    )));
                }
                FaultKind::Delay {
                    delay_ms: delay_ms as u64,
                }
            }
            "abort" => {
                let status = int_field(params, "abort_status")?.ok_or_else(|| {
                    Error::Validation("abort plan requires abort_status".to_string())
                })?;
                FaultKind::Abort {
                    abort_status: u16::try_from(status).map_err(|_| {
                        Error::Validation(format!("abort_status {status} out of range"))
                    })?,
                }
            }
            "error_injection" => {
                let error_code = match int_field(params, "error_code")? {
                    Some(code) => Some(u16::try_from(code).map_err(|_| {
                        Error::Validation(format!("error_code {code} out of range"))
                    })?),
                    None => None,
                };
                FaultKind::ErrorInjection { error_code }
            }
            other => {
                return Err(Error::Validation(format!("unknown fault_type '{other}'")))
            }
        };

        Self::new(service, api_path, percentage, duration_ms, kind)
    }

    /// Flatten the plan into named fields for the search-space encoder
    pub fn to_params(&self) -> PlanParams {
        let mut params = PlanParams::new();
        params.insert("service".to_string(), ParamValue::Str(self.service.clone()));
        params.insert("api_path".to_string(), ParamValue::Str(self.api_path.clone()));
        params.insert("percentage".to_string(), ParamValue::Int(self.percentage as i64));
        params.insert(
            "fault_type".to_string(),
            ParamValue::Str(self.kind.name().to_string()),
        );
        if let Some(duration) = self.duration_ms {
            params.insert("duration_ms".to_string(), ParamValue::Int(duration as i64));
        }
        match &self.kind {
            FaultKind::Delay { delay_ms } => {
                params.insert("delay_ms".to_string(), ParamValue::Int(*delay_ms as i64));
            }
            FaultKind::Abort { abort_status } => {
                params.insert(
                    "abort_status".to_string(),
                    ParamValue::Int(*abort_status as i64),
                );
            }
            FaultKind::ErrorInjection { error_code } => {
                if let Some(code) = error_code {
                    params.insert("error_code".to_string(), ParamValue::Int(*code as i64));
                }
            }
        }
        params
    }
}

/// Check that every plan the space can produce is constructible, so plan
/// validation never surfaces inside a running worker: the `fault_type`
/// dimension must exist with known kinds, kind-required parameter
/// dimensions must be present, and numeric dimensions must stay inside the
/// ranges their plan fields accept.
pub fn validate_plan_space(space: &crate::space::SearchSpace) -> Result<()> {
    use crate::space::Dimension;

    for dimension in &space.dimensions {
        if !is_known_field(dimension.name()) {
            return Err(Error::Validation(format!(
                "dimension '{}' is not a fault-plan field",
                dimension.name()
            )));
        }
    }

    let fault_type = space.dimension("fault_type").ok_or_else(|| {
        Error::Validation("search space must declare a 'fault_type' dimension".to_string())
    })?;
    let kinds = match fault_type {
        Dimension::Categorical { values, .. } => values,
        _ => {
            return Err(Error::Validation(
                "'fault_type' must be a categorical dimension".to_string(),
            ))
        }
    };
    for kind in kinds {
        match kind.as_str() {
            "delay" => {
                if space.dimension("delay_ms").is_none() {
                    return Err(Error::Validation(
                        "fault type 'delay' requires a 'delay_ms' dimension".to_string(),
                    ));
                }
            }
            "abort" => {
                if space.dimension("abort_status").is_none() {
                    return Err(Error::Validation(
                        "fault type 'abort' requires an 'abort_status' dimension".to_string(),
                    ));
                }
            }
            "error_injection" => {}
            other => {
                return Err(Error::Validation(format!("unknown fault_type '{other}'")))
            }
        }
    }

    for (name, low, high) in [
        ("percentage", 0.0, 100.0),
        ("abort_status", 400.0, 599.0),
        ("error_code", 400.0, 599.0),
        ("delay_ms", 1.0, f64::MAX),
        ("duration_ms", 1.0, f64::MAX),
    ] {
        if let Some(dimension) = space.dimension(name) {
            let bounds = numeric_bounds(dimension).ok_or_else(|| {
                Error::Validation(format!("dimension '{name}' must be numeric"))
            })?;
            if bounds.0 < low || bounds.1 > high {
                return Err(Error::Validation(format!(
                    "dimension '{name}' bounds [{}, {}] exceed [{low}, {high}]",
                    bounds.0, bounds.1
                )));
            }
        }
    }

    // a sampled delay must always fit inside a sampled window
    if let (Some(delay), Some(duration)) = (
        space.dimension("delay_ms").and_then(numeric_bounds),
        space.dimension("duration_ms").and_then(numeric_bounds),
    ) {
        if delay.1 >= duration.0 {
            return Err(Error::Validation(format!(
                "delay_ms upper bound {} must stay below the duration_ms lower bound {}",
                delay.1, duration.0
            )));
        }
    }

    for name in ["service", "api_path"] {
        if let Some(dimension) = space.dimension(name) {
            if !dimension.is_categorical() {
                return Err(Error::Validation(format!(
                    "dimension '{name}' must be categorical"
                )));
            }
        }
    }

    Ok(())
}

fn numeric_bounds(dimension: &crate::space::Dimension) -> Option<(f64, f64)> {
    use crate::space::Dimension;
    match dimension {
        Dimension::Integer { bounds, .. } => Some((bounds.0 as f64, bounds.1 as f64)),
        Dimension::Real { bounds, .. } => Some(*bounds),
        Dimension::Categorical { .. } => None,
    }
}

fn int_field(params: &PlanParams, name: &str) -> Result<Option<i64>> {
    match params.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::Validation(format!("field '{name}' is not numeric"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn delay_plan() -> FaultPlan {
        FaultPlan::new(
            "payments",
            "/v1/charge",
            50,
            Some(30_000),
            FaultKind::Delay { delay_ms: 500 },
        )
        .unwrap()
    }

    #[test]
    fn plan_serializes_with_an_inline_fault_type_tag() {
        let json = serde_json::to_value(delay_plan()).unwrap();
        assert_eq!(json["fault_type"], "delay");
        assert_eq!(json["delay_ms"], 500);
        assert_eq!(json["service"], "payments");
        assert!(json.get("abort_status").is_none());
    }

    #[test]
    fn plan_json_round_trips() {
        let plan = delay_plan();
        let json = serde_json::to_string(&plan).unwrap();
        let back: FaultPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn delay_must_fit_inside_the_duration_window() {
        let result = FaultPlan::new(
            "payments",
            "/v1/charge",
            50,
            Some(400),
            FaultKind::Delay { delay_ms: 400 },
        );
        assert_matches!(result, Err(Error::Validation(_)));
    }

    #[test]
    fn abort_status_must_be_an_error_status() {
        let result = FaultPlan::new(
            "payments",
            "/",
            10,
            None,
            FaultKind::Abort { abort_status: 302 },
        );
        assert_matches!(result, Err(Error::Validation(_)));
    }

    #[test]
    fn percentage_above_100_is_rejected() {
        let result = FaultPlan::new(
            "payments",
            "/",
            101,
            None,
            FaultKind::Delay { delay_ms: 10 },
        );
        assert_matches!(result, Err(Error::Validation(_)));
    }

    #[test]
    fn params_round_trip_preserves_the_plan() {
        let plan = delay_plan();
        let back = FaultPlan::from_params("payments", &plan.to_params()).unwrap();
        assert_eq!(back, plan);

        let abort = FaultPlan::new(
            "orders",
            "/v2/list",
            25,
            None,
            FaultKind::Abort { abort_status: 503 },
        )
        .unwrap();
        let back = FaultPlan::from_params("orders", &abort.to_params()).unwrap();
        assert_eq!(back, abort);
    }

    #[test]
    fn from_params_rejects_unknown_fields() {
        let mut params = delay_plan().to_params();
        params.insert("blast_radius".to_string(), ParamValue::Int(3));
        let result = FaultPlan::from_params("payments", &params);
        assert_matches!(result, Err(Error::Validation(_)));
    }

    #[test]
    fn from_params_requires_kind_parameters() {
        let mut params = PlanParams::new();
        params.insert("fault_type".to_string(), ParamValue::from("delay"));
        let result = FaultPlan::from_params("payments", &params);
        assert_matches!(result, Err(Error::Validation(_)));
    }

    #[test]
    fn from_params_defaults_fall_back_to_the_session_service() {
        let mut params = PlanParams::new();
        params.insert("fault_type".to_string(), ParamValue::from("abort"));
        params.insert("abort_status".to_string(), ParamValue::Int(500));
        let plan = FaultPlan::from_params("inventory", &params).unwrap();
        assert_eq!(plan.service, "inventory");
        assert_eq!(plan.api_path, "/");
        assert_eq!(plan.percentage, 100);
    }

    fn space_json(dimensions: serde_json::Value) -> crate::space::SearchSpace {
        crate::space::SearchSpace::from_json_value(serde_json::json!({
            "name": "s",
            "dimensions": dimensions
        }))
        .unwrap()
    }

    #[test]
    fn plan_spaces_require_a_fault_type_dimension() {
        let space = space_json(serde_json::json!([
            {"name": "percentage", "type": "integer", "bounds": [1, 100], "default": 50}
        ]));
        assert_matches!(validate_plan_space(&space), Err(Error::Validation(_)));
    }

    #[test]
    fn plan_spaces_require_kind_parameter_dimensions() {
        let space = space_json(serde_json::json!([
            {"name": "fault_type", "type": "categorical",
             "values": ["delay", "abort"], "default": "delay"},
            {"name": "delay_ms", "type": "integer", "bounds": [10, 500], "default": 100}
        ]));
        // abort is offered but no abort_status dimension exists
        assert_matches!(validate_plan_space(&space), Err(Error::Validation(_)));
    }

    #[test]
    fn plan_spaces_reject_out_of_range_field_bounds() {
        let space = space_json(serde_json::json!([
            {"name": "fault_type", "type": "categorical",
             "values": ["abort", "error_injection"], "default": "abort"},
            {"name": "abort_status", "type": "integer", "bounds": [200, 599], "default": 503}
        ]));
        assert_matches!(validate_plan_space(&space), Err(Error::Validation(_)));
    }

    #[test]
    fn plan_spaces_keep_delays_inside_the_window() {
        let space = space_json(serde_json::json!([
            {"name": "fault_type", "type": "categorical",
             "values": ["delay", "error_injection"], "default": "delay"},
            {"name": "delay_ms", "type": "integer", "bounds": [10, 5000], "default": 100},
            {"name": "duration_ms", "type": "integer", "bounds": [1000, 60000], "default": 30000}
        ]));
        assert_matches!(validate_plan_space(&space), Err(Error::Validation(_)));
    }

    #[test]
    fn a_well_formed_plan_space_passes() {
        let space = space_json(serde_json::json!([
            {"name": "fault_type", "type": "categorical",
             "values": ["delay", "abort"], "default": "delay"},
            {"name": "percentage", "type": "integer", "bounds": [1, 100], "default": 50},
            {"name": "delay_ms", "type": "integer", "bounds": [10, 900], "default": 100,
             "condition": {"field": "fault_type", "value": "delay"}},
            {"name": "abort_status", "type": "integer", "bounds": [400, 599], "default": 503,
             "condition": {"field": "fault_type", "value": "abort"}},
            {"name": "duration_ms", "type": "integer", "bounds": [1000, 60000], "default": 30000}
        ]));
        assert!(validate_plan_space(&space).is_ok());
    }

    #[test]
    fn real_valued_coordinates_round_to_integers() {
        let mut params = delay_plan().to_params();
        params.insert("delay_ms".to_string(), ParamValue::Float(250.4));
        let plan = FaultPlan::from_params("payments", &params).unwrap();
        assert_eq!(plan.kind, FaultKind::Delay { delay_ms: 250 });
    }
}
