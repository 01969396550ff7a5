//! User-tunable strategy parameters and sweep ranges.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Tolerance used when counting float sweep steps, so `0.1..0.3 step 0.1` yields three values.
const STEP_EPSILON: f64 = 1e-9;

/// Most values a single parameter may sweep through.
pub const MAX_SWEEP_VALUES: usize = 100_000;

/// Which price series a `Series` parameter selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSeries {
    Open,
    High,
    Low,
    Close,
    Median,
    Typical,
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Int(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Series(PriceSeries),
}

impl ParamValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Double(_) => "double",
            ParamValue::String(_) => "string",
            ParamValue::Bool(_) => "bool",
            ParamValue::Series(_) => "series",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamValue::Int(_) | ParamValue::Double(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Double(v) => write!(f, "{v}"),
            ParamValue::String(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Series(v) => write!(f, "{v:?}"),
        }
    }
}

/// Inclusive `start..=stop` range walked in `step` increments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl SweepRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    /// Number of values the range produces.
    ///
    /// `floor((stop - start) / step) + 1` for a positive step; exactly one for
    /// a non-positive step or an inverted range. Non-finite bounds also count
    /// as one; [`ScriptingParameter::with_sweep`] rejects them up front.
    pub fn len(&self) -> usize {
        if !self.is_finite() || self.step <= 0.0 || self.stop < self.start {
            return 1;
        }
        let steps = ((self.stop - self.start) / self.step + STEP_EPSILON).floor();
        (steps as usize).saturating_add(1)
    }

    pub fn is_finite(&self) -> bool {
        self.start.is_finite() && self.stop.is_finite() && self.step.is_finite()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter '{0}'")]
    Unknown(String),

    #[error("parameter '{name}' expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("parameter '{0}' is not numeric and cannot be swept")]
    NotSweepable(String),

    #[error("parameter '{0}' has a non-finite sweep bound")]
    NonFiniteSweep(String),

    #[error("int parameter '{0}' needs a whole-number sweep start and step")]
    FractionalIntSweep(String),

    #[error("parameter '{name}' sweeps {len} values, limit is {max}")]
    SweepTooLarge { name: String, len: usize, max: usize },
}

/// A named, typed strategy parameter with an optional sweep range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptingParameter {
    pub name: String,
    pub value: ParamValue,
    #[serde(default)]
    pub sweep: Option<SweepRange>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ScriptingParameter {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
            sweep: None,
            description: None,
        }
    }

    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, ParamValue::Int(value))
    }

    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, ParamValue::Double(value))
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ParamValue::String(value.into()))
    }

    pub fn bool(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, ParamValue::Bool(value))
    }

    pub fn series(name: impl Into<String>, value: PriceSeries) -> Self {
        Self::new(name, ParamValue::Series(value))
    }

    /// Attach a sweep range. Only numeric parameters accept one.
    pub fn with_sweep(mut self, start: f64, stop: f64, step: f64) -> Result<Self, ParamError> {
        if !self.value.is_numeric() {
            return Err(ParamError::NotSweepable(self.name));
        }
        self.sweep = Some(SweepRange::new(start, stop, step));
        self.check_sweep()?;
        Ok(self)
    }

    /// Reject ranges that cannot be walked: non-finite bounds, fractional Int
    /// starts or steps (rounding would repeat values) and oversized ranges.
    pub fn check_sweep(&self) -> Result<(), ParamError> {
        let Some(range) = self.sweep else {
            return Ok(());
        };
        if !self.value.is_numeric() {
            return Err(ParamError::NotSweepable(self.name.clone()));
        }
        if !range.is_finite() {
            return Err(ParamError::NonFiniteSweep(self.name.clone()));
        }
        if matches!(self.value, ParamValue::Int(_))
            && (range.start.fract() != 0.0 || range.step.fract() != 0.0)
        {
            return Err(ParamError::FractionalIntSweep(self.name.clone()));
        }
        let len = range.len();
        if len > MAX_SWEEP_VALUES {
            return Err(ParamError::SweepTooLarge {
                name: self.name.clone(),
                len,
                max: MAX_SWEEP_VALUES,
            });
        }
        Ok(())
    }

    /// Number of values [`ScriptingParameter::sweep_values`] yields.
    pub fn sweep_len(&self) -> usize {
        match (self.sweep, &self.value) {
            (Some(range), ParamValue::Int(_) | ParamValue::Double(_)) => range.len(),
            _ => 1,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Ordered values this parameter takes during a sweep.
    ///
    /// Non-numeric parameters and numeric ones without a range contribute
    /// their single current value.
    pub fn sweep_values(&self) -> Vec<ParamValue> {
        let Some(range) = self.sweep else {
            return vec![self.value.clone()];
        };
        match self.value {
            ParamValue::Int(_) => range
                .values()
                .into_iter()
                .map(|v| ParamValue::Int(v.round() as i64))
                .collect(),
            ParamValue::Double(_) => range.values().into_iter().map(ParamValue::Double).collect(),
            _ => vec![self.value.clone()],
        }
    }

    /// Take value and range from `other`, which must have the same name and kind.
    pub fn assign_from(&mut self, other: &ScriptingParameter) -> Result<(), ParamError> {
        if self.value.kind() != other.value.kind() {
            return Err(ParamError::TypeMismatch {
                name: self.name.clone(),
                expected: self.value.kind(),
                actual: other.value.kind(),
            });
        }
        other.check_sweep()?;
        self.value = other.value.clone();
        self.sweep = other.sweep;
        Ok(())
    }
}

/// Apply `incoming` onto `params` by name. Either all assignments succeed or none do.
pub fn apply_parameters(
    params: &mut [ScriptingParameter],
    incoming: &[ScriptingParameter],
) -> Result<(), ParamError> {
    let mut staged = params.to_vec();
    for p in incoming {
        let target = staged
            .iter_mut()
            .find(|t| t.name == p.name)
            .ok_or_else(|| ParamError::Unknown(p.name.clone()))?;
        target.assign_from(p)?;
    }
    params.clone_from_slice(&staged);
    Ok(())
}

/// One concrete assignment of values to every parameter: a sweep combination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub values: Vec<(String, ParamValue)>,
}

impl ParamSet {
    pub fn new(values: Vec<(String, ParamValue)>) -> Self {
        Self { values }
    }

    /// Current (unswept) values of `params`.
    pub fn current(params: &[ScriptingParameter]) -> Self {
        Self::new(
            params
                .iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Double value; Int parameters are widened.
    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_f64()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ParamValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_series(&self, name: &str) -> Option<PriceSeries> {
        match self.get(name)? {
            ParamValue::Series(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_step_count_matches_formula() {
        let r = SweepRange::new(10.0, 50.0, 10.0);
        assert_eq!(r.len(), 5);
        assert_eq!(r.values(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);

        let r = SweepRange::new(1.0, 2.0, 0.3);
        assert_eq!(r.len(), 4); // 1.0, 1.3, 1.6, 1.9
    }

    #[test]
    fn float_steps_include_stop() {
        let r = SweepRange::new(0.1, 0.3, 0.1);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn non_positive_step_yields_single_value() {
        assert_eq!(SweepRange::new(5.0, 10.0, 0.0).values(), vec![5.0]);
        assert_eq!(SweepRange::new(5.0, 10.0, -1.0).values(), vec![5.0]);
    }

    #[test]
    fn inverted_range_yields_start() {
        assert_eq!(SweepRange::new(10.0, 5.0, 1.0).values(), vec![10.0]);
    }

    #[test]
    fn int_sweep_values() {
        let p = ScriptingParameter::int("fast", 5)
            .with_sweep(5.0, 15.0, 5.0)
            .unwrap();
        assert_eq!(
            p.sweep_values(),
            vec![ParamValue::Int(5), ParamValue::Int(10), ParamValue::Int(15)]
        );
    }

    #[test]
    fn fractional_int_sweeps_are_rejected() {
        assert_eq!(
            ScriptingParameter::int("n", 1).with_sweep(1.0, 2.0, 0.5),
            Err(ParamError::FractionalIntSweep("n".into()))
        );
        assert!(ScriptingParameter::int("n", 1)
            .with_sweep(0.5, 3.0, 1.0)
            .is_err());

        // A fractional stop is fine: the walk just ends below it.
        let p = ScriptingParameter::int("n", 1)
            .with_sweep(1.0, 3.5, 1.0)
            .unwrap();
        assert_eq!(p.sweep_len(), 3);
        assert_eq!(p.sweep_values().len(), 3);

        let d = ScriptingParameter::double("x", 1.0)
            .with_sweep(1.0, 2.0, 0.5)
            .unwrap();
        assert_eq!(d.sweep_len(), 3);
    }

    #[test]
    fn unbounded_sweeps_are_rejected() {
        assert_eq!(SweepRange::new(0.0, f64::INFINITY, 1.0).len(), 1);
        assert_eq!(SweepRange::new(0.0, f64::NAN, 1.0).len(), 1);
        assert_eq!(SweepRange::new(0.0, 1e300, 1e-300).len(), usize::MAX);

        assert_eq!(
            ScriptingParameter::double("x", 0.0).with_sweep(0.0, f64::INFINITY, 1.0),
            Err(ParamError::NonFiniteSweep("x".into()))
        );
        assert!(matches!(
            ScriptingParameter::int("n", 0).with_sweep(0.0, 1e12, 1.0),
            Err(ParamError::SweepTooLarge { .. })
        ));
    }

    #[test]
    fn apply_parameters_checks_incoming_ranges() {
        let mut params = vec![ScriptingParameter::int("n", 1)];
        let mut incoming = ScriptingParameter::int("n", 2);
        incoming.sweep = Some(SweepRange::new(1.0, 2.0, 0.5));
        assert_eq!(
            apply_parameters(&mut params, &[incoming]),
            Err(ParamError::FractionalIntSweep("n".into()))
        );
        assert_eq!(params[0].sweep, None);
    }

    #[test]
    fn non_numeric_contributes_current_value() {
        let p = ScriptingParameter::series("src", PriceSeries::Close);
        assert_eq!(p.sweep_values(), vec![ParamValue::Series(PriceSeries::Close)]);
        assert!(ScriptingParameter::bool("flag", true)
            .with_sweep(0.0, 1.0, 1.0)
            .is_err());
    }

    #[test]
    fn apply_parameters_is_all_or_nothing() {
        let mut params = vec![
            ScriptingParameter::int("fast", 5),
            ScriptingParameter::double("stop", 1.0),
        ];
        let incoming = vec![
            ScriptingParameter::int("fast", 8),
            ScriptingParameter::string("stop", "oops"),
        ];
        let err = apply_parameters(&mut params, &incoming).unwrap_err();
        assert!(matches!(err, ParamError::TypeMismatch { .. }));
        assert_eq!(params[0].value, ParamValue::Int(5));

        apply_parameters(&mut params, &[ScriptingParameter::int("fast", 8)]).unwrap();
        assert_eq!(params[0].value, ParamValue::Int(8));
    }

    #[test]
    fn apply_unknown_parameter_fails() {
        let mut params = vec![ScriptingParameter::int("fast", 5)];
        assert_eq!(
            apply_parameters(&mut params, &[ScriptingParameter::int("slow", 1)]),
            Err(ParamError::Unknown("slow".into()))
        );
    }

    #[test]
    fn param_set_accessors() {
        let set = ParamSet::new(vec![
            ("fast".into(), ParamValue::Int(5)),
            ("name".into(), ParamValue::String("x".into())),
        ]);
        assert_eq!(set.get_int("fast"), Some(5));
        assert_eq!(set.get_double("fast"), Some(5.0));
        assert_eq!(set.get_str("name"), Some("x"));
        assert_eq!(set.get_bool("fast"), None);
        assert_eq!(set.to_string(), "fast=5,name=x");
    }
}
