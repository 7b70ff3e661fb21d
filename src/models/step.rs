// file: src/models/step.rs
// description: step descriptor and scalar parameter values
// reference: command argument rendering for external units

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value of a step parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

// External units were written against Python-style value tokens.
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => f.write_str(&float_token(*x)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Shortest round-trip digits, switching to `1e+16` / `1e-05` exponent form
/// outside `1e-4 <= |x| < 1e16`. Integral values keep a trailing `.0`.
fn float_token(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let scientific = format!("{:e}", x);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let plain = x.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One step of a pipeline. `index` is the only key events use to refer back
/// to a step and never changes once the definition is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub index: usize,
    pub name: String,
    pub unit: String,
    pub params: IndexMap<String, ParamValue>,
}

impl StepDescriptor {
    pub fn new(index: usize, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            unit: unit.into(),
            params: IndexMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_str)
    }

    /// `--key value` pairs in insertion order.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.params.len() * 2);
        for (key, value) in &self.params {
            args.push(format!("--{}", key));
            args.push(value.to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args_keep_insertion_order() {
        let step = StepDescriptor::new(0, "Cut tiles", "cli/cutting_cli.py")
            .with_param("output", "data/tiles")
            .with_param("input", "data/raw.tif")
            .with_param("size", 640i64);

        assert_eq!(
            step.command_args(),
            vec![
                "--output",
                "data/tiles",
                "--input",
                "data/raw.tif",
                "--size",
                "640"
            ]
        );
    }

    #[test]
    fn test_value_tokens() {
        assert_eq!(ParamValue::Bool(true).to_string(), "True");
        assert_eq!(ParamValue::Bool(false).to_string(), "False");
        assert_eq!(ParamValue::Float(1.0).to_string(), "1.0");
        assert_eq!(ParamValue::Float(0.35).to_string(), "0.35");
        assert_eq!(ParamValue::Integer(-4).to_string(), "-4");
    }

    #[test]
    fn test_float_tokens_switch_to_exponent_form() {
        assert_eq!(ParamValue::Float(1e16).to_string(), "1e+16");
        assert_eq!(ParamValue::Float(1e15).to_string(), "1000000000000000.0");
        assert_eq!(ParamValue::Float(1.2345e20).to_string(), "1.2345e+20");
        assert_eq!(ParamValue::Float(-2.5e100).to_string(), "-2.5e+100");
        assert_eq!(ParamValue::Float(1e-5).to_string(), "1e-05");
        assert_eq!(ParamValue::Float(1.5e-7).to_string(), "1.5e-07");
        assert_eq!(ParamValue::Float(0.0001).to_string(), "0.0001");
        assert_eq!(ParamValue::Float(0.0).to_string(), "0.0");
        assert_eq!(ParamValue::Float(f64::INFINITY).to_string(), "inf");
    }

    #[test]
    fn test_boolean_keeps_value_token() {
        let step = StepDescriptor::new(1, "Merge", "cli/merge_shp_cli.py").with_param("dissolve", true);
        assert_eq!(step.command_args(), vec!["--dissolve", "True"]);
    }

    #[test]
    fn test_from_json_rejects_non_scalars() {
        assert_eq!(
            ParamValue::from_json(&serde_json::json!(3)),
            Some(ParamValue::Integer(3))
        );
        assert_eq!(
            ParamValue::from_json(&serde_json::json!(0.5)),
            Some(ParamValue::Float(0.5))
        );
        assert!(ParamValue::from_json(&serde_json::json!([1, 2])).is_none());
        assert!(ParamValue::from_json(&serde_json::Value::Null).is_none());
    }
}
