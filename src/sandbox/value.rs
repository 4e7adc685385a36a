//! Closed variant for answer values flowing from generated code to the
//! grading server.

use serde_json::{Map, Number, Value};

/// The interchange shapes an answer may take. Anything else is coerced to its
/// string form at the sandbox boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Number(Number),
    Text(String),
    Sequence(Vec<AnswerValue>),
    Map(Vec<(String, AnswerValue)>),
    Null,
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => AnswerValue::Null,
            Value::Bool(flag) => AnswerValue::Text(flag.to_string()),
            Value::Number(number) => AnswerValue::Number(normalize_number(number)),
            Value::String(text) => AnswerValue::Text(text),
            Value::Array(items) => {
                AnswerValue::Sequence(items.into_iter().map(AnswerValue::from_json).collect())
            }
            Value::Object(fields) => AnswerValue::Map(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, AnswerValue::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AnswerValue::Number(number) => Value::Number(number.clone()),
            AnswerValue::Text(text) => Value::String(text.clone()),
            AnswerValue::Sequence(items) => {
                Value::Array(items.iter().map(AnswerValue::to_json).collect())
            }
            AnswerValue::Map(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
            AnswerValue::Null => Value::Null,
        }
    }

    /// An error-shaped value must never be submitted: a map carrying an
    /// `error` key, or a short string that mentions one.
    pub fn is_error_shaped(&self) -> bool {
        match self {
            AnswerValue::Map(fields) => fields.iter().any(|(key, _)| key == "error"),
            AnswerValue::Text(text) => {
                text.len() < 50 && text.to_ascii_lowercase().contains("error")
            }
            _ => false,
        }
    }

    /// Models sometimes wrap the answer as `{"answer": value}`; unwrap that
    /// single-key envelope.
    pub fn unwrap_answer_envelope(self) -> Self {
        match self {
            AnswerValue::Map(mut fields) if fields.len() == 1 && fields[0].0 == "answer" => {
                fields.remove(0).1
            }
            other => other,
        }
    }
}

/// JS engines hand back integral values as floats; fold those onto integers
/// so coercion is stable across runs and the wire form stays clean.
fn normalize_number(number: Number) -> Number {
    if number.is_f64() {
        if let Some(f) = number.as_f64() {
            if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                return Number::from(f as i64);
            }
        }
    }
    number
}
