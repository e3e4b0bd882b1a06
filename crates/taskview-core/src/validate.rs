//! Input validation and command templating for task submissions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_TASK_NAME_LENGTH: usize = 100;

/// Enumerates supported `ParameterKind` values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Int,
    String,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int"),
            Self::String => f.write_str("string"),
        }
    }
}

/// One parameter slot of a task definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task name cannot be empty")]
    EmptyTaskName,
    #[error("task name too long")]
    TaskNameTooLong,
    #[error("task name contains invalid characters")]
    InvalidTaskName,
    #[error("invalid task id format")]
    InvalidTaskId,
    #[error("task does not accept parameters, but {0} parameter(s) were provided")]
    ParametersNotAllowed(usize),
    #[error("required parameter '{name}' (type {kind}) is missing")]
    MissingRequiredParameter { name: String, kind: ParameterKind },
    #[error("unknown parameter '{0}' provided (not defined in task configuration)")]
    UnknownParameter(String),
    #[error("parameter '{name}' must be an integer, got float: {value}")]
    FractionalInt { name: String, value: String },
    #[error(
        "parameter '{name}' (type int) contains invalid characters. \
         Only digits 0-9 are allowed, got: {value}"
    )]
    InvalidIntValue { name: String, value: String },
    #[error(
        "parameter '{name}' (type string) contains invalid characters. \
         Only [-A-Za-z0-9_:,.] are allowed, got: {value}"
    )]
    InvalidStringValue { name: String, value: String },
    #[error("parameter '{name}' has unsupported kind: {found}")]
    UnsupportedValueKind { name: String, found: &'static str },
}

fn is_task_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_string_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | ',' | '.')
}

/// Validates a task name against the `[A-Za-z0-9_-]{1,100}` contract.
pub fn validate_task_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyTaskName);
    }
    if name.len() > MAX_TASK_NAME_LENGTH {
        return Err(ValidationError::TaskNameTooLong);
    }
    if !name.chars().all(is_task_name_char) {
        return Err(ValidationError::InvalidTaskName);
    }
    Ok(())
}

/// Parses a task id in canonical 128-bit form. Hyphenated and unhyphenated
/// inputs are both accepted; rendering back out is always hyphenated
/// lowercase.
pub fn validate_task_id(task_id: &str) -> Result<Uuid, ValidationError> {
    Uuid::try_parse(task_id).map_err(|_| ValidationError::InvalidTaskId)
}

/// Validates provided parameters against their definitions and normalizes
/// every accepted value to its canonical string form.
pub fn validate_and_normalize_parameters(
    defs: &[ParameterSpec],
    provided: &Map<String, Value>,
) -> Result<BTreeMap<String, String>, ValidationError> {
    if defs.is_empty() {
        if !provided.is_empty() {
            return Err(ValidationError::ParametersNotAllowed(provided.len()));
        }
        return Ok(BTreeMap::new());
    }

    let mut validated = BTreeMap::new();
    for def in defs {
        match provided.get(&def.name) {
            Some(value) => {
                let normalized = normalize_parameter_value(&def.name, def.kind, value)?;
                validated.insert(def.name.clone(), normalized);
            }
            None if def.optional => {}
            None => {
                return Err(ValidationError::MissingRequiredParameter {
                    name: def.name.clone(),
                    kind: def.kind,
                });
            }
        }
    }

    for name in provided.keys() {
        if !defs.iter().any(|def| def.name == *name) {
            return Err(ValidationError::UnknownParameter(name.clone()));
        }
    }

    Ok(validated)
}

fn normalize_parameter_value(
    name: &str,
    kind: ParameterKind,
    value: &Value,
) -> Result<String, ValidationError> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => {
            if kind == ParameterKind::Int {
                if let Some(signed) = number.as_i64() {
                    signed.to_string()
                } else if let Some(unsigned) = number.as_u64() {
                    unsigned.to_string()
                } else {
                    // Integer-valued floats are accepted; fractions are not.
                    let float = number.as_f64().unwrap_or(f64::NAN);
                    if float != (float as i64) as f64 {
                        return Err(ValidationError::FractionalInt {
                            name: name.to_string(),
                            value: number.to_string(),
                        });
                    }
                    (float as i64).to_string()
                }
            } else {
                number.to_string()
            }
        }
        Value::Bool(_) => {
            return Err(ValidationError::UnsupportedValueKind {
                name: name.to_string(),
                found: "boolean",
            });
        }
        Value::Array(_) => {
            return Err(ValidationError::UnsupportedValueKind {
                name: name.to_string(),
                found: "array",
            });
        }
        Value::Object(_) => {
            return Err(ValidationError::UnsupportedValueKind {
                name: name.to_string(),
                found: "object",
            });
        }
        Value::Null => {
            return Err(ValidationError::UnsupportedValueKind {
                name: name.to_string(),
                found: "null",
            });
        }
    };

    match kind {
        ParameterKind::Int => {
            if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
                return Err(ValidationError::InvalidIntValue {
                    name: name.to_string(),
                    value: text,
                });
            }
            Ok(text)
        }
        ParameterKind::String => {
            if text.is_empty() || !text.chars().all(is_string_param_char) {
                return Err(ValidationError::InvalidStringValue {
                    name: name.to_string(),
                    value: text,
                });
            }
            Ok(text)
        }
    }
}

/// Replaces every `{{name}}` marker that has a value in `params`. Markers
/// without a matching key are left intact.
pub fn substitute_parameters(command: &str, params: &BTreeMap<String, String>) -> String {
    let mut result = command.to_string();
    for (name, value) in params {
        let placeholder = format!("{{{{{name}}}}}");
        result = result.replace(&placeholder, value);
    }
    result
}

/// Wraps `command` in single quotes for safe embedding in a shell script,
/// turning every embedded quote into `'\''`.
pub fn shell_escape(command: &str) -> String {
    format!("'{}'", command.replace('\'', "'\\''"))
}
