//! Statements reading and writing run-time variables of a database node.

use {
    derive_more::Display,
    serde::{Deserialize, Serialize},
};

/// Value assigned to a run-time variable.
#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableValue {
    Int(i64),
    Str(String),
}

impl VariableValue {
    /// Renders this value as an SQL literal.
    pub fn to_literal(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Str(s) => quote(s),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid variable name: {0:?}")]
pub struct InvalidNameError(pub String);

/// Builds a statement returning a single `(name, value)` row for the
/// variable, or no rows if the node doesn't know it.
pub fn show(name: &str) -> Result<String, InvalidNameError> {
    validate_name(name)?;
    Ok(format!("SHOW GLOBAL VARIABLES LIKE '{name}'"))
}

/// Builds a statement assigning `value` to the variable.
pub fn set(name: &str, value: &VariableValue) -> Result<String, InvalidNameError> {
    validate_name(name)?;
    Ok(format!("SET GLOBAL {name} = {}", value.to_literal()))
}

/// Quotes `s` as an SQL string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Variable names are interpolated verbatim, so only identifier characters
/// are accepted.
fn validate_name(name: &str) -> Result<(), InvalidNameError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if !valid {
        return Err(InvalidNameError(name.to_owned()));
    }

    Ok(())
}
