//! Generic `name[=value]` parameters, as found on URIs and header values.
//!
//! Parameter lists keep their wire order. Names compare case-insensitively.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single parameter. `value == None` is a flag parameter such as `lr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            value: value.map(Into::into),
        }
    }

    /// A parameter without value
    pub fn flag(name: impl Into<String>) -> Self {
        Self { name: name.into(), value: None }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => f.write_str(&self.name),
        }
    }
}

/// First parameter named `name`.
pub fn find_param<'a>(params: &'a [Param], name: &str) -> Option<&'a Param> {
    params.iter().find(|p| p.is_named(name))
}

/// Value of the first parameter named `name`, if it has one.
pub fn param_value<'a>(params: &'a [Param], name: &str) -> Option<&'a str> {
    find_param(params, name).and_then(Param::value)
}

/// Replaces the value of `name` in place, or appends the parameter.
pub fn set_param(params: &mut Vec<Param>, name: &str, value: Option<String>) {
    match params.iter_mut().find(|p| p.is_named(name)) {
        Some(existing) => existing.value = value,
        None => params.push(Param { name: name.to_string(), value }),
    }
}

/// Removes every parameter named `name`; returns whether any was present.
pub fn remove_param(params: &mut Vec<Param>, name: &str) -> bool {
    let before = params.len();
    params.retain(|p| !p.is_named(name));
    params.len() != before
}

/// Writes `;name[=value]` for each parameter.
pub(crate) fn write_params(f: &mut fmt::Formatter<'_>, params: &[Param]) -> fmt::Result {
    for param in params {
        write!(f, ";{}", param)?;
    }
    Ok(())
}
