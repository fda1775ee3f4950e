use std::fmt;

use serde::{Deserialize, Serialize};

use super::param::{find_param, param_value, set_param, write_params, Param};
use super::uri::Uri;

/// A name-addr or addr-spec with header parameters, as carried by From and To.
///
/// ```text
/// "Alice" <sip:alice@atlanta.example.com>;tag=1928301774
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: Vec<Param>,
}

impl Address {
    pub fn new(uri: impl Into<Uri>) -> Self {
        Self {
            display_name: None,
            uri: uri.into(),
            params: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.set_tag(tag);
        self
    }

    pub fn tag(&self) -> Option<&str> {
        param_value(&self.params, "tag")
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        set_param(&mut self.params, "tag", Some(tag.into()));
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        find_param(&self.params, name)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            f.write_str("\"")?;
            for c in name.chars() {
                if c == '"' || c == '\\' {
                    f.write_str("\\")?;
                }
                write!(f, "{}", c)?;
            }
            f.write_str("\" ")?;
        }
        write!(f, "<{}>", self.uri)?;
        write_params(f, &self.params)
    }
}
