//! Action descriptions: which rule guards which data

use serde::{Deserialize, Serialize};

/// Where the objects checked by a binding come from
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum BindingSource {
    /// No data; checked statically or through `observe`
    #[default]
    Unbound,
    /// Request parameter holding the object id
    Param(String),
    /// Variable the action assigns objects to
    Variable(String),
}

/// `{action, resource_type, source}` entry of an action description
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionBinding {
    /// Rule name checked (e.g., "edit")
    pub action: String,

    pub resource_type: String,

    #[serde(default)]
    pub source: BindingSource,
}

impl ActionBinding {
    pub fn unbound(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            source: BindingSource::Unbound,
        }
    }

    /// Binding resolved from a request parameter
    pub fn param(action: impl Into<String>, resource_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source: BindingSource::Param(key.into()),
            ..Self::unbound(action, resource_type)
        }
    }

    /// Binding checked against the objects of a variable
    pub fn variable(action: impl Into<String>, resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: BindingSource::Variable(name.into()),
            ..Self::unbound(action, resource_type)
        }
    }
}
