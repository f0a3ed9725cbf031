//! Core types shared by policies and security contexts

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Resource type identifier (e.g., "course", "assignment_result")
pub type ResourceType = String;

/// Shared handle to a domain object subject to policy
pub type ResourceRef = Arc<dyn Resource>;

/// Principal (user, service account, agent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (e.g., "user:alice", "student:7")
    pub id: String,

    /// Principal type (user, student, service, etc.)
    #[serde(rename = "type")]
    pub principal_type: String,

    /// Additional attributes (e.g., department)
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Capabilities checked by the `is` rule option
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Role objects looked up by the `as` rule option
    #[serde(default)]
    pub roles: HashMap<String, Vec<Principal>>,
}

impl Principal {
    /// Create a new principal from an ID string
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let principal_type = id.split(':').next().unwrap_or("user").to_string();

        Self {
            id,
            principal_type,
            attributes: HashMap::new(),
            capabilities: BTreeSet::new(),
            roles: HashMap::new(),
        }
    }

    /// Add an attribute to the principal
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Grant a capability (`is: admin`)
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Attach a role object (`as: student`). A role may hold several objects.
    pub fn with_role(mut self, role: impl Into<String>, object: Principal) -> Self {
        self.roles.entry(role.into()).or_default().push(object);
        self
    }

    /// Identifier without the type prefix ("student:7" -> "7")
    pub fn local_id(&self) -> &str {
        self.id
            .split_once(':')
            .map(|(_, id)| id)
            .unwrap_or(&self.id)
    }

    /// Whether the principal holds a capability
    pub fn is(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Role objects registered under `role`
    pub fn roles_as(&self, role: &str) -> &[Principal] {
        self.roles.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Attribute value, if present
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Upcast helper so resources can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Domain object checked by dynamic rules
///
/// Implemented by the embedding application for each type it protects.
/// `related` follows one step of a condition path (`assignment.course`);
/// it may perform blocking I/O.
pub trait Resource: AsAny + fmt::Debug + Send + Sync {
    /// Resource type this object belongs to
    fn resource_type(&self) -> &str;

    /// Stable identifier, unique within the resource type
    fn resource_id(&self) -> String;

    /// Object reached through `field`, or `None` when the step is missing
    fn related(&self, field: &str) -> anyhow::Result<Option<ResourceRef>> {
        let _ = field;
        Ok(None)
    }
}

impl<'a> dyn Resource + 'a {
    /// Downcast to the concrete domain type
    pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Whether this object is the given principal
    pub fn is_principal(&self, principal: &Principal) -> bool {
        self.resource_type() == principal.principal_type
            && self.resource_id() == principal.local_id()
    }
}

/// Evaluated extra argument of a `type.right(path, args)` reference
#[derive(Debug, Clone)]
pub enum ArgValue {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Symbol(String),
    Resource(ResourceRef),
}

impl ArgValue {
    /// Resource argument, if any
    pub fn as_resource(&self) -> Option<&dyn Resource> {
        match self {
            ArgValue::Resource(resource) => Some(resource.as_ref()),
            _ => None,
        }
    }

    /// String or symbol argument, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(value) | ArgValue::Symbol(value) => Some(value),
            _ => None,
        }
    }

    /// Integer argument, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Everything except `nil` and `false` is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, ArgValue::Nil | ArgValue::Bool(false))
    }
}

/// Loads resources by type and id (e.g., from request parameters)
pub trait ResourceResolver: Send + Sync {
    /// Resolve `id` of `resource_type`; `Ok(None)` when it does not exist
    fn resolve(&self, resource_type: &str, id: &str) -> anyhow::Result<Option<ResourceRef>>;
}

impl<F> ResourceResolver for F
where
    F: Fn(&str, &str) -> anyhow::Result<Option<ResourceRef>> + Send + Sync,
{
    fn resolve(&self, resource_type: &str, id: &str) -> anyhow::Result<Option<ResourceRef>> {
        self(resource_type, id)
    }
}

/// Thread-safe in-memory resolver
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    objects: DashMap<(String, String), ResourceRef>,
}

impl InMemoryResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource, replacing any object with the same type and id
    pub fn insert(&self, resource: ResourceRef) -> Option<ResourceRef> {
        let key = (resource.resource_type().to_string(), resource.resource_id());
        self.objects.insert(key, resource)
    }

    /// Remove a resource
    pub fn remove(&self, resource_type: &str, id: &str) -> Option<ResourceRef> {
        self.objects
            .remove(&(resource_type.to_string(), id.to_string()))
            .map(|(_, resource)| resource)
    }

    /// Number of registered resources
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no resources are registered
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ResourceResolver for InMemoryResolver {
    fn resolve(&self, resource_type: &str, id: &str) -> anyhow::Result<Option<ResourceRef>> {
        Ok(self
            .objects
            .get(&(resource_type.to_string(), id.to_string()))
            .map(|entry| Arc::clone(entry.value())))
    }
}
