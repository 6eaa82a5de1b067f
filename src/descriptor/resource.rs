//! Resource declarations.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::value::{Address, Props, Template};

/// A condition the engine checks before creating or updating a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    /// Boolean engine expression.
    pub condition: Template,
    /// Message reported when the condition is false.
    pub error_message: String,
}

/// One declared resource or data source.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    address: Address,
    props: Props,
    depends_on: BTreeSet<Address>,
    provider: Option<String>,
    preconditions: Vec<Precondition>,
}

impl Resource {
    /// Declares a resource at `address` with the given properties.
    #[must_use]
    pub fn new(address: Address, props: Props) -> Self {
        Self {
            address,
            props,
            depends_on: BTreeSet::new(),
            provider: None,
            preconditions: Vec::new(),
        }
    }

    /// Adds an explicit ordering constraint not implied by any property.
    #[must_use]
    pub fn depends_on(mut self, address: &Address) -> Self {
        self.depends_on.insert(address.clone());
        self
    }

    /// Binds the resource to a provider configuration, e.g. `aws.us_east_1`.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Adds an engine-side precondition.
    #[must_use]
    pub fn with_precondition(mut self, condition: Template, error_message: impl Into<String>) -> Self {
        self.preconditions.push(Precondition {
            condition,
            error_message: error_message.into(),
        });
        self
    }

    /// The resource address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// The declared properties.
    #[must_use]
    pub const fn props(&self) -> &Props {
        &self.props
    }

    /// Provider binding, if not the default provider.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Explicit `depends_on` constraints.
    #[must_use]
    pub const fn explicit_dependencies(&self) -> &BTreeSet<Address> {
        &self.depends_on
    }

    /// Dependencies inferred from deferred values in properties and preconditions.
    #[must_use]
    pub fn inferred_dependencies(&self) -> BTreeSet<Address> {
        let mut refs = self.props.references();
        for precondition in &self.preconditions {
            refs.extend(precondition.condition.references());
        }
        refs.remove(&self.address);
        refs
    }

    /// All dependencies, explicit and inferred.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<Address> {
        let mut deps = self.inferred_dependencies();
        deps.extend(self.depends_on.iter().cloned());
        deps
    }

    /// Renders the resource body in the engine's JSON syntax.
    #[must_use]
    pub fn render(&self) -> Value {
        let mut body = match self.props.render() {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        if !self.depends_on.is_empty() {
            body.insert(
                String::from("depends_on"),
                Value::Array(
                    self.depends_on
                        .iter()
                        .map(|a| Value::String(a.to_string()))
                        .collect(),
                ),
            );
        }

        if let Some(provider) = &self.provider {
            body.insert(String::from("provider"), Value::String(provider.clone()));
        }

        if !self.preconditions.is_empty() {
            let preconditions = self
                .preconditions
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "condition": p.condition.render(),
                        "error_message": p.error_message,
                    })
                })
                .collect();
            let mut lifecycle = Map::new();
            lifecycle.insert(String::from("precondition"), Value::Array(preconditions));
            body.insert(String::from("lifecycle"), Value::Object(lifecycle));
        }

        Value::Object(body)
    }
}
