//! Property values, addresses and deferred outputs.
//!
//! A property is either a literal or something the engine can only resolve
//! after another resource exists. Deferred values are carried as [`Output`]s;
//! they render to engine interpolation expressions and are also the source of
//! every inferred dependency edge in the graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Whether an address names a managed resource or a read-only lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Created, updated and destroyed by the engine.
    Managed,
    /// Looked up, never modified.
    Data,
}

/// Stable logical address of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    /// Managed resource or data source.
    pub mode: Mode,
    /// Engine resource type, e.g. `aws_s3_bucket`.
    pub resource_type: String,
    /// Logical name, unique per type.
    pub name: String,
}

impl Address {
    /// Address of a managed resource.
    #[must_use]
    pub fn managed(resource_type: &str, name: &str) -> Self {
        Self {
            mode: Mode::Managed,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        }
    }

    /// Address of a data source.
    #[must_use]
    pub fn data(resource_type: &str, name: &str) -> Self {
        Self {
            mode: Mode::Data,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        }
    }

    /// Returns true for read-only lookups.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self.mode, Mode::Data)
    }

    /// Deferred value of one of this declaration's attributes.
    #[must_use]
    pub fn attr(&self, attribute: &str) -> Output {
        Output {
            source: self.clone(),
            expression: format!("{self}.{attribute}"),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            Mode::Managed => write!(f, "{}.{}", self.resource_type, self.name),
            Mode::Data => write!(f, "data.{}.{}", self.resource_type, self.name),
        }
    }
}

/// A value known only once its source declaration has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    source: Address,
    expression: String,
}

impl Output {
    /// An arbitrary engine expression over `source`.
    ///
    /// The expression must only reference `source`; the dependency edge is
    /// taken from it.
    #[must_use]
    pub fn derived(source: &Address, expression: impl Into<String>) -> Self {
        Self {
            source: source.clone(),
            expression: expression.into(),
        }
    }

    /// `field` of the first element of the list attribute `list`.
    #[must_use]
    pub fn first_of(source: &Address, list: &str, field: &str) -> Self {
        Self::derived(source, format!("tolist({source}.{list})[0].{field}"))
    }

    /// The declaration this value comes from.
    #[must_use]
    pub const fn source(&self) -> &Address {
        &self.source
    }

    /// The raw engine expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The expression wrapped for interpolation inside a string.
    #[must_use]
    pub fn interpolation(&self) -> String {
        format!("${{{}}}", self.expression)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Output(Output),
}

/// A string assembled from literal text and deferred values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Creates an empty template.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Appends literal text.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.segments.push(Segment::Text(text.into()));
        self
    }

    /// Appends a deferred value.
    #[must_use]
    pub fn output(mut self, output: Output) -> Self {
        self.segments.push(Segment::Output(output));
        self
    }

    /// Splits `text` on placeholder tokens, substituting each with its output.
    ///
    /// Used to embed deferred values in documents that are serialized first,
    /// such as JSON policies.
    #[must_use]
    pub fn from_placeholders(text: &str, substitutions: &[(&str, Output)]) -> Self {
        let mut template = Self::new();
        let mut rest = text;

        loop {
            let next = substitutions
                .iter()
                .filter_map(|(token, output)| rest.find(token).map(|at| (at, *token, output)))
                .min_by_key(|(at, _, _)| *at);

            let Some((at, token, output)) = next else {
                break;
            };

            if at > 0 {
                template = template.text(&rest[..at]);
            }
            template = template.output(output.clone());
            rest = &rest[at + token.len()..];
        }

        if !rest.is_empty() {
            template = template.text(rest);
        }
        template
    }

    /// Renders to a string with interpolation expressions.
    #[must_use]
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => escape_literal(text),
                Segment::Output(output) => output.interpolation(),
            })
            .collect()
    }

    /// Returns the literal value when the template holds no deferred parts.
    #[must_use]
    pub fn as_literal(&self) -> Option<String> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => Some(text.as_str()),
                Segment::Output(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.concat())
    }

    /// Every declaration referenced by this template.
    #[must_use]
    pub fn references(&self) -> BTreeSet<Address> {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, into: &mut BTreeSet<Address>) {
        for segment in &self.segments {
            if let Segment::Output(output) = segment {
                into.insert(output.source.clone());
            }
        }
    }
}

impl From<Output> for Template {
    fn from(output: Output) -> Self {
        Self::new().output(output)
    }
}

/// Escapes engine template sequences in literal text.
fn escape_literal(text: &str) -> String {
    text.replace("${", "$${").replace("%{", "%%{")
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    /// A plain value with no engine-side resolution.
    Literal(Value),
    /// A string that may embed deferred values.
    Template(Template),
    /// A list of values.
    List(Vec<Prop>),
    /// A nested block.
    Block(Props),
}

impl Prop {
    /// Renders to the engine's JSON representation.
    #[must_use]
    pub fn render(&self) -> Value {
        match self {
            Self::Literal(value) => escape_value(value),
            Self::Template(template) => Value::String(template.render()),
            Self::List(items) => Value::Array(items.iter().map(Self::render).collect()),
            Self::Block(props) => props.render(),
        }
    }

    fn collect_references(&self, into: &mut BTreeSet<Address>) {
        match self {
            Self::Literal(_) => {}
            Self::Template(template) => template.collect_references(into),
            Self::List(items) => {
                for item in items {
                    item.collect_references(into);
                }
            }
            Self::Block(props) => props.collect_references(into),
        }
    }
}

fn escape_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_literal(s)),
        Value::Array(items) => Value::Array(items.iter().map(escape_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), escape_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Prop {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<bool> for Prop {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

impl From<u32> for Prop {
    fn from(value: u32) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<Output> for Prop {
    fn from(value: Output) -> Self {
        Self::Template(value.into())
    }
}

impl From<Template> for Prop {
    fn from(value: Template) -> Self {
        Self::Template(value)
    }
}

impl From<Props> for Prop {
    fn from(value: Props) -> Self {
        Self::Block(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Prop {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// An ordered set of named properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Props(BTreeMap<String, Prop>);

impl Props {
    /// Creates an empty property set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a property, builder style.
    #[must_use]
    pub fn set(mut self, key: &str, value: impl Into<Prop>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Gets a property by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.0.get(key)
    }

    /// Renders to a JSON object.
    #[must_use]
    pub fn render(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(key, prop)| (key.clone(), prop.render()))
                .collect(),
        )
    }

    /// Every declaration referenced by a deferred value in these properties.
    #[must_use]
    pub fn references(&self) -> BTreeSet<Address> {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, into: &mut BTreeSet<Address>) {
        for prop in self.0.values() {
            prop.collect_references(into);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_display() {
        assert_eq!(Address::managed("aws_s3_bucket", "bucket").to_string(), "aws_s3_bucket.bucket");
        assert_eq!(
            Address::data("aws_route53_zone", "zone").to_string(),
            "data.aws_route53_zone.zone"
        );
    }

    #[test]
    fn test_output_interpolation() {
        let bucket = Address::managed("aws_s3_bucket", "bucket");
        assert_eq!(bucket.attr("arn").interpolation(), "${aws_s3_bucket.bucket.arn}");

        let cert = Address::managed("aws_acm_certificate", "certificate");
        let name = Output::first_of(&cert, "domain_validation_options", "resource_record_name");
        assert_eq!(
            name.expression(),
            "tolist(aws_acm_certificate.certificate.domain_validation_options)[0].resource_record_name"
        );
        assert_eq!(name.source(), &cert);
    }

    #[test]
    fn test_template_render_and_literal() {
        let cdn = Address::managed("aws_cloudfront_distribution", "cdn");
        let url = Template::new().text("https://").output(cdn.attr("domain_name"));
        assert_eq!(url.render(), "https://${aws_cloudfront_distribution.cdn.domain_name}");
        assert_eq!(url.as_literal(), None);

        let fixed = Template::new().text("https://").text("shop.example.com");
        assert_eq!(fixed.as_literal().as_deref(), Some("https://shop.example.com"));
    }

    #[test]
    fn test_from_placeholders() {
        let bucket = Address::managed("aws_s3_bucket", "bucket");
        let template = Template::from_placeholders(
            "[\"@A@\",\"@A@/*\"]",
            &[("@A@", bucket.attr("arn"))],
        );
        assert_eq!(
            template.render(),
            "[\"${aws_s3_bucket.bucket.arn}\",\"${aws_s3_bucket.bucket.arn}/*\"]"
        );
    }

    #[test]
    fn test_literals_are_escaped() {
        let props = Props::new()
            .set("key", "docs/${name}.html")
            .set("nested", Props::new().set("flag", true).set("ttl", 60u32));

        assert_eq!(
            props.render(),
            json!({"key": "docs/$${name}.html", "nested": {"flag": true, "ttl": 60}})
        );
    }

    #[test]
    fn test_references_are_collected_through_nesting() {
        let bucket = Address::managed("aws_s3_bucket", "bucket");
        let oai = Address::managed("aws_cloudfront_origin_access_identity", "oai");
        let props = Props::new()
            .set("plain", "value")
            .set(
                "origin",
                vec![Props::new()
                    .set("origin_id", bucket.attr("arn"))
                    .set("s3_origin_config", Props::new().set("origin_access_identity", oai.attr("cloudfront_access_identity_path")))],
            );

        let refs = props.references();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&bucket));
        assert!(refs.contains(&oai));
    }
}
