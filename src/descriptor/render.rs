//! Terraform JSON rendering.

use serde_json::{Map, Value, json};

use super::Descriptor;

const PROVIDER_SOURCE: &str = "hashicorp/aws";
const PROVIDER_VERSION: &str = ">= 5.0";

/// Renders the whole descriptor as a `*.tf.json` document.
pub(super) fn render(descriptor: &Descriptor) -> Value {
    let mut root = Map::new();

    let mut terraform = Map::new();
    terraform.insert(
        String::from("required_providers"),
        json!({ "aws": { "source": PROVIDER_SOURCE, "version": PROVIDER_VERSION } }),
    );
    if let Some(backend) = descriptor.backend() {
        terraform.insert(
            String::from("backend"),
            json!({
                "s3": {
                    "bucket": backend.bucket,
                    "key": backend.key,
                    "region": backend.region,
                }
            }),
        );
    }
    root.insert(String::from("terraform"), Value::Object(terraform));

    if !descriptor.providers().is_empty() {
        let providers: Vec<Value> = descriptor
            .providers()
            .iter()
            .map(|p| {
                let mut block = Map::new();
                if let Some(alias) = &p.alias {
                    block.insert(String::from("alias"), Value::String(alias.clone()));
                }
                block.insert(String::from("region"), Value::String(p.region.clone()));
                Value::Object(block)
            })
            .collect();
        root.insert(String::from("provider"), json!({ "aws": providers }));
    }

    let mut data: Map<String, Value> = Map::new();
    let mut managed: Map<String, Value> = Map::new();

    for resource in descriptor.resources() {
        let address = resource.address();
        let section = if address.is_data() { &mut data } else { &mut managed };
        if let Value::Object(by_name) = section
            .entry(address.resource_type.clone())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            by_name.insert(address.name.clone(), resource.render());
        }
    }

    if !data.is_empty() {
        root.insert(String::from("data"), Value::Object(data));
    }
    if !managed.is_empty() {
        root.insert(String::from("resource"), Value::Object(managed));
    }

    if !descriptor.outputs().is_empty() {
        let outputs: Map<String, Value> = descriptor
            .outputs()
            .iter()
            .map(|(name, value)| (name.clone(), json!({ "value": value.render() })))
            .collect();
        root.insert(String::from("output"), Value::Object(outputs));
    }

    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{Address, Descriptor, Props, Resource, S3Backend, Template};
    use serde_json::json;

    #[test]
    fn test_render_sections() {
        let mut descriptor = Descriptor::new();
        descriptor.add_provider("eu-west-1", None);
        descriptor.add_provider("us-east-1", Some("us_east_1"));

        let zone = Address::data("aws_route53_zone", "zone");
        descriptor
            .add(Resource::new(
                zone.clone(),
                Props::new().set("name", "example.com").set("private_zone", false),
            ))
            .unwrap();
        descriptor
            .add(Resource::new(
                Address::managed("aws_route53_record", "alias"),
                Props::new().set("zone_id", zone.attr("zone_id")).set("name", "shop"),
            ))
            .unwrap();
        descriptor.add_output("domainURL", Template::new().text("https://shop.example.com"));

        let rendered = descriptor.render();

        assert_eq!(
            rendered["terraform"]["required_providers"]["aws"]["source"],
            json!("hashicorp/aws")
        );
        assert_eq!(
            rendered["provider"]["aws"],
            json!([{"region": "eu-west-1"}, {"alias": "us_east_1", "region": "us-east-1"}])
        );
        assert_eq!(
            rendered["data"]["aws_route53_zone"]["zone"],
            json!({"name": "example.com", "private_zone": false})
        );
        assert_eq!(
            rendered["resource"]["aws_route53_record"]["alias"]["zone_id"],
            json!("${data.aws_route53_zone.zone.zone_id}")
        );
        assert_eq!(
            rendered["output"]["domainURL"],
            json!({"value": "https://shop.example.com"})
        );
    }

    #[test]
    fn test_s3_backend_rendered() {
        let mut descriptor = Descriptor::new();
        descriptor.set_backend(S3Backend {
            bucket: String::from("state-bucket"),
            key: String::from("edgesite/shop/prod/terraform.tfstate"),
            region: String::from("eu-west-1"),
        });

        let rendered = descriptor.render();
        assert_eq!(
            rendered["terraform"]["backend"],
            json!({"s3": {
                "bucket": "state-bucket",
                "key": "edgesite/shop/prod/terraform.tfstate",
                "region": "eu-west-1"
            }})
        );
        assert_eq!(
            rendered["terraform"]["required_providers"]["aws"]["version"],
            json!(">= 5.0")
        );
    }

    #[test]
    fn test_empty_sections_omitted() {
        let rendered = Descriptor::new().render();
        assert!(rendered["terraform"].get("backend").is_none());
        assert!(rendered.get("data").is_none());
        assert!(rendered.get("resource").is_none());
        assert!(rendered.get("output").is_none());
        assert!(rendered.get("provider").is_none());
    }
}
