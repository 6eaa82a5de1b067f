//! Static website descriptor assembly.
//!
//! Declares a private bucket published through a CDN distribution with a TLS
//! certificate and a DNS alias on a custom domain:
//!
//! - the bucket, its website configuration, ownership controls and public
//!   access block
//! - one object per content file
//! - an origin access identity and a policy granting it object reads
//! - the hosted zone lookup, the certificate, its validation record and
//!   the issuance wait
//! - the distribution and the alias record

use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

use crate::config::SiteInputs;
use crate::content::ContentFile;
use crate::error::Result;

use super::policy::bucket_read_policy;
use super::resource::Resource;
use super::value::{Address, Output, Props, Template};
use super::Descriptor;

const CERTIFICATE_REGION: &str = "us-east-1";
const CERTIFICATE_PROVIDER_ALIAS: &str = "us_east_1";
const VALIDATION_RECORD_TTL: u32 = 60;
const CACHE_TTL: u32 = 600;
const PRICE_CLASS: &str = "PriceClass_100";
const MAX_BUCKET_PREFIX_LEN: usize = 37;

/// Logical address of every fixed declaration.
mod names {
    use super::Address;

    pub fn bucket() -> Address {
        Address::managed("aws_s3_bucket", "bucket")
    }
    pub fn bucket_website() -> Address {
        Address::managed("aws_s3_bucket_website_configuration", "bucket_website")
    }
    pub fn ownership_controls() -> Address {
        Address::managed("aws_s3_bucket_ownership_controls", "ownership_controls")
    }
    pub fn public_access_block() -> Address {
        Address::managed("aws_s3_bucket_public_access_block", "public_access_block")
    }
    pub fn oai() -> Address {
        Address::managed("aws_cloudfront_origin_access_identity", "oai")
    }
    pub fn bucket_policy() -> Address {
        Address::managed("aws_s3_bucket_policy", "bucket_policy")
    }
    pub fn zone() -> Address {
        Address::data("aws_route53_zone", "zone")
    }
    pub fn certificate() -> Address {
        Address::managed("aws_acm_certificate", "certificate")
    }
    pub fn certificate_validation() -> Address {
        Address::managed("aws_route53_record", "certificate_validation")
    }
    pub fn certificate_issued() -> Address {
        Address::managed("aws_acm_certificate_validation", "certificate_issued")
    }
    pub fn cdn() -> Address {
        Address::managed("aws_cloudfront_distribution", "cdn")
    }
    pub fn alias() -> Address {
        Address::managed("aws_route53_record", "alias")
    }
}

/// Logical name of the object declared for `key`.
///
/// The readable part keeps ASCII alphanumerics, `-` and `_`; the key digest
/// suffix keeps names distinct when sanitizing collapses two keys.
#[must_use]
pub fn object_name(key: &str) -> String {
    let readable: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    format!("object_{readable}_{}", &digest[..8])
}

/// Assembles the static website descriptor from site inputs and content.
#[derive(Debug)]
pub struct SiteDescriptorBuilder<'a> {
    inputs: &'a SiteInputs,
    files: &'a [ContentFile],
    bucket_prefix: String,
    source_dir: Option<&'a Path>,
}

impl<'a> SiteDescriptorBuilder<'a> {
    /// Creates a builder. The bucket prefix defaults to the subdomain.
    #[must_use]
    pub fn new(inputs: &'a SiteInputs, files: &'a [ContentFile]) -> Self {
        Self {
            inputs,
            files,
            bucket_prefix: bucket_prefix(&inputs.subdomain),
            source_dir: None,
        }
    }

    /// Renders object sources relative to `dir`, the directory the engine
    /// runs in, instead of as given.
    #[must_use]
    pub const fn with_source_dir(mut self, dir: &'a Path) -> Self {
        self.source_dir = Some(dir);
        self
    }

    /// Overrides the prefix of the generated bucket name.
    #[must_use]
    pub fn with_bucket_prefix(mut self, prefix: &str) -> Self {
        self.bucket_prefix = bucket_prefix(prefix);
        self
    }

    /// Declares every resource, provider and output, then validates the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the assembled descriptor violates a structural
    /// invariant.
    pub fn build(&self) -> Result<Descriptor> {
        let domain_name = self.inputs.domain_name();
        info!("Building descriptor for {domain_name}");

        let mut descriptor = Descriptor::new();
        descriptor.add_provider(self.inputs.region.clone(), None);
        descriptor.add_provider(CERTIFICATE_REGION, Some(CERTIFICATE_PROVIDER_ALIAS));

        self.declare_storage(&mut descriptor)?;
        self.declare_objects(&mut descriptor)?;
        self.declare_certificate(&mut descriptor, &domain_name)?;
        self.declare_distribution(&mut descriptor, &domain_name)?;
        Self::declare_outputs(&mut descriptor, &domain_name);

        descriptor.validate()?;

        info!(
            "Descriptor declares {} resources ({} objects)",
            descriptor.len(),
            self.files.len()
        );
        Ok(descriptor)
    }

    fn declare_storage(&self, descriptor: &mut Descriptor) -> Result<()> {
        let bucket = names::bucket();
        let oai = names::oai();

        descriptor.add(Resource::new(
            bucket.clone(),
            Props::new().set("bucket_prefix", self.bucket_prefix.as_str()),
        ))?;

        descriptor.add(Resource::new(
            names::bucket_website(),
            Props::new()
                .set("bucket", bucket.attr("id"))
                .set(
                    "index_document",
                    Props::new().set("suffix", self.inputs.index_document.as_str()),
                )
                .set(
                    "error_document",
                    Props::new().set("key", self.inputs.error_document.as_str()),
                ),
        ))?;

        descriptor.add(Resource::new(
            names::ownership_controls(),
            Props::new().set("bucket", bucket.attr("id")).set(
                "rule",
                Props::new().set("object_ownership", "BucketOwnerEnforced"),
            ),
        ))?;

        descriptor.add(Resource::new(
            names::public_access_block(),
            Props::new()
                .set("bucket", bucket.attr("id"))
                .set("block_public_acls", true)
                .set("block_public_policy", true)
                .set("ignore_public_acls", true)
                .set("restrict_public_buckets", true),
        ))?;

        descriptor.add(Resource::new(
            oai.clone(),
            Props::new().set("comment", format!("{} origin access", self.inputs.domain_name())),
        ))?;

        descriptor.add(Resource::new(
            names::bucket_policy(),
            Props::new().set("bucket", bucket.attr("id")).set(
                "policy",
                bucket_read_policy(bucket.attr("arn"), oai.attr("iam_arn"))?,
            ),
        ))?;

        Ok(())
    }

    fn declare_objects(&self, descriptor: &mut Descriptor) -> Result<()> {
        let bucket = names::bucket();

        for file in self.files {
            let mut props = Props::new()
                .set("bucket", bucket.attr("id"))
                .set("key", file.key.as_str())
                .set("source", file.source_from(self.source_dir)?)
                .set("content_type", file.content_type.as_str());

            match &file.digest {
                Some(digest) => props = props.set("source_hash", digest.as_str()),
                None => warn!("{} could not be read; its upload is left to the engine", file.key),
            }

            descriptor.add(
                Resource::new(
                    Address::managed("aws_s3_object", &object_name(&file.key)),
                    props,
                )
                .depends_on(&names::ownership_controls())
                .depends_on(&names::public_access_block()),
            )?;
        }

        Ok(())
    }

    fn declare_certificate(&self, descriptor: &mut Descriptor, domain_name: &str) -> Result<()> {
        let zone = names::zone();
        let certificate = names::certificate();
        let record = names::certificate_validation();
        let provider = format!("aws.{CERTIFICATE_PROVIDER_ALIAS}");

        descriptor.add(Resource::new(
            zone.clone(),
            Props::new()
                .set("name", self.inputs.domain.as_str())
                .set("private_zone", false),
        ))?;

        descriptor.add(
            Resource::new(
                certificate.clone(),
                Props::new()
                    .set("domain_name", domain_name)
                    .set("validation_method", "DNS"),
            )
            .with_provider(provider.clone()),
        )?;

        let options = "domain_validation_options";
        let single_option = Output::derived(
            &certificate,
            format!("length({certificate}.{options}) == 1"),
        );

        descriptor.add(
            Resource::new(
                record.clone(),
                Props::new()
                    .set("zone_id", zone.attr("zone_id"))
                    .set("name", Output::first_of(&certificate, options, "resource_record_name"))
                    .set("type", Output::first_of(&certificate, options, "resource_record_type"))
                    .set(
                        "records",
                        vec![Output::first_of(&certificate, options, "resource_record_value")],
                    )
                    .set("ttl", VALIDATION_RECORD_TTL),
            )
            .with_precondition(
                single_option.into(),
                "certificate must have exactly one domain validation option",
            ),
        )?;

        descriptor.add(
            Resource::new(
                names::certificate_issued(),
                Props::new()
                    .set("certificate_arn", certificate.attr("arn"))
                    .set("validation_record_fqdns", vec![record.attr("fqdn")]),
            )
            .with_provider(provider),
        )?;

        Ok(())
    }

    fn declare_distribution(&self, descriptor: &mut Descriptor, domain_name: &str) -> Result<()> {
        let bucket = names::bucket();
        let cdn = names::cdn();
        let methods = || vec!["GET", "HEAD"];

        let origin = Props::new()
            .set("domain_name", bucket.attr("bucket_regional_domain_name"))
            .set("origin_id", bucket.attr("arn"))
            .set(
                "s3_origin_config",
                Props::new().set(
                    "origin_access_identity",
                    names::oai().attr("cloudfront_access_identity_path"),
                ),
            );

        let cache_behavior = Props::new()
            .set("target_origin_id", bucket.attr("arn"))
            .set("viewer_protocol_policy", "redirect-to-https")
            .set("allowed_methods", methods())
            .set("cached_methods", methods())
            .set("min_ttl", CACHE_TTL)
            .set("default_ttl", CACHE_TTL)
            .set("max_ttl", CACHE_TTL)
            .set(
                "forwarded_values",
                Props::new()
                    .set("query_string", true)
                    .set("cookies", Props::new().set("forward", "all")),
            );

        let error_response = Props::new()
            .set("error_code", 403u32)
            .set("response_code", 404u32)
            .set("response_page_path", format!("/{}", self.inputs.error_document));

        descriptor.add(Resource::new(
            cdn.clone(),
            Props::new()
                .set("enabled", true)
                .set("default_root_object", self.inputs.index_document.as_str())
                .set("origin", vec![origin])
                .set("default_cache_behavior", cache_behavior)
                .set("price_class", PRICE_CLASS)
                .set("custom_error_response", vec![error_response])
                .set(
                    "restrictions",
                    Props::new().set(
                        "geo_restriction",
                        Props::new().set("restriction_type", "none"),
                    ),
                )
                .set("aliases", vec![domain_name])
                .set(
                    "viewer_certificate",
                    Props::new()
                        .set("acm_certificate_arn", names::certificate().attr("arn"))
                        .set("ssl_support_method", "sni-only")
                        .set("cloudfront_default_certificate", false),
                ),
        ))?;

        descriptor.add(
            Resource::new(
                names::alias(),
                Props::new()
                    .set("zone_id", names::zone().attr("zone_id"))
                    .set("name", self.inputs.subdomain.as_str())
                    .set("type", "A")
                    .set(
                        "alias",
                        Props::new()
                            .set("name", cdn.attr("domain_name"))
                            .set("zone_id", cdn.attr("hosted_zone_id"))
                            .set("evaluate_target_health", true),
                    ),
            )
            .depends_on(&names::certificate())
            .depends_on(&names::certificate_issued()),
        )?;

        Ok(())
    }

    fn declare_outputs(descriptor: &mut Descriptor, domain_name: &str) {
        descriptor.add_output(
            "bucket_url",
            Template::new()
                .text("http://")
                .output(names::bucket().attr("bucket_regional_domain_name")),
        );
        descriptor.add_output(
            "cdnURL",
            Template::new()
                .text("https://")
                .output(names::cdn().attr("domain_name")),
        );
        descriptor.add_output(
            "domainURL",
            Template::new().text(format!("https://{domain_name}")),
        );
    }
}

/// Normalizes a bucket name prefix: lowercase, `[a-z0-9-]`, ending in `-`.
fn bucket_prefix(raw: &str) -> String {
    let mut prefix: String = raw
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string();

    if prefix.is_empty() {
        prefix = String::from("site");
    }
    prefix.truncate(MAX_BUCKET_PREFIX_LEN - 1);
    prefix.push('-');
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentScanner;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn inputs(root: &Path) -> SiteInputs {
        SiteInputs {
            content_root: root.to_path_buf(),
            index_document: String::from("index.html"),
            error_document: String::from("error.html"),
            domain: String::from("example.com"),
            subdomain: String::from("shop"),
            region: String::from("eu-west-1"),
        }
    }

    fn file(key: &str, content_type: &str) -> ContentFile {
        ContentFile {
            key: key.to_string(),
            source: PathBuf::from("/srv/www").join(key),
            content_type: content_type.to_string(),
            digest: Some("ab".repeat(32)),
            size: Some(2),
        }
    }

    fn build(files: &[ContentFile]) -> Descriptor {
        let site = inputs(Path::new("/srv/www"));
        SiteDescriptorBuilder::new(&site, files).build().unwrap()
    }

    fn rendered(descriptor: &Descriptor, address: &Address) -> Value {
        descriptor.get(address).unwrap().render()
    }

    #[test]
    fn test_end_to_end_two_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<h1>shop</h1>").unwrap();
        std::fs::write(temp.path().join("error.html"), "<h1>oops</h1>").unwrap();

        let files = ContentScanner::new(temp.path()).scan().unwrap();
        let site = inputs(temp.path());
        let descriptor = SiteDescriptorBuilder::new(&site, &files).build().unwrap();

        assert_eq!(descriptor.resources_of_type("aws_s3_object").count(), 2);
        assert_eq!(
            descriptor.outputs()["domainURL"].as_literal().as_deref(),
            Some("https://shop.example.com")
        );

        let json = descriptor.render();
        assert_eq!(
            json["output"]["cdnURL"]["value"],
            json!("https://${aws_cloudfront_distribution.cdn.domain_name}")
        );
        assert_eq!(
            json["output"]["bucket_url"]["value"],
            json!("http://${aws_s3_bucket.bucket.bucket_regional_domain_name}")
        );
    }

    #[test]
    fn test_object_keys_match_files() {
        let files = vec![
            file("index.html", "text/html"),
            file("css/site.css", "text/css"),
            file("LICENSE", "application/octet-stream"),
        ];
        let descriptor = build(&files);

        let keys: BTreeSet<String> = descriptor
            .resources_of_type("aws_s3_object")
            .map(|r| r.render()["key"].as_str().unwrap().to_string())
            .collect();
        let expected: BTreeSet<String> = files.iter().map(|f| f.key.clone()).collect();
        assert_eq!(keys, expected);

        let css = rendered(&descriptor, &Address::managed("aws_s3_object", &object_name("css/site.css")));
        assert_eq!(css["content_type"], json!("text/css"));
        assert_eq!(css["source"], json!("/srv/www/css/site.css"));

        let relative = SiteDescriptorBuilder::new(&inputs(Path::new("/srv/www")), &files)
            .with_source_dir(Path::new("/srv/stack"))
            .build()
            .unwrap();
        let css = rendered(&relative, &Address::managed("aws_s3_object", &object_name("css/site.css")));
        assert_eq!(css["source"], json!("../www/css/site.css"));
        assert_eq!(css["source_hash"], json!("ab".repeat(32)));
        assert_eq!(
            css["depends_on"],
            json!([
                "aws_s3_bucket_ownership_controls.ownership_controls",
                "aws_s3_bucket_public_access_block.public_access_block"
            ])
        );
    }

    #[test]
    fn test_unreadable_file_still_declared() {
        let mut unreadable = file("private.html", "text/html");
        unreadable.digest = None;
        unreadable.size = None;
        let files = vec![file("index.html", "text/html"), unreadable];

        let descriptor = build(&files);
        assert_eq!(descriptor.resources_of_type("aws_s3_object").count(), 2);

        let object = rendered(&descriptor, &Address::managed("aws_s3_object", &object_name("private.html")));
        assert_eq!(object["source"], json!("/srv/www/private.html"));
        assert!(object.get("source_hash").is_none());

        let index = rendered(&descriptor, &Address::managed("aws_s3_object", &object_name("index.html")));
        assert_eq!(index["source_hash"], json!("ab".repeat(32)));
    }

    #[test]
    fn test_object_names_are_distinct() {
        assert_ne!(object_name("a/b.html"), object_name("a_b.html"));
        assert!(object_name("css/site.css").starts_with("object_css_site_css_"));
    }

    #[test]
    fn test_bucket_is_private() {
        let descriptor = build(&[]);

        let block = rendered(&descriptor, &names::public_access_block());
        for flag in [
            "block_public_acls",
            "block_public_policy",
            "ignore_public_acls",
            "restrict_public_buckets",
        ] {
            assert_eq!(block[flag], json!(true), "{flag}");
        }

        let controls = rendered(&descriptor, &names::ownership_controls());
        assert_eq!(controls["rule"]["object_ownership"], json!("BucketOwnerEnforced"));

        let bucket = rendered(&descriptor, &names::bucket());
        assert_eq!(bucket["bucket_prefix"], json!("shop-"));
    }

    #[test]
    fn test_bucket_policy_document() {
        let descriptor = build(&[]);
        let policy = rendered(&descriptor, &names::bucket_policy());

        let document: Value = serde_json::from_str(policy["policy"].as_str().unwrap()).unwrap();
        let statement = &document["Statement"][0];
        assert_eq!(statement["Action"], json!(["s3:GetObject"]));
        assert_eq!(
            statement["Principal"]["AWS"],
            json!(["${aws_cloudfront_origin_access_identity.oai.iam_arn}"])
        );
        assert_eq!(statement["Resource"], json!(["${aws_s3_bucket.bucket.arn}/*"]));

        let deps = descriptor.get(&names::bucket_policy()).unwrap().dependencies();
        assert!(deps.contains(&names::bucket()));
        assert!(deps.contains(&names::oai()));
    }

    #[test]
    fn test_distribution_settings() {
        let descriptor = build(&[]);
        let cdn = rendered(&descriptor, &names::cdn());

        assert_eq!(cdn["enabled"], json!(true));
        assert_eq!(cdn["default_root_object"], json!("index.html"));
        assert_eq!(cdn["price_class"], json!("PriceClass_100"));
        assert_eq!(cdn["aliases"], json!(["shop.example.com"]));
        assert_eq!(
            cdn["custom_error_response"],
            json!([{"error_code": 403, "response_code": 404, "response_page_path": "/error.html"}])
        );
        assert_eq!(
            cdn["restrictions"]["geo_restriction"]["restriction_type"],
            json!("none")
        );

        let behavior = &cdn["default_cache_behavior"];
        assert_eq!(behavior["viewer_protocol_policy"], json!("redirect-to-https"));
        assert_eq!(behavior["allowed_methods"], json!(["GET", "HEAD"]));
        assert_eq!(behavior["cached_methods"], json!(["GET", "HEAD"]));
        assert_eq!(behavior["default_ttl"], json!(600));
        assert_eq!(behavior["forwarded_values"]["cookies"]["forward"], json!("all"));
        assert_eq!(behavior["target_origin_id"], json!("${aws_s3_bucket.bucket.arn}"));

        let origin = &cdn["origin"][0];
        assert_eq!(
            origin["domain_name"],
            json!("${aws_s3_bucket.bucket.bucket_regional_domain_name}")
        );
        assert_eq!(
            origin["s3_origin_config"]["origin_access_identity"],
            json!("${aws_cloudfront_origin_access_identity.oai.cloudfront_access_identity_path}")
        );

        let viewer = &cdn["viewer_certificate"];
        assert_eq!(viewer["ssl_support_method"], json!("sni-only"));
        assert_eq!(
            viewer["acm_certificate_arn"],
            json!("${aws_acm_certificate.certificate.arn}")
        );
    }

    #[test]
    fn test_certificate_pinned_and_validated() {
        let descriptor = build(&[]);

        let certificate = rendered(&descriptor, &names::certificate());
        assert_eq!(certificate["provider"], json!("aws.us_east_1"));
        assert_eq!(certificate["domain_name"], json!("shop.example.com"));
        assert_eq!(certificate["validation_method"], json!("DNS"));

        let record = rendered(&descriptor, &names::certificate_validation());
        assert_eq!(record["ttl"], json!(60));
        assert_eq!(
            record["records"],
            json!(["${tolist(aws_acm_certificate.certificate.domain_validation_options)[0].resource_record_value}"])
        );
        assert_eq!(record["zone_id"], json!("${data.aws_route53_zone.zone.zone_id}"));
        assert!(record["lifecycle"]["precondition"][0]["condition"]
            .as_str()
            .unwrap()
            .contains("length(aws_acm_certificate.certificate.domain_validation_options) == 1"));

        let issued = rendered(&descriptor, &names::certificate_issued());
        assert_eq!(
            issued["validation_record_fqdns"],
            json!(["${aws_route53_record.certificate_validation.fqdn}"])
        );

        let providers = descriptor.providers();
        assert_eq!(providers[0].region, "eu-west-1");
        assert_eq!(providers[1].region, "us-east-1");
        assert_eq!(providers[1].alias.as_deref(), Some("us_east_1"));
    }

    #[test]
    fn test_alias_record() {
        let descriptor = build(&[]);
        let alias = rendered(&descriptor, &names::alias());

        assert_eq!(alias["name"], json!("shop"));
        assert_eq!(alias["type"], json!("A"));
        assert_eq!(alias["zone_id"], json!("${data.aws_route53_zone.zone.zone_id}"));
        assert_eq!(
            alias["alias"]["name"],
            json!("${aws_cloudfront_distribution.cdn.domain_name}")
        );
        assert_eq!(alias["alias"]["evaluate_target_health"], json!(true));

        let order = descriptor.graph().unwrap().resolve_order().unwrap();
        let pos = |a: &Address| order.iter().position(|o| o == a).unwrap();
        assert!(pos(&names::certificate_issued()) < pos(&names::alias()));
        assert!(pos(&names::certificate_validation()) < pos(&names::certificate_issued()));
        assert!(pos(&names::cdn()) < pos(&names::alias()));
    }

    #[test]
    fn test_bucket_prefix_normalized() {
        assert_eq!(bucket_prefix("My Site"), "my-site-");
        assert_eq!(bucket_prefix("--"), "site-");
        assert_eq!(bucket_prefix(&"x".repeat(80)).len(), MAX_BUCKET_PREFIX_LEN);

        let site = inputs(Path::new("/srv/www"));
        let descriptor = SiteDescriptorBuilder::new(&site, &[])
            .with_bucket_prefix("shop-prod")
            .build()
            .unwrap();
        assert_eq!(
            rendered(&descriptor, &names::bucket())["bucket_prefix"],
            json!("shop-prod-")
        );
    }
}
