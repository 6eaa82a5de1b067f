//! Bucket access policy document.

use serde::Serialize;

use crate::error::{EdgesiteError, Result};

use super::value::{Output, Template};

const POLICY_VERSION: &str = "2012-10-17";
const BUCKET_ARN_TOKEN: &str = "@@bucket_arn@@";
const PRINCIPAL_TOKEN: &str = "@@principal_arn@@";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument {
    version: &'static str,
    statement: Vec<Statement>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Statement {
    effect: &'static str,
    principal: Principal,
    action: Vec<&'static str>,
    resource: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Principal {
    #[serde(rename = "AWS")]
    aws: Vec<String>,
}

/// Policy granting object reads to the origin access identity only.
///
/// Both ARNs are deferred; the document is serialized with placeholder tokens
/// which are then swapped for interpolations, so the engine evaluates the
/// policy once both values are known.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn bucket_read_policy(bucket_arn: Output, principal_arn: Output) -> Result<Template> {
    let document = PolicyDocument {
        version: POLICY_VERSION,
        statement: vec![Statement {
            effect: "Allow",
            principal: Principal {
                aws: vec![PRINCIPAL_TOKEN.to_string()],
            },
            action: vec!["s3:GetObject"],
            resource: vec![format!("{BUCKET_ARN_TOKEN}/*")],
        }],
    };

    let text = serde_json::to_string(&document)
        .map_err(|e| EdgesiteError::internal(format!("Failed to serialize bucket policy: {e}")))?;

    Ok(Template::from_placeholders(
        &text,
        &[(BUCKET_ARN_TOKEN, bucket_arn), (PRINCIPAL_TOKEN, principal_arn)],
    ))
}
