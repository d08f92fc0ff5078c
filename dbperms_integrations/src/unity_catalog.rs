//! Unity Catalog storage credentials and service credentials.
//!
//! Both resources are addressed by name and carry a single cloud identity
//! block (an AWS IAM role, an Azure managed identity or service principal, or a
//! Databricks-managed GCP service account). Responses are passed through as
//! returned by the platform, apart from list envelopes and delete results.

use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::transport::{ApiRequest, Transport, decode};

const STORAGE_CREDENTIALS_ENDPOINT: &str = "/api/2.1/unity-catalog/storage-credentials";
const CREDENTIALS_ENDPOINT: &str = "/api/2.1/unity-catalog/credentials";

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct CloudIdentity {
    /// {"role_arn": "..."}
    #[serde(default, alias = "aws_credentials", skip_serializing_if = "Option::is_none")]
    pub aws_iam_role: Option<Value>,
    /// {"access_connector_id": "..."}
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_managed_identity: Option<Value>,
    /// {"directory_id", "application_id", "client_secret"}
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_service_principal: Option<Value>,
    #[serde(default, alias = "gcp_credentials", skip_serializing_if = "Option::is_none")]
    pub databricks_gcp_service_account: Option<Value>,
}

impl CloudIdentity {
    /// The single identity block that was supplied, if any.
    fn block(&self) -> Result<Option<(&'static str, &Value)>> {
        let supplied: Vec<(&'static str, &Value)> = [
            ("aws_iam_role", &self.aws_iam_role),
            ("azure_managed_identity", &self.azure_managed_identity),
            ("azure_service_principal", &self.azure_service_principal),
            (
                "databricks_gcp_service_account",
                &self.databricks_gcp_service_account,
            ),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_ref().map(|v| (field, v)))
        .collect();

        match supplied.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => {
                let fields: Vec<_> = many.iter().map(|(field, _)| *field).collect();
                Err(Error::invalid_params(format!(
                    "supply at most one cloud identity, got {}",
                    fields.join(", ")
                )))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CreateStorageCredentialArgs {
    pub name: String,
    #[serde(flatten)]
    pub identity: CloudIdentity,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub read_only: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct UpdateStorageCredentialArgs {
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(flatten)]
    pub identity: CloudIdentity,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub read_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListStorageCredentialsArgs {
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CredentialNameArgs {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialPurpose {
    #[default]
    Service,
    Storage,
}

impl CredentialPurpose {
    pub const fn as_str(self) -> &'static str {
        match self {
            CredentialPurpose::Service => "SERVICE",
            CredentialPurpose::Storage => "STORAGE",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CreateCredentialArgs {
    pub name: String,
    #[serde(default)]
    pub purpose: CredentialPurpose,
    #[serde(flatten)]
    pub identity: CloudIdentity,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct UpdateCredentialArgs {
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(flatten)]
    pub identity: CloudIdentity,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageCredentialList {
    #[serde(default)]
    storage_credentials: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialList {
    #[serde(default)]
    credentials: Vec<Value>,
    next_page_token: Option<String>,
}

fn named_path(endpoint: &str, name: &str) -> String {
    format!("{}/{}", endpoint, urlencoding::encode(name))
}

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_params("name must not be empty"));
    }
    Ok(())
}

struct Body(Map<String, Value>);

impl Body {
    fn new() -> Self {
        Self(Map::new())
    }

    fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    fn set_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    fn identity(&mut self, identity: &CloudIdentity) -> Result<()> {
        if let Some((field, block)) = identity.block()? {
            self.set(field, block.clone());
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[derive(Clone)]
pub struct UnityCatalogApi {
    transport: Arc<dyn Transport>,
}

impl UnityCatalogApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    // ------------------------------------------------------------------------
    // Storage credentials
    // ------------------------------------------------------------------------

    pub async fn create_storage_credential(
        &self,
        args: &CreateStorageCredentialArgs,
    ) -> Result<Value> {
        require_name(&args.name)?;
        let mut body = Body::new();
        body.set("name", args.name.as_str());
        body.identity(&args.identity)?;
        body.set_opt("comment", args.comment.as_deref());
        body.set_opt("read_only", args.read_only);

        info!("Creating storage credential {}", args.name);
        let response = self
            .transport
            .send(ApiRequest::post(STORAGE_CREDENTIALS_ENDPOINT).json(body.into_value()))
            .await?;
        Ok(response)
    }

    pub async fn get_storage_credential(&self, name: &str) -> Result<Value> {
        require_name(name)?;
        info!("Getting storage credential {}", name);
        let response = self
            .transport
            .send(ApiRequest::get(named_path(STORAGE_CREDENTIALS_ENDPOINT, name)))
            .await?;
        Ok(response)
    }

    pub async fn update_storage_credential(
        &self,
        args: &UpdateStorageCredentialArgs,
    ) -> Result<Value> {
        require_name(&args.name)?;
        let mut body = Body::new();
        body.set_opt("new_name", args.new_name.as_deref());
        body.identity(&args.identity)?;
        body.set_opt("comment", args.comment.as_deref());
        body.set_opt("read_only", args.read_only);
        if body.is_empty() {
            return Err(Error::invalid_params(
                "nothing to update; set new_name, comment, read_only or a cloud identity",
            ));
        }

        info!("Updating storage credential {}", args.name);
        let response = self
            .transport
            .send(
                ApiRequest::patch(named_path(STORAGE_CREDENTIALS_ENDPOINT, &args.name))
                    .json(body.into_value()),
            )
            .await?;
        Ok(response)
    }

    pub async fn delete_storage_credential(&self, name: &str) -> Result<Value> {
        require_name(name)?;
        info!("Deleting storage credential {}", name);
        self.transport
            .send(ApiRequest::delete(named_path(STORAGE_CREDENTIALS_ENDPOINT, name)))
            .await?;
        Ok(json!({"deleted": true, "name": name}))
    }

    pub async fn list_storage_credentials(
        &self,
        args: &ListStorageCredentialsArgs,
    ) -> Result<Value> {
        info!("Listing storage credentials");
        let request =
            ApiRequest::get(STORAGE_CREDENTIALS_ENDPOINT).query_opt("max_results", args.max_results);
        let response = self.transport.send(request).await?;
        let parsed: StorageCredentialList = decode(response, "storage credential list")?;
        let mut result = json!({"storage_credentials": parsed.storage_credentials});
        if let Some(token) = parsed.next_page_token {
            result["next_page_token"] = json!(token);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Service credentials
    // ------------------------------------------------------------------------

    pub async fn create_credential(&self, args: &CreateCredentialArgs) -> Result<Value> {
        require_name(&args.name)?;
        let mut body = Body::new();
        body.set("name", args.name.as_str());
        body.set("purpose", args.purpose.as_str());
        body.identity(&args.identity)?;
        body.set_opt("comment", args.comment.as_deref());

        info!("Creating credential {}", args.name);
        let response = self
            .transport
            .send(ApiRequest::post(CREDENTIALS_ENDPOINT).json(body.into_value()))
            .await?;
        Ok(response)
    }

    pub async fn list_credentials(&self) -> Result<Value> {
        info!("Listing credentials");
        let response = self.transport.send(ApiRequest::get(CREDENTIALS_ENDPOINT)).await?;
        let parsed: CredentialList = decode(response, "credential list")?;
        let mut result = json!({"credentials": parsed.credentials});
        if let Some(token) = parsed.next_page_token {
            result["next_page_token"] = json!(token);
        }
        Ok(result)
    }

    pub async fn update_credential(&self, args: &UpdateCredentialArgs) -> Result<Value> {
        require_name(&args.name)?;
        let mut body = Body::new();
        body.set_opt("new_name", args.new_name.as_deref());
        body.identity(&args.identity)?;
        body.set_opt("comment", args.comment.as_deref());
        if body.is_empty() {
            return Err(Error::invalid_params(
                "nothing to update; set new_name, comment or a cloud identity",
            ));
        }

        info!("Updating credential {}", args.name);
        let response = self
            .transport
            .send(
                ApiRequest::patch(named_path(CREDENTIALS_ENDPOINT, &args.name))
                    .json(body.into_value()),
            )
            .await?;
        Ok(response)
    }

    pub async fn delete_credential(&self, name: &str) -> Result<Value> {
        require_name(name)?;
        info!("Deleting credential {}", name);
        self.transport
            .send(ApiRequest::delete(named_path(CREDENTIALS_ENDPOINT, name)))
            .await?;
        Ok(json!({"deleted": true, "name": name}))
    }
}
