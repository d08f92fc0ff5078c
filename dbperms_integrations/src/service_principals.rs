use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::params::flexible_id;
use crate::transport::{ApiRequest, Transport, decode};

const SERVICE_PRINCIPALS_ENDPOINT: &str = "/api/2.0/account/scim/v2/ServicePrincipals";
const SCIM_SERVICE_PRINCIPAL_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:ServicePrincipal";
const SCIM_PATCH_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";
const ALLOW_CLUSTER_CREATE: &str = "allow-cluster-create";

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListServicePrincipalsArgs {
    /// SCIM filter expression, e.g. displayName co "etl"
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
    /// 1-based index of the first result
    #[serde(default)]
    pub start_index: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ServicePrincipalIdArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CreateServicePrincipalArgs {
    pub display_name: String,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub allow_cluster_create: Option<bool>,
    /// SCIM entitlement values, e.g. workspace-access, databricks-sql-access
    #[serde(default)]
    pub entitlements: Option<Vec<String>>,
    /// SCIM role values, e.g. instance profile ARNs
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct UpdateServicePrincipalArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub allow_cluster_create: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServicePrincipal {
    pub id: String,
    pub application_id: Option<String>,
    pub display_name: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePrincipalList {
    pub service_principals: Vec<ServicePrincipal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimServicePrincipal {
    id: String,
    application_id: Option<String>,
    display_name: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScimListResponse {
    #[serde(default, rename = "Resources")]
    resources: Vec<ScimServicePrincipal>,
    total_results: Option<u64>,
}

impl From<ScimServicePrincipal> for ServicePrincipal {
    fn from(scim: ScimServicePrincipal) -> Self {
        Self {
            id: scim.id,
            application_id: scim.application_id,
            display_name: scim.display_name,
            active: scim.active,
        }
    }
}

fn scim_values(values: &[&str]) -> Value {
    values.iter().map(|value| json!({ "value": value })).collect()
}

fn principal_path(id: &str) -> String {
    format!("{}/{}", SERVICE_PRINCIPALS_ENDPOINT, urlencoding::encode(id))
}

/// SCIM PatchOp operations for the fields set in `args`.
fn patch_operations(args: &UpdateServicePrincipalArgs) -> Vec<Value> {
    let mut operations = Vec::new();
    if let Some(display_name) = &args.display_name {
        operations.push(json!({"op": "replace", "path": "displayName", "value": display_name}));
    }
    if let Some(active) = args.active {
        operations.push(json!({"op": "replace", "path": "active", "value": active}));
    }
    match args.allow_cluster_create {
        Some(true) => operations.push(json!({
            "op": "add",
            "path": "entitlements",
            "value": [{"value": ALLOW_CLUSTER_CREATE}]
        })),
        Some(false) => operations.push(json!({
            "op": "remove",
            "path": format!("entitlements[value eq \"{}\"]", ALLOW_CLUSTER_CREATE)
        })),
        None => {}
    }
    operations
}

/// Service principal identities over the SCIM endpoint. Nothing is cached.
#[derive(Clone)]
pub struct ServicePrincipalsApi {
    transport: Arc<dyn Transport>,
}

impl ServicePrincipalsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn list(&self, args: &ListServicePrincipalsArgs) -> Result<ServicePrincipalList> {
        info!("Listing service principals");
        let request = ApiRequest::get(SERVICE_PRINCIPALS_ENDPOINT)
            .query_opt("filter", args.filter.as_deref())
            .query_opt("count", args.count)
            .query_opt("startIndex", args.start_index);
        let response = self.transport.send(request).await?;
        let parsed: ScimListResponse = decode(response, "service principal list")?;
        Ok(ServicePrincipalList {
            service_principals: parsed.resources.into_iter().map(Into::into).collect(),
            total_results: parsed.total_results,
        })
    }

    pub async fn get(&self, id: &str) -> Result<ServicePrincipal> {
        info!("Getting service principal {}", id);
        let response = self.transport.send(ApiRequest::get(principal_path(id))).await?;
        let parsed: ScimServicePrincipal = decode(response, "service principal")?;
        Ok(parsed.into())
    }

    pub async fn create(&self, args: &CreateServicePrincipalArgs) -> Result<ServicePrincipal> {
        if args.display_name.trim().is_empty() {
            return Err(Error::invalid_params("display_name must not be empty"));
        }
        info!("Creating service principal {}", args.display_name);

        let mut body = json!({
            "schemas": [SCIM_SERVICE_PRINCIPAL_SCHEMA],
            "displayName": args.display_name,
        });
        if let Some(application_id) = &args.application_id {
            body["applicationId"] = json!(application_id);
        }
        if let Some(active) = args.active {
            body["active"] = json!(active);
        }
        let mut entitlements: Vec<&str> = args
            .entitlements
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if args.allow_cluster_create == Some(true)
            && !entitlements.contains(&ALLOW_CLUSTER_CREATE)
        {
            entitlements.push(ALLOW_CLUSTER_CREATE);
        }
        if !entitlements.is_empty() {
            body["entitlements"] = scim_values(&entitlements);
        }
        let roles: Vec<&str> = args.roles.iter().flatten().map(String::as_str).collect();
        if !roles.is_empty() {
            body["roles"] = scim_values(&roles);
        }

        let response = self
            .transport
            .send(ApiRequest::post(SERVICE_PRINCIPALS_ENDPOINT).json(body))
            .await?;
        let parsed: ScimServicePrincipal = decode(response, "service principal")?;
        Ok(parsed.into())
    }

    pub async fn update(&self, args: &UpdateServicePrincipalArgs) -> Result<Value> {
        let operations = patch_operations(args);
        if operations.is_empty() {
            return Err(Error::invalid_params(
                "nothing to update; set at least one of display_name, active, allow_cluster_create",
            ));
        }
        info!(
            "Updating service principal {} ({} operations)",
            args.id,
            operations.len()
        );
        let body = json!({
            "schemas": [SCIM_PATCH_SCHEMA],
            "Operations": operations,
        });
        let response = self
            .transport
            .send(ApiRequest::patch(principal_path(&args.id)).json(body))
            .await?;

        // PATCH answers 204 on most workspaces; echo the new state when a body comes back.
        match decode::<ScimServicePrincipal>(response, "service principal") {
            Ok(parsed) => Ok(json!(ServicePrincipal::from(parsed))),
            Err(_) => Ok(json!({"updated": true, "id": args.id})),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<Value> {
        info!("Deleting service principal {}", id);
        self.transport
            .send(ApiRequest::delete(principal_path(id)))
            .await?;
        Ok(json!({"deleted": true, "id": id}))
    }
}
