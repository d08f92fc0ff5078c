use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::acl::NormalizedAcl;
use crate::error::{Error, Result, ValidationError, ValidationReason};
use crate::permissions::{PrivilegeAssignments, grants_from_assignments};
use crate::transport::{ApiRequest, Transport, decode};

const SHARES_ENDPOINT: &str = "/api/2.1/unity-catalog/shares";
const SHARE_PRIVILEGES: &[&str] = &["SELECT", "USAGE"];

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GetSharePermissionsArgs {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ShareChange {
    pub principal: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct UpdateSharePermissionsArgs {
    pub name: String,
    /// Privileges are SELECT or USAGE
    pub changes: Vec<ShareChange>,
}

fn permissions_path(name: &str) -> String {
    format!("{}/{}/permissions", SHARES_ENDPOINT, urlencoding::encode(name))
}

fn validate_changes(changes: &[ShareChange]) -> Result<()> {
    if changes.is_empty() {
        return Err(Error::invalid_params("changes must not be empty"));
    }
    for change in changes {
        if change.principal.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationReason::AmbiguousPrincipal,
                "share change names no principal",
            )
            .into());
        }
        if change.add.is_empty() && change.remove.is_empty() {
            return Err(Error::invalid_params(format!(
                "change for '{}' neither adds nor removes a privilege",
                change.principal
            )));
        }
        if let Some(unknown) = change
            .add
            .iter()
            .chain(&change.remove)
            .find(|p| !SHARE_PRIVILEGES.contains(&p.as_str()))
        {
            return Err(ValidationError::new(
                ValidationReason::UnknownPermissionLevel,
                format!(
                    "unknown share privilege '{}'; expected one of {}",
                    unknown,
                    SHARE_PRIVILEGES.join(", ")
                ),
            )
            .into());
        }
    }
    Ok(())
}

/// Recipient-facing permissions of Delta Sharing shares.
#[derive(Clone)]
pub struct SharesApi {
    transport: Arc<dyn Transport>,
}

impl SharesApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn get_permissions(&self, name: &str) -> Result<NormalizedAcl> {
        info!("Getting permissions for share {}", name);
        let response = self
            .transport
            .send(ApiRequest::get(permissions_path(name)))
            .await?;
        let parsed: PrivilegeAssignments = decode(response, "share permissions")?;
        Ok(grants_from_assignments(parsed))
    }

    pub async fn update_permissions(
        &self,
        name: &str,
        changes: &[ShareChange],
    ) -> Result<NormalizedAcl> {
        validate_changes(changes)?;
        info!(
            "Updating permissions for share {} ({} changes)",
            name,
            changes.len()
        );
        let response = self
            .transport
            .send(ApiRequest::patch(permissions_path(name)).json(json!({ "changes": changes })))
            .await?;
        let parsed: PrivilegeAssignments = decode(response, "share permissions")?;
        Ok(grants_from_assignments(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Grant;
    use crate::error::ErrorKind;
    use crate::test_support::StubTransport;

    fn change(principal: &str, add: &[&str], remove: &[&str]) -> ShareChange {
        ShareChange {
            principal: principal.to_string(),
            add: add.iter().map(|s| s.to_string()).collect(),
            remove: remove.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_update_sends_changes_and_normalizes() {
        let stub = StubTransport::new();
        stub.respond(
            "PATCH",
            "/api/2.1/unity-catalog/shares/quarterly/permissions",
            json!({"privilege_assignments": [{"principal": "partner-acme", "privileges": ["SELECT"]}]}),
        );
        let api = SharesApi::new(stub.clone());

        let acl = api
            .update_permissions("quarterly", &[change("partner-acme", &["SELECT"], &[])])
            .await
            .unwrap();
        assert_eq!(acl.access_control_list, vec![Grant::direct("partner-acme", "SELECT")]);
        assert_eq!(
            stub.calls()[0].body,
            Some(json!({"changes": [{"principal": "partner-acme", "add": ["SELECT"]}]}))
        );
    }

    #[tokio::test]
    async fn test_unknown_privilege_makes_no_call() {
        let stub = StubTransport::new();
        let api = SharesApi::new(stub.clone());

        let err = api
            .update_permissions("quarterly", &[change("partner-acme", &[], &["MODIFY"])])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.message().contains("MODIFY"));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_changes_are_invalid() {
        let stub = StubTransport::new();
        let api = SharesApi::new(stub.clone());

        let err = api.update_permissions("quarterly", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let err = api
            .update_permissions("quarterly", &[change("partner-acme", &[], &[])])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }

    #[tokio::test]
    async fn test_get_empty_share() {
        let stub = StubTransport::new();
        stub.respond("GET", "/api/2.1/unity-catalog/shares/quarterly/permissions", json!({}));
        let api = SharesApi::new(stub.clone());

        let acl = api.get_permissions("quarterly").await.unwrap();
        assert!(acl.access_control_list.is_empty());
    }
}
