use dbperms_integrations::git_credentials::{
    CreateGitCredentialArgs, DeleteGitCredentialArgs, UpdateGitCredentialArgs,
};
use dbperms_integrations::permissions::{
    CatalogPermissionsArgs, ClusterPermissionsArgs, JobPermissionsArgs, ObjectPermissionsArgs,
    PermissionLevelsArgs, SchemaPermissionsArgs, SetClusterPermissionsArgs,
    SetJobPermissionsArgs, SetObjectPermissionsArgs, SetWarehousePermissionsArgs,
    SetWorkspaceObjectPermissionsArgs, TablePermissionsArgs, WarehousePermissionsArgs,
    WorkspaceObjectPermissionsArgs,
};
use dbperms_integrations::service_principals::{
    CreateServicePrincipalArgs, ListServicePrincipalsArgs, ServicePrincipalIdArgs,
    UpdateServicePrincipalArgs,
};
use dbperms_integrations::shares::{GetSharePermissionsArgs, UpdateSharePermissionsArgs};
use dbperms_integrations::unity_catalog::{
    CreateCredentialArgs, CreateStorageCredentialArgs, CredentialNameArgs,
    ListStorageCredentialsArgs, UpdateCredentialArgs, UpdateStorageCredentialArgs,
};
use dbperms_integrations::{
    Error, ErrorKind, GitCredentialsApi, ObjectType, PermissionsApi, ServicePrincipalsApi,
    SharesApi, Transport, TransportError, UnityCatalogApi, validate_all,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::envelope::{ToolInvocation, ToolResult};
use crate::registry::{self, Route, ToolSpec};

type Params = Map<String, Value>;

/// Routes validated tool invocations to the resource adapters.
///
/// Stateless apart from the shared transport; safe to call from many tasks at once.
#[derive(Clone)]
pub struct Dispatcher {
    permissions: PermissionsApi,
    service_principals: ServicePrincipalsApi,
    unity_catalog: UnityCatalogApi,
    shares: SharesApi,
    git_credentials: GitCredentialsApi,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            permissions: PermissionsApi::new(transport.clone()),
            service_principals: ServicePrincipalsApi::new(transport.clone()),
            unity_catalog: UnityCatalogApi::new(transport.clone()),
            shares: SharesApi::new(transport.clone()),
            git_credentials: GitCredentialsApi::new(transport),
        }
    }

    pub async fn dispatch(&self, invocation: ToolInvocation) -> ToolResult {
        let started = Instant::now();
        let tool_name = invocation.tool_name.clone();

        let result: ToolResult = match validate(&invocation) {
            Ok(spec) => self.execute(spec.route, invocation.params).await.into(),
            Err(result) => result,
        };

        tracing::info!(
            tool = %tool_name,
            outcome = result.outcome(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool invocation finished"
        );
        if let Some(error) = &result.error {
            tracing::debug!(tool = %tool_name, "tool error: {}", error.message);
        }
        result
    }

    async fn execute(&self, route: Route, params: Params) -> Result<Value, Error> {
        match route {
            Route::GetPermissions => {
                let args: ObjectPermissionsArgs = parse(params)?;
                to_json(self.permissions.get(args.object_type, &args.object_id).await?)
            }
            Route::SetPermissions => {
                let args: SetObjectPermissionsArgs = parse(params)?;
                to_json(
                    self.permissions
                        .set(args.object_type, &args.object_id, &args.access_control_list)
                        .await?,
                )
            }
            Route::UpdatePermissions => {
                let args: SetObjectPermissionsArgs = parse(params)?;
                to_json(
                    self.permissions
                        .update(args.object_type, &args.object_id, &args.access_control_list)
                        .await?,
                )
            }
            Route::GetPermissionLevels => {
                let args: PermissionLevelsArgs = parse(params)?;
                to_json(
                    self.permissions
                        .levels(args.object_type, args.object_id.as_deref())
                        .await?,
                )
            }
            Route::GetClusterPermissions => {
                let args: ClusterPermissionsArgs = parse(params)?;
                self.get_acl(ObjectType::Clusters, &args.cluster_id).await
            }
            Route::GetJobPermissions => {
                let args: JobPermissionsArgs = parse(params)?;
                self.get_acl(ObjectType::Jobs, &args.job_id).await
            }
            Route::GetWarehousePermissions => {
                let args: WarehousePermissionsArgs = parse(params)?;
                self.get_acl(ObjectType::Warehouses, &args.warehouse_id).await
            }
            Route::GetWorkspaceObjectPermissions => {
                let args: WorkspaceObjectPermissionsArgs = parse(params)?;
                let (object_type, object_id) =
                    self.permissions.resolve_workspace_path(&args.path).await?;
                self.get_acl(object_type, &object_id).await
            }
            Route::GetCatalogPermissions => {
                let args: CatalogPermissionsArgs = parse(params)?;
                self.get_acl(ObjectType::Catalogs, &args.catalog_name).await
            }
            Route::GetSchemaPermissions => {
                let args: SchemaPermissionsArgs = parse(params)?;
                self.get_acl(ObjectType::Schemas, &args.schema_full_name).await
            }
            Route::GetTablePermissions => {
                let args: TablePermissionsArgs = parse(params)?;
                self.get_acl(ObjectType::Tables, &args.table_full_name).await
            }
            Route::SetClusterPermissions => {
                let args: SetClusterPermissionsArgs = parse(params)?;
                let acl = self
                    .permissions
                    .set(ObjectType::Clusters, &args.cluster_id, &args.access_control_list)
                    .await?;
                to_json(acl)
            }
            Route::SetJobPermissions => {
                let args: SetJobPermissionsArgs = parse(params)?;
                let acl = self
                    .permissions
                    .set(ObjectType::Jobs, &args.job_id, &args.access_control_list)
                    .await?;
                to_json(acl)
            }
            Route::SetWarehousePermissions => {
                let args: SetWarehousePermissionsArgs = parse(params)?;
                let acl = self
                    .permissions
                    .set(ObjectType::Warehouses, &args.warehouse_id, &args.access_control_list)
                    .await?;
                to_json(acl)
            }
            Route::SetWorkspaceObjectPermissions => {
                let args: SetWorkspaceObjectPermissionsArgs = parse(params)?;
                // notebooks and directories share one level table
                validate_all(&args.access_control_list, ObjectType::Notebooks)?;
                let (object_type, object_id) =
                    self.permissions.resolve_workspace_path(&args.path).await?;
                let acl = self
                    .permissions
                    .set(object_type, &object_id, &args.access_control_list)
                    .await?;
                to_json(acl)
            }
            Route::ListServicePrincipals => {
                let args: ListServicePrincipalsArgs = parse(params)?;
                to_json(self.service_principals.list(&args).await?)
            }
            Route::GetServicePrincipal => {
                let args: ServicePrincipalIdArgs = parse(params)?;
                to_json(self.service_principals.get(&args.id).await?)
            }
            Route::CreateServicePrincipal => {
                let args: CreateServicePrincipalArgs = parse(params)?;
                to_json(self.service_principals.create(&args).await?)
            }
            Route::UpdateServicePrincipal => {
                let args: UpdateServicePrincipalArgs = parse(params)?;
                self.service_principals.update(&args).await
            }
            Route::DeleteServicePrincipal => {
                let args: ServicePrincipalIdArgs = parse(params)?;
                self.service_principals.delete(&args.id).await
            }
            Route::ListGitCredentials => to_json(self.git_credentials.list().await?),
            Route::CreateGitCredential => {
                let args: CreateGitCredentialArgs = parse(params)?;
                to_json(self.git_credentials.create(&args).await?)
            }
            Route::UpdateGitCredential => {
                let args: UpdateGitCredentialArgs = parse(params)?;
                self.git_credentials.update(&args).await
            }
            Route::DeleteGitCredential => {
                let args: DeleteGitCredentialArgs = parse(params)?;
                self.git_credentials.delete(&args.credential_id).await
            }
            Route::GetSharePermissions => {
                let args: GetSharePermissionsArgs = parse(params)?;
                to_json(self.shares.get_permissions(&args.name).await?)
            }
            Route::UpdateSharePermissions => {
                let args: UpdateSharePermissionsArgs = parse(params)?;
                to_json(self.shares.update_permissions(&args.name, &args.changes).await?)
            }
            Route::CreateStorageCredential => {
                let args: CreateStorageCredentialArgs = parse(params)?;
                self.unity_catalog.create_storage_credential(&args).await
            }
            Route::GetStorageCredential => {
                let args: CredentialNameArgs = parse(params)?;
                self.unity_catalog.get_storage_credential(&args.name).await
            }
            Route::UpdateStorageCredential => {
                let args: UpdateStorageCredentialArgs = parse(params)?;
                self.unity_catalog.update_storage_credential(&args).await
            }
            Route::DeleteStorageCredential => {
                let args: CredentialNameArgs = parse(params)?;
                self.unity_catalog.delete_storage_credential(&args.name).await
            }
            Route::ListStorageCredentials => {
                let args: ListStorageCredentialsArgs = parse(params)?;
                self.unity_catalog.list_storage_credentials(&args).await
            }
            Route::CreateCredential => {
                let args: CreateCredentialArgs = parse(params)?;
                self.unity_catalog.create_credential(&args).await
            }
            Route::ListCredentials => self.unity_catalog.list_credentials().await,
            Route::UpdateCredential => {
                let args: UpdateCredentialArgs = parse(params)?;
                self.unity_catalog.update_credential(&args).await
            }
            Route::DeleteCredential => {
                let args: CredentialNameArgs = parse(params)?;
                self.unity_catalog.delete_credential(&args.name).await
            }
        }
    }

    async fn get_acl(&self, object_type: ObjectType, object_id: &str) -> Result<Value, Error> {
        to_json(self.permissions.get(object_type, object_id).await?)
    }
}

/// Resolves the tool and checks required parameters. A null value counts as missing.
fn validate(invocation: &ToolInvocation) -> Result<&'static ToolSpec, ToolResult> {
    let Some(spec) = registry::lookup(&invocation.tool_name) else {
        return Err(ToolResult::failure(
            ErrorKind::UnknownTool,
            format!("unknown tool: {}", invocation.tool_name),
        ));
    };

    let missing: Vec<&str> = spec
        .required
        .iter()
        .copied()
        .filter(|key| matches!(invocation.params.get(*key), None | Some(Value::Null)))
        .collect();
    if !missing.is_empty() {
        return Err(ToolResult::failure(
            ErrorKind::InvalidParams,
            format!(
                "{} is missing required parameter(s): {}",
                spec.name,
                missing.join(", ")
            ),
        ));
    }
    Ok(spec)
}

fn parse<T: DeserializeOwned>(params: Params) -> Result<T, Error> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| Error::invalid_params(format!("invalid parameters: {}", e)))
}

fn to_json<T: Serialize>(value: T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|e| {
        Error::Transport(TransportError::new(
            ErrorKind::TransportError,
            format!("failed to encode result: {}", e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(tool: &str, params: Value) -> ToolInvocation {
        let Value::Object(params) = params else {
            panic!("params must be an object");
        };
        ToolInvocation::new(tool, params)
    }

    #[test]
    fn test_validate_lists_every_missing_key() {
        let result = validate(&invocation(
            "set_permissions",
            json!({"object_type": "jobs", "object_id": null}),
        ))
        .unwrap_err();
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::InvalidParams);
        assert!(error.message.contains("object_id, access_control_list"));
    }

    #[test]
    fn test_parse_maps_type_errors_to_invalid_params() {
        let err = parse::<ObjectPermissionsArgs>(
            json!({"object_type": "pipelines", "object_id": "1"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert!(err.message().contains("pipelines"));
    }
}
