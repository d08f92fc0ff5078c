//! Static tool table: names, descriptions, required parameters, argument
//! schemas and the adapter operation each tool routes to.

use dbperms_integrations::permissions::{
    CatalogPermissionsArgs, ClusterPermissionsArgs, JobPermissionsArgs, ObjectPermissionsArgs,
    PermissionLevelsArgs, SchemaPermissionsArgs, SetClusterPermissionsArgs,
    SetJobPermissionsArgs, SetObjectPermissionsArgs, SetWarehousePermissionsArgs,
    SetWorkspaceObjectPermissionsArgs, TablePermissionsArgs, WarehousePermissionsArgs,
    WorkspaceObjectPermissionsArgs,
};
use dbperms_integrations::git_credentials::{
    CreateGitCredentialArgs, DeleteGitCredentialArgs, UpdateGitCredentialArgs,
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
use dbperms_integrations::NoArgs;
use rmcp::model::{JsonObject, Tool};
use schemars::JsonSchema;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    GetPermissions,
    SetPermissions,
    UpdatePermissions,
    GetPermissionLevels,
    GetClusterPermissions,
    GetJobPermissions,
    GetWarehousePermissions,
    GetWorkspaceObjectPermissions,
    GetCatalogPermissions,
    GetSchemaPermissions,
    GetTablePermissions,
    SetClusterPermissions,
    SetJobPermissions,
    SetWarehousePermissions,
    SetWorkspaceObjectPermissions,
    ListServicePrincipals,
    GetServicePrincipal,
    CreateServicePrincipal,
    UpdateServicePrincipal,
    DeleteServicePrincipal,
    ListGitCredentials,
    CreateGitCredential,
    UpdateGitCredential,
    DeleteGitCredential,
    GetSharePermissions,
    UpdateSharePermissions,
    CreateStorageCredential,
    GetStorageCredential,
    UpdateStorageCredential,
    DeleteStorageCredential,
    ListStorageCredentials,
    CreateCredential,
    ListCredentials,
    UpdateCredential,
    DeleteCredential,
}

#[derive(Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: &'static [&'static str],
    pub route: Route,
    schema: fn() -> JsonObject,
}

impl ToolSpec {
    pub fn input_schema(&self) -> JsonObject {
        (self.schema)()
    }

    pub fn to_tool(&self) -> Tool {
        Tool::new(self.name, self.description, Arc::new(self.input_schema()))
    }
}

fn schema<T: JsonSchema>() -> JsonObject {
    match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(Value::Object(object)) => object,
        _ => JsonObject::new(),
    }
}

const ACL_NOTE: &str = " Each access_control_list entry names exactly one of user_name, group_name or \
                        service_principal_name plus a permission_level valid for the object type.";

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_permissions",
        description: "Get the access control list of any permission-bearing object. object_type is one of \
                      clusters, jobs, warehouses, notebooks, directories, catalogs, schemas, tables, registered_models; \
                      object_id is the object's id, or the full name for Unity Catalog securables.",
        required: &["object_type", "object_id"],
        route: Route::GetPermissions,
        schema: schema::<ObjectPermissionsArgs>,
    },
    ToolSpec {
        name: "set_permissions",
        description: "Replace the access control list of an object with the supplied entries.",
        required: &["object_type", "object_id", "access_control_list"],
        route: Route::SetPermissions,
        schema: schema::<SetObjectPermissionsArgs>,
    },
    ToolSpec {
        name: "update_permissions",
        description: "Merge entries into an object's access control list: entries for principals already \
                      present replace their grant, new principals are appended, everyone else is untouched.",
        required: &["object_type", "object_id", "access_control_list"],
        route: Route::UpdatePermissions,
        schema: schema::<SetObjectPermissionsArgs>,
    },
    ToolSpec {
        name: "get_permission_levels",
        description: "List the permission levels valid for an object type. With object_id, workspace \
                      object levels are read from the platform.",
        required: &["object_type"],
        route: Route::GetPermissionLevels,
        schema: schema::<PermissionLevelsArgs>,
    },
    ToolSpec {
        name: "get_cluster_permissions",
        description: "Get the access control list of a compute cluster.",
        required: &["cluster_id"],
        route: Route::GetClusterPermissions,
        schema: schema::<ClusterPermissionsArgs>,
    },
    ToolSpec {
        name: "get_job_permissions",
        description: "Get the access control list of a job.",
        required: &["job_id"],
        route: Route::GetJobPermissions,
        schema: schema::<JobPermissionsArgs>,
    },
    ToolSpec {
        name: "get_warehouse_permissions",
        description: "Get the access control list of a SQL warehouse.",
        required: &["warehouse_id"],
        route: Route::GetWarehousePermissions,
        schema: schema::<WarehousePermissionsArgs>,
    },
    ToolSpec {
        name: "get_workspace_object_permissions",
        description: "Get the access control list of a notebook, directory or repo by workspace path.",
        required: &["path"],
        route: Route::GetWorkspaceObjectPermissions,
        schema: schema::<WorkspaceObjectPermissionsArgs>,
    },
    ToolSpec {
        name: "get_catalog_permissions",
        description: "Get the privilege grants on a Unity Catalog catalog.",
        required: &["catalog_name"],
        route: Route::GetCatalogPermissions,
        schema: schema::<CatalogPermissionsArgs>,
    },
    ToolSpec {
        name: "get_schema_permissions",
        description: "Get the privilege grants on a Unity Catalog schema (catalog.schema).",
        required: &["schema_full_name"],
        route: Route::GetSchemaPermissions,
        schema: schema::<SchemaPermissionsArgs>,
    },
    ToolSpec {
        name: "get_table_permissions",
        description: "Get the privilege grants on a Unity Catalog table (catalog.schema.table).",
        required: &["table_full_name"],
        route: Route::GetTablePermissions,
        schema: schema::<TablePermissionsArgs>,
    },
    ToolSpec {
        name: "set_cluster_permissions",
        description: "Replace the access control list of a compute cluster.",
        required: &["cluster_id", "access_control_list"],
        route: Route::SetClusterPermissions,
        schema: schema::<SetClusterPermissionsArgs>,
    },
    ToolSpec {
        name: "set_job_permissions",
        description: "Replace the access control list of a job.",
        required: &["job_id", "access_control_list"],
        route: Route::SetJobPermissions,
        schema: schema::<SetJobPermissionsArgs>,
    },
    ToolSpec {
        name: "set_warehouse_permissions",
        description: "Replace the access control list of a SQL warehouse.",
        required: &["warehouse_id", "access_control_list"],
        route: Route::SetWarehousePermissions,
        schema: schema::<SetWarehousePermissionsArgs>,
    },
    ToolSpec {
        name: "set_workspace_object_permissions",
        description: "Replace the access control list of a notebook, directory or repo by workspace path.",
        required: &["path", "access_control_list"],
        route: Route::SetWorkspaceObjectPermissions,
        schema: schema::<SetWorkspaceObjectPermissionsArgs>,
    },
    ToolSpec {
        name: "list_service_principals",
        description: "List service principals, optionally filtered with a SCIM filter expression.",
        required: &[],
        route: Route::ListServicePrincipals,
        schema: schema::<ListServicePrincipalsArgs>,
    },
    ToolSpec {
        name: "get_service_principal",
        description: "Get a service principal by id.",
        required: &["id"],
        route: Route::GetServicePrincipal,
        schema: schema::<ServicePrincipalIdArgs>,
    },
    ToolSpec {
        name: "create_service_principal",
        description: "Create a service principal.",
        required: &["display_name"],
        route: Route::CreateServicePrincipal,
        schema: schema::<CreateServicePrincipalArgs>,
    },
    ToolSpec {
        name: "update_service_principal",
        description: "Update display name, active flag or cluster-create entitlement of a service principal.",
        required: &["id"],
        route: Route::UpdateServicePrincipal,
        schema: schema::<UpdateServicePrincipalArgs>,
    },
    ToolSpec {
        name: "delete_service_principal",
        description: "Delete a service principal.",
        required: &["id"],
        route: Route::DeleteServicePrincipal,
        schema: schema::<ServicePrincipalIdArgs>,
    },
    ToolSpec {
        name: "list_git_credentials",
        description: "List the caller's git credentials. Tokens are never returned.",
        required: &[],
        route: Route::ListGitCredentials,
        schema: schema::<NoArgs>,
    },
    ToolSpec {
        name: "create_git_credential",
        description: "Store a git provider personal access token for the caller.",
        required: &["git_provider", "git_username", "personal_access_token"],
        route: Route::CreateGitCredential,
        schema: schema::<CreateGitCredentialArgs>,
    },
    ToolSpec {
        name: "update_git_credential",
        description: "Update provider, username or token of a git credential.",
        required: &["credential_id"],
        route: Route::UpdateGitCredential,
        schema: schema::<UpdateGitCredentialArgs>,
    },
    ToolSpec {
        name: "delete_git_credential",
        description: "Delete a git credential.",
        required: &["credential_id"],
        route: Route::DeleteGitCredential,
        schema: schema::<DeleteGitCredentialArgs>,
    },
    ToolSpec {
        name: "get_share_permissions",
        description: "Get the recipient privileges on a Delta Sharing share.",
        required: &["name"],
        route: Route::GetSharePermissions,
        schema: schema::<GetSharePermissionsArgs>,
    },
    ToolSpec {
        name: "update_share_permissions",
        description: "Add or remove SELECT/USAGE privileges on a share. Each change is {principal, add?, remove?}.",
        required: &["name", "changes"],
        route: Route::UpdateSharePermissions,
        schema: schema::<UpdateSharePermissionsArgs>,
    },
    ToolSpec {
        name: "create_storage_credential",
        description: "Create a Unity Catalog storage credential with at most one cloud identity block.",
        required: &["name"],
        route: Route::CreateStorageCredential,
        schema: schema::<CreateStorageCredentialArgs>,
    },
    ToolSpec {
        name: "get_storage_credential",
        description: "Get a Unity Catalog storage credential by name.",
        required: &["name"],
        route: Route::GetStorageCredential,
        schema: schema::<CredentialNameArgs>,
    },
    ToolSpec {
        name: "update_storage_credential",
        description: "Rename, re-comment or re-point a Unity Catalog storage credential.",
        required: &["name"],
        route: Route::UpdateStorageCredential,
        schema: schema::<UpdateStorageCredentialArgs>,
    },
    ToolSpec {
        name: "delete_storage_credential",
        description: "Delete a Unity Catalog storage credential.",
        required: &["name"],
        route: Route::DeleteStorageCredential,
        schema: schema::<CredentialNameArgs>,
    },
    ToolSpec {
        name: "list_storage_credentials",
        description: "List Unity Catalog storage credentials.",
        required: &[],
        route: Route::ListStorageCredentials,
        schema: schema::<ListStorageCredentialsArgs>,
    },
    ToolSpec {
        name: "create_credential",
        description: "Create a Unity Catalog service credential.",
        required: &["name"],
        route: Route::CreateCredential,
        schema: schema::<CreateCredentialArgs>,
    },
    ToolSpec {
        name: "list_credentials",
        description: "List Unity Catalog service credentials.",
        required: &[],
        route: Route::ListCredentials,
        schema: schema::<NoArgs>,
    },
    ToolSpec {
        name: "update_credential",
        description: "Rename, re-comment or re-point a Unity Catalog service credential.",
        required: &["name"],
        route: Route::UpdateCredential,
        schema: schema::<UpdateCredentialArgs>,
    },
    ToolSpec {
        name: "delete_credential",
        description: "Delete a Unity Catalog service credential.",
        required: &["name"],
        route: Route::DeleteCredential,
        schema: schema::<CredentialNameArgs>,
    },
];

pub fn lookup(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|spec| spec.name == name)
}

/// Tool list advertised over MCP. ACL-taking tools get the entry shape appended.
pub fn tools() -> Vec<Tool> {
    TOOLS
        .iter()
        .map(|spec| {
            let mut tool = spec.to_tool();
            if spec.required.contains(&"access_control_list") {
                tool.description = Some(format!("{}{}", spec.description, ACL_NOTE).into());
            }
            tool
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tool_names_are_unique() {
        let names: HashSet<_> = TOOLS.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), TOOLS.len());
    }

    #[test]
    fn test_required_params_appear_in_schema() {
        for spec in TOOLS {
            let schema = spec.input_schema();
            let properties = schema
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            for key in spec.required {
                assert!(
                    properties.contains_key(*key),
                    "{} schema lacks required param {}",
                    spec.name,
                    key
                );
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(
            lookup("get_cluster_permissions").map(|s| s.route),
            Some(Route::GetClusterPermissions)
        );
        assert!(lookup("drop_everything").is_none());
    }

    #[test]
    fn test_acl_tools_describe_entry_shape() {
        let tools = tools();
        let set = tools.iter().find(|t| t.name == "set_permissions").unwrap();
        assert!(set.description.as_deref().unwrap().contains("service_principal_name"));
        let get = tools.iter().find(|t| t.name == "get_permissions").unwrap();
        assert!(!get.description.as_deref().unwrap().contains("service_principal_name"));
    }
}
