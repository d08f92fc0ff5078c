use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::acl::{
    self, AccessControlEntry, AccessControlEntryParams, AccessControlList, Grant, NormalizedAcl,
    ObjectType, Principal, Securable,
};
use crate::error::{Error, Result, ValidationError, ValidationReason};
use crate::params::{flexible_id, flexible_id_opt};
use crate::transport::{ApiRequest, Transport, decode};

const PERMISSIONS_ENDPOINT: &str = "/api/2.0/permissions";
const UNITY_CATALOG_PERMISSIONS_ENDPOINT: &str = "/api/2.1/unity-catalog/permissions";
const WORKSPACE_STATUS_ENDPOINT: &str = "/api/2.0/workspace/get-status";

// ============================================================================
// Tool arguments
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ObjectPermissionsArgs {
    /// One of clusters, jobs, warehouses, notebooks, directories, catalogs, schemas, tables, registered_models
    pub object_type: ObjectType,
    /// Object id, or full name for catalogs/schemas/tables
    #[serde(deserialize_with = "flexible_id")]
    pub object_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SetObjectPermissionsArgs {
    pub object_type: ObjectType,
    #[serde(deserialize_with = "flexible_id")]
    pub object_id: String,
    /// Entries naming exactly one of user_name, group_name, service_principal_name plus a permission_level
    pub access_control_list: Vec<AccessControlEntryParams>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct PermissionLevelsArgs {
    pub object_type: ObjectType,
    /// When given for a workspace object type, levels are read from the platform
    #[serde(default, deserialize_with = "flexible_id_opt")]
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClusterPermissionsArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub cluster_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct JobPermissionsArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct WarehousePermissionsArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub warehouse_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct WorkspaceObjectPermissionsArgs {
    /// Workspace path of a notebook, directory or repo, e.g. /Users/a@x.com/etl
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CatalogPermissionsArgs {
    pub catalog_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SchemaPermissionsArgs {
    /// catalog.schema
    pub schema_full_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TablePermissionsArgs {
    /// catalog.schema.table
    pub table_full_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SetClusterPermissionsArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub cluster_id: String,
    pub access_control_list: Vec<AccessControlEntryParams>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SetJobPermissionsArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub job_id: String,
    pub access_control_list: Vec<AccessControlEntryParams>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SetWarehousePermissionsArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub warehouse_id: String,
    pub access_control_list: Vec<AccessControlEntryParams>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SetWorkspaceObjectPermissionsArgs {
    pub path: String,
    pub access_control_list: Vec<AccessControlEntryParams>,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PermissionLevel {
    pub permission_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PermissionLevels {
    pub object_type: ObjectType,
    pub permission_levels: Vec<PermissionLevel>,
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ObjectPermissionsResponse {
    #[serde(default)]
    access_control_list: Vec<WireAclEntry>,
}

#[derive(Debug, Deserialize)]
struct WireAclEntry {
    user_name: Option<String>,
    group_name: Option<String>,
    service_principal_name: Option<String>,
    permission_level: Option<String>,
    #[serde(default)]
    all_permissions: Vec<WirePermission>,
}

#[derive(Debug, Deserialize)]
struct WirePermission {
    permission_level: String,
    #[serde(default)]
    inherited: bool,
}

impl WireAclEntry {
    fn principal(&self) -> Option<Principal> {
        if let Some(name) = &self.user_name {
            return Some(Principal::User(name.clone()));
        }
        if let Some(name) = &self.group_name {
            return Some(Principal::Group(name.clone()));
        }
        self.service_principal_name
            .as_ref()
            .map(|name| Principal::ServicePrincipal(name.clone()))
    }

    fn direct_level(&self) -> Option<&str> {
        if let Some(level) = &self.permission_level {
            return Some(level);
        }
        self.all_permissions
            .iter()
            .find(|p| !p.inherited)
            .map(|p| p.permission_level.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PrivilegeAssignments {
    #[serde(default)]
    privilege_assignments: Vec<PrivilegeAssignment>,
}

#[derive(Debug, Deserialize)]
struct PrivilegeAssignment {
    principal: String,
    #[serde(default)]
    privileges: Vec<WirePrivilege>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePrivilege {
    Name(String),
    Detailed {
        privilege: String,
        #[serde(default)]
        inherited_from_name: Option<String>,
    },
}

impl WirePrivilege {
    fn name(&self) -> &str {
        match self {
            WirePrivilege::Name(name) => name,
            WirePrivilege::Detailed { privilege, .. } => privilege,
        }
    }

    fn inherited(&self) -> bool {
        matches!(
            self,
            WirePrivilege::Detailed {
                inherited_from_name: Some(_),
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivilegeChange {
    pub principal: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceObjectStatus {
    object_type: String,
    object_id: Option<serde_json::Number>,
}

#[derive(Debug, Default, Deserialize)]
struct PermissionLevelsResponse {
    #[serde(default)]
    permission_levels: Vec<PermissionLevel>,
}

// ============================================================================
// Normalization
// ============================================================================

fn grants_from_workspace(response: ObjectPermissionsResponse) -> NormalizedAcl {
    let mut grants = Vec::new();
    for entry in response.access_control_list {
        let Some(principal) = entry.principal() else {
            continue;
        };
        if let Some(level) = entry.permission_level {
            grants.push(Grant::direct(principal.name(), level));
            continue;
        }
        for permission in entry.all_permissions {
            grants.push(Grant {
                principal: principal.name().to_string(),
                permission_level: permission.permission_level,
                inherited: permission.inherited,
            });
        }
    }
    NormalizedAcl {
        access_control_list: grants,
    }
}

pub(crate) fn grants_from_assignments(response: PrivilegeAssignments) -> NormalizedAcl {
    let access_control_list = response
        .privilege_assignments
        .into_iter()
        .flat_map(|assignment| {
            let principal = assignment.principal;
            assignment
                .privileges
                .into_iter()
                .map(move |privilege| Grant {
                    principal: principal.clone(),
                    permission_level: privilege.name().to_string(),
                    inherited: privilege.inherited(),
                })
        })
        .collect();
    NormalizedAcl {
        access_control_list,
    }
}

/// Direct grants of a fetched ACL, one per principal (first occurrence wins).
fn direct_entries(
    object_type: ObjectType,
    object_id: &str,
    response: &ObjectPermissionsResponse,
) -> Result<AccessControlList> {
    let mut entries: Vec<AccessControlEntry> = Vec::new();
    for wire in &response.access_control_list {
        let (Some(principal), Some(level)) = (wire.principal(), wire.direct_level()) else {
            continue;
        };
        if entries.iter().any(|e| e.principal() == &principal) {
            continue;
        }
        entries.push(AccessControlEntry::new(principal, level));
    }
    Ok(AccessControlList::new(object_type, object_id, entries)?)
}

/// Computes the Unity Catalog change set that makes each supplied principal hold exactly its
/// supplied privilege. With `replace_all`, principals absent from `desired` lose all privileges.
pub fn privilege_changes(
    current: &[(String, Vec<String>)],
    desired: &[AccessControlEntry],
    replace_all: bool,
) -> Vec<PrivilegeChange> {
    let held: HashMap<&str, &Vec<String>> = current
        .iter()
        .map(|(principal, privileges)| (principal.as_str(), privileges))
        .collect();

    let mut changes = Vec::new();
    for entry in desired {
        let principal = entry.principal().name();
        let level = entry.permission_level();
        let privileges = held.get(principal).copied();
        let add = match privileges {
            Some(p) if p.iter().any(|x| x == level) => Vec::new(),
            _ => vec![level.to_string()],
        };
        let remove: Vec<String> = privileges
            .map(|p| p.iter().filter(|x| *x != level).cloned().collect())
            .unwrap_or_default();
        if !add.is_empty() || !remove.is_empty() {
            changes.push(PrivilegeChange {
                principal: principal.to_string(),
                add,
                remove,
            });
        }
    }

    if replace_all {
        for (principal, privileges) in current {
            let kept = desired.iter().any(|e| e.principal().name() == principal);
            if !kept && !privileges.is_empty() {
                changes.push(PrivilegeChange {
                    principal: principal.clone(),
                    add: Vec::new(),
                    remove: privileges.clone(),
                });
            }
        }
    }

    changes
}

fn workspace_path(segment: &str, object_id: &str) -> String {
    format!(
        "{}/{}/{}",
        PERMISSIONS_ENDPOINT,
        segment,
        urlencoding::encode(object_id)
    )
}

fn unity_catalog_path(securable: &str, full_name: &str) -> String {
    format!(
        "{}/{}/{}",
        UNITY_CATALOG_PERMISSIONS_ENDPOINT,
        securable,
        urlencoding::encode(full_name)
    )
}

// ============================================================================
// Adapter
// ============================================================================

/// Permission CRUD over workspace objects and Unity Catalog securables.
#[derive(Clone)]
pub struct PermissionsApi {
    transport: Arc<dyn Transport>,
}

impl PermissionsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn get(&self, object_type: ObjectType, object_id: &str) -> Result<NormalizedAcl> {
        info!("Getting permissions for {}/{}", object_type, object_id);
        match object_type.securable() {
            Securable::Workspace(segment) => {
                let response = self
                    .transport
                    .send(ApiRequest::get(workspace_path(segment, object_id)))
                    .await?;
                let parsed: ObjectPermissionsResponse = decode(response, "permissions")?;
                Ok(grants_from_workspace(parsed))
            }
            Securable::UnityCatalog(securable) => {
                let response = self
                    .transport
                    .send(ApiRequest::get(unity_catalog_path(securable, object_id)))
                    .await?;
                let parsed: PrivilegeAssignments = decode(response, "privilege assignments")?;
                Ok(grants_from_assignments(parsed))
            }
        }
    }

    /// Replaces the object's ACL with the supplied entries.
    pub async fn set(
        &self,
        object_type: ObjectType,
        object_id: &str,
        entries: &[AccessControlEntryParams],
    ) -> Result<NormalizedAcl> {
        info!("Setting permissions for {}/{}", object_type, object_id);
        let validated = acl::validate_all(entries, object_type)?;
        match object_type.securable() {
            Securable::Workspace(segment) => {
                let list = AccessControlList::new(object_type, object_id, validated)?;
                let response = self
                    .transport
                    .send(ApiRequest::put(workspace_path(segment, object_id)).json(list.to_wire()))
                    .await?;
                let parsed: ObjectPermissionsResponse = decode(response, "permissions")?;
                Ok(grants_from_workspace(parsed))
            }
            Securable::UnityCatalog(securable) => {
                self.apply_privileges(securable, object_id, &validated, true)
                    .await
            }
        }
    }

    /// Fetches the current ACL, merges the supplied entries by principal and submits the result.
    pub async fn update(
        &self,
        object_type: ObjectType,
        object_id: &str,
        entries: &[AccessControlEntryParams],
    ) -> Result<NormalizedAcl> {
        info!("Updating permissions for {}/{}", object_type, object_id);
        let validated = acl::validate_all(entries, object_type)?;
        match object_type.securable() {
            Securable::Workspace(segment) => {
                let path = workspace_path(segment, object_id);
                let current = self.transport.send(ApiRequest::get(path.as_str())).await?;
                let current: ObjectPermissionsResponse = decode(current, "permissions")?;
                let existing = direct_entries(object_type, object_id, &current)?;
                let merged = acl::merge(&existing, &validated);
                debug!(
                    "Merged {} existing and {} supplied entries into {}",
                    existing.entries().len(),
                    validated.len(),
                    merged.entries().len()
                );
                let response = self
                    .transport
                    .send(ApiRequest::put(path).json(merged.to_wire()))
                    .await?;
                let parsed: ObjectPermissionsResponse = decode(response, "permissions")?;
                Ok(grants_from_workspace(parsed))
            }
            Securable::UnityCatalog(securable) => {
                self.apply_privileges(securable, object_id, &validated, false)
                    .await
            }
        }
    }

    async fn apply_privileges(
        &self,
        securable: &str,
        full_name: &str,
        desired: &[AccessControlEntry],
        replace_all: bool,
    ) -> Result<NormalizedAcl> {
        let path = unity_catalog_path(securable, full_name);
        let current = self.transport.send(ApiRequest::get(path.as_str())).await?;
        let current: PrivilegeAssignments = decode(current, "privilege assignments")?;

        let held: Vec<(String, Vec<String>)> = current
            .privilege_assignments
            .iter()
            .map(|a| {
                let direct = a
                    .privileges
                    .iter()
                    .filter(|p| !p.inherited())
                    .map(|p| p.name().to_string())
                    .collect();
                (a.principal.clone(), direct)
            })
            .collect();

        let changes = privilege_changes(&held, desired, replace_all);
        if changes.is_empty() {
            debug!("No privilege changes needed for {} {}", securable, full_name);
            return Ok(grants_from_assignments(current));
        }

        let response = self
            .transport
            .send(ApiRequest::patch(path).json(json!({ "changes": changes })))
            .await?;
        let parsed: PrivilegeAssignments = decode(response, "privilege assignments")?;
        Ok(grants_from_assignments(parsed))
    }

    /// Levels from the platform when an id is given for a workspace object, else the local table.
    pub async fn levels(
        &self,
        object_type: ObjectType,
        object_id: Option<&str>,
    ) -> Result<PermissionLevels> {
        if let (Securable::Workspace(segment), Some(object_id)) =
            (object_type.securable(), object_id)
        {
            info!("Getting permission levels for {}/{}", object_type, object_id);
            let path = format!("{}/permissionLevels", workspace_path(segment, object_id));
            let response = self.transport.send(ApiRequest::get(path)).await?;
            let parsed: PermissionLevelsResponse = decode(response, "permission levels")?;
            return Ok(PermissionLevels {
                object_type,
                permission_levels: parsed.permission_levels,
            });
        }

        Ok(PermissionLevels {
            object_type,
            permission_levels: object_type
                .permission_levels()
                .iter()
                .map(|level| PermissionLevel {
                    permission_level: level.to_string(),
                    description: None,
                })
                .collect(),
        })
    }

    /// Resolves a workspace path to the object type and id used by the permissions API.
    pub async fn resolve_workspace_path(&self, path: &str) -> Result<(ObjectType, String)> {
        if !path.starts_with('/') {
            return Err(Error::invalid_params(format!(
                "workspace path must be absolute, got '{}'",
                path
            )));
        }
        let response = self
            .transport
            .send(ApiRequest::get(WORKSPACE_STATUS_ENDPOINT).query("path", path))
            .await?;
        let status: WorkspaceObjectStatus = decode(response, "workspace status")?;

        let object_type = match status.object_type.as_str() {
            "DIRECTORY" | "REPO" => ObjectType::Directories,
            "NOTEBOOK" => ObjectType::Notebooks,
            other => {
                return Err(ValidationError::new(
                    ValidationReason::UnsupportedValue,
                    format!(
                        "workspace object '{}' is a {}; only notebooks, directories and repos carry permissions here",
                        path, other
                    ),
                )
                .into());
            }
        };
        let object_id = status.object_id.map(|id| id.to_string()).ok_or_else(|| {
            Error::Transport(crate::error::TransportError::connection(format!(
                "workspace status for '{}' has no object_id",
                path
            )))
        })?;
        debug!("Resolved {} to {}/{}", path, object_type, object_id);
        Ok((object_type, object_id))
    }
}
