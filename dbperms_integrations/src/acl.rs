//! Uniform access-control model shared by every permission-bearing resource.
//!
//! Workspace objects (clusters, jobs, warehouses, notebooks, directories,
//! registered models) and Unity Catalog securables (catalogs, schemas,
//! tables) use different REST shapes. This module holds the common
//! representation plus the pure validation and merge rules; it performs no I/O.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{ValidationError, ValidationReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Clusters,
    Jobs,
    #[serde(alias = "sql/warehouses")]
    Warehouses,
    Notebooks,
    Directories,
    Catalogs,
    Schemas,
    Tables,
    #[serde(alias = "registered-models")]
    RegisteredModels,
}

/// Where the permissions of an object type live on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Securable {
    /// `/api/2.0/permissions/{segment}/{id}`
    Workspace(&'static str),
    /// `/api/2.1/unity-catalog/permissions/{securable}/{full_name}`
    UnityCatalog(&'static str),
}

const CLUSTER_LEVELS: &[&str] = &["CAN_ATTACH_TO", "CAN_RESTART", "CAN_MANAGE"];
const JOB_LEVELS: &[&str] = &["CAN_VIEW", "CAN_MANAGE_RUN", "IS_OWNER", "CAN_MANAGE"];
const WAREHOUSE_LEVELS: &[&str] = &["CAN_VIEW", "CAN_MONITOR", "CAN_USE", "IS_OWNER", "CAN_MANAGE"];
const WORKSPACE_OBJECT_LEVELS: &[&str] = &["CAN_READ", "CAN_RUN", "CAN_EDIT", "CAN_MANAGE"];
const REGISTERED_MODEL_LEVELS: &[&str] = &[
    "CAN_READ",
    "CAN_EDIT",
    "CAN_MANAGE_STAGING_VERSIONS",
    "CAN_MANAGE_PRODUCTION_VERSIONS",
    "CAN_MANAGE",
];
const CATALOG_PRIVILEGES: &[&str] = &[
    "ALL_PRIVILEGES",
    "APPLY_TAG",
    "BROWSE",
    "CREATE_FUNCTION",
    "CREATE_MATERIALIZED_VIEW",
    "CREATE_MODEL",
    "CREATE_SCHEMA",
    "CREATE_TABLE",
    "CREATE_VOLUME",
    "EXECUTE",
    "MANAGE",
    "MODIFY",
    "READ_VOLUME",
    "REFRESH",
    "SELECT",
    "USE_CATALOG",
    "USE_SCHEMA",
    "WRITE_VOLUME",
];
const SCHEMA_PRIVILEGES: &[&str] = &[
    "ALL_PRIVILEGES",
    "APPLY_TAG",
    "BROWSE",
    "CREATE_FUNCTION",
    "CREATE_MATERIALIZED_VIEW",
    "CREATE_MODEL",
    "CREATE_TABLE",
    "CREATE_VOLUME",
    "EXECUTE",
    "MANAGE",
    "MODIFY",
    "READ_VOLUME",
    "REFRESH",
    "SELECT",
    "USE_SCHEMA",
    "WRITE_VOLUME",
];
const TABLE_PRIVILEGES: &[&str] = &[
    "ALL_PRIVILEGES",
    "APPLY_TAG",
    "BROWSE",
    "MANAGE",
    "MODIFY",
    "REFRESH",
    "SELECT",
];

impl ObjectType {
    pub const ALL: [ObjectType; 9] = [
        ObjectType::Clusters,
        ObjectType::Jobs,
        ObjectType::Warehouses,
        ObjectType::Notebooks,
        ObjectType::Directories,
        ObjectType::Catalogs,
        ObjectType::Schemas,
        ObjectType::Tables,
        ObjectType::RegisteredModels,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectType::Clusters => "clusters",
            ObjectType::Jobs => "jobs",
            ObjectType::Warehouses => "warehouses",
            ObjectType::Notebooks => "notebooks",
            ObjectType::Directories => "directories",
            ObjectType::Catalogs => "catalogs",
            ObjectType::Schemas => "schemas",
            ObjectType::Tables => "tables",
            ObjectType::RegisteredModels => "registered_models",
        }
    }

    pub const fn securable(self) -> Securable {
        match self {
            ObjectType::Clusters => Securable::Workspace("clusters"),
            ObjectType::Jobs => Securable::Workspace("jobs"),
            ObjectType::Warehouses => Securable::Workspace("sql/warehouses"),
            ObjectType::Notebooks => Securable::Workspace("notebooks"),
            ObjectType::Directories => Securable::Workspace("directories"),
            ObjectType::RegisteredModels => Securable::Workspace("registered-models"),
            ObjectType::Catalogs => Securable::UnityCatalog("catalog"),
            ObjectType::Schemas => Securable::UnityCatalog("schema"),
            ObjectType::Tables => Securable::UnityCatalog("table"),
        }
    }

    /// Client-side table of accepted levels. The platform stays the final authority.
    pub const fn permission_levels(self) -> &'static [&'static str] {
        match self {
            ObjectType::Clusters => CLUSTER_LEVELS,
            ObjectType::Jobs => JOB_LEVELS,
            ObjectType::Warehouses => WAREHOUSE_LEVELS,
            ObjectType::Notebooks | ObjectType::Directories => WORKSPACE_OBJECT_LEVELS,
            ObjectType::RegisteredModels => REGISTERED_MODEL_LEVELS,
            ObjectType::Catalogs => CATALOG_PRIVILEGES,
            ObjectType::Schemas => SCHEMA_PRIVILEGES,
            ObjectType::Tables => TABLE_PRIVILEGES,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    User(String),
    Group(String),
    ServicePrincipal(String),
}

impl Principal {
    pub fn name(&self) -> &str {
        match self {
            Principal::User(name) | Principal::Group(name) | Principal::ServicePrincipal(name) => {
                name
            }
        }
    }

    /// Field name the workspace permissions API uses for this principal kind.
    pub fn wire_field(&self) -> &'static str {
        match self {
            Principal::User(_) => "user_name",
            Principal::Group(_) => "group_name",
            Principal::ServicePrincipal(_) => "service_principal_name",
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An ACL entry as supplied by the caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AccessControlEntryParams {
    /// User email. `user_email` is accepted as an alias.
    #[serde(default, alias = "user_email", skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Service principal application id. `service_principal_id` is accepted as an alias.
    #[serde(
        default,
        alias = "service_principal_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_principal_name: Option<String>,
    pub permission_level: String,
}

/// A validated grant: exactly one principal and a level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessControlEntry {
    principal: Principal,
    permission_level: String,
}

impl AccessControlEntry {
    pub fn new(principal: Principal, permission_level: impl Into<String>) -> Self {
        Self {
            principal,
            permission_level: permission_level.into(),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn permission_level(&self) -> &str {
        &self.permission_level
    }

    /// Shape expected by `PUT/PATCH /api/2.0/permissions/...`.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut entry = serde_json::Map::new();
        entry.insert(
            self.principal.wire_field().to_string(),
            self.principal.name().into(),
        );
        entry.insert(
            "permission_level".to_string(),
            self.permission_level.clone().into(),
        );
        serde_json::Value::Object(entry)
    }
}

/// Ordered grants for a single object; no two entries share a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlList {
    object_type: ObjectType,
    object_id: String,
    entries: Vec<AccessControlEntry>,
}

impl AccessControlList {
    pub fn new(
        object_type: ObjectType,
        object_id: impl Into<String>,
        entries: Vec<AccessControlEntry>,
    ) -> Result<Self, ValidationError> {
        ensure_unique_principals(&entries)?;
        Ok(Self {
            object_type,
            object_id: object_id.into(),
            entries,
        })
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn entries(&self) -> &[AccessControlEntry] {
        &self.entries
    }

    pub fn to_wire(&self) -> serde_json::Value {
        let entries: Vec<_> = self.entries.iter().map(AccessControlEntry::to_wire).collect();
        serde_json::json!({ "access_control_list": entries })
    }
}

/// Normalized grant returned by every permission query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Grant {
    pub principal: String,
    pub permission_level: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inherited: bool,
}

impl Grant {
    pub fn direct(principal: impl Into<String>, permission_level: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            permission_level: permission_level.into(),
            inherited: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct NormalizedAcl {
    pub access_control_list: Vec<Grant>,
}

impl From<&AccessControlList> for NormalizedAcl {
    fn from(acl: &AccessControlList) -> Self {
        Self {
            access_control_list: acl
                .entries
                .iter()
                .map(|e| Grant::direct(e.principal.name(), e.permission_level.clone()))
                .collect(),
        }
    }
}

/// Checks principal cardinality and permission-level membership for one entry.
pub fn validate(
    entry: &AccessControlEntryParams,
    object_type: ObjectType,
) -> Result<AccessControlEntry, ValidationError> {
    let mut principals = Vec::new();
    if let Some(name) = &entry.user_name {
        principals.push(Principal::User(name.trim().to_string()));
    }
    if let Some(name) = &entry.group_name {
        principals.push(Principal::Group(name.trim().to_string()));
    }
    if let Some(name) = &entry.service_principal_name {
        principals.push(Principal::ServicePrincipal(name.trim().to_string()));
    }

    let principal = match principals.len() {
        1 => principals.remove(0),
        0 => {
            return Err(ValidationError::new(
                ValidationReason::AmbiguousPrincipal,
                "entry names no principal; set exactly one of user_name, group_name, service_principal_name",
            ));
        }
        _ => {
            let named: Vec<_> = principals.iter().map(Principal::wire_field).collect();
            return Err(ValidationError::new(
                ValidationReason::AmbiguousPrincipal,
                format!(
                    "entry names more than one principal ({}); set exactly one",
                    named.join(", ")
                ),
            ));
        }
    };
    if principal.name().is_empty() {
        return Err(ValidationError::new(
            ValidationReason::AmbiguousPrincipal,
            format!("{} must not be empty", principal.wire_field()),
        ));
    }

    let levels = object_type.permission_levels();
    if !levels.contains(&entry.permission_level.as_str()) {
        return Err(ValidationError::new(
            ValidationReason::UnknownPermissionLevel,
            format!(
                "unknown permission level '{}' for {}; expected one of {}",
                entry.permission_level,
                object_type,
                levels.join(", ")
            ),
        ));
    }

    Ok(AccessControlEntry::new(principal, entry.permission_level.clone()))
}

/// Validates every entry and rejects lists that name a principal twice.
pub fn validate_all(
    entries: &[AccessControlEntryParams],
    object_type: ObjectType,
) -> Result<Vec<AccessControlEntry>, ValidationError> {
    let validated = entries
        .iter()
        .map(|entry| validate(entry, object_type))
        .collect::<Result<Vec<_>, _>>()?;
    ensure_unique_principals(&validated)?;
    Ok(validated)
}

fn ensure_unique_principals(entries: &[AccessControlEntry]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(&entry.principal) {
            return Err(ValidationError::new(
                ValidationReason::DuplicatePrincipal,
                format!("principal '{}' appears more than once", entry.principal),
            ));
        }
    }
    Ok(())
}

/// Replaces entries whose principal appears in `incoming` and appends the rest.
///
/// Untouched entries keep their relative order; appended entries follow in
/// the order supplied. Applying the same `incoming` twice is a no-op.
pub fn merge(existing: &AccessControlList, incoming: &[AccessControlEntry]) -> AccessControlList {
    let mut entries = existing.entries.clone();
    for entry in incoming {
        match entries.iter_mut().find(|e| e.principal == entry.principal) {
            Some(slot) => *slot = entry.clone(),
            None => entries.push(entry.clone()),
        }
    }
    AccessControlList {
        object_type: existing.object_type,
        object_id: existing.object_id.clone(),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, level: &str) -> AccessControlEntry {
        AccessControlEntry::new(Principal::User(name.to_string()), level)
    }

    fn group(name: &str, level: &str) -> AccessControlEntry {
        AccessControlEntry::new(Principal::Group(name.to_string()), level)
    }

    fn acl(entries: Vec<AccessControlEntry>) -> AccessControlList {
        AccessControlList::new(ObjectType::Clusters, "0123-456789-abc", entries).unwrap()
    }

    #[test]
    fn test_validate_rejects_missing_principal_for_every_type() {
        for object_type in ObjectType::ALL {
            let entry = AccessControlEntryParams {
                permission_level: object_type.permission_levels()[0].to_string(),
                ..Default::default()
            };
            let err = validate(&entry, object_type).unwrap_err();
            assert_eq!(err.reason, ValidationReason::AmbiguousPrincipal);
        }
    }

    #[test]
    fn test_validate_rejects_multiple_principals_for_every_type() {
        for object_type in ObjectType::ALL {
            let entry = AccessControlEntryParams {
                user_name: Some("a@x.com".to_string()),
                group_name: Some("admins".to_string()),
                permission_level: object_type.permission_levels()[0].to_string(),
                ..Default::default()
            };
            let err = validate(&entry, object_type).unwrap_err();
            assert_eq!(err.reason, ValidationReason::AmbiguousPrincipal);

            let entry = AccessControlEntryParams {
                user_name: Some("a@x.com".to_string()),
                group_name: Some("admins".to_string()),
                service_principal_name: Some("6f1a-app".to_string()),
                permission_level: object_type.permission_levels()[0].to_string(),
            };
            let err = validate(&entry, object_type).unwrap_err();
            assert_eq!(err.reason, ValidationReason::AmbiguousPrincipal);
        }
    }

    #[test]
    fn test_validate_counts_blank_principal_fields() {
        let entry = AccessControlEntryParams {
            user_name: Some(String::new()),
            group_name: Some("data-eng".to_string()),
            permission_level: "CAN_RESTART".to_string(),
            ..Default::default()
        };
        let err = validate(&entry, ObjectType::Clusters).unwrap_err();
        assert_eq!(err.reason, ValidationReason::AmbiguousPrincipal);
    }

    #[test]
    fn test_validate_rejects_single_blank_principal() {
        let entry = AccessControlEntryParams {
            group_name: Some("  ".to_string()),
            permission_level: "CAN_RESTART".to_string(),
            ..Default::default()
        };
        let err = validate(&entry, ObjectType::Clusters).unwrap_err();
        assert_eq!(err.reason, ValidationReason::AmbiguousPrincipal);
        assert!(err.message.contains("group_name"));
    }

    #[test]
    fn test_validate_trims_principal_name() {
        let entry = AccessControlEntryParams {
            group_name: Some(" data-eng ".to_string()),
            permission_level: "CAN_RESTART".to_string(),
            ..Default::default()
        };
        let validated = validate(&entry, ObjectType::Clusters).unwrap();
        assert_eq!(validated.principal(), &Principal::Group("data-eng".to_string()));
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let entry = AccessControlEntryParams {
            user_name: Some("a@x.com".to_string()),
            permission_level: "CAN_MANGE".to_string(),
            ..Default::default()
        };
        let err = validate(&entry, ObjectType::Clusters).unwrap_err();
        assert_eq!(err.reason, ValidationReason::UnknownPermissionLevel);
        assert!(err.message.contains("CAN_MANGE"));

        // valid for jobs, not for clusters
        let entry = AccessControlEntryParams {
            user_name: Some("a@x.com".to_string()),
            permission_level: "CAN_MANAGE_RUN".to_string(),
            ..Default::default()
        };
        assert!(validate(&entry, ObjectType::Jobs).is_ok());
        assert!(validate(&entry, ObjectType::Clusters).is_err());
    }

    #[test]
    fn test_validate_all_rejects_duplicate_principals() {
        let entries = vec![
            AccessControlEntryParams {
                user_name: Some("a@x.com".to_string()),
                permission_level: "CAN_VIEW".to_string(),
                ..Default::default()
            },
            AccessControlEntryParams {
                user_name: Some("a@x.com".to_string()),
                permission_level: "CAN_MANAGE".to_string(),
                ..Default::default()
            },
        ];
        let err = validate_all(&entries, ObjectType::Jobs).unwrap_err();
        assert_eq!(err.reason, ValidationReason::DuplicatePrincipal);
    }

    #[test]
    fn test_aliases_deserialize() {
        let entry: AccessControlEntryParams = serde_json::from_value(serde_json::json!({
            "user_email": "a@x.com",
            "permission_level": "CAN_USE"
        }))
        .unwrap();
        assert_eq!(entry.user_name.as_deref(), Some("a@x.com"));

        let entry: AccessControlEntryParams = serde_json::from_value(serde_json::json!({
            "service_principal_id": "9f0c-app",
            "permission_level": "CAN_USE"
        }))
        .unwrap();
        assert_eq!(entry.service_principal_name.as_deref(), Some("9f0c-app"));
    }

    #[test]
    fn test_object_type_accepts_platform_spellings() {
        let parsed: ObjectType = serde_json::from_str("\"sql/warehouses\"").unwrap();
        assert_eq!(parsed, ObjectType::Warehouses);
        let parsed: ObjectType = serde_json::from_str("\"registered-models\"").unwrap();
        assert_eq!(parsed, ObjectType::RegisteredModels);
        assert!(serde_json::from_str::<ObjectType>("\"pipelines\"").is_err());
    }

    #[test]
    fn test_merge_replaces_by_principal_and_appends() {
        let existing = acl(vec![
            user("a@x.com", "CAN_ATTACH_TO"),
            group("admins", "CAN_MANAGE"),
            user("b@x.com", "CAN_RESTART"),
        ]);
        let incoming = vec![user("b@x.com", "CAN_MANAGE"), user("c@x.com", "CAN_ATTACH_TO")];

        let merged = merge(&existing, &incoming);
        assert_eq!(
            merged.entries(),
            &[
                user("a@x.com", "CAN_ATTACH_TO"),
                group("admins", "CAN_MANAGE"),
                user("b@x.com", "CAN_MANAGE"),
                user("c@x.com", "CAN_ATTACH_TO"),
            ]
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = acl(vec![user("a@x.com", "CAN_ATTACH_TO"), group("admins", "CAN_MANAGE")]);
        let incoming = vec![group("admins", "CAN_RESTART"), user("z@x.com", "CAN_MANAGE")];

        let once = merge(&existing, &incoming);
        let twice = merge(&once, &incoming);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_preserves_untouched_order() {
        let existing = acl(vec![
            user("d@x.com", "CAN_MANAGE"),
            user("a@x.com", "CAN_RESTART"),
            user("c@x.com", "CAN_ATTACH_TO"),
        ]);
        let incoming = vec![user("a@x.com", "CAN_MANAGE")];

        let merged = merge(&existing, &incoming);
        let untouched: Vec<_> = merged
            .entries()
            .iter()
            .filter(|e| e.principal().name() != "a@x.com")
            .map(|e| e.principal().name().to_string())
            .collect();
        assert_eq!(untouched, vec!["d@x.com", "c@x.com"]);
    }

    #[test]
    fn test_same_name_different_kind_is_distinct() {
        let existing = acl(vec![user("ops", "CAN_RESTART")]);
        let merged = merge(&existing, &[group("ops", "CAN_MANAGE")]);
        assert_eq!(merged.entries().len(), 2);
    }

    #[test]
    fn test_wire_shape() {
        let list = acl(vec![user("a@x.com", "CAN_MANAGE"), group("admins", "CAN_RESTART")]);
        assert_eq!(
            list.to_wire(),
            serde_json::json!({
                "access_control_list": [
                    {"user_name": "a@x.com", "permission_level": "CAN_MANAGE"},
                    {"group_name": "admins", "permission_level": "CAN_RESTART"}
                ]
            })
        );
    }
}
