pub mod acl;
pub mod config;
pub mod error;
pub mod git_credentials;
pub mod params;
pub mod permissions;
pub mod service_principals;
pub mod shares;
pub mod transport;
pub mod unity_catalog;

#[cfg(test)]
pub(crate) mod test_support;

pub use acl::{
    AccessControlEntry, AccessControlEntryParams, AccessControlList, Grant, NormalizedAcl,
    ObjectType, Principal, merge, validate, validate_all,
};
pub use config::{DatabricksConfig, RetryPolicy};
pub use error::{
    ConfigError, Error, ErrorKind, Result, TransportError, ValidationError, ValidationReason,
};
pub use git_credentials::{
    CreateGitCredentialArgs, DeleteGitCredentialArgs, GitCredential, GitCredentialsApi,
    UpdateGitCredentialArgs,
};
pub use permissions::{
    CatalogPermissionsArgs, ClusterPermissionsArgs, JobPermissionsArgs, ObjectPermissionsArgs,
    PermissionLevelsArgs, PermissionsApi, SchemaPermissionsArgs, SetClusterPermissionsArgs,
    SetJobPermissionsArgs, SetObjectPermissionsArgs, SetWarehousePermissionsArgs,
    SetWorkspaceObjectPermissionsArgs, TablePermissionsArgs, WarehousePermissionsArgs,
    WorkspaceObjectPermissionsArgs,
};
pub use service_principals::{
    CreateServicePrincipalArgs, ListServicePrincipalsArgs, ServicePrincipal,
    ServicePrincipalIdArgs, ServicePrincipalsApi, UpdateServicePrincipalArgs,
};
pub use shares::{GetSharePermissionsArgs, SharesApi, UpdateSharePermissionsArgs};
pub use transport::{ApiRequest, DatabricksRestClient, Transport};
pub use unity_catalog::{
    CreateCredentialArgs, CreateStorageCredentialArgs, CredentialNameArgs,
    ListStorageCredentialsArgs, UnityCatalogApi, UpdateCredentialArgs,
    UpdateStorageCredentialArgs,
};

/// Empty argument object for tools that take no parameters.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
pub struct NoArgs {}
