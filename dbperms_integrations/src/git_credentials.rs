use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result, ValidationError, ValidationReason};
use crate::params::flexible_id;
use crate::transport::{ApiRequest, Transport, decode};

const GIT_CREDENTIALS_ENDPOINT: &str = "/api/2.0/git-credentials";

/// Providers accepted by the git-credentials API, in their canonical spelling.
pub const GIT_PROVIDERS: &[&str] = &[
    "gitHub",
    "gitHubEnterprise",
    "bitbucketCloud",
    "bitbucketServer",
    "gitLab",
    "gitLabEnterpriseEdition",
    "azureDevOpsServices",
    "awsCodeCommit",
];

fn canonical_provider(provider: &str) -> Result<&'static str> {
    let provider = provider.trim();
    GIT_PROVIDERS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(provider))
        .copied()
        .ok_or_else(|| {
            ValidationError::new(
                ValidationReason::UnsupportedValue,
                format!(
                    "unknown git provider '{}'; expected one of {}",
                    provider,
                    GIT_PROVIDERS.join(", ")
                ),
            )
            .into()
        })
}

#[derive(Clone, Deserialize, Serialize, JsonSchema)]
pub struct CreateGitCredentialArgs {
    /// gitHub, gitHubEnterprise, bitbucketCloud, bitbucketServer, gitLab, gitLabEnterpriseEdition, azureDevOpsServices, awsCodeCommit
    pub git_provider: String,
    pub git_username: String,
    pub personal_access_token: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Deserialize, Serialize, JsonSchema)]
pub struct UpdateGitCredentialArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub credential_id: String,
    #[serde(default)]
    pub git_provider: Option<String>,
    #[serde(default)]
    pub git_username: Option<String>,
    #[serde(default)]
    pub personal_access_token: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DeleteGitCredentialArgs {
    #[serde(deserialize_with = "flexible_id")]
    pub credential_id: String,
}

// Token-bearing args must never reach a log line through `{:?}`.
impl fmt::Debug for CreateGitCredentialArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateGitCredentialArgs")
            .field("git_provider", &self.git_provider)
            .field("git_username", &self.git_username)
            .field("personal_access_token", &"[redacted]")
            .field("comment", &self.comment)
            .finish()
    }
}

impl fmt::Debug for UpdateGitCredentialArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateGitCredentialArgs")
            .field("credential_id", &self.credential_id)
            .field("git_provider", &self.git_provider)
            .field("git_username", &self.git_username)
            .field(
                "personal_access_token",
                &self.personal_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("comment", &self.comment)
            .finish()
    }
}

/// A stored git credential. The token is write-only and has no field here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GitCredential {
    #[serde(deserialize_with = "flexible_id")]
    pub credential_id: String,
    #[serde(default)]
    pub git_provider: Option<String>,
    #[serde(default)]
    pub git_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GitCredentialList {
    pub credentials: Vec<GitCredential>,
}

#[derive(Debug, Default, Deserialize)]
struct ListResponse {
    #[serde(default)]
    credentials: Vec<GitCredential>,
}

fn credential_path(credential_id: &str) -> String {
    format!(
        "{}/{}",
        GIT_CREDENTIALS_ENDPOINT,
        urlencoding::encode(credential_id)
    )
}

#[derive(Clone)]
pub struct GitCredentialsApi {
    transport: Arc<dyn Transport>,
}

impl GitCredentialsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn list(&self) -> Result<GitCredentialList> {
        info!("Listing git credentials");
        let response = self
            .transport
            .send(ApiRequest::get(GIT_CREDENTIALS_ENDPOINT))
            .await?;
        let parsed: ListResponse = decode(response, "git credential list")?;
        Ok(GitCredentialList {
            credentials: parsed.credentials,
        })
    }

    pub async fn create(&self, args: &CreateGitCredentialArgs) -> Result<GitCredential> {
        let provider = canonical_provider(&args.git_provider)?;
        if args.git_username.trim().is_empty() {
            return Err(Error::invalid_params("git_username must not be empty"));
        }
        if args.personal_access_token.is_empty() {
            return Err(Error::invalid_params("personal_access_token must not be empty"));
        }
        info!(
            "Creating git credential for {} user {}",
            provider, args.git_username
        );

        let mut body = json!({
            "git_provider": provider,
            "git_username": args.git_username,
            "personal_access_token": args.personal_access_token,
        });
        if let Some(comment) = &args.comment {
            body["comment"] = json!(comment);
        }
        let response = self
            .transport
            .send(ApiRequest::post(GIT_CREDENTIALS_ENDPOINT).json(body))
            .await?;
        Ok(decode(response, "git credential")?)
    }

    pub async fn update(&self, args: &UpdateGitCredentialArgs) -> Result<Value> {
        let mut body = serde_json::Map::new();
        if let Some(provider) = &args.git_provider {
            body.insert(
                "git_provider".to_string(),
                canonical_provider(provider)?.into(),
            );
        }
        if let Some(username) = &args.git_username {
            body.insert("git_username".to_string(), username.clone().into());
        }
        if let Some(token) = &args.personal_access_token {
            body.insert("personal_access_token".to_string(), token.clone().into());
        }
        if let Some(comment) = &args.comment {
            body.insert("comment".to_string(), comment.clone().into());
        }
        if body.is_empty() {
            return Err(Error::invalid_params(
                "nothing to update; set git_provider, git_username, personal_access_token or comment",
            ));
        }
        info!("Updating git credential {}", args.credential_id);

        let response = self
            .transport
            .send(ApiRequest::patch(credential_path(&args.credential_id)).json(Value::Object(body)))
            .await?;
        match decode::<GitCredential>(response, "git credential") {
            Ok(credential) => Ok(json!(credential)),
            Err(_) => Ok(json!({"updated": true, "credential_id": args.credential_id})),
        }
    }

    pub async fn delete(&self, credential_id: &str) -> Result<Value> {
        info!("Deleting git credential {}", credential_id);
        self.transport
            .send(ApiRequest::delete(credential_path(credential_id)))
            .await?;
        Ok(json!({"deleted": true, "credential_id": credential_id}))
    }
}
