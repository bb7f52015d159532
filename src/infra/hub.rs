// ============================================================
// Layer 6 — Hub Publisher
// ============================================================
// Uploads the model card and checkpoint files to a model-hub
// repository through the hub REST API:
//
//   POST {api}/repos/create                          create (409 = exists)
//   PUT  {api}/models/{repo_id}/upload/main/{path}   upload one file
//
// The access token comes from HUB_TOKEN, read at the CLI
// boundary. A missing token is reported when publishing is
// attempted and is never retried.

use std::path::Path;

const HUB_API_BASE: &str = "https://huggingface.co/api";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publishing requires an access token: set HUB_TOKEN")]
    AuthRequired,

    #[error("Invalid repository ID '{repo_id}': must be 'owner/name'")]
    InvalidRepoId { repo_id: String },

    #[error("Failed to create repository '{repo_id}': {message}")]
    RepoCreationFailed { repo_id: String, message: String },

    #[error("Failed to upload '{path}': {message}")]
    UploadFailed { path: String, message: String },

    #[error("HTTP error: {message}")]
    Http { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a run publishes to. The token stays optional until a
/// publisher is actually built.
#[derive(Clone)]
pub struct HubTarget {
    pub repo_id: String,
    pub token:   Option<String>,
}

impl HubTarget {
    pub fn new(namespace: &str, model_id: &str, token: Option<String>) -> Self {
        Self { repo_id: format!("{namespace}/{model_id}"), token }
    }
}

impl std::fmt::Debug for HubTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubTarget")
            .field("repo_id", &self.repo_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct HubPublisher {
    repo_id: String,
    token:   String,
    client:  reqwest::blocking::Client,
    created: bool,
}

impl HubPublisher {
    pub fn new(target: &HubTarget) -> Result<Self, PublishError> {
        let token = target
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(PublishError::AuthRequired)?;

        validate_repo_id(&target.repo_id)?;

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("kc-regularizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Http { message: format!("Failed to create HTTP client: {e}") })?;

        Ok(Self { repo_id: target.repo_id.clone(), token, client, created: false })
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Create the repository once; an existing repository is fine.
    pub fn ensure_repo(&mut self) -> Result<(), PublishError> {
        if self.created {
            return Ok(());
        }
        let (namespace, name) = split_repo_id(&self.repo_id)?;
        let body = serde_json::json!({
            "name": name,
            "organization": namespace,
            "type": "model",
            "private": false,
        });

        let response = self
            .client
            .post(format!("{HUB_API_BASE}/repos/create"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|e| PublishError::Http { message: format!("Create repo request failed: {e}") })?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 409 {
            tracing::info!("Hub repository '{}' ready", self.repo_id);
            self.created = true;
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            Err(PublishError::RepoCreationFailed {
                repo_id: self.repo_id.clone(),
                message: format!("HTTP {status}: {body}"),
            })
        }
    }

    pub fn upload_file(&mut self, local_path: &Path, path_in_repo: &str) -> Result<(), PublishError> {
        let content = std::fs::read(local_path)?;
        self.upload_bytes(&content, path_in_repo)
    }

    pub fn upload_bytes(&mut self, content: &[u8], path_in_repo: &str) -> Result<(), PublishError> {
        self.ensure_repo()?;
        let url = format!("{HUB_API_BASE}/models/{}/upload/main/{}", self.repo_id, path_in_repo);

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/octet-stream")
            .body(content.to_vec())
            .send()
            .map_err(|e| PublishError::UploadFailed {
                path:    path_in_repo.to_string(),
                message: format!("Upload request failed: {e}"),
            })?;

        if response.status().is_success() {
            tracing::debug!("Uploaded '{}' to '{}'", path_in_repo, self.repo_id);
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            Err(PublishError::UploadFailed {
                path:    path_in_repo.to_string(),
                message: format!("HTTP {status}: {body}"),
            })
        }
    }
}

fn split_repo_id(repo_id: &str) -> Result<(&str, &str), PublishError> {
    match repo_id.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((namespace, name))
        }
        _ => Err(PublishError::InvalidRepoId { repo_id: repo_id.to_string() }),
    }
}

fn validate_repo_id(repo_id: &str) -> Result<(), PublishError> {
    split_repo_id(repo_id).map(|_| ())
}

/// `imdb-{model}-a{⌊α⌋}b{⌊β⌋}l{λ}`; a namespace prefix of the
/// model name is dropped.
pub fn regularized_model_id(model: &str, alpha: f64, beta: f64, lambda: f64) -> String {
    format!(
        "imdb-{}-a{}b{}l{}",
        short_name(model),
        alpha.trunc() as i64,
        beta.trunc() as i64,
        float_label(lambda),
    )
}

// Whole numbers keep one decimal ("1.0"), like the published ids.
fn float_label(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// `{base_model}-adviter`
pub fn adviter_model_id(base_model: &str) -> String {
    format!("{}-adviter", short_name(base_model))
}

fn short_name(model: &str) -> &str {
    let trimmed = model.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_is_auth_error() {
        let target = HubTarget::new("someone", "imdb-model", None);
        assert!(matches!(HubPublisher::new(&target), Err(PublishError::AuthRequired)));

        let blank = HubTarget::new("someone", "imdb-model", Some("  ".into()));
        assert!(matches!(HubPublisher::new(&blank), Err(PublishError::AuthRequired)));
    }

    #[test]
    fn test_repo_id_needs_owner_and_name() {
        assert!(split_repo_id("owner/name").is_ok());
        assert!(split_repo_id("name").is_err());
        assert!(split_repo_id("/name").is_err());
        assert!(split_repo_id("a/b/c").is_err());
    }

    #[test]
    fn test_model_ids_follow_naming_scheme() {
        assert_eq!(regularized_model_id("bert-base-uncased", 2.7, 1.0, 0.01), "imdb-bert-base-uncased-a2b1l0.01");
        assert_eq!(regularized_model_id("org/gpt2", 1.0, 1.0, 1.0), "imdb-gpt2-a1b1l1.0");
        assert_eq!(adviter_model_id("runs/distilbert/"), "distilbert-adviter");
    }

    #[test]
    fn test_debug_redacts_token() {
        let target = HubTarget::new("owner", "name", Some("secret".into()));
        assert!(!format!("{target:?}").contains("secret"));
    }
}
