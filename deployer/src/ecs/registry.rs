//! Build and publish images to ECR.

use super::EcrOperation;
use crate::Error;
use aws_config::SdkConfig;
use aws_sdk_ecr::Client as EcrClient;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::process::Stdio;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, info};

/// Environment variable holding the commit being built in CI
pub const COMMIT_VARIABLE: &str = "GITHUB_SHA";

/// Credentials for `docker login`.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decodes an ECR authorization token (`base64(username:password)`).
pub fn decode_token(token: &str) -> Result<Credentials, Error> {
    let decoded = STANDARD.decode(token.trim())?;
    let decoded = String::from_utf8(decoded).map_err(|_| Error::InvalidAuthorizationToken)?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or(Error::InvalidAuthorizationToken)?;
    if username.is_empty() || password.is_empty() {
        return Err(Error::InvalidAuthorizationToken);
    }
    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// ECR registry operations.
pub struct Registry {
    client: EcrClient,
}

impl Registry {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: EcrClient::new(config),
        }
    }

    /// Fetches short-lived credentials for the account's registry.
    pub async fn credentials(&self) -> Result<Credentials, Error> {
        let output = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| Error::AwsEcr {
                operation: EcrOperation::GetAuthorizationToken,
                source: Box::new(aws_sdk_ecr::Error::from(e.into_service_error())),
            })?;
        let token = output
            .authorization_data()
            .first()
            .and_then(|d| d.authorization_token())
            .ok_or(Error::InvalidAuthorizationToken)?;
        decode_token(token)
    }

    /// Lists every tag in the repository `name`.
    pub async fn tags(&self, name: &str) -> Result<Vec<String>, Error> {
        let mut tags = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .list_images()
                .repository_name(name)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| Error::AwsEcr {
                    operation: EcrOperation::ListImages,
                    source: Box::new(aws_sdk_ecr::Error::from(e.into_service_error())),
                })?;
            tags.extend(
                output
                    .image_ids()
                    .iter()
                    .filter_map(|id| id.image_tag())
                    .map(String::from),
            );
            next_token = output.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }
        debug!(repository = name, count = tags.len(), "listed image tags");
        Ok(tags)
    }
}

/// Runs `docker` with `args`, failing on a non-zero exit.
async fn docker(args: &[&str]) -> Result<(), Error> {
    debug!(?args, "running docker");
    let status = Command::new("docker").args(args).status().await?;
    if !status.success() {
        return Err(Error::CommandFailed(format!("docker {}", args.join(" "))));
    }
    Ok(())
}

/// Logs the local docker daemon into `registry`.
///
/// The password is written to stdin so it never appears in the process list or logs.
pub async fn login(registry: &str, credentials: &Credentials) -> Result<(), Error> {
    let mut child = Command::new("docker")
        .args([
            "login",
            "--username",
            credentials.username.as_str(),
            "--password-stdin",
            registry,
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(credentials.password.as_bytes()).await?;
    }
    let status = child.wait().await?;
    if !status.success() {
        return Err(Error::CommandFailed(format!("docker login {registry}")));
    }
    info!(registry, "logged in to registry");
    Ok(())
}

/// Builds `context` and tags the result as `image`.
pub async fn build(context: &str, dockerfile: Option<&str>, image: &str) -> Result<(), Error> {
    let mut args = vec!["build", "--tag", image];
    if let Some(dockerfile) = dockerfile {
        args.extend(["--file", dockerfile]);
    }
    args.push(context);
    docker(&args).await?;
    info!(image, context, "built image");
    Ok(())
}

pub async fn tag(source: &str, target: &str) -> Result<(), Error> {
    docker(&["tag", source, target]).await
}

pub async fn push(image: &str) -> Result<(), Error> {
    docker(&["push", image]).await?;
    info!(image, "pushed image");
    Ok(())
}

/// Picks the commit to tag a build with: `explicit`, then [COMMIT_VARIABLE], then the
/// checked out `HEAD`.
pub async fn resolve_commit(explicit: Option<&str>) -> Result<String, Error> {
    if let Some(commit) = explicit {
        return Ok(commit.to_string());
    }
    if let Ok(commit) = std::env::var(COMMIT_VARIABLE) {
        if !commit.trim().is_empty() {
            return Ok(commit);
        }
    }
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .stderr(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::CommandFailed("git rev-parse HEAD".to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
