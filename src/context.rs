//! Settings of one invocation.
//!
//! The command layer resolves flags and environment-variable fallbacks once
//! and hands a [`RunContext`] to the workflows. Nothing in the library reads
//! the process environment.

use std::fmt;
use std::path::PathBuf;

use crate::config::{GitProvider, ResourceLayout};
use crate::error::{Error, Result};
use crate::retry::Timings;

/// Service-principal credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Build from optional values, naming the first missing one.
    pub fn from_parts(
        tenant_id: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Self> {
        let missing = |name: &str, env: &str| {
            Error::config_with_hint(
                format!("missing {}", name),
                format!("Pass --{} or set {}", name.replace('_', "-"), env),
            )
        };
        Ok(Self {
            tenant_id: tenant_id
                .filter(|v| !v.is_empty())
                .ok_or_else(|| missing("tenant_id", "TENANT_ID"))?,
            client_id: client_id
                .filter(|v| !v.is_empty())
                .ok_or_else(|| missing("client_id", "CLIENT_ID"))?,
            client_secret: client_secret
                .filter(|v| !v.is_empty())
                .ok_or_else(|| missing("client_secret", "CLIENT_SECRET"))?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// The pipeline user a feature branch runs for.
///
/// Fills `{identity_id}` and `{identity_username}` in connection-name
/// templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub id: String,
    pub username: String,
}

/// Raw pipeline variables the identity is derived from.
#[derive(Debug, Clone, Default)]
pub struct PipelineVariables {
    pub github_actor: Option<String>,
    pub github_actor_id: Option<String>,
    pub requested_for_email: Option<String>,
    pub requested_for_id: Option<String>,
}

impl GitIdentity {
    /// GitHub: actor and actor id. Azure DevOps: upper-cased local part of the
    /// requester's e-mail and the requester id.
    pub fn resolve(provider: GitProvider, vars: &PipelineVariables) -> Option<Self> {
        match provider {
            GitProvider::GitHub => Some(Self {
                id: vars.github_actor_id.clone()?,
                username: vars.github_actor.clone()?,
            }),
            GitProvider::AzureDevOps => {
                let email = vars.requested_for_email.as_deref()?;
                let local = email.split('@').next().unwrap_or(email);
                Some(Self {
                    id: vars.requested_for_id.clone()?,
                    username: local.to_uppercase(),
                })
            }
        }
    }
}

/// Everything a workflow needs besides the loaded definitions.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub credentials: Credentials,
    /// Personal access token for GitHub source-control connections.
    pub github_pat: Option<String>,
    pub layout: ResourceLayout,
    /// Directory whose subfolders are deployable solution packages.
    pub solution_root: PathBuf,
    pub pipeline: PipelineVariables,
    pub timings: Timings,
}

impl RunContext {
    pub fn new(credentials: Credentials, layout: ResourceLayout) -> Self {
        let solution_root = layout.root().join("..").join("..").join("solution");
        Self {
            credentials,
            github_pat: None,
            layout,
            solution_root,
            pipeline: PipelineVariables::default(),
            timings: Timings::default(),
        }
    }

    pub fn with_solution_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.solution_root = root.into();
        self
    }

    pub fn with_github_pat(mut self, pat: Option<String>) -> Self {
        self.github_pat = pat.filter(|p| !p.is_empty());
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineVariables) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }
}
