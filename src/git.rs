//! # Git Integration
//!
//! Connects workspaces to a source-control repository and keeps their content
//! in step with the remote branch, through the platform's `git/*` REST
//! endpoints.
//!
//! ## Handshake
//!
//! A workspace moves through
//! `Unconnected → Connected → Initialized → (optional) Disconnected`:
//!
//! 1. **Connect** (`git/connect`), then poll `git/connection` until the state
//!    is no longer `NotConnected`.
//! 2. **Initialize** (`git/initializeConnection`), which reports the
//!    `requiredAction` and the remote commit hash.
//! 3. **Update** (`git/updateFromGit`) with conflicts resolved in favour of
//!    the remote. A `202` hands over to the [`OperationPoller`].
//! 4. **Disconnect** for layers that only seed content once.
//!
//! A workspace left connected but not initialized by an earlier failed run
//! is not repaired here: the Git state is only inspected by
//! [`GitIntegration::synchronize`].

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::client::{ApiRequest, FabricClient};
use crate::config::GitSettings;
use crate::error::Result;
use crate::operations::OperationPoller;
use crate::retry::{poll, Poll};
use crate::transport::Transport;

/// Body of a successful `git/initializeConnection`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    #[serde(default)]
    pub required_action: Option<String>,
    #[serde(default)]
    pub remote_commit_hash: Option<String>,
    #[serde(default)]
    pub workspace_head: Option<String>,
}

impl InitializeResponse {
    /// Remote hash to update from, when initialization asks for an update.
    pub fn update_target(&self) -> Option<&str> {
        match self.required_action.as_deref() {
            Some("None") => None,
            _ => self.remote_commit_hash.as_deref().filter(|h| !h.is_empty()),
        }
    }
}

/// Body of `git/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    #[serde(default)]
    pub workspace_head: Option<String>,
    #[serde(default)]
    pub remote_commit_hash: Option<String>,
    #[serde(default)]
    pub changes: Vec<JsonValue>,
}

impl GitStatus {
    /// The workspace head equals the remote commit.
    pub fn is_up_to_date(&self) -> bool {
        self.workspace_head == self.remote_commit_hash
    }
}

/// Result of [`GitIntegration::seed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The connection never left `NotConnected`; nothing else was attempted.
    ConnectionFailed,
    Seeded { updated: bool, disconnected: bool },
}

/// Result of [`GitIntegration::synchronize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No status could be read, e.g. the workspace is not connected.
    Unavailable,
    AlreadyUpToDate,
    /// Heads differ but the remote reports no changed items.
    NoChanges,
    Updated,
    Failed,
}

/// Git operations for workspaces, by workspace id.
pub struct GitIntegration<'a, T: Transport> {
    client: &'a FabricClient<T>,
}

impl<'a, T: Transport> GitIntegration<'a, T> {
    pub fn new(client: &'a FabricClient<T>) -> Self {
        Self { client }
    }

    /// Connect and wait for the connection to come up.
    ///
    /// Returns the `git/connection` body, or `None` when the state stayed
    /// `NotConnected` for the whole retry budget.
    pub fn connect(&self, workspace_id: &str, settings: &GitSettings) -> Result<Option<JsonValue>> {
        let body = serde_json::to_value(settings)?;
        let response = self
            .client
            .api_post(&format!("workspaces/{}/git/connect", workspace_id), Some(&body))?;
        log::debug!("git connect {}: {}", workspace_id, response.status_code);

        let path = format!("workspaces/{}/git/connection", workspace_id);
        Ok(poll(self.client.timings().git_connection, |_| {
            match self.client.api_get(&path) {
                Ok(response) => {
                    let state = response.text_str("gitConnectionState").map(str::to_string);
                    match state.as_deref() {
                        Some("NotConnected") => Poll::Pending,
                        Some(_) => Poll::Ready(response.text),
                        None => Poll::Abort,
                    }
                }
                Err(e) => {
                    log::warn!("git connection state of {}: {}", workspace_id, e);
                    Poll::Abort
                }
            }
        }))
    }

    /// Initialize the connection; `None` unless the call returns 200.
    pub fn initialize(&self, workspace_id: &str) -> Result<Option<InitializeResponse>> {
        let response = self.client.api_post(
            &format!("workspaces/{}/git/initializeConnection", workspace_id),
            None,
        )?;
        if response.status_code != 200 {
            log::warn!(
                "git initialize {} returned {}",
                workspace_id,
                response.status_code
            );
            return Ok(None);
        }
        Ok(serde_json::from_value(response.text).ok())
    }

    /// Update the workspace to `remote_commit_hash`, preferring remote content.
    pub fn update_from_remote(
        &self,
        workspace_id: &str,
        remote_commit_hash: &str,
    ) -> Result<Option<JsonValue>> {
        let body = update_request(remote_commit_hash);
        let path = format!("workspaces/{}/git/updateFromGit", workspace_id);
        let response = self
            .client
            .api(ApiRequest::post(&path).body(&body).show_headers())?;

        if response.status_code == 202 {
            return Ok(match response.header("x-ms-operation-id") {
                Some(operation_id) => OperationPoller::new(self.client).await_terminal(operation_id),
                None => {
                    log::warn!("update of {} accepted without operation id", workspace_id);
                    None
                }
            });
        }
        if response.is_success() {
            Ok(Some(response.text))
        } else {
            log::warn!(
                "update of {} from git returned {}",
                workspace_id,
                response.status_code
            );
            Ok(None)
        }
    }

    pub fn disconnect(&self, workspace_id: &str) -> Result<bool> {
        let response = self
            .client
            .api_post(&format!("workspaces/{}/git/disconnect", workspace_id), None)?;
        Ok(response.status_code == 200)
    }

    /// Current Git status; `None` unless the call returns 200.
    pub fn status(&self, workspace_id: &str) -> Result<Option<GitStatus>> {
        let response = self
            .client
            .api_get(&format!("workspaces/{}/git/status", workspace_id))?;
        if response.status_code != 200 {
            return Ok(None);
        }
        Ok(serde_json::from_value(response.text).ok())
    }

    /// Connect, initialize, pull remote content and optionally detach.
    pub fn seed(
        &self,
        workspace_id: &str,
        settings: &GitSettings,
        disconnect_after: bool,
    ) -> Result<SeedOutcome> {
        if self.connect(workspace_id, settings)?.is_none() {
            return Ok(SeedOutcome::ConnectionFailed);
        }
        let mut updated = false;
        if let Some(init) = self.initialize(workspace_id)? {
            if let Some(hash) = init.update_target() {
                updated = self.update_from_remote(workspace_id, hash)?.is_some();
            }
        }
        let disconnected = disconnect_after && self.disconnect(workspace_id)?;
        Ok(SeedOutcome::Seeded {
            updated,
            disconnected,
        })
    }

    /// Bring a connected workspace up to the remote head.
    ///
    /// With `require_changes`, an empty change list also counts as a no-op.
    pub fn synchronize(&self, workspace_id: &str, require_changes: bool) -> Result<SyncOutcome> {
        let status = match self.status(workspace_id)? {
            Some(status) => status,
            None => return Ok(SyncOutcome::Unavailable),
        };
        if status.is_up_to_date() {
            return Ok(SyncOutcome::AlreadyUpToDate);
        }
        if require_changes && status.changes.is_empty() {
            return Ok(SyncOutcome::NoChanges);
        }
        let hash = match status.remote_commit_hash.as_deref() {
            Some(hash) => hash,
            None => return Ok(SyncOutcome::Unavailable),
        };
        Ok(match self.update_from_remote(workspace_id, hash)? {
            Some(_) => SyncOutcome::Updated,
            None => SyncOutcome::Failed,
        })
    }
}

fn update_request(remote_commit_hash: &str) -> JsonValue {
    json!({
        "remoteCommitHash": remote_commit_hash,
        "conflictResolution": {
            "conflictResolutionType": "Workspace",
            "conflictResolutionPolicy": "PreferRemote"
        },
        "options": {
            "allowOverrideItems": true
        }
    })
}
