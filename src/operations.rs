//! Long-running operation polling.
//!
//! Asynchronous platform calls answer `202 Accepted` with an
//! `x-ms-operation-id` header. [`OperationPoller`] reads
//! `operations/<id>` until the operation reaches a terminal state.

use serde_json::Value as JsonValue;

use crate::client::FabricClient;
use crate::retry::{poll, Poll};
use crate::transport::Transport;

/// Status of a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    /// `Failed` or anything unrecognized.
    Other(String),
}

impl OperationStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "NotStarted" => OperationStatus::NotStarted,
            "Running" => OperationStatus::Running,
            "Succeeded" => OperationStatus::Succeeded,
            other => OperationStatus::Other(other.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OperationStatus::NotStarted | OperationStatus::Running)
    }
}

/// Polls `operations/<id>` with the client's operation retry policy.
pub struct OperationPoller<'a, T: Transport> {
    client: &'a FabricClient<T>,
}

impl<'a, T: Transport> OperationPoller<'a, T> {
    pub fn new(client: &'a FabricClient<T>) -> Self {
        Self { client }
    }

    /// Wait for the operation to finish.
    ///
    /// Returns the final payload on `Succeeded`. Any other terminal status, an
    /// unparsable response, or running out of attempts yields `None`.
    pub fn await_terminal(&self, operation_id: &str) -> Option<JsonValue> {
        let path = format!("operations/{}", operation_id);
        poll(self.client.timings().operation, |attempt| {
            let response = match self.client.api_get(&path) {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("operation {}: {}", operation_id, e);
                    return Poll::Abort;
                }
            };
            let status = response
                .text_str("status")
                .map(OperationStatus::parse)
                .unwrap_or_else(|| OperationStatus::Other(String::new()));
            log::debug!("operation {} attempt {}: {:?}", operation_id, attempt, status);
            match status {
                OperationStatus::Succeeded => Poll::Ready(response.text),
                s if s.is_pending() => Poll::Pending,
                _ => Poll::Abort,
            }
        })
    }
}
