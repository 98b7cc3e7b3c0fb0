//! Typed access to the `fab` CLI verbs.
//!
//! [`FabricClient`] turns the verbs the provisioner needs (`exists`, `get`,
//! `create`, `rm`, `set`, `acl set`, `config set`, `auth login` and the `api`
//! passthrough) into method calls over a [`Transport`]. Resource-specific
//! helpers live next to their domain: see [`crate::resources`],
//! [`crate::connections`] and [`crate::git`].

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use crate::context::Credentials;
use crate::error::{Error, Result};
use crate::naming::is_guid;
use crate::retry::{poll, Poll, Timings};
use crate::transport::Transport;

/// HTTP method of an `api` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Patch => "patch",
            Method::Delete => "delete",
        })
    }
}

/// One `api` passthrough call.
#[derive(Debug, Clone)]
pub struct ApiRequest<'a> {
    method: Method,
    path: &'a str,
    body: Option<&'a JsonValue>,
    show_headers: bool,
    audience: Option<&'a str>,
}

impl<'a> ApiRequest<'a> {
    pub fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            body: None,
            show_headers: false,
            audience: None,
        }
    }

    pub fn get(path: &'a str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: &'a str) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn body(mut self, body: &'a JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Ask the CLI to include response headers in the envelope.
    pub fn show_headers(mut self) -> Self {
        self.show_headers = true;
        self
    }

    /// Target another API audience, e.g. `powerbi`.
    pub fn audience(mut self, audience: &'a str) -> Self {
        self.audience = Some(audience);
        self
    }

    /// The CLI command line for this request.
    pub fn command_line(&self) -> String {
        let mut command = String::from("api");
        if let Some(audience) = self.audience {
            command.push_str(" -A ");
            command.push_str(audience);
        }
        command.push_str(&format!(" -X {} {}", self.method, self.path));
        if let Some(body) = self.body {
            command.push_str(" -i ");
            command.push_str(&body.to_string());
        }
        if self.show_headers {
            command.push_str(" --show_headers");
        }
        command
    }
}

/// The JSON envelope printed by `fab api`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub text: JsonValue,
}

impl ApiResponse {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// String field of the body.
    pub fn text_str(&self, field: &str) -> Option<&str> {
        self.text.get(field).and_then(JsonValue::as_str)
    }

    /// Render an envelope the way the CLI prints it.
    pub fn envelope(status_code: u16, text: JsonValue) -> String {
        serde_json::json!({ "status_code": status_code, "text": text }).to_string()
    }

    pub fn envelope_with_headers(
        status_code: u16,
        headers: &[(&str, &str)],
        text: JsonValue,
    ) -> String {
        let headers: serde_json::Map<String, JsonValue> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), JsonValue::String(v.to_string())))
            .collect();
        serde_json::json!({ "status_code": status_code, "headers": headers, "text": text })
            .to_string()
    }
}

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Created,
    AlreadyExisted,
}

impl Ensured {
    pub fn was_created(self) -> bool {
        self == Ensured::Created
    }
}

/// Parse the textual result of `exists`.
///
/// The CLI prints `true`/`false` decorated with `*` markers and in any case.
pub fn parse_exists(output: &str) -> bool {
    output.replace('*', "").trim().eq_ignore_ascii_case("true")
}

/// Whether command output carries the CLI's `x` failure marker.
pub fn is_failure_output(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.trim_start().starts_with("x "))
}

pub(crate) fn quote(path: &str) -> String {
    format!("'{}'", path)
}

/// CLI client over a transport.
pub struct FabricClient<T: Transport> {
    transport: T,
    timings: Timings,
}

impl<T: Transport> FabricClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timings: Timings::default(),
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Run a raw command line.
    pub fn run(&self, command: &str) -> Result<String> {
        self.transport.execute(command)
    }

    /// Configure the CLI and log in with a service principal.
    pub fn login(&self, credentials: &Credentials, folder_listing: bool) -> Result<()> {
        self.config_set("encryption_fallback_enabled", "true")?;
        if folder_listing {
            self.config_set("folder_listing_enabled", "true")?;
        }
        let output = self.run(&format!(
            "auth login -u {} -p {} --tenant {}",
            credentials.client_id, credentials.client_secret, credentials.tenant_id
        ))?;
        log::debug!("auth login: {}", output);
        Ok(())
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<String> {
        self.run(&format!("config set {} {}", key, value))
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(parse_exists(&self.run(&format!("exists {}", quote(path)))?))
    }

    /// `create <path> [-P k=v,...]`
    pub fn create(&self, path: &str, properties: &[(&str, String)]) -> Result<String> {
        let mut command = format!("create {}", quote(path));
        if !properties.is_empty() {
            let props: Vec<String> = properties
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            command.push_str(" -P ");
            command.push_str(&props.join(","));
        }
        self.run(&command)
    }

    /// Create `path` unless it already exists.
    pub fn ensure_created(&self, path: &str, properties: &[(&str, String)]) -> Result<Ensured> {
        if self.exists(path)? {
            log::debug!("{} already exists", path);
            return Ok(Ensured::AlreadyExisted);
        }
        let output = self.create(path, properties)?;
        log::debug!("create {}: {}", path, output);
        Ok(Ensured::Created)
    }

    pub fn remove(&self, path: &str) -> Result<String> {
        self.run(&format!("rm {} -f", quote(path)))
    }

    /// Fetch an item as JSON, retrying `retries` times on unparsable output.
    pub fn get_item(&self, path: &str, retries: u32) -> Result<Option<JsonValue>> {
        let command = format!("get {} -q . -f", quote(path));
        let mut failure = None;
        let value = poll(self.timings.item_lookup(retries), |_| {
            match self.run(&command) {
                Ok(output) => match serde_json::from_str::<JsonValue>(&output) {
                    Ok(value) if value.is_object() => Poll::Ready(value),
                    _ => Poll::Pending,
                },
                Err(e) => {
                    failure = Some(e);
                    Poll::Abort
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }

    /// Fetch an item's id, retrying `retries` times until a GUID comes back.
    pub fn get_item_id(&self, path: &str, retries: u32) -> Result<Option<String>> {
        let command = format!("get {} -q id -f", quote(path));
        let mut failure = None;
        let id = poll(self.timings.item_lookup(retries), |_| match self.run(&command) {
            Ok(output) => {
                let id = output.trim();
                if is_guid(id) {
                    Poll::Ready(id.to_string())
                } else {
                    Poll::Pending
                }
            }
            Err(e) => {
                failure = Some(e);
                Poll::Abort
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(id),
        }
    }

    /// `get <path> -q <query> -f`, trimmed.
    pub fn query(&self, path: &str, query: &str) -> Result<String> {
        Ok(self
            .run(&format!("get {} -q {} -f", quote(path), query))?
            .trim()
            .to_string())
    }

    pub fn set(&self, path: &str, query: &str, value: &str) -> Result<String> {
        self.run(&format!("set {} -q {} -i {} -f", quote(path), query, value))
    }

    /// Grant `role` on `path` to the principal `identity`.
    pub fn acl_set(&self, path: &str, identity: &str, role: &str) -> Result<String> {
        self.run(&format!(
            "acl set {} -I {} -R {} -f",
            quote(path),
            identity,
            role.to_lowercase()
        ))
    }

    /// Issue an `api` call and parse the envelope.
    pub fn api(&self, request: ApiRequest<'_>) -> Result<ApiResponse> {
        let command = request.command_line();
        let output = self.run(&command)?;
        ApiResponse::parse(&output).ok_or_else(|| Error::Transport {
            command: crate::transport::redact(&command),
            message: format!("unparsable API response: {}", truncate(&output, 200)),
        })
    }

    pub fn api_get(&self, path: &str) -> Result<ApiResponse> {
        self.api(ApiRequest::get(path))
    }

    pub fn api_post(&self, path: &str, body: Option<&JsonValue>) -> Result<ApiResponse> {
        let request = ApiRequest::post(path);
        match body {
            Some(body) => self.api(request.body(body)),
            None => self.api(request),
        }
    }

    /// Like [`FabricClient::api`], but a non-2xx status becomes [`Error::Api`].
    pub fn api_expect_success(&self, request: ApiRequest<'_>) -> Result<ApiResponse> {
        let method = request.method;
        let path = request.path.to_string();
        let response = self.api(request)?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(Error::Api {
                method: method.to_string(),
                path,
                status: response.status_code,
            })
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Timings;
    use crate::transport::ScriptedTransport;
    use serde_json::json;

    fn client(transport: ScriptedTransport) -> FabricClient<ScriptedTransport> {
        FabricClient::new(transport).with_timings(Timings::immediate())
    }

    #[test]
    fn test_parse_exists() {
        assert!(parse_exists("* true"));
        assert!(parse_exists("TRUE"));
        assert!(parse_exists("*True*\n"));
        assert!(!parse_exists("* false"));
        assert!(!parse_exists(""));
        assert!(!parse_exists("x [NotFound] missing"));
    }

    #[test]
    fn test_is_failure_output() {
        assert!(is_failure_output("x import: [InvalidDefinition] bad part"));
        assert!(is_failure_output("Importing...\n  x failed"));
        assert!(!is_failure_output("* Imported 'Load.Notebook'"));
        assert!(!is_failure_output(""));
    }

    #[test]
    fn test_api_command_line() {
        let body = json!({"a": 1});
        let request = ApiRequest::post("workspaces/1/git/updateFromGit")
            .body(&body)
            .show_headers();
        insta::assert_snapshot!(
            request.command_line(),
            @r#"api -X post workspaces/1/git/updateFromGit -i {"a":1} --show_headers"#
        );
        let takeover = ApiRequest::post("groups/w/datasets/d/Default.TakeOver").audience("powerbi");
        assert_eq!(
            takeover.command_line(),
            "api -A powerbi -X post groups/w/datasets/d/Default.TakeOver"
        );
    }

    #[test]
    fn test_api_response_envelope() {
        let raw = ApiResponse::envelope_with_headers(
            202,
            &[("x-ms-operation-id", "op-1")],
            json!(""),
        );
        let response = ApiResponse::parse(&raw).unwrap();
        assert_eq!(response.status_code, 202);
        assert_eq!(response.header("X-MS-Operation-Id"), Some("op-1"));
        assert!(response.is_success());
    }

    #[test]
    fn test_api_unparsable_is_transport_error() {
        let client = client(ScriptedTransport::new(|_, _| "x Unauthorized".to_string()));
        let err = client.api_get("workspaces").unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_api_expect_success() {
        let client = client(ScriptedTransport::new(|_, _| {
            ApiResponse::envelope(404, json!({"errorCode": "NotFound"}))
        }));
        let err = client
            .api_expect_success(ApiRequest::get("connections/x"))
            .unwrap_err();
        assert_eq!(err.to_string(), "API call get connections/x returned status 404");
    }

    #[test]
    fn test_ensure_created_twice_creates_once() {
        let client = client(ScriptedTransport::new(|command, history| {
            if command.starts_with("exists") {
                let created = history.iter().any(|c| c.starts_with("create"));
                if created { "* true" } else { "* false" }.to_string()
            } else {
                String::new()
            }
        }));
        let props = [("capacityname", "cap".to_string())];
        assert_eq!(
            client.ensure_created("WS.Workspace", &props).unwrap(),
            Ensured::Created
        );
        assert_eq!(
            client.ensure_created("WS.Workspace", &props).unwrap(),
            Ensured::AlreadyExisted
        );
        let creates = client.transport().calls_starting_with("create");
        assert_eq!(creates, vec!["create 'WS.Workspace' -P capacityname=cap"]);
    }

    #[test]
    fn test_get_item_retries_until_json() {
        let client = client(ScriptedTransport::new(|_, history| {
            if history.len() < 2 {
                "x NotFound".to_string()
            } else {
                json!({"id": "1"}).to_string()
            }
        }));
        let item = client.get_item("WS.Workspace/A.Lakehouse", 3).unwrap();
        assert_eq!(item, Some(json!({"id": "1"})));
        assert_eq!(client.transport().calls().len(), 3);
    }

    #[test]
    fn test_get_item_gives_up() {
        let client = client(ScriptedTransport::new(|_, _| "x NotFound".to_string()));
        assert_eq!(client.get_item("WS.Workspace/A.Lakehouse", 0).unwrap(), None);
        assert_eq!(client.transport().calls().len(), 1);
    }

    #[test]
    fn test_get_item_id_requires_guid() {
        let client = client(ScriptedTransport::new(|_, _| {
            "0b4ac1d2-4f1e-4a57-9e5f-1c2d3e4f5a6b\n".to_string()
        }));
        assert_eq!(
            client.get_item_id("WS.Workspace", 0).unwrap().as_deref(),
            Some("0b4ac1d2-4f1e-4a57-9e5f-1c2d3e4f5a6b")
        );

        let missing = client_missing();
        assert_eq!(missing.get_item_id("WS.Workspace", 2).unwrap(), None);
        assert_eq!(missing.transport().calls().len(), 3);
    }

    fn client_missing() -> FabricClient<ScriptedTransport> {
        client(ScriptedTransport::new(|_, _| "x [NotFound] Workspace not found".to_string()))
    }

    #[test]
    fn test_login_sequence() {
        let client = client(ScriptedTransport::new(|_, _| String::new()));
        let credentials = Credentials::new("tenant", "app", "secret");
        client.login(&credentials, true).unwrap();
        assert_eq!(
            client.transport().calls(),
            vec![
                "config set encryption_fallback_enabled true",
                "config set folder_listing_enabled true",
                "auth login -u app -p secret --tenant tenant",
            ]
        );
    }

    #[test]
    fn test_acl_set_lowercases_role() {
        let client = client(ScriptedTransport::new(|_, _| String::new()));
        client.acl_set("WS.Workspace", "g1", "Admin").unwrap();
        assert_eq!(
            client.transport().calls(),
            vec!["acl set 'WS.Workspace' -I g1 -R admin -f"]
        );
    }
}
