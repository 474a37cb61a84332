// ubus JSON-RPC client
//
// Wraps `reqwest::Client` with the JSON-RPC 2.0 envelope uhttpd-mod-ubus
// speaks: `call` requests carry `[session, object, method, args]` and reply
// with `[status, data?]`. Object bindings (session, uci) live in sibling
// modules as inherent methods to keep this one about transport mechanics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{ACCESS_DENIED_CODE, Error};
use crate::status::UbusStatus;
use crate::transport::TransportConfig;
use crate::ubus::models::{JSONRPC_VERSION, RpcRequest, RpcResponse};
use crate::ubus::procedure::{PreparedCall, Procedure};

/// Session id rpcd treats as "not logged in". Only `session.login` and a
/// handful of public objects accept it.
pub const NULL_SESSION: &str = "00000000000000000000000000000000";

/// One `call` reply as interceptors see it, before it is unwrapped.
#[derive(Debug, Clone, Copy)]
pub struct CallReply<'a> {
    pub object: &'a str,
    pub method: &'a str,
    /// The raw `[status, data?]` result, absent when rpcd sent an error.
    pub result: Option<&'a Value>,
    /// JSON-RPC error code of the reply, if it carried one.
    pub error_code: Option<i64>,
}

type Interceptor = Arc<dyn Fn(&CallReply<'_>) + Send + Sync>;

/// Handle returned by [`UbusClient::add_interceptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

/// Raw HTTP client for a router's ubus JSON-RPC endpoint.
///
/// Holds the current rpcd session id and stamps it into every `call`.
/// Replies are unwrapped before the caller sees them: the `[status, data]`
/// pair becomes either the data value or an [`Error::Ubus`].
pub struct UbusClient {
    http: reqwest::Client,
    endpoint: Url,
    session: RwLock<String>,
    next_id: AtomicU64,
    interceptors: RwLock<Vec<(InterceptorId, Interceptor)>>,
    next_interceptor: AtomicU64,
}

impl UbusClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `endpoint` is the full ubus URL, usually `https://192.168.1.1/ubus`.
    pub fn new(endpoint: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, endpoint))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            session: RwLock::new(NULL_SESSION.to_owned()),
            next_id: AtomicU64::new(1),
            interceptors: RwLock::new(Vec::new()),
            next_interceptor: AtomicU64::new(1),
        }
    }

    /// The ubus endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The rpcd session id stamped into calls.
    pub fn session_id(&self) -> String {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the session id (e.g. one obtained out of band).
    pub fn set_session_id(&self, session: impl Into<String>) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session.into();
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ── Interceptors ─────────────────────────────────────────────────

    /// Register a callback that sees every `call` reply, batched or not,
    /// before it is turned into a value or an error.
    pub fn add_interceptor(
        &self,
        interceptor: impl Fn(&CallReply<'_>) + Send + Sync + 'static,
    ) -> InterceptorId {
        let id = InterceptorId(self.next_interceptor.fetch_add(1, Ordering::Relaxed));
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(interceptor)));
        id
    }

    /// Unregister an interceptor. Returns `false` if it was not registered.
    pub fn remove_interceptor(&self, id: InterceptorId) -> bool {
        let mut interceptors = self
            .interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = interceptors.len();
        interceptors.retain(|(registered, _)| *registered != id);
        interceptors.len() != before
    }

    fn intercept(&self, object: &str, method: &str, response: &RpcResponse) {
        // Snapshot the list so an interceptor may (un)register others.
        let interceptors: Vec<Interceptor> = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, interceptor)| Arc::clone(interceptor))
            .collect();
        if interceptors.is_empty() {
            return;
        }
        let reply = CallReply {
            object,
            method,
            result: response.result.as_ref(),
            error_code: response.error.as_ref().map(|e| e.code),
        };
        for interceptor in interceptors {
            interceptor(&reply);
        }
    }

    // ── Calls ────────────────────────────────────────────────────────

    /// Invoke `object.method` and return the raw status with the reply data.
    pub async fn call_status(
        &self,
        object: &str,
        method: &str,
        args: Value,
    ) -> Result<(UbusStatus, Option<Value>), Error> {
        let request = self.call_request(object, method, args);
        debug!(object, method, "ubus call");
        let body = self.post(&request).await?;
        let response = parse_body::<RpcResponse>(&body)?;
        self.intercept(object, method, &response);
        decode_call_response(response)
    }

    /// Invoke `object.method`, treating any non-zero status as an error.
    pub async fn call(&self, object: &str, method: &str, args: Value) -> Result<Value, Error> {
        let (status, data) = self.call_status(object, method, args).await?;
        if status.is_ok() {
            Ok(data.unwrap_or(Value::Null))
        } else {
            Err(Error::Ubus {
                object: object.to_owned(),
                method: method.to_owned(),
                status,
            })
        }
    }

    /// Invoke a declared procedure with positional arguments.
    pub async fn invoke(&self, procedure: &Procedure, values: Vec<Value>) -> Result<Value, Error> {
        let call = procedure.prepare(values);
        self.invoke_prepared(&call).await
    }

    pub(crate) async fn invoke_prepared(&self, call: &PreparedCall<'_>) -> Result<Value, Error> {
        let procedure = call.procedure;
        let (status, data) = self
            .call_status(
                procedure.object,
                procedure.method,
                Value::Object(call.args.clone()),
            )
            .await?;
        procedure.filter(status, data)
    }

    /// Send several prepared calls in a single HTTP request.
    ///
    /// The outer `Result` fails when the request as a whole fails; each
    /// inner `Result` is the filtered outcome of one call, in call order.
    pub async fn batch(&self, calls: &[PreparedCall<'_>]) -> Result<Vec<Result<Value, Error>>, Error> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<RpcRequest<'_>> = calls
            .iter()
            .map(|call| {
                self.call_request(
                    call.procedure.object,
                    call.procedure.method,
                    Value::Object(call.args.clone()),
                )
            })
            .collect();

        debug!(calls = requests.len(), "ubus batch");
        let body = self.post(&requests).await?;
        let mut responses = parse_body::<Vec<RpcResponse>>(&body)?;

        // Replies may arrive in any order; pair them back up by id.
        let mut outcomes = Vec::with_capacity(calls.len());
        for (call, request) in calls.iter().zip(&requests) {
            let position = responses
                .iter()
                .position(|r| r.id.as_ref().and_then(Value::as_u64) == Some(request.id));
            let outcome = match position {
                Some(index) => {
                    let response = responses.swap_remove(index);
                    self.intercept(call.procedure.object, call.procedure.method, &response);
                    decode_call_response(response)
                        .and_then(|(status, data)| call.procedure.filter(status, data))
                }
                None => Err(Error::Deserialization {
                    message: format!("missing reply for request id {}", request.id),
                    body: body.clone(),
                }),
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// List remote objects, or the method signatures of the named objects.
    pub async fn list(&self, objects: &[&str]) -> Result<Value, Error> {
        let params = if objects.is_empty() {
            json!(["*"])
        } else {
            json!(objects)
        };
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id(),
            method: "list",
            params,
        };
        debug!(?objects, "ubus list");
        let body = self.post(&request).await?;
        let response = parse_body::<RpcResponse>(&body)?;
        if let Some(err) = response.error {
            return Err(rpc_error(err.code, err.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn call_request<'a>(&self, object: &str, method: &str, args: Value) -> RpcRequest<'a> {
        RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id(),
            method: "call",
            params: json!([self.session_id(), object, method, args]),
        }
    }

    /// POST a JSON body to the endpoint and return the response text.
    async fn post(&self, body: &(impl Serialize + Sync)) -> Result<String, Error> {
        trace!("POST {}", self.endpoint);

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body: preview(&text).to_owned(),
            });
        }

        resp.text().await.map_err(Error::Transport)
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn rpc_error(code: i64, message: String) -> Error {
    if code == ACCESS_DENIED_CODE {
        warn!(code, "ubus access denied");
        Error::AccessDenied { message }
    } else {
        Error::JsonRpc { code, message }
    }
}

/// Split a `call` reply into its status code and optional data.
fn decode_call_response(response: RpcResponse) -> Result<(UbusStatus, Option<Value>), Error> {
    if let Some(err) = response.error {
        return Err(rpc_error(err.code, err.message));
    }

    let Some(Value::Array(mut result)) = response.result else {
        return Err(Error::Deserialization {
            message: "call reply is not a [status, data] array".into(),
            body: String::new(),
        });
    };

    if result.is_empty() {
        return Err(Error::Deserialization {
            message: "call reply has no status".into(),
            body: String::new(),
        });
    }

    let data = if result.len() > 1 {
        Some(result.swap_remove(1))
    } else {
        None
    };
    let status = result
        .first()
        .and_then(Value::as_i64)
        .map(UbusStatus::from_code)
        .ok_or_else(|| Error::Deserialization {
            message: "call reply status is not an integer".into(),
            body: String::new(),
        })?;

    Ok((status, data))
}
