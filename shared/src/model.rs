use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Everything known about an authorized request.
///
/// Produced by the token check, then completed with the HTTP details before
/// it is handed to integration hooks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParams {
    pub request_id: String,
    pub resource: String,
    pub op: String,
    pub attributes: HashMap<String, String>,
    pub claims: Map<String, Value>,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl RequestParams {
    /// Copies method, path and headers of the incoming request.
    pub fn with_http(mut self, method: &http::Method, path: &str, headers: &HeaderMap) -> Self {
        self.method = method.to_string();
        self.path = path.to_string();
        self.headers = flatten_headers(headers);
        self
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }
}

/// Converts a header map into a map of header name to all its values.
/// Values that are not valid UTF-8 are skipped.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut flat: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            flat.entry(name.as_str().to_string())
                .or_default()
                .push(v.to_string());
        }
    }
    flat
}
