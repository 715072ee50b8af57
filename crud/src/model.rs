use crate::errors::CrudError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::model::RequestParams;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    One,
    #[default]
    All,
    Count,
    Distinct,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    #[serde(default)]
    pub find: Map<String, Value>,
    #[serde(rename = "op", default)]
    pub operation: Operation,
    #[serde(default)]
    pub options: ReadOptions,
    /// Extra clauses a caller wants applied on top of `find`, one per
    /// nested selection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_where: Vec<Map<String, Value>>,
    #[serde(default)]
    pub is_batch: bool,
}

/// A single read handed to the data loader.
#[derive(Clone, Debug, Default)]
pub struct ReadRequestKey {
    pub db_alias: String,
    pub col: String,
    pub db_type: String,
    /// Reads with sort/skip/limit options cannot be merged and run on their own.
    pub has_options: bool,
    pub req: ReadRequest,
    pub params: RequestParams,
}

/// Query details reported by SQL backends.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMeta {
    pub col: String,
    pub sql: String,
    pub db_alias: String,
    pub args: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub docs: Value,
    pub meta: Option<QueryMeta>,
}

/// The database seam the loader reads through.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn read(
        &self,
        db_alias: &str,
        col: &str,
        req: &ReadRequest,
        params: &RequestParams,
    ) -> Result<QueryResult, CrudError>;
}
