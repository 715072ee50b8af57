use crate::errors::RunnerError;
use serde::Deserialize;

/// Cluster type reported when no runner is configured.
pub const NO_CLUSTER: &str = "none";

#[derive(Deserialize, Debug)]
struct ClusterTypeResponse {
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Asks the runner which kind of cluster it manages.
pub async fn cluster_type(
    http: &reqwest::Client,
    runner_addr: Option<&str>,
    token: &str,
) -> Result<String, RunnerError> {
    let Some(addr) = runner_addr else {
        return Ok(NO_CLUSTER.to_string());
    };

    let response = http
        .get(format!("http://{addr}/v1/runner/cluster-type"))
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| RunnerError::ClusterType(e.to_string()))?;

    let status = response.status();
    let body: ClusterTypeResponse = response
        .json()
        .await
        .map_err(|e| RunnerError::ClusterType(e.to_string()))?;

    if !status.is_success() {
        let error = body.error.unwrap_or_else(|| format!("status {status}"));
        return Err(RunnerError::ClusterType(error));
    }

    match body.result {
        Some(serde_json::Value::String(cluster)) => Ok(cluster),
        other => Err(RunnerError::ClusterType(format!(
            "unexpected cluster type {other:?}"
        ))),
    }
}
