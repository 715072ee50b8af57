use crate::config::{IntegrationConfig, IntegrationHook};
use crate::errors::{IntegrationError, StoreError};
use crate::hooks::{HOOK_TIMEOUT, HookInvoker, HookResponse};
use crate::metrics_defs::INTEGRATIONS_REGISTERED;
use crate::store::ConfigStore;
use auth::{AdminManager, Permission, PermissionSource};
use http::StatusCode;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Value, json};
use shared::gauge;
use shared::model::RequestParams;
use std::sync::Arc;

type Integrations = IndexMap<String, IntegrationConfig>;

/// Registry of enabled integrations and their hooks.
///
/// Reads are served from memory. Every modification is written to the store
/// before it becomes visible.
pub struct IntegrationManager {
    integrations: Arc<RwLock<Integrations>>,
    store: Arc<dyn ConfigStore>,
    admin: Arc<AdminManager>,
    invoker: HookInvoker,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl IntegrationManager {
    /// Creates the manager with whatever the store holds.
    pub async fn load(
        store: Arc<dyn ConfigStore>,
        admin: Arc<AdminManager>,
    ) -> Result<Arc<Self>, IntegrationError> {
        let loader = store.clone();
        let stored = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(StoreError::from)??;

        tracing::info!(count = stored.len(), "loaded integrations");
        gauge!(INTEGRATIONS_REGISTERED).set(stored.len() as f64);

        let integrations = stored
            .into_iter()
            .map(|cfg| (cfg.id.clone(), cfg))
            .collect();

        Ok(Arc::new(IntegrationManager {
            integrations: Arc::new(RwLock::new(integrations)),
            store,
            admin,
            invoker: HookInvoker::new(HOOK_TIMEOUT)?,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }))
    }

    /// Applies `f` to a copy of the registry, persists the copy and swaps it in.
    ///
    /// Persisting and swapping run on their own task, holding the write lock,
    /// so a caller that stops waiting cannot leave the store ahead of memory.
    async fn modify<T>(
        &self,
        f: impl FnOnce(&mut Integrations) -> Result<T, IntegrationError>,
    ) -> Result<T, IntegrationError> {
        let guard = self.write_lock.clone().lock_owned().await;

        let mut next = self.integrations.read().clone();
        let out = f(&mut next)?;

        let store = self.store.clone();
        let integrations = self.integrations.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let snapshot: Vec<IntegrationConfig> = next.values().cloned().collect();
            tokio::task::spawn_blocking(move || store.store(&snapshot)).await??;

            gauge!(INTEGRATIONS_REGISTERED).set(next.len() as f64);
            *integrations.write() = next;
            Ok::<(), StoreError>(())
        })
        .await
        .map_err(StoreError::from)??;

        Ok(out)
    }

    pub async fn enable_integration(
        &self,
        mut cfg: IntegrationConfig,
        params: &RequestParams,
    ) -> Result<StatusCode, IntegrationError> {
        if cfg.id.is_empty() {
            return Err(IntegrationError::MissingField("id"));
        }
        if cfg.key.is_empty() {
            return Err(IntegrationError::MissingField("key"));
        }

        for hook in cfg.hooks.values_mut() {
            hook.integration_id = cfg.id.clone();
        }

        let id = cfg.id.clone();
        self.modify(|all| {
            all.insert(cfg.id.clone(), cfg);
            Ok(())
        })
        .await?;

        tracing::info!(request_id = %params.request_id, integration = %id, "integration enabled");
        Ok(StatusCode::OK)
    }

    /// Removes the integration along with its hooks.
    pub async fn remove_integration(
        &self,
        id: &str,
        params: &RequestParams,
    ) -> Result<StatusCode, IntegrationError> {
        self.modify(|all| {
            all.shift_remove(id)
                .map(|_| ())
                .ok_or_else(|| IntegrationError::IntegrationNotFound(id.to_string()))
        })
        .await?;

        tracing::info!(request_id = %params.request_id, integration = %id, "integration removed");
        Ok(StatusCode::OK)
    }

    /// Returns one integration, or all of them for `*`.
    pub fn get_integrations(&self, id: &str) -> Result<Vec<IntegrationConfig>, IntegrationError> {
        let all = self.integrations.read();
        if id == "*" {
            return Ok(all.values().cloned().collect());
        }

        all.get(id)
            .map(|cfg| vec![cfg.clone()])
            .ok_or_else(|| IntegrationError::IntegrationNotFound(id.to_string()))
    }

    /// Issues the admin token of an integration that proves its key.
    pub fn get_integration_tokens(&self, id: &str, key: &str) -> Result<Value, IntegrationError> {
        {
            let all = self.integrations.read();
            let cfg = all
                .get(id)
                .ok_or_else(|| IntegrationError::IntegrationNotFound(id.to_string()))?;
            if cfg.key != key {
                return Err(IntegrationError::InvalidKey(id.to_string()));
            }
        }

        let token = self.admin.integration_token(id)?;
        Ok(json!({ "adminToken": token }))
    }

    pub async fn add_integration_hook(
        &self,
        integration_id: &str,
        mut hook: IntegrationHook,
        params: &RequestParams,
    ) -> Result<StatusCode, IntegrationError> {
        if hook.id.is_empty() {
            return Err(IntegrationError::MissingField("id"));
        }
        hook.integration_id = integration_id.to_string();

        let hook_id = hook.id.clone();
        self.modify(|all| {
            let cfg = all.get_mut(integration_id).ok_or_else(|| {
                IntegrationError::IntegrationNotFound(integration_id.to_string())
            })?;
            cfg.hooks.insert(hook.id.clone(), hook);
            Ok(())
        })
        .await?;

        tracing::info!(
            request_id = %params.request_id,
            integration = %integration_id,
            hook = %hook_id,
            "integration hook added"
        );
        Ok(StatusCode::OK)
    }

    pub async fn remove_integration_hook(
        &self,
        integration_id: &str,
        hook_id: &str,
        params: &RequestParams,
    ) -> Result<StatusCode, IntegrationError> {
        self.modify(|all| {
            let cfg = all.get_mut(integration_id).ok_or_else(|| {
                IntegrationError::IntegrationNotFound(integration_id.to_string())
            })?;
            cfg.hooks
                .shift_remove(hook_id)
                .map(|_| ())
                .ok_or_else(|| IntegrationError::HookNotFound {
                    integration: integration_id.to_string(),
                    hook: hook_id.to_string(),
                })
        })
        .await?;

        tracing::info!(
            request_id = %params.request_id,
            integration = %integration_id,
            hook = %hook_id,
            "integration hook removed"
        );
        Ok(StatusCode::OK)
    }

    /// Returns one hook of an integration, or all of them for `*`.
    pub fn get_integration_hooks(
        &self,
        integration_id: &str,
        hook_id: &str,
    ) -> Result<Vec<IntegrationHook>, IntegrationError> {
        let all = self.integrations.read();
        let cfg = all
            .get(integration_id)
            .ok_or_else(|| IntegrationError::IntegrationNotFound(integration_id.to_string()))?;

        if hook_id == "*" {
            return Ok(cfg.hooks.values().cloned().collect());
        }

        cfg.hooks
            .get(hook_id)
            .map(|hook| vec![hook.clone()])
            .ok_or_else(|| IntegrationError::HookNotFound {
                integration: integration_id.to_string(),
                hook: hook_id.to_string(),
            })
    }

    /// Hooks interested in the resource and op, in registration order.
    pub fn hooks_for(&self, resource: &str, op: &str) -> Vec<IntegrationHook> {
        self.integrations
            .read()
            .values()
            .flat_map(|cfg| cfg.hooks.values())
            .filter(|hook| hook.matches(resource, op))
            .cloned()
            .collect()
    }

    pub async fn invoke_hook(&self, params: &RequestParams) -> HookResponse {
        let hooks = self.hooks_for(&params.resource, &params.op);
        if hooks.is_empty() {
            return HookResponse::Continue;
        }
        self.invoker.invoke(&hooks, params).await
    }
}

impl PermissionSource for IntegrationManager {
    fn permissions(&self, integration_id: &str) -> Option<Vec<Permission>> {
        self.integrations
            .read()
            .get(integration_id)
            .map(|cfg| cfg.config_permissions.clone())
    }
}
