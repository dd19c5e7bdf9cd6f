//! Remote workflow execution, gated by the access engine
//!
//! The engine itself is an external collaborator behind
//! [`WorkflowEngineClient`]; [`HttpWorkflowClient`] is the reqwest-backed
//! implementation. Authorization denials are terminal and never reach the
//! retry layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::config::{ExecutionConfig, RetryConfig, WorkflowEngineConfig};
use crate::domain::{
    ExecutionHandle, ExecutionStatus, ExecutionStatusReport, RequiredPermission, User,
    WorkflowDescriptor,
};
use crate::error::{AppError, RemoteErrorCode, Result};
use crate::policy::AccessEngine;
use crate::retry::{run_with_retry, RetryContext};

/// Boundary to the remote workflow engine.
#[async_trait]
pub trait WorkflowEngineClient: Send + Sync {
    async fn list_workflows(&self) -> Result<Vec<WorkflowDescriptor>>;

    async fn execute(
        &self,
        workflow_id: &str,
        input: &Value,
        user_id: &str,
    ) -> Result<ExecutionHandle>;

    async fn get_status(&self, execution_id: &str) -> Result<ExecutionStatusReport>;

    async fn cancel(&self, execution_id: &str) -> Result<bool>;
}

/// Error body shape reported by the engine API.
#[derive(Debug, Default, Deserialize)]
struct EngineErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkflowListResponse {
    workflows: Vec<WorkflowDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    cancelled: bool,
}

/// HTTP client for the workflow engine API.
#[derive(Debug)]
pub struct HttpWorkflowClient {
    base_url: Url,
    api_key: String,
    http: reqwest::Client,
}

impl HttpWorkflowClient {
    pub fn new(config: &WorkflowEngineConfig) -> Result<Self> {
        // Url::join drops the last path segment without a trailing slash
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            AppError::validation(
                format!("invalid workflow engine URL `{}`: {e}", config.base_url),
                Some("base_url"),
            )
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::network(format!("failed to build HTTP client: {e}"), None))?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::validation(format!("invalid endpoint `{path}`: {e}"), None))
    }

    /// Transport-level failures and non-2xx statuses without an engine error
    /// body map to `Network`; engine-reported error codes map to
    /// `RemoteExecution`.
    async fn handle<T: serde::de::DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(|e| {
                AppError::network(
                    format!("malformed engine response: {e}"),
                    Some(status.as_u16()),
                )
            });
        }

        let body: EngineErrorBody = resp.json().await.unwrap_or_default();
        match body.code {
            Some(code) => Err(AppError::remote(
                RemoteErrorCode::parse(&code),
                body.message
                    .unwrap_or_else(|| format!("engine returned {code}")),
            )),
            None => Err(AppError::network(
                body.message
                    .unwrap_or_else(|| format!("engine returned HTTP {status}")),
                Some(status.as_u16()),
            )),
        }
    }
}

#[async_trait]
impl WorkflowEngineClient for HttpWorkflowClient {
    async fn list_workflows(&self) -> Result<Vec<WorkflowDescriptor>> {
        let url = self.endpoint("workflows")?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let list: WorkflowListResponse = self.handle(resp).await?;
        Ok(list.workflows)
    }

    async fn execute(
        &self,
        workflow_id: &str,
        input: &Value,
        user_id: &str,
    ) -> Result<ExecutionHandle> {
        let url = self.endpoint(&format!("workflows/{workflow_id}/run"))?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": input, "user": user_id }))
            .send()
            .await?;
        self.handle(resp).await
    }

    async fn get_status(&self, execution_id: &str) -> Result<ExecutionStatusReport> {
        let url = self.endpoint(&format!("executions/{execution_id}"))?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        self.handle(resp).await
    }

    async fn cancel(&self, execution_id: &str) -> Result<bool> {
        let url = self.endpoint(&format!("executions/{execution_id}/cancel"))?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let body: CancelResponse = self.handle(resp).await?;
        Ok(body.cancelled)
    }
}

/// How long to wait for a remote execution and how often to poll.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub ceiling: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(600),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl From<&ExecutionConfig> for WaitOptions {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            ceiling: Duration::from_secs(config.wait_ceiling_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Final result of a waited-on execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub result: Option<Value>,
}

pub struct WorkflowService {
    engine: Arc<dyn WorkflowEngineClient>,
    access: Arc<AccessEngine>,
    wait_defaults: WaitOptions,
    retry: RetryConfig,
}

impl WorkflowService {
    pub fn new(engine: Arc<dyn WorkflowEngineClient>, access: Arc<AccessEngine>) -> Self {
        Self {
            engine,
            access,
            wait_defaults: WaitOptions::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_execution_config(mut self, config: &ExecutionConfig) -> Self {
        self.wait_defaults = WaitOptions::from(config);
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Workflows the user may list and execute, from the current policy
    /// snapshot.
    pub fn list_available(&self, user: &User) -> Vec<WorkflowDescriptor> {
        self.access.available_workflows(user)
    }

    /// Pull the engine's workflow registry into the policy store.
    pub async fn sync_registry(&self, cancel: &CancellationToken) -> Result<usize> {
        let mut ctx = RetryContext::new("sync workflow registry");
        if let Some(cap) = self.retry.network_attempts {
            ctx = ctx.with_max_attempts(cap);
        }
        let workflows = run_with_retry(&mut ctx, cancel, || {
            let engine = Arc::clone(&self.engine);
            async move { engine.list_workflows().await }
        })
        .await?;

        let count = workflows.len();
        for workflow in workflows {
            self.access.store().upsert_workflow(workflow)?;
        }
        tracing::info!(count, "workflow registry synced");
        Ok(count)
    }

    /// Start an execution. Authorization is checked before anything leaves
    /// the process; denials are terminal and never retried.
    pub async fn execute(
        &self,
        user: &User,
        workflow_id: &str,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<ExecutionHandle> {
        let Some(descriptor) = self.access.workflow(workflow_id) else {
            return Err(AppError::validation(
                format!("unknown workflow `{workflow_id}`"),
                Some("workflow_id"),
            ));
        };

        let resource = format!("workflow:{}", descriptor.id);
        let decision =
            self.access
                .check_access_for(user, &resource, "execute", &descriptor.required_permissions);
        if !decision.allowed {
            return Err(AppError::authorization(
                decision
                    .reason
                    .unwrap_or_else(|| format!("execution of `{workflow_id}` denied")),
                descriptor.required_permissions.clone(),
            ));
        }
        for raw in &descriptor.required_permissions {
            let req = RequiredPermission::parse(raw)?;
            if !self.access.check_access(user, &req.resource, &req.action).allowed {
                return Err(AppError::authorization(
                    format!("workflow `{workflow_id}` requires permission `{raw}`"),
                    descriptor.required_permissions.clone(),
                ));
            }
        }

        let request_id = Uuid::new_v4();
        let mut ctx = RetryContext::new(format!("execute workflow {workflow_id} ({request_id})"));
        if let Some(cap) = self.retry.remote_attempts {
            ctx = ctx.with_max_attempts(cap);
        }

        run_with_retry(&mut ctx, cancel, || {
            let engine = Arc::clone(&self.engine);
            let input = input.clone();
            let user_id = user.id.clone();
            let workflow_id = workflow_id.to_string();
            async move { engine.execute(&workflow_id, &input, &user_id).await }
        })
        .await
    }

    /// Start an execution and wait for it to reach a terminal state.
    pub async fn execute_and_wait(
        &self,
        user: &User,
        workflow_id: &str,
        input: Value,
        options: Option<WaitOptions>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let handle = self.execute(user, workflow_id, input, cancel).await?;
        self.wait_for_completion(&handle.execution_id, options, cancel)
            .await
    }

    /// Poll until the execution is terminal or the overall ceiling elapses.
    /// The ceiling timeout is a `RemoteExecution` TIMEOUT, distinct from any
    /// per-attempt network timeout inside a single poll.
    pub async fn wait_for_completion(
        &self,
        execution_id: &str,
        options: Option<WaitOptions>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let options = options.unwrap_or(self.wait_defaults);
        let deadline = tokio::time::Instant::now() + options.ceiling;

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled(format!(
                    "wait for execution {execution_id} aborted"
                )));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::remote(
                    RemoteErrorCode::Timeout,
                    format!(
                        "execution {execution_id} did not complete within {}s",
                        options.ceiling.as_secs()
                    ),
                ));
            }

            let mut ctx = RetryContext::new(format!("poll execution {execution_id}"));
            if let Some(cap) = self.retry.network_attempts {
                ctx = ctx.with_max_attempts(cap);
            }
            let report = run_with_retry(&mut ctx, cancel, || {
                let engine = Arc::clone(&self.engine);
                let execution_id = execution_id.to_string();
                async move { engine.get_status(&execution_id).await }
            })
            .await?;

            match report.status {
                ExecutionStatus::Succeeded | ExecutionStatus::Cancelled => {
                    return Ok(ExecutionOutcome {
                        execution_id: execution_id.to_string(),
                        status: report.status,
                        result: report.result,
                    });
                }
                ExecutionStatus::Failed => {
                    return Err(AppError::remote(
                        RemoteErrorCode::ExecutionFailed,
                        report
                            .error
                            .unwrap_or_else(|| format!("execution {execution_id} failed")),
                    ));
                }
                ExecutionStatus::Pending | ExecutionStatus::Running => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(AppError::Cancelled(format!(
                                "wait for execution {execution_id} aborted"
                            )));
                        }
                        _ = tokio::time::sleep(options.poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Ask the engine to cancel a running execution.
    pub async fn cancel_execution(&self, execution_id: &str) -> Result<bool> {
        self.engine.cancel(execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessControlConfig, Permission, Provider, UserAttributes};
    use crate::policy::PolicyStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeEngine {
        execute_calls: AtomicU32,
        status_calls: AtomicU32,
        /// Statuses returned per poll; the last one repeats
        statuses: Vec<ExecutionStatusReport>,
        execute_failures: u32,
    }

    impl FakeEngine {
        fn succeeding() -> Self {
            Self {
                execute_calls: AtomicU32::new(0),
                status_calls: AtomicU32::new(0),
                statuses: vec![ExecutionStatusReport {
                    status: ExecutionStatus::Succeeded,
                    result: Some(json!({"answer": 42})),
                    error: None,
                }],
                execute_failures: 0,
            }
        }

        fn always(status: ExecutionStatus) -> Self {
            Self {
                execute_calls: AtomicU32::new(0),
                status_calls: AtomicU32::new(0),
                statuses: vec![ExecutionStatusReport {
                    status,
                    result: None,
                    error: None,
                }],
                execute_failures: 0,
            }
        }
    }

    #[async_trait]
    impl WorkflowEngineClient for FakeEngine {
        async fn list_workflows(&self) -> Result<Vec<WorkflowDescriptor>> {
            Ok(vec![descriptor("remote-flow", &[])])
        }

        async fn execute(
            &self,
            _workflow_id: &str,
            _input: &Value,
            _user_id: &str,
        ) -> Result<ExecutionHandle> {
            let call = self.execute_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.execute_failures {
                return Err(AppError::remote(RemoteErrorCode::WorkflowBusy, "busy"));
            }
            Ok(ExecutionHandle {
                execution_id: "exec-1".to_string(),
                status: ExecutionStatus::Pending,
            })
        }

        async fn get_status(&self, _execution_id: &str) -> Result<ExecutionStatusReport> {
            let call = self.status_calls.fetch_add(1, Ordering::SeqCst) as usize;
            let idx = call.min(self.statuses.len() - 1);
            Ok(self.statuses[idx].clone())
        }

        async fn cancel(&self, _execution_id: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn descriptor(id: &str, required: &[&str]) -> WorkflowDescriptor {
        WorkflowDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            input_schema: Value::Null,
            output_schema: Value::Null,
            required_permissions: required.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn user_with(permissions: Vec<Permission>) -> User {
        User {
            id: "1".to_string(),
            email: "john@acme.com".to_string(),
            name: None,
            provider: Provider::Azure,
            attributes: UserAttributes {
                domain: "acme.com".to_string(),
                ..Default::default()
            },
            permissions,
            authenticated_at: chrono::Utc::now(),
        }
    }

    fn service_with(engine: FakeEngine, workflows: Vec<WorkflowDescriptor>) -> WorkflowService {
        let store = Arc::new(
            PolicyStore::new(AccessControlConfig {
                workflows,
                ..Default::default()
            })
            .unwrap(),
        );
        WorkflowService::new(Arc::new(engine), Arc::new(AccessEngine::new(store)))
    }

    #[tokio::test]
    async fn test_execute_denied_never_reaches_engine() {
        let svc = service_with(
            FakeEngine::succeeding(),
            vec![descriptor("flow-1", &["report:read"])],
        );
        let user = user_with(vec![]);
        let cancel = CancellationToken::new();

        let err = svc
            .execute(&user, "flow-1", Value::Null, &cancel)
            .await
            .unwrap_err();
        match err {
            AppError::Authorization {
                required_permissions,
                ..
            } => assert_eq!(required_permissions, vec!["report:read".to_string()]),
            other => panic!("expected authorization error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_requires_each_required_permission() {
        let svc = service_with(
            FakeEngine::succeeding(),
            vec![descriptor("flow-1", &["report:read"])],
        );
        // execute grant present but report:read missing
        let user = user_with(vec![Permission::new("workflow:flow-1", &["execute"])]);
        let cancel = CancellationToken::new();

        let err = svc
            .execute(&user, "flow-1", Value::Null, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization { .. }));
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_validation_error() {
        let svc = service_with(FakeEngine::succeeding(), vec![]);
        let user = user_with(vec![Permission::new("*", &["*"])]);
        let cancel = CancellationToken::new();

        let err = svc
            .execute(&user, "nope", Value::Null, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_busy_engine() {
        let engine = FakeEngine {
            execute_failures: 2,
            ..FakeEngine::succeeding()
        };
        let svc = service_with(engine, vec![descriptor("flow-1", &[])]);
        let user = user_with(vec![Permission::new("*", &["*"])]);
        let cancel = CancellationToken::new();

        let handle = svc
            .execute(&user, "flow-1", Value::Null, &cancel)
            .await
            .unwrap();
        assert_eq!(handle.execution_id, "exec-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_and_wait_returns_result() {
        let engine = FakeEngine {
            statuses: vec![
                ExecutionStatusReport {
                    status: ExecutionStatus::Running,
                    result: None,
                    error: None,
                },
                ExecutionStatusReport {
                    status: ExecutionStatus::Succeeded,
                    result: Some(json!({"answer": 42})),
                    error: None,
                },
            ],
            ..FakeEngine::succeeding()
        };
        let svc = service_with(engine, vec![descriptor("flow-1", &[])]);
        let user = user_with(vec![Permission::new("*", &["*"])]);
        let cancel = CancellationToken::new();

        let outcome = svc
            .execute_and_wait(&user, "flow-1", Value::Null, None, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Succeeded);
        assert_eq!(outcome.result, Some(json!({"answer": 42})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ceiling_raises_timeout() {
        let svc = service_with(
            FakeEngine::always(ExecutionStatus::Running),
            vec![descriptor("flow-1", &[])],
        );
        let cancel = CancellationToken::new();
        let options = WaitOptions {
            ceiling: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        };

        let err = svc
            .wait_for_completion("exec-1", Some(options), &cancel)
            .await
            .unwrap_err();
        match err {
            AppError::RemoteExecution { code, .. } => {
                assert_eq!(code, RemoteErrorCode::Timeout)
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_execution_surfaces_engine_message() {
        let engine = FakeEngine {
            statuses: vec![ExecutionStatusReport {
                status: ExecutionStatus::Failed,
                result: None,
                error: Some("step 3 exploded".to_string()),
            }],
            ..FakeEngine::succeeding()
        };
        let svc = service_with(engine, vec![descriptor("flow-1", &[])]);
        let cancel = CancellationToken::new();

        let err = svc
            .wait_for_completion("exec-1", None, &cancel)
            .await
            .unwrap_err();
        match err {
            AppError::RemoteExecution { message, code } => {
                assert_eq!(code, RemoteErrorCode::ExecutionFailed);
                assert!(message.contains("step 3 exploded"));
            }
            other => panic!("expected remote execution error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancellation_mid_poll() {
        let svc = service_with(
            FakeEngine::always(ExecutionStatus::Running),
            vec![descriptor("flow-1", &[])],
        );
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel_clone.cancel();
        });

        let err = svc
            .wait_for_completion("exec-1", None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_sync_registry_upserts_workflows() {
        let svc = service_with(FakeEngine::succeeding(), vec![]);
        let cancel = CancellationToken::new();

        let count = svc.sync_registry(&cancel).await.unwrap();
        assert_eq!(count, 1);
        assert!(svc.access.workflow("remote-flow").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_execution_is_a_terminal_outcome() {
        let svc = service_with(
            FakeEngine::always(ExecutionStatus::Cancelled),
            vec![descriptor("flow-1", &[])],
        );
        let cancel = CancellationToken::new();

        let outcome = svc
            .wait_for_completion("exec-1", None, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Cancelled);
    }
}
