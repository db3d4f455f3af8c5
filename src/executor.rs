//! Execution boundary: compile, run under a deadline, translate failures.

use crate::backend::CommandBackend;
use crate::error::{ReadableError, ReadableResult};
use crate::translator;
use docql_core::{Bindings, CommandRequest, Document, ParameterTrace, QueryCompiler, Value};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default execution deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Substituted field texts and the parameter trace of one request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAudit {
    pub rendered: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "smart-substitution-parameters")]
    pub parameters: ParameterTrace,
}

/// Structured result of one execution. Backend failures land here rather
/// than in an `Err`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readable_error: Option<ReadableError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    pub request: RequestAudit,
}

impl ExecutionOutcome {
    fn succeeded(body: serde_json::Value, request: RequestAudit) -> Self {
        Self {
            success: true,
            body: Some(body),
            readable_error: None,
            title: None,
            original_error: None,
            request,
        }
    }

    fn failed(error: ReadableError, original: Option<String>, request: RequestAudit) -> Self {
        Self {
            success: false,
            body: None,
            title: Some(error.title().to_string()),
            readable_error: Some(error),
            original_error: original,
            request,
        }
    }
}

pub struct Executor<B: CommandBackend> {
    backend: Arc<B>,
    compiler: QueryCompiler,
    timeout: Duration,
}

impl<B: CommandBackend> Executor<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            compiler: QueryCompiler::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_compiler(mut self, compiler: QueryCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    /// Compile and run one request.
    ///
    /// Compilation errors are returned as `Err` before the backend is
    /// touched. Backend errors and deadline expiry produce an unsuccessful
    /// outcome. Nothing is retried.
    pub async fn execute(
        &self,
        request: &CommandRequest,
        bindings: &Bindings,
    ) -> ReadableResult<ExecutionOutcome> {
        let compiled = self.compiler.compile(request, bindings)?;
        let document = compiled.document();
        let audit = RequestAudit {
            rendered: compiled
                .rendered
                .iter()
                .map(|(name, text)| (name.clone(), serde_json::Value::String(text.clone())))
                .collect(),
            parameters: compiled.trace.clone(),
        };

        let command_name = document.first_key().unwrap_or_default().to_string();
        let start = Instant::now();
        let reply = tokio::time::timeout(self.timeout, self.backend.run_command(&document)).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match reply {
            Ok(Ok(reply)) => {
                tracing::info!(command = %command_name, elapsed_ms, "Command executed");
                Ok(ExecutionOutcome::succeeded(result_body(&reply), audit))
            }
            Ok(Err(err)) => {
                let readable = translator::translate(&err);
                tracing::warn!(
                    command = %command_name,
                    elapsed_ms,
                    error = %readable,
                    "Command failed"
                );
                Ok(ExecutionOutcome::failed(readable, Some(err.to_string()), audit))
            }
            Err(_) => {
                tracing::warn!(
                    command = %command_name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Command timed out"
                );
                Ok(ExecutionOutcome::failed(
                    ReadableError::Timeout(translator::CONNECTION_TIMEOUT.to_string()),
                    Some(format!(
                        "Command exceeded {} ms deadline",
                        self.timeout.as_millis()
                    )),
                    audit,
                ))
            }
        }
    }
}

/// Cursor replies become their first batch; every other reply is returned whole.
fn result_body(reply: &Document) -> serde_json::Value {
    match reply.get_path("cursor.firstBatch") {
        Some(Value::Array(batch)) => {
            serde_json::Value::Array(batch.iter().map(Value::to_json).collect())
        }
        _ => reply.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use docql_core::extjson::parse_document;
    use docql_core::CommandKind;

    fn executor(backend: InMemoryBackend) -> Executor<InMemoryBackend> {
        Executor::new(Arc::new(backend))
    }

    fn users() -> InMemoryBackend {
        InMemoryBackend::new("test").with_collection(
            "users",
            vec![
                parse_document("{name: 'Cierra Vega', age: 20}").unwrap(),
                parse_document("{name: 'Alden Cantrell', age: 30}").unwrap(),
            ],
        )
    }

    #[tokio::test]
    async fn test_cursor_reply_becomes_array() {
        let request = CommandRequest::new(CommandKind::Find)
            .with("collection", "users")
            .with("filter", "{ age: {{age}} }");
        let mut bindings = Bindings::new();
        bindings.insert("age".to_string(), "30".to_string());

        let outcome = executor(users()).execute(&request, &bindings).await.unwrap();
        assert!(outcome.success);
        let body = outcome.body.unwrap();
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["name"], "Alden Cantrell");
        assert_eq!(outcome.request.parameters.len(), 1);
        assert_eq!(outcome.request.rendered["filter"], "{ age: 30 }");
    }

    #[tokio::test]
    async fn test_compile_error_skips_backend() {
        let request = CommandRequest::new(CommandKind::Find)
            .with("collection", "users")
            .with("filter", "'abc'");
        let err = executor(users().deny_reads())
            .execute(&request, &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "'filter' field must be of BSON type object.");
    }

    #[tokio::test]
    async fn test_backend_error_is_outcome() {
        let request = CommandRequest::raw("{find: 'users', filter: {$is: {}}}");
        let outcome = executor(users())
            .execute(&request, &Bindings::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.title.as_deref(), Some("Argument error"));
        assert!(outcome.original_error.unwrap().contains("BadValue"));
    }

    #[tokio::test]
    async fn test_deadline() {
        let slow = users().with_latency(Duration::from_millis(200));
        let outcome = executor(slow)
            .with_timeout(Duration::from_millis(20))
            .execute(&CommandRequest::raw("{ping: 1}"), &Bindings::new())
            .await
            .unwrap();
        assert!(matches!(outcome.readable_error, Some(ReadableError::Timeout(_))));
    }

    #[test]
    fn test_outcome_serialization() {
        let audit = RequestAudit {
            rendered: serde_json::Map::new(),
            parameters: ParameterTrace::new(),
        };
        let outcome = ExecutionOutcome::failed(
            ReadableError::Parse("Invalid JSON input.".to_string()),
            None,
            audit,
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["readableError"], "Invalid JSON input.");
        assert_eq!(json["title"], "Parse error");
        assert!(json["request"]["smart-substitution-parameters"].is_array());
        assert!(json.get("body").is_none());
    }
}
