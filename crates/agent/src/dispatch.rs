use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use chatrelay_core::domain::schema::ToolArgs;
use chatrelay_core::domain::tool::{
    ExecutionOutcome, ToolExecutionRecord, ToolFailureKind, ToolInvocationRequest,
};
use chatrelay_db::repositories::ToolExecutionRepository;

use crate::tools::ToolRegistry;

/// Runs one tool call against the registry and writes its audit record.
///
/// Never returns an error: lookup, argument and executor failures all come
/// back as a failed [`ExecutionOutcome`], and a failed audit write is logged
/// without touching the outcome.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    executions: Arc<dyn ToolExecutionRepository>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        executions: Arc<dyn ToolExecutionRepository>,
        timeout: Duration,
    ) -> Self {
        Self { registry, executions, timeout }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn execute(&self, request: &ToolInvocationRequest) -> ExecutionOutcome {
        let outcome = self.run(request).await;

        let record = ToolExecutionRecord::from_outcome(request, &outcome);
        if let Err(persist_error) = self.executions.save(&record).await {
            error!(
                event_name = "tool.execution.persist_failed",
                correlation_id = %request.correlation_id.0,
                tool_name = %request.tool_name,
                error = %persist_error,
                "failed to write tool execution record"
            );
        }

        info!(
            event_name = "tool.execution.completed",
            correlation_id = %request.correlation_id.0,
            call_id = %request.call_id,
            tool_name = %request.tool_name,
            success = outcome.success,
            error_class = outcome.failure.as_ref().map(|failure| failure.kind.as_str()).unwrap_or("none"),
            duration_ms = outcome.duration_ms,
            "tool execution completed"
        );

        outcome
    }

    async fn run(&self, request: &ToolInvocationRequest) -> ExecutionOutcome {
        let name = request.tool_name.as_str();

        let entry = match self.registry.lookup(name) {
            Ok(entry) => entry,
            Err(lookup_error) => {
                return ExecutionOutcome::failed(
                    name,
                    ToolFailureKind::NotFound,
                    lookup_error.to_string(),
                    0,
                );
            }
        };

        let args = match ToolArgs::parse(&request.raw_arguments) {
            Ok(args) => args,
            Err(parse_error) => {
                return ExecutionOutcome::failed(
                    name,
                    ToolFailureKind::InvalidArguments,
                    parse_error.to_string(),
                    0,
                );
            }
        };

        if let Err(violation) = entry.descriptor().parameters.validate(&args.as_arg_value()) {
            return ExecutionOutcome::failed(
                name,
                ToolFailureKind::InvalidArguments,
                violation.to_string(),
                0,
            );
        }

        let tool = entry.tool();
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, tool.execute(&args)).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(Ok(value)) => ExecutionOutcome::succeeded(name, value, duration_ms),
            Ok(Err(execution_error)) => ExecutionOutcome::failed(
                name,
                ToolFailureKind::ExecutionFailed,
                format!("{execution_error:#}"),
                duration_ms,
            ),
            Err(_) => {
                warn!(
                    event_name = "tool.execution.timed_out",
                    tool_name = name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "tool execution timed out"
                );
                ExecutionOutcome::failed(
                    name,
                    ToolFailureKind::ExecutionFailed,
                    format!("tool timed out after {:?}", self.timeout),
                    duration_ms,
                )
            }
        }
    }
}
