use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use chatrelay_core::config::AppConfig;
use chatrelay_core::domain::conversation::SenderId;
use chatrelay_core::domain::message::{InboundMessage, MessageId, StoredMessage};
use chatrelay_core::domain::tool::{ExecutionOutcome, ToolInvocationRequest};
use chatrelay_core::errors::{TurnError, IMAGE_DELIVERY_REPLY};
use chatrelay_core::flows::{TransitionOutcome, TurnEvent, TurnState, TurnTracker};
use chatrelay_db::repositories::{
    ConversationRepository, MessageRepository, RepositoryError, Repositories,
};

use crate::context::ContextBuilder;
use crate::dispatch::ToolDispatcher;
use crate::gateway::{DeliveryReceipt, GatewayError, MessagingGateway};
use crate::llm::CompletionClient;
use crate::reply::{render_tool_outcome, OutboundReply};
use crate::tools::ToolRegistry;

/// Collaborators one orchestrator talks to.
pub struct TurnDependencies {
    pub completion: Arc<dyn CompletionClient>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub registry: Arc<ToolRegistry>,
    pub repositories: Repositories,
}

#[derive(Clone, Debug)]
pub struct TurnSettings {
    pub system_prompt: String,
    pub history_limit: u32,
    pub completion_timeout: Duration,
    pub tool_timeout: Duration,
    pub send_timeout: Duration,
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.agent.system_prompt.clone(),
            history_limit: config.agent.history_limit,
            completion_timeout: config.llm.timeout(),
            tool_timeout: config.agent.tool_timeout(),
            send_timeout: config.agent.send_timeout(),
        }
    }
}

/// What happened during one turn, returned for logging and tests.
#[derive(Clone, Debug)]
pub struct TurnReport {
    pub correlation_id: MessageId,
    pub sender_id: SenderId,
    pub final_state: TurnState,
    pub transitions: Vec<TransitionOutcome>,
    pub tool_outcomes: Vec<ExecutionOutcome>,
    pub replies: Vec<OutboundReply>,
    pub errors: Vec<TurnError>,
}

struct TurnRun {
    correlation_id: MessageId,
    sender_id: SenderId,
    tracker: TurnTracker,
    tool_outcomes: Vec<ExecutionOutcome>,
    replies: Vec<OutboundReply>,
    errors: Vec<TurnError>,
}

impl TurnRun {
    fn new(sender_id: SenderId) -> Self {
        Self {
            correlation_id: MessageId::generate(),
            sender_id,
            tracker: TurnTracker::default(),
            tool_outcomes: Vec::new(),
            replies: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn advance(&mut self, event: TurnEvent) {
        if let Err(flow_error) = self.tracker.advance(event) {
            error!(
                event_name = "turn.flow.rejected",
                correlation_id = %self.correlation_id.0,
                error = %flow_error,
                "turn flow rejected transition"
            );
        }
    }

    fn into_report(self) -> TurnReport {
        TurnReport {
            correlation_id: self.correlation_id,
            sender_id: self.sender_id,
            final_state: self.tracker.state(),
            transitions: self.tracker.history().to_vec(),
            tool_outcomes: self.tool_outcomes,
            replies: self.replies,
            errors: self.errors,
        }
    }
}

/// Runs a single inbound message through context, completion, tools,
/// replies and persistence.
pub struct TurnOrchestrator {
    context: ContextBuilder,
    completion: Arc<dyn CompletionClient>,
    dispatcher: ToolDispatcher,
    gateway: Arc<dyn MessagingGateway>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    completion_timeout: Duration,
    send_timeout: Duration,
}

impl TurnOrchestrator {
    pub fn new(dependencies: TurnDependencies, settings: TurnSettings) -> Self {
        let TurnDependencies { completion, gateway, registry, repositories } = dependencies;
        Self {
            context: ContextBuilder::new(
                repositories.messages.clone(),
                settings.system_prompt,
                settings.history_limit,
            ),
            completion,
            dispatcher: ToolDispatcher::new(
                registry,
                repositories.tool_executions.clone(),
                settings.tool_timeout,
            ),
            gateway,
            conversations: repositories.conversations,
            messages: repositories.messages,
            completion_timeout: settings.completion_timeout,
            send_timeout: settings.send_timeout,
        }
    }

    pub async fn handle_message(&self, inbound: InboundMessage) -> TurnReport {
        let started = Instant::now();
        let mut run = TurnRun::new(inbound.sender_id.clone());

        if inbound.is_blank() {
            run.advance(TurnEvent::BlankInbound);
            info!(
                event_name = "turn.skipped.blank",
                sender_id = %run.sender_id,
                "ignoring blank inbound message"
            );
            return run.into_report();
        }

        info!(
            event_name = "turn.started",
            correlation_id = %run.correlation_id.0,
            sender_id = %run.sender_id,
            "turn started"
        );

        let turn = self.context.build(&inbound.sender_id, &inbound.text).await;
        if turn.history_degraded {
            run.errors.push(TurnError::ContextDegraded(
                "recent messages could not be loaded".to_string(),
            ));
        }
        run.advance(TurnEvent::ContextAssembled);

        let descriptors = self.dispatcher.registry().descriptors();
        let completion = match tokio::time::timeout(
            self.completion_timeout,
            self.completion.complete(&turn.prompt(), &descriptors),
        )
        .await
        {
            Ok(Ok(completion)) => completion,
            Ok(Err(completion_error)) => {
                let error = TurnError::ModelUnavailable(completion_error.to_string());
                return self.abort(run, TurnEvent::CompletionFailed, error, started).await;
            }
            Err(_) => {
                let error = TurnError::ModelUnavailable(format!(
                    "no completion within {:?}",
                    self.completion_timeout
                ));
                return self.abort(run, TurnEvent::CompletionFailed, error, started).await;
            }
        };

        let Some(choice) = completion.choices.into_iter().next() else {
            return self
                .abort(run, TurnEvent::EmptyCompletion, TurnError::EmptyModelResponse, started)
                .await;
        };
        run.advance(TurnEvent::CompletionReceived);

        if choice.tool_calls.is_empty() {
            run.advance(TurnEvent::NoToolCalls);
            if choice.text.trim().is_empty() {
                // Nothing to send, but the turn is still recorded.
                warn!(
                    event_name = "turn.reply.blank",
                    correlation_id = %run.correlation_id.0,
                    sender_id = %run.sender_id,
                    "model returned blank text without tool calls"
                );
            } else {
                self.deliver(&mut run, OutboundReply::Text(choice.text.clone())).await;
            }
        } else {
            run.advance(TurnEvent::ToolCallsRequested);
            for call in &choice.tool_calls {
                let request = ToolInvocationRequest {
                    correlation_id: run.correlation_id.clone(),
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    raw_arguments: call.arguments.clone(),
                };
                let outcome = self.dispatcher.execute(&request).await;
                let reply = render_tool_outcome(&outcome, &choice.text);
                run.tool_outcomes.push(outcome);
                self.deliver(&mut run, reply).await;
            }
        }

        self.persist(&mut run, &inbound.text, &choice.text).await;
        run.advance(TurnEvent::TurnRecorded);
        run.advance(TurnEvent::Finished);

        self.finish(run, started)
    }

    async fn abort(
        &self,
        mut run: TurnRun,
        event: TurnEvent,
        error: TurnError,
        started: Instant,
    ) -> TurnReport {
        warn!(
            event_name = "turn.completion.failed",
            correlation_id = %run.correlation_id.0,
            sender_id = %run.sender_id,
            error_class = error.error_class(),
            error = %error,
            "completion step failed"
        );
        run.advance(event);
        self.deliver(&mut run, OutboundReply::apology(error)).await;
        self.finish(run, started)
    }

    fn finish(&self, run: TurnRun, started: Instant) -> TurnReport {
        let report = run.into_report();
        info!(
            event_name = "turn.completed",
            correlation_id = %report.correlation_id.0,
            sender_id = %report.sender_id,
            final_state = report.final_state.as_str(),
            tool_calls = report.tool_outcomes.len(),
            replies = report.replies.len(),
            errors = report.errors.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "turn completed"
        );
        report
    }

    async fn deliver(&self, run: &mut TurnRun, reply: OutboundReply) {
        if let OutboundReply::Apology { error, .. } = &reply {
            run.errors.push(error.clone());
        }

        match self.send(&run.sender_id, &reply).await {
            Ok(receipt) => {
                info!(
                    event_name = "turn.reply.sent",
                    correlation_id = %run.correlation_id.0,
                    gateway_message_id = receipt.message_id.as_deref().unwrap_or(""),
                    "reply delivered"
                );
                run.replies.push(reply);
            }
            Err(send_error) => {
                error!(
                    event_name = "turn.reply.failed",
                    correlation_id = %run.correlation_id.0,
                    sender_id = %run.sender_id,
                    error = %send_error,
                    "reply delivery failed"
                );
                let image_failed = matches!(reply, OutboundReply::Image { .. });
                run.errors.push(TurnError::DeliveryFailed(send_error.to_string()));
                run.replies.push(reply);

                if image_failed {
                    let apology = OutboundReply::Apology {
                        error: TurnError::DeliveryFailed(send_error.to_string()),
                        text: IMAGE_DELIVERY_REPLY.to_string(),
                    };
                    if let Err(apology_error) = self.send(&run.sender_id, &apology).await {
                        error!(
                            event_name = "turn.reply.failed",
                            correlation_id = %run.correlation_id.0,
                            error = %apology_error,
                            "apology delivery failed"
                        );
                    }
                    run.replies.push(apology);
                }
            }
        }
    }

    async fn send(
        &self,
        target: &SenderId,
        reply: &OutboundReply,
    ) -> Result<DeliveryReceipt, GatewayError> {
        let delivery = async {
            match reply {
                OutboundReply::Text(text) | OutboundReply::Apology { text, .. } => {
                    self.gateway.send_text(target, text).await
                }
                OutboundReply::Image { url, caption } => {
                    self.gateway.send_image(target, url, caption).await
                }
            }
        };

        tokio::time::timeout(self.send_timeout, delivery).await.map_err(|_| GatewayError::Timeout)?
    }

    async fn persist(&self, run: &mut TurnRun, inbound_text: &str, reply_text: &str) {
        let inbound =
            StoredMessage::inbound(run.correlation_id.clone(), run.sender_id.clone(), inbound_text);
        if let Err(store_error) = self.messages.save(&inbound).await {
            persistence_failed(run, "inbound message", store_error);
        }

        let outbound = StoredMessage::outbound(run.sender_id.clone(), reply_text);
        if let Err(store_error) = self.messages.save(&outbound).await {
            persistence_failed(run, "outbound message", store_error);
        }

        match self.conversations.get_or_create(&run.sender_id).await {
            Ok(mut conversation) => {
                conversation.record_turn(inbound_text);
                if let Err(store_error) = self.conversations.update(&conversation).await {
                    persistence_failed(run, "conversation update", store_error);
                }
            }
            Err(store_error) => persistence_failed(run, "conversation lookup", store_error),
        }
    }
}

fn persistence_failed(run: &mut TurnRun, what: &str, store_error: RepositoryError) {
    error!(
        event_name = "turn.persist.failed",
        correlation_id = %run.correlation_id.0,
        sender_id = %run.sender_id,
        record = what,
        error = %store_error,
        "failed to persist turn data"
    );
    run.errors.push(TurnError::PersistenceFailed(format!("{what}: {store_error}")));
}
