//! State machine behind [`Runner::run`](super::Runner::run) and
//! [`Runner::run_stream`](super::Runner::run_stream)
//!
//! Both entry points drive the same loop; a streamed run only differs in
//! having a live [`ChunkSink`] and calling the provider's incremental
//! interface.

use super::Runner;
use crate::retry::RetryBudget;
use crate::stream::{AgentStatus, ChunkSink, Status, StreamChunk};
use crate::{Agent, RunOptions, RunOutcome, RunResult};
use agent_core::context::keys;
use agent_core::{ContextHandle, Error, HandoffSignal, Result, ToolOutput};
use agent_llm::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StreamDelta, TokenUsage,
    ToolCall,
};
use futures::StreamExt;
use futures::future::join_all;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::{Instant, timeout};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

const CANCELLED_CALL: &str = "Cancelled: the run was aborted before this call's result was recorded";

/// What became of one tool call
enum CallOutcome {
    /// Ordinary result
    Output(Value),
    /// Delegation request
    Handoff(HandoffSignal),
    /// Rejected before or by the executor in a way the model can correct
    Feedback(String),
    /// Executor failure; counts against the tool failure budget
    Failed(String),
}

/// Handoff accepted during a tool batch, applied once the batch is recorded
struct PendingHandoff {
    signal: HandoffSignal,
    target: Arc<Agent>,
}

pub(super) struct Driver {
    runner: Runner,
    options: RunOptions,
    sink: ChunkSink,
    context: ContextHandle,
    run_id: String,
    deadline: Option<Instant>,
    current: String,
    history: Vec<Message>,
    input_len: usize,
    agent_trace: Vec<String>,
    steps: usize,
    model_calls: usize,
    usage: TokenUsage,
    tool_failures: u32,
}

impl Driver {
    pub(super) fn new(
        runner: Runner,
        context: ContextHandle,
        options: RunOptions,
        sink: ChunkSink,
    ) -> Self {
        let current = options
            .start_agent
            .clone()
            .or_else(|| runner.agents.entry().map(str::to_string))
            .unwrap_or_default();
        let deadline = options.run_timeout.map(|t| Instant::now() + t);

        Self {
            runner,
            options,
            sink,
            context,
            run_id: Uuid::new_v4().to_string(),
            deadline,
            current,
            history: Vec::new(),
            input_len: 0,
            agent_trace: Vec::new(),
            steps: 0,
            model_calls: 0,
            usage: TokenUsage::default(),
            tool_failures: 0,
        }
    }

    /// Drive the run to its end
    pub(super) async fn run(mut self, messages: Vec<Message>) -> Result<RunResult> {
        let span = info_span!("run", run_id = %self.run_id, streaming = self.sink.is_streaming());
        async move {
            let outcome = self.drive(messages).await;
            self.conclude(outcome).await
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, messages: Vec<Message>) -> Result<RunOutcome> {
        if self.options.max_steps == 0 {
            return Err(Error::Config("max_steps must be at least 1".to_string()));
        }

        let mut active = self.runner.agents.resolve(&self.current)?;
        self.agent_trace.push(self.current.clone());
        self.seed_history(messages).await?;

        let run_id = self.run_id.clone();
        let agent_name = active.name().to_string();
        self.context
            .update(|ctx| {
                ctx.set_metadata(keys::RUN_ID, json!(run_id));
                ctx.set_metadata(keys::CURRENT_AGENT, json!(agent_name));
            })
            .await;

        info!(
            agent = %active.name(),
            max_steps = self.options.max_steps,
            history_len = self.history.len(),
            "Run started"
        );

        while self.steps < self.options.max_steps {
            info!(
                step = self.steps + 1,
                max_steps = self.options.max_steps,
                agent = %active.name(),
                "Step started"
            );
            self.status(Status::Routing, &active).await?;

            let response = self.invoke_model(&active).await?;
            self.record_usage(response.usage).await;

            let message = response.message;
            self.history.push(message.clone());

            let calls = message.tool_calls();
            if calls.is_empty() {
                info!(
                    agent = %active.name(),
                    steps = self.steps,
                    model_calls = self.model_calls,
                    "Agent produced final message"
                );
                self.status(Status::Completing, &active).await?;
                self.sink
                    .emit(StreamChunk::FinalMessage {
                        agent: active.name().to_string(),
                        message,
                    })
                    .await?;
                return Ok(RunOutcome::Completed);
            }

            info!(tool_count = calls.len(), agent = %active.name(), "Agent requested tool use");
            self.status(Status::Executing, &active).await?;

            let handoff = self.execute_batch(&active, &calls).await?;
            self.steps += 1;

            if let Some(pending) = handoff {
                active = self.switch_agent(&active, pending).await?;
            }
        }

        warn!(
            max_steps = self.options.max_steps,
            agent = %active.name(),
            "Step limit reached without a final message"
        );
        self.status(Status::Completing, &active).await?;
        Ok(RunOutcome::StepLimitExceeded)
    }

    async fn conclude(mut self, outcome: Result<RunOutcome>) -> Result<RunResult> {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(Error::Cancelled) => {
                warn!(steps = self.steps, agent = %self.current, "Run aborted");
                RunOutcome::Aborted
            }
            Err(err) => {
                error!(error = %err, agent = %self.current, steps = self.steps, "Run failed");
                self.emit_terminal(err.to_string()).await;
                return Err(err);
            }
        };

        match outcome {
            RunOutcome::Completed => {}
            RunOutcome::StepLimitExceeded => {
                self.emit_terminal(format!(
                    "step limit of {} reached without a final message",
                    self.options.max_steps
                ))
                .await;
            }
            RunOutcome::Aborted => {
                self.close_pending_calls();
                self.emit_terminal(Error::Cancelled.to_string()).await;
            }
        }

        let final_output = match outcome {
            RunOutcome::Completed => self.history.last().and_then(Message::text),
            _ => None,
        };

        info!(
            outcome = ?outcome,
            steps = self.steps,
            model_calls = self.model_calls,
            input_tokens = self.usage.input_tokens,
            output_tokens = self.usage.output_tokens,
            "Run finished"
        );

        Ok(RunResult {
            final_output,
            messages: self.history,
            last_agent: self.current,
            agent_trace: self.agent_trace,
            steps: self.steps,
            model_calls: self.model_calls,
            usage: self.usage,
            outcome,
            context: self.context,
            input_len: self.input_len,
        })
    }

    /// Answer the tool calls an abort left without results
    ///
    /// Keeps the returned history acceptable to providers that require every
    /// tool use to be followed by its result.
    fn close_pending_calls(&mut self) {
        if self.history.len() <= self.input_len {
            return;
        }
        let Some(last) = self.history.last() else {
            return;
        };
        if last.role != Role::Assistant {
            return;
        }
        let calls = last.tool_calls();
        if calls.is_empty() {
            return;
        }

        debug!(pending = calls.len(), "Closing tool calls interrupted by abort");
        let blocks = calls
            .iter()
            .map(|call| ContentBlock::tool_error(&call.id, CANCELLED_CALL))
            .collect();
        self.history.push(Message::tool_results(blocks));
    }

    async fn emit_terminal(&self, message: String) {
        if self.sink.emit(StreamChunk::Error { message }).await.is_err() {
            debug!("Stream consumer gone before the terminal chunk");
        }
    }

    async fn seed_history(&mut self, messages: Vec<Message>) -> Result<()> {
        if let Some(conversation) = &self.options.conversation {
            match &self.runner.memory {
                Some(memory) => {
                    let stored = memory
                        .get_messages(&conversation.id, conversation.limit)
                        .await?;
                    debug!(
                        conversation_id = %conversation.id,
                        seeded = stored.len(),
                        "History seeded from memory"
                    );
                    self.history.extend(stored);
                }
                None => warn!(
                    conversation_id = %conversation.id,
                    "No memory provider configured, history not seeded"
                ),
            }
        }

        self.history.extend(messages);
        self.input_len = self.history.len();
        Ok(())
    }

    /// Fails with [`Error::Cancelled`] once the run was cancelled or its deadline passed
    fn ensure_live(&self) -> Result<()> {
        if self.options.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn status(&self, status: Status, agent: &Agent) -> Result<()> {
        debug!(?status, agent = %agent.name(), "Status");
        self.sink
            .emit(StreamChunk::AgentStatus(AgentStatus::new(status, agent.name())))
            .await
    }

    async fn record_usage(&mut self, usage: TokenUsage) {
        self.model_calls += 1;
        self.usage += usage;

        let total = self.usage;
        self.context
            .update(|ctx| {
                ctx.set_metadata(
                    keys::USAGE,
                    json!({
                        "input_tokens": total.input_tokens,
                        "output_tokens": total.output_tokens,
                    }),
                );
            })
            .await;
    }

    // =========== Model Invocation ===========

    async fn invoke_model(&self, agent: &Agent) -> Result<CompletionResponse> {
        let instructions = {
            let ctx = self.context.lock().await;
            agent.instructions(&ctx)?
        };

        let settings = agent.model();
        let request = CompletionRequest::builder(&settings.model)
            .messages(self.history.clone())
            .system(instructions)
            .max_tokens(settings.max_tokens)
            .maybe_temperature(settings.temperature)
            .tools(agent.tool_definitions())
            .build();

        debug!(
            model = %request.model,
            message_count = request.messages.len(),
            tool_count = request.tools.as_ref().map_or(0, Vec::len),
            "Sending request to LLM"
        );

        let mut budget = RetryBudget::new(self.options.model_retries, self.options.timeout_retries);
        loop {
            self.ensure_live()?;

            let mut forwarded = false;
            let attempt = timeout(
                self.options.model_timeout,
                self.call_model(agent.name(), request.clone(), &mut forwarded),
            )
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    operation: "model call".to_string(),
                    timeout: self.options.model_timeout,
                })
            });

            // Results that arrive after cancellation are discarded.
            self.ensure_live()?;

            let err = match attempt {
                Ok(response) => {
                    info!(
                        stop_reason = ?response.stop_reason,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "LLM response received"
                    );
                    return Ok(response);
                }
                Err(err) => err,
            };

            // Output already streamed cannot be taken back, so a partial
            // stream is never replayed.
            let retry = if forwarded { None } else { budget.consume(&err) };
            let Some(retry) = retry else {
                return Err(err);
            };

            let delay = self.options.retry_policy.backoff_duration(retry);
            warn!(
                agent = %agent.name(),
                attempt = retry + 1,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Model call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    #[instrument(skip_all, fields(agent = %agent, provider = self.runner.provider.name()))]
    async fn call_model(
        &self,
        agent: &str,
        request: CompletionRequest,
        forwarded: &mut bool,
    ) -> Result<CompletionResponse> {
        if !self.sink.is_streaming() {
            return Ok(self.runner.provider.complete(request).await?);
        }

        let mut deltas = self.runner.provider.stream(request).await?;
        while let Some(delta) = deltas.next().await {
            match delta? {
                StreamDelta::Text(text) => {
                    *forwarded = true;
                    self.sink
                        .emit(StreamChunk::TextDelta {
                            agent: agent.to_string(),
                            text,
                        })
                        .await?;
                }
                StreamDelta::ToolCallStart { id, name } => {
                    *forwarded = true;
                    self.sink
                        .emit(StreamChunk::ToolCallStart {
                            agent: agent.to_string(),
                            id,
                            name,
                        })
                        .await?;
                }
                StreamDelta::ToolCallInput { .. } => {}
                StreamDelta::Completed(response) => return Ok(response),
            }
        }

        Err(Error::Transport(
            "model stream ended before the response completed".to_string(),
        ))
    }

    // =========== Tool Execution ===========

    /// Execute one model turn's tool calls and append their results
    ///
    /// Results are recorded in call order whether or not the calls ran
    /// concurrently. The first handoff of the batch wins.
    async fn execute_batch(
        &mut self,
        agent: &Arc<Agent>,
        calls: &[ToolCall],
    ) -> Result<Option<PendingHandoff>> {
        let mut blocks = Vec::with_capacity(calls.len());
        let mut handoff: Option<PendingHandoff> = None;

        if self.options.parallel_tool_calls {
            let outcomes = join_all(calls.iter().map(|call| self.execute_call(agent, call))).await;
            for (call, outcome) in calls.iter().zip(outcomes) {
                let block = self.resolve_outcome(agent, call, outcome?, &mut handoff).await?;
                blocks.push(block);
            }
        } else {
            for call in calls {
                if let Some(pending) = &handoff {
                    let reason = format!(
                        "Skipped: control was transferred to '{}' before this call ran",
                        pending.signal.target
                    );
                    debug!(tool_name = %call.name, tool_id = %call.id, "Tool call skipped after handoff");
                    self.emit_tool_result(agent, call, &reason, true).await?;
                    blocks.push(ContentBlock::tool_error(&call.id, reason));
                    continue;
                }
                let outcome = self.execute_call(agent, call).await?;
                let block = self.resolve_outcome(agent, call, outcome, &mut handoff).await?;
                blocks.push(block);
            }
        }

        info!(
            result_count = blocks.len(),
            handoff = handoff.is_some(),
            "Tool execution completed"
        );
        self.history.push(Message::tool_results(blocks));
        Ok(handoff)
    }

    /// Turn a call outcome into the block the model sees
    async fn resolve_outcome(
        &mut self,
        agent: &Agent,
        call: &ToolCall,
        outcome: CallOutcome,
        handoff: &mut Option<PendingHandoff>,
    ) -> Result<ContentBlock> {
        let (content, is_error) = match outcome {
            CallOutcome::Output(value) => (render(value), false),
            CallOutcome::Feedback(message) => (message, true),
            CallOutcome::Failed(message) => {
                self.tool_failures += 1;
                if self.tool_failures > self.options.tool_retries {
                    error!(
                        tool_name = %call.name,
                        failures = self.tool_failures,
                        "Tool failure budget exhausted"
                    );
                    return Err(Error::tool(&call.name, message));
                }
                (format!("Error: {message}"), true)
            }
            CallOutcome::Handoff(signal) => {
                if let Some(pending) = handoff.as_ref() {
                    warn!(
                        ignored_target = %signal.target,
                        target_agent = %pending.signal.target,
                        "Additional handoff in the same batch ignored"
                    );
                    (
                        format!(
                            "Ignored: control is already being transferred to '{}'",
                            pending.signal.target
                        ),
                        true,
                    )
                } else {
                    let target = self.reachable(agent, &signal.target)?;
                    let content = json!({ "assistant": signal.target }).to_string();
                    *handoff = Some(PendingHandoff { signal, target });
                    (content, false)
                }
            }
        };

        self.emit_tool_result(agent, call, &content, is_error).await?;
        Ok(if is_error {
            ContentBlock::tool_error(&call.id, content)
        } else {
            ContentBlock::tool_result(&call.id, content)
        })
    }

    /// Run one call to completion, retrying timeouts within budget
    ///
    /// Only cancellation is returned as an error; every other failure is a
    /// [`CallOutcome`].
    async fn execute_call(&self, agent: &Agent, call: &ToolCall) -> Result<CallOutcome> {
        let Some(tool) = agent.tool(&call.name) else {
            let available: Vec<&str> = agent.tools().iter().map(|t| t.name()).collect();
            warn!(tool_name = %call.name, agent = %agent.name(), "Model requested an unknown tool");
            return Ok(CallOutcome::Feedback(format!(
                "Unknown tool '{}'. Available tools: {}",
                call.name,
                available.join(", ")
            )));
        };

        if let Err(err) = tool.validate_input(&call.input) {
            warn!(tool_name = %call.name, error = %err, "Tool input rejected");
            return Ok(CallOutcome::Feedback(err.to_string()));
        }

        let mut budget = RetryBudget::new(0, self.options.timeout_retries);
        loop {
            self.ensure_live()?;

            let input_preview: String = call.input.to_string().chars().take(500).collect();
            info!(
                tool_name = %call.name,
                tool_id = %call.id,
                input_preview = %input_preview,
                "Executing tool"
            );

            let start_time = std::time::Instant::now();
            let result = timeout(
                self.options.tool_timeout,
                tool.execute(call.input.clone(), &self.context),
            )
            .await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            self.ensure_live()?;

            match result {
                Ok(Ok(ToolOutput::Continue(value))) => {
                    info!(tool_name = %call.name, duration_ms, "Tool execution succeeded");
                    return Ok(CallOutcome::Output(value));
                }
                Ok(Ok(ToolOutput::Handoff(signal))) => {
                    info!(
                        tool_name = %call.name,
                        target_agent = %signal.target,
                        duration_ms,
                        "Tool requested handoff"
                    );
                    return Ok(CallOutcome::Handoff(signal));
                }
                Ok(Err(err @ Error::Validation(_))) => {
                    warn!(tool_name = %call.name, duration_ms, error = %err, "Tool rejected its input");
                    return Ok(CallOutcome::Feedback(err.to_string()));
                }
                Ok(Err(err)) => {
                    warn!(tool_name = %call.name, duration_ms, error = %err, "Tool execution failed");
                    return Ok(CallOutcome::Failed(err.to_string()));
                }
                Err(_) => {
                    let err = Error::Timeout {
                        operation: format!("tool '{}'", call.name),
                        timeout: self.options.tool_timeout,
                    };
                    if budget.consume(&err).is_some() {
                        warn!(tool_name = %call.name, duration_ms, "Tool timed out, retrying");
                        continue;
                    }
                    warn!(tool_name = %call.name, duration_ms, error = %err, "Tool timed out");
                    return Ok(CallOutcome::Failed(err.to_string()));
                }
            }
        }
    }

    async fn emit_tool_result(
        &self,
        agent: &Agent,
        call: &ToolCall,
        content: &str,
        is_error: bool,
    ) -> Result<()> {
        self.sink
            .emit(StreamChunk::ToolCallResult {
                agent: agent.name().to_string(),
                id: call.id.clone(),
                name: call.name.clone(),
                content: content.to_string(),
                is_error,
            })
            .await
    }

    // =========== Handoff ===========

    /// Resolve a handoff target the active agent may reach
    fn reachable(&self, agent: &Agent, target: &str) -> Result<Arc<Agent>> {
        if !agent.can_handoff_to(target) {
            error!(from = %agent.name(), to = %target, "Handoff to undeclared target");
            return Err(Error::UnknownAgent(target.to_string()));
        }
        self.runner.agents.resolve(target)
    }

    async fn switch_agent(&mut self, from: &Agent, pending: PendingHandoff) -> Result<Arc<Agent>> {
        let PendingHandoff { signal, target } = pending;
        info!(from = %from.name(), to = %target.name(), "Handing off");

        self.sink
            .emit(StreamChunk::Handoff {
                from: from.name().to_string(),
                to: target.name().to_string(),
            })
            .await?;

        let target_name = target.name().to_string();
        self.context
            .update(|ctx| {
                match signal.payload {
                    Some(payload) => ctx.set_metadata(keys::HANDOFF_PAYLOAD, payload),
                    None => {
                        ctx.remove_metadata(keys::HANDOFF_PAYLOAD);
                    }
                }
                let count = ctx.handoff_count() + 1;
                ctx.set_metadata(keys::HANDOFF_COUNT, json!(count));
                ctx.set_metadata(keys::CURRENT_AGENT, json!(target_name));
            })
            .await;

        self.current = target.name().to_string();
        self.agent_trace.push(self.current.clone());
        Ok(target)
    }
}

fn render(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
