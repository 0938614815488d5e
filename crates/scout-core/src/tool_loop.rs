//! Tool-use loop: chat, run requested tools, feed results back, repeat

use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::providers::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponseBlock, ChatRole, ChatUsage,
    LlmProvider, StopReason,
};
use crate::tools::ToolExecutor;

pub const MAX_ITERATIONS: usize = 10;
pub const MAX_TOOL_OUTPUT: usize = 100_000;
pub const LOOP_TIMEOUT: Duration = Duration::from_secs(300);

/// Run the loop until the model ends its turn (5-minute overall timeout)
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_message: &str,
    system: &str,
    tool_executor: &dyn ToolExecutor,
) -> Result<(String, ChatUsage)> {
    tokio::time::timeout(
        LOOP_TIMEOUT,
        run_tool_loop_inner(provider, initial_message, system, tool_executor),
    )
    .await
    .map_err(|_| anyhow!("Tool loop timed out after 5 minutes"))?
}

async fn run_tool_loop_inner(
    provider: &dyn LlmProvider,
    initial_message: &str,
    system: &str,
    tool_executor: &dyn ToolExecutor,
) -> Result<(String, ChatUsage)> {
    let tools = tool_executor.list_tools();
    let mut usage = ChatUsage::default();
    let mut conversation = vec![ChatMessage::user(initial_message)];

    for iteration in 1..=MAX_ITERATIONS {
        info!("Tool loop iteration {}", iteration);

        let response = provider.chat(&conversation, &tools, system).await?;
        usage.add(response.usage);

        let tool_calls: Vec<(String, String, serde_json::Value)> = response
            .blocks
            .iter()
            .filter_map(|block| match block {
                ChatResponseBlock::ToolCall { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                ChatResponseBlock::Text { .. } => None,
            })
            .collect();

        if tool_calls.is_empty() {
            if response.stop_reason.is_tool_use() {
                warn!("Stop reason was tool_use but no tool calls found");
                return Err(anyhow!("Stop reason was tool_use but no tool calls found"));
            }

            let text = response.text();
            if text.is_empty() {
                return Err(anyhow!("No text response from assistant"));
            }
            if response.stop_reason == StopReason::MaxTokens {
                warn!("Response cut off at max tokens");
            }
            debug!(
                "Tool loop completed (iterations: {}, tokens: in={} out={})",
                iteration, usage.input_tokens, usage.output_tokens
            );
            return Ok((text, usage));
        }

        conversation.push(ChatMessage {
            role: ChatRole::Assistant,
            content: ChatMessageContent::Blocks(
                response.blocks.into_iter().map(ChatBlock::from).collect(),
            ),
        });

        let mut results = Vec::with_capacity(tool_calls.len());
        for (id, name, input) in tool_calls {
            info!("Executing tool: {}", name);
            let content = match tool_executor.execute(&name, input).await {
                Ok(output) => truncate_output(output),
                Err(e) => {
                    warn!("Tool {} failed: {}", name, e);
                    format!("Error: {}", e)
                }
            };
            results.push(ChatBlock::ToolResult {
                tool_call_id: id,
                content,
            });
        }

        conversation.push(ChatMessage {
            role: ChatRole::User,
            content: ChatMessageContent::Blocks(results),
        });
    }

    warn!("Tool loop exceeded maximum iterations ({})", MAX_ITERATIONS);
    Err(anyhow!("Tool loop exceeded maximum iterations"))
}

/// Cap oversized tool output at a char boundary
fn truncate_output(mut output: String) -> String {
    if output.len() <= MAX_TOOL_OUTPUT {
        return output;
    }
    let mut cut = MAX_TOOL_OUTPUT;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str("\n[Output truncated]");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatResponse, ToolDefinition};
    use crate::tools::{ToolHandler, ToolRegistry, json_schema};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned responses and records the conversation it was sent
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ChatResponse>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
            _system: &str,
        ) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    fn tool_call(id: &str, query: &str) -> ChatResponse {
        ChatResponse {
            blocks: vec![ChatResponseBlock::ToolCall {
                id: id.to_string(),
                name: "lookup".to_string(),
                input: json!({"query": query}),
            }],
            stop_reason: StopReason::ToolUse,
            usage: ChatUsage { input_tokens: 10, output_tokens: 5 },
        }
    }

    fn answer(text: &str) -> ChatResponse {
        ChatResponse {
            blocks: vec![ChatResponseBlock::Text { text: text.to_string() }],
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage { input_tokens: 20, output_tokens: 7 },
        }
    }

    struct LookupTool {
        output: String,
    }

    #[async_trait]
    impl ToolHandler for LookupTool {
        fn name(&self) -> &str {
            "lookup"
        }

        fn description(&self) -> &str {
            "Look something up"
        }

        fn input_schema(&self) -> Value {
            json_schema(json!({"query": {"type": "string"}}), vec!["query"])
        }

        async fn execute(&self, _input: Value) -> Result<String> {
            Ok(self.output.clone())
        }
    }

    fn registry(output: &str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(LookupTool {
            output: output.to_string(),
        }));
        registry
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let provider = ScriptedProvider::new(vec![tool_call("c1", "rust"), answer("Rust is fast.")]);
        let (text, usage) = run_tool_loop(&provider, "what is rust?", "sys", &registry("lookup result"))
            .await
            .unwrap();

        assert_eq!(text, "Rust is fast.");
        assert_eq!(usage, ChatUsage { input_tokens: 30, output_tokens: 12 });

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        // user, assistant(tool call), user(tool result)
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        match &second[2].content {
            ChatMessageContent::Blocks(blocks) => assert!(matches!(
                &blocks[0],
                ChatBlock::ToolResult { tool_call_id, content }
                    if tool_call_id == "c1" && content == "lookup result"
            )),
            other => panic!("expected tool result blocks, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_to_model() {
        let mut call = tool_call("c1", "x");
        call.blocks = vec![ChatResponseBlock::ToolCall {
            id: "c1".to_string(),
            name: "missing".to_string(),
            input: json!({}),
        }];
        let provider = ScriptedProvider::new(vec![call, answer("done")]);
        let (text, _) = run_tool_loop(&provider, "q", "sys", &registry("")).await.unwrap();
        assert_eq!(text, "done");

        let seen = provider.seen.lock().unwrap();
        match &seen[1][2].content {
            ChatMessageContent::Blocks(blocks) => assert!(matches!(
                &blocks[0],
                ChatBlock::ToolResult { content, .. } if content.starts_with("Error: Unknown tool")
            )),
            other => panic!("expected tool result blocks, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let script = (0..=MAX_ITERATIONS).map(|i| tool_call(&format!("c{}", i), "again")).collect();
        let provider = ScriptedProvider::new(script);
        let err = run_tool_loop(&provider, "q", "sys", &registry("more")).await.unwrap_err();
        assert!(err.to_string().contains("maximum iterations"));
        assert_eq!(provider.seen.lock().unwrap().len(), MAX_ITERATIONS);
    }

    #[tokio::test]
    async fn test_empty_answer_is_error() {
        let provider = ScriptedProvider::new(vec![ChatResponse {
            blocks: vec![],
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage::default(),
        }]);
        assert!(run_tool_loop(&provider, "q", "sys", &registry("")).await.is_err());
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = ScriptedProvider::new(vec![]);
        let err = run_tool_loop(&provider, "q", "sys", &registry("")).await.unwrap_err();
        assert_eq!(err.to_string(), "script exhausted");
    }

    #[test]
    fn test_truncate_output() {
        let short = "short".to_string();
        assert_eq!(truncate_output(short.clone()), short);

        let long = "é".repeat(MAX_TOOL_OUTPUT);
        let truncated = truncate_output(long);
        assert!(truncated.ends_with("\n[Output truncated]"));
        assert!(truncated.len() <= MAX_TOOL_OUTPUT + "\n[Output truncated]".len());
    }
}
