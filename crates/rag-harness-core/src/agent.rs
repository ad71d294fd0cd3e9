//! Tool-using agent over the corpus.
//!
//! [`SearchAgent`] answers a question by letting the model call a single
//! `Search` tool before it commits to an answer. Each model turn must be one
//! JSON decision:
//!
//! ```text
//! {"type":"tool_call","tool_name":"Search","tool_args":{"query":"..."}}
//! {"type":"final","content":"..."}
//! ```
//!
//! The `{"action": ..., "action_input": ...}` form is accepted as well. A
//! reply that holds no decision is taken as the final answer.
//!
//! Tool observations accumulate in a transcript owned by one
//! [`SearchAgent::run`] call and dropped when it returns. Streaming skips
//! the tool loop and forwards the model's output for the bare query.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AgentError, StoreError};
use crate::models::GenerationRequest;
use crate::pipeline::{EventStream, RagOrchestrator};
use crate::retrieve::ContextRetriever;

/// Observation returned when the corpus has no match.
pub const NO_RESULTS: &str = "No relevant information found.";

/// Hits folded into one search observation.
pub const SEARCH_TOOL_HITS: usize = 3;

/// Keyword search over the corpus, exposed to the model as a tool.
#[derive(Clone)]
pub struct SearchTool {
    retriever: ContextRetriever,
}

impl SearchTool {
    pub const NAME: &'static str = "Search";
    pub const DESCRIPTION: &'static str =
        "Useful for searching information in the knowledge base.";

    pub fn new(retriever: ContextRetriever) -> Self {
        Self { retriever }
    }

    /// Contents of the best [`SEARCH_TOOL_HITS`] hits, one per line, or
    /// [`NO_RESULTS`].
    pub async fn call(&self, query: &str) -> Result<String, StoreError> {
        let hits = self.retriever.search(query).await?;
        if hits.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }
        Ok(hits
            .iter()
            .take(SEARCH_TOOL_HITS)
            .map(|hit| hit.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Final(String),
    ToolCall { name: String, input: String },
}

#[derive(Clone)]
pub struct SearchAgent {
    rag: RagOrchestrator,
    tool: SearchTool,
    max_steps: usize,
}

impl SearchAgent {
    pub fn new(rag: RagOrchestrator, max_steps: usize) -> Self {
        let tool = SearchTool::new(rag.retriever().clone());
        Self {
            rag,
            tool,
            max_steps,
        }
    }

    pub fn tool(&self) -> &SearchTool {
        &self.tool
    }

    /// Run the tool loop until the model gives a final answer.
    ///
    /// Fails with [`AgentError::StepLimit`] when `max_steps` model turns
    /// pass without one.
    pub async fn run(&self, request: &GenerationRequest) -> Result<String, AgentError> {
        let mut transcript = String::new();
        for step in 1..=self.max_steps {
            let prompt = agent_prompt(&request.query, &transcript);
            let reply = self
                .rag
                .generate(&prompt, &request.model)
                .await
                .map_err(AgentError::Model)?;

            match parse_decision(&reply) {
                Decision::Final(answer) => {
                    info!(model = %request.model, steps = step, "agent answered");
                    return Ok(answer);
                }
                Decision::ToolCall { name, input } => {
                    debug!(step, tool = %name, input = %input, "agent tool call");
                    let observation = if name.eq_ignore_ascii_case(SearchTool::NAME) {
                        self.tool.call(&input).await.map_err(AgentError::Tool)?
                    } else {
                        format!(
                            "Unknown tool '{}'. The only tool is {}.",
                            name,
                            SearchTool::NAME
                        )
                    };
                    transcript.push_str(&format!(
                        "Assistant: {}\nObservation: {}\n",
                        reply.trim(),
                        observation
                    ));
                }
            }
        }
        warn!(model = %request.model, max_steps = self.max_steps, "agent gave no final answer");
        Err(AgentError::StepLimit(self.max_steps))
    }

    /// Stream the model's answer to the bare query.
    pub fn stream(&self, request: GenerationRequest) -> EventStream {
        self.rag.generate_stream(request.query, request.model)
    }
}

fn agent_prompt(query: &str, transcript: &str) -> String {
    format!(
        r#"You are a helpful assistant with access to one tool:

{name}: {description}

To use the tool, respond ONLY with JSON in this format:
{{"type":"tool_call","tool_name":"{name}","tool_args":{{"query":"..."}}}}
When you have the final answer, respond ONLY with JSON in this format:
{{"type":"final","content":"..."}}

Question: {query}
{transcript}"#,
        name = SearchTool::NAME,
        description = SearchTool::DESCRIPTION,
    )
}

fn parse_decision(text: &str) -> Decision {
    parse_json_from_text(text)
        .and_then(|value| decision_from_value(&value))
        .unwrap_or_else(|| Decision::Final(text.trim().to_string()))
}

fn parse_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

fn decision_from_value(value: &Value) -> Option<Decision> {
    let kind = value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(Value::as_str)?;

    match kind {
        "final" => {
            let content = value
                .get("content")
                .or_else(|| value.get("response"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Some(Decision::Final(content.to_string()))
        }
        "Final Answer" => Some(Decision::Final(string_input(value.get("action_input")))),
        "tool_call" => {
            let name = value
                .get("tool_name")
                .or_else(|| value.get("tool"))
                .and_then(Value::as_str)?;
            let args = value.get("tool_args");
            let input = args
                .and_then(|args| args.get("query"))
                .or(args)
                .map(|input| string_input(Some(input)))
                .unwrap_or_default();
            Some(Decision::ToolCall {
                name: name.to_string(),
                input,
            })
        }
        name => Some(Decision::ToolCall {
            name: name.to_string(),
            input: string_input(value.get("action_input")),
        }),
    }
}

/// A tool input given either as a plain string or as structured JSON.
fn string_input(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::generation::{FragmentStream, Generator};
    use crate::models::{NewDocument, StreamEvent};
    use crate::retrieve::RetrievalParams;
    use crate::store::memory::InMemoryStore;
    use crate::store::DocumentStore;
    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned replies and records every prompt.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, _: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| GenerationError::Backend("script exhausted".into()))
        }

        async fn generate_stream(
            &self,
            prompt: &str,
            _: &str,
        ) -> Result<FragmentStream, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(stream::iter(vec![Ok("streamed ".to_string()), Ok(prompt.to_string())]).boxed())
        }
    }

    async fn agent(generator: Arc<ScriptedGenerator>, docs: &[(&str, &str)]) -> SearchAgent {
        let store = InMemoryStore::new();
        for (title, content) in docs {
            store
                .index_document("context", &NewDocument::new(*title, *content))
                .await
                .unwrap();
        }
        let retriever = ContextRetriever::new(Arc::new(store), RetrievalParams::default());
        SearchAgent::new(RagOrchestrator::new(retriever, generator), 3)
    }

    fn request(query: &str) -> GenerationRequest {
        GenerationRequest::new(query, None, "llama2").unwrap()
    }

    const CORPUS: [(&str, &str); 5] = [
        ("AI", "AI is the simulation of human intelligence."),
        ("ML", "Machine learning is a subset of AI."),
        ("NLP", "NLP is a branch of AI for language."),
        ("Vision", "Computer vision is AI for images."),
        ("Cooking", "Boil water for pasta."),
    ];

    #[tokio::test]
    async fn test_search_tool_joins_top_three_contents() {
        let agent = agent(ScriptedGenerator::new(&[]), &CORPUS).await;
        let observation = agent.tool().call("AI").await.unwrap();
        assert_eq!(observation.lines().count(), SEARCH_TOOL_HITS);
        assert!(!observation.contains("pasta"));
    }

    #[tokio::test]
    async fn test_search_tool_without_hits() {
        let agent = agent(ScriptedGenerator::new(&[]), &CORPUS).await;
        assert_eq!(agent.tool().call("squirrels").await.unwrap(), NO_RESULTS);
    }

    #[tokio::test]
    async fn test_immediate_final_answer() {
        let generator = ScriptedGenerator::new(&[r#"{"type":"final","content":"Hello!"}"#]);
        let agent = agent(generator.clone(), &CORPUS).await;

        assert_eq!(agent.run(&request("Hi")).await.unwrap(), "Hello!");
        assert_eq!(generator.prompts().len(), 1);
        assert!(generator.prompts()[0].contains("Question: Hi"));
    }

    #[tokio::test]
    async fn test_tool_observation_feeds_next_turn() {
        let generator = ScriptedGenerator::new(&[
            r#"{"type":"tool_call","tool_name":"Search","tool_args":{"query":"machine learning"}}"#,
            r#"{"type":"final","content":"A subset of AI."}"#,
        ]);
        let agent = agent(generator.clone(), &CORPUS).await;

        assert_eq!(
            agent.run(&request("What is ML?")).await.unwrap(),
            "A subset of AI."
        );
        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Observation: Machine learning is a subset of AI."));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let generator = ScriptedGenerator::new(&[
            r#"{"action":"Calculator","action_input":"2+2"}"#,
            r#"{"action":"Final Answer","action_input":"4"}"#,
        ]);
        let agent = agent(generator.clone(), &CORPUS).await;

        assert_eq!(agent.run(&request("2+2?")).await.unwrap(), "4");
        assert!(generator.prompts()[1].contains("Unknown tool 'Calculator'"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let call = r#"{"action":"Search","action_input":"AI"}"#;
        let agent = agent(ScriptedGenerator::new(&[call, call, call, call]), &CORPUS).await;
        assert_eq!(
            agent.run(&request("loop")).await,
            Err(AgentError::StepLimit(3))
        );
    }

    #[tokio::test]
    async fn test_model_failure_is_reported() {
        let agent = agent(ScriptedGenerator::new(&[]), &CORPUS).await;
        assert!(matches!(
            agent.run(&request("Hi")).await,
            Err(AgentError::Model(GenerationError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn test_stream_forwards_bare_query() {
        let generator = ScriptedGenerator::new(&[]);
        let agent = agent(generator.clone(), &CORPUS).await;

        let events: Vec<StreamEvent> = agent.stream(request("What is AI?")).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk {
                    text: "streamed ".into()
                },
                StreamEvent::Chunk {
                    text: "What is AI?".into()
                },
                StreamEvent::End,
            ]
        );
        assert_eq!(generator.prompts(), vec!["What is AI?"]);
    }

    #[test]
    fn test_parse_decision_forms() {
        assert_eq!(
            parse_decision("Sure.\n{\"type\":\"final\",\"content\":\"42\"}\nDone."),
            Decision::Final("42".into())
        );
        assert_eq!(
            parse_decision(r#"{"type":"tool_call","tool_name":"Search","tool_args":"rust"}"#),
            Decision::ToolCall {
                name: "Search".into(),
                input: "rust".into()
            }
        );
        assert_eq!(
            parse_decision(r#"{"action":"Search","action_input":"rust"}"#),
            Decision::ToolCall {
                name: "Search".into(),
                input: "rust".into()
            }
        );
        assert_eq!(
            parse_decision("  Plain prose answer. "),
            Decision::Final("Plain prose answer.".into())
        );
        assert_eq!(
            parse_decision(r#"{"unrelated":true}"#),
            Decision::Final(r#"{"unrelated":true}"#.into())
        );
    }
}
