use std::sync::Arc;

use repoqa_index::{RepoRef, Retriever, format_as_context};
use repoqa_llm::{LlmProvider, Message};

use super::FlowError;
use super::graph::{BoxFuture, END, FlowBuilder, FlowGraph, Node};
use crate::config::DEFAULT_SYSTEM_PROMPT;

pub const QA_NODE: &str = "qa";

/// State threaded through a query flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphState {
    pub question: String,
    answer: Option<String>,
}

impl GraphState {
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: None,
        }
    }

    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    #[must_use]
    pub fn into_answer(self) -> Option<String> {
        self.answer
    }

    /// Record the answer. A state is answered at most once.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::AnswerAlreadySet`] if an answer is already present.
    pub fn set_answer(&mut self, answer: String) -> Result<(), FlowError> {
        if self.answer.is_some() {
            return Err(FlowError::AnswerAlreadySet);
        }
        self.answer = Some(answer);
        Ok(())
    }
}

/// Retrieves code context for the question and asks the language model.
pub struct QaNode<E, L> {
    retriever: Retriever<E>,
    llm: Arc<L>,
    system_prompt: String,
    scope: Option<RepoRef>,
}

impl<E: LlmProvider, L: LlmProvider> QaNode<E, L> {
    #[must_use]
    pub fn new(retriever: Retriever<E>, llm: Arc<L>) -> Self {
        Self {
            retriever,
            llm,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            scope: None,
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Restrict retrieval to chunks indexed from `repo`.
    #[must_use]
    pub fn with_scope(mut self, repo: RepoRef) -> Self {
        self.scope = Some(repo);
        self
    }

    fn messages(&self, context: &str, question: &str) -> Vec<Message> {
        let user = if context.is_empty() {
            format!("No code context was retrieved for this question.\n\nQuestion: {question}")
        } else {
            format!("{context}\n\nQuestion: {question}")
        };
        vec![Message::system(&self.system_prompt), Message::user(user)]
    }
}

impl<E, L> Node<GraphState> for QaNode<E, L>
where
    E: LlmProvider + 'static,
    L: LlmProvider + 'static,
{
    fn run(&self, mut state: GraphState) -> BoxFuture<'_, Result<GraphState, FlowError>> {
        Box::pin(async move {
            let chunks = self
                .retriever
                .retrieve(&state.question, self.scope.as_ref())
                .await?;
            tracing::debug!(chunks = chunks.len(), llm = self.llm.name(), "generating answer");

            let context = format_as_context(&chunks);
            let messages = self.messages(&context, &state.question);
            let answer = self.llm.chat(&messages).await?;
            state.set_answer(answer)?;
            Ok(state)
        })
    }
}

/// Question answering over an indexed repository: entry → qa → end.
#[derive(Debug)]
pub struct RetrievalQaFlow {
    graph: FlowGraph<GraphState>,
}

impl RetrievalQaFlow {
    /// # Errors
    ///
    /// Returns an error if the flow graph fails validation.
    pub fn new<E, L>(node: QaNode<E, L>) -> Result<Self, FlowError>
    where
        E: LlmProvider + 'static,
        L: LlmProvider + 'static,
    {
        let graph = FlowBuilder::new()
            .node(QA_NODE, node)
            .edge(QA_NODE, END)
            .entry(QA_NODE)
            .build()?;
        Ok(Self { graph })
    }

    #[must_use]
    pub fn graph(&self) -> &FlowGraph<GraphState> {
        &self.graph
    }

    /// Answer `question` from the indexed code.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::EmptyQuestion`] for a blank question. Retrieval and
    /// generation errors are returned as they occur, without retry.
    pub async fn ask(&self, question: &str) -> Result<GraphState, FlowError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(FlowError::EmptyQuestion);
        }
        self.graph.run(GraphState::new(question)).await
    }
}
