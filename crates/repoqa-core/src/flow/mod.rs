//! Query-time control flow: a transition-table graph and the retrieval QA flow
//! built on it.

pub mod graph;
pub mod qa;

pub use graph::{END, FlowBuilder, FlowGraph, Node};
pub use qa::{GraphState, QA_NODE, QaNode, RetrievalQaFlow};

use repoqa_index::RetrievalError;
use repoqa_llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("answer generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("question is empty")]
    EmptyQuestion,

    #[error("answer already set")]
    AnswerAlreadySet,

    #[error("flow has no entry node")]
    MissingEntry,

    #[error("unknown flow node: {0}")]
    UnknownNode(String),

    #[error("edge {from} -> {to} targets an unknown node")]
    DanglingEdge { from: String, to: String },

    #[error("node {0} has no outgoing edge")]
    NoOutgoingEdge(String),

    #[error("node {0} registered twice")]
    DuplicateNode(String),

    #[error("node {0} has more than one outgoing edge")]
    DuplicateEdge(String),

    #[error("node name {0} is reserved")]
    ReservedName(String),

    #[error("flow did not terminate within {0} steps")]
    StepLimit(usize),
}
