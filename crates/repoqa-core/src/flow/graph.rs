//! Directed flow over a transition table.
//!
//! A [`FlowGraph`] maps node names to a handler and the name of the node that runs
//! next. Execution starts at the entry node and follows the table until a node
//! transitions to [`END`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::FlowError;

/// Terminal pseudo-node. Never registered as a handler.
pub const END: &str = "__end__";

const DEFAULT_MAX_STEPS: usize = 25;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A flow node: consumes the state and hands back the updated state.
pub trait Node<S>: Send + Sync {
    fn run(&self, state: S) -> BoxFuture<'_, Result<S, FlowError>>;
}

struct Transition<S> {
    node: Box<dyn Node<S>>,
    next: String,
}

pub struct FlowGraph<S> {
    entry: String,
    table: HashMap<String, Transition<S>>,
    max_steps: usize,
}

impl<S> std::fmt::Debug for FlowGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut edges: Vec<_> = self
            .table
            .iter()
            .map(|(name, t)| (name.as_str(), t.next.as_str()))
            .collect();
        edges.sort_unstable();
        f.debug_struct("FlowGraph")
            .field("entry", &self.entry)
            .field("edges", &edges)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl<S: Send> FlowGraph<S> {
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Successor of `node`, if it is registered.
    #[must_use]
    pub fn next_of(&self, node: &str) -> Option<&str> {
        self.table.get(node).map(|t| t.next.as_str())
    }

    /// Run the flow from the entry node until it reaches [`END`].
    ///
    /// # Errors
    ///
    /// Propagates the first node error unchanged, or returns
    /// [`FlowError::StepLimit`] when `END` is not reached within the step ceiling.
    pub async fn run(&self, mut state: S) -> Result<S, FlowError> {
        let mut current = self.entry.as_str();
        for step in 0..self.max_steps {
            let transition = self
                .table
                .get(current)
                .ok_or_else(|| FlowError::UnknownNode(current.to_owned()))?;
            tracing::debug!(node = current, step, "running flow node");
            state = transition.node.run(state).await?;
            if transition.next == END {
                return Ok(state);
            }
            current = &transition.next;
        }
        Err(FlowError::StepLimit(self.max_steps))
    }
}

/// Collects nodes and edges and validates them into a [`FlowGraph`].
pub struct FlowBuilder<S> {
    nodes: HashMap<String, Box<dyn Node<S>>>,
    edges: HashMap<String, String>,
    entry: Option<String>,
    max_steps: usize,
    errors: Vec<FlowError>,
}

impl<S> Default for FlowBuilder<S> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            max_steps: DEFAULT_MAX_STEPS,
            errors: Vec::new(),
        }
    }
}

impl<S: Send> FlowBuilder<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node(mut self, name: impl Into<String>, node: impl Node<S> + 'static) -> Self {
        let name = name.into();
        if name == END {
            self.errors.push(FlowError::ReservedName(name));
        } else if self.nodes.insert(name.clone(), Box::new(node)).is_some() {
            self.errors.push(FlowError::DuplicateNode(name));
        }
        self
    }

    #[must_use]
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        if self.edges.insert(from.clone(), to.into()).is_some() {
            self.errors.push(FlowError::DuplicateEdge(from));
        }
        self
    }

    #[must_use]
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Upper bound on node executions per run.
    #[must_use]
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// # Errors
    ///
    /// Returns the first structural problem: a duplicate or reserved node name, a
    /// missing or unknown entry, an edge touching an unregistered node, or a node
    /// without an outgoing edge.
    pub fn build(mut self) -> Result<FlowGraph<S>, FlowError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let entry = self.entry.ok_or(FlowError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(FlowError::UnknownNode(entry));
        }

        let mut sources: Vec<&String> = self.edges.keys().collect();
        sources.sort_unstable();
        for from in sources {
            let to = &self.edges[from];
            if !self.nodes.contains_key(from) {
                return Err(FlowError::UnknownNode(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(FlowError::DanglingEdge {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }

        let mut table = HashMap::with_capacity(self.nodes.len());
        for (name, node) in self.nodes.drain() {
            let next = self
                .edges
                .remove(&name)
                .ok_or_else(|| FlowError::NoOutgoingEdge(name.clone()))?;
            table.insert(name, Transition { node, next });
        }

        Ok(FlowGraph {
            entry,
            table,
            max_steps: self.max_steps.max(1),
        })
    }
}
