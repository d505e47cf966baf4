//! Workflow graph and builder

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::{self, Debug};
use std::sync::Arc;

use super::error::WorkflowError;
use super::state::{StateField, WorkflowState};
use super::step::{OnErrorAction, WorkflowStep};

/// Target name that ends the workflow
pub const END: &str = "__end__";

/// Picks the next step from the current state
pub type Router = Arc<dyn Fn(&WorkflowState) -> String + Send + Sync>;

/// A named step in a graph
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub step: Arc<dyn WorkflowStep>,
    pub on_error: OnErrorAction,
}

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    Direct(String),
    Conditional { targets: Vec<String>, router: Router },
}

impl Edge {
    /// Every target this edge can lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Direct(target) => vec![target.as_str()],
            Self::Conditional { targets, .. } => targets.iter().map(String::as_str).collect(),
        }
    }
}

impl Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(target) => f.debug_tuple("Direct").field(target).finish(),
            Self::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
        }
    }
}

/// A validated directed graph of named steps
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    name: String,
    entry: String,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
}

impl WorkflowGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Resolve the step that follows `from`
    pub fn next(&self, from: &str, state: &WorkflowState) -> Result<String, WorkflowError> {
        match self.edges.get(from) {
            Some(Edge::Direct(target)) => Ok(target.clone()),
            Some(Edge::Conditional { targets, router }) => {
                let target = router(state);
                if targets.contains(&target) {
                    Ok(target)
                } else {
                    Err(WorkflowError::invalid_route(from, target))
                }
            }
            None => Err(WorkflowError::missing_edge(from)),
        }
    }
}

/// Builds a [`WorkflowGraph`], validating it on `build`
pub struct WorkflowGraphBuilder {
    name: String,
    entry: Option<String>,
    order: Vec<String>,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    errors: Vec<WorkflowError>,
}

impl WorkflowGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            order: Vec::new(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Add a step whose failures are absorbed
    pub fn add_node(self, name: &str, step: impl WorkflowStep + 'static) -> Self {
        self.add_node_with(name, Arc::new(step), OnErrorAction::SkipStep)
    }

    /// Add a step whose failures end the workflow with an error
    pub fn add_terminal_node(self, name: &str, step: impl WorkflowStep + 'static) -> Self {
        self.add_node_with(name, Arc::new(step), OnErrorAction::FailWorkflow)
    }

    pub fn add_node_with(
        mut self,
        name: &str,
        step: Arc<dyn WorkflowStep>,
        on_error: OnErrorAction,
    ) -> Self {
        if name == END || self.nodes.contains_key(name) {
            self.errors.push(WorkflowError::duplicate_step(name));
            return self;
        }
        self.order.push(name.to_string());
        self.nodes.insert(
            name.to_string(),
            Node {
                name: name.to_string(),
                step,
                on_error,
            },
        );
        self
    }

    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        self.insert_edge(from, Edge::Direct(to.to_string()));
        self
    }

    /// Route from `from` to one of `targets`, chosen by `router`
    pub fn add_conditional_edges<F>(mut self, from: &str, targets: &[&str], router: F) -> Self
    where
        F: Fn(&WorkflowState) -> String + Send + Sync + 'static,
    {
        let edge = Edge::Conditional {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            router: Arc::new(router),
        };
        self.insert_edge(from, edge);
        self
    }

    pub fn set_entry(mut self, name: &str) -> Self {
        self.entry = Some(name.to_string());
        self
    }

    fn insert_edge(&mut self, from: &str, edge: Edge) {
        if self.edges.insert(from.to_string(), edge).is_some() {
            self.errors.push(WorkflowError::validation(format!(
                "Step '{}' has more than one outgoing edge",
                from
            )));
        }
    }

    /// Validate structure and field flow, then freeze the graph
    pub fn build(self) -> Result<WorkflowGraph, WorkflowError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let entry = self
            .entry
            .clone()
            .ok_or_else(|| WorkflowError::missing_entry(&self.name))?;
        if !self.nodes.contains_key(&entry) {
            return Err(WorkflowError::step_not_found(entry));
        }

        for from in self.edges.keys() {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowError::step_not_found(from.clone()));
            }
        }
        for name in &self.order {
            let edge = self
                .edges
                .get(name)
                .ok_or_else(|| WorkflowError::missing_edge(name.clone()))?;
            for target in edge.targets() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(WorkflowError::step_not_found(target));
                }
            }
        }

        let graph = WorkflowGraph {
            name: self.name,
            entry,
            nodes: self.nodes,
            edges: self.edges,
        };

        let reachable = reachable_from_entry(&graph);
        check_end_reachable(&graph, &self.order, &reachable)?;
        check_field_flow(&graph, &self.order, &reachable)?;

        Ok(graph)
    }
}

fn reachable_from_entry(graph: &WorkflowGraph) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([graph.entry.clone()]);

    while let Some(name) = queue.pop_front() {
        if name == END || !seen.insert(name.clone()) {
            continue;
        }
        if let Some(edge) = graph.edges.get(&name) {
            queue.extend(edge.targets().into_iter().map(str::to_string));
        }
    }
    seen
}

fn check_end_reachable(
    graph: &WorkflowGraph,
    order: &[String],
    reachable: &HashSet<String>,
) -> Result<(), WorkflowError> {
    let mut reaches_end: HashSet<&str> = HashSet::new();
    let mut changed = true;

    while changed {
        changed = false;
        for name in order {
            if reaches_end.contains(name.as_str()) {
                continue;
            }
            let leads_out = graph.edges[name]
                .targets()
                .into_iter()
                .any(|t| t == END || reaches_end.contains(t));
            if leads_out {
                reaches_end.insert(name);
                changed = true;
            }
        }
    }

    match order
        .iter()
        .find(|n| reachable.contains(*n) && !reaches_end.contains(n.as_str()))
    {
        Some(stuck) => Err(WorkflowError::unreachable_end(stuck.clone())),
        None => Ok(()),
    }
}

/// Must-be-available analysis: a field is available on entry to a step only
/// if every path from the workflow entry produces it first.
fn check_field_flow(
    graph: &WorkflowGraph,
    order: &[String],
    reachable: &HashSet<String>,
) -> Result<(), WorkflowError> {
    let all: BTreeSet<StateField> = StateField::ALL.into_iter().collect();

    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    for name in order.iter().filter(|n| reachable.contains(*n)) {
        for target in graph.edges[name].targets() {
            if target != END {
                predecessors.entry(target).or_default().push(name);
            }
        }
    }

    let produces: HashMap<&str, BTreeSet<StateField>> = order
        .iter()
        .map(|n| (n.as_str(), graph.nodes[n].step.produces().into_iter().collect()))
        .collect();

    let mut available_out: HashMap<&str, BTreeSet<StateField>> =
        order.iter().map(|n| (n.as_str(), all.clone())).collect();
    let mut available_in: HashMap<&str, BTreeSet<StateField>> = HashMap::new();

    let mut changed = true;
    while changed {
        changed = false;
        for name in order.iter().filter(|n| reachable.contains(*n)) {
            let mut incoming = if *name == graph.entry {
                BTreeSet::new()
            } else {
                all.clone()
            };
            for pred in predecessors.get(name.as_str()).into_iter().flatten() {
                incoming = incoming
                    .intersection(&available_out[pred])
                    .copied()
                    .collect();
            }

            let outgoing: BTreeSet<StateField> =
                incoming.union(&produces[name.as_str()]).copied().collect();
            if available_out[name.as_str()] != outgoing {
                available_out.insert(name, outgoing);
                changed = true;
            }
            available_in.insert(name, incoming);
        }
    }

    for name in order.iter().filter(|n| reachable.contains(*n)) {
        let incoming = &available_in[name.as_str()];
        if let Some(field) = graph.nodes[name]
            .step
            .requires()
            .into_iter()
            .find(|f| !incoming.contains(f))
        {
            return Err(WorkflowError::unsatisfied_field(name.clone(), field.as_str()));
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_steps {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::domain::error::DomainError;
    use crate::domain::workflow::step::Ports;

    /// Step with declared fields that writes a marker into the draft answer
    #[derive(Debug)]
    pub struct FieldStep {
        pub requires: Vec<StateField>,
        pub produces: Vec<StateField>,
        pub fail: bool,
    }

    impl FieldStep {
        pub fn new(requires: Vec<StateField>, produces: Vec<StateField>) -> Self {
            Self {
                requires,
                produces,
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                requires: Vec::new(),
                produces: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl WorkflowStep for FieldStep {
        fn kind(&self) -> &'static str {
            "field"
        }

        fn requires(&self) -> Vec<StateField> {
            self.requires.clone()
        }

        fn produces(&self) -> Vec<StateField> {
            self.produces.clone()
        }

        async fn run(&self, state: &mut WorkflowState, _ports: &Ports) -> Result<Value, DomainError> {
            if self.fail {
                return Err(DomainError::generation_failed("test", "boom"));
            }
            let count = state.draft_answer.as_deref().map(|d| d.len()).unwrap_or(0);
            state.draft_answer = Some("x".repeat(count + 1));
            Ok(json!({"len": count + 1}))
        }
    }
}
