//! Goals and tasks
//!
//! A [`Goal`] is one unit of user intent carrying an ordered DAG of
//! [`TaskSpec`]s; the planner materializes those specs into [`Task`]s on the
//! task queue, holding back dependents until their predecessors complete.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse intent tag on a goal. The set is open: tags minted by newer
/// planners deserialize into `Other` instead of failing the goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    CreateGraph,
    CreateNode,
    AnalyzeGraph,
    PopulateGraph,
    #[serde(untagged)]
    Other(String),
}

/// Executable tool tag on a task. Open set, like [`GoalKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    VerifyState,
    ListAvailableGraphs,
    GetGraphInstances,
    IdentifyPatterns,
    CreateGraph,
    ReadGraphStructure,
    CreateNode,
    CreateSubgraph,
    CreatePopulatedGraph,
    DefineConnections,
    #[serde(untagged)]
    Other(String),
}

impl ToolName {
    /// Read-side tools yield `readResponse` ops instead of mutations.
    pub fn is_read_side(&self) -> bool {
        matches!(
            self,
            ToolName::VerifyState
                | ToolName::ListAvailableGraphs
                | ToolName::GetGraphInstances
                | ToolName::IdentifyPatterns
                | ToolName::ReadGraphStructure
        )
    }
}

/// One step inside a goal's DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tool_name: ToolName,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl TaskSpec {
    pub fn new(tool_name: ToolName) -> Self {
        Self {
            id: None,
            tool_name,
            args: Value::Null,
            depends_on: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn depends_on(mut self, ids: Vec<String>) -> Self {
        self.depends_on = ids;
        self
    }
}

/// A unit of user intent queued for the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(rename = "type", default = "goal_type")]
    pub item_type: String,
    pub goal: GoalKind,
    #[serde(default)]
    pub dag: Vec<TaskSpec>,
    /// Correlation and partition key for everything derived from this goal.
    pub thread_id: String,
    pub created_at: i64,
}

fn goal_type() -> String {
    "goal".to_string()
}

impl Goal {
    pub fn new(goal: GoalKind, dag: Vec<TaskSpec>, thread_id: impl Into<String>) -> Self {
        Self {
            id: crate::ids::fresh_id("goal"),
            item_type: goal_type(),
            goal,
            dag,
            thread_id: thread_id.into(),
            created_at: crate::now_ms(),
        }
    }
}

/// One executable step, materialized from a [`TaskSpec`] by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub thread_id: String,
    pub tool_name: ToolName,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Correlation id of the chat turn that spawned this task, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

impl Task {
    pub fn from_spec(spec: &TaskSpec, thread_id: impl Into<String>) -> Self {
        Self {
            id: spec
                .id
                .clone()
                .unwrap_or_else(|| crate::ids::fresh_id("task")),
            thread_id: thread_id.into(),
            tool_name: spec.tool_name.clone(),
            args: spec.args.clone(),
            depends_on: spec.depends_on.clone(),
            cid: None,
        }
    }
}
