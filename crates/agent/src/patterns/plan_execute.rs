//! Plan-and-execute: a planner fills a task queue, an executor works
//! through it, an optional replanner may add tasks after each step, and a
//! synthesizer combines the findings.
//!
//! The queue belongs to one run. It is created in [`PlanExecute::run`] and
//! handed to the planner and replanner tools through a shared handle, so
//! concurrent runs never see each other's tasks.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentry_core::error::ToolError;
use agentry_core::provider::Usage;
use agentry_core::tool::Tool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::loop_runner::Agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub title: String,
    pub action: String,
    pub argument: String,
    pub status: TaskStatus,
}

/// An ordered task list with a hard size limit.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    max_tasks: usize,
}

impl TaskQueue {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            tasks: Vec::new(),
            max_tasks,
        }
    }

    /// Append a pending task. Fails once `max_tasks` tasks exist.
    pub fn add(
        &mut self,
        title: impl Into<String>,
        action: impl Into<String>,
        argument: impl Into<String>,
    ) -> Result<u32, String> {
        if self.tasks.len() >= self.max_tasks {
            return Err(format!("task limit of {} reached", self.max_tasks));
        }
        let id = self.tasks.len() as u32 + 1;
        self.tasks.push(Task {
            id,
            title: title.into(),
            action: action.into(),
            argument: argument.into(),
            status: TaskStatus::Pending,
        });
        Ok(id)
    }

    /// Mark the first pending task in progress and return a copy of it.
    pub fn start_next(&mut self) -> Option<Task> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.status == TaskStatus::Pending)?;
        task.status = TaskStatus::InProgress;
        Some(task.clone())
    }

    pub fn complete(&mut self, id: u32) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.status = TaskStatus::Done;
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// One line per task: `#<id> [<status>] <title>`.
    pub fn summary(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks in queue.".into();
        }
        self.tasks
            .iter()
            .map(|t| format!("#{} [{}] {}", t.id, t.status, t.title))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Handle to one run's queue.
pub type SharedQueue = Arc<Mutex<TaskQueue>>;

fn lock(queue: &SharedQueue) -> MutexGuard<'_, TaskQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `add_task {title, action, argument}`
pub struct AddTaskTool {
    queue: SharedQueue,
}

impl AddTaskTool {
    pub fn new(queue: SharedQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Tool for AddTaskTool {
    fn name(&self) -> &str {
        "add_task"
    }

    fn description(&self) -> &str {
        "Add a research task with a title, an action and its argument."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "action": { "type": "string" },
                "argument": { "type": "string" }
            },
            "required": ["title", "action", "argument"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let field = |key: &str| {
            arguments[key]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ToolError::InvalidArguments {
                    tool_name: "add_task".into(),
                    reason: format!("missing '{key}'"),
                })
        };
        let (title, action, argument) = (field("title")?, field("action")?, field("argument")?);

        let id = lock(&self.queue)
            .add(&title, action, argument)
            .map_err(|reason| ToolError::ExecutionFailed {
                tool_name: "add_task".into(),
                reason,
            })?;
        Ok(format!("Added task #{id}: {title}").into())
    }
}

/// `get_tasks {}`
pub struct GetTasksTool {
    queue: SharedQueue,
}

impl GetTasksTool {
    pub fn new(queue: SharedQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Tool for GetTasksTool {
    fn name(&self) -> &str {
        "get_tasks"
    }

    fn description(&self) -> &str {
        "Get all tasks with their current status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        Ok(lock(&self.queue).summary().into())
    }
}

/// The replanner's verdict after each executed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplanDecision {
    pub should_replan: bool,
    pub reasoning: String,
}

impl ReplanDecision {
    pub fn schema() -> agentry_core::OutputSchema {
        agentry_core::OutputSchema::new(
            "replan_decision",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "should_replan": { "type": "boolean" },
                    "reasoning": { "type": "string" }
                },
                "required": ["should_replan", "reasoning"]
            }),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub task: Task,
    pub output: String,
}

#[derive(Debug)]
pub struct PlanExecuteResult {
    pub answer: String,
    pub findings: Vec<Finding>,
    pub tasks: Vec<Task>,
    pub usage: Usage,
}

/// The four roles of a plan-and-execute run.
pub struct PlanExecute {
    planner: Agent,
    executor: Agent,
    replanner: Option<Agent>,
    synthesizer: Agent,
    max_tasks: usize,
}

impl PlanExecute {
    /// Without a replanner the plan is static.
    pub fn new(planner: Agent, executor: Agent, synthesizer: Agent) -> Self {
        Self {
            planner,
            executor,
            replanner: None,
            synthesizer,
            max_tasks: 10,
        }
    }

    /// The replanner gets `add_task` and `get_tasks` and should answer
    /// with a [`ReplanDecision`].
    pub fn with_replanner(mut self, replanner: Agent) -> Self {
        self.replanner = Some(replanner);
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub async fn run(&self, question: &str) -> Result<PlanExecuteResult, AgentError> {
        let queue: SharedQueue = Arc::new(Mutex::new(TaskQueue::new(self.max_tasks)));
        let mut usage = Usage::default();

        let planner = self
            .planner
            .clone()
            .with_tool(Arc::new(AddTaskTool::new(queue.clone())));
        usage += planner.run(question, Vec::new()).await?.usage;
        info!(tasks = lock(&queue).tasks().len(), "Plan created");

        let replanner = self.replanner.as_ref().map(|r| {
            r.clone()
                .with_tool(Arc::new(AddTaskTool::new(queue.clone())))
                .with_tool(Arc::new(GetTasksTool::new(queue.clone())))
        });

        let mut findings: Vec<Finding> = Vec::new();
        loop {
            let Some(task) = lock(&queue).start_next() else {
                break;
            };
            debug!(task = task.id, title = %task.title, "Executing task");

            let run = self
                .executor
                .run(&format!("Execute: {}({})", task.action, task.argument), Vec::new())
                .await?;
            usage += run.usage;
            lock(&queue).complete(task.id);
            findings.push(Finding {
                task: Task {
                    status: TaskStatus::Done,
                    ..task
                },
                output: run.text(),
            });

            if let Some(replanner) = &replanner {
                let context = format!(
                    "Completed findings:\n{}\n\nCurrent queue:\n{}",
                    format_findings(&findings, "\n"),
                    lock(&queue).summary()
                );
                let (decision, run) = replanner.run_typed::<ReplanDecision>(&context).await?;
                usage += run.usage;
                info!(
                    should_replan = decision.should_replan,
                    pending = lock(&queue).pending(),
                    reasoning = %decision.reasoning,
                    "Replan decision"
                );
            }
        }

        let synthesis = self
            .synthesizer
            .run(
                &format!(
                    "Findings:\n\n{}\n\nSynthesize into a final answer.",
                    format_findings(&findings, "\n\n")
                ),
                Vec::new(),
            )
            .await?;
        usage += synthesis.usage;

        let tasks = lock(&queue).tasks().to_vec();
        Ok(PlanExecuteResult {
            answer: synthesis.text(),
            findings,
            tasks,
            usage,
        })
    }
}

fn format_findings(findings: &[Finding], separator: &str) -> String {
    findings
        .iter()
        .map(|f| format!("{}: {}", f.task.title, f.output))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use agentry_core::agent::AgentConfig;
    use agentry_core::message::ToolCallPart;

    fn add_task(id: &str, title: &str) -> ToolCallPart {
        ToolCallPart::new(
            "add_task",
            serde_json::json!({"title": title, "action": "read_file", "argument": format!("{title}.md")}),
            id,
        )
    }

    fn agent(name: &str, model: Arc<SequentialMockModel>) -> Agent {
        Agent::new(AgentConfig::new("mock-model", "").with_name(name), model)
    }

    #[test]
    fn queue_limits_and_summary() {
        let mut queue = TaskQueue::new(2);
        assert_eq!(queue.summary(), "No tasks in queue.");
        assert_eq!(queue.add("a", "read_file", "a.md"), Ok(1));
        assert_eq!(queue.add("b", "read_file", "b.md"), Ok(2));
        assert!(queue.add("c", "read_file", "c.md").is_err());

        let first = queue.start_next().unwrap();
        assert_eq!(first.id, 1);
        queue.complete(1);
        assert_eq!(queue.summary(), "#1 [done] a\n#2 [pending] b");
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn static_plan_runs_every_task() {
        let planner = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![add_task("c1", "readme"), add_task("c2", "setup")]),
            make_text_response("Planned"),
        ]));
        let executor = Arc::new(SequentialMockModel::new(vec![
            make_text_response("README says hi"),
            make_text_response("Setup uses pip"),
        ]));
        let synthesizer = Arc::new(SequentialMockModel::single_text("Guide"));

        let flow = PlanExecute::new(
            agent("planner", planner),
            agent("executor", executor.clone()),
            agent("synthesizer", synthesizer.clone()),
        );
        let result = flow.run("Onboard me").await.unwrap();

        assert_eq!(result.answer, "Guide");
        assert_eq!(result.findings.len(), 2);
        assert!(result.tasks.iter().all(|t| t.status == TaskStatus::Done));
        assert_eq!(
            executor.requests()[0].messages[0].parts()[0],
            agentry_core::Part::user("Execute: read_file(readme.md)")
        );

        let synth_prompt = synthesizer.requests()[0].messages[0].parts()[0].clone();
        let agentry_core::Part::UserPrompt { content } = synth_prompt else {
            panic!("expected user prompt");
        };
        assert!(content.contains("readme: README says hi\n\nsetup: Setup uses pip"));
        // 2 planner calls + 2 executor calls + 1 synthesizer call
        assert_eq!(result.usage, Usage::new(50, 25));
    }

    #[tokio::test]
    async fn replanner_can_extend_the_queue() {
        let planner = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![add_task("c1", "readme")]),
            make_text_response("Planned"),
        ]));
        let executor = Arc::new(SequentialMockModel::new(vec![
            make_text_response("Found a docs folder"),
            make_text_response("Docs use sphinx"),
        ]));
        let replanner = Arc::new(SequentialMockModel::new(vec![
            make_tool_call_response(vec![add_task("r1", "docs")]),
            make_text_response(r#"{"should_replan": true, "reasoning": "docs folder"}"#),
            make_text_response(r#"{"should_replan": false, "reasoning": "enough"}"#),
        ]));
        let synthesizer = Arc::new(SequentialMockModel::single_text("Guide"));

        let flow = PlanExecute::new(
            agent("planner", planner),
            agent("executor", executor),
            agent("synthesizer", synthesizer),
        )
        .with_replanner(agent("replanner", replanner.clone()));
        let result = flow.run("Onboard me").await.unwrap();

        let titles: Vec<&str> = result.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["readme", "docs"]);
        assert_eq!(result.findings.len(), 2);

        let tool_names: Vec<String> = replanner.requests()[0]
            .tools
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(tool_names, vec!["add_task", "get_tasks"]);
    }

    #[tokio::test]
    async fn runs_do_not_share_queues() {
        let make_flow = || {
            PlanExecute::new(
                agent(
                    "planner",
                    Arc::new(SequentialMockModel::new(vec![
                        make_tool_call_response(vec![add_task("c1", "only")]),
                        make_text_response("Planned"),
                    ])),
                ),
                agent("executor", Arc::new(SequentialMockModel::single_text("done"))),
                agent("synthesizer", Arc::new(SequentialMockModel::single_text("Guide"))),
            )
        };
        let (a, b) = (make_flow(), make_flow());
        let (ra, rb) = tokio::join!(a.run("one"), b.run("two"));
        assert_eq!(ra.unwrap().tasks.len(), 1);
        assert_eq!(rb.unwrap().tasks.len(), 1);
    }
}
