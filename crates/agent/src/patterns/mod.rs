//! Multi-agent patterns built on [`Agent::run`](crate::Agent::run).
//!
//! Each pattern composes plain agents; none of them keeps state between
//! runs.

pub mod agent_tool;
pub mod chain;
pub mod evaluator;
pub mod handoff;
pub mod judge;
pub mod parallel;
pub mod plan_execute;
pub mod review;
pub mod router;

pub use agent_tool::AgentTool;
pub use chain::{ChainResult, PromptChain};
pub use evaluator::{Evaluation, EvaluatorOptimizer, OptimizedDraft};
pub use handoff::{HandoffDecision, HandoffResult, Handoffs};
pub use judge::{Judge, JudgeCriterion, JudgeFeedback};
pub use parallel::{AnalystReport, Parallel, ParallelResult};
pub use plan_execute::{PlanExecute, PlanExecuteResult, ReplanDecision, Task, TaskQueue, TaskStatus};
pub use review::{HumanReview, ReviewVerdict, ReviewedDraft, Reviewer};
pub use router::{RouteDecision, RoutedRun, Router};
