//! Human review: a writer drafts, a reviewer (usually a person at a
//! prompt) approves or sends feedback, and the writer revises.

use agentry_core::provider::Usage;
use async_trait::async_trait;
use tracing::info;

use crate::error::AgentError;
use crate::loop_runner::Agent;

/// Replies that approve a draft, compared case-insensitively.
const APPROVALS: [&str; 4] = ["ok", "approve", "lgtm", "yes"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewVerdict {
    Approve,
    Revise(String),
}

impl ReviewVerdict {
    /// Read a free-form reply: blank or an approval word approves, anything
    /// else is feedback.
    pub fn from_reply(reply: &str) -> Self {
        let reply = reply.trim();
        if reply.is_empty() || APPROVALS.iter().any(|a| reply.eq_ignore_ascii_case(a)) {
            Self::Approve
        } else {
            Self::Revise(reply.to_string())
        }
    }
}

/// Whoever judges each draft.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// `revision` is 0 for the first draft.
    async fn review(&self, draft: &str, revision: u32) -> ReviewVerdict;
}

#[derive(Debug)]
pub struct ReviewedDraft {
    pub draft: String,
    pub approved: bool,
    /// Feedback given, in order
    pub feedback: Vec<String>,
    pub usage: Usage,
}

pub struct HumanReview<R> {
    writer: Agent,
    reviewer: R,
    max_revisions: u32,
}

impl<R: Reviewer> HumanReview<R> {
    pub fn new(writer: Agent, reviewer: R) -> Self {
        Self {
            writer,
            reviewer,
            max_revisions: 5,
        }
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    /// Draft, then revise on feedback until the reviewer approves or
    /// `max_revisions` revisions were made. The last revision is returned
    /// unreviewed.
    pub async fn run(&self, task: &str) -> Result<ReviewedDraft, AgentError> {
        let first = self.writer.run(task, Vec::new()).await?;
        let mut usage = first.usage;
        let mut draft = first.text();
        let mut feedback = Vec::new();

        for revision in 0..self.max_revisions {
            let notes = match self.reviewer.review(&draft, revision).await {
                ReviewVerdict::Approve => {
                    info!(revision, "Draft approved");
                    return Ok(ReviewedDraft {
                        draft,
                        approved: true,
                        feedback,
                        usage,
                    });
                }
                ReviewVerdict::Revise(notes) => notes,
            };

            info!(revision, "Revising draft on feedback");
            let revised = self.writer.run(&revise_prompt(&draft, &notes), Vec::new()).await?;
            usage += revised.usage;
            draft = revised.text();
            feedback.push(notes);
        }

        Ok(ReviewedDraft {
            draft,
            approved: false,
            feedback,
            usage,
        })
    }
}

fn revise_prompt(draft: &str, feedback: &str) -> String {
    format!(
        "Revise this draft based on human feedback:\n\nCurrent draft:\n{draft}\n\nHuman feedback:\n{feedback}"
    )
}
