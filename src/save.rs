//! Save coordination
//!
//! A commit starts at one context and walks parent links up to the
//! engine-bound root, committing each level in turn on that level's own
//! queue. The walk is strictly sequential and only ever moves upward, so no
//! two queues wait on each other in a cycle.
//!
//! There is no rollback: when a level fails, every level below it has
//! already committed and stays committed.

use crate::bus::ChangeSet;
use crate::context::{ContextSession, ObjectContext};
use crate::error::{CommitError, QueueError, StackError};
use crate::stack::ContextStack;
use crate::types::ContextId;
use std::sync::Arc;
use tracing::{debug, error};

/// One committed level of a walk.
#[derive(Debug, Clone)]
pub struct CommittedLevel {
    pub level: usize,
    pub context: ContextId,
    /// `None` when the level had nothing left to write.
    pub change_set: Option<Arc<ChangeSet>>,
}

/// Result of a successful walk.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub levels: Vec<CommittedLevel>,
}

impl CommitOutcome {
    /// True when the committing context had no pending changes.
    pub fn is_noop(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Commit `context` and every ancestor, blocking until the walk finishes.
pub fn commit(context: &ObjectContext) -> Result<CommitOutcome, CommitError> {
    context.perform_and_wait(|session| session.commit())?
}

impl ContextSession<'_> {
    /// Commit from inside a job already running on this context.
    pub fn commit(&mut self) -> Result<CommitOutcome, CommitError> {
        commit_chain(self)
    }
}

fn commit_chain(session: &mut ContextSession<'_>) -> Result<CommitOutcome, CommitError> {
    if !session.has_changes() {
        return Ok(CommitOutcome::default());
    }

    let mut outcome = CommitOutcome::default();
    let change_set = session.save_level(0)?;
    outcome.levels.push(CommittedLevel {
        level: 0,
        context: session.id(),
        change_set,
    });

    let registry = session.context().registry().clone();
    let mut child = session.id();
    let mut next = session.context().parent_id();
    let mut level = 1;

    while let Some(parent_id) = next {
        let parent = registry
            .resolve(parent_id)
            .ok_or(CommitError::ParentUnavailable {
                context: child,
                parent: parent_id,
            })?;
        let change_set = parent.perform_and_wait(move |session| session.save_level(level))??;
        outcome.levels.push(CommittedLevel {
            level,
            context: parent_id,
            change_set,
        });

        child = parent_id;
        next = parent.parent_id();
        level += 1;
    }

    debug!(
        context = %session.id(),
        levels = outcome.depth(),
        "Commit walk finished"
    );
    Ok(outcome)
}

/// Run `mutator` on the interactive context, then commit it.
///
/// Commit failures are logged, not returned; the mutator's value is.
pub fn commit_on_interactive<F, R>(stack: &ContextStack, mutator: F) -> Result<R, QueueError>
where
    F: FnOnce(&mut ContextSession<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    stack.interactive().perform_and_wait(move |session| {
        let value = mutator(session);
        if let Err(e) = session.commit() {
            error!(context = %session.id(), error = %e, "Interactive commit failed");
        }
        value
    })
}

/// Run `mutator` and a commit on a fresh worker without waiting.
///
/// Returns the worker's id once the job is queued. The worker lives until
/// the job has run.
pub fn commit_on_new_worker<F>(stack: &ContextStack, mutator: F) -> Result<ContextId, StackError>
where
    F: FnOnce(&mut ContextSession<'_>) + Send + 'static,
{
    let worker = stack.new_worker()?;
    let id = worker.id();
    worker.perform(move |session| {
        mutator(session);
        if let Err(e) = session.commit() {
            error!(context = %session.id(), error = %e, "Worker commit failed");
        }
    })?;
    Ok(id)
}
