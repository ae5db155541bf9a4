//! Process-wide default stack
//!
//! Convenience slot for hosts that want one implicit stack. Everything here
//! delegates to an explicit [`ContextStack`]; prefer passing the stack
//! around where possible.

use crate::context::{ContextSession, ObjectContext};
use crate::error::StackError;
use crate::save;
use crate::stack::ContextStack;
use crate::types::ContextId;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

static DEFAULT_STACK: RwLock<Option<Arc<ContextStack>>> = parking_lot::const_rwlock(None);

/// Install `stack` as the default, returning the one it replaces.
pub fn set_default_stack(stack: Arc<ContextStack>) -> Option<Arc<ContextStack>> {
    debug!(stack = ?stack, "Default stack set");
    DEFAULT_STACK.write().replace(stack)
}

pub fn clear_default_stack() -> Option<Arc<ContextStack>> {
    DEFAULT_STACK.write().take()
}

pub fn default_stack() -> Result<Arc<ContextStack>, StackError> {
    DEFAULT_STACK
        .read()
        .clone()
        .ok_or(StackError::NoDefaultStack)
}

pub fn default_interactive_context() -> Result<ObjectContext, StackError> {
    Ok(default_stack()?.interactive().clone())
}

pub fn new_worker_context() -> Result<ObjectContext, StackError> {
    default_stack()?.new_worker()
}

/// [`save::commit_on_interactive`] against the default stack.
pub fn perform_on_interactive_and_commit<F, R>(mutator: F) -> Result<R, StackError>
where
    F: FnOnce(&mut ContextSession<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    let stack = default_stack()?;
    Ok(save::commit_on_interactive(&stack, mutator)?)
}

/// [`save::commit_on_new_worker`] against the default stack.
pub fn perform_on_new_worker_and_commit<F>(mutator: F) -> Result<ContextId, StackError>
where
    F: FnOnce(&mut ContextSession<'_>) + Send + 'static,
{
    let stack = default_stack()?;
    save::commit_on_new_worker(&stack, mutator)
}
