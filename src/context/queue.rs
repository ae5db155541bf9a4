//! Per-context serial execution queue
//!
//! Every context owns one worker thread that drains a FIFO of jobs. The
//! context's mutable state lives on that thread and is only ever touched by
//! jobs, so no lock guards it. A job that panics is logged and dropped; the
//! queue keeps draining.

use crate::context::state::ContextState;
use crate::error::QueueError;
use crate::types::{ContextId, ContextRole};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, ThreadId};
use tracing::{error, trace};

pub(crate) type Job = Box<dyn FnOnce(&mut ContextState) + Send + 'static>;

pub(crate) struct ContextQueue {
    context: ContextId,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    thread: ThreadId,
}

impl ContextQueue {
    /// Start the queue thread. The thread exits once the queue is closed and
    /// every job already submitted has run.
    pub(crate) fn spawn(context: ContextId, role: ContextRole) -> Result<Self, QueueError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(format!("ctx-{}-{}", role, context.as_u64()))
            .spawn(move || {
                let mut state = ContextState::default();
                while let Ok(job) = receiver.recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(&mut state))) {
                        error!(
                            context = %context,
                            panic = %panic_message(payload.as_ref()),
                            "Context job panicked"
                        );
                    }
                }
                trace!(context = %context, "Context queue drained");
            })
            .map_err(|e| QueueError::Spawn {
                context,
                reason: e.to_string(),
            })?;

        Ok(Self {
            context,
            sender: Mutex::new(Some(sender)),
            thread: handle.thread().id(),
        })
    }

    pub(crate) fn submit(&self, job: Job) -> Result<(), QueueError> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .send(job)
                .map_err(|_| QueueError::Closed(self.context)),
            None => Err(QueueError::Closed(self.context)),
        }
    }

    /// True when called from this queue's own thread.
    pub(crate) fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    pub(crate) fn close(&self) {
        self.sender.lock().take();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
