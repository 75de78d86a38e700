//! Mailbox messages for the download manager actor.

use std::fmt;

use tokio::sync::oneshot;

use crate::Result;

/// Handler run once when the engine signals that background events drained.
pub struct CompletionHandler(Box<dyn FnOnce() + Send + 'static>);

impl CompletionHandler {
    pub fn new(handler: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for CompletionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionHandler")
    }
}

/// Messages that can be sent to the manager actor.
///
/// Mutating requests are answered once the catalog change is persisted and
/// published; engine interaction continues after the reply.
#[derive(Debug)]
pub enum ManagerMessage {
    Enqueue {
        title: String,
        url: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Suspend {
        title: String,
        reply: oneshot::Sender<()>,
    },
    Restore {
        title: String,
        reply: oneshot::Sender<()>,
    },
    Remove {
        title: String,
        reply: oneshot::Sender<()>,
    },
    /// The host process came back to the foreground.
    BecameActive,
    SetCompletionHandler(CompletionHandler),
    /// Query current state (response sent via oneshot channel).
    GetState(oneshot::Sender<ManagerState>),
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerState {
    /// Title owning the transfer slot.
    pub active: Option<String>,
    pub records: usize,
    pub waiting: usize,
    pub has_completion_handler: bool,
}
