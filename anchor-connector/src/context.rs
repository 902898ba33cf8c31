//! Every inbound call carries a `(tenant_id, workspace_id, database_id |
//! instance_id)` tuple and a deadline (§6). `CallContext` also threads the
//! cancellation token that propagates to outstanding driver calls, polling
//! tick sleeps, and watcher inner loops (§5).

use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum CallTarget {
    Database(String),
    Instance(String),
}

#[derive(Debug, Clone)]
pub struct CallContext {
    pub tenant_id: String,
    pub workspace_id: String,
    pub target: CallTarget,
    pub deadline: Option<Duration>,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new(tenant_id: impl Into<String>, workspace_id: impl Into<String>, target: CallTarget) -> Self {
        CallContext {
            tenant_id: tenant_id.into(),
            workspace_id: workspace_id.into(),
            target,
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A detached child context sharing this one's cancellation token —
    /// used when a long-lived worker task (a polling source, the config
    /// watcher) needs its own `CallContext` per tick.
    pub fn child(&self) -> Self {
        self.clone()
    }

    pub fn for_test(target: CallTarget) -> Self {
        CallContext::new("test-tenant", "test-workspace", target)
    }
}
