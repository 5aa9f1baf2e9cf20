//! Ordered startup and reverse-order teardown of components
//!
//! ```text
//!  start:  A ──ready──▶ B ──ready──▶ C ──ready──▶ running
//!                 │ any run() returns / external shutdown
//!                 ▼
//!  stop:   cancel C, await C ─▶ cancel B, await B ─▶ cancel A, await A
//! ```
//!
//! Every component runs in its own task on its own cancellation token. The
//! run-level token only tells the orchestrator to begin the stop phase; the
//! components themselves are cancelled one by one, in reverse start order.

use crate::error::{ComponentFailure, LifecycleError};
use crate::lifecycle::{Component, Readiness};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Phase of an orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// A launched component
struct Launched {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

/// Starts components in order and stops them in reverse
pub struct Orchestrator {
    components: Vec<Arc<dyn Component>>,
    ready: Readiness,
    state: watch::Sender<RunState>,
}

impl Orchestrator {
    pub fn new(components: Vec<Arc<dyn Component>>) -> Self {
        let (state, _) = watch::channel(RunState::NotStarted);
        Self {
            components,
            ready: Readiness::new(),
            state,
        }
    }

    /// Append a component; it starts after every component already added
    pub fn push(&mut self, component: Arc<dyn Component>) {
        self.components.push(component);
    }

    /// Fires once every component has signalled readiness
    pub fn readiness(&self) -> Readiness {
        self.ready.clone()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Run every component to completion.
    ///
    /// Returns once all launched components have finished, after `shutdown`
    /// was cancelled or any component's run returned. All terminal errors
    /// are reported, not just the first.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        let total = self.components.len();
        let run_token = shutdown.child_token();
        let mut launched: Vec<Launched> = Vec::with_capacity(total);

        self.state.send_replace(RunState::Starting);

        for (idx, component) in self.components.iter().enumerate() {
            let name = component.name().to_string();
            let token = CancellationToken::new();

            let handle = {
                let component = Arc::clone(component);
                let token = token.clone();
                let finished = run_token.clone().drop_guard();
                tokio::spawn(async move {
                    // dropping the guard, on return or on panic, starts teardown
                    let _finished = finished;
                    component.run(token).await
                })
            };
            launched.push(Launched {
                name: name.clone(),
                token,
                handle,
            });

            let readiness = component.readiness();
            tokio::select! {
                biased;
                () = run_token.cancelled() => {
                    warn!(component = %name, idx, len = total, "startup interrupted");
                    break;
                }
                () = readiness.wait() => {
                    info!(component = %name, idx, len = total, "component is ready");
                }
            }
        }

        if launched.len() == total && !run_token.is_cancelled() {
            self.ready.set();
            self.state.send_replace(RunState::Running);
            info!(len = total, "all components are ready");
        }

        run_token.cancelled().await;
        self.state.send_replace(RunState::Stopping);

        let mut failures = Vec::new();
        for (idx, component) in launched.into_iter().enumerate().rev() {
            component.token.cancel();
            let result = match component.handle.await {
                Ok(result) => result,
                Err(join_error) => Err(anyhow::anyhow!("component panicked: {join_error}")),
            };

            match result {
                Ok(()) => {
                    info!(component = %component.name, idx, len = total, "component finished successfully");
                }
                Err(error) => {
                    error!(component = %component.name, idx, len = total, error = %format!("{error:#}"), "component finished with error");
                    failures.push(ComponentFailure {
                        name: component.name,
                        index: idx,
                        error,
                    });
                }
            }
        }

        self.state.send_replace(RunState::Stopped);

        if failures.is_empty() {
            info!("all components finished");
            Ok(())
        } else {
            let err = LifecycleError { failures };
            error!(error = %err, "components finished with errors");
            Err(err)
        }
    }
}
