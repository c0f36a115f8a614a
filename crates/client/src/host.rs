//! The hosting environment seen from the extractors.
//!
//! Extractors never own the host (the page view). They hold a [`HostRef`], a weak
//! handle that must be upgraded before every use and may fail at any time once the host is
//! disposed. Work that has to run on the host's script thread is posted through a
//! [`TaskRunner`] instead of being performed from whatever thread toggles the extractor.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use crate::extractor::ScriptBridge;

/// Capabilities an extractor needs from the page view hosting it.
pub trait Host: Send + Sync {
    /// Script text injected before `</body>` of HTML frames.
    fn inject_js(&self) -> String;

    /// Prepare element hiding for `url`; `false` means injection is pointless.
    fn prepare_element_hiding(&self, url: &str) -> bool;

    /// URL of the top-level document currently shown.
    fn navigation_url(&self) -> Option<String>;

    /// Whether the view accepts third-party cookies.
    fn accepts_third_party_cookies(&self) -> bool;

    /// Expose `bridge` to page scripts under `name`, replacing any previous one.
    fn add_callback_bridge(&self, name: &str, bridge: ScriptBridge);

    /// Remove the bridge registered under `name`, if any.
    fn remove_callback_bridge(&self, name: &str);
}

/// Non-owning, nullable handle to a [`Host`].
#[derive(Clone, Default)]
pub struct HostRef {
    inner: Option<Weak<dyn Host>>,
}

impl HostRef {
    pub fn new<H: Host + 'static>(host: &Arc<H>) -> Self {
        let weak = Arc::downgrade(host);
        let weak: Weak<dyn Host> = weak;
        Self { inner: Some(weak) }
    }

    /// A handle that never resolves.
    pub fn detached() -> Self {
        Self { inner: None }
    }

    /// The host, if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn Host>> {
        self.inner.as_ref().and_then(Weak::upgrade)
    }
}

impl From<&Arc<dyn Host>> for HostRef {
    fn from(host: &Arc<dyn Host>) -> Self {
        Self { inner: Some(Arc::downgrade(host)) }
    }
}

impl std::fmt::Debug for HostRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRef").field("alive", &self.upgrade().is_some()).finish()
    }
}

/// A unit of work for the host's script thread.
pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Posts tasks to the host's script thread.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    tx: mpsc::UnboundedSender<HostTask>,
}

/// Receiving end drained by the host's script thread.
#[derive(Debug)]
pub struct TaskQueue {
    rx: mpsc::UnboundedReceiver<HostTask>,
}

/// Create a connected runner/queue pair.
pub fn task_queue() -> (TaskRunner, TaskQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskRunner { tx }, TaskQueue { rx })
}

impl TaskRunner {
    /// Queue `task`; returns `false` if the queue has been dropped.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(task)).is_ok()
    }
}

impl TaskQueue {
    /// Run every task queued so far, returning how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Run tasks until every runner is dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
        }
    }
}
