//! Coordination store path layout.

use nimbus_id::{JobId, TaskId};

use crate::store::{join_path, normalize_path};
use crate::StoreError;

/// Default root under which all scheduler state lives.
pub const DEFAULT_ROOT: &str = "/storm";

/// Builds coordination store paths under a configurable root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: String,
}

impl StoreLayout {
    /// Child of the root holding one node per active job.
    pub const ASSIGNMENTS: &'static str = "assignments";

    /// Child of the root holding flushed task context maps.
    pub const CUSTOMER_CONTEXT: &'static str = "customercontext";

    /// Create a layout rooted at `root`.
    pub fn new(root: &str) -> Result<Self, StoreError> {
        Ok(Self {
            root: join_path(&normalize_path(root)?),
        })
    }

    /// The canonical root path.
    pub fn root(&self) -> &str {
        &self.root
    }

    fn child(&self, parts: &[&str]) -> String {
        let mut path = if self.root == "/" {
            String::new()
        } else {
            self.root.clone()
        };
        for part in parts {
            path.push('/');
            path.push_str(part);
        }
        path
    }

    /// `<root>/assignments`
    pub fn assignments(&self) -> String {
        self.child(&[Self::ASSIGNMENTS])
    }

    /// `<root>/assignments/<job>`
    pub fn assignment(&self, job: &JobId) -> String {
        self.child(&[Self::ASSIGNMENTS, job.as_str()])
    }

    /// `<root>/customercontext`
    pub fn customer_context(&self) -> String {
        self.child(&[Self::CUSTOMER_CONTEXT])
    }

    /// `<root>/customercontext/<job>`
    pub fn job_context(&self, job: &JobId) -> String {
        self.child(&[Self::CUSTOMER_CONTEXT, job.as_str()])
    }

    /// `<root>/customercontext/<job>/<task>`
    pub fn task_context(&self, job: &JobId, task: TaskId) -> String {
        let task = task.to_string();
        self.child(&[Self::CUSTOMER_CONTEXT, job.as_str(), &task])
    }
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
        }
    }
}
