//! Deterministic path layout over the coordination tree.
//!
//! All paths are pure string construction from a configurable cluster root:
//!
//! ```text
//! {root}/workers/{worker}            worker registry (ephemeral+sequential)
//! {root}/jobs/config/{job}           job configuration blob
//! {root}/jobs/counter/{job}/{ref}    reference-count nodes (sequential)
//! {root}/tasks/ordering/{job}/{task} task payloads, FIFO by sequence
//! {root}/tasks/working/{job}/{task}  active leases (ephemeral)
//! {root}/tasks/result/{job}/{name}   result payloads
//! ```
//!
//! Collision freedom of task and worker leaves rests entirely on the store's
//! atomic sequential naming; this module never invents leaf names itself.

/// Cluster root used when nothing else is configured.
pub const DEFAULT_ROOT: &str = "/alder";

/// Leaf-name stem for workers; the store appends the sequence suffix.
const WORKER_STEM: &str = "worker-";
/// Leaf-name stem for job reference nodes.
const COUNTER_STEM: &str = "ref-";
/// Leaf-name stem for tasks.
const TASK_STEM: &str = "task-";

/// Path builder rooted at one cluster root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNamespace {
    root: String,
}

impl Default for TreeNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl TreeNamespace {
    /// Namespace under `root` (leading slash required, trailing slash
    /// stripped).
    pub fn new(root: &str) -> Self {
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self { root }
    }

    /// The cluster root itself.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Worker registry directory.
    pub fn worker_root(&self) -> String {
        format!("{}/workers", self.root)
    }

    /// A worker's node.
    pub fn worker(&self, name: &str) -> String {
        format!("{}/{name}", self.worker_root())
    }

    /// Sequential-create stem for new workers.
    pub fn worker_stem(&self) -> String {
        format!("{}/{WORKER_STEM}", self.worker_root())
    }

    /// Directory of all job configuration nodes.
    pub fn job_config_root(&self) -> String {
        format!("{}/jobs/config", self.root)
    }

    /// A job's configuration node.
    pub fn job_config(&self, job: &str) -> String {
        format!("{}/{job}", self.job_config_root())
    }

    /// A job's reference-counter directory.
    pub fn job_counter_root(&self, job: &str) -> String {
        format!("{}/jobs/counter/{job}", self.root)
    }

    /// One reference node under a job's counter directory.
    pub fn job_counter(&self, job: &str, node: &str) -> String {
        format!("{}/{node}", self.job_counter_root(job))
    }

    /// Sequential-create stem for new reference nodes.
    pub fn counter_stem(&self, job: &str) -> String {
        format!("{}/{COUNTER_STEM}", self.job_counter_root(job))
    }

    /// A job's ordering directory (every live task has an entry here).
    pub fn ordering_root(&self, job: &str) -> String {
        format!("{}/tasks/ordering/{job}", self.root)
    }

    /// A task's ordering entry.
    pub fn ordering(&self, job: &str, task: &str) -> String {
        format!("{}/{task}", self.ordering_root(job))
    }

    /// Sequential-create stem for new tasks.
    pub fn task_stem(&self, job: &str) -> String {
        format!("{}/{TASK_STEM}", self.ordering_root(job))
    }

    /// A job's working directory (leased tasks have an entry here).
    pub fn working_root(&self, job: &str) -> String {
        format!("{}/tasks/working/{job}", self.root)
    }

    /// A task's working entry.
    pub fn working(&self, job: &str, task: &str) -> String {
        format!("{}/{task}", self.working_root(job))
    }

    /// A job's result directory.
    pub fn result_root(&self, job: &str) -> String {
        format!("{}/tasks/result/{job}", self.root)
    }
}

/// Last path segment of a store-assigned path.
///
/// Sequential creation returns the full assigned path; callers keep only the
/// leaf. `None` for a path with an empty final segment, which no well-formed
/// assignment produces.
pub fn leaf_name(path: &str) -> Option<&str> {
    match path.rsplit('/').next() {
        Some(leaf) if !leaf.is_empty() => Some(leaf),
        _ => None,
    }
}
