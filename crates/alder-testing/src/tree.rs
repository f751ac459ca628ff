//! A deterministic in-memory coordination tree for testing.
//!
//! One [`DeterministicTree`] models the store cluster; each call to
//! [`DeterministicTree::session`] mints an independent session handle.
//! Ephemeral nodes belong to the session that created them and vanish when
//! that session is expired with [`DeterministicTreeSession::expire`], firing
//! the same watches a live store would.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use alder_core::CreateMode;
use alder_core::TreeEvent;
use alder_core::TreeStore;
use alder_core::TreeStoreError;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A stored node.
struct Node {
    data: Vec<u8>,
    /// Owning session for ephemeral nodes, `None` for durable ones.
    owner: Option<u64>,
}

/// Per-session bookkeeping held by the shared tree.
struct SessionState {
    alive: bool,
    /// Parents with an armed (one-shot) child watch.
    watches: HashSet<String>,
    events: broadcast::Sender<TreeEvent>,
}

#[derive(Default)]
struct TreeState {
    nodes: BTreeMap<String, Node>,
    /// Per-parent counters backing sequential creation.
    sequences: HashMap<String, u64>,
    sessions: HashMap<u64, SessionState>,
}

impl TreeState {
    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.nodes.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    /// Fire every armed watch on `parent`, disarming each as it fires.
    fn fire_watches(&mut self, parent: &str) {
        for session in self.sessions.values_mut() {
            if session.alive && session.watches.remove(parent) {
                let _ = session.events.send(TreeEvent::Changed {
                    path: parent.to_string(),
                });
            }
        }
    }
}

/// Shared cluster state behind all sessions.
struct Shared {
    state: Mutex<TreeState>,
    next_session: AtomicU64,
}

/// A deterministic in-memory coordination tree.
pub struct DeterministicTree {
    shared: Arc<Shared>,
}

impl Default for DeterministicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterministicTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TreeState::default()),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new session against this tree.
    pub async fn session(&self) -> Arc<DeterministicTreeSession> {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut state = self.shared.state.lock().await;
        state.sessions.insert(id, SessionState {
            alive: true,
            watches: HashSet::new(),
            events: events.clone(),
        });
        Arc::new(DeterministicTreeSession {
            shared: Arc::clone(&self.shared),
            id,
            events,
        })
    }
}

/// One session handle; implements [`TreeStore`].
pub struct DeterministicTreeSession {
    shared: Arc<Shared>,
    id: u64,
    events: broadcast::Sender<TreeEvent>,
}

impl DeterministicTreeSession {
    /// Simulate session loss: durable nodes stay, this session's ephemeral
    /// nodes are removed (firing other sessions' watches), and
    /// [`TreeEvent::SessionClosed`] is broadcast to this session's
    /// subscribers. Further operations fail with `SessionExpired`.
    pub async fn expire(&self) {
        let mut state = self.shared.state.lock().await;
        match state.sessions.get_mut(&self.id) {
            Some(session) if session.alive => session.alive = false,
            _ => return,
        }

        let owned: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(self.id))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            state.nodes.remove(&path);
            if let Some(parent) = parent_of(&path) {
                let parent = parent.to_string();
                state.fire_watches(&parent);
            }
        }

        let _ = self.events.send(TreeEvent::SessionClosed);
    }

    fn check_alive(&self, state: &TreeState) -> Result<(), TreeStoreError> {
        let alive = state.sessions.get(&self.id).is_some_and(|s| s.alive);
        if alive { Ok(()) } else { Err(TreeStoreError::SessionExpired) }
    }
}

/// Parent path of `path`, or `None` for the root.
fn parent_of(path: &str) -> Option<&str> {
    let idx = path.rfind('/')?;
    if idx == 0 { Some("/") } else { Some(&path[..idx]) }
}

#[async_trait]
impl TreeStore for DeterministicTreeSession {
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String, TreeStoreError> {
        let mut state = self.shared.state.lock().await;
        self.check_alive(&state)?;

        let parent = parent_of(path)
            .ok_or_else(|| TreeStoreError::NoNode { path: path.to_string() })?
            .to_string();
        if parent != "/" && !state.nodes.contains_key(&parent) {
            return Err(TreeStoreError::NoNode { path: parent });
        }

        let assigned = if mode.sequential {
            let seq = state.sequences.entry(parent.clone()).or_insert(0);
            *seq += 1;
            format!("{path}{:010}", *seq)
        } else {
            if state.nodes.contains_key(path) {
                return Err(TreeStoreError::NodeExists { path: path.to_string() });
            }
            path.to_string()
        };

        let owner = mode.ephemeral.then_some(self.id);
        state.nodes.insert(assigned.clone(), Node { data, owner });
        state.fire_watches(&parent);
        Ok(assigned)
    }

    async fn delete(&self, path: &str) -> Result<(), TreeStoreError> {
        let mut state = self.shared.state.lock().await;
        self.check_alive(&state)?;

        if !state.nodes.contains_key(path) {
            return Err(TreeStoreError::NoNode { path: path.to_string() });
        }
        if state.has_children(path) {
            return Err(TreeStoreError::NotEmpty { path: path.to_string() });
        }
        state.nodes.remove(path);
        if let Some(parent) = parent_of(path) {
            let parent = parent.to_string();
            state.fire_watches(&parent);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, TreeStoreError> {
        let state = self.shared.state.lock().await;
        self.check_alive(&state)?;
        Ok(state.nodes.contains_key(path))
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, TreeStoreError> {
        let mut state = self.shared.state.lock().await;
        self.check_alive(&state)?;

        if path != "/" && !state.nodes.contains_key(path) {
            return Err(TreeStoreError::NoNode { path: path.to_string() });
        }

        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let children: Vec<String> = state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .map(|(k, _)| k[prefix.len()..].to_string())
            .collect();

        if watch
            && let Some(session) = state.sessions.get_mut(&self.id)
        {
            session.watches.insert(path.to_string());
        }
        Ok(children)
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>, TreeStoreError> {
        let state = self.shared.state.lock().await;
        self.check_alive(&state)?;
        state
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| TreeStoreError::NoNode { path: path.to_string() })
    }

    fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }
}
