//! Configuration loading and persisted runtime state.
//!
//! - Config: ~/.slotdesk/config.json, every field defaulted
//! - Sessions: one `ConversationState` per conversation id, snapshot to sessions.json
//! - Pending gates: background confirmation gates, snapshot to pending_gates.json

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SlotdeskError;
use crate::gate::PendingGate;
use crate::types::{Config, ConversationState};

const SESSIONS_FILE: &str = "sessions.json";
const PENDING_GATES_FILE: &str = "pending_gates.json";

/// Conversations kept before the least recently active idle ones are dropped.
pub const MAX_SESSIONS: usize = 500;

fn slotdesk_home() -> Result<PathBuf, SlotdeskError> {
    let home = dirs::home_dir()
        .ok_or_else(|| SlotdeskError::Configuration("Could not find home directory".into()))?;
    Ok(home.join(".slotdesk"))
}

/// Get the canonical config file path (~/.slotdesk/config.json)
pub fn config_path() -> Result<PathBuf, SlotdeskError> {
    Ok(slotdesk_home()?.join("config.json"))
}

/// Load config from the canonical path. A missing file means defaults.
pub fn load_config() -> Result<Config, SlotdeskError> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config, SlotdeskError> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        SlotdeskError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Directory for session and gate snapshots, created if missing.
pub fn state_dir(config: &Config) -> Result<PathBuf, SlotdeskError> {
    let dir = match &config.state_dir {
        Some(dir) => PathBuf::from(dir),
        None => slotdesk_home()?.join("state"),
    };
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SlotdeskError> {
    let temp_path = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(value)?;
    fs::write(&temp_path, payload)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, SlotdeskError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

// =============================================================================
// Sessions
// =============================================================================

/// A committed conversation and the order it was last committed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    state: ConversationState,
    #[serde(default)]
    seq: u64,
}

#[derive(Default)]
struct Snapshot {
    records: HashMap<String, SessionRecord>,
    next_seq: u64,
}

/// Conversation states keyed by conversation id.
///
/// Each conversation sits behind its own async mutex, so one turn per
/// conversation is in flight while distinct conversations run concurrently.
/// Committed states are mirrored into a snapshot that is written to disk.
/// Past `limit` conversations, the least recently committed ones with no
/// turn in flight are evicted.
pub struct SessionStore {
    path: Option<PathBuf>,
    limit: usize,
    sessions: DashMap<String, Arc<tokio::sync::Mutex<ConversationState>>>,
    snapshot: Mutex<Snapshot>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            limit: MAX_SESSIONS,
            sessions: DashMap::new(),
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    /// Open the store in `dir`, restoring any saved sessions.
    pub fn open(dir: &Path) -> Result<Self, SlotdeskError> {
        let path = dir.join(SESSIONS_FILE);
        let records: HashMap<String, SessionRecord> = read_json_or_default(&path)?;
        log::info!("Sessions: restored {} conversation(s)", records.len());
        let sessions = records
            .iter()
            .map(|(id, record)| {
                (id.clone(), Arc::new(tokio::sync::Mutex::new(record.state.clone())))
            })
            .collect();
        let next_seq = records.values().map(|r| r.seq + 1).max().unwrap_or(0);
        Ok(Self {
            path: Some(path),
            limit: MAX_SESSIONS,
            sessions,
            snapshot: Mutex::new(Snapshot { records, next_seq }),
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Lock handle for a conversation, created Idle on first use.
    pub fn handle(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<ConversationState>> {
        self.sessions
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Last committed state of a conversation.
    pub fn get(&self, conversation_id: &str) -> Option<ConversationState> {
        self.snapshot
            .lock()
            .records
            .get(conversation_id)
            .map(|r| r.state.clone())
    }

    pub fn len(&self) -> usize {
        self.snapshot.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record the state after a turn and write the snapshot.
    pub fn commit(&self, conversation_id: &str, state: &ConversationState) {
        {
            let mut snapshot = self.snapshot.lock();
            let seq = snapshot.next_seq;
            snapshot.next_seq += 1;
            snapshot.records.insert(
                conversation_id.to_string(),
                SessionRecord {
                    state: state.clone(),
                    seq,
                },
            );
            self.evict(&mut snapshot, conversation_id);
        }
        if let Err(e) = self.save() {
            log::warn!("Sessions: failed to persist: {}", e);
        }
    }

    fn evict(&self, snapshot: &mut Snapshot, keep: &str) {
        if snapshot.records.len() <= self.limit {
            return;
        }
        let mut by_age: Vec<(u64, String)> = snapshot
            .records
            .iter()
            .filter(|(id, _)| id.as_str() != keep)
            .map(|(id, r)| (r.seq, id.clone()))
            .collect();
        by_age.sort();

        for (_, id) in by_age {
            if snapshot.records.len() <= self.limit {
                break;
            }
            // A handle held elsewhere means a turn is in flight.
            let released = self
                .sessions
                .remove_if(&id, |_, h| Arc::strong_count(h) == 1)
                .is_some();
            if !released && self.sessions.contains_key(&id) {
                continue;
            }
            snapshot.records.remove(&id);
            log::debug!("Sessions: evicted idle conversation {}", id);
        }
    }

    fn save(&self) -> Result<(), SlotdeskError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let records = self.snapshot.lock().records.clone();
        write_json_atomic(path, &records)
    }
}

// =============================================================================
// Pending gates
// =============================================================================

/// Confirmation gates waiting on scheduler ticks.
pub struct GateStore {
    path: Option<PathBuf>,
    gates: Mutex<Vec<PendingGate>>,
}

impl GateStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            gates: Mutex::new(Vec::new()),
        }
    }

    pub fn open(dir: &Path) -> Result<Self, SlotdeskError> {
        let path = dir.join(PENDING_GATES_FILE);
        let gates: Vec<PendingGate> = read_json_or_default(&path)?;
        if !gates.is_empty() {
            log::info!("Gate store: resuming {} pending gate(s)", gates.len());
        }
        Ok(Self {
            path: Some(path),
            gates: Mutex::new(gates),
        })
    }

    pub fn push(&self, gate: PendingGate) {
        self.gates.lock().push(gate);
        self.persist();
    }

    pub fn list(&self) -> Vec<PendingGate> {
        self.gates.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.gates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace a gate's stored copy (after a poll attempt).
    pub fn update(&self, gate: &PendingGate) {
        {
            let mut gates = self.gates.lock();
            if let Some(existing) = gates.iter_mut().find(|g| g.id == gate.id) {
                *existing = gate.clone();
            }
        }
        self.persist();
    }

    pub fn remove(&self, gate_id: &str) -> Option<PendingGate> {
        let removed = {
            let mut gates = self.gates.lock();
            let index = gates.iter().position(|g| g.id == gate_id)?;
            gates.remove(index)
        };
        self.persist();
        Some(removed)
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let gates = self.gates.lock().clone();
        if let Err(e) = write_json_atomic(path, &gates) {
            log::warn!("Gate store: failed to persist: {}", e);
        }
    }
}
