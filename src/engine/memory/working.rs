// ── Memory: Working Memory ─────────────────────────────────────────────────
//
// The active scratchpad for the current turn. It is:
//   - Single-slot: exactly one current context, replaced wholesale (no history)
//   - Process-tracking: a bounded set of in-flight processes; overflow purges
//     completed processes first, then the oldest by insertion
//   - Scratch-capable: an unbounded key → JSON map cleared on demand
//
// Pure in-memory; nothing here is persisted.

use super::eviction::{BoundedStore, CompletedFirstPolicy};
use crate::atoms::types::{ActiveProcess, Context, ProcessUpdate};
use log::{debug, warn};
use std::collections::HashMap;

pub struct WorkingMemory {
    current_context: Option<Context>,
    processes: BoundedStore<ActiveProcess, CompletedFirstPolicy>,
    temporary: HashMap<String, serde_json::Value>,
}

impl WorkingMemory {
    pub fn new(process_capacity: usize) -> Self {
        Self {
            current_context: None,
            processes: BoundedStore::new(process_capacity, CompletedFirstPolicy),
            temporary: HashMap::new(),
        }
    }

    // ── Current context slot ───────────────────────────────────────────

    /// Replace the current context. The previous one is dropped.
    pub fn update_context(&mut self, context: Context) {
        self.current_context = Some(context);
    }

    pub fn current_context(&self) -> Option<&Context> {
        self.current_context.as_ref()
    }

    // ── Active processes ───────────────────────────────────────────────

    /// Track a process. An existing process with the same id is replaced.
    /// Returns the processes evicted to make room.
    pub fn add_process(&mut self, mut process: ActiveProcess) -> Vec<ActiveProcess> {
        process.progress = process.progress.clamp(0.0, 1.0);
        if self.processes.remove_where(|p| p.id == process.id).is_some() {
            debug!("[memory::working] Replacing process {}", process.id);
        }
        let evicted = self.processes.push(process);
        if !evicted.is_empty() {
            debug!(
                "[memory::working] Evicted {} process(es) at capacity {}",
                evicted.len(),
                self.processes.capacity()
            );
        }
        evicted
    }

    /// Apply a partial update. Returns false if the process is unknown.
    pub fn update_process(&mut self, id: &str, update: ProcessUpdate) -> bool {
        let Some(process) = self.processes.find_mut(|p| p.id == id) else {
            warn!("[memory::working] update_process: unknown process {}", id);
            return false;
        };
        if let Some(status) = update.status {
            process.status = status;
        }
        if let Some(progress) = update.progress {
            process.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(data) = update.data {
            process.data = data;
        }
        true
    }

    pub fn get_process(&self, id: &str) -> Option<&ActiveProcess> {
        self.processes.find(|p| p.id == id)
    }

    pub fn remove_process(&mut self, id: &str) -> Option<ActiveProcess> {
        self.processes.remove_where(|p| p.id == id)
    }

    pub fn processes(&self) -> &[ActiveProcess] {
        self.processes.items()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    // ── Scratch map ────────────────────────────────────────────────────

    pub fn set_temporary_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.temporary.insert(key.into(), value);
    }

    pub fn get_temporary_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.temporary.get(key)
    }

    /// Drop every scratch entry.
    pub fn clear_temporary_data(&mut self) {
        self.temporary.clear();
    }

    pub fn temporary_len(&self) -> usize {
        self.temporary.len()
    }

    /// Reset everything: context slot, processes, scratch map.
    pub fn clear(&mut self) {
        self.current_context = None;
        self.processes.clear();
        self.temporary.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.current_context.is_none() && self.processes.is_empty() && self.temporary.is_empty()
    }
}
