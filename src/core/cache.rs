use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::engine::run_schedule;
use super::error::CalcResult;
use super::types::{ParameterRecord, ScheduleResult};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

pub fn fingerprint(record: &ParameterRecord) -> CalcResult<String> {
    let canonical = canonicalize(serde_json::to_value(record)?);
    let json = serde_json::to_string(&canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Bounded memo of finished schedules. Callers ask for results through
/// `get_or_compute`; the oldest entry is dropped once capacity is reached.
#[derive(Debug)]
pub struct ScheduleCache {
    capacity: usize,
    entries: HashMap<String, Arc<ScheduleResult>>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl Default for ScheduleCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ScheduleCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn get_or_compute(&mut self, record: &ParameterRecord) -> CalcResult<Arc<ScheduleResult>> {
        let key = fingerprint(record)?;
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            log::debug!("cache hit key={}", &key[..12]);
            return Ok(Arc::clone(hit));
        }

        self.misses += 1;
        let result = Arc::new(run_schedule(record)?);
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, Arc::clone(&result));
        Ok(result)
    }
}
