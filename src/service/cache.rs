//! Bounded LRU cache for loaded plan details. Recency is tracked with a
//! monotonic tick rather than wall time so the eviction order is stable
//! even when entries are touched within the same instant.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::plan::WorkoutPlanData;

const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
struct CacheEntry {
    plan: WorkoutPlanData,
    last_access: u64,
}

#[derive(Debug)]
pub struct PlanCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<Uuid, CacheEntry>,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PlanCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, plan_id: &Uuid) -> Option<WorkoutPlanData> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(plan_id).map(|entry| {
            entry.last_access = tick;
            entry.plan.clone()
        })
    }

    pub fn insert(&mut self, plan: WorkoutPlanData) {
        self.tick += 1;
        let entry = CacheEntry {
            plan,
            last_access: self.tick,
        };
        let plan_id = entry.plan.id;
        if !self.entries.contains_key(&plan_id) && self.entries.len() >= self.capacity {
            self.evict_least_recent();
        }
        self.entries.insert(plan_id, entry);
    }

    pub fn invalidate(&mut self, plan_id: &Uuid) {
        self.entries.remove(plan_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops least-recently-used entries until at most `target` remain.
    pub fn evict_under_pressure(&mut self, target: usize) {
        while self.entries.len() > target {
            self.evict_least_recent();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(plan_id, _)| *plan_id);
        if let Some(plan_id) = oldest {
            self.entries.remove(&plan_id);
        }
    }
}
