use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::debug;

use crate::model::{CompositeKey, Identity, LifecycleState, OptimisticPost, Post, PostId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Replaced,
    Inserted,
}

#[derive(Debug, Default)]
// Newest submission first.
pub struct Tracker {
    entries: Vec<OptimisticPost>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[OptimisticPost] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, temp_id: &str) -> Option<&OptimisticPost> {
        self.entries.iter().find(|entry| entry.temp_id == temp_id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &OptimisticPost> {
        self.entries
            .iter()
            .filter(|entry| entry.state == LifecycleState::Pending)
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &OptimisticPost> {
        self.entries
            .iter()
            .filter(|entry| entry.state == LifecycleState::Confirmed)
    }

    pub fn begin(&mut self, mut post: Post) -> String {
        let temp_id = match &post.identity {
            Identity::Optimistic { temp_id, .. } if !temp_id.is_empty() => temp_id.clone(),
            _ => new_temp_id(),
        };
        let expected_id = match &post.identity {
            Identity::Optimistic { expected_id, .. } => *expected_id,
            Identity::Confirmed { id, .. } => (*id > 0).then_some(*id),
        };
        post.identity = Identity::Optimistic {
            temp_id: temp_id.clone(),
            expected_id,
        };
        let submitted_at = Utc::now().timestamp();
        if post.timestamp == 0 {
            post.timestamp = submitted_at;
        }
        self.insert_pending(OptimisticPost {
            temp_id: temp_id.clone(),
            state: LifecycleState::Pending,
            post,
            submitted_at,
        });
        temp_id
    }

    pub fn insert_pending(&mut self, mut entry: OptimisticPost) {
        entry.state = LifecycleState::Pending;
        self.entries.retain(|existing| existing.temp_id != entry.temp_id);
        debug!(temp_id = %entry.temp_id, "tracking pending submission");
        self.entries.insert(0, entry);
    }

    pub fn confirm(&mut self, temp_id: &str, final_id: PostId, mut post: Post) -> Confirmation {
        let id = match &post.identity {
            Identity::Confirmed { id, .. } if *id > 0 => *id,
            Identity::Optimistic {
                expected_id: Some(id),
                ..
            } if *id > 0 => *id,
            _ => final_id,
        };
        post.identity = Identity::Confirmed {
            id,
            global_id: (final_id > 0).then_some(final_id),
        };

        match self.entries.iter_mut().find(|entry| entry.temp_id == temp_id) {
            Some(entry) => {
                if post.timestamp == 0 {
                    post.timestamp = entry.post.timestamp;
                }
                entry.post = post;
                entry.state = LifecycleState::Confirmed;
                debug!(temp_id, final_id, "confirmed tracked submission");
                Confirmation::Replaced
            }
            None => {
                if post.timestamp == 0 {
                    post.timestamp = Utc::now().timestamp();
                }
                let submitted_at = post.timestamp;
                self.entries.insert(
                    0,
                    OptimisticPost {
                        temp_id: temp_id.to_string(),
                        state: LifecycleState::Confirmed,
                        post,
                        submitted_at,
                    },
                );
                debug!(temp_id, final_id, "confirmation for untracked submission");
                Confirmation::Inserted
            }
        }
    }

    pub fn fail(&mut self, temp_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.temp_id != temp_id);
        before != self.entries.len()
    }

    pub fn prune_stale(&mut self, max_age: Duration, now: i64) -> Vec<String> {
        let cutoff = now.saturating_sub(max_age.as_secs() as i64);
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            let stale = entry.state == LifecycleState::Pending && entry.submitted_at < cutoff;
            if stale {
                removed.push(entry.temp_id.clone());
            }
            !stale
        });
        removed
    }

    pub fn retire_covered(&mut self, served: &HashSet<CompositeKey>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            entry.state != LifecycleState::Confirmed
                || entry
                    .post
                    .key()
                    .map_or(true, |key| !served.contains(&key))
        });
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub fn new_temp_id() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("tmp-{}-{:08x}", Utc::now().timestamp_millis(), suffix)
}
