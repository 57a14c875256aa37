use std::collections::{HashMap, HashSet};

use crate::fetcher::{Handle, Job};
use crate::model::{Post, PostId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentCount {
    // Tallied from comments that happened to be in loaded pages.
    Approximate(usize),
    Authoritative(usize),
}

impl CommentCount {
    pub fn value(&self) -> usize {
        match self {
            CommentCount::Approximate(n) | CommentCount::Authoritative(n) => *n,
        }
    }
}

pub struct CommentCountIndex {
    jobs: Handle,
    counts: HashMap<PostId, CommentCount>,
    requested: HashSet<PostId>,
    in_flight: HashSet<PostId>,
    // Ids invalidated while a request was in flight; re-requested once it lands.
    stale: HashSet<PostId>,
    revisions: HashMap<PostId, i64>,
}

impl CommentCountIndex {
    pub fn new(jobs: Handle) -> Self {
        Self {
            jobs,
            counts: HashMap::new(),
            requested: HashSet::new(),
            in_flight: HashSet::new(),
            stale: HashSet::new(),
            revisions: HashMap::new(),
        }
    }

    pub fn count(&self, post_id: PostId) -> usize {
        self.counts.get(&post_id).map_or(0, CommentCount::value)
    }

    pub fn get(&self, post_id: PostId) -> Option<CommentCount> {
        self.counts.get(&post_id).copied()
    }

    pub fn approximate<'a, I>(&mut self, posts: I) -> bool
    where
        I: IntoIterator<Item = &'a Post>,
    {
        let mut tally: HashMap<PostId, usize> = HashMap::new();
        for post in posts {
            if post.is_comment && post.parent_id > 0 {
                *tally.entry(post.parent_id).or_default() += 1;
            }
        }

        let mut changed = false;
        for (parent, count) in tally {
            match self.counts.get(&parent) {
                Some(CommentCount::Authoritative(known)) => {
                    // More comments loaded than the source last reported.
                    if count > *known {
                        self.invalidate(parent);
                    }
                }
                Some(CommentCount::Approximate(existing)) if *existing == count => {}
                _ => {
                    self.counts.insert(parent, CommentCount::Approximate(count));
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn track_revisions<'a, I>(&mut self, posts: I) -> usize
    where
        I: IntoIterator<Item = &'a Post>,
    {
        let mut moved = 0;
        for post in posts {
            if post.is_comment || post.is_pending() {
                continue;
            }
            let Some(id) = post.id().filter(|id| *id > 0) else {
                continue;
            };
            match self.revisions.insert(id, post.updated_at) {
                Some(previous) if previous != post.updated_at => {
                    self.invalidate(id);
                    moved += 1;
                }
                _ => {}
            }
        }
        moved
    }

    pub fn ensure_authoritative<I>(&mut self, post_ids: I) -> usize
    where
        I: IntoIterator<Item = PostId>,
    {
        let mut queued = 0;
        for post_id in post_ids {
            if post_id == 0 || self.requested.contains(&post_id) {
                continue;
            }
            self.requested.insert(post_id);
            if self.jobs.submit(Job::CommentCount { post_id }) {
                self.in_flight.insert(post_id);
                queued += 1;
            } else {
                self.requested.remove(&post_id);
            }
        }
        queued
    }

    pub fn set_authoritative(&mut self, post_id: PostId, count: usize) -> bool {
        let requeue = self.settle(post_id);
        let next = CommentCount::Authoritative(count);
        self.counts.insert(post_id, next) != Some(next) || requeue
    }

    // A failed count keeps whatever estimate exists.
    pub fn fail(&mut self, post_id: PostId) -> bool {
        self.settle(post_id)
    }

    // Stored values are kept until the new count arrives.
    pub fn invalidate(&mut self, post_id: PostId) {
        if self.in_flight.contains(&post_id) {
            self.stale.insert(post_id);
        } else {
            self.requested.remove(&post_id);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    fn settle(&mut self, post_id: PostId) -> bool {
        self.in_flight.remove(&post_id);
        if self.stale.remove(&post_id) {
            self.requested.remove(&post_id);
            return true;
        }
        false
    }
}
