use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Result};
use parking_lot::{Mutex, RwLock};

use crate::model::{PostId, Profile, SourcePost};

pub trait PostSource: Send + Sync {
    fn fetch_posts(&self, start: u64, count: usize) -> Result<Vec<SourcePost>>;
    fn fetch_post_count(&self) -> Result<u64>;
    fn fetch_comments_for_post(&self, id: PostId) -> Result<Vec<SourcePost>>;
}

pub trait ProfileSource: Send + Sync {
    fn resolve_display_name(&self, address: &str) -> Result<Option<String>>;
    fn resolve_avatar(&self, address: &str) -> Result<Option<String>>;

    fn resolve_profile(&self, address: &str) -> Result<Profile> {
        Ok(Profile {
            display_name: self.resolve_display_name(address)?,
            avatar: self.resolve_avatar(address)?,
        })
    }
}

pub trait InteractionSource: Send + Sync {
    fn hidden_creators(&self) -> Result<HashSet<String>>;
    fn hidden_post_ids(&self) -> Result<HashSet<PostId>>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("failed to {operation}: {message}")]
    SourceFetch {
        operation: &'static str,
        message: String,
    },
    #[error("failed to load profile for {address}: {message}")]
    Hydration { address: String, message: String },
    #[error("post {temp_id} failed: {reason}")]
    Submission { temp_id: String, reason: String },
}

impl FeedError {
    pub fn source_fetch(operation: &'static str, err: &anyhow::Error) -> Self {
        FeedError::SourceFetch {
            operation,
            message: format!("{err:#}"),
        }
    }
}

#[derive(Default)]
pub struct MemorySource {
    posts: RwLock<Vec<SourcePost>>,
    profiles: RwLock<HashMap<String, Profile>>,
    hidden_creators: RwLock<HashSet<String>>,
    hidden_posts: RwLock<HashSet<PostId>>,
    failing: AtomicBool,
    failing_profiles: RwLock<HashSet<String>>,
    page_calls: AtomicUsize,
    count_calls: AtomicUsize,
    comment_calls: Mutex<HashMap<PostId, usize>>,
    profile_calls: Mutex<HashMap<String, usize>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: Vec<SourcePost>) -> Self {
        let source = Self::new();
        *source.posts.write() = posts;
        source
    }

    pub fn push(&self, post: SourcePost) {
        self.posts.write().push(post);
    }

    pub fn update<F: FnOnce(&mut SourcePost)>(&self, id: PostId, creator: &str, f: F) -> bool {
        let mut posts = self.posts.write();
        match posts
            .iter_mut()
            .find(|post| post.id == id && post.creator == creator)
        {
            Some(post) => {
                f(post);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.posts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.read().is_empty()
    }

    pub fn set_profile(&self, address: &str, profile: Profile) {
        self.profiles.write().insert(address.to_string(), profile);
    }

    pub fn hide_creator(&self, address: &str) {
        self.hidden_creators.write().insert(address.to_string());
    }

    pub fn hide_post(&self, id: PostId) {
        self.hidden_posts.write().insert(id);
    }

    // While set, every post, count and comment fetch fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_profile(&self, address: &str) {
        self.failing_profiles.write().insert(address.to_string());
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn comment_calls(&self, id: PostId) -> usize {
        self.comment_calls.lock().get(&id).copied().unwrap_or(0)
    }

    pub fn profile_calls(&self, address: &str) -> usize {
        self.profile_calls.lock().get(address).copied().unwrap_or(0)
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("memory source: unavailable");
        }
        Ok(())
    }
}

impl PostSource for MemorySource {
    fn fetch_posts(&self, start: u64, count: usize) -> Result<Vec<SourcePost>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let posts = self.posts.read();
        let start = usize::try_from(start).unwrap_or(usize::MAX).min(posts.len());
        let end = start.saturating_add(count).min(posts.len());
        Ok(posts[start..end].to_vec())
    }

    fn fetch_post_count(&self) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.posts.read().len() as u64)
    }

    fn fetch_comments_for_post(&self, id: PostId) -> Result<Vec<SourcePost>> {
        *self.comment_calls.lock().entry(id).or_default() += 1;
        self.check_available()?;
        Ok(self
            .posts
            .read()
            .iter()
            .filter(|post| post.is_comment && post.parent_id == id && !post.is_deleted)
            .cloned()
            .collect())
    }
}

impl ProfileSource for MemorySource {
    fn resolve_display_name(&self, address: &str) -> Result<Option<String>> {
        if self.failing_profiles.read().contains(address) {
            bail!("memory source: profile unavailable");
        }
        Ok(self
            .profiles
            .read()
            .get(address)
            .and_then(|profile| profile.display_name.clone()))
    }

    fn resolve_avatar(&self, address: &str) -> Result<Option<String>> {
        if self.failing_profiles.read().contains(address) {
            bail!("memory source: profile unavailable");
        }
        Ok(self
            .profiles
            .read()
            .get(address)
            .and_then(|profile| profile.avatar.clone()))
    }

    fn resolve_profile(&self, address: &str) -> Result<Profile> {
        *self
            .profile_calls
            .lock()
            .entry(address.to_string())
            .or_default() += 1;
        Ok(Profile {
            display_name: self.resolve_display_name(address)?,
            avatar: self.resolve_avatar(address)?,
        })
    }
}

impl InteractionSource for MemorySource {
    fn hidden_creators(&self) -> Result<HashSet<String>> {
        Ok(self.hidden_creators.read().clone())
    }

    fn hidden_post_ids(&self) -> Result<HashSet<PostId>> {
        Ok(self.hidden_posts.read().clone())
    }
}
