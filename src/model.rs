use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type PostId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Identity {
    Optimistic {
        temp_id: String,
        #[serde(default)]
        expected_id: Option<PostId>,
    },
    Confirmed {
        id: PostId,
        #[serde(default)]
        global_id: Option<PostId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Authority {
    Optimistic,
    Confirmed,
    Global,
}

impl Identity {
    pub fn authority(&self) -> Authority {
        match self {
            Identity::Optimistic { .. } => Authority::Optimistic,
            Identity::Confirmed {
                global_id: None, ..
            } => Authority::Confirmed,
            Identity::Confirmed {
                global_id: Some(_), ..
            } => Authority::Global,
        }
    }

    pub fn temp_id(&self) -> Option<&str> {
        match self {
            Identity::Optimistic { temp_id, .. } => Some(temp_id),
            Identity::Confirmed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyId {
    Seq(PostId),
    Temp(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub creator: String,
    pub id: KeyId,
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            KeyId::Seq(id) => write!(f, "{}#{}", self.creator, id),
            KeyId::Temp(temp) => write!(f, "{}~{}", self.creator, temp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub identity: Identity,
    pub creator: String,
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    pub timestamp: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub total_tips: u64,
    #[serde(default)]
    pub is_comment: bool,
    #[serde(default)]
    pub parent_id: PostId,
}

impl Post {
    pub fn id(&self) -> Option<PostId> {
        match &self.identity {
            Identity::Confirmed { id, .. } => Some(*id),
            Identity::Optimistic { expected_id, .. } => *expected_id,
        }
    }

    pub fn global_id(&self) -> Option<PostId> {
        match &self.identity {
            Identity::Confirmed { global_id, .. } => *global_id,
            Identity::Optimistic { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.identity, Identity::Optimistic { .. })
    }

    pub fn key(&self) -> Option<CompositeKey> {
        if self.creator.trim().is_empty() {
            return None;
        }
        let id = match &self.identity {
            Identity::Confirmed { id: 0, .. } => return None,
            Identity::Confirmed { id, .. } => KeyId::Seq(*id),
            Identity::Optimistic {
                expected_id: Some(id),
                ..
            } if *id > 0 => KeyId::Seq(*id),
            Identity::Optimistic { temp_id, .. } => {
                if temp_id.is_empty() {
                    return None;
                }
                KeyId::Temp(temp_id.clone())
            }
        };
        Some(CompositeKey {
            creator: self.creator.clone(),
            id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePost {
    #[serde(default)]
    pub id: PostId,
    #[serde(default)]
    pub global_id: PostId,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub total_tips: u64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_comment: bool,
    #[serde(default)]
    pub parent_id: PostId,
}

impl From<SourcePost> for Post {
    fn from(raw: SourcePost) -> Self {
        Post {
            identity: Identity::Confirmed {
                id: raw.id,
                global_id: (raw.global_id > 0).then_some(raw.global_id),
            },
            creator: raw.creator,
            content: raw.content,
            image_url: raw.image_url,
            timestamp: raw.timestamp,
            updated_at: if raw.updated_at == 0 {
                raw.timestamp
            } else {
                raw.updated_at
            },
            total_tips: raw.total_tips,
            is_comment: raw.is_comment,
            parent_id: raw.parent_id,
        }
    }
}

pub fn posts_from_source(records: Vec<SourcePost>) -> Vec<Post> {
    records
        .into_iter()
        .filter(|record| !record.is_deleted)
        .map(Post::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticPost {
    pub temp_id: String,
    pub state: LifecycleState,
    pub post: Post,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.avatar.is_none()
    }
}

pub fn short_address(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.chars().count() <= 12 {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(6).collect();
    let tail: String = trimmed
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{head}…{tail}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub hidden_creators: HashSet<String>,
    pub hidden_posts: HashSet<PostId>,
}

impl ViewFilter {
    pub fn allows(&self, post: &Post) -> bool {
        if post.is_comment {
            return false;
        }
        if self.hidden_creators.contains(&post.creator) {
            return false;
        }
        match post.id() {
            Some(id) => !self.hidden_posts.contains(&id),
            None => true,
        }
    }
}
