use std::collections::HashMap;

use crate::model::{CompositeKey, OptimisticPost, Post, ViewFilter};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub posts: Vec<Post>,
    pub malformed: usize,
}

pub fn merge(confirmed: &[Post], optimistic: &[OptimisticPost], filter: &ViewFilter) -> Merged {
    let candidates = optimistic
        .iter()
        .map(|entry| &entry.post)
        .chain(confirmed.iter());

    let mut slots: HashMap<CompositeKey, usize> = HashMap::new();
    let mut posts: Vec<Post> = Vec::new();
    let mut malformed = 0usize;

    for post in candidates {
        let Some(key) = post.key() else {
            malformed += 1;
            continue;
        };
        match slots.get(&key) {
            Some(&index) => {
                if post.identity.authority() > posts[index].identity.authority() {
                    posts[index] = post.clone();
                }
            }
            None => {
                slots.insert(key, posts.len());
                posts.push(post.clone());
            }
        }
    }

    posts.retain(|post| filter.allows(post));
    posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Merged { posts, malformed }
}

pub fn append_page(existing: &mut Vec<Post>, incoming: Vec<Post>) -> usize {
    let mut index: HashMap<CompositeKey, usize> = existing
        .iter()
        .enumerate()
        .filter_map(|(idx, post)| post.key().map(|key| (key, idx)))
        .collect();

    let mut added = 0;
    for post in incoming {
        match post.key() {
            Some(key) => match index.get(&key) {
                Some(&slot) => {
                    if post.identity.authority() >= existing[slot].identity.authority() {
                        existing[slot] = post;
                    }
                }
                None => {
                    index.insert(key, existing.len());
                    existing.push(post);
                    added += 1;
                }
            },
            // Kept so the merge can count it.
            None => existing.push(post),
        }
    }
    added
}
