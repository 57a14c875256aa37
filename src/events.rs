use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::lifecycle::new_temp_id;
use crate::model::{Identity, Post, PostId};

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    SubmissionStarted { post: Post },
    SubmissionConfirmed {
        temp_id: String,
        final_id: PostId,
        post: Post,
    },
    SubmissionFailed { temp_id: String, reason: String },
    ExternalStateChanged,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event queue is full")]
    Full,
    #[error("feed is no longer listening")]
    Closed,
}

#[derive(Clone)]
pub struct Publisher {
    tx: Sender<FeedEvent>,
}

pub struct Subscription {
    rx: Receiver<FeedEvent>,
}

pub fn channel(capacity: usize) -> (Publisher, Subscription) {
    let (tx, rx) = bounded(capacity.max(1));
    (Publisher { tx }, Subscription { rx })
}

impl Publisher {
    pub fn publish(&self, event: FeedEvent) -> Result<(), PublishError> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => PublishError::Full,
            TrySendError::Disconnected(_) => PublishError::Closed,
        })
    }

    pub fn submission_started(&self, mut post: Post) -> Result<String, PublishError> {
        let existing = post
            .identity
            .temp_id()
            .filter(|temp_id| !temp_id.is_empty())
            .map(str::to_string);
        let temp_id = match existing {
            Some(temp_id) => temp_id,
            None => {
                let temp_id = new_temp_id();
                let expected_id = post.id().filter(|id| *id > 0);
                post.identity = Identity::Optimistic {
                    temp_id: temp_id.clone(),
                    expected_id,
                };
                temp_id
            }
        };
        self.publish(FeedEvent::SubmissionStarted { post })?;
        Ok(temp_id)
    }

    pub fn submission_confirmed(
        &self,
        temp_id: &str,
        final_id: PostId,
        post: Post,
    ) -> Result<(), PublishError> {
        self.publish(FeedEvent::SubmissionConfirmed {
            temp_id: temp_id.to_string(),
            final_id,
            post,
        })
    }

    pub fn submission_failed(&self, temp_id: &str, reason: &str) -> Result<(), PublishError> {
        self.publish(FeedEvent::SubmissionFailed {
            temp_id: temp_id.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn external_state_changed(&self) -> Result<(), PublishError> {
        self.publish(FeedEvent::ExternalStateChanged)
    }
}

impl Subscription {
    pub fn try_next(&self) -> Option<FeedEvent> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn receiver(&self) -> &Receiver<FeedEvent> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(identity: Identity) -> Post {
        Post {
            identity,
            creator: "0xa".into(),
            content: "hi".into(),
            image_url: String::new(),
            timestamp: 1,
            updated_at: 1,
            total_tips: 0,
            is_comment: false,
            parent_id: 0,
        }
    }

    #[test]
    fn started_assigns_temp_id() {
        let (publisher, subscription) = channel(4);
        let temp_id = publisher
            .submission_started(post(Identity::Confirmed {
                id: 3,
                global_id: None,
            }))
            .unwrap();
        match subscription.try_next() {
            Some(FeedEvent::SubmissionStarted { post }) => {
                assert_eq!(post.identity.temp_id(), Some(temp_id.as_str()));
                assert_eq!(post.id(), Some(3));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn started_keeps_caller_temp_id() {
        let (publisher, _subscription) = channel(4);
        let temp_id = publisher
            .submission_started(post(Identity::Optimistic {
                temp_id: "t1".into(),
                expected_id: None,
            }))
            .unwrap();
        assert_eq!(temp_id, "t1");
    }

    #[test]
    fn full_and_closed_queues_are_reported() {
        let (publisher, subscription) = channel(1);
        publisher.external_state_changed().unwrap();
        assert!(matches!(
            publisher.external_state_changed(),
            Err(PublishError::Full)
        ));
        drop(subscription);
        assert!(matches!(
            publisher.submission_failed("t1", "rejected"),
            Err(PublishError::Closed)
        ));
    }
}
