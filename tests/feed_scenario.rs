use std::sync::Arc;
use std::time::Duration;

use feedsync::model::{Identity, LifecycleState, Post, PostId, Profile, SourcePost};
use feedsync::pagination::PageOrder;
use feedsync::source::MemorySource;
use feedsync::{events, FeedController, FeedError, Options, Publisher, Sources};

const WAIT: Duration = Duration::from_secs(5);

fn record(creator: &str, id: PostId, timestamp: i64) -> SourcePost {
    SourcePost {
        id,
        global_id: id,
        creator: creator.into(),
        content: format!("{creator} post {id}"),
        timestamp,
        ..Default::default()
    }
}

fn draft(creator: &str, temp_id: &str, content: &str) -> Post {
    Post {
        identity: Identity::Optimistic {
            temp_id: temp_id.into(),
            expected_id: None,
        },
        creator: creator.into(),
        content: content.into(),
        image_url: String::new(),
        timestamp: 0,
        updated_at: 0,
        total_tips: 0,
        is_comment: false,
        parent_id: 0,
    }
}

fn open(memory: &Arc<MemorySource>, page_size: usize) -> (FeedController, Publisher) {
    let (publisher, subscription) = events::channel(events::DEFAULT_CAPACITY);
    let sources = Sources {
        posts: memory.clone(),
        profiles: memory.clone(),
        interactions: Some(memory.clone()),
    };
    let options = Options {
        order: PageOrder::Oldest,
        page_size,
        workers: 2,
        ..Default::default()
    };
    (FeedController::new(sources, subscription, options), publisher)
}

fn settle(feed: &mut FeedController) {
    assert!(feed.wait_for(WAIT), "feed did not go idle");
}

fn twenty_five_by_c() -> Arc<MemorySource> {
    Arc::new(MemorySource::with_posts(
        (1..=25).map(|id| record("C", id, id as i64)).collect(),
    ))
}

#[test]
fn pages_through_source_then_reconciles_submissions() {
    let memory = twenty_five_by_c();
    let (mut feed, publisher) = open(&memory, 10);

    for expected in [10, 20, 25] {
        feed.load_more();
        settle(&mut feed);
        assert_eq!(feed.display_list().len(), expected);
    }
    assert!(!feed.has_more());

    publisher
        .submission_started(draft("C", "t1", "first draft"))
        .unwrap();
    settle(&mut feed);
    assert_eq!(feed.display_list()[0].identity.temp_id(), Some("t1"));
    assert_eq!(feed.display_list().len(), 26);

    publisher
        .submission_started(draft("C", "t2", "second draft"))
        .unwrap();
    settle(&mut feed);
    assert_eq!(feed.display_list().len(), 27);

    let confirmed = Post {
        identity: Identity::Confirmed {
            id: 26,
            global_id: None,
        },
        timestamp: i64::MAX / 2,
        ..draft("C", "", "first draft")
    };
    publisher.submission_confirmed("t1", 26, confirmed).unwrap();
    settle(&mut feed);
    let list = feed.display_list();
    assert_eq!(list[0].global_id(), Some(26));
    assert!(list.iter().all(|post| post.identity.temp_id() != Some("t1")));
    assert_eq!(
        feed.tracker().get("t1").map(|entry| entry.state),
        Some(LifecycleState::Confirmed)
    );

    publisher.submission_failed("t2", "rejected").unwrap();
    settle(&mut feed);
    let list = feed.display_list();
    assert!(list.iter().all(|post| post.identity.temp_id() != Some("t2")));
    assert_eq!(list.len(), 26);
    assert!(feed.tracker().get("t2").is_none());
    let notices = feed.drain_notices();
    assert!(notices.iter().any(|notice| matches!(
        notice,
        FeedError::Submission { temp_id, reason } if temp_id == "t2" && reason == "rejected"
    )));
}

#[test]
fn every_entry_is_unique_and_newest_first() {
    let memory = twenty_five_by_c();
    let (mut feed, publisher) = open(&memory, 10);
    feed.load_more();
    settle(&mut feed);

    // A submission that will land on an id the next page already holds.
    let mut duplicate = draft("C", "t-dup", "page two post");
    duplicate.identity = Identity::Optimistic {
        temp_id: "t-dup".into(),
        expected_id: Some(15),
    };
    duplicate.timestamp = 15;
    publisher.submission_started(duplicate).unwrap();
    feed.load_more();
    settle(&mut feed);

    let list = feed.display_list();
    assert_eq!(list.len(), 20);
    let with_id_15: Vec<&Post> = list.iter().filter(|post| post.id() == Some(15)).collect();
    assert_eq!(with_id_15.len(), 1);
    assert!(!with_id_15[0].is_pending());
    assert!(list
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
}

#[test]
fn profiles_resolve_once_per_address() {
    let memory = twenty_five_by_c();
    memory.set_profile(
        "C",
        Profile {
            display_name: Some("carol".into()),
            avatar: None,
        },
    );
    let (mut feed, _publisher) = open(&memory, 10);
    for _ in 0..3 {
        feed.load_more();
        settle(&mut feed);
    }
    assert_eq!(memory.profile_calls("C"), 1);
    assert_eq!(feed.display_name("C"), "carol");
    assert_eq!(
        feed.display_name("0x1234567890abcdef1234"),
        "0x1234…1234"
    );
}

#[test]
fn exhausted_cursor_stays_exhausted_until_refresh() {
    let memory = twenty_five_by_c();
    let (mut feed, _publisher) = open(&memory, 10);
    for _ in 0..3 {
        feed.load_more();
        settle(&mut feed);
    }
    assert!(!feed.has_more());
    let calls = memory.page_calls();

    memory.push(record("C", 26, 26));
    feed.load_more();
    settle(&mut feed);
    assert_eq!(memory.page_calls(), calls);
    assert!(!feed.has_more());

    feed.refresh();
    settle(&mut feed);
    assert!(feed.has_more());
    assert_eq!(feed.display_list().len(), 10);
}

#[test]
fn external_change_reloads_first_page() {
    let memory = twenty_five_by_c();
    let (mut feed, publisher) = open(&memory, 10);
    feed.refresh();
    settle(&mut feed);

    assert!(memory.update(3, "C", |post| post.total_tips = 9));
    publisher.external_state_changed().unwrap();
    settle(&mut feed);

    let tipped = feed
        .display_list()
        .iter()
        .find(|post| post.id() == Some(3))
        .map(|post| post.total_tips);
    assert_eq!(tipped, Some(9));
}

#[test]
fn hidden_creators_and_posts_are_filtered() {
    let mut records: Vec<SourcePost> = (1..=6).map(|id| record("C", id, id as i64)).collect();
    records.extend((1..=4).map(|id| record("D", id, 10 + id as i64)));
    let memory = Arc::new(MemorySource::with_posts(records));
    let (mut feed, _publisher) = open(&memory, 20);
    feed.refresh();
    settle(&mut feed);
    assert_eq!(feed.display_list().len(), 10);

    memory.hide_creator("D");
    memory.hide_post(2);
    feed.refresh_hidden();
    settle(&mut feed);

    let list = feed.display_list();
    assert_eq!(list.len(), 5);
    assert!(list.iter().all(|post| post.creator == "C"));
    assert!(list.iter().all(|post| post.id() != Some(2)));
}

#[test]
fn comment_counts_become_authoritative() {
    let mut records: Vec<SourcePost> = (1..=3).map(|id| record("C", id, id as i64)).collect();
    records.push(SourcePost {
        is_comment: true,
        parent_id: 1,
        ..record("D", 1, 4)
    });
    records.push(SourcePost {
        is_comment: true,
        parent_id: 1,
        ..record("D", 2, 5)
    });
    let memory = Arc::new(MemorySource::with_posts(records));
    let (mut feed, _publisher) = open(&memory, 20);
    feed.refresh();
    settle(&mut feed);

    assert_eq!(feed.display_list().len(), 3);
    assert_eq!(feed.comment_count(1), 2);
    assert_eq!(feed.comment_count(2), 0);
    assert_eq!(memory.comment_calls(1), 1);
}

#[test]
fn failed_source_reports_without_clearing_feed() {
    let memory = twenty_five_by_c();
    let (mut feed, _publisher) = open(&memory, 10);
    feed.refresh();
    settle(&mut feed);
    feed.drain_notices();

    memory.set_failing(true);
    feed.refresh();
    settle(&mut feed);
    assert_eq!(feed.display_list().len(), 10);
    assert!(feed
        .drain_notices()
        .iter()
        .any(|notice| matches!(notice, FeedError::SourceFetch { .. })));
}

#[test]
fn confirmed_submission_yields_to_source_record_on_later_page() {
    let memory = twenty_five_by_c();
    let (mut feed, publisher) = open(&memory, 10);
    feed.load_more();
    settle(&mut feed);

    publisher
        .submission_started(draft("C", "t1", "fresh post"))
        .unwrap();
    let confirmed = Post {
        identity: Identity::Confirmed {
            id: 26,
            global_id: Some(26),
        },
        timestamp: 26,
        ..draft("C", "", "fresh post")
    };
    publisher.submission_confirmed("t1", 26, confirmed).unwrap();
    settle(&mut feed);
    assert_eq!(feed.tracker().len(), 1);

    memory.push(SourcePost {
        total_tips: 9,
        content: "fresh post".into(),
        ..record("C", 26, 26)
    });
    publisher.external_state_changed().unwrap();
    settle(&mut feed);
    for _ in 0..3 {
        feed.load_more();
        settle(&mut feed);
    }

    assert!(!feed.has_more());
    assert_eq!(feed.tracker().len(), 0);
    let tips = feed
        .display_list()
        .iter()
        .find(|post| post.id() == Some(26))
        .map(|post| post.total_tips);
    assert_eq!(tips, Some(9));
    assert_eq!(
        feed.display_list()
            .iter()
            .filter(|post| post.id() == Some(26))
            .count(),
        1
    );
}

#[test]
fn refresh_only_recounts_comments_for_changed_posts() {
    let memory = Arc::new(MemorySource::with_posts(
        (1..=3).map(|id| record("C", id, id as i64)).collect(),
    ));
    let (mut feed, publisher) = open(&memory, 20);
    feed.refresh();
    settle(&mut feed);
    assert_eq!(memory.comment_calls(1), 1);
    assert_eq!(memory.comment_calls(2), 1);

    publisher.external_state_changed().unwrap();
    settle(&mut feed);
    assert_eq!(memory.comment_calls(1), 1);
    assert_eq!(memory.comment_calls(2), 1);

    memory.push(SourcePost {
        is_comment: true,
        parent_id: 2,
        ..record("D", 1, 4)
    });
    assert!(memory.update(2, "C", |post| post.updated_at = 40));
    publisher.external_state_changed().unwrap();
    settle(&mut feed);
    assert_eq!(memory.comment_calls(1), 1);
    assert_eq!(memory.comment_calls(2), 2);
    assert_eq!(feed.comment_count(2), 1);
}

#[test]
fn confirmed_comment_recounts_its_parent() {
    let memory = Arc::new(MemorySource::with_posts(
        (1..=3).map(|id| record("C", id, id as i64)).collect(),
    ));
    let (mut feed, publisher) = open(&memory, 20);
    feed.refresh();
    settle(&mut feed);
    assert_eq!(feed.comment_count(3), 0);

    memory.push(SourcePost {
        is_comment: true,
        parent_id: 3,
        ..record("D", 1, 4)
    });
    let reply = Post {
        identity: Identity::Confirmed {
            id: 1,
            global_id: Some(4),
        },
        is_comment: true,
        parent_id: 3,
        timestamp: 4,
        ..draft("D", "", "reply")
    };
    publisher.submission_confirmed("t-reply", 4, reply).unwrap();
    settle(&mut feed);

    assert_eq!(memory.comment_calls(3), 2);
    assert_eq!(feed.comment_count(3), 1);
    assert!(feed.display_list().iter().all(|post| !post.is_comment));
}
