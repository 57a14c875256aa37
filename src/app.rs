use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config;
use crate::controller::FeedController;
use crate::events;
use crate::fetcher::Sources;
use crate::indexer;
use crate::model::{Identity, Post, Profile, SourcePost};
use crate::source::MemorySource;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub pages: Option<usize>,
    pub demo_submission: bool,
    pub json: bool,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    init_logging(&cfg.log.level);

    info!("Starting feedsync v{}", crate::VERSION);

    let sources = if cfg.source.base_url.trim().is_empty() {
        info!("No source.base_url configured; using the built-in demo feed");
        demo_sources()
    } else {
        let client = indexer::Client::new(indexer::ClientConfig {
            base_url: cfg.source.base_url.clone(),
            user_agent: cfg.source.user_agent.clone(),
            timeout: Some(cfg.source.timeout),
            http_client: None,
        })
        .context("create indexer client")?;
        info!("Reading posts from {}", client.base_url());
        let client = Arc::new(client);
        Sources {
            posts: client.clone(),
            profiles: client.clone(),
            interactions: Some(client),
        }
    };

    info!(
        order = cfg.feed.order.as_str(),
        page_size = cfg.feed.page_size,
        "opening feed"
    );
    let (publisher, subscription) = events::channel(events::DEFAULT_CAPACITY);
    let mut feed = FeedController::new(sources, subscription, cfg.controller_options());

    feed.refresh();
    settle(&mut feed);
    let pages = options.pages.unwrap_or(cfg.feed.initial_pages).max(1);
    for _ in 1..pages {
        if !feed.has_more() {
            break;
        }
        feed.load_more();
        settle(&mut feed);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    render(&mut out, &feed, options.json)?;

    if options.demo_submission {
        let draft = Post {
            identity: Identity::Optimistic {
                temp_id: String::new(),
                expected_id: None,
            },
            creator: DEMO_SELF.into(),
            content: "Posting from the terminal".into(),
            image_url: String::new(),
            timestamp: Utc::now().timestamp(),
            updated_at: 0,
            total_tips: 0,
            is_comment: false,
            parent_id: 0,
        };
        let temp_id = publisher.submission_started(draft.clone())?;
        settle(&mut feed);
        if !options.json {
            writeln!(out, "\n-- submitted {temp_id} --")?;
        }
        render(&mut out, &feed, options.json)?;

        let final_id = feed
            .display_list()
            .iter()
            .filter_map(Post::global_id)
            .max()
            .unwrap_or(0)
            + 1;
        publisher.submission_confirmed(&temp_id, final_id, draft)?;
        settle(&mut feed);
        if !options.json {
            writeln!(out, "\n-- confirmed {temp_id} as {final_id} --")?;
        }
        render(&mut out, &feed, options.json)?;
    }

    feed.close();
    Ok(())
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn settle(feed: &mut FeedController) {
    if !feed.wait_for(SETTLE_TIMEOUT) {
        warn!("feed did not settle within {:?}", SETTLE_TIMEOUT);
    }
    for notice in feed.drain_notices() {
        warn!("{notice}");
    }
}

fn render<W: Write>(out: &mut W, feed: &FeedController, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, feed.display_list())?;
        writeln!(out)?;
        return Ok(());
    }
    print_feed(out, feed)
}

fn print_feed<W: Write>(out: &mut W, feed: &FeedController) -> Result<()> {
    let posts = feed.display_list();
    if posts.is_empty() {
        writeln!(out, "No posts to show.")?;
        return Ok(());
    }
    for post in posts {
        let marker = if post.is_pending() { "pending " } else { "" };
        let comments = post.id().map_or(0, |id| feed.comment_count(id));
        writeln!(
            out,
            "{}{} · {} · tips {} · {} comment{}",
            marker,
            feed.display_name(&post.creator),
            format_timestamp(post.timestamp),
            post.total_tips,
            comments,
            if comments == 1 { "" } else { "s" }
        )?;
        writeln!(out, "    {}", post.content.trim())?;
    }
    if feed.has_more() {
        writeln!(out, "… more available")?;
    }
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

const DEMO_SELF: &str = "0x5e1f00000000000000000000000000000000000000000000000000000000c0de";

fn demo_sources() -> Sources {
    let creators = [
        "0xa11ce0000000000000000000000000000000000000000000000000000000a11c",
        "0xb0b0000000000000000000000000000000000000000000000000000000000b0b",
        "0xca7000000000000000000000000000000000000000000000000000000000ca7",
    ];
    let base = Utc::now().timestamp() - 60 * 60 * 24;
    let mut posts = Vec::new();
    let mut per_creator = [0u64; 3];
    for n in 0..25u64 {
        let slot = (n % 3) as usize;
        per_creator[slot] += 1;
        posts.push(SourcePost {
            id: per_creator[slot],
            global_id: n + 1,
            creator: creators[slot].into(),
            content: format!("Update #{} from the demo ledger", n + 1),
            timestamp: base + n as i64 * 900,
            total_tips: (n * 7) % 5,
            ..Default::default()
        });
    }
    posts.push(SourcePost {
        id: per_creator[1] + 1,
        global_id: 26,
        creator: creators[1].into(),
        content: "Nice one".into(),
        timestamp: base + 25 * 900,
        is_comment: true,
        parent_id: 25,
        ..Default::default()
    });

    let memory = MemorySource::with_posts(posts);
    memory.set_profile(
        creators[0],
        Profile {
            display_name: Some("alice".into()),
            avatar: None,
        },
    );
    memory.set_profile(
        creators[1],
        Profile {
            display_name: Some("bob".into()),
            avatar: Some("https://example.invalid/bob.png".into()),
        },
    );
    memory.set_profile(
        DEMO_SELF,
        Profile {
            display_name: Some("you".into()),
            avatar: None,
        },
    );

    let memory = Arc::new(memory);
    Sources {
        posts: memory.clone(),
        profiles: memory.clone(),
        interactions: Some(memory),
    }
}
