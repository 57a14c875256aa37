#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod comments;
pub mod config;
pub mod controller;
pub mod events;
pub mod fetcher;
pub mod indexer;
pub mod lifecycle;
pub mod model;
pub mod pagination;
pub mod profile;
pub mod reconcile;
pub mod source;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
pub use controller::{FeedController, Options};
pub use events::{FeedEvent, Publisher, Subscription};
pub use fetcher::Sources;
pub use source::FeedError;
