use std::sync::Arc;
use std::thread;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::model::{posts_from_source, Post, PostId, Profile, ViewFilter};
use crate::pagination::PageRequest;
use crate::source::{InteractionSource, PostSource, ProfileSource};

#[derive(Clone)]
pub struct Sources {
    pub posts: Arc<dyn PostSource>,
    pub profiles: Arc<dyn ProfileSource>,
    pub interactions: Option<Arc<dyn InteractionSource>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Count { request_id: u64 },
    Page { request_id: u64, request: PageRequest },
    Profile { address: String },
    CommentCount { post_id: PostId },
    Hidden { request_id: u64 },
}

#[derive(Debug, Clone, Default)]
// `records` includes deleted entries dropped from `posts`.
pub struct Page {
    pub records: usize,
    pub posts: Vec<Post>,
}

#[derive(Debug)]
pub enum Response {
    Count {
        request_id: u64,
        result: Result<u64>,
    },
    Page {
        request_id: u64,
        request: PageRequest,
        result: Result<Page>,
    },
    Profile {
        address: String,
        result: Result<Profile>,
    },
    CommentCount {
        post_id: PostId,
        result: Result<usize>,
    },
    Hidden {
        request_id: u64,
        result: Result<ViewFilter>,
    },
}

#[derive(Clone)]
pub struct Handle {
    jobs: Sender<Job>,
}

impl Handle {
    pub fn detached() -> (Self, Receiver<Job>) {
        let (tx, rx) = unbounded();
        (Self { jobs: tx }, rx)
    }

    pub fn submit(&self, job: Job) -> bool {
        self.jobs.send(job).is_ok()
    }
}

struct Inner {
    sources: Sources,
    responses: Sender<Response>,
}

pub struct Fetcher {
    jobs: Sender<Job>,
    stop: Sender<()>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Fetcher {
    pub fn new(sources: Sources, workers: usize, responses: Sender<Response>) -> Self {
        let workers = if workers == 0 { 4 } else { workers };
        let (job_tx, job_rx) = unbounded::<Job>();
        let (stop_tx, stop_rx) = unbounded::<()>();

        let inner = Arc::new(Inner { sources, responses });

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || {
                worker_inner.worker(index, rx_jobs, rx_stop)
            }));
        }

        Self {
            jobs: job_tx,
            stop: stop_tx,
            handles,
        }
    }

    pub fn handle(&self) -> Handle {
        Handle {
            jobs: self.jobs.clone(),
        }
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn worker(&self, index: usize, jobs: Receiver<Job>, stop: Receiver<()>) {
        debug!(worker = index, "fetch worker started");
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
        debug!(worker = index, "fetch worker stopped");
    }

    fn process(&self, job: Job) {
        let response = match job {
            Job::Count { request_id } => Response::Count {
                request_id,
                result: self.sources.posts.fetch_post_count(),
            },
            Job::Page {
                request_id,
                request,
            } => Response::Page {
                request_id,
                request,
                result: self.fetch_page(request),
            },
            Job::Profile { address } => {
                let result = self.sources.profiles.resolve_profile(&address);
                Response::Profile { address, result }
            }
            Job::CommentCount { post_id } => Response::CommentCount {
                post_id,
                result: self
                    .sources
                    .posts
                    .fetch_comments_for_post(post_id)
                    .map(|comments| comments.len()),
            },
            Job::Hidden { request_id } => Response::Hidden {
                request_id,
                result: self.fetch_hidden(),
            },
        };
        let _ = self.responses.send(response);
    }

    fn fetch_page(&self, request: PageRequest) -> Result<Page> {
        let records = self.sources.posts.fetch_posts(request.start, request.count)?;
        let total = records.len();
        Ok(Page {
            records: total,
            posts: posts_from_source(records),
        })
    }

    fn fetch_hidden(&self) -> Result<ViewFilter> {
        let Some(interactions) = &self.sources.interactions else {
            return Ok(ViewFilter::default());
        };
        Ok(ViewFilter {
            hidden_creators: interactions.hidden_creators()?,
            hidden_posts: interactions.hidden_post_ids()?,
        })
    }
}
