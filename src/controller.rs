use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::comments::CommentCountIndex;
use crate::events::{FeedEvent, Subscription};
use crate::fetcher::{Fetcher, Handle, Job, Page, Response, Sources};
use crate::lifecycle::Tracker;
use crate::model::{CompositeKey, Post, PostId, Profile, ViewFilter};
use crate::pagination::{PageOrder, PageRequest, PaginationCursor};
use crate::profile::ProfileCache;
use crate::reconcile::{append_page, merge};
use crate::source::FeedError;

#[derive(Debug, Clone)]
pub struct Options {
    pub order: PageOrder,
    pub page_size: usize,
    pub pending_max_age: Duration,
    pub workers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            order: PageOrder::Newest,
            page_size: 20,
            pending_max_age: Duration::from_secs(5 * 60),
            workers: 4,
        }
    }
}

enum PendingLoad {
    Refresh {
        request_id: u64,
        staged: PaginationCursor,
        awaiting_count: bool,
    },
    Append {
        request_id: u64,
    },
}

// Results and events are applied only inside poll/wait_for, on the owning thread.
pub struct FeedController {
    jobs: Handle,
    responses: Receiver<Response>,
    events: Subscription,
    options: Options,
    has_interactions: bool,
    cursor: PaginationCursor,
    pending_load: Option<PendingLoad>,
    hidden_request: Option<u64>,
    next_request_id: u64,
    confirmed: Vec<Post>,
    tracker: Tracker,
    profiles: ProfileCache,
    comments: CommentCountIndex,
    filter: ViewFilter,
    display: Vec<Post>,
    notices: Vec<FeedError>,
    dirty: bool,
    closed: bool,
    // Declared last so the workers are joined after everything else drops.
    _fetcher: Fetcher,
}

impl FeedController {
    pub fn new(sources: Sources, events: Subscription, options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let has_interactions = sources.interactions.is_some();
        let fetcher = Fetcher::new(sources, options.workers, response_tx);
        let jobs = fetcher.handle();

        Self {
            profiles: ProfileCache::new(jobs.clone()),
            comments: CommentCountIndex::new(jobs.clone()),
            jobs,
            responses: response_rx,
            events,
            cursor: PaginationCursor::new(options.order, options.page_size),
            options,
            has_interactions,
            pending_load: None,
            hidden_request: None,
            next_request_id: 1,
            confirmed: Vec::new(),
            tracker: Tracker::new(),
            filter: ViewFilter::default(),
            display: Vec::new(),
            notices: Vec::new(),
            dirty: false,
            closed: false,
            _fetcher: fetcher,
        }
    }

    pub fn display_list(&self) -> &[Post] {
        &self.display
    }

    pub fn comment_count(&self, post_id: PostId) -> usize {
        self.comments.count(post_id)
    }

    pub fn profile(&self, address: &str) -> Option<&Profile> {
        self.profiles.get(address)
    }

    pub fn display_name(&self, address: &str) -> String {
        self.profiles.display_name(address)
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn view_filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn has_more(&self) -> bool {
        self.cursor.has_more()
    }

    pub fn is_loading_more(&self) -> bool {
        matches!(self.pending_load, Some(PendingLoad::Append { .. }))
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.pending_load, Some(PendingLoad::Refresh { .. }))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_idle(&self) -> bool {
        self.pending_load.is_none()
            && self.hidden_request.is_none()
            && self.profiles.outstanding() == 0
            && self.comments.outstanding() == 0
            && self.events.receiver().is_empty()
    }

    pub fn drain_notices(&mut self) -> Vec<FeedError> {
        std::mem::take(&mut self.notices)
    }

    pub fn set_view_filter(&mut self, filter: ViewFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.dirty = true;
            self.flush();
        }
    }

    pub fn refresh_hidden(&mut self) {
        if self.closed || !self.has_interactions {
            return;
        }
        let request_id = self.take_request_id();
        if self.jobs.submit(Job::Hidden { request_id }) {
            self.hidden_request = Some(request_id);
        }
    }

    pub fn refresh(&mut self) {
        if self.closed {
            return;
        }
        if let Some(PendingLoad::Append { .. }) = self.pending_load.take() {
            self.cursor.fail();
        }

        let removed = self
            .tracker
            .prune_stale(self.options.pending_max_age, Utc::now().timestamp());
        if !removed.is_empty() {
            info!(count = removed.len(), "dropped stale pending submissions");
            self.dirty = true;
        }

        let request_id = self.take_request_id();
        let staged = PaginationCursor::new(self.options.order, self.options.page_size);
        match self.options.order {
            PageOrder::Newest => {
                if self.jobs.submit(Job::Count { request_id }) {
                    self.pending_load = Some(PendingLoad::Refresh {
                        request_id,
                        staged,
                        awaiting_count: true,
                    });
                }
            }
            PageOrder::Oldest => self.start_refresh_page(request_id, staged),
        }

        self.refresh_hidden();
        self.flush();
    }

    pub fn load_more(&mut self) {
        if self.closed || self.pending_load.is_some() {
            return;
        }
        if self.cursor.order() == PageOrder::Newest && self.cursor.total().is_none() {
            // Newest-first windows need the total, which only a refresh reads.
            self.refresh();
            return;
        }
        let Some(request) = self.cursor.begin_next() else {
            return;
        };
        if request.count == 0 {
            self.cursor.complete(request.page, 0);
            return;
        }
        let request_id = self.take_request_id();
        if self.jobs.submit(Job::Page {
            request_id,
            request,
        }) {
            debug!(page = request.page, start = request.start, "loading page");
            self.pending_load = Some(PendingLoad::Append { request_id });
        } else {
            self.cursor.fail();
        }
    }

    pub fn poll(&mut self) -> bool {
        if self.closed {
            while self.responses.try_recv().is_ok() {}
            return false;
        }
        let mut changed = false;
        while let Ok(event) = self.events.receiver().try_recv() {
            self.handle_event(event);
            changed = true;
        }
        while let Ok(response) = self.responses.try_recv() {
            self.handle_response(response);
            changed = true;
        }
        self.flush();
        changed
    }

    pub fn wait_for(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if self.closed || self.is_idle() {
                return !self.closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.responses.recv_timeout(deadline - now) {
                Ok(response) => {
                    self.handle_response(response);
                    self.flush();
                }
                Err(RecvTimeoutError::Timeout) => return self.is_idle(),
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending_load = None;
        self.hidden_request = None;
        while self.responses.try_recv().is_ok() {}
        debug!("feed controller closed");
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn start_refresh_page(&mut self, request_id: u64, mut staged: PaginationCursor) {
        let Some(request) = staged.begin_next() else {
            self.pending_load = None;
            return;
        };
        if request.count == 0 {
            staged.complete(request.page, 0);
            self.pending_load = None;
            self.cursor = staged;
            self.apply_replace(Vec::new());
            return;
        }
        if self.jobs.submit(Job::Page {
            request_id,
            request,
        }) {
            self.pending_load = Some(PendingLoad::Refresh {
                request_id,
                staged,
                awaiting_count: false,
            });
        } else {
            self.pending_load = None;
        }
    }

    fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::SubmissionStarted { post } => {
                let temp_id = self.tracker.begin(post);
                debug!(%temp_id, "submission started");
            }
            FeedEvent::SubmissionConfirmed {
                temp_id,
                final_id,
                post,
            } => {
                if post.is_comment && post.parent_id > 0 {
                    self.comments.invalidate(post.parent_id);
                }
                let outcome = self.tracker.confirm(&temp_id, final_id, post);
                info!(%temp_id, final_id, ?outcome, "submission confirmed");
            }
            FeedEvent::SubmissionFailed { temp_id, reason } => {
                self.tracker.fail(&temp_id);
                warn!(%temp_id, %reason, "submission failed");
                self.notices.push(FeedError::Submission { temp_id, reason });
            }
            FeedEvent::ExternalStateChanged => {
                debug!("external state changed; refreshing");
                self.refresh();
            }
        }
        self.dirty = true;
    }

    fn handle_response(&mut self, response: Response) {
        match response {
            Response::Count { request_id, result } => self.handle_count(request_id, result),
            Response::Page {
                request_id,
                request,
                result,
            } => self.handle_page(request_id, request, result),
            Response::Profile { address, result } => {
                if self.profiles.resolve(&address, result) {
                    self.dirty = true;
                }
            }
            Response::CommentCount { post_id, result } => match result {
                Ok(count) => {
                    if self.comments.set_authoritative(post_id, count) {
                        self.dirty = true;
                    }
                }
                Err(err) => {
                    if self.comments.fail(post_id) {
                        self.dirty = true;
                    }
                    self.report("load comments", &err);
                }
            },
            Response::Hidden { request_id, result } => {
                if self.hidden_request != Some(request_id) {
                    return;
                }
                self.hidden_request = None;
                match result {
                    Ok(filter) => {
                        if self.filter != filter {
                            self.filter = filter;
                            self.dirty = true;
                        }
                    }
                    Err(err) => self.report("load hidden entities", &err),
                }
            }
        }
    }

    fn handle_count(&mut self, request_id: u64, result: anyhow::Result<u64>) {
        let staged = match self.pending_load.take() {
            Some(PendingLoad::Refresh {
                request_id: pending,
                staged,
                awaiting_count: true,
            }) if pending == request_id => staged,
            other => {
                self.pending_load = other;
                return;
            }
        };
        match result {
            Ok(total) => {
                let mut staged = staged;
                staged.set_total(total);
                debug!(total, "post count loaded");
                self.start_refresh_page(request_id, staged);
            }
            Err(err) => self.report("count posts", &err),
        }
    }

    fn handle_page(&mut self, request_id: u64, request: PageRequest, result: anyhow::Result<Page>) {
        match self.pending_load.take() {
            Some(PendingLoad::Refresh {
                request_id: pending,
                mut staged,
                awaiting_count: false,
            }) if pending == request_id => match result {
                Ok(page) => {
                    staged.complete(request.page, page.records);
                    self.cursor = staged;
                    self.apply_replace(page.posts);
                }
                Err(err) => self.report("load posts", &err),
            },
            Some(PendingLoad::Append {
                request_id: pending,
            }) if pending == request_id => match result {
                Ok(page) => {
                    self.cursor.complete(request.page, page.records);
                    self.apply_append(page.posts);
                }
                Err(err) => {
                    self.cursor.fail();
                    self.report("load more posts", &err);
                }
            },
            other => {
                self.pending_load = other;
                debug!(request_id, "discarding superseded page");
            }
        }
    }

    fn apply_replace(&mut self, posts: Vec<Post>) {
        self.confirmed = posts;
        self.absorb_confirmed();
        info!(
            posts = self.confirmed.len(),
            has_more = self.cursor.has_more(),
            "feed refreshed"
        );
        self.dirty = true;
    }

    fn apply_append(&mut self, posts: Vec<Post>) {
        let incoming = posts.len();
        let added = append_page(&mut self.confirmed, posts);
        if added < incoming {
            debug!(skipped = incoming - added, "page overlapped loaded posts");
        }
        self.absorb_confirmed();
        info!(
            added,
            total = self.confirmed.len(),
            has_more = self.cursor.has_more(),
            "loaded more posts"
        );
        self.dirty = true;
    }

    // Runs after every page lands, whichever page it was.
    fn absorb_confirmed(&mut self) {
        let served: HashSet<CompositeKey> = self.confirmed.iter().filter_map(Post::key).collect();
        let retired = self.tracker.retire_covered(&served);
        if retired > 0 {
            debug!(retired, "confirmed submissions now served by source");
        }
        let moved = self.comments.track_revisions(&self.confirmed);
        if moved > 0 {
            debug!(moved, "posts changed since their comments were counted");
        }
        self.comments.approximate(&self.confirmed);
    }

    fn report(&mut self, operation: &'static str, err: &anyhow::Error) {
        warn!(operation, error = %format!("{err:#}"), "source fetch failed");
        self.notices.push(FeedError::source_fetch(operation, err));
    }

    fn flush(&mut self) {
        if !self.dirty || self.closed {
            return;
        }
        self.dirty = false;

        let merged = merge(&self.confirmed, self.tracker.entries(), &self.filter);
        if merged.malformed > 0 {
            debug!(malformed = merged.malformed, "dropped malformed posts");
        }
        self.display = merged.posts;

        self.profiles
            .ensure(self.display.iter().map(|post| post.creator.as_str()));
        self.comments.ensure_authoritative(
            self.display
                .iter()
                .filter(|post| !post.is_pending())
                .filter_map(Post::id),
        );
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        self.close();
    }
}
