use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageOrder {
    #[default]
    Newest,
    Oldest,
}

impl PageOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageOrder::Newest => "newest",
            PageOrder::Oldest => "oldest",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "newest" | "latest" => Some(PageOrder::Newest),
            "oldest" => Some(PageOrder::Oldest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub start: u64,
    pub count: usize,
}

#[derive(Debug, Clone)]
// A page shorter than page_size ends the feed until reset.
pub struct PaginationCursor {
    order: PageOrder,
    page_size: usize,
    cursor: Option<usize>,
    has_more: bool,
    in_flight: bool,
    total: Option<u64>,
}

impl PaginationCursor {
    pub fn new(order: PageOrder, page_size: usize) -> Self {
        Self {
            order,
            page_size: page_size.max(1),
            cursor: None,
            has_more: true,
            in_flight: false,
            total: None,
        }
    }

    pub fn order(&self) -> PageOrder {
        self.order
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = Some(total);
    }

    pub fn reset(&mut self) {
        self.cursor = None;
        self.has_more = true;
        self.in_flight = false;
        self.total = None;
    }

    pub fn begin_next(&mut self) -> Option<PageRequest> {
        if self.in_flight || !self.has_more {
            return None;
        }
        let page = self.cursor.map_or(0, |cursor| cursor + 1);
        let request = self.window(page)?;
        self.in_flight = true;
        Some(request)
    }

    pub fn complete(&mut self, page: usize, returned: usize) {
        self.in_flight = false;
        let expected = self.cursor.map_or(0, |cursor| cursor + 1);
        if page != expected {
            return;
        }
        self.cursor = Some(page);
        let full = match self.window(page) {
            Some(window) => window.count == self.page_size && returned >= self.page_size,
            None => false,
        };
        if !full {
            self.has_more = false;
        }
    }

    pub fn fail(&mut self) {
        self.in_flight = false;
    }

    fn window(&self, page: usize) -> Option<PageRequest> {
        let size = self.page_size as u64;
        match self.order {
            PageOrder::Oldest => Some(PageRequest {
                page,
                start: page as u64 * size,
                count: self.page_size,
            }),
            PageOrder::Newest => {
                let total = self.total.unwrap_or(0);
                let end = total.checked_sub(page as u64 * size)?;
                let start = end.saturating_sub(size);
                Some(PageRequest {
                    page,
                    start,
                    count: (end - start) as usize,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_pages_walk_forward() {
        let mut cursor = PaginationCursor::new(PageOrder::Oldest, 10);
        let first = cursor.begin_next().unwrap();
        assert_eq!((first.page, first.start, first.count), (0, 0, 10));
        cursor.complete(0, 10);
        let second = cursor.begin_next().unwrap();
        assert_eq!((second.page, second.start), (1, 10));
    }

    #[test]
    fn in_flight_drops_second_request() {
        let mut cursor = PaginationCursor::new(PageOrder::Oldest, 10);
        assert!(cursor.begin_next().is_some());
        assert!(cursor.begin_next().is_none());
        cursor.complete(0, 10);
        assert!(cursor.begin_next().is_some());
    }

    #[test]
    fn short_page_exhausts_until_reset() {
        let mut cursor = PaginationCursor::new(PageOrder::Oldest, 10);
        cursor.begin_next();
        cursor.complete(0, 4);
        assert!(!cursor.has_more());
        assert!(cursor.begin_next().is_none());
        assert!(!cursor.has_more());

        cursor.reset();
        assert!(cursor.has_more());
        assert_eq!(cursor.begin_next().map(|r| r.page), Some(0));
    }

    #[test]
    fn failure_allows_retry_of_same_page() {
        let mut cursor = PaginationCursor::new(PageOrder::Oldest, 5);
        cursor.begin_next();
        cursor.complete(0, 5);
        let request = cursor.begin_next().unwrap();
        cursor.fail();
        assert_eq!(cursor.cursor(), Some(0));
        assert_eq!(cursor.begin_next(), Some(request));
    }

    #[test]
    fn stale_completion_never_moves_backwards() {
        let mut cursor = PaginationCursor::new(PageOrder::Oldest, 5);
        cursor.begin_next();
        cursor.complete(0, 5);
        cursor.begin_next();
        cursor.complete(1, 5);
        cursor.complete(0, 5);
        assert_eq!(cursor.cursor(), Some(1));
    }

    #[test]
    fn newest_pages_walk_back_from_total() {
        let mut cursor = PaginationCursor::new(PageOrder::Newest, 10);
        cursor.set_total(25);

        let first = cursor.begin_next().unwrap();
        assert_eq!((first.start, first.count), (15, 10));
        cursor.complete(0, 10);

        let second = cursor.begin_next().unwrap();
        assert_eq!((second.start, second.count), (5, 10));
        cursor.complete(1, 10);

        let third = cursor.begin_next().unwrap();
        assert_eq!((third.start, third.count), (0, 5));
        cursor.complete(2, 5);
        assert!(!cursor.has_more());
    }

    #[test]
    fn newest_window_ending_exactly_at_zero_stops() {
        let mut cursor = PaginationCursor::new(PageOrder::Newest, 10);
        cursor.set_total(20);
        cursor.begin_next();
        cursor.complete(0, 10);
        cursor.begin_next();
        cursor.complete(1, 10);
        assert!(cursor.has_more());
        let last = cursor.begin_next().unwrap();
        assert_eq!(last.count, 0);
        cursor.complete(2, 0);
        assert!(!cursor.has_more());
    }

    #[test]
    fn order_keys() {
        assert_eq!(PageOrder::from_key("Latest"), Some(PageOrder::Newest));
        assert_eq!(PageOrder::from_key("oldest"), Some(PageOrder::Oldest));
        assert_eq!(PageOrder::from_key("hot"), None);
    }
}
