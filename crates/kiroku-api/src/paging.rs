//! Bounded, rate-limited pagination shared by every tracker client.
//!
//! A [`Paginator`] drives a page request closure until the tracker reports no
//! further pages, the page or offset cap is reached, or the cancellation token
//! fires. Every page after the first waits out the page delay first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::delay::{wait, Delay, TokioDelay};
use crate::error::ApiError;

pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_PAGES: u32 = 10;
pub const DEFAULT_MAX_OFFSET: u32 = 900;

/// Position of the page being requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// 1-based page number.
    Number { page: u32, size: u32 },
    /// 0-based item offset.
    Offset { offset: u32, size: u32 },
    /// Opaque continuation token; `None` for the first page.
    After {
        page: u32,
        size: u32,
        token: Option<String>,
    },
}

impl PageCursor {
    pub fn first_page(size: u32) -> Self {
        Self::Number { page: 1, size }
    }

    pub fn first_offset(size: u32) -> Self {
        Self::Offset { offset: 0, size }
    }

    pub fn first_after(size: u32) -> Self {
        Self::After {
            page: 1,
            size,
            token: None,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Self::Number { size, .. } | Self::Offset { size, .. } | Self::After { size, .. } => {
                *size
            }
        }
    }

    fn advance(&self, token: Option<String>) -> Option<Self> {
        match self {
            Self::Number { page, size } => Some(Self::Number {
                page: page + 1,
                size: *size,
            }),
            Self::Offset { offset, size } => Some(Self::Offset {
                offset: offset + size,
                size: *size,
            }),
            Self::After { page, size, .. } => token.map(|t| Self::After {
                page: page + 1,
                size: *size,
                token: Some(t),
            }),
        }
    }
}

/// One page of results as reported by a tracker.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_next: bool) -> Self {
        Self {
            items,
            has_next,
            next_token: None,
        }
    }

    /// Cursor-based page; there is a next page iff a token was returned.
    pub fn with_token(items: Vec<T>, next_token: Option<String>) -> Self {
        Self {
            items,
            has_next: next_token.is_some(),
            next_token,
        }
    }
}

/// Drives paginated tracker requests under a page cap and inter-page delay.
#[derive(Clone)]
pub struct Paginator {
    delay: Arc<dyn Delay>,
    cancel: CancellationToken,
    page_delay: Duration,
    max_pages: u32,
    max_offset: u32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(TokioDelay::shared(), CancellationToken::new())
    }
}

impl Paginator {
    pub fn new(delay: Arc<dyn Delay>, cancel: CancellationToken) -> Self {
        Self {
            delay,
            cancel,
            page_delay: DEFAULT_PAGE_DELAY,
            max_pages: DEFAULT_MAX_PAGES,
            max_offset: DEFAULT_MAX_OFFSET,
        }
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn with_limits(mut self, max_pages: u32, max_offset: u32) -> Self {
        self.max_pages = max_pages;
        self.max_offset = max_offset;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn allows(&self, next: &PageCursor, fetched: u32) -> bool {
        if fetched >= self.max_pages {
            return false;
        }
        match next {
            PageCursor::Offset { offset, .. } => *offset < self.max_offset,
            _ => true,
        }
    }

    /// Lazily request pages, yielding each page's items in discovery order.
    ///
    /// The stream ends after the first failed page.
    pub fn pages<'a, T, F, Fut>(
        &'a self,
        first: PageCursor,
        request: F,
    ) -> impl Stream<Item = Result<Vec<T>, ApiError>> + Send + 'a
    where
        T: Send + 'a,
        F: FnMut(PageCursor) -> Fut + Send + 'a,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'a,
    {
        stream::unfold(
            (request, Some(first), 0u32),
            move |(mut request, next, fetched)| async move {
                let cursor = next?;

                if fetched > 0 {
                    if wait(self.delay.as_ref(), self.page_delay, &self.cancel)
                        .await
                        .is_err()
                    {
                        tracing::debug!(fetched, "pagination cancelled");
                        return None;
                    }
                } else if self.cancel.is_cancelled() {
                    return None;
                }

                match request(cursor.clone()).await {
                    Ok(page) => {
                        let fetched = fetched + 1;
                        let mut next = if page.has_next {
                            cursor.advance(page.next_token)
                        } else {
                            None
                        };
                        if next.as_ref().is_some_and(|c| !self.allows(c, fetched)) {
                            tracing::debug!(fetched, "page cap reached, stopping");
                            next = None;
                        }
                        Some((Ok(page.items), (request, next, fetched)))
                    }
                    Err(e) => Some((Err(e), (request, None, fetched + 1))),
                }
            },
        )
    }

    /// Collect every page into one list.
    ///
    /// A failing first page is returned as `Err`; a failure on any later page
    /// keeps what was already collected.
    pub async fn fetch_all<T, F, Fut>(&self, first: PageCursor, request: F) -> Result<Vec<T>, ApiError>
    where
        T: Send,
        F: FnMut(PageCursor) -> Fut + Send,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send,
    {
        let mut pages = std::pin::pin!(self.pages(first, request));
        let mut items = Vec::new();
        let mut index = 0u32;

        while let Some(page) = pages.next().await {
            index += 1;
            match page {
                Ok(mut batch) => items.append(&mut batch),
                Err(e) if index == 1 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        page = index,
                        kept = items.len(),
                        error = %e,
                        "page fetch failed, keeping partial results"
                    );
                    break;
                }
            }
        }

        Ok(items)
    }
}
