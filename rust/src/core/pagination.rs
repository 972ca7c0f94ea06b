// Cursor-based backward history loading.

use super::store::{BatchSummary, MessageStore, Placement};
use crate::wire::{MessageConnection, PageRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PageKind {
    Initial,
    More,
}

impl PageKind {
    pub(crate) fn tag(self) -> &'static str {
        match self {
            PageKind::Initial => "initial",
            PageKind::More => "more",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PaginationPhase {
    Idle,
    Loading { kind: PageKind, token: u64 },
    NoMorePages,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PageFetch {
    pub token: u64,
    pub kind: PageKind,
    pub request: PageRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PageMerge {
    pub kind: PageKind,
    pub summary: BatchSummary,
    pub has_next_page: bool,
}

#[derive(Debug)]
pub(crate) struct PaginationController {
    page_size: u32,
    placement: Placement,
    phase: PaginationPhase,
    // True until a page says otherwise, so the footer offers loading before
    // the first response.
    has_next_page: bool,
    end_cursor: Option<String>,
    next_token: u64,
}

impl PaginationController {
    pub(crate) fn new(page_size: u32, placement: Placement) -> Self {
        Self {
            page_size,
            placement,
            phase: PaginationPhase::Idle,
            has_next_page: true,
            end_cursor: None,
            next_token: 1,
        }
    }

    pub(crate) fn phase(&self) -> PaginationPhase {
        self.phase
    }

    pub(crate) fn is_loading(&self) -> bool {
        matches!(self.phase, PaginationPhase::Loading { .. })
    }

    pub(crate) fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub(crate) fn end_cursor(&self) -> Option<&str> {
        self.end_cursor.as_deref()
    }

    pub(crate) fn begin_initial(&mut self) -> Option<PageFetch> {
        if self.is_loading() {
            return None;
        }
        Some(self.start(PageKind::Initial, None))
    }

    /// Single-flight: returns `None` while any fetch is outstanding, or when
    /// there is nothing further to load.
    pub(crate) fn begin_load_more(&mut self) -> Option<PageFetch> {
        if self.is_loading() || !self.has_next_page {
            return None;
        }
        let cursor = self.end_cursor.clone()?;
        Some(self.start(PageKind::More, Some(cursor)))
    }

    fn start(&mut self, kind: PageKind, after: Option<String>) -> PageFetch {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.phase = PaginationPhase::Loading { kind, token };
        PageFetch {
            token,
            kind,
            request: PageRequest {
                first: self.page_size,
                after,
            },
        }
    }

    fn take_outstanding(&mut self, token: u64) -> Option<PageKind> {
        match self.phase {
            PaginationPhase::Loading { kind, token: t } if t == token => {
                self.phase = PaginationPhase::Idle;
                Some(kind)
            }
            _ => None,
        }
    }

    /// Merges a fetched page. Returns `None` for a completion that does not
    /// belong to the outstanding request.
    pub(crate) fn complete(
        &mut self,
        token: u64,
        page: MessageConnection,
        store: &mut MessageStore,
    ) -> Option<PageMerge> {
        let kind = self.take_outstanding(token)?;
        let has_next_page = page.page_info.has_next_page;
        self.end_cursor = page.page_info.end_cursor.clone();
        self.has_next_page = has_next_page;
        let messages = page.into_messages();
        let summary = match kind {
            PageKind::Initial => store.replace_all(messages),
            PageKind::More => store.append_batch(messages, self.placement),
        };
        if !has_next_page {
            self.phase = PaginationPhase::NoMorePages;
        }
        Some(PageMerge {
            kind,
            summary,
            has_next_page,
        })
    }

    /// Failed fetch: back to idle, nothing merged, cursor and `has_next_page`
    /// untouched.
    pub(crate) fn fail(&mut self, token: u64) -> Option<PageKind> {
        self.take_outstanding(token)
    }
}
