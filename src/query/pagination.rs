//! Splitting an item range into per-request pages

use serde::Serialize;

use crate::error::Result;
use crate::request::Parameters;

/// Item range requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRange {
    /// Offset of the first item (`retstart`, default 0)
    pub start: usize,
    /// Number of items wanted (`limit`, else `retmax`); `None` means all
    pub wanted: Option<usize>,
    /// Items per request, never above the service cap
    pub page_size: usize,
    /// `retmax` given, within the cap, and no `limit`
    pub exact: bool,
}

impl ItemRange {
    /// Read `retstart`, `retmax` and `limit` from caller parameters
    pub fn from_parameters(parameters: &Parameters, cap: usize) -> Result<Self> {
        let cap = cap.max(1);
        let start = parameters.retstart()?.unwrap_or(0);
        let retmax = parameters.retmax()?;
        let limit = parameters.limit()?;

        Ok(Self {
            start,
            wanted: limit.or(retmax),
            page_size: retmax.unwrap_or(cap).min(cap).max(1),
            exact: limit.is_none() && retmax.is_some_and(|max| max <= cap),
        })
    }

    /// The single page an exact range maps to
    pub fn exact_page(&self) -> Option<Page> {
        if !self.exact {
            return None;
        }
        Some(Page {
            retstart: self.start,
            retmax: self.wanted.unwrap_or(0),
        })
    }
}

/// One request's share of an item range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub retstart: usize,
    pub retmax: usize,
}

impl Page {
    /// Offset one past the last item of the page
    pub fn end(&self) -> usize {
        self.retstart + self.retmax
    }
}

/// Pages covering `[start, min(total, start + wanted))`, `page_size` items each
///
/// The last page is shortened to the end of the range. A `start` at or beyond
/// `total` yields no pages.
pub fn plan_pages(total: usize, start: usize, wanted: Option<usize>, page_size: usize) -> Vec<Page> {
    let page_size = page_size.max(1);
    let end = match wanted {
        Some(wanted) => total.min(start.saturating_add(wanted)),
        None => total,
    };

    (start..end)
        .step_by(page_size)
        .map(|retstart| Page {
            retstart,
            retmax: page_size.min(end - retstart),
        })
        .collect()
}
