//! Page window arithmetic for list endpoints.
//!
//! `page` and `limit` arrive as raw query text. Leading digits are read in
//! base 10 (`"10px"` is 10); anything without them, or zero, falls back to
//! page 1 and limit 10. There is no upper bound on `limit` here.
use serde::Serialize;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
}

impl PageWindow {
    pub fn from_params(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = parse_positive(page).unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive(limit).unwrap_or(DEFAULT_LIMIT);

        Self {
            page,
            limit,
            skip: (page - 1).saturating_mul(limit),
        }
    }

    /// Neighbouring pages given how many records the query can reach.
    pub fn links(&self, total: u64) -> Pagination {
        let end = self.page.saturating_mul(self.limit);

        Pagination {
            next: (end < total).then(|| PageLink {
                page: self.page + 1,
                limit: self.limit,
            }),
            prev: (self.skip > 0).then(|| PageLink {
                page: self.page - 1,
                limit: self.limit,
            }),
        }
    }
}

pub fn paginate(page: Option<&str>, limit: Option<&str>, total: u64) -> (PageWindow, Pagination) {
    let window = PageWindow::from_params(page, limit);
    let links = window.links(total);

    (window, links)
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim_start();
    let digits = raw.bytes().take_while(u8::is_ascii_digit).count();

    raw[..digits].parse::<u64>().ok().filter(|n| *n > 0)
}
