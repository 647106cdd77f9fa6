//! Pagination arithmetic

use serde::Serialize;

/// Skip/limit coordinates derived from `page` and `length`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(skip: u64, limit: u64) -> Self {
        Self { skip, limit }
    }
}

/// Pagination metadata returned alongside a page of data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult {
    /// Total number of items matching the filter
    pub total_items: u64,

    /// `ceil(total_items / page_size)`
    pub total_pages: u64,

    /// Current page number (starts at 1)
    pub current_page: u64,

    /// Number of items per page
    pub page_size: u64,
}

/// Turn `page` / `length` strings into skip/limit.
///
/// `skip = (page - 1) * length`, `limit = length`. Missing, unparseable or
/// zero values fall back to page 1 and `default_length`.
pub fn pagination_request(page: Option<&str>, length: Option<&str>, default_length: u64) -> PageRequest {
    let page = parse_positive(page).unwrap_or(1);
    let limit = parse_positive(length).unwrap_or(default_length.max(1));

    PageRequest {
        skip: (page - 1).saturating_mul(limit),
        limit,
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).filter(|n| *n > 0)
}

/// Compute pagination metadata for `total_items` matches.
pub fn pagination_result(total_items: u64, request: &PageRequest) -> PaginationResult {
    let (total_pages, current_page) = match request.limit {
        0 => (0, 1),
        limit => (total_items.div_ceil(limit), request.skip / limit + 1),
    };

    PaginationResult {
        total_items,
        total_pages,
        current_page,
        page_size: request.limit,
    }
}
