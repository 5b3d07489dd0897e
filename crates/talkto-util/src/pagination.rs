use serde::Deserialize;

/// History page size. Queries fetch one extra row to learn whether more exist.
pub const PAGE_SIZE: usize = 40;
/// Messages on each side of a jump anchor.
pub const WINDOW: usize = 12;
pub const SEARCH_PAGE_SIZE: usize = 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub room_id: String,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumpParams {
    pub room_id: String,
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub room_id: String,
    pub q: String,
    pub cursor: Option<String>,
}

/// A page cut from a `limit + 1` fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Drops the lookahead row of a `limit + 1` fetch. Order of `rows` is preserved.
pub fn split_page<T>(mut rows: Vec<T>, limit: usize) -> Page<T> {
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    Page {
        items: rows,
        has_more,
    }
}
