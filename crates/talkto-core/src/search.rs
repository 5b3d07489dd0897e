use crate::error::CoreError;
use crate::membership::ensure_participant;
use talkto_db::messages::SearchRow;
use talkto_db::DbPool;
use talkto_models::api::{SearchHit, SearchResponse};
use talkto_util::pagination::{split_page, SEARCH_PAGE_SIZE};
use talkto_util::validation::search_terms;

/// Term search within one room, ranked by matched terms then recency.
///
/// The cursor is `rank:createdAtMs:id` of the last hit of the previous page,
/// so pages stay contiguous across rank boundaries.
pub async fn search_room(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
    query: &str,
    cursor: Option<&str>,
) -> Result<SearchResponse, CoreError> {
    let terms = search_terms(query)?;
    ensure_participant(pool, room_id, user_id).await?;

    let after = cursor.map(parse_cursor).transpose()?;

    let rows = talkto_db::messages::search_messages(
        pool,
        room_id,
        &terms,
        after,
        (SEARCH_PAGE_SIZE + 1) as i64,
    )
    .await?;
    let page = split_page(rows, SEARCH_PAGE_SIZE);

    let next_cursor = if page.has_more {
        page.items.last().map(format_cursor)
    } else {
        None
    };

    let results = page
        .items
        .into_iter()
        .map(|row| {
            let rank = row.rank as f64;
            let msg = row.message.into_message();
            SearchHit {
                id: msg.id,
                content: msg.content,
                created_at: msg.created_at,
                is_edited: msg.is_edited,
                deleted_at: msg.deleted_at,
                author: msg.author,
                rank,
            }
        })
        .collect();

    Ok(SearchResponse {
        results,
        next_cursor,
    })
}

fn format_cursor(row: &SearchRow) -> String {
    format!("{}:{}:{}", row.rank, row.message.created_at_ms, row.message.id)
}

fn parse_cursor(raw: &str) -> Result<(i64, i64, i64), CoreError> {
    let mut parts = raw.trim().splitn(3, ':').map(str::parse::<i64>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(rank)), Some(Ok(created_at_ms)), Some(Ok(id))) => Ok((rank, created_at_ms, id)),
        _ => Err(CoreError::InvalidCursor),
    }
}
