//! Thin illustrative wrapper over [`WhiteboardClient`]. Only enough of the
//! board surface to exercise the cache-key builders and the fixed
//! invalidation rule table end to end; the full domain API is out of scope.

use crate::cache::keys;
use crate::client::WhiteboardClient;
use crate::error::Error;
use crate::types::{CacheCategory, RequestDescriptor};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub async fn get_board(
    client: &WhiteboardClient,
    board_id: &str,
    cancel: &CancellationToken,
) -> Result<Value, Error> {
    let req = RequestDescriptor::get(format!("/boards/{board_id}"))
        .cacheable(keys::board(board_id), CacheCategory::Board);
    let response = client.send(req, cancel).await?;
    decode(&response.body)
}

pub async fn list_boards(
    client: &WhiteboardClient,
    cancel: &CancellationToken,
) -> Result<Value, Error> {
    let req =
        RequestDescriptor::get("/boards").cacheable(keys::boards_all(), CacheCategory::Board);
    let response = client.send(req, cancel).await?;
    decode(&response.body)
}

/// Updates a board and applies the fixed invalidation rule (board, items,
/// tags, connectors all invalidated on any board mutation).
pub async fn update_board(
    client: &WhiteboardClient,
    board_id: &str,
    patch: Value,
    cancel: &CancellationToken,
) -> Result<Value, Error> {
    let req = RequestDescriptor::get(format!("/boards/{board_id}"))
        .method(crate::types::Method::PATCH)
        .json_body(patch);
    let response = client.send(req, cancel).await?;
    client.invalidate_board(board_id);
    decode(&response.body)
}

fn decode(body: &[u8]) -> Result<Value, Error> {
    serde_json::from_slice(body).map_err(|e| Error::Deserialization {
        reason: e.to_string(),
    })
}
