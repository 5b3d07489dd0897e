mod handler;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use talkto_core::AppState;

pub use session::Session;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayParams {
    pub room_id: String,
    pub token: String,
}

/// Opens one push connection for one room. Browsers cannot set headers on a
/// websocket handshake, so the bearer token travels as a query parameter.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
) -> Response {
    let claims = match talkto_core::auth::validate_token(&params.token, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(_) => return (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response(),
    };
    let Ok(room_id) = talkto_core::parse_id(&params.room_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid room id").into_response();
    };

    match talkto_db::read_states::is_participant(&state.db, room_id, claims.sub).await {
        Ok(true) => {}
        Ok(false) => return (StatusCode::FORBIDDEN, "Not a participant").into_response(),
        Err(err) => {
            tracing::error!(room_id, "gateway membership check failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let session = Session::new(claims.sub, room_id);
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, session))
}
