//! Discussion webhook receiver.
//!
//! Deliveries from outside the provider's published ranges get the same
//! `200` as everything else, just with a different fixed body, and are never
//! parsed. Processing outcomes only reach the log.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use thiserror::Error;
use tracing::{debug, error, warn};

use discussmail_core::errors::{CoreError, EventError};
use discussmail_core::origin::{candidate_address, is_allowed};
use discussmail_core::{DiscussionEvent, Outcome};

use crate::AppState;

/// Header carrying the client address when behind a reverse proxy.
const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

const ACK_DELIVERED: &str = "Delivered\n";
const ACK_UNTRUSTED: &str = "No content\n";

/// What happened to a delivery. `Rejected` and `Ignored` look the same to
/// the sender apart from the acknowledgment text.
#[derive(Debug)]
pub enum HookDisposition {
    /// The origin address is not a permitted webhook source.
    Rejected,
    /// The payload is not a discussion event.
    Ignored,
    /// The composer ran; the outcome says whether mail went out.
    Processed(Outcome),
}

/// Errors that fail a single delivery.
#[derive(Debug, Error)]
pub enum HookError {
    /// The body is not JSON, or a discussion payload lacks required fields.
    #[error(transparent)]
    Payload(#[from] EventError),

    /// Rendering failed or the mail transport refused the message.
    #[error(transparent)]
    Processing(#[from] CoreError),
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        match &self {
            HookError::Payload(e) => {
                warn!(error = %e, "rejecting malformed delivery");
                (StatusCode::BAD_REQUEST, "Bad request\n").into_response()
            }
            HookError::Processing(e) => {
                error!(error = %e, "failed to process delivery");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error\n").into_response()
            }
        }
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/hook", post(receive_hook).put(receive_hook))
}

async fn receive_hook(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let forwarded_for = headers
        .get(HEADER_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok());

    match handle_delivery(&state, forwarded_for, peer.ip(), &body).await {
        Ok(HookDisposition::Rejected) => ACK_UNTRUSTED.into_response(),
        Ok(_) => ACK_DELIVERED.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Run one delivery through the origin gate, the decoder and the composer.
pub async fn handle_delivery(
    state: &AppState,
    forwarded_for: Option<&str>,
    peer: IpAddr,
    body: &[u8],
) -> Result<HookDisposition, HookError> {
    let forwarded_for = forwarded_for.filter(|_| state.trust_forwarded_for);
    let origin = candidate_address(forwarded_for, peer);
    if !is_allowed(&origin, &state.origins.snapshot()) {
        debug!(%origin, "dropping delivery from untrusted origin");
        return Ok(HookDisposition::Rejected);
    }

    let Some(event) = DiscussionEvent::from_slice(body)? else {
        debug!(%origin, "ignoring non-discussion delivery");
        return Ok(HookDisposition::Ignored);
    };

    let outcome = state.composer.process(&event).await?;
    warn!("{}", outcome);
    Ok(HookDisposition::Processed(outcome))
}
