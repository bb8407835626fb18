use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use fxa_core::{
    delivery::poller::UpdateSink,
    domain::{Channel, InboundMessage, SessionId},
    formatting::{render_web_reply, to_whatsapp},
    templates::{QuickAction, Reply},
};

use crate::state::AppState;

/// Telegram expects a fast 2xx; anything else makes it retry the same update.
/// Processing failures are logged and dropped.
pub async fn telegram_webhook(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Json<Value> {
    let ack = Json(json!({ "ok": true }));

    let Some(frontend) = &state.telegram else {
        tracing::warn!("telegram update received but webhook delivery is not enabled");
        return ack;
    };

    let update: teloxide::types::Update = match serde_json::from_value(body) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!("unparseable telegram update: {e}");
            return ack;
        }
    };

    let update_id = update.id;
    if let Err(e) = frontend.process(update).await {
        tracing::error!(update_id, "telegram update dropped: {e}");
    }
    ack
}

#[derive(Debug, Deserialize)]
pub struct TwilioForm {
    #[serde(rename = "From")]
    from: Option<String>,
    #[serde(rename = "Body")]
    body: Option<String>,
    #[serde(rename = "ProfileName")]
    profile_name: Option<String>,
}

pub async fn whatsapp_webhook(State(state): State<Arc<AppState>>, Form(form): Form<TwilioForm>) -> Response {
    let templates = state.responder.templates();

    let (Some(from), Some(body)) = (
        form.from.filter(|f| !f.trim().is_empty()),
        form.body.filter(|b| !b.trim().is_empty()),
    ) else {
        tracing::warn!("whatsapp webhook missing From or Body");
        return twiml(&templates.could_not_process());
    };

    if body.chars().count() > state.max_inbound_len {
        tracing::warn!(from = %from, "whatsapp message too long");
        return twiml(&templates.too_long(state.max_inbound_len));
    }

    tracing::info!(from = %from, "whatsapp message received");
    let msg = InboundMessage::new(Channel::WhatsApp, SessionId(from), body).with_sender(form.profile_name);
    let reply = state.responder.respond(&msg).await;
    twiml(&reply)
}

fn twiml(reply: &Reply) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(&to_whatsapp(&reply.text))
    );
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub html: String,
    pub session_id: String,
    pub quick_actions: Vec<QuickAction>,
}

pub async fn web_chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let text = req.message.trim();
    if text.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "message is required" }))).into_response();
    }

    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .map(SessionId)
        .unwrap_or_else(SessionId::generate);

    let reply = if text.chars().count() > state.max_inbound_len {
        state.responder.templates().too_long(state.max_inbound_len)
    } else {
        let msg = InboundMessage::new(Channel::Web, session_id.clone(), text);
        state.responder.respond(&msg).await
    };

    Json(ChatResponse {
        html: render_web_reply(&reply.text),
        message: reply.text,
        session_id: session_id.0,
        quick_actions: reply.quick_actions,
    })
    .into_response()
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": "fxa",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.mode.as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn ping() -> &'static str {
    "pong"
}
