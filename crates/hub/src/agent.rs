//! The agent runner: drives a [`Conversation`] against its provider, either
//! to completion (`run_blocking`, used by the plain HTTP prompt endpoints)
//! or streaming `tool_use`/`tool_result`/`done` events out over a client
//! WebSocket (`run_streaming`), cancellable mid-turn via [`CancelToken`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use sa_domain::error::{Error, Result};
use sa_domain::tool::{ContentPart, MessageContent, ProviderResponse, StopReason};
use sa_domain::trace::TraceEvent;
use sa_protocol::ClientEvent;
use sa_sessions::SessionStore;

use crate::cancel::CancelToken;
use crate::conversation::{self, Conversation};
use crate::hub::SharedConversation;

/// `run_until_done`, for endpoints with no cancellation surface of their
/// own (`/prompt`, `/sessions/{id}/prompt`).
pub async fn run_blocking(conv: &mut Conversation, prompt: &str) -> Result<String> {
    TraceEvent::TurnStarted { session_id: None }.emit();
    let result = conv.run_until_done(prompt).await;
    if result.is_ok() {
        TraceEvent::TurnCompleted {
            session_id: None,
            stop_reason: "end_turn".into(),
        }
        .emit();
    }
    result
}

type BoxedStep<'a> = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send + 'a>>;

fn boxed_send(conv: &mut Conversation, text: String) -> BoxedStep<'_> {
    Box::pin(conv.send(text))
}

fn boxed_step(conv: &mut Conversation) -> BoxedStep<'_> {
    Box::pin(conv.step())
}

/// Race one provider call against cancellation. `send`/`step` are distinct
/// concrete future types, so both legs are boxed to a common trait object
/// before the `select!`.
async fn step_cancellable(
    conv: &mut Conversation,
    cancel: &CancelToken,
    user_text: Option<String>,
) -> Result<Option<ProviderResponse>> {
    let fut = match user_text {
        Some(text) => boxed_send(conv, text),
        None => boxed_step(conv),
    };
    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        res = fut => res.map(Some),
    }
}

/// Race tool dispatch against cancellation. Returns `false` if cancellation
/// won — the in-flight dispatches are simply abandoned; the hub's own
/// dispatch timeout reclaims their pending state, and their results (if
/// they do land) are discarded when the oneshot receiver is dropped.
async fn handle_tool_use_cancellable(
    conv: &mut Conversation,
    response: &ProviderResponse,
    cancel: &CancelToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = conv.handle_tool_use(response) => true,
    }
}

fn tool_use_events(response: &ProviderResponse) -> Vec<ClientEvent> {
    response
        .content
        .iter()
        .filter_map(|b| match b {
            ContentPart::ToolUse { name, input, .. } => Some(ClientEvent::ToolUse {
                name: name.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// The `tool_result` blocks from the last appended message — used right
/// after `handle_tool_use` to mirror what it just appended to the client.
fn tool_result_events(conv: &Conversation) -> Vec<ClientEvent> {
    let Some(last) = conv.messages.last() else {
        return Vec::new();
    };
    match &last.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult { tool_use_id, content, .. } => Some(ClientEvent::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                }),
                _ => None,
            })
            .collect(),
        MessageContent::Text(_) => Vec::new(),
    }
}

fn persist(sessions: &SessionStore, session_id: Uuid, conv: &Conversation) {
    if let Err(e) = sessions.save(session_id, conv.messages.clone()) {
        tracing::warn!(session_id = %session_id, error = %e, "failed to persist session after turn");
    }
}

type Session = (Arc<SessionStore>, Uuid);

fn finish_cancelled(
    conv: &Conversation,
    events: &UnboundedSender<ClientEvent>,
    session: Option<&Session>,
    session_id_label: Option<String>,
) {
    if let Some((sessions, id)) = session {
        persist(sessions, *id, conv);
    }
    TraceEvent::TurnCancelled { session_id: session_id_label }.emit();
    let _ = events.send(ClientEvent::Cancelled);
}

fn finish_error(events: &UnboundedSender<ClientEvent>, session_id_label: Option<String>, e: Error) {
    tracing::warn!(session_id = ?session_id_label, error = %e, "agent turn failed");
    let _ = events.send(ClientEvent::Error { content: e.to_string() });
}

/// Stream one agent turn over a client WebSocket, per the distilled spec's
/// streaming-mode algorithm: send the prompt, then loop emitting
/// `tool_use`/`tool_result` events around each dispatch round until the
/// provider stops asking for tools, then emit `done`. A cancellation at any
/// await point emits `cancelled` instead and still persists whatever
/// partial transcript exists.
pub async fn run_streaming(
    conv: SharedConversation,
    prompt: String,
    cancel: CancelToken,
    events: UnboundedSender<ClientEvent>,
    session: Option<Session>,
) {
    let session_id_label = session.as_ref().map(|(_, id)| id.to_string());
    TraceEvent::TurnStarted { session_id: session_id_label.clone() }.emit();

    let mut guard = conv.lock().await;

    let mut response = match step_cancellable(&mut guard, &cancel, Some(prompt)).await {
        Ok(Some(r)) => r,
        Ok(None) => return finish_cancelled(&guard, &events, session.as_ref(), session_id_label),
        Err(e) => return finish_error(&events, session_id_label, e),
    };

    loop {
        if response.stop_reason != StopReason::ToolUse {
            break;
        }

        for event in tool_use_events(&response) {
            let _ = events.send(event);
        }

        if !handle_tool_use_cancellable(&mut guard, &response, &cancel).await {
            return finish_cancelled(&guard, &events, session.as_ref(), session_id_label);
        }
        for event in tool_result_events(&guard) {
            let _ = events.send(event);
        }

        response = match step_cancellable(&mut guard, &cancel, None).await {
            Ok(Some(r)) => r,
            Ok(None) => return finish_cancelled(&guard, &events, session.as_ref(), session_id_label),
            Err(e) => return finish_error(&events, session_id_label, e),
        };
    }

    let content = conversation::join_text(&response);
    if let Some((sessions, id)) = &session {
        persist(sessions, *id, &guard);
    }
    TraceEvent::TurnCompleted {
        session_id: session_id_label,
        stop_reason: format!("{:?}", response.stop_reason),
    }
    .emit();
    let _ = events.send(ClientEvent::Done { content });
}
