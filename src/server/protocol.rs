//! Wire shapes of the gesture-control WebSocket.

use serde::{Deserialize, Serialize};

use crate::landmarks::LandmarkSet;
use crate::session::GestureEvent;

/// Raw reply to a bare `ping` text frame.
pub const PONG: &str = "pong";

/// Server -> client messages, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Gesture(GestureEvent),
    Heartbeat,
    Stats { fps: f64, total_frames: u64 },
    Warning { message: String },
    Pong,
}

impl Outbound {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Landmarks computed by a client-side hand tracker.
#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkFrame {
    pub points: LandmarkSet,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tagged {
    Hello {
        #[serde(default)]
        client: Option<String>,
    },
    Landmarks(LandmarkFrame),
    Ping,
    Heartbeat,
}

/// Client text messages.
#[derive(Debug, Clone)]
pub enum ClientText {
    /// Bare `ping`; answered with [`PONG`].
    Ping,
    /// `{"type": "ping"}`; answered with [`Outbound::Pong`].
    JsonPing,
    Hello { client: Option<String> },
    Landmarks(Box<LandmarkFrame>),
    Heartbeat,
    Unknown(String),
}

pub fn parse_text(text: &str) -> ClientText {
    if text.trim() == "ping" {
        return ClientText::Ping;
    }
    match serde_json::from_str::<Tagged>(text) {
        Ok(Tagged::Hello { client }) => ClientText::Hello { client },
        Ok(Tagged::Landmarks(f)) => ClientText::Landmarks(Box::new(f)),
        Ok(Tagged::Ping) => ClientText::JsonPing,
        Ok(Tagged::Heartbeat) => ClientText::Heartbeat,
        Err(e) => ClientText::Unknown(e.to_string()),
    }
}
