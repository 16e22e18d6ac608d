// Wire messages exchanged with the live agent service
//
// The contract is JSON over one bidirectional socket: outbound realtime
// media frames and control text, inbound server content carrying base64
// PCM parts and the interruption flag.

use serde::{Deserialize, Serialize};

use crate::audio::codec::WireFrame;

/// Connect-time session configuration sent before any media flows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub system_instruction: String,
    pub response_modalities: Vec<String>,
    pub voice_name: String,
}

/// One outbound media blob: base64 PCM plus its mime tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    pub mime_type: String,
}

impl From<WireFrame> for MediaBlob {
    fn from(frame: WireFrame) -> Self {
        Self {
            data: frame.data,
            mime_type: frame.mime_type,
        }
    }
}

/// Everything the client sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Connect-time configuration
    Setup { setup: SessionSetup },
    /// One captured audio frame
    Realtime { media: MediaBlob },
    /// Plain text instruction (the connection-open kickstart)
    Text { text: String },
}

/// Everything the server sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ServerMessage {
    /// Base64 audio payloads carried by this message, in part order.
    pub fn audio_parts(&self) -> Vec<&str> {
        self.server_content
            .iter()
            .flat_map(|c| c.model_turn.iter())
            .flat_map(|t| t.parts.iter())
            .filter_map(|p| p.inline_data.as_ref())
            .map(|b| b.data.as_str())
            .collect()
    }

    /// Text payloads carried by this message, in part order.
    pub fn text_parts(&self) -> Vec<&str> {
        self.server_content
            .iter()
            .flat_map(|c| c.model_turn.iter())
            .flat_map(|t| t.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.interrupted)
            .unwrap_or(false)
    }

    /// Convenience constructor for tests and fakes: one audio part.
    pub fn with_audio(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![Part {
                        inline_data: Some(MediaBlob {
                            data: data.into(),
                            mime_type: mime_type.into(),
                        }),
                        text: None,
                    }],
                }),
                interrupted: None,
                turn_complete: None,
            }),
        }
    }

    /// Convenience constructor: the barge-in signal.
    pub fn interrupted() -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: None,
                interrupted: Some(true),
                turn_complete: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_frame_wire_shape() {
        let msg = ClientMessage::Realtime {
            media: MediaBlob {
                data: "QUJD".to_string(),
                mime_type: "audio/pcm;rate=16000".to_string(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["media"]["data"], "QUJD");
        assert_eq!(json["media"]["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn server_message_extracts_audio_and_interruption() {
        let json = r#"{
            "serverContent": {
                "modelTurn": { "parts": [ { "inlineData": { "data": "AAAA", "mimeType": "audio/pcm;rate=24000" } } ] },
                "interrupted": true
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.audio_parts(), vec!["AAAA"]);
        assert!(msg.is_interrupted());
    }

    #[test]
    fn empty_server_message_is_benign() {
        let msg: ServerMessage = serde_json::from_str("{}").unwrap();
        assert!(msg.audio_parts().is_empty());
        assert!(!msg.is_interrupted());
    }
}
