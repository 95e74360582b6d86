//! Wire-level messages for the Gemini Live (`BidiGenerateContent`) stream,
//! plus the [`SessionEvent`] boundary type the session manager consumes.

use crate::audio::EncodedChunk;

// Outgoing messages

/// Every message the client writes to the stream. Serialized untagged so the
/// wire sees a single top-level key (`setup` or `realtimeInput`).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Setup(SetupRequest),
    RealtimeInput(RealtimeInputRequest),
}

impl ClientMessage {
    pub fn setup(model: &str, voice: &str, persona: &str) -> Self {
        ClientMessage::Setup(SetupRequest {
            setup: Setup {
                model: format!("models/{model}"),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: voice.to_string(),
                            },
                        },
                    },
                },
                system_instruction: Some(Content {
                    parts: vec![TextPart {
                        text: persona.to_string(),
                    }],
                }),
            },
        })
    }

    pub fn realtime_input(chunk: EncodedChunk) -> Self {
        ClientMessage::RealtimeInput(RealtimeInputRequest {
            realtime_input: RealtimeInput {
                media_chunks: vec![chunk],
            },
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SetupRequest {
    pub setup: Setup,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputRequest {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<EncodedChunk>,
}

// Incoming messages

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub interrupted: Option<bool>,
    pub turn_complete: Option<bool>,
}

impl ServerContent {
    /// First inline audio payload carried by the model turn, if any.
    pub fn inline_audio(&self) -> Option<&str> {
        self.model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|part| part.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ModelTurn {
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<ServerBlob>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlob {
    pub mime_type: String,
    pub data: String,
}

/// What a live session reports upward, mirroring the transport's
/// message/error/close callbacks. The session manager translates these into
/// UI notifications.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Message(ServerMessage),
    TransportError(String),
    Closed { reason: String },
}
