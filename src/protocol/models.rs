use base64::Engine as _;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

/// Sample rate of outbound microphone audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of inbound model audio.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// MIME type of outbound microphone chunks.
pub const AUDIO_INPUT_MIME: &str = "audio/pcm;rate=16000";

/// MIME type of outbound camera/screen frames.
pub const IMAGE_MIME: &str = "image/jpeg";

/// Free-form JSON payloads the wire format leaves open-ended (function
/// arguments, function results, tool declarations).
pub type ArbitraryJson = Value;

/// Negotiated configuration sent in the `setup` message, once per connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ArbitraryJson>>,
}

impl LiveConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            generation_config: None,
            system_instruction: None,
            tools: None,
        }
    }

    #[must_use]
    pub fn response_modality(mut self, modality: ResponseModality) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .response_modalities = modality;
        self
    }

    #[must_use]
    pub fn voice(mut self, voice_name: impl Into<String>) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .speech_config = Some(SpeechConfig::prebuilt(voice_name));
        self
    }

    #[must_use]
    pub fn system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(SystemInstruction {
            parts: vec![Part::text(text)],
        });
        self
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: ResponseModality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseModality {
    #[default]
    Audio,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

impl SpeechConfig {
    #[must_use]
    pub fn prebuilt(voice_name: impl Into<String>) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.into(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

/// One model turn (or one user turn in `clientContent`): an ordered sequence
/// of parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

/// A single turn part. Exactly one of the fields is normally set; the wire
/// format leaves the others absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Whether this part carries inline PCM audio from the model.
    #[must_use]
    pub fn is_audio(&self) -> bool {
        self.inline_data
            .as_ref()
            .is_some_and(|blob| blob.mime_type.starts_with("audio/pcm"))
    }
}

/// Base64-encoded media embedded in a turn part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: ArbitraryJson,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: ArbitraryJson,
}

/// One outbound media payload for `realtimeInput`.
///
/// The MIME type decides the channel on the service side: PCM chunks feed
/// the audio stream, JPEG frames the video/screen stream. The `interrupt`
/// flag asks the service to treat the chunk as preempting any in-flight
/// model turn; it is only set by the capture pipeline while the model is
/// executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<bool>,
}

impl MediaChunk {
    /// Wrap raw little-endian PCM16 bytes as a 16 kHz audio chunk.
    #[must_use]
    pub fn audio(pcm_bytes: &[u8]) -> Self {
        Self {
            mime_type: AUDIO_INPUT_MIME.to_string(),
            data: general_purpose::STANDARD.encode(pcm_bytes),
            interrupt: None,
        }
    }

    /// Wrap an already-encoded JPEG frame.
    #[must_use]
    pub fn jpeg(jpeg_bytes: &[u8]) -> Self {
        Self {
            mime_type: IMAGE_MIME.to_string(),
            data: general_purpose::STANDARD.encode(jpeg_bytes),
            interrupt: None,
        }
    }

    /// Mark the chunk as preempting the current model turn.
    #[must_use]
    pub const fn with_interrupt(mut self) -> Self {
        self.interrupt = Some(true);
        self
    }

    #[must_use]
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/pcm")
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}
