use secrecy::SecretString;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-native-audio-dialog";
pub const DEFAULT_VOICE: &str = "Enceladus";
pub const DEFAULT_PERSONA: &str = "You are a helpful assistant";

/// Identity and behavior of one live session: which model to dial, which
/// voice it answers with, and the persona instruction prepended to the
/// conversation. Immutable for the life of a session; a reset may carry a
/// fresh copy with updated values.
#[derive(Debug)]
pub struct SessionConfig {
    api_key: SecretString,
    model: String,
    voice: String,
    persona: String,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>) -> SessionConfigurator {
        SessionConfigurator {
            config: SessionConfig {
                api_key: SecretString::from(api_key.into()),
                model: DEFAULT_MODEL.to_string(),
                voice: DEFAULT_VOICE.to_string(),
                persona: DEFAULT_PERSONA.to_string(),
            },
        }
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }
}

pub struct SessionConfigurator {
    config: SessionConfig,
}

impl SessionConfigurator {
    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.config.voice = voice.to_string();
        self
    }

    pub fn with_persona(mut self, persona: &str) -> Self {
        self.config.persona = persona.to_string();
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
