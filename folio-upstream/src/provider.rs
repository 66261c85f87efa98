//! Provider presets and resolved connection settings.

use std::fmt;
use std::time::Duration;

/// LLM backends the site has been wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Provider {
    /// Groq's OpenAI-compatible endpoint.
    Groq,
    /// Kluster.ai's OpenAI-compatible endpoint.
    Kluster,
}

impl Provider {
    /// Environment variable holding the API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::Kluster => "KLUSTER_API_KEY",
        }
    }

    /// Environment variable holding the base URL.
    pub fn base_url_var(self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_BASE_URL",
            Provider::Kluster => "KLUSTER_API_BASE_URL",
        }
    }

    /// Base URL used when the variable is unset. `None` means it is required.
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Provider::Groq => Some("https://api.groq.com/openai/v1"),
            Provider::Kluster => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Groq => "meta-llama/llama-4-maverick-17b-128e-instruct",
            Provider::Kluster => "klusterai/Meta-Llama-3.1-8B-Instruct-Turbo",
        }
    }

    pub fn default_temperature(self) -> Option<f32> {
        match self {
            Provider::Groq => None,
            Provider::Kluster => Some(0.7),
        }
    }

    pub fn default_max_tokens(self) -> Option<u32> {
        match self {
            Provider::Groq => None,
            Provider::Kluster => Some(1000),
        }
    }
}

/// Everything an adapter needs to reach its provider.
#[derive(Clone)]
pub struct UpstreamSettings {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub connect_timeout: Duration,
}

impl UpstreamSettings {
    /// Settings with the provider's preset model and sampling.
    pub fn preset(
        provider: Provider,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: provider.default_model().to_owned(),
            temperature: provider.default_temperature(),
            max_tokens: provider.default_max_tokens(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// Keep the key out of logs.
impl fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
