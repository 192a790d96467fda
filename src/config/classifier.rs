// src/config/classifier.rs
use anyhow::{bail, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::{env_parse, env_string};

pub const ENV_BACKEND: &str = "CLASSIFIER_BACKEND";
pub const ENV_MODEL: &str = "CLASSIFIER_MODEL";
pub const ENV_ENDPOINT: &str = "CLASSIFIER_ENDPOINT";
pub const ENV_DELAY_MS: &str = "CLASSIFIER_DELAY_MS";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";

/// Rate-limit floor between remote calls.
pub const MIN_CALL_DELAY: Duration = Duration::from_millis(1_000);
/// Texts shorter than this are neutral without consulting any backend.
pub const MIN_TEXT_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Lexicon,
    OpenAi,
    Gemini,
}

impl BackendKind {
    pub fn is_remote(&self) -> bool {
        !matches!(self, BackendKind::Lexicon)
    }

    fn key_env(&self) -> Option<&'static str> {
        match self {
            BackendKind::Lexicon => None,
            BackendKind::OpenAi => Some(ENV_OPENAI_KEY),
            BackendKind::Gemini => Some(ENV_GEMINI_KEY),
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexicon" | "textblob" => Ok(BackendKind::Lexicon),
            "openai" => Ok(BackendKind::OpenAi),
            "gemini" => Ok(BackendKind::Gemini),
            other => bail!("unsupported classifier backend: {other}"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Lexicon => "lexicon",
            BackendKind::OpenAi => "openai",
            BackendKind::Gemini => "gemini",
        })
    }
}

#[derive(Clone)]
pub struct ClassifierConfig {
    pub backend: BackendKind,
    /// Provider model override; each provider has its own default.
    pub model: Option<String>,
    /// Base URL override (proxies, local stubs).
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub call_delay: Duration,
    pub min_text_len: usize,
    pub request_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Lexicon,
            model: None,
            endpoint: None,
            api_key: None,
            call_delay: MIN_CALL_DELAY,
            min_text_len: MIN_TEXT_LEN,
            request_timeout: Duration::from_secs(20),
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("key_len", &self.api_key.as_ref().map(String::len))
            .field("call_delay", &self.call_delay)
            .field("min_text_len", &self.min_text_len)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct FileClassifierConfig {
    backend: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

impl ClassifierConfig {
    pub(super) fn merge_file(&mut self, file: FileClassifierConfig) -> Result<()> {
        if let Some(b) = file.backend {
            self.backend = b.parse()?;
        }
        if file.model.is_some() {
            self.model = file.model;
        }
        if file.endpoint.is_some() {
            self.endpoint = file.endpoint;
        }
        if let Some(ms) = file.delay_ms {
            self.call_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = file.timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    pub(super) fn merge_env(&mut self) {
        if let Some(raw) = env_string(ENV_BACKEND) {
            match raw.parse() {
                Ok(b) => self.backend = b,
                Err(e) => tracing::warn!(error = %e, "ignoring {ENV_BACKEND}"),
            }
        }
        if let Some(m) = env_string(ENV_MODEL) {
            self.model = Some(m);
        }
        if let Some(e) = env_string(ENV_ENDPOINT) {
            self.endpoint = Some(e);
        }
        if let Some(ms) = env_parse::<u64>(ENV_DELAY_MS) {
            self.call_delay = Duration::from_millis(ms);
        }
        self.resolve_api_key();
    }

    /// Pick the credential matching the selected backend from the environment.
    pub fn resolve_api_key(&mut self) {
        if let Some(var) = self.backend.key_env() {
            if let Some(key) = env_string(var) {
                self.api_key = Some(key);
            }
        }
    }

    pub(super) fn sanitize(&mut self) {
        if self.call_delay < MIN_CALL_DELAY {
            tracing::warn!(
                requested_ms = self.call_delay.as_millis() as u64,
                "classifier delay below rate-limit floor, using 1000ms"
            );
            self.call_delay = MIN_CALL_DELAY;
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = Duration::from_secs(20);
        }
    }
}
