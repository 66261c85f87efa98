//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use folio_upstream::{Provider, UpstreamSettings};
use thiserror::Error;

use crate::prompt::DEFAULT_SYSTEM_PROMPT;

/// Problems found while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot read system prompt file {path}: {source}")]
    PromptFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Browser origins allowed to call the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// `CORS_ORIGIN=*`
    Any,
    List(Vec<HeaderValue>),
}

impl AllowedOrigins {
    /// Parse a comma-separated `CORS_ORIGIN` value. `*` must stand alone.
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            var: "CORS_ORIGIN",
            value: raw.to_owned(),
            reason,
        };

        let entries: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        if entries.is_empty() {
            return Err(invalid("no origins listed".into()));
        }
        if entries.contains(&"*") {
            if entries.len() > 1 {
                return Err(invalid("`*` cannot be combined with other origins".into()));
            }
            return Ok(AllowedOrigins::Any);
        }

        entries
            .into_iter()
            .map(|origin| {
                if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                    return Err(invalid(format!("{origin:?} is not an http(s) origin")));
                }
                HeaderValue::from_str(origin)
                    .map_err(|_| invalid(format!("{origin:?} is not a valid header value")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AllowedOrigins::List)
    }
}

/// Runtime configuration for folio-server.
///
/// Resolved once in `main`, then shared read-only through
/// [`AppState`](crate::state::AppState).
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`, port from `PORT`).
    pub bind_address: String,

    /// Provider, credentials and sampling for the upstream model.
    pub upstream: UpstreamSettings,

    /// Longest wait for the next upstream fragment before the stream is
    /// failed.
    pub idle_timeout: Duration,

    /// Allowed CORS origins (`CORS_ORIGIN`, comma-separated, `*` for any).
    pub cors_origins: AllowedOrigins,

    /// Directory holding the built SPA. Served only when it exists.
    pub static_dir: PathBuf,

    /// System instruction template; `{current_month_year}` is substituted
    /// per request.
    pub system_prompt_template: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    /// Build [`Config`] from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let provider: Provider = env.parse_or("FOLIO_PROVIDER", Provider::Groq)?;

        let api_key = env.required(provider.api_key_var())?;
        let base_url = match provider.default_base_url() {
            Some(default) => env.or(provider.base_url_var(), default),
            None => env.required(provider.base_url_var())?,
        };

        let mut upstream = UpstreamSettings::preset(provider, base_url, api_key);
        if let Some(model) = env.get("FOLIO_MODEL") {
            upstream.model = model;
        }
        if let Some(temperature) = env.parse_opt::<f32>("FOLIO_TEMPERATURE")? {
            upstream.temperature = Some(temperature);
        }
        if let Some(max_tokens) = env.parse_opt::<u32>("FOLIO_MAX_TOKENS")? {
            upstream.max_tokens = Some(max_tokens);
        }
        upstream.connect_timeout =
            Duration::from_secs(env.parse_or("FOLIO_UPSTREAM_CONNECT_TIMEOUT_SECS", 10u64)?);

        let idle_secs: u64 = env.parse_or("FOLIO_UPSTREAM_IDLE_TIMEOUT_SECS", 60)?;
        if idle_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "FOLIO_UPSTREAM_IDLE_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        let bind_address = match env.get("FOLIO_BIND") {
            Some(bind) => bind,
            None => format!("0.0.0.0:{}", env.parse_or::<u16>("PORT", 3000)?),
        };

        let system_prompt_template = match env.get("FOLIO_SYSTEM_PROMPT_FILE") {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::PromptFile { path, source })?
            }
            None => DEFAULT_SYSTEM_PROMPT.to_owned(),
        };

        let cors_origins = AllowedOrigins::parse(&env.or("CORS_ORIGIN", "http://localhost:5173"))?;

        Ok(Self {
            bind_address,
            upstream,
            idle_timeout: Duration::from_secs(idle_secs),
            cors_origins,
            static_dir: PathBuf::from(env.or("FOLIO_STATIC_DIR", "./frontend/dist")),
            system_prompt_template,
            log_level: env.or("FOLIO_LOG", "info"),
            log_json: env
                .get("FOLIO_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and empty are the same thing.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_opt<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Invalid {
                    var: key,
                    reason: e.to_string(),
                    value,
                }),
        }
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for handler tests; no environment involved.
    pub fn for_tests() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            upstream: UpstreamSettings::preset(Provider::Groq, "http://127.0.0.1:9", "test"),
            idle_timeout: Duration::from_secs(5),
            cors_origins: AllowedOrigins::List(vec![HeaderValue::from_static(
                "http://localhost:5173",
            )]),
            static_dir: PathBuf::from("/nonexistent/folio-static"),
            system_prompt_template: "You answer questions. Today is {current_month_year}.".into(),
            log_level: "debug".into(),
            log_json: false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn groq_defaults_need_only_a_key() {
        let cfg = Config::from_lookup(lookup(&[("GROQ_API_KEY", "gk")])).unwrap();
        assert_eq!(cfg.upstream.provider, Provider::Groq);
        assert_eq!(cfg.upstream.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert_eq!(
            cfg.cors_origins,
            AllowedOrigins::List(vec![HeaderValue::from_static("http://localhost:5173")])
        );
        assert_eq!(cfg.idle_timeout, Duration::from_secs(60));
        assert!(cfg.system_prompt_template.contains("{current_month_year}"));
    }

    #[test]
    fn missing_key_fails_fast() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GROQ_API_KEY")));
    }

    #[test]
    fn kluster_requires_base_url() {
        let err = Config::from_lookup(lookup(&[
            ("FOLIO_PROVIDER", "kluster"),
            ("KLUSTER_API_KEY", "kk"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KLUSTER_API_BASE_URL")));

        let cfg = Config::from_lookup(lookup(&[
            ("FOLIO_PROVIDER", "kluster"),
            ("KLUSTER_API_KEY", "kk"),
            ("KLUSTER_API_BASE_URL", "https://api.kluster.ai/v1"),
        ]))
        .unwrap();
        assert_eq!(cfg.upstream.temperature, Some(0.7));
        assert_eq!(cfg.upstream.max_tokens, Some(1000));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let err = Config::from_lookup(lookup(&[("GROQ_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn overrides_and_port() {
        let cfg = Config::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gk"),
            ("PORT", "8080"),
            ("FOLIO_MODEL", "llama-3.3-70b-versatile"),
            ("FOLIO_TEMPERATURE", "0.2"),
            ("CORS_ORIGIN", "https://a.dev, https://b.dev"),
            ("FOLIO_LOG_JSON", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_address, "0.0.0.0:8080");
        assert_eq!(cfg.upstream.model, "llama-3.3-70b-versatile");
        assert_eq!(cfg.upstream.temperature, Some(0.2));
        assert_eq!(
            cfg.cors_origins,
            AllowedOrigins::List(vec![
                HeaderValue::from_static("https://a.dev"),
                HeaderValue::from_static("https://b.dev"),
            ])
        );
        assert!(cfg.log_json);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err =
            Config::from_lookup(lookup(&[("GROQ_API_KEY", "gk"), ("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));

        let err = Config::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gk"),
            ("FOLIO_UPSTREAM_IDLE_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn cors_wildcard_must_stand_alone() {
        let cfg =
            Config::from_lookup(lookup(&[("GROQ_API_KEY", "gk"), ("CORS_ORIGIN", " * ")])).unwrap();
        assert_eq!(cfg.cors_origins, AllowedOrigins::Any);

        let err = Config::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gk"),
            ("CORS_ORIGIN", "*, https://a.dev"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CORS_ORIGIN", .. }));
    }

    #[test]
    fn unparseable_cors_origins_fail_instead_of_allowing_any() {
        for value in ["localhost:5173", "https://a.dev\u{7f}", ",,", "https://a.dev, ftp://b.dev"] {
            let err = Config::from_lookup(lookup(&[("GROQ_API_KEY", "gk"), ("CORS_ORIGIN", value)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var: "CORS_ORIGIN", .. }),
                "{value:?} gave {err}"
            );
        }
    }

    #[test]
    fn unknown_provider_is_invalid() {
        let err = Config::from_lookup(lookup(&[("FOLIO_PROVIDER", "openai")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "FOLIO_PROVIDER", .. }));
    }
}
