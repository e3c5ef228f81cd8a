use std::collections::HashMap;

use anyhow::{bail, Result};

/// Application configuration.
/// Credentials and settings come from the process environment first, then `.env`.
#[derive(Debug, Clone)]
pub struct Config {
    // Credentials
    pub gemini_api_key: String,
    pub law_api_key: String,

    // LLM
    pub gemini_model: String,
    pub gemini_endpoint: String,
    /// 0 = no client-side timeout.
    pub llm_timeout_s: u64,

    // Legal data API
    pub law_api_base: String,
    pub law_api_timeout_s: u64,
    /// Accept self-signed / intercepted certificates on the legal data API.
    pub law_api_accept_invalid_certs: bool,

    // Pacing
    pub retrieval_delay_ms: u64,
    pub synthesis_delay_ms: u64,

    // Web
    pub web_bind: String,
    pub web_port: u16,
}

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_LAW_API_BASE: &str = "https://www.law.go.kr/DRF/lawSearch.do";

fn parse_dotenv_str(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn parse_dotenv() -> HashMap<String, String> {
    std::fs::read_to_string(".env")
        .map(|contents| parse_dotenv_str(&contents))
        .unwrap_or_default()
}

/// Key lookup over the process environment with a dotenv fallback.
struct Source<'a> {
    env: &'a dyn Fn(&str) -> Option<String>,
    dotenv: HashMap<String, String>,
}

impl Source<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.env)(key).or_else(|| self.dotenv.get(key).cloned())
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).as_deref() {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(_) => default,
            None => default,
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_u16(&self, key: &str, default: u16) -> u16 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        Self::from_source(&Source {
            env: &env,
            dotenv: parse_dotenv(),
        })
    }

    /// Build from an explicit key/value map (dotenv syntax), ignoring the process env.
    pub fn from_dotenv_str(contents: &str) -> Result<Self> {
        let env = |_: &str| -> Option<String> { None };
        Self::from_source(&Source {
            env: &env,
            dotenv: parse_dotenv_str(contents),
        })
    }

    fn from_source(src: &Source<'_>) -> Result<Self> {
        let gemini_api_key = src.get_str("GEMINI_API_KEY", "");
        let law_api_key = src.get_str("LAW_API_KEY", "");
        if gemini_api_key.is_empty() {
            bail!("GEMINI_API_KEY is not set");
        }
        if law_api_key.is_empty() {
            bail!("LAW_API_KEY is not set");
        }

        Ok(Config {
            gemini_api_key,
            law_api_key,
            gemini_model: src.get_str("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            gemini_endpoint: src.get_str("GEMINI_ENDPOINT", DEFAULT_GEMINI_ENDPOINT),
            llm_timeout_s: src.get_u64("LLM_TIMEOUT_S", 0),
            law_api_base: src.get_str("LAW_API_BASE", DEFAULT_LAW_API_BASE),
            law_api_timeout_s: src.get_u64("LAW_API_TIMEOUT_S", 15),
            law_api_accept_invalid_certs: src.get_bool("LAW_API_ACCEPT_INVALID_CERTS", true),
            retrieval_delay_ms: src.get_u64("RETRIEVAL_DELAY_MS", 3000),
            synthesis_delay_ms: src.get_u64("SYNTHESIS_DELAY_MS", 1500),
            web_bind: src.get_str("WEB_BIND", "127.0.0.1"),
            web_port: src.get_u16("WEB_PORT", 3131),
        })
    }

    /// Pacing policy built from the configured delays (never below 1.5 s).
    pub fn pacer(&self) -> crate::pacing::FixedPacer {
        crate::pacing::FixedPacer::from_millis(self.retrieval_delay_ms, self.synthesis_delay_ms)
    }
}
