//! Anonymous visitor identity: tracking token probing and username cleanup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::traits::TokenSource;

/// Tracking cookies probed in priority order.
pub const DEFAULT_COOKIE_KEYS: [&str; 4] = ["s_ecid", "s_vi", "s_fid", "_cs_id"];

pub const DEV_TOKEN: &str = "devcookie";
pub const DEV_TOKEN_SOURCE: &str = "dev";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub token: String,
    pub token_source: String,
}

impl Identity {
    pub fn is_resolved(&self) -> bool {
        !self.username.is_empty()
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

/// How a username is linked to a tracking token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AssociationStrategy {
    /// One link call; the backend creates the user if needed.
    #[default]
    Upsert,
    /// Look the user up, create it when missing, then link. Not atomic.
    CheckThenCreate,
}

/// First present, non-empty token among `keys`, with the key it came from.
pub fn probe_token<S: AsRef<str>>(source: &dyn TokenSource, keys: &[S]) -> Option<(String, String)> {
    keys.iter().find_map(|key| {
        let key = key.as_ref();
        source.token(key).filter(|v| !v.is_empty()).map(|v| (v, key.to_string()))
    })
}

/// Usernames are stored trimmed and lower-case.
pub fn clean_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Cookies parsed from a `Cookie:` header value (`a=1; b=2`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    pub fn parse(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { cookies }
    }
}

impl TokenSource for CookieJar {
    fn token(&self, key: &str) -> Option<String> {
        self.cookies.get(key).cloned()
    }
}
