//! Execution identities.
//!
//! An execution id is a random URL-safe token namespaced by the origin that
//! created it (its "firm"). The textual forms are:
//! - pure: `V1StGXR8_Z5jdH`
//! - firmed: `dck.V1StGXR8_Z5jdH`
//!
//! With the default length of 14 characters, about 20 years are needed for a
//! 1% collision probability at 1000 generations per second.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExecError;

/// Default length of an execution id token.
pub const EXECID_LEN: usize = 14;

/// Default length of a workflow id token.
pub const WFID_LEN: usize = 24;

/// Prefix of workflow ids created for on-demand runs.
pub const WFID_PREFIX: &str = "tmp";

/// Origin tag of an execution identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Firm {
    Start,
    Build,
    Dispatcher,
    Docker,
    Web,
    Local,
}

impl Firm {
    /// Wire tag used in the firmed form.
    pub fn tag(&self) -> &'static str {
        match self {
            Firm::Start => "0",
            Firm::Build => "bld",
            Firm::Dispatcher => "dsp",
            Firm::Docker => "dck",
            Firm::Web => "web",
            Firm::Local => "loc",
        }
    }

    /// Resolve a wire tag back to its firm.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "0" => Some(Firm::Start),
            "bld" => Some(Firm::Build),
            "dsp" => Some(Firm::Dispatcher),
            "dck" => Some(Firm::Docker),
            "web" => Some(Firm::Web),
            "loc" => Some(Firm::Local),
            _ => None,
        }
    }
}

impl fmt::Display for Firm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Generate a URL-safe random token of `size` characters.
pub fn generate(size: usize) -> String {
    nanoid::nanoid!(size)
}

/// Concatenate firm tag and token: `<tag>.<token>`.
pub fn firm(token: &str, firm: Firm) -> String {
    format!("{}.{}", firm.tag(), token)
}

/// Strip the leading `<tag>.` namespace from a firmed id.
///
/// Only the first separator is consumed; the token itself is returned as is.
pub fn unfirm(firmed: &str) -> Result<&str, ExecError> {
    firmed
        .split_once('.')
        .map(|(_, token)| token)
        .ok_or_else(|| ExecError::MalformedIdentity(firmed.to_string()))
}

/// Firmed id for a runtime build.
pub fn execid_for_build() -> String {
    firm(&generate(EXECID_LEN), Firm::Build)
}

/// Workflow id for runs that have no stored workflow definition.
pub fn generate_wfid() -> String {
    format!("{}.{}", WFID_PREFIX, generate(WFID_LEN))
}

/// Identity of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecId {
    token: String,
    firm: Firm,
}

impl ExecId {
    /// Fresh identity with the default length, firmed as `Start`.
    pub fn new() -> Self {
        Self::with_size(EXECID_LEN)
    }

    /// Fresh identity with a token of `size` characters.
    pub fn with_size(size: usize) -> Self {
        Self {
            token: generate(size),
            firm: Firm::Start,
        }
    }

    /// Wrap an existing token.
    pub fn from_token(token: impl Into<String>, firm: Firm) -> Self {
        Self {
            token: token.into(),
            firm,
        }
    }

    /// Parse a firmed id. Unknown firm tags are rejected.
    pub fn from_firmed(firmed: &str) -> Result<Self, ExecError> {
        let (tag, token) = firmed
            .split_once('.')
            .ok_or_else(|| ExecError::MalformedIdentity(firmed.to_string()))?;
        let firm = Firm::from_tag(tag)
            .ok_or_else(|| {
                ExecError::MalformedIdentity(format!("unknown firm '{}' in {}", tag, firmed))
            })?;
        if token.is_empty() {
            return Err(ExecError::MalformedIdentity(firmed.to_string()));
        }
        Ok(Self::from_token(token, firm))
    }

    /// Same token under another namespace.
    pub fn with_firm(&self, firm: Firm) -> Self {
        Self {
            token: self.token.clone(),
            firm,
        }
    }

    pub fn firm(&self) -> Firm {
        self.firm
    }

    /// Token without namespace.
    pub fn pure(&self) -> &str {
        &self.token
    }

    /// `<tag>.<token>`
    pub fn firmed(&self) -> String {
        firm(&self.token, self.firm)
    }
}

impl Default for ExecId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl FromStr for ExecId {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_firmed(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL_SAFE: &str = "_-0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

    #[test]
    fn test_generate_size_and_alphabet() {
        let token = generate(EXECID_LEN);
        assert_eq!(token.chars().count(), 14);
        assert!(token.chars().all(|c| URL_SAFE.contains(c)));
    }

    #[test]
    fn test_generate_distinct() {
        assert_ne!(generate(14), generate(14));
    }

    #[test]
    fn test_firm_docker() {
        assert_eq!(firm("abc123", Firm::Docker), "dck.abc123");
        assert_eq!(unfirm("dck.abc123").unwrap(), "abc123");
    }

    #[test]
    fn test_roundtrip_all_firms() {
        let id = ExecId::new();
        let firms = [
            Firm::Start,
            Firm::Build,
            Firm::Dispatcher,
            Firm::Docker,
            Firm::Web,
            Firm::Local,
        ];
        for f in firms {
            let firmed = id.with_firm(f).firmed();
            assert_eq!(unfirm(&firmed).unwrap(), id.pure());
            assert_eq!(ExecId::from_firmed(&firmed).unwrap().firm(), f);
        }
    }

    #[test]
    fn test_unfirm_splits_once() {
        assert_eq!(unfirm("web.a.b").unwrap(), "a.b");
    }

    #[test]
    fn test_unfirm_malformed() {
        let err = unfirm("abc123").unwrap_err();
        assert!(matches!(err, ExecError::MalformedIdentity(_)));
    }

    #[test]
    fn test_from_firmed_unknown_tag() {
        assert!(ExecId::from_firmed("xyz.abc").is_err());
        assert!(ExecId::from_firmed("web.").is_err());
    }

    #[test]
    fn test_new_execid_is_start() {
        let id = ExecId::new();
        assert_eq!(id.firm(), Firm::Start);
        assert!(id.firmed().starts_with("0."));
        assert_eq!(id.to_string(), id.pure());
    }

    #[test]
    fn test_build_and_wfid_prefixes() {
        assert!(execid_for_build().starts_with("bld."));
        let wfid = generate_wfid();
        assert!(wfid.starts_with("tmp."));
        assert_eq!(wfid.len(), 4 + WFID_LEN);
    }
}
