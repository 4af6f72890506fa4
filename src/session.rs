//! Session state shared by every authenticated request
//!
//! A [`SessionContext`] is created once per login and only ever borrowed by
//! the request layer. The cookies it carries are produced by a login flow
//! outside this crate; [`SessionStore`] persists an imported cookie set to
//! `<config dir>/session.json` so it can be reused across runs.

use crate::{CrError, ErrorStage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Account tier reported by the site after login
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Free,
    Premium,
    /// Any status string the site reports that we do not know about
    Other(String),
}

impl From<&str> for AccountStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => AccountStatus::Free,
            "premium" => AccountStatus::Premium,
            _ => AccountStatus::Other(value.trim().to_string()),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Free => f.write_str("free"),
            AccountStatus::Premium => f.write_str("premium"),
            AccountStatus::Other(status) => f.write_str(status),
        }
    }
}

/// A single session cookie obtained at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parses `NAME=VALUE`; the value may itself contain `=`
impl FromStr for SessionCookie {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("cookie name is empty in {s:?}"));
        }
        Ok(Self::new(name, value.trim()))
    }
}

/// Account, filter and cookie state of one logged-in session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionContext {
    pub account_status: AccountStatus,
    pub search_term: String,
    pub desired_seasons: String,
    pub desired_episodes: String,
    pub desired_quality: String,
    pub desired_language: String,
    /// Cookies in the order they were received
    pub cookies: Vec<SessionCookie>,
}

impl SessionContext {
    /// Creates a session holding only the given cookies
    pub fn with_cookies(cookies: Vec<SessionCookie>) -> Self {
        Self {
            cookies,
            ..Self::default()
        }
    }

    /// Builds the value of the `Cookie` request header
    ///
    /// Returns `None` when the session carries no cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Check whether any cookie is present (does not validate them)
    pub fn is_authenticated(&self) -> bool {
        !self.cookies.is_empty()
    }
}

/// JSON file backed persistence for a [`SessionContext`]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store located in the platform config directory
    pub fn open_default() -> Result<Self, CrError> {
        let proj_dirs = directories::ProjectDirs::from("com", "crunchyroll-dl", "crunchyroll_dl")
            .ok_or_else(|| {
                CrError::new(ErrorStage::Session, "cannot determine config directory")
            })?;
        Ok(Self::at(proj_dirs.config_dir().join("session.json")))
    }

    /// Store backed by an explicit file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored session
    ///
    /// # Returns
    ///
    /// `None` if nothing was stored yet, the session otherwise. A file that
    /// exists but cannot be read or parsed is a `Session` error.
    pub fn load(&self) -> Result<Option<SessionContext>, CrError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data =
            fs::read_to_string(&self.path).map_err(|e| CrError::new(ErrorStage::Session, e))?;
        let session =
            serde_json::from_str(&data).map_err(|e| CrError::new(ErrorStage::Session, e))?;
        Ok(Some(session))
    }

    /// Saves the session, creating parent directories if needed
    pub fn save(&self, session: &SessionContext) -> Result<(), CrError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CrError::new(ErrorStage::Session, e))?;
        }
        let data = serde_json::to_string_pretty(session)
            .map_err(|e| CrError::new(ErrorStage::Session, e))?;
        fs::write(&self.path, data).map_err(|e| CrError::new(ErrorStage::Session, e))?;
        Ok(())
    }
}
