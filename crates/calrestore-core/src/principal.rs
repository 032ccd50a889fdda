//! Principal kinds, keys and href construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RootsConfig;
use crate::error::{CoreError, CoreResult};

/// Kind of principal a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
    AdminGroup,
}

impl PrincipalKind {
    /// ## Summary
    /// Maps the legacy numeric principal type of old key elements.
    ///
    /// ## Errors
    /// Returns `InvalidInput` for codes other than user (1) and group (2).
    pub fn from_legacy_code(code: &str) -> CoreResult<Self> {
        match code.trim() {
            "1" => Ok(Self::User),
            "2" => Ok(Self::Group),
            other => Err(CoreError::InvalidInput(format!(
                "unknown principal kind code {other}"
            ))),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::AdminGroup => "adminGroup",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a principal before it is resolved.
///
/// Ordering is by kind first, then href.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalKey {
    pub kind: PrincipalKind,
    pub href: String,
}

impl PrincipalKey {
    #[must_use]
    pub fn new(kind: PrincipalKind, href: impl Into<String>) -> Self {
        Self {
            kind,
            href: href.into(),
        }
    }

    /// Last path segment of the href.
    #[must_use]
    pub fn account(&self) -> &str {
        account_of(&self.href)
    }
}

impl fmt::Display for PrincipalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.href)
    }
}

/// Account part of a principal href.
#[must_use]
pub fn account_of(href: &str) -> &str {
    let trimmed = href.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Ensures a root prefix ends with a slash.
#[must_use]
pub fn normalize_root(root: &str) -> String {
    if root.ends_with('/') {
        root.to_owned()
    } else {
        format!("{root}/")
    }
}

/// Principal root prefixes, normalised to end with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalRoots {
    pub principal: String,
    pub user: String,
    pub group: String,
    pub admin_group: String,
}

impl From<&RootsConfig> for PrincipalRoots {
    fn from(cfg: &RootsConfig) -> Self {
        Self {
            principal: normalize_root(&cfg.principal_root),
            user: normalize_root(&cfg.user_principal_root),
            group: normalize_root(&cfg.group_principal_root),
            admin_group: normalize_root(&cfg.admin_group_principal_root),
        }
    }
}

impl Default for PrincipalRoots {
    fn default() -> Self {
        Self {
            principal: crate::constants::PRINCIPAL_ROOT.to_owned(),
            user: crate::constants::USER_PRINCIPAL_ROOT.to_owned(),
            group: crate::constants::GROUP_PRINCIPAL_ROOT.to_owned(),
            admin_group: crate::constants::ADMIN_GROUP_PRINCIPAL_ROOT.to_owned(),
        }
    }
}

impl PrincipalRoots {
    #[must_use]
    pub fn root_for(&self, kind: PrincipalKind) -> &str {
        match kind {
            PrincipalKind::User => &self.user,
            PrincipalKind::Group => &self.group,
            PrincipalKind::AdminGroup => &self.admin_group,
        }
    }

    /// ## Summary
    /// Builds the href of an account. An account under one of the principal
    /// roots is already an href.
    #[must_use]
    pub fn href_for(&self, kind: PrincipalKind, account: &str) -> String {
        if self.kind_of(account).is_some() {
            return account.to_owned();
        }

        format!("{}{account}", self.root_for(kind))
    }

    #[must_use]
    pub fn key_for(&self, kind: PrincipalKind, account: &str) -> PrincipalKey {
        PrincipalKey::new(kind, self.href_for(kind, account))
    }

    /// ## Summary
    /// Classifies an href by its root. The admin group root nests under the
    /// group root so it is tested first.
    #[must_use]
    pub fn kind_of(&self, href: &str) -> Option<PrincipalKind> {
        if !href.starts_with(&self.principal) {
            return None;
        }

        if href.starts_with(&self.user) {
            Some(PrincipalKind::User)
        } else if href.starts_with(&self.admin_group) {
            Some(PrincipalKind::AdminGroup)
        } else if href.starts_with(&self.group) {
            Some(PrincipalKind::Group)
        } else {
            None
        }
    }
}
