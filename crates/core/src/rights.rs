use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Access rights attached to an authenticated request.
///
/// Rights are resolved by whatever sits in front of the scheduler
/// (session auth, an API gateway, tests) and are only consumed here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rights {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub execute: bool,
    /// Elevated right required to operate on secured sandboxes.
    #[serde(default)]
    pub special: bool,
}

impl Rights {
    /// All rights granted.
    pub const fn full() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
            special: true,
        }
    }

    /// Everything except elevated access.
    pub const fn operator() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
            special: false,
        }
    }
}

/// Caller identity plus the rights granted to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// `None` for internal callers acting without a user session.
    pub user: Option<UserId>,
    pub rights: Rights,
}

impl Credentials {
    /// Internal caller with full rights.
    pub fn system() -> Self {
        Self {
            user: None,
            rights: Rights::full(),
        }
    }

    pub fn for_user(user: impl Into<UserId>, rights: Rights) -> Self {
        Self {
            user: Some(user.into()),
            rights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rights_deny_everything() {
        let rights = Rights::default();
        assert!(!rights.read);
        assert!(!rights.write);
        assert!(!rights.execute);
        assert!(!rights.special);
    }

    #[test]
    fn system_credentials_have_full_rights() {
        let creds = Credentials::system();
        assert!(creds.user.is_none());
        assert_eq!(creds.rights, Rights::full());
    }
}
