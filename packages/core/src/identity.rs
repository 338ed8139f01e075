//! OS identity resolution and privilege checks.
//!
//! Mount ownership options need numeric IDs; configuration carries names.
//! The resolver sits behind a trait so driver tests can supply fixed IDs.

use nix::unistd::{geteuid, Group, User};

use crate::error::{Error, Result};

/// Resolves user and group names to numeric IDs.
pub trait IdentityResolver {
    fn uid_of(&self, user: &str) -> Result<u32>;
    fn gid_of(&self, group: &str) -> Result<u32>;
}

/// [`IdentityResolver`] backed by the system user database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentity;

impl IdentityResolver for SystemIdentity {
    fn uid_of(&self, user: &str) -> Result<u32> {
        match User::from_name(user) {
            Ok(Some(entry)) => Ok(entry.uid.as_raw()),
            _ => Err(Error::UserNotFound { user: user.into() }),
        }
    }

    fn gid_of(&self, group: &str) -> Result<u32> {
        match Group::from_name(group) {
            Ok(Some(entry)) => Ok(entry.gid.as_raw()),
            _ => Err(Error::GroupNotFound {
                group: group.into(),
            }),
        }
    }
}

/// Fails unless the process runs with effective UID 0.
///
/// Every command mutates system-wide device-mapper, LVM, or mount state, so
/// this is checked once before any orchestration starts.
pub fn ensure_root() -> Result<()> {
    if geteuid().is_root() {
        Ok(())
    } else {
        Err(Error::NotRoot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_uid_resolves() {
        // The root user exists on any system these tests run on.
        assert_eq!(SystemIdentity.uid_of("root").unwrap(), 0);
    }

    #[test]
    fn unknown_user_is_an_error() {
        let err = SystemIdentity.uid_of("no-such-user-exists").unwrap_err();
        assert!(matches!(err, Error::UserNotFound { .. }));
    }

    #[test]
    fn unknown_group_is_an_error() {
        let err = SystemIdentity.gid_of("no-such-group-exists").unwrap_err();
        assert!(matches!(err, Error::GroupNotFound { .. }));
    }
}
