use crate::core::utils::{self, Strip};
use crate::core::{AccessLevel, Result, StoreError};

/// Permission policy consulted before any native filesystem call.
///
/// The store only ever calls [`AccessGuard::ensure_access`]; swap in another implementation to
/// get ACLs or per-user contexts.
pub trait AccessGuard: Send + Sync {
    fn ensure_access(&self, uri: &str, level: AccessLevel) -> Result<()>;
}

/// Default policy: deny any URI that lexically climbs above the virtual root.
///
/// Basenames listed in `exceptions` are allowed at any depth, so a configuration
/// file can still be discovered from a parent directory.
#[derive(Debug, Clone, Default)]
pub struct RootGuard {
    exceptions: Vec<String>,
}

impl RootGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exceptions<I, S>(exceptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exceptions: exceptions.into_iter().map(Into::into).collect(),
        }
    }
}

impl AccessGuard for RootGuard {
    fn ensure_access(&self, uri: &str, level: AccessLevel) -> Result<()> {
        if !utils::escapes_root(uri) {
            return Ok(());
        }
        let name = utils::basename(uri, Strip::Nothing);
        if self.exceptions.iter().any(|allowed| *allowed == name) {
            return Ok(());
        }
        Err(StoreError::AccessDenied {
            uri: uri.to_string(),
            level,
        })
    }
}

/// Policy that lets everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGuard for AllowAll {
    fn ensure_access(&self, _uri: &str, _level: AccessLevel) -> Result<()> {
        Ok(())
    }
}
