//! Scoped network-namespace entry.
//!
//! Switching namespaces is a per-OS-thread operation, so the switch must not
//! outlive the calling scope and must be undone on every exit path. The
//! guard below is `!Send`; holding it across an `.await` makes the enclosing
//! future `!Send`, which keeps the critical section on one OS thread.
#![allow(unsafe_code)]

use std::fs::File;
use std::marker::PhantomData;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::error::{NetError, Result};

/// Namespace file of the calling thread.
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Entry into a target network namespace, restored on drop.
#[derive(Debug)]
pub struct NetnsGuard {
    orig: File,
    restored: bool,
    _not_send: PhantomData<*const ()>,
}

impl NetnsGuard {
    /// Moves the calling thread into the namespace at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if either namespace file cannot be opened or the
    /// `setns` call is rejected by the kernel.
    pub fn enter(path: &Path) -> Result<Self> {
        let orig = File::open(THREAD_NETNS).map_err(|e| {
            NetError::Namespace(format!("failed to open current namespace: {e}"))
        })?;
        let target = File::open(path).map_err(|e| {
            NetError::Namespace(format!("failed to open namespace {}: {e}", path.display()))
        })?;

        set_netns(&target).map_err(|e| {
            NetError::Namespace(format!("failed to enter namespace {}: {e}", path.display()))
        })?;

        Ok(Self {
            orig,
            restored: false,
            _not_send: PhantomData,
        })
    }

    /// Restores the original namespace, surfacing any error.
    ///
    /// # Errors
    ///
    /// Returns an error if the `setns` back into the original namespace
    /// fails. Dropping the guard performs the same restore but can only log.
    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        set_netns(&self.orig)
            .map_err(|e| NetError::Namespace(format!("failed to restore namespace: {e}")))
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = set_netns(&self.orig) {
            tracing::error!("failed to restore network namespace: {e}");
        }
    }
}

fn set_netns(ns: &File) -> std::io::Result<()> {
    // SAFETY: the fd comes from a File kept open across the call, and
    // CLONE_NEWNET restricts the switch to the network namespace.
    let ret = unsafe { libc::setns(ns.as_raw_fd(), libc::CLONE_NEWNET) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn thread_netns_inode() -> u64 {
        use std::os::unix::fs::MetadataExt;
        std::fs::metadata(THREAD_NETNS).unwrap().ino()
    }

    #[test]
    fn enter_missing_namespace_fails() {
        let err = NetnsGuard::enter(&PathBuf::from("/proc/0/ns/net")).unwrap_err();
        assert!(matches!(err, NetError::Namespace(_)));
    }

    #[test]
    fn reentering_own_namespace_restores() {
        // Entering our own namespace is a no-op switch, but it exercises the
        // full enter/restore path without requiring a second namespace.
        if unsafe { libc::geteuid() } != 0 {
            eprintln!("Skipping test: requires root privileges");
            return;
        }

        let before = thread_netns_inode();
        let guard = NetnsGuard::enter(&PathBuf::from(THREAD_NETNS)).unwrap();
        guard.restore().unwrap();
        assert_eq!(before, thread_netns_inode());
    }
}
