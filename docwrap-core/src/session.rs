//! Scoped checkout of session clones.

use std::ops::{Deref, DerefMut};
use tracing::debug;

use crate::{backend::StoreSession, error::DocumentStoreResult};

/// Owns a checked-out session clone and releases it when dropped.
///
/// Dropping happens on every exit path of the scope that holds the guard,
/// including an early `?` return and unwinding from a panic.
#[derive(Debug)]
pub struct SessionGuard<S: StoreSession> {
    session: S,
}

impl<S: StoreSession> SessionGuard<S> {
    /// Wraps a freshly checked-out session.
    pub fn new(session: S) -> Self {
        debug!("session checked out");
        Self { session }
    }
}

impl<S: StoreSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: StoreSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: StoreSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.release();
        debug!("session released");
    }
}

/// Database-level access on one checked-out session.
///
/// Owns its session guard, so the session is released when the scope (or the
/// future it was moved into) is dropped.
#[derive(Debug)]
pub struct DatabaseScope<S: StoreSession> {
    session: SessionGuard<S>,
    name: String,
}

impl<S: StoreSession> DatabaseScope<S> {
    pub(crate) fn new(session: SessionGuard<S>, name: String) -> Self {
        Self { session, name }
    }

    /// Returns the logical database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves a collection of this database on the scoped session.
    pub fn collection(&self, name: &str) -> S::Collection {
        self.session.collection(&self.name, name)
    }

    /// Drops this database.
    pub async fn drop_database(&self) -> DocumentStoreResult<()> {
        self.session.drop_database(&self.name).await
    }
}
