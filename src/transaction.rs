use crate::error::{GraphError, Result};
use crate::session::Session;

/// Per-caller transaction handle.
///
/// Binds the session lifecycle to an explicit begin/commit/rollback
/// protocol. Most callers never open explicitly: every session operation
/// that touches the back-end opens the underlying driver transaction
/// lazily through `read_write`.
pub struct Transaction<'a> {
    session: &'a mut Session,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Self { session }
    }

    /// Explicitly opens the transaction.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(GraphError::TransactionState("transaction already open"));
        }
        self.session.read_write().map(|_| ())
    }

    /// Opens the transaction if none is open.
    pub fn read_write(&mut self) -> Result<()> {
        self.session.read_write().map(|_| ())
    }

    /// True while a driver transaction is open.
    pub fn is_open(&self) -> bool {
        self.session.tx.is_some()
    }

    /// Commits the staged working set.
    pub fn commit(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(GraphError::TransactionState("no open transaction"));
        }
        self.session.commit()
    }

    /// Rolls the staged working set back.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(GraphError::TransactionState("no open transaction"));
        }
        self.session.rollback()
    }

    /// Closes the transaction, rolling back if still open.
    pub fn close(&mut self) -> Result<()> {
        if self.is_open() {
            return self.session.rollback();
        }
        Ok(())
    }
}
