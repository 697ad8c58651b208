//! The seam between the executor and a target database.

use crate::error::BackendError;
use crate::operation::Operation;
use crate::revision::RevisionId;

/// Durable record of the revision a database currently reflects.
pub trait StateStore {
    /// The identifier of the most recently applied revision, or `None` if nothing is applied.
    fn read(&mut self) -> Result<Option<RevisionId>, BackendError>;
    /// Replaces the stored identifier. Writing `None` removes the record.
    fn write(&mut self, version: Option<&RevisionId>) -> Result<(), BackendError>;
}

/// An open unit of work against the target database. Dropping a transaction without calling
/// `commit` discards everything executed through it, including state writes.
pub trait Transaction: StateStore {
    fn execute(&mut self, operation: &Operation) -> Result<(), BackendError>;

    fn commit(self) -> Result<(), BackendError>;
}

/// A database the executor can migrate.
pub trait Backend {
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Transaction<'_>, BackendError>;

    /// Takes the exclusive migration lock. Only one migration may run against a database at a
    /// time; backends without a shared lock leave serialization to the caller.
    fn lock(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Reads the Applied State in a throwaway transaction.
    fn current(&mut self) -> Result<Option<RevisionId>, BackendError> {
        let mut transaction = self.begin()?;
        let version = transaction.read()?;
        Ok(version)
    }
}
