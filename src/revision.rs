use std::borrow::Borrow;
use std::fmt::{self, Display};

use chrono::NaiveDateTime;
use tracing::warn;

use crate::operation::{Operation, Operations};

/// Format used for the `created` timestamp of generated revisions.
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Identifier of a revision, such as `9d60d35786c1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevisionId(String);
impl RevisionId {
    /// Longest identifier the version table can hold.
    pub const MAX_LEN: usize = 32;

    pub fn new(id: impl Into<String>) -> Self {
        RevisionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier collides with a target keyword (`head`, `base`, `+N`, `-N`).
    pub fn is_reserved(&self) -> bool {
        let id = self.0.as_str();
        id.is_empty()
            || id == "head"
            || id == "base"
            || id.starts_with('+')
            || id.starts_with('-')
            || id.chars().any(char::is_whitespace)
    }
}
impl Display for RevisionId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}
impl From<&str> for RevisionId {
    fn from(id: &str) -> Self {
        RevisionId(id.to_owned())
    }
}
impl From<String> for RevisionId {
    fn from(id: String) -> Self {
        RevisionId(id)
    }
}
impl Borrow<str> for RevisionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
impl AsRef<str> for RevisionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One immutable unit of schema change: the operations that move the schema forward from its
/// parent, and the operations that undo them.
///
/// # Examples
///
/// ```
/// use stepladder::operation::{Column, ColumnType};
/// use stepladder::revision::Revision;
///
/// let revision = Revision::new("9d60d35786c1", Some("7573241a5156"))
///     .message("Added index_image_resolved.")
///     .upgrade_reversible(|ops| {
///         ops.batch_alter_table("request_add", |batch| {
///             batch.add_column(Column::new("index_resolved_id", ColumnType::Integer));
///             batch.create_foreign_key(
///                 "index_resolved_id_fkey", "image", &["index_resolved_id"], &["id"]
///             );
///         });
///     });
/// assert_eq!(revision.downgrade_operations().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    id: RevisionId,
    parent: Option<RevisionId>,
    message: String,
    created: Option<NaiveDateTime>,
    upgrade: Vec<Operation>,
    downgrade: Vec<Operation>,
    /// set when `upgrade_reversible` could not derive a downgrade
    underived: bool,
}
impl Revision {
    pub fn new<I, P>(id: I, parent: Option<P>) -> Self
    where
        I: Into<RevisionId>,
        P: Into<RevisionId>,
    {
        Revision {
            id: id.into(),
            parent: parent.map(Into::into),
            message: String::new(),
            created: None,
            upgrade: Vec::new(),
            downgrade: Vec::new(),
            underived: false,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the creation timestamp from a `YYYY-MM-DD HH:MM:SS[.ffffff]` string. An unparseable
    /// value is logged and left unset; the timestamp is informational only.
    pub fn created(mut self, created: &str) -> Self {
        match NaiveDateTime::parse_from_str(created, CREATED_FORMAT) {
            Ok(timestamp) => self.created = Some(timestamp),
            Err(error) => warn!(revision = %self.id, %error, "ignoring invalid created timestamp"),
        }
        self
    }

    /// Records the forward operations of this revision.
    pub fn upgrade<F: FnOnce(&mut Operations)>(mut self, build: F) -> Self {
        let mut operations = Operations::default();
        build(&mut operations);
        self.upgrade = operations.into_vec();
        self
    }

    /// Records the backward operations of this revision, in the order they must run.
    pub fn downgrade<F: FnOnce(&mut Operations)>(mut self, build: F) -> Self {
        let mut operations = Operations::default();
        build(&mut operations);
        self.downgrade = operations.into_vec();
        self.underived = false;
        self
    }

    /// Records the forward operations and derives the downgrade as their exact inverse in
    /// reverse order.
    ///
    /// Operations without an inverse (drops, raw SQL) leave nothing to derive. Such a revision
    /// must follow up with an explicit `downgrade`, otherwise `RevisionGraph::new` rejects it
    /// with `Error::MissingDowngrade`.
    pub fn upgrade_reversible<F: FnOnce(&mut Operations)>(mut self, build: F) -> Self {
        let mut operations = Operations::default();
        build(&mut operations);
        match operations.inverse() {
            Some(inverse) => {
                self.downgrade = inverse;
                self.underived = false;
            }
            None => {
                self.downgrade = Vec::new();
                self.underived = true;
            }
        }
        self.upgrade = operations.into_vec();
        self
    }

    /// Whether the downgrade was requested from `upgrade_reversible` but could not be derived.
    pub fn has_missing_downgrade(&self) -> bool {
        self.underived
    }

    pub fn id(&self) -> &RevisionId {
        &self.id
    }

    pub fn parent(&self) -> Option<&RevisionId> {
        self.parent.as_ref()
    }

    pub fn message_text(&self) -> &str {
        &self.message
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        self.created
    }

    pub fn upgrade_operations(&self) -> &[Operation] {
        &self.upgrade
    }

    pub fn downgrade_operations(&self) -> &[Operation] {
        &self.downgrade
    }
}
impl Display for Revision {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self.parent {
            Some(ref parent) => write!(formatter, "{} -> {}", parent, self.id)?,
            None => write!(formatter, "<base> -> {}", self.id)?,
        }
        if !self.message.is_empty() {
            write!(formatter, ", {}", self.message)?;
        }
        Ok(())
    }
}
