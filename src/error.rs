use std::fmt;
use std::io;

use thiserror::Error;

use crate::revision_graph::Direction;
use crate::revision::RevisionId;

/// Error type produced by a storage backend. Backends hand these to the executor, which wraps
/// them into the matching `Error` variant.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown revision {0:?}")]
    UnknownRevision(String),

    #[error("revision {revision} is part of a parent cycle")]
    Cycle { revision: RevisionId },

    #[error("revision {} is not reachable from {}", Base(.to), Base(.from))]
    Unreachable {
        from: Option<RevisionId>,
        to: Option<RevisionId>,
    },

    #[error("revision identifier {0:?} is longer than {max} characters", max = RevisionId::MAX_LEN)]
    IdentifierTooLong(String),

    #[error("revision {0} is declared more than once")]
    DuplicateRevision(RevisionId),

    #[error("revision {revision} names parent {parent}, which is not registered")]
    MissingParent {
        revision: RevisionId,
        parent: RevisionId,
    },

    #[error("{0:?} is reserved and can't be used as a revision identifier")]
    ReservedIdentifier(String),

    #[error("target is ambiguous, the graph has multiple heads: {}", join(.0))]
    MultipleHeads(Vec<RevisionId>),

    #[error("relative target {0:+} walks off the revision chain")]
    RelativeOutOfRange(i64),

    #[error("{} is not a valid {direction} target from {}", Base(.target), Base(.current))]
    WrongDirection {
        direction: Direction,
        current: Option<RevisionId>,
        target: Option<RevisionId>,
    },

    #[error(
        "plan was computed from {} but the database is at {}",
        Base(.expected),
        Base(.found)
    )]
    StalePlan {
        expected: Option<RevisionId>,
        found: Option<RevisionId>,
    },

    #[error("failed to {operation} while applying revision {revision}")]
    SchemaApply {
        revision: RevisionId,
        operation: String,
        #[source]
        source: BackendError,
    },

    #[error(
        "revision {0} derives its downgrade from operations that have no inverse; \
         declare the downgrade explicitly"
    )]
    MissingDowngrade(RevisionId),

    #[error("downgrade of revision {0} does not restore the schema its upgrade started from")]
    Irreversible(RevisionId),

    #[error("{message}")]
    StateStore {
        message: String,
        #[source]
        source: BackendError,
    },

    #[error("migration was cancelled")]
    Cancelled,

    #[error("migration halted with the database at {}: {source}", Base(.last_applied))]
    Halted {
        last_applied: Option<RevisionId>,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to connect to the database")]
    Connect(#[source] BackendError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn state_store(message: impl Into<String>, source: BackendError) -> Self {
        Error::StateStore {
            message: message.into(),
            source,
        }
    }

    /// The specific error kind, looking through `Halted`.
    pub fn root(&self) -> &Error {
        match self {
            Error::Halted { source, .. } => source.root(),
            other => other,
        }
    }

    /// For errors raised by the executor, the Applied State the database was left at. The inner
    /// `None` means no revision is applied.
    pub fn last_applied(&self) -> Option<Option<&RevisionId>> {
        match self {
            Error::Halted { last_applied, .. } => Some(last_applied.as_ref()),
            _ => None,
        }
    }
}

/// Displays an optional revision, with `None` shown as `<base>`.
pub(crate) struct Base<'a>(pub &'a Option<RevisionId>);

impl fmt::Display for Base<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(revision) => write!(formatter, "{}", revision),
            None => formatter.write_str("<base>"),
        }
    }
}

fn join(revisions: &[RevisionId]) -> String {
    revisions
        .iter()
        .map(|revision| revision.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
