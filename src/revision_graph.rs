use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};

use crate::error::Error;
use crate::revision::{Revision, RevisionId};
use crate::Result;

/// Which way a chain of revisions is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}
impl Display for Direction {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Direction::Upgrade => formatter.write_str("upgrade"),
            Direction::Downgrade => formatter.write_str("downgrade"),
        }
    }
}

/// Every known revision, linked to its parent.
///
/// The graph is built once at startup from the revisions an application registers and is
/// read-only afterwards. Each revision has at most one parent. A parent may have several
/// children, but the planner only moves along a single line of descent.
#[derive(Debug)]
pub struct RevisionGraph {
    /// all revisions, in the order they were registered
    revisions: Vec<Revision>,
    index: HashMap<RevisionId, usize>,
}
impl RevisionGraph {
    /// Validates and indexes the given revisions.
    pub fn new(revisions: Vec<Revision>) -> Result<Self> {
        let mut index = HashMap::with_capacity(revisions.len());
        for (position, revision) in revisions.iter().enumerate() {
            if revision.id().is_reserved() {
                return Err(Error::ReservedIdentifier(revision.id().to_string()));
            }
            if revision.id().as_str().chars().count() > RevisionId::MAX_LEN {
                return Err(Error::IdentifierTooLong(revision.id().to_string()));
            }
            if index.insert(revision.id().clone(), position).is_some() {
                return Err(Error::DuplicateRevision(revision.id().clone()));
            }
            if revision.has_missing_downgrade() {
                return Err(Error::MissingDowngrade(revision.id().clone()));
            }
        }
        for revision in revisions.iter() {
            if let Some(parent) = revision.parent() {
                if !index.contains_key(parent) {
                    return Err(Error::MissingParent {
                        revision: revision.id().clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let graph = RevisionGraph { revisions, index };
        // every chain must reach a root
        for revision in graph.revisions.iter() {
            graph.ancestry(revision.id())?;
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// All revisions, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Revision> {
        self.index.get(id).map(|&position| &self.revisions[position])
    }

    /// Looks up a revision by its identifier.
    pub fn resolve(&self, id: &str) -> Result<&Revision> {
        self.get(id).ok_or_else(|| Error::UnknownRevision(id.to_owned()))
    }

    /// Revisions whose parent is `id`, in registration order.
    pub fn children(&self, id: &str) -> Vec<&Revision> {
        self.revisions
            .iter()
            .filter(|revision| revision.parent().map(RevisionId::as_str) == Some(id))
            .collect()
    }

    /// Revisions that no other revision names as its parent.
    pub fn heads(&self) -> Vec<&Revision> {
        let parents: HashSet<&RevisionId> =
            self.revisions.iter().filter_map(Revision::parent).collect();
        self.revisions
            .iter()
            .filter(|revision| !parents.contains(revision.id()))
            .collect()
    }

    /// Revisions without a parent.
    pub fn bases(&self) -> Vec<&Revision> {
        self.revisions
            .iter()
            .filter(|revision| revision.parent().is_none())
            .collect()
    }

    /// Every revision, each listed after its parent. Siblings keep registration order.
    pub fn history(&self) -> Vec<&Revision> {
        let mut ordered = Vec::with_capacity(self.revisions.len());
        let mut stack: Vec<&Revision> = self.bases().into_iter().rev().collect();
        while let Some(revision) = stack.pop() {
            ordered.push(revision);
            stack.extend(self.children(revision.id().as_str()).into_iter().rev());
        }
        ordered
    }

    /// The revision `id` followed by each of its ancestors, ending at a root.
    ///
    /// Fails with `Error::Cycle` if the parent chain does not end within `len()` hops.
    pub fn ancestry(&self, id: &RevisionId) -> Result<Vec<&Revision>> {
        let mut chain = Vec::new();
        let mut next = Some(self.resolve(id.as_str())?);
        while let Some(revision) = next {
            if chain.len() >= self.revisions.len() {
                return Err(Error::Cycle {
                    revision: id.clone(),
                });
            }
            chain.push(revision);
            next = match revision.parent() {
                Some(parent) => Some(self.resolve(parent.as_str())?),
                None => None,
            };
        }
        Ok(chain)
    }

    /// The revisions separating `from` and `to`, where `None` stands for the empty database.
    ///
    /// Walking up, the result runs root-to-target, excluding `from` and including `to`. Walking
    /// down, it runs from `from` towards the root, including `from` and excluding `to`.
    pub fn chain_between(
        &self,
        from: Option<&RevisionId>,
        to: Option<&RevisionId>,
    ) -> Result<(Vec<&Revision>, Direction)> {
        match (from, to) {
            (None, None) => Ok((Vec::new(), Direction::Upgrade)),
            (None, Some(to)) => {
                let mut chain = self.ancestry(to)?;
                chain.reverse();
                Ok((chain, Direction::Upgrade))
            }
            (Some(from), None) => Ok((self.ancestry(from)?, Direction::Downgrade)),
            (Some(from), Some(to)) => {
                let up = self.ancestry(to)?;
                let down = self.ancestry(from)?;
                if from == to {
                    return Ok((Vec::new(), Direction::Upgrade));
                }
                if let Some(position) = up.iter().position(|revision| revision.id() == from) {
                    let mut chain = up[..position].to_vec();
                    chain.reverse();
                    return Ok((chain, Direction::Upgrade));
                }
                if let Some(position) = down.iter().position(|revision| revision.id() == to) {
                    return Ok((down[..position].to_vec(), Direction::Downgrade));
                }
                Err(Error::Unreachable {
                    from: Some(from.clone()),
                    to: Some(to.clone()),
                })
            }
        }
    }
}
