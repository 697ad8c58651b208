//! Turns "migrate to X" into the ordered list of revision steps that gets there.

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{Base, Error};
use crate::operation::Operation;
use crate::postgres_backend::VersionTable;
use crate::revision::{Revision, RevisionId};
use crate::revision_graph::RevisionGraph;
use crate::Result;

pub use crate::revision_graph::Direction;

/// Where a migration should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The single newest revision.
    Head,
    /// No revision applied at all.
    Base,
    /// `+N` / `-N` steps from the current revision.
    Relative(i64),
    Revision(RevisionId),
}
impl FromStr for Target {
    type Err = Error;

    fn from_str(target: &str) -> Result<Self> {
        let target = target.trim();
        match target {
            "head" | "heads" => Ok(Target::Head),
            "base" => Ok(Target::Base),
            _ if target.starts_with('+') || target.starts_with('-') => target
                .parse::<i64>()
                .map(Target::Relative)
                .map_err(|_| Error::UnknownRevision(target.to_owned())),
            "" => Err(Error::UnknownRevision(String::new())),
            _ => Ok(Target::Revision(RevisionId::new(target))),
        }
    }
}
impl Display for Target {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Target::Head => formatter.write_str("head"),
            Target::Base => formatter.write_str("base"),
            Target::Relative(steps) => write!(formatter, "{:+}", steps),
            Target::Revision(ref id) => write!(formatter, "{}", id),
        }
    }
}

/// One revision to run in a given direction.
#[derive(Debug, Clone, Copy)]
pub struct Step<'g> {
    revision: &'g Revision,
    direction: Direction,
}
impl<'g> Step<'g> {
    pub fn revision(&self) -> &'g Revision {
        self.revision
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The operations this step runs: forward ones when upgrading, backward ones when
    /// downgrading.
    pub fn operations(&self) -> &'g [Operation] {
        match self.direction {
            Direction::Upgrade => self.revision.upgrade_operations(),
            Direction::Downgrade => self.revision.downgrade_operations(),
        }
    }

    /// The Applied State once this step has been committed.
    pub fn resulting_state(&self) -> Option<&'g RevisionId> {
        match self.direction {
            Direction::Upgrade => Some(self.revision.id()),
            Direction::Downgrade => self.revision.parent(),
        }
    }

    /// The Applied State this step expects to start from.
    pub fn starting_state(&self) -> Option<&'g RevisionId> {
        match self.direction {
            Direction::Upgrade => self.revision.parent(),
            Direction::Downgrade => Some(self.revision.id()),
        }
    }
}
impl Display for Step<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        let from = self.starting_state().cloned();
        let to = self.resulting_state().cloned();
        write!(
            formatter,
            "{} {} -> {}",
            self.direction,
            Base(&from),
            Base(&to)
        )?;
        if !self.revision.message_text().is_empty() {
            write!(formatter, ", {}", self.revision.message_text())?;
        }
        Ok(())
    }
}

/// An ordered sequence of steps moving Applied State from `from` to `to`.
#[derive(Debug, Clone)]
pub struct Plan<'g> {
    from: Option<RevisionId>,
    to: Option<RevisionId>,
    direction: Direction,
    steps: Vec<Step<'g>>,
}
impl<'g> Plan<'g> {
    pub fn from(&self) -> Option<&RevisionId> {
        self.from.as_ref()
    }

    pub fn to(&self) -> Option<&RevisionId> {
        self.to.as_ref()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn steps(&self) -> &[Step<'g>] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The operations of every step, flattened in execution order.
    pub fn operations(&self) -> impl Iterator<Item = &'g Operation> + '_ {
        self.steps.iter().flat_map(|step| step.operations().iter())
    }

    /// Renders the plan as a SQL script that can be reviewed or run by hand. Each step becomes
    /// its own transaction that also updates `version_table`.
    pub fn to_sql(&self, version_table: &VersionTable) -> String {
        let mut script = String::new();
        for step in self.steps.iter() {
            script.push_str(&format!("-- Running {}\n\nBEGIN;\n\n", step));
            for operation in step.operations() {
                script.push_str(&operation.to_sql());
                script.push_str(";\n\n");
            }
            for statement in version_table.write_sql(step.resulting_state()) {
                script.push_str(&statement);
                script.push_str(";\n");
            }
            script.push_str("\nCOMMIT;\n\n");
        }
        script
    }
}

/// Computes the steps that move a database from `current` to `target`.
///
/// Nothing is executed here, so every planning error is raised before the schema is touched.
pub fn plan<'g>(
    graph: &'g RevisionGraph,
    current: Option<&RevisionId>,
    target: &Target,
) -> Result<Plan<'g>> {
    if let Some(current) = current {
        graph.resolve(current.as_str())?;
    }
    let to = resolve_target(graph, current, target)?;
    let (chain, direction) = graph.chain_between(current, to.as_ref())?;
    let steps = chain
        .into_iter()
        .map(|revision| Step {
            revision,
            direction,
        })
        .collect();
    Ok(Plan {
        from: current.cloned(),
        to,
        direction,
        steps,
    })
}

/// Turns a `Target` into a concrete revision, or `None` for base.
pub fn resolve_target(
    graph: &RevisionGraph,
    current: Option<&RevisionId>,
    target: &Target,
) -> Result<Option<RevisionId>> {
    match *target {
        Target::Base => Ok(None),
        Target::Revision(ref id) => Ok(Some(graph.resolve(id.as_str())?.id().clone())),
        Target::Head => {
            let heads = graph.heads();
            match heads.len() {
                0 => Ok(None),
                1 => Ok(Some(heads[0].id().clone())),
                _ => Err(Error::MultipleHeads(
                    heads.iter().map(|head| head.id().clone()).collect(),
                )),
            }
        }
        Target::Relative(steps) if steps < 0 => {
            let mut position = current.cloned();
            for _ in 0..steps.unsigned_abs() {
                let id = position.ok_or(Error::RelativeOutOfRange(steps))?;
                position = graph.resolve(id.as_str())?.parent().cloned();
            }
            Ok(position)
        }
        Target::Relative(steps) => {
            let mut position = current.cloned();
            for _ in 0..steps {
                let next = match position {
                    Some(ref id) => graph.children(id.as_str()),
                    None => graph.bases(),
                };
                if next.len() != 1 {
                    return Err(Error::RelativeOutOfRange(steps));
                }
                position = Some(next[0].id().clone());
            }
            Ok(position)
        }
    }
}
