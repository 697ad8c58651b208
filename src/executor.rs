use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{Backend, StateStore, Transaction};
use crate::error::{Base, Error};
use crate::planner::{self, Direction, Plan, Step, Target};
use crate::revision::RevisionId;
use crate::revision_graph::RevisionGraph;
use crate::Result;

/// Applies plans from a `RevisionGraph` to a database.
///
/// Each revision runs in its own transaction, together with the write that records it as the
/// Applied State. When a step fails, that step is rolled back and the steps before it stay
/// applied, so the returned error always says where the database was left.
///
/// # Examples
///
/// ```no_run
/// use stepladder::executor::Migrator;
/// use stepladder::planner::Target;
/// use stepladder::postgres_backend::{PostgresBackend, VersionTable};
/// # fn revisions() -> Vec<stepladder::revision::Revision> { Vec::new() }
///
/// # fn main() -> stepladder::Result<()> {
/// let graph = stepladder::revision_graph::RevisionGraph::new(revisions())?;
/// let backend = PostgresBackend::connect("postgresql://localhost/iib", VersionTable::default())?;
/// let mut migrator = Migrator::new(&graph, backend);
/// match migrator.upgrade(&Target::Head) {
///     Ok(version) => println!("Database is now at {:?}", version),
///     Err(error) => println!("Error updating database structure: {}", error),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Migrator<'g, B: Backend> {
    graph: &'g RevisionGraph,
    backend: B,
    cancel: Option<Arc<AtomicBool>>,
}
impl<'g, B: Backend> Migrator<'g, B> {
    pub fn new(graph: &'g RevisionGraph, backend: B) -> Self {
        Migrator {
            graph,
            backend,
            cancel: None,
        }
    }

    /// Once `flag` is set, no further step is started. Steps already committed stay applied.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn graph(&self) -> &'g RevisionGraph {
        self.graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// The revision the database currently reflects.
    pub fn current(&mut self) -> Result<Option<RevisionId>> {
        self.backend
            .current()
            .map_err(|error| Error::state_store("failed to read the current schema version", error))
    }

    /// Computes the plan from the current revision to `target` without applying anything.
    pub fn plan(&mut self, target: &Target) -> Result<Plan<'g>> {
        let current = self.current()?;
        planner::plan(self.graph, current.as_ref(), target)
    }

    /// Applies a previously computed plan and returns the new Applied State.
    ///
    /// Fails with `Error::StalePlan` if the database has moved since the plan was computed.
    pub fn apply(&mut self, plan: &Plan<'_>) -> Result<Option<RevisionId>> {
        self.locked(|migrator| migrator.run(plan))
    }

    /// Migrates to `target`, which must be the current revision or one of its descendants.
    pub fn upgrade(&mut self, target: &Target) -> Result<Option<RevisionId>> {
        self.migrate_towards(target, Some(Direction::Upgrade))
    }

    /// Migrates to `target`, which must be the current revision or one of its ancestors.
    pub fn downgrade(&mut self, target: &Target) -> Result<Option<RevisionId>> {
        self.migrate_towards(target, Some(Direction::Downgrade))
    }

    /// Migrates to `target` in whichever direction it lies.
    pub fn migrate(&mut self, target: &Target) -> Result<Option<RevisionId>> {
        self.migrate_towards(target, None)
    }

    /// Records `target` as the Applied State without running any operations, for databases
    /// whose schema was brought up to date by other means.
    pub fn stamp(&mut self, target: &Target) -> Result<Option<RevisionId>> {
        self.locked(|migrator| {
            let current = migrator.current()?;
            let version = planner::resolve_target(migrator.graph, current.as_ref(), target)?;
            let mut transaction = migrator
                .backend
                .begin()
                .map_err(|error| Error::state_store("failed to begin transaction", error))?;
            transaction
                .write(version.as_ref())
                .and_then(|()| transaction.commit())
                .map_err(|error| {
                    Error::state_store(
                        format!("failed to stamp schema version {}", Base(&version)),
                        error,
                    )
                })?;
            info!("Stamped database at {}", Base(&version));
            Ok(version)
        })
    }

    fn migrate_towards(
        &mut self,
        target: &Target,
        direction: Option<Direction>,
    ) -> Result<Option<RevisionId>> {
        self.locked(|migrator| {
            let current = migrator.current()?;
            let plan = planner::plan(migrator.graph, current.as_ref(), target)?;
            if let Some(direction) = direction {
                if !plan.is_empty() && plan.direction() != direction {
                    return Err(Error::WrongDirection {
                        direction,
                        current,
                        target: plan.to().cloned(),
                    });
                }
            }
            migrator.run(&plan)
        })
    }

    /// Runs `body` while holding the backend's migration lock, releasing it on every path.
    fn locked<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.backend
            .lock()
            .map_err(|error| Error::state_store("failed to acquire the migration lock", error))?;
        let result = body(self);
        let released = self
            .backend
            .unlock()
            .map_err(|error| Error::state_store("failed to release the migration lock", error));
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(error), _) => Err(error),
            (Ok(_), Err(error)) => Err(error),
        }
    }

    fn run(&mut self, plan: &Plan<'_>) -> Result<Option<RevisionId>> {
        let found = self.current()?;
        if found.as_ref() != plan.from() {
            return Err(Error::StalePlan {
                expected: plan.from().cloned(),
                found,
            });
        }
        if plan.is_empty() {
            info!("Database is already at {}", Base(&found));
            return Ok(found);
        }

        let mut applied = found;
        for step in plan.steps() {
            if self.is_cancelled() {
                warn!("Migration cancelled with the database at {}", Base(&applied));
                return Err(Error::Halted {
                    last_applied: applied,
                    source: Box::new(Error::Cancelled),
                });
            }
            if let Err(error) = self.run_step(step) {
                warn!(%error, "Migration halted with the database at {}", Base(&applied));
                return Err(Error::Halted {
                    last_applied: applied,
                    source: Box::new(error),
                });
            }
            applied = step.resulting_state().cloned();
            info!("Ran {}", step);
        }
        Ok(applied)
    }

    fn run_step(&mut self, step: &Step<'_>) -> Result<()> {
        let revision = step.revision().id();
        let mut transaction = self.backend.begin().map_err(|error| {
            Error::state_store(
                format!("failed to begin transaction for revision {}", revision),
                error,
            )
        })?;
        for operation in step.operations() {
            transaction
                .execute(operation)
                .map_err(|source| Error::SchemaApply {
                    revision: revision.clone(),
                    operation: operation.to_string(),
                    source,
                })?;
        }
        transaction
            .write(step.resulting_state())
            .map_err(|error| {
                Error::state_store(
                    format!(
                        "failed to record schema version {}",
                        Base(&step.resulting_state().cloned())
                    ),
                    error,
                )
            })?;
        transaction.commit().map_err(|source| Error::SchemaApply {
            revision: revision.clone(),
            operation: "commit the transaction".to_owned(),
            source,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }
}
