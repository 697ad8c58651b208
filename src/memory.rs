//! An in-memory model of a relational schema.
//!
//! `MemoryBackend` enforces the same structural rules PostgreSQL does for the operations this
//! crate emits: duplicate tables or columns are rejected, and so are dangling foreign keys and
//! drops of anything another table still references. It backs the test suite, `check`, and dry
//! runs that should not need a live database.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::backend::{Backend, StateStore, Transaction};
use crate::error::{BackendError, Error};
use crate::operation::{Column, Operation};
use crate::revision::RevisionId;
use crate::revision_graph::RevisionGraph;
use crate::Result;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("relation {0:?} already exists")]
    TableExists(String),
    #[error("relation {0:?} does not exist")]
    TableMissing(String),
    #[error("column {column:?} of relation {table:?} already exists")]
    ColumnExists { table: String, column: String },
    #[error("column {column:?} of relation {table:?} does not exist")]
    ColumnMissing { table: String, column: String },
    #[error("constraint {name:?} for relation {table:?} already exists")]
    ConstraintExists { table: String, name: String },
    #[error("constraint {name:?} of relation {table:?} does not exist")]
    ConstraintMissing { table: String, name: String },
    #[error("foreign key {name:?} has {columns} columns but references {referent_columns}")]
    ColumnCountMismatch {
        name: String,
        columns: usize,
        referent_columns: usize,
    },
    #[error("cannot drop {object:?} because constraint {constraint:?} on {table:?} depends on it")]
    StillReferenced {
        object: String,
        table: String,
        constraint: String,
    },
    #[error("migration lock is already held")]
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub referent_table: String,
    pub referent_columns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: BTreeMap<String, Column>,
    foreign_keys: BTreeMap<String, ForeignKey>,
}
impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.get(name)
    }
}

/// Tables, columns and foreign keys, without any data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<String, Table>,
}
impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Applies one operation, leaving the schema untouched if it is rejected.
    pub fn apply(&mut self, operation: &Operation) -> std::result::Result<(), SchemaError> {
        match *operation {
            Operation::CreateTable {
                ref table,
                ref columns,
            } => {
                if self.tables.contains_key(table) {
                    return Err(SchemaError::TableExists(table.clone()));
                }
                let mut created = Table::default();
                for column in columns {
                    if created
                        .columns
                        .insert(column.name.clone(), column.clone())
                        .is_some()
                    {
                        return Err(SchemaError::ColumnExists {
                            table: table.clone(),
                            column: column.name.clone(),
                        });
                    }
                }
                self.tables.insert(table.clone(), created);
            }
            Operation::DropTable { ref table } => {
                self.table_mut(table)?;
                self.ensure_unreferenced(table, None)?;
                self.tables.remove(table);
            }
            Operation::AddColumn {
                ref table,
                ref column,
            } => {
                let target = self.table_mut(table)?;
                if target.columns.contains_key(&column.name) {
                    return Err(SchemaError::ColumnExists {
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                target.columns.insert(column.name.clone(), column.clone());
            }
            Operation::DropColumn {
                ref table,
                ref column,
            } => {
                if self.table_mut(table)?.column(column).is_none() {
                    return Err(SchemaError::ColumnMissing {
                        table: table.clone(),
                        column: column.clone(),
                    });
                }
                self.ensure_unreferenced(table, Some(column))?;
                let target = self.table_mut(table)?;
                // constraints on the dropped column go with it
                target.foreign_keys.retain(|_, foreign_key| {
                    !foreign_key.columns.contains(column)
                        && !(foreign_key.referent_table == *table
                            && foreign_key.referent_columns.contains(column))
                });
                target.columns.remove(column);
            }
            Operation::AddForeignKey {
                ref name,
                ref table,
                ref columns,
                ref referent_table,
                ref referent_columns,
            } => {
                if columns.len() != referent_columns.len() {
                    return Err(SchemaError::ColumnCountMismatch {
                        name: name.clone(),
                        columns: columns.len(),
                        referent_columns: referent_columns.len(),
                    });
                }
                let referent = self
                    .tables
                    .get(referent_table)
                    .ok_or_else(|| SchemaError::TableMissing(referent_table.clone()))?;
                require_columns(referent_table, referent, referent_columns)?;
                let target = self.table_mut(table)?;
                require_columns(table, target, columns)?;
                if target.foreign_keys.contains_key(name) {
                    return Err(SchemaError::ConstraintExists {
                        table: table.clone(),
                        name: name.clone(),
                    });
                }
                target.foreign_keys.insert(
                    name.clone(),
                    ForeignKey {
                        columns: columns.clone(),
                        referent_table: referent_table.clone(),
                        referent_columns: referent_columns.clone(),
                    },
                );
            }
            Operation::DropForeignKey {
                ref table,
                ref name,
            } => {
                if self.table_mut(table)?.foreign_keys.remove(name).is_none() {
                    return Err(SchemaError::ConstraintMissing {
                        table: table.clone(),
                        name: name.clone(),
                    });
                }
            }
            // raw SQL is opaque to the model
            Operation::Execute { .. } => {}
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> std::result::Result<&mut Table, SchemaError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| SchemaError::TableMissing(table.to_owned()))
    }

    /// Fails if a foreign key on another table points at `table`, or at `column` of it.
    fn ensure_unreferenced(
        &self,
        table: &str,
        column: Option<&String>,
    ) -> std::result::Result<(), SchemaError> {
        for (owner_name, owner) in self.tables.iter().filter(|(name, _)| *name != table) {
            for (constraint, foreign_key) in owner.foreign_keys.iter() {
                let references = foreign_key.referent_table == table
                    && column.map_or(true, |column| foreign_key.referent_columns.contains(column));
                if references {
                    return Err(SchemaError::StillReferenced {
                        object: match column {
                            Some(column) => format!("{}.{}", table, column),
                            None => table.to_owned(),
                        },
                        table: owner_name.clone(),
                        constraint: constraint.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn require_columns(
    table_name: &str,
    table: &Table,
    columns: &[String],
) -> std::result::Result<(), SchemaError> {
    for column in columns {
        if table.column(column).is_none() {
            return Err(SchemaError::ColumnMissing {
                table: table_name.to_owned(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}

/// A `Backend` whose database is a `Schema` plus the Applied State.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    schema: Schema,
    version: Option<RevisionId>,
    executed: Vec<String>,
    locked: bool,
}
impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn version(&self) -> Option<&RevisionId> {
        self.version.as_ref()
    }

    /// SQL of every committed operation, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}
impl Backend for MemoryBackend {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&mut self) -> std::result::Result<MemoryTransaction<'_>, BackendError> {
        Ok(MemoryTransaction {
            schema: self.schema.clone(),
            version: self.version.clone(),
            executed: Vec::new(),
            backend: self,
        })
    }

    fn lock(&mut self) -> std::result::Result<(), BackendError> {
        if self.locked {
            return Err(SchemaError::Locked.into());
        }
        self.locked = true;
        Ok(())
    }

    fn unlock(&mut self) -> std::result::Result<(), BackendError> {
        self.locked = false;
        Ok(())
    }
}

/// Works on a copy of the schema that replaces the backend's on commit.
pub struct MemoryTransaction<'a> {
    backend: &'a mut MemoryBackend,
    schema: Schema,
    version: Option<RevisionId>,
    executed: Vec<String>,
}
impl StateStore for MemoryTransaction<'_> {
    fn read(&mut self) -> std::result::Result<Option<RevisionId>, BackendError> {
        Ok(self.version.clone())
    }

    fn write(&mut self, version: Option<&RevisionId>) -> std::result::Result<(), BackendError> {
        self.version = version.cloned();
        Ok(())
    }
}
impl Transaction for MemoryTransaction<'_> {
    fn execute(&mut self, operation: &Operation) -> std::result::Result<(), BackendError> {
        let sql = operation.to_sql();
        debug!(%sql, "executing in memory");
        self.schema.apply(operation)?;
        self.executed.push(sql);
        Ok(())
    }

    fn commit(self) -> std::result::Result<(), BackendError> {
        self.backend.schema = self.schema;
        self.backend.version = self.version;
        self.backend.executed.extend(self.executed);
        Ok(())
    }
}

/// Runs every line of `graph` from base to head and back down in memory, checking that each
/// revision's downgrade restores exactly the schema its upgrade started from. Returns the number
/// of distinct revisions checked.
pub fn verify_reversibility(graph: &RevisionGraph) -> Result<usize> {
    let mut checked = HashSet::new();
    for head in graph.heads() {
        let mut chain = graph.ancestry(head.id())?;
        chain.reverse();

        let mut schema = Schema::default();
        let mut snapshots = Vec::with_capacity(chain.len());
        for revision in chain.iter() {
            snapshots.push(schema.clone());
            for operation in revision.upgrade_operations() {
                schema
                    .apply(operation)
                    .map_err(|error| Error::SchemaApply {
                        revision: revision.id().clone(),
                        operation: operation.to_string(),
                        source: error.into(),
                    })?;
            }
        }
        for (revision, before) in chain.iter().rev().zip(snapshots.iter().rev()) {
            for operation in revision.downgrade_operations() {
                schema
                    .apply(operation)
                    .map_err(|error| Error::SchemaApply {
                        revision: revision.id().clone(),
                        operation: operation.to_string(),
                        source: error.into(),
                    })?;
            }
            if schema != *before {
                return Err(Error::Irreversible(revision.id().clone()));
            }
            checked.insert(revision.id().clone());
        }
    }
    Ok(checked.len())
}
