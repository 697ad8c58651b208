//! Structural schema changes and their PostgreSQL rendering.

use std::fmt::{self, Display};

use crate::batch::BatchAlterTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    Boolean,
    Text,
    /// `VARCHAR`, with an optional length.
    String(Option<u32>),
    Timestamp,
}
impl ColumnType {
    pub fn to_sql(&self) -> String {
        match *self {
            ColumnType::Integer => "INTEGER".to_owned(),
            ColumnType::BigInteger => "BIGINT".to_owned(),
            ColumnType::Boolean => "BOOLEAN".to_owned(),
            ColumnType::Text => "TEXT".to_owned(),
            ColumnType::String(Some(length)) => format!("VARCHAR({})", length),
            ColumnType::String(None) => "VARCHAR".to_owned(),
            ColumnType::Timestamp => "TIMESTAMP WITHOUT TIME ZONE".to_owned(),
        }
    }
}

/// A column definition. Columns are nullable unless marked otherwise; primary key columns are
/// always `NOT NULL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}
impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    fn definition_sql(&self) -> String {
        let mut sql = format!("{} {}", quote(&self.name), self.column_type.to_sql());
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// A single structural change against the target schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateTable {
        table: String,
        columns: Vec<Column>,
    },
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    DropColumn {
        table: String,
        column: String,
    },
    AddForeignKey {
        name: String,
        table: String,
        columns: Vec<String>,
        referent_table: String,
        referent_columns: Vec<String>,
    },
    DropForeignKey {
        table: String,
        name: String,
    },
    /// Free-form SQL, typically a data migration. Opaque to the engine and to `inverse`.
    Execute {
        sql: String,
    },
}
impl Operation {
    /// The operation that undoes this one, where it can be derived from this operation alone.
    pub fn inverse(&self) -> Option<Operation> {
        match *self {
            Operation::CreateTable { ref table, .. } => Some(Operation::DropTable {
                table: table.clone(),
            }),
            Operation::AddColumn {
                ref table,
                ref column,
            } => Some(Operation::DropColumn {
                table: table.clone(),
                column: column.name.clone(),
            }),
            Operation::AddForeignKey {
                ref name,
                ref table,
                ..
            } => Some(Operation::DropForeignKey {
                table: table.clone(),
                name: name.clone(),
            }),
            Operation::DropTable { .. }
            | Operation::DropColumn { .. }
            | Operation::DropForeignKey { .. }
            | Operation::Execute { .. } => None,
        }
    }

    /// Renders this operation as a single PostgreSQL statement, without a trailing semicolon.
    pub fn to_sql(&self) -> String {
        match *self {
            Operation::CreateTable {
                ref table,
                ref columns,
            } => {
                let mut definitions: Vec<String> =
                    columns.iter().map(Column::definition_sql).collect();
                let primary_key: Vec<&str> = columns
                    .iter()
                    .filter(|column| column.primary_key)
                    .map(|column| column.name.as_str())
                    .collect();
                if !primary_key.is_empty() {
                    definitions.push(format!("PRIMARY KEY ({})", quote_list(&primary_key)));
                }
                format!(
                    "CREATE TABLE {} (\n    {}\n)",
                    quote(table),
                    definitions.join(",\n    ")
                )
            }
            Operation::DropTable { ref table } => format!("DROP TABLE {}", quote(table)),
            Operation::AddColumn {
                ref table,
                ref column,
            } => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote(table),
                column.definition_sql()
            ),
            Operation::DropColumn {
                ref table,
                ref column,
            } => format!("ALTER TABLE {} DROP COLUMN {}", quote(table), quote(column)),
            Operation::AddForeignKey {
                ref name,
                ref table,
                ref columns,
                ref referent_table,
                ref referent_columns,
            } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote(table),
                quote(name),
                quote_list(columns),
                quote(referent_table),
                quote_list(referent_columns)
            ),
            Operation::DropForeignKey {
                ref table,
                ref name,
            } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                quote(table),
                quote(name)
            ),
            Operation::Execute { ref sql } => sql.trim().trim_end_matches(';').to_owned(),
        }
    }
}
impl Display for Operation {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Operation::CreateTable { ref table, .. } => write!(formatter, "create table {}", table),
            Operation::DropTable { ref table } => write!(formatter, "drop table {}", table),
            Operation::AddColumn {
                ref table,
                ref column,
            } => write!(formatter, "add column {}.{}", table, column.name),
            Operation::DropColumn {
                ref table,
                ref column,
            } => write!(formatter, "drop column {}.{}", table, column),
            Operation::AddForeignKey {
                ref name,
                ref table,
                ref referent_table,
                ..
            } => write!(
                formatter,
                "add foreign key {} on {} referencing {}",
                name, table, referent_table
            ),
            Operation::DropForeignKey {
                ref table,
                ref name,
            } => write!(formatter, "drop foreign key {} on {}", name, table),
            Operation::Execute { .. } => formatter.write_str("execute SQL"),
        }
    }
}

/// Quotes a PostgreSQL identifier.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn quote_list<S: AsRef<str>>(identifiers: &[S]) -> String {
    identifiers
        .iter()
        .map(|identifier| quote(identifier.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects the operations of one direction of a revision, in order.
#[derive(Debug, Default)]
pub struct Operations {
    operations: Vec<Operation>,
}
impl Operations {
    pub fn create_table(&mut self, table: &str, columns: Vec<Column>) -> &mut Self {
        self.push(Operation::CreateTable {
            table: table.to_owned(),
            columns,
        })
    }

    pub fn drop_table(&mut self, table: &str) -> &mut Self {
        self.push(Operation::DropTable {
            table: table.to_owned(),
        })
    }

    pub fn add_column(&mut self, table: &str, column: Column) -> &mut Self {
        self.push(Operation::AddColumn {
            table: table.to_owned(),
            column,
        })
    }

    pub fn drop_column(&mut self, table: &str, column: &str) -> &mut Self {
        self.push(Operation::DropColumn {
            table: table.to_owned(),
            column: column.to_owned(),
        })
    }

    pub fn create_foreign_key(
        &mut self,
        name: &str,
        table: &str,
        referent_table: &str,
        columns: &[&str],
        referent_columns: &[&str],
    ) -> &mut Self {
        self.push(Operation::AddForeignKey {
            name: name.to_owned(),
            table: table.to_owned(),
            columns: columns.iter().map(|column| (*column).to_owned()).collect(),
            referent_table: referent_table.to_owned(),
            referent_columns: referent_columns
                .iter()
                .map(|column| (*column).to_owned())
                .collect(),
        })
    }

    pub fn drop_foreign_key(&mut self, table: &str, name: &str) -> &mut Self {
        self.push(Operation::DropForeignKey {
            table: table.to_owned(),
            name: name.to_owned(),
        })
    }

    pub fn execute(&mut self, sql: &str) -> &mut Self {
        self.push(Operation::Execute {
            sql: sql.to_owned(),
        })
    }

    /// Opens a batch of changes against one table. The changes recorded inside `build` are
    /// appended, in order, once it returns; if it unwinds, none of them are.
    pub fn batch_alter_table<F: FnOnce(&mut BatchAlterTable)>(
        &mut self,
        table: &str,
        build: F,
    ) -> &mut Self {
        let mut batch = BatchAlterTable::new(table);
        build(&mut batch);
        self.operations.extend(batch.finish());
        self
    }

    /// The inverse of every collected operation, in reverse order, or `None` if any operation
    /// has no inverse.
    pub fn inverse(&self) -> Option<Vec<Operation>> {
        self.operations.iter().rev().map(Operation::inverse).collect()
    }

    pub fn into_vec(self) -> Vec<Operation> {
        self.operations
    }

    fn push(&mut self, operation: Operation) -> &mut Self {
        self.operations.push(operation);
        self
    }
}
