use crate::operation::{Column, Operation};

/// Buffers several changes against a single table.
///
/// A batch is only reachable through `Operations::batch_alter_table`, which flushes it when the
/// scope closure returns. A batch dropped any other way discards its buffered changes. At apply
/// time the whole revision runs inside one transaction, so a batch is never half-applied.
#[derive(Debug)]
pub struct BatchAlterTable {
    table: String,
    pending: Vec<Operation>,
}
impl BatchAlterTable {
    pub(crate) fn new(table: &str) -> Self {
        BatchAlterTable {
            table: table.to_owned(),
            pending: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn add_column(&mut self, column: Column) -> &mut Self {
        self.pending.push(Operation::AddColumn {
            table: self.table.clone(),
            column,
        });
        self
    }

    pub fn drop_column(&mut self, column: &str) -> &mut Self {
        self.pending.push(Operation::DropColumn {
            table: self.table.clone(),
            column: column.to_owned(),
        });
        self
    }

    /// Adds a foreign key from `columns` of this table to `referent_columns` of
    /// `referent_table`.
    pub fn create_foreign_key(
        &mut self,
        name: &str,
        referent_table: &str,
        columns: &[&str],
        referent_columns: &[&str],
    ) -> &mut Self {
        self.pending.push(Operation::AddForeignKey {
            name: name.to_owned(),
            table: self.table.clone(),
            columns: columns.iter().map(|column| (*column).to_owned()).collect(),
            referent_table: referent_table.to_owned(),
            referent_columns: referent_columns
                .iter()
                .map(|column| (*column).to_owned())
                .collect(),
        });
        self
    }

    pub fn drop_foreign_key(&mut self, name: &str) -> &mut Self {
        self.pending.push(Operation::DropForeignKey {
            table: self.table.clone(),
            name: name.to_owned(),
        });
        self
    }

    pub(crate) fn finish(self) -> Vec<Operation> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use crate::operation::{ColumnType, Operations};

    use super::*;

    #[test]
    fn flushes_in_order_on_scope_exit() {
        let mut ops = Operations::default();
        ops.batch_alter_table("request_rm", |batch| {
            batch.drop_foreign_key("index_resolved_id_fkey");
            batch.drop_column("index_resolved_id");
        });
        let operations = ops.into_vec();
        assert_eq!(operations.len(), 2);
        assert_eq!(
            operations[0].to_string(),
            "drop foreign key index_resolved_id_fkey on request_rm"
        );
        assert_eq!(
            operations[1].to_string(),
            "drop column request_rm.index_resolved_id"
        );
    }

    #[test]
    fn unwinding_scope_discards_batch() {
        let mut ops = Operations::default();
        ops.add_column("image", Column::new("arch", ColumnType::Text));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ops.batch_alter_table("request_add", |batch| {
                batch.add_column(Column::new("index_resolved_id", ColumnType::Integer));
                panic!("authoring error");
            });
        }));
        assert!(result.is_err());
        assert_eq!(ops.into_vec().len(), 1);
    }
}
