//! Initial schema.

use stepladder::operation::{Column, ColumnType};
use stepladder::revision::Revision;

pub fn revision() -> Revision {
    Revision::new("7573241a5156", None::<&str>)
        .message("Initial schema.")
        .created("2021-01-26 10:02:41.803102")
        .upgrade_reversible(|ops| {
            ops.create_table(
                "image",
                vec![
                    Column::new("id", ColumnType::Integer).primary_key(),
                    Column::new("pull_specification", ColumnType::Text).not_null(),
                ],
            )
            .create_table(
                "request_add",
                vec![
                    Column::new("id", ColumnType::Integer).primary_key(),
                    Column::new("bundles", ColumnType::Text),
                ],
            )
            .create_table(
                "request_rm",
                vec![
                    Column::new("id", ColumnType::Integer).primary_key(),
                    Column::new("operators", ColumnType::Text),
                ],
            );
        })
}
