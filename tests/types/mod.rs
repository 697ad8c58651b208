use stepladder::operation::{Column, ColumnType};
use stepladder::revision::Revision;

pub fn good_revision_1() -> Revision {
    Revision::new("1992060215", None::<&str>)
        .message("create data")
        .upgrade_reversible(|ops| {
            ops.create_table(
                "data",
                vec![Column::new("good_revision_1_ran", ColumnType::Boolean).not_null()],
            );
        })
}

// this revision depends on good_revision_1 having been run
pub fn good_revision_2() -> Revision {
    Revision::new("1993060215", Some("1992060215"))
        .message("add good_revision_2_ran")
        .upgrade_reversible(|ops| {
            ops.add_column(
                "data",
                Column::new("good_revision_2_ran", ColumnType::Boolean),
            );
        })
}

// references a table nobody creates, so its upgrade fails
pub fn bad_revision(parent: &str) -> Revision {
    Revision::new("1994060215", Some(parent))
        .message("reference missing table")
        .upgrade(|ops| {
            ops.add_column("data", Column::new("batch_id", ColumnType::Integer))
                .create_foreign_key("batch_fkey", "data", "batch", &["batch_id"], &["id"]);
        })
        .downgrade(|ops| {
            ops.drop_foreign_key("data", "batch_fkey")
                .drop_column("data", "batch_id");
        })
}

// this revision has a valid upgrade but its downgrade will fail
pub fn good_up_bad_down_revision(parent: &str) -> Revision {
    Revision::new("1995060215", Some(parent))
        .message("independent data")
        .upgrade(|ops| {
            ops.create_table(
                "independent_data",
                vec![Column::new("ran", ColumnType::Boolean)],
            );
        })
        .downgrade(|ops| {
            ops.drop_table("no_such_table");
        })
}
