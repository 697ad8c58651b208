//! Added index_image_resolved.

use stepladder::operation::{Column, ColumnType};
use stepladder::revision::Revision;

pub fn revision() -> Revision {
    Revision::new("9d60d35786c1", Some("7573241a5156"))
        .message("Added index_image_resolved.")
        .created("2021-02-11 15:48:27.192389")
        .upgrade(|ops| {
            ops.batch_alter_table("request_add", |batch| {
                batch.add_column(Column::new("index_resolved_id", ColumnType::Integer));
                batch.create_foreign_key(
                    "index_resolved_id_fkey",
                    "image",
                    &["index_resolved_id"],
                    &["id"],
                );
            });
            ops.batch_alter_table("request_rm", |batch| {
                batch.add_column(Column::new("index_resolved_id", ColumnType::Integer));
                batch.create_foreign_key(
                    "index_resolved_id_fkey",
                    "image",
                    &["index_resolved_id"],
                    &["id"],
                );
            });
        })
        .downgrade(|ops| {
            ops.batch_alter_table("request_rm", |batch| {
                batch.drop_foreign_key("index_resolved_id_fkey");
                batch.drop_column("index_resolved_id");
            });
            ops.batch_alter_table("request_add", |batch| {
                batch.drop_foreign_key("index_resolved_id_fkey");
                batch.drop_column("index_resolved_id");
            });
        })
}
