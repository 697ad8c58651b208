pub mod r7573241a5156_initial;
pub mod r9d60d35786c1_added_index_image_resolved;

use stepladder::revision::Revision;

/// Every revision of the iib schema. Record new revisions here.
pub fn all() -> Vec<Revision> {
    vec![
        r7573241a5156_initial::revision(),
        r9d60d35786c1_added_index_image_resolved::revision(),
    ]
}
