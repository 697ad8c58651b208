//! Schema migrations organised as a graph of revisions.
//!
//! Each `Revision` names its parent and carries the operations that move a schema forward and
//! back. A `RevisionGraph` holds every revision an application knows about; the `planner` turns
//! a target into an ordered plan and the `executor` applies that plan to a `Backend`, one
//! transaction per revision, recording the Applied State as it goes.

pub mod backend;
pub mod batch;
pub mod cli;
pub mod config;
pub mod executor;
pub mod memory;
pub mod operation;
pub mod planner;
pub mod postgres_backend;
pub mod revision;
pub mod revision_graph;

mod error;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

pub use error::{BackendError, Error};
pub use revision::{Revision, RevisionId};

// A type alias for the result type used by most of the methods in this crate's API.
pub type Result<T> = std::result::Result<T, Error>;

/// Creates a new, empty revision file in `revisions_dir` and returns its path. The file defines a
/// `revision()` function returning the `Revision`; register it with the application's
/// `RevisionGraph` to make it part of the chain.
///
/// # Examples:
///
/// ```no_run
/// use std::path::Path;
///
/// let revisions_dir = Path::new("src/db/revisions/");
/// match stepladder::create_revision("Added index_image_resolved", None, revisions_dir) {
///     Ok(path) => println!("Created new revision {}", path.display()),
///     Err(error) => println!("Error creating new revision: {}", error),
/// }
/// ```
pub fn create_revision(
    message: &str,
    parent: Option<&RevisionId>,
    revisions_dir: &Path,
) -> io::Result<PathBuf> {
    let id = new_revision_id();
    let file_name = format!("r{}_{}.rs", id, slug(message));
    fs::create_dir_all(revisions_dir)?;
    let path = revisions_dir.join(file_name);
    {
        let mut file = File::create(&path)?;
        file.write_all(revision_template(&id, parent, message).as_bytes())?;
    }
    info!(revision = %id, path = %path.display(), "created revision");
    Ok(path)
}

/// Twelve hex digits taken from a random UUID.
fn new_revision_id() -> RevisionId {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    RevisionId::new(&uuid[uuid.len() - 12..])
}

/// Turns "Added index_image_resolved." into "added_index_image_resolved".
fn slug(message: &str) -> String {
    let mut slug = String::with_capacity(message.len());
    for character in message.chars().flat_map(char::to_lowercase) {
        if character.is_ascii_alphanumeric() {
            slug.push(character);
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
        if slug.len() >= 40 {
            break;
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "revision".to_owned()
    } else {
        slug.to_owned()
    }
}

/// Fills in the boilerplate of a new revision file.
fn revision_template(id: &RevisionId, parent: Option<&RevisionId>, message: &str) -> String {
    let parent = match parent {
        Some(parent) => format!("Some(\"{}\")", parent),
        None => "None::<&str>".to_owned(),
    };
    format!(
        "\
//! {message}

use stepladder::revision::Revision;

pub fn revision() -> Revision {{
    Revision::new(\"{id}\", {parent})
        .message({message:?})
        .created(\"{created}\")
        .upgrade(|ops| {{
            // Your operations here.
            let _ = ops;
        }})
        .downgrade(|ops| {{
            // Your operations here, undoing the upgrade in reverse order.
            let _ = ops;
        }})
}}
",
        message = message,
        id = id,
        parent = parent,
        created = Local::now().naive_local().format(revision::CREATED_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_messages() {
        assert_eq!(slug("Added index_image_resolved."), "added_index_image_resolved");
        assert_eq!(slug("  --  "), "revision");
        assert!(slug(&"long ".repeat(30)).len() <= 40);
    }

    #[test]
    fn revision_ids_are_twelve_hex_digits() {
        let id = new_revision_id();
        assert_eq!(id.as_str().len(), 12);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn writes_revision_file() {
        let dir = tempfile::tempdir().unwrap();
        let parent = RevisionId::new("9d60d35786c1");
        let path = create_revision("Add batch table", Some(&parent), dir.path()).unwrap();

        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with('r'));
        assert!(file_name.ends_with("_add_batch_table.rs"));

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Some(\"9d60d35786c1\")"));
        assert!(contents.contains(".message(\"Add batch table\")"));
        assert!(contents.contains(&format!("Revision::new(\"{}\"", &file_name[1..13])));
    }
}
