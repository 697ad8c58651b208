#[path = "../demos/iib/revisions/mod.rs"]
mod iib;
mod types;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use assert_matches::assert_matches;

use stepladder::backend::Backend;
use stepladder::executor::Migrator;
use stepladder::memory::{verify_reversibility, MemoryBackend};
use stepladder::operation::{Column, ColumnType, Operation};
use stepladder::planner::{self, Direction, Target};
use stepladder::postgres_backend::VersionTable;
use stepladder::revision::Revision;
use stepladder::revision_graph::RevisionGraph;
use stepladder::{Error, RevisionId};

use types::{bad_revision, good_revision_1, good_revision_2, good_up_bad_down_revision};

const INITIAL: &str = "7573241a5156";
const INDEX_RESOLVED: &str = "9d60d35786c1";

fn iib_graph() -> RevisionGraph {
    RevisionGraph::new(iib::all()).unwrap()
}

fn target(id: &str) -> Target {
    Target::Revision(RevisionId::new(id))
}

fn version(migrator: &mut Migrator<'_, MemoryBackend>) -> Option<String> {
    migrator.current().unwrap().map(|id| id.to_string())
}

#[test]
fn can_run_revisions_from_empty_database() {
    let graph = iib_graph();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    let applied = migrator.upgrade(&Target::Head).unwrap();
    assert_eq!(applied, Some(RevisionId::new(INDEX_RESOLVED)));

    let schema = migrator.backend().schema();
    for table in ["request_add", "request_rm"] {
        let table = schema.table(table).unwrap();
        let column = table.column("index_resolved_id").unwrap();
        assert!(column.nullable);
        let foreign_key = table.foreign_key("index_resolved_id_fkey").unwrap();
        assert_eq!(foreign_key.referent_table, "image");
        assert_eq!(foreign_key.referent_columns, vec!["id".to_owned()]);
    }
}

#[test]
fn plan_from_none_runs_every_revision_forward() {
    let graph = iib_graph();
    let plan = planner::plan(&graph, None, &target(INDEX_RESOLVED)).unwrap();
    assert_eq!(plan.direction(), Direction::Upgrade);

    let steps: Vec<&str> = plan
        .steps()
        .iter()
        .map(|step| step.revision().id().as_str())
        .collect();
    assert_eq!(steps, vec![INITIAL, INDEX_RESOLVED]);

    let expected: Vec<&Operation> = graph
        .resolve(INITIAL)
        .unwrap()
        .upgrade_operations()
        .iter()
        .chain(graph.resolve(INDEX_RESOLVED).unwrap().upgrade_operations())
        .collect();
    assert_eq!(plan.operations().collect::<Vec<_>>(), expected);
}

#[test]
fn downgrade_undoes_index_resolved_in_reverse_order() {
    let graph = iib_graph();
    let current = RevisionId::new(INDEX_RESOLVED);
    let plan = planner::plan(&graph, Some(&current), &target(INITIAL)).unwrap();
    assert_eq!(plan.direction(), Direction::Downgrade);
    assert_eq!(plan.steps().len(), 1);

    let described: Vec<String> = plan.operations().map(|op| op.to_string()).collect();
    assert_eq!(
        described,
        vec![
            "drop foreign key index_resolved_id_fkey on request_rm",
            "drop column request_rm.index_resolved_id",
            "drop foreign key index_resolved_id_fkey on request_add",
            "drop column request_add.index_resolved_id",
        ]
    );

    // the backward operations are the exact inverse of the forward ones
    let revision = graph.resolve(INDEX_RESOLVED).unwrap();
    let inverse: Vec<Operation> = revision
        .upgrade_operations()
        .iter()
        .rev()
        .filter_map(Operation::inverse)
        .collect();
    assert_eq!(revision.downgrade_operations(), inverse.as_slice());
}

#[test]
fn plan_to_current_revision_is_empty() {
    let graph = iib_graph();
    for revision in graph.iter() {
        let plan = planner::plan(&graph, Some(revision.id()), &target(revision.id().as_str()))
            .unwrap();
        assert!(plan.is_empty());
    }
}

#[test]
fn round_trip_restores_applied_state() {
    let graph = iib_graph();
    let pairs = [
        (None, Some(INITIAL)),
        (None, Some(INDEX_RESOLVED)),
        (Some(INITIAL), Some(INDEX_RESOLVED)),
        (Some(INDEX_RESOLVED), None),
        (Some(INDEX_RESOLVED), Some(INITIAL)),
        (Some(INITIAL), None),
    ];
    for (start, end) in pairs {
        let mut migrator = Migrator::new(&graph, MemoryBackend::new());
        if let Some(start) = start {
            migrator.migrate(&target(start)).unwrap();
        }
        let schema_before = migrator.backend().schema().clone();

        let end_target = end.map_or(Target::Base, target);
        let start_target = start.map_or(Target::Base, target);
        migrator.migrate(&end_target).unwrap();
        assert_eq!(version(&mut migrator).as_deref(), end);
        migrator.migrate(&start_target).unwrap();
        assert_eq!(version(&mut migrator).as_deref(), start);
        assert_eq!(migrator.backend().schema(), &schema_before);
    }
}

#[test]
fn can_rollback_revisions_sequentially() {
    let graph = RevisionGraph::new(vec![good_revision_1(), good_revision_2()]).unwrap();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    migrator.upgrade(&Target::Head).unwrap();

    // check that only the last revision was rolled back
    migrator.downgrade(&Target::Relative(-1)).unwrap();
    let data = migrator.backend().schema().table("data").unwrap();
    let columns: Vec<&str> = data.columns().map(|column| column.name.as_str()).collect();
    assert_eq!(columns, vec!["good_revision_1_ran"]);
    assert_eq!(version(&mut migrator).as_deref(), Some("1992060215"));

    // now everything should be rolled back
    migrator.downgrade(&Target::Relative(-1)).unwrap();
    assert!(migrator.backend().schema().is_empty());
    assert_eq!(version(&mut migrator), None);
}

#[test]
fn unknown_target_performs_no_mutations() {
    let graph = iib_graph();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    let error = migrator.upgrade(&target("deadbeef0000")).unwrap_err();
    assert_matches!(error, Error::UnknownRevision(ref id) if id == "deadbeef0000");
    assert!(error.last_applied().is_none());

    let backend = migrator.backend();
    assert!(backend.executed().is_empty());
    assert!(backend.schema().is_empty());
    assert!(backend.version().is_none());
    assert!(!backend.is_locked());
}

#[test]
fn applying_the_same_step_twice_is_a_schema_error() {
    let graph = iib_graph();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    migrator.upgrade(&Target::Head).unwrap();

    // pretend the last revision never ran, without undoing it
    migrator.stamp(&target(INITIAL)).unwrap();
    let error = migrator.upgrade(&Target::Head).unwrap_err();
    assert_matches!(
        error.root(),
        Error::SchemaApply { revision, .. } if revision.as_str() == INDEX_RESOLVED
    );
    assert_eq!(error.last_applied(), Some(Some(&RevisionId::new(INITIAL))));
    assert_eq!(version(&mut migrator).as_deref(), Some(INITIAL));
}

#[test]
fn failure_mid_plan_keeps_completed_revisions() {
    let graph = RevisionGraph::new(vec![
        good_revision_1(),
        bad_revision("1992060215"),
        good_up_bad_down_revision("1994060215"),
    ])
    .unwrap();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    let error = migrator.upgrade(&Target::Head).unwrap_err();

    assert_matches!(error.root(), Error::SchemaApply { operation, .. }
        if operation == "add foreign key batch_fkey on data referencing batch");
    assert_eq!(error.last_applied(), Some(Some(&RevisionId::new("1992060215"))));
    assert_eq!(version(&mut migrator).as_deref(), Some("1992060215"));

    // the failed revision was rolled back as a unit
    let data = migrator.backend().schema().table("data").unwrap();
    assert!(data.column("batch_id").is_none());
    assert!(migrator.backend().schema().table("independent_data").is_none());
    assert!(!migrator.backend().is_locked());
}

#[test]
fn failing_downgrade_leaves_revision_applied() {
    let graph =
        RevisionGraph::new(vec![good_revision_1(), good_up_bad_down_revision("1992060215")])
            .unwrap();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    migrator.upgrade(&Target::Head).unwrap();

    let error = migrator.downgrade(&Target::Base).unwrap_err();
    assert_matches!(error.root(), Error::SchemaApply { .. });
    assert_eq!(error.last_applied(), Some(Some(&RevisionId::new("1995060215"))));
    assert!(migrator.backend().schema().table("independent_data").is_some());
}

#[test]
fn upgrade_refuses_to_go_backwards() {
    let graph = iib_graph();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    migrator.upgrade(&Target::Head).unwrap();

    let error = migrator.upgrade(&target(INITIAL)).unwrap_err();
    assert_matches!(error, Error::WrongDirection { direction: Direction::Upgrade, .. });
    // already there, so an empty plan in either direction
    let version = migrator.downgrade(&Target::Head).unwrap();
    assert_eq!(version, Some(RevisionId::new(INDEX_RESOLVED)));
}

#[test]
fn stale_plan_is_rejected() {
    let graph = iib_graph();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    let plan = migrator.plan(&Target::Head).unwrap();
    migrator.upgrade(&target(INITIAL)).unwrap();

    let error = migrator.apply(&plan).unwrap_err();
    assert_matches!(error, Error::StalePlan { expected: None, .. });
    assert_eq!(version(&mut migrator).as_deref(), Some(INITIAL));
}

#[test]
fn cancellation_stops_before_the_next_step() {
    let graph = iib_graph();
    let cancel = Arc::new(AtomicBool::new(true));
    let mut migrator = Migrator::new(&graph, MemoryBackend::new()).with_cancel_flag(cancel);

    let error = migrator.upgrade(&Target::Head).unwrap_err();
    assert_matches!(error.root(), Error::Cancelled);
    assert_eq!(error.last_applied(), Some(None));
    assert!(migrator.backend().executed().is_empty());
}

#[test]
fn held_lock_blocks_migration() {
    let graph = iib_graph();
    let mut backend = MemoryBackend::new();
    backend.lock().unwrap();
    let mut migrator = Migrator::new(&graph, backend);

    let error = migrator.upgrade(&Target::Head).unwrap_err();
    assert_matches!(error, Error::StateStore { .. });
    assert!(migrator.backend().schema().is_empty());
}

fn backfilled_column(parent: &str) -> Revision {
    Revision::new("1996060215", Some(parent))
        .message("backfill data")
        .upgrade_reversible(|ops| {
            ops.add_column("data", Column::new("backfilled", ColumnType::Integer))
                .execute("UPDATE data SET backfilled = 0");
        })
}

#[test]
fn raw_sql_needs_an_explicit_downgrade() {
    let error =
        RevisionGraph::new(vec![good_revision_1(), backfilled_column("1992060215")]).unwrap_err();
    assert_matches!(error, Error::MissingDowngrade(ref id) if id.as_str() == "1996060215");

    let revision = backfilled_column("1992060215").downgrade(|ops| {
        ops.drop_column("data", "backfilled");
    });
    let graph = RevisionGraph::new(vec![good_revision_1(), revision]).unwrap();
    let mut migrator = Migrator::new(&graph, MemoryBackend::new());
    migrator.upgrade(&Target::Head).unwrap();
    migrator.downgrade(&Target::Relative(-1)).unwrap();

    assert_eq!(version(&mut migrator).as_deref(), Some("1992060215"));
    let data = migrator.backend().schema().table("data").unwrap();
    assert!(data.column("backfilled").is_none());
}

#[test]
fn iib_revisions_are_reversible() {
    assert_eq!(verify_reversibility(&iib_graph()).unwrap(), 2);
}

#[test]
fn offline_downgrade_script() {
    let graph = iib_graph();
    let current = RevisionId::new(INDEX_RESOLVED);
    let plan = planner::plan(&graph, Some(&current), &target(INITIAL)).unwrap();
    let script = plan.to_sql(&VersionTable::default());

    assert!(script.starts_with(
        "-- Running downgrade 9d60d35786c1 -> 7573241a5156, Added index_image_resolved.\n"
    ));
    let drop_rm = script
        .find("ALTER TABLE \"request_rm\" DROP CONSTRAINT \"index_resolved_id_fkey\";")
        .unwrap();
    let drop_add = script
        .find("ALTER TABLE \"request_add\" DROP COLUMN \"index_resolved_id\";")
        .unwrap();
    assert!(drop_rm < drop_add);
    assert!(script.contains("VALUES ('7573241a5156');"));
    assert!(script.trim_end().ends_with("COMMIT;"));
}
