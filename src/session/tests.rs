use std::sync::Arc;

use crate::config::Config;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::id::IdProvider;
use crate::model::{Cardinality, ElementId, Value};
use crate::session::Session;
use crate::testkit::{self, StubDriver};

fn setup() -> (StubDriver, Session) {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = Graph::new(Arc::new(driver.clone()), Config::small_pools());
    let session = graph.session().expect("session");
    (driver, session)
}

/// Statements that mutate graph data, with id-pool allocations filtered out.
fn write_statements(driver: &StubDriver) -> Vec<String> {
    driver
        .take_statements()
        .into_iter()
        .filter(|s| !s.text.contains("g.nextId"))
        .map(|s| s.text)
        .collect()
}

fn check_invariants(session: &Session) {
    for id in session.vertices.keys() {
        assert!(
            !session.deleted_vertices.contains_key(id),
            "vertex {} is both live and deleted",
            id
        );
    }
    for id in session.edges.keys() {
        assert!(
            !session.deleted_edges.contains_key(id),
            "edge {} is both live and deleted",
            id
        );
    }
    for id in &session.transient_vertices {
        assert!(
            !session.vertex_update_queue.contains(id),
            "transient vertex {} is queued for update",
            id
        );
    }
    for id in &session.transient_edges {
        assert!(
            !session.edge_update_queue.contains(id),
            "transient edge {} is queued for update",
            id
        );
    }
    for vertex in session.vertices.values() {
        let keys: Vec<String> = vertex.property_keys().map(str::to_string).collect();
        for key in keys {
            if vertex.cardinality(&key) == Some(Cardinality::Single) {
                assert_eq!(vertex.properties(&key).len(), 1);
            }
        }
        if !vertex.has_label_deltas() {
            assert_eq!(vertex.match_labels(), vertex.labels());
        }
    }
    for (id, edge) in &session.edges {
        let out = session
            .vertices
            .get(edge.out_id())
            .expect("out endpoint resident");
        assert!(out.out_edges.contains(id), "edge {} missing from out adjacency", id);
        let in_ = session
            .vertices
            .get(edge.in_id())
            .expect("in endpoint resident");
        assert!(in_.in_edges.contains(id), "edge {} missing from in adjacency", id);
    }
}

#[test]
fn add_vertex_stages_a_transient() {
    let (_driver, mut session) = setup();
    let id = session
        .add_vertex(&["Person"], &[("name", Value::from("Alice"))])
        .expect("add vertex");
    let vertex = session.vertex(&id).expect("resident vertex");
    assert!(vertex.is_transient());
    assert_eq!(vertex.labels(), ["Person".to_string()]);
    assert_eq!(session.transient_vertices, vec![id]);
    check_invariants(&session);
}

#[test]
fn commit_orders_creates_before_updates() {
    let (driver, mut session) = setup();
    let a = session.add_vertex(&["Person"], &[]).expect("add a");
    let b = session.add_vertex(&["Person"], &[]).expect("add b");
    session
        .add_edge("KNOWS", &a, &b, &[("since", Value::Int(2020))])
        .expect("add edge");
    session.commit().expect("commit");

    let texts = write_statements(&driver);
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], "CREATE (v:`Person` $vp)");
    assert_eq!(texts[1], "CREATE (v:`Person` $vp)");
    assert_eq!(
        texts[2],
        "MATCH (o:`Person`{id: $oid}), (i:`Person`{id: $iid}) CREATE (o)-[r:`KNOWS` $ep]->(i)"
    );
    assert!(!session.vertex(&a).expect("a").is_transient());
    check_invariants(&session);
}

#[test]
fn commit_orders_deletes_first() {
    let (driver, mut session) = setup();
    let a = session.add_vertex(&["Person"], &[]).expect("add a");
    let b = session.add_vertex(&["Person"], &[]).expect("add b");
    let e = session.add_edge("KNOWS", &a, &b, &[]).expect("add edge");
    session.commit().expect("commit");
    driver.take_statements();

    session.remove_edge(&e).expect("remove edge");
    session.remove_vertex(&b).expect("remove vertex");
    let c = session.add_vertex(&["Person"], &[]).expect("add c");
    session
        .set_vertex_property(&a, Cardinality::Single, "name", Value::from("Alice"))
        .expect("dirty a");
    session.commit().expect("commit");

    let texts = write_statements(&driver);
    assert_eq!(texts.len(), 4);
    assert!(texts[0].ends_with("DELETE r"), "edge delete first: {}", texts[0]);
    assert_eq!(texts[1], "MATCH (v:`Person`{id: $id}) DETACH DELETE v");
    assert_eq!(texts[2], "CREATE (v:`Person` $vp)");
    assert!(texts[3].starts_with("MERGE (v:`Person`{id: $id})"));
    assert!(session.vertex(&c).is_some());
    check_invariants(&session);
}

#[test]
fn transient_vertex_never_queues_updates() {
    let (_driver, mut session) = setup();
    let id = session.add_vertex(&["Person"], &[]).expect("add vertex");
    session
        .set_vertex_property(&id, Cardinality::Single, "name", Value::from("Alice"))
        .expect("set property");
    session.add_label(&id, "Admin").expect("add label");
    assert!(session.vertex_update_queue.is_empty());
    check_invariants(&session);
}

#[test]
fn rollback_discards_transients() {
    let (_driver, mut session) = setup();
    let a = session.add_vertex(&["Person"], &[]).expect("add a");
    let b = session.add_vertex(&["Person"], &[]).expect("add b");
    session.add_edge("KNOWS", &a, &b, &[]).expect("add edge");
    session.rollback().expect("rollback");
    assert_eq!(session.vertex_count(), 0);
    assert_eq!(session.edge_count(), 0);
    check_invariants(&session);
}

#[test]
fn rollback_restores_modified_properties() {
    let (_driver, mut session) = setup();
    let id = session
        .add_vertex(&["Person"], &[("name", Value::from("Alice"))])
        .expect("add vertex");
    session.commit().expect("commit");

    session
        .set_vertex_property(&id, Cardinality::Single, "name", Value::from("Bob"))
        .expect("set property");
    session.rollback().expect("rollback");

    let vertex = session.vertex(&id).expect("vertex survives rollback");
    assert_eq!(
        vertex.property("name").expect("single value"),
        Some(&Value::from("Alice"))
    );
    check_invariants(&session);
}

#[test]
fn rollback_restores_deleted_elements_and_adjacency() {
    let (_driver, mut session) = setup();
    let a = session.add_vertex(&["Person"], &[]).expect("add a");
    let b = session.add_vertex(&["Person"], &[]).expect("add b");
    let e = session.add_edge("KNOWS", &a, &b, &[]).expect("add edge");
    session.commit().expect("commit");

    // Implicit edge deletion through the vertex.
    session.remove_vertex(&b).expect("remove vertex");
    assert!(session.vertex(&b).is_none());
    assert!(session.edge(&e).is_none());

    session.rollback().expect("rollback");
    let restored = session.vertex(&b).expect("vertex restored");
    assert!(restored.in_edges.contains(&e));
    let out = session.vertex(&a).expect("a");
    assert!(out.out_edges.contains(&e));
    check_invariants(&session);
}

#[test]
fn label_add_then_remove_emits_no_update() {
    let (driver, mut session) = setup();
    let id = session.add_vertex(&["Person"], &[]).expect("add vertex");
    session.commit().expect("commit");
    driver.take_statements();

    session.add_label(&id, "Admin").expect("add label");
    session.remove_label(&id, "Admin").expect("remove label");
    session.commit().expect("commit");
    assert!(write_statements(&driver).is_empty());
    check_invariants(&session);
}

#[test]
fn edge_property_update_emits_a_merge() {
    let (driver, mut session) = setup();
    let a = session.add_vertex(&["Person"], &[]).expect("add a");
    let b = session.add_vertex(&["Person"], &[]).expect("add b");
    let e = session.add_edge("KNOWS", &a, &b, &[]).expect("add edge");
    session.commit().expect("commit");
    driver.take_statements();

    session
        .set_edge_property(&e, "weight", Value::Float(0.5))
        .expect("set property");
    assert!(session.edge_update_queue.contains(&e));
    session.commit().expect("commit");

    let texts = write_statements(&driver);
    assert_eq!(texts.len(), 1);
    assert_eq!(
        texts[0],
        "MATCH (o:`Person`{id: $oid}), (i:`Person`{id: $iid}) MERGE (o)-[r:`KNOWS`{id: $id}]->(i) ON MATCH SET r = $ep"
    );
    assert!(session.edge_update_queue.is_empty());
    check_invariants(&session);
}

#[test]
fn commit_failure_is_recoverable_by_rollback() {
    let (driver, mut session) = setup();
    let id = session
        .add_vertex(&["Person"], &[("name", Value::from("Alice"))])
        .expect("add vertex");
    session.commit().expect("commit");

    session
        .set_vertex_property(&id, Cardinality::Single, "name", Value::from("Bob"))
        .expect("set property");
    driver.fail_next("boom");
    let err = session.commit().expect_err("commit must fail");
    assert!(matches!(err, GraphError::Transport(_)));

    session.rollback().expect("rollback");
    let vertex = session.vertex(&id).expect("vertex");
    assert_eq!(
        vertex.property("name").expect("single value"),
        Some(&Value::from("Alice"))
    );
    check_invariants(&session);
}

#[test]
fn id_collision_is_a_consistency_error() {
    struct OneIdProvider;
    impl IdProvider for OneIdProvider {
        fn field_name(&self) -> &str {
            "id"
        }
        fn generate(&self) -> crate::error::Result<ElementId> {
            Ok(ElementId::Int(1))
        }
        fn canonicalize(&self, _raw: &Value) -> crate::error::Result<ElementId> {
            Ok(ElementId::Int(1))
        }
    }

    let driver = StubDriver::new();
    let provider = Arc::new(OneIdProvider);
    let graph = Graph::with_providers(
        Arc::new(driver),
        Config::default(),
        provider.clone(),
        provider.clone(),
        provider,
    );
    let mut session = graph.session().expect("session");
    session.add_vertex(&["Person"], &[]).expect("first add");
    let err = session.add_vertex(&["Person"], &[]).expect_err("collision");
    assert!(matches!(err, GraphError::Consistency(_)));
}

#[test]
fn partition_reserved_labels_are_rejected() {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let config = Config::small_pools().with_partition(crate::partition::ReadPartition::AllLabels(
        vec!["Tenant".to_string()],
    ));
    let graph = Graph::new(Arc::new(driver), config);
    let mut session = graph.session().expect("session");
    let id = session
        .add_vertex(&["Tenant", "Person"], &[])
        .expect("creation may carry partition labels");
    let err = session.add_label(&id, "Tenant").expect_err("reserved");
    assert!(matches!(err, GraphError::UserInput(_)));
    let err = session.remove_label(&id, "Tenant").expect_err("reserved");
    assert!(matches!(err, GraphError::UserInput(_)));
}

#[test]
fn reserved_id_key_is_rejected() {
    let (_driver, mut session) = setup();
    let err = session
        .add_vertex(&["Person"], &[("id", Value::Int(99))])
        .expect_err("user-supplied id");
    assert!(matches!(err, GraphError::UserInput(_)));
}

#[test]
fn deleted_row_does_not_resurface_through_loads() {
    let (driver, mut session) = setup();
    let id = session.add_vertex(&["Person"], &[]).expect("add vertex");
    session.commit().expect("commit");
    session.remove_vertex(&id).expect("remove");

    // The server still has the row until commit; a fetch must not revive it.
    driver.enqueue(vec![testkit::node_record(testkit::node(
        100,
        &["Person"],
        &[("id", Value::Int(1))],
    ))]);
    let found = session.vertices(&[Value::Int(1)]).expect("fetch");
    assert!(found.is_empty());
    check_invariants(&session);
}

#[test]
fn transaction_facade_guards_state() {
    let (_driver, mut session) = setup();
    assert!(matches!(
        session.tx().commit(),
        Err(GraphError::TransactionState(_))
    ));
    session.tx().open().expect("open");
    assert!(session.tx().is_open());
    assert!(matches!(
        session.tx().open(),
        Err(GraphError::TransactionState(_))
    ));
    session.tx().rollback().expect("rollback");
    assert!(!session.tx().is_open());
}
