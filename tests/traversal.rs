use std::sync::Arc;

use grapnel::testkit::{self, StubDriver};
use grapnel::{Config, Direction, ElementId, Graph, Result, Value};

fn graph_over(driver: &StubDriver) -> Graph {
    Graph::new(Arc::new(driver.clone()), Config::small_pools())
}

fn write_statements(driver: &StubDriver) -> Vec<grapnel::Statement> {
    driver
        .take_statements()
        .into_iter()
        .filter(|s| !s.text.contains("g.nextId"))
        .collect()
}

#[test]
fn committed_edge_traverses_from_a_new_session() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    let mut session = graph.session()?;
    let v1 = session.add_vertex(&["Person"], &[])?;
    let v2 = session.add_vertex(&["Person"], &[])?;
    session.add_edge("KNOWS", &v1, &v2, &[("since", Value::Int(2020))])?;
    session.commit()?;
    session.close()?;
    driver.take_statements();

    // Fresh session: load v1, then ask for its outgoing edges.
    let mut session = graph.session()?;
    driver.enqueue(vec![testkit::node_record(testkit::node(
        100,
        &["Person"],
        &[("id", Value::from(&v1))],
    ))]);
    let found = session.vertices(&[Value::from(&v1)])?;
    assert_eq!(found, vec![v1.clone()]);

    driver.enqueue(vec![testkit::edge_record(
        testkit::node(100, &["Person"], &[("id", Value::from(&v1))]),
        testkit::relationship(200, "KNOWS", 100, 101, &[
            ("id", Value::Int(3)),
            ("since", Value::Int(2020)),
        ]),
        testkit::node(101, &["Person"], &[("id", Value::from(&v2))]),
    )]);
    let edges = session.vertex_edges(&v1, Direction::Out, &[])?;
    assert_eq!(edges.len(), 1);
    let edge = session.edge(&edges[0]).expect("materialized edge");
    assert_eq!(edge.label(), "KNOWS");
    assert_eq!(edge.in_id(), &v2);
    assert_eq!(edge.property("since"), Some(&Value::Int(2020)));

    let statements = write_statements(&driver);
    assert_eq!(
        statements[1].text,
        "MATCH (n:`Person`{id: $id})-[r]->(m) WHERE NOT r.id IN $ids RETURN n, r, m"
    );
    session.close()?;
    Ok(())
}

#[test]
fn transient_edges_answer_without_a_query() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    let mut session = graph.session()?;
    let v1 = session.add_vertex(&["Person"], &[])?;
    let v2 = session.add_vertex(&["Person"], &[])?;
    let e = session.add_edge("KNOWS", &v1, &v2, &[])?;
    driver.take_statements();

    // Transient vertices have both adjacency sides loaded by construction.
    let out = session.vertex_edges(&v1, Direction::Out, &[])?;
    assert_eq!(out, vec![e.clone()]);
    let in_ = session.vertex_edges(&v2, Direction::In, &[])?;
    assert_eq!(in_, vec![e.clone()]);
    let both = session.vertex_edges(&v1, Direction::Both, &[])?;
    assert_eq!(both, vec![e.clone()]);
    assert!(write_statements(&driver).is_empty());

    // Label filters apply to the in-memory contribution.
    let filtered = session.vertex_edges(&v1, Direction::Out, &["KNOWS"])?;
    assert_eq!(filtered, vec![e]);
    let none = session.vertex_edges(&v1, Direction::Out, &["LIKES"])?;
    assert!(none.is_empty());
    session.close()?;
    Ok(())
}

#[test]
fn streamed_rows_never_double_count_local_edges() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    // Load one persisted edge, then traverse: the statement must exclude
    // the locally known edge id and the blended result must not repeat it.
    let mut session = graph.session()?;
    driver.enqueue(vec![testkit::edge_record(
        testkit::node(100, &["Person"], &[("id", Value::Int(1))]),
        testkit::relationship(200, "KNOWS", 100, 101, &[("id", Value::Int(5))]),
        testkit::node(101, &["Person"], &[("id", Value::Int(2))]),
    )]);
    let known = session.edges(&[Value::Int(5)])?;
    assert_eq!(known, vec![ElementId::Int(5)]);
    driver.take_statements();

    driver.enqueue(vec![testkit::edge_record(
        testkit::node(100, &["Person"], &[("id", Value::Int(1))]),
        testkit::relationship(201, "KNOWS", 100, 102, &[("id", Value::Int(6))]),
        testkit::node(102, &["Person"], &[("id", Value::Int(3))]),
    )]);
    let v1 = ElementId::Int(1);
    let edges = session.vertex_edges(&v1, Direction::Out, &[])?;
    assert_eq!(edges, vec![ElementId::Int(5), ElementId::Int(6)]);

    let statements = write_statements(&driver);
    assert_eq!(
        statements[0].parameters.get("ids"),
        Some(&Value::List(vec![Value::Int(5)]))
    );

    // The unfiltered call marked the direction loaded; a repeat answers
    // purely from memory.
    let again = session.vertex_edges(&v1, Direction::Out, &[])?;
    assert_eq!(again, vec![ElementId::Int(5), ElementId::Int(6)]);
    assert!(write_statements(&driver).is_empty());
    session.close()?;
    Ok(())
}

#[test]
fn label_filtered_traversal_does_not_mark_loaded() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    let mut session = graph.session()?;
    driver.enqueue(vec![testkit::node_record(testkit::node(
        100,
        &["Person"],
        &[("id", Value::Int(1))],
    ))]);
    session.vertices(&[Value::Int(1)])?;
    driver.take_statements();

    let v1 = ElementId::Int(1);
    driver.enqueue(vec![]);
    session.vertex_edges(&v1, Direction::Out, &["LIKES"])?;
    let first = write_statements(&driver);
    assert_eq!(first.len(), 1);
    assert_eq!(
        first[0].text,
        "MATCH (n:`Person`{id: $id})-[r:`LIKES`]->(m) WHERE NOT r.id IN $ids RETURN n, r, m"
    );

    // The cache stayed partial, so an unfiltered call still queries.
    driver.enqueue(vec![]);
    session.vertex_edges(&v1, Direction::Out, &[])?;
    assert_eq!(write_statements(&driver).len(), 1);
    session.close()?;
    Ok(())
}

#[test]
fn multi_label_filter_uses_alternation_and_type_predicate() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    let mut session = graph.session()?;
    driver.enqueue(vec![testkit::node_record(testkit::node(
        100,
        &["Person"],
        &[("id", Value::Int(1))],
    ))]);
    session.vertices(&[Value::Int(1)])?;
    driver.take_statements();

    driver.enqueue(vec![]);
    let v1 = ElementId::Int(1);
    session.vertex_edges(&v1, Direction::In, &["KNOWS", "LIKES"])?;
    let statements = write_statements(&driver);
    assert_eq!(
        statements[0].text,
        "MATCH (n:`Person`{id: $id})<-[r:`KNOWS`|:`LIKES`]-(m) WHERE NOT r.id IN $ids AND type(r) IN $labels RETURN n, r, m"
    );
    assert_eq!(
        statements[0].parameters.get("labels"),
        Some(&Value::List(vec![
            Value::from("KNOWS"),
            Value::from("LIKES")
        ]))
    );
    session.close()?;
    Ok(())
}

#[test]
fn neighbors_blend_memory_and_stream() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    let mut session = graph.session()?;
    // One persisted edge 1 -> 2 in memory.
    driver.enqueue(vec![testkit::edge_record(
        testkit::node(100, &["Person"], &[("id", Value::Int(1))]),
        testkit::relationship(200, "KNOWS", 100, 101, &[("id", Value::Int(5))]),
        testkit::node(101, &["Person"], &[("id", Value::Int(2))]),
    )]);
    session.edges(&[Value::Int(5)])?;
    driver.take_statements();

    // The remote side contributes 1 -> 3 and repeats vertex 2; the blend
    // deduplicates.
    driver.enqueue(vec![
        testkit::node_record(testkit::node(101, &["Person"], &[("id", Value::Int(2))])),
        testkit::node_record(testkit::node(102, &["Person"], &[("id", Value::Int(3))])),
    ]);
    let v1 = ElementId::Int(1);
    let neighbors = session.vertex_neighbors(&v1, Direction::Out, &[])?;
    assert_eq!(neighbors, vec![ElementId::Int(2), ElementId::Int(3)]);

    let statements = write_statements(&driver);
    assert_eq!(
        statements[0].text,
        "MATCH (n:`Person`{id: $id})-[r]->(m) RETURN m"
    );
    session.close()?;
    Ok(())
}

#[test]
fn full_edge_fetch_marks_edges_loaded() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    let mut session = graph.session()?;
    driver.enqueue(vec![testkit::edge_record(
        testkit::node(100, &["Person"], &[("id", Value::Int(1))]),
        testkit::relationship(200, "KNOWS", 100, 101, &[("id", Value::Int(5))]),
        testkit::node(101, &["Person"], &[("id", Value::Int(2))]),
    )]);
    let all = session.edges(&[])?;
    assert_eq!(all, vec![ElementId::Int(5)]);
    let statements = write_statements(&driver);
    assert_eq!(statements[0].text, "MATCH (n)-[r]->(m) RETURN n, r, m");

    // Loaded: a by-id fetch answers from the registry without a query.
    let again = session.edges(&[Value::Int(5), Value::Int(99)])?;
    assert_eq!(again, vec![ElementId::Int(5)]);
    assert!(write_statements(&driver).is_empty());
    session.close()?;
    Ok(())
}

#[test]
fn removed_vertex_is_gone_from_traversals_until_rollback() -> Result<()> {
    let driver = StubDriver::new();
    driver.install_sequence(0);
    let graph = graph_over(&driver);

    let mut session = graph.session()?;
    let v1 = session.add_vertex(&["Person"], &[])?;
    let v2 = session.add_vertex(&["Person"], &[])?;
    let e = session.add_edge("KNOWS", &v1, &v2, &[])?;
    session.commit()?;

    session.remove_vertex(&v2)?;
    assert!(session.vertex_edges(&v1, Direction::Out, &[])?.is_empty());

    session.rollback()?;
    let edges = session.vertex_edges(&v1, Direction::Out, &[])?;
    assert_eq!(edges, vec![e]);
    let neighbors = session.vertex_neighbors(&v1, Direction::Out, &[])?;
    assert_eq!(neighbors, vec![v2]);
    session.close()?;
    Ok(())
}
