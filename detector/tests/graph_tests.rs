// Conformance tests for the recognition automaton.
//
// Each test pins one observable scenario of the graph lifecycle:
// - empty-graph shape and the waiting self-loop
// - node/set accounting for one tag and for disjoint pairs
// - ambiguity proxying, growth, and dissolution
// - removal restoring the prior graph
// Every mutation is followed by a full invariant verification.

use std::sync::Arc;

use tagdfa::graph::{Graph, RemoveOutcome};
use tagdfa::phase::TagPhase;
use tagdfa::tag::{Tag, TagId, TagParams};
use tagdfa::verify::Cert;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn tag(id: i32, gaps: &[f64]) -> Arc<Tag> {
    Arc::new(Tag::new(TagId(id), 166.38, gaps.to_vec()).unwrap())
}

fn params() -> TagParams {
    TagParams::new(0.0015, 0.0, 30.0)
}

fn assert_valid(g: &mut Graph, context: &str) {
    let cert = g.verify();
    assert!(
        cert.all_pass(),
        "[{context}] invariants failed: {:?}",
        cert.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .collect::<Vec<_>>()
    );
}

// ── Scenario: empty graph ───────────────────────────────────────────────────

#[test]
fn empty_graph_has_root_and_waiting_loop() {
    let mut g = Graph::new("empty");
    assert_eq!(g.node_count(), 1);
    assert_eq!(g.set_count(), 1);
    let root = g.root_id();
    let node = g.node(root);
    assert!(node.set.contains(TagPhase::virtual_start()));
    assert_eq!(node.edges.len(), 1);
    let e = node.edges.values().next().unwrap();
    assert_eq!(e.target, root);
    assert!(e.ranges.contains(0.5));
    assert!(e.ranges.contains(1e9));
    assert_valid(&mut g, "empty");
}

// ── Scenario: one tag ───────────────────────────────────────────────────────

#[test]
fn one_tag_builds_k_nodes() {
    let mut g = Graph::new("one");
    let t = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    let out = g.add_tag(t.clone(), &params()).unwrap();
    assert!(out.proxy.is_none());

    // k = 4 pulses: root plus one node per advanced phase
    assert_eq!(g.node_count(), 4);
    assert_eq!(g.set_count(), 4);
    assert_valid(&mut g, "one tag");

    // each non-root node has exactly one incoming edge, and each gap edge
    // extends one period beyond its base window (period 20, max_time 30)
    for (id, node) in g.nodes() {
        if id == g.root_id() {
            continue;
        }
        assert_eq!(node.refs, 1, "node {id:?} should have a single parent");
    }
    let root = g.node(g.root_id());
    let first_gap_edge = root
        .edges
        .values()
        .find(|e| e.ranges.contains(2.1))
        .expect("first-gap edge missing");
    assert!(first_gap_edge.ranges.contains(2.1 + 20.0));
    assert!(!first_gap_edge.ranges.contains(2.1 + 40.0));
}

#[test]
fn one_tag_wraps_to_root_with_completion_mark() {
    let mut g = Graph::new("wrap");
    let t = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    g.add_tag(t, &params()).unwrap();
    let root = g.root_id();
    let mut wrap_edges = 0;
    for (id, node) in g.nodes() {
        for e in node.edges.values() {
            if e.target == root && !e.completes.is_empty() {
                wrap_edges += 1;
                assert_ne!(id, root);
                assert!(e.completes.contains(&TagId(101)));
                // the burst gap: 12.9, extended by the period
                assert!(e.ranges.contains(12.9));
            }
        }
    }
    assert_eq!(wrap_edges, 1, "exactly one burst-completion edge expected");
}

#[test]
fn single_gap_tag_lives_entirely_on_the_root() {
    // a one-pulse cycle: the only transition is the burst gap itself, a
    // completion edge from the root back to the root
    let mut g = Graph::new("k1");
    let t = tag(55, &[5.0]);
    g.add_tag(t.clone(), &params()).unwrap();
    assert_eq!(g.node_count(), 1);
    assert_valid(&mut g, "k=1 added");

    let root = g.node(g.root_id());
    let wrap = root
        .edges
        .values()
        .find(|e| !e.completes.is_empty())
        .expect("completion edge missing");
    assert!(wrap.completes.contains(&t.id()));
    assert!(wrap.ranges.contains(5.0));
    assert!(wrap.ranges.contains(25.0), "one whole missed cycle accepted");

    g.remove_tag(t.id(), &params()).unwrap();
    assert_valid(&mut g, "k=1 removed");
    assert_eq!(g.edge_count(), 1);
}

// ── Scenario: two disjoint tags ─────────────────────────────────────────────

#[test]
fn two_disjoint_tags_then_remove_either() {
    let mut g = Graph::new("pair");
    let a = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    let b = tag(202, &[4.1, 4.4, 4.9, 11.6]);

    let census_empty = g.set_census();
    g.add_tag(a.clone(), &params()).unwrap();
    let census_a_only = g.set_census();
    assert_eq!(g.node_count(), 4);

    g.add_tag(b.clone(), &params()).unwrap();
    assert_eq!(g.node_count(), 7, "each tag adds three phase nodes");
    assert_valid(&mut g, "two tags");

    // removing b restores the a-only graph
    assert_eq!(g.remove_tag(b.id(), &params()).unwrap(), RemoveOutcome::Removed);
    assert_valid(&mut g, "after remove b");
    assert_eq!(g.set_census(), census_a_only);

    // removing a restores the empty graph
    assert_eq!(g.remove_tag(a.id(), &params()).unwrap(), RemoveOutcome::Removed);
    assert_valid(&mut g, "after remove a");
    assert_eq!(g.set_census(), census_empty);
    assert_eq!(g.node_count(), 1);
}

#[test]
fn add_order_does_not_matter_for_disjoint_tags() {
    let specs: Vec<(i32, Vec<f64>)> = vec![
        (101, vec![2.1, 2.3, 2.7, 12.9]),
        (202, vec![4.1, 4.4, 4.9, 11.6]),
        (303, vec![6.2, 5.1, 3.3, 10.4]),
    ];
    let mut censuses = Vec::new();
    let orders: [[usize; 3]; 3] = [[0, 1, 2], [2, 0, 1], [1, 2, 0]];
    for order in orders {
        let mut g = Graph::new("perm");
        for &i in &order {
            let (id, gaps) = &specs[i];
            g.add_tag(tag(*id, gaps), &params()).unwrap();
        }
        assert_valid(&mut g, "permutation");
        censuses.push(g.set_census());
    }
    assert_eq!(censuses[0], censuses[1]);
    assert_eq!(censuses[1], censuses[2]);
}

// ── Scenario: overlapping but distinguishable tags ──────────────────────────

#[test]
fn overlapping_windows_split_edges_and_share_nodes() {
    let mut g = Graph::new("overlap");
    // identical first gap, diverging afterwards: the automaton must share
    // the ambiguous prefix window and split on the second gap
    let a = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    let b = tag(202, &[2.1, 4.4, 4.9, 8.6]);
    g.add_tag(a.clone(), &params()).unwrap();
    g.add_tag(b.clone(), &params()).unwrap();
    assert_valid(&mut g, "shared prefix");

    // some node carries both phase-1 hypotheses
    let shared = g.nodes().any(|(_, node)| {
        node.set.contains(TagPhase::new(a.id(), 1)) && node.set.contains(TagPhase::new(b.id(), 1))
    });
    assert!(shared, "expected a node holding 101@1 and 202@1");

    let census_a_only = {
        let mut solo = Graph::new("solo");
        solo.add_tag(a.clone(), &params()).unwrap();
        solo.set_census()
    };
    g.remove_tag(b.id(), &params()).unwrap();
    assert_valid(&mut g, "after removing overlapping tag");
    assert_eq!(g.set_census(), census_a_only);
}

#[test]
fn partially_overlapping_first_gaps_split_edges() {
    let mut g = Graph::new("partial");
    // first-gap windows overlap partially (2.1 vs 2.102 at 0.15% tolerance)
    // while the later gaps diverge, so this is a split, not an ambiguity
    let a = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    let b = tag(202, &[2.102, 4.4, 4.898, 8.6]);

    let census_empty = g.set_census();
    g.add_tag(a.clone(), &params()).unwrap();
    let census_a_only = g.set_census();
    g.add_tag(b.clone(), &params()).unwrap();
    assert_valid(&mut g, "partial overlap");

    // the shared window leads to a node holding both hypotheses, while
    // each tag keeps a private window of its own
    let shared = g.nodes().any(|(_, node)| {
        node.set.contains(TagPhase::new(a.id(), 1)) && node.set.contains(TagPhase::new(b.id(), 1))
    });
    assert!(shared, "expected a merged node for the shared window");
    let private_a = g.nodes().any(|(_, node)| {
        node.set.contains(TagPhase::new(a.id(), 1)) && !node.set.contains(TagPhase::new(b.id(), 1))
    });
    assert!(private_a, "expected a private node for a's window");

    g.remove_tag(b.id(), &params()).unwrap();
    assert_valid(&mut g, "after removing split partner");
    assert_eq!(g.set_census(), census_a_only);

    g.remove_tag(a.id(), &params()).unwrap();
    assert_valid(&mut g, "after removing both");
    assert_eq!(g.set_census(), census_empty);
}

// ── Scenario: ambiguity ─────────────────────────────────────────────────────

#[test]
fn indistinguishable_tags_collapse_to_proxy() {
    let mut g = Graph::new("amb");
    let a = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    // within 0.15% on every gap
    let b = tag(102, &[2.1001, 2.3001, 2.7001, 12.9001]);

    g.add_tag(a.clone(), &params()).unwrap();
    let nodes_single = g.node_count();
    let out = g.add_tag(b.clone(), &params()).unwrap();
    let proxy = out.proxy.expect("expected ambiguity proxy");
    assert!(proxy.id().is_proxy());
    assert_eq!(g.node_count(), nodes_single, "proxying must not grow the graph");
    assert_valid(&mut g, "proxied pair");

    let fa = g.find(a.id()).expect("find(a)");
    let fb = g.find(b.id()).expect("find(b)");
    assert_eq!(fa.resolved, proxy.id());
    assert_eq!(fa, fb);
}

#[test]
fn proxy_grows_then_dissolves_member_by_member() {
    let mut g = Graph::new("amb3");
    let a = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    let b = tag(102, &[2.1001, 2.3001, 2.7001, 12.9001]);
    let c = tag(103, &[2.0999, 2.2999, 2.6999, 12.8999]);

    g.add_tag(a.clone(), &params()).unwrap();
    let p2 = g.add_tag(b.clone(), &params()).unwrap().proxy.unwrap();
    let p3 = g.add_tag(c.clone(), &params()).unwrap().proxy.unwrap();
    assert_ne!(p2.id(), p3.id(), "growth mints a fresh proxy");
    assert_valid(&mut g, "three-member proxy");

    // dropping the middle member keeps the proxy in place
    assert_eq!(
        g.remove_tag(b.id(), &params()).unwrap(),
        RemoveOutcome::StillAmbiguous { proxy: p3.id() }
    );
    assert_valid(&mut g, "two-member proxy");
    assert_eq!(g.find(a.id()).unwrap().resolved, p3.id());
    assert_eq!(g.find(c.id()).unwrap().resolved, p3.id());

    // dropping the next member dissolves the proxy onto the survivor
    assert_eq!(
        g.remove_tag(a.id(), &params()).unwrap(),
        RemoveOutcome::ProxyDissolved { survivor: c.id() }
    );
    assert_valid(&mut g, "dissolved proxy");
    assert_eq!(g.find(c.id()).unwrap().resolved, c.id());

    // and the survivor still owns a structurally intact pattern
    assert_eq!(
        g.remove_tag(c.id(), &params()).unwrap(),
        RemoveOutcome::Removed
    );
    assert_valid(&mut g, "all removed");
    assert_eq!(g.node_count(), 1);
}

#[test]
fn ambiguous_group_behaves_like_single_pattern() {
    // add(A); add(B); add(C); remove(B) leaves a graph equivalent to a
    // two-member proxy over the same pattern
    let mut g = Graph::new("amb-law");
    let a = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    let b = tag(102, &[2.1001, 2.3001, 2.7001, 12.9001]);
    let c = tag(103, &[2.0999, 2.2999, 2.6999, 12.8999]);
    g.add_tag(a.clone(), &params()).unwrap();
    g.add_tag(b.clone(), &params()).unwrap();
    g.add_tag(c.clone(), &params()).unwrap();
    g.remove_tag(b.id(), &params()).unwrap();

    let members = g
        .ambiguity()
        .members_of(g.find(a.id()).unwrap().resolved)
        .cloned()
        .expect("proxy members");
    assert_eq!(
        members.into_iter().collect::<Vec<_>>(),
        vec![a.id(), c.id()]
    );
    assert_eq!(g.node_count(), 4);
    assert_valid(&mut g, "amb law");
}

// ── Duplicate and unknown ───────────────────────────────────────────────────

#[test]
fn duplicate_add_and_unknown_remove_are_reported() {
    let mut g = Graph::new("dup");
    let t = tag(101, &[2.1, 2.3, 2.7, 12.9]);
    g.add_tag(t.clone(), &params()).unwrap();
    let census = g.set_census();

    let err = g.add_tag(t.clone(), &params()).unwrap_err();
    assert_eq!(format!("{err}"), "tag 101 is already present");
    assert_eq!(g.set_census(), census, "failed add must not mutate");

    assert_eq!(
        g.remove_tag(TagId(999), &params()).unwrap(),
        RemoveOutcome::NotPresent
    );
    assert_eq!(g.set_census(), census);
    assert_valid(&mut g, "after reported errors");
}
