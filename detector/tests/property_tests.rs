// Property-based tests for automaton invariants.
//
// Three categories:
// 1. Round-trip: adding then removing a tag restores the prior set census
// 2. Order irrelevance: the final graph ignores insertion order
// 3. Add/remove stress: invariants hold after every event and the final
//    graph matches a clean rebuild of the surviving active set
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;
use std::sync::Arc;

use tagdfa::graph::Graph;
use tagdfa::tag::{Tag, TagId, TagParams};
use tagdfa::verify::Cert;

// ── Test helpers ────────────────────────────────────────────────────────────

fn params() -> TagParams {
    TagParams::new(0.0015, 0.0, 30.0)
}

/// A pool of mutually distinguishable tags: gap windows are separated far
/// beyond the tolerance, so no pair ever collapses into a proxy.
fn disjoint_pool(n: usize) -> Vec<Arc<Tag>> {
    (0..n)
        .map(|i| {
            let base = 1.5 + 0.2 * i as f64;
            let gaps = vec![base, base + 0.4, base + 0.9, 14.0 - 0.3 * i as f64];
            Arc::new(Tag::new(TagId(100 + i as i32), 166.38, gaps).unwrap())
        })
        .collect()
}

/// A pool where each odd-indexed tag is a near-twin of its predecessor,
/// exercising proxy formation and dissolution under churn.
fn mixed_pool(n: usize) -> Vec<Arc<Tag>> {
    (0..n)
        .map(|i| {
            let pair = i / 2;
            let base = 1.5 + 0.2 * pair as f64;
            let jitter = if i % 2 == 1 { 0.0002 } else { 0.0 };
            let gaps = vec![
                base + jitter,
                base + 0.4 + jitter,
                base + 0.9 + jitter,
                14.0 - 0.3 * pair as f64 + jitter,
            ];
            Arc::new(Tag::new(TagId(100 + i as i32), 166.38, gaps).unwrap())
        })
        .collect()
}

fn assert_all_pass(g: &mut Graph, context: &str) {
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

// ── 1. Round-trip laws ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn add_remove_restores_census(
        resident in proptest::collection::btree_set(0usize..6, 0..6),
        extra in 6usize..8,
    ) {
        let pool = disjoint_pool(8);
        let mut g = Graph::new("roundtrip");
        for &i in &resident {
            g.add_tag(pool[i].clone(), &params()).unwrap();
        }
        let before = g.set_census();
        let edges_before = g.edge_count();

        g.add_tag(pool[extra].clone(), &params()).unwrap();
        assert_all_pass(&mut g, "after add");
        g.remove_tag(pool[extra].id(), &params()).unwrap();
        assert_all_pass(&mut g, "after remove");

        prop_assert_eq!(g.set_census(), before);
        prop_assert_eq!(g.edge_count(), edges_before);
    }

    #[test]
    fn insertion_order_is_irrelevant(
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let pool = disjoint_pool(6);
        let reference = {
            let mut g = Graph::new("ref");
            for t in &pool {
                g.add_tag(t.clone(), &params()).unwrap();
            }
            g.set_census()
        };
        let mut g = Graph::new("perm");
        for &i in &order {
            g.add_tag(pool[i].clone(), &params()).unwrap();
        }
        assert_all_pass(&mut g, "permuted");
        prop_assert_eq!(g.set_census(), reference);
    }

    #[test]
    fn duplicate_add_is_idempotent(i in 0usize..6) {
        let pool = disjoint_pool(6);
        let mut g = Graph::new("dup");
        for t in &pool {
            g.add_tag(t.clone(), &params()).unwrap();
        }
        let census = g.set_census();
        prop_assert!(g.add_tag(pool[i].clone(), &params()).is_err());
        prop_assert_eq!(g.set_census(), census);
        assert_all_pass(&mut g, "after duplicate");
    }
}

// ── 2. Add/remove stress ────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn stress_events_keep_invariants(
        picks in proptest::collection::vec(0usize..12, 1..80),
    ) {
        let pool = mixed_pool(12);
        let mut g = Graph::new("stress");
        let mut active = vec![false; pool.len()];

        for (step, &i) in picks.iter().enumerate() {
            if active[i] {
                g.remove_tag(pool[i].id(), &params()).unwrap();
                active[i] = false;
            } else {
                g.add_tag(pool[i].clone(), &params()).unwrap();
                active[i] = true;
            }
            let cert = g.verify();
            prop_assert!(
                cert.all_pass(),
                "invariants failed at step {}: {:?}",
                step,
                cert.obligations()
                    .into_iter()
                    .filter(|(_, ok)| !ok)
                    .collect::<Vec<_>>()
            );
        }

        // a clean rebuild of the surviving set has the same shape
        let mut rebuilt = Graph::new("rebuilt");
        for (i, t) in pool.iter().enumerate() {
            if active[i] {
                rebuilt.add_tag(t.clone(), &params()).unwrap();
            }
        }
        prop_assert_eq!(g.tag_count(), rebuilt.tag_count());
        prop_assert_eq!(g.node_count(), rebuilt.node_count());
        prop_assert_eq!(g.set_count(), rebuilt.set_count());
    }
}

// ── 3. Deterministic long stress ────────────────────────────────────────────

#[test]
fn long_randomized_churn() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let pool = mixed_pool(40);
    let mut g = Graph::new("churn");
    let mut active = vec![false; pool.len()];
    let mut rng = StdRng::seed_from_u64(0xda7ad0);

    for step in 0..2000 {
        let i = rng.gen_range(0..pool.len());
        if active[i] {
            g.remove_tag(pool[i].id(), &params()).unwrap();
            active[i] = false;
        } else {
            g.add_tag(pool[i].clone(), &params()).unwrap();
            active[i] = true;
        }
        if step % 100 == 99 {
            assert_all_pass(&mut g, &format!("churn step {step}"));
        }
    }
    assert_all_pass(&mut g, "churn end");

    // drain everything; the automaton returns to its initial shape
    for (i, t) in pool.iter().enumerate() {
        if active[i] {
            g.remove_tag(t.id(), &params()).unwrap();
        }
    }
    assert_all_pass(&mut g, "drained");
    assert_eq!(g.node_count(), 1);
    assert_eq!(g.edge_count(), 1);
    assert_eq!(g.tag_count(), 0);
}
