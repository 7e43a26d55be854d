//! Property tests for the topology compiler.
//!
//! Random small documents exercise the allocator and distance invariants
//! that scenario tests cannot cover pair by pair.

use proptest::prelude::*;
use vmtopo_topology::{compile, parse_document, RenderMode};

/// A random CPU-and-memory group, sharing one thread count so that
/// multi-group documents stay valid.
fn group_json(cores: u32, threads: u32, nodes: u32, dies: u32, packages: u32) -> String {
    format!(
        r#"{{"mem": "1G", "cores": {cores}, "threads": {threads},
            "nodes": {nodes}, "dies": {dies}, "packages": {packages}}}"#
    )
}

fn document(groups: &[(u32, u32, u32, u32)], threads: u32) -> String {
    let body: Vec<String> = groups
        .iter()
        .map(|&(cores, nodes, dies, packages)| {
            group_json(cores, threads, nodes, dies, packages)
        })
        .collect();
    format!("[{}]", body.join(","))
}

proptest! {
    #[test]
    fn cpu_summary_matches_the_group_arithmetic(
        groups in prop::collection::vec(
            (1u32..4, 1u32..3, 1u32..3, 1u32..3),
            1..4,
        ),
        threads in 1u32..4,
    ) {
        let doc = document(&groups, threads);
        let options = compile(&parse_document(&doc).unwrap()).unwrap();
        let line = options.render(RenderMode::Flat);

        let expected: u32 = groups
            .iter()
            .map(|&(cores, nodes, dies, packages)| {
                cores * threads * nodes * dies * packages
            })
            .sum();
        prop_assert!(
            line.contains(&format!(",maxcpus={expected}")),
            "expected {expected} CPUs in {line}"
        );
        prop_assert!(
            line.contains(&format!("-smp cpus={expected},")),
            "expected -smp cpus={expected}, in {line}"
        );
    }
}

proptest! {
    #[test]
    fn distance_output_is_total_and_self_free(
        groups in prop::collection::vec(
            (1u32..3, 1u32..3, 1u32..3, 1u32..3),
            1..4,
        ),
    ) {
        let doc = document(&groups, 2);
        let options = compile(&parse_document(&doc).unwrap()).unwrap();
        let line = options.render(RenderMode::Flat);

        let total_nodes: u32 = groups
            .iter()
            .map(|&(_, nodes, dies, packages)| nodes * dies * packages)
            .sum();
        for src in 0..total_nodes {
            prop_assert!(
                !line.contains(&format!("dist,src={src},dst={src},")),
                "unexpected self-distance src={src} in {line}"
            );
            for dst in 0..total_nodes {
                if src != dst {
                    prop_assert!(
                        line.contains(&format!("dist,src={src},dst={dst},val=")),
                        "missing {src}->{dst} in {line}"
                    );
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn compilation_is_idempotent(
        groups in prop::collection::vec(
            (1u32..4, 1u32..3, 1u32..3, 1u32..3),
            1..4,
        ),
        threads in 1u32..4,
    ) {
        let doc = document(&groups, threads);
        let entries = parse_document(&doc).unwrap();
        let first = compile(&entries).unwrap().render(RenderMode::Flat);
        let second = compile(&entries).unwrap().render(RenderMode::Flat);
        prop_assert_eq!(first, second);
    }
}

proptest! {
    #[test]
    fn wrong_dist_all_dimensions_never_compile(
        nodes in 2u32..5,
        rows in 1usize..8,
    ) {
        prop_assume!(rows != nodes as usize);
        let matrix: Vec<Vec<u32>> =
            vec![vec![10; nodes as usize]; rows];
        let doc = format!(
            r#"[{{"mem": "1G", "cores": 1, "nodes": {nodes},
                 "dist-all": {}}}]"#,
            serde_json::to_string(&matrix).unwrap(),
        );
        let result = compile(&parse_document(&doc).unwrap());
        prop_assert!(result.is_err());
    }
}
