mod common;

use common::*;
use tritonpart::evaluator::Evaluator;
use tritonpart::graphio::{self, InputFiles};
use tritonpart::{Error, Hypergraph};

#[test]
fn reads_plain_hypergraph() {
    let w = Workdir::new();
    let path = w.write("g.hgr", "% comment\n3 4\n1 2\n2 3 4\n\n4 1\n");
    let hg = graphio::read_hypergraph(&path, 1, 1).unwrap();

    assert_eq!(hg.num_vertices(), 4);
    assert_eq!(hg.num_hyperedges(), 3);
    assert_eq!(hg.vertices(1), &[1, 2, 3]);
    assert_eq!(hg.vertices(2), &[3, 0]);
    assert_eq!(hg.total_vertex_weights(), vec![4.0]);
}

#[test]
fn reads_weighted_hypergraph() {
    let w = Workdir::new();
    let path = w.write("g.hgr", "2 3 11\n5 1 2\n7 2 3\n1\n2\n3\n");
    let hg = graphio::read_hypergraph(&path, 1, 1).unwrap();

    assert_eq!(hg.hyperedge_weights(0), &[5.0]);
    assert_eq!(hg.hyperedge_weights(1), &[7.0]);
    assert_eq!(hg.vertex_weights(2), &[3.0]);
}

#[test]
fn reads_multi_dimensional_weights() {
    let w = Workdir::new();
    let path = w.write("g.hgr", "1 2 11\n1 2 1 2\n1 10\n2 20\n");
    let hg = graphio::read_hypergraph(&path, 2, 2).unwrap();

    assert_eq!(hg.hyperedge_weights(0), &[1.0, 2.0]);
    assert_eq!(hg.vertices(0), &[0, 1]);
    assert_eq!(hg.total_vertex_weights(), vec![3.0, 30.0]);
}

#[test]
fn rejects_out_of_range_vertices() {
    let w = Workdir::new();
    let path = w.write("g.hgr", "1 2\n1 3\n");
    let err = graphio::read_hypergraph(&path, 1, 1).unwrap_err();
    assert!(matches!(err, Error::Parse { line: 2, .. }), "{err}");
}

#[test]
fn rejects_truncated_files() {
    let w = Workdir::new();
    let path = w.write("g.hgr", "3 4\n1 2\n");
    assert!(graphio::read_hypergraph(&path, 1, 1).is_err());
    assert!(matches!(
        graphio::read_hypergraph(&w.path("missing.hgr"), 1, 1),
        Err(Error::Io { .. })
    ));
}

#[test]
fn attribute_files_with_wrong_length_are_ignored() {
    let w = Workdir::new();
    let fixed = w.write("g.fixed", "-1\n0\n1\n");
    assert_eq!(graphio::read_fixed(&fixed, 4).unwrap(), None);
    assert_eq!(
        graphio::read_fixed(&fixed, 3).unwrap(),
        Some(vec![None, Some(0), Some(1)])
    );

    let community = w.write("g.community", "0 0 1 1");
    assert_eq!(graphio::read_community(&community, 5).unwrap(), None);
    assert_eq!(
        graphio::read_community(&community, 4).unwrap(),
        Some(vec![0, 0, 1, 1])
    );
}

#[test]
fn groups_skip_singletons() {
    let w = Workdir::new();
    let path = w.write("g.group", "1 2 3\n4\n5 6\n");
    let groups = graphio::read_groups(&path, 6).unwrap();
    assert_eq!(groups, vec![vec![0, 1, 2], vec![4, 5]]);
}

#[test]
fn placement_is_normalized_by_the_mean() {
    let w = Workdir::new();
    let path = w.write("g.place", "0.1 0.2\n0.3 nan\n0.7 0.4\n");
    let placement = graphio::read_placement(&path, 3, 2).unwrap().unwrap();

    // 0.7 and nan read as 0; column means are 0.4/3 and 0.6/3
    assert!((placement[0][0] - 0.75).abs() < 1e-5);
    assert!((placement[1][0] - 2.25).abs() < 1e-5);
    assert_eq!(placement[2][0], 0.0);
    assert_eq!(placement[1][1], 0.0);
    assert!((placement[2][1] - 2.0).abs() < 1e-5);
}

#[test]
fn read_inputs_attaches_attributes() {
    let w = Workdir::new();
    let files = InputFiles {
        fixed: Some(w.write("g.fixed", "1 -1 -1 -1")),
        community: Some(w.write("g.community", "0 0 1")),
        group: Some(w.write("g.group", "2 3")),
        ..InputFiles::new(w.write("g.hgr", "2 4\n1 2\n3 4\n"))
    };
    let (hg, groups) = graphio::read_inputs(&files, 1, 1, 0).unwrap();

    assert_eq!(hg.fixed_block(0), Some(1));
    assert_eq!(hg.fixed_block(1), None);
    // wrong length, dropped with a warning
    assert!(!hg.has_community());
    assert_eq!(groups, vec![vec![1, 2]]);
}

#[test]
fn solution_round_trip() {
    let w = Workdir::new();
    let path = w.path("g.hgr.part.3");
    graphio::write_partition(&path, &[2, 0, 1, 1]).unwrap();
    assert_eq!(w.read(&path), "2\n0\n1\n1\n");
    assert_eq!(graphio::read_solution(&path, 4, 3).unwrap(), vec![2, 0, 1, 1]);
    assert!(graphio::read_solution(&path, 4, 2).is_err());
    assert!(graphio::read_solution(&path, 5, 3).is_err());
}

#[test]
fn partition_file_name_appends_block_count() {
    let name = graphio::partition_file_name(std::path::Path::new("dir/ibm01.hgr"), 4);
    assert_eq!(name, std::path::PathBuf::from("dir/ibm01.hgr.part.4"));
}

#[test]
fn weighted_export_reads_back() {
    let w = Workdir::new();
    let hg = Hypergraph::new(
        2,
        1,
        vec![vec![0, 1], vec![1, 2]],
        vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
        vec![vec![2.0], vec![3.0]],
    )
    .unwrap();
    let ev = Evaluator::new(2, vec![1.5], vec![1.0, 0.5], Vec::new());
    let path = w.path("weighted.hgr");
    graphio::write_weighted_hypergraph(&path, &hg, &ev, true).unwrap();

    let text = w.read(&path);
    assert!(text.starts_with("2  3 11\n"));
    let back = graphio::read_hypergraph(&path, 1, 1).unwrap();
    assert_eq!(back.num_vertices(), 3);
    assert_eq!(back.hyperedge_weights(0), &[3.0]);
    assert_eq!(back.hyperedge_weights(1), &[4.5]);
    assert_eq!(back.vertex_weights(1), &[5.0]);
    assert_eq!(back.vertices(1), hg.vertices(1));
}

#[test]
fn int_export_rounds_weights() {
    let w = Workdir::new();
    let hg = Hypergraph::new(
        1,
        1,
        vec![vec![0, 1]],
        vec![vec![1.4], vec![2.6]],
        vec![vec![2.5]],
    )
    .unwrap();
    let ev = Evaluator::uniform(2, 1, 1);
    let path = w.path("int.hgr");
    graphio::write_int_weight_hypergraph(&path, &hg, &ev).unwrap();
    assert_eq!(w.read(&path), "1  2 11\n3  1 2 \n1\n3\n");
}
