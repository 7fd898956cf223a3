use tally_poly::CardinalityMode;

use crate::sync::{Node, schedule};
use crate::test::helpers::*;
use crate::{CountingPolicy, SyncKind, get_synchronization_map};

fn policy() -> CountingPolicy {
    CountingPolicy::builder().cardinality(CardinalityMode::Exact).build()
}

#[test]
fn test_no_barriers() {
    let sync = get_synchronization_map(&basic(), &policy()).unwrap();
    assert_eq!(sync.len(), 1);
    assert_eq!(sync[&SyncKind::KernelLaunch].eval(&PARAMS).unwrap(), 1);
}

#[test]
fn test_neighbour_reads_need_barriers() {
    let sync = get_synchronization_map(&neighbours(), &policy()).unwrap();
    let no_params: [(&str, i64); 0] = [];
    // one barrier before the reads and one before the next iteration's writes
    assert_eq!(sync[&SyncKind::BarrierLocal].eval(&no_params).unwrap(), 50 * 10 * 2);
    assert_eq!(sync[&SyncKind::KernelLaunch].eval(&no_params).unwrap(), 1);
}

#[test]
fn test_tiled_matmul_barriers() {
    let sync = get_synchronization_map(&tiled_matmul(), &policy()).unwrap();
    assert_eq!(sync.len(), 2);
    assert_eq!(sync[&SyncKind::KernelLaunch].eval(&PARAMS).unwrap(), 1);
    assert_eq!(sync[&SyncKind::BarrierLocal].eval(&PARAMS).unwrap(), 2 * M / 16);
}

#[test]
fn test_global_temporary_splits_kernel() {
    let sync = get_synchronization_map(&global_exchange(), &policy()).unwrap();
    let params = [("n", 64)];
    assert_eq!(sync[&SyncKind::BarrierGlobal].eval(&params).unwrap(), 1);
    assert_eq!(sync[&SyncKind::KernelLaunch].eval(&params).unwrap(), 2);
    assert!(!sync.contains_key(&SyncKind::BarrierLocal));
}

#[test]
fn test_schedule_shares_loops() {
    let tree = schedule(&tiled_matmul());
    let expected = vec![Node::Loop {
        axis: "k_out".into(),
        body: vec![Node::Insn(0), Node::Insn(1), Node::Loop { axis: "k_in".into(), body: vec![Node::Insn(2)] }],
    }];
    assert_eq!(tree, expected);
}

#[test]
fn test_schedule_without_loops() {
    assert_eq!(schedule(&global_exchange()), vec![Node::Insn(0), Node::Insn(1)]);
}
