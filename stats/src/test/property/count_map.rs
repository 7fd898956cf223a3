use proptest::prelude::*;

use tally_dtype::DType;
use tally_poly::PwQPoly;

use crate::{CountGranularity, CountMap, Direction, Filter, MemAccess, MemoryType, Op, OpName};

const DTYPES: [DType; 4] = [DType::Int32, DType::Int64, DType::Float32, DType::Float64];

fn op_name(index: usize) -> OpName {
    [OpName::Add, OpName::Mul, OpName::Div, OpName::Bitwise, OpName::Func("exp".into())][index].clone()
}

/// Entries `(dtype, name, coefficient)`; each count is `coefficient * n`.
fn op_entries() -> impl Strategy<Value = Vec<(usize, usize, i64)>> {
    prop::collection::vec((0usize..DTYPES.len(), 0usize..5, 1i64..1000), 0..24)
}

fn op_map(entries: &[(usize, usize, i64)]) -> CountMap<Op> {
    entries
        .iter()
        .map(|&(dtype, name, coefficient)| {
            let key = Op::new(DTYPES[dtype], op_name(name), CountGranularity::WorkItem);
            (key, PwQPoly::param("n").scale(coefficient))
        })
        .collect()
}

fn mem_map(entries: &[(usize, bool, i64)]) -> CountMap<MemAccess> {
    entries
        .iter()
        .enumerate()
        .map(|(position, &(dtype, load, count))| {
            let key = MemAccess::builder()
                .mtype(MemoryType::Global)
                .dtype(DTYPES[dtype])
                .direction(if load { Direction::Load } else { Direction::Store })
                .variable(format!("v{}", position % 3))
                .granularity(CountGranularity::SubGroup)
                .build();
            (key, PwQPoly::constant(count))
        })
        .collect()
}

proptest! {
    /// Grouping never changes the total.
    #[test]
    fn group_by_preserves_total(entries in op_entries(), n in 0i64..100) {
        let map = op_map(&entries);
        let params = [("n", n)];
        let total = map.eval_and_sum(&params).unwrap();
        let groupings: [&[&str]; 4] = [&["dtype"], &["name"], &["dtype", "name"], &[]];
        for fields in groupings {
            prop_assert_eq!(map.group_by(fields).eval_and_sum(&params).unwrap(), total);
        }
        let expected: i64 = entries.iter().map(|&(_, _, c)| c * n).sum();
        prop_assert_eq!(total, expected);
    }

    /// A filter and its complement partition the map.
    #[test]
    fn filter_partitions(entries in op_entries(), n in 0i64..100) {
        let map = op_map(&entries);
        let params = [("n", n)];
        let floats = Filter::new().one_of("dtype", [DType::Float32, DType::Float64]);
        let selected = map.filter_by(&floats).eval_and_sum(&params).unwrap();
        let rest = map.filter_by_func(|key| !floats.matches(key)).eval_and_sum(&params).unwrap();
        prop_assert_eq!(selected + rest, map.eval_and_sum(&params).unwrap());
    }

    /// Byte totals weight each count by its element width.
    #[test]
    fn to_bytes_weights_by_width(
        entries in prop::collection::vec((0usize..DTYPES.len(), any::<bool>(), 1i64..1000), 0..24),
    ) {
        let map = mem_map(&entries);
        let no_params: [(&str, i64); 0] = [];
        let expected: i64 = map
            .iter()
            .map(|(key, count)| count.eval(&no_params).unwrap() * key.dtype.unwrap().bytes() as i64)
            .sum();
        let bytes = map.to_bytes().unwrap();
        prop_assert_eq!(bytes.eval_and_sum(&no_params).unwrap(), expected);
        prop_assert!(bytes.len() <= map.len());
    }
}
