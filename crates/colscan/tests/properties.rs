use colscan::{
    project_segments, scan, CandidateSet, CmpOp, ColumnValues, Dictionary, MemColumn, MemSegments,
    MemTable, ScanOptions, ScanRequest,
};
use proptest::prelude::*;
use std::sync::Arc;

/// Splits `values` into segments of the given lengths (the last segment takes the rest).
fn chunk<T: Clone>(values: &[T], lens: &[usize]) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    let mut start = 0;
    for &len in lens {
        let end = (start + len).min(values.len());
        out.push(values[start..end].to_vec());
        start = end;
    }
    out.push(values[start..].to_vec());
    out
}

fn op() -> impl Strategy<Value = CmpOp> {
    prop::sample::select(CmpOp::ALL.to_vec())
}

fn ints() -> impl Strategy<Value = (Vec<i32>, Vec<usize>)> {
    (
        prop::collection::vec(-50i32..50, 0..120),
        prop::collection::vec(0usize..16, 0..12),
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn skip_then_decode_matches_decode_all_then_select(
        (values, lens) in ints(),
        mask in prop::collection::vec(any::<bool>(), 120),
    ) {
        let segments = chunk(&values, &lens);
        let rows: Vec<usize> = (0..values.len()).filter(|&i| mask[i]).collect();
        let expected: Vec<i32> = rows.iter().map(|&i| values[i]).collect();

        let candidates = CandidateSet::from_rows(rows).unwrap();
        let projected = project_segments(MemSegments::new(&segments), &candidates).unwrap();
        prop_assert_eq!(projected, expected);
    }

    #[test]
    fn candidate_sets_only_shrink(
        (values, lens) in ints(),
        filters in prop::collection::vec((op(), -50i32..50), 1..5),
    ) {
        let table = MemTable::try_new(vec![MemColumn::int32("n", chunk(&values, &lens))]).unwrap();

        let mut previous = CandidateSet::Unbounded;
        let mut request = ScanRequest::new(Vec::<usize>::new());
        for (op, operand) in filters {
            request = request.filter(0, op, operand.to_string());
            let out = scan(&table, &request, &ScanOptions::default()).unwrap();
            prop_assert!(out.candidates.is_subset_of(&previous));
            if let CandidateSet::Bounded(rows) = &out.candidates {
                prop_assert!(!rows.is_empty());
                prop_assert!(rows.windows(2).all(|w| w[0] < w[1]));
                prop_assert!(rows.iter().all(|&r| op.compare(&values[r], &operand)));
            }
            previous = out.candidates;
        }
    }

    #[test]
    fn filter_order_does_not_change_membership(
        (values, lens) in ints(),
        (op_a, a) in (op(), -50i32..50),
        (op_b, b) in (op(), -50.0f64..50.0),
    ) {
        let floats: Vec<f64> = values.iter().map(|&v| f64::from(v) * 0.5).collect();
        let table = MemTable::try_new(vec![
            MemColumn::int32("n", chunk(&values, &lens)),
            MemColumn::float64("x", chunk(&floats, &[7, 3])),
        ])
        .unwrap();

        let forward = ScanRequest::new([1])
            .filter(0, op_a, a.to_string())
            .filter(1, op_b, b.to_string());
        let backward = ScanRequest::new([1])
            .filter(1, op_b, b.to_string())
            .filter(0, op_a, a.to_string());
        let forward = scan(&table, &forward, &ScanOptions::default()).unwrap();
        let backward = scan(&table, &backward, &ScanOptions::default()).unwrap();

        prop_assert_eq!(&forward.candidates, &backward.candidates);
        prop_assert_eq!(&forward.columns, &backward.columns);
        if let ColumnValues::Float64(xs) = &forward.columns[0].values {
            prop_assert_eq!(xs.len(), forward.rows);
        }
    }

    #[test]
    fn dictionary_resolve_then_translate_round_trips(
        words in prop::collection::hash_set("[a-z]{1,6}", 1..20),
    ) {
        let dictionary = Dictionary::new(words.into_iter().map(Arc::from).collect());
        for index in 0..dictionary.len() as u32 {
            let value = dictionary.resolve(index).unwrap();
            prop_assert_eq!(dictionary.translate(&value), Some(index));
        }
    }
}
