use colscan::{
    filter_column, project_column, scan, CandidateSet, CmpOp, ColumnSchema, ColumnSource,
    ColumnValues, DictionaryOutput, MemColumn, MemTable, MemTableBuilder, PhysicalType,
    Predicate, ScanError, ScanOptions, ScanRequest, ScanResult, ScanTable, SegmentSource,
    TableOptions, ValueDecoder, Value,
};
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

fn price_table() -> MemTable {
    MemTable::try_new(vec![MemColumn::float64(
        "price",
        vec![vec![10.0, 25.0], vec![7.0], vec![30.0, 15.0]],
    )])
    .unwrap()
}

#[test]
fn greater_then_less_over_variable_segments() {
    let table = price_table();

    let out = scan(
        &table,
        &ScanRequest::new([0]).filter(0, CmpOp::Greater, "12.0"),
        &ScanOptions::default(),
    )
    .unwrap();
    assert_eq!(out.candidates, CandidateSet::Bounded(vec![1, 3, 4]));
    assert_eq!(out.columns[0].values, ColumnValues::Float64(vec![25.0, 30.0, 15.0]));

    let out = scan(
        &table,
        &ScanRequest::new([0])
            .filter(0, CmpOp::Greater, "12.0")
            .filter(0, CmpOp::Less, "28.0"),
        &ScanOptions::default(),
    )
    .unwrap();
    assert_eq!(out.candidates, CandidateSet::Bounded(vec![1, 4]));
    assert_eq!(out.columns[0].values, ColumnValues::Float64(vec![25.0, 15.0]));
}

#[test]
fn zero_matches_is_a_result_not_an_error() {
    let table = price_table();
    let out = scan(
        &table,
        &ScanRequest::new([0, 0]).filter(0, CmpOp::Greater, "1000"),
        &ScanOptions::default(),
    )
    .unwrap();
    assert_eq!(out.candidates, CandidateSet::Empty);
    assert_eq!(out.rows, 0);
    assert_eq!(out.columns.len(), 2);
    assert!(out.columns.iter().all(|c| c.values.is_empty()));
}

#[test]
fn built_tables_scan_like_prechunked_ones() {
    let schema = vec![
        ColumnSchema::new("age", PhysicalType::Int32),
        ColumnSchema::new("edu", PhysicalType::Dictionary),
        ColumnSchema::new("income", PhysicalType::Float64),
    ];
    let rows = [
        (24, "Secondary", 1_850.0),
        (37, "College", 4_200.0),
        (52, "Primary", 1_200.0),
        (41, "College", 3_900.0),
        (29, "Secondary", 2_100.0),
        (63, "College", 5_000.0),
        (18, "Primary", 600.0),
    ];

    let mut builder = MemTableBuilder::new(schema, TableOptions { chunk_rows: 3 });
    for (i, (age, edu, income)) in rows.iter().enumerate() {
        builder
            .append_row(&[Value::from(*age), Value::from(*edu), Value::from(*income)])
            .unwrap();
        if i == 0 {
            builder.finish_chunk();
        }
    }
    let table = builder.finalize();
    assert_eq!(table.segment_lens(0).unwrap(), vec![1, 3, 3]);

    let request = ScanRequest::new([0, 2, 1])
        .filter(1, CmpOp::Equal, "College")
        .filter(0, CmpOp::LessEqual, "41")
        .filter(2, CmpOp::GreaterEqual, "3900");
    let out = scan(&table, &request, &ScanOptions::default()).unwrap();

    assert_eq!(out.candidates, CandidateSet::Bounded(vec![1, 3]));
    assert_eq!(
        out.filters.iter().map(|f| f.candidates).collect::<Vec<_>>(),
        vec![3, 2, 2]
    );
    assert_eq!(out.columns[0].values, ColumnValues::Int32(vec![37, 41]));
    assert_eq!(out.columns[1].values, ColumnValues::Float64(vec![4_200.0, 3_900.0]));
    assert_eq!(
        out.columns[2].values,
        ColumnValues::Utf8(vec![Arc::from("College"), Arc::from("College")])
    );

    let indices = scan(
        &table,
        &request,
        &ScanOptions {
            dictionary_output: DictionaryOutput::Indices,
        },
    )
    .unwrap();
    let college = table.dictionary(1).unwrap().translate("College").unwrap();
    assert_eq!(
        indices.columns[2].values,
        ColumnValues::DictionaryIndices(vec![college, college])
    );
}

#[test]
fn ordering_operators_are_rejected_on_strings() {
    let table = MemTable::try_new(vec![MemColumn::utf8(
        "city",
        vec![vec![Arc::from("Oslo"), Arc::from("Lima")]],
    )])
    .unwrap();
    for op in [CmpOp::Greater, CmpOp::GreaterEqual, CmpOp::Less, CmpOp::LessEqual] {
        let err = scan(
            &table,
            &ScanRequest::new([0]).filter(0, op, "Oslo"),
            &ScanOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedOperator { column: 0, .. }));
        assert!(!err.is_backing_store_fault());
    }
}

#[derive(Default)]
struct Calls {
    opened: Cell<usize>,
    skipped: Cell<usize>,
    decoded: Cell<usize>,
}

struct Counting {
    segments: Vec<Vec<i32>>,
    calls: Rc<Calls>,
}

struct CountingDecoder {
    values: Vec<i32>,
    pos: usize,
    calls: Rc<Calls>,
}

impl ValueDecoder for CountingDecoder {
    type Value = i32;

    fn skip(&mut self, n: usize) -> ScanResult<()> {
        self.calls.skipped.set(self.calls.skipped.get() + n);
        self.pos += n;
        Ok(())
    }

    fn next_value(&mut self) -> ScanResult<i32> {
        self.calls.decoded.set(self.calls.decoded.get() + 1);
        self.pos += 1;
        Ok(self.values[self.pos - 1])
    }
}

impl SegmentSource for Counting {
    type Value = i32;
    type Decoder = CountingDecoder;

    fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_len(&self, segment: usize) -> ScanResult<usize> {
        Ok(self.segments[segment].len())
    }

    fn open_segment(&self, segment: usize) -> ScanResult<CountingDecoder> {
        self.calls.opened.set(self.calls.opened.get() + 1);
        Ok(CountingDecoder {
            values: self.segments[segment].clone(),
            pos: 0,
            calls: self.calls.clone(),
        })
    }
}

type CountingColumn = ColumnSource<
    colscan::NoSegments<f64>,
    Counting,
    colscan::NoSegments<Arc<str>>,
    colscan::NoSegments<u32>,
>;

fn counting_column(calls: &Rc<Calls>) -> CountingColumn {
    ColumnSource::Int32(Counting {
        segments: vec![vec![5, 9, 1, 7], vec![], vec![3, 8], vec![2, 6, 4]],
        calls: calls.clone(),
    })
}

#[test]
fn empty_candidates_never_decode() {
    let calls = Rc::new(Calls::default());
    let predicate = Predicate::parse(0, PhysicalType::Int32, CmpOp::Greater, "0").unwrap();

    let out = filter_column(counting_column(&calls), &predicate, &CandidateSet::Empty).unwrap();
    assert_eq!(out, CandidateSet::Empty);
    let values =
        project_column(counting_column(&calls), &CandidateSet::Empty, DictionaryOutput::Strings)
            .unwrap();
    assert_eq!(values, ColumnValues::Int32(Vec::new()));

    assert_eq!(calls.opened.get(), 0);
    assert_eq!(calls.skipped.get(), 0);
    assert_eq!(calls.decoded.get(), 0);
}

#[test]
fn bounded_stages_decode_only_candidates() {
    let calls = Rc::new(Calls::default());
    let incoming = CandidateSet::Bounded(vec![1, 3, 6, 8]);
    let values =
        project_column(counting_column(&calls), &incoming, DictionaryOutput::Strings).unwrap();

    assert_eq!(values, ColumnValues::Int32(vec![9, 7, 2, 4]));
    assert_eq!(calls.decoded.get(), 4);
    // 0 and 2 inside the first segment, 7 inside the last; segment 2 is stepped over.
    assert_eq!(calls.skipped.get(), 3);
    assert_eq!(calls.opened.get(), 2);
}

#[test]
fn candidates_past_the_end_are_rejected() {
    let calls = Rc::new(Calls::default());
    let err = project_column(
        counting_column(&calls),
        &CandidateSet::Bounded(vec![2, 9]),
        DictionaryOutput::Strings,
    )
    .unwrap_err();
    assert!(matches!(err, ScanError::RowOutOfRange { row: 9, rows: 9 }));
}
