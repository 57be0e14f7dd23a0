use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use rowforge_core::{Aggregator, DistributionHolder, GeneratedRow, GeneratedValue, Result};
use rowforge_generate::aggregators::{CsvRowWriter, FieldHistogram, RowCollector, RowCounter};
use rowforge_generate::{
    Coordinator, CoordinatorState, DistributionSpec, FieldSpec, GenerationError,
    GenerationOptions, build_holder,
};

fn people() -> DistributionHolder {
    let fields = vec![
        FieldSpec {
            name: "age".to_string(),
            distribution: DistributionSpec::IntRange { min: 0, max: 99 },
        },
        FieldSpec {
            name: "band".to_string(),
            distribution: DistributionSpec::Bucket {
                source: "age".to_string(),
                thresholds: vec![18, 65],
                labels: vec!["minor".into(), "adult".into(), "senior".into()],
            },
        },
        FieldSpec {
            name: "token".to_string(),
            distribution: DistributionSpec::Uuid,
        },
    ];
    build_holder(&fields).expect("build distributions")
}

fn options(workers: usize, rows: u64) -> GenerationOptions {
    GenerationOptions::default()
        .with_seed(Some(1234))
        .with_processes(workers)
        .with_rows(rows)
        .with_batch_size(5)
}

fn run(options: GenerationOptions) -> rowforge_core::AggregateResults {
    let mut coordinator = Coordinator::new(options, people()).expect("coordinator");
    let results = coordinator.start().expect("generation");
    assert_eq!(coordinator.state(), CoordinatorState::Terminated);
    results
}

fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rowforge-{label}-{}", uuid::Uuid::new_v4()))
}

#[test]
fn counter_sees_every_row() {
    for workers in [1, 2] {
        let results = run(options(workers, 100).with_aggregator(RowCounter));
        assert_eq!(results.into_typed::<u64>(), Some(vec![100]), "{workers} workers");
    }
}

#[test]
fn zero_rows_is_rejected() {
    let err = Coordinator::new(options(1, 0).with_aggregator(RowCounter), people())
        .err()
        .expect("zero rows must fail");
    assert_eq!(err.core_cause().map(|err| err.kind()), Some("invalid_argument"));
}

#[test]
fn rows_do_not_depend_on_worker_count() {
    let collect = || RowCollector::new(["id", "age", "band", "token"]);
    let single = run(options(1, 2_345).with_aggregator(collect()));
    let pooled = run(options(3, 2_345).with_aggregator(collect()));

    type Rows = BTreeMap<u64, Vec<GeneratedValue>>;
    let single = single.get::<Rows>(0).expect("rows").clone();
    let pooled = pooled.get::<Rows>(0).expect("rows").clone();
    assert_eq!(single.len(), 2_345);
    assert_eq!(single, pooled);

    let tokens: HashSet<_> = single.values().map(|values| values[3].to_csv()).collect();
    assert_eq!(tokens.len(), 2_345);
}

#[test]
fn histograms_merge_across_workers() {
    let histogram = |workers| {
        run(options(workers, 500).with_aggregator(FieldHistogram::new("band")))
            .into_typed::<BTreeMap<String, u64>>()
            .expect("histogram")
            .remove(0)
    };
    let single = histogram(1);
    assert_eq!(single.values().sum::<u64>(), 500);
    assert_eq!(single, histogram(4));
}

#[test]
fn unseeded_runs_still_cover_every_row() {
    let results = run(options(2, 321).with_seed(None).with_aggregator(RowCollector::new(["id"])));
    let rows = results
        .get::<BTreeMap<u64, Vec<GeneratedValue>>>(0)
        .expect("rows");
    assert_eq!(rows.len(), 321);
}

#[test]
fn results_keep_aggregator_order() {
    let results = run(
        options(2, 40)
            .with_aggregator(FieldHistogram::new("band"))
            .with_aggregator(RowCounter),
    );
    assert_eq!(results.names(), ["field_histogram", "row_counter"]);
    assert_eq!(results.get::<u64>(1), Some(&40));
}

#[derive(Clone, Default)]
struct MapTally {
    maps: u64,
}

impl Aggregator for MapTally {
    type Output = u64;

    fn name(&self) -> &str {
        "map_tally"
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn map(&mut self, _row: &GeneratedRow) -> Result<u64> {
        self.maps += 1;
        Ok(self.maps)
    }

    fn reduce(&mut self, larger: u64, smaller: u64) -> Result<u64> {
        Ok(larger.max(smaller))
    }
}

#[test]
fn coordinator_copy_never_maps() {
    for workers in [1, 3] {
        let mut coordinator =
            Coordinator::new(options(workers, 60).with_aggregator(MapTally::default()), people())
                .expect("coordinator");
        let results = coordinator.start().expect("generation");
        assert!(results.get::<u64>(0).copied().unwrap_or_default() > 0);

        let own = coordinator.aggregators()[0]
            .as_any()
            .downcast_ref::<MapTally>()
            .expect("map tally");
        assert_eq!(own.maps, 0, "{workers} workers");
    }
}

#[test]
fn coordinator_cannot_be_restarted() {
    let mut coordinator =
        Coordinator::new(options(1, 10).with_aggregator(RowCounter), people()).expect("coordinator");
    assert_eq!(coordinator.state(), CoordinatorState::Filling);
    coordinator.start().expect("first run");
    let err = coordinator.start().unwrap_err();
    assert_eq!(err.core_cause().map(|err| err.kind()), Some("invalid_argument"));
}

#[test]
fn csv_files_partition_the_rows() {
    let dir = temp_dir("partition");
    let results = run(
        options(2, 250)
            .with_aggregator(CsvRowWriter::new(&dir, ["id", "band"]))
            .with_aggregator(RowCounter),
    );
    assert_eq!(results.get::<u64>(0), Some(&250));

    let mut files = 0;
    let mut ids = HashSet::new();
    for entry in std::fs::read_dir(&dir).expect("read output dir") {
        let path = entry.expect("dir entry").path();
        files += 1;
        let mut reader = csv::Reader::from_path(&path).expect("open csv");
        let headers: Vec<String> = reader
            .headers()
            .expect("headers")
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(headers, ["id", "band"]);
        for record in reader.records() {
            let record = record.expect("csv record");
            assert!(ids.insert(record[0].to_string()), "row {} written twice", &record[0]);
        }
    }
    assert_eq!(files, 2);
    assert_eq!(ids.len(), 250);
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn async_start_matches_blocking_start() {
    let mut coordinator =
        Coordinator::new(options(2, 75).with_aggregator(RowCounter), people()).expect("coordinator");
    let results = coordinator.start_async().await.expect("generation");
    assert_eq!(results.get::<u64>(0), Some(&75));
    assert!(matches!(coordinator.start_async().await, Err(GenerationError::Core(_))));
}
