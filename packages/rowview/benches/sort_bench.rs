use divan::{black_box, AllocProfiler, Bencher};
use rowview::{ColumnSpec, DataType, TableRef};

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

const SIZES: &[usize] = &[1_000, 10_000, 100_000];

/// Table of `(bucket, score)` rows with plenty of ties on `bucket`.
fn scores(size: usize) -> TableRef {
    let table = TableRef::new(
        "scores",
        vec![
            ColumnSpec::new("bucket", DataType::Int),
            ColumnSpec::new("score", DataType::Double),
        ],
    );
    {
        let mut t = table.write();
        t.add_empty_rows(size).unwrap();
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for row in 0..size {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            t.set_int(0, row, (seed % 64) as i64).unwrap();
            t.set_double(1, row, (seed % 10_000) as f64 / 7.0).unwrap();
        }
    }
    table
}

#[divan::bench(args = SIZES)]
fn sort_single_column(bencher: Bencher, size: usize) {
    let table = scores(size);
    bencher
        .with_inputs(|| table.view_all().unwrap())
        .bench_local_values(|mut view| {
            view.sort(1, true).unwrap();
            black_box(view.size())
        });
}

#[divan::bench(args = SIZES)]
fn sort_two_columns(bencher: Bencher, size: usize) {
    let table = scores(size);
    bencher
        .with_inputs(|| table.view_all().unwrap())
        .bench_local_values(|mut view| {
            view.sort_multi(&[0, 1], &[true, false]).unwrap();
            black_box(view.size())
        });
}

#[divan::bench(args = SIZES)]
fn distinct(bencher: Bencher, size: usize) {
    let table = scores(size);
    bencher.bench_local(|| black_box(table.get_distinct_view(0).unwrap().size()));
}

#[divan::bench(args = SIZES)]
fn resync_after_mutation(bencher: Bencher, size: usize) {
    let table = scores(size);
    let view = table.where_().less(0, 32_i64).find_all().unwrap();
    let mut flip = 0_i64;
    bencher.bench_local(|| {
        flip ^= 1;
        table.write().set_int(0, 0, flip * 40).unwrap();
        black_box(view.sync_if_needed().unwrap())
    });
}
