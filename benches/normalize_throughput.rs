use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use csv_unify::header::FileHeader;
use csv_unify::normalize::normalize_file;
use csv_unify::parse::CsvFormat;
use csv_unify::profile::profile_file;
use csv_unify::schema::{TypeOverrides, unify};
use tempfile::TempDir;

const ROWS: usize = 20_000;

fn generate_trips(dir: &Path, name: &str, trailing: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).expect("create csv");
    writeln!(
        file,
        "VendorID,lpep_pickup_datetime,Passenger_count,Trip_distance,Fare_amount,Store_and_fwd_flag"
    )
    .expect("header");
    for i in 0..ROWS {
        let minute = i % 60;
        let passengers = if i % 17 == 0 { String::new() } else { (i % 5).to_string() };
        let flag = if i % 2 == 0 { "N" } else { "Y" };
        writeln!(
            file,
            "{},2015-03-01 10:{minute:02}:00,{passengers},{}.{},{},{flag}{trailing}",
            i % 2 + 1,
            i % 30,
            i % 100,
            i % 90 + 3
        )
        .expect("row");
    }
    path
}

fn bench_normalize(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("temp dir");
    let clean = generate_trips(temp_dir.path(), "clean.csv", "");
    let repaired = generate_trips(temp_dir.path(), "repaired.csv", ",,");
    let format = CsvFormat::default();

    let header = FileHeader {
        path: clean.clone(),
        columns: [
            "fare_amount",
            "lpep_pickup_datetime",
            "passenger_count",
            "store_and_fwd_flag",
            "trip_distance",
            "vendorid",
            "congestion_surcharge",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect(),
    };
    let mut schema = unify(&[header], &TypeOverrides::default());
    let profile = profile_file(&clean, format).expect("profile");
    schema.resolve_types(&csv_unify::profile::merge_profiles([&profile]));

    let mut group = c.benchmark_group("normalize");
    group.sample_size(20);
    group.bench_function("profile_clean", |b| {
        b.iter(|| profile_file(&clean, format).expect("profile"))
    });
    for (label, source) in [("normalize_clean", &clean), ("normalize_repaired", &repaired)] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || {
                    let out = temp_dir.path().join(format!("out_{label}"));
                    fs::create_dir_all(&out).expect("output dir");
                    out
                },
                |out| normalize_file(source, &schema, &out, format).expect("normalize"),
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
