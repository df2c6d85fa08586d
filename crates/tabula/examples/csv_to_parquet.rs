/// CSV to Parquet Demo
///
/// Writes a partitioned CSV directory, queries it, and converts the result
/// to Parquet with small row groups.
use std::fs;

use tabula::{
    Compression, CsvReadOptions, ParquetReadOptions, SessionContext, WriterProperties,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Tabula CSV to Parquet Demo ===\n");

    let dir = tempfile::tempdir()?;
    let raw = dir.path().join("raw");
    for (month, rows) in [
        ("01", "station,temp\nbergen,2.5\noslo,-4.0\n"),
        ("02", "station,temp\nbergen,3.0\noslo,-1.5\ntromso,-9.25\n"),
    ] {
        let partition = raw.join(format!("month={}", month));
        fs::create_dir_all(&partition)?;
        fs::write(partition.join("readings.csv"), rows)?;
    }

    let mut ctx = SessionContext::new();
    let mut csv = CsvReadOptions::new();
    csv.set_table_partition_column_names(&["month"]);
    ctx.register_csv("readings", &raw, &csv)?;

    println!("1. Raw readings");
    ctx.table("readings")?.show()?;

    println!("\n2. Convert February to Parquet");
    let mut props = WriterProperties::new();
    props
        .set_max_row_group_size(2)
        .set_compression(Compression::Snappy);
    let path = ctx
        .sql("SELECT station, temp FROM readings WHERE month = '02' ORDER BY temp")?
        .write_parquet(dir.path().join("february"), Some(&props))?;
    println!("Wrote {}", path.display());

    println!("\n3. Query the Parquet output");
    ctx.register_parquet("february", dir.path().join("february"), &ParquetReadOptions::new())?;
    ctx.sql("SELECT station, temp FROM february WHERE temp < 0")?
        .show()?;

    println!("\n=== Demo Complete ===");
    Ok(())
}
