/// SQL Demo
///
/// Registers two in-memory tables and runs filters, joins and aggregates.
use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tabula::logging::LogConfig;
use tabula::SessionContext;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (warn level keeps the output readable)
    let _guard = LogConfig::warn().init()?;

    println!("=== Tabula SQL Demo ===\n");

    let customers = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("city", DataType::Utf8, true),
        ])),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
            Arc::new(StringArray::from(vec!["Alice", "Bob", "Carol", "Dave"])),
            Arc::new(StringArray::from(vec![Some("NYC"), Some("LA"), None, Some("NYC")])),
        ],
    )?;
    let orders = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("order_id", DataType::Int64, false),
            Field::new("customer_id", DataType::Int64, false),
            Field::new("total", DataType::Float64, false),
        ])),
        vec![
            Arc::new(Int64Array::from(vec![100, 101, 102, 103, 104])),
            Arc::new(Int64Array::from(vec![1, 1, 2, 4, 4])),
            Arc::new(Float64Array::from(vec![25.0, 14.5, 99.99, 5.25, 60.0])),
        ],
    )?;

    let mut ctx = SessionContext::new();
    ctx.register_record_batch("customers", customers)?;
    ctx.register_record_batch("orders", orders)?;
    println!("Tables: {:?}\n", ctx.table_names());

    println!("1. Filter and sort");
    ctx.sql("SELECT name, city FROM customers WHERE city IS NOT NULL ORDER BY name DESC")?
        .show()?;

    println!("\n2. Join");
    ctx.sql(
        "SELECT c.name, o.order_id, o.total \
         FROM customers c JOIN orders o ON c.id = o.customer_id \
         ORDER BY o.total DESC",
    )?
    .show_limit(3)?;

    println!("\n3. Aggregate per city");
    let df = ctx.sql(
        "SELECT c.city, COUNT(*) AS orders, SUM(o.total) AS revenue \
         FROM customers c LEFT JOIN orders o ON c.id = o.customer_id \
         GROUP BY c.city ORDER BY revenue DESC",
    )?;
    df.show()?;

    println!("\n4. Plan");
    println!("{}", df.explain());

    println!("\n5. Errors are labelled");
    if let Err(err) = ctx.sql("SELECT missing FROM customers") {
        println!("{} (code: {})", err, err.code());
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
