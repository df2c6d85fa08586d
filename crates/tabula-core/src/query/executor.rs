/// Query executor
///
/// Executes physical plans row by row and encodes the result as Arrow
/// record batches of the planned schema.
use std::collections::{HashMap, HashSet};

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::ast::JoinType;
use super::expr::{AggregateExpr, AggregateFunction, PhysicalExpr, SortExpr};
use super::planner::{PhysicalOperator, PhysicalPlan};
use crate::error::{Error, Result};
use crate::provider::{ScanPredicate, TableProvider};
use crate::value::{build_array, Value};

/// Query result row
pub type Row = Vec<Value>;

/// Default maximum number of rows per output batch.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Query execution context
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Maximum number of rows per produced batch
    pub batch_size: usize,
}

impl ExecutionContext {
    /// Creates a new execution context
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

/// Query executor
pub struct Executor {
    context: ExecutionContext,
}

impl Executor {
    /// Create new executor
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    /// Execute a physical plan
    pub fn execute(&self, plan: &PhysicalPlan) -> Result<Vec<RecordBatch>> {
        let rows = self.execute_operator(&plan.root)?;
        debug!(rows = rows.len(), "Executed plan");
        rows_to_batches(&plan.schema, &rows, self.context.batch_size)
    }

    /// Execute a physical plan and return its rows without encoding them.
    pub fn execute_rows(&self, plan: &PhysicalPlan) -> Result<Vec<Row>> {
        self.execute_operator(&plan.root)
    }

    fn execute_operator(&self, op: &PhysicalOperator) -> Result<Vec<Row>> {
        match op {
            PhysicalOperator::EmptyRelation => Ok(vec![Vec::new()]),
            PhysicalOperator::TableScan {
                table,
                provider,
                filters,
            } => self.execute_table_scan(table, provider.as_ref(), filters),
            PhysicalOperator::Filter { input, predicate } => self.execute_filter(input, predicate),
            PhysicalOperator::Projection { input, exprs } => self.execute_projection(input, exprs),
            PhysicalOperator::HashJoin {
                left,
                right,
                join_type,
                on,
                filter,
                left_width,
                right_width,
            } => self.execute_hash_join(
                left,
                right,
                *join_type,
                on,
                filter.as_ref(),
                *left_width,
                *right_width,
            ),
            PhysicalOperator::NestedLoopJoin {
                left,
                right,
                join_type,
                condition,
                left_width,
                right_width,
            } => self.execute_nested_loop_join(
                left,
                right,
                *join_type,
                condition,
                *left_width,
                *right_width,
            ),
            PhysicalOperator::Aggregate {
                input,
                group_by,
                aggregates,
            } => self.execute_aggregate(input, group_by, aggregates),
            PhysicalOperator::Distinct { input } => self.execute_distinct(input),
            PhysicalOperator::Sort { input, exprs } => self.execute_sort(input, exprs),
            PhysicalOperator::Limit { input, skip, fetch } => {
                let rows = self.execute_operator(input)?;
                let rows = rows.into_iter().skip(*skip);
                Ok(match fetch {
                    Some(fetch) => rows.take(*fetch).collect(),
                    None => rows.collect(),
                })
            }
        }
    }

    fn execute_table_scan(
        &self,
        table: &str,
        provider: &dyn TableProvider,
        filters: &[ScanPredicate],
    ) -> Result<Vec<Row>> {
        let batches = provider.scan(filters, self.context.batch_size)?;

        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(batch_to_rows(batch)?);
        }
        debug!(table, batches = batches.len(), rows = rows.len(), "Scanned table");
        Ok(rows)
    }

    fn execute_filter(&self, input: &PhysicalOperator, predicate: &PhysicalExpr) -> Result<Vec<Row>> {
        let rows = self.execute_operator(input)?;

        let mut filtered = Vec::with_capacity(rows.len());
        for row in rows {
            if predicate.evaluate_predicate(&row)? {
                filtered.push(row);
            }
        }
        Ok(filtered)
    }

    fn execute_projection(&self, input: &PhysicalOperator, exprs: &[PhysicalExpr]) -> Result<Vec<Row>> {
        let rows = self.execute_operator(input)?;

        rows.iter()
            .map(|row| exprs.iter().map(|e| e.evaluate(row)).collect())
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_hash_join(
        &self,
        left: &PhysicalOperator,
        right: &PhysicalOperator,
        join_type: JoinType,
        on: &[(usize, usize)],
        filter: Option<&PhysicalExpr>,
        left_width: usize,
        right_width: usize,
    ) -> Result<Vec<Row>> {
        let left_rows = self.execute_operator(left)?;
        let right_rows = self.execute_operator(right)?;

        // Build on the right side; NULL keys never match
        let mut table: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
        for (i, row) in right_rows.iter().enumerate() {
            if let Some(key) = join_key(row, on.iter().map(|(_, r)| *r)) {
                table.entry(key).or_default().push(i);
            }
        }

        let mut right_matched = vec![false; right_rows.len()];
        let mut result = Vec::new();

        for left_row in &left_rows {
            let mut matched = false;
            let candidates = join_key(left_row, on.iter().map(|(l, _)| *l))
                .and_then(|key| table.get(&key));
            for &i in candidates.into_iter().flatten() {
                let combined = concat_rows(left_row, &right_rows[i]);
                let keep = match filter {
                    Some(filter) => filter.evaluate_predicate(&combined)?,
                    None => true,
                };
                if keep {
                    matched = true;
                    right_matched[i] = true;
                    result.push(combined);
                }
            }
            if !matched && matches!(join_type, JoinType::Left | JoinType::Full) {
                result.push(concat_rows(left_row, &null_row(right_width)));
            }
        }

        if matches!(join_type, JoinType::Right | JoinType::Full) {
            for (row, matched) in right_rows.iter().zip(&right_matched) {
                if !matched {
                    result.push(concat_rows(&null_row(left_width), row));
                }
            }
        }

        Ok(result)
    }

    fn execute_nested_loop_join(
        &self,
        left: &PhysicalOperator,
        right: &PhysicalOperator,
        join_type: JoinType,
        condition: &PhysicalExpr,
        left_width: usize,
        right_width: usize,
    ) -> Result<Vec<Row>> {
        let left_rows = self.execute_operator(left)?;
        let right_rows = self.execute_operator(right)?;

        let mut right_matched = vec![false; right_rows.len()];
        let mut result = Vec::new();

        for left_row in &left_rows {
            let mut matched = false;
            for (i, right_row) in right_rows.iter().enumerate() {
                let combined = concat_rows(left_row, right_row);
                if condition.evaluate_predicate(&combined)? {
                    matched = true;
                    right_matched[i] = true;
                    result.push(combined);
                }
            }
            if !matched && matches!(join_type, JoinType::Left | JoinType::Full) {
                result.push(concat_rows(left_row, &null_row(right_width)));
            }
        }

        if matches!(join_type, JoinType::Right | JoinType::Full) {
            for (row, matched) in right_rows.iter().zip(&right_matched) {
                if !matched {
                    result.push(concat_rows(&null_row(left_width), row));
                }
            }
        }

        Ok(result)
    }

    fn execute_aggregate(
        &self,
        input: &PhysicalOperator,
        group_by: &[PhysicalExpr],
        aggregates: &[AggregateExpr],
    ) -> Result<Vec<Row>> {
        let rows = self.execute_operator(input)?;

        // Groups in first-seen order
        let mut index: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut groups: Vec<(Row, Vec<Accumulator>)> = Vec::new();

        for row in &rows {
            let key_values = group_by
                .iter()
                .map(|e| e.evaluate(row))
                .collect::<Result<Row>>()?;
            let mut key = Vec::new();
            key_values.iter().for_each(|v| v.encode_key(&mut key));

            let slot = match index.get(&key) {
                Some(slot) => *slot,
                None => {
                    let accumulators = aggregates.iter().map(Accumulator::new).collect();
                    groups.push((key_values, accumulators));
                    index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };

            for (accumulator, aggregate) in groups[slot].1.iter_mut().zip(aggregates) {
                let value = match &aggregate.arg {
                    Some(arg) => arg.evaluate(row)?,
                    // COUNT(*) counts every row
                    None => Value::Boolean(true),
                };
                accumulator.update(value)?;
            }
        }

        // A global aggregate over no rows still yields one row
        if groups.is_empty() && group_by.is_empty() {
            groups.push((Vec::new(), aggregates.iter().map(Accumulator::new).collect()));
        }

        groups
            .into_iter()
            .map(|(mut row, accumulators)| {
                for accumulator in accumulators {
                    row.push(accumulator.finish()?);
                }
                Ok(row)
            })
            .collect()
    }

    fn execute_distinct(&self, input: &PhysicalOperator) -> Result<Vec<Row>> {
        let rows = self.execute_operator(input)?;

        let mut seen = HashSet::new();
        Ok(rows
            .into_iter()
            .filter(|row| {
                let mut key = Vec::new();
                row.iter().for_each(|v| v.encode_key(&mut key));
                seen.insert(key)
            })
            .collect())
    }

    fn execute_sort(&self, input: &PhysicalOperator, exprs: &[SortExpr]) -> Result<Vec<Row>> {
        let rows = self.execute_operator(input)?;

        let mut keyed = rows
            .into_iter()
            .map(|row| {
                let keys = exprs
                    .iter()
                    .map(|e| e.expr.evaluate(&row))
                    .collect::<Result<Vec<_>>>()?;
                Ok((keys, row))
            })
            .collect::<Result<Vec<_>>>()?;

        // Vec::sort_by is stable
        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), sort) in a.iter().zip(b).zip(exprs) {
                let ordering = x.sort_cmp(y);
                let ordering = if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

fn join_key(row: &[Value], columns: impl Iterator<Item = usize>) -> Option<Vec<u8>> {
    let mut key = Vec::new();
    for column in columns {
        let value = row.get(column)?;
        if value.is_null() {
            return None;
        }
        value.encode_key(&mut key);
    }
    Some(key)
}

fn concat_rows(left: &[Value], right: &[Value]) -> Row {
    let mut row = Vec::with_capacity(left.len() + right.len());
    row.extend_from_slice(left);
    row.extend_from_slice(right);
    row
}

fn null_row(width: usize) -> Row {
    vec![Value::Null; width]
}

/// Decodes every row of a batch.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    (0..batch.num_rows())
        .map(|i| {
            batch
                .columns()
                .iter()
                .map(|column| Value::from_array(column.as_ref(), i))
                .collect()
        })
        .collect()
}

/// Encodes rows into batches of at most `batch_size` rows.
pub fn rows_to_batches(schema: &SchemaRef, rows: &[Row], batch_size: usize) -> Result<Vec<RecordBatch>> {
    rows.chunks(batch_size.max(1))
        .map(|chunk| {
            let columns = schema
                .fields()
                .iter()
                .enumerate()
                .map(|(i, field)| build_array(field.data_type(), chunk.iter().map(|row| &row[i])))
                .collect::<Result<Vec<ArrayRef>>>()?;
            RecordBatch::try_new(schema.clone(), columns).map_err(Error::from)
        })
        .collect()
}

/// Running state of one aggregate within one group.
#[derive(Debug)]
struct Accumulator {
    func: AggregateFunction,
    data_type: DataType,
    /// Keys already seen, for DISTINCT aggregates
    seen: Option<HashSet<Vec<u8>>>,
    count: i64,
    int_sum: i128,
    float_sum: f64,
    best: Option<Value>,
}

impl Accumulator {
    fn new(aggregate: &AggregateExpr) -> Self {
        Self {
            func: aggregate.func,
            data_type: aggregate.data_type.clone(),
            seen: aggregate.distinct.then(HashSet::new),
            count: 0,
            int_sum: 0,
            float_sum: 0.0,
            best: None,
        }
    }

    fn update(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        if let Some(seen) = &mut self.seen {
            let mut key = Vec::new();
            value.encode_key(&mut key);
            if !seen.insert(key) {
                return Ok(());
            }
        }

        self.count += 1;
        match self.func {
            AggregateFunction::Count => {}
            AggregateFunction::Sum | AggregateFunction::Avg => match &value {
                Value::Float(f) => self.float_sum += f,
                other => {
                    let v = other.as_i128().ok_or_else(|| {
                        Error::execution(format!("Cannot sum non-numeric value {}", other))
                    })?;
                    self.int_sum = self
                        .int_sum
                        .checked_add(v)
                        .ok_or_else(|| Error::execution("Integer overflow in SUM"))?;
                }
            },
            AggregateFunction::Min | AggregateFunction::Max => {
                let replace = match &self.best {
                    None => true,
                    Some(best) => match value.compare(best) {
                        Some(std::cmp::Ordering::Less) => self.func == AggregateFunction::Min,
                        Some(std::cmp::Ordering::Greater) => self.func == AggregateFunction::Max,
                        _ => false,
                    },
                };
                if replace {
                    self.best = Some(value);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Value> {
        if self.func == AggregateFunction::Count {
            return Ok(Value::Integer(self.count));
        }
        if self.count == 0 {
            return Ok(Value::Null);
        }
        match self.func {
            AggregateFunction::Sum => match self.data_type {
                DataType::Float64 => Ok(Value::Float(self.float_sum + self.int_sum as f64)),
                DataType::UInt64 => u64::try_from(self.int_sum)
                    .map(Value::UInteger)
                    .map_err(|_| Error::execution("Integer overflow in SUM")),
                _ => i64::try_from(self.int_sum)
                    .map(Value::Integer)
                    .map_err(|_| Error::execution("Integer overflow in SUM")),
            },
            AggregateFunction::Avg => Ok(Value::Float(
                (self.float_sum + self.int_sum as f64) / self.count as f64,
            )),
            _ => Ok(self.best.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::provider::MemTable;
    use crate::query::planner::Planner;
    use arrow::array::{Array, Float64Array, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new("tabula", "public");

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("dept", DataType::Utf8, true),
            Field::new("salary", DataType::Int32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])),
                Arc::new(StringArray::from(vec![
                    Some("alice"),
                    Some("bob"),
                    Some("carol"),
                    Some("dave"),
                    None,
                ])),
                Arc::new(StringArray::from(vec![
                    Some("eng"),
                    Some("eng"),
                    Some("ops"),
                    None,
                    Some("ops"),
                ])),
                Arc::new(Int32Array::from(vec![Some(100), Some(80), Some(90), None, Some(70)])),
            ],
        )
        .unwrap();
        let table = MemTable::try_new(schema, vec![batch]).unwrap();
        catalog.register_table("emp", Arc::new(table)).unwrap();

        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("budget", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["eng", "sales"])),
                Arc::new(Float64Array::from(vec![1000.0, 500.0])),
            ],
        )
        .unwrap();
        let table = MemTable::try_new(schema, vec![batch]).unwrap();
        catalog.register_table("dept", Arc::new(table)).unwrap();

        catalog
    }

    fn run(sql: &str) -> Result<Vec<Row>> {
        let catalog = catalog();
        let plan = Planner::new(&catalog).plan_sql(sql)?;
        Executor::new(ExecutionContext::default()).execute_rows(&plan)
    }

    fn int(i: i64) -> Value {
        Value::Integer(i)
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_select_one() {
        let catalog = catalog();
        let plan = Planner::new(&catalog).plan_sql("SELECT 1").unwrap();
        let batches = Executor::new(ExecutionContext::default())
            .execute(&plan)
            .unwrap();
        assert_eq!(batches.len(), 1);
        let column = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(column.len(), 1);
        assert_eq!(column.value(0), 1);
        assert_eq!(column.null_count(), 0);
    }

    #[test]
    fn test_filter_with_nulls() {
        let rows = run("SELECT id FROM emp WHERE salary >= 80").unwrap();
        assert_eq!(rows, vec![vec![int(1)], vec![int(2)], vec![int(3)]]);

        let rows = run("SELECT id FROM emp WHERE name IS NULL OR dept IS NULL").unwrap();
        assert_eq!(rows, vec![vec![int(4)], vec![int(5)]]);
    }

    #[test]
    fn test_sort_nulls_last_and_first() {
        let rows = run("SELECT salary FROM emp ORDER BY salary").unwrap();
        let last = rows.last().unwrap();
        assert_eq!(last, &vec![Value::Null]);

        let rows = run("SELECT salary FROM emp ORDER BY salary DESC").unwrap();
        assert_eq!(rows[0], vec![Value::Null]);
        assert_eq!(rows[1], vec![int(100)]);
    }

    #[test]
    fn test_group_by_keeps_first_seen_order() {
        let rows = run(
            "SELECT dept, COUNT(*), SUM(salary), MIN(name), COUNT(name) FROM emp GROUP BY dept",
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![text("eng"), int(2), int(180), text("alice"), int(2)],
                vec![text("ops"), int(2), int(160), text("carol"), int(1)],
                vec![Value::Null, int(1), Value::Null, text("dave"), int(1)],
            ]
        );
    }

    #[test]
    fn test_global_aggregate_on_empty_input() {
        let rows = run("SELECT COUNT(*), SUM(salary), AVG(salary) FROM emp WHERE id > 100").unwrap();
        assert_eq!(rows, vec![vec![int(0), Value::Null, Value::Null]]);

        let rows = run("SELECT dept, COUNT(*) FROM emp WHERE id > 100 GROUP BY dept").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_having_and_count_distinct() {
        let rows = run(
            "SELECT dept, AVG(salary) AS avg FROM emp GROUP BY dept HAVING COUNT(*) > 1 ORDER BY avg DESC",
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![text("eng"), Value::Float(90.0)],
                vec![text("ops"), Value::Float(80.0)],
            ]
        );

        let rows = run("SELECT COUNT(DISTINCT dept) FROM emp").unwrap();
        assert_eq!(rows, vec![vec![int(2)]]);
    }

    #[test]
    fn test_joins() {
        let rows = run(
            "SELECT e.id, d.budget FROM emp e JOIN dept d ON e.dept = d.name ORDER BY e.id",
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![int(1), Value::Float(1000.0)],
                vec![int(2), Value::Float(1000.0)],
            ]
        );

        let rows = run("SELECT e.id, d.name FROM emp e LEFT JOIN dept d ON e.dept = d.name").unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[2], vec![int(3), Value::Null]);

        let rows = run("SELECT e.id, d.name FROM emp e FULL JOIN dept d ON e.dept = d.name").unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[5], vec![Value::Null, text("sales")]);

        let rows = run("SELECT e.id, d.name FROM emp e RIGHT JOIN dept d ON e.salary * 10 > d.budget")
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![int(1), text("sales")],
                vec![int(2), text("sales")],
                vec![int(3), text("sales")],
                vec![int(5), text("sales")],
                vec![Value::Null, text("eng")],
            ]
        );
    }

    #[test]
    fn test_distinct_limit_offset() {
        let rows = run("SELECT DISTINCT dept FROM emp ORDER BY dept").unwrap();
        assert_eq!(rows, vec![vec![text("eng")], vec![text("ops")], vec![Value::Null]]);

        let rows = run("SELECT id FROM emp ORDER BY id LIMIT 2 OFFSET 1").unwrap();
        assert_eq!(rows, vec![vec![int(2)], vec![int(3)]]);
    }

    #[test]
    fn test_divide_by_zero_fails_execution() {
        let err = run("SELECT id / 0 FROM emp").unwrap_err();
        assert_eq!(err.to_string(), "Execution error: Divide by zero error");
    }

    #[test]
    fn test_lossy_output_cast_fails() {
        let catalog = catalog();
        let plan = Planner::new(&catalog)
            .plan_sql("SELECT CAST(id * 100 AS TINYINT) FROM emp")
            .unwrap();
        let err = Executor::new(ExecutionContext::default())
            .execute(&plan)
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Execution);
    }

    #[test]
    fn test_batches_are_split() {
        let catalog = catalog();
        let plan = Planner::new(&catalog).plan_sql("SELECT * FROM emp").unwrap();
        let batches = Executor::new(ExecutionContext::new(2)).execute(&plan).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[0].schema(), plan.schema);
    }
}
