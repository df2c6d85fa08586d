/// Query planner
///
/// Binds a parsed query against a catalog snapshot and produces a typed
/// physical plan.
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tracing::debug;

use super::ast::*;
use super::expr::{
    comparison_op, AggregateExpr, AggregateFunction, PhysicalExpr, ScalarFunction, SortExpr,
};
use super::parser::parse_sql;
use crate::catalog::{Catalog, TableReference};
use crate::error::{Error, Result};
use crate::provider::{ScanPredicate, TableProvider};
use crate::value::{is_integer_type, is_numeric_type, is_string_type, is_supported_type, Value};

/// Physical query plan
#[derive(Debug, Clone)]
pub struct PhysicalPlan {
    pub root: PhysicalOperator,
    /// Schema of the batches the plan produces
    pub schema: SchemaRef,
}

/// Physical operators for query execution
#[derive(Debug, Clone)]
pub enum PhysicalOperator {
    /// A single row with no columns (`SELECT 1`)
    EmptyRelation,
    /// Full scan of a provider; `filters` may let it skip data
    TableScan {
        table: String,
        provider: Arc<dyn TableProvider>,
        filters: Vec<ScanPredicate>,
    },
    /// Keep rows where the predicate is TRUE
    Filter {
        input: Box<PhysicalOperator>,
        predicate: PhysicalExpr,
    },
    /// Compute output columns
    Projection {
        input: Box<PhysicalOperator>,
        exprs: Vec<PhysicalExpr>,
    },
    /// Equi-join on `on` (left index, right index) plus an optional residual filter
    HashJoin {
        left: Box<PhysicalOperator>,
        right: Box<PhysicalOperator>,
        join_type: JoinType,
        on: Vec<(usize, usize)>,
        filter: Option<PhysicalExpr>,
        left_width: usize,
        right_width: usize,
    },
    /// Join on an arbitrary condition
    NestedLoopJoin {
        left: Box<PhysicalOperator>,
        right: Box<PhysicalOperator>,
        join_type: JoinType,
        condition: PhysicalExpr,
        left_width: usize,
        right_width: usize,
    },
    /// Hash grouping; output is group columns followed by aggregates
    Aggregate {
        input: Box<PhysicalOperator>,
        group_by: Vec<PhysicalExpr>,
        aggregates: Vec<AggregateExpr>,
    },
    /// Remove duplicate rows, keeping first occurrence order
    Distinct { input: Box<PhysicalOperator> },
    /// Stable sort
    Sort {
        input: Box<PhysicalOperator>,
        exprs: Vec<SortExpr>,
    },
    /// Skip then fetch rows
    Limit {
        input: Box<PhysicalOperator>,
        skip: usize,
        fetch: Option<usize>,
    },
}

/// A field visible while binding, with the relation it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanField {
    pub qualifier: Option<String>,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// Ordered fields of an operator's output.
#[derive(Debug, Clone, Default)]
pub struct PlanSchema {
    pub fields: Vec<PlanField>,
}

impl PlanSchema {
    fn from_arrow(qualifier: &str, schema: &Schema) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|f| PlanField {
                qualifier: Some(qualifier.to_string()),
                name: f.name().clone(),
                data_type: f.data_type().clone(),
                nullable: f.is_nullable(),
            })
            .collect();
        Self { fields }
    }

    fn join(&self, right: &PlanSchema, join_type: JoinType) -> Self {
        let left_nullable = matches!(join_type, JoinType::Right | JoinType::Full);
        let right_nullable = matches!(join_type, JoinType::Left | JoinType::Full);
        let left = self.fields.iter().map(|f| PlanField {
            nullable: f.nullable || left_nullable,
            ..f.clone()
        });
        let right = right.fields.iter().map(|f| PlanField {
            nullable: f.nullable || right_nullable,
            ..f.clone()
        });
        Self {
            fields: left.chain(right).collect(),
        }
    }

    fn has_qualifier(&self, qualifier: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.qualifier.as_deref() == Some(qualifier))
    }

    /// Resolves a possibly qualified column to its index.
    pub fn index_of(&self, relation: Option<&str>, name: &str) -> Result<usize> {
        let matches: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.name == name && relation.map_or(true, |r| f.qualifier.as_deref() == Some(r))
            })
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [index] => Ok(*index),
            [] => {
                let display = match relation {
                    Some(r) => format!("{}.{}", r, name),
                    None => name.to_string(),
                };
                let valid: Vec<String> = self
                    .fields
                    .iter()
                    .map(|f| match &f.qualifier {
                        Some(q) => format!("{}.{}", q, f.name),
                        None => f.name.clone(),
                    })
                    .collect();
                Err(Error::plan(format!(
                    "No field named {}. Valid fields are [{}]",
                    display,
                    valid.join(", ")
                )))
            }
            _ => Err(Error::plan(format!(
                "Ambiguous reference to unqualified field {}",
                name
            ))),
        }
    }
}

/// An expression with its output type.
#[derive(Debug, Clone, PartialEq)]
struct Bound {
    expr: PhysicalExpr,
    data_type: DataType,
    nullable: bool,
}

impl Bound {
    fn new(expr: PhysicalExpr, data_type: DataType, nullable: bool) -> Self {
        Self {
            expr,
            data_type,
            nullable,
        }
    }
}

/// What column references resolve against while binding.
enum Scope<'a> {
    /// Rows of an operator's input
    Rows(&'a PlanSchema),
    /// Output of an Aggregate: group expressions and aggregate calls
    Aggregated {
        input: &'a PlanSchema,
        groups: &'a [Bound],
        aggregates: &'a [AggregateExpr],
    },
}

impl Scope<'_> {
    fn input(&self) -> &PlanSchema {
        match self {
            Scope::Rows(schema) => schema,
            Scope::Aggregated { input, .. } => input,
        }
    }
}

/// Query planner
pub struct Planner<'a> {
    catalog: &'a Catalog,
}

impl<'a> Planner<'a> {
    /// Create a planner over a catalog snapshot
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Parse and plan SQL text
    pub fn plan_sql(&self, sql: &str) -> Result<PhysicalPlan> {
        let query = parse_sql(sql)?;
        self.plan(&query)
    }

    /// Plan a query
    pub fn plan(&self, query: &Query) -> Result<PhysicalPlan> {
        // Start with base table access
        let (mut plan, input_schema) = self.plan_from(query)?;

        // WHERE
        if let Some(ref where_clause) = query.where_clause {
            let predicate = self.bind_predicate(&where_clause.condition, &Scope::Rows(&input_schema), "WHERE")?;
            plan = PhysicalOperator::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        let items = self.expand_select(&query.select.items, &input_schema)?;
        let order_by = self.resolve_order_by(query, &items)?;

        let mut agg_calls = Vec::new();
        for (expr, _) in &items {
            collect_aggregates(expr, &mut agg_calls);
        }
        if let Some(ref having) = query.having {
            collect_aggregates(&having.condition, &mut agg_calls);
        }
        for item in &order_by {
            collect_aggregates(&item.expr, &mut agg_calls);
        }
        let aggregating =
            query.group_by.is_some() || query.having.is_some() || !agg_calls.is_empty();

        let rows_scope = Scope::Rows(&input_schema);
        let groups: Vec<Bound> = match query.group_by {
            Some(ref group_by) => group_by
                .expressions
                .iter()
                .map(|e| self.bind_expr(e, &rows_scope))
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };
        let mut aggregates: Vec<AggregateExpr> = Vec::new();
        for call in &agg_calls {
            let aggregate = self.bind_aggregate(call, &input_schema)?;
            if !aggregates.contains(&aggregate) {
                aggregates.push(aggregate);
            }
        }

        let scope = if aggregating {
            plan = PhysicalOperator::Aggregate {
                input: Box::new(plan),
                group_by: groups.iter().map(|g| g.expr.clone()).collect(),
                aggregates: aggregates.clone(),
            };
            Scope::Aggregated {
                input: &input_schema,
                groups: &groups,
                aggregates: &aggregates,
            }
        } else {
            Scope::Rows(&input_schema)
        };

        if let Some(ref having) = query.having {
            let predicate = self.bind_predicate(&having.condition, &scope, "HAVING")?;
            plan = PhysicalOperator::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        let projected: Vec<Bound> = items
            .iter()
            .map(|(expr, _)| self.bind_expr(expr, &scope))
            .collect::<Result<_>>()?;
        let fields: Vec<Field> = items
            .iter()
            .zip(&projected)
            .map(|((_, alias), bound)| {
                let name = alias.clone().unwrap_or_else(|| bound.expr.to_string());
                Field::new(name, bound.data_type.clone(), bound.nullable)
            })
            .collect();
        let projection_exprs: Vec<PhysicalExpr> =
            projected.iter().map(|b| b.expr.clone()).collect();

        if query.select.distinct {
            plan = PhysicalOperator::Projection {
                input: Box::new(plan),
                exprs: projection_exprs,
            };
            plan = PhysicalOperator::Distinct {
                input: Box::new(plan),
            };
            if !order_by.is_empty() {
                let exprs = self.bind_distinct_order_by(&order_by, &items, &fields)?;
                plan = PhysicalOperator::Sort {
                    input: Box::new(plan),
                    exprs,
                };
            }
        } else {
            if !order_by.is_empty() {
                let exprs = order_by
                    .iter()
                    .map(|item| {
                        Ok(SortExpr {
                            expr: self.bind_expr(&item.expr, &scope)?.expr,
                            descending: item.direction == OrderDirection::Desc,
                        })
                    })
                    .collect::<Result<_>>()?;
                plan = PhysicalOperator::Sort {
                    input: Box::new(plan),
                    exprs,
                };
            }
            plan = PhysicalOperator::Projection {
                input: Box::new(plan),
                exprs: projection_exprs,
            };
        }

        // LIMIT
        if let Some(ref limit) = query.limit {
            plan = PhysicalOperator::Limit {
                input: Box::new(plan),
                skip: limit.offset.unwrap_or(0),
                fetch: Some(limit.count),
            };
        }

        let plan = PhysicalPlan {
            root: plan,
            schema: Arc::new(Schema::new(fields)),
        };
        debug!(columns = plan.schema.fields().len(), "Planned query");
        Ok(plan)
    }

    fn scan(&self, factor: &TableFactor) -> Result<(PhysicalOperator, PlanSchema)> {
        let reference = TableReference::from_parts(&factor.name)?;
        let provider = self.catalog.table(&reference)?;
        let qualifier = factor.alias.clone().unwrap_or_else(|| reference.table.clone());
        let schema = PlanSchema::from_arrow(&qualifier, &provider.schema());
        let scan = PhysicalOperator::TableScan {
            table: reference.table,
            provider,
            filters: Vec::new(),
        };
        Ok((scan, schema))
    }

    fn plan_from(&self, query: &Query) -> Result<(PhysicalOperator, PlanSchema)> {
        let Some(ref from) = query.from else {
            return Ok((PhysicalOperator::EmptyRelation, PlanSchema::default()));
        };

        let (mut plan, mut schema) = self.scan(&from.relation)?;

        if from.joins.is_empty() {
            // Hand simple comparisons to the provider for pruning
            if let (Some(where_clause), PhysicalOperator::TableScan { filters, .. }) =
                (&query.where_clause, &mut plan)
            {
                *filters = self.scan_predicates(&where_clause.condition, &schema)?;
            }
            return Ok((plan, schema));
        }

        // Plan JOINs
        for join in &from.joins {
            let (right, right_schema) = self.scan(&join.relation)?;
            for field in &right_schema.fields {
                if let Some(ref q) = field.qualifier {
                    if schema.has_qualifier(q) {
                        return Err(Error::plan(format!(
                            "Relation {} appears more than once in FROM; use an alias",
                            q
                        )));
                    }
                }
            }

            let left_width = schema.fields.len();
            let right_width = right_schema.fields.len();
            let joined = schema.join(&right_schema, join.join_type);
            let condition = self.bind_predicate(&join.condition, &Scope::Rows(&joined), "JOIN")?;

            let mut on = Vec::new();
            let mut residual = Vec::new();
            for conjunct in split_conjunction(condition.clone()) {
                match equi_key(&conjunct, &joined, left_width) {
                    Some(key) => on.push(key),
                    None => residual.push(conjunct),
                }
            }

            plan = if on.is_empty() {
                PhysicalOperator::NestedLoopJoin {
                    left: Box::new(plan),
                    right: Box::new(right),
                    join_type: join.join_type,
                    condition,
                    left_width,
                    right_width,
                }
            } else {
                PhysicalOperator::HashJoin {
                    left: Box::new(plan),
                    right: Box::new(right),
                    join_type: join.join_type,
                    on,
                    filter: conjoin(residual),
                    left_width,
                    right_width,
                }
            };
            schema = joined;
        }

        Ok((plan, schema))
    }

    /// `column <op> literal` conjuncts of a WHERE clause, in scan coordinates.
    fn scan_predicates(&self, condition: &Expression, schema: &PlanSchema) -> Result<Vec<ScanPredicate>> {
        let bound = self.bind_expr(condition, &Scope::Rows(schema))?;
        let mut predicates = Vec::new();
        for conjunct in split_conjunction(bound.expr) {
            let PhysicalExpr::Binary { left, op, right } = conjunct else {
                continue;
            };
            let Some(op) = comparison_op(op) else {
                continue;
            };
            let predicate = match (*left, *right) {
                (PhysicalExpr::Column { index, .. }, PhysicalExpr::Literal(value))
                    if !value.is_null() =>
                {
                    ScanPredicate {
                        column: index,
                        op,
                        value,
                    }
                }
                (PhysicalExpr::Literal(value), PhysicalExpr::Column { index, .. })
                    if !value.is_null() =>
                {
                    ScanPredicate {
                        column: index,
                        op: op.swap(),
                        value,
                    }
                }
                _ => continue,
            };
            predicates.push(predicate);
        }
        Ok(predicates)
    }

    /// Expands wildcards; every item becomes an expression with an optional alias.
    fn expand_select(
        &self,
        items: &[SelectItem],
        schema: &PlanSchema,
    ) -> Result<Vec<(Expression, Option<String>)>> {
        let column = |f: &PlanField| Expression::Column {
            relation: f.qualifier.clone(),
            name: f.name.clone(),
        };

        let mut expanded = Vec::new();
        for item in items {
            match item {
                SelectItem::Wildcard => {
                    if schema.fields.is_empty() {
                        return Err(Error::plan(
                            "SELECT * with no tables specified is not valid",
                        ));
                    }
                    expanded.extend(schema.fields.iter().map(|f| (column(f), None)));
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    if !schema.has_qualifier(qualifier) {
                        return Err(Error::plan(format!("Invalid qualifier {}", qualifier)));
                    }
                    expanded.extend(
                        schema
                            .fields
                            .iter()
                            .filter(|f| f.qualifier.as_deref() == Some(qualifier.as_str()))
                            .map(|f| (column(f), None)),
                    );
                }
                SelectItem::Expr { expr, alias } => expanded.push((expr.clone(), alias.clone())),
            }
        }
        Ok(expanded)
    }

    /// Replaces ORDER BY aliases and ordinals with the select expressions they name.
    fn resolve_order_by(
        &self,
        query: &Query,
        items: &[(Expression, Option<String>)],
    ) -> Result<Vec<OrderByItem>> {
        let Some(ref order_by) = query.order_by else {
            return Ok(Vec::new());
        };

        order_by
            .items
            .iter()
            .map(|item| {
                let expr = match &item.expr {
                    Expression::Literal(Literal::Integer(n)) => {
                        let position = usize::try_from(*n).ok().filter(|p| (1..=items.len()).contains(p));
                        match position {
                            Some(p) => items[p - 1].0.clone(),
                            None => {
                                return Err(Error::plan(format!(
                                    "Order by column out of bounds, specified: {}, max: {}",
                                    n,
                                    items.len()
                                )))
                            }
                        }
                    }
                    Expression::Column {
                        relation: None,
                        name,
                    } => items
                        .iter()
                        .find(|(_, alias)| alias.as_deref() == Some(name.as_str()))
                        .map(|(expr, _)| expr.clone())
                        .unwrap_or_else(|| item.expr.clone()),
                    other => other.clone(),
                };
                Ok(OrderByItem {
                    expr,
                    direction: item.direction,
                })
            })
            .collect()
    }

    /// With DISTINCT, sort keys must be output columns.
    fn bind_distinct_order_by(
        &self,
        order_by: &[OrderByItem],
        items: &[(Expression, Option<String>)],
        fields: &[Field],
    ) -> Result<Vec<SortExpr>> {
        order_by
            .iter()
            .map(|item| {
                let index = items
                    .iter()
                    .position(|(expr, _)| expr == &item.expr)
                    .or_else(|| match &item.expr {
                        Expression::Column {
                            relation: None,
                            name,
                        } => fields.iter().position(|f| f.name() == name),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        Error::plan(format!(
                            "For SELECT DISTINCT, ORDER BY expressions must appear in select list: {}",
                            item.expr
                        ))
                    })?;
                Ok(SortExpr {
                    expr: PhysicalExpr::Column {
                        index,
                        name: fields[index].name().clone(),
                    },
                    descending: item.direction == OrderDirection::Desc,
                })
            })
            .collect()
    }

    fn bind_predicate(&self, expr: &Expression, scope: &Scope<'_>, clause: &str) -> Result<PhysicalExpr> {
        let bound = self.bind_expr(expr, scope)?;
        match bound.data_type {
            DataType::Boolean | DataType::Null => Ok(bound.expr),
            other => Err(Error::plan(format!(
                "{} clause must be a boolean expression, found {} of type {}",
                clause, bound.expr, other
            ))),
        }
    }

    fn bind_aggregate(&self, call: &Expression, input: &PlanSchema) -> Result<AggregateExpr> {
        let Expression::Function {
            name,
            args,
            distinct,
        } = call
        else {
            return Err(Error::internal(format!("{} is not an aggregate call", call)));
        };
        let func = AggregateFunction::from_name(name)
            .ok_or_else(|| Error::internal(format!("{} is not an aggregate function", name)))?;

        let arg = match args {
            FunctionArgs::Wildcard if func == AggregateFunction::Count => None,
            FunctionArgs::Wildcard => {
                return Err(Error::plan(format!("{}(*) is not supported", func)));
            }
            FunctionArgs::List(list) if list.len() == 1 => {
                Some(self.bind_expr(&list[0], &Scope::Rows(input))?)
            }
            FunctionArgs::List(list) => {
                return Err(Error::plan(format!(
                    "{} expects exactly one argument, got {}",
                    func,
                    list.len()
                )));
            }
        };

        let data_type = match (&func, &arg) {
            (AggregateFunction::Count, _) => DataType::Int64,
            (_, None) => return Err(Error::internal("aggregate without argument")),
            (AggregateFunction::Sum, Some(arg)) => match &arg.data_type {
                dt if dt.is_signed_integer() => DataType::Int64,
                dt if dt.is_unsigned_integer() => DataType::UInt64,
                dt if dt.is_floating() => DataType::Float64,
                DataType::Null => DataType::Int64,
                other => {
                    return Err(Error::plan(format!(
                        "The function SUM does not support inputs of type {}",
                        other
                    )))
                }
            },
            (AggregateFunction::Avg, Some(arg)) => {
                if !(is_numeric_type(&arg.data_type) || arg.data_type == DataType::Null) {
                    return Err(Error::plan(format!(
                        "The function AVG does not support inputs of type {}",
                        arg.data_type
                    )));
                }
                DataType::Float64
            }
            (AggregateFunction::Min | AggregateFunction::Max, Some(arg)) => arg.data_type.clone(),
        };

        Ok(AggregateExpr {
            func,
            arg: arg.map(|a| a.expr),
            distinct: *distinct,
            data_type,
        })
    }

    fn bind_expr(&self, expr: &Expression, scope: &Scope<'_>) -> Result<Bound> {
        if let Scope::Aggregated {
            input,
            groups,
            aggregates,
        } = scope
        {
            if is_aggregate_call(expr) {
                let aggregate = self.bind_aggregate(expr, input)?;
                let index = aggregates
                    .iter()
                    .position(|a| a == &aggregate)
                    .ok_or_else(|| Error::internal(format!("Aggregate {} was not planned", aggregate)))?;
                let nullable = aggregate.func != AggregateFunction::Count;
                return Ok(Bound::new(
                    PhysicalExpr::Column {
                        index: groups.len() + index,
                        name: aggregate.to_string(),
                    },
                    aggregate.data_type.clone(),
                    nullable,
                ));
            }
            if !contains_aggregate(expr) {
                if let Ok(bound) = self.bind_expr(expr, &Scope::Rows(*input)) {
                    if let Some(index) = groups.iter().position(|g| g.expr == bound.expr) {
                        return Ok(Bound::new(
                            PhysicalExpr::Column {
                                index,
                                name: bound.expr.to_string(),
                            },
                            bound.data_type,
                            bound.nullable,
                        ));
                    }
                }
            }
        }

        match expr {
            Expression::Column { relation, name } => {
                let index = scope.input().index_of(relation.as_deref(), name)?;
                if let Scope::Aggregated { .. } = scope {
                    return Err(Error::plan(format!(
                        "Projection references non-aggregate values: Expression {} could not be resolved from available columns",
                        expr
                    )));
                }
                let field = &scope.input().fields[index];
                Ok(Bound::new(
                    PhysicalExpr::Column {
                        index,
                        name: field.name.clone(),
                    },
                    field.data_type.clone(),
                    field.nullable,
                ))
            }
            Expression::Literal(literal) => {
                let value = match literal {
                    Literal::Integer(i) => Value::Integer(*i),
                    Literal::Float(f) => Value::Float(*f),
                    Literal::String(s) => Value::String(s.clone()),
                    Literal::Boolean(b) => Value::Boolean(*b),
                    Literal::Null => Value::Null,
                };
                let nullable = value.is_null();
                let data_type = value.data_type();
                Ok(Bound::new(PhysicalExpr::Literal(value), data_type, nullable))
            }
            Expression::BinaryOp { left, op, right } => {
                let l = self.bind_expr(left, scope)?;
                let r = self.bind_expr(right, scope)?;
                let data_type = if op.is_comparison() {
                    if !comparable(&l.data_type, &r.data_type) {
                        return Err(Error::plan(format!(
                            "Cannot compare {} ({}) with {} ({})",
                            l.expr, l.data_type, r.expr, r.data_type
                        )));
                    }
                    DataType::Boolean
                } else {
                    arithmetic_type(&l.data_type, *op, &r.data_type)?
                };
                let nullable = l.nullable || r.nullable;
                Ok(Bound::new(
                    PhysicalExpr::Binary {
                        left: Box::new(l.expr),
                        op: *op,
                        right: Box::new(r.expr),
                    },
                    data_type,
                    nullable,
                ))
            }
            Expression::LogicalOp { left, op, right } => {
                let l = self.bind_boolean(left, scope)?;
                let r = self.bind_boolean(right, scope)?;
                let nullable = l.nullable || r.nullable;
                Ok(Bound::new(
                    PhysicalExpr::Logical {
                        left: Box::new(l.expr),
                        op: *op,
                        right: Box::new(r.expr),
                    },
                    DataType::Boolean,
                    nullable,
                ))
            }
            Expression::Not(inner) => {
                let bound = self.bind_boolean(inner, scope)?;
                Ok(Bound::new(
                    PhysicalExpr::Not(Box::new(bound.expr)),
                    DataType::Boolean,
                    bound.nullable,
                ))
            }
            Expression::Negative(inner) => {
                let bound = self.bind_expr(inner, scope)?;
                let data_type = match &bound.data_type {
                    dt if dt.is_signed_integer() || dt.is_floating() => dt.clone(),
                    DataType::Null => DataType::Null,
                    other => {
                        return Err(Error::plan(format!(
                            "Negation only supports signed numeric types, found {}",
                            other
                        )))
                    }
                };
                Ok(Bound::new(
                    PhysicalExpr::Negative(Box::new(bound.expr)),
                    data_type,
                    bound.nullable,
                ))
            }
            Expression::IsNull { expr, negated } => {
                let bound = self.bind_expr(expr, scope)?;
                Ok(Bound::new(
                    PhysicalExpr::IsNull {
                        expr: Box::new(bound.expr),
                        negated: *negated,
                    },
                    DataType::Boolean,
                    false,
                ))
            }
            Expression::Like {
                expr,
                pattern,
                negated,
            } => {
                let bound = self.bind_expr(expr, scope)?;
                if !(is_string_type(&bound.data_type) || bound.data_type == DataType::Null) {
                    return Err(Error::plan(format!(
                        "LIKE requires a string operand, found {} of type {}",
                        bound.expr, bound.data_type
                    )));
                }
                Ok(Bound::new(
                    PhysicalExpr::Like {
                        expr: Box::new(bound.expr),
                        pattern: pattern.clone(),
                        negated: *negated,
                    },
                    DataType::Boolean,
                    bound.nullable,
                ))
            }
            Expression::In {
                expr,
                list,
                negated,
            } => {
                let bound = self.bind_expr(expr, scope)?;
                let mut nullable = bound.nullable;
                let mut items = Vec::with_capacity(list.len());
                for item in list {
                    let item = self.bind_expr(item, scope)?;
                    if !comparable(&bound.data_type, &item.data_type) {
                        return Err(Error::plan(format!(
                            "IN list item {} ({}) is not comparable with {} ({})",
                            item.expr, item.data_type, bound.expr, bound.data_type
                        )));
                    }
                    nullable |= item.nullable;
                    items.push(item.expr);
                }
                Ok(Bound::new(
                    PhysicalExpr::InList {
                        expr: Box::new(bound.expr),
                        list: items,
                        negated: *negated,
                    },
                    DataType::Boolean,
                    nullable,
                ))
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let bound = self.bind_expr(expr, scope)?;
                let low = self.bind_expr(low, scope)?;
                let high = self.bind_expr(high, scope)?;
                for bound_limit in [&low, &high] {
                    if !comparable(&bound.data_type, &bound_limit.data_type) {
                        return Err(Error::plan(format!(
                            "Cannot compare {} ({}) with {} ({})",
                            bound.expr, bound.data_type, bound_limit.expr, bound_limit.data_type
                        )));
                    }
                }
                let nullable = bound.nullable || low.nullable || high.nullable;
                Ok(Bound::new(
                    PhysicalExpr::Between {
                        expr: Box::new(bound.expr),
                        low: Box::new(low.expr),
                        high: Box::new(high.expr),
                        negated: *negated,
                    },
                    DataType::Boolean,
                    nullable,
                ))
            }
            Expression::Cast { expr, data_type } => {
                let bound = self.bind_expr(expr, scope)?;
                if !is_supported_type(data_type) || *data_type == DataType::Null {
                    return Err(Error::not_implemented(format!(
                        "Unsupported CAST to {}",
                        data_type
                    )));
                }
                Ok(Bound::new(
                    PhysicalExpr::Cast {
                        expr: Box::new(bound.expr),
                        data_type: data_type.clone(),
                    },
                    data_type.clone(),
                    bound.nullable,
                ))
            }
            Expression::Function { name, args, .. } => {
                if AggregateFunction::from_name(name).is_some() {
                    return Err(Error::plan(format!(
                        "Aggregate function {} is not allowed here",
                        expr
                    )));
                }
                let func = ScalarFunction::from_name(name)
                    .ok_or_else(|| Error::plan(format!("Invalid function '{}'", name.to_lowercase())))?;
                let FunctionArgs::List(args) = args else {
                    return Err(Error::plan(format!("{}(*) is not supported", func)));
                };
                let args = args
                    .iter()
                    .map(|a| self.bind_expr(a, scope))
                    .collect::<Result<Vec<_>>>()?;
                self.bind_function(func, args)
            }
        }
    }

    fn bind_boolean(&self, expr: &Expression, scope: &Scope<'_>) -> Result<Bound> {
        let bound = self.bind_expr(expr, scope)?;
        match bound.data_type {
            DataType::Boolean | DataType::Null => Ok(bound),
            ref other => Err(Error::plan(format!(
                "Expected a boolean expression, found {} of type {}",
                bound.expr, other
            ))),
        }
    }

    fn bind_function(&self, func: ScalarFunction, args: Vec<Bound>) -> Result<Bound> {
        let arity_error = |expected: &str| {
            Error::plan(format!(
                "Function {} expects {} argument(s), got {}",
                func,
                expected,
                args.len()
            ))
        };

        let (data_type, nullable) = match func {
            ScalarFunction::Coalesce => {
                if args.is_empty() {
                    return Err(arity_error("at least one"));
                }
                let data_type = args
                    .iter()
                    .map(|a| &a.data_type)
                    .find(|dt| **dt != DataType::Null)
                    .cloned()
                    .unwrap_or(DataType::Null);
                if let Some(other) = args.iter().find(|a| !comparable(&data_type, &a.data_type)) {
                    return Err(Error::plan(format!(
                        "coalesce arguments have incompatible types {} and {}",
                        data_type, other.data_type
                    )));
                }
                (data_type, args.iter().all(|a| a.nullable))
            }
            _ => {
                let [arg] = args.as_slice() else {
                    return Err(arity_error("exactly one"));
                };
                let data_type = match (func, &arg.data_type) {
                    (_, DataType::Null) => DataType::Null,
                    (ScalarFunction::Abs, dt) if is_numeric_type(dt) => dt.clone(),
                    (ScalarFunction::Lower | ScalarFunction::Upper, dt) if is_string_type(dt) => {
                        dt.clone()
                    }
                    (ScalarFunction::Length, dt) if is_string_type(dt) => DataType::Int64,
                    (_, other) => {
                        return Err(Error::plan(format!(
                            "Function {} does not support inputs of type {}",
                            func, other
                        )))
                    }
                };
                (data_type, arg.nullable)
            }
        };

        Ok(Bound::new(
            PhysicalExpr::ScalarFunction {
                func,
                args: args.into_iter().map(|a| a.expr).collect(),
            },
            data_type,
            nullable,
        ))
    }
}

fn is_aggregate_call(expr: &Expression) -> bool {
    matches!(expr, Expression::Function { name, .. } if AggregateFunction::from_name(name).is_some())
}

/// Visits the direct children of an AST expression.
fn children(expr: &Expression) -> Vec<&Expression> {
    match expr {
        Expression::Column { .. } | Expression::Literal(_) => vec![],
        Expression::BinaryOp { left, right, .. } | Expression::LogicalOp { left, right, .. } => {
            vec![left, right]
        }
        Expression::Not(e)
        | Expression::Negative(e)
        | Expression::IsNull { expr: e, .. }
        | Expression::Like { expr: e, .. }
        | Expression::Cast { expr: e, .. } => vec![e],
        Expression::In { expr, list, .. } => {
            let mut out: Vec<&Expression> = vec![expr];
            out.extend(list.iter());
            out
        }
        Expression::Between {
            expr, low, high, ..
        } => vec![expr, low, high],
        Expression::Function { args, .. } => match args {
            FunctionArgs::Wildcard => vec![],
            FunctionArgs::List(list) => list.iter().collect(),
        },
    }
}

fn contains_aggregate(expr: &Expression) -> bool {
    is_aggregate_call(expr) || children(expr).into_iter().any(contains_aggregate)
}

/// Collects outermost aggregate calls in evaluation order.
fn collect_aggregates(expr: &Expression, out: &mut Vec<Expression>) {
    if is_aggregate_call(expr) {
        out.push(expr.clone());
        return;
    }
    for child in children(expr) {
        collect_aggregates(child, out);
    }
}

fn comparable(left: &DataType, right: &DataType) -> bool {
    *left == DataType::Null
        || *right == DataType::Null
        || (is_numeric_type(left) && is_numeric_type(right))
        || (is_string_type(left) && is_string_type(right))
        || (*left == DataType::Boolean && *right == DataType::Boolean)
}

fn arithmetic_type(left: &DataType, op: BinaryOperator, right: &DataType) -> Result<DataType> {
    let valid = |dt: &DataType| is_numeric_type(dt) || *dt == DataType::Null;
    if !valid(left) || !valid(right) {
        return Err(Error::plan(format!(
            "Cannot coerce arithmetic expression {} {} {} to valid types",
            left, op, right
        )));
    }
    let data_type = match (left, right) {
        (DataType::Null, DataType::Null) => DataType::Int64,
        (l, r) if l.is_floating() || r.is_floating() => DataType::Float64,
        (l, r)
            if (l.is_unsigned_integer() || *l == DataType::Null)
                && (r.is_unsigned_integer() || *r == DataType::Null) =>
        {
            DataType::UInt64
        }
        _ => DataType::Int64,
    };
    Ok(data_type)
}

fn split_conjunction(expr: PhysicalExpr) -> Vec<PhysicalExpr> {
    match expr {
        PhysicalExpr::Logical {
            left,
            op: LogicalOperator::And,
            right,
        } => {
            let mut out = split_conjunction(*left);
            out.extend(split_conjunction(*right));
            out
        }
        other => vec![other],
    }
}

fn conjoin(exprs: Vec<PhysicalExpr>) -> Option<PhysicalExpr> {
    exprs.into_iter().reduce(|left, right| PhysicalExpr::Logical {
        left: Box::new(left),
        op: LogicalOperator::And,
        right: Box::new(right),
    })
}

/// `left_col = right_col` across the two sides of a join with hash-compatible types.
fn equi_key(expr: &PhysicalExpr, schema: &PlanSchema, left_width: usize) -> Option<(usize, usize)> {
    let PhysicalExpr::Binary {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return None;
    };
    let (PhysicalExpr::Column { index: a, .. }, PhysicalExpr::Column { index: b, .. }) =
        (left.as_ref(), right.as_ref())
    else {
        return None;
    };
    let (l, r) = if *a < left_width && *b >= left_width {
        (*a, *b)
    } else if *b < left_width && *a >= left_width {
        (*b, *a)
    } else {
        return None;
    };

    let category = |dt: &DataType| {
        if is_integer_type(dt) {
            1
        } else if dt.is_floating() {
            2
        } else if is_string_type(dt) {
            3
        } else if *dt == DataType::Boolean {
            4
        } else {
            0
        }
    };
    let (lc, rc) = (
        category(&schema.fields[l].data_type),
        category(&schema.fields[r].data_type),
    );
    (lc != 0 && lc == rc).then_some((l, r - left_width))
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt_indent(f, 0)
    }
}

fn write_exprs<T: fmt::Display>(f: &mut fmt::Formatter<'_>, exprs: &[T]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", expr)?;
    }
    Ok(())
}

impl PhysicalOperator {
    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:width$}", "", width = indent * 2)?;
        match self {
            PhysicalOperator::EmptyRelation => writeln!(f, "EmptyRelation"),
            PhysicalOperator::TableScan {
                table,
                provider,
                filters,
            } => {
                write!(f, "TableScan: {} ({})", table, provider.kind())?;
                if !filters.is_empty() {
                    write!(f, " filters=[")?;
                    write_exprs(f, filters)?;
                    write!(f, "]")?;
                }
                writeln!(f)
            }
            PhysicalOperator::Filter { input, predicate } => {
                writeln!(f, "Filter: {}", predicate)?;
                input.fmt_indent(f, indent + 1)
            }
            PhysicalOperator::Projection { input, exprs } => {
                write!(f, "Projection: ")?;
                write_exprs(f, exprs)?;
                writeln!(f)?;
                input.fmt_indent(f, indent + 1)
            }
            PhysicalOperator::HashJoin {
                left,
                right,
                join_type,
                on,
                filter,
                ..
            } => {
                write!(f, "HashJoin: {} on=[", join_type)?;
                for (i, (l, r)) in on.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "(#{}, #{})", l, r)?;
                }
                write!(f, "]")?;
                if let Some(filter) = filter {
                    write!(f, " filter={}", filter)?;
                }
                writeln!(f)?;
                left.fmt_indent(f, indent + 1)?;
                right.fmt_indent(f, indent + 1)
            }
            PhysicalOperator::NestedLoopJoin {
                left,
                right,
                join_type,
                condition,
                ..
            } => {
                writeln!(f, "NestedLoopJoin: {} on={}", join_type, condition)?;
                left.fmt_indent(f, indent + 1)?;
                right.fmt_indent(f, indent + 1)
            }
            PhysicalOperator::Aggregate {
                input,
                group_by,
                aggregates,
            } => {
                write!(f, "Aggregate: groupBy=[")?;
                write_exprs(f, group_by)?;
                write!(f, "], aggr=[")?;
                write_exprs(f, aggregates)?;
                writeln!(f, "]")?;
                input.fmt_indent(f, indent + 1)
            }
            PhysicalOperator::Distinct { input } => {
                writeln!(f, "Distinct")?;
                input.fmt_indent(f, indent + 1)
            }
            PhysicalOperator::Sort { input, exprs } => {
                write!(f, "Sort: ")?;
                write_exprs(f, exprs)?;
                writeln!(f)?;
                input.fmt_indent(f, indent + 1)
            }
            PhysicalOperator::Limit { input, skip, fetch } => {
                match fetch {
                    Some(fetch) => writeln!(f, "Limit: skip={}, fetch={}", skip, fetch)?,
                    None => writeln!(f, "Limit: skip={}", skip)?,
                }
                input.fmt_indent(f, indent + 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ComparisonOp, MemTable};
    use crate::ErrorCode;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new("tabula", "public");
        let users = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("age", DataType::Int32, true),
        ]);
        let orders = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("user_id", DataType::Int64, false),
            Field::new("amount", DataType::Float64, true),
        ]);
        for (name, schema) in [("users", users), ("orders", orders)] {
            let table = MemTable::try_new(Arc::new(schema), vec![]).unwrap();
            catalog.register_table(name, Arc::new(table)).unwrap();
        }
        catalog
    }

    fn plan(sql: &str) -> Result<PhysicalPlan> {
        let catalog = catalog();
        Planner::new(&catalog).plan_sql(sql)
    }

    fn field_names(plan: &PhysicalPlan) -> Vec<String> {
        plan.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    #[test]
    fn test_select_literal() {
        let plan = plan("SELECT 1").unwrap();
        assert!(matches!(
            plan.root,
            PhysicalOperator::Projection { ref input, .. } if matches!(**input, PhysicalOperator::EmptyRelation)
        ));
        let field = plan.schema.field(0);
        assert_eq!(field.name(), "Int64(1)");
        assert_eq!(field.data_type(), &DataType::Int64);
        assert!(!field.is_nullable());
    }

    #[test]
    fn test_unknown_table() {
        let err = plan("SELECT * FROM data").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
        assert_eq!(
            err.to_string(),
            "Error during planning: 'tabula.public.data' not found"
        );
    }

    #[test]
    fn test_unknown_and_ambiguous_columns() {
        assert_eq!(plan("SELECT nope FROM users").unwrap_err().code(), ErrorCode::Plan);
        let err = plan("SELECT id FROM users JOIN orders ON users.id = orders.user_id").unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }

    #[test]
    fn test_wildcard_and_names() {
        let plan = plan("SELECT *, age + 1, name AS n FROM users").unwrap();
        assert_eq!(
            field_names(&plan),
            vec!["id", "name", "age", "age + Int64(1)", "n"]
        );
        assert_eq!(plan.schema.field(3).data_type(), &DataType::Int64);
    }

    #[test]
    fn test_type_errors() {
        let err = plan("SELECT name + 1 FROM users").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
        let err = plan("SELECT SUM(name) FROM users").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
        let err = plan("SELECT * FROM users WHERE age").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
    }

    #[test]
    fn test_scan_filters_pushed_down() {
        let plan = plan("SELECT name FROM users WHERE 18 < age AND name = 'x' OR id = 1").unwrap();
        // An OR at the top level is not a conjunction of simple comparisons
        let text = plan.to_string();
        assert!(!text.contains("filters="), "{}", text);

        let plan = self::plan("SELECT name FROM users WHERE 18 < age AND name = 'x'").unwrap();
        fn find_filters(op: &PhysicalOperator) -> Vec<ScanPredicate> {
            match op {
                PhysicalOperator::TableScan { filters, .. } => filters.clone(),
                PhysicalOperator::Filter { input, .. } | PhysicalOperator::Projection { input, .. } => {
                    find_filters(input)
                }
                _ => vec![],
            }
        }
        let filters = find_filters(&plan.root);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].column, 2);
        assert_eq!(filters[0].op, ComparisonOp::Gt);
        assert_eq!(filters[0].value, Value::Integer(18));
    }

    #[test]
    fn test_equi_join_uses_hash_join() {
        let plan = plan(
            "SELECT u.name, o.amount FROM users u JOIN orders o ON u.id = o.user_id AND o.amount > 10",
        )
        .unwrap();
        let text = plan.to_string();
        assert!(text.contains("HashJoin: INNER on=[(#0, #1)] filter="), "{}", text);

        let plan = self::plan("SELECT * FROM users u LEFT JOIN orders o ON u.age < o.amount").unwrap();
        assert!(plan.to_string().contains("NestedLoopJoin: LEFT"));
        // Right side of a LEFT join becomes nullable
        assert!(plan.schema.field(3).is_nullable());
    }

    #[test]
    fn test_aggregate_plan() {
        let plan = plan(
            "SELECT name, COUNT(*), SUM(age) AS total, AVG(age) FROM users GROUP BY name HAVING COUNT(*) > 1 ORDER BY total DESC",
        )
        .unwrap();
        assert_eq!(field_names(&plan), vec!["name", "COUNT(*)", "total", "AVG(age)"]);
        let types: Vec<DataType> = plan
            .schema
            .fields()
            .iter()
            .map(|f| f.data_type().clone())
            .collect();
        assert_eq!(
            types,
            vec![DataType::Utf8, DataType::Int64, DataType::Int64, DataType::Float64]
        );
        assert!(!plan.schema.field(1).is_nullable());
        let text = plan.to_string();
        assert!(text.contains("Aggregate: groupBy=[name], aggr=[COUNT(*), SUM(age), AVG(age)]"), "{}", text);
    }

    #[test]
    fn test_ungrouped_column_is_rejected() {
        let err = plan("SELECT name, COUNT(*) FROM users").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
    }

    #[test]
    fn test_order_by_ordinal_and_hidden_column() {
        assert!(plan("SELECT name FROM users ORDER BY age").is_ok());
        assert!(plan("SELECT name, age FROM users ORDER BY 2 DESC").is_ok());
        let err = plan("SELECT name FROM users ORDER BY 3").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
    }

    #[test]
    fn test_distinct_order_by_must_be_selected() {
        assert!(plan("SELECT DISTINCT name FROM users ORDER BY name").is_ok());
        let err = plan("SELECT DISTINCT name FROM users ORDER BY age").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
    }

    #[test]
    fn test_qualified_relation_names() {
        assert!(plan("SELECT * FROM tabula.public.users").is_ok());
        let err = plan("SELECT * FROM other.users").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error during planning: 'tabula.other.users' not found"
        );
    }
}
