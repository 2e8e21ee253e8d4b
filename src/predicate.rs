//! Base query predicates and their geohash-bound form.
//!
//! Callers supply a query in the store's native language without a geohash
//! clause, e.g. `SELECT * FROM ffMarker WHERE category = 'cafe'`. Each
//! sub-box then binds its own [`GeohashInterval`], producing a [`BoundQuery`]
//! that renders as `... AND geohash > 'start' AND geohash < 'end' ORDER BY geohash`.
//!
//! Only single-range predicates are accepted: shapes that the store would
//! expand into several queries (`IN`, `!=`), extra inequality filters, or
//! explicit ordering are rejected when the predicate is parsed.

use crate::bbox::GeohashInterval;
use crate::error::{Result, SearchError};
use crate::types::Entity;
use serde_json::Value;
use sqlparser::ast::{
    BinaryOperator, Expr, Query, SelectItem, SetExpr, Statement, TableFactor, UnaryOperator,
    Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use sqlparser::tokenizer::Tokenizer;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Name of the indexed geohash property.
pub const GEOHASH_PROPERTY: &str = "geohash";

/// Projection selecting keys instead of whole entities.
pub const KEY_PROPERTY: &str = "__key__";

/// Equality filter `property = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    kind: String,
    keys_only: bool,
    filters: Vec<Filter>,
}

impl Predicate {
    pub fn parse(query: &str) -> Result<Self> {
        parse_statement(query)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// True for `SELECT __key__` queries, which return keys instead of entities.
    pub fn keys_only(&self) -> bool {
        self.keys_only
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether an entity satisfies the kind and every equality filter.
    pub fn matches(&self, entity: &Entity) -> bool {
        entity.key.kind == self.kind
            && self
                .filters
                .iter()
                .all(|f| entity.property(&f.property) == Some(&f.value))
    }

    /// Composite index the store needs to serve this predicate with a
    /// geohash range, in index.yaml form.
    pub fn suggested_index(&self) -> String {
        let mut yaml = format!("indexes:\n- kind: {}\n  properties:\n", self.kind);
        for filter in &self.filters {
            yaml.push_str(&format!("  - name: {}\n", filter.property));
        }
        yaml.push_str(&format!("  - name: {GEOHASH_PROPERTY}\n"));
        yaml
    }

    pub fn bind(self: &Arc<Self>, interval: GeohashInterval) -> BoundQuery {
        BoundQuery {
            predicate: Arc::clone(self),
            interval,
        }
    }
}

impl FromStr for Predicate {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let projection = if self.keys_only { KEY_PROPERTY } else { "*" };
        write!(f, "SELECT {projection} FROM {}", self.kind)?;
        for (i, filter) in self.filters.iter().enumerate() {
            let joiner = if i == 0 { "WHERE" } else { "AND" };
            write!(f, " {joiner} {} = {}", filter.property, literal(&filter.value))?;
        }
        Ok(())
    }
}

/// A predicate restricted to one geohash interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub predicate: Arc<Predicate>,
    pub interval: GeohashInterval,
}

impl BoundQuery {
    /// Whether an entity falls inside the predicate and the interval.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.interval.contains(&entity.geohash) && self.predicate.matches(entity)
    }
}

impl fmt::Display for BoundQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joiner = if self.predicate.filters.is_empty() {
            "WHERE"
        } else {
            "AND"
        };
        write!(
            f,
            "{} {joiner} {GEOHASH_PROPERTY} > '{}' AND {GEOHASH_PROPERTY} < '{}' ORDER BY {GEOHASH_PROPERTY}",
            self.predicate, self.interval.start, self.interval.end
        )
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn parse_statement(query: &str) -> Result<Predicate> {
    let dialect = GenericDialect {};
    let mut tokenizer = Tokenizer::new(&dialect, query);
    let tokens = tokenizer
        .tokenize()
        .map_err(|e| malformed(&e.to_string()))?;
    let statements = SqlParser::new(&dialect)
        .with_tokens(tokens)
        .parse_statements()
        .map_err(|e| malformed(&e.to_string()))?;

    match statements.as_slice() {
        [Statement::Query(query)] => from_query(query),
        _ => Err(malformed("expected a single SELECT statement")),
    }
}

fn from_query(query: &Query) -> Result<Predicate> {
    if query.with.is_some() {
        return Err(malformed("WITH clauses are not supported"));
    }
    if query.order_by.is_some() {
        return Err(malformed("results are always ordered by geohash"));
    }
    if query.limit.is_some() || query.offset.is_some() || query.fetch.is_some() {
        return Err(malformed("limits are assigned per sub-query by the search"));
    }
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(malformed("compound queries expand into multiple queries"));
    };
    if select.distinct.is_some() || select.having.is_some() {
        return Err(malformed("only plain SELECT queries are supported"));
    }

    let keys_only = match select.projection.as_slice() {
        [SelectItem::Wildcard(_)] => false,
        [SelectItem::UnnamedExpr(Expr::Identifier(ident))] if ident.value == KEY_PROPERTY => true,
        _ => return Err(malformed("only SELECT * and SELECT __key__ are supported")),
    };

    let kind = match select.from.as_slice() {
        [table] if table.joins.is_empty() => match &table.relation {
            TableFactor::Table { name, .. } => match name.0.as_slice() {
                [ident] => ident.value.clone(),
                _ => return Err(malformed(&format!("'{name}' is not a kind"))),
            },
            _ => return Err(malformed("expected a kind after FROM")),
        },
        _ => return Err(malformed("expected exactly one kind after FROM")),
    };

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    Ok(Predicate {
        kind,
        keys_only,
        filters,
    })
}

/// Flatten an `AND` chain of equalities into filters.
fn collect_filters(expr: &Expr, filters: &mut Vec<Filter>) -> Result<()> {
    match expr {
        Expr::Nested(inner) => collect_filters(inner, filters),
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                collect_filters(left, filters)?;
                collect_filters(right, filters)
            }
            BinaryOperator::Eq => {
                filters.push(Filter {
                    property: property(left)?,
                    value: literal_value(right)?,
                });
                Ok(())
            }
            BinaryOperator::Or => Err(malformed("OR filters expand into multiple queries")),
            BinaryOperator::NotEq => Err(malformed("!= filters expand into multiple queries")),
            BinaryOperator::Gt | BinaryOperator::Lt | BinaryOperator::GtEq | BinaryOperator::LtEq => {
                let property = property(left)?;
                Err(malformed(&format!(
                    "inequality filter '{property} {op}' conflicts with the geohash range"
                )))
            }
            other => Err(malformed(&format!("unsupported operator {other}"))),
        },
        Expr::InList { .. } | Expr::InSubquery { .. } => {
            Err(malformed("IN filters expand into multiple queries"))
        }
        other => Err(malformed(&format!("unsupported filter {other}"))),
    }
}

fn property(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Identifier(ident) if ident.value == GEOHASH_PROPERTY => {
            Err(malformed("the geohash range is added by the search itself"))
        }
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        other => Err(malformed(&format!("expected a property name, found {other}"))),
    }
}

fn literal_value(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Value(SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s)) => {
            Ok(Value::String(s.clone()))
        }
        Expr::Value(SqlValue::Boolean(b)) => Ok(Value::Bool(*b)),
        Expr::Value(SqlValue::Null) => Ok(Value::Null),
        Expr::Value(SqlValue::Number(n, _)) => number(n),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match expr.as_ref() {
            Expr::Value(SqlValue::Number(n, _)) => number(&format!("-{n}")),
            other => Err(malformed(&format!("'-{other}' is not a literal"))),
        },
        // Double quotes are string literals in the store's query language.
        Expr::Identifier(ident) if ident.quote_style == Some('"') => {
            Ok(Value::String(ident.value.clone()))
        }
        other => Err(malformed(&format!("'{other}' is not a literal"))),
    }
}

fn number(text: &str) -> Result<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Ok(Value::from(int));
    }
    match text.parse::<f64>() {
        Ok(float) if float.is_finite() => Ok(Value::from(float)),
        _ => Err(malformed(&format!("'{text}' is not a number"))),
    }
}

fn malformed(reason: &str) -> SearchError {
    SearchError::MalformedRequest(reason.to_string())
}
