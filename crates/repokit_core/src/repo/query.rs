//! Query assembly for table-scoped repository reads.
//!
//! # Responsibility
//! - Validate caller-supplied identifiers before they reach SQL text.
//! - Build conjunctive filters, ordering and limits with bound values.
//!
//! # Invariants
//! - Column and table names match `^[A-Za-z_][A-Za-z0-9_]*$` and are quoted.
//! - Comparison operators come from the closed `Operator` set.
//! - Filter values and limits are always bound parameters.

use super::base::{RepoError, RepoResult};
use crate::db::quote_identifier;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Comparison operator accepted in field criteria.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Operator {
    #[default]
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = RepoError;

    /// Parses SQL operator spellings; an empty string means `=`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "" | "=" | "==" => Ok(Self::Eq),
            "<>" | "!=" => Ok(Self::NotEq),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::LtEq),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::GtEq),
            "LIKE" => Ok(Self::Like),
            "NOT LIKE" => Ok(Self::NotLike),
            _ => Err(RepoError::InvalidOperator(value.to_string())),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Sort direction for ordered listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            Self::Ascending
        } else {
            Self::Descending
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One `name <op> value` condition in a conjunctive filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCriterion {
    pub name: String,
    pub value: Value,
    pub operator: Operator,
}

impl FieldCriterion {
    /// Creates an equality criterion.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operator: Operator::Eq,
        }
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    /// Empty names and NULL (unset) values contribute nothing to a filter.
    pub fn is_active(&self) -> bool {
        !self.name.is_empty() && !matches!(self.value, Value::Null)
    }
}

/// Assembled `SELECT` text plus its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Builder for `SELECT * FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT ?]`.
#[derive(Debug)]
pub(crate) struct SelectBuilder {
    sql: String,
    params: Vec<Value>,
    has_filter: bool,
}

impl SelectBuilder {
    pub(crate) fn from_table(table: &str) -> RepoResult<Self> {
        Ok(Self {
            sql: format!("SELECT * FROM {}", checked_identifier(table)?),
            params: Vec::new(),
            has_filter: false,
        })
    }

    /// Appends one condition, joined to earlier ones with `AND`.
    pub(crate) fn filter(
        mut self,
        column: &str,
        operator: Operator,
        value: Value,
    ) -> RepoResult<Self> {
        let column = checked_identifier(column)?;
        self.sql
            .push_str(if self.has_filter { " AND " } else { " WHERE " });
        self.params.push(value);
        self.sql.push_str(&format!(
            "{column} {} ?{}",
            operator.as_sql(),
            self.params.len()
        ));
        self.has_filter = true;
        Ok(self)
    }

    /// Appends every active criterion; inactive ones are skipped.
    pub(crate) fn filter_fields(mut self, fields: &[FieldCriterion]) -> RepoResult<Self> {
        for field in fields.iter().filter(|field| field.is_active()) {
            self = self.filter(&field.name, field.operator, field.value.clone())?;
        }
        Ok(self)
    }

    pub(crate) fn order_by(mut self, column: &str, direction: SortDirection) -> RepoResult<Self> {
        let column = checked_identifier(column)?;
        self.sql
            .push_str(&format!(" ORDER BY {column} {}", direction.as_sql()));
        Ok(self)
    }

    /// Binds `LIMIT` for every `Some`, including `Some(0)`.
    pub(crate) fn limit(mut self, limit: Option<u32>) -> Self {
        if let Some(limit) = limit {
            self.params.push(Value::Integer(i64::from(limit)));
            self.sql.push_str(&format!(" LIMIT ?{}", self.params.len()));
        }
        self
    }

    pub(crate) fn build(self) -> SelectQuery {
        SelectQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Returns whether `name` is safe to use as a bare column or table name.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

pub(crate) fn checked_identifier(name: &str) -> RepoResult<String> {
    if !is_valid_identifier(name) {
        return Err(RepoError::InvalidIdentifier(name.to_string()));
    }
    Ok(quote_identifier(name))
}
