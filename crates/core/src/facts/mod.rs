//! Fact relation store handed to the rule engine.
//!
//! A [`FactStore`] maps relation names to ordered rows. Relations are created
//! on first insert and only ever grow: nothing is removed or overwritten while
//! a module is being loaded. Row shapes are not validated here; they are a
//! contract between the producing loader and the ruleset that consumes them.

mod tables;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use tables::{Instruction, InstructionFacts, Operand, OperandTable, NO_REGISTER};

/// One column value of a relation row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Symbol(String),
    Number(i64),
    Unsigned(u64),
    List(Vec<u64>),
}

impl Value {
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            Value::Number(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Symbol(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Symbol(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Unsigned(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value)
    }
}

impl From<Vec<u64>> for Value {
    fn from(value: Vec<u64>) -> Self {
        Value::List(value)
    }
}

pub type Row = Vec<Value>;

/// Build a [`Row`] from heterogeneous column values.
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::facts::Value::from($value)),*]
    };
}

/// Named, append-only collection of relations for one program instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactStore {
    program: String,
    relations: BTreeMap<String, Vec<Row>>,
}

impl FactStore {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), relations: BTreeMap::new() }
    }

    /// Name of the rule program this store was instantiated for.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Append `rows` to `relation`, creating it if absent.
    pub fn insert<I>(&mut self, relation: &str, rows: I)
    where
        I: IntoIterator<Item = Row>,
    {
        let table = self.relations.entry(relation.to_string()).or_default();
        table.extend(rows);
    }

    /// Append a single row; scalar facts are single-row relations.
    pub fn insert_row(&mut self, relation: &str, row: Row) {
        self.insert(relation, std::iter::once(row));
    }

    pub fn relation(&self, relation: &str) -> Option<&[Row]> {
        self.relations.get(relation).map(Vec::as_slice)
    }

    /// Rows of `relation`, empty when the relation was never created.
    pub fn rows(&self, relation: &str) -> &[Row] {
        self.relation(relation).unwrap_or(&[])
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.relations.contains_key(relation)
    }

    pub fn len(&self, relation: &str) -> usize {
        self.rows(relation).len()
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// Row count per relation, in name order.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        self.relations.iter().map(|(k, v)| (k.clone(), v.len())).collect()
    }
}
