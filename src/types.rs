//! Core data model types produced by ingestion.
//!
//! A read produces a columnar [`Table`]: an ordered list of [`TypedColumn`]s that all have the
//! same length. Each column carries the [`ColumnType`] it was inferred (or forced) to, a
//! nullability flag, and its values. Missing cells are explicit [`Value::Null`] markers.

use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Logical type of a column.
///
/// The variants form a closed set. Inference tries them in a fixed order (see
/// [`crate::ingestion::InferenceOptions::ladder`]), and [`ColumnType::String`] always succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// `true`/`false`, case-insensitive.
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// Arbitrary precision integer.
    BigInteger,
    /// 64-bit floating point number.
    Double,
    /// Arbitrary precision decimal.
    BigDecimal,
    /// Calendar date without a time zone.
    LocalDate,
    /// Date and time without a time zone.
    LocalDateTime,
    /// Time of day without a time zone.
    LocalTime,
    /// UTF-8 string.
    String,
    /// Every value in the column is missing.
    Nothing,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::Long => "Long",
            Self::BigInteger => "BigInteger",
            Self::Double => "Double",
            Self::BigDecimal => "BigDecimal",
            Self::LocalDate => "LocalDate",
            Self::LocalDateTime => "LocalDateTime",
            Self::LocalTime => "LocalTime",
            Self::String => "String",
            Self::Nothing => "Nothing",
        };
        f.write_str(s)
    }
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value (null literal, empty cell, or a column absent from a short row).
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    BigInteger(BigInt),
    Double(f64),
    BigDecimal(BigDecimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    String(String),
}

impl Value {
    /// True for the missing marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: ColumnType,
    /// Whether at least one value in the column is missing.
    pub nullable: bool,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// Ordered list of fields describing the shape of a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// One materialized column of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypedColumn {
    name: String,
    data_type: ColumnType,
    nullable: bool,
    values: Vec<Value>,
}

impl TypedColumn {
    /// Build a column. The nullability flag is derived from `values`.
    pub fn new(name: impl Into<String>, data_type: ColumnType, values: Vec<Value>) -> Self {
        let nullable = values.iter().any(Value::is_null);
        Self {
            name: name.into(),
            data_type,
            nullable,
            values,
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inferred or forced column type.
    pub fn data_type(&self) -> ColumnType {
        self.data_type
    }

    /// Whether any value is missing.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// All values in row order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at `row`, if in range.
    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of missing values.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Schema entry describing this column.
    pub fn field(&self) -> Field {
        Field::new(self.name.clone(), self.data_type, self.nullable)
    }
}

/// In-memory columnar table produced by a read.
///
/// All columns have [`Table::row_count`] values.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<TypedColumn>,
    row_count: usize,
}

impl Table {
    /// Create a table from columns of equal length.
    ///
    /// # Panics
    ///
    /// Panics if the columns differ in length.
    pub fn new(columns: Vec<TypedColumn>) -> Self {
        let row_count = columns.first().map(TypedColumn::len).unwrap_or(0);
        assert!(
            columns.iter().all(|c| c.len() == row_count),
            "all columns of a table must have the same length"
        );
        Self { columns, row_count }
    }

    /// Number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns in header order.
    pub fn columns(&self) -> &[TypedColumn] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column by position.
    pub fn column_at(&self, idx: usize) -> Option<&TypedColumn> {
        self.columns.get(idx)
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Build the schema of this table.
    pub fn schema(&self) -> Schema {
        Schema::new(self.columns.iter().map(TypedColumn::field).collect())
    }

    /// Values of a single row, in column order.
    pub fn row(&self, idx: usize) -> Option<Vec<&Value>> {
        if idx >= self.row_count {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::new(vec![
            TypedColumn::new("id", ColumnType::Integer, vec![Value::Integer(1), Value::Integer(2)]),
            TypedColumn::new(
                "name",
                ColumnType::String,
                vec![Value::String("a".to_string()), Value::Null],
            ),
        ])
    }

    #[test]
    fn schema_reports_types_and_nullability() {
        let table = sample_table();
        let schema = table.schema();
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
        assert_eq!(schema.fields[0], Field::new("id", ColumnType::Integer, false));
        assert_eq!(schema.fields[1], Field::new("name", ColumnType::String, true));
    }

    #[test]
    fn row_access_follows_column_order() {
        let table = sample_table();
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.row(1),
            Some(vec![&Value::Integer(2), &Value::Null])
        );
        assert_eq!(table.row(2), None);
        assert_eq!(table.column("name").map(TypedColumn::null_count), Some(1));
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn ragged_columns_are_rejected() {
        let _ = Table::new(vec![
            TypedColumn::new("a", ColumnType::Integer, vec![Value::Integer(1)]),
            TypedColumn::new("b", ColumnType::Integer, vec![]),
        ]);
    }
}
