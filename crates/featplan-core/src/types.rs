//! In-memory value/column/table types the plan compiler operates on.
//!
//! `Table` plays the role of the engine's native table handle: the builder
//! only rearranges columns on it (select/drop/add), while everything that
//! actually computes values lives behind the engine seam.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Utf8,
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I32(_) => DataType::Int32,
            Scalar::I64(_) => DataType::Int64,
            Scalar::F32(_) => DataType::Float32,
            Scalar::F64(_) => DataType::Float64,
            Scalar::Str(_) => DataType::Utf8,
            Scalar::Bin(_) => DataType::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::I32(v) => Some(*v as f64),
            Scalar::I64(v) => Some(*v as f64),
            Scalar::F32(v) => Some(*v as f64),
            Scalar::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::I32(v) => Some(*v as i64),
            Scalar::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Cast into the given logical type. Nulls stay null; numeric values
    /// convert freely; anything renders to Utf8.
    pub fn cast(&self, data_type: &DataType) -> Result<Scalar> {
        if self.is_null() {
            return Ok(Scalar::Null);
        }
        let out = match data_type {
            DataType::Boolean => match self {
                Scalar::Bool(b) => Scalar::Bool(*b),
                other => return Err(cast_error(other, data_type)),
            },
            DataType::Int32 => match self.as_f64() {
                Some(v) => Scalar::I32(v as i32),
                None => return Err(cast_error(self, data_type)),
            },
            DataType::Int64 | DataType::Timestamp => match self.as_f64() {
                Some(v) => Scalar::I64(v as i64),
                None => return Err(cast_error(self, data_type)),
            },
            DataType::Float32 => match self.as_f64() {
                Some(v) => Scalar::F32(v as f32),
                None => return Err(cast_error(self, data_type)),
            },
            DataType::Float64 => match self.as_f64() {
                Some(v) => Scalar::F64(v),
                None => return Err(cast_error(self, data_type)),
            },
            DataType::Utf8 => Scalar::Str(self.render()),
            DataType::Binary => match self {
                Scalar::Bin(b) => Scalar::Bin(b.clone()),
                other => return Err(cast_error(other, data_type)),
            },
        };
        Ok(out)
    }

    fn render(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(v) => v.to_string(),
            Scalar::I32(v) => v.to_string(),
            Scalar::I64(v) => v.to_string(),
            Scalar::F32(v) => v.to_string(),
            Scalar::F64(v) => v.to_string(),
            Scalar::Str(s) => s.clone(),
            Scalar::Bin(b) => format!("{:?}", b),
        }
    }
}

fn cast_error(value: &Scalar, data_type: &DataType) -> Error {
    Error::Schema(format!("cannot cast {:?} to {:?}", value, data_type))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Scalar>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Columnar table. All columns have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| {
            Error::Schema(format!(
                "column '{}' not in table fields {:?}",
                name,
                self.field_names()
            ))
        })
    }

    /// Project down to the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push(self.require_column(name)?.clone());
        }
        Ok(Table { columns })
    }

    pub fn drop_column(&self, name: &str) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
        }
    }

    /// Add a column, replacing in place any existing column with the same
    /// name.
    pub fn with_column(&self, column: Column) -> Table {
        let mut out = self.clone();
        match out.index_of(&column.name) {
            Some(idx) => out.columns[idx] = column,
            None => out.columns.push(column),
        }
        out
    }

    /// Keep only rows where `keep[row]` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|col| Column {
                name: col.name.clone(),
                values: col
                    .values
                    .iter()
                    .zip(keep.iter())
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| v.clone())
                    .collect(),
            })
            .collect();
        Table { columns }
    }

    /// Row order after a stable lexicographic sort on the given columns.
    pub fn sorted_indices(&self, sort_keys: &[String]) -> Result<Vec<usize>> {
        let key_indices: Vec<usize> = sort_keys
            .iter()
            .map(|key| {
                self.index_of(key)
                    .ok_or_else(|| Error::Schema(format!("sort key column '{}' not found", key)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut indices: Vec<(Vec<Scalar>, usize)> = (0..self.num_rows())
            .map(|row_idx| {
                let tuple: Vec<Scalar> = key_indices
                    .iter()
                    .map(|&col_idx| self.columns[col_idx].values[row_idx].clone())
                    .collect();
                (tuple, row_idx)
            })
            .collect();
        indices.sort_by(|(a, _), (b, _)| scalar_tuple_cmp(a, b));
        Ok(indices.into_iter().map(|(_, idx)| idx).collect())
    }

    /// Reorder rows by the given columns (stable).
    pub fn sort_by_columns(&self, sort_keys: &[String]) -> Result<Table> {
        let order = self.sorted_indices(sort_keys)?;
        let columns = self
            .columns
            .iter()
            .map(|col| Column {
                name: col.name.clone(),
                values: order.iter().map(|&idx| col.values[idx].clone()).collect(),
            })
            .collect();
        Ok(Table { columns })
    }

    /// Hash of one row's values over the given column indices. Used as a
    /// grouping/join key because `Scalar` contains floats and cannot
    /// implement `Eq`/`Hash` directly.
    pub fn row_key_hash(&self, key_indices: &[usize], row_idx: usize) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for &col_idx in key_indices {
            hash_scalar(&self.columns[col_idx].values[row_idx], &mut hasher);
        }
        *hasher.finalize().as_bytes()
    }
}

/// Compare two scalar tuples lexicographically for sorting.
pub fn scalar_tuple_cmp(a: &[Scalar], b: &[Scalar]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match scalar_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Compare two scalars for sorting. Nulls sort first; NaNs sort last.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (I32(x), I32(y)) => x.cmp(y),
        (I64(x), I64(y)) => x.cmp(y),
        (F32(x), F32(y)) => float_cmp(*x as f64, *y as f64),
        (F64(x), F64(y)) => float_cmp(*x, *y),
        (Str(x), Str(y)) => x.cmp(y),
        (Bin(x), Bin(y)) => x.cmp(y),
        // Mixed types: order by variant order.
        _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
    }
}

fn float_cmp(x: f64, y: f64) -> Ordering {
    if x.is_nan() && y.is_nan() {
        Ordering::Equal
    } else if x.is_nan() {
        Ordering::Greater
    } else if y.is_nan() {
        Ordering::Less
    } else {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
}

fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I32(_) => 2,
        I64(_) => 3,
        F32(_) => 4,
        F64(_) => 5,
        Str(_) => 6,
        Bin(_) => 7,
    }
}

/// Hash a scalar value into a hasher, with a type discriminant first.
pub fn hash_scalar(scalar: &Scalar, hasher: &mut blake3::Hasher) {
    use Scalar::*;

    hasher.update(&[scalar_type_order(scalar)]);
    match scalar {
        Null => {}
        Bool(b) => {
            hasher.update(&[*b as u8]);
        }
        I32(i) => {
            hasher.update(&i.to_le_bytes());
        }
        I64(i) => {
            hasher.update(&i.to_le_bytes());
        }
        F32(f) => {
            hasher.update(&f.to_bits().to_le_bytes());
        }
        F64(f) => {
            hasher.update(&f.to_bits().to_le_bytes());
        }
        Str(s) => {
            hasher.update(s.as_bytes());
        }
        Bin(b) => {
            hasher.update(b);
        }
    }
}
