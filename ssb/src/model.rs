//! Table model: value objects built per request from upstream responses.

use std::fmt;

use chrono::NaiveDate;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatbankError};
use crate::selection::{CategorySelection, Selection};

/// Identifier of a statistical table, e.g. `"09321"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableId(String);

impl TableId {
    /// Validate and wrap a table identifier.
    ///
    /// The identifier ends up in a URL path, so whitespace and URL
    /// delimiters are rejected.
    pub fn new<S: Into<String>>(id: S) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(StatbankError::invalid_argument("table id must not be empty"));
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            return Err(StatbankError::invalid_argument(format!(
                "table id {trimmed:?} contains invalid characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TableId {
    type Error = StatbankError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TableId> for String {
    fn from(id: TableId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub code: String,
    pub label: String,
}

/// Special meaning a dimension has within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionRole {
    Time,
    Geo,
    Metric,
}

/// A named axis of a table with its ordered categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub code: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<DimensionRole>,
    pub categories: Vec<Category>,
}

impl Dimension {
    pub fn category(&self, code: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.code == code)
    }

    pub fn has_category(&self, code: &str) -> bool {
        self.category(code).is_some()
    }
}

/// Full, unfiltered description of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub table_id: TableId,
    pub label: Option<String>,
    pub source: Option<String>,
    pub updated: Option<String>,
    /// In upstream declaration order; this order defines the cube layout.
    pub dimensions: Vec<Dimension>,
}

impl TableMetadata {
    pub fn dimension(&self, code: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|dimension| dimension.code == code)
    }
}

/// A decoded value cube.
///
/// Values are stored densely in row-major order over `dimensions`, so every
/// index tuple has an entry; missing or suppressed cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    table_id: TableId,
    label: Option<String>,
    updated: Option<String>,
    dimensions: Vec<Dimension>,
    values: Vec<Option<f64>>,
    status: Vec<Option<String>>,
}

impl TableData {
    /// Assemble a cube, checking that the value count matches the shape.
    ///
    /// `status` is either empty (no status information) or parallel to
    /// `values`.
    pub fn new(
        table_id: TableId,
        label: Option<String>,
        updated: Option<String>,
        dimensions: Vec<Dimension>,
        values: Vec<Option<f64>>,
        status: Vec<Option<String>>,
    ) -> Result<Self> {
        let expected = cube_len(&dimensions)?;
        if values.len() != expected {
            return Err(StatbankError::format_error(format!(
                "table {table_id}: expected {expected} values for the declared dimension sizes, got {}",
                values.len()
            )));
        }
        if !status.is_empty() && status.len() != expected {
            return Err(StatbankError::format_error(format!(
                "table {table_id}: expected {expected} status entries, got {}",
                status.len()
            )));
        }

        Ok(Self {
            table_id,
            label,
            updated,
            dimensions,
            values,
            status,
        })
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn updated(&self) -> Option<&str> {
        self.updated.as_deref()
    }

    /// Dimensions with only the returned categories present.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Raw values in row-major order.
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Category count per dimension.
    pub fn shape(&self) -> Vec<usize> {
        self.dimensions
            .iter()
            .map(|dimension| dimension.categories.len())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at an index tuple; `None` if the tuple is out of range,
    /// `Some(None)` for a missing cell.
    pub fn value_at(&self, index: &[usize]) -> Option<Option<f64>> {
        linear_index(&self.shape(), index).map(|position| self.values[position])
    }

    /// Status symbol at an index tuple, if any.
    pub fn status_at(&self, index: &[usize]) -> Option<&str> {
        let position = linear_index(&self.shape(), index)?;
        self.status.get(position)?.as_deref()
    }

    /// All cells in row-major order.
    pub fn observations(&self) -> impl Iterator<Item = Observation<'_>> + '_ {
        let shape = self.shape();
        self.values
            .iter()
            .enumerate()
            .map(move |(position, value)| {
                let index = index_tuple(&shape, position);
                let categories = index
                    .iter()
                    .zip(&self.dimensions)
                    .map(|(&i, dimension)| dimension.categories[i].code.as_str())
                    .collect();
                Observation {
                    index,
                    categories,
                    value: *value,
                    status: self.status.get(position).and_then(|s| s.as_deref()),
                }
            })
    }

    /// The explicit selection that reproduces this cube.
    pub fn selection(&self) -> Selection {
        let mut selection = Selection::new();
        for dimension in &self.dimensions {
            selection.insert(
                dimension.code.clone(),
                CategorySelection::Codes(
                    dimension
                        .categories
                        .iter()
                        .map(|category| category.code.clone())
                        .collect(),
                ),
            );
        }
        selection
    }
}

impl Serialize for TableData {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TableData", 5)?;
        state.serialize_field("tableId", &self.table_id)?;
        state.serialize_field("label", &self.label)?;
        state.serialize_field("updated", &self.updated)?;
        state.serialize_field("dimensions", &self.dimensions)?;
        state.serialize_field("observations", &Observations(self))?;
        state.end()
    }
}

struct Observations<'a>(&'a TableData);

impl Serialize for Observations<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.0.observations())
    }
}

/// One cell of a [`TableData`] cube.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation<'a> {
    /// Position along each dimension.
    #[serde(skip)]
    pub index: Vec<usize>,
    /// Category code along each dimension.
    pub categories: Vec<&'a str>,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: TableId,
    pub title: String,
    pub description: String,
    pub last_updated: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationRecord {
    pub title: String,
    pub release_date: NaiveDate,
    pub table_ids: Vec<TableId>,
}

fn cube_len(dimensions: &[Dimension]) -> Result<usize> {
    dimensions.iter().try_fold(1usize, |acc, dimension| {
        acc.checked_mul(dimension.categories.len())
            .ok_or_else(|| StatbankError::format_error("declared cube size overflows"))
    })
}

/// Row-major position of an index tuple, or `None` if out of range.
pub(crate) fn linear_index(shape: &[usize], index: &[usize]) -> Option<usize> {
    if index.len() != shape.len() {
        return None;
    }
    index
        .iter()
        .zip(shape)
        .try_fold(0usize, |acc, (&i, &size)| (i < size).then(|| acc * size + i))
}

/// Inverse of [`linear_index`]; the last dimension varies fastest.
pub(crate) fn index_tuple(shape: &[usize], mut position: usize) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, &size) in index.iter_mut().zip(shape).rev() {
        if size > 0 {
            *slot = position % size;
            position /= size;
        }
    }
    index
}
