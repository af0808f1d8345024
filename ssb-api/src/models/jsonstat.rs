//! JSON-stat 2.0 dataset, as returned by the metadata and data endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A JSON-stat 2.0 `dataset` response.
///
/// `id` and `size` are parallel arrays in dimension declaration order; the
/// value cube is linearised row-major over them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonStatDataset {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    pub id: Vec<String>,
    pub size: Vec<usize>,
    pub dimension: HashMap<String, JsonStatDimension>,
    #[serde(default)]
    pub role: Option<JsonStatRole>,
    #[serde(default)]
    pub value: Option<JsonStatValues>,
    #[serde(default)]
    pub status: Option<JsonStatStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonStatDimension {
    #[serde(default)]
    pub label: Option<String>,
    pub category: JsonStatCategory,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonStatCategory {
    /// May be omitted when the dimension has a single category.
    #[serde(default)]
    pub index: Option<CategoryIndex>,
    #[serde(default)]
    pub label: HashMap<String, String>,
}

/// Category order, either as an ordered list of codes or as code -> position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryIndex {
    Ordered(Vec<String>),
    Positions(HashMap<String, usize>),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonStatRole {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub geo: Vec<String>,
    #[serde(default)]
    pub metric: Vec<String>,
}

/// Observation values. Sparse positions missing from the object are null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonStatValues {
    Dense(Vec<Option<f64>>),
    Sparse(HashMap<String, Option<f64>>),
}

/// Per-cell status symbols such as `..` (confidential) or `:` (not available).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonStatStatus {
    All(String),
    Dense(Vec<Option<String>>),
    Sparse(HashMap<String, Option<String>>),
}
