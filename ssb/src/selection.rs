//! Per-dimension category filters for data queries.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{Result, StatbankError};
use crate::model::{Category, TableMetadata};

/// Categories selected along one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySelection {
    /// Every category of the dimension.
    All,
    /// An explicit, non-empty list of category codes.
    Codes(Vec<String>),
}

impl<'de> Deserialize<'de> for CategorySelection {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(code) if code.trim() == "*" => CategorySelection::All,
            Raw::One(code) => CategorySelection::Codes(vec![code]),
            Raw::Many(codes) => CategorySelection::Codes(codes),
        })
    }
}

/// Mapping from dimension code to the categories to retrieve.
///
/// Dimensions that are not mentioned default to all categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    dimensions: BTreeMap<String, CategorySelection>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, dimension: S, categories: CategorySelection) {
        self.dimensions.insert(dimension.into(), categories);
    }

    /// Builder-style [`Selection::insert`].
    pub fn with<S: Into<String>>(mut self, dimension: S, categories: CategorySelection) -> Self {
        self.insert(dimension, categories);
        self
    }

    pub fn get(&self, dimension: &str) -> Option<&CategorySelection> {
        self.dimensions.get(dimension)
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Check every referenced dimension and category against the table.
    pub fn validate(&self, metadata: &TableMetadata) -> Result<()> {
        for (code, categories) in &self.dimensions {
            let dimension = metadata.dimension(code).ok_or_else(|| {
                StatbankError::invalid_argument(format!(
                    "table {} has no dimension {code:?}; available: {}",
                    metadata.table_id,
                    metadata
                        .dimensions
                        .iter()
                        .map(|d| d.code.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

            if let CategorySelection::Codes(codes) = categories {
                if codes.is_empty() {
                    return Err(StatbankError::invalid_argument(format!(
                        "selection for dimension {code:?} is empty"
                    )));
                }
                if let Some(unknown) = codes.iter().find(|c| !dimension.has_category(c)) {
                    return Err(StatbankError::invalid_argument(format!(
                        "dimension {code:?} of table {} has no category {unknown:?}",
                        metadata.table_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve to explicit category codes per dimension, in declaration
    /// order. Duplicates keep their first occurrence.
    pub(crate) fn resolve<'a>(&'a self, metadata: &'a TableMetadata) -> Vec<ResolvedDimension<'a>> {
        metadata
            .dimensions
            .iter()
            .map(|dimension| {
                let codes = match self.dimensions.get(&dimension.code) {
                    Some(CategorySelection::Codes(codes)) => {
                        let mut unique: Vec<&str> = Vec::with_capacity(codes.len());
                        for code in codes {
                            if !unique.contains(&code.as_str()) {
                                unique.push(code);
                            }
                        }
                        Some(unique)
                    }
                    Some(CategorySelection::All) | None => None,
                };
                ResolvedDimension {
                    code: &dimension.code,
                    codes,
                    categories: &dimension.categories,
                }
            })
            .collect()
    }
}

/// One dimension of a resolved selection; `codes: None` means all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedDimension<'a> {
    pub code: &'a str,
    pub codes: Option<Vec<&'a str>>,
    /// Every category the table declares for this dimension.
    pub categories: &'a [Category],
}

impl<'a> ResolvedDimension<'a> {
    pub fn selected_count(&self) -> usize {
        self.codes.as_ref().map_or(self.categories.len(), Vec::len)
    }

    /// Codes the response must carry for this dimension.
    pub fn selected_codes(&self) -> Vec<&'a str> {
        match &self.codes {
            Some(codes) => codes.clone(),
            None => self
                .categories
                .iter()
                .map(|category| category.code.as_str())
                .collect(),
        }
    }
}
