//! Translation between the table model and the JSON-stat wire format.
//!
//! Requests encode one `valueCodes[...]` parameter per dimension in
//! declaration order. Responses are decoded by reading the `id`/`size`
//! arrays and matching the flat value array against them; any disagreement
//! is an [`ErrorKind::UpstreamFormatError`](crate::ErrorKind).

use std::collections::{BTreeSet, HashSet};

use ssb_api::models::{
    CategoryIndex, JsonStatDataset, JsonStatDimension, JsonStatRole, JsonStatStatus,
    JsonStatValues,
};

use crate::error::{Result, StatbankError};
use crate::model::{Category, Dimension, DimensionRole, TableData, TableId, TableMetadata};
use crate::selection::ResolvedDimension;

/// Wildcard understood by the data endpoint.
const ALL_CATEGORIES: &str = "*";

/// Encode a resolved selection as `(dimension, codes)` pairs.
///
/// Every dimension is listed, single-category ones included, so the
/// response cube has the same rank as the table.
pub(crate) fn encode_value_codes(resolved: &[ResolvedDimension<'_>]) -> Vec<(String, String)> {
    resolved
        .iter()
        .map(|dimension| {
            let codes = match &dimension.codes {
                Some(codes) => codes.join(","),
                None => ALL_CATEGORIES.to_string(),
            };
            (dimension.code.to_string(), codes)
        })
        .collect()
}

/// Number of cells a resolved selection asks for.
pub(crate) fn requested_cells(resolved: &[ResolvedDimension<'_>]) -> u128 {
    resolved
        .iter()
        .map(|dimension| dimension.selected_count() as u128)
        .product()
}

pub(crate) fn decode_metadata(table_id: &TableId, dataset: JsonStatDataset) -> Result<TableMetadata> {
    let dimensions = decode_dimensions(table_id, &dataset)?;
    Ok(TableMetadata {
        table_id: table_id.clone(),
        label: dataset.label,
        source: dataset.source,
        updated: dataset.updated,
        dimensions,
    })
}

/// Decode a data response for the request described by `requested`.
///
/// The declared shape is checked against the request before the cube is
/// built, and every dimension must come back with exactly the selected
/// category codes.
pub(crate) fn decode_data(
    table_id: &TableId,
    dataset: JsonStatDataset,
    requested: &[ResolvedDimension<'_>],
) -> Result<TableData> {
    check_declared_shape(table_id, &dataset, requested)?;

    let dimensions = decode_dimensions(table_id, &dataset)?;
    check_returned_codes(table_id, &dimensions, requested)?;

    let expected = dataset.size.iter().try_fold(1usize, |acc, &size| acc.checked_mul(size));
    let expected = expected.ok_or_else(|| {
        StatbankError::format_error(format!("table {table_id}: declared cube size overflows"))
    })?;

    let values = match dataset.value {
        Some(JsonStatValues::Dense(values)) => values,
        Some(JsonStatValues::Sparse(values)) => {
            let mut dense = vec![None; expected];
            for (key, value) in values {
                let position = sparse_position(table_id, &key, expected)?;
                dense[position] = value;
            }
            dense
        }
        None if expected == 0 => Vec::new(),
        None => {
            return Err(StatbankError::format_error(format!(
                "table {table_id}: data response carries no values"
            )));
        }
    };

    let status = match dataset.status {
        None => Vec::new(),
        Some(JsonStatStatus::All(symbol)) => vec![Some(symbol); values.len()],
        Some(JsonStatStatus::Dense(status)) => status,
        Some(JsonStatStatus::Sparse(status)) => {
            let mut dense = vec![None; expected];
            for (key, symbol) in status {
                let position = sparse_position(table_id, &key, expected)?;
                dense[position] = symbol;
            }
            dense
        }
    };

    TableData::new(
        table_id.clone(),
        dataset.label,
        dataset.updated,
        dimensions,
        values,
        status,
    )
}

/// Dimension ids and sizes must match what was asked for.
fn check_declared_shape(
    table_id: &TableId,
    dataset: &JsonStatDataset,
    requested: &[ResolvedDimension<'_>],
) -> Result<()> {
    let declared: Vec<(&str, usize)> = dataset
        .id
        .iter()
        .map(String::as_str)
        .zip(dataset.size.iter().copied())
        .collect();
    let expected: Vec<(&str, usize)> = requested
        .iter()
        .map(|dimension| (dimension.code, dimension.selected_count()))
        .collect();

    if dataset.id.len() != dataset.size.len() || declared != expected {
        return Err(StatbankError::format_error(format!(
            "table {table_id}: requested dimensions {expected:?} but received ids {:?} with sizes {:?}",
            dataset.id, dataset.size
        )));
    }
    Ok(())
}

fn check_returned_codes(
    table_id: &TableId,
    dimensions: &[Dimension],
    requested: &[ResolvedDimension<'_>],
) -> Result<()> {
    for (dimension, request) in dimensions.iter().zip(requested) {
        let returned: BTreeSet<&str> = dimension
            .categories
            .iter()
            .map(|category| category.code.as_str())
            .collect();
        let selected: BTreeSet<&str> = request.selected_codes().into_iter().collect();
        if returned != selected {
            return Err(StatbankError::format_error(format!(
                "table {table_id}: dimension {:?} returned categories {returned:?} but {selected:?} were selected",
                dimension.code
            )));
        }
    }
    Ok(())
}

fn decode_dimensions(table_id: &TableId, dataset: &JsonStatDataset) -> Result<Vec<Dimension>> {
    if dataset.id.len() != dataset.size.len() {
        return Err(StatbankError::format_error(format!(
            "table {table_id}: {} dimension ids but {} sizes",
            dataset.id.len(),
            dataset.size.len()
        )));
    }

    dataset
        .id
        .iter()
        .zip(&dataset.size)
        .map(|(code, &size)| {
            let dimension = dataset.dimension.get(code).ok_or_else(|| {
                StatbankError::format_error(format!(
                    "table {table_id}: dimension {code:?} is declared but not described"
                ))
            })?;
            decode_dimension(table_id, code, size, dimension, dataset.role.as_ref())
        })
        .collect()
}

fn decode_dimension(
    table_id: &TableId,
    code: &str,
    size: usize,
    dimension: &JsonStatDimension,
    role: Option<&JsonStatRole>,
) -> Result<Dimension> {
    let category = &dimension.category;
    let codes: Vec<String> = match &category.index {
        Some(CategoryIndex::Ordered(codes)) => codes.clone(),
        Some(CategoryIndex::Positions(positions)) => {
            let mut ordered: Vec<Option<String>> = vec![None; positions.len()];
            for (category_code, &position) in positions {
                let slot = ordered
                    .get_mut(position)
                    .filter(|slot| slot.is_none())
                    .ok_or_else(|| {
                        StatbankError::format_error(format!(
                            "table {table_id}: dimension {code:?} has an invalid category position {position}"
                        ))
                    })?;
                *slot = Some(category_code.clone());
            }
            // every slot is filled: positions are unique and in range
            ordered.into_iter().flatten().collect()
        }
        None if category.label.len() == 1 => category.label.keys().cloned().collect(),
        None => {
            return Err(StatbankError::format_error(format!(
                "table {table_id}: dimension {code:?} has no category index"
            )));
        }
    };

    let mut seen = HashSet::with_capacity(codes.len());
    if let Some(duplicate) = codes.iter().find(|category| !seen.insert(category.as_str())) {
        return Err(StatbankError::format_error(format!(
            "table {table_id}: dimension {code:?} lists category {duplicate:?} more than once"
        )));
    }

    if codes.len() != size {
        return Err(StatbankError::format_error(format!(
            "table {table_id}: dimension {code:?} declares size {size} but lists {} categories",
            codes.len()
        )));
    }

    let categories = codes
        .into_iter()
        .map(|category_code| Category {
            label: category
                .label
                .get(&category_code)
                .cloned()
                .unwrap_or_else(|| category_code.clone()),
            code: category_code,
        })
        .collect();

    Ok(Dimension {
        code: code.to_string(),
        label: dimension.label.clone().unwrap_or_else(|| code.to_string()),
        role: role.and_then(|role| dimension_role(role, code)),
        categories,
    })
}

fn dimension_role(role: &JsonStatRole, code: &str) -> Option<DimensionRole> {
    let listed = |codes: &[String]| codes.iter().any(|c| c == code);
    if listed(&role.time) {
        Some(DimensionRole::Time)
    } else if listed(&role.geo) {
        Some(DimensionRole::Geo)
    } else if listed(&role.metric) {
        Some(DimensionRole::Metric)
    } else {
        None
    }
}

fn sparse_position(table_id: &TableId, key: &str, expected: usize) -> Result<usize> {
    key.parse::<usize>()
        .ok()
        .filter(|&position| position < expected)
        .ok_or_else(|| {
            StatbankError::format_error(format!(
                "table {table_id}: sparse position {key:?} is outside the cube of {expected} cells"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::selection::{CategorySelection, Selection};
    use serde_json::{Value, json};

    fn table_id() -> TableId {
        TableId::new("09321").unwrap()
    }

    fn dataset(value: Value) -> JsonStatDataset {
        serde_json::from_value(value).unwrap()
    }

    fn cube(values: Value) -> JsonStatDataset {
        dataset(json!({
            "label": "Areal",
            "id": ["Region", "ContentsCode", "Tid"],
            "size": [2, 1, 2],
            "role": {"time": ["Tid"], "geo": ["Region"], "metric": ["ContentsCode"]},
            "dimension": {
                "Region": {
                    "label": "region",
                    "category": {
                        "index": {"0301": 0, "1103": 1},
                        "label": {"0301": "Oslo", "1103": "Stavanger"}
                    }
                },
                "ContentsCode": {
                    "label": "statistikkvariabel",
                    "category": {"label": {"Areal": "Areal (km²)"}}
                },
                "Tid": {
                    "label": "år",
                    "category": {"index": ["2022", "2023"]}
                }
            },
            "value": values
        }))
    }

    /// Decode `dataset` as the answer to a request for the whole table.
    fn decode_full(dataset: JsonStatDataset) -> Result<TableData> {
        let metadata = decode_metadata(&table_id(), dataset.clone())?;
        let selection = Selection::new();
        let requested = selection.resolve(&metadata);
        decode_data(&table_id(), dataset, &requested)
    }

    #[test]
    fn decodes_dense_cube_in_row_major_order() {
        let data = decode_full(cube(json!([1.0, 2.0, 3.0, null]))).unwrap();

        assert_eq!(data.shape(), vec![2, 1, 2]);
        assert_eq!(data.value_at(&[1, 0, 0]), Some(Some(3.0)));
        assert_eq!(data.value_at(&[1, 0, 1]), Some(None));

        let region = &data.dimensions()[0];
        assert_eq!(region.role, Some(DimensionRole::Geo));
        assert_eq!(region.categories[1].label, "Stavanger");
        assert_eq!(data.dimensions()[2].categories[0].label, "2022");
    }

    #[test]
    fn single_category_dimension_keeps_its_position() {
        let data = decode_full(cube(json!([1.0, 2.0, 3.0, 4.0]))).unwrap();

        let contents = &data.dimensions()[1];
        assert_eq!(contents.code, "ContentsCode");
        assert_eq!(contents.categories.len(), 1);
        assert_eq!(contents.role, Some(DimensionRole::Metric));
        assert!(data.observations().all(|o| o.index.len() == 3 && o.index[1] == 0));
    }

    #[test]
    fn sparse_values_fill_missing_cells_with_null() {
        let data = decode_full(cube(json!({"0": 1.0, "3": 4.0}))).unwrap();

        assert_eq!(data.len(), 4);
        assert_eq!(data.values(), &[Some(1.0), None, None, Some(4.0)]);
    }

    #[test]
    fn value_length_mismatch_is_format_error() {
        let err = decode_full(cube(json!([1.0, 2.0, 3.0]))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);

        let err = decode_full(cube(json!({"7": 1.0}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
    }

    #[test]
    fn missing_dimension_description_is_format_error() {
        let err = decode_metadata(
            &table_id(),
            dataset(json!({
                "id": ["Region", "Tid"],
                "size": [1, 1],
                "dimension": {"Region": {"category": {"index": ["0301"]}}}
            })),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
    }

    #[test]
    fn size_disagreeing_with_categories_is_format_error() {
        let err = decode_metadata(
            &table_id(),
            dataset(json!({
                "id": ["Region"],
                "size": [3],
                "dimension": {"Region": {"category": {"index": ["0301", "1103"]}}}
            })),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
    }

    #[test]
    fn repeated_category_codes_are_format_error() {
        let err = decode_metadata(
            &table_id(),
            dataset(json!({
                "id": ["Region"],
                "size": [2],
                "dimension": {"Region": {"category": {"index": ["0301", "0301"]}}}
            })),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn categories_other_than_the_selected_ones_are_format_error() {
        let metadata = decode_metadata(&table_id(), cube(json!(null))).unwrap();
        let selection =
            Selection::new().with("Region", CategorySelection::Codes(vec!["0301".to_string()]));
        let requested = selection.resolve(&metadata);

        let mut response = cube(json!([1.0, 2.0]));
        response.size[0] = 1;
        response.dimension.insert(
            "Region".to_string(),
            serde_json::from_value(json!({"category": {"index": ["9999"]}})).unwrap(),
        );

        let err = decode_data(&table_id(), response, &requested).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
        assert!(err.to_string().contains("9999"));
    }

    #[test]
    fn selected_categories_may_come_back_in_table_order() {
        let metadata = decode_metadata(&table_id(), cube(json!(null))).unwrap();
        let selection = Selection::new().with(
            "Region",
            CategorySelection::Codes(vec!["1103".to_string(), "0301".to_string()]),
        );
        let requested = selection.resolve(&metadata);

        let data = decode_data(&table_id(), cube(json!([1.0, 2.0, 3.0, 4.0])), &requested).unwrap();
        assert_eq!(data.dimensions()[0].categories[0].code, "0301");
    }

    #[test]
    fn declared_shape_must_match_the_request() {
        let metadata = decode_metadata(&table_id(), cube(json!(null))).unwrap();
        let selection = Selection::new();
        let requested = selection.resolve(&metadata);

        // A sparse cube far larger than requested is refused before it is built
        let mut response = cube(json!({"0": 1.0}));
        response.size = vec![4_000_000_000_000, 1, 2];
        let err = decode_data(&table_id(), response, &requested).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);

        let mut response = cube(json!([1.0, 2.0, 3.0, 4.0]));
        response.id.swap(0, 2);
        let err = decode_data(&table_id(), response, &requested).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
    }

    #[test]
    fn status_symbols_are_attached_to_cells() {
        let mut dataset = cube(json!([1.0, null, 3.0, 4.0]));
        dataset.status = Some(JsonStatStatus::Sparse(
            [("1".to_string(), Some("..".to_string())), ("2".to_string(), None)].into_iter().collect(),
        ));
        let data = decode_full(dataset).unwrap();

        assert_eq!(data.status_at(&[0, 0, 1]), Some(".."));
        assert_eq!(data.status_at(&[1, 0, 0]), None);
        assert_eq!(data.status_at(&[0, 0, 0]), None);
    }

    #[test]
    fn reencoding_decoded_selection_requests_the_same_cells() {
        let data = decode_full(cube(json!([1.0, 2.0, 3.0, 4.0]))).unwrap();
        let metadata = TableMetadata {
            table_id: table_id(),
            label: None,
            source: None,
            updated: None,
            dimensions: data.dimensions().to_vec(),
        };

        let selection = data.selection();
        selection.validate(&metadata).unwrap();
        let resolved = selection.resolve(&metadata);

        assert_eq!(requested_cells(&resolved), data.len() as u128);
        assert_eq!(
            encode_value_codes(&resolved),
            vec![
                ("Region".to_string(), "0301,1103".to_string()),
                ("ContentsCode".to_string(), "Areal".to_string()),
                ("Tid".to_string(), "2022,2023".to_string()),
            ]
        );
    }

    #[test]
    fn omitted_dimensions_encode_as_wildcard() {
        let metadata = decode_metadata(&table_id(), cube(json!(null))).unwrap();
        let selection =
            Selection::new().with("Tid", CategorySelection::Codes(vec!["2023".to_string()]));

        let resolved = selection.resolve(&metadata);
        let encoded = encode_value_codes(&resolved);

        assert_eq!(encoded[0], ("Region".to_string(), "*".to_string()));
        assert_eq!(encoded[2], ("Tid".to_string(), "2023".to_string()));
        assert_eq!(requested_cells(&resolved), 2);
    }
}
