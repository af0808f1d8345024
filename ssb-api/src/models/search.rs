use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of the table search endpoint (`GET /tables`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSearchResponse {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tables: Vec<SearchEntry>,
    #[serde(default)]
    pub page: Option<PageInfo>,
}

/// One entry of the hit list.
///
/// Entries are decoded leniently: anything that does not fit [`TableHit`]
/// (not an object, or a field with the wrong JSON type) is kept as
/// `Malformed` so that one bad hit does not fail the whole search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchEntry {
    Hit(TableHit),
    Malformed(Value),
}

/// A table as listed by the search endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableHit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// RFC 3339 timestamp of the last update.
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub first_period: Option<String>,
    #[serde(default)]
    pub last_period: Option<String>,
    #[serde(default)]
    pub discontinued: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub total_elements: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_entries_do_not_fail_the_response() {
        let response: TableSearchResponse = serde_json::from_value(json!({
            "tables": [
                {"id": "09321", "label": "Areal", "updated": "2024-03-12T07:00:00Z"},
                {"id": 42, "label": "numeric id"},
                "not an object"
            ]
        }))
        .unwrap();

        assert_eq!(response.tables.len(), 3);
        assert!(matches!(&response.tables[0], SearchEntry::Hit(hit) if hit.id.as_deref() == Some("09321")));
        assert!(matches!(response.tables[1], SearchEntry::Malformed(_)));
        assert!(matches!(response.tables[2], SearchEntry::Malformed(_)));
    }
}
