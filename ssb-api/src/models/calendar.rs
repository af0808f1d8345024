use serde::{Deserialize, Serialize};

/// Response of the publication calendar endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarResponse {
    #[serde(default)]
    pub publications: Vec<PublicationEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationEntry {
    pub title: String,
    /// ISO date, `YYYY-MM-DD`.
    pub release_date: String,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub sections: Vec<CalendarSection>,
}

/// A (possibly nested) grouping of table references inside a publication.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub sections: Vec<CalendarSection>,
}
