use std::sync::Arc;

use ssb_api::SsbClient;

use crate::cache::MetadataCache;
use crate::config::StatbankConfig;
use crate::error::{Result, StatbankError};
use crate::model::{PublicationRecord, SearchHit, TableData, TableId, TableMetadata};
use crate::publications::{self, DateRange};
use crate::query;
use crate::search;
use crate::selection::Selection;

/// Selections above this many cells are logged as potentially slow.
pub const LARGE_SELECTION_CELLS: u128 = 300_000;

/// High-level client for Statistics Norway
///
/// Wraps the low-level [`SsbClient`] and turns its responses into the table
/// model. Each call is independent; the only shared state is the advisory
/// metadata cache.
#[derive(Debug)]
pub struct StatbankClient {
    api: SsbClient,
    config: StatbankConfig,
    metadata_cache: MetadataCache,
}

impl StatbankClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(StatbankConfig::new())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: StatbankConfig) -> Result<Self> {
        let api = SsbClient::new(Arc::new(config.api_configuration()?));
        let metadata_cache = MetadataCache::new(config.metadata_cache_ttl);

        Ok(Self {
            api,
            config,
            metadata_cache,
        })
    }

    // === Search ===

    /// Search the table catalogue.
    ///
    /// Hits come back in upstream relevance order. Malformed hits are
    /// dropped, so a page may hold fewer than `page_size` entries.
    ///
    /// ```rust,no_run
    /// # use ssb::StatbankClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = StatbankClient::new()?;
    /// for hit in client.search("konsumprisindeks", Some(10), None).await? {
    ///     println!("{} {}", hit.id, hit.title);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn search(
        &self,
        query: &str,
        page_size: Option<u32>,
        page_number: Option<u32>,
    ) -> Result<Vec<SearchHit>> {
        let query = search::validate_query(query, page_size)?;
        if page_number == Some(0) {
            return Err(StatbankError::invalid_argument("pageNumber starts at 1"));
        }

        tracing::debug!(%query, ?page_size, ?page_number, "searching tables");
        let response = self.api.table_search(&query, page_size, page_number).await?;
        Ok(search::flatten_hits(response))
    }

    // === Tables ===

    /// Full metadata of a table: every dimension with all its categories,
    /// in declaration order.
    pub async fn get_metadata(&self, table_id: &str) -> Result<Arc<TableMetadata>> {
        let table_id = TableId::new(table_id)?;
        if let Some(metadata) = self.metadata_cache.get(&table_id).await {
            tracing::debug!(%table_id, "metadata cache hit");
            return Ok(metadata);
        }
        self.fetch_metadata(&table_id).await
    }

    /// Retrieve a table's values.
    ///
    /// Without a selection every category of every dimension is requested,
    /// which can be very large; the upstream size limit then surfaces as
    /// [`ErrorKind::PayloadTooLarge`](crate::ErrorKind::PayloadTooLarge).
    ///
    /// ```rust,no_run
    /// # use ssb::{CategorySelection, Selection, StatbankClient};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = StatbankClient::new()?;
    /// let selection = Selection::new()
    ///     .with("Region", CategorySelection::Codes(vec!["0301".into()]))
    ///     .with("Tid", CategorySelection::All);
    /// let data = client.get_data("09321", Some(&selection)).await?;
    /// println!("{} cells", data.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_data(&self, table_id: &str, selection: Option<&Selection>) -> Result<TableData> {
        let table_id = TableId::new(table_id)?;
        let default_selection = Selection::new();
        let selection = selection.unwrap_or(&default_selection);

        let metadata = self.metadata_for_selection(&table_id, selection).await?;
        let resolved = selection.resolve(&metadata);

        let cells = query::requested_cells(&resolved);
        if cells > LARGE_SELECTION_CELLS {
            tracing::warn!(
                %table_id,
                cells,
                "large selection requested; the upstream service may refuse it"
            );
        }

        let value_codes = query::encode_value_codes(&resolved);
        tracing::debug!(%table_id, ?value_codes, "fetching table data");
        let dataset = self
            .api
            .table_data(table_id.as_str(), &value_codes)
            .await
            .map_err(|e| StatbankError::from_data_request(e, table_id.as_str()))?;

        query::decode_data(&table_id, dataset, &resolved)
    }

    // === Publications ===

    /// Publications released on `date` or up to `range_days` days before it,
    /// ordered by release date, then title.
    pub async fn list_publications(
        &self,
        date: &str,
        range_days: Option<u32>,
    ) -> Result<Vec<PublicationRecord>> {
        let range = DateRange::trailing(date, range_days)?;
        let from = range.from.format("%Y-%m-%d").to_string();
        let to = range.to.format("%Y-%m-%d").to_string();

        tracing::debug!(%from, %to, "fetching publication calendar");
        let response = self.api.publication_calendar(&from, &to).await?;
        publications::list_records(response, range)
    }

    // === Utility Methods ===

    /// Get the underlying API client for raw access
    pub fn api_client(&self) -> &SsbClient {
        &self.api
    }

    pub fn config(&self) -> &StatbankConfig {
        &self.config
    }

    async fn fetch_metadata(&self, table_id: &TableId) -> Result<Arc<TableMetadata>> {
        tracing::debug!(%table_id, "fetching table metadata");
        let dataset = self
            .api
            .table_metadata(table_id.as_str())
            .await
            .map_err(|e| StatbankError::from_table_lookup(e, table_id.as_str()))?;
        let metadata = Arc::new(query::decode_metadata(table_id, dataset)?);
        self.metadata_cache.insert(Arc::clone(&metadata)).await;
        Ok(metadata)
    }

    /// Metadata the selection validates against.
    ///
    /// A cached entry that rejects the selection is never trusted: the
    /// metadata is refetched and only fresh metadata can refuse the query.
    async fn metadata_for_selection(
        &self,
        table_id: &TableId,
        selection: &Selection,
    ) -> Result<Arc<TableMetadata>> {
        if let Some(cached) = self.metadata_cache.get(table_id).await {
            match selection.validate(&cached) {
                Ok(()) => return Ok(cached),
                Err(err) => {
                    tracing::debug!(%table_id, error = %err, "cached metadata rejected selection, refetching");
                }
            }
        }

        let metadata = self.fetch_metadata(table_id).await?;
        selection.validate(&metadata)?;
        Ok(metadata)
    }
}
