//! Integration tests for the Statbank client against a mocked SSB service.

use serde_json::{Value, json};
use ssb::{CategorySelection, ErrorKind, Selection, StatbankClient, StatbankConfig};
use wiremock::matchers::{any, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create a client configured for the mock server
fn create_test_client(server: &MockServer) -> StatbankClient {
    create_client_with_ttl(server, 300)
}

fn create_client_with_ttl(server: &MockServer, ttl_secs: u64) -> StatbankClient {
    let config = StatbankConfig::new()
        .with_base_url(server.uri())
        .with_calendar_url(format!("{}/calendar", server.uri()))
        .with_timeout(5)
        .with_metadata_cache_ttl(ttl_secs);
    StatbankClient::with_config(config).expect("client should build")
}

fn metadata_09321() -> Value {
    json!({
        "version": "2.0",
        "class": "dataset",
        "label": "09321: Areal (km²), etter region og år",
        "source": "Statistisk sentralbyrå",
        "updated": "2024-01-01T07:00:00Z",
        "id": ["Region", "Year"],
        "size": [2, 1],
        "role": {"geo": ["Region"], "time": ["Year"]},
        "dimension": {
            "Region": {
                "label": "region",
                "category": {
                    "index": {"0301": 0, "1103": 1},
                    "label": {"0301": "Oslo", "1103": "Stavanger"}
                }
            },
            "Year": {
                "label": "år",
                "category": {"index": ["2023"], "label": {"2023": "2023"}}
            }
        }
    })
}

fn data_09321(values: Value) -> Value {
    let mut cube = metadata_09321();
    cube["value"] = values;
    cube
}

async fn mount_metadata(server: &MockServer, body: Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/tables/09321/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

// === Search ===

#[tokio::test]
async fn test_empty_search_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    for query in ["", "   "] {
        let err = client.search(query, None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[tokio::test]
async fn test_search_skips_hit_without_identifier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tables"))
        .and(query_param("query", "befolkning"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "language": "no",
            "tables": [
                {"id": "07459", "label": "Befolkning", "updated": "2025-02-20T07:00:00Z"},
                {"id": "05803", "label": "Endringer"},
                {"label": "Uten id", "description": "malformed"},
                {"id": "06913", "label": "Folkemengde"},
                {"id": "11342", "label": "Areal og befolkning"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let hits = client
        .search("befolkning", Some(5), None)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 4);
    let ids: Vec<_> = hits.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(ids, vec!["07459", "05803", "06913", "11342"]);
    assert!(hits.iter().all(|hit| hit.title != "Uten id"));
}

// === Metadata ===

#[tokio::test]
async fn test_metadata_keeps_declared_order() {
    let server = MockServer::start().await;
    mount_metadata(&server, metadata_09321(), 1).await;

    let client = create_test_client(&server);
    let metadata = client.get_metadata("09321").await.expect("metadata should load");

    assert_eq!(metadata.dimensions.len(), 2);
    assert_eq!(metadata.dimensions[0].code, "Region");
    assert_eq!(metadata.dimensions[1].code, "Year");
    let regions: Vec<_> = metadata.dimensions[0]
        .categories
        .iter()
        .map(|c| c.code.as_str())
        .collect();
    assert_eq!(regions, vec!["0301", "1103"]);
    assert_eq!(metadata.dimensions[1].categories[0].code, "2023");

    // Served from cache the second time
    let again = client.get_metadata("09321").await.unwrap();
    assert_eq!(again.dimensions, metadata.dimensions);
}

#[tokio::test]
async fn test_unknown_table_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tables/99999/metadata"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "title": "Not Found",
            "status": 404
        })))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let err = client.get_metadata("99999").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_invalid_table_id_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let err = client.get_metadata("../secret").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

// === Data ===

#[tokio::test]
async fn test_data_without_selection_requests_everything() {
    let server = MockServer::start().await;
    mount_metadata(&server, metadata_09321(), 1).await;
    Mock::given(method("GET"))
        .and(path("/tables/09321/data"))
        .and(query_param("valueCodes[Region]", "*"))
        .and(query_param("valueCodes[Year]", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data_09321(json!([454.0, null]))))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let data = client.get_data("09321", None).await.expect("data should load");

    assert_eq!(data.shape(), vec![2, 1]);
    assert_eq!(data.len(), 2);
    assert_eq!(data.value_at(&[0, 0]), Some(Some(454.0)));
    assert_eq!(data.value_at(&[1, 0]), Some(None));
    // The pinned year still occupies a position in every index tuple
    assert!(data.observations().all(|o| o.index.len() == 2));
}

#[tokio::test]
async fn test_data_with_selection_round_trips() {
    let server = MockServer::start().await;
    mount_metadata(&server, metadata_09321(), 1).await;

    let mut narrowed = data_09321(json!([454.0]));
    narrowed["size"] = json!([1, 1]);
    narrowed["dimension"]["Region"]["category"] =
        json!({"index": {"0301": 0}, "label": {"0301": "Oslo"}});

    Mock::given(method("GET"))
        .and(path("/tables/09321/data"))
        .and(query_param("valueCodes[Region]", "0301"))
        .and(query_param("valueCodes[Year]", "2023"))
        .respond_with(ResponseTemplate::new(200).set_body_json(narrowed))
        .expect(2)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let selection = Selection::new()
        .with("Region", CategorySelection::Codes(vec!["0301".to_string()]))
        .with("Year", CategorySelection::Codes(vec!["2023".to_string()]));

    let data = client.get_data("09321", Some(&selection)).await.unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data.observations().next().unwrap().categories, vec!["0301", "2023"]);

    // Re-encoding the decoded selection asks for exactly the same cells
    let again = client.get_data("09321", Some(&data.selection())).await.unwrap();
    assert_eq!(again.len(), data.shape().iter().product::<usize>());
}

#[tokio::test]
async fn test_unselected_categories_in_response_are_format_error() {
    let server = MockServer::start().await;
    mount_metadata(&server, metadata_09321(), 1).await;

    let mut wrong = data_09321(json!([1.0]));
    wrong["size"] = json!([1, 1]);
    wrong["dimension"]["Region"]["category"] = json!({"index": ["9999"]});

    Mock::given(method("GET"))
        .and(path("/tables/09321/data"))
        .and(query_param("valueCodes[Region]", "0301"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wrong))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let selection =
        Selection::new().with("Region", CategorySelection::Codes(vec!["0301".to_string()]));
    let err = client.get_data("09321", Some(&selection)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
}

#[tokio::test]
async fn test_value_length_mismatch_is_format_error() {
    let server = MockServer::start().await;
    mount_metadata(&server, metadata_09321(), 1).await;
    Mock::given(method("GET"))
        .and(path("/tables/09321/data"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(data_09321(json!([1.0, 2.0, 3.0]))),
        )
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let err = client.get_data("09321", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFormatError);
}

#[tokio::test]
async fn test_unknown_category_is_rejected_before_data_request() {
    let server = MockServer::start().await;
    // Fetched twice: once cold, once when the cached copy rejects the selection
    mount_metadata(&server, metadata_09321(), 2).await;
    Mock::given(method("GET"))
        .and(path("/tables/09321/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data_09321(json!([1.0, 2.0]))))
        .expect(0)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let _ = client.get_metadata("09321").await.unwrap();

    let selection =
        Selection::new().with("Region", CategorySelection::Codes(vec!["9999".to_string()]));
    let err = client.get_data("09321", Some(&selection)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_stale_cache_does_not_deny_valid_query() {
    let server = MockServer::start().await;

    // First metadata answer lacks 2024; the refreshed one has it
    let stale = metadata_09321();
    let mut fresh = metadata_09321();
    fresh["size"] = json!([2, 2]);
    fresh["dimension"]["Year"]["category"] = json!({"index": ["2023", "2024"]});

    Mock::given(method("GET"))
        .and(path("/tables/09321/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stale))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tables/09321/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fresh))
        .expect(1)
        .mount(&server)
        .await;

    let mut cube = data_09321(json!([1.0, 2.0]));
    cube["size"] = json!([2, 1]);
    cube["dimension"]["Year"]["category"] = json!({"index": ["2024"]});
    Mock::given(method("GET"))
        .and(path("/tables/09321/data"))
        .and(query_param("valueCodes[Year]", "2024"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cube))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let cached = client.get_metadata("09321").await.unwrap();
    assert_eq!(cached.dimensions[1].categories.len(), 1);

    let selection =
        Selection::new().with("Year", CategorySelection::Codes(vec!["2024".to_string()]));
    let data = client
        .get_data("09321", Some(&selection))
        .await
        .expect("refetched metadata should accept 2024");
    assert_eq!(data.dimensions()[1].categories[0].code, "2024");
}

#[tokio::test]
async fn test_oversized_selection_is_payload_too_large() {
    let server = MockServer::start().await;
    mount_metadata(&server, metadata_09321(), 1).await;
    Mock::given(method("GET"))
        .and(path("/tables/09321/data"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "title": "Too many cells selected",
            "status": 403
        })))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let err = client.get_data("09321", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
}

#[tokio::test]
async fn test_server_error_preserves_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tables/09321/metadata"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let err = client.get_metadata("09321").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamError);
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let config = StatbankConfig::new()
        .with_base_url("http://127.0.0.1:1")
        .with_timeout(2);
    let client = StatbankClient::with_config(config).unwrap();

    let err = client.search("kpi", None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnreachable);
}

#[tokio::test]
async fn test_disabled_cache_always_refetches() {
    let server = MockServer::start().await;
    mount_metadata(&server, metadata_09321(), 2).await;

    let client = create_client_with_ttl(&server, 0);
    client.get_metadata("09321").await.unwrap();
    client.get_metadata("09321").await.unwrap();
}

// === Publications ===

#[tokio::test]
async fn test_invalid_date_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    for date in ["", "2025-02-30", "May 2nd"] {
        let err = client.list_publications(date, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[tokio::test]
async fn test_publications_are_ordered_and_deduplicated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar"))
        .and(query_param("from", "2025-04-25"))
        .and(query_param("to", "2025-05-02"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "publications": [
                {"title": "Konsumprisindeksen", "releaseDate": "2025-05-02",
                 "sections": [
                    {"name": "KPI", "tables": ["03013", "14700"]},
                    {"name": "KPI-JAE", "tables": ["03013", "05327"]}
                 ]},
                {"title": "Boligpriser", "releaseDate": "2025-04-25", "tables": ["07221"]},
                {"title": "Arbeidsledighet", "releaseDate": "2025-05-02", "tables": ["13760"]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let records = client.list_publications("2025-05-02", Some(7)).await.unwrap();

    let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Boligpriser", "Arbeidsledighet", "Konsumprisindeksen"]
    );
    let kpi: Vec<_> = records[2].table_ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(kpi, vec!["03013", "14700", "05327"]);
}
