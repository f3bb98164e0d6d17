use openalex_loader::config::PipelineConfig;
use openalex_loader::pipeline::run_pipeline;
use openalex_loader::store::Database;
use openalex_loader::transform::read_json_file;
use openalex_loader::{AuthorshipRecord, WorkRecord};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOI_FIELD: &str = "mods.sm_digital_object_identifier";

fn openalex_work(n: usize) -> serde_json::Value {
    json!({
        "id": format!("https://openalex.org/W{}", n),
        "doi": format!("https://doi.org/10.1234/paper.{}", n),
        "title": format!("Paper number {}", n),
        "primary_location": {
            "is_oa": n % 2 == 0,
            "source": {"display_name": "Journal of Integration"}
        },
        "authorships": [
            {"author": {"display_name": format!("First Author {}", n), "orcid": null}},
            {"author": {"display_name": format!("Second Author {}", n), "orcid": "https://orcid.org/0000-0000"}}
        ]
    })
}

async fn mount_services(mock_server: &MockServer) {
    // Two catalog pages, 55 DOIs total, one record without a DOI
    let page1: Vec<serde_json::Value> = (0..30)
        .map(|i| json!({"PID": format!("a:{}", i), DOI_FIELD: format!("10.1234/paper.{}", i)}))
        .chain(std::iter::once(json!({"PID": "a:nodoi"})))
        .collect();
    let page2: Vec<serde_json::Value> = (30..55)
        .map(|i| json!({"PID": format!("a:{}", i), DOI_FIELD: format!("10.1234/paper.{}", i)}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/test/test_table.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "link",
                    format!("<{}/test/page2.json>; rel=\"next\"", mock_server.uri()).as_str(),
                )
                .set_body_json(page1),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/test/page2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page2))
        .mount(mock_server)
        .await;

    // First batch: 50 DOIs; OpenAlex finds 3 of them
    let first_filter = format!(
        "doi:{}",
        (0..50)
            .map(|i| format!("10.1234/paper.{}", i))
            .collect::<Vec<_>>()
            .join("|")
    );
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("filter", first_filter.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"count": 3},
            "results": [openalex_work(0), openalex_work(1), openalex_work(2)]
        })))
        .with_priority(1)
        .mount(mock_server)
        .await;

    // Second batch: remaining 5 DOIs; OpenAlex finds 1
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"count": 1},
            "results": [openalex_work(50)]
        })))
        .mount(mock_server)
        .await;
}

fn config_for(mock_server: &MockServer, temp_dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        catalog_url: format!("{}/test/test_table.json?_shape=array", mock_server.uri()),
        openalex_url: format!("{}/works", mock_server.uri()),
        mailto: "someone@example.org".to_string(),
        works_dir: temp_dir.path().join("data"),
        authorships_dir: temp_dir.path().join("data"),
        db_dir: temp_dir.path().join("db"),
        db_name: "test.db".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_pipeline_fetch_flatten_load() {
    let temp_dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    mount_services(&mock_server).await;
    let config = config_for(&mock_server, &temp_dir);

    let report = run_pipeline(&config).await.unwrap();

    assert_eq!(report.fetch.catalog_records, 56);
    assert_eq!(report.fetch.dois, 55);
    assert_eq!(report.fetch.batches, 2);
    assert!(report.fetch.failures.is_empty());
    assert_eq!(report.fetch.works.len(), 4);
    assert_eq!(report.fetch.authorships.len(), 8);

    // JSON files
    let works: Vec<WorkRecord> =
        read_json_file(temp_dir.path().join("data").join("main_open_alex_table.json")).unwrap();
    assert_eq!(works, report.fetch.works);
    assert_eq!(works[0].source.as_deref(), Some("Journal of Integration"));
    assert_eq!(works[0].is_oa, Some(true));
    assert_eq!(works[1].is_oa, Some(false));

    let authorships: Vec<AuthorshipRecord> =
        read_json_file(temp_dir.path().join("data").join("author_open_alex_table.json")).unwrap();
    assert_eq!(authorships.len(), 8);
    assert_eq!(authorships[0].id, "https://openalex.org/W0");

    // Database
    assert_eq!(report.load.rows_written("main_open_alex_table"), Some(4));
    assert_eq!(report.load.rows_written("author_open_alex_table"), Some(8));
    assert_eq!(report.load.failures().count(), 0);

    let db = Database::open(temp_dir.path().join("db"), "test.db", false).unwrap();
    assert_eq!(db.count_rows("main_open_alex_table").unwrap(), 4);
    assert_eq!(db.count_rows("author_open_alex_table").unwrap(), 8);
    assert_eq!(db.search("main_open_alex_table", "\"number 50\"").unwrap().len(), 1);
    assert_eq!(db.search("author_open_alex_table", "second").unwrap().len(), 4);
}

#[tokio::test]
async fn test_rerun_with_upsert_does_not_duplicate_works() {
    let temp_dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    mount_services(&mock_server).await;
    let mut config = config_for(&mock_server, &temp_dir);

    run_pipeline(&config).await.unwrap();
    config.upsert = true;
    run_pipeline(&config).await.unwrap();

    let db = Database::open(temp_dir.path().join("db"), "test.db", false).unwrap();
    assert_eq!(db.count_rows("main_open_alex_table").unwrap(), 4);
    // authorships have no primary key, so a rerun appends
    assert_eq!(db.count_rows("author_open_alex_table").unwrap(), 16);
}

#[tokio::test]
async fn test_rerun_with_fresh_db_starts_over() {
    let temp_dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    mount_services(&mock_server).await;
    let mut config = config_for(&mock_server, &temp_dir);

    run_pipeline(&config).await.unwrap();
    config.fresh_db = true;
    run_pipeline(&config).await.unwrap();

    let db = Database::open(temp_dir.path().join("db"), "test.db", false).unwrap();
    assert_eq!(db.count_rows("main_open_alex_table").unwrap(), 4);
    assert_eq!(db.count_rows("author_open_alex_table").unwrap(), 8);
}

#[tokio::test]
async fn test_pipeline_continues_past_failed_batch() {
    let temp_dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    let catalog: Vec<serde_json::Value> = (0..60)
        .map(|i| json!({DOI_FIELD: format!("10.1234/paper.{}", i)}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/test/test_table.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog))
        .mount(&mock_server)
        .await;

    let second_filter = format!(
        "doi:{}",
        (50..60)
            .map(|i| format!("10.1234/paper.{}", i))
            .collect::<Vec<_>>()
            .join("|")
    );
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("filter", second_filter.as_str()))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [openalex_work(7)]
        })))
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server, &temp_dir);
    let report = run_pipeline(&config).await.unwrap();

    assert_eq!(report.fetch.batches, 2);
    assert_eq!(report.fetch.failures.len(), 1);
    assert_eq!(report.fetch.failures[0].batch_number, 2);
    assert_eq!(report.fetch.works.len(), 1);
    assert_eq!(report.load.rows_written("main_open_alex_table"), Some(1));
}
