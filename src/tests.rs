//! Integration tests for the portal backend.

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::{Config, LogFormat, TagConflictPolicy};
use crate::db::{DocumentStore, TagIndex};
use crate::files::FileStore;
use crate::{create_router, AppState};

const TEST_KEY: &str = "test-api-key";

/// Build application state over a fresh temp directory.
async fn test_state(
    psk: Option<&str>,
    max_upload_bytes: usize,
    tag_conflict: TagConflictPolicy,
) -> (AppState, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let upload_dir = temp_dir.path().join("uploads");

    let store = DocumentStore::connect(&db_path)
        .await
        .expect("Failed to init DB");
    let tags = TagIndex::new(store.clone(), tag_conflict);
    let files = FileStore::open(&upload_dir, max_upload_bytes, store.clone())
        .await
        .expect("Failed to open upload dir");

    let config = Config {
        api_psk: psk.map(str::to_string),
        db_path,
        upload_dir,
        max_upload_bytes,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Pretty,
        tag_conflict,
    };

    let state = AppState {
        store,
        tags,
        files,
        config: Arc::new(config),
    };
    (state, temp_dir)
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::build(Some(TEST_KEY), 1024 * 1024, TagConflictPolicy::Reject).await
    }

    async fn build(
        psk: Option<&str>,
        max_upload_bytes: usize,
        tag_conflict: TagConflictPolicy,
    ) -> Self {
        let (state, temp_dir) = test_state(psk, max_upload_bytes, tag_conflict).await;
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn put(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let resp = self.client.delete(self.url(path)).send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn delete_with(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .delete(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn create_tag(&self, name: &str) -> String {
        let (status, body) = self.post("/api/tags", json!({ "name": name })).await;
        assert_eq!(status, 201, "creating tag {name}: {body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_resource(&self, kind: &str, payload: Value) -> Value {
        let (status, body) = self
            .post(&format!("/api/resources/{kind}"), payload)
            .await;
        assert_eq!(status, 201, "creating {kind}: {body}");
        body["data"].clone()
    }
}

fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Health & auth
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    // Request without API key
    let resp = Client::new()
        .get(fixture.url("/api/tags"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/tags"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_auth_bearer_token() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/tags"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_auth_disabled_without_psk() {
    let fixture = TestFixture::build(None, 1024, TagConflictPolicy::Reject).await;

    let (status, body) = fixture.get("/api/tags").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
}

// ============================================================================
// Tags
// ============================================================================

#[tokio::test]
async fn test_tag_crud() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post(
            "/api/tags",
            json!({ "name": "Vi Mạch", "description": "  Integrated circuits  " }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], "vi-mach");
    assert_eq!(body["data"]["name"], "Vi Mạch");
    assert_eq!(body["data"]["description"], "Integrated circuits");

    // Same slug again
    let (status, body) = fixture.post("/api/tags", json!({ "name": "vi mach" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "TAG_ALREADY_EXISTS");

    // Rename keeps the id
    let (status, body) = fixture
        .put("/api/tags/vi-mach", json!({ "name": "Vi mạch điện tử" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], "vi-mach");
    assert_eq!(body["data"]["name"], "Vi mạch điện tử");

    let (status, body) = fixture.get("/api/tags?id=vi-mach").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Vi mạch điện tử");

    let (status, body) = fixture.get("/api/tags").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture.delete("/api/tags/vi-mach").await;
    assert_eq!(status, 200);

    let (status, body) = fixture.get("/api/tags?id=vi-mach").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = fixture.delete("/api/tags/vi-mach").await;
    assert_eq!(status, 404);
    let (status, _) = fixture.put("/api/tags/vi-mach", json!({ "name": "x" })).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_tag_validation() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.post("/api/tags", json!({ "name": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture.post("/api/tags", json!({ "name": "!!!" })).await;
    assert_eq!(status, 400);

    let (status, _) = fixture.get("/api/tags?type=news").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_tag_conflict_reuse_policy() {
    let fixture = TestFixture::build(Some(TEST_KEY), 1024, TagConflictPolicy::Reuse).await;

    let (status, first) = fixture.post("/api/tags", json!({ "name": "IoT" })).await;
    assert_eq!(status, 201);
    let (status, second) = fixture.post("/api/tags", json!({ "name": "iot" })).await;
    assert_eq!(status, 201);
    assert_eq!(second["data"]["id"], first["data"]["id"]);
    assert_eq!(second["data"]["name"], "IoT");
}

#[tokio::test]
async fn test_tag_references() {
    let fixture = TestFixture::new().await;
    let tag = fixture.create_tag("Vi Mạch").await;

    let (status, body) = fixture
        .post(
            "/api/tag-references",
            json!({ "tagId": tag, "type": "news", "referId": "n1" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["message"], "Reference added");

    // Idempotent
    let (status, _) = fixture
        .post(
            "/api/tag-references",
            json!({ "tagId": tag, "type": "news", "referId": "n1" }),
        )
        .await;
    assert_eq!(status, 200);

    let (_, body) = fixture.get("/api/tags?id=vi-mach&type=news").await;
    assert_eq!(ids(&body["data"]), ["n1"]);

    let (_, body) = fixture.get("/api/tags?id=vi-mach").await;
    assert_eq!(body["data"]["news_id"], json!(["n1"]));

    let (status, body) = fixture.get("/api/tag-references?type=news&referId=n1").await;
    assert_eq!(status, 200);
    assert_eq!(ids(&body["data"]), ["vi-mach"]);

    // Unknown tag and bad input
    let (status, _) = fixture
        .post(
            "/api/tag-references",
            json!({ "tagId": "missing", "type": "news", "referId": "n1" }),
        )
        .await;
    assert_eq!(status, 404);
    let (status, _) = fixture
        .post(
            "/api/tag-references",
            json!({ "tagId": tag, "type": "", "referId": "n1" }),
        )
        .await;
    assert_eq!(status, 400);
    let (status, _) = fixture
        .post(
            "/api/tag-references",
            json!({ "tagId": tag, "type": "News Items", "referId": "n1" }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .delete_with(
            "/api/tags/vi-mach/references",
            json!({ "type": "news", "referId": "n1" }),
        )
        .await;
    assert_eq!(status, 200);

    let (_, body) = fixture.get("/api/tags?id=vi-mach&type=news").await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let (_, body) = fixture.get("/api/tag-references?type=news&referId=n1").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = fixture
        .delete_with(
            "/api/tags/missing/references",
            json!({ "type": "news", "referId": "n1" }),
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_concurrent_reference_adds() {
    let fixture = TestFixture::new().await;
    let tag = fixture.create_tag("Embedded").await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let client = fixture.client.clone();
        let url = fixture.url("/api/tag-references");
        let body = json!({ "tagId": tag, "type": "device", "referId": format!("d{i}") });
        handles.push(tokio::spawn(async move {
            client.post(url).json(&body).send().await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 200);
    }

    let (_, body) = fixture.get("/api/tags?id=embedded&type=device").await;
    let mut refs = ids(&body["data"]);
    refs.sort();
    let mut expected: Vec<String> = (0..10).map(|i| format!("d{i}")).collect();
    expected.sort();
    assert_eq!(refs, expected);
}

#[tokio::test]
async fn test_sync_tags() {
    let fixture = TestFixture::new().await;
    for name in ["Alpha", "Beta", "Gamma"] {
        fixture.create_tag(name).await;
    }

    let (status, body) = fixture
        .put(
            "/api/tag-references",
            json!({ "type": "device", "referId": "d1", "tagIds": ["alpha", "beta"] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(ids(&body["data"]["added"]), ["alpha", "beta"]);
    assert!(body["data"]["removed"].as_array().unwrap().is_empty());

    let (_, body) = fixture
        .put(
            "/api/tag-references",
            json!({ "type": "device", "referId": "d1", "tagIds": ["beta", "gamma"] }),
        )
        .await;
    assert_eq!(ids(&body["data"]["added"]), ["gamma"]);
    assert_eq!(ids(&body["data"]["removed"]), ["alpha"]);

    // A missing tag aborts the whole sync
    let (status, _) = fixture
        .put(
            "/api/tag-references",
            json!({ "type": "device", "referId": "d1", "tagIds": ["alpha", "nope"] }),
        )
        .await;
    assert_eq!(status, 404);

    let (_, body) = fixture.get("/api/tag-references?type=device&referId=d1").await;
    let mut current = ids(&body["data"]);
    current.sort();
    assert_eq!(current, ["beta", "gamma"]);
}

#[tokio::test]
async fn test_tags_named_like_reference_routes() {
    let fixture = TestFixture::new().await;
    for name in ["Sync", "Lookup", "References"] {
        fixture.create_tag(name).await;
    }

    let (status, body) = fixture
        .put("/api/tags/sync", json!({ "name": "Renamed" }))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["id"], "sync");
    assert_eq!(body["data"]["name"], "Renamed");

    let (status, body) = fixture.get("/api/tags?id=lookup").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Lookup");

    for id in ["lookup", "references", "sync"] {
        let (status, body) = fixture.delete(&format!("/api/tags/{id}")).await;
        assert_eq!(status, 200, "deleting {id}: {body}");
    }
    let (_, body) = fixture.get("/api/tags").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

// ============================================================================
// Resources
// ============================================================================

#[tokio::test]
async fn test_resource_crud() {
    let fixture = TestFixture::new().await;

    let news = fixture
        .create_resource(
            "news",
            json!({ "title": "Ra mắt vi mạch mới", "content": "<p>body</p>", "status": "draft" }),
        )
        .await;
    let id = news["id"].as_str().unwrap().to_string();
    let slug = news["slug"].as_str().unwrap().to_string();
    assert!(slug.starts_with("ra-mat-vi-mach-moi-"), "slug was {slug}");
    assert!(news["createdAt"].is_string());

    // Detail keeps content
    let (status, body) = fixture.get(&format!("/api/resources/news/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["content"], "<p>body</p>");

    let (status, body) = fixture.get(&format!("/api/resources/news/slug/{slug}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], id.as_str());

    // List omits content
    let (status, body) = fixture.get("/api/resources/news").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 1);
    let item = &body["data"]["items"][0];
    assert_eq!(item["title"], "Ra mắt vi mạch mới");
    assert!(item.get("content").is_none());

    let (status, body) = fixture
        .put(
            &format!("/api/resources/news/{id}"),
            json!({ "status": "published", "id": "hijack" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "published");
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["title"], "Ra mắt vi mạch mới");

    let (status, _) = fixture
        .put(&format!("/api/resources/news/{id}"), json!({ "title": "" }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture.delete(&format!("/api/resources/news/{id}")).await;
    assert_eq!(status, 200);
    let (status, _) = fixture.get(&format!("/api/resources/news/{id}")).await;
    assert_eq!(status, 404);
    let (status, _) = fixture.delete(&format!("/api/resources/news/{id}")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_resource_validation() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post("/api/resources/message", json!({ "email": "a@b.vn" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = fixture
        .post("/api/resources/widgets", json!({ "name": "x" }))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = fixture.post("/api/resources/party", json!(["x"])).await;
    assert_eq!(status, 400);

    let (status, _) = fixture.get("/api/resources/party?skip=-1").await;
    assert_eq!(status, 400);
    let (status, _) = fixture.get("/api/resources/party?sort=bad-field").await;
    assert_eq!(status, 400);
    let (status, _) = fixture.put("/api/resources/party/missing", json!({ "note": "x" })).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_resource_list_paging_filter_sort() {
    let fixture = TestFixture::new().await;
    for (name, status) in [("An", "active"), ("Binh", "inactive"), ("Chi", "active")] {
        fixture
            .create_resource("party", json!({ "name": name, "status": status }))
            .await;
    }

    // Newest first by default
    let (_, body) = fixture.get("/api/resources/party?limit=2").await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["limit"], 2);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "Chi");
    assert_eq!(items[1]["name"], "Binh");

    let (_, body) = fixture.get("/api/resources/party?limit=2&skip=2").await;
    assert_eq!(body["data"]["skip"], 2);
    assert_eq!(body["data"]["items"][0]["name"], "An");

    let (_, body) = fixture.get("/api/resources/party?status=active&sort=name").await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["items"][0]["name"], "An");
    assert_eq!(body["data"]["items"][1]["name"], "Chi");

    let (_, body) = fixture.get("/api/resources/party?sort=-name").await;
    assert_eq!(body["data"]["items"][0]["name"], "Chi");
}

#[tokio::test]
async fn test_account_password_hidden() {
    let fixture = TestFixture::new().await;

    let account = fixture
        .create_resource(
            "account",
            json!({ "username": "admin", "password": "$argon2id$hash", "role": "editor" }),
        )
        .await;
    assert!(account.get("password").is_none());
    let id = account["id"].as_str().unwrap();

    let (_, body) = fixture.get(&format!("/api/resources/account/{id}")).await;
    assert_eq!(body["data"]["username"], "admin");
    assert!(body["data"].get("password").is_none());

    let (_, body) = fixture.get("/api/resources/account").await;
    assert!(body["data"]["items"][0].get("password").is_none());

    let (status, _) = fixture.get("/api/resources/account?password=x").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_resource_tags_and_related() {
    let fixture = TestFixture::new().await;
    fixture.create_tag("IoT").await;
    fixture.create_tag("Robot").await;

    let a = fixture
        .create_resource("device", json!({ "name": "Cảm biến A", "tagIds": ["iot"] }))
        .await;
    let b = fixture
        .create_resource("device", json!({ "name": "Cảm biến B", "tagIds": ["iot", "robot"] }))
        .await;
    let c = fixture
        .create_resource("device", json!({ "name": "Cánh tay C", "tagIds": ["robot"] }))
        .await;
    let a_id = a["id"].as_str().unwrap();
    let b_id = b["id"].as_str().unwrap();
    let c_id = c["id"].as_str().unwrap();
    assert!(a.get("tagIds").is_none());
    assert!(a["slug"].as_str().unwrap().starts_with("cam-bien-a-"));

    let (_, body) = fixture
        .get(&format!("/api/tag-references?type=device&referId={a_id}"))
        .await;
    assert_eq!(ids(&body["data"]), ["iot"]);

    let (status, body) = fixture
        .get(&format!("/api/resources/device/{a_id}/related"))
        .await;
    assert_eq!(status, 200);
    let related: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(related, [b_id]);

    let (_, body) = fixture
        .get(&format!("/api/resources/device/{b_id}/related"))
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Retag through update
    let (status, _) = fixture
        .put(
            &format!("/api/resources/device/{c_id}"),
            json!({ "tagIds": ["iot"] }),
        )
        .await;
    assert_eq!(status, 200);
    let (_, body) = fixture.get("/api/tags?id=robot&type=device").await;
    assert_eq!(ids(&body["data"]), [b_id]);

    // Deleting a resource unlinks it
    let (status, _) = fixture.delete(&format!("/api/resources/device/{a_id}")).await;
    assert_eq!(status, 200);
    let (_, body) = fixture.get("/api/tags?id=iot&type=device").await;
    let mut remaining = ids(&body["data"]);
    remaining.sort();
    let mut expected = vec![b_id.to_string(), c_id.to_string()];
    expected.sort();
    assert_eq!(remaining, expected);

    // Unknown tag on create leaves nothing behind
    let (status, _) = fixture
        .post(
            "/api/resources/device",
            json!({ "name": "Orphan", "tagIds": ["missing"] }),
        )
        .await;
    assert_eq!(status, 404);
    let (_, body) = fixture.get("/api/resources/device?name=Orphan").await;
    assert_eq!(body["data"]["total"], 0);

    let (status, _) = fixture.get("/api/resources/device/missing/related").await;
    assert_eq!(status, 404);
}

// ============================================================================
// Files
// ============================================================================

#[tokio::test]
async fn test_file_upload_download_delete() {
    let fixture = TestFixture::new().await;
    let content = b"\x89PNG\r\n\x1a\nfake image".to_vec();

    let resp = fixture
        .client
        .post(fixture.url("/api/files"))
        .header("content-type", "image/png")
        .header("x-file-name", "logo.png")
        .body(content.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["originalName"], "logo.png");
    assert_eq!(body["data"]["contentType"], "image/png");
    assert_eq!(body["data"]["size"], content.len());

    let (status, body) = fixture.get(&format!("/api/files/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], id.as_str());

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/files/{id}/raw")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().to_vec(), content);

    let (status, _) = fixture.delete(&format!("/api/files/{id}")).await;
    assert_eq!(status, 200);
    let (status, _) = fixture.get(&format!("/api/files/{id}")).await;
    assert_eq!(status, 404);
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/files/{id}/raw")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_file_upload_rejections() {
    let fixture = TestFixture::build(Some(TEST_KEY), 64, TagConflictPolicy::Reject).await;

    let resp = fixture
        .client
        .post(fixture.url("/api/files"))
        .header("content-type", "text/html")
        .body("<script></script>")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .post(fixture.url("/api/files"))
        .header("content-type", "application/pdf")
        .body(vec![b'%'; 128])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");

    let resp = fixture
        .client
        .post(fixture.url("/api/files"))
        .body(vec![1u8; 8])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ============================================================================
// In-process router checks
// ============================================================================

#[tokio::test]
async fn test_router_oneshot_error_envelope() {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let (state, _dir) = test_state(None, 1024, TagConflictPolicy::Reject).await;
    let app = create_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/resources/widgets/abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("widgets"));
}

#[tokio::test]
async fn test_router_malformed_bodies_use_envelope() {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    let (state, _dir) = test_state(None, 1024, TagConflictPolicy::Reject).await;
    let app = create_router(state);

    let cases = [
        ("/api/tags", Some("application/json"), "{not json", "BAD_REQUEST"),
        ("/api/tags", None, r#"{"name":"x"}"#, "BAD_REQUEST"),
        (
            "/api/tag-references",
            Some("application/json"),
            r#"{"tagId":5}"#,
            "VALIDATION_ERROR",
        ),
    ];

    for (uri, content_type, payload, code) in cases {
        let mut request = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let resp = app
            .clone()
            .oneshot(request.body(Body::from(payload)).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri} {payload}");
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/json",
            "{uri} {payload}"
        );

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], code, "{uri} {payload}");
    }
}
