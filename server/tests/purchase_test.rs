//! Integration tests for the seller -> buyer flow:
//! upload -> register sale -> tracker confirms -> purchase-gated download.

use std::sync::Arc;

use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::json;
use tokio::net::TcpListener;

use marketplace_server::db::DbPool;
use marketplace_server::envelope::{decrypt, hybrid, keccak_hex, Envelope};
use marketplace_server::ledger::bytecode::{CanonicalBytecode, DEFAULT_LIBRARY_PLACEHOLDER};
use marketplace_server::ledger::mock::MockLedger;
use marketplace_server::ledger::Receipt;
use marketplace_server::objects::FsObjectStore;
use marketplace_server::reconcile::ExpiryWindows;
use marketplace_server::sales::SaleContractTracker;

const SELLER: &str = "0x1111111111111111111111111111111111111111";
const BUYER: &str = "0x2222222222222222222222222222222222222222";
const CONTRACT: &str = "0x5555555555555555555555555555555555555555";
const LIBRARY: &str = "0x4444444444444444444444444444444444444444";
const SHEET_MUSIC: &[u8] = b"%PDF-1.7\n% Nocturne in E-flat major, Op. 9 No. 2\n";

struct TestServer {
    base_url: String,
    db: DbPool,
    ledger: Arc<MockLedger>,
    jwt_secret: Vec<u8>,
    _data_dir: tempfile::TempDir,
}

impl TestServer {
    fn token(&self, user_id: &str, address: &str) -> String {
        marketplace_server::auth::jwt::issue_access_token(&self.jwt_secret, user_id, address)
            .expect("Failed to issue token")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// One pass of the sale tracker against the mock ledger.
    fn run_sale_tracker(&self) {
        let template = format!("0x6080{}5b{}", DEFAULT_LIBRARY_PLACEHOLDER, "ee".repeat(34));
        let bytecode =
            CanonicalBytecode::from_template(&template, DEFAULT_LIBRARY_PLACEHOLDER, LIBRARY).unwrap();
        let tracker = SaleContractTracker::new(
            self.db.clone(),
            self.ledger.clone(),
            Arc::new(bytecode),
            ExpiryWindows::default(),
        );
        tracker.tick().expect("Sale tracker tick failed");
    }

    /// Make `tx_hash` a mined deployment of the sale contract at CONTRACT.
    fn mine_sale_contract(&self, tx_hash: &str) {
        let mut input = vec![0x60, 0x80];
        input.extend([0x44; 20]);
        input.push(0x5b);
        input.extend([0x01; 34]);
        self.ledger.set_input(tx_hash, input);
        self.ledger.set_receipt(
            tx_hash,
            Receipt {
                contract_address: Some(CONTRACT.to_string()),
                ..Receipt::default()
            },
        );
        self.ledger.set_seller(CONTRACT, SELLER);
    }
}

/// Helper: start the server on a random port backed by a scripted ledger.
async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = marketplace_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = marketplace_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");
    let objects = Arc::new(FsObjectStore::new(&data_dir).expect("Failed to create object store"));
    let ledger = Arc::new(MockLedger::new());

    let state = marketplace_server::state::AppState::new(
        db.clone(),
        jwt_secret.clone(),
        ledger.clone(),
        objects,
        1,
    );
    let app = marketplace_server::routes::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        db,
        ledger,
        jwt_secret,
        _data_dir: tmp_dir,
    }
}

fn buyer_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut OsRng, 1024).expect("Failed to generate RSA key")
}

fn public_pem(key: &RsaPrivateKey) -> String {
    key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap()
}

fn tx(byte: &str) -> String {
    format!("0x{}", byte.repeat(32))
}

/// Upload a file as the seller and return (file_id, hash).
async fn upload(server: &TestServer, client: &reqwest::Client, aes_key: Option<&str>) -> (String, String) {
    let mut req = client
        .put(server.url("/api/files"))
        .bearer_auth(server.token("seller", SELLER))
        .body(SHEET_MUSIC.to_vec());
    if let Some(key) = aes_key {
        req = req.header("X-Aes-Key", key);
    }
    let resp = req.send().await.unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    (
        body["file_id"].as_str().unwrap().to_string(),
        body["hash"].as_str().unwrap().to_string(),
    )
}

/// Register and confirm a sale for `file_id`.
async fn list_for_sale(server: &TestServer, client: &reqwest::Client, file_id: &str, tx_hash: &str) {
    let resp = client
        .post(server.url("/api/paper"))
        .bearer_auth(server.token("seller", SELLER))
        .json(&json!({ "tx_hash": tx_hash, "name": "Nocturne Op. 9", "file_id": file_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    server.mine_sale_contract(tx_hash);
    server.run_sale_tracker();
}

#[tokio::test]
async fn test_health_check() {
    let server = start_test_server().await;
    let resp = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_purchased_download_round_trip() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let (file_id, hash) = upload(&server, &client, None).await;
    assert_eq!(hash, keccak_hex(SHEET_MUSIC));
    list_for_sale(&server, &client, &file_id, &tx("aa")).await;

    // Public sale info is visible once the tracker confirmed the contract
    let resp = client
        .get(server.url(&format!("/api/paper/{}", CONTRACT)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let info: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(info["name"], "Nocturne Op. 9");
    assert_eq!(info["file_hash"], hash.as_str());
    assert_eq!(info["sold_out"], false);

    server.ledger.grant_purchase(CONTRACT, BUYER);
    let key = buyer_key();
    let resp = client
        .post(server.url(&format!("/api/paper/{}/download", CONTRACT)))
        .bearer_auth(server.token("buyer", BUYER))
        .json(&json!({ "public_key": public_pem(&key) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/plain");

    let body = resp.bytes().await.unwrap();
    let envelope = Envelope::from_wire(&body, key.size(), hash).unwrap();
    let block = decrypt(&envelope, &key).unwrap();
    assert_eq!(block.data(), SHEET_MUSIC);
}

#[tokio::test]
async fn test_unpurchased_download_is_denied_without_envelope() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let (file_id, _) = upload(&server, &client, None).await;
    list_for_sale(&server, &client, &file_id, &tx("ab")).await;

    let resp = client
        .post(server.url(&format!("/api/paper/{}/download", CONTRACT)))
        .bearer_auth(server.token("buyer", BUYER))
        .json(&json!({ "public_key": public_pem(&buyer_key()) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 4);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_malformed_public_key_is_rejected() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url(&format!("/api/paper/{}/download", CONTRACT)))
        .bearer_auth(server.token("buyer", BUYER))
        .json(&json!({ "public_key": "not a pem" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 1);
}

#[tokio::test]
async fn test_seller_key_release() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let seller_aes_key = "42".repeat(32);

    let (file_id, _) = upload(&server, &client, Some(&seller_aes_key)).await;
    list_for_sale(&server, &client, &file_id, &tx("ac")).await;
    server.ledger.grant_purchase(CONTRACT, BUYER);

    let key = buyer_key();
    let resp = client
        .post(server.url(&format!("/api/music/{}/key", CONTRACT)))
        .bearer_auth(server.token("buyer", BUYER))
        .json(&json!({ "public_key": public_pem(&key) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let wrapped = hex::decode(body["key"].as_str().unwrap()).unwrap();
    assert_eq!(hybrid::unwrap_key(&wrapped, &key).unwrap(), hex::decode(&seller_aes_key).unwrap());

    // The download of a seller-encrypted upload is still a sealed envelope
    let resp = client
        .post(server.url(&format!("/api/paper/{}/download", CONTRACT)))
        .bearer_auth(server.token("buyer", BUYER))
        .json(&json!({ "public_key": public_pem(&key) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.bytes().await.unwrap();
    let envelope = Envelope::from_wire(&body, key.size(), keccak_hex(SHEET_MUSIC)).unwrap();
    assert_eq!(decrypt(&envelope, &key).unwrap().data(), SHEET_MUSIC);
}

#[tokio::test]
async fn test_mistyped_json_body_is_invalid_request() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let token = server.token("buyer", BUYER);

    let bodies = [json!({ "public_key": 42 }), json!({})];
    for path in ["download", "key"] {
        let route = if path == "download" { "paper" } else { "music" };
        for body in &bodies {
            let resp = client
                .post(server.url(&format!("/api/{}/{}/{}", route, CONTRACT, path)))
                .bearer_auth(&token)
                .json(body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 400);
            assert!(resp.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("application/json"));
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(body["code"], 1);
            assert!(body["data"].is_null());
        }
    }

    let resp = client
        .post(server.url("/api/paper"))
        .bearer_auth(server.token("seller", SELLER))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 1);
}

#[tokio::test]
async fn test_unconfirmed_sale_is_not_public() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let (file_id, _) = upload(&server, &client, None).await;
    let resp = client
        .post(server.url("/api/paper"))
        .bearer_auth(server.token("seller", SELLER))
        .json(&json!({ "tx_hash": tx("ad"), "name": "Etude", "file_id": file_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Not mined yet
    server.run_sale_tracker();
    let resp = client
        .get(server.url(&format!("/api/paper/{}", CONTRACT)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 3);
}

#[tokio::test]
async fn test_sale_registration_validation() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let token = server.token("seller", SELLER);

    let resp = client
        .post(server.url("/api/paper"))
        .bearer_auth(&token)
        .json(&json!({ "tx_hash": "0x1234", "name": "Etude" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 8);

    for expected in [201, 409] {
        let resp = client
            .post(server.url("/api/paper"))
            .bearer_auth(&token)
            .json(&json!({ "tx_hash": tx("ae"), "name": "Etude" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), expected);
    }

    let resp = client
        .post(server.url("/api/paper"))
        .bearer_auth(&token)
        .json(&json!({ "tx_hash": tx("af"), "name": "Etude", "file_id": "someone-elses-file" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_upload_rules() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .put(server.url("/api/files"))
        .body(SHEET_MUSIC.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .put(server.url("/api/files"))
        .bearer_auth(server.token("seller", SELLER))
        .header("X-Aes-Key", "abcd")
        .body(SHEET_MUSIC.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Test server limit is 1 MB
    let resp = client
        .put(server.url("/api/files"))
        .bearer_auth(server.token("seller", SELLER))
        .body(vec![0u8; 1024 * 1024 + 1])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 11);
}
