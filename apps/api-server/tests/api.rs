//! Router tests: real handlers, in-memory database, no sockets.

use std::sync::Arc;

use apothecary_api::{router, AppState, JwtManager};
use apothecary_core::{Role, User};
use apothecary_db::{Database, DbConfig, NewProduct, NewUser, ProductUpdate};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "router-test-secret-at-least-32-chars";
const PASSWORD: &str = "correct horse battery";

struct TestApp {
    app: Router,
    db: Database,
}

async fn test_app() -> TestApp {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let state: Arc<AppState> = AppState::new(db.clone(), JwtManager::new(SECRET, 3600));
    TestApp {
        app: router(state),
        db,
    }
}

impl TestApp {
    async fn user(&self, username: &str, role: Role) -> User {
        self.db
            .users()
            .create(NewUser {
                username: username.to_string(),
                full_name: format!("Test {username}"),
                password: PASSWORD.to_string(),
                role,
            })
            .await
            .unwrap()
    }

    async fn login(&self, username: &str, role: Role) -> String {
        self.user(username, role).await;
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn product(&self, sku: &str, price: i64, quantity: i64) -> String {
        let admin = self.db.users().list().await.unwrap();
        self.db
            .products()
            .create(
                NewProduct {
                    sku: sku.to_string(),
                    barcode: None,
                    name: format!("{sku} tablets"),
                    generic_name: None,
                    description: None,
                    unit_price_cents: price,
                    cost_price_cents: price / 2,
                    quantity,
                    reorder_level: 2,
                    expiry_date: None,
                    batch_number: None,
                    requires_prescription: false,
                    category_id: None,
                    supplier_id: None,
                },
                &admin[0].id,
            )
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let t = test_app().await;
    let (status, body) = t.send(Method::GET, "/api/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let t = test_app().await;
    t.user("cashier1", Role::Cashier).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "cashier1", "password": "nope" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_protected_routes_need_a_token() {
    let t = test_app().await;

    let (status, _) = t.send(Method::GET, "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.send(Method::GET, "/api/v1/products", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sale_over_http() {
    let t = test_app().await;
    let token = t.login("cashier1", Role::Cashier).await;
    let product = t.product("PARA-500", 450, 5).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/sales",
            Some(&token),
            Some(json!({
                "items": [{ "product_id": product, "quantity": 3 }],
                "payment_method": "cash",
                "amount_paid_cents": 2000,
                "tax_cents": 0
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["total_cents"], 1350);
    assert_eq!(body["change_cents"], 650);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    let sale_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = t.send(Method::GET, &format!("/api/v1/products/{product}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 2);

    let (status, body) = t.send(Method::GET, &format!("/api/v1/sales/{sale_id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invoice_number"].as_str().unwrap().len(), "INV202610160001".len());
}

#[tokio::test]
async fn test_insufficient_stock_lists_shortages() {
    let t = test_app().await;
    let token = t.login("cashier1", Role::Cashier).await;
    let product = t.product("AMOX-500", 1200, 2).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/sales",
            Some(&token),
            Some(json!({
                "items": [{ "product_id": product, "quantity": 5 }],
                "payment_method": "cash",
                "amount_paid_cents": 10000
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["error"]["shortages"][0]["available"], 2);
    assert_eq!(body["error"]["shortages"][0]["requested"], 5);
}

#[tokio::test]
async fn test_validation_error_names_the_field() {
    let t = test_app().await;
    let token = t.login("cashier1", Role::Cashier).await;
    let product = t.product("IBU-400", 300, 5).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/sales",
            Some(&token),
            Some(json!({
                "items": [{ "product_id": product, "quantity": 0 }],
                "payment_method": "cash",
                "amount_paid_cents": 0
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "quantity");
}

#[tokio::test]
async fn test_oversized_amounts_are_400() {
    let t = test_app().await;
    let token = t.login("cashier1", Role::Cashier).await;
    let product = t.product("ZINC-20", 200, 5).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/sales",
            Some(&token),
            Some(json!({
                "items": [{ "product_id": product, "quantity": 1 }],
                "payment_method": "cash",
                "amount_paid_cents": 200,
                "tax_cents": i64::MAX
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"]["field"], "tax_cents");
}

#[tokio::test]
async fn test_policy_is_enforced() {
    let t = test_app().await;
    let cashier = t.login("cashier1", Role::Cashier).await;
    let lab = t.login("lab1", Role::LabTechnician).await;

    // Cashiers may not create catalog entries
    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/products",
            Some(&cashier),
            Some(json!({ "sku": "X-1", "name": "X", "unit_price_cents": 100 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    // Lab technicians may not sell
    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/sales",
            Some(&lab),
            Some(json!({ "items": [], "payment_method": "cash", "amount_paid_cents": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Nor create users
    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/users",
            Some(&cashier),
            Some(json!({ "username": "x", "full_name": "X", "password": "long enough pw", "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_settings_not_configured() {
    let t = test_app().await;
    let token = t.login("pharm1", Role::Pharmacist).await;

    let (status, body) = t.send(Method::GET, "/api/v1/settings", Some(&token), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "NOT_CONFIGURED");
}

#[tokio::test]
async fn test_prescription_flow() {
    let t = test_app().await;
    let token = t.login("pharm1", Role::Pharmacist).await;
    let product = t.product("CIPRO-500", 1200, 10).await;

    let (status, customer) = t
        .send(
            Method::POST,
            "/api/v1/customers",
            Some(&token),
            Some(json!({ "name": "Achieng Odhiambo", "phone": "+254722000000" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, rx) = t
        .send(
            Method::POST,
            "/api/v1/prescriptions",
            Some(&token),
            Some(json!({
                "customer_id": customer["id"],
                "doctor_name": "Dr. Mwangi",
                "items": [{
                    "product_id": product,
                    "dosage": "500mg",
                    "frequency": "twice daily",
                    "duration": "7 days",
                    "quantity": 4
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{rx}");
    assert_eq!(rx["status"], "pending");
    let rx_id = rx["id"].as_str().unwrap().to_string();

    let (status, outcome) = t
        .send(
            Method::POST,
            &format!("/api/v1/prescriptions/{rx_id}/dispense"),
            Some(&token),
            Some(json!({ "sale": { "payment_method": "card", "amount_paid_cents": 4800, "tax_cents": 0 } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["prescription"]["status"], "dispensed");
    assert_eq!(outcome["sale"]["total_cents"], 4800);
    assert_eq!(outcome["sale"]["prescription_id"], rx_id.as_str());

    let (status, body) = t
        .send(
            Method::POST,
            &format!("/api/v1/prescriptions/{rx_id}/dispense"),
            Some(&token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");

    let (status, history) = t
        .send(
            Method::GET,
            &format!("/api/v1/customers/{}/prescriptions", customer["id"].as_str().unwrap()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "dispensed");

    let (status, _) = t
        .send(Method::GET, "/api/v1/customers/nope/prescriptions", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_ids_are_404() {
    let t = test_app().await;
    let token = t.login("manager1", Role::Manager).await;

    for uri in ["/api/v1/products/nope", "/api/v1/sales/nope", "/api/v1/customers/nope"] {
        let (status, body) = t.send(Method::GET, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    let (status, _) = t
        .send(Method::POST, "/api/v1/sales/nope/cancel", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lab_test_flow() {
    let t = test_app().await;
    let admin = t.login("admin1", Role::Admin).await;
    let cashier = t.login("cashier1", Role::Cashier).await;
    let tech = t.login("lab1", Role::LabTechnician).await;
    let pharmacist = t.login("pharm1", Role::Pharmacist).await;

    let (status, test_type) = t
        .send(
            Method::POST,
            "/api/v1/test-types",
            Some(&admin),
            Some(json!({ "name": "Malaria Parasite Smear", "code": "mps", "cost_cents": 30000 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{test_type}");
    assert_eq!(test_type["code"], "MPS");

    let (status, test) = t
        .send(
            Method::POST,
            "/api/v1/lab-tests",
            Some(&cashier),
            Some(json!({ "test_type_id": test_type["id"], "patient_name": "Kevin Mutua", "patient_gender": "male" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{test}");
    assert!(test["test_number"].as_str().unwrap().starts_with("LAB"));
    assert_eq!(test["status"], "pending");
    assert_eq!(test["cost_cents"], 30000);
    let base = format!("/api/v1/lab-tests/{}", test["id"].as_str().unwrap());

    // Technicians run tests but do not sign them off
    let (status, _) = t
        .send(Method::POST, &format!("{base}/review"), Some(&tech), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .send(Method::POST, &format!("{base}/start"), Some(&cashier), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, started) = t
        .send(Method::POST, &format!("{base}/start"), Some(&tech), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{started}");
    assert_eq!(started["status"], "in_progress");

    let (status, _) = t
        .send(
            Method::POST,
            &format!("{base}/measurements"),
            Some(&tech),
            Some(json!({ "parameter_name": "Parasites", "value": "none seen", "unit": "per HPF" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, completed) = t
        .send(
            Method::POST,
            &format!("{base}/complete"),
            Some(&tech),
            Some(json!({ "results": "Negative" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{completed}");
    assert_eq!(completed["results"], "Negative");

    let (status, reviewed) = t
        .send(Method::POST, &format!("{base}/review"), Some(&pharmacist), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "reviewed");
    assert_eq!(reviewed["measurements"].as_array().unwrap().len(), 1);

    let (status, paid) = t
        .send(
            Method::POST,
            &format!("{base}/pay"),
            Some(&cashier),
            Some(json!({ "payment_method": "mobile" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["paid"], true);
    assert_eq!(paid["payment_method"], "mobile");

    let (status, body) = t
        .send(Method::POST, &format!("{base}/pay"), Some(&cashier), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");

    let (status, mine) = t
        .send(Method::GET, "/api/v1/lab-tests?assigned_to=me", Some(&tech), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, _) = t
        .send(Method::GET, "/api/v1/lab-tests/nope", Some(&tech), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expenses_are_private_until_approved() {
    let t = test_app().await;
    let admin = t.login("admin1", Role::Admin).await;
    let manager = t.login("manager1", Role::Manager).await;
    let owner = t.login("cashier1", Role::Cashier).await;
    let other = t.login("cashier2", Role::Cashier).await;

    let (status, expense) = t
        .send(
            Method::POST,
            "/api/v1/expenses",
            Some(&owner),
            Some(json!({
                "category": "Utilities",
                "description": "Water bill",
                "amount_cents": 250000,
                "expense_date": "2026-10-05"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{expense}");
    assert_eq!(expense["payment_method"], "cash");
    assert_eq!(expense["is_approved"], false);
    let uri = format!("/api/v1/expenses/{}", expense["id"].as_str().unwrap());

    let (_, listed) = t.send(Method::GET, "/api/v1/expenses", Some(&other), None).await;
    assert!(listed.as_array().unwrap().is_empty());
    let (status, _) = t.send(Method::GET, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t
        .send(Method::PUT, &uri, Some(&other), Some(json!({ "amount_cents": 1 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = t.send(Method::GET, "/api/v1/expenses", Some(&manager), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (status, _) = t
        .send(Method::POST, &format!("{uri}/approve"), Some(&manager), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = t
        .send(Method::POST, &format!("{uri}/approve"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["is_approved"], true);

    let (status, body) = t
        .send(Method::PUT, &uri, Some(&owner), Some(json!({ "amount_cents": 260000 })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");

    let (status, _) = t.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.send(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_me_and_change_password() {
    let t = test_app().await;
    let token = t.login("pharm1", Role::Pharmacist).await;

    let (status, me) = t.send(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "pharm1");
    assert_eq!(me["role"], "pharmacist");

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/auth/change-password",
            Some(&token),
            Some(json!({ "old_password": "guess", "new_password": "a brand new secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "old_password");

    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/auth/change-password",
            Some(&token),
            Some(json!({ "old_password": PASSWORD, "new_password": "a brand new secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "pharm1", "password": "a brand new secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.send(Method::GET, "/api/v1/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_categories_and_suppliers() {
    let t = test_app().await;
    let manager = t.login("manager1", Role::Manager).await;
    let cashier = t.login("cashier1", Role::Cashier).await;

    let (status, category) = t
        .send(
            Method::POST,
            "/api/v1/categories",
            Some(&manager),
            Some(json!({ "name": "Antimalarials" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/categories",
            Some(&cashier),
            Some(json!({ "name": "Antacids" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let product_id = t.product("COART-80", 90000, 5).await;
    t.db.products()
        .update(
            &product_id,
            ProductUpdate {
                category_id: Some(category["id"].as_str().unwrap().to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    t.product("PARA-500", 350, 5).await;

    let (status, listed) = t
        .send(
            Method::GET,
            &format!("/api/v1/products?category_id={}", category["id"].as_str().unwrap()),
            Some(&cashier),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["sku"], "COART-80");

    let (status, body) = t
        .send(
            Method::POST,
            "/api/v1/suppliers",
            Some(&manager),
            Some(json!({
                "name": "MediSupply",
                "contact_person": "Grace Wanjiru",
                "email": "not-an-email",
                "phone": "+254700111222",
                "address": "Nairobi"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "email");

    let (status, _) = t
        .send(
            Method::POST,
            "/api/v1/suppliers",
            Some(&manager),
            Some(json!({
                "name": "MediSupply",
                "contact_person": "Grace Wanjiru",
                "email": "orders@medisupply.co.ke",
                "phone": "+254700111222",
                "address": "Nairobi"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, suppliers) = t.send(Method::GET, "/api/v1/suppliers", Some(&cashier), None).await;
    assert_eq!(suppliers.as_array().unwrap().len(), 1);
}
