use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use pengajuan::auth::jwt::JwtService;
use pengajuan::auth::password::hash_password;
use pengajuan::config::AppConfig;
use pengajuan::db::{self, PgPool};
use pengajuan::models::NewUser;
use pengajuan::routes;
use pengajuan::state::AppState;
use pengajuan::workflow::CachedCatalog;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

/// A status code plus the decoded JSON envelope.
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl JsonResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    #[allow(dead_code)]
    pub fn error_kind(&self) -> Option<&str> {
        self.body["error"]["kind"].as_str()
    }
}

impl TestApp {
    /// Returns `None` when `TEST_DATABASE_URL` is not set so the suite can
    /// run without a database.
    pub async fn new() -> Result<Option<Self>> {
        let database_url = match env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping integration test");
                return Ok(None);
            }
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            requirement_cache_ttl: Duration::from_secs(60),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let jwt = JwtService::from_config(&config)?;
        let catalog = Arc::new(CachedCatalog::new(config.requirement_cache_ttl));
        let state = AppState::new(pool, config, catalog, jwt);
        let router = routes::create_router(state.clone())?;

        Ok(Some(Self { state, router }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.state.catalog.invalidate();
        self.with_conn(truncate_all).await
    }

    pub async fn insert_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
        office_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                display_name: format!("{username} (test)"),
                username,
                password_hash: hash_password(&password)?,
                role,
                office_id,
            };
            diesel::insert_into(pengajuan::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .post_json(
                "/api/auth/login",
                &json!({ "username": username, "password": password }),
                None,
            )
            .await?;
        ensure!(
            response.status == StatusCode::OK,
            "login failed with status {}: {}",
            response.status,
            response.body
        );
        response.data()["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response had no access_token"))
    }

    /// Creates a user with `role` and returns its bearer token.
    #[allow(dead_code)]
    pub async fn user_token(
        &self,
        username: &str,
        role: &str,
        office_id: Option<Uuid>,
    ) -> Result<String> {
        let password = "s3cret-pass";
        self.insert_user(username, password, role, office_id).await?;
        self.login_token(username, password).await
    }

    /// Registers a job classification through the catalog endpoint.
    #[allow(dead_code)]
    pub async fn seed_requirement(
        &self,
        token: &str,
        name: &str,
        admin_wilayah: &[&str],
    ) -> Result<Uuid> {
        let entries: Vec<Value> = admin_wilayah
            .iter()
            .map(|tag| json!({ "document_type": tag }))
            .collect();
        let response = self
            .post_json(
                "/api/job-requirements",
                &json!({ "name": name, "admin_wilayah": entries }),
                Some(token),
            )
            .await?;
        ensure!(
            response.status == StatusCode::CREATED,
            "seeding requirement failed with status {}: {}",
            response.status,
            response.body
        );
        parse_id(response.data())
    }

    #[allow(dead_code)]
    pub async fn seed_tracking_status(&self, token: &str, code: &str, name: &str) -> Result<Uuid> {
        let response = self
            .post_json(
                "/api/tracking-statuses",
                &json!({ "code": code, "name": name }),
                Some(token),
            )
            .await?;
        ensure!(
            response.status == StatusCode::CREATED,
            "seeding tracking status failed with status {}: {}",
            response.status,
            response.body
        );
        parse_id(response.data())
    }

    /// Creates a draft and returns its id.
    #[allow(dead_code)]
    pub async fn create_draft(
        &self,
        token: &str,
        job_classification: &str,
        office_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let response = self
            .post_json(
                "/api/submissions",
                &json!({
                    "employee_nip": "198507142010011002",
                    "employee_name": "Siti Rahmawati",
                    "job_classification": job_classification,
                    "office_id": office_id,
                }),
                Some(token),
            )
            .await?;
        ensure!(
            response.status == StatusCode::CREATED,
            "creating draft failed with status {}: {}",
            response.status,
            response.body
        );
        parse_id(response.data())
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<JsonResponse> {
        self.send(Method::POST, path, Some(serde_json::to_vec(payload)?), token)
            .await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<JsonResponse> {
        self.send(Method::PATCH, path, Some(serde_json::to_vec(payload)?), token)
            .await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<JsonResponse> {
        self.send(Method::PUT, path, Some(serde_json::to_vec(payload)?), token)
            .await
    }

    #[allow(dead_code)]
    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<JsonResponse> {
        self.send(Method::POST, path, None, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<JsonResponse> {
        self.send(Method::GET, path, None, token).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<JsonResponse> {
        self.send(Method::DELETE, path, None, token).await
    }

    /// A clone of the application router, for requests issued from spawned
    /// tasks.
    #[allow(dead_code)]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        token: Option<&str>,
    ) -> Result<JsonResponse> {
        send_request(self.router(), method, path, body, token).await
    }

    #[allow(dead_code)]
    pub async fn count_rows(&self, sql: &'static str) -> Result<i64> {
        #[derive(QueryableByName)]
        struct Count {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        self.with_conn(move |conn| {
            let row: Count = diesel::sql_query(sql)
                .get_result(conn)
                .context("count query failed")?;
            Ok(row.count)
        })
        .await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub fn parse_id(data: &Value) -> Result<Uuid> {
    let raw = data["id"]
        .as_str()
        .ok_or_else(|| anyhow!("response has no id: {data}"))?;
    Ok(Uuid::parse_str(raw)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(pengajuan::MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE tracking_entries, tracking_statuses, audit_logs, documents, submissions, \
         job_document_requirements, job_classifications, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

pub async fn send_request(
    router: Router,
    method: Method,
    path: &str,
    body: Option<Vec<u8>>,
    token: Option<&str>,
) -> Result<JsonResponse> {
    let mut builder = Request::builder().method(method).uri(path);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(body.map(Body::from).unwrap_or_else(Body::empty))?;
    let response = router.oneshot(request).await.expect("infallible response");

    let status = response.status();
    let bytes = body_to_vec(response.into_body()).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("response body is not JSON: {}", String::from_utf8_lossy(&bytes)))?
    };
    Ok(JsonResponse { status, body })
}
