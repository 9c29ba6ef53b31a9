use anyhow::{Context, Error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use crate::domain::{
    model::{Application, NewApplication},
    port::ApplicationRegistry,
};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS applications (
    id VARCHAR(36) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    namespace VARCHAR(255) NOT NULL DEFAULT 'default',
    repository_url VARCHAR(500),
    repository_branch VARCHAR(255) NOT NULL DEFAULT 'main',
    compose_file VARCHAR(500),
    context VARCHAR(500) NOT NULL DEFAULT '.',
    docker_host VARCHAR(255) NOT NULL DEFAULT 'localhost',
    status VARCHAR(50) NOT NULL DEFAULT 'created',
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)
"#;

const COLUMNS: &str = "id, name, namespace, repository_url, repository_branch, compose_file, \
                       context, docker_host, status, created_at, updated_at";

/// Registry stored in the `applications` table.
#[derive(Clone)]
pub struct PostgresRegistry {
    pub db: PgPool,
}

impl PostgresRegistry {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Can't connect to database")?;
        sqlx::query(CREATE_TABLE)
            .execute(&db)
            .await
            .context("Can't create applications table")?;
        Ok(Self { db })
    }
}

#[derive(FromRow)]
struct ApplicationRow {
    id: String,
    name: String,
    namespace: String,
    repository_url: Option<String>,
    repository_branch: String,
    compose_file: Option<String>,
    context: String,
    docker_host: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = Error;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            status: row.status.parse()?,
            id: row.id,
            name: row.name,
            namespace: row.namespace,
            repository_url: row.repository_url,
            repository_branch: row.repository_branch,
            compose_file: row.compose_file,
            context: row.context,
            docker_host: row.docker_host,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ApplicationRegistry for PostgresRegistry {
    async fn create(&self, application: NewApplication) -> Result<Application, Error> {
        let application = application.into_application();
        sqlx::query(&format!(
            "INSERT INTO applications ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            COLUMNS
        ))
        .bind(&application.id)
        .bind(&application.name)
        .bind(&application.namespace)
        .bind(&application.repository_url)
        .bind(&application.repository_branch)
        .bind(&application.compose_file)
        .bind(&application.context)
        .bind(&application.docker_host)
        .bind(application.status.as_str())
        .bind(application.created_at)
        .bind(application.updated_at)
        .execute(&self.db)
        .await
        .with_context(|| format!("Can't insert application {}", application.name))?;
        Ok(application)
    }

    async fn get(&self, id: &str) -> Result<Option<Application>, Error> {
        sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("Can't fetch application {}", id))?
        .map(Application::try_from)
        .transpose()
    }

    async fn list(&self) -> Result<Vec<Application>, Error> {
        sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications ORDER BY created_at",
            COLUMNS
        ))
        .fetch_all(&self.db)
        .await
        .context("Can't list applications")?
        .into_iter()
        .map(Application::try_from)
        .collect()
    }

    async fn update(&self, application: &Application) -> Result<Application, Error> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "UPDATE applications SET name = $2, namespace = $3, repository_url = $4, \
             repository_branch = $5, compose_file = $6, context = $7, docker_host = $8, \
             status = $9, updated_at = $10 WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(&application.id)
        .bind(&application.name)
        .bind(&application.namespace)
        .bind(&application.repository_url)
        .bind(&application.repository_branch)
        .bind(&application.compose_file)
        .bind(&application.context)
        .bind(&application.docker_host)
        .bind(application.status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("Can't update application {}", application.id))?
        .with_context(|| format!("Application {} does not exist", application.id))?;
        Application::try_from(row)
    }
}
