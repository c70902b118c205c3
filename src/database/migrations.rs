use crate::error::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Run all database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    create_migrations_table(pool).await?;

    for (version, name, sql) in get_migrations() {
        if !is_migration_applied(pool, version).await? {
            info!(version = version, name = name, "Applying migration");

            // Migrations hold several statements, so run them unprepared
            pool.execute(sql).await?;
            record_migration(pool, version, name).await?;

            info!(version = version, name = name, "Migration applied successfully");
        }
    }

    Ok(())
}

/// Create the migrations tracking table
async fn create_migrations_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Check if a migration has been applied
async fn is_migration_applied(pool: &PgPool, version: i32) -> Result<bool> {
    let result = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM schema_migrations WHERE version = $1",
    )
    .bind(version)
    .fetch_one(pool)
    .await?;

    Ok(result > 0)
}

/// Record a migration as applied
async fn record_migration(pool: &PgPool, version: i32, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
        .bind(version)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Get all migrations in order
fn get_migrations() -> Vec<(i32, &'static str, &'static str)> {
    vec![
        (1, "proxy_lists_table", MIGRATION_001_PROXY_LISTS),
        (2, "proxy_routes_table", MIGRATION_002_PROXY_ROUTES),
    ]
}

// Migration 1: Proxy lists, one JSON array per routing key
const MIGRATION_001_PROXY_LISTS: &str = r#"
CREATE TABLE IF NOT EXISTS proxy_lists (
    routing_key VARCHAR(255) PRIMARY KEY,
    proxies JSONB NOT NULL DEFAULT '[]'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE OR REPLACE FUNCTION update_updated_at_column()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = NOW();
    RETURN NEW;
END;
$$ language 'plpgsql';

DROP TRIGGER IF EXISTS update_proxy_lists_updated_at ON proxy_lists;
CREATE TRIGGER update_proxy_lists_updated_at
    BEFORE UPDATE ON proxy_lists
    FOR EACH ROW
    EXECUTE FUNCTION update_updated_at_column();
"#;

// Migration 2: Domain and channel routes
const MIGRATION_002_PROXY_ROUTES: &str = r#"
CREATE TABLE IF NOT EXISTS proxy_routes (
    kind VARCHAR(20) NOT NULL CHECK (kind IN ('domain', 'channel')),
    name VARCHAR(255) NOT NULL,
    routing_key VARCHAR(255) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (kind, name)
);

CREATE INDEX IF NOT EXISTS idx_proxy_routes_kind ON proxy_routes(kind);

DROP TRIGGER IF EXISTS update_proxy_routes_updated_at ON proxy_routes;
CREATE TRIGGER update_proxy_routes_updated_at
    BEFORE UPDATE ON proxy_routes
    FOR EACH ROW
    EXECUTE FUNCTION update_updated_at_column();
"#;
