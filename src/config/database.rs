//! Database configuration module for the swipe gate.
//!
//! This module handles the relational connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! guarded by `IF NOT EXISTS` so that starting against the production canteen schema
//! leaves existing tables untouched while a fresh `SQLite` file gets a usable layout.

use crate::entities::{CanteenConfig, OrderRecord, SysUser, WeeklySetmeal};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/canteen.sqlite?mode=rwc";

/// Gets the configured database URL, or the local `SQLite` default.
///
/// The `DATABASE_URL` override is already folded into the configured value
/// when the application configuration is loaded.
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    configured.map_or_else(|| DEFAULT_DATABASE_URL.to_string(), str::to_string)
}

/// Establishes the pooled database connection shared by the engine and the jobs.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    Database::connect(database_url).await.map_err(Into::into)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;
    Ok(())
}

/// Creates every table the gate touches, skipping tables that already exist.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, SysUser).await?;
    create_table(db, &schema, OrderRecord).await?;
    create_table(db, &schema, WeeklySetmeal).await?;
    create_table(db, &schema, CanteenConfig).await?;

    info!("Database tables ensured.");
    Ok(())
}
