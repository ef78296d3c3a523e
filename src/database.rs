#[cfg(feature = "database")]
use async_trait::async_trait;
#[cfg(feature = "database")]
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, SqlitePool};
#[cfg(feature = "database")]
use tracing::info;

#[cfg(feature = "database")]
use crate::workflows::{
    CanonicalRepair, PhaseCondition, PhaseDefinition, PhaseName, PhaseStore, ProductType,
    StoreError,
};

#[cfg(feature = "database")]
/// SQLite-backed phase store. Every write runs inside one transaction, so a
/// fault mid-write rolls the whole change back.
pub struct SqlitePhaseStore {
    pool: SqlitePool,
}

#[cfg(feature = "database")]
impl SqlitePhaseStore {
    /// Open (and create if needed) the database, optionally running migrations
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[cfg(feature = "database")]
fn definition_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PhaseDefinition, StoreError> {
    let product_type: String = row.try_get("product_type")?;
    let phase_name: String = row.try_get("phase_name")?;
    let order: i64 = row.try_get("phase_order")?;
    let condition: Option<String> = row.try_get("condition")?;

    let corrupt = |reason: String| StoreError::Corrupt { reason };
    Ok(PhaseDefinition {
        product_type: ProductType::new(product_type).map_err(|e| corrupt(e.to_string()))?,
        phase_name: PhaseName::new(phase_name).map_err(|e| corrupt(e.to_string()))?,
        order: u32::try_from(order)
            .map_err(|_| corrupt(format!("phase order {order} is out of range")))?,
        condition: condition
            .map(|json| serde_json::from_str::<PhaseCondition>(&json))
            .transpose()?,
    })
}

#[cfg(feature = "database")]
#[async_trait]
impl PhaseStore for SqlitePhaseStore {
    async fn load(&self, product_type: &ProductType) -> Result<Vec<PhaseDefinition>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_type, phase_name, phase_order, condition
            FROM phase_definitions
            WHERE product_type = ?1
            ORDER BY phase_order ASC, phase_name ASC
            "#,
        )
        .bind(product_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(definition_from_row).collect()
    }

    async fn product_types(&self) -> Result<Vec<ProductType>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT product_type
            FROM phase_definitions
            ORDER BY product_type ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let value: String = row.try_get("product_type")?;
                ProductType::new(value).map_err(|e| StoreError::Corrupt {
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn replace_workflow(
        &self,
        product_type: &ProductType,
        definitions: &[PhaseDefinition],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM phase_definitions WHERE product_type = ?1")
            .bind(product_type.as_str())
            .execute(&mut *tx)
            .await?;

        for definition in definitions {
            let condition = definition
                .condition
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                r#"
                INSERT INTO phase_definitions (product_type, phase_name, phase_order, condition, updated_at)
                VALUES (?1, ?2, ?3, ?4, datetime('now'))
                "#,
            )
            .bind(product_type.as_str())
            .bind(definition.phase_name.as_str())
            .bind(i64::from(definition.order))
            .bind(condition)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn reassign_orders(
        &self,
        product_type: &ProductType,
        orders: &[(PhaseName, u32)],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        update_orders(&mut tx, product_type, orders).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_canonical(
        &self,
        product_type: &ProductType,
        canonical: &[PhaseName],
    ) -> Result<Option<CanonicalRepair>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT product_type, phase_name, phase_order, condition
            FROM phase_definitions
            WHERE product_type = ?1
            ORDER BY phase_order ASC, phase_name ASC
            "#,
        )
        .bind(product_type.as_str())
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let current = rows
            .iter()
            .map(definition_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let repair = CanonicalRepair::plan(&current, canonical);
        // The read above holds SQLite's shared lock; if another writer got in
        // first these updates fail with SQLITE_BUSY rather than apply a stale plan.
        if !repair.is_noop() {
            update_orders(&mut tx, product_type, &repair.assignments()).await?;
        }
        tx.commit().await?;
        Ok(Some(repair))
    }
}

#[cfg(feature = "database")]
async fn update_orders(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_type: &ProductType,
    orders: &[(PhaseName, u32)],
) -> Result<(), StoreError> {
    for (phase, order) in orders {
        let result = sqlx::query(
            r#"
            UPDATE phase_definitions
            SET phase_order = ?1, updated_at = datetime('now')
            WHERE product_type = ?2 AND phase_name = ?3
            "#,
        )
        .bind(i64::from(*order))
        .bind(product_type.as_str())
        .bind(phase.as_str())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the updates already made.
            return Err(StoreError::MissingPhase {
                product_type: product_type.clone(),
                phase: phase.clone(),
            });
        }
    }
    Ok(())
}
