//! PostgreSQL-backed store implementation.
//!
//! Aggregates are persisted as a JSONB `state` column plus mirrored scalar
//! columns for querying and locking. Inventory and discount operations run
//! inside a transaction with `SELECT ... FOR UPDATE` on the contended row;
//! order updates use a compare-and-swap on the version column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, DiscountCodeId, Money, OrderId, PaymentId, ReferenceNumber, VariantId, Version};
use domain::{
    Availability, DiscountCode, DiscountUsage, Order, PaymentTransaction, StockLevel,
    StockMovement,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    DiscountStore, InventoryStore, OrderStore, PaymentStore, Result, StoreError,
};

/// PostgreSQL implementation of all four repository traits.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_level(row: PgRow) -> Result<StockLevel> {
        Ok(StockLevel {
            variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            on_hand: row.try_get("on_hand")?,
            reserved: row.try_get("reserved")?,
            unlimited: row.try_get("unlimited")?,
        })
    }

    fn row_to_movement(row: PgRow) -> Result<StockMovement> {
        let kind: String = row.try_get("kind")?;
        Ok(StockMovement {
            id: row.try_get("id")?,
            variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            kind: kind.parse().map_err(parse_error)?,
            quantity: row.try_get("quantity")?,
            stock_before: row.try_get("stock_before")?,
            stock_after: row.try_get("stock_after")?,
            reference: row
                .try_get::<Option<String>, _>("reference")?
                .map(ReferenceNumber::from_string),
            expires_at: row.try_get("expires_at")?,
            reversed: row.try_get("reversed")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_usage(row: PgRow) -> Result<DiscountUsage> {
        let state: String = row.try_get("state")?;
        Ok(DiscountUsage {
            id: row.try_get("id")?,
            code_id: DiscountCodeId::from_uuid(row.try_get::<Uuid, _>("code_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            buyer_id: BuyerId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            amount: Money::from_cents(row.try_get("amount")?),
            state: state.parse().map_err(parse_error)?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn lock_level(
        tx: &mut Transaction<'_, Postgres>,
        variant_id: VariantId,
    ) -> Result<StockLevel> {
        let row = sqlx::query(
            r#"
            SELECT variant_id, on_hand, reserved, unlimited
            FROM stock_levels
            WHERE variant_id = $1
            FOR UPDATE
            "#,
        )
        .bind(variant_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            entity: "variant",
            id: variant_id.to_string(),
        })?;

        Self::row_to_level(row)
    }

    async fn write_level(
        tx: &mut Transaction<'_, Postgres>,
        level: &StockLevel,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE stock_levels
            SET on_hand = $2, reserved = $3
            WHERE variant_id = $1
            "#,
        )
        .bind(level.variant_id.as_uuid())
        .bind(level.on_hand)
        .bind(level.reserved)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_movement(
        tx: &mut Transaction<'_, Postgres>,
        movement: &StockMovement,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (id, variant_id, kind, quantity, stock_before, stock_after,
                 reference, expires_at, reversed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(movement.id)
        .bind(movement.variant_id.as_uuid())
        .bind(movement.kind.as_str())
        .bind(movement.quantity)
        .bind(movement.stock_before)
        .bind(movement.stock_after)
        .bind(movement.reference.as_ref().map(|r| r.as_str()))
        .bind(movement.expires_at)
        .bind(movement.reversed)
        .bind(movement.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Loads and reverses all open reservations under a reference, applying
    /// `close` to each to produce the closing ledger row.
    async fn close_reservations<F>(&self, reference: &ReferenceNumber, close: F) -> Result<u64>
    where
        F: Fn(&mut StockLevel, &StockMovement, DateTime<Utc>) -> StockMovement,
    {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Lock the open reservation rows first so a concurrent commit and
        // release of the same reference serialize here.
        let rows = sqlx::query(
            r#"
            SELECT id, variant_id, kind, quantity, stock_before, stock_after,
                   reference, expires_at, reversed, created_at
            FROM stock_movements
            WHERE reference = $1 AND kind = 'Reservation' AND NOT reversed
            ORDER BY variant_id
            FOR UPDATE
            "#,
        )
        .bind(reference.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let mut closed = 0;
        for row in rows {
            let reservation = Self::row_to_movement(row)?;
            let mut level = Self::lock_level(&mut tx, reservation.variant_id).await?;
            let closing = close(&mut level, &reservation, now);

            Self::write_level(&mut tx, &level).await?;
            sqlx::query("UPDATE stock_movements SET reversed = TRUE WHERE id = $1")
                .bind(reservation.id)
                .execute(&mut *tx)
                .await?;
            Self::insert_movement(&mut tx, &closing).await?;
            closed += 1;
        }

        tx.commit().await?;
        Ok(closed)
    }
}

fn parse_error(message: String) -> StoreError {
    StoreError::Serialization(serde_json::Error::io(std::io::Error::other(message)))
}

fn map_unique(e: sqlx::Error, constraint: &str, entity: &'static str, key: String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some(constraint)
    {
        return StoreError::DuplicateKey { entity, key };
    }
    StoreError::Database(e)
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let state = serde_json::to_value(order)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, status, idempotency_key, version, created_at, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.buyer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.idempotency_key())
        .bind(order.version().as_i64())
        .bind(order.created_at())
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "orders_buyer_idempotency_key",
                "order",
                order.idempotency_key().to_string(),
            )
        })?;

        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT state FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.try_get("state")?)?)),
            None => Ok(None),
        }
    }

    async fn find_by_idempotency_key(
        &self,
        buyer_id: BuyerId,
        key: &str,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT state FROM orders WHERE buyer_id = $1 AND idempotency_key = $2",
        )
        .bind(buyer_id.as_uuid())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.try_get("state")?)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, order: &Order) -> Result<Version> {
        let new_version = order.version().next();
        let mut next = order.clone();
        next.set_version(new_version);
        let state = serde_json::to_value(&next)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, version = $4, state = $5
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.version().as_i64())
        .bind(next.status().as_str())
        .bind(new_version.as_i64())
        .bind(state)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        Ok(new_version)
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn insert(&self, transaction: &PaymentTransaction) -> Result<()> {
        let state = serde_json::to_value(transaction)?;

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (id, order_id, authority, status, created_at, state)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(transaction.id().as_uuid())
        .bind(transaction.order_id().as_uuid())
        .bind(transaction.authority())
        .bind(transaction.status().as_str())
        .bind(transaction.created_at())
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "payment_transactions_authority_key",
                "payment",
                transaction.authority().to_string(),
            )
        })?;

        Ok(())
    }

    async fn find(&self, id: PaymentId) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query("SELECT state FROM payment_transactions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.try_get("state")?)?)),
            None => Ok(None),
        }
    }

    async fn find_by_authority(&self, authority: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query("SELECT state FROM payment_transactions WHERE authority = $1")
            .bind(authority)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.try_get("state")?)?)),
            None => Ok(None),
        }
    }

    async fn has_succeeded_for_order(&self, order_id: OrderId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_transactions WHERE order_id = $1 AND status = 'Succeeded'",
        )
        .bind(order_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn update(&self, transaction: &PaymentTransaction) -> Result<()> {
        let state = serde_json::to_value(transaction)?;

        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $2, state = $3
            WHERE id = $1
            "#,
        )
        .bind(transaction.id().as_uuid())
        .bind(transaction.status().as_str())
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // The partial unique index fires when this write would record a
            // second Succeeded transaction for the order.
            map_unique(
                e,
                "payment_transactions_one_success_per_order",
                "payment success",
                transaction.order_id().to_string(),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "payment",
                id: transaction.id().to_string(),
            });
        }
        Ok(())
    }

    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT state FROM payment_transactions
            WHERE status = 'Pending' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(serde_json::from_value(row.try_get("state")?)?))
            .collect()
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn put_level(&self, level: StockLevel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_levels (variant_id, on_hand, reserved, unlimited)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (variant_id) DO UPDATE SET
                on_hand = EXCLUDED.on_hand,
                reserved = EXCLUDED.reserved,
                unlimited = EXCLUDED.unlimited
            "#,
        )
        .bind(level.variant_id.as_uuid())
        .bind(level.on_hand)
        .bind(level.reserved)
        .bind(level.unlimited)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn level(&self, variant_id: VariantId) -> Result<Option<StockLevel>> {
        let row = sqlx::query(
            "SELECT variant_id, on_hand, reserved, unlimited FROM stock_levels WHERE variant_id = $1",
        )
        .bind(variant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_level).transpose()
    }

    async fn availability(&self, variant_id: VariantId) -> Result<Option<Availability>> {
        Ok(self
            .level(variant_id)
            .await?
            .map(|level| level.availability()))
    }

    async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: &ReferenceNumber,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let mut level = Self::lock_level(&mut tx, variant_id).await?;
        let movement = level.reserve(quantity, reference, expires_at, Utc::now())?;

        if let Some(movement) = movement {
            Self::write_level(&mut tx, &level).await?;
            Self::insert_movement(&mut tx, &movement).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit(&self, reference: &ReferenceNumber) -> Result<u64> {
        self.close_reservations(reference, |level, reservation, now| {
            level.commit_reservation(reservation, now)
        })
        .await
    }

    async fn release(&self, reference: &ReferenceNumber) -> Result<u64> {
        self.close_reservations(reference, |level, reservation, now| {
            level.release_reservation(reservation, now)
        })
        .await
    }

    async fn adjust(&self, variant_id: VariantId, delta: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let mut level = Self::lock_level(&mut tx, variant_id).await?;
        let movement = level.adjust(delta, Utc::now())?;

        Self::write_level(&mut tx, &level).await?;
        Self::insert_movement(&mut tx, &movement).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn restock_return(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: &ReferenceNumber,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let mut level = Self::lock_level(&mut tx, variant_id).await?;
        let movement = level.restock_return(quantity, reference, Utc::now())?;

        Self::write_level(&mut tx, &level).await?;
        Self::insert_movement(&mut tx, &movement).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn movements_for(&self, reference: &ReferenceNumber) -> Result<Vec<StockMovement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, variant_id, kind, quantity, stock_before, stock_after,
                   reference, expires_at, reversed, created_at
            FROM stock_movements
            WHERE reference = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(reference.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn expired_references(&self, now: DateTime<Utc>) -> Result<Vec<ReferenceNumber>> {
        let references: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT reference FROM stock_movements
            WHERE kind = 'Reservation' AND NOT reversed
              AND reference IS NOT NULL AND expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(references
            .into_iter()
            .map(ReferenceNumber::from_string)
            .collect())
    }
}

#[async_trait]
impl DiscountStore for PostgresStore {
    async fn insert_code(&self, code: &DiscountCode) -> Result<()> {
        let state = serde_json::to_value(code)?;

        sqlx::query(
            r#"
            INSERT INTO discount_codes (id, code, used_count, version, state)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(code.id().as_uuid())
        .bind(code.code())
        .bind(code.used_count() as i64)
        .bind(code.version().as_i64())
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "discount_codes_code_key", "discount code", code.code().to_string()))?;

        Ok(())
    }

    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        let row = sqlx::query("SELECT state FROM discount_codes WHERE code = $1")
            .bind(DiscountCode::normalize(code))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.try_get("state")?)?)),
            None => Ok(None),
        }
    }

    async fn apply(
        &self,
        code: &str,
        buyer_id: BuyerId,
        order_id: OrderId,
        order_total: Money,
        now: DateTime<Utc>,
    ) -> Result<DiscountUsage> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the code; validate-and-increment is atomic with
        // respect to concurrent checkouts. The lock never spans the gateway.
        let row = sqlx::query("SELECT state FROM discount_codes WHERE code = $1 FOR UPDATE")
            .bind(DiscountCode::normalize(code))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "discount code",
                id: DiscountCode::normalize(code),
            })?;

        let mut stored: DiscountCode = serde_json::from_value(row.try_get("state")?)?;

        let prior_user_uses: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM discount_usages WHERE code_id = $1 AND buyer_id = $2",
        )
        .bind(stored.id().as_uuid())
        .bind(buyer_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        stored.validate(now, order_total, prior_user_uses as u32)?;

        let amount = stored.amount_for(order_total);
        stored.record_use();
        stored.set_version(stored.version().next());
        let state = serde_json::to_value(&stored)?;

        sqlx::query(
            r#"
            UPDATE discount_codes
            SET used_count = $2, version = $3, state = $4
            WHERE id = $1
            "#,
        )
        .bind(stored.id().as_uuid())
        .bind(stored.used_count() as i64)
        .bind(stored.version().as_i64())
        .bind(state)
        .execute(&mut *tx)
        .await?;

        let usage = DiscountUsage::new(stored.id(), order_id, buyer_id, amount, now);
        sqlx::query(
            r#"
            INSERT INTO discount_usages (id, code_id, order_id, buyer_id, amount, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(usage.id)
        .bind(usage.code_id.as_uuid())
        .bind(usage.order_id.as_uuid())
        .bind(usage.buyer_id.as_uuid())
        .bind(usage.amount.cents())
        .bind(usage.state.as_str())
        .bind(usage.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "discount_usages_order_id_key",
                "discount usage",
                order_id.to_string(),
            )
        })?;

        tx.commit().await?;
        Ok(usage)
    }

    async fn confirm_usage(&self, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE discount_usages SET state = 'Confirmed' WHERE order_id = $1 AND state = 'Pending'",
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_usage(&self, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE discount_usages SET state = 'Cancelled' WHERE order_id = $1 AND state = 'Pending'",
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn usage_for_order(&self, order_id: OrderId) -> Result<Option<DiscountUsage>> {
        let row = sqlx::query(
            r#"
            SELECT id, code_id, order_id, buyer_id, amount, state, created_at
            FROM discount_usages
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_usage).transpose()
    }
}
