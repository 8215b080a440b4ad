//! PostgreSQL implementation of BillingStore.
//!
//! The ledger table is append-only (enforced by a trigger) and carries unique
//! indexes on every dedupe key, so concurrent writers of the same fact are
//! serialized by the database. Writers of one projection queue on a
//! per-key advisory lock, then the row is read with `SELECT ... FOR UPDATE`
//! and written with a version guard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::Postgres;
use sqlx::{PgPool, Transaction};

use crate::domain::billing::{
    CanonicalEvent, EntitlementProjection, EventId, EventPayload, IdempotencyKey, LedgerEvent,
    ProductKey, Provider,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{BillingStore, InsertOutcome, LedgerTransaction};

/// Embedded migrations for the ledger schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const LEDGER_COLUMNS: &str = r#"
    sequence, event_id, user_id, provider, product_key, plan_type,
    occurred_at, received_at, provider_event_id, provider_transaction_id,
    idempotency_key, payload, payload_hash, signature_verified
"#;

const ENTITLEMENT_COLUMNS: &str = r#"
    user_id, product_key, plan_type, status, provider, provider_customer_id,
    provider_account_id, active_from, active_until, period_start, period_end,
    auto_renew, last_event_id, last_event_type, version, updated_at
"#;

/// Serializes writers of one (user, product) projection until commit or rollback.
const PROJECTION_LOCK_SQL: &str =
    "SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))";

/// PostgreSQL implementation of the BillingStore port.
#[derive(Clone)]
pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    /// Creates a new PostgresBillingStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to run migrations: {}", e)))
    }
}

/// An open ledger transaction. Dropping it rolls back.
pub struct PostgresLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Row mapping
// ════════════════════════════════════════════════════════════════════════════════

/// Database row representation of a ledger event.
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    sequence: i64,
    event_id: String,
    user_id: String,
    provider: String,
    product_key: String,
    plan_type: String,
    occurred_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
    provider_event_id: Option<String>,
    provider_transaction_id: Option<String>,
    idempotency_key: Option<String>,
    payload: serde_json::Value,
    payload_hash: Option<String>,
    signature_verified: bool,
}

impl TryFrom<LedgerRow> for LedgerEvent {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let payload: EventPayload = serde_json::from_value(row.payload).map_err(|e| {
            DomainError::database(format!("Invalid payload for {}: {}", row.event_id, e))
        })?;

        let event = CanonicalEvent {
            event_id: EventId::new(row.event_id).map_err(corrupt)?,
            user_id: UserId::new(row.user_id).map_err(corrupt)?,
            provider: row.provider.parse().map_err(corrupt)?,
            product_key: row.product_key.parse().map_err(corrupt)?,
            plan_type: row.plan_type.parse().map_err(corrupt)?,
            occurred_at: Timestamp::from_datetime(row.occurred_at),
            received_at: Timestamp::from_datetime(row.received_at),
            provider_event_id: row.provider_event_id,
            provider_transaction_id: row.provider_transaction_id,
            idempotency_key: row
                .idempotency_key
                .map(IdempotencyKey::try_from)
                .transpose()
                .map_err(corrupt)?,
            payload,
            payload_hash: row.payload_hash,
        };

        Ok(LedgerEvent {
            event,
            signature_verified: row.signature_verified,
            sequence: row.sequence,
        })
    }
}

/// Database row representation of an entitlement.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    user_id: String,
    product_key: String,
    plan_type: String,
    status: String,
    provider: Option<String>,
    provider_customer_id: Option<String>,
    provider_account_id: Option<String>,
    active_from: Option<DateTime<Utc>>,
    active_until: Option<DateTime<Utc>>,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    auto_renew: Option<bool>,
    last_event_id: Option<String>,
    last_event_type: Option<String>,
    version: i64,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntitlementRow> for EntitlementProjection {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        Ok(EntitlementProjection {
            user_id: UserId::new(row.user_id).map_err(corrupt)?,
            product_key: row.product_key.parse().map_err(corrupt)?,
            plan_type: row.plan_type.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            provider: row.provider.map(|p| p.parse()).transpose().map_err(corrupt)?,
            provider_customer_id: row.provider_customer_id,
            provider_account_id: row.provider_account_id,
            active_from: row.active_from.map(Timestamp::from_datetime),
            active_until: row.active_until.map(Timestamp::from_datetime),
            period_start: row.period_start.map(Timestamp::from_datetime),
            period_end: row.period_end.map(Timestamp::from_datetime),
            auto_renew: row.auto_renew,
            last_event_id: row.last_event_id.map(EventId::new).transpose().map_err(corrupt)?,
            last_event_type: row
                .last_event_type
                .map(|t| t.parse())
                .transpose()
                .map_err(corrupt)?,
            version: row.version,
            updated_at: row.updated_at.map(Timestamp::from_datetime),
        })
    }
}

fn corrupt(err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid stored value: {}", err))
}

fn dt(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

async fn find_ledger_one(
    tx: &mut Transaction<'static, Postgres>,
    where_clause: &str,
    bind_a: &str,
    bind_b: Option<&str>,
) -> Result<Option<LedgerEvent>, DomainError> {
    let sql = format!("SELECT {} FROM billing_events WHERE {}", LEDGER_COLUMNS, where_clause);
    let mut query = sqlx::query_as::<_, LedgerRow>(&sql).bind(bind_a);
    if let Some(b) = bind_b {
        query = query.bind(b);
    }

    let row = query
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch billing event: {}", e)))?;

    row.map(LedgerEvent::try_from).transpose()
}

// ════════════════════════════════════════════════════════════════════════════════
// Port implementations
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, DomainError> {
        let tx = self.pool.begin().await.map_err(|e| {
            DomainError::database(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(Box::new(PostgresLedgerTransaction { tx }))
    }

    async fn find_entitlement(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<EntitlementProjection>, DomainError> {
        let sql = format!(
            "SELECT {} FROM entitlements WHERE user_id = $1 AND product_key = $2",
            ENTITLEMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, EntitlementRow>(&sql)
            .bind(user_id.as_str())
            .bind(product_key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to fetch entitlement: {}", e)))?;

        row.map(EntitlementProjection::try_from).transpose()
    }

    async fn list_events(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        let sql = format!(
            "SELECT {} FROM billing_events WHERE user_id = $1 AND product_key = $2 \
             ORDER BY received_at ASC, sequence ASC",
            LEDGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(user_id.as_str())
            .bind(product_key.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to list billing events: {}", e)))?;

        rows.into_iter().map(LedgerEvent::try_from).collect()
    }
}

#[async_trait]
impl LedgerTransaction for PostgresLedgerTransaction {
    async fn find_by_event_id(
        &mut self,
        event_id: &EventId,
    ) -> Result<Option<LedgerEvent>, DomainError> {
        find_ledger_one(&mut self.tx, "event_id = $1", event_id.as_str(), None).await
    }

    async fn find_by_provider_event_id(
        &mut self,
        provider: Provider,
        provider_event_id: &str,
    ) -> Result<Option<LedgerEvent>, DomainError> {
        find_ledger_one(
            &mut self.tx,
            "provider = $1 AND provider_event_id = $2",
            provider.as_str(),
            Some(provider_event_id),
        )
        .await
    }

    async fn find_by_idempotency_key(
        &mut self,
        key: &IdempotencyKey,
    ) -> Result<Option<LedgerEvent>, DomainError> {
        find_ledger_one(&mut self.tx, "idempotency_key = $1", key.as_str(), None).await
    }

    async fn insert_event(
        &mut self,
        event: &CanonicalEvent,
        signature_verified: bool,
    ) -> Result<InsertOutcome, DomainError> {
        let payload = serde_json::to_value(&event.payload)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;

        let sequence: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO billing_events (
                event_id, event_type, user_id, provider, product_key, plan_type,
                occurred_at, received_at, provider_event_id, provider_transaction_id,
                idempotency_key, payload, payload_hash, signature_verified
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT DO NOTHING
            RETURNING sequence
            "#,
        )
        .bind(event.event_id.as_str())
        .bind(event.event_type().as_str())
        .bind(event.user_id.as_str())
        .bind(event.provider.as_str())
        .bind(event.product_key.as_str())
        .bind(event.plan_type.as_str())
        .bind(*event.occurred_at.as_datetime())
        .bind(*event.received_at.as_datetime())
        .bind(event.provider_event_id.as_deref())
        .bind(event.provider_transaction_id.as_deref())
        .bind(event.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .bind(payload)
        .bind(event.payload_hash.as_deref())
        .bind(signature_verified)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert billing event: {}", e)))?;

        Ok(match sequence {
            Some(sequence) => InsertOutcome::Inserted(LedgerEvent {
                event: event.clone(),
                signature_verified,
                sequence,
            }),
            None => InsertOutcome::AlreadyExists,
        })
    }

    async fn find_projection_for_update(
        &mut self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<EntitlementProjection>, DomainError> {
        // Row locks cover nothing before the first write for a key, so writers
        // also queue on a transaction-scoped advisory lock for the pair.
        sqlx::query(PROJECTION_LOCK_SQL)
            .bind(user_id.as_str())
            .bind(product_key.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database(format!("Failed to lock entitlement key: {}", e)))?;

        let sql = format!(
            "SELECT {} FROM entitlements WHERE user_id = $1 AND product_key = $2 FOR UPDATE",
            ENTITLEMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, EntitlementRow>(&sql)
            .bind(user_id.as_str())
            .bind(product_key.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database(format!("Failed to lock entitlement: {}", e)))?;

        row.map(EntitlementProjection::try_from).transpose()
    }

    async fn upsert_projection(
        &mut self,
        projection: &EntitlementProjection,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let sql = if expected_version == 0 {
            r#"
            INSERT INTO entitlements (
                user_id, product_key, plan_type, status, provider, provider_customer_id,
                provider_account_id, active_from, active_until, period_start, period_end,
                auto_renew, last_event_id, last_event_type, version, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (user_id, product_key) DO NOTHING
            "#
        } else {
            r#"
            UPDATE entitlements SET
                plan_type = $3,
                status = $4,
                provider = $5,
                provider_customer_id = $6,
                provider_account_id = $7,
                active_from = $8,
                active_until = $9,
                period_start = $10,
                period_end = $11,
                auto_renew = $12,
                last_event_id = $13,
                last_event_type = $14,
                version = $15,
                updated_at = $16
            WHERE user_id = $1 AND product_key = $2 AND version = $17
            "#
        };

        let mut query = sqlx::query(sql)
            .bind(projection.user_id.as_str())
            .bind(projection.product_key.as_str())
            .bind(projection.plan_type.as_str())
            .bind(projection.status.as_str())
            .bind(projection.provider.map(|p| p.as_str()))
            .bind(projection.provider_customer_id.as_deref())
            .bind(projection.provider_account_id.as_deref())
            .bind(dt(projection.active_from))
            .bind(dt(projection.active_until))
            .bind(dt(projection.period_start))
            .bind(dt(projection.period_end))
            .bind(projection.auto_renew)
            .bind(projection.last_event_id.as_ref().map(EventId::as_str))
            .bind(projection.last_event_type.map(|t| t.as_str()))
            .bind(projection.version)
            .bind(dt(projection.updated_at));
        if expected_version > 0 {
            query = query.bind(expected_version);
        }

        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::database(format!("Failed to upsert entitlement: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::concurrent_modification(format!(
                "Entitlement {}/{} is no longer at version {}",
                projection.user_id, projection.product_key, expected_version
            )));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DomainError::database(format!("Failed to commit transaction: {}", e)))
    }
}
