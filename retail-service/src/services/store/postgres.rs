use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{SaleInsert, Store, UnitOfWork};
use crate::config::DatabaseConfig;
use crate::models::{
    InventoryLog, PaymentReminder, ProductVariant, Rental, RentPayment, RentalStatus,
    ReminderType, Sale, SaleItem, SalePayment, StockChange, Tenant,
};
use crate::services::metrics::DB_QUERY_DURATION;

const VARIANT_COLUMNS: &str = r#"
    v.variant_id, v.product_id, p.tenant_id, p.name AS product_name, v.name AS variant_name,
    v.barcode, v.stock, v.price_cents, v.low_stock_threshold, v.approval_status
"#;

const SALE_COLUMNS: &str = r#"
    sale_id, idempotency_key, tenant_id, cashier_id, currency, subtotal_cents,
    discount_cents, tax_cents, total_cents, status, created_utc
"#;

const RENTAL_COLUMNS: &str = r#"
    rental_id, tenant_id, cube_id, start_date, end_date, daily_rate, status,
    allocated_by, created_utc
"#;

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[instrument(skip(config), fields(service = "retail-service"))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(config.url.expose_secret())
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

async fn load_sale_lines(conn: &mut PgConnection, sale: &mut Sale) -> Result<(), AppError> {
    sale.items = sqlx::query_as::<_, SaleItem>(
        r#"
        SELECT sale_item_id, sale_id, variant_id, product_id, product_name, variant_name, barcode,
               quantity, unit_price_cents, discount_cents, tax_cents, line_total_cents
        FROM sale_items
        WHERE sale_id = $1
        ORDER BY line_no
        "#,
    )
    .bind(sale.sale_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to load sale items", e))?;

    sale.payments = sqlx::query_as::<_, SalePayment>(
        r#"
        SELECT sale_payment_id, sale_id, method, amount_cents, status
        FROM sale_payments
        WHERE sale_id = $1
        ORDER BY line_no
        "#,
    )
    .bind(sale.sale_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to load sale payments", e))?;

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_sale_by_key(&self, idempotency_key: &str) -> Result<Option<Sale>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_sale_by_key"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("Failed to acquire connection", e))?;

        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {} FROM sales WHERE idempotency_key = $1",
            SALE_COLUMNS
        ))
        .bind(idempotency_key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to find sale", e))?;

        let sale = match sale {
            Some(mut sale) => {
                load_sale_lines(&mut conn, &mut sale).await?;
                Some(sale)
            }
            None => None,
        };

        timer.observe_duration();
        Ok(sale)
    }

    #[instrument(skip(self))]
    async fn get_sale(&self, tenant_id: Uuid, sale_id: Uuid) -> Result<Option<Sale>, AppError> {
        let timer = DB_QUERY_DURATION.with_label_values(&["get_sale"]).start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("Failed to acquire connection", e))?;

        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {} FROM sales WHERE sale_id = $1 AND tenant_id = $2",
            SALE_COLUMNS
        ))
        .bind(sale_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to get sale", e))?;

        let sale = match sale {
            Some(mut sale) => {
                load_sale_lines(&mut conn, &mut sale).await?;
                Some(sale)
            }
            None => None,
        };

        timer.observe_duration();
        Ok(sale)
    }

    #[instrument(skip(self))]
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_tenant"])
            .start_timer();

        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT tenant_id, user_id, business_name, contact_email FROM tenants WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get tenant", e))?;

        timer.observe_duration();
        Ok(tenant)
    }

    #[instrument(skip(self))]
    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<ProductVariant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_variant"])
            .start_timer();

        let variant = sqlx::query_as::<_, ProductVariant>(&format!(
            "SELECT {} FROM product_variants v JOIN products p ON p.product_id = v.product_id WHERE v.variant_id = $1",
            VARIANT_COLUMNS
        ))
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get variant", e))?;

        timer.observe_duration();
        Ok(variant)
    }

    #[instrument(skip(self))]
    async fn list_inventory_logs(&self, variant_id: Uuid) -> Result<Vec<InventoryLog>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_inventory_logs"])
            .start_timer();

        let logs = sqlx::query_as::<_, InventoryLog>(
            r#"
            SELECT log_id, product_id, variant_id, actor_user_id, change_type,
                   previous_value, new_value, created_utc
            FROM inventory_logs
            WHERE variant_id = $1
            ORDER BY created_utc, log_id
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list inventory logs", e))?;

        timer.observe_duration();
        Ok(logs)
    }

    #[instrument(skip(self, rental), fields(rental_id = %rental.rental_id, tenant_id = %rental.tenant_id))]
    async fn insert_rental(&self, rental: &Rental) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_rental"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO rentals (rental_id, tenant_id, cube_id, start_date, end_date, daily_rate, status, allocated_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(rental.rental_id)
        .bind(rental.tenant_id)
        .bind(rental.cube_id)
        .bind(rental.start_date)
        .bind(rental.end_date)
        .bind(rental.daily_rate)
        .bind(&rental.status)
        .bind(rental.allocated_by)
        .bind(rental.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Tenant {} not found", rental.tenant_id))
            }
            _ => db_error("Failed to create rental", e),
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_rental(&self, rental_id: Uuid) -> Result<Option<Rental>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_rental"])
            .start_timer();

        let rental = sqlx::query_as::<_, Rental>(&format!(
            "SELECT {} FROM rentals WHERE rental_id = $1",
            RENTAL_COLUMNS
        ))
        .bind(rental_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get rental", e))?;

        timer.observe_duration();
        Ok(rental)
    }

    #[instrument(skip(self))]
    async fn list_rentals_by_status(&self, status: RentalStatus) -> Result<Vec<Rental>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_rentals_by_status"])
            .start_timer();

        let rentals = sqlx::query_as::<_, Rental>(&format!(
            "SELECT {} FROM rentals WHERE status = $1 ORDER BY created_utc, rental_id",
            RENTAL_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list rentals", e))?;

        timer.observe_duration();
        Ok(rentals)
    }

    #[instrument(skip(self, payment), fields(rental_id = %payment.rental_id))]
    async fn insert_rent_payment(&self, payment: &RentPayment) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_rent_payment"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO rent_payments (payment_id, rental_id, amount, paid_at, method, received_by, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.rental_id)
        .bind(payment.amount)
        .bind(payment.paid_at)
        .bind(&payment.method)
        .bind(payment.received_by)
        .bind(&payment.note)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record rent payment", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_rent_payments(&self, rental_id: Uuid) -> Result<Vec<RentPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_rent_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, RentPayment>(
            r#"
            SELECT payment_id, rental_id, amount, paid_at, method, received_by, note
            FROM rent_payments
            WHERE rental_id = $1
            ORDER BY paid_at, payment_id
            "#,
        )
        .bind(rental_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list rent payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }

    #[instrument(skip(self))]
    async fn reminder_exists(
        &self,
        rental_id: Uuid,
        reminder_type: ReminderType,
        due_date: NaiveDate,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reminder_exists"])
            .start_timer();

        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM payment_reminders
                WHERE rental_id = $1 AND reminder_type = $2 AND due_date = $3
            )
            "#,
        )
        .bind(rental_id)
        .bind(reminder_type.as_str())
        .bind(due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check reminder", e))?;

        timer.observe_duration();
        Ok(exists)
    }

    #[instrument(skip(self, reminder), fields(rental_id = %reminder.rental_id, reminder_type = %reminder.reminder_type))]
    async fn insert_reminder(&self, reminder: &PaymentReminder) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_reminder"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payment_reminders (reminder_id, rental_id, reminder_type, due_date, email_sent, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reminder.reminder_id)
        .bind(reminder.rental_id)
        .bind(&reminder.reminder_type)
        .bind(reminder.due_date)
        .bind(reminder.email_sent)
        .bind(reminder.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Reminder {} for {} already recorded",
                    reminder.reminder_type,
                    reminder.due_date
                ))
            }
            _ => db_error("Failed to record reminder", e),
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_reminders(&self, rental_id: Uuid) -> Result<Vec<PaymentReminder>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_reminders"])
            .start_timer();

        let reminders = sqlx::query_as::<_, PaymentReminder>(
            r#"
            SELECT reminder_id, rental_id, reminder_type, due_date, email_sent, created_utc
            FROM payment_reminders
            WHERE rental_id = $1
            ORDER BY created_utc, reminder_id
            "#,
        )
        .bind(rental_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list reminders", e))?;

        timer.observe_duration();
        Ok(reminders)
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A Postgres transaction. sqlx rolls back on drop.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    #[instrument(skip(self))]
    async fn find_variants(
        &mut self,
        variant_ids: &[Uuid],
    ) -> Result<Vec<ProductVariant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_variants"])
            .start_timer();

        let variants = sqlx::query_as::<_, ProductVariant>(&format!(
            "SELECT {} FROM product_variants v JOIN products p ON p.product_id = v.product_id WHERE v.variant_id = ANY($1)",
            VARIANT_COLUMNS
        ))
        .bind(variant_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load variants", e))?;

        timer.observe_duration();
        Ok(variants)
    }

    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        sqlx::query_as::<_, Tenant>(
            "SELECT tenant_id, user_id, business_name, contact_email FROM tenants WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to get tenant", e))
    }

    #[instrument(skip(self))]
    async fn decrement_stock(
        &mut self,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<Option<StockChange>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["decrement_stock"])
            .start_timer();

        let row = sqlx::query_as::<_, (i32, i32)>(
            r#"
            UPDATE product_variants
            SET stock = stock - $2, updated_utc = NOW()
            WHERE variant_id = $1 AND stock >= $2
            RETURNING stock + $2, stock
            "#,
        )
        .bind(variant_id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to decrement stock", e))?;

        timer.observe_duration();
        Ok(row.map(|(previous, current)| StockChange { previous, current }))
    }

    #[instrument(skip(self))]
    async fn set_stock(
        &mut self,
        variant_id: Uuid,
        stock: i32,
    ) -> Result<Option<StockChange>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_stock"])
            .start_timer();

        let row = sqlx::query_as::<_, (i32, i32)>(
            r#"
            UPDATE product_variants v
            SET stock = $2, updated_utc = NOW()
            FROM (SELECT variant_id, stock FROM product_variants WHERE variant_id = $1 FOR UPDATE) old
            WHERE v.variant_id = old.variant_id
            RETURNING old.stock, v.stock
            "#,
        )
        .bind(variant_id)
        .bind(stock)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to set stock", e))?;

        timer.observe_duration();
        Ok(row.map(|(previous, current)| StockChange { previous, current }))
    }

    async fn insert_inventory_log(&mut self, log: &InventoryLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_logs (log_id, product_id, variant_id, actor_user_id, change_type, previous_value, new_value, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.log_id)
        .bind(log.product_id)
        .bind(log.variant_id)
        .bind(log.actor_user_id)
        .bind(&log.change_type)
        .bind(log.previous_value)
        .bind(log.new_value)
        .bind(log.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to write inventory log", e))?;
        Ok(())
    }

    #[instrument(skip(self, sale), fields(sale_id = %sale.sale_id))]
    async fn insert_sale(&mut self, sale: &Sale) -> Result<SaleInsert, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_sale"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO sales (sale_id, idempotency_key, tenant_id, cashier_id, currency, subtotal_cents, discount_cents, tax_cents, total_cents, status, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(sale.sale_id)
        .bind(&sale.idempotency_key)
        .bind(sale.tenant_id)
        .bind(sale.cashier_id)
        .bind(&sale.currency)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(&sale.status)
        .bind(sale.created_utc)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                return Ok(SaleInsert::DuplicateKey);
            }
            Err(e) => return Err(db_error("Failed to create sale", e)),
        }

        for (line_no, item) in sale.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_items (sale_item_id, sale_id, line_no, variant_id, product_id, product_name, variant_name, barcode,
                                        quantity, unit_price_cents, discount_cents, tax_cents, line_total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(item.sale_item_id)
            .bind(item.sale_id)
            .bind(line_no as i32)
            .bind(item.variant_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(&item.variant_name)
            .bind(&item.barcode)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.discount_cents)
            .bind(item.tax_cents)
            .bind(item.line_total_cents)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("Failed to create sale item", e))?;
        }

        timer.observe_duration();
        Ok(SaleInsert::Inserted)
    }

    async fn insert_sale_payments(&mut self, payments: &[SalePayment]) -> Result<(), AppError> {
        for (line_no, payment) in payments.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_payments (sale_payment_id, sale_id, line_no, method, amount_cents, status)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(payment.sale_payment_id)
            .bind(payment.sale_id)
            .bind(line_no as i32)
            .bind(&payment.method)
            .bind(payment.amount_cents)
            .bind(&payment.status)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("Failed to create sale payment", e))?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| db_error("Failed to roll back transaction", e))
    }
}
