use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use tandem_core::repository::OrderRepository;
use tandem_core::{CommissionStatus, Order, OrderItem, OrderStatus, RepoError, RepoResult, SalesSummary};

use crate::rows::{map_sqlx, OrderItemRow, OrderRow};

const ORDER_COLUMNS: &str = "id, user_id, gateway, gateway_transaction_id, status, subtotal_cents, shipping_cents, \
     tax_cents, total_cents, currency, affiliate_id, shipping_address, commission_status, created_at, updated_at";

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach items to order rows with one `ANY($1)` query
    async fn hydrate(&self, rows: Vec<OrderRow>) -> RepoResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, name, quantity, unit_price_cents, total_cents \
             FROM order_items WHERE order_id = ANY($1) ORDER BY order_id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::backend)?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<OrderRow>) -> RepoResult<Option<Order>> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, order: &Order) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(RepoError::backend)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, gateway, gateway_transaction_id, status, subtotal_cents, shipping_cents,
                                tax_cents, total_cents, currency, affiliate_id, shipping_address, commission_status,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.gateway)
        .bind(&order.gateway_transaction_id)
        .bind(order.status.as_str())
        .bind(order.subtotal_cents)
        .bind(order.shipping_cents)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.affiliate_id)
        .bind(&order.shipping_address)
        .bind(order.commission_status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx(e, &format!("order for transaction {}", order.gateway_transaction_id)))?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, name, quantity, unit_price_cents, total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.total_cents)
            .execute(&mut *tx)
            .await
            .map_err(RepoError::backend)?;
        }

        tx.commit().await.map_err(RepoError::backend)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        self.hydrate_one(row).await
    }

    async fn find_by_transaction(&self, gateway_transaction_id: &str) -> RepoResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE gateway_transaction_id = $1", ORDER_COLUMNS);
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(gateway_transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        self.hydrate_one(row).await
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC", ORDER_COLUMNS);
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        self.hydrate(rows).await
    }

    async fn list_orders_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> RepoResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at",
            ORDER_COLUMNS
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        self.hydrate(rows).await
    }

    async fn list_by_commission_status(&self, statuses: &[CommissionStatus], limit: i64) -> RepoResult<Vec<Order>> {
        let wanted: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let sql = format!(
            "SELECT {} FROM orders WHERE commission_status = ANY($1) ORDER BY created_at LIMIT $2",
            ORDER_COLUMNS
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(&wanted)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        self.hydrate(rows).await
    }

    async fn update_status(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> RepoResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .map_err(RepoError::backend)?;

        if result.rows_affected() == 0 {
            let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(RepoError::backend)?;
            return Err(match current {
                Some((status,)) => {
                    RepoError::Conflict(format!("order {} is {}, not {}", id, status, from.as_str()))
                }
                None => RepoError::NotFound(format!("order {}", id)),
            });
        }
        Ok(())
    }

    async fn update_commission_status(
        &self,
        id: Uuid,
        from: &[CommissionStatus],
        to: CommissionStatus,
    ) -> RepoResult<bool> {
        let expected: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let result = sqlx::query(
            "UPDATE orders SET commission_status = $1, updated_at = NOW() WHERE id = $2 AND commission_status = ANY($3)",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(&expected)
        .execute(&self.pool)
        .await
        .map_err(RepoError::backend)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(RepoError::NotFound(format!("order {}", id))),
        }
    }

    async fn sales_summary(&self) -> RepoResult<SalesSummary> {
        let (order_count, revenue_cents, refunded_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status NOT IN ('cancelled', 'refunded')),
                COALESCE(SUM(total_cents) FILTER (WHERE status NOT IN ('cancelled', 'refunded')), 0)::BIGINT,
                COUNT(*) FILTER (WHERE status IN ('cancelled', 'refunded'))
            FROM orders
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(RepoError::backend)?;

        Ok(SalesSummary { order_count, revenue_cents, refunded_count })
    }
}
