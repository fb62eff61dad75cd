//! Postgres-backed catalog, coupon and redemption store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{ActiveWindow, CatalogProduct, Coupon, CouponRedemption};
use crate::domain::value_objects::{CouponCode, Money, Quantity};
use crate::pricing::{CouponSource, QueryResult, RedemptionLedger, RedemptionScope};
use crate::{PricingError, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CouponRow {
    pub id: Uuid, pub code: String, pub discount_type: String, pub value: Decimal, pub active: bool,
    pub starts_at: Option<DateTime<Utc>>, pub ends_at: Option<DateTime<Utc>>,
    pub min_order_amount: Option<Decimal>, pub cap_mode: String,
    pub cap_amount: Option<Decimal>, pub cap_percent: Option<Decimal>,
    pub cap_amount_msi: Option<Decimal>, pub cap_percent_msi: Option<Decimal>,
    pub max_uses: Option<i32>, pub max_uses_per_user: Option<i32>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = PricingError;

    fn try_from(r: CouponRow) -> Result<Self> {
        let code = CouponCode::new(r.code).map_err(|e| PricingError::InvalidCoupon(e.to_string()))?;
        let money = |v: Option<Decimal>| v.map(Money::try_from_decimal).transpose().map_err(PricingError::from);
        let uses = |v: Option<i32>| v.map(u32::try_from).transpose().map_err(|_| PricingError::InvalidCoupon("negative usage limit".into()));
        Ok(Coupon {
            id: r.id,
            code,
            discount_type: r.discount_type.parse()?,
            value: r.value,
            active: r.active,
            window: r.starts_at.zip(r.ends_at).map(|(s, e)| ActiveWindow::new(s, e)),
            min_order_amount: money(r.min_order_amount)?,
            cap_mode: r.cap_mode.parse()?,
            cap_amount: money(r.cap_amount)?,
            cap_percent: r.cap_percent,
            cap_amount_msi: money(r.cap_amount_msi)?,
            cap_percent_msi: r.cap_percent_msi,
            max_uses: uses(r.max_uses)?,
            max_uses_per_user: uses(r.max_uses_per_user)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid, pub name: String, pub price: Decimal, pub discount_pct: Option<Decimal>,
    pub sale_price: Option<Decimal>, pub stock_total: Option<i32>,
}

impl TryFrom<ProductRow> for CatalogProduct {
    type Error = PricingError;

    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(CatalogProduct {
            id: r.id,
            name: r.name,
            price: Money::try_from_decimal(r.price)?,
            discount_pct: r.discount_pct,
            sale_price: r.sale_price.map(Money::try_from_decimal).transpose()?,
            stock: r.stock_total.map(|s| Quantity::new(u32::try_from(s).unwrap_or(0))),
        })
    }
}

fn db_int(n: u32) -> i32 { i32::try_from(n).unwrap_or(i32::MAX) }

fn storage(e: sqlx::Error) -> PricingError { PricingError::Storage(e.to_string()) }

/// Coupon writes surface a clashing code as a validation error.
fn coupon_write(e: sqlx::Error) -> PricingError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => PricingError::InvalidCoupon("code already exists".into()),
        _ => storage(e),
    }
}

const COUPON_COLUMNS: &str = "id, code, discount_type, value, active, starts_at, ends_at, min_order_amount, cap_mode, \
    cap_amount, cap_percent, cap_amount_msi, cap_percent_msi, max_uses, max_uses_per_user";

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    /// Active catalog rows for the given ids; unknown ids are simply absent.
    pub async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<CatalogProduct>> {
        sqlx::query_as::<_, ProductRow>("SELECT id, name, price, discount_pct, sale_price, stock_total FROM products WHERE id = ANY($1) AND status = 'active'")
            .bind(ids).fetch_all(&self.pool).await.map_err(storage)?
            .into_iter().map(CatalogProduct::try_from).collect()
    }

    pub async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC");
        sqlx::query_as::<_, CouponRow>(&sql).fetch_all(&self.pool).await.map_err(storage)?
            .into_iter().map(Coupon::try_from).collect()
    }

    pub async fn insert_coupon(&self, c: &Coupon) -> Result<()> {
        let window = c.window.ok_or_else(|| PricingError::InvalidCoupon("missing dates".into()))?;
        sqlx::query("INSERT INTO coupons (id, code, discount_type, value, active, starts_at, ends_at, min_order_amount, cap_mode, cap_amount, cap_percent, cap_amount_msi, cap_percent_msi, max_uses, max_uses_per_user, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW(), NOW())")
            .bind(c.id).bind(c.code.as_str()).bind(c.discount_type.as_str()).bind(c.value).bind(c.active)
            .bind(window.starts_at).bind(window.ends_at).bind(c.min_order_amount.map(|m| m.amount()))
            .bind(c.cap_mode.as_str()).bind(c.cap_amount.map(|m| m.amount())).bind(c.cap_percent)
            .bind(c.cap_amount_msi.map(|m| m.amount())).bind(c.cap_percent_msi)
            .bind(c.max_uses.map(db_int)).bind(c.max_uses_per_user.map(db_int))
            .execute(&self.pool).await.map_err(coupon_write)?;
        Ok(())
    }

    /// `false` when no coupon has that id.
    pub async fn update_coupon(&self, c: &Coupon) -> Result<bool> {
        let window = c.window.ok_or_else(|| PricingError::InvalidCoupon("missing dates".into()))?;
        let done = sqlx::query("UPDATE coupons SET code = $2, discount_type = $3, value = $4, active = $5, starts_at = $6, ends_at = $7, min_order_amount = $8, cap_mode = $9, cap_amount = $10, cap_percent = $11, cap_amount_msi = $12, cap_percent_msi = $13, max_uses = $14, max_uses_per_user = $15, updated_at = NOW() WHERE id = $1")
            .bind(c.id).bind(c.code.as_str()).bind(c.discount_type.as_str()).bind(c.value).bind(c.active)
            .bind(window.starts_at).bind(window.ends_at).bind(c.min_order_amount.map(|m| m.amount()))
            .bind(c.cap_mode.as_str()).bind(c.cap_amount.map(|m| m.amount())).bind(c.cap_percent)
            .bind(c.cap_amount_msi.map(|m| m.amount())).bind(c.cap_percent_msi)
            .bind(c.max_uses.map(db_int)).bind(c.max_uses_per_user.map(db_int))
            .execute(&self.pool).await.map_err(coupon_write)?;
        Ok(done.rows_affected() > 0)
    }

    /// Flips `active`; returns the new value, `None` if the coupon does not exist.
    pub async fn toggle_coupon(&self, id: Uuid) -> Result<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as("UPDATE coupons SET active = NOT active, updated_at = NOW() WHERE id = $1 RETURNING active")
            .bind(id).fetch_optional(&self.pool).await.map_err(storage)?;
        Ok(row.map(|r| r.0))
    }

    /// Appends a redemption. The `(coupon_id, order_id)` unique key makes a
    /// repeated commit for the same order a no-op; returns whether a row was written.
    pub async fn record_redemption(&self, r: &CouponRedemption) -> Result<bool> {
        let done = sqlx::query("INSERT INTO coupon_redemptions (id, coupon_id, order_id, user_id, email, amount, created_at) VALUES ($1, $2, $3, $4, $5, $6, NOW()) ON CONFLICT (coupon_id, order_id) DO NOTHING")
            .bind(Uuid::now_v7()).bind(r.coupon_id).bind(r.order_id).bind(&r.user_id)
            .bind(r.email.as_ref().map(|e| e.as_str())).bind(r.amount.amount())
            .execute(&self.pool).await.map_err(storage)?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl CouponSource for PgStore {
    async fn find_by_code(&self, code: &CouponCode) -> QueryResult<Coupon> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE upper(code) = $1 LIMIT 1");
        let rows = match sqlx::query_as::<_, CouponRow>(&sql).bind(code.as_str()).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => return QueryResult::failed(e.to_string()),
        };
        match rows.into_iter().map(Coupon::try_from).collect::<Result<Vec<_>>>() {
            Ok(coupons) => QueryResult::rows(coupons),
            Err(e) => QueryResult::failed(e.to_string()),
        }
    }
}

#[async_trait]
impl RedemptionLedger for PgStore {
    async fn count_redemptions(&self, coupon_id: Uuid, scope: &RedemptionScope) -> QueryResult<Uuid> {
        let query = match scope {
            RedemptionScope::Global => sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = $1").bind(coupon_id),
            RedemptionScope::User(user_id) => sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = $1 AND user_id = $2").bind(coupon_id).bind(user_id.clone()),
            RedemptionScope::Email(email) => sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_id = $1 AND lower(email) = $2").bind(coupon_id).bind(email.as_str().to_string()),
        };
        match query.fetch_one(&self.pool).await {
            Ok((n,)) => QueryResult::counted(u64::try_from(n).unwrap_or(0)),
            Err(e) => QueryResult::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row() -> CouponRow {
        CouponRow {
            id: Uuid::new_v4(), code: "vip20".into(), discount_type: "percent".into(), value: dec!(20), active: true,
            starts_at: Some(Utc::now()), ends_at: Some(Utc::now() + chrono::Duration::days(3)),
            min_order_amount: Some(dec!(500)), cap_mode: "both".into(), cap_amount: Some(dec!(1000)),
            cap_percent: None, cap_amount_msi: None, cap_percent_msi: None, max_uses: Some(100), max_uses_per_user: Some(1),
        }
    }

    #[test]
    fn test_coupon_row_conversion() {
        let c = Coupon::try_from(row()).unwrap();
        assert_eq!(c.code.as_str(), "VIP20");
        assert_eq!(c.cap_amount.unwrap().amount(), dec!(1000));
        assert_eq!(c.max_uses_per_user, Some(1));
        assert!(c.window.is_some());
    }

    #[test]
    fn test_coupon_row_missing_dates_is_never_active() {
        let mut r = row();
        r.ends_at = None;
        let c = Coupon::try_from(r).unwrap();
        assert!(!c.is_active(Utc::now()));
    }

    #[test]
    fn test_coupon_row_rejects_malformed() {
        let mut r = row();
        r.discount_type = "bogo".into();
        assert!(matches!(Coupon::try_from(r), Err(PricingError::InvalidCoupon(_))));
        let mut r = row();
        r.max_uses = Some(-1);
        assert!(Coupon::try_from(r).is_err());
        let mut r = row();
        r.cap_amount = Some(dec!(-5));
        assert!(matches!(Coupon::try_from(r), Err(PricingError::NegativeAmount)));
    }

    #[test]
    fn test_product_row_conversion() {
        let p = CatalogProduct::try_from(ProductRow {
            id: Uuid::new_v4(), name: "Pearl studs".into(), price: dec!(899.9), discount_pct: None,
            sale_price: None, stock_total: Some(-2),
        }).unwrap();
        assert_eq!(p.price.amount(), dec!(899.90));
        assert_eq!(p.stock, Some(Quantity::new(0)));
    }
}
