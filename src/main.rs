//! Jewelry Storefront - pricing and coupon service

use anyhow::Result;
use axum::{extract::{Path, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use chrono::Utc;
use jewelry_storefront::{
    allocate, compute_discount,
    domain::{aggregates::{Cart, Coupon, CouponDraft, CouponRedemption, LineItem, NormalizedLineItem}, events::{CouponEvent, DomainEvent}, value_objects::{CouponCode, CustomerEmail, Money}},
    pricing::Buyer, store::PgStore, AppConfig, CouponGate, PricingConfig, PricingError, TotalsBreakdown, UsageCountPolicy,
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AppState { pub store: PgStore, pub nats: Option<async_nats::Client>, pub pricing: PricingConfig, pub policy: UsageCountPolicy }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url.as_str()).await.map_err(|e| tracing::warn!("NATS unavailable, events disabled: {}", e)).ok(),
        None => None,
    };
    tracing::info!(shipping_base = %config.pricing.shipping_base, free_shipping_threshold = %config.pricing.free_shipping_threshold, percent_base = ?config.pricing.coupon_percent_base, policy = ?config.usage_count_policy, "pricing configured");
    let state = AppState { store: PgStore::new(db), nats, pricing: config.pricing.clone(), policy: config.usage_count_policy };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "jewelry-storefront"})) }))
        .route("/api/v1/cart/totals", post(cart_totals))
        .route("/api/v1/coupons/validate", post(validate_coupon))
        .route("/api/v1/coupons/commit", post(commit_coupon))
        .route("/api/v1/receipts/allocate", post(allocate_receipt))
        .route("/api/v1/admin/coupons", get(list_coupons).post(create_coupon))
        .route("/api/v1/admin/coupons/:id", put(update_coupon))
        .route("/api/v1/admin/coupons/:id/toggle", post(toggle_coupon))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("Jewelry storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

type ApiError = (StatusCode, String);

fn reject(e: PricingError) -> ApiError {
    let status = match &e {
        PricingError::CouponNotFound => StatusCode::NOT_FOUND,
        PricingError::Storage(_) => { tracing::error!("storage failure: {}", e); StatusCode::INTERNAL_SERVER_ERROR }
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, e.to_string())
}

fn unprocessable(e: impl std::fmt::Display) -> ApiError { (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()) }

async fn publish(nats: &Option<async_nats::Client>, event: DomainEvent) {
    let Some(client) = nats else { return };
    let payload = match serde_json::to_vec(&event) { Ok(p) => p, Err(e) => { tracing::warn!("event encode failed: {}", e); return; } };
    if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
        tracing::warn!(subject = event.subject(), "event publish failed: {}", e);
    }
}

#[derive(Debug, Deserialize, Validate)] pub struct CartLineRequest { pub product_id: Uuid, #[validate(range(min = 1, max = 999))] pub quantity: u32 }

#[derive(Debug, Deserialize, Validate)]
pub struct CartTotalsRequest {
    #[validate] pub items: Vec<CartLineRequest>,
    #[validate(length(max = 64))] pub coupon_code: Option<String>,
    #[serde(default)] pub msi_selected: bool,
    #[validate(email)] pub email: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CartTotalsResponse {
    #[serde(flatten)] pub totals: TotalsBreakdown,
    pub items: Vec<LineItem>,
    pub coupon_reason: Option<&'static str>,
    pub unavailable: Vec<Uuid>,
    pub low_stock: Vec<Uuid>,
}

async fn cart_totals(State(s): State<AppState>, Json(r): Json<CartTotalsRequest>) -> Result<Json<CartTotalsResponse>, ApiError> {
    r.validate().map_err(unprocessable)?;
    let ids: Vec<Uuid> = r.items.iter().map(|i| i.product_id).collect();
    let products = s.store.find_products(&ids).await.map_err(reject)?;

    let mut cart = Cart::new();
    let mut unavailable = vec![];
    for line in &r.items {
        match products.iter().find(|p| p.id == line.product_id) {
            Some(p) => cart.add_item(p.to_line_item(line.quantity).map_err(reject)?),
            None => { tracing::warn!(product_id = %line.product_id, "product not available, dropped from cart"); unavailable.push(line.product_id); }
        }
    }
    let low_stock: Vec<Uuid> = products.iter().filter(|p| cart.items().iter().any(|i| i.id == p.id.to_string() && !p.has_stock_for(i.quantity))).map(|p| p.id).collect();

    let now = Utc::now();
    let mut totals = cart.totals(&s.pricing, None, r.msi_selected, now);
    let mut coupon_reason = None;
    if let Some(raw) = r.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
        let code = CouponCode::new(raw).map_err(unprocessable)?;
        let buyer = Buyer::new(r.user_id.clone(), r.email.as_deref());
        let gate = CouponGate::new(&s.store, &s.store, s.policy);
        let decision = gate.evaluate(&code, totals.subtotal_products, &buyer, now).await.map_err(reject)?;
        coupon_reason = Some(decision.eligibility.reason());
        if let Some(coupon) = decision.usable() {
            cart.attach_coupon(code);
            totals = cart.totals(&s.pricing, Some(coupon), r.msi_selected, now);
        }
    }
    Ok(Json(CartTotalsResponse { totals, items: cart.items().to_vec(), coupon_reason, unavailable, low_stock }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[serde(default)] pub code: String,
    pub subtotal: Option<serde_json::Value>,
    #[serde(default)] pub msi_selected: bool,
    #[validate(email)] pub email: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ValidateCouponResponse {
    pub ok: bool,
    pub code: Option<String>,
    pub discount_amount: Option<Money>,
    pub reason: Option<&'static str>,
    pub cap_mode: Option<&'static str>,
    pub cap_amount: Option<Money>,
    pub cap_percent: Option<rust_decimal::Decimal>,
    pub min_order_amount: Option<Money>,
}

impl ValidateCouponResponse {
    fn rejected(reason: &'static str) -> Self { Self { reason: Some(reason), ..Default::default() } }
}

/// Anything but a readable amount above zero counts as a missing subtotal.
fn positive_subtotal(raw: Option<&serde_json::Value>) -> Option<Money> {
    let text = match raw? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Money::parse(&text).ok().filter(Money::is_positive)
}

async fn validate_coupon(State(s): State<AppState>, Json(r): Json<ValidateCouponRequest>) -> Result<(StatusCode, Json<ValidateCouponResponse>), ApiError> {
    r.validate().map_err(unprocessable)?;
    let Ok(code) = CouponCode::new(r.code.as_str()) else { return Ok((StatusCode::BAD_REQUEST, Json(ValidateCouponResponse::rejected("missing_code")))) };
    let Some(subtotal) = positive_subtotal(r.subtotal.as_ref()) else { return Ok((StatusCode::BAD_REQUEST, Json(ValidateCouponResponse::rejected("subtotal_required")))) };

    let buyer = Buyer::new(r.user_id.clone(), r.email.as_deref());
    let gate = CouponGate::new(&s.store, &s.store, s.policy);
    let decision = gate.evaluate(&code, subtotal, &buyer, Utc::now()).await.map_err(reject)?;
    let Some(coupon) = decision.usable() else {
        let status = if decision.coupon.is_none() { StatusCode::NOT_FOUND } else { StatusCode::BAD_REQUEST };
        let mut body = ValidateCouponResponse::rejected(decision.eligibility.reason());
        body.min_order_amount = decision.coupon.as_ref().and_then(|c| c.min_order_amount);
        return Ok((status, Json(body)));
    };

    Ok((StatusCode::OK, Json(ValidateCouponResponse {
        ok: true,
        code: Some(code.to_string()),
        discount_amount: Some(compute_discount(subtotal, Some(coupon), r.msi_selected)),
        reason: Some(decision.eligibility.reason()),
        cap_mode: Some(coupon.cap_mode.as_str()),
        cap_amount: coupon.cap_amount,
        cap_percent: coupon.cap_percent,
        min_order_amount: coupon.min_order_amount,
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommitCouponRequest {
    #[validate(length(min = 1, max = 64))] pub code: String,
    pub order_id: Uuid,
    pub amount: Money,
    #[validate(email)] pub email: Option<String>,
    pub user_id: Option<String>,
}

/// Records a redemption once the order is paid.
async fn commit_coupon(State(s): State<AppState>, Json(r): Json<CommitCouponRequest>) -> Result<Json<serde_json::Value>, ApiError> {
    r.validate().map_err(unprocessable)?;
    if !r.amount.is_positive() { return Err((StatusCode::BAD_REQUEST, "missing_fields".to_string())); }
    let code = CouponCode::new(r.code.as_str()).map_err(unprocessable)?;
    let coupon = CouponGate::new(&s.store, &s.store, s.policy).lookup(&code).await.map_err(reject)?;

    let redemption = CouponRedemption {
        coupon_id: coupon.id, order_id: r.order_id, user_id: r.user_id.clone(),
        email: r.email.as_deref().and_then(CustomerEmail::normalize), amount: r.amount,
    };
    let recorded = s.store.record_redemption(&redemption).await.map_err(reject)?;
    if recorded {
        tracing::info!(code = %code, order_id = %r.order_id, amount = %r.amount, "coupon redeemed");
        publish(&s.nats, DomainEvent::Coupon(CouponEvent::Redeemed { coupon_id: coupon.id, code, order_id: r.order_id, amount: r.amount, at: Utc::now() })).await;
    }
    Ok(Json(serde_json::json!({"ok": true, "recorded": recorded})))
}

#[derive(Debug, Deserialize)] pub struct AllocateRequest { pub items: Vec<serde_json::Value>, pub discount_total: Money }

async fn allocate_receipt(Json(r): Json<AllocateRequest>) -> Json<Vec<NormalizedLineItem>> {
    let items = r.items.iter().map(NormalizedLineItem::from_display).collect();
    Json(allocate(items, r.discount_total))
}

async fn list_coupons(State(s): State<AppState>) -> Result<Json<Vec<Coupon>>, ApiError> {
    Ok(Json(s.store.list_coupons().await.map_err(reject)?))
}

async fn create_coupon(State(s): State<AppState>, Json(d): Json<CouponDraft>) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let coupon = d.into_coupon(Uuid::now_v7()).map_err(reject)?;
    s.store.insert_coupon(&coupon).await.map_err(reject)?;
    publish(&s.nats, DomainEvent::Coupon(CouponEvent::Created { coupon_id: coupon.id, code: coupon.code.clone() })).await;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn update_coupon(State(s): State<AppState>, Path(id): Path<Uuid>, Json(d): Json<CouponDraft>) -> Result<Json<Coupon>, ApiError> {
    let coupon = d.into_coupon(id).map_err(reject)?;
    if !s.store.update_coupon(&coupon).await.map_err(reject)? { return Err((StatusCode::NOT_FOUND, "Not found".to_string())); }
    publish(&s.nats, DomainEvent::Coupon(CouponEvent::Updated { coupon_id: id, code: coupon.code.clone() })).await;
    Ok(Json(coupon))
}

async fn toggle_coupon(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>, ApiError> {
    let active = s.store.toggle_coupon(id).await.map_err(reject)?.ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;
    publish(&s.nats, DomainEvent::Coupon(CouponEvent::Toggled { coupon_id: id, active })).await;
    Ok(Json(serde_json::json!({"id": id, "active": active})))
}
