// src/credits.rs
//
// Credit ledger: balances on client and freelancer profiles, the
// append-only transaction log and the buy-credits payment flow.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{self, Action, Resource};
use crate::app_state::AppState;
use crate::auth::{current_actor, Actor};
use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    OrderStatus, PaymentOrder, ProfileRef, Role, Transaction, TransactionType,
};
use crate::payments::PaymentGateway;
use crate::store::{Mutation, PageRequest, Store};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Resolves the balance-holding profile of a user in the given role.
pub async fn profile_ref(store: &dyn Store, user_id: &str, role: Role) -> AppResult<ProfileRef> {
    match role {
        Role::Client => store
            .client_by_user(user_id)
            .await?
            .map(|p| ProfileRef::client(p.id))
            .ok_or(AppError::ProfileMissing(Role::Client)),
        Role::Freelancer => store
            .freelancer_by_user(user_id)
            .await?
            .map(|p| ProfileRef::freelancer(p.id))
            .ok_or(AppError::ProfileMissing(Role::Freelancer)),
        other => Err(AppError::Validation(format!("{} accounts hold no credits", other))),
    }
}

/// Client profile first, then freelancer.
async fn any_profile_ref(store: &dyn Store, user_id: &str) -> AppResult<ProfileRef> {
    if let Some(client) = store.client_by_user(user_id).await? {
        return Ok(ProfileRef::client(client.id));
    }
    if let Some(freelancer) = store.freelancer_by_user(user_id).await? {
        return Ok(ProfileRef::freelancer(freelancer.id));
    }
    Err(AppError::not_found("credit profile for user", user_id))
}

/// Maps a replayed reference to the transaction it first produced.
async fn replayed(
    store: &dyn Store,
    transaction_id: &str,
    owner: &ProfileRef,
) -> AppResult<Option<Transaction>> {
    match store.transaction_by_ref(transaction_id).await? {
        Some(existing) if existing.owner == *owner && existing.kind == TransactionType::Credit => {
            Ok(Some(existing))
        }
        Some(_) => Err(AppError::DuplicateTransaction(transaction_id.to_string())),
        None => Ok(None),
    }
}

/// Credits `amount` to the user's profile for `role`. Replaying the same
/// `transaction_id` returns the original entry and credits nothing.
pub async fn add_credits(
    store: &dyn Store,
    user_id: &str,
    role: Role,
    amount: i64,
    transaction_id: Option<String>,
) -> AppResult<Transaction> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be greater than zero".to_string()));
    }
    let owner = profile_ref(store, user_id, role).await?;
    let reference = transaction_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Some(existing) = replayed(store, &reference, &owner).await? {
        info!("Credit {} already applied, skipping", reference);
        return Ok(existing);
    }

    let tx = Transaction::new(reference.clone(), &owner, TransactionType::Credit, amount, None);
    let result = store
        .apply(vec![
            Mutation::AdjustCredits { owner: owner.clone(), delta: amount },
            Mutation::AppendTransaction(tx.clone()),
        ])
        .await;
    match result {
        Ok(()) => {
            info!("Credited {} to {} profile {}", amount, owner.role, owner.profile_id);
            Ok(tx)
        }
        Err(AppError::DuplicateTransaction(_)) => replayed(store, &reference, &owner)
            .await?
            .ok_or(AppError::DuplicateTransaction(reference)),
        Err(e) => Err(e),
    }
}

pub async fn remove_credits(store: &dyn Store, user_id: &str, amount: i64) -> AppResult<Transaction> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be greater than zero".to_string()));
    }
    let owner = any_profile_ref(store, user_id).await?;
    let tx = Transaction::new(
        Uuid::new_v4().to_string(),
        &owner,
        TransactionType::Debit,
        amount,
        None,
    );
    store
        .apply(vec![
            Mutation::AdjustCredits { owner: owner.clone(), delta: -amount },
            Mutation::AppendTransaction(tx.clone()),
        ])
        .await?;
    info!("Debited {} from {} profile {}", amount, owner.role, owner.profile_id);
    Ok(tx)
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub user_id: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<i64>,
}

pub fn page_request(page: Option<u64>, limit: Option<i64>) -> AppResult<PageRequest> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 {
        return Err(AppError::Validation("page starts at 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let skip = (page - 1)
        .checked_mul(limit as u64)
        .ok_or_else(|| AppError::Validation(format!("page {} is out of range", page)))?;
    Ok(PageRequest { skip, limit })
}

/// Ledger rows of a user, newest first. Admins may read any user's ledger.
pub async fn get_transactions(
    store: &dyn Store,
    actor: &Actor,
    user_id: Option<&str>,
    page: PageRequest,
) -> AppResult<Vec<Transaction>> {
    let target = match user_id {
        Some(id) if id != actor.user_id => {
            access::ensure(actor, Action::Administer, Resource::None)?;
            id
        }
        _ => {
            access::ensure(actor, Action::HoldCredits, Resource::None)?;
            actor.user_id.as_str()
        }
    };
    let owner = any_profile_ref(store, target).await?;
    store.transactions(&owner.profile_id, page).await
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceList {
    pub currency: String,
    /// Minor currency units per credit.
    pub credit_unit_price: i64,
}

pub fn prices(config: &PaymentConfig) -> PriceList {
    PriceList {
        currency: config.currency.clone(),
        credit_unit_price: config.credit_unit_price,
    }
}

/// Opens a gateway order for `credits` and records it as `created`.
pub async fn create_order(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    config: &PaymentConfig,
    actor: &Actor,
    credits: i64,
) -> AppResult<PaymentOrder> {
    access::ensure(actor, Action::BuyCredits, Resource::None)?;
    if credits <= 0 {
        return Err(AppError::Validation("credits must be greater than zero".to_string()));
    }
    let amount = credits
        .checked_mul(config.credit_unit_price)
        .ok_or_else(|| AppError::Validation("order amount is too large".to_string()))?;
    let client = store
        .client_by_user(&actor.user_id)
        .await?
        .ok_or(AppError::ProfileMissing(Role::Client))?;

    let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
    let remote = gateway.create_order(amount, &config.currency, &receipt).await?;
    let order = PaymentOrder {
        id: remote.id,
        receipt,
        client_profile_id: client.id,
        credits,
        amount: remote.amount,
        currency: remote.currency,
        status: OrderStatus::Created,
        created_at: Utc::now(),
    };
    store.apply(vec![Mutation::InsertOrder(order.clone())]).await?;
    info!("Order {} created for {} credits", order.id, credits);
    Ok(order)
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// Credits a paid order. The signature is checked before anything is
/// written; a repeated callback returns the original credit.
pub async fn verify_payment(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    request: VerifyPaymentRequest,
) -> AppResult<Transaction> {
    if !gateway.verify_signature(&request.order_id, &request.payment_id, &request.signature) {
        warn!("Payment signature mismatch for order {}", request.order_id);
        return Err(AppError::Validation("payment signature does not match".to_string()));
    }
    let order = store
        .order(&request.order_id)
        .await?
        .ok_or_else(|| AppError::not_found("order", &request.order_id))?;
    let owner = ProfileRef::client(&order.client_profile_id);

    if order.status == OrderStatus::Paid {
        return replayed(store, &request.payment_id, &owner).await?.ok_or_else(|| {
            AppError::StateConflict(format!("order {} was paid by another payment", order.id))
        });
    }

    let tx = Transaction::new(
        request.payment_id.clone(),
        &owner,
        TransactionType::Credit,
        order.credits,
        None,
    );
    store
        .apply(vec![
            Mutation::MarkOrderPaid { order_id: order.id.clone() },
            Mutation::AdjustCredits { owner, delta: order.credits },
            Mutation::AppendTransaction(tx.clone()),
        ])
        .await?;
    info!(
        "Payment {} verified; {} credits added for order {}",
        request.payment_id, order.credits, order.id
    );
    Ok(tx)
}

// ─── HANDLERS ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    pub user_id: String,
    pub role: Role,
    pub amount: i64,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveCreditsRequest {
    pub user_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub credits: i64,
}

/// POST /credits/add (admin)
pub async fn add_credits_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<AddCreditsRequest>,
) -> AppResult<HttpResponse> {
    debug!("Received add_credits request: {:?}", payload);
    let actor = current_actor(&req, data.store.as_ref()).await?;
    access::ensure(&actor, Action::Administer, Resource::None)?;
    let body = payload.into_inner();
    let tx = add_credits(
        data.store.as_ref(),
        &body.user_id,
        body.role,
        body.amount,
        body.transaction_id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(tx))
}

/// POST /credits/remove (admin)
pub async fn remove_credits_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<RemoveCreditsRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    access::ensure(&actor, Action::Administer, Resource::None)?;
    let tx = remove_credits(data.store.as_ref(), &payload.user_id, payload.amount).await?;
    Ok(HttpResponse::Ok().json(tx))
}

/// GET /credits/transactions?user_id=&page=&limit=
pub async fn transactions_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TransactionQuery>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let page = page_request(query.page, query.limit)?;
    let rows = get_transactions(data.store.as_ref(), &actor, query.user_id.as_deref(), page).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// GET /prices
pub async fn prices_handler(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(prices(&data.config.payment))
}

/// POST /payments/orders
pub async fn create_order_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateOrderRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let order = create_order(
        data.store.as_ref(),
        data.gateway.as_ref(),
        &data.config.payment,
        &actor,
        payload.credits,
    )
    .await?;
    Ok(HttpResponse::Created().json(order))
}

/// POST /payments/verify
pub async fn verify_payment_handler(
    data: web::Data<AppState>,
    payload: web::Json<VerifyPaymentRequest>,
) -> AppResult<HttpResponse> {
    let tx = verify_payment(data.store.as_ref(), data.gateway.as_ref(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(tx))
}
