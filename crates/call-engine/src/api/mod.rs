//! # Administrative HTTP surface
//!
//! REST endpoints under `/api/v1`, authenticated with an API key or a
//! bearer JWT, rate-limited per principal, and stamped with
//! `X-Correlation-ID` on every response. Errors are JSON
//! `{error, correlation_id, detail}` with the taxonomy's status codes.
//!
//! The carrier webhook also lands here; it authenticates with the
//! carrier's HMAC signature instead of admin credentials and answers with
//! the XML instruction document.

pub mod auth;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use voicedesk_callback_core::{CallbackDraft, CallbackPriority, CallbackSchedule, CallbackType};
use voicedesk_directory_core::{Agent, AgentStatus, FallbackTarget, Tenant};
use voicedesk_infra_common::{AgentId, CallbackId, DepartmentId, SessionId, TenantId};
use voicedesk_scaling_core::{AutoScaler, ScalingPolicy};

use crate::carrier::{verify_signature, CarrierEvent, CarrierEventKind, CarrierResponse};
use crate::engine::VoiceDeskEngine;
use crate::error::{EngineError, Result};

pub use auth::{ApiAuth, ApiClaims, Principal, RateLimiter};

/// Shared state behind the admin router
pub struct ApiContext {
    pub engine: Arc<VoiceDeskEngine>,
    pub scaler: Arc<AutoScaler>,
    pub auth: Arc<ApiAuth>,
    pub limiter: Arc<RateLimiter>,
    /// Shared secret for carrier webhook signatures
    pub carrier_token: String,
    /// Media socket URL handed to the carrier for streaming
    pub media_stream_url: String,
}

/// Build the `/api/v1` router
pub fn router(ctx: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/api/v1/webhooks/carrier", post(carrier_webhook))
        .route("/api/v1/tenants", get(list_tenants).post(create_tenant))
        .route("/api/v1/tenants/:id/active", post(set_tenant_active))
        .route("/api/v1/agents", get(list_agents).post(upsert_agent))
        .route("/api/v1/agents/:id/status", post(set_agent_status))
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/:id/accept", post(accept_offer))
        .route("/api/v1/sessions/:id/reject", post(reject_offer))
        .route("/api/v1/callbacks", get(list_callbacks).post(create_callback))
        .route("/api/v1/callbacks/:id/cancel", post(cancel_callback))
        .route("/api/v1/callbacks/:id/schedule", post(schedule_callback))
        .route("/api/v1/voicemail", get(list_voicemail))
        .route("/api/v1/scaling/status", get(scaling_status))
        .route("/api/v1/scaling/policy", put(set_scaling_policy))
        .route("/api/v1/scaling/force", post(force_scaling))
        .route("/api/v1/gateway/status", get(gateway_status))
        .route("/api/v1/gateway/failovers", get(gateway_failovers))
        .route("/api/v1/audit", get(query_audit))
        .route("/api/v1/ledger", get(ledger_balance))
        .route("/api/v1/stats", get(tenant_stats))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(ctx)
}

// === Response plumbing ===

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    correlation_id: String,
    detail: String,
}

fn respond<T: Serialize>(correlation_id: String, result: Result<T>) -> Response {
    let mut response = match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(&correlation_id, e),
    };
    stamp_correlation(&mut response, &correlation_id);
    response
}

fn error_response(correlation_id: &str, e: EngineError) -> Response {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (
        status,
        Json(ErrorBody {
            error: e.category(),
            correlation_id: correlation_id.to_string(),
            detail: e.to_string(),
        }),
    )
        .into_response();
    if let EngineError::RateLimited {
        retry_after_seconds,
    } = e
    {
        if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

fn stamp_correlation(response: &mut Response, correlation_id: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
}

fn new_correlation() -> String {
    voicedesk_infra_common::CorrelationId::new().to_string()
}

fn authorize(ctx: &ApiContext, headers: &HeaderMap) -> Result<Principal> {
    let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let principal = ctx.auth.authenticate(api_key, bearer)?;
    ctx.limiter.check(&principal.id)?;
    Ok(principal)
}

/// Every admin call needs a tenant context: the principal's binding, or
/// an explicit header for operator-scoped principals.
fn tenant_scope(principal: &Principal, headers: &HeaderMap) -> Result<TenantId> {
    if let Some(tenant) = &principal.tenant {
        return Ok(tenant.clone());
    }
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(TenantId::from)
        .ok_or_else(|| EngineError::validation("missing tenant context"))
}

// === Carrier webhook ===

async fn carrier_webhook(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("x-carrier-signature")
        .and_then(|v| v.to_str().ok());
    if let Err(e) = verify_signature(&ctx.carrier_token, &body, signature) {
        warn!("carrier webhook rejected: {}", e);
        return (StatusCode::FORBIDDEN, "signature rejected").into_response();
    }

    let event: CarrierEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("malformed event: {}", e)).into_response();
        }
    };

    let xml = match event.kind {
        CarrierEventKind::Incoming => handle_incoming(&ctx, &event),
        CarrierEventKind::InProgress => CarrierResponse::new(),
        CarrierEventKind::Completed => {
            if let Some(session) = ctx.engine.session_for_call(&event.call_id) {
                let _ = ctx.engine.caller_hangup(&session);
            }
            CarrierResponse::new().hangup()
        }
        CarrierEventKind::Failed => {
            if let Some(session) = ctx.engine.session_for_call(&event.call_id) {
                let _ = ctx.engine.carrier_error(&session, "carrier reported failure");
            }
            CarrierResponse::new().hangup()
        }
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        xml.to_xml(),
    )
        .into_response()
}

fn handle_incoming(ctx: &ApiContext, event: &CarrierEvent) -> CarrierResponse {
    let Some(tenant) = ctx.engine.tenants().find_by_did(&event.tenant_did) else {
        warn!("incoming call for unknown DID");
        return CarrierResponse::new()
            .say("This number is not in service.")
            .hangup();
    };
    let Some(caller_number) = event.caller_number.as_deref() else {
        return CarrierResponse::new()
            .say("We could not identify your call.")
            .hangup();
    };

    match ctx
        .engine
        .open_session(&tenant.id, caller_number, event.call_id.clone(), None)
    {
        Ok(session) => {
            info!(session = %session, "incoming call admitted");
            CarrierResponse::new().stream(&ctx.media_stream_url)
        }
        Err(e) => {
            warn!("incoming call refused: {}", e);
            CarrierResponse::new()
                .say("We are unable to take your call right now. Please try again later.")
                .hangup()
        }
    }
}

// === Tenants ===

#[derive(Deserialize)]
struct CreateTenantRequest {
    id: Option<String>,
    name: String,
    monthly_limit_seconds: Option<i64>,
    max_concurrent_calls: Option<u32>,
    max_transfer_attempts: Option<u32>,
    fallback: Option<FallbackTarget>,
    #[serde(default)]
    dids: Vec<String>,
}

async fn create_tenant(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(request): Json<CreateTenantRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<Tenant> {
        let principal = authorize(&ctx, &headers)?;
        if principal.tenant.is_some() {
            return Err(EngineError::auth("tenant-scoped keys cannot create tenants"));
        }
        let id = request
            .id
            .map(TenantId::from)
            .unwrap_or_else(TenantId::new);
        let mut tenant = Tenant::new(id.clone(), request.name);
        if let Some(limit) = request.monthly_limit_seconds {
            tenant.monthly_limit_seconds = limit;
        }
        if let Some(cap) = request.max_concurrent_calls {
            tenant.max_concurrent_calls = cap;
        }
        if let Some(attempts) = request.max_transfer_attempts {
            tenant.max_transfer_attempts = attempts;
        }
        if let Some(fallback) = request.fallback {
            tenant.fallback = fallback;
        }
        tenant.dids = request.dids;
        ctx.engine.tenants().create_tenant(tenant.clone())?;
        ctx.engine.ledger().configure_tenant(
            &id,
            tenant.monthly_limit_seconds,
            tenant.billing_anchor_day,
        );
        Ok(tenant)
    })();
    respond(correlation, result)
}

async fn list_tenants(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<Vec<Tenant>> {
        let principal = authorize(&ctx, &headers)?;
        match &principal.tenant {
            // Tenant-scoped keys see only themselves
            Some(tenant) => Ok(vec![ctx.engine.tenants().get_tenant(tenant)?]),
            None => Ok(ctx.engine.tenants().list_tenants()),
        }
    })();
    respond(correlation, result)
}

#[derive(Deserialize)]
struct TenantActiveRequest {
    active: bool,
}

async fn set_tenant_active(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<TenantActiveRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<serde_json::Value> {
        let principal = authorize(&ctx, &headers)?;
        if principal.tenant.is_some() {
            return Err(EngineError::auth("operator scope required"));
        }
        let tenant = TenantId::from(id.as_str());
        ctx.engine.tenants().set_active(&tenant, request.active)?;
        ctx.engine.ledger().set_active(&tenant, request.active)?;
        Ok(serde_json::json!({ "tenant": tenant.to_string(), "active": request.active }))
    })();
    respond(correlation, result)
}

// === Agents ===

#[derive(Deserialize)]
struct UpsertAgentRequest {
    id: Option<String>,
    display_name: String,
    extension: String,
    department_id: Option<String>,
    capacity: Option<u32>,
    routing_weight: Option<u32>,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    languages: Vec<String>,
}

async fn upsert_agent(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(request): Json<UpsertAgentRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<Agent> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        let id = request.id.map(AgentId::from).unwrap_or_else(AgentId::new);
        let mut agent = Agent::new(id, tenant, request.display_name, request.extension);
        agent.department_id = request.department_id.map(DepartmentId::from);
        if let Some(capacity) = request.capacity {
            agent.capacity = capacity;
        }
        if let Some(weight) = request.routing_weight {
            agent.routing_weight = weight;
        }
        agent.skills = request.skills;
        agent.languages = request.languages;
        ctx.engine.registry().upsert_agent(agent.clone())?;
        Ok(agent)
    })();
    respond(correlation, result)
}

async fn list_agents(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<Vec<Agent>> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        Ok(ctx.engine.registry().list_agents(&tenant))
    })();
    respond(correlation, result)
}

#[derive(Deserialize)]
struct AgentStatusRequest {
    status: AgentStatus,
}

async fn set_agent_status(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<AgentStatusRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<Agent> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        let agent = AgentId::from(id.as_str());
        ctx.engine
            .registry()
            .set_status(&tenant, &agent, request.status)?;
        Ok(ctx.engine.registry().get_agent(&tenant, &agent)?)
    })();
    respond(correlation, result)
}

// === Sessions ===

#[derive(Serialize)]
struct SessionSummary {
    id: String,
    state: String,
    ai_attempts: u32,
    assigned_agent: Option<String>,
}

async fn list_sessions(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<Vec<SessionSummary>> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        Ok(ctx
            .engine
            .session_summaries(&tenant)
            .into_iter()
            .map(|s| SessionSummary {
                id: s.id.to_string(),
                state: s.state.as_str().to_string(),
                ai_attempts: s.ai_attempts,
                assigned_agent: s.assigned_agent.map(|a| a.to_string()),
            })
            .collect())
    })();
    respond(correlation, result)
}

#[derive(Deserialize)]
struct OfferAnswerRequest {
    agent_id: String,
}

async fn accept_offer(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<OfferAnswerRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<serde_json::Value> {
        let principal = authorize(&ctx, &headers)?;
        let _tenant = tenant_scope(&principal, &headers)?;
        ctx.engine.agent_accept(
            &SessionId::from(id.as_str()),
            &AgentId::from(request.agent_id.as_str()),
        )?;
        Ok(serde_json::json!({ "accepted": true }))
    })();
    respond(correlation, result)
}

async fn reject_offer(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<OfferAnswerRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<serde_json::Value> {
        let principal = authorize(&ctx, &headers)?;
        let _tenant = tenant_scope(&principal, &headers)?;
        ctx.engine.agent_reject(
            &SessionId::from(id.as_str()),
            &AgentId::from(request.agent_id.as_str()),
        )?;
        Ok(serde_json::json!({ "accepted": false }))
    })();
    respond(correlation, result)
}

// === Callbacks ===

#[derive(Deserialize)]
struct CreateCallbackRequest {
    caller_number: String,
    caller_name: Option<String>,
    reason: Option<String>,
    priority: Option<CallbackPriority>,
    callback_type: Option<CallbackType>,
    requested_time: Option<chrono::DateTime<chrono::Utc>>,
    department_id: Option<String>,
    max_attempts: Option<u32>,
}

async fn create_callback(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(request): Json<CreateCallbackRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<voicedesk_callback_core::CallbackRequest> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        if !voicedesk_audit_core::valid_phone_number(&request.caller_number) {
            return Err(EngineError::validation("caller number is not plausible"));
        }
        let mut draft = CallbackDraft::new(ctx.engine.fingerprint(&request.caller_number));
        draft.caller_name = request.caller_name;
        draft.reason = request.reason;
        if let Some(priority) = request.priority {
            draft.priority = priority;
        }
        if let Some(kind) = request.callback_type {
            draft.callback_type = kind;
        }
        draft.requested_time = request.requested_time;
        draft.department_id = request.department_id.map(DepartmentId::from);
        if let Some(max_attempts) = request.max_attempts {
            draft.max_attempts = max_attempts;
        }
        let hours = ctx
            .engine
            .tenants()
            .effective_hours(&tenant, draft.department_id.as_ref())
            .unwrap_or_default();
        let created =
            ctx.engine
                .callbacks()
                .create(&tenant, draft, &CallbackSchedule::new(hours))?;
        Ok(created)
    })();
    respond(correlation, result)
}

async fn list_callbacks(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<Vec<voicedesk_callback_core::CallbackRequest>> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        Ok(ctx.engine.callbacks().list(&tenant, None))
    })();
    respond(correlation, result)
}

#[derive(Deserialize)]
struct CancelCallbackRequest {
    reason: Option<String>,
}

async fn cancel_callback(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<CancelCallbackRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<serde_json::Value> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        let cancelled = ctx.engine.callbacks().cancel(
            &tenant,
            &CallbackId::from(id.as_str()),
            request.reason.as_deref().unwrap_or("cancelled_by_admin"),
        )?;
        Ok(serde_json::json!({ "cancelled": cancelled }))
    })();
    respond(correlation, result)
}

#[derive(Deserialize)]
struct ScheduleCallbackRequest {
    at: chrono::DateTime<chrono::Utc>,
}

async fn schedule_callback(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ScheduleCallbackRequest>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<voicedesk_callback_core::CallbackRequest> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        Ok(ctx
            .engine
            .callbacks()
            .schedule(&tenant, &CallbackId::from(id.as_str()), request.at)?)
    })();
    respond(correlation, result)
}

#[derive(Deserialize)]
struct VoicemailQueryParams {
    #[serde(rename = "box")]
    box_id: Option<String>,
}

async fn list_voicemail(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Query(params): Query<VoicemailQueryParams>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<_> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        Ok(ctx
            .engine
            .voicemail()
            .list(&tenant, params.box_id.as_deref()))
    })();
    respond(correlation, result)
}

// === Scaling ===

async fn scaling_status(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<serde_json::Value> {
        let principal = authorize(&ctx, &headers)?;
        let _ = principal;
        Ok(serde_json::json!({
            "current_instances": ctx.scaler.current_instances(),
            "policy": ctx.scaler.policy_for(None),
            "recent_events": ctx.scaler.history(),
        }))
    })();
    respond(correlation, result)
}

async fn set_scaling_policy(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(policy): Json<ScalingPolicy>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<ScalingPolicy> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = principal.tenant.clone();
        ctx.scaler.set_policy(policy.clone(), tenant.as_ref())?;
        Ok(policy)
    })();
    respond(correlation, result)
}

async fn force_scaling(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    match authorize(&ctx, &headers) {
        Ok(principal) => {
            let event = ctx.scaler.force_evaluation(principal.tenant.as_ref()).await;
            respond(correlation, Ok::<_, EngineError>(event))
        }
        Err(e) => {
            let mut response = error_response(&correlation, e);
            stamp_correlation(&mut response, &correlation);
            response
        }
    }
}

// === Gateway ===

async fn gateway_status(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<serde_json::Value> {
        authorize(&ctx, &headers)?;
        Ok(serde_json::json!({
            "endpoints": ctx.engine.gateway().snapshots(),
            "active": ctx.engine.gateway().active_endpoint(),
            "stats": ctx.engine.gateway().stats(),
        }))
    })();
    respond(correlation, result)
}

async fn gateway_failovers(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<_> {
        authorize(&ctx, &headers)?;
        Ok(ctx.engine.gateway().failover_history())
    })();
    respond(correlation, result)
}

// === Audit, ledger, stats ===

#[derive(Deserialize)]
struct AuditQueryParams {
    limit: Option<usize>,
}

async fn query_audit(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Query(params): Query<AuditQueryParams>,
) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<_> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        let filter = voicedesk_audit_core::QueryFilter {
            limit: params.limit,
            ..Default::default()
        };
        Ok(ctx.engine.audit().query(&tenant, filter))
    })();
    respond(correlation, result)
}

async fn ledger_balance(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<serde_json::Value> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        Ok(serde_json::json!({
            "usage_seconds": ctx.engine.ledger().current_usage(&tenant),
            "remaining_seconds": ctx.engine.ledger().remaining(&tenant),
        }))
    })();
    respond(correlation, result)
}

async fn tenant_stats(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let correlation = new_correlation();
    let result = (|| -> Result<_> {
        let principal = authorize(&ctx, &headers)?;
        let tenant = tenant_scope(&principal, &headers)?;
        Ok(ctx.engine.stats(&tenant))
    })();
    respond(correlation, result)
}
