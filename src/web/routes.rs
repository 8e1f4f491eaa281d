use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, header::CONTENT_TYPE};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum_extra::extract::PrivateCookieJar;
use tower_http::cors::CorsLayer;
use url::Url;

use super::error::WebError;
use super::extractor::{AdminUser, AuthenticatedUser, SessionContext};
use super::state::AppState;
use super::types::{
    AdminCheckResponse, CallbackParams, ProfileResponse, RegisterSubdomainRequest,
    RegisterSubdomainResponse,
};
use crate::error::{AuthError, ProvisionError};
use crate::traits::{DnsProvider, PortalStore};
use crate::types::{DomainRecord, SubdomainMapping};

/// Create the portal router.
pub fn app_routes<S, D>(state: AppState<S, D>) -> Router
where
    S: PortalStore,
    D: DnsProvider,
{
    let cors = cors_layer(&state.settings.home_url);

    let router = Router::new()
        .route("/login", get(login::<S, D>))
        .route("/auth/callback", get(callback::<S, D>))
        .route("/profile", get(profile))
        .route("/is-admin", get(is_admin))
        .route("/logout", get(logout::<S, D>))
        .route("/api/register-subdomain", post(register_subdomain::<S, D>))
        .route("/api/subdomains", get(my_subdomains::<S, D>))
        .route("/api/admin/domains", get(admin_domains::<S, D>))
        .route("/api/admin/subdomains", get(admin_subdomains::<S, D>))
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Allow the front-end origin to call the API with credentials.
fn cors_layer(home_url: &str) -> Option<CorsLayer> {
    let origin = Url::parse(home_url).ok()?.origin().ascii_serialization();
    let origin = HeaderValue::from_str(&origin).ok()?;
    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE]),
    )
}

// ── Login ──────────────────────────────────────────────────────────

async fn login<S: PortalStore, D: DnsProvider>(
    State(state): State<AppState<S, D>>,
    mut ctx: SessionContext,
) -> (PrivateCookieJar, Redirect) {
    ctx.renew(state.settings.session_ttl);
    let redirect = state.sso.begin_login(&mut ctx.session);

    tracing::info!("SSO login redirect issued");
    (ctx.commit(), Redirect::to(&redirect.url))
}

// ── Callback ───────────────────────────────────────────────────────

async fn callback<S: PortalStore, D: DnsProvider>(
    State(state): State<AppState<S, D>>,
    mut ctx: SessionContext,
    Query(params): Query<CallbackParams>,
) -> Result<(PrivateCookieJar, Redirect), (PrivateCookieJar, AuthError)> {
    // Commit even on failure: a verified callback has consumed the pending nonce.
    let identity = match state
        .sso
        .handle_callback(&mut ctx.session, &params.sso, &params.sig)
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "SSO callback rejected");
            return Err((ctx.commit(), e));
        }
    };

    let roles = match state.store.roles_for(&identity.external_id).await {
        Ok(roles) => roles,
        Err(e) => {
            tracing::warn!(error = %e, external_id = %identity.external_id, "Role lookup failed, granting none");
            Vec::new()
        }
    };
    ctx.session.authenticate(identity.with_roles(roles));

    tracing::info!("SSO login successful");
    Ok((ctx.commit(), Redirect::to(&state.settings.home_url)))
}

// ── Profile / Admin check ──────────────────────────────────────────

async fn profile(AuthenticatedUser(identity): AuthenticatedUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(&identity))
}

async fn is_admin(AdminUser(_): AdminUser) -> Json<AdminCheckResponse> {
    Json(AdminCheckResponse { is_admin: true })
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<S: PortalStore, D: DnsProvider>(
    State(state): State<AppState<S, D>>,
    ctx: SessionContext,
) -> (PrivateCookieJar, Redirect) {
    (ctx.destroy(), Redirect::to(&state.settings.home_url))
}

// ── Subdomains ─────────────────────────────────────────────────────

async fn register_subdomain<S: PortalStore, D: DnsProvider>(
    State(state): State<AppState<S, D>>,
    ctx: SessionContext,
    payload: Result<Json<RegisterSubdomainRequest>, JsonRejection>,
) -> Result<Json<RegisterSubdomainResponse>, ProvisionError> {
    let identity = ctx.session.identity().ok_or(ProvisionError::Unauthorized)?;
    let Json(body) = payload.map_err(|e| ProvisionError::InvalidInput(e.body_text()))?;

    let user_id = body
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProvisionError::InvalidInput("userId is required".into()))?;
    if user_id != identity.external_id.0 {
        tracing::warn!(
            session_user = %identity.external_id,
            requested_user = %user_id,
            "Registration on behalf of another user rejected"
        );
        return Err(ProvisionError::Unauthorized);
    }

    let mapping = state
        .provisioner
        .register(
            Some(identity),
            body.subdomain.as_deref().unwrap_or_default(),
            body.domain.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(Json(RegisterSubdomainResponse {
        success: true,
        record_id: mapping.record_id,
    }))
}

async fn my_subdomains<S: PortalStore, D: DnsProvider>(
    State(state): State<AppState<S, D>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<Json<Vec<SubdomainMapping>>, WebError> {
    let mappings = state
        .store
        .list_mappings(Some(&identity.external_id))
        .await?;
    Ok(Json(mappings))
}

async fn admin_domains<S: PortalStore, D: DnsProvider>(
    State(state): State<AppState<S, D>>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<DomainRecord>>, WebError> {
    Ok(Json(state.store.list_domains().await?))
}

async fn admin_subdomains<S: PortalStore, D: DnsProvider>(
    State(state): State<AppState<S, D>>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<SubdomainMapping>>, WebError> {
    Ok(Json(state.store.list_mappings(None).await?))
}
