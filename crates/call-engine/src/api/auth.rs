//! Admin-surface authentication and rate limiting
//!
//! Two credential forms: static API keys (`X-API-Key`) bound to a tenant
//! at configuration time, and bearer JWTs whose `tenant_id` claim carries
//! the tenant context. Rate limits are token buckets per authenticated
//! principal.

use std::time::Instant;

use dashmap::DashMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use voicedesk_infra_common::TenantId;

use crate::config::RateLimitConfig;
use crate::error::{EngineError, Result};

/// Bearer-token claims for the admin surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiClaims {
    /// Subject (principal id)
    pub sub: String,
    /// Tenant context; absent for operator tokens
    pub tenant_id: Option<String>,
    /// Expiration, seconds since epoch
    pub exp: u64,
}

/// An authenticated caller
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    /// Tenant the principal is bound to; `None` means operator scope
    pub tenant: Option<TenantId>,
}

/// Credential checker for the admin surface.
pub struct ApiAuth {
    /// API key -> bound tenant (`None` binds the key to operator scope)
    api_keys: DashMap<String, Option<TenantId>>,
    jwt_secret: String,
}

impl ApiAuth {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        ApiAuth {
            api_keys: DashMap::new(),
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Register an API key. `tenant = None` creates an operator key.
    pub fn add_api_key(&self, key: impl Into<String>, tenant: Option<TenantId>) {
        self.api_keys.insert(key.into(), tenant);
    }

    /// Authenticate from the request headers: `X-API-Key` first, then
    /// `Authorization: Bearer`.
    pub fn authenticate(
        &self,
        api_key: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<Principal> {
        if let Some(key) = api_key {
            return match self.api_keys.get(key) {
                Some(tenant) => {
                    let prefix: String = key.chars().take(8).collect();
                    Ok(Principal {
                        id: format!("key:{}", prefix),
                        tenant: tenant.clone(),
                    })
                }
                None => Err(EngineError::auth("unknown API key")),
            };
        }
        if let Some(token) = bearer {
            let data = decode::<ApiClaims>(
                token,
                &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
                &Validation::default(),
            )
            .map_err(|e| EngineError::auth(format!("invalid bearer token: {}", e)))?;
            return Ok(Principal {
                id: format!("jwt:{}", data.claims.sub),
                tenant: data.claims.tenant_id.map(TenantId::from),
            });
        }
        Err(EngineError::auth("missing credentials"))
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter keyed by principal id.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    refill_per_second: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        RateLimiter {
            buckets: DashMap::new(),
            refill_per_second: config.requests_per_minute as f64 / 60.0,
            burst: config.burst as f64,
        }
    }

    /// Take one token for the principal, or report how long to wait.
    pub fn check(&self, principal: &str) -> Result<()> {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(principal.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_seconds = (deficit / self.refill_per_second).ceil() as u64;
            Err(EngineError::RateLimited {
                retry_after_seconds: retry_after_seconds.max(1),
            })
        }
    }
}
