//! HTTP 中间件
//! 限流前置检查与客户端 IP 提取；路由装配由宿主应用负责
//!
//! check/record 的分工：中间件在进入处理器前 check，在响应产生后按
//! 状态码 record（2xx 计成功，其余计失败）。需要按账户维度计数
//! （防爆破锁定）的调用方应在处理器内部自行调用
//! [`RateLimitEngine::record`] 并带上 subject_id，此处只有 IP 可用

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::IpAddr;
use std::sync::Arc;

use crate::{error::AuthError, services::RateLimitEngine};

/// 中间件共享状态
#[derive(Clone)]
pub struct GuardState {
    pub rate_limiter: Arc<RateLimitEngine>,
    /// 是否信任 X-Forwarded-For 头
    pub trust_proxy: bool,
}

/// 速率限制中间件
/// 使用客户端 IP 作为限流键；限流存储故障时放行（fail open），
/// 避免存储故障演变成对自己用户的拒绝服务
pub async fn rate_limit_middleware(
    State(state): State<Arc<GuardState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // 获取客户端 IP
    let client_ip = get_client_ip_with_addr(&req, state.trust_proxy);
    let identifier = client_ip.to_string();

    match state.rate_limiter.check(&identifier, None).await {
        Ok(decision) if decision.allowed => {
            tracing::debug!(
                client_ip = %identifier,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
        }
        Ok(decision) => {
            let retry_after_secs = decision
                .retry_after
                .map(|d| d.num_seconds().max(1))
                .unwrap_or(0);
            let reason = decision.reason.unwrap_or_else(|| "rate_limited".to_string());

            tracing::warn!(
                client_ip = %identifier,
                uri = %req.uri().path(),
                reason = %reason,
                "Request denied by rate limiter"
            );

            return Err(if reason == "account_locked" {
                AuthError::AccountLocked { retry_after_secs }
            } else {
                AuthError::RateLimited {
                    retry_after_secs,
                    reason,
                }
            });
        }
        Err(e) => {
            // 仅限流路径允许 fail open；凭据校验路径绝不如此
            tracing::warn!(error = %e, "Rate limit store unavailable, failing open");
        }
    }

    // 将 IP 添加到请求扩展，以便后续使用
    req.extensions_mut().insert(client_ip);

    let response = next.run(req).await;

    // 按响应状态回报计数；存储故障只记日志，不影响已产生的响应
    let success = response.status().is_success();
    if let Err(e) = state.rate_limiter.record(&identifier, None, success).await {
        tracing::warn!(error = %e, "Failed to record rate limit outcome");
    }

    Ok(response)
}

/// 获取客户端 IP 地址
/// 支持从代理头和请求扩展获取真实 IP
fn get_client_ip_with_addr(req: &Request, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(ip) = ip_from_headers(req.headers()) {
            return ip;
        }
    }

    // 请求扩展中已有 IP（由上游中间件设置）则直接使用
    if let Some(ip) = req.extensions().get::<IpAddr>() {
        return *ip;
    }

    // 无法获取真实 IP，返回本地回环地址（用于测试）
    tracing::warn!("Could not determine client IP, using loopback address");
    IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
}

/// 从代理头解析客户端 IP
fn ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    // 1. X-Forwarded-For（可能包含多个 IP，取第一个）
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded_for.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(addr) = first_ip.trim().parse::<IpAddr>() {
                    return Some(addr);
                }
            }
        }
    }

    // 2. X-Real-IP
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(addr) = ip_str.parse::<IpAddr>() {
                return Some(addr);
            }
        }
    }

    None
}

/// Axum 提取器：从请求中获取客户端 IP
/// 可以在处理器中直接使用
pub struct ClientIp(pub IpAddr);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for ClientIp {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        // 尝试从扩展中获取（由限流中间件设置）
        if let Some(ip) = parts.extensions.get::<IpAddr>() {
            return Ok(ClientIp(*ip));
        }

        if let Some(ip) = ip_from_headers(&parts.headers) {
            return Ok(ClientIp(ip));
        }

        // 默认返回本地回环
        Ok(ClientIp(IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))))
    }
}
