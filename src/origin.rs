//! Origin 白名单
//!
//! 配置项支持三种写法：`*`（全部允许）、精确字符串、`/正则/`。
//! 配置在启动时编译一次，之后只读共享。

use crate::{
    response::ErrorBody,
    storage::{local::ASSETS_ROUTE, signing::SIGNED_DELETE_ROUTE},
};
use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header::ORIGIN},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

const WILDCARD: &str = "*";

/// 不做 Origin 校验的路径：健康检查、接口文档，以及网关签发给持有者的链接
const EXEMPT_PATHS: &[&str] = &[
    "/api/health",
    "/api/ready",
    "/api-docs/openapi.json",
    SIGNED_DELETE_ROUTE,
];

/// 浏览器加载 `<img>` 时不带 Origin，签发的读取链接必须放行
fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
        || path
            .strip_prefix(ASSETS_ROUTE)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[derive(Debug, Clone)]
enum OriginRule {
    Exact(String),
    Pattern(Regex),
    /// 无法编译的正则，永远不匹配
    Invalid,
}

impl OriginRule {
    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginRule::Exact(expected) => expected == origin,
            OriginRule::Pattern(regex) => regex.is_match(origin),
            OriginRule::Invalid => false,
        }
    }
}

/// Origin 匹配器
#[derive(Debug, Clone)]
pub struct OriginMatcher {
    allow_all: bool,
    rules: Vec<OriginRule>,
}

impl OriginMatcher {
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut allow_all = entries.is_empty();
        let mut rules = Vec::with_capacity(entries.len());

        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if entry == WILDCARD {
                allow_all = true;
                continue;
            }
            rules.push(parse_rule(entry));
        }

        Self { allow_all, rules }
    }

    pub fn allows_all(&self) -> bool {
        self.allow_all
    }

    /// 按配置顺序匹配，命中第一条即放行
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        if self.allow_all {
            return true;
        }

        match origin {
            Some(origin) => self.rules.iter().any(|rule| rule.matches(origin)),
            None => false,
        }
    }
}

fn parse_rule(entry: &str) -> OriginRule {
    let is_regex = entry.len() >= 2 && entry.starts_with('/') && entry.ends_with('/');
    if !is_regex {
        return OriginRule::Exact(entry.to_string());
    }

    match Regex::new(&entry[1..entry.len() - 1]) {
        Ok(regex) => OriginRule::Pattern(regex),
        Err(e) => {
            tracing::warn!("忽略无效的Origin正则 {}: {}", entry, e);
            OriginRule::Invalid
        }
    }
}

/// 基于匹配器构建CORS层
pub fn cors_layer(matcher: Arc<OriginMatcher>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if matcher.allows_all() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts| matcher.is_allowed(origin.to_str().ok()),
        ))
    }
}

/// 拒绝不在白名单内的请求
pub async fn enforce_origin(
    State(matcher): State<Arc<OriginMatcher>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok());

    if matcher.is_allowed(origin) {
        next.run(request).await
    } else {
        tracing::warn!("拒绝来自未授权Origin的请求: {:?}", origin);
        (StatusCode::FORBIDDEN, ErrorBody::new("Origin not allowed")).into_response()
    }
}
