use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;
use crate::models::{Actor, Role};

pub const ACTOR_ID: &str = "x-actor-id";
pub const ACTOR_NAME: &str = "x-actor-name";
pub const ACTOR_ROLE: &str = "x-actor-role";
pub const ACTOR_PROJECTS: &str = "x-actor-projects";
pub const ACTOR_VENDOR: &str = "x-actor-vendor";

/// 当前操作者 (由上游会话网关写入请求头)
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID)
            .ok_or_else(|| ApiError::MissingActor(format!("missing {} header", ACTOR_ID)))?;
        let role: Role = header(parts, ACTOR_ROLE)
            .ok_or_else(|| ApiError::MissingActor(format!("missing {} header", ACTOR_ROLE)))?
            .parse()
            .map_err(ApiError::MissingActor)?;
        let name = header(parts, ACTOR_NAME).unwrap_or(id);

        let mut actor = Actor::new(id, name, role);
        if let Some(projects) = header(parts, ACTOR_PROJECTS) {
            actor = actor.with_projects(
                projects
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty()),
            );
        }
        if let Some(vendor) = header(parts, ACTOR_VENDOR) {
            actor = actor.with_vendor(vendor);
        }
        Ok(CurrentActor(actor))
    }
}
