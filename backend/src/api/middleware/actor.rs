//! Acting-identity middleware.
//!
//! Authentication happens upstream; the gateway forwards the numeric id of
//! the authenticated user in `X-Actor-Id`. Only the id is taken from the
//! request. Roles are always looked up through the case-assignment
//! collaborator.

use axum::{
    extract::Request,
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{AppError, Result};
use crate::models::actor::Actor;

/// Header carrying the authenticated actor id
pub static X_ACTOR_ID: HeaderName = HeaderName::from_static("x-actor-id");

/// Extension that holds the acting identity of the request
#[derive(Debug, Clone, Copy)]
pub struct ActorExtension(pub Actor);

/// Header extraction result
#[derive(Debug, PartialEq, Eq)]
enum ExtractedActor {
    Id(i64),
    None,
    Invalid,
}

fn extract_actor(request: &Request) -> ExtractedActor {
    let Some(value) = request.headers().get(&X_ACTOR_ID) else {
        return ExtractedActor::None;
    };
    match value.to_str().ok().map(str::trim).map(str::parse::<i64>) {
        Some(Ok(id)) if id > 0 => ExtractedActor::Id(id),
        _ => ExtractedActor::Invalid,
    }
}

/// Attach the acting identity to the request, rejecting malformed ids.
///
/// A missing header is not rejected here; handlers that need an actor
/// call [`require_actor`].
pub async fn actor_middleware(mut request: Request, next: Next) -> Response {
    match extract_actor(&request) {
        ExtractedActor::Id(id) => {
            request
                .extensions_mut()
                .insert(Some(ActorExtension(Actor::new(id))));
            next.run(request).await
        }
        ExtractedActor::None => {
            request.extensions_mut().insert(None::<ActorExtension>);
            next.run(request).await
        }
        ExtractedActor::Invalid => {
            (StatusCode::UNAUTHORIZED, "Invalid X-Actor-Id header").into_response()
        }
    }
}

/// Unwrap the acting identity or fail with `Unauthenticated`.
pub fn require_actor(actor: Option<ActorExtension>) -> Result<Actor> {
    actor
        .map(|ActorExtension(actor)| actor)
        .ok_or_else(|| AppError::Unauthenticated("X-Actor-Id header required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(value: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header("X-Actor-Id", v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_actor() {
        assert_eq!(extract_actor(&request_with(Some("7"))), ExtractedActor::Id(7));
        assert_eq!(extract_actor(&request_with(Some(" 12 "))), ExtractedActor::Id(12));
        assert_eq!(extract_actor(&request_with(None)), ExtractedActor::None);
        assert_eq!(extract_actor(&request_with(Some("abc"))), ExtractedActor::Invalid);
        assert_eq!(extract_actor(&request_with(Some("-3"))), ExtractedActor::Invalid);
    }

    #[test]
    fn test_require_actor() {
        assert_eq!(
            require_actor(Some(ActorExtension(Actor::new(3)))).unwrap(),
            Actor::new(3)
        );
        assert!(matches!(
            require_actor(None),
            Err(AppError::Unauthenticated(_))
        ));
    }
}
