use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prism_core::RequestContext;

/// Header names the caller identity is read from
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    pub client: String,
    pub group: Option<String>,
}

/// Middleware that builds the `RequestContext` handlers receive
///
/// Reads the caller id, group and BYOK key from the request headers and
/// stores the context as a request extension.
pub async fn request_context_middleware(headers: Arc<IdentityHeaders>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let context = RequestContext::from_headers(parts.headers.clone(), &headers.client, headers.group.as_deref());

    if let Some(ref identity) = context.client_identity {
        tracing::trace!(client_id = %identity.client_id, group = ?identity.group, "caller identified");
    }

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    next.run(request).await
}
