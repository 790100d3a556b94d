use crate::auth::{check_jwt_secret, JwtValidator};
use hyper::{Body, Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::{error::Error, task::Context};
use tower::{Layer, Service};

/// The bearer token layer for the [json rpc server](crate::JsonRpcServer)
#[derive(Clone, Debug)]
pub struct JwtAuthLayer {
    /// Checks the token of every request
    validator: Arc<JwtValidator>,
}

impl JwtAuthLayer {
    /// Create a new jwt layer
    ///
    /// # Arguments
    /// * `validator: JwtValidator` - The validator holding the shared secret
    ///
    /// # Returns
    /// * `Self` - A JwtAuthLayer instance
    pub fn new(validator: JwtValidator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }
}

impl<S> Layer<S> for JwtAuthLayer {
    type Service = JwtAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuth {
            inner,
            validator: self.validator.clone(),
        }
    }
}

/// Forwards authenticated requests to the inner service and answers the rest with 403.
#[derive(Debug, Clone)]
pub struct JwtAuth<S> {
    /// The inner service
    inner: S,
    validator: Arc<JwtValidator>,
}

impl<S> Service<Request<Body>> for JwtAuth<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Response: 'static,
    S::Error: Into<Box<dyn Error + Send + Sync>> + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = Box<dyn Error + Send + Sync + 'static>;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if let Err(response) = check_jwt_secret(req.headers(), &self.validator) {
            return Box::pin(async move { Ok(response) });
        }

        let clone = self.inner.clone();
        // take the service that was ready
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await.map_err(Into::into) })
    }
}
