use futures::Future;
use hyper::{Body, Request, Response};
use metrics::{counter, describe_counter};
use std::{error::Error, pin::Pin};
use tower::{Layer, Service};

const HTTP_REQUEST: &str = "conduit_http_request";
const HTTP_RESPONSE: &str = "conduit_http_response";
const HTTP_REQUEST_FAILED: &str = "conduit_http_request_failed";

/// Counts HTTP requests by method and responses by status code.
#[derive(Clone, Debug, Default)]
pub struct HttpMetricsLayer;

impl HttpMetricsLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for HttpMetricsLayer {
    type Service = HttpMetricService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpMetricService { inner }
    }
}

#[derive(Clone, Debug)]
pub struct HttpMetricService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for HttpMetricService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Error: Into<Box<dyn Error + Send + Sync>> + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        // take the service that was ready
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let fut = async move {
            let method = req.method().to_string();

            counter!(HTTP_REQUEST, "method" => method.clone()).increment(1);
            match inner.call(req).await {
                Ok(response) => {
                    counter!(HTTP_RESPONSE, "status" => response.status().as_u16().to_string())
                        .increment(1);
                    Ok(response)
                }
                Err(e) => {
                    counter!(HTTP_REQUEST_FAILED, "method" => method).increment(1);
                    Err(e)
                }
            }
        };
        Box::pin(fut)
    }
}

pub fn describe_http_metrics() {
    describe_counter!(HTTP_REQUEST, "The number of http requests received so far");
    describe_counter!(HTTP_RESPONSE, "The number of http responses by status code");
    describe_counter!(HTTP_REQUEST_FAILED, "The number of http requests the service failed");
}
