use metrics::{counter, describe_counter};

const RPC_CALL: &str = "conduit_rpc_call";
const RPC_CALL_FAILED: &str = "conduit_rpc_call_failed";
const AUTH_REJECTED: &str = "conduit_auth_rejected";

/// Record a dispatched method call and, for failures, its error code.
pub fn record_rpc_call(method: &str, error_code: Option<i32>) {
    counter!(RPC_CALL, "method" => method.to_string()).increment(1);
    if let Some(code) = error_code {
        counter!(RPC_CALL_FAILED, "method" => method.to_string(), "code" => code.to_string())
            .increment(1);
    }
}

/// Record a request turned away by the bearer token gate.
pub fn record_auth_rejection(reason: &'static str) {
    counter!(AUTH_REJECTED, "reason" => reason).increment(1);
}

pub fn describe_json_rpc_metrics() {
    describe_counter!(RPC_CALL, "The number of json rpc calls dispatched so far");
    describe_counter!(RPC_CALL_FAILED, "The number of failed json rpc calls so far");
    describe_counter!(AUTH_REJECTED, "The number of requests rejected by the jwt gate");
    counter!(RPC_CALL).absolute(0);
    counter!(RPC_CALL_FAILED).absolute(0);
    counter!(AUTH_REJECTED).absolute(0);
}
