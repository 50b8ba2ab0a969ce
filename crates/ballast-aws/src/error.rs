//! SDK error classification.
//!
//! Maps AWS SDK failures onto the ballast error taxonomy. Any service
//! error whose code names a missing entity (codes containing "NotFound",
//! e.g. `LoadBalancerNotFound`, `TargetGroupNotFound`, `ListenerNotFound`,
//! `InvalidInstanceID.NotFound`) becomes `BallastError::NotFound`;
//! everything else, including dispatch and timeout failures, becomes
//! `BallastError::Api`.

use aws_sdk_elasticloadbalancingv2::error::{ProvideErrorMetadata, SdkError};

use ballast_core::BallastError;

/// Classify an SDK failure under a short operation context string.
pub(crate) fn classify<E>(context: &str, err: &SdkError<E>) -> BallastError
where
    E: ProvideErrorMetadata,
{
    match err.code() {
        Some(code) => classify_parts(context, code, err.message()),
        // No error code means the request never produced a service
        // response (connection failure, client-side timeout).
        None => BallastError::Api(format!("{context}: {err}")),
    }
}

fn classify_parts(context: &str, code: &str, message: Option<&str>) -> BallastError {
    let message = message.unwrap_or("no details");
    if code.contains("NotFound") {
        BallastError::NotFound(format!("{context}: {code}: {message}"))
    } else {
        BallastError::Api(format!("{context}: {code}: {message}"))
    }
}
