//! GraphQL transport seam.
//!
//! The client never speaks HTTP itself. It hands an operation name and JSON
//! variables to a [`GraphqlTransport`] and receives the operation's `data`
//! object back, or a [`TransportError`] describing what went wrong.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EmailError, Result};

/// One entry of a GraphQL `errors` array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlError {
    /// Machine-readable error type, e.g. `sudoplatform.email.AddressNotFound`.
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Failure reported by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("graphql errors: {0:?}")]
    Graphql(Vec<GraphqlError>),

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("transport: {0}")]
    Other(String),
}

/// Query/mutate primitives against the email service API.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    async fn query(&self, operation: &str, variables: Value) -> std::result::Result<Value, TransportError>;
    async fn mutate(&self, operation: &str, variables: Value) -> std::result::Result<Value, TransportError>;
}

/// Run a query and decode the field named after the operation.
pub(crate) async fn query<R: DeserializeOwned>(
    transport: &dyn GraphqlTransport,
    operation: &str,
    variables: Value,
) -> Result<R> {
    tracing::trace!(operation, "graphql query");
    let data = transport.query(operation, variables).await?;
    decode(operation, data)
}

/// Run a mutation and decode the field named after the operation.
pub(crate) async fn mutate<R: DeserializeOwned>(
    transport: &dyn GraphqlTransport,
    operation: &str,
    variables: Value,
) -> Result<R> {
    tracing::trace!(operation, "graphql mutation");
    let data = transport.mutate(operation, variables).await?;
    decode(operation, data)
}

/// Like [`query`], for operations whose result may be null (lookups by id).
pub(crate) async fn query_optional<R: DeserializeOwned>(
    transport: &dyn GraphqlTransport,
    operation: &str,
    variables: Value,
) -> Result<Option<R>> {
    tracing::trace!(operation, "graphql query");
    let data = transport.query(operation, variables).await?;
    decode_optional(operation, data)
}

pub(crate) async fn mutate_optional<R: DeserializeOwned>(
    transport: &dyn GraphqlTransport,
    operation: &str,
    variables: Value,
) -> Result<Option<R>> {
    tracing::trace!(operation, "graphql mutation");
    let data = transport.mutate(operation, variables).await?;
    decode_optional(operation, data)
}

fn decode<R: DeserializeOwned>(operation: &str, data: Value) -> Result<R> {
    decode_optional(operation, data)?
        .ok_or_else(|| EmailError::failed(format!("{}: no data returned", operation)))
}

fn decode_optional<R: DeserializeOwned>(operation: &str, mut data: Value) -> Result<Option<R>> {
    let field = match data.get_mut(operation) {
        Some(v) if !v.is_null() => v.take(),
        _ => return Ok(None),
    };
    serde_json::from_value(field)
        .map(Some)
        .map_err(|e| EmailError::failed(format!("{}: unexpected response shape: {}", operation, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_picks_operation_field() {
        let data = json!({ "getThing": { "id": "a" } });
        let v: Value = decode("getThing", data).unwrap();
        assert_eq!(v["id"], "a");
    }

    #[test]
    fn decode_null_is_failed() {
        let err = decode::<Value>("getThing", json!({ "getThing": null })).unwrap_err();
        assert!(matches!(err, EmailError::Failed(_)));
        let err = decode::<Value>("getThing", json!({})).unwrap_err();
        assert!(matches!(err, EmailError::Failed(_)));
    }

    #[test]
    fn decode_optional_null_is_none() {
        let v = decode_optional::<Value>("getThing", json!({ "getThing": null })).unwrap();
        assert!(v.is_none());
        let err = decode_optional::<String>("getThing", json!({ "getThing": 5 })).unwrap_err();
        assert!(matches!(err, EmailError::Failed(_)));
    }

    #[test]
    fn graphql_error_deserializes_camel_case() {
        let e: GraphqlError =
            serde_json::from_value(json!({ "errorType": "sudoplatform.email.AddressNotFound", "message": "m" }))
                .unwrap();
        assert_eq!(e.error_type.as_deref(), Some("sudoplatform.email.AddressNotFound"));
    }
}
