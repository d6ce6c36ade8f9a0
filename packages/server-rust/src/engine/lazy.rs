//! The value a custom handler hands back to its operation.

use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::service::operation::OperationError;

/// Deferred result of a handler.
///
/// `Q` is what the operation's default executor consumes: a concrete query
/// for most operations, the update target for `update`, the entity fields
/// for `create`.
#[derive(Debug, Clone)]
pub enum LazyResult<Q> {
    /// Run the default executor on `Q` and return its output.
    Query(Q),
    /// Run the default executor, then merge `extra` over its output.
    /// Fields of `extra` win on conflict.
    Augmented { query: Q, extra: Map<String, Value> },
    /// Final response; default execution is skipped.
    Custom(Value),
}

impl<Q> LazyResult<Q> {
    /// Resolves the result, calling `execute` for the two query variants.
    ///
    /// # Errors
    ///
    /// Returns the executor's error, or `Internal` when its output does not
    /// serialize.
    pub async fn resolve<F, Fut, O>(self, execute: F) -> Result<Value, OperationError>
    where
        F: FnOnce(Q) -> Fut,
        Fut: Future<Output = Result<O, OperationError>>,
        O: Serialize,
    {
        match self {
            Self::Query(query) => Ok(serde_json::to_value(execute(query).await?)
                .map_err(anyhow::Error::from)?),
            Self::Augmented { query, extra } => {
                let output = serde_json::to_value(execute(query).await?).map_err(anyhow::Error::from)?;
                Ok(merge(output, extra))
            }
            Self::Custom(value) => Ok(value),
        }
    }
}

/// Shallow merge. A non-object output is replaced by `extra` wholesale.
fn merge(output: Value, extra: Map<String, Value>) -> Value {
    match output {
        Value::Object(mut fields) => {
            fields.extend(extra);
            Value::Object(fields)
        }
        _ => Value::Object(extra),
    }
}

#[cfg(test)]
mod tests {
    use crudkit_core::CountOutput;
    use serde_json::json;

    use super::*;
    use crate::service::operation::CrudError;

    async fn count_of(n: u64) -> Result<CountOutput, OperationError> {
        Ok(CountOutput { count: n })
    }

    #[tokio::test]
    async fn query_runs_the_executor() {
        let value = LazyResult::Query(3).resolve(count_of).await.unwrap();
        assert_eq!(value, json!({"count": 3}));
    }

    #[tokio::test]
    async fn augmented_merges_extra_over_output() {
        let extra = json!({"count": 99, "page": 2});
        let lazy = LazyResult::Augmented {
            query: 3,
            extra: extra.as_object().cloned().unwrap(),
        };

        let value = lazy.resolve(count_of).await.unwrap();
        assert_eq!(value, json!({"count": 99, "page": 2}));
    }

    #[tokio::test]
    async fn custom_skips_the_executor() {
        let lazy: LazyResult<u64> = LazyResult::Custom(json!(["verbatim"]));

        let value = lazy
            .resolve(|_| async { Err::<CountOutput, _>(CrudError::validation("unreachable").into()) })
            .await
            .unwrap();
        assert_eq!(value, json!(["verbatim"]));
    }

    #[tokio::test]
    async fn executor_errors_propagate() {
        let lazy = LazyResult::Augmented {
            query: 1,
            extra: Map::new(),
        };

        let err = lazy
            .resolve(|_| async { Err::<CountOutput, _>(CrudError::validation("nope").into()) })
            .await
            .unwrap_err();
        assert!(err.kind().is_some());
    }
}
