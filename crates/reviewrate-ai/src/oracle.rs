//! The rating oracle contract.

use async_trait::async_trait;
use reviewrate_core::{Verdict, WorkItem};

use crate::OracleError;

/// Everything the oracle needs to rate one (review, property) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingRequest {
    pub product_line: String,
    pub title: String,
    pub body: String,
    /// Property name as shown to the model (localized when available).
    pub property_name: String,
    pub property_type: String,
}

impl RatingRequest {
    pub fn for_item(item: &WorkItem, product_line: &str) -> Self {
        Self {
            product_line: product_line.to_string(),
            title: item.title.clone(),
            body: item.body.clone(),
            property_name: item.prompt_property_name().to_string(),
            property_type: item.property_type.clone(),
        }
    }
}

/// External rating service.
///
/// Calls are independent: implementations must not share mutable per-call
/// state, since the dispatcher issues them concurrently.
#[async_trait]
pub trait RatingOracle: Send + Sync {
    /// Model identifier recorded when a response does not name one.
    fn model(&self) -> &str;

    /// Liveness check run once before any partition is processed.
    async fn probe(&self) -> Result<(), OracleError>;

    async fn rate(&self, request: &RatingRequest) -> Result<Verdict, OracleError>;
}

/// A client that reports failures as plain text.
#[async_trait]
pub trait UntypedOracle: Send + Sync {
    fn model(&self) -> &str;

    async fn probe(&self) -> Result<(), String>;

    /// Raw answer text.
    async fn rate_raw(&self, request: &RatingRequest) -> Result<String, String>;
}

/// Adapts an [`UntypedOracle`] to [`RatingOracle`] by classifying its error
/// text with [`OracleError::from_message`].
pub struct TypedOracle<C>(pub C);

#[async_trait]
impl<C: UntypedOracle> RatingOracle for TypedOracle<C> {
    fn model(&self) -> &str {
        self.0.model()
    }

    async fn probe(&self) -> Result<(), OracleError> {
        self.0.probe().await.map_err(OracleError::from_message)
    }

    async fn rate(&self, request: &RatingRequest) -> Result<Verdict, OracleError> {
        let text = self
            .0
            .rate_raw(request)
            .await
            .map_err(OracleError::from_message)?;
        Ok(Verdict::new(text, self.0.model()))
    }
}
