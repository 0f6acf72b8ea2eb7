//! Request extractors

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};

use crate::errors::OrchestratorError;

/// `Json` body whose rejection is reported as a validation error
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = OrchestratorError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
