use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{RetryError, RetryPolicy};
use pantry_core::models::{FoodItem, FoodItemUpdate, NewFoodItem, Recipe};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server refused the request for a business reason (HTTP 400).
    #[error("{0}")]
    BusinessRule(String),

    #[error("{message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("failed to reach the pantry server")]
    Request(#[from] reqwest::Error),

    #[error("pantry server returned an unreadable response")]
    Decode(#[source] reqwest::Error),
}

impl ClientError {
    /// Transport failures, server errors and rate limiting may succeed on a
    /// later attempt; everything else is final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::BusinessRule(_)
            | Self::Validation { .. }
            | Self::NotFound(_)
            | Self::Decode(_) => false,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    fields: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
struct SaveRecipeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    content: &'a str,
}

/// HTTP client for the pantry API.
pub struct PantryClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PantryClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("pantry/{} (cli)", env!("CARGO_PKG_VERSION")))
            // Generation waits on the upstream model.
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/api{path}", self.base_url));
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Response, ClientError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let (message, fields) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.fields),
            Err(_) if !text.trim().is_empty() => (text.trim().to_string(), BTreeMap::new()),
            Err(_) => (
                status.canonical_reason().unwrap_or("request failed").to_string(),
                BTreeMap::new(),
            ),
        };

        Err(match status {
            StatusCode::BAD_REQUEST => ClientError::BusinessRule(message),
            StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation { message, fields },
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            _ => ClientError::Status { status, message },
        })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let resp = Self::send(builder).await?;
        resp.json().await.map_err(|e| {
            if e.is_decode() {
                ClientError::Decode(e)
            } else {
                ClientError::Request(e)
            }
        })
    }

    // --- Food items ---

    pub async fn list_food_items(&self) -> Result<Vec<FoodItem>, ClientError> {
        Self::send_json(self.request(Method::GET, "/food-items")).await
    }

    pub async fn get_food_item(&self, id: i64) -> Result<FoodItem, ClientError> {
        Self::send_json(self.request(Method::GET, &format!("/food-items/{id}"))).await
    }

    pub async fn create_food_item(&self, item: &NewFoodItem) -> Result<FoodItem, ClientError> {
        Self::send_json(self.request(Method::POST, "/food-items").json(item)).await
    }

    pub async fn update_food_item(
        &self,
        id: i64,
        update: &FoodItemUpdate,
    ) -> Result<FoodItem, ClientError> {
        Self::send_json(
            self.request(Method::PUT, &format!("/food-items/{id}"))
                .json(update),
        )
        .await
    }

    pub async fn delete_food_item(&self, id: i64) -> Result<(), ClientError> {
        Self::send(self.request(Method::DELETE, &format!("/food-items/{id}"))).await?;
        Ok(())
    }

    // --- Recipes ---

    /// Ask the server for a fresh recipe. Nothing is stored.
    pub async fn generate_recipe(&self) -> Result<String, ClientError> {
        let resp = Self::send(self.request(Method::GET, "/recipes/generate")).await?;
        Ok(resp.text().await?)
    }

    pub async fn generate_recipe_with_retry<N>(
        &self,
        policy: &RetryPolicy,
        on_retry: N,
    ) -> Result<String, RetryError<ClientError>>
    where
        N: FnMut(u32, &ClientError, Duration),
    {
        policy
            .run(|| self.generate_recipe(), ClientError::is_retryable, on_retry)
            .await
    }

    pub async fn list_recipes(&self) -> Result<Vec<Recipe>, ClientError> {
        Self::send_json(self.request(Method::GET, "/recipes")).await
    }

    pub async fn get_recipe(&self, id: i64) -> Result<Recipe, ClientError> {
        Self::send_json(self.request(Method::GET, &format!("/recipes/{id}"))).await
    }

    pub async fn save_recipe(
        &self,
        title: Option<&str>,
        content: &str,
    ) -> Result<Recipe, ClientError> {
        let body = SaveRecipeRequest { title, content };
        Self::send_json(self.request(Method::POST, "/recipes").json(&body)).await
    }

    pub async fn delete_recipe(&self, id: i64) -> Result<(), ClientError> {
        Self::send(self.request(Method::DELETE, &format!("/recipes/{id}"))).await?;
        Ok(())
    }
}
