//! MongoDB document store.
//!
//! Connects to the load balancer endpoint in front of the replica set. The
//! driver handles member discovery and failover; this type only sees a single
//! logical deployment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, Bson, Document, doc, oid::ObjectId};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::DocumentStore;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{NewProduct, ProductId, StoredProduct};

/// On-disk shape of a product document.
#[derive(Debug, Serialize, Deserialize)]
struct ProductDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: bson::DateTime,
}

impl ProductDocument {
    fn from_new(product: &NewProduct) -> Self {
        Self {
            id: None,
            name: product.name.clone(),
            price: product.price,
            description: product.description.clone(),
            created_at: bson::DateTime::from_millis(product.created_at.timestamp_millis()),
        }
    }

    fn into_stored(self) -> Option<StoredProduct> {
        let id = self.id?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at.timestamp_millis())?;

        Some(StoredProduct {
            id: ProductId::new(id.to_hex()),
            name: self.name,
            price: self.price,
            description: self.description,
            created_at,
        })
    }
}

pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connect and ping the deployment, both bounded by the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionFailed` if the URI is invalid, the
    /// deployment cannot be reached, or the ping does not complete in time.
    #[instrument(skip(config), fields(database = %config.mongo_database, collection = %config.mongo_collection))]
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let uri = config.connection_uri()?;
        let timeout = config.connect_timeout;

        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Invalid MongoDB URI: {e}")))?;
        options.app_name = Some(config.service_name.clone());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;
        let database = client.database(&config.mongo_database);

        match tokio::time::timeout(timeout, database.run_command(doc! { "ping": 1 })).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(error = %e, "MongoDB ping failed");
                return Err(AppError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                error!(timeout = ?timeout, "MongoDB connection timed out");
                return Err(AppError::ConnectionFailed(format!(
                    "connection not established within {timeout:?}"
                )));
            }
        }

        info!(
            replica_set = %config.mongo_replica_set,
            direct = config.mongo_direct_connection,
            "Connected to MongoDB"
        );

        Ok(Self {
            collection: database.collection(&config.mongo_collection),
        })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert(&self, product: &NewProduct) -> AppResult<ProductId> {
        let document = bson::to_document(&ProductDocument::from_new(product))
            .map_err(|e| AppError::Internal(format!("Failed to encode product: {e}")))?;

        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|e| AppError::StoreError(e.to_string()))?;

        let id = match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };
        Ok(ProductId::new(id))
    }

    async fn find_all(&self) -> AppResult<Vec<StoredProduct>> {
        let mut cursor = self
            .collection
            .find(doc! {})
            .await
            .map_err(|e| AppError::StoreError(e.to_string()))?;

        let mut products = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| AppError::StoreError(e.to_string()))?
        {
            let decoded = cursor
                .deserialize_current()
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    bson::from_document::<ProductDocument>(raw).map_err(|e| e.to_string())
                });

            match decoded.map(ProductDocument::into_stored) {
                Ok(Some(product)) => products.push(product),
                Ok(None) => warn!("Skipping product without a usable id or timestamp"),
                Err(e) => error!(error = %e, "Skipping undecodable product document"),
            }
        }

        Ok(products)
    }

    fn backend(&self) -> &'static str {
        "mongo"
    }
}
