use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use mongodb::Client;
use tracing::debug;

use super::{DocumentSource, SourceError};

/// A MongoDB collection, reached through a fresh client per find.
#[derive(Debug, Clone)]
pub struct MongoSource {
    uri: String,
    database: String,
    collection: String,
}

impl MongoSource {
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl DocumentSource for MongoSource {
    async fn find(&self, projection: &Document) -> Result<Vec<Document>, SourceError> {
        let client = Client::with_uri_str(&self.uri)
            .await
            .map_err(SourceError::connect)?;

        debug!(
            database = %self.database,
            collection = %self.collection,
            %projection,
            "querying mongodb"
        );
        let result = find_all(&client, &self.database, &self.collection, projection).await;

        client.shutdown().await;
        result
    }
}

async fn find_all(
    client: &Client,
    database: &str,
    collection: &str,
    projection: &Document,
) -> Result<Vec<Document>, SourceError> {
    let collection = client
        .database(database)
        .collection::<Document>(collection);

    let cursor = collection
        .find(Document::new())
        .projection(projection.clone())
        .await
        .map_err(SourceError::query)?;

    cursor.try_collect().await.map_err(SourceError::query)
}
