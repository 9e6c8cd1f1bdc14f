//! MongoDB document source.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::traits::DocumentSource;
use crate::core::{DocValue, Document};
use crate::error::{Result, SyncError};

/// Connection to one MongoDB database.
#[derive(Clone)]
pub struct MongoSource {
    client: Client,
    database: Database,
}

impl MongoSource {
    /// Connect and verify the server answers `ping`.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| SyncError::connection(e, "parsing MongoDB URI"))?;
        let client = Client::with_options(options)
            .map_err(|e| SyncError::connection(e, "creating MongoDB client"))?;
        let database = client.database(&config.database);

        let source = Self { client, database };
        source.ping().await?;

        info!("Connected to MongoDB source: {}", config.database);
        Ok(source)
    }

    pub async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| SyncError::connection(e, "pinging MongoDB"))?;
        Ok(())
    }

    /// Names of every collection in the database, sorted.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let mut names = self.database.list_collection_names(None).await?;
        names.sort();
        Ok(names)
    }

    pub fn collection(&self, name: &str) -> MongoCollection {
        MongoCollection {
            name: name.to_string(),
            inner: self.database.collection::<bson::Document>(name),
        }
    }

    pub async fn close(self) {
        self.client.shutdown().await;
    }
}

/// One collection, read as decoded documents.
pub struct MongoCollection {
    name: String,
    inner: Collection<bson::Document>,
}

impl MongoCollection {
    async fn find(&self, limit: Option<usize>) -> Result<Vec<Document>> {
        let options = FindOptions::builder()
            .limit(limit.map(|n| n as i64))
            .build();
        let cursor = self.inner.find(None, options).await?;
        let raw: Vec<bson::Document> = cursor.try_collect().await?;
        debug!("Read {} documents from {}", raw.len(), self.name);
        Ok(raw.into_iter().map(convert_document).collect())
    }
}

#[async_trait]
impl DocumentSource for MongoCollection {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.inner.count_documents(None, None).await?)
    }

    async fn fetch_all(&self) -> Result<Vec<Document>> {
        self.find(None).await
    }

    async fn fetch_sample(&self, n: usize) -> Result<Vec<Document>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.find(Some(n)).await
    }
}

/// Decode a BSON document, keeping field order.
pub fn convert_document(raw: bson::Document) -> Document {
    raw.into_iter()
        .map(|(name, value)| (name, convert_bson(value)))
        .collect()
}

/// Map a BSON value onto the document value model.
///
/// Object ids, binaries and the exotic BSON types become strings; decimals
/// become numbers when they fit an `f64`.
pub fn convert_bson(value: Bson) -> DocValue {
    match value {
        Bson::Null | Bson::Undefined => DocValue::Null,
        Bson::Boolean(b) => DocValue::Boolean(b),
        Bson::Int32(i) => DocValue::Integer(i64::from(i)),
        Bson::Int64(i) => DocValue::Integer(i),
        Bson::Double(f) => DocValue::Number(f),
        Bson::String(s) | Bson::Symbol(s) => DocValue::String(s),
        Bson::ObjectId(oid) => DocValue::String(oid.to_hex()),
        Bson::DateTime(dt) => Utc
            .timestamp_millis_opt(dt.timestamp_millis())
            .single()
            .map(DocValue::DateTime)
            .unwrap_or(DocValue::Null),
        Bson::Timestamp(ts) => Utc
            .timestamp_opt(i64::from(ts.time), 0)
            .single()
            .map(DocValue::DateTime)
            .unwrap_or(DocValue::Null),
        Bson::Decimal128(d) => {
            let text = d.to_string();
            match text.parse::<f64>() {
                Ok(f) if f.is_finite() => DocValue::Number(f),
                _ => DocValue::String(text),
            }
        }
        Bson::Binary(bin) => DocValue::String(hex::encode(bin.bytes)),
        Bson::Array(items) => DocValue::Array(items.into_iter().map(convert_bson).collect()),
        Bson::Document(doc) => DocValue::Object(convert_document(doc)),
        Bson::RegularExpression(re) => DocValue::String(format!("/{}/{}", re.pattern, re.options)),
        Bson::JavaScriptCode(code) => DocValue::String(code),
        other => DocValue::String(other.to_string()),
    }
}
