use async_trait::async_trait;
use futures_util::stream::StreamExt;
use mongodb::bson::{self, Bson};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::Client;

use super::{DocumentSource, DocumentStream};
use crate::error::{Result, SyncError};
use crate::value::{DocValue, Document};

/// Live MongoDB source; documents arrive in natural order.
#[derive(Debug, Clone)]
pub struct MongoSource {
    client: Client,
    database: String,
}

impl MongoSource {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|e| SyncError::Source(format!("Failed to parse MongoDB connection string: {}", e)))?;
        let client = Client::with_options(options)
            .map_err(|e| SyncError::Source(format!("Failed to create MongoDB client: {}", e)))?;
        log::info!("Connected to MongoDB database {}", database);
        Ok(Self {
            client,
            database: database.to_string(),
        })
    }
}

fn convert_bson(value: Bson) -> DocValue {
    match value {
        Bson::ObjectId(oid) => DocValue::ObjectId(oid.to_hex()),
        Bson::String(s) => DocValue::String(s),
        Bson::Int32(i) => DocValue::Integer(i as i64),
        Bson::Int64(i) => DocValue::Integer(i),
        Bson::Double(d) => DocValue::Double(d),
        Bson::Decimal128(d) => d
            .to_string()
            .parse::<f64>()
            .map(DocValue::Double)
            .unwrap_or_else(|_| DocValue::String(d.to_string())),
        Bson::Boolean(b) => DocValue::Boolean(b),
        Bson::DateTime(dt) => chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
            .map(|ts| DocValue::Timestamp(ts.naive_utc()))
            .unwrap_or(DocValue::Absent),
        Bson::Array(items) => DocValue::Array(items.into_iter().map(convert_bson).collect()),
        Bson::Document(doc) => DocValue::Object(convert_document(doc)),
        Bson::Null | Bson::Undefined => DocValue::Absent,
        other => DocValue::String(other.to_string()),
    }
}

fn convert_document(doc: bson::Document) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        out.insert(key, convert_bson(value));
    }
    out
}

#[async_trait]
impl DocumentSource for MongoSource {
    async fn documents(&self, collection: &str, limit: Option<usize>) -> Result<DocumentStream> {
        let coll = self
            .client
            .database(&self.database)
            .collection::<bson::Document>(collection);

        let mut find_options = FindOptions::default();
        find_options.limit = limit.map(|n| n as i64);

        let cursor = coll
            .find(bson::doc! {})
            .with_options(find_options)
            .await
            .map_err(|e| SyncError::Source(format!("Failed to query collection '{}': {}", collection, e)))?;

        let name = collection.to_string();
        Ok(cursor
            .map(move |item| {
                item.map(convert_document).map_err(|e| {
                    SyncError::Source(format!("Failed to read document from '{}': {}", name, e))
                })
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn test_convert_scalars() {
        let oid = ObjectId::new();
        assert_eq!(convert_bson(Bson::ObjectId(oid)), DocValue::ObjectId(oid.to_hex()));
        assert_eq!(convert_bson(Bson::Int32(7)), DocValue::Integer(7));
        assert_eq!(convert_bson(Bson::Null), DocValue::Absent);
        assert_eq!(convert_bson(Bson::Boolean(true)), DocValue::Boolean(true));
    }

    #[test]
    fn test_convert_nested_document() {
        let doc = bson::doc! { "a": { "b": [1_i64, "x"] } };
        let converted = convert_document(doc);
        match converted.get("a") {
            DocValue::Object(inner) => assert_eq!(
                inner.get("b"),
                &DocValue::Array(vec![DocValue::Integer(1), DocValue::String("x".into())])
            ),
            other => panic!("unexpected {:?}", other),
        }
    }
}
