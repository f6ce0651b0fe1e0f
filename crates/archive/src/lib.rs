use codeguard_contracts::{CODE_KEY, REPORT_KEY, TIMESTAMP_KEY};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::{Client, Collection};

const DATABASE_NAME: &str = "codeguard_db";
const COLLECTION_NAME: &str = "audits";

#[derive(Debug)]
pub enum ArchiveError {
    /// No connection string was configured. A steady operating mode, not a
    /// runtime failure.
    Unavailable,
    Write(mongodb::error::Error),
    Read(mongodb::error::Error),
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::Unavailable => write!(f, "audit archive is not configured"),
            ArchiveError::Write(err) => write!(f, "archive write failed: {}", err),
            ArchiveError::Read(err) => write!(f, "archive read failed: {}", err),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Adapter over the audit document store.
///
/// Constructed once at startup and cloned into request handlers. Documents
/// are created exactly once on submit, never updated and never deleted;
/// reads are a bounded newest-first projection.
#[derive(Clone)]
pub struct ArchiveStore {
    collection: Option<Collection<Document>>,
}

impl ArchiveStore {
    /// Configures the store from an optional connection string. `None` means
    /// permanent offline mode; a rejected URI degrades to offline mode as
    /// well rather than failing startup.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else {
            return Self::offline();
        };

        match Client::with_uri_str(url).await {
            Ok(client) => {
                let collection = client
                    .database(DATABASE_NAME)
                    .collection::<Document>(COLLECTION_NAME);
                Self {
                    collection: Some(collection),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "archive.init_failed; continuing offline");
                Self::offline()
            }
        }
    }

    pub fn offline() -> Self {
        Self { collection: None }
    }

    pub fn is_offline(&self) -> bool {
        self.collection.is_none()
    }

    /// Writes one audit document under the canonical keys with the current
    /// UTC timestamp. The store assigns `_id`.
    pub async fn insert(&self, code: &str, report: &str) -> Result<(), ArchiveError> {
        let Some(collection) = &self.collection else {
            return Err(ArchiveError::Unavailable);
        };

        let entry = doc! {
            CODE_KEY: code,
            REPORT_KEY: report,
            TIMESTAMP_KEY: DateTime::now(),
        };

        collection
            .insert_one(entry)
            .await
            .map_err(ArchiveError::Write)?;

        Ok(())
    }

    /// Returns up to `limit` raw documents sorted by timestamp descending.
    /// Documents lacking a timestamp sort as oldest. No shape is enforced
    /// here; normalization happens at the read boundary.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Document>, ArchiveError> {
        let Some(collection) = &self.collection else {
            return Err(ArchiveError::Unavailable);
        };

        let cursor = collection
            .find(doc! {})
            .sort(doc! { TIMESTAMP_KEY: -1 })
            .limit(limit)
            .await
            .map_err(ArchiveError::Read)?;

        cursor.try_collect().await.map_err(ArchiveError::Read)
    }
}
