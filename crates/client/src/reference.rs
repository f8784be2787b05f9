use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use wasp_core::ReferenceEntry;

use crate::{Error, Record, RecordSpec, WaspClient};

/// A link from one record to another, possibly in a different collection.
///
/// Only the identifier/collection pair is ever sent to the service. The
/// referenced body is fetched on the first [`get_record`](Self::get_record)
/// call and cached for the lifetime of this value and its clones.
#[derive(Clone)]
pub struct ReferenceValue {
    entry: ReferenceEntry,
    client: Option<WaspClient>,
    record: Arc<OnceCell<Record>>,
}

impl ReferenceValue {
    /// Reference by identifier. Resolution needs a client, see [`with_client`](Self::with_client).
    pub fn new(id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            entry: ReferenceEntry::new(collection, id),
            client: None,
            record: Arc::new(OnceCell::new()),
        }
    }

    /// Reference to an already fetched record, which becomes the cached body.
    pub fn from_record(record: Record, collection: impl Into<String>) -> Result<Self, Error> {
        let id = WaspClient::get_record_id(&record)?.to_string();
        Ok(Self {
            entry: ReferenceEntry::new(collection, id),
            client: None,
            record: Arc::new(OnceCell::new_with(Some(record))),
        })
    }

    /// Bind a client used to resolve the reference.
    #[must_use]
    pub fn with_client(mut self, client: WaspClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn collection(&self) -> &str {
        &self.entry.collection
    }

    /// The identifier/collection pair, without fetching anything.
    pub fn get_entry(&self) -> &ReferenceEntry {
        &self.entry
    }

    /// The referenced record, fetched on first use.
    pub async fn get_record(&self) -> Result<&Record, Error> {
        self.record
            .get_or_try_init(|| async {
                let client = self.client.as_ref().ok_or_else(|| {
                    Error::Configuration(format!(
                        "reference to {}/{} has no client to resolve it",
                        self.entry.collection, self.entry.id
                    ))
                })?;
                client
                    .find_records(
                        &self.entry.collection,
                        &RecordSpec::Id(self.entry.id.clone()),
                        true,
                    )
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        Error::NotFound(format!(
                            "record {} in {}",
                            self.entry.id, self.entry.collection
                        ))
                    })
            })
            .await
    }

    /// The cached body, if it has been fetched or supplied.
    pub fn cached_record(&self) -> Option<&Record> {
        self.record.get()
    }
}

impl PartialEq for ReferenceValue {
    fn eq(&self, other: &Self) -> bool {
        self.entry == other.entry
    }
}

impl fmt::Debug for ReferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceValue")
            .field("collection", &self.entry.collection)
            .field("id", &self.entry.id)
            .finish()
    }
}
