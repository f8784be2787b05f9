use std::collections::HashSet;

use tracing::{debug, instrument};
use wasp_core::{SystemInfo, ViewConfig};

use crate::error::ErrorContext;
use crate::{Error, Record, Target, Value, WaspClient, read_json, ready};

/// View shown when none is named.
pub const DEFAULT_VIEW: &str = "default";

impl WaspClient {
    // =========================================================================
    // Collection Schema
    // =========================================================================

    /// Tag schema of `collection`: key, mandatory and default settings per tag.
    #[instrument(skip(self))]
    pub async fn get_system_info(&self, collection: &str) -> Result<SystemInfo, Error> {
        let document = self
            .get_document(
                &["system", "tools", collection, "tags_object"],
                &format!("system info of {collection}"),
            )
            .await?;
        Ok(SystemInfo::from_json(document)?)
    }

    /// Column layout of a view of `collection`. See [`DEFAULT_VIEW`].
    #[instrument(skip(self))]
    pub async fn get_view_info(&self, collection: &str, view: &str) -> Result<ViewConfig, Error> {
        let document = self
            .get_document(
                &["system", "view_config", collection, view],
                &format!("view {view} of {collection}"),
            )
            .await?;
        Ok(ViewConfig::from_json(document)?)
    }

    /// Distinct values of `tag` across the records of `collection`, in the
    /// order the server first reports them.
    #[instrument(skip(self))]
    pub async fn get_tag_values(&self, collection: &str, tag: &str) -> Result<Vec<Value>, Error> {
        let response = self
            .send(
                Target::Read,
                &["tools", collection, "tags", tag, "values"],
                self.retry.rounds(),
                |url| ready(self.client.get(url)),
            )
            .await?;
        let values = match self.read_value(response, ErrorContext::Read).await? {
            Value::List(values) => values,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        let mut seen = HashSet::new();
        let mut distinct = Vec::with_capacity(values.len());
        for value in values {
            let key = serde_json::to_string(&value)
                .map_err(|e| Error::Deserialization(e.to_string()))?;
            if seen.insert(key) {
                distinct.push(value);
            }
        }
        debug!(count = distinct.len(), "tag values");
        Ok(distinct)
    }

    /// Check `record` against the mandatory tags of `collection` without
    /// uploading it.
    ///
    /// Fails with [`Error::Validation`] naming the missing tags.
    #[instrument(skip(self, record))]
    pub async fn validate_record(&self, collection: &str, record: &Record) -> Result<(), Error> {
        let info = self.get_system_info(collection).await?;
        info.check_mandatory(record.tags())?;
        Ok(())
    }

    async fn get_document(&self, segments: &[&str], what: &str) -> Result<serde_json::Value, Error> {
        let response = self
            .send(Target::Read, segments, self.retry.rounds(), |url| {
                ready(self.client.get(url))
            })
            .await?;
        match read_json(response, ErrorContext::Read).await? {
            serde_json::Value::Null => Err(Error::NotFound(what.to_string())),
            document => Ok(document),
        }
    }
}
