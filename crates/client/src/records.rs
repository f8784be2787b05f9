use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::ErrorContext;
use crate::marshal::{self, FormFields, Outgoing};
use crate::{Error, Record, RecordSpec, Target, Value, WaspClient, expect_success, ready};

impl WaspClient {
    // =========================================================================
    // Record Search
    // =========================================================================

    /// Find records in `collection`.
    ///
    /// With `latest`, only the most recent version of each record is
    /// returned. A search by identifier always returns the latest version
    /// and fails with [`Error::NotFound`] if there is none.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> Result<(), wasp_client::Error> {
    /// use wasp_client::{Record, RecordSpec, WaspClient};
    ///
    /// let client = WaspClient::new("http://localhost:2233")?;
    /// let spec = RecordSpec::Match(Record::new().with("platform", "SKL"));
    /// for record in client.find_records("traces", &spec, true).await? {
    ///     println!("{:?}", record.id());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, spec))]
    pub async fn find_records(
        &self,
        collection: &str,
        spec: &RecordSpec,
        latest: bool,
    ) -> Result<Vec<Record>, Error> {
        let query = match spec {
            RecordSpec::Id(id) => return Ok(vec![self.get_record(collection, id).await?]),
            RecordSpec::Match(partial) => marshal::encode_query(partial),
            RecordSpec::All => Vec::new(),
        };

        let mut segments = vec!["tools", collection, "records"];
        if latest {
            segments.push("latest");
        }
        let response = self
            .send(Target::Read, &segments, self.retry.rounds(), |url| {
                ready(self.client.get(url).query(&query))
            })
            .await?;
        let records = into_records(self.read_value(response, ErrorContext::Read).await?)?;
        debug!(count = records.len(), "records found");
        Ok(records)
    }

    /// Latest version of the record with identifier `id`.
    #[instrument(skip(self))]
    pub async fn get_record(&self, collection: &str, id: &str) -> Result<Record, Error> {
        let response = self
            .send(
                Target::Read,
                &["tools", collection, "records", id],
                self.retry.rounds(),
                |url| ready(self.client.get(url)),
            )
            .await?;
        let value = self.read_value(response, ErrorContext::Read).await?;
        into_record(value, || format!("record {id} in {collection}"))
    }

    /// Every stored version of a record, oldest first.
    ///
    /// Versions are ordered by their `version` tag whatever order the server
    /// answers in; versions without one keep their relative order at the end.
    #[instrument(skip(self))]
    pub async fn get_record_history(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Vec<Record>, Error> {
        let response = self
            .send(
                Target::Read,
                &["tools", collection, "records", id, "history"],
                self.retry.rounds(),
                |url| ready(self.client.get(url)),
            )
            .await?;
        let mut history = into_records(self.read_value(response, ErrorContext::Read).await?)?;
        history.sort_by_key(|record| record.version().map_or((1, 0), |version| (0, version)));
        Ok(history)
    }

    // =========================================================================
    // Record Upload
    // =========================================================================

    /// Store a new record (or a new version of an existing one) in `collection`.
    ///
    /// Server-assigned tags (`_id`, `version`, `date`, ...) are stripped
    /// before upload. File values are uploaded alongside the record body;
    /// references are sent as identifiers only. Returns the stored record as
    /// reported by the server.
    #[instrument(skip(self, record))]
    pub async fn add_record(&self, collection: &str, record: &Record) -> Result<Record, Error> {
        let record = record.without_system_tags();
        let response = self
            .upload_record(Method::POST, &["tools", collection, "records"], &record)
            .await?;
        let value = self.read_value(response, ErrorContext::Create).await?;
        into_record(value, || format!("collection {collection}"))
    }

    /// Update a mutable record in place.
    ///
    /// Tags in `update` are set (system tags are ignored), tags named in
    /// `remove_tags` are deleted. Fails with [`Error::ImmutableRecord`] if the
    /// record has been sealed.
    #[instrument(skip(self, update))]
    pub async fn update_mutable_record(
        &self,
        collection: &str,
        id: &str,
        update: &Record,
        remove_tags: &[&str],
    ) -> Result<Record, Error> {
        let update = update.without_system_tags();
        let remove: Vec<String> = remove_tags.iter().map(ToString::to_string).collect();

        let response = self
            .upload_json(
                Method::PUT,
                &["tools", collection, "records", id, "update"],
                "conduit_update",
                &marshal::encode(&update),
                Some(remove.as_slice()),
            )
            .await?;
        let value = self.read_value(response, ErrorContext::Update).await?;
        into_record(value, || format!("record {id} in {collection}"))
    }

    /// Change metadata tags of a record without creating a new version.
    ///
    /// Every tag in `metadata` must be declared as metadata by the
    /// collection, otherwise the call fails with [`Error::InvalidMetadataKey`].
    #[instrument(skip(self, metadata))]
    pub async fn set_record_metadata(
        &self,
        collection: &str,
        id: &str,
        metadata: &Record,
    ) -> Result<Record, Error> {
        let response = self
            .upload_record(
                Method::PUT,
                &["tools", collection, "records", id, "meta"],
                metadata,
            )
            .await?;
        let value = self.read_value(response, ErrorContext::Metadata).await?;
        into_record(value, || format!("record {id} in {collection}"))
    }

    // =========================================================================
    // Mutability
    // =========================================================================

    /// Seal a record so it can no longer be updated in place.
    ///
    /// Sealing an already sealed record is a no-op that returns it unchanged.
    #[instrument(skip(self))]
    pub async fn set_immutable(&self, collection: &str, id: &str) -> Result<Record, Error> {
        let current = self.get_record(collection, id).await?;
        if !current.is_mutable() {
            debug!("record already immutable");
            return Ok(current);
        }
        self.change_state(collection, id, "set_immutable").await
    }

    /// Reopen a sealed record for in-place updates.
    #[instrument(skip(self))]
    pub async fn set_mutable(&self, collection: &str, id: &str) -> Result<Record, Error> {
        self.get_record(collection, id).await?;
        self.change_state(collection, id, "set_mutable").await
    }

    /// Whether the record accepts in-place updates.
    #[instrument(skip(self))]
    pub async fn is_mutable(&self, collection: &str, id: &str) -> Result<bool, Error> {
        Ok(self.get_record(collection, id).await?.is_mutable())
    }

    /// Empty in-place update on the `set_immutable`/`set_mutable` endpoint.
    async fn change_state(&self, collection: &str, id: &str, state: &str) -> Result<Record, Error> {
        let response = self
            .upload_json(
                Method::PUT,
                &["tools", collection, "records", id, state],
                "conduit_update",
                &marshal::encode(&Record::new()),
                Some(&[]),
            )
            .await?;
        let value = self.read_value(response, ErrorContext::Update).await?;
        into_record(value, || format!("record {id} in {collection}"))
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete a record and its history.
    ///
    /// Returns `false` when the record does not exist.
    #[instrument(skip(self))]
    pub async fn delete_record(&self, collection: &str, id: &str) -> Result<bool, Error> {
        let body = json!({
            "tool": collection,
            "query": {"unique_name": format!("{collection}{id}")},
        });
        let response = self
            .send(
                Target::Read,
                &["utils", "safeDeleteRecords"],
                self.retry.rounds(),
                |url| ready(self.client.post(url).json(&body)),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("no such record");
            return Ok(false);
        }
        expect_success(response, ErrorContext::Update).await?;
        Ok(true)
    }

    // =========================================================================
    // Upload Helpers
    // =========================================================================

    /// Upload `record` as a JSON multipart body.
    ///
    /// Servers that predate JSON uploads answer 404; the record is then sent
    /// once more as flattened form fields.
    async fn upload_record(
        &self,
        method: Method,
        segments: &[&str],
        record: &Record,
    ) -> Result<Response, Error> {
        let response = self
            .upload_json(method.clone(), segments, "conduit_json", &marshal::encode(record), None)
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            return Ok(response);
        }
        debug!("JSON upload rejected, retrying with form fields");
        self.upload_form(method, segments, &marshal::encode_form(record))
            .await
    }

    /// Multipart upload of a JSON body (`body_part`) and its file parts.
    async fn upload_json(
        &self,
        method: Method,
        segments: &[&str],
        body_part: &'static str,
        outgoing: &Outgoing,
        remove: Option<&[String]>,
    ) -> Result<Response, Error> {
        self.send(Target::Upload, segments, self.retry.rounds(), |url| {
            let method = method.clone();
            async move {
                let mut form = Form::new().part(body_part, json_part(&outgoing.body)?);
                for (name, file) in &outgoing.files {
                    form = form.part(name.clone(), file.to_part(name, self.chunk_size).await?);
                }
                if let Some(remove) = remove {
                    form = form.part("conduit_remove", json_part(&json!(remove))?);
                }
                Ok::<RequestBuilder, Error>(self.client.request(method, url).multipart(form))
            }
        })
        .await
    }

    /// Multipart upload of flattened form fields, for servers without JSON upload.
    async fn upload_form(
        &self,
        method: Method,
        segments: &[&str],
        fields: &FormFields,
    ) -> Result<Response, Error> {
        self.send(Target::Upload, segments, self.retry.rounds(), |url| {
            let method = method.clone();
            async move {
                let mut form = Form::new();
                for (key, value) in &fields.fields {
                    form = form.text(key.clone(), value.clone());
                }
                for (key, file) in &fields.files {
                    form = form.part(key.clone(), file.to_part(key, self.chunk_size).await?);
                }
                Ok::<RequestBuilder, Error>(self.client.request(method, url).multipart(form))
            }
        })
        .await
    }
}

fn json_part(value: &serde_json::Value) -> Result<Part, Error> {
    Part::text(value.to_string())
        .mime_str("application/json")
        .map_err(|e| Error::Configuration(e.to_string()))
}

fn into_record(value: Value, what: impl FnOnce() -> String) -> Result<Record, Error> {
    match value {
        Value::Record(record) => Ok(record),
        Value::Null => Err(Error::NotFound(what())),
        other => Err(Error::Deserialization(format!(
            "expected a record, got {other:?}"
        ))),
    }
}

fn into_records(value: Value) -> Result<Vec<Record>, Error> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|item| into_record(item, || "record in list".to_string()))
            .collect(),
        Value::Record(record) => Ok(vec![record]),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::Deserialization(format!(
            "expected a list of records, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_record_is_a_one_element_list() {
        let records = into_records(Value::Record(Record::new().with("_id", "r-1"))).unwrap();
        assert_eq!(records.len(), 1);
        assert!(into_records(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn null_record_is_not_found() {
        let err = into_record(Value::Null, || "record r-1".into()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn scalars_are_not_records() {
        assert!(matches!(
            into_records(Value::from(vec![1, 2])),
            Err(Error::Deserialization(_))
        ));
        assert!(matches!(
            into_record(Value::from("x"), String::new),
            Err(Error::Deserialization(_))
        ));
    }
}
