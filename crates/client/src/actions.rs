use std::collections::BTreeMap;

use reqwest::multipart::{Form, Part};
use tracing::{info, instrument};

use crate::{Error, Target, Value, WaspClient, marshal, ready};

/// Arguments of a server-side action.
///
/// # Example
///
/// ```
/// use wasp_client::ActionParams;
///
/// let params = ActionParams::new()
///     .param("MY_PARAM1", "1")
///     .capture_stdout();
/// assert_eq!(params.get("MY_PARAM1"), Some("1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionParams {
    params: BTreeMap<String, String>,
    stdout: bool,
    stderr: bool,
}

impl ActionParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an action argument.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Store the command's standard output as a file of the run record.
    #[must_use]
    pub fn capture_stdout(mut self) -> Self {
        self.stdout = true;
        self
    }

    /// Store the command's standard error as a file of the run record.
    #[must_use]
    pub fn capture_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Form fields sent with the run request.
    fn fields(&self) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .params
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if self.stdout {
            fields.push(("stdout".into(), "true".into()));
        }
        if self.stderr {
            fields.push(("stderr".into(), "true".into()));
        }
        fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ActionParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |params, (name, value)| params.param(name, value))
    }
}

impl WaspClient {
    // =========================================================================
    // Actions
    // =========================================================================

    /// Run an action registered in the server's `services` collection.
    ///
    /// Actions are never retried: each configured upload URL is tried once.
    /// Fails with [`Error::Action`] when the action terminates unsuccessfully.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> Result<(), wasp_client::Error> {
    /// use wasp_client::{ActionParams, WaspClient};
    ///
    /// let client = WaspClient::new("http://localhost:2233")?;
    /// let params = ActionParams::new().param("MY_PARAM1", "1").capture_stderr();
    /// let result = client.run_action("myaction", &params).await?;
    /// println!("{result:?}");
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, params))]
    pub async fn run_action(&self, action: &str, params: &ActionParams) -> Result<Value, Error> {
        let fields = params.fields();
        let failed = |status: u16, message: String| Error::Action {
            action: action.to_string(),
            status,
            message,
        };

        let response = self
            .send(Target::Upload, &["actions", "services", action], 1, |url| {
                let mut form = fields.iter().fold(Form::new(), |form, (name, value)| {
                    form.text(name.clone(), value.clone())
                });
                if fields.is_empty() {
                    // The action endpoint rejects a multipart body without parts.
                    form = form.part("", Part::bytes(Vec::new()).file_name(""));
                }
                ready(self.client.post(url).multipart(form))
            })
            .await
            .map_err(|e| match e {
                Error::Http { status, message } => failed(status, message),
                other => other,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(failed(status.as_u16(), body));
        }
        info!(action, "action completed");

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let json = serde_json::from_str(&body).map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(marshal::decode(json, Some(self)))
    }
}
