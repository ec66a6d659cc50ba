use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};

use super::common::{Backend, Capabilities, Children};
use crate::error::{BackendError, BackendResult};
use crate::path;

/// Default timeout applied to every request when none is configured.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for an [`S3CompatibleBackend`].
#[derive(Clone)]
pub struct S3CompatibleBackendConfig {
    /// Endpoint URL, e.g. `http://localhost:9000`.
    pub endpoint: String,
    /// Signing region. Most self-hosted services accept any value.
    pub region: String,
    /// Address buckets as `{endpoint}/{bucket}` instead of `{bucket}.{endpoint}`.
    pub path_style: bool,
    /// Access key of the credential pair. Falls back to the environment when unset.
    pub access_key: Option<String>,
    /// Secret key of the credential pair. Falls back to the environment when unset.
    pub secret_key: Option<String>,
    /// Upper bound for a single request. Must be finite.
    pub request_timeout: Duration,
    /// Whether the service guarantees read-after-write consistency.
    pub read_after_write: bool,
}

impl Default for S3CompatibleBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            path_style: true,
            access_key: None,
            secret_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            read_after_write: true,
        }
    }
}

impl fmt::Debug for S3CompatibleBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleBackendConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[redacted]"))
            .field("request_timeout", &self.request_timeout)
            .field("read_after_write", &self.read_after_write)
            .finish()
    }
}

/// A [`Backend`] talking to an S3-compatible service.
///
/// Namespaces map to buckets. A bucket handle is created on first use and cached.
pub struct S3CompatibleBackend {
    region: Region,
    credentials: Credentials,
    path_style: bool,
    request_timeout: Duration,
    read_after_write: bool,
    buckets: Mutex<HashMap<String, Box<Bucket>>>,
}

impl S3CompatibleBackend {
    /// Creates a new backend from the given configuration.
    ///
    /// No request is sent until the first operation.
    pub fn new(config: S3CompatibleBackendConfig) -> BackendResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|err| {
            BackendError::permission_denied("could not load credentials").with_cause(err)
        })?;

        let region = Region::Custom {
            region: config.region,
            endpoint: config.endpoint,
        };

        Ok(Self {
            region,
            credentials,
            path_style: config.path_style,
            request_timeout: config.request_timeout,
            read_after_write: config.read_after_write,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    fn bucket(&self, namespace: &str) -> BackendResult<Box<Bucket>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = buckets.get(namespace) {
            return Ok(bucket.clone());
        }

        let invalid = |err: S3Error| {
            BackendError::unavailable(format!("cannot address bucket `{namespace}`")).with_cause(err)
        };
        let mut bucket =
            Bucket::new(namespace, self.region.clone(), self.credentials.clone()).map_err(invalid)?;
        if self.path_style {
            bucket = bucket.with_path_style();
        }
        let bucket = bucket
            .with_request_timeout(self.request_timeout)
            .map_err(invalid)?;

        buckets.insert(namespace.to_owned(), bucket.clone());
        Ok(bucket)
    }

    async fn create_bucket(&self, namespace: &str) -> BackendResult<()> {
        let config = BucketConfiguration::default();
        let region = self.region.clone();
        let credentials = self.credentials.clone();
        let response = if self.path_style {
            Bucket::create_with_path_style(namespace, region, credentials, config).await
        } else {
            Bucket::create(namespace, region, credentials, config).await
        };

        match response {
            Ok(response) if response.success() => Ok(()),
            // Someone else (or a previous run) created it in the meantime.
            Ok(response) if response.response_code == 409 => Ok(()),
            Ok(response) => Err(setup_status(
                response.response_code,
                format!("creating bucket `{namespace}`: {}", response.response_text),
            )),
            Err(S3Error::HttpFailWithBody(409, _)) => Ok(()),
            Err(err) => Err(setup_error(format!("creating bucket `{namespace}`"), err)),
        }
    }
}

impl fmt::Debug for S3CompatibleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Compatible")
            .field("endpoint", &self.region.endpoint())
            .field("path_style", &self.path_style)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for S3CompatibleBackend {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read_after_write: self.read_after_write,
            native_hierarchy: true,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn ensure_namespace(&self, namespace: &str) -> BackendResult<()> {
        let bucket = self.bucket(namespace)?;
        let exists = bucket
            .exists()
            .await
            .map_err(|err| setup_error(format!("checking bucket `{namespace}`"), err))?;

        if exists {
            tracing::debug!("Bucket exists");
            return Ok(());
        }

        tracing::info!(namespace, "Bucket does not exist, creating");
        self.create_bucket(namespace).await
    }

    #[tracing::instrument(level = "trace", skip(self, payload), fields(size = payload.len()))]
    async fn put_object(&self, namespace: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        let bucket = self.bucket(namespace)?;
        bucket
            .put_object(key, &payload)
            .await
            .map_err(|err| op_error(key, err, BackendError::write_failed))?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_object(&self, namespace: &str, key: &str) -> BackendResult<Bytes> {
        let bucket = self.bucket(namespace)?;
        match bucket.get_object(key).await {
            Ok(response) => Ok(Bytes::from(response.to_vec())),
            Err(err) => Err(read_error(key, key, err)),
        }
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn list_keys(&self, namespace: &str, prefix: &str) -> BackendResult<Vec<String>> {
        let bucket = self.bucket(namespace)?;
        let pages = bucket
            .list(prefix.to_owned(), None)
            .await
            .map_err(|err| read_error(prefix, namespace, err))?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn list_children(&self, namespace: &str, group: &str) -> BackendResult<Children> {
        let bucket = self.bucket(namespace)?;
        let prefix = path::child_prefix(group);
        let pages = bucket
            .list(prefix.clone(), Some(path::SEPARATOR.to_string()))
            .await
            .map_err(|err| op_error(&prefix, err, BackendError::read_failed))?;

        let mut children = Children::default();
        for page in pages {
            let prefixes = page.common_prefixes.unwrap_or_default();
            children.groups.extend(
                prefixes
                    .into_iter()
                    .map(|common| common.prefix.trim_end_matches(path::SEPARATOR).to_owned()),
            );
            children.objects.extend(
                page.contents
                    .into_iter()
                    .map(|object| object.key)
                    .filter(|key| !path::is_group_marker(key) && key != &prefix),
            );
        }

        Ok(children)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete(&self, namespace: &str, key: &str) -> BackendResult<()> {
        let bucket = self.bucket(namespace)?;

        let mut targets = BTreeSet::from([key.to_owned()]);
        let subtree = path::child_prefix(key);
        if !subtree.is_empty() {
            targets.extend(self.list_keys(namespace, &subtree).await?);
        }

        for target in targets {
            delete_one(&bucket, &target).await?;
        }

        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete_object(&self, namespace: &str, key: &str) -> BackendResult<()> {
        let bucket = self.bucket(namespace)?;
        delete_one(&bucket, key).await
    }
}

async fn delete_one(bucket: &Bucket, key: &str) -> BackendResult<()> {
    match bucket.delete_object(key).await {
        Ok(_) | Err(S3Error::HttpFailWithBody(404, _)) => Ok(()),
        Err(err) => Err(op_error(key, err, BackendError::write_failed)),
    }
}

/// Classifies an error encountered while setting up a namespace.
fn setup_error(context: String, err: S3Error) -> BackendError {
    match err {
        S3Error::HttpFailWithBody(status, body) => {
            setup_status(status, format!("{context}: {body}"))
        }
        S3Error::Credentials(err) => BackendError::permission_denied(context).with_cause(err),
        err => BackendError::unavailable(context).with_cause(err),
    }
}

fn setup_status(status: u16, context: String) -> BackendError {
    match status {
        401 | 403 => BackendError::permission_denied(format!("HTTP {status}: {context}")),
        _ => BackendError::unavailable(format!("HTTP {status}: {context}")),
    }
}

/// Classifies a failed read. A 404 means `missing` does not exist.
fn read_error(key: &str, missing: &str, err: S3Error) -> BackendError {
    match err {
        S3Error::HttpFailWithBody(404, _) => {
            tracing::trace!(missing, "Not found");
            BackendError::not_found(missing)
        }
        err => op_error(key, err, BackendError::read_failed),
    }
}

/// Classifies an error of a single object operation.
///
/// Timeouts are transport failures like any other; they are not reported separately.
fn op_error(
    key: &str,
    err: S3Error,
    make: fn(String, String) -> BackendError,
) -> BackendError {
    match err {
        S3Error::HttpFailWithBody(status, body) => {
            make(key.to_owned(), format!("HTTP {status}: {body}"))
        }
        err => make(key.to_owned(), "transport error".to_owned()).with_cause(err),
    }
}
