//! An S3-compatible object-store adapter, per spec.md §4.2
//!
//! A single tenant bucket, one client, built the way
//! `utils/s3.rs::S3Client::new` builds its per-bucket clients (explicit
//! endpoint/region/credentials, `force_path_style(true)`).

use std::collections::VecDeque;

use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::io::AsyncRead;

use crate::conf::S3 as S3Conf;
use crate::utils::{ApiError, ErrorKind};

/// One entry returned while paginating a prefix listing
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    /// The full object key
    pub key: String,
    /// The object's size in bytes
    pub size: i64,
}

/// The metadata `headObject` returns
#[derive(Debug, Clone)]
pub struct ObjectHead {
    /// The object's size in bytes
    pub size: i64,
    /// The object's declared content type, if any
    pub content_type: Option<String>,
}

/// The body `getObject` returns
pub struct ObjectBody {
    /// The raw byte stream
    pub body: ByteStream,
    /// The object's declared content type, if any
    pub content_type: Option<String>,
    /// The object's size in bytes, if known
    pub size: Option<i64>,
}

impl ObjectBody {
    /// Buffer the entire body into memory; only appropriate for small
    /// objects (e.g. gradient worker reads of a single already-uploaded
    /// image, never a bulk ZIP upload path).
    pub async fn collect(self) -> Result<Bytes, ApiError> {
        Ok(self.body.collect().await?.into_bytes())
    }
}

/// How many keys one `deleteBatch` call may cover, per spec.md §4.2
pub const MAX_DELETE_BATCH: usize = 1000;
/// How many keys one `listPrefix` page covers, per spec.md §4.2
const LIST_PAGE_SIZE: i32 = 1000;

/// A single-bucket S3-compatible object store client
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    /// Build a new client from config
    #[must_use]
    pub fn new(conf: &S3Conf) -> Self {
        let creds = Credentials::new(
            &conf.access_key,
            &conf.secret_key,
            None,
            None,
            "gallery-platform",
        );
        let s3_config = aws_sdk_s3::config::Builder::new()
            .endpoint_url(&conf.endpoint)
            .region(aws_types::region::Region::new(conf.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(creds))
            .force_path_style(true)
            .build();
        ObjectStore {
            client: Client::from_conf(s3_config),
            bucket: conf.bucket.clone(),
        }
    }

    /// Confirm the tenant bucket exists; fails process startup if it doesn't
    /// (spec.md §4.2, §7: missing bucket is `Fatal`).
    #[tracing::instrument(name = "ObjectStore::ensure_bucket", skip(self), err(Debug))]
    pub async fn ensure_bucket(&self) -> Result<(), ApiError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) => Err(ApiError::new(
                ErrorKind::Fatal,
                Some(format!(
                    "tenant bucket {} is not reachable: {err:#?}",
                    self.bucket
                )),
            )),
        }
    }

    /// Write a zero-byte folder marker object at `prefix`
    #[tracing::instrument(name = "ObjectStore::put_folder_marker", skip(self), err(Debug))]
    pub async fn put_folder_marker(&self, prefix: &str) -> Result<(), ApiError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(prefix)
            .body(ByteStream::from(Vec::new()))
            .send()
            .await?;
        Ok(())
    }

    /// Check whether an object exists and fetch its metadata
    #[tracing::instrument(name = "ObjectStore::head_object", skip(self), err(Debug))]
    pub async fn head_object(&self, key: &str) -> Result<ObjectHead, ApiError> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(ObjectHead {
            size: resp.content_length().unwrap_or_default(),
            content_type: resp.content_type().map(str::to_owned),
        })
    }

    /// Write a fully-buffered object
    #[tracing::instrument(name = "ObjectStore::put_buffer", skip(self, bytes), err(Debug))]
    pub async fn put_buffer(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await?;
        Ok(())
    }

    /// Write a streamed object without buffering the whole body in memory.
    ///
    /// `size` is passed through when known (the ZIP pipeline knows
    /// uncompressed entry sizes up front); when it isn't, the SDK streams
    /// with chunked transfer the way `utils/s3.rs::stream_helper` does for
    /// its multipart parts.
    #[tracing::instrument(name = "ObjectStore::put_stream", skip(self, reader), err(Debug))]
    pub async fn put_stream<R>(
        &self,
        key: &str,
        reader: R,
        size: Option<u64>,
        content_type: &str,
    ) -> Result<(), ApiError>
    where
        R: AsyncRead + Unpin + Send + Sync + 'static,
    {
        let stream = ByteStream::read_from()
            .reader(Box::pin(reader))
            .build()
            .await?;
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(stream)
            .content_type(content_type);
        if let Some(size) = size {
            req = req.content_length(size as i64);
        }
        req.send().await?;
        Ok(())
    }

    /// Fetch an object's body and metadata
    #[tracing::instrument(name = "ObjectStore::get_object", skip(self), err(Debug))]
    pub async fn get_object(&self, key: &str) -> Result<ObjectBody, ApiError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(ObjectBody {
            content_type: resp.content_type().map(str::to_owned),
            size: resp.content_length(),
            body: resp.body,
        })
    }

    /// Server-side copy from `src` to `dst`; a same-bytes copy is a safe no-op
    /// retry target (spec.md §4.3 rename recovery).
    #[tracing::instrument(name = "ObjectStore::copy_object", skip(self), err(Debug))]
    pub async fn copy_object(&self, src: &str, dst: &str) -> Result<(), ApiError> {
        let copy_source = format!("{}/{}", self.bucket, src);
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source)
            .key(dst)
            .send()
            .await?;
        Ok(())
    }

    /// Delete a single object; deleting a missing key is treated as success
    #[tracing::instrument(name = "ObjectStore::delete_object", skip(self), err(Debug))]
    pub async fn delete_object(&self, key: &str) -> Result<(), ApiError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    /// Delete up to [`MAX_DELETE_BATCH`] keys in one call; callers chunk
    /// larger sets themselves (spec.md §4.2).
    #[tracing::instrument(name = "ObjectStore::delete_batch", skip(self, keys), err(Debug))]
    pub async fn delete_batch(&self, keys: &[String]) -> Result<(), ApiError> {
        if keys.is_empty() {
            return Ok(());
        }
        if keys.len() > MAX_DELETE_BATCH {
            return Err(ApiError::new(
                ErrorKind::InvalidInput,
                Some(format!(
                    "delete_batch accepts at most {MAX_DELETE_BATCH} keys, got {}",
                    keys.len()
                )),
            ));
        }
        let objects = keys
            .iter()
            .map(|k| {
                aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .expect("key is always set")
            })
            .collect::<Vec<_>>();
        let delete = aws_sdk_s3::types::Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|err| {
                ApiError::new(
                    ErrorKind::InvalidInput,
                    Some(format!("Failed to build delete request: {err:#?}")),
                )
            })?;
        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|err| {
                ApiError::new(
                    ErrorKind::Transient,
                    Some(format!("Failed to batch delete objects: {err:#?}")),
                )
            })?;
        Ok(())
    }

    /// Build a presigned GET url, rewriting `http://` to `https://`
    #[tracing::instrument(name = "ObjectStore::presign_get", skip(self), err(Debug))]
    pub async fn presign_get(&self, key: &str, ttl_secs: u64) -> Result<String, ApiError> {
        let presign_conf = aws_sdk_s3::presigning::PresigningConfig::expires_in(
            std::time::Duration::from_secs(ttl_secs),
        )
        .map_err(|err| {
            ApiError::new(
                ErrorKind::InvalidInput,
                Some(format!("Invalid presign TTL: {err:#?}")),
            )
        })?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_conf)
            .await
            .map_err(|err| {
                ApiError::new(
                    ErrorKind::Transient,
                    Some(format!("Failed to presign url: {err:#?}")),
                )
            })?;
        let url = presigned.uri().to_string();
        Ok(if let Some(rest) = url.strip_prefix("http://") {
            format!("https://{rest}")
        } else {
            url
        })
    }

    /// Paginate a prefix listing. `IsTruncated`/`ContinuationToken` handling
    /// happens internally; callers never see or set `MaxKeys`.
    pub fn list_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Stream<Item = Result<ObjectSummary, ApiError>> + 'a {
        struct State<'a> {
            store: &'a ObjectStore,
            prefix: &'a str,
            buffer: VecDeque<ObjectSummary>,
            continuation: Option<String>,
            exhausted: bool,
        }

        let initial = State {
            store: self,
            prefix,
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
        };

        stream::try_unfold(initial, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Ok(Some((item, state)));
                }
                if state.exhausted {
                    return Ok(None);
                }
                let mut req = state
                    .store
                    .client
                    .list_objects_v2()
                    .bucket(&state.store.bucket)
                    .prefix(state.prefix)
                    .max_keys(LIST_PAGE_SIZE);
                if let Some(token) = state.continuation.clone() {
                    req = req.continuation_token(token);
                }
                let resp = req.send().await.map_err(|err| {
                    ApiError::new(
                        ErrorKind::Transient,
                        Some(format!("Failed to list prefix {}: {err:#?}", state.prefix)),
                    )
                })?;
                for obj in resp.contents() {
                    if let Some(key) = obj.key() {
                        state.buffer.push_back(ObjectSummary {
                            key: key.to_owned(),
                            size: obj.size().unwrap_or_default(),
                        });
                    }
                }
                if resp.is_truncated().unwrap_or(false) {
                    state.continuation = resp.next_continuation_token().map(str::to_owned);
                } else {
                    state.exhausted = true;
                }
                if state.buffer.is_empty() && state.exhausted {
                    return Ok(None);
                }
            }
        })
    }
}
