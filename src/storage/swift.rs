//! OpenStack Swift / Rackspace Cloud Files 存储

use super::{
    Connection, Container, ContainerDetails, ObjectHandle, RemoteObjectMeta, IO_TIMEOUT_SECS,
    MAX_RETRIES, OP_TIMEOUT_SECS, RETRY_BASE_DELAY_MS,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// 列表分页大小（Swift 服务端上限）
const LISTING_PAGE_SIZE: usize = 10_000;
/// Swift 列表中 last_modified 的格式（UTC，无时区后缀）
const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
/// 容器公开读 ACL（无 CDN 的 Swift 部署使用）
const PUBLIC_READ_ACL: &str = ".r:*,.rlistings";

/// 认证后的会话，由连接和所有容器共享
struct Session {
    client: Client,
    storage_url: String,
    cdn_url: Option<String>,
    token: String,
    cdn_ttl: u64,
}

/// 列表条目
#[derive(Debug, Deserialize)]
struct ListingEntry {
    name: String,
    hash: Option<String>,
    #[serde(default)]
    bytes: u64,
    last_modified: Option<String>,
}

fn parse_listing(body: &[u8]) -> Result<Vec<ListingEntry>> {
    serde_json::from_slice(body).context("invalid container listing")
}

impl From<ListingEntry> for RemoteObjectMeta {
    fn from(entry: ListingEntry) -> Self {
        RemoteObjectMeta {
            last_modified: entry.last_modified.as_deref().and_then(parse_last_modified),
            content_hash: entry.hash.filter(|h| !h.is_empty()),
            size: entry.bytes,
            object_name: entry.name,
        }
    }
}

impl Session {
    fn container_url(&self, container: &str) -> String {
        format!("{}/{}", self.storage_url, urlencoding::encode(container))
    }

    fn object_url(&self, container: &str, name: &str) -> String {
        format!("{}/{}", self.container_url(container), encode_object_name(name))
    }

    fn cdn_container_url(&self, container: &str) -> Option<String> {
        self.cdn_url
            .as_ref()
            .map(|cdn| format!("{}/{}", cdn, urlencoding::encode(container)))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("X-Auth-Token", &self.token)
            .timeout(Duration::from_secs(OP_TIMEOUT_SECS))
    }

    /// 带重试的请求发送：网络错误和 5xx 按指数退避重试
    async fn send_with_retry<F, Fut>(&self, what: &str, mut send: F) -> Result<Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let mut attempt = 0;
        loop {
            let last_error = match send().await {
                Ok(resp) if resp.status().is_server_error() => format!("HTTP {}", resp.status()),
                Ok(resp) => return Ok(resp),
                // 只有传输层错误才重试，本地 IO 错误直接返回
                Err(e) if e.downcast_ref::<reqwest::Error>().is_some() => e.to_string(),
                Err(e) => return Err(e),
            };

            if attempt >= MAX_RETRIES {
                bail!("{} failed after {} retries: {}", what, MAX_RETRIES, last_error);
            }

            let delay = RETRY_BASE_DELAY_MS * 2_u64.pow(attempt);
            warn!(
                "{} 失败，{}ms 后重试 ({}/{}): {}",
                what,
                delay,
                attempt + 1,
                MAX_RETRIES,
                last_error
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    async fn head(&self, url: &str, what: &str) -> Result<Response> {
        self.send_with_retry(what, move || async move {
            Ok(self.request(Method::HEAD, url).send().await?)
        })
        .await
    }
}

/// Swift 连接
pub struct SwiftConnection {
    session: Arc<Session>,
    name: String,
}

impl SwiftConnection {
    /// 使用 v1.0 认证（X-Auth-User / X-Auth-Key）建立会话
    pub async fn connect(
        username: &str,
        api_key: &str,
        auth_url: &str,
        servicenet: bool,
        cdn_ttl: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .build()?;

        let resp = client
            .get(auth_url)
            .header("X-Auth-User", username)
            .header("X-Auth-Key", api_key)
            .timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .send()
            .await
            .with_context(|| format!("Swift auth request to {} failed", auth_url))?;
        let resp = ensure_success(resp, "Swift auth")?;

        let headers = resp.headers();
        let storage_url = header_str(headers, "X-Storage-Url")
            .ok_or_else(|| anyhow!("Swift auth response is missing X-Storage-Url"))?;
        let token = header_str(headers, "X-Auth-Token")
            .ok_or_else(|| anyhow!("Swift auth response is missing X-Auth-Token"))?;
        let cdn_url = header_str(headers, "X-CDN-Management-Url");

        let storage_url = if servicenet {
            to_servicenet(&storage_url)
        } else {
            storage_url
        };
        let storage_url = storage_url.trim_end_matches('/').to_string();

        info!("Swift 认证成功: {}", storage_url);
        let name = format!("swift:{}", storage_url);

        Ok(Self {
            session: Arc::new(Session {
                client,
                storage_url,
                cdn_url: cdn_url.map(|u| u.trim_end_matches('/').to_string()),
                token,
                cdn_ttl,
            }),
            name,
        })
    }

    fn open(&self, name: &str) -> Arc<dyn Container> {
        Arc::new(SwiftContainer {
            session: self.session.clone(),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl Connection for SwiftConnection {
    async fn get_container(&self, name: &str) -> Result<Option<Arc<dyn Container>>> {
        let url = self.session.container_url(name);
        let resp = self.session.head(&url, "HEAD container").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        ensure_success(resp, "HEAD container")?;
        Ok(Some(self.open(name)))
    }

    async fn create_container(&self, name: &str) -> Result<Arc<dyn Container>> {
        let session = self.session.as_ref();
        let url = session.container_url(name);
        let url = url.as_str();
        let resp = session
            .send_with_retry("PUT container", move || async move {
                Ok(session.request(Method::PUT, url).send().await?)
            })
            .await?;
        ensure_success(resp, "PUT container")?;
        info!("已创建容器: {}", name);
        Ok(self.open(name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Swift 容器
pub struct SwiftContainer {
    session: Arc<Session>,
    name: String,
}

#[async_trait]
impl Container for SwiftContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_public(&self) -> Result<bool> {
        if let Some(cdn) = self.session.cdn_container_url(&self.name) {
            let resp = self.session.head(&cdn, "HEAD CDN container").await?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Ok(false);
            }
            let resp = ensure_success(resp, "HEAD CDN container")?;
            return Ok(header_str(resp.headers(), "X-CDN-Enabled")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")));
        }

        let url = self.session.container_url(&self.name);
        let resp = ensure_success(self.session.head(&url, "HEAD container").await?, "HEAD container")?;
        Ok(header_str(resp.headers(), "X-Container-Read").is_some_and(|acl| acl.contains(".r:*")))
    }

    async fn make_public(&self) -> Result<()> {
        let session = self.session.as_ref();
        let resp = match session.cdn_container_url(&self.name) {
            Some(cdn) => {
                let ttl = session.cdn_ttl.to_string();
                let (cdn, ttl) = (cdn.as_str(), ttl.as_str());
                session
                    .send_with_retry("PUT CDN container", move || async move {
                        Ok(session
                            .request(Method::PUT, cdn)
                            .header("X-TTL", ttl)
                            .header("X-CDN-Enabled", "True")
                            .send()
                            .await?)
                    })
                    .await?
            }
            None => {
                let url = session.container_url(&self.name);
                let url = url.as_str();
                session
                    .send_with_retry("POST container ACL", move || async move {
                        Ok(session
                            .request(Method::POST, url)
                            .header("X-Container-Read", PUBLIC_READ_ACL)
                            .send()
                            .await?)
                    })
                    .await?
            }
        };
        ensure_success(resp, "make public")?;
        Ok(())
    }

    async fn object_count(&self) -> Result<u64> {
        let url = self.session.container_url(&self.name);
        let resp = ensure_success(self.session.head(&url, "HEAD container").await?, "HEAD container")?;
        Ok(header_u64(resp.headers(), "X-Container-Object-Count").unwrap_or(0))
    }

    async fn list_objects_info(&self) -> Result<Vec<RemoteObjectMeta>> {
        let session = self.session.as_ref();
        let url = session.container_url(&self.name);
        let limit = LISTING_PAGE_SIZE.to_string();
        let (url, limit) = (url.as_str(), limit.as_str());
        let mut objects = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let current = marker.as_deref();
            let resp = session
                .send_with_retry("GET container listing", move || async move {
                    let mut req = session
                        .request(Method::GET, url)
                        .query(&[("format", "json"), ("limit", limit)]);
                    if let Some(m) = current {
                        req = req.query(&[("marker", m)]);
                    }
                    Ok(req.send().await?)
                })
                .await?;
            let resp = ensure_success(resp, "GET container listing")?;

            // 空容器可能返回 204 且无 body
            if resp.status() == StatusCode::NO_CONTENT {
                break;
            }

            let page = parse_listing(&resp.bytes().await?)?;
            let page_len = page.len();
            marker = page.last().map(|e| e.name.clone());
            objects.extend(page.into_iter().map(RemoteObjectMeta::from));

            debug!("列表分页: {} 个对象 (累计 {})", page_len, objects.len());
            if page_len < LISTING_PAGE_SIZE {
                break;
            }
        }

        Ok(objects)
    }

    async fn get_object(&self, name: &str) -> Result<ObjectHandle> {
        let url = self.session.object_url(&self.name, name);
        let resp = self.session.head(&url, "HEAD object").await?;
        if resp.status() == StatusCode::NOT_FOUND {
            bail!("No such object: {}", name);
        }
        ensure_success(resp, "HEAD object")?;
        Ok(ObjectHandle::new(name))
    }

    async fn upload(&self, object: &ObjectHandle, path: &Path) -> Result<()> {
        let session = self.session.as_ref();
        let url = session.object_url(&self.name, &object.name);
        let url = url.as_str();

        let resp = session
            .send_with_retry("PUT object", move || async move {
                let file = tokio::fs::File::open(path).await?;
                let len = file.metadata().await?.len();
                let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
                Ok(session
                    .request(Method::PUT, url)
                    .header(CONTENT_LENGTH, len)
                    .header("X-Detect-Content-Type", "true")
                    .timeout(Duration::from_secs(IO_TIMEOUT_SECS))
                    .body(body)
                    .send()
                    .await?)
            })
            .await?;
        ensure_success(resp, "PUT object")?;
        Ok(())
    }

    async fn set_headers(
        &self,
        object: &ObjectHandle,
        headers: &BTreeMap<String, String>,
    ) -> Result<()> {
        if headers.is_empty() {
            return Ok(());
        }

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("invalid header name: {}", name))?,
                HeaderValue::from_str(value)
                    .with_context(|| format!("invalid header value for {}", name))?,
            );
        }

        let session = self.session.as_ref();
        let url = session.object_url(&self.name, &object.name);
        let (url, header_map) = (url.as_str(), &header_map);
        let resp = session
            .send_with_retry("POST object headers", move || async move {
                Ok(session
                    .request(Method::POST, url)
                    .headers(header_map.clone())
                    .send()
                    .await?)
            })
            .await?;
        ensure_success(resp, "POST object headers")?;
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let session = self.session.as_ref();
        let url = session.object_url(&self.name, name);
        let url = url.as_str();
        let resp = session
            .send_with_retry("DELETE object", move || async move {
                Ok(session.request(Method::DELETE, url).send().await?)
            })
            .await?;
        // 对象已不存在，目标状态已达成
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("删除时对象已不存在: {}", name);
            return Ok(());
        }
        ensure_success(resp, "DELETE object")?;
        Ok(())
    }

    async fn details(&self) -> Result<ContainerDetails> {
        let url = self.session.container_url(&self.name);
        let resp = ensure_success(self.session.head(&url, "HEAD container").await?, "HEAD container")?;
        let mut details = ContainerDetails {
            size_used: header_u64(resp.headers(), "X-Container-Bytes-Used"),
            ..Default::default()
        };

        if let Some(cdn) = self.session.cdn_container_url(&self.name) {
            let resp = self.session.head(&cdn, "HEAD CDN container").await?;
            if resp.status().is_success() {
                let headers = resp.headers();
                details.public_uri = header_str(headers, "X-CDN-URI");
                details.public_ssl_uri = header_str(headers, "X-CDN-SSL-URI");
                details.public_streaming_uri = header_str(headers, "X-CDN-Streaming-URI");
                details.cdn_ttl = header_u64(headers, "X-TTL");
            }
        } else {
            details.public_uri = Some(url);
        }

        Ok(details)
    }
}

fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        bail!("{} failed: HTTP {}", what, status)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|s| s.trim().parse().ok())
}

/// 对象名按段编码，保留 `/`
fn encode_object_name(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// 解析 Swift 列表中的 last_modified（UTC）
fn parse_last_modified(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), LAST_MODIFIED_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

/// 内网（ServiceNet）地址：主机名加 snet- 前缀
fn to_servicenet(url: &str) -> String {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            return format!("{}snet-{}", scheme, rest);
        }
    }
    url.to_string()
}
