//! 内存存储，仅用于测试：记录所有写操作，可注入失败

use super::{Connection, Container, ContainerDetails, ObjectHandle, RemoteObjectMeta};
use crate::core::hasher::md5_hex;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MemoryConnection {
    containers: Mutex<HashMap<String, Arc<MemoryContainer>>>,
    pub unreachable: AtomicBool,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个容器，返回其具体类型以便测试检查
    pub fn add_container(&self, container: MemoryContainer) -> Arc<MemoryContainer> {
        let container = Arc::new(container);
        self.containers
            .lock()
            .unwrap()
            .insert(container.name.clone(), container.clone());
        container
    }

    pub fn container(&self, name: &str) -> Option<Arc<MemoryContainer>> {
        self.containers.lock().unwrap().get(name).cloned()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn get_container(&self, name: &str) -> Result<Option<Arc<dyn Container>>> {
        self.check_reachable()?;
        Ok(self.container(name).map(|c| c as Arc<dyn Container>))
    }

    async fn create_container(&self, name: &str) -> Result<Arc<dyn Container>> {
        self.check_reachable()?;
        let container = self.add_container(MemoryContainer::new(name));
        container.record(format!("create_container {}", name));
        Ok(container as Arc<dyn Container>)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub data: Vec<u8>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
    pub headers: BTreeMap<String, String>,
}

pub struct MemoryContainer {
    name: String,
    public: AtomicBool,
    objects: Mutex<BTreeMap<String, MemoryObject>>,
    mutations: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    pub listing_fails: AtomicBool,
}

impl MemoryContainer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            public: AtomicBool::new(false),
            objects: Mutex::new(BTreeMap::new()),
            mutations: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            listing_fails: AtomicBool::new(false),
        }
    }

    pub fn public(self) -> Self {
        self.public.store(true, Ordering::SeqCst);
        self
    }

    /// 预置对象（不记录为写操作）
    pub fn with_object(
        self,
        name: &str,
        last_modified: Option<DateTime<Utc>>,
        content_hash: Option<&str>,
    ) -> Self {
        self.objects.lock().unwrap().insert(
            name.to_string(),
            MemoryObject {
                data: Vec::new(),
                last_modified,
                content_hash: content_hash.map(|h| h.to_string()),
                headers: BTreeMap::new(),
            },
        );
        self
    }

    /// 对指定对象名的所有写操作返回错误
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn object(&self, name: &str) -> Option<MemoryObject> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn record(&self, entry: String) {
        self.mutations.lock().unwrap().push(entry);
    }

    fn check_writable(&self, name: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(name) {
            bail!("HTTP 503 Service Unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Container for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_public(&self) -> Result<bool> {
        Ok(self.public.load(Ordering::SeqCst))
    }

    async fn make_public(&self) -> Result<()> {
        self.record("make_public".to_string());
        self.public.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn object_count(&self) -> Result<u64> {
        Ok(self.objects.lock().unwrap().len() as u64)
    }

    async fn list_objects_info(&self) -> Result<Vec<RemoteObjectMeta>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            bail!("listing timed out");
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(name, obj)| RemoteObjectMeta {
                object_name: name.clone(),
                last_modified: obj.last_modified,
                content_hash: obj.content_hash.clone(),
                size: obj.data.len() as u64,
            })
            .collect())
    }

    async fn get_object(&self, name: &str) -> Result<ObjectHandle> {
        if !self.objects.lock().unwrap().contains_key(name) {
            bail!("No such object: {}", name);
        }
        Ok(ObjectHandle::new(name))
    }

    async fn upload(&self, object: &ObjectHandle, path: &Path) -> Result<()> {
        self.check_writable(&object.name)?;
        let data = std::fs::read(path)?;
        self.record(format!("upload {}", object.name));
        self.objects.lock().unwrap().insert(
            object.name.clone(),
            MemoryObject {
                content_hash: Some(md5_hex(&data)),
                data,
                last_modified: Some(Utc::now()),
                headers: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn set_headers(
        &self,
        object: &ObjectHandle,
        headers: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.check_writable(&object.name)?;
        if headers.is_empty() {
            return Ok(());
        }
        self.record(format!("set_headers {}", object.name));
        if let Some(obj) = self.objects.lock().unwrap().get_mut(&object.name) {
            obj.headers.extend(headers.clone());
        }
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        self.check_writable(name)?;
        self.record(format!("delete {}", name));
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }

    async fn details(&self) -> Result<ContainerDetails> {
        Ok(ContainerDetails {
            public_uri: Some(format!("http://cdn.test/{}", self.name)),
            public_ssl_uri: Some(format!("https://cdn.test/{}", self.name)),
            public_streaming_uri: None,
            cdn_ttl: Some(86400),
            size_used: Some(
                self.objects
                    .lock()
                    .unwrap()
                    .values()
                    .map(|o| o.data.len() as u64)
                    .sum(),
            ),
        })
    }
}
