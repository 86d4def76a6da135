//! 라벨 해석기 — 라벨 셀렉터를 구체 주소 목록으로 변환
//!
//! [`StaticResolver`]는 정적 서비스 인벤토리(TOML 파일 또는 코드 등록)
//! 기반의 해석기이며, [`CachingResolver`]는 임의 해석기에 TTL 캐시를
//! 씌우는 래퍼입니다. 프로덕션 디스커버리 백엔드(DNS, 클러스터 API 등)는
//! 외부 협력자이며 [`LabelResolver`] trait 뒤에서 교체됩니다.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

use zeroseg_core::backend::LabelResolver;
use zeroseg_core::error::ResolveError;
use zeroseg_core::types::format_labels;

/// 등록된 서비스 엔트리
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    /// 서비스 이름
    pub name: String,
    /// 서비스 주소
    pub address: Ipv4Addr,
    /// 서비스 라벨
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// TOML 인벤토리 파일의 최상위 구조
#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default, rename = "service")]
    services: Vec<ServiceEntry>,
}

/// 정적 인벤토리 기반 해석기
///
/// 셀렉터의 모든 라벨이 서비스 라벨의 부분집합이면 매칭됩니다.
#[derive(Debug, Default)]
pub struct StaticResolver {
    services: Vec<ServiceEntry>,
}

impl StaticResolver {
    /// 빈 해석기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 서비스를 등록합니다.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        address: Ipv4Addr,
        labels: BTreeMap<String, String>,
    ) {
        self.services.push(ServiceEntry {
            name: name.into(),
            address,
            labels,
        });
    }

    /// TOML 문자열에서 인벤토리를 파싱합니다.
    ///
    /// # 인벤토리 형식
    /// ```toml
    /// [[service]]
    /// name = "db-1"
    /// address = "10.0.2.10"
    /// labels = { app = "db", tier = "backend" }
    /// ```
    pub fn from_toml(data: &str) -> Result<Self, ResolveError> {
        let file: InventoryFile = toml::from_str(data).map_err(|e| ResolveError::Inventory {
            path: "(inline)".to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            services: file.services,
        })
    }

    /// TOML 인벤토리 파일에서 해석기를 로드합니다.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let path = path.as_ref();
        let data =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ResolveError::Inventory {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        let file: InventoryFile = toml::from_str(&data).map_err(|e| ResolveError::Inventory {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(
            path = %path.display(),
            count = file.services.len(),
            "loaded service inventory"
        );
        Ok(Self {
            services: file.services,
        })
    }

    /// 등록된 서비스 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// 등록된 서비스가 없으면 true
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl LabelResolver for StaticResolver {
    fn resolve(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let addresses: Vec<Ipv4Addr> = self
            .services
            .iter()
            .filter(|s| labels_match(&s.labels, labels))
            .map(|s| s.address)
            .collect();

        if addresses.is_empty() {
            return Err(ResolveError::NotFound {
                labels: format_labels(labels),
            });
        }

        Ok(addresses)
    }
}

/// 셀렉터의 모든 키/값이 서비스 라벨에 존재하는지 확인합니다.
fn labels_match(service_labels: &BTreeMap<String, String>, selector: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| service_labels.get(k) == Some(v))
}

/// TTL 캐시 래퍼
///
/// 동일 셀렉터에 대한 반복 해석을 캐시합니다. 성공 결과만 캐시하며
/// `NotFound`는 매번 백엔드에 다시 묻습니다 (새로 등록된 서비스가
/// 다음 집행에서 바로 보이도록).
pub struct CachingResolver<R> {
    backend: R,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    addresses: Vec<Ipv4Addr>,
    expires_at: Instant,
}

impl<R: LabelResolver> CachingResolver<R> {
    /// 주어진 TTL로 캐시 래퍼를 생성합니다.
    pub fn new(backend: R, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 캐시를 비웁니다.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
    }
}

impl<R: LabelResolver> LabelResolver for CachingResolver<R> {
    fn resolve(&self, labels: &BTreeMap<String, String>) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let key = format_labels(labels);

        {
            let cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(entry) = cache.get(&key) {
                if Instant::now() < entry.expires_at {
                    return Ok(entry.addresses.clone());
                }
            }
        }

        let addresses = self.backend.resolve(labels)?;

        let mut cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.insert(
            key,
            CacheEntry {
                addresses: addresses.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn sample_resolver() -> StaticResolver {
        let mut resolver = StaticResolver::new();
        resolver.register(
            "db-1",
            Ipv4Addr::new(10, 0, 2, 10),
            labels(&[("app", "db"), ("tier", "backend")]),
        );
        resolver.register(
            "db-2",
            Ipv4Addr::new(10, 0, 2, 11),
            labels(&[("app", "db"), ("tier", "backend")]),
        );
        resolver.register(
            "web-1",
            Ipv4Addr::new(10, 0, 1, 10),
            labels(&[("app", "web")]),
        );
        resolver
    }

    #[test]
    fn resolve_matches_label_subset() {
        let resolver = sample_resolver();
        let addresses = resolver.resolve(&labels(&[("app", "db")])).unwrap();
        assert_eq!(addresses.len(), 2);
        assert!(addresses.contains(&Ipv4Addr::new(10, 0, 2, 10)));
        assert!(addresses.contains(&Ipv4Addr::new(10, 0, 2, 11)));
    }

    #[test]
    fn resolve_requires_all_selector_labels() {
        let resolver = sample_resolver();
        let result = resolver.resolve(&labels(&[("app", "web"), ("tier", "backend")]));
        assert!(matches!(result, Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn resolve_zero_matches_is_not_found_never_empty_ok() {
        let resolver = sample_resolver();
        let result = resolver.resolve(&labels(&[("app", "ghost")]));
        match result {
            Err(ResolveError::NotFound { labels }) => {
                assert_eq!(labels, "app=ghost");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn from_toml_inventory() {
        let toml = r#"
[[service]]
name = "db-1"
address = "10.0.2.10"
labels = { app = "db", tier = "backend" }

[[service]]
name = "cache-1"
address = "10.0.3.5"
labels = { app = "cache" }
"#;
        let resolver = StaticResolver::from_toml(toml).unwrap();
        assert_eq!(resolver.len(), 2);
        let addresses = resolver.resolve(&labels(&[("app", "cache")])).unwrap();
        assert_eq!(addresses, vec![Ipv4Addr::new(10, 0, 3, 5)]);
    }

    #[test]
    fn from_toml_invalid_returns_inventory_error() {
        let result = StaticResolver::from_toml("[[service]]\nname = 42\n");
        assert!(matches!(result, Err(ResolveError::Inventory { .. })));
    }

    #[tokio::test]
    async fn load_from_file_missing_path() {
        let result = StaticResolver::load_from_file("/nonexistent/inventory.toml").await;
        assert!(matches!(result, Err(ResolveError::Inventory { .. })));
    }

    /// 백엔드 호출 횟수를 세는 해석기
    struct CountingResolver {
        inner: StaticResolver,
        calls: AtomicUsize,
    }

    impl LabelResolver for CountingResolver {
        fn resolve(
            &self,
            labels: &BTreeMap<String, String>,
        ) -> Result<Vec<Ipv4Addr>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(labels)
        }
    }

    #[test]
    fn caching_resolver_hits_backend_once_within_ttl() {
        let counting = CountingResolver {
            inner: sample_resolver(),
            calls: AtomicUsize::new(0),
        };
        let caching = CachingResolver::new(counting, Duration::from_secs(60));

        let selector = labels(&[("app", "db")]);
        let first = caching.resolve(&selector).unwrap();
        let second = caching.resolve(&selector).unwrap();

        assert_eq!(first, second);
        assert_eq!(caching.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn caching_resolver_does_not_cache_not_found() {
        let counting = CountingResolver {
            inner: StaticResolver::new(),
            calls: AtomicUsize::new(0),
        };
        let caching = CachingResolver::new(counting, Duration::from_secs(60));

        let selector = labels(&[("app", "ghost")]);
        assert!(caching.resolve(&selector).is_err());
        assert!(caching.resolve(&selector).is_err());
        assert_eq!(caching.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn caching_resolver_clear_cache_forces_refetch() {
        let counting = CountingResolver {
            inner: sample_resolver(),
            calls: AtomicUsize::new(0),
        };
        let caching = CachingResolver::new(counting, Duration::from_secs(60));

        let selector = labels(&[("app", "db")]);
        caching.resolve(&selector).unwrap();
        caching.clear_cache();
        caching.resolve(&selector).unwrap();
        assert_eq!(caching.backend.calls.load(Ordering::SeqCst), 2);
    }
}
