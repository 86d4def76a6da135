//! 설정 관리 — zeroseg.toml 파싱 및 런타임 설정
//!
//! [`ZerosegConfig`]는 모든 섹션의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ZEROSEG_ENFORCER_CGROUP_PATH=/sys/fs/cgroup` 형식)
//! 3. 설정 파일 (`zeroseg.toml`)
//! 4. 기본값 (`Default` 구현)

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ZerosegError};

/// Zeroseg 통합 설정
///
/// `zeroseg.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZerosegConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 집행 백엔드 설정
    #[serde(default)]
    pub enforcer: EnforcerConfig,
    /// 라벨 해석 설정
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl ZerosegConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ZerosegError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ZerosegError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ZerosegError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ZerosegError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ZerosegError> {
        toml::from_str(toml_str).map_err(|e| {
            ZerosegError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `ZEROSEG_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "ZEROSEG_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ZEROSEG_GENERAL_LOG_FORMAT");

        // Enforcer
        override_string(
            &mut self.enforcer.cgroup_path,
            "ZEROSEG_ENFORCER_CGROUP_PATH",
        );
        override_opt_string(&mut self.enforcer.bpf_object, "ZEROSEG_ENFORCER_BPF_OBJECT");
        override_bool(&mut self.enforcer.permissive, "ZEROSEG_ENFORCER_PERMISSIVE");
        override_string(
            &mut self.enforcer.pf_anchor_path,
            "ZEROSEG_ENFORCER_PF_ANCHOR_PATH",
        );
        override_string(
            &mut self.enforcer.pf_conf_path,
            "ZEROSEG_ENFORCER_PF_CONF_PATH",
        );

        // Resolver
        override_opt_string(&mut self.resolver.inventory, "ZEROSEG_RESOLVER_INVENTORY");
        override_u64(
            &mut self.resolver.cache_ttl_secs,
            "ZEROSEG_RESOLVER_CACHE_TTL_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ZerosegError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.enforcer.cgroup_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "enforcer.cgroup_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.enforcer.pf_anchor_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "enforcer.pf_anchor_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 집행 백엔드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// eBPF 프로그램을 어태치할 cgroup 경로
    pub cgroup_path: String,
    /// eBPF 오브젝트 파일 경로 오버라이드 (설정 시 탐색 경로 무시)
    pub bpf_object: Option<String>,
    /// permissive 프로그램 변형 사용 (단계적 롤아웃/테스트 전용)
    pub permissive: bool,
    /// pf 앵커 파일 경로 (macOS 폴백)
    pub pf_anchor_path: String,
    /// pf 메인 설정 파일 경로 (macOS 폴백)
    pub pf_conf_path: String,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            cgroup_path: "/sys/fs/cgroup".to_owned(),
            bpf_object: None,
            permissive: false,
            pf_anchor_path: "/etc/pf.anchors/zeroseg".to_owned(),
            pf_conf_path: "/etc/pf.conf".to_owned(),
        }
    }
}

/// 라벨 해석 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// 정적 서비스 인벤토리 파일 경로 (TOML)
    pub inventory: Option<String>,
    /// 해석 결과 캐시 TTL (초)
    pub cache_ttl_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            inventory: None,
            cache_ttl_secs: 30,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = Some(val);
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = ZerosegConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.enforcer.cgroup_path, "/sys/fs/cgroup");
        assert!(!config.enforcer.permissive);
        assert!(config.enforcer.bpf_object.is_none());
        assert_eq!(config.resolver.cache_ttl_secs, 30);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = ZerosegConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = ZerosegConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.enforcer.pf_anchor_path, "/etc/pf.anchors/zeroseg");
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[enforcer]
permissive = true
cgroup_path = "/sys/fs/cgroup/zeroseg"
"#;
        let config = ZerosegConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert!(config.enforcer.permissive);
        assert_eq!(config.enforcer.cgroup_path, "/sys/fs/cgroup/zeroseg");
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"

[enforcer]
cgroup_path = "/sys/fs/cgroup/system.slice"
bpf_object = "/opt/zeroseg/bpf/filter.o"
permissive = true
pf_anchor_path = "/etc/pf.anchors/zeroseg-dev"
pf_conf_path = "/etc/pf.conf"

[resolver]
inventory = "/etc/zeroseg/inventory.toml"
cache_ttl_secs = 60
"#;
        let config = ZerosegConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(
            config.enforcer.bpf_object.as_deref(),
            Some("/opt/zeroseg/bpf/filter.o")
        );
        assert_eq!(
            config.resolver.inventory.as_deref(),
            Some("/etc/zeroseg/inventory.toml")
        );
        assert_eq!(config.resolver.cache_ttl_secs, 60);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let result = ZerosegConfig::parse("invalid = [[[toml");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = ZerosegConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = ZerosegConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_empty_cgroup_path() {
        let mut config = ZerosegConfig::default();
        config.enforcer.cgroup_path = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cgroup_path"));
    }

    #[test]
    fn env_override_applies() {
        let mut config = ZerosegConfig::default();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("ZEROSEG_ENFORCER_PERMISSIVE", "true") };
        config.apply_env_overrides();
        assert!(config.enforcer.permissive);
        unsafe { std::env::remove_var("ZEROSEG_ENFORCER_PERMISSIVE") };
    }

    #[test]
    fn env_override_invalid_bool_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_ZEROSEG_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_ZEROSEG_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_ZEROSEG_BOOL_BAD") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = ZerosegConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = ZerosegConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.enforcer.cgroup_path, parsed.enforcer.cgroup_path);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = ZerosegConfig::from_file("/nonexistent/path/zeroseg.toml").await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ZerosegError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
