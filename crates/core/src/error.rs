//! 에러 타입 — 도메인별 에러 정의

/// Zeroseg 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ZerosegError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 정책 로드/검증 에러
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// 라벨 해석 에러
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// 집행 백엔드 에러
    #[error("enforce error: {0}")]
    Enforce(#[from] EnforceError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 정책 문서 로드/검증 에러
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// 정책 문서 파싱 실패 (구조적으로 잘못된 문서는 로드 전체를 중단)
    #[error("failed to parse policy document: {reason}")]
    Parse { reason: String },

    /// 정책 검증 실패 (정책 이름 + 필드 경로 + 사유)
    #[error("policy '{policy}': {field}: {reason}")]
    Validation {
        policy: String,
        field: String,
        reason: String,
    },
}

impl PolicyError {
    /// 검증 에러를 생성합니다.
    pub fn validation(
        policy: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            policy: policy.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 라벨 셀렉터 해석 에러
///
/// `NotFound`는 치명적 에러가 아니라 규칙 단위 경고로 처리됩니다.
/// 컴파일러는 해당 egress 규칙을 건너뛰고 나머지 규칙을 계속 집행합니다.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// 라벨에 매칭되는 서비스 없음
    #[error("no services found matching labels: {labels}")]
    NotFound { labels: String },

    /// 인벤토리 파일 로드 실패
    #[error("failed to load inventory '{path}': {reason}")]
    Inventory { path: String, reason: String },

    /// 디스커버리 백엔드 에러
    #[error("resolver backend error: {0}")]
    Backend(String),
}

/// 집행 백엔드 에러
#[derive(Debug, thiserror::Error)]
pub enum EnforceError {
    /// memlock 리소스 제한 해제 실패 (커널 프로그램 로드 전제 조건)
    #[error("failed to raise memlock rlimit: {reason}")]
    MemlockLimit { reason: String },

    /// 사전 컴파일된 eBPF 오브젝트 파일 없음
    #[error(
        "eBPF object file not found (searched {searched} locations); \
         build it first with: cargo run -p xtask -- build-ebpf"
    )]
    ObjectNotFound { searched: usize },

    /// eBPF 오브젝트 로드 실패
    #[error("failed to load eBPF object '{path}': {reason}")]
    ObjectLoad { path: String, reason: String },

    /// 오브젝트 내 프로그램/맵 누락
    #[error("eBPF object is missing '{name}'")]
    MissingEntity { name: String },

    /// 정책 맵 엔트리 기록 실패 (규칙 단위 경고로 처리)
    #[error("failed to update policy map: {reason}")]
    MapUpdate { reason: String },

    /// cgroup egress 훅 어태치 실패
    #[error("failed to attach to cgroup '{path}': {reason}")]
    Attach { path: String, reason: String },

    /// 상태 기계 위반 (예: Load 전에 Attach 호출)
    #[error("cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// 이미 닫힌 인포서에 대한 중복 Close
    #[error("enforcer already closed")]
    AlreadyClosed,

    /// 지원하지 않는 호스트 플랫폼
    #[error("no enforcement backend available for platform '{os}'")]
    UnsupportedPlatform { os: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_message_contains_policy_field_reason() {
        let err = PolicyError::validation("web-to-db", "apiVersion", "missing");
        let msg = err.to_string();
        assert!(msg.contains("web-to-db"));
        assert!(msg.contains("apiVersion"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn object_not_found_names_build_command() {
        let err = EnforceError::ObjectNotFound { searched: 5 };
        assert!(err.to_string().contains("cargo run -p xtask -- build-ebpf"));
    }

    #[test]
    fn invalid_state_message() {
        let err = EnforceError::InvalidState {
            operation: "attach",
            state: "Unloaded",
        };
        assert_eq!(err.to_string(), "cannot attach in state Unloaded");
    }

    #[test]
    fn zeroseg_error_from_domain_errors() {
        let err: ZerosegError = ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        }
        .into();
        assert!(matches!(err, ZerosegError::Config(_)));

        let err: ZerosegError = ResolveError::NotFound {
            labels: "app=web".to_owned(),
        }
        .into();
        assert!(matches!(err, ZerosegError::Resolve(_)));
    }
}
