//! 정책 문서 모델 — NetworkPolicy 구조체 및 YAML 로딩
//!
//! 정책 문서의 와이어 포맷은 케이스 민감한 camelCase 필드명을 사용합니다
//! (`apiVersion`, `podSelector`, `matchLabels`, `ipBlock` 등).
//! 모든 필드는 기본값으로 역직렬화되므로 누락된 필드는 파싱 에러가 아니라
//! [`NetworkPolicy::validate`]의 순서 있는 검증 에러로 드러납니다.
//!
//! 하나의 파일에 `---` 구분자로 여러 정책 문서를 담을 수 있습니다.
//! 구조적으로 잘못된 문서가 하나라도 있으면 로드 전체가 실패합니다.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use zeroseg_core::error::{PolicyError, ZerosegError};

/// 제로 트러스트 egress 정책 문서
///
/// 로드 후 검증을 거치면 불변으로 취급되며, 컴파일이 끝나면 폐기됩니다
/// (영속화 없음).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkPolicy {
    /// API 버전 (`zeroseg/v1` 형식)
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    /// 문서 종류 (`NetworkPolicy` 고정)
    #[serde(default)]
    pub kind: String,
    /// 메타데이터
    #[serde(default)]
    pub metadata: Metadata,
    /// 정책 본문
    #[serde(default)]
    pub spec: PolicySpec,
}

/// 정책 메타데이터
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// 정책 이름 (DNS-1123 스타일 토큰)
    #[serde(default)]
    pub name: String,
}

/// 정책 본문
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySpec {
    /// 정책이 적용되는 소스 워크로드 셀렉터
    #[serde(rename = "podSelector", default)]
    pub pod_selector: PodSelector,
    /// egress 규칙 목록 (순서 보존)
    #[serde(default)]
    pub egress: Vec<EgressRule>,
}

/// 라벨 셀렉터
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodSelector {
    /// 매칭할 라벨 집합
    #[serde(rename = "matchLabels", default)]
    pub match_labels: BTreeMap<String, String>,
}

/// egress 규칙 — 목적지 지정 + 포트 목록
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EgressRule {
    /// 목적지 지정 (셀렉터 또는 CIDR 중 정확히 하나)
    #[serde(default)]
    pub to: EgressTarget,
    /// 허용할 포트 목록 (비어있으면 검증 실패)
    #[serde(default)]
    pub ports: Vec<PortRule>,
}

/// egress 목적지
///
/// 셀렉터와 CIDR은 상호 배타적입니다. 비어있는 셀렉터/CIDR은
/// "지정되지 않음"으로 취급합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EgressTarget {
    /// 목적지 워크로드 라벨 셀렉터
    #[serde(rename = "podSelector", default)]
    pub pod_selector: PodSelector,
    /// 목적지 CIDR 블록
    #[serde(rename = "ipBlock", default)]
    pub ip_block: IpBlock,
}

impl EgressTarget {
    /// 라벨 셀렉터가 지정되었는지 (비어있지 않은지) 확인합니다.
    pub fn has_pod_selector(&self) -> bool {
        !self.pod_selector.match_labels.is_empty()
    }

    /// CIDR이 지정되었는지 확인합니다.
    pub fn has_ip_block(&self) -> bool {
        !self.ip_block.cidr.is_empty()
    }
}

/// CIDR 블록 지정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpBlock {
    /// CIDR 표기 (예: `10.0.0.0/8`)
    #[serde(default)]
    pub cidr: String,
}

/// 포트 규칙
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortRule {
    /// 프로토콜 (TCP, UDP, ICMP)
    #[serde(default)]
    pub protocol: String,
    /// 포트 번호 (1..65535)
    ///
    /// 범위 밖 값이 파싱 에러가 아니라 검증 에러로 드러나도록
    /// i64로 운반합니다.
    #[serde(default)]
    pub port: i64,
}

/// 멀티 문서 YAML 스트림에서 정책 목록을 로드합니다.
///
/// 빈 문서(후행 `---` 등)는 건너뜁니다.
///
/// # Errors
/// 구조적으로 잘못된 문서가 하나라도 있으면 [`PolicyError::Parse`]로
/// 로드 전체를 중단합니다.
pub fn load_documents(data: &str) -> Result<Vec<NetworkPolicy>, PolicyError> {
    let mut policies = Vec::new();
    for document in serde_yaml::Deserializer::from_str(data) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| PolicyError::Parse {
            reason: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }
        let policy: NetworkPolicy =
            serde_yaml::from_value(value).map_err(|e| PolicyError::Parse {
                reason: e.to_string(),
            })?;
        policies.push(policy);
    }
    Ok(policies)
}

/// YAML 파일에서 정책 목록을 로드합니다.
pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<NetworkPolicy>, ZerosegError> {
    let path = path.as_ref();
    let data = tokio::fs::read_to_string(path).await?;
    let policies = load_documents(&data)?;
    tracing::debug!(
        path = %path.display(),
        count = policies.len(),
        "loaded policy documents"
    );
    Ok(policies)
}
