//! 정책 검증 — 구조적/의미적 불변식 검사
//!
//! 검사는 고정된 순서로 수행되며 첫 번째 실패를 즉시 반환합니다
//! (결정적 에러 메시지). 부수 효과가 없는 순수 검사입니다.

use std::sync::OnceLock;

use regex::Regex;

use zeroseg_core::error::PolicyError;

use crate::cidr::Ipv4Cidr;
use crate::model::NetworkPolicy;

/// 허용되는 apiVersion 형식: `zeroseg/v<N>`
fn api_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^zeroseg/v\d+$").expect("static regex"))
}

/// DNS-1123 스타일 이름: 소문자 영숫자 + 하이픈, 하이픈으로 시작/끝 불가
fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex"))
}

impl NetworkPolicy {
    /// 정책의 유효성을 검증합니다.
    ///
    /// 검사 순서 (첫 실패 반환):
    /// 1. `apiVersion` 존재 + `zeroseg/v<N>` 형식
    /// 2. `kind == "NetworkPolicy"`
    /// 3. `metadata.name` 존재 + DNS-1123 형식
    /// 4. `spec.podSelector.matchLabels` 최소 1개
    /// 5. egress 규칙별 (순서대로): 셀렉터/CIDR 정확히 하나, CIDR 유효성,
    ///    포트 목록 비어있지 않음, 프로토콜/포트 범위
    pub fn validate(&self) -> Result<(), PolicyError> {
        let name = self.metadata.name.as_str();

        // apiVersion
        if self.api_version.is_empty() {
            return Err(PolicyError::validation(name, "apiVersion", "missing"));
        }
        if !api_version_re().is_match(&self.api_version) {
            return Err(PolicyError::validation(
                name,
                "apiVersion",
                "must be in format zeroseg/v1",
            ));
        }

        // kind
        if self.kind != "NetworkPolicy" {
            return Err(PolicyError::validation(
                name,
                "kind",
                "must be NetworkPolicy",
            ));
        }

        // metadata.name
        if name.is_empty() {
            return Err(PolicyError::validation(name, "metadata.name", "missing"));
        }
        if !name_re().is_match(name) {
            return Err(PolicyError::validation(
                name,
                "metadata.name",
                "must be lowercase alphanumeric with hyphens",
            ));
        }

        // podSelector
        if self.spec.pod_selector.match_labels.is_empty() {
            return Err(PolicyError::validation(
                name,
                "spec.podSelector",
                "must have at least one label",
            ));
        }

        // egress 규칙
        for (i, egress) in self.spec.egress.iter().enumerate() {
            let has_pod_selector = egress.to.has_pod_selector();
            let has_ip_block = egress.to.has_ip_block();

            if !has_pod_selector && !has_ip_block {
                return Err(PolicyError::validation(
                    name,
                    format!("spec.egress[{i}].to"),
                    "must specify either podSelector or ipBlock",
                ));
            }

            if has_pod_selector && has_ip_block {
                return Err(PolicyError::validation(
                    name,
                    format!("spec.egress[{i}].to"),
                    "cannot specify both podSelector and ipBlock",
                ));
            }

            if has_ip_block {
                if let Err(e) = egress.to.ip_block.cidr.parse::<Ipv4Cidr>() {
                    return Err(PolicyError::validation(
                        name,
                        format!("spec.egress[{i}].to.ipBlock.cidr"),
                        format!("invalid CIDR: {e}"),
                    ));
                }
            }

            if egress.ports.is_empty() {
                return Err(PolicyError::validation(
                    name,
                    format!("spec.egress[{i}].ports"),
                    "must specify at least one port",
                ));
            }

            for (j, port) in egress.ports.iter().enumerate() {
                if !matches!(port.protocol.as_str(), "TCP" | "UDP" | "ICMP") {
                    return Err(PolicyError::validation(
                        name,
                        format!("spec.egress[{i}].ports[{j}].protocol"),
                        "must be TCP, UDP, or ICMP",
                    ));
                }

                if port.port < 1 || port.port > 65535 {
                    return Err(PolicyError::validation(
                        name,
                        format!("spec.egress[{i}].ports[{j}].port"),
                        "must be between 1 and 65535",
                    ));
                }
            }
        }

        Ok(())
    }
}
