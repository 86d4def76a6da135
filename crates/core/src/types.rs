//! 도메인 타입 — 프로토콜, 액션, 컴파일된 규칙
//!
//! 정책 컴파일러의 출력([`CompiledRule`], [`CompiledPolicy`])과
//! 커널/유저스페이스 양쪽에서 쓰이는 숫자 매핑 헬퍼를 정의합니다.
//! 컴파일된 규칙은 한 번의 로드/어태치 사이클 동안만 존재하며
//! 집행 실행마다 다시 생성됩니다.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// IANA 프로토콜 번호: TCP
pub const PROTO_TCP: u8 = 6;
/// IANA 프로토콜 번호: UDP
pub const PROTO_UDP: u8 = 17;
/// IANA 프로토콜 번호: ICMP
pub const PROTO_ICMP: u8 = 1;

/// 지원 프로토콜
///
/// 정책 문서의 `ports[].protocol` 필드에 대응합니다.
/// 포트 비교가 의미 없는 ICMP는 조회 키에서 포트 0을 사용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// 프로토콜 이름을 파싱합니다 (대소문자 무시).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "TCP" => Some(Self::Tcp),
            "UDP" => Some(Self::Udp),
            "ICMP" => Some(Self::Icmp),
            _ => None,
        }
    }

    /// IANA 프로토콜 번호를 반환합니다.
    pub const fn number(self) -> u8 {
        match self {
            Self::Tcp => PROTO_TCP,
            Self::Udp => PROTO_UDP,
            Self::Icmp => PROTO_ICMP,
        }
    }

    /// 정책 문서 표기 그대로의 이름을 반환합니다.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Icmp => "ICMP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 프로토콜 이름을 IANA 번호로 변환합니다.
///
/// 알 수 없는 이름은 0을 반환합니다 (조회 키의 "미지정" 값).
pub fn protocol_number(name: &str) -> u8 {
    Protocol::parse(name).map_or(0, Protocol::number)
}

/// 규칙 액션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// 패킷 차단 (정책 맵 값 0)
    Block,
    /// 패킷 허용 (정책 맵 값 1)
    Allow,
}

impl Action {
    /// 정책 맵 값 인코딩을 반환합니다 (0=block, 1=allow).
    pub const fn code(self) -> u8 {
        match self {
            Self::Block => 0,
            Self::Allow => 1,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::Allow => f.write_str("allow"),
        }
    }
}

/// 규칙 출처
///
/// CIDR에서 파생된 규칙은 프리픽스 길이를 보존합니다.
/// 커널 백엔드는 대표 주소(네트워크 주소)만 사용하지만,
/// pf 텍스트 백엔드는 전체 프리픽스를 렌더링해야 합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// CIDR 규칙 — 대표 주소는 네트워크 주소, 프리픽스 길이 보존
    Cidr { prefix_len: u8 },
    /// 라벨 셀렉터 해석으로 얻은 단일 주소
    Resolved,
}

/// 컴파일된 필터 규칙
///
/// (egress 규칙 × 해석된 주소 × 포트 엔트리) 조합마다 하나씩 생성됩니다.
/// 한 번의 로드 내에서 (address, port, protocol) 트리플은 유일하며,
/// 중복은 거부가 아니라 멱등하게 무시됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledRule {
    /// 목적지 IPv4 주소
    pub address: Ipv4Addr,
    /// 목적지 포트 (ICMP는 0)
    pub port: u16,
    /// 프로토콜
    pub protocol: Protocol,
    /// 적용할 액션
    pub action: Action,
    /// 규칙 출처
    pub scope: RuleScope,
}

impl CompiledRule {
    /// 중복 제거용 조회 키를 반환합니다.
    pub fn key(&self) -> (u32, u16, u8) {
        (
            ip_to_u32(Some(self.address)),
            self.port,
            self.protocol.number(),
        )
    }
}

/// 하나의 정책에서 컴파일된 결과
///
/// `unresolved`에는 해석에 실패한 라벨 셀렉터가 포맷된 형태로 남습니다.
/// pf 폴백 렌더러와 운영자 경고 로그가 이 목록을 소비합니다.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    /// 정책 이름 (`metadata.name`)
    pub name: String,
    /// 컴파일된 규칙 목록
    pub rules: Vec<CompiledRule>,
    /// 해석 실패한 라벨 셀렉터 (예: `"app=web,tier=db"`)
    pub unresolved: Vec<String>,
}

impl CompiledPolicy {
    /// 규칙이 하나도 없고 미해석 셀렉터도 없으면 true
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.unresolved.is_empty()
    }
}

/// IPv4 주소를 host-order u32로 변환합니다.
///
/// `None`은 0으로 매핑됩니다 (원본 주소가 없는 경우의 "미지정" 값).
pub fn ip_to_u32(addr: Option<Ipv4Addr>) -> u32 {
    match addr {
        Some(ip) => u32::from_be_bytes(ip.octets()),
        None => 0,
    }
}

/// 라벨 셀렉터를 결정적 문자열로 포맷합니다 (`key=value,...`, 키 정렬 순서).
pub fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
