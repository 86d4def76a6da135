//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//! 레코더(익스포터)는 외부 서브시스템 소유이며 이 크레이트는 증가만 수행합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `zeroseg_`
//! - 접미어: `_total` (counter)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (TCP, UDP, ICMP)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 백엔드 레이블 키 (ebpf, pf)
pub const LABEL_BACKEND: &str = "backend";

/// 정책 레이블 키
pub const LABEL_POLICY: &str = "policy";

// ─── 집행 메트릭 ────────────────────────────────────────────────────

/// 집행 완료된 정책 수 (counter)
pub const POLICIES_ENFORCED_TOTAL: &str = "zeroseg_policies_enforced_total";

/// 허용된 플로우 수 (counter)
pub const FLOWS_ALLOWED_TOTAL: &str = "zeroseg_flows_allowed_total";

/// 차단된 플로우 수 (counter)
pub const FLOWS_BLOCKED_TOTAL: &str = "zeroseg_flows_blocked_total";

/// 컴파일된 규칙 수 (counter)
pub const RULES_COMPILED_TOTAL: &str = "zeroseg_rules_compiled_total";

/// 해석 실패로 건너뛴 egress 규칙 수 (counter)
pub const RULES_UNRESOLVED_TOTAL: &str = "zeroseg_rules_unresolved_total";

/// 정책 맵 기록 실패 수 (counter)
pub const MAP_UPDATE_FAILURES_TOTAL: &str = "zeroseg_map_update_failures_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(
        POLICIES_ENFORCED_TOTAL,
        "Total number of network policies enforced"
    );
    describe_counter!(
        FLOWS_ALLOWED_TOTAL,
        "Total number of egress flows allowed by policy"
    );
    describe_counter!(
        FLOWS_BLOCKED_TOTAL,
        "Total number of egress flows blocked by policy"
    );
    describe_counter!(
        RULES_COMPILED_TOTAL,
        "Total number of compiled filter rules"
    );
    describe_counter!(
        RULES_UNRESOLVED_TOTAL,
        "Total number of egress rules skipped because label resolution failed"
    );
    describe_counter!(
        MAP_UPDATE_FAILURES_TOTAL,
        "Total number of policy map entry writes that failed"
    );
}
