#![no_std]
#![no_main]

use aya_ebpf::{
    macros::{cgroup_skb, map},
    maps::HashMap,
    programs::SkBuffContext,
};

use zeroseg_ebpf_common::{
    ACTION_ALLOW, ACTION_BLOCK, POLICY_MAP_CAPACITY, PolicyKey, PolicyValue, SKB_DROP, SKB_PASS,
};

// 헤더 오프셋 (바이트). IPv4 헤더는 옵션 없는 20바이트 고정으로 가정.
const ETH_ETHERTYPE_OFF: usize = 12;
const ETH_HDR_LEN: usize = 14;
const IP_PROTO_OFF: usize = ETH_HDR_LEN + 9;
const IP_DST_OFF: usize = ETH_HDR_LEN + 16;
const L4_DPORT_OFF: usize = ETH_HDR_LEN + 20 + 2;

/// IPv4 EtherType (네트워크 바이트 오더)
const ETHERTYPE_IPV4: [u8; 2] = [0x08, 0x00];

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// 정책 맵 — 유저스페이스가 어태치 전에 채우고, 어태치 이후에는
/// 변경하지 않으므로 패킷 처리 중 조회에 별도 동기화가 필요 없음
#[map]
static POLICY_MAP: HashMap<PolicyKey, PolicyValue> =
    HashMap::with_max_entries(POLICY_MAP_CAPACITY, 0);

/// egress 패킷에서 정책 조회 키를 추출합니다.
///
/// 멀티바이트 필드는 와이어 순서 그대로의 바이트 배열로 읽어
/// 유저스페이스와 동일한 키 인코딩을 얻습니다. 비IPv4 또는 헤더
/// 경계를 벗어난 패킷은 Err — 호출측이 기본 허용으로 처리합니다
/// (적용 범위는 IPv4 전용).
fn parse_lookup_key(ctx: &SkBuffContext) -> Result<PolicyKey, ()> {
    let ethertype: [u8; 2] = ctx.load(ETH_ETHERTYPE_OFF).map_err(|_| ())?;
    if ethertype != ETHERTYPE_IPV4 {
        return Err(());
    }

    let protocol: u8 = ctx.load(IP_PROTO_OFF).map_err(|_| ())?;
    let dst_addr: [u8; 4] = ctx.load(IP_DST_OFF).map_err(|_| ())?;

    // TCP/UDP만 목적지 포트 추출, ICMP와 그 외 프로토콜은 포트 0
    let dst_port: [u8; 2] = if protocol == IPPROTO_TCP || protocol == IPPROTO_UDP {
        ctx.load(L4_DPORT_OFF).map_err(|_| ())?
    } else {
        [0, 0]
    };

    Ok(PolicyKey::from_wire(dst_addr, dst_port, protocol))
}

/// 엄격 모드 — 매칭되는 정책이 없으면 차단 (제로 트러스트 기본값)
#[cgroup_skb(egress)]
pub fn filter_egress(ctx: SkBuffContext) -> i32 {
    let key = match parse_lookup_key(&ctx) {
        Ok(key) => key,
        Err(()) => return SKB_PASS,
    };

    match unsafe { POLICY_MAP.get(&key) } {
        Some(value) if value.action == ACTION_ALLOW => SKB_PASS,
        Some(_) => SKB_DROP,
        // 기본 차단: 컴파일된 규칙에 없는 목적지는 거부
        None => SKB_DROP,
    }
}

/// 허용 모드 — 명시적 차단 엔트리만 적용 (단계적 롤아웃/테스트 전용,
/// 프로덕션 자세로 사용 금지)
#[cgroup_skb(egress)]
pub fn filter_egress_permissive(ctx: SkBuffContext) -> i32 {
    let key = match parse_lookup_key(&ctx) {
        Ok(key) => key,
        Err(()) => return SKB_PASS,
    };

    match unsafe { POLICY_MAP.get(&key) } {
        Some(value) if value.action == ACTION_BLOCK => SKB_DROP,
        _ => SKB_PASS,
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
