//! 커널 인포서 — eBPF 프로그램 로드/맵 채움/cgroup 어태치 (Linux 전용)
//!
//! [`EbpfEnforcer`]는 사전 컴파일된 필터 오브젝트를 로드하고, 컴파일된
//! 규칙으로 정책 맵을 채운 뒤, cgroup egress 훅에 프로그램을 어태치합니다.
//! 런타임 컴파일은 하지 않습니다 — 오브젝트가 없으면 빌드를 안내하는
//! 치명적 에러를 반환합니다.
//!
//! # 리소스 해제
//! 로드된 프로그램/맵 핸들과 어태치 링크는 모두 소유 값으로 보관되며,
//! [`EbpfEnforcer::close`] 또는 드롭 시 링크 → 맵/프로그램 순서로
//! 해제됩니다. 에러로 일찍 반환하는 경로를 포함한 모든 종료 경로에서
//! 해제가 보장됩니다 (RAII).
//!
//! # 필요 권한
//! CAP_BPF + CAP_NET_ADMIN (또는 root).

use std::path::Path;

use aya::Ebpf;
use aya::maps::HashMap as PolicyMapHandle;
use aya::programs::cgroup_skb::CgroupSkbLink;
use aya::programs::{CgroupAttachMode, CgroupSkb, CgroupSkbAttachType};
use metrics::counter;
use tracing::{debug, info, warn};

use zeroseg_core::config::EnforcerConfig;
use zeroseg_core::error::EnforceError;
use zeroseg_core::metrics::MAP_UPDATE_FAILURES_TOTAL;
use zeroseg_core::types::{CompiledPolicy, ip_to_u32};
use zeroseg_ebpf_common::{
    MAP_POLICY, PROG_FILTER_EGRESS, PROG_FILTER_EGRESS_PERMISSIVE, PolicyKey, PolicyValue,
};

use crate::object;
use crate::state::EnforcerState;

/// eBPF 커널 인포서
///
/// 상태 기계 `Unloaded → Loaded → Attached → Closed`를 소유합니다.
/// 인스턴스는 집행 호출마다 새로 생성되며 동시 호출 간에 공유되지
/// 않습니다.
pub struct EbpfEnforcer {
    config: EnforcerConfig,
    state: EnforcerState,
    /// 로드된 eBPF 오브젝트 핸들 (프로그램 + 맵 소유)
    bpf: Option<Ebpf>,
    /// 어태치된 cgroup 링크 (드롭 시 디태치)
    links: Vec<CgroupSkbLink>,
    /// 선택된 프로그램 변형 이름
    program_name: &'static str,
}

impl EbpfEnforcer {
    /// 인포서를 생성하고 커널 프로그램 로드에 필요한 memlock 제한을
    /// 해제합니다.
    ///
    /// # Errors
    /// 제한을 해제할 수 없으면 [`EnforceError::MemlockLimit`] (치명적).
    pub fn create(config: &EnforcerConfig) -> Result<Self, EnforceError> {
        raise_memlock_limit()?;
        Ok(Self::new_unloaded(config.clone()))
    }

    /// rlimit 조작 없이 Unloaded 인스턴스를 만듭니다.
    fn new_unloaded(config: EnforcerConfig) -> Self {
        let program_name = if config.permissive {
            PROG_FILTER_EGRESS_PERMISSIVE
        } else {
            PROG_FILTER_EGRESS
        };
        Self {
            config,
            state: EnforcerState::Unloaded,
            bpf: None,
            links: Vec::new(),
            program_name,
        }
    }

    /// 현재 상태를 반환합니다.
    pub fn state(&self) -> EnforcerState {
        self.state
    }

    /// 오브젝트를 로드하고 컴파일된 규칙으로 정책 맵을 채웁니다.
    ///
    /// 규칙 단위 기록 실패는 경고로 남기고 나머지 규칙을 계속
    /// 진행합니다. 동일 키 재기록은 덮어쓰기이므로 중복 설치는
    /// 에러 없이 성공합니다.
    ///
    /// # Errors
    /// - [`EnforceError::ObjectNotFound`]: 사전 빌드된 오브젝트 없음
    /// - [`EnforceError::ObjectLoad`]: 오브젝트/프로그램 로드 실패
    /// - [`EnforceError::InvalidState`]: Unloaded 상태가 아님
    pub fn load_policies(&mut self, policies: &[CompiledPolicy]) -> Result<(), EnforceError> {
        if self.state != EnforcerState::Unloaded {
            return Err(EnforceError::InvalidState {
                operation: "load policies",
                state: self.state.as_str(),
            });
        }

        let override_path = self.config.bpf_object.as_deref().map(Path::new);
        let object_path = object::find_object(override_path)?;

        let mut bpf = Ebpf::load_file(&object_path).map_err(|e| EnforceError::ObjectLoad {
            path: object_path.display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %object_path.display(), "loaded eBPF object");

        {
            let program: &mut CgroupSkb = bpf
                .program_mut(self.program_name)
                .ok_or_else(|| EnforceError::MissingEntity {
                    name: self.program_name.to_owned(),
                })?
                .try_into()
                .map_err(|e: aya::programs::ProgramError| EnforceError::ObjectLoad {
                    path: object_path.display().to_string(),
                    reason: e.to_string(),
                })?;
            program.load().map_err(|e| EnforceError::ObjectLoad {
                path: object_path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let map = bpf
            .map_mut(MAP_POLICY)
            .ok_or_else(|| EnforceError::MissingEntity {
                name: MAP_POLICY.to_owned(),
            })?;
        let mut policy_map: PolicyMapHandle<_, PolicyKey, PolicyValue> =
            PolicyMapHandle::try_from(map).map_err(|e| EnforceError::MapUpdate {
                reason: e.to_string(),
            })?;

        let mut installed = 0usize;
        for policy in policies {
            for rule in &policy.rules {
                let key = PolicyKey::new(
                    ip_to_u32(Some(rule.address)),
                    rule.port,
                    rule.protocol.number(),
                );
                let value = PolicyValue::new(rule.action.code());

                match policy_map.insert(key, value, 0) {
                    Ok(()) => {
                        installed += 1;
                        debug!(
                            policy = %policy.name,
                            address = %rule.address,
                            port = rule.port,
                            protocol = %rule.protocol,
                            action = %rule.action,
                            "installed policy map entry"
                        );
                    }
                    Err(e) => {
                        warn!(
                            policy = %policy.name,
                            address = %rule.address,
                            port = rule.port,
                            error = %e,
                            "failed to add rule to policy map, continuing"
                        );
                        counter!(MAP_UPDATE_FAILURES_TOTAL).increment(1);
                    }
                }
            }

            for selector in &policy.unresolved {
                warn!(
                    policy = %policy.name,
                    selector = %selector,
                    "egress rule skipped: label selector did not resolve"
                );
            }
        }

        self.bpf = Some(bpf);
        self.state = EnforcerState::Loaded;
        info!(
            rules = installed,
            program = self.program_name,
            "policy map populated"
        );
        Ok(())
    }

    /// 로드된 프로그램을 주어진 cgroup의 egress 훅에 어태치합니다.
    ///
    /// # Errors
    /// - [`EnforceError::InvalidState`]: `load_policies` 전에 호출됨
    /// - [`EnforceError::Attach`]: cgroup 열기 실패 또는 커널 어태치 거부
    ///   (주로 권한 부족 또는 경로 없음)
    pub fn attach(&mut self, cgroup_path: &Path) -> Result<(), EnforceError> {
        if !matches!(self.state, EnforcerState::Loaded | EnforcerState::Attached) {
            return Err(EnforceError::InvalidState {
                operation: "attach",
                state: self.state.as_str(),
            });
        }

        let bpf = self.bpf.as_mut().ok_or(EnforceError::InvalidState {
            operation: "attach",
            state: "Unloaded",
        })?;

        let cgroup = std::fs::File::open(cgroup_path).map_err(|e| EnforceError::Attach {
            path: cgroup_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let program: &mut CgroupSkb = bpf
            .program_mut(self.program_name)
            .ok_or_else(|| EnforceError::MissingEntity {
                name: self.program_name.to_owned(),
            })?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| EnforceError::Attach {
                path: cgroup_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let link_id = program
            .attach(&cgroup, CgroupSkbAttachType::Egress, CgroupAttachMode::Single)
            .map_err(|e| EnforceError::Attach {
                path: cgroup_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let link = program
            .take_link(link_id)
            .map_err(|e| EnforceError::Attach {
                path: cgroup_path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.links.push(link);
        self.state = EnforcerState::Attached;
        info!(cgroup = %cgroup_path.display(), "eBPF program attached to egress hook");
        Ok(())
    }

    /// 모든 링크를 디태치한 뒤 맵/프로그램 핸들을 닫습니다.
    ///
    /// 어느 상태에서 호출해도 안전합니다. 이미 닫힌 인포서에 대한
    /// 중복 Close는 에러를 반환하지만 보유 리소스는 없습니다.
    pub fn close(&mut self) -> Result<(), EnforceError> {
        if self.state == EnforcerState::Closed {
            return Err(EnforceError::AlreadyClosed);
        }

        // 링크 → 맵/프로그램 순서로 해제 (드롭이 디태치/클로즈 수행)
        self.links.clear();
        self.bpf = None;
        self.state = EnforcerState::Closed;
        debug!("kernel enforcer closed");
        Ok(())
    }
}

impl zeroseg_core::backend::PolicyBackend for EbpfEnforcer {
    fn name(&self) -> &'static str {
        "ebpf"
    }

    fn production_grade(&self) -> bool {
        true
    }

    fn apply(&mut self, policies: &[CompiledPolicy]) -> Result<(), EnforceError> {
        self.load_policies(policies)?;
        let cgroup_path = self.config.cgroup_path.clone();
        self.attach(Path::new(&cgroup_path))?;

        counter!(
            zeroseg_core::metrics::POLICIES_ENFORCED_TOTAL,
            zeroseg_core::metrics::LABEL_BACKEND => "ebpf"
        )
        .increment(policies.len() as u64);
        Ok(())
    }

    fn close(&mut self) -> Result<(), EnforceError> {
        Self::close(self)
    }
}

/// 커널 프로그램 로드를 위해 RLIMIT_MEMLOCK을 해제합니다.
fn raise_memlock_limit() -> Result<(), EnforceError> {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };

    // SAFETY: rlim은 유효한 rlimit 구조체이며 setrlimit은 이를 읽기만 합니다.
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        return Err(EnforceError::MemlockLimit {
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}
