//! pf 텍스트 폴백 백엔드 — 앵커 룰셋 렌더링 + pfctl 리로드 (macOS)
//!
//! 컴파일된 규칙을 pf 앵커 텍스트로 렌더링하여 고정 앵커 파일에 쓰고,
//! 메인 pf.conf가 앵커를 참조하도록 보장한 뒤 리로드합니다.
//!
//! # 의도된 비대칭
//! 커널 백엔드는 허용 목록(allow-list, 기본 차단)인 반면 이 백엔드는
//! 차단 목록(block-list, 기본 허용)을 렌더링합니다. 이 반전은 원래
//! 동작을 보존한 의도된 비대칭이며, 이 백엔드가 개발 전용인 이유 중
//! 하나입니다. 운영자에게 커널 백엔드와 동급의 프로덕션 보증으로
//! 제시되어서는 안 됩니다.
//!
//! 권한 부족으로 인한 실패는 모두 경고 로그로 처리되며 치명적이지
//! 않습니다.

use std::path::PathBuf;
use std::process::Command;

use metrics::counter;
use tracing::{info, warn};

use zeroseg_core::backend::PolicyBackend;
use zeroseg_core::config::EnforcerConfig;
use zeroseg_core::error::EnforceError;
use zeroseg_core::metrics::{LABEL_BACKEND, POLICIES_ENFORCED_TOTAL};
use zeroseg_core::types::{CompiledPolicy, Protocol, RuleScope};

/// pf.conf에 추가되는 앵커 참조 라인의 식별 문자열
const ANCHOR_NAME: &str = "zeroseg";

/// 미해석 셀렉터에 적용되는 광역 차단 대상 서브넷
///
/// 인벤토리 해석이 없을 때의 조잡한 폴백이며 보안 보증이 아닙니다.
const UNRESOLVED_FALLBACK_SUBNET: &str = "192.168.0.0/16";

/// pf 앵커 텍스트 인포서
pub struct PfEnforcer {
    anchor_path: PathBuf,
    conf_path: PathBuf,
}

impl PfEnforcer {
    /// 설정에서 인포서를 생성합니다.
    pub fn new(config: &EnforcerConfig) -> Self {
        Self {
            anchor_path: PathBuf::from(&config.pf_anchor_path),
            conf_path: PathBuf::from(&config.pf_conf_path),
        }
    }

    /// 명시적 경로로 인포서를 생성합니다 (테스트용).
    pub fn with_paths(anchor_path: impl Into<PathBuf>, conf_path: impl Into<PathBuf>) -> Self {
        Self {
            anchor_path: anchor_path.into(),
            conf_path: conf_path.into(),
        }
    }

    /// 컴파일된 정책 목록을 앵커 룰셋 텍스트로 렌더링합니다 (순수 함수).
    ///
    /// - CIDR 파생 규칙: 프로토콜/포트별 명시적 차단 라인 (전체 프리픽스 사용)
    /// - 해석된 셀렉터 규칙: 주소별 명시적 차단 라인
    /// - 미해석 셀렉터: 주석 + 광역 서브넷 차단
    pub fn render_anchor(policies: &[CompiledPolicy]) -> String {
        let mut out = String::from("# zeroseg managed rules\n");

        for policy in policies {
            out.push_str(&format!("# policy: {}\n", policy.name));

            for rule in &policy.rules {
                let target = match rule.scope {
                    RuleScope::Cidr { prefix_len } => format!("{}/{}", rule.address, prefix_len),
                    RuleScope::Resolved => rule.address.to_string(),
                };
                let proto = rule.protocol.as_str().to_ascii_lowercase();
                if rule.protocol == Protocol::Icmp {
                    out.push_str(&format!(
                        "block out quick proto {proto} from any to {target}\n"
                    ));
                } else {
                    out.push_str(&format!(
                        "block out quick proto {proto} from any to {target} port = {}\n",
                        rule.port
                    ));
                }
            }

            for selector in &policy.unresolved {
                out.push_str(&format!(
                    "# unresolved selector ({selector}): inventory resolution pending\n"
                ));
                out.push_str(&format!(
                    "block out quick from any to {UNRESOLVED_FALLBACK_SUBNET}\n"
                ));
            }
        }

        out
    }

    /// 렌더링된 텍스트를 앵커 파일에 씁니다.
    ///
    /// 실패는 경고로만 기록합니다 (보통 권한 부족).
    fn write_anchor(&self, text: &str) -> bool {
        if let Some(parent) = self.anchor_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    path = %parent.display(),
                    error = %e,
                    "failed to create pf anchor directory (need elevated privileges?)"
                );
                return false;
            }
        }

        match std::fs::write(&self.anchor_path, text) {
            Ok(()) => {
                info!(path = %self.anchor_path.display(), "wrote pf anchor ruleset");
                true
            }
            Err(e) => {
                warn!(
                    path = %self.anchor_path.display(),
                    error = %e,
                    "failed to write pf anchor file (need elevated privileges?)"
                );
                false
            }
        }
    }

    /// 메인 pf.conf가 앵커를 참조하는지 확인하고, 없으면 추가합니다.
    fn ensure_anchor_reference(&self) {
        let needle = format!("anchor \"{ANCHOR_NAME}\"");

        let existing = std::fs::read_to_string(&self.conf_path).unwrap_or_default();
        if existing.contains(&needle) {
            return;
        }

        let reference = format!(
            "{needle}\nload anchor \"{ANCHOR_NAME}\" from \"{}\"\n",
            self.anchor_path.display()
        );

        let result = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.conf_path)
            .and_then(|mut f| {
                use std::io::Write as _;
                f.write_all(reference.as_bytes())
            });

        if let Err(e) = result {
            warn!(
                path = %self.conf_path.display(),
                error = %e,
                "failed to add anchor reference to pf.conf"
            );
        }
    }

    /// pfctl로 설정을 리로드합니다.
    fn reload(&self) {
        match Command::new("pfctl")
            .arg("-f")
            .arg(&self.conf_path)
            .status()
        {
            Ok(status) if status.success() => {
                info!("pf ruleset reloaded");
            }
            Ok(status) => {
                warn!(%status, "pfctl reload exited with failure");
            }
            Err(e) => {
                warn!(error = %e, "failed to run pfctl (need elevated privileges?)");
            }
        }
    }
}

impl PolicyBackend for PfEnforcer {
    fn name(&self) -> &'static str {
        "pf"
    }

    fn production_grade(&self) -> bool {
        false
    }

    fn apply(&mut self, policies: &[CompiledPolicy]) -> Result<(), EnforceError> {
        warn!(
            "pf backend is a development-only fallback and is not production-equivalent \
             to the kernel backend"
        );

        let text = Self::render_anchor(policies);
        if self.write_anchor(&text) {
            self.ensure_anchor_reference();
            self.reload();
        }

        counter!(POLICIES_ENFORCED_TOTAL, LABEL_BACKEND => "pf")
            .increment(policies.len() as u64);
        Ok(())
    }

    fn close(&mut self) -> Result<(), EnforceError> {
        // 보유 리소스 없음
        Ok(())
    }
}
