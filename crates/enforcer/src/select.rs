//! 백엔드 선택 — 호스트 플랫폼에 따른 집행 백엔드 결정
//!
//! 선택은 빌드 타임 조건부 컴파일이 아니라 런타임 플랫폼 값의 순수
//! 함수이므로, 테스트에서 임의 플랫폼으로 선택 로직을 검증할 수
//! 있습니다. (커널 백엔드 자체는 Linux 빌드에서만 존재합니다.)

use tracing::info;

use zeroseg_core::backend::{HostPlatform, PolicyBackend};
use zeroseg_core::config::EnforcerConfig;
use zeroseg_core::error::EnforceError;

use crate::pf::PfEnforcer;

/// 플랫폼에 맞는 집행 백엔드를 생성합니다.
///
/// - Linux: 커널 eBPF 백엔드 (프로덕션)
/// - macOS: pf 텍스트 폴백 (개발 전용)
/// - 그 외: [`EnforceError::UnsupportedPlatform`]
pub fn select_backend(
    platform: &HostPlatform,
    config: &EnforcerConfig,
) -> Result<Box<dyn PolicyBackend>, EnforceError> {
    match platform {
        HostPlatform::Linux => {
            #[cfg(target_os = "linux")]
            {
                let enforcer = crate::kernel::EbpfEnforcer::create(config)?;
                info!(backend = enforcer.name(), "selected kernel enforcement backend");
                Ok(Box::new(enforcer))
            }
            #[cfg(not(target_os = "linux"))]
            {
                let _ = config;
                Err(EnforceError::UnsupportedPlatform {
                    os: "linux (binary built without kernel backend)".to_owned(),
                })
            }
        }
        HostPlatform::MacOs => {
            let enforcer = PfEnforcer::new(config);
            info!(
                backend = enforcer.name(),
                "selected pf fallback backend (development only)"
            );
            Ok(Box::new(enforcer))
        }
        HostPlatform::Other(os) => Err(EnforceError::UnsupportedPlatform { os: os.clone() }),
    }
}
