//! eBPF 오브젝트 탐색 — 사전 컴파일된 filter.o 위치 결정
//!
//! 커널 백엔드는 런타임 컴파일을 하지 않습니다. `cargo run -p xtask --
//! build-ebpf`가 미리 만들어 둔 오브젝트 파일을 고정 순서의 후보 경로에서
//! 탐색하고, 첫 번째로 존재하는 파일을 사용합니다.

use std::path::{Path, PathBuf};

use tracing::debug;

use zeroseg_core::error::EnforceError;

/// 기본 탐색 후보 경로를 순서대로 반환합니다.
///
/// 1. 저장소 루트 기준 `bpf/filter.o` (이 크레이트의 매니페스트 위치에서 유도;
///    체크아웃 내 임의 디렉토리에서 실행해도 동작)
/// 2. 현재 작업 디렉토리 기준 `bpf/filter.o`
/// 3. 패키지 디렉토리 기준 `../../bpf/filter.o`
/// 4. 시스템 전역 설치 경로
/// 5. 사용자별 설정 경로 (`$HOME/.zeroseg/bpf/filter.o`)
pub fn search_candidates(home: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bpf/filter.o"),
        PathBuf::from("bpf/filter.o"),
        PathBuf::from("../../bpf/filter.o"),
        PathBuf::from("/usr/local/share/zeroseg/bpf/filter.o"),
    ];
    if let Some(home) = home {
        candidates.push(home.join(".zeroseg/bpf/filter.o"));
    }
    candidates
}

/// 후보 목록에서 첫 번째로 존재하는 파일을 반환합니다.
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// 오브젝트 파일 경로를 결정합니다.
///
/// `override_path`가 설정되면 탐색 없이 해당 경로만 확인합니다.
///
/// # Errors
/// 파일을 찾지 못하면 [`EnforceError::ObjectNotFound`] — 운영자에게
/// 빌드 명령을 안내하는 치명적 에러입니다.
pub fn find_object(override_path: Option<&Path>) -> Result<PathBuf, EnforceError> {
    if let Some(path) = override_path {
        if path.is_file() {
            debug!(path = %path.display(), "using configured eBPF object path");
            return Ok(path.to_path_buf());
        }
        return Err(EnforceError::ObjectNotFound { searched: 1 });
    }

    let home = std::env::var_os("HOME").map(PathBuf::from);
    let candidates = search_candidates(home.as_deref());

    match first_existing(&candidates) {
        Some(path) => {
            debug!(path = %path.display(), "found eBPF object");
            Ok(path)
        }
        None => Err(EnforceError::ObjectNotFound {
            searched: candidates.len(),
        }),
    }
}
