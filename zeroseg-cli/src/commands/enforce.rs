//! `enforce` 서브커맨드 — 로드 → 검증 → 컴파일 → 백엔드 집행
//!
//! 검증 실패와 어태치 실패는 0이 아닌 종료 코드로 끝나는 치명적
//! 에러입니다. 해석/맵 기록 실패는 하위 계층이 경고로 복구하므로
//! 부분적으로 해석 가능한 정책도 해석된 규칙만큼은 집행됩니다.

use std::time::Duration;

use zeroseg_core::backend::{HostPlatform, PolicyBackend as _};
use zeroseg_core::config::ZerosegConfig;
use zeroseg_enforcer::select_backend;
use zeroseg_policy::{CachingResolver, PolicyCompiler, StaticResolver};

use crate::cli::EnforceArgs;
use crate::error::CliError;

/// enforce 커맨드를 실행합니다.
pub async fn run(args: EnforceArgs, mut config: ZerosegConfig) -> Result<(), CliError> {
    // CLI 인자가 설정 파일보다 우선
    if let Some(cgroup) = &args.cgroup {
        config.enforcer.cgroup_path = cgroup.display().to_string();
    }
    if args.permissive {
        config.enforcer.permissive = true;
    }
    if let Some(inventory) = &args.inventory {
        config.resolver.inventory = Some(inventory.display().to_string());
    }

    // 1. 로드
    let policies = zeroseg_policy::load_from_file(&args.file).await?;
    println!(
        "Loaded {} policy(ies) from {}",
        policies.len(),
        args.file.display()
    );

    // 2. 검증 — 첫 실패가 로드 전체를 중단
    for policy in &policies {
        policy.validate()?;
    }

    // 3. 컴파일 (라벨 해석 포함)
    let inventory = match &config.resolver.inventory {
        Some(path) => StaticResolver::load_from_file(path).await?,
        None => StaticResolver::new(),
    };
    let resolver = CachingResolver::new(
        inventory,
        Duration::from_secs(config.resolver.cache_ttl_secs),
    );
    let compiler = PolicyCompiler::new(&resolver);
    let compiled = compiler.compile_all(&policies);

    let rule_count: usize = compiled.iter().map(|p| p.rules.len()).sum();
    tracing::info!(
        policies = compiled.len(),
        rules = rule_count,
        "policies compiled"
    );

    // 4. 백엔드 선택 + 집행
    let platform = HostPlatform::detect();
    let mut backend = select_backend(&platform, &config.enforcer)?;
    println!("Enforcing via {} ({})...", backend.name(), platform.as_str());
    if !backend.production_grade() {
        println!("Note: the {} backend is a development-only fallback.", backend.name());
    }

    let apply_result = backend.apply(&compiled);

    // 집행 성패와 무관하게 리소스 해제
    if let Err(e) = backend.close() {
        tracing::warn!(error = %e, "backend did not close cleanly");
    }
    apply_result?;

    println!("Enforcement complete.");
    Ok(())
}
