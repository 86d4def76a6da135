//! `validate` 서브커맨드 — 집행 없이 정책 문서 검사

use crate::cli::ValidateArgs;
use crate::error::CliError;

/// validate 커맨드를 실행합니다.
pub async fn run(args: ValidateArgs) -> Result<(), CliError> {
    let policies = zeroseg_policy::load_from_file(&args.file).await?;
    println!(
        "Loaded {} policy(ies) from {}",
        policies.len(),
        args.file.display()
    );

    for policy in &policies {
        policy.validate()?;
        println!("✓ {} is valid", policy.metadata.name);
    }

    println!("All policies valid.");
    Ok(())
}
