//! zeroseg CLI 진입점
//!
//! 집행 체인(Validator → Compiler → Backend)은 호출마다 새로 구성되어
//! 명시적으로 전달됩니다 — 프로세스 전역 싱글톤 없음.

use clap::Parser;

use zeroseg_core::config::ZerosegConfig;
use zeroseg_core::error::{ConfigError, ZerosegError};

mod cli;
mod commands;
mod error;
mod logging;

use cli::{Cli, Commands};
use error::CliError;

/// 기본 설정 파일 이름 — 존재하지 않으면 기본값으로 동작
const DEFAULT_CONFIG_FILE: &str = "zeroseg.toml";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = load_config(&cli).await?;

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    logging::init_tracing(&config.general)?;

    tracing::info!(config = %cli.config.display(), "zeroseg starting");

    match cli.command {
        Commands::Enforce(args) => commands::enforce::run(args, config).await,
        Commands::Validate(args) => commands::validate::run(args).await,
    }
}

/// 설정 파일을 로드합니다.
///
/// 명시적으로 지정하지 않은 기본 파일이 없는 경우에는 기본값으로
/// 동작합니다. 사용자가 지정한 파일이 없으면 에러입니다.
async fn load_config(cli: &Cli) -> Result<ZerosegConfig, CliError> {
    match ZerosegConfig::load(&cli.config).await {
        Ok(config) => Ok(config),
        Err(ZerosegError::Config(ConfigError::FileNotFound { .. }))
            if cli.config.as_path() == std::path::Path::new(DEFAULT_CONFIG_FILE) =>
        {
            let mut config = ZerosegConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}
