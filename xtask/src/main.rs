use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::Command;

/// Zeroseg 빌드 태스크
#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// eBPF 커널 프로그램 빌드 + bpf/filter.o 설치
    BuildEbpf {
        /// 릴리스 모드로 빌드
        #[arg(long)]
        release: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::BuildEbpf { release } => {
            build_ebpf(release);
        }
    }
}

fn build_ebpf(release: bool) {
    let mut cmd = Command::new("cargo");
    cmd.current_dir("crates/enforcer/ebpf");

    cmd.args([
        "+nightly",
        "build",
        "--target=bpfel-unknown-none",
        "-Z",
        "build-std=core",
    ]);

    if release {
        cmd.arg("--release");
    }

    let status = cmd.status().expect("failed to build eBPF program");
    if !status.success() {
        eprintln!("eBPF build failed");
        std::process::exit(1);
    }

    // 커널 인포서의 첫 번째 탐색 경로(저장소 루트 bpf/filter.o)에 설치
    let profile = if release { "release" } else { "debug" };
    let artifact = Path::new("crates/enforcer/ebpf/target/bpfel-unknown-none")
        .join(profile)
        .join("zeroseg-ebpf");
    let dest = Path::new("bpf/filter.o");

    std::fs::create_dir_all("bpf").expect("failed to create bpf directory");
    std::fs::copy(&artifact, dest).unwrap_or_else(|e| {
        eprintln!("failed to install {}: {e}", artifact.display());
        std::process::exit(1);
    });

    println!("eBPF build succeeded: {}", dest.display());
}
