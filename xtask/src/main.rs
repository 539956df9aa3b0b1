// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::Path;
use std::process::{Command, ExitCode};

const FMT_CHECK: &str = "cargo fmt --all -- --check";
const LINT: &str = "cargo clippy --workspace --all-targets -- -D warnings";
const TEST: &str = "cargo test --workspace";

fn run(root: &Path, cmd: &str) -> Result<(), String> {
    let status = Command::new("sh")
        .arg("-lc")
        .arg(cmd)
        .current_dir(root)
        .status()
        .map_err(|e| format!("failed to run `{cmd}`: {e}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("command failed: {cmd}"))
    }
}

fn run_all(root: &Path, cmds: &[&str]) -> Result<(), String> {
    cmds.iter().try_for_each(|cmd| run(root, cmd))
}

fn main() -> ExitCode {
    let arg = env::args().nth(1).unwrap_or_else(|| "help".to_string());
    let Some(root) = Path::new(env!("CARGO_MANIFEST_DIR")).parent() else {
        eprintln!("xtask must live one level below the workspace root");
        return ExitCode::FAILURE;
    };

    let result = match arg.as_str() {
        "fmt" => run(root, "cargo fmt --all"),
        "lint" => run(root, LINT),
        "test" => run(root, TEST),
        "bench" => run(root, "cargo bench -p awardref-ingest --bench refresh_throughput"),
        "ci" => run_all(root, &[FMT_CHECK, LINT, TEST]),
        "help" | "--help" | "-h" => {
            eprintln!("xtask commands:");
            eprintln!("  fmt     format the workspace");
            eprintln!("  lint    clippy with warnings denied");
            eprintln!("  test    run every test");
            eprintln!("  bench   refresh pipeline throughput");
            eprintln!("  ci      fmt check, lint and test");
            Ok(())
        }
        _ => Err(format!(
            "unknown xtask command: {arg} (try `cargo run -p xtask -- help`)"
        )),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
