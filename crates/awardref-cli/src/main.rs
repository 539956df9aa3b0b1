// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

fn main() -> std::process::ExitCode {
    awardref_cli::main_entry()
}
