//! Build script to stamp the kiosk gateway with the current git revision

use std::process::Command;

fn main() {
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output();

    let revision = match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => String::from("unknown"),
    };

    println!("cargo:rustc-env=KIOSK_GIT_REV={}", revision);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
