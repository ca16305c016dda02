//! Build script stamping build and catalog information into the binary.
//!
//! - `CROWBAR_BUILD_TIMESTAMP`: ISO 8601 timestamp of the build
//! - `CROWBAR_GIT_COMMIT`: short git commit hash, or "unknown" outside a repo
//! - `CROWBAR_CATALOG_DIGEST`: short SHA-256 over the bundled catalogs, so
//!   `--version` tells which repository and barclamp tables a binary carries

use sha2::{Digest, Sha256};
use std::fs;
use std::process::Command;

const BUNDLED_CATALOGS: [&str; 2] = ["config/repos.yml", "config/barclamps.yml"];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    for catalog in BUNDLED_CATALOGS {
        println!("cargo:rerun-if-changed={}", catalog);
    }

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    println!("cargo:rustc-env=CROWBAR_BUILD_TIMESTAMP={}", timestamp);

    let commit = git_commit().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=CROWBAR_GIT_COMMIT={}", commit);

    println!("cargo:rustc-env=CROWBAR_CATALOG_DIGEST={}", catalog_digest());
}

fn git_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string())
}

fn catalog_digest() -> String {
    let mut hasher = Sha256::new();
    for catalog in BUNDLED_CATALOGS {
        // include_str! in the crate reports a missing file with a better message
        if let Ok(contents) = fs::read(catalog) {
            hasher.update(catalog.as_bytes());
            hasher.update(&contents);
        }
    }
    let digest = hasher.finalize();
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}
