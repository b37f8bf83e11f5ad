//! Build script: embeds the git hash and pre-flight checks the `tesseract` feature.
//!
//! leptess links against libtesseract and libleptonica; when pkg-config cannot
//! find them we print install hints that show up above the linker errors.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "tesseract") {
        check_tesseract();
    }
}

fn check_tesseract() {
    for lib in ["tesseract", "lept"] {
        match pkg_config_version(lib) {
            Some(version) => println!("cargo::warning={lib} {version} detected"),
            None => {
                println!("cargo::warning=");
                println!("cargo::warning=pkg-config could not find `{lib}`.");
                println!("cargo::warning=If the build fails, install the development packages:");
                println!("cargo::warning=  Debian/Ubuntu: sudo apt install libtesseract-dev libleptonica-dev");
                println!("cargo::warning=  Fedora:        sudo dnf install tesseract-devel leptonica-devel");
                println!("cargo::warning=  Or build without local OCR: cargo build --release");
                println!("cargo::warning=");
            }
        }
    }
}

fn pkg_config_version(lib: &str) -> Option<String> {
    let output = Command::new("pkg-config")
        .args(["--modversion", lib])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}
