//! Build script for reelplay
//!
//! FFmpeg is only needed when the `ffmpeg` feature is enabled. In that case
//! the script looks for the libraries via pkg-config first, then under
//! `FFMPEG_DIR`, and emits the matching link directives.

use std::env;
use std::path::{Path, PathBuf};

const FFMPEG_LIBS: [&str; 4] = ["libavcodec", "libavformat", "libavutil", "libswscale"];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");

    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    match configure_ffmpeg() {
        Ok(source) => println!("cargo:warning=Using FFmpeg from {}", source),
        Err(e) => println!(
            "cargo:warning=FFmpeg configuration failed: {}. Set FFMPEG_DIR or install the development packages.",
            e
        ),
    }
}

/// Locate FFmpeg and return a description of where it was found
fn configure_ffmpeg() -> Result<String, Box<dyn std::error::Error>> {
    if FFMPEG_LIBS
        .iter()
        .all(|lib| pkg_config::probe_library(lib).is_ok())
    {
        return Ok("pkg-config".to_string());
    }

    if let Ok(dir) = env::var("FFMPEG_DIR") {
        let path = PathBuf::from(dir);
        configure_ffmpeg_from_path(&path)?;
        return Ok(path.display().to_string());
    }

    Err("FFmpeg not found".into())
}

/// Emit search path and link directives for an FFmpeg install prefix
fn configure_ffmpeg_from_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let include_path = path.join("include");
    let lib_path = path.join("lib");

    if !include_path.exists() || !lib_path.exists() {
        return Err("Invalid FFmpeg directory structure".into());
    }

    println!("cargo:include={}", include_path.display());
    println!("cargo:rustc-link-search=native={}", lib_path.display());

    for lib in FFMPEG_LIBS {
        println!("cargo:rustc-link-lib={}", lib.trim_start_matches("lib"));
    }

    Ok(())
}
