use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const BOOT_S: &str = "arch/arm/boot.S";
const LINKER_SCRIPT: &str = "arch/arm/linker.ld";

fn run(tool: &str, args: &[&str]) {
    let status = Command::new(tool)
        .args(args)
        .status()
        .unwrap_or_else(|e| panic!("failed to spawn {tool}: {e}"));
    assert!(status.success(), "{tool} exited with {status}");
}

fn main() {
    println!("cargo:rerun-if-changed={BOOT_S}");
    println!("cargo:rerun-if-changed={LINKER_SCRIPT}");

    // Host builds (unit tests) have no startup code to assemble.
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap() != "arm" {
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let boot_o = out_dir.join("boot.o");
    let boot_a = out_dir.join("libboot.a");

    run(
        "arm-none-eabi-gcc",
        &[
            "-c",
            "-mcpu=arm946e-s",
            "-nostdlib",
            "-ffreestanding",
            BOOT_S,
            "-o",
            path_str(&boot_o),
        ],
    );
    run("arm-none-eabi-ar", &["crs", path_str(&boot_a), path_str(&boot_o)]);

    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    println!("cargo:rustc-link-search=native={}", out_dir.display());
    println!("cargo:rustc-link-lib=static=boot");
    println!(
        "cargo:rustc-link-arg-bins=-T{}",
        manifest.join(LINKER_SCRIPT).display()
    );
}

fn path_str(p: &Path) -> &str {
    p.to_str().expect("non-UTF-8 build path")
}
