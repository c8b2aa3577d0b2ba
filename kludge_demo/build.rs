//! Compiles the GLSL sources under `shaders/<name>/shader.<stage>` to SPIR-V
//! in `$OUT_DIR/shaders/<name>/shader.<stage>.spv` with glslangValidator.

use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 3] = ["vert", "frag", "comp"];

fn main() {
    println!("cargo:rerun-if-changed=shaders");

    let source_root = PathBuf::from("shaders");
    let out_root = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo")).join("shaders");

    let entries = match std::fs::read_dir(&source_root) {
        Ok(entries) => entries,
        Err(e) => {
            println!("cargo:warning=cannot read {}: {}", source_root.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        for stage in STAGES {
            let source = dir.join(format!("shader.{}", stage));
            if source.exists() {
                compile(&source, &out_root.join(&name).join(format!("shader.{}.spv", stage)));
            }
        }
    }
}

fn compile(source: &Path, output: &Path) {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).expect("cannot create shader output directory");
    }
    match Command::new("glslangValidator").arg("-V").arg(source).arg("-o").arg(output).status() {
        Ok(status) if status.success() => {}
        Ok(status) => panic!("glslangValidator failed on {} ({})", source.display(), status),
        Err(e) => println!(
            "cargo:warning=glslangValidator not available ({}), {} not compiled",
            e,
            source.display()
        ),
    }
}
