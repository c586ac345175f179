use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-env-changed=OPUS_JNI_NATIVE_BINARIES");

    let out = PathBuf::from(env::var("OUT_DIR").unwrap()).join("bundled_natives.rs");
    let entry = env::var_os("OPUS_JNI_NATIVE_BINARIES").and_then(|dir| {
        let name = library_name(&env::var("CARGO_CFG_TARGET_OS").unwrap_or_default())?;
        let path = Path::new(&dir).join(name);
        if !path.is_file() {
            println!(
                "cargo:warning=OPUS_JNI_NATIVE_BINARIES has no {}, nothing bundled",
                name
            );
            return None;
        }
        println!("cargo:rerun-if-changed={}", path.display());
        Some((name, path))
    });

    let code = match entry {
        Some((name, path)) => format!(
            "pub(crate) static BUNDLED: &[(&str, &[u8])] = &[({:?}, include_bytes!({:?}))];\n",
            name,
            path.display().to_string()
        ),
        None => "pub(crate) static BUNDLED: &[(&str, &[u8])] = &[];\n".to_string(),
    };
    fs::write(out, code).unwrap();
}

fn library_name(target_os: &str) -> Option<&'static str> {
    match target_os {
        "linux" => Some("libopus-jni-native.so"),
        "macos" => Some("libopus-jni-native.dylib"),
        "windows" => Some("opus-jni-native.dll"),
        _ => None,
    }
}
