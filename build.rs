// 构建脚本: 静态FFmpeg的摄像头采集依赖 + 内置行人检测系数
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    // DirectShow 采集 (dshow) 需要的系统库, 仅 Windows MSVC
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        for lib in ["strmiids", "ole32", "oleaut32", "vfw32"] {
            println!("cargo:rustc-link-lib=dylib={}", lib);
        }
    }

    embed_people_weights();
}

/// `models/hog_people.svm` 存在时编译进二进制, 运行时无需再带该文件
fn embed_people_weights() {
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let models = manifest.join("models");
    let weights = models.join("hog_people.svm");
    println!("cargo:rerun-if-changed={}", models.display());
    println!("cargo:rerun-if-changed={}", weights.display());

    let value = if weights.is_file() {
        format!("Some(include_str!({:?}))", weights.display().to_string())
    } else {
        println!("cargo:warning=models/hog_people.svm 不存在, 行人检测需要运行时提供系数文件");
        "None".to_string()
    };
    let out = PathBuf::from(env::var("OUT_DIR").unwrap()).join("hog_people.rs");
    fs::write(
        out,
        format!("pub const BUILTIN_PEOPLE_SVM: Option<&str> = {};\n", value),
    )
    .unwrap();
}
