use std::fs;
use std::io::Write;
use std::path::Path;

fn main() {
    let migrations_dir = Path::new("migrations");
    let out_dir = std::env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("migrations.rs");

    // migrations 目录变化时重新编译
    println!("cargo:rerun-if-changed=migrations/");

    let mut files: Vec<_> = match fs::read_dir(migrations_dir) {
        Ok(dir) => dir
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".sql") && !name.starts_with("000_"))
            .collect(),
        Err(_) => Vec::new(),
    };

    // 按文件名排序（001_, 002_, ...）
    files.sort();

    let entries: Vec<String> = files
        .iter()
        .map(|file_name| {
            let name = file_name.trim_end_matches(".sql");
            format!(
                "    (\"{name}\", include_str!(concat!(env!(\"CARGO_MANIFEST_DIR\"), \"/migrations/{file_name}\")))",
            )
        })
        .collect();

    let mut f = fs::File::create(&dest_path).expect("无法创建 migrations.rs");
    writeln!(
        f,
        "/// 编译时扫描 migrations/ 目录生成（跳过 000_ 开头的文件）\n\
         pub const MIGRATIONS: &[(&str, &str)] = &[\n{}\n];",
        entries.join(",\n")
    )
    .expect("无法写入 migrations.rs");
}
