//! Multi-format ingest through the `pctx` binary: docx extraction, parse
//! failures kept as error documents, and the file size limit.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("pctx");
    path
}

fn minimal_docx_with_text(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn setup_env(max_file_bytes: u64) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/pctx.sqlite"

[ingest]
include_globs = ["**/*.md", "**/*.pdf", "**/*.docx"]
max_file_bytes = {}
"#,
        root.display(),
        max_file_bytes
    );
    let config_path = root.join("config").join("pctx.toml");
    fs::write(&config_path, config_content).unwrap();
    fs::write(root.join("files").join("readme.md"), "# Readme\n\nPlain text.\n").unwrap();
    (tmp, config_path)
}

fn run_pctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(pctx_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pctx: {}", e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn add_files(config_path: &Path, root: &Path) -> String {
    run_pctx(config_path, &["init"]);
    let files = root.join("files");
    let (stdout, stderr, success) = run_pctx(
        config_path,
        &["add", files.to_str().unwrap(), "--progress", "off"],
    );
    assert!(success, "add failed: {}", stderr);
    stdout
}

fn id_of(stdout: &str, name: &str) -> String {
    stdout
        .lines()
        .find(|l| l.contains(name) && (l.contains("added") || l.contains("failed")))
        .and_then(|l| l.split_whitespace().nth(1))
        .map(str::to_string)
        .unwrap_or_else(|| panic!("{} not in output: {}", name, stdout))
}

#[test]
fn docx_text_is_extracted_and_chunked() {
    let (tmp, config_path) = setup_env(1024 * 1024);
    fs::write(
        tmp.path().join("files").join("brief.docx"),
        minimal_docx_with_text(&["office test phrase", "second paragraph"]),
    )
    .unwrap();

    let stdout = add_files(&config_path, tmp.path());
    assert!(stdout.contains("documents added: 2"), "{}", stdout);
    let brief = id_of(&stdout, "brief.docx");

    let (show, _, success) = run_pctx(&config_path, &["show", &brief]);
    assert!(success);
    assert!(show.contains("type:           docx"), "{}", show);
    assert!(show.contains("office test phrase"), "{}", show);

    let (stdout, _, success) = run_pctx(&config_path, &["reprocess", &brief]);
    assert!(success);
    assert!(stdout.contains("chunks: 2"), "{}", stdout);
}

#[test]
fn unreadable_pdf_is_stored_as_error() {
    let (tmp, config_path) = setup_env(1024 * 1024);
    fs::write(tmp.path().join("files").join("scan.pdf"), b"%PDF-garbage").unwrap();

    let stdout = add_files(&config_path, tmp.path());
    assert!(stdout.contains("parse errors: 1"), "{}", stdout);
    let scan = id_of(&stdout, "scan.pdf");

    let (show, _, success) = run_pctx(&config_path, &["show", &scan]);
    assert!(success);
    assert!(show.contains("parse status:   error"), "{}", show);

    let (list, _, _) = run_pctx(&config_path, &["list"]);
    assert!(list.contains("parse error:"), "{}", list);
}

#[test]
fn oversized_files_are_skipped() {
    let (tmp, config_path) = setup_env(100);
    fs::write(tmp.path().join("files").join("big.md"), "word ".repeat(100)).unwrap();

    let stdout = add_files(&config_path, tmp.path());
    assert!(stdout.contains("files found: 2"), "{}", stdout);
    assert!(stdout.contains("documents added: 1"), "{}", stdout);
    assert!(stdout.contains("skipped: 1"), "{}", stdout);
    assert!(stdout.contains("larger than 100 bytes"), "{}", stdout);
}
