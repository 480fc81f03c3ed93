use std::path::Path;
use std::process::Command;

fn tsaudit(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tsaudit"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/main.ts"),
        "import { assertIsType } from 'ts-audit';\ninterface User { name: string }\n\
         export const user: User = assertIsType(JSON.parse('{}'));\n",
    )
    .unwrap();
    dir
}

#[test]
fn transform_writes_the_output_tree() {
    let dir = project();
    let out = tsaudit(dir.path(), &["transform", "-i", "src/*.ts", "--out-dir", "dist"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let main = std::fs::read_to_string(dir.path().join("dist/main.ts")).unwrap();
    assert!(main.contains("from './runTimeValidations'"));
    assert!(dir.path().join("dist/runTimeValidations.ts").is_file());
    assert!(dir.path().join("dist/runTimeValidations.schema.json").is_file());
}

#[test]
fn dry_run_writes_nothing() {
    let dir = project();
    let out = tsaudit(dir.path(), &["transform", "-i", "src/main.ts", "--dry-run"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("runTimeValidations.ts"), "{stdout}");
    assert!(!dir.path().join("build").exists());
}

#[test]
fn schema_prints_the_root_document() {
    let dir = project();
    let out = tsaudit(dir.path(), &["schema", "-i", "src/main.ts"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let schema: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(schema["$id"], "root");
    assert_eq!(schema["definitions"]["User"]["required"], serde_json::json!(["name"]));
}

#[test]
fn check_fails_with_located_errors() {
    let dir = project();
    std::fs::write(dir.path().join("src/bad.ts"), "import { isType } from 'ts-audit';\nisType(1);\n").unwrap();
    let out = tsaudit(dir.path(), &["check", "-i", "src/*.ts", "--json"]);
    assert!(!out.status.success());
    let errors: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(errors[0]["line"], 2);
    assert_eq!(errors[0]["character"], 0);
    assert!(errors[0]["file"].as_str().unwrap().ends_with("bad.ts"));
}

#[test]
fn out_file_config_is_fatal() {
    let dir = project();
    std::fs::write(dir.path().join("tsaudit.json"), r#"{ "outFile": "bundle.js" }"#).unwrap();
    let out = tsaudit(dir.path(), &["check", "-i", "src/main.ts"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("does not work with outFile"));
}
