// パス: tests/executor.rs
// 役割: 事前コンパイル実行の結合テスト（一時ディレクトリへ出力して同じプロセスで実行する）
// 意図: 子プロセスを起動せずに、出力先の対応・診断の形式・終了コードを確かめる
// 関連ファイル: src/executor.rs, src/config.rs
use std::path::Path;

use tsun::config::CompilerOptions;
use tsun::executor::{compile_into, exec_script, RunError};

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
/// 型の通ったファイルは .js へ出力され、引数と終了コードが通る。
fn compiled_script_runs_with_args() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let main = write(
        src_dir.path(),
        "main.ts",
        "const target: string = process.argv[2];\n\
         fs.writeFileSync(target, 'answer=' + (6 * 7));\n\
         process.exit(3);\n",
    );
    let compiled = compile_into(&[main.clone()], out_dir.path(), &CompilerOptions::default(), false)
        .expect("compile");
    assert_eq!(compiled.outputs.len(), 1);
    let script = out_dir.path().join("main.js");
    assert_eq!(compiled.outputs[0].1, script);
    assert_eq!(compiled.map_arg(&main), script.to_string_lossy());
    assert_eq!(compiled.map_arg("plain"), "plain");

    let target = out_dir.path().join("result.txt");
    let code = exec_script(&script, &[target.to_string_lossy().into_owned()]);
    assert_eq!(code, 3);
    assert_eq!(std::fs::read_to_string(target).unwrap(), "answer=42");
}

#[test]
/// 宣言ファイルは検査に使われるが出力はされない。
fn declaration_files_are_not_emitted() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let decl = write(src_dir.path(), "globals.d.ts", "interface Config { port: number }");
    let main = write(src_dir.path(), "main.ts", "var c: Config = { port: 8080 };\nvar p: number = c.port;\n");
    let compiled = compile_into(&[decl, main], out_dir.path(), &CompilerOptions::default(), false)
        .expect("compile");
    assert_eq!(compiled.outputs.len(), 1);
    assert!(!out_dir.path().join("globals.d.js").exists());
    let js = std::fs::read_to_string(out_dir.path().join("main.js")).unwrap();
    assert_eq!(js, "var c = { port: 8080 };\nvar p = c.port;\n");
}

#[test]
/// 型エラーがあれば何も出力せず、`file (line,col): message` 形式で返す。
fn type_errors_abort_compilation() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let main = write(src_dir.path(), "bad.ts", "let ok = 1;\nlet s: string = ok;\n");
    let err = compile_into(&[main.clone()], out_dir.path(), &CompilerOptions::default(), false)
        .unwrap_err();
    let RunError::Diagnostics(lines) = &err else {
        panic!("diagnostics expected: {}", err);
    };
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(&format!("{} (2,", main)), "{}", lines[0]);
    assert_eq!(err.lines(), *lines);
    assert!(!out_dir.path().join("bad.js").exists());
}

#[test]
/// 読めない入力は入出力エラーになる。
fn missing_source_is_io_error() {
    let out_dir = tempfile::tempdir().unwrap();
    let err = compile_into(
        &["/definitely/not/here.ts".to_string()],
        out_dir.path(),
        &CompilerOptions::default(),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, RunError::Io { .. }));
}

#[test]
/// 捕捉されない例外で終わったスクリプトは終了コード 1。
fn uncaught_throw_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("boom.js");
    std::fs::write(&script, "throw new Error('boom');").unwrap();
    assert_eq!(exec_script(&script, &[]), 1);
    let ok = dir.path().join("ok.js");
    std::fs::write(&ok, "var x = 1;").unwrap();
    assert_eq!(exec_script(&ok, &[]), 0);
}
