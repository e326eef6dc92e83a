// パス: src/bin/tsun.rs
// 役割: 実行ファイルの入口。引数から対話・事前コンパイル・スクリプト実行のいずれかを選ぶ
// 意図: 設定の解決と終了コードの決定だけを行い、処理本体はライブラリへ任せる
// 関連ファイル: src/config.rs, src/repl/cmd.rs, src/executor.rs
use std::process;

use clap::Parser;
use colored::Colorize;

use tsun::config::{repl_options, CliOptions, CompilerOptions, Mode, ProjectConfig};
use tsun::executor::{compile_and_run, exec_script};
use tsun::repl::run_repl;

fn main() {
    env_logger::init();

    // --help も含め、引数の問題はすべて終了コード 1
    let cli = match CliOptions::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    let cwd = std::env::current_dir().unwrap_or_default();
    let project = ProjectConfig::load_or_default(&cwd);
    let compiler = CompilerOptions::resolve(&project, cli.emit_helpers);

    let code = match cli.mode() {
        Mode::Interactive => run_repl(repl_options(&cli, &compiler)),
        Mode::Exec { script, args } => exec_script(&script, &args),
        Mode::Compile {
            entry,
            sources,
            args,
        } => match compile_and_run(
            &entry,
            &sources,
            &args,
            cli.out.as_deref(),
            &compiler,
            cli.autoref,
        ) {
            Ok(code) => code,
            Err(e) => {
                for line in e.lines() {
                    eprintln!("{}", line.red());
                }
                1
            }
        },
    };
    process::exit(code);
}
