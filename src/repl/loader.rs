//! `:load` 用のファイル読み込み

use super::cmd::ReplIo;

/// `paths` を順に読み、1 つの入力として連結する。1 つでも読めなければエラー。
///
/// # 仕様
/// - 先頭の BOM は取り除く。
/// - 各ファイルの末尾に改行が無ければ補う。
pub(crate) fn read_sources<I: ReplIo>(io: &I, paths: &[String]) -> Result<String, String> {
    let mut joined = String::new();
    for path in paths {
        let text = io.read_to_string(path)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        joined.push_str(text);
        if !joined.ends_with('\n') {
            joined.push('\n');
        }
        log::debug!(":load read {} ({} bytes)", path, text.len());
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapIo(HashMap<&'static str, &'static str>);
    impl ReplIo for MapIo {
        fn read_to_string(&self, path: &str) -> Result<String, String> {
            self.0
                .get(path)
                .map(|s| s.to_string())
                .ok_or_else(|| format!("cannot read {}", path))
        }
    }

    #[test]
    /// 複数ファイルを改行で区切って連結する。
    fn joins_files_in_order() {
        let io = MapIo(HashMap::from([("a.ts", "\u{feff}let a = 1;"), ("b.ts", "let b = a;\n")]));
        let text = read_sources(&io, &["a.ts".into(), "b.ts".into()]).unwrap();
        assert_eq!(text, "let a = 1;\nlet b = a;\n");
    }

    #[test]
    /// 読めないファイルがあれば全体を失敗にする。
    fn missing_file_fails() {
        let io = MapIo(HashMap::from([("a.ts", "1;")]));
        let err = read_sources(&io, &["a.ts".into(), "nope.ts".into()]).unwrap_err();
        assert!(err.contains("nope.ts"));
    }
}
