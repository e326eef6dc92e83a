// パス: src/session/delta.rs
// 役割: 前回までに実行した出力行と今回の出力を比べ、新しく加わった行だけを取り出す
// 意図: 実行済みの出力を二度と選び直さない
// 関連ファイル: src/session/mod.rs, src/codegen/es5.rs

/// 差分の取り方。`--heuristic` の値としても使う。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Heuristic {
    /// 前回の出力全体を基準に最長共通部分列で比較する。
    #[default]
    Diff,
    /// 前回の行数より後ろを新しい出力とみなす。
    #[value(name = "linecount", alias = "line-count")]
    LineCount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmitCursor {
    LineCount(usize),
    Baseline(Vec<String>),
}

impl EmitCursor {
    pub fn new(heuristic: Heuristic) -> Self {
        match heuristic {
            Heuristic::Diff => EmitCursor::Baseline(Vec::new()),
            Heuristic::LineCount => EmitCursor::LineCount(0),
        }
    }

    /// 出力全体を受け取り、未実行の行を返してカーソルを進める。
    pub fn advance(&mut self, output: &str) -> Vec<String> {
        let lines: Vec<String> = output.lines().map(str::to_string).collect();
        match self {
            EmitCursor::LineCount(seen) => {
                let added = lines.get(*seen..).map(<[String]>::to_vec).unwrap_or_default();
                *seen = lines.len().max(*seen);
                added
            }
            EmitCursor::Baseline(baseline) => {
                let added = added_lines(baseline, &lines);
                *baseline = lines;
                added
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            EmitCursor::LineCount(seen) => *seen = 0,
            EmitCursor::Baseline(baseline) => baseline.clear(),
        }
    }
}

/// `new` のうち `old` との最長共通部分列に含まれない行を順に返す。
pub fn added_lines(old: &[String], new: &[String]) -> Vec<String> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let old_rest = &old[prefix..];
    let new_rest = &new[prefix..];
    let suffix = old_rest
        .iter()
        .rev()
        .zip(new_rest.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old_rest[..old_rest.len() - suffix];
    let new_mid = &new_rest[..new_rest.len() - suffix];
    if old_mid.is_empty() {
        return new_mid.to_vec();
    }
    if new_mid.is_empty() {
        return Vec::new();
    }

    let (n, m) = (old_mid.len(), new_mid.len());
    // table[i][j] = old_mid[i..] と new_mid[j..] の LCS 長
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old_mid[i] == new_mid[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let mut added = Vec::new();
    let (mut i, mut j) = (0, 0);
    while j < m {
        if i < n && old_mid[i] == new_mid[j] {
            i += 1;
            j += 1;
        } else if i < n && table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            added.push(new_mid[j].clone());
            j += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<String> {
        s.lines().map(str::to_string).collect()
    }

    #[test]
    /// 末尾追記・途中挿入のどちらでも新しい行だけが得られる。
    fn lcs_reports_inserted_lines() {
        assert_eq!(added_lines(&lines("a\nb"), &lines("a\nb\nc")), lines("c"));
        assert_eq!(
            added_lines(&lines("var x = 1;\nx;"), &lines("var __extends = 1;\nvar x = 1;\nx;\ny;")),
            lines("var __extends = 1;\ny;")
        );
        assert!(added_lines(&lines("a\nb"), &lines("a\nb")).is_empty());
        assert_eq!(added_lines(&[], &lines("a")), lines("a"));
    }

    #[test]
    /// 同じ出力で 2 回進めても 2 回目は空になる。
    fn advancing_twice_is_idempotent() {
        for h in [Heuristic::Diff, Heuristic::LineCount] {
            let mut cursor = EmitCursor::new(h);
            assert_eq!(cursor.advance("a;\nb;\n"), lines("a;\nb;"));
            assert!(cursor.advance("a;\nb;\n").is_empty());
            assert_eq!(cursor.advance("a;\nb;\nc;\n"), lines("c;"));
            cursor.reset();
            assert_eq!(cursor.advance("d;\n"), lines("d;"));
        }
    }

    #[test]
    /// 名前は大小文字を問わず、別名の `line-count` も受け付ける。
    fn parse_heuristic_names() {
        use clap::ValueEnum;
        assert_eq!(Heuristic::from_str("Diff", true), Ok(Heuristic::Diff));
        assert_eq!(Heuristic::from_str("linecount", true), Ok(Heuristic::LineCount));
        assert_eq!(Heuristic::from_str("line-count", true), Ok(Heuristic::LineCount));
        assert!(Heuristic::from_str("guess", true).is_err());
    }
}
