// パス: src/session/declarations.rs
// 役割: 名前 → 宣言位置（ファイル・行・署名・ドキュメント・ソース）の索引
// 意図: `:type` / `:detail` / `:doc` / `:source` を、宣言ファイル → バッファの順の最初の一致で答える
// 関連ファイル: src/session/mod.rs, src/checker/mod.rs
//! 宣言索引
//!
//! 宣言ファイル分は起動時に一度だけ作り、バッファ分は確定のたびに作り直す。

use std::collections::HashMap;

use crate::ast::{Program, Span, Stmt};
use crate::checker::Checked;

/// `:source` をページャへ回す最小行数。
pub const PAGER_THRESHOLD: usize = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Function,
    Class,
    Interface,
    TypeAlias,
    Module,
}

#[derive(Clone, Debug)]
pub struct DeclarationSite {
    pub file: String,
    pub line: usize,
    pub col: usize,
    pub kind: DeclKind,
    pub signature: Vec<String>,
    /// クラス・インタフェースのメンバ行（`:detail` 用）。
    pub members: Vec<String>,
    pub doc: Option<String>,
    pub source: String,
}

#[derive(Debug, Default)]
pub struct DeclarationTable {
    sites: HashMap<String, Vec<DeclarationSite>>,
}

impl DeclarationTable {
    fn push(&mut self, name: String, site: DeclarationSite) {
        let entry = self.sites.entry(name).or_default();
        // オーバーロードや interface の再宣言は最初の 1 か所で代表させる
        if entry
            .iter()
            .any(|s| s.file == site.file && s.kind == site.kind)
        {
            return;
        }
        entry.push(site);
    }

    pub fn first(&self, name: &str) -> Option<&DeclarationSite> {
        self.sites.get(name).and_then(|v| v.first())
    }

    pub fn all(&self, name: &str) -> &[DeclarationSite] {
        self.sites.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.sites.clear();
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// 宣言ファイル分とバッファ分の 2 層からなる索引。
#[derive(Debug, Default)]
pub struct DeclarationIndex {
    ambient: DeclarationTable,
    buffer: DeclarationTable,
}

impl DeclarationIndex {
    /// 宣言ファイルを登録順に取り込む。
    pub fn add_ambient(&mut self, file: &str, text: &str, program: &Program, checked: &Checked) {
        collect(&mut self.ambient, file, text, program, checked);
    }

    /// バッファ分を作り直す。
    pub fn rebuild_buffer(&mut self, file: &str, text: &str, program: &Program, checked: &Checked) {
        self.buffer.clear();
        collect(&mut self.buffer, file, text, program, checked);
        log::debug!("declaration index rebuilt: {} buffer name(s)", self.buffer.len());
    }

    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// 宣言ファイル → バッファの順で最初に見つかった宣言。
    pub fn lookup(&self, name: &str) -> Option<&DeclarationSite> {
        self.ambient.first(name).or_else(|| self.buffer.first(name))
    }

    pub fn buffer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffer.sites.keys().cloned().collect();
        names.sort();
        names
    }
}

fn collect(
    table: &mut DeclarationTable,
    file: &str,
    text: &str,
    program: &Program,
    checked: &Checked,
) {
    for stmt in &program.stmts {
        let span = stmt.span();
        let site = |kind: DeclKind, signature: Vec<String>, members: Vec<String>| DeclarationSite {
            file: file.to_string(),
            line: span.line,
            col: span.col,
            kind,
            signature,
            members,
            doc: leading_doc(text, span.pos),
            source: source_text(text, span),
        };
        match stmt {
            Stmt::Var { kind, decls, .. } => {
                for d in decls {
                    let sig = checked
                        .value_signature(&d.name)
                        .unwrap_or_else(|| vec![format!("{} {}", kind.as_str(), d.name)]);
                    table.push(d.name.clone(), site(DeclKind::Var, sig, Vec::new()));
                }
            }
            Stmt::Function { func, .. } => {
                let Some(name) = &func.name else { continue };
                let sig = checked
                    .value_signature(name)
                    .unwrap_or_else(|| vec![format!("function {}", name)]);
                table.push(name.clone(), site(DeclKind::Function, sig, Vec::new()));
            }
            Stmt::Class { class, .. } => {
                let sig = checked
                    .type_signature(&class.name)
                    .unwrap_or_else(|| format!("class {}", class.name));
                let members = checked.member_lines(&class.name);
                table.push(class.name.clone(), site(DeclKind::Class, vec![sig], members));
            }
            Stmt::Interface { decl, .. } => {
                let sig = checked
                    .type_signature(&decl.name)
                    .unwrap_or_else(|| format!("interface {}", decl.name));
                let members = checked.member_lines(&decl.name);
                table.push(decl.name.clone(), site(DeclKind::Interface, vec![sig], members));
            }
            Stmt::TypeAlias { name, .. } => {
                let sig = checked
                    .type_signature(name)
                    .unwrap_or_else(|| format!("type {}", name));
                table.push(name.clone(), site(DeclKind::TypeAlias, vec![sig], Vec::new()));
            }
            Stmt::Module { name, .. } => {
                let sig = vec![format!("module \"{}\"", name)];
                table.push(name.clone(), site(DeclKind::Module, sig, Vec::new()));
            }
            _ => {}
        }
    }
}

fn source_text(text: &str, span: Span) -> String {
    text.get(span.pos..span.end.max(span.pos))
        .unwrap_or_default()
        .trim_end()
        .to_string()
}

/// 宣言の直前にある `/** ... */` を整形して返す。
pub(crate) fn leading_doc(text: &str, pos: usize) -> Option<String> {
    let before = text.get(..pos)?.trim_end();
    let body_end = before.strip_suffix("*/")?;
    let start = body_end.rfind("/**")?;
    let body = &body_end[start + 3..];
    if body.contains("*/") {
        return None;
    }
    let lines: Vec<&str> = body
        .lines()
        .map(|l| {
            let l = l.trim();
            l.strip_prefix('*').map(str::trim_start).unwrap_or(l)
        })
        .collect();
    let doc = lines.join("\n").trim().to_string();
    (!doc.is_empty()).then_some(doc)
}

/// ページャを使うべき長さか。
pub fn needs_pager(source: &str) -> bool {
    source.lines().count() >= PAGER_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{check_units, CheckOptions, SourceUnit};
    use crate::parser::parse_program;

    #[test]
    /// ドキュメントコメントは直前のものだけが宣言に結び付く。
    fn doc_comments_attach_to_next_declaration() {
        let text = "/** 二倍にする。\n * 整数向け。\n */\nfunction twice(x: number) { return x * 2; }";
        let pos = text.find("function").unwrap();
        assert_eq!(leading_doc(text, pos).as_deref(), Some("二倍にする。\n整数向け。"));
        let plain = "/* ただのコメント */\nlet y = 1;";
        assert_eq!(leading_doc(plain, plain.find("let").unwrap()), None);
        let stale = "/** 古い */ let a = 1;\nlet b = 2;";
        assert_eq!(leading_doc(stale, stale.find("let b").unwrap()), None);
    }

    #[test]
    /// 宣言ファイルの宣言がバッファより優先される。
    fn ambient_declarations_win() {
        let ambient_src = "/** 既定の値 */\ndeclare var shared: number;";
        let buffer_src = "interface Point { x: number; y: number }\nfunction norm(p: Point) { return p.x + p.y; }";
        let ambient = parse_program(ambient_src).unwrap();
        let buffer = parse_program(buffer_src).unwrap();
        let units = [
            SourceUnit { file: "a.d.ts", program: &ambient },
            SourceUnit { file: "repl.ts", program: &buffer },
        ];
        let checked = check_units(&units, CheckOptions::default());
        let mut index = DeclarationIndex::default();
        index.add_ambient("a.d.ts", ambient_src, &ambient, &checked);
        index.rebuild_buffer("repl.ts", buffer_src, &buffer, &checked);

        let shared = index.lookup("shared").unwrap();
        assert_eq!(shared.file, "a.d.ts");
        assert_eq!(shared.doc.as_deref(), Some("既定の値"));

        let point = index.lookup("Point").unwrap();
        assert_eq!(point.kind, DeclKind::Interface);
        assert_eq!(point.signature, vec!["interface Point".to_string()]);
        assert_eq!(point.members.len(), 2);

        let norm = index.lookup("norm").unwrap();
        assert_eq!(norm.signature, vec!["function norm(p: Point): number".to_string()]);
        assert!(norm.source.starts_with("function norm"));
        assert_eq!(norm.line, 2);
        assert!(index.lookup("missing").is_none());
    }

    #[test]
    /// ページャの閾値は 24 行。
    fn pager_threshold() {
        assert!(!needs_pager(&"x\n".repeat(23)));
        assert!(needs_pager(&"x\n".repeat(24)));
    }
}
