// パス: src/codegen/es5.rs
// 役割: 型付きソースの AST を ES5 相当のスクリプトへ下位変換する
// 意図: 同じ入力からは常に同じ行列を出し、追記分だけを差分として取り出せるようにする
// 関連ファイル: src/codegen/mod.rs, src/intrinsics.rs, src/ast.rs
//! ES5 下位変換
//!
//! - 型注釈・型専用宣言・`declare` 宣言・オーバーロードシグネチャは消去する。
//! - `class` は即時関数、アロー関数は関数式、`let`/`const` は `var` へ落とす。
//! - 一時変数名は関数ごとの連番で決まり、前方の文の出力は後続の文に影響されない。
//! - インデントは空白 4 つ。

use std::collections::HashMap;

use crate::ast::{
    AssignOp, BinaryOp, ClassDecl, ClassMember, Expr, ForInit, Function, ImportKind, LogicalOp,
    Param, Program, PropEntry, Stmt, UnaryOp, VarDeclarator,
};
use crate::intrinsics::{self, IntrinsicKind};
use crate::runtime::number_to_string;

use super::{EmitError, EmitOptions, EmitResult};

const INDENT: &str = "    ";

/// 関数ごとの一時変数の状態。
#[derive(Default)]
struct FnScope {
    indices: usize,
    arrays: HashMap<String, usize>,
}

/// `super` 解決用のクラス文脈。
#[derive(Clone, Copy)]
struct ClassCtx {
    has_base: bool,
    is_static: bool,
}

pub struct Emitter {
    options: EmitOptions,
    lines: Vec<String>,
    indent: usize,
    scopes: Vec<FnScope>,
    /// `this` の出力名（アロー関数内では `_this`）。
    this_names: Vec<&'static str>,
    class: Option<ClassCtx>,
    used_extends: bool,
    used_assign: bool,
}

impl Emitter {
    pub fn new(options: EmitOptions) -> Self {
        Self {
            options,
            lines: Vec::new(),
            indent: 0,
            scopes: vec![FnScope::default()],
            this_names: vec!["this"],
            class: None,
            used_extends: false,
            used_assign: false,
        }
    }

    pub fn emit(mut self, program: &Program) -> EmitResult<String> {
        for s in &program.stmts {
            if stmt_arrows_use_this(s) {
                self.line("var _this = this;");
            }
            self.stmt(s)?;
        }
        let mut out = Vec::new();
        if self.options.emit_helpers {
            let all = self.options.all_helpers;
            if all || self.used_extends {
                out.push(intrinsics::of_kind(IntrinsicKind::Extends).source.to_string());
            }
            if all || self.used_assign {
                out.push(intrinsics::of_kind(IntrinsicKind::Assign).source.to_string());
            }
        }
        out.append(&mut self.lines);
        if out.is_empty() {
            return Ok(String::new());
        }
        let mut text = out.join("\n");
        text.push('\n');
        Ok(text)
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", INDENT.repeat(self.indent), text.as_ref()));
    }

    fn pad(&self) -> String {
        INDENT.repeat(self.indent)
    }

    /// 添字用の一時変数（`_i`, `_i1`, ...）。
    fn index_temp(&mut self) -> String {
        let Some(scope) = self.scopes.last_mut() else {
            return "_i".into();
        };
        scope.indices += 1;
        match scope.indices {
            1 => "_i".into(),
            n => format!("_i{}", n - 1),
        }
    }

    /// 反復対象を保持する一時変数（`xs_1`, `xs_2`, `_a_1`, ...）。
    fn array_temp(&mut self, base: &str) -> String {
        let Some(scope) = self.scopes.last_mut() else {
            return format!("{}_1", base);
        };
        let n = scope.arrays.entry(base.to_string()).or_insert(0);
        *n += 1;
        format!("{}_{}", base, n)
    }

    fn this_name(&self) -> &'static str {
        self.this_names.last().copied().unwrap_or("this")
    }

    /// 本体を 1 段深いインデントで出力し、その行列を返す。
    fn nested<F>(&mut self, f: F) -> EmitResult<Vec<String>>
    where
        F: FnOnce(&mut Self) -> EmitResult<()>,
    {
        let saved = std::mem::take(&mut self.lines);
        self.indent += 1;
        let result = f(self);
        self.indent -= 1;
        let body = std::mem::replace(&mut self.lines, saved);
        result.map(|_| body)
    }

    // ---- 文 ----

    fn stmts(&mut self, stmts: &[Stmt]) -> EmitResult<()> {
        for s in stmts {
            self.stmt(s)?;
        }
        Ok(())
    }

    fn stmt(&mut self, s: &Stmt) -> EmitResult<()> {
        match s {
            Stmt::Var {
                decls,
                declare,
                export,
                ..
            } => {
                if *declare {
                    return Ok(());
                }
                let text = self.declarators(decls)?;
                self.line(format!("var {};", text));
                if *export {
                    for d in decls {
                        self.line(format!("exports.{0} = {0};", d.name));
                    }
                }
            }
            Stmt::Function {
                func,
                declare,
                export,
                ..
            } => {
                if *declare || func.body.is_none() {
                    return Ok(());
                }
                let text = self.function(func, func.name.as_deref())?;
                self.line(text);
                if *export {
                    if let Some(name) = &func.name {
                        self.line(format!("exports.{0} = {0};", name));
                    }
                }
            }
            Stmt::Class {
                class,
                declare,
                export,
                ..
            } => {
                if *declare {
                    return Ok(());
                }
                self.class(class)?;
                if *export {
                    self.line(format!("exports.{0} = {0};", class.name));
                }
            }
            Stmt::Interface { .. } | Stmt::TypeAlias { .. } | Stmt::Module { .. } => {}
            Stmt::Import { kind, module, .. } => {
                let req = format!("require({})", quote(module));
                match kind {
                    ImportKind::Namespace(local) | ImportKind::Require(local) => {
                        self.line(format!("var {} = {};", local, req));
                    }
                    ImportKind::Named(names) => {
                        let holder = module_alias(module);
                        self.line(format!("var {} = {};", holder, req));
                        for (imported, local) in names {
                            self.line(format!("var {} = {}.{};", local, holder, imported));
                        }
                    }
                }
            }
            Stmt::Expr { expr, .. } => {
                let text = self.expr(expr, 0)?;
                if text.starts_with("function") || text.starts_with('{') {
                    self.line(format!("({});", text));
                } else {
                    self.line(format!("{};", text));
                }
            }
            Stmt::Block { body, .. } => {
                self.line("{");
                let inner = self.nested(|e| e.stmts(body))?;
                self.lines.extend(inner);
                self.line("}");
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let c = self.expr(cond, 0)?;
                let head = format!("if ({}) ", c);
                self.branch(head, then_branch)?;
                let mut alt = else_branch.as_deref();
                while let Some(e) = alt {
                    match e {
                        Stmt::If {
                            cond,
                            then_branch,
                            else_branch,
                            ..
                        } => {
                            let c = self.expr(cond, 0)?;
                            self.append_to_last(&format!(" else if ({}) {{", c));
                            let inner = self.nested(|em| em.body_of(then_branch))?;
                            self.lines.extend(inner);
                            self.line("}");
                            alt = else_branch.as_deref();
                        }
                        other => {
                            self.append_to_last(" else {");
                            let inner = self.nested(|em| em.body_of(other))?;
                            self.lines.extend(inner);
                            self.line("}");
                            alt = None;
                        }
                    }
                }
            }
            Stmt::While { cond, body, .. } => {
                let c = self.expr(cond, 0)?;
                self.branch(format!("while ({}) ", c), body)?;
            }
            Stmt::DoWhile { body, cond, .. } => {
                self.line("do {");
                let inner = self.nested(|e| e.body_of(body))?;
                self.lines.extend(inner);
                let c = self.expr(cond, 0)?;
                self.line(format!("}} while ({});", c));
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                let init = match init {
                    Some(ForInit::Var { decls, .. }) => format!("var {}", self.declarators(decls)?),
                    Some(ForInit::Expr(e)) => self.expr(e, 0)?,
                    None => String::new(),
                };
                let test = match test {
                    Some(t) => format!(" {}", self.expr(t, 0)?),
                    None => String::new(),
                };
                let update = match update {
                    Some(u) => format!(" {}", self.expr(u, 0)?),
                    None => String::new(),
                };
                self.branch(format!("for ({};{};{}) ", init, test, update), body)?;
            }
            Stmt::ForOf { name, iter, body, .. } => {
                let index = self.index_temp();
                let (array, init) = match iter {
                    Expr::Ident { name: src, .. } => (self.array_temp(src), src.clone()),
                    other => {
                        let init = self.expr(other, 2)?;
                        (self.array_temp("_a"), init)
                    }
                };
                self.line(format!(
                    "for (var {i} = 0, {a} = {init}; {i} < {a}.length; {i}++) {{",
                    i = index,
                    a = array,
                    init = init
                ));
                let inner = self.nested(|e| {
                    e.line(format!("var {} = {}[{}];", name, array, index));
                    e.body_of(body)
                })?;
                self.lines.extend(inner);
                self.line("}");
            }
            Stmt::ForIn {
                kind,
                name,
                object,
                body,
                ..
            } => {
                let o = self.expr(object, 0)?;
                let decl = if kind.is_some() { "var " } else { "" };
                self.branch(format!("for ({}{} in {}) ", decl, name, o), body)?;
            }
            Stmt::Switch { disc, cases, .. } => {
                let d = self.expr(disc, 0)?;
                self.line(format!("switch ({}) {{", d));
                self.indent += 1;
                for c in cases {
                    match &c.test {
                        Some(t) => {
                            let t = self.expr(t, 0)?;
                            self.line(format!("case {}:", t));
                        }
                        None => self.line("default:"),
                    }
                    let inner = self.nested(|e| e.stmts(&c.body))?;
                    self.lines.extend(inner);
                }
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Return { value, .. } => match value {
                Some(v) => {
                    let v = self.expr(v, 0)?;
                    self.line(format!("return {};", v));
                }
                None => self.line("return;"),
            },
            Stmt::Break { .. } => self.line("break;"),
            Stmt::Continue { .. } => self.line("continue;"),
            Stmt::Throw { value, .. } => {
                let v = self.expr(value, 0)?;
                self.line(format!("throw {};", v));
            }
            Stmt::Try {
                block,
                catch,
                finally,
                ..
            } => {
                self.line("try {");
                let inner = self.nested(|e| e.stmts(block))?;
                self.lines.extend(inner);
                if let Some(c) = catch {
                    match &c.param {
                        Some(p) => self.line(format!("}} catch ({}) {{", p)),
                        None => self.line("} catch (_e) {"),
                    }
                    let inner = self.nested(|e| e.stmts(&c.body))?;
                    self.lines.extend(inner);
                }
                if let Some(f) = finally {
                    self.line("} finally {");
                    let inner = self.nested(|e| e.stmts(f))?;
                    self.lines.extend(inner);
                }
                self.line("}");
            }
            Stmt::Empty { .. } => {}
        }
        Ok(())
    }

    fn append_to_last(&mut self, text: &str) {
        match self.lines.last_mut() {
            Some(last) => last.push_str(text),
            None => self.lines.push(text.to_string()),
        }
    }

    /// `head { body }` を出力する。本体がブロックでなくても波括弧で包む。
    fn branch(&mut self, head: String, body: &Stmt) -> EmitResult<()> {
        self.line(format!("{}{{", head));
        let inner = self.nested(|e| e.body_of(body))?;
        self.lines.extend(inner);
        self.line("}");
        Ok(())
    }

    fn body_of(&mut self, body: &Stmt) -> EmitResult<()> {
        match body {
            Stmt::Block { body, .. } => self.stmts(body),
            other => self.stmt(other),
        }
    }

    fn declarators(&mut self, decls: &[VarDeclarator]) -> EmitResult<String> {
        let mut parts = Vec::with_capacity(decls.len());
        for d in decls {
            match &d.init {
                Some(init) => parts.push(format!("{} = {}", d.name, self.expr(init, 2)?)),
                None => parts.push(d.name.clone()),
            }
        }
        Ok(parts.join(", "))
    }

    // ---- 関数 ----

    /// 関数（宣言・式・アロー）を `function name(params) { ... }` へ変換する。
    fn function(&mut self, func: &Function, name: Option<&str>) -> EmitResult<String> {
        let params: Vec<&str> = func
            .params
            .iter()
            .filter(|p| !p.rest)
            .map(|p| p.name.as_str())
            .collect();
        let head = match name {
            Some(n) => format!("function {}({})", n, params.join(", ")),
            None => format!("function ({})", params.join(", ")),
        };
        let body = func.body.as_deref().unwrap_or(&[]);
        let captures = !func.is_arrow && body.iter().any(stmt_arrows_use_this);
        let has_prologue = captures || func.params.iter().any(|p| p.default.is_some() || p.rest);

        self.this_names.push(if func.is_arrow { "_this" } else { "this" });
        let saved_class = if func.is_arrow { self.class } else { self.class.take() };
        self.scopes.push(FnScope::default());
        let result = self.function_body(func, body, captures, has_prologue, &head);
        self.scopes.pop();
        self.class = saved_class;
        self.this_names.pop();
        result
    }

    fn function_body(
        &mut self,
        func: &Function,
        body: &[Stmt],
        captures: bool,
        has_prologue: bool,
        head: &str,
    ) -> EmitResult<String> {
        // 式本体のアロー関数は 1 行に収める
        if func.expr_body && !has_prologue {
            if let [Stmt::Return { value: Some(v), .. }] = body {
                let v = self.expr(v, 0)?;
                return Ok(format!("{} {{ return {}; }}", head, v));
            }
        }
        if body.is_empty() && !has_prologue {
            return Ok(format!("{} {{ }}", head));
        }
        let lines = self.nested(|e| {
            if captures {
                e.line("var _this = this;");
            }
            e.param_prologue(&func.params)?;
            e.stmts(body)
        })?;
        Ok(format!("{} {{\n{}\n{}}}", head, lines.join("\n"), self.pad()))
    }

    /// 既定値引数と残余引数の初期化。
    fn param_prologue(&mut self, params: &[Param]) -> EmitResult<()> {
        for (i, p) in params.iter().enumerate() {
            if let Some(d) = &p.default {
                let d = self.expr(d, 2)?;
                self.line(format!("if ({0} === void 0) {{ {0} = {1}; }}", p.name, d));
            }
            if p.rest {
                let index = self.index_temp();
                self.line(format!("var {} = [];", p.name));
                self.line(format!(
                    "for (var {i} = {n}; {i} < arguments.length; {i}++) {{",
                    i = index,
                    n = i
                ));
                let offset = if i == 0 {
                    index.clone()
                } else {
                    format!("{} - {}", index, i)
                };
                self.line(format!("{}{}[{}] = arguments[{}];", INDENT, p.name, offset, index));
                self.line("}");
            }
        }
        Ok(())
    }

    // ---- クラス ----

    fn class(&mut self, class: &ClassDecl) -> EmitResult<()> {
        let name = class.name.as_str();
        let has_base = class.extends.is_some();
        if has_base {
            self.used_extends = true;
        }
        let header = if has_base {
            format!("var {} = /** @class */ (function (_super) {{", name)
        } else {
            format!("var {} = /** @class */ (function () {{", name)
        };
        self.line(header);
        let saved_class = self.class;
        let inner = self.nested(|e| {
            if has_base {
                e.line(format!("__extends({}, _super);", name));
            }
            e.class_ctor(class, has_base)?;
            for m in &class.members {
                match m {
                    ClassMember::Method {
                        name: m_name,
                        func,
                        is_static,
                        ..
                    } => {
                        if func.body.is_none() {
                            continue;
                        }
                        e.class = Some(ClassCtx {
                            has_base,
                            is_static: *is_static,
                        });
                        let target = if *is_static {
                            format!("{}.{}", name, m_name)
                        } else {
                            format!("{}.prototype.{}", name, m_name)
                        };
                        let f = e.method(func)?;
                        e.class = None;
                        e.line(format!("{} = {};", target, f));
                    }
                    ClassMember::Property {
                        name: p_name,
                        init: Some(init),
                        is_static: true,
                        ..
                    } => {
                        e.class = Some(ClassCtx {
                            has_base,
                            is_static: true,
                        });
                        let v = e.expr(init, 2)?;
                        e.class = None;
                        e.line(format!("{}.{} = {};", name, p_name, v));
                    }
                    _ => {}
                }
            }
            e.line(format!("return {};", name));
            Ok(())
        })?;
        self.class = saved_class;
        self.lines.extend(inner);
        match &class.extends {
            Some(base) => self.line(format!("}}({}));", base.name)),
            None => self.line("}());"),
        }
        Ok(())
    }

    /// メソッドは `this` を自前で持つ通常の関数式として出力する。
    fn method(&mut self, func: &Function) -> EmitResult<String> {
        let params: Vec<&str> = func
            .params
            .iter()
            .filter(|p| !p.rest)
            .map(|p| p.name.as_str())
            .collect();
        let head = format!("function ({})", params.join(", "));
        let body = func.body.as_deref().unwrap_or(&[]);
        let captures = body.iter().any(stmt_arrows_use_this);
        let has_prologue = captures || func.params.iter().any(|p| p.default.is_some() || p.rest);
        self.this_names.push("this");
        self.scopes.push(FnScope::default());
        let result = self.function_body(func, body, captures, has_prologue, &head);
        self.scopes.pop();
        self.this_names.pop();
        result
    }

    fn class_ctor(&mut self, class: &ClassDecl, has_base: bool) -> EmitResult<()> {
        let ctor = class.members.iter().find_map(|m| match m {
            ClassMember::Constructor { func, .. } if func.body.is_some() => Some(func),
            _ => None,
        });
        let params: Vec<&Param> = ctor
            .map(|f| f.params.iter().filter(|p| !p.rest).collect())
            .unwrap_or_default();
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        let head = format!("function {}({})", class.name, names.join(", "));
        let body: &[Stmt] = ctor.and_then(|f| f.body.as_deref()).unwrap_or(&[]);
        let captures = body.iter().any(stmt_arrows_use_this);

        self.this_names.push("this");
        self.scopes.push(FnScope::default());
        self.class = Some(ClassCtx {
            has_base,
            is_static: false,
        });
        let result = self.nested(|e| {
            if captures {
                e.line("var _this = this;");
            }
            if let Some(f) = ctor {
                e.param_prologue(&f.params)?;
            }
            let super_at = body.iter().position(is_super_call_stmt);
            match super_at {
                Some(at) => {
                    e.stmts(&body[..=at])?;
                    e.property_inits(class, ctor)?;
                    e.stmts(&body[at + 1..])
                }
                None => {
                    if has_base {
                        e.line("_super.apply(this, arguments);");
                    }
                    e.property_inits(class, ctor)?;
                    e.stmts(body)
                }
            }
        });
        self.class = None;
        self.scopes.pop();
        self.this_names.pop();
        let lines = result?;
        self.line(format!("{} {{", head));
        self.lines.extend(lines);
        self.line("}");
        Ok(())
    }

    /// 引数プロパティとインスタンスフィールドの初期化。
    fn property_inits(&mut self, class: &ClassDecl, ctor: Option<&Function>) -> EmitResult<()> {
        if let Some(f) = ctor {
            for p in f.params.iter().filter(|p| p.property.is_some()) {
                self.line(format!("this.{0} = {0};", p.name));
            }
        }
        for m in &class.members {
            if let ClassMember::Property {
                name,
                init: Some(init),
                is_static: false,
                ..
            } = m
            {
                let v = self.expr(init, 2)?;
                self.line(format!("this.{} = {};", name, v));
            }
        }
        Ok(())
    }

    // ---- 式 ----

    /// 優先順位 `min` 未満の式は括弧で包む。
    fn expr(&mut self, e: &Expr, min: u8) -> EmitResult<String> {
        let text = self.expr_inner(e)?;
        if precedence(e) < min {
            Ok(format!("({})", text))
        } else {
            Ok(text)
        }
    }

    fn args(&mut self, args: &[Expr]) -> EmitResult<String> {
        let mut parts = Vec::with_capacity(args.len());
        for a in args {
            parts.push(self.expr(a, 2)?);
        }
        Ok(parts.join(", "))
    }

    fn expr_inner(&mut self, e: &Expr) -> EmitResult<String> {
        Ok(match e {
            Expr::Number { value, .. } => number_to_string(*value),
            Expr::String { value, .. } => quote(value),
            Expr::Template { quasis, exprs, .. } => {
                let mut parts = Vec::new();
                for (i, q) in quasis.iter().enumerate() {
                    if !q.is_empty() || (i == 0 && !exprs.is_empty()) {
                        parts.push(quote(q));
                    }
                    if let Some(x) = exprs.get(i) {
                        parts.push(self.expr(x, 13)?);
                    }
                }
                if parts.is_empty() {
                    "\"\"".to_string()
                } else {
                    parts.join(" + ")
                }
            }
            Expr::Bool { value, .. } => value.to_string(),
            Expr::Null { .. } => "null".into(),
            Expr::Ident { name, .. } => name.clone(),
            Expr::This { .. } => self.this_name().to_string(),
            Expr::Super { span } => match self.class {
                Some(ClassCtx {
                    has_base: true,
                    is_static,
                }) => {
                    if is_static {
                        "_super".into()
                    } else {
                        "_super.prototype".into()
                    }
                }
                _ => {
                    return Err(EmitError::unsupported(
                        "EMT001",
                        "'super' outside of a derived class",
                        *span,
                    ))
                }
            },
            Expr::Array { items, .. } => format!("[{}]", self.args(items)?),
            Expr::Object { props, .. } => self.object(props)?,
            Expr::Function { func, .. } => self.function(func, func.name.as_deref())?,
            Expr::Unary { op, expr, .. } => {
                let operand = self.expr(expr, 15)?;
                match op {
                    UnaryOp::TypeOf | UnaryOp::Void | UnaryOp::Delete => {
                        format!("{} {}", op.as_str(), operand)
                    }
                    UnaryOp::Neg | UnaryOp::Plus
                        if operand.starts_with('-') || operand.starts_with('+') =>
                    {
                        format!("{} {}", op.as_str(), operand)
                    }
                    _ => format!("{}{}", op.as_str(), operand),
                }
            }
            Expr::Update {
                increment,
                prefix,
                target,
                ..
            } => {
                let t = self.expr(target, 18)?;
                let op = if *increment { "++" } else { "--" };
                if *prefix {
                    format!("{}{}", op, t)
                } else {
                    format!("{}{}", t, op)
                }
            }
            Expr::Binary {
                op: BinaryOp::Pow,
                left,
                right,
                ..
            } => {
                let l = self.expr(left, 2)?;
                let r = self.expr(right, 2)?;
                format!("Math.pow({}, {})", l, r)
            }
            Expr::Binary { op, left, right, .. } => {
                let p = binary_precedence(*op);
                let l = self.expr(left, p)?;
                let r = self.expr(right, p + 1)?;
                format!("{} {} {}", l, op.as_str(), r)
            }
            Expr::Logical { op, left, right, .. } => {
                let p = if *op == LogicalOp::Or { 4 } else { 5 };
                let l = self.expr(left, p)?;
                let r = self.expr(right, p + 1)?;
                format!("{} {} {}", l, op.as_str(), r)
            }
            Expr::Assign {
                op, target, value, ..
            } => {
                let t = self.expr(target, 18)?;
                match op {
                    AssignOp(None) => format!("{} = {}", t, self.expr(value, 2)?),
                    AssignOp(Some(BinaryOp::Pow)) => {
                        format!("{0} = Math.pow({0}, {1})", t, self.expr(value, 2)?)
                    }
                    AssignOp(Some(bin)) => {
                        format!("{} {}= {}", t, bin.as_str(), self.expr(value, 2)?)
                    }
                }
            }
            Expr::Conditional { test, cons, alt, .. } => {
                let t = self.expr(test, 4)?;
                let c = self.expr(cons, 2)?;
                let a = self.expr(alt, 2)?;
                format!("{} ? {} : {}", t, c, a)
            }
            Expr::Call { callee, args, .. } => self.call(callee, args)?,
            Expr::New { callee, args, .. } => {
                let c = self.expr(callee, 18)?;
                let c = if contains_call(callee) { format!("({})", c) } else { c };
                format!("new {}({})", c, self.args(args)?)
            }
            Expr::Member {
                object, property, ..
            } => {
                let o = self.member_object(object)?;
                format!("{}.{}", o, property)
            }
            Expr::Index { object, index, .. } => {
                let o = self.member_object(object)?;
                format!("{}[{}]", o, self.expr(index, 0)?)
            }
            Expr::As { expr, .. } => self.expr_inner(expr)?,
        })
    }

    fn member_object(&mut self, object: &Expr) -> EmitResult<String> {
        let o = self.expr(object, 18)?;
        if matches!(strip_as(object), Expr::Number { .. }) && !o.starts_with('(') {
            return Ok(format!("({})", o));
        }
        // `(function () {}).call` のように関数式を直接参照する場合も括弧が要る
        if matches!(strip_as(object), Expr::Function { .. } | Expr::Object { .. }) {
            return Ok(format!("({})", o));
        }
        Ok(o)
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> EmitResult<String> {
        let this = self.this_name();
        match callee {
            Expr::Super { .. } => {
                let a = self.args(args)?;
                if a.is_empty() {
                    Ok(format!("_super.call({})", this))
                } else {
                    Ok(format!("_super.call({}, {})", this, a))
                }
            }
            Expr::Member {
                object, property, ..
            } if matches!(object.as_ref(), Expr::Super { .. }) => {
                let base = self.expr_inner(object)?;
                let a = self.args(args)?;
                if a.is_empty() {
                    Ok(format!("{}.{}.call({})", base, property, this))
                } else {
                    Ok(format!("{}.{}.call({}, {})", base, property, this, a))
                }
            }
            _ => {
                let c = self.expr(callee, 18)?;
                let c = if matches!(strip_as(callee), Expr::Function { .. }) {
                    format!("({})", c)
                } else {
                    c
                };
                Ok(format!("{}({})", c, self.args(args)?))
            }
        }
    }

    fn object(&mut self, props: &[PropEntry]) -> EmitResult<String> {
        if props.is_empty() {
            return Ok("{}".into());
        }
        if !props.iter().any(|p| matches!(p, PropEntry::Spread { .. })) {
            return self.object_literal(props);
        }
        self.used_assign = true;
        let mut parts = Vec::new();
        let mut run: Vec<PropEntry> = Vec::new();
        for p in props {
            match p {
                PropEntry::Property { .. } => run.push(p.clone()),
                PropEntry::Spread { expr, .. } => {
                    if !run.is_empty() {
                        let lit = self.object_literal(&run)?;
                        parts.push(lit);
                        run.clear();
                    }
                    parts.push(self.expr(expr, 2)?);
                }
            }
        }
        if !run.is_empty() {
            parts.push(self.object_literal(&run)?);
        }
        if !matches!(props.first(), Some(PropEntry::Property { .. })) {
            parts.insert(0, "{}".into());
        }
        Ok(format!("__assign({})", parts.join(", ")))
    }

    fn object_literal(&mut self, props: &[PropEntry]) -> EmitResult<String> {
        let mut parts = Vec::with_capacity(props.len());
        for p in props {
            if let PropEntry::Property { key, value, .. } = p {
                let k = if is_identifier(key) { key.clone() } else { quote(key) };
                parts.push(format!("{}: {}", k, self.expr(value, 2)?));
            }
        }
        Ok(format!("{{ {} }}", parts.join(", ")))
    }
}

// ---- 補助 ----

fn strip_as(e: &Expr) -> &Expr {
    match e {
        Expr::As { expr, .. } => strip_as(expr),
        other => other,
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::BitOr => 6,
        BinaryOp::BitXor => 7,
        BinaryOp::BitAnd => 8,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::StrictEq | BinaryOp::StrictNe => 9,
        BinaryOp::Lt
        | BinaryOp::Gt
        | BinaryOp::Le
        | BinaryOp::Ge
        | BinaryOp::In
        | BinaryOp::InstanceOf => 10,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => 11,
        BinaryOp::Add | BinaryOp::Sub => 12,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 13,
        BinaryOp::Pow => 18,
    }
}

/// 出力した式の優先順位（大きいほど強く結合する）。
fn precedence(e: &Expr) -> u8 {
    match e {
        Expr::Assign { .. } => 2,
        Expr::Conditional { .. } => 3,
        Expr::Logical { op, .. } => {
            if *op == LogicalOp::Or {
                4
            } else {
                5
            }
        }
        Expr::Binary { op, .. } => binary_precedence(*op),
        Expr::Unary { .. } => 15,
        Expr::Update { prefix: true, .. } => 15,
        Expr::Update { prefix: false, .. } => 16,
        Expr::Template { quasis, exprs, .. } => {
            if exprs.is_empty() && quasis.len() <= 1 {
                20
            } else {
                12
            }
        }
        Expr::As { expr, .. } => precedence(expr),
        Expr::Call { .. } | Expr::New { .. } | Expr::Member { .. } | Expr::Index { .. } => 18,
        _ => 20,
    }
}

fn contains_call(e: &Expr) -> bool {
    match e {
        Expr::Call { .. } => true,
        Expr::Member { object, .. } | Expr::Index { object, .. } => contains_call(object),
        Expr::As { expr, .. } => contains_call(expr),
        _ => false,
    }
}

fn is_super_call_stmt(s: &Stmt) -> bool {
    matches!(
        s,
        Stmt::Expr { expr: Expr::Call { callee, .. }, .. } if matches!(callee.as_ref(), Expr::Super { .. })
    )
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if crate::lexer::is_ident_start(c))
        && chars.all(crate::lexer::is_ident_rest)
}

/// JS の二重引用符文字列リテラル。
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// 名前付き import の受け皿変数名（`./lib/util-x` → `util_x_1`）。
fn module_alias(module: &str) -> String {
    let base = module.rsplit('/').next().unwrap_or(module);
    let base = base.strip_suffix(".js").unwrap_or(base);
    let mut name: String = base
        .chars()
        .map(|c| if crate::lexer::is_ident_rest(c) { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    format!("{}_1", name)
}

// ---- `this` を捕捉するアロー関数の検出 ----

fn stmt_arrows_use_this(s: &Stmt) -> bool {
    match s {
        Stmt::Var { decls, .. } => decls
            .iter()
            .any(|d| d.init.as_ref().is_some_and(expr_arrows_use_this)),
        Stmt::Expr { expr, .. } | Stmt::Throw { value: expr, .. } => expr_arrows_use_this(expr),
        Stmt::Return { value, .. } => value.as_ref().is_some_and(expr_arrows_use_this),
        Stmt::Block { body, .. } => body.iter().any(stmt_arrows_use_this),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            expr_arrows_use_this(cond)
                || stmt_arrows_use_this(then_branch)
                || else_branch.as_deref().is_some_and(stmt_arrows_use_this)
        }
        Stmt::While { cond, body, .. } | Stmt::DoWhile { body, cond, .. } => {
            expr_arrows_use_this(cond) || stmt_arrows_use_this(body)
        }
        Stmt::For {
            init,
            test,
            update,
            body,
            ..
        } => {
            let init_uses = match init {
                Some(ForInit::Var { decls, .. }) => decls
                    .iter()
                    .any(|d| d.init.as_ref().is_some_and(expr_arrows_use_this)),
                Some(ForInit::Expr(e)) => expr_arrows_use_this(e),
                None => false,
            };
            init_uses
                || test.as_ref().is_some_and(expr_arrows_use_this)
                || update.as_ref().is_some_and(expr_arrows_use_this)
                || stmt_arrows_use_this(body)
        }
        Stmt::ForOf { iter: e, body, .. } | Stmt::ForIn { object: e, body, .. } => {
            expr_arrows_use_this(e) || stmt_arrows_use_this(body)
        }
        Stmt::Switch { disc, cases, .. } => {
            expr_arrows_use_this(disc)
                || cases.iter().any(|c| {
                    c.test.as_ref().is_some_and(expr_arrows_use_this)
                        || c.body.iter().any(stmt_arrows_use_this)
                })
        }
        Stmt::Try {
            block,
            catch,
            finally,
            ..
        } => {
            block.iter().any(stmt_arrows_use_this)
                || catch
                    .as_ref()
                    .is_some_and(|c| c.body.iter().any(stmt_arrows_use_this))
                || finally
                    .as_ref()
                    .is_some_and(|f| f.iter().any(stmt_arrows_use_this))
        }
        _ => false,
    }
}

/// 式中のアロー関数が（入れ子のアロー関数を含めて）`this` を参照するか。
fn expr_arrows_use_this(e: &Expr) -> bool {
    walk_expr(e, &mut |x| match x {
        Expr::Function { func, .. } if func.is_arrow => {
            func.body.as_deref().unwrap_or(&[]).iter().any(stmt_uses_this)
                || func.params.iter().any(|p| p.default.as_ref().is_some_and(uses_this))
        }
        _ => false,
    })
}

/// アロー関数の本体内で `this` が（通常関数の境界を越えずに）現れるか。
fn stmt_uses_this(s: &Stmt) -> bool {
    let mut found = false;
    visit_stmt_exprs(s, &mut |e| found = found || uses_this(e));
    found
}

fn uses_this(e: &Expr) -> bool {
    walk_expr(e, &mut |x| matches!(x, Expr::This { .. } | Expr::Super { .. }))
        || walk_expr(e, &mut |x| match x {
            Expr::Function { func, .. } if func.is_arrow => {
                func.body.as_deref().unwrap_or(&[]).iter().any(stmt_uses_this)
            }
            _ => false,
        })
}

/// 通常関数の内側には入らずに式を走査し、述語を満たす部分式があれば真。
fn walk_expr(e: &Expr, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
    if pred(e) {
        return true;
    }
    match e {
        Expr::Template { exprs, .. } => exprs.iter().any(|x| walk_expr(x, pred)),
        Expr::Array { items, .. } => items.iter().any(|x| walk_expr(x, pred)),
        Expr::Object { props, .. } => props.iter().any(|p| match p {
            PropEntry::Property { value, .. } => walk_expr(value, pred),
            PropEntry::Spread { expr, .. } => walk_expr(expr, pred),
        }),
        Expr::Unary { expr, .. } | Expr::As { expr, .. } => walk_expr(expr, pred),
        Expr::Update { target, .. } => walk_expr(target, pred),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            walk_expr(left, pred) || walk_expr(right, pred)
        }
        Expr::Assign { target, value, .. } => walk_expr(target, pred) || walk_expr(value, pred),
        Expr::Conditional { test, cons, alt, .. } => {
            walk_expr(test, pred) || walk_expr(cons, pred) || walk_expr(alt, pred)
        }
        Expr::Call { callee, args, .. } | Expr::New { callee, args, .. } => {
            walk_expr(callee, pred) || args.iter().any(|x| walk_expr(x, pred))
        }
        Expr::Member { object, .. } => walk_expr(object, pred),
        Expr::Index { object, index, .. } => walk_expr(object, pred) || walk_expr(index, pred),
        _ => false,
    }
}

/// 文に直接含まれる式を（入れ子の文も含め）訪問する。
fn visit_stmt_exprs(s: &Stmt, f: &mut dyn FnMut(&Expr)) {
    match s {
        Stmt::Var { decls, .. } => decls.iter().filter_map(|d| d.init.as_ref()).for_each(|e| f(e)),
        Stmt::Expr { expr, .. } | Stmt::Throw { value: expr, .. } => f(expr),
        Stmt::Return { value: Some(v), .. } => f(v),
        Stmt::Block { body, .. } => body.iter().for_each(|s| visit_stmt_exprs(s, f)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            f(cond);
            visit_stmt_exprs(then_branch, f);
            if let Some(e) = else_branch {
                visit_stmt_exprs(e, f);
            }
        }
        Stmt::While { cond, body, .. } | Stmt::DoWhile { body, cond, .. } => {
            f(cond);
            visit_stmt_exprs(body, f);
        }
        Stmt::For {
            init,
            test,
            update,
            body,
            ..
        } => {
            match init {
                Some(ForInit::Var { decls, .. }) => {
                    decls.iter().filter_map(|d| d.init.as_ref()).for_each(|e| f(e))
                }
                Some(ForInit::Expr(e)) => f(e),
                None => {}
            }
            if let Some(t) = test {
                f(t);
            }
            if let Some(u) = update {
                f(u);
            }
            visit_stmt_exprs(body, f);
        }
        Stmt::ForOf { iter: e, body, .. } | Stmt::ForIn { object: e, body, .. } => {
            f(e);
            visit_stmt_exprs(body, f);
        }
        Stmt::Switch { disc, cases, .. } => {
            f(disc);
            for c in cases {
                if let Some(t) = &c.test {
                    f(t);
                }
                c.body.iter().for_each(|s| visit_stmt_exprs(s, f));
            }
        }
        Stmt::Try {
            block,
            catch,
            finally,
            ..
        } => {
            block.iter().for_each(|s| visit_stmt_exprs(s, f));
            if let Some(c) = catch {
                c.body.iter().for_each(|s| visit_stmt_exprs(s, f));
            }
            if let Some(fin) = finally {
                fin.iter().for_each(|s| visit_stmt_exprs(s, f));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn emit(src: &str) -> String {
        let program = parse_program(src).unwrap();
        Emitter::new(EmitOptions::default()).emit(&program).unwrap()
    }

    #[test]
    /// 型注釈と型専用宣言は消える。
    fn erases_types() {
        let out = emit("interface P { x: number }\ntype N = number;\nlet a: number = 1 as number;\ndeclare var d: string;");
        assert_eq!(out, "var a = 1;\n");
    }

    #[test]
    /// アロー関数は関数式になり、`this` は `_this` で捕捉される。
    fn lowers_arrows() {
        assert_eq!(emit("const f = (x: number) => x * 2;"), "var f = function (x) { return x * 2; };\n");
        let out = emit("function g() { return () => this; }");
        assert_eq!(
            out,
            "function g() {\n    var _this = this;\n    return function () { return _this; };\n}\n"
        );
    }

    #[test]
    /// テンプレート文字列は連結に、`**` は Math.pow になる。
    fn lowers_operators() {
        assert_eq!(emit("`a${1 + 2}b`;"), "\"a\" + (1 + 2) + \"b\";\n");
        assert_eq!(emit("2 ** 3;"), "Math.pow(2, 3);\n");
        assert_eq!(emit("(1 + 2) * 3;"), "(1 + 2) * 3;\n");
    }

    #[test]
    /// 派生クラスの下位変換。
    fn lowers_derived_class() {
        let out = emit(
            "class A { constructor(public x: number) {} get() { return this.x; } }\n\
             class B extends A { y = 2; constructor() { super(1); } get() { return super.get() + this.y; } }",
        );
        let expected = "var A = /** @class */ (function () {\n\
                        \x20   function A(x) {\n\
                        \x20       this.x = x;\n\
                        \x20   }\n\
                        \x20   A.prototype.get = function () {\n\
                        \x20       return this.x;\n\
                        \x20   };\n\
                        \x20   return A;\n\
                        }());\n\
                        var B = /** @class */ (function (_super) {\n\
                        \x20   __extends(B, _super);\n\
                        \x20   function B() {\n\
                        \x20       _super.call(this, 1);\n\
                        \x20       this.y = 2;\n\
                        \x20   }\n\
                        \x20   B.prototype.get = function () {\n\
                        \x20       return _super.prototype.get.call(this) + this.y;\n\
                        \x20   };\n\
                        \x20   return B;\n\
                        }(A));\n";
        assert_eq!(out, expected);
    }

    #[test]
    /// for-of・既定値引数・オブジェクトスプレッド。
    fn lowers_es2015_features() {
        let out = emit("for (const x of xs) { log(x); }");
        assert_eq!(
            out,
            "for (var _i = 0, xs_1 = xs; _i < xs_1.length; _i++) {\n    var x = xs_1[_i];\n    log(x);\n}\n"
        );
        let out = emit("function f(a = 1) { return a; }");
        assert_eq!(out, "function f(a) {\n    if (a === void 0) { a = 1; }\n    return a;\n}\n");
        assert_eq!(emit("var o = { ...p, k: 1 };"), "var o = __assign({}, p, { k: 1 });\n");
    }

    #[test]
    /// 補助関数は指定時のみ先頭へ出力される。
    fn helpers_only_when_requested() {
        let program = parse_program("class A {}\nclass B extends A {}").unwrap();
        let helpers = EmitOptions {
            emit_helpers: true,
            ..EmitOptions::default()
        };
        let with = Emitter::new(helpers).emit(&program).unwrap();
        assert!(with.starts_with("var __extends"));
        assert!(!with.contains("var __assign"));
        let without = Emitter::new(EmitOptions::default()).emit(&program).unwrap();
        assert!(without.starts_with("var A"));
    }

    #[test]
    /// all_helpers では未使用の補助関数も並び、追記しても先頭行が変わらない。
    fn all_helpers_keep_prologue_fixed() {
        let options = EmitOptions {
            emit_helpers: true,
            all_helpers: true,
        };
        let plain = parse_program("var n = 1;").unwrap();
        let derived = parse_program("var n = 1;\nclass A {}\nclass B extends A {}").unwrap();
        let first = Emitter::new(options).emit(&plain).unwrap();
        let second = Emitter::new(options).emit(&derived).unwrap();
        assert!(first.starts_with("var __extends"));
        assert!(first.contains("var __assign"));
        assert!(second.starts_with(&first));
    }

    #[test]
    /// 追記しても前方の出力は変わらない。
    fn output_prefix_is_stable() {
        let first = emit("for (const a of xs) {}\n");
        let both = emit("for (const a of xs) {}\nfor (const b of ys) {}\n");
        assert!(both.starts_with(&first));
    }
}
