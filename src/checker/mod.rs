// パス: src/checker/mod.rs
// 役割: 構造的型検査器の状態（宣言表・スコープ・診断）と公開 API を提供する
// 意図: 複数のソース（宣言ファイルと REPL バッファ）を 1 つの大域スコープで検査する
// 関連ファイル: src/checker/stmt.rs, src/checker/expr.rs, src/checker/relate.rs, src/typesys.rs
//! 型検査モジュール
//!
//! - 検査は 4 段階。型名の予約 → 型本体の定義 → 値の巻き上げ → 本体の検査。
//!   どの段階も全ソースに対して順に行うため、ファイルを跨いだ前方参照ができる。
//! - 型注釈の無い変数は初期化子から推論し、推論前の参照には `any` が見える。
//! - null 安全検査は行わない（`null` / `undefined` は任意の型へ代入できる）。

use std::collections::HashMap;

use crate::ast::{
    FnTypeExpr, Program, Span, TypeExpr, TypeMember, TypeParam, VarKind,
};
use crate::errors::TypeError;
use crate::typesys::{
    union_of, ObjectType, ParamType, Prop, Signature, Type, TypeParamDef,
};

mod expr;
mod relate;
mod stmt;

pub use relate::MemberLookup;

/// 診断コード。数値部分は対応する TypeScript のコードに揃える。
pub mod codes {
    pub const CANNOT_FIND_NAME: &str = "TYP2304";
    pub const NOT_ASSIGNABLE: &str = "TYP2322";
    pub const NO_PROPERTY: &str = "TYP2339";
    pub const BAD_ARGUMENT: &str = "TYP2345";
    pub const ARG_COUNT: &str = "TYP2554";
    pub const NO_OVERLOAD: &str = "TYP2769";
    pub const NOT_CALLABLE: &str = "TYP2349";
    pub const NOT_NEWABLE: &str = "TYP2351";
    pub const REDECLARE_BLOCK: &str = "TYP2451";
    pub const SUBSEQUENT_VAR: &str = "TYP2403";
    pub const ASSIGN_CONST: &str = "TYP2588";
    pub const ASSIGN_READONLY: &str = "TYP2540";
    pub const BAD_OPERATOR: &str = "TYP2365";
    pub const ARITH_OPERAND: &str = "TYP2362";
    pub const CANNOT_FIND_MODULE: &str = "TYP2307";
    pub const NO_EXPORTED_MEMBER: &str = "TYP2305";
    pub const DUPLICATE_IDENTIFIER: &str = "TYP2300";
    pub const DUPLICATE_FUNCTION: &str = "TYP2393";
    pub const MISSING_IMPLEMENTATION: &str = "TYP2391";
    pub const PRIVATE_ACCESS: &str = "TYP2341";
    pub const PROTECTED_ACCESS: &str = "TYP2445";
    pub const MISSING_RETURN: &str = "TYP2366";
    pub const IMPLICIT_ANY: &str = "TYP7006";
    pub const NOT_ALL_PATHS_RETURN: &str = "TYP7030";
    pub const RETURN_OUTSIDE: &str = "TYP1108";
    pub const JUMP_OUTSIDE: &str = "TYP1105";
    pub const NOT_ITERABLE: &str = "TYP2461";
    pub const BAD_CONVERSION: &str = "TYP2352";
    pub const EXCESS_PROPERTY: &str = "TYP2353";
    pub const BAD_IMPLEMENTS: &str = "TYP2420";
    pub const NOT_CONSTRUCTOR: &str = "TYP2507";
    pub const MISSING_SUPER: &str = "TYP2377";
    pub const CONST_INIT: &str = "TYP1155";
    pub const SUPER_OUTSIDE: &str = "TYP2337";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckOptions {
    pub no_implicit_any: bool,
    pub no_implicit_returns: bool,
}

/// 検査対象の 1 ファイル。
pub struct SourceUnit<'a> {
    pub file: &'a str,
    pub program: &'a Program,
}

#[derive(Clone, Debug)]
pub struct TypeDiagnostic {
    pub file: String,
    pub error: TypeError,
    /// 診断対象の構文の終端（バイトオフセット）。
    pub end: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Var(VarKind),
    Function { implemented: bool },
    Class,
    Param,
    Import,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub kind: SymbolKind,
    pub file: String,
    pub span: Span,
    /// 型がまだ推論されていない（初期化子未検査）。
    pub pending: bool,
}

#[derive(Clone, Debug)]
pub struct InterfaceInfo {
    pub name: String,
    pub type_params: Vec<TypeParamDef>,
    pub extends: Vec<Type>,
    pub members: ObjectType,
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub name: String,
    pub type_params: Vec<TypeParamDef>,
    pub base_name: Option<String>,
    pub base_args: Vec<Type>,
    pub implements: Vec<Type>,
    pub instance: ObjectType,
    pub statics: ObjectType,
    /// 明示的なコンストラクタの引数。`None` なら基底クラスから引き継ぐ。
    pub ctor_params: Option<Vec<ParamType>>,
}

#[derive(Clone, Debug)]
pub struct AliasInfo {
    pub name: String,
    pub type_params: Vec<TypeParamDef>,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub enum TypeDecl {
    Interface(InterfaceInfo),
    Class(ClassInfo),
    Alias(AliasInfo),
}

impl TypeDecl {
    pub fn type_params(&self) -> &[TypeParamDef] {
        match self {
            TypeDecl::Interface(i) => &i.type_params,
            TypeDecl::Class(c) => &c.type_params,
            TypeDecl::Alias(a) => &a.type_params,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModuleInfo {
    pub exports: ObjectType,
}

#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, Symbol>,
    function_boundary: bool,
}

#[derive(Debug)]
struct FnCtx {
    declared_ret: Option<Type>,
    returns: Vec<Type>,
    is_ctor: bool,
    breakable: usize,
}

pub struct Checker {
    options: CheckOptions,
    types: HashMap<String, TypeDecl>,
    modules: HashMap<String, ModuleInfo>,
    scopes: Vec<Scope>,
    diags: Vec<TypeDiagnostic>,
    file: String,
    fn_stack: Vec<FnCtx>,
    /// 関数外（大域）で入れ子になっている反復文・switch 文の数。
    top_breakable: usize,
    class_stack: Vec<String>,
    this_stack: Vec<Type>,
    type_params: Vec<TypeParamDef>,
    /// 名前空間 import のローカル名 → モジュール名。
    namespaces: HashMap<String, String>,
    /// `declare module` 本体の解析中ならそのモジュール名。
    module_prefix: Option<String>,
}

impl Checker {
    pub fn new(options: CheckOptions) -> Self {
        Self {
            options,
            types: HashMap::new(),
            modules: HashMap::new(),
            scopes: vec![Scope {
                vars: HashMap::new(),
                function_boundary: true,
            }],
            diags: Vec::new(),
            file: String::new(),
            fn_stack: Vec::new(),
            top_breakable: 0,
            class_stack: Vec::new(),
            this_stack: Vec::new(),
            type_params: Vec::new(),
            namespaces: HashMap::new(),
            module_prefix: None,
        }
    }

    /// 全ソースを 1 つの大域スコープで検査する。
    pub fn check_units(mut self, units: &[SourceUnit<'_>]) -> Checked {
        for u in units {
            self.file = u.file.to_string();
            self.hoist_type_names(&u.program.stmts);
        }
        for u in units {
            self.file = u.file.to_string();
            self.define_types(&u.program.stmts);
        }
        for u in units {
            self.file = u.file.to_string();
            self.hoist_values(&u.program.stmts);
        }
        for u in units {
            self.file = u.file.to_string();
            self.check_block_stmts(&u.program.stmts);
        }
        let diagnostics = std::mem::take(&mut self.diags);
        log::debug!("type check finished: {} diagnostic(s)", diagnostics.len());
        Checked {
            checker: self,
            diagnostics,
        }
    }

    // ---- 診断 ----

    pub(crate) fn error(&mut self, span: Span, code: &'static str, msg: impl Into<String>) {
        let error = TypeError::at(code, msg, Some(span.pos), Some(span.line), Some(span.col));
        self.diags.push(TypeDiagnostic {
            file: self.file.clone(),
            error,
            end: span.end,
        });
    }

    // ---- スコープ ----

    fn push_scope(&mut self, function_boundary: bool) {
        self.scopes.push(Scope {
            vars: HashMap::new(),
            function_boundary,
        });
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.vars.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes.iter_mut().rev().find_map(|s| s.vars.get_mut(name))
    }

    fn current_scope(&self) -> &Scope {
        let last = self.scopes.len() - 1;
        &self.scopes[last]
    }

    fn current_scope_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// `var` の宣言先となる最も内側の関数スコープ。
    fn function_scope_mut(&mut self) -> &mut Scope {
        let idx = self
            .scopes
            .iter()
            .rposition(|s| s.function_boundary)
            .unwrap_or(0);
        &mut self.scopes[idx]
    }

    fn global_scope(&self) -> &Scope {
        &self.scopes[0]
    }

    // ---- 型パラメータ ----

    /// 型パラメータをスコープへ積み、解決済みの定義を返す。戻り値の長さだけ後で取り除く。
    fn push_type_params(&mut self, params: &[TypeParam]) -> Vec<TypeParamDef> {
        let mut defs = Vec::new();
        for p in params {
            self.type_params.push(TypeParamDef {
                name: p.name.clone(),
                constraint: None,
            });
        }
        for (i, p) in params.iter().enumerate() {
            let constraint = p.constraint.as_ref().map(|c| self.resolve_type(c));
            let at = self.type_params.len() - params.len() + i;
            self.type_params[at].constraint = constraint.clone();
            defs.push(TypeParamDef {
                name: p.name.clone(),
                constraint,
            });
        }
        defs
    }

    fn pop_type_params(&mut self, count: usize) {
        let keep = self.type_params.len().saturating_sub(count);
        self.type_params.truncate(keep);
    }

    pub(crate) fn type_param_constraint(&self, name: &str) -> Option<Type> {
        self.type_params
            .iter()
            .rev()
            .find(|tp| tp.name == name)
            .and_then(|tp| tp.constraint.clone())
    }

    // ---- 型注釈の解決 ----

    pub(crate) fn resolve_type(&mut self, te: &TypeExpr) -> Type {
        match te {
            TypeExpr::Named { name, args, span } => self.resolve_named(name, args, *span),
            TypeExpr::Array(inner) => Type::Array(Box::new(self.resolve_type(inner))),
            TypeExpr::Function(f) => Type::func(self.resolve_fn_type(f)),
            TypeExpr::Object(members) => Type::object(self.resolve_members(members)),
            TypeExpr::Union(items) => {
                let resolved = items.iter().map(|t| self.resolve_type(t)).collect();
                union_of(resolved)
            }
            TypeExpr::StringLit(_) => Type::String,
            TypeExpr::NumberLit(_) => Type::Number,
        }
    }

    fn resolve_named(&mut self, name: &str, args: &[TypeExpr], span: Span) -> Type {
        if self.type_params.iter().any(|tp| tp.name == name) {
            return Type::Param(name.to_string());
        }
        let builtin = match name {
            "any" => Some(Type::Any),
            "number" => Some(Type::Number),
            "string" => Some(Type::String),
            "boolean" => Some(Type::Boolean),
            "void" => Some(Type::Void),
            "undefined" => Some(Type::Undefined),
            "null" => Some(Type::Null),
            "never" => Some(Type::Never),
            "object" => Some(Type::object(ObjectType::default())),
            _ => None,
        };
        if let Some(t) = builtin {
            return t;
        }
        let resolved_args: Vec<Type> = args.iter().map(|a| self.resolve_type(a)).collect();
        if name == "Array" {
            let elem = resolved_args.into_iter().next().unwrap_or(Type::Any);
            return Type::Array(Box::new(elem));
        }
        match self.qualify_type_name(name) {
            Some(key) => Type::Ref {
                name: key,
                args: resolved_args,
            },
            None => {
                self.error(
                    span,
                    codes::CANNOT_FIND_NAME,
                    format!("名前 '{}' が見つかりません", name),
                );
                Type::Any
            }
        }
    }

    /// 型名を宣言表のキーへ変換する。`ns.T` はモジュール名で修飾する。
    fn qualify_type_name(&self, name: &str) -> Option<String> {
        if let Some(prefix) = &self.module_prefix {
            let key = format!("{}.{}", prefix, name);
            if self.types.contains_key(&key) {
                return Some(key);
            }
        }
        if self.types.contains_key(name) {
            return Some(name.to_string());
        }
        let (head, rest) = name.split_once('.')?;
        let module = self.namespaces.get(head)?;
        let key = format!("{}.{}", module, rest);
        self.types.contains_key(&key).then_some(key)
    }

    fn resolve_params(&mut self, params: &[crate::ast::Param]) -> Vec<ParamType> {
        params
            .iter()
            .map(|p| {
                let ty = match &p.ty {
                    Some(t) => self.resolve_type(t),
                    None if p.rest => Type::Array(Box::new(Type::Any)),
                    None => Type::Any,
                };
                ParamType {
                    name: p.name.clone(),
                    ty,
                    optional: p.optional || p.default.is_some(),
                    rest: p.rest,
                }
            })
            .collect()
    }

    fn resolve_fn_type(&mut self, f: &FnTypeExpr) -> Signature {
        let type_params = self.push_type_params(&f.type_params);
        let params = self.resolve_params(&f.params);
        let ret = self.resolve_type(&f.ret);
        self.pop_type_params(type_params.len());
        Signature {
            type_params,
            params,
            ret,
        }
    }

    fn resolve_members(&mut self, members: &[TypeMember]) -> ObjectType {
        let mut obj = ObjectType::default();
        for m in members {
            match m {
                TypeMember::Property {
                    name,
                    ty,
                    optional,
                    readonly,
                    ..
                } => {
                    let mut prop = Prop::new(name.clone(), self.resolve_type(ty));
                    prop.optional = *optional;
                    prop.readonly = *readonly;
                    obj.upsert(prop);
                }
                TypeMember::Method {
                    name,
                    sig,
                    optional,
                    ..
                } => {
                    let sig = self.resolve_fn_type(sig);
                    let mut prop = Prop::method(name.clone(), sig);
                    prop.optional = *optional;
                    merge_member(&mut obj, prop);
                }
                TypeMember::Call { sig, .. } => {
                    let sig = self.resolve_fn_type(sig);
                    obj.calls.push(sig);
                }
                TypeMember::Construct { sig, .. } => {
                    let sig = self.resolve_fn_type(sig);
                    obj.constructs.push(sig);
                }
                TypeMember::Index { key, value, .. } => {
                    obj.index_numeric = matches!(self.resolve_type(key), Type::Number);
                    obj.index = Some(self.resolve_type(value));
                }
            }
        }
        obj
    }
}

/// メソッドの重複宣言はオーバーロードとしてシグネチャを束ねる。
pub(crate) fn merge_member(obj: &mut ObjectType, prop: Prop) {
    if let Some(existing) = obj.props.iter_mut().find(|p| p.name == prop.name) {
        if existing.is_method && prop.is_method {
            if let (Type::Object(old), Type::Object(new)) = (&existing.ty, &prop.ty) {
                let mut merged = (**old).clone();
                merged.calls.extend(new.calls.iter().cloned());
                existing.ty = Type::object(merged);
                return;
            }
        }
        *existing = prop;
        return;
    }
    obj.props.push(prop);
}

/// 検査済みの大域環境。REPL の型問い合わせと補完に使う。
pub struct Checked {
    checker: Checker,
    pub diagnostics: Vec<TypeDiagnostic>,
}

impl Checked {
    pub fn diagnostics_for(&self, file: &str) -> Vec<&TypeDiagnostic> {
        self.diagnostics.iter().filter(|d| d.file == file).collect()
    }

    pub fn global(&self, name: &str) -> Option<&Symbol> {
        self.checker.global_scope().vars.get(name)
    }

    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checker.global_scope().vars.keys().cloned().collect();
        names.sort();
        names
    }

    /// 大域スコープで式を検査し、その型を返す（補完用）。診断は捨てる。
    pub fn expression_type(&mut self, expr: &crate::ast::Expr) -> Type {
        let ty = self.checker.check_expr(expr, None);
        self.checker.diags.clear();
        ty
    }

    /// 型が持つプロパティ名の一覧（補完用）。
    pub fn member_names(&self, ty: &Type) -> Vec<String> {
        let mut names: Vec<String> = match self.checker.apparent(ty) {
            Some(obj) => obj.props.iter().map(|p| p.name.clone()).collect(),
            None => Vec::new(),
        };
        names.sort();
        names.dedup();
        names
    }

    /// 値の宣言を 1 行以上のシグネチャ表示に変換する。
    pub fn value_signature(&self, name: &str) -> Option<Vec<String>> {
        let sym = self.global(name)?;
        let lines = match sym.kind {
            SymbolKind::Var(kind) => vec![format!("{} {}: {}", kind.as_str(), name, sym.ty)],
            SymbolKind::Function { .. } => match &sym.ty {
                Type::Object(obj) if !obj.calls.is_empty() => obj
                    .calls
                    .iter()
                    .map(|c| {
                        format!(
                            "function {}{}",
                            name,
                            crate::typesys::SignatureDisplay::colon(c)
                        )
                    })
                    .collect(),
                other => vec![format!("function {}: {}", name, other)],
            },
            SymbolKind::Class => vec![self.class_header(name)],
            SymbolKind::Param => vec![format!("(parameter) {}: {}", name, sym.ty)],
            SymbolKind::Import => vec![format!("import {}: {}", name, sym.ty)],
        };
        Some(lines)
    }

    /// 型の宣言（インタフェース・クラス・型別名）の見出し行。
    pub fn type_signature(&self, name: &str) -> Option<String> {
        let decl = self.checker.types.get(name)?;
        let line = match decl {
            TypeDecl::Interface(info) => {
                let mut s = format!("interface {}{}", name, render_type_params(&info.type_params));
                if !info.extends.is_empty() {
                    let parts: Vec<String> = info.extends.iter().map(|t| t.to_string()).collect();
                    s.push_str(&format!(" extends {}", parts.join(", ")));
                }
                s
            }
            TypeDecl::Class(_) => self.class_header(name),
            TypeDecl::Alias(info) => format!(
                "type {}{} = {}",
                name,
                render_type_params(&info.type_params),
                info.ty
            ),
        };
        Some(line)
    }

    fn class_header(&self, name: &str) -> String {
        match self.checker.types.get(name) {
            Some(TypeDecl::Class(info)) => {
                let mut s = format!("class {}{}", name, render_type_params(&info.type_params));
                if let Some(base) = &info.base_name {
                    s.push_str(&format!(" extends {}", base));
                }
                s
            }
            _ => format!("class {}", name),
        }
    }

    /// クラス・インタフェースのメンバを 1 行ずつ描画する。
    pub fn member_lines(&self, name: &str) -> Vec<String> {
        let Some(decl) = self.checker.types.get(name) else {
            return Vec::new();
        };
        let args: Vec<Type> = decl
            .type_params()
            .iter()
            .map(|tp| Type::Param(tp.name.clone()))
            .collect();
        let mut lines = Vec::new();
        if let TypeDecl::Class(info) = decl {
            for p in &info.statics.props {
                lines.push(format!("static {}", crate::typesys::render_prop(p)));
            }
            let ctor = self.checker.class_ctor_params(info);
            let params: Vec<String> = ctor
                .iter()
                .map(|p| format!("{}{}: {}", p.name, if p.optional { "?" } else { "" }, p.ty))
                .collect();
            lines.push(format!("constructor({})", params.join(", ")));
        }
        if let Some(obj) = self.checker.expand_ref(name, &args, 0) {
            for c in &obj.calls {
                lines.push(crate::typesys::SignatureDisplay::colon(c).to_string());
            }
            for c in &obj.constructs {
                lines.push(format!("new {}", crate::typesys::SignatureDisplay::colon(c)));
            }
            if let Some(idx) = &obj.index {
                lines.push(format!("[key: {}]: {}", obj.index_key(), idx));
            }
            for p in &obj.props {
                let vis = match p.visibility {
                    crate::typesys::Visibility::Public => "",
                    crate::typesys::Visibility::Private => "private ",
                    crate::typesys::Visibility::Protected => "protected ",
                };
                lines.push(format!("{}{}", vis, crate::typesys::render_prop(p)));
            }
        }
        lines
    }
}

fn render_type_params(params: &[TypeParamDef]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
    format!("<{}>", names.join(", "))
}

/// 与えられたソース群を検査する簡易エントリ。
pub fn check_units(units: &[SourceUnit<'_>], options: CheckOptions) -> Checked {
    Checker::new(options).check_units(units)
}
