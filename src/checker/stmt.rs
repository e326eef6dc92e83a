// パス: src/checker/stmt.rs
// 役割: 宣言の巻き上げ（型名・型本体・値）と文の検査を実装する
// 意図: 関数・クラス・モジュール本体で同じ段階的な巻き上げ手順を再利用する
// 関連ファイル: src/checker/mod.rs, src/checker/expr.rs, src/ast.rs

use super::*;
use crate::ast::{
    ClassDecl, ClassMember, ForInit, Function, ImportKind, Modifier, Stmt, VarDeclarator,
};
use crate::typesys::Visibility;

fn visibility_of(m: Option<Modifier>) -> Visibility {
    match m {
        Some(Modifier::Private) => Visibility::Private,
        Some(Modifier::Protected) => Visibility::Protected,
        Some(Modifier::Public) | None => Visibility::Public,
    }
}

/// 本体の末尾まで到達しない（必ず return / throw する）か。
pub(crate) fn always_exits(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_exits)
}

fn stmt_exits(s: &Stmt) -> bool {
    match s {
        Stmt::Return { .. } | Stmt::Throw { .. } => true,
        Stmt::Block { body, .. } => always_exits(body),
        Stmt::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => stmt_exits(then_branch) && stmt_exits(else_branch),
        Stmt::Try {
            block,
            catch,
            finally,
            ..
        } => {
            let finally_exits = finally.as_deref().map(always_exits).unwrap_or(false);
            let main_exits = always_exits(block) && catch.as_ref().map_or(true, |c| always_exits(&c.body));
            finally_exits || main_exits
        }
        Stmt::Switch { cases, .. } => {
            cases.iter().any(|c| c.test.is_none())
                && cases.iter().all(|c| c.body.is_empty() || always_exits(&c.body))
                && cases.last().is_some_and(|c| always_exits(&c.body))
        }
        Stmt::While {
            cond: crate::ast::Expr::Bool { value: true, .. },
            body,
            ..
        } => !contains_break(body),
        _ => false,
    }
}

fn contains_break(s: &Stmt) -> bool {
    match s {
        Stmt::Break { .. } => true,
        Stmt::Block { body, .. } => body.iter().any(contains_break),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => contains_break(then_branch) || else_branch.as_deref().is_some_and(contains_break),
        Stmt::Try {
            block,
            catch,
            finally,
            ..
        } => {
            block.iter().any(contains_break)
                || catch.as_ref().is_some_and(|c| c.body.iter().any(contains_break))
                || finally.as_ref().is_some_and(|f| f.iter().any(contains_break))
        }
        _ => false,
    }
}

/// 値を返す `return` を含むか（入れ子の関数は見ない）。
fn has_value_return(stmts: &[Stmt]) -> bool {
    fn walk(s: &Stmt) -> bool {
        match s {
            Stmt::Return { value, .. } => value.is_some(),
            Stmt::Block { body, .. } => body.iter().any(walk),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => walk(then_branch) || else_branch.as_deref().is_some_and(walk),
            Stmt::While { body, .. }
            | Stmt::DoWhile { body, .. }
            | Stmt::For { body, .. }
            | Stmt::ForOf { body, .. }
            | Stmt::ForIn { body, .. } => walk(body),
            Stmt::Switch { cases, .. } => cases.iter().any(|c| c.body.iter().any(walk)),
            Stmt::Try {
                block,
                catch,
                finally,
                ..
            } => {
                block.iter().any(walk)
                    || catch.as_ref().is_some_and(|c| c.body.iter().any(walk))
                    || finally.as_ref().is_some_and(|f| f.iter().any(walk))
            }
            _ => false,
        }
    }
    stmts.iter().any(walk)
}

fn has_super_call(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| match s {
        Stmt::Expr {
            expr: crate::ast::Expr::Call { callee, .. },
            ..
        } => matches!(callee.as_ref(), crate::ast::Expr::Super { .. }),
        Stmt::Block { body, .. } => has_super_call(body),
        _ => false,
    })
}

impl Checker {
    // ---- 段階 1: 型名の予約 ----

    pub(crate) fn hoist_type_names(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            match s {
                Stmt::Interface { decl, .. } => {
                    let key = self.decl_key(&decl.name);
                    match self.types.get(&key) {
                        None => {
                            self.types.insert(
                                key,
                                TypeDecl::Interface(InterfaceInfo {
                                    name: decl.name.clone(),
                                    type_params: Vec::new(),
                                    extends: Vec::new(),
                                    members: ObjectType::default(),
                                }),
                            );
                        }
                        Some(TypeDecl::Interface(_)) => {}
                        Some(_) => self.error(
                            decl.span,
                            codes::DUPLICATE_IDENTIFIER,
                            format!("識別子 '{}' が重複しています", decl.name),
                        ),
                    }
                }
                Stmt::TypeAlias { name, span, .. } => {
                    let key = self.decl_key(name);
                    if self.types.contains_key(&key) {
                        self.error(
                            *span,
                            codes::DUPLICATE_IDENTIFIER,
                            format!("識別子 '{}' が重複しています", name),
                        );
                        continue;
                    }
                    self.types.insert(
                        key,
                        TypeDecl::Alias(AliasInfo {
                            name: name.clone(),
                            type_params: Vec::new(),
                            ty: Type::Any,
                        }),
                    );
                }
                Stmt::Class { class, .. } => {
                    let key = self.decl_key(&class.name);
                    if self.types.contains_key(&key) {
                        self.error(
                            class.span,
                            codes::DUPLICATE_IDENTIFIER,
                            format!("識別子 '{}' が重複しています", class.name),
                        );
                        continue;
                    }
                    self.types.insert(
                        key,
                        TypeDecl::Class(ClassInfo {
                            name: class.name.clone(),
                            type_params: Vec::new(),
                            base_name: None,
                            base_args: Vec::new(),
                            implements: Vec::new(),
                            instance: ObjectType::default(),
                            statics: ObjectType::default(),
                            ctor_params: None,
                        }),
                    );
                }
                Stmt::Module { name, body, .. } => {
                    let saved = self.module_prefix.replace(name.clone());
                    self.hoist_type_names(body);
                    self.module_prefix = saved;
                }
                Stmt::Import {
                    kind: ImportKind::Namespace(local) | ImportKind::Require(local),
                    module,
                    ..
                } => {
                    self.namespaces.insert(local.clone(), module.clone());
                }
                _ => {}
            }
        }
    }

    /// モジュール本体ではモジュール名で修飾したキーを使う。
    fn decl_key(&self, name: &str) -> String {
        match &self.module_prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        }
    }

    // ---- 段階 2: 型本体の定義 ----

    pub(crate) fn define_types(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            match s {
                Stmt::Interface { decl, .. } => {
                    let key = self.decl_key(&decl.name);
                    let type_params = self.push_type_params(&decl.type_params);
                    let extends: Vec<Type> = decl
                        .extends
                        .iter()
                        .map(|h| {
                            let te = TypeExpr::Named {
                                name: h.name.clone(),
                                args: h.args.clone(),
                                span: h.span,
                            };
                            self.resolve_type(&te)
                        })
                        .collect();
                    let members = self.resolve_members(&decl.members);
                    self.pop_type_params(type_params.len());
                    if let Some(TypeDecl::Interface(info)) = self.types.get_mut(&key) {
                        if info.type_params.is_empty() {
                            info.type_params = type_params;
                        }
                        info.extends.extend(extends);
                        for p in members.props {
                            merge_member(&mut info.members, p);
                        }
                        info.members.calls.extend(members.calls);
                        info.members.constructs.extend(members.constructs);
                        if members.index.is_some() {
                            info.members.index = members.index;
                            info.members.index_numeric = members.index_numeric;
                        }
                    }
                }
                Stmt::TypeAlias {
                    name,
                    type_params,
                    ty,
                    ..
                } => {
                    let key = self.decl_key(name);
                    let defs = self.push_type_params(type_params);
                    let resolved = self.resolve_type(ty);
                    self.pop_type_params(defs.len());
                    if let Some(TypeDecl::Alias(info)) = self.types.get_mut(&key) {
                        info.type_params = defs;
                        info.ty = resolved;
                    }
                }
                Stmt::Class { class, declare, .. } => self.define_class(class, *declare),
                Stmt::Module { name, body, .. } => {
                    let saved = self.module_prefix.replace(name.clone());
                    self.define_types(body);
                    self.module_prefix = saved;
                }
                _ => {}
            }
        }
    }

    fn define_class(&mut self, class: &ClassDecl, _declare: bool) {
        let key = self.decl_key(&class.name);
        let type_params = self.push_type_params(&class.type_params);
        let (base_name, base_args) = match &class.extends {
            Some(h) => {
                let args = h.args.iter().map(|a| self.resolve_type(a)).collect();
                (Some(h.name.clone()), args)
            }
            None => (None, Vec::new()),
        };
        let implements: Vec<Type> = class
            .implements
            .iter()
            .map(|h| {
                let te = TypeExpr::Named {
                    name: h.name.clone(),
                    args: h.args.clone(),
                    span: h.span,
                };
                self.resolve_type(&te)
            })
            .collect();
        let mut instance = ObjectType::default();
        let mut statics = ObjectType::default();
        let mut ctor_params = None;
        for m in &class.members {
            match m {
                ClassMember::Property {
                    name,
                    ty,
                    init,
                    is_static,
                    modifier,
                    readonly,
                    optional,
                    ..
                } => {
                    let t = match (ty, init) {
                        (Some(t), _) => self.resolve_type(t),
                        (None, Some(e)) => literal_type(e),
                        (None, None) => Type::Any,
                    };
                    let prop = Prop {
                        optional: *optional,
                        readonly: *readonly,
                        visibility: visibility_of(*modifier),
                        owner: Some(class.name.clone()),
                        ..Prop::new(name.clone(), t)
                    };
                    if *is_static {
                        statics.upsert(prop);
                    } else {
                        instance.upsert(prop);
                    }
                }
                ClassMember::Method {
                    name,
                    func,
                    is_static,
                    modifier,
                    ..
                } => {
                    let sig = self.function_signature(func);
                    let prop = Prop {
                        visibility: visibility_of(*modifier),
                        owner: Some(class.name.clone()),
                        ..Prop::method(name.clone(), sig)
                    };
                    let target = if *is_static { &mut statics } else { &mut instance };
                    if func.body.is_some() && target.prop(name).is_some_and(|p| p.is_method) {
                        // 実装シグネチャはオーバーロードがあれば外から見えない
                        continue;
                    }
                    merge_member(target, prop);
                }
                ClassMember::Constructor { func, .. } => {
                    let params = self.resolve_params(&func.params);
                    for (p, pt) in func.params.iter().zip(&params) {
                        if let Some(modifier) = p.property {
                            instance.upsert(Prop {
                                visibility: visibility_of(Some(modifier)),
                                owner: Some(class.name.clone()),
                                ..Prop::new(p.name.clone(), pt.ty.clone())
                            });
                        }
                    }
                    if ctor_params.is_none() || func.body.is_none() {
                        ctor_params = Some(params);
                    }
                }
            }
        }
        self.pop_type_params(type_params.len());
        if let Some(TypeDecl::Class(info)) = self.types.get_mut(&key) {
            info.type_params = type_params;
            info.base_name = base_name;
            info.base_args = base_args;
            info.implements = implements;
            info.instance = instance;
            info.statics = statics;
            info.ctor_params = ctor_params;
        }
    }

    /// 関数宣言の外向きシグネチャ（戻り値型が無ければ仮に `any`）。
    pub(crate) fn function_signature(&mut self, func: &Function) -> Signature {
        let type_params = self.push_type_params(&func.type_params);
        let params = self.resolve_params(&func.params);
        let ret = match &func.ret {
            Some(t) => self.resolve_type(t),
            None => Type::Any,
        };
        self.pop_type_params(type_params.len());
        Signature {
            type_params,
            params,
            ret,
        }
    }

    // ---- 段階 3: 値の巻き上げ ----

    pub(crate) fn hoist_values(&mut self, stmts: &[Stmt]) {
        let mut fn_groups: Vec<(String, Vec<Signature>, Option<Signature>, Span, bool)> = Vec::new();
        for s in stmts {
            match s {
                Stmt::Var {
                    kind,
                    decls,
                    declare,
                    ..
                } => {
                    for d in decls {
                        self.hoist_var(*kind, d, *declare);
                    }
                }
                Stmt::Function {
                    func,
                    declare,
                    span,
                    ..
                } => {
                    let Some(name) = func.name.clone() else {
                        continue;
                    };
                    let sig = self.function_signature(func);
                    let ambient = *declare || self.module_prefix.is_some();
                    let group = match fn_groups.iter_mut().position(|g| g.0 == name) {
                        Some(i) => &mut fn_groups[i],
                        None => {
                            fn_groups.push((name.clone(), Vec::new(), None, *span, ambient));
                            let last = fn_groups.len() - 1;
                            &mut fn_groups[last]
                        }
                    };
                    if func.body.is_some() {
                        if group.2.is_some() {
                            let span = *span;
                            self.error(
                                span,
                                codes::DUPLICATE_FUNCTION,
                                format!("関数 '{}' の実装が重複しています", name),
                            );
                        } else {
                            group.2 = Some(sig);
                        }
                    } else {
                        group.1.push(sig);
                    }
                }
                Stmt::Class { class, span, .. } => {
                    self.declare_symbol(
                        &class.name,
                        Type::Ctor(self.decl_key(&class.name)),
                        SymbolKind::Class,
                        *span,
                        false,
                    );
                }
                Stmt::Import { kind, module, span } => self.hoist_import(kind, module, *span),
                Stmt::Module { name, body, .. } => self.hoist_module(name, body),
                _ => {}
            }
        }
        for (name, overloads, implementation, span, ambient) in fn_groups {
            let implemented = implementation.is_some();
            if !implemented && !ambient && !overloads.is_empty() {
                self.error(
                    span,
                    codes::MISSING_IMPLEMENTATION,
                    format!("関数 '{}' の実装がありません", name),
                );
            }
            let calls = if overloads.is_empty() {
                implementation.into_iter().collect()
            } else {
                overloads
            };
            self.declare_function(&name, calls, implemented, span);
        }
    }

    fn hoist_var(&mut self, kind: VarKind, d: &VarDeclarator, declare: bool) {
        let annotated = d.ty.as_ref().map(|t| self.resolve_type(t));
        let pending = annotated.is_none() && !declare;
        let ty = annotated.unwrap_or(Type::Any);
        if kind == VarKind::Const && d.init.is_none() && !declare && self.module_prefix.is_none() {
            self.error(d.span, codes::CONST_INIT, "const 宣言には初期化子が必要です");
        }
        self.declare_symbol(&d.name, ty, SymbolKind::Var(kind), d.span, pending);
    }

    /// シンボルを宣言する。重複規則はブロックスコープ変数を基準に判定する。
    fn declare_symbol(&mut self, name: &str, ty: Type, kind: SymbolKind, span: Span, pending: bool) {
        let in_function_scope = matches!(kind, SymbolKind::Var(VarKind::Var) | SymbolKind::Function { .. });
        let existing = if in_function_scope {
            self.function_scope_mut().vars.get(name).cloned()
        } else {
            self.current_scope().vars.get(name).cloned()
        };
        if let Some(prev) = existing {
            match (prev.kind, kind) {
                (SymbolKind::Var(VarKind::Var), SymbolKind::Var(VarKind::Var)) => {
                    if !pending && !prev.pending && prev.ty != ty {
                        self.error(
                            span,
                            codes::SUBSEQUENT_VAR,
                            format!(
                                "後続の変数宣言は同じ型である必要があります。変数 '{}' は型 '{}' ですが、ここでは型 '{}' です",
                                name, prev.ty, ty
                            ),
                        );
                    }
                    return;
                }
                (SymbolKind::Var(_), SymbolKind::Var(_)) => {
                    self.error(
                        span,
                        codes::REDECLARE_BLOCK,
                        format!("ブロックスコープ変数 '{}' は再宣言できません", name),
                    );
                    return;
                }
                (SymbolKind::Param, SymbolKind::Var(VarKind::Var)) => return,
                _ => {
                    self.error(
                        span,
                        codes::DUPLICATE_IDENTIFIER,
                        format!("識別子 '{}' が重複しています", name),
                    );
                    return;
                }
            }
        }
        let sym = Symbol {
            name: name.to_string(),
            ty,
            kind,
            file: self.file.clone(),
            span,
            pending,
        };
        if in_function_scope {
            self.function_scope_mut().vars.insert(name.to_string(), sym);
        } else {
            self.current_scope_mut().vars.insert(name.to_string(), sym);
        }
    }

    fn declare_function(&mut self, name: &str, calls: Vec<Signature>, implemented: bool, span: Span) {
        let existing = self.function_scope_mut().vars.get(name).cloned();
        if let Some(prev) = existing {
            if let SymbolKind::Function { implemented: prev_impl } = prev.kind {
                if prev_impl && implemented {
                    self.error(
                        span,
                        codes::DUPLICATE_FUNCTION,
                        format!("関数 '{}' の実装が重複しています", name),
                    );
                    return;
                }
                let mut obj = match &prev.ty {
                    Type::Object(o) => (**o).clone(),
                    _ => ObjectType::default(),
                };
                obj.calls.extend(calls);
                if let Some(sym) = self.function_scope_mut().vars.get_mut(name) {
                    sym.ty = Type::object(obj);
                    sym.kind = SymbolKind::Function {
                        implemented: prev_impl || implemented,
                    };
                }
                return;
            }
        }
        let ty = Type::object(ObjectType {
            calls,
            ..ObjectType::default()
        });
        self.declare_symbol(name, ty, SymbolKind::Function { implemented }, span, false);
    }

    fn hoist_import(&mut self, kind: &ImportKind, module: &str, span: Span) {
        let relative = module.starts_with('.');
        let known = self.modules.contains_key(module);
        if !known && !relative {
            self.error(
                span,
                codes::CANNOT_FIND_MODULE,
                format!("モジュール '{}' が見つかりません", module),
            );
        }
        match kind {
            ImportKind::Namespace(local) | ImportKind::Require(local) => {
                let ty = if known {
                    Type::Module(module.to_string())
                } else {
                    Type::Any
                };
                self.declare_symbol(local, ty, SymbolKind::Import, span, false);
            }
            ImportKind::Named(names) => {
                for (imported, local) in names {
                    let ty = match self.modules.get(module) {
                        Some(m) => match m.exports.prop(imported) {
                            Some(p) => p.ty.clone(),
                            None => {
                                self.error(
                                    span,
                                    codes::NO_EXPORTED_MEMBER,
                                    format!(
                                        "モジュール '\"{}\"' にはエクスポートされたメンバ '{}' がありません",
                                        module, imported
                                    ),
                                );
                                Type::Any
                            }
                        },
                        None => Type::Any,
                    };
                    self.declare_symbol(local, ty, SymbolKind::Import, span, false);
                }
            }
        }
    }

    /// `declare module "m" { ... }` の宣言をエクスポートの型にまとめる。
    fn hoist_module(&mut self, name: &str, body: &[Stmt]) {
        let saved = self.module_prefix.replace(name.to_string());
        self.push_scope(true);
        self.hoist_values(body);
        let scope = self.scopes.pop().unwrap_or_default();
        self.module_prefix = saved;
        let module = self.modules.entry(name.to_string()).or_default();
        let mut names: Vec<&String> = scope.vars.keys().collect();
        names.sort();
        for n in names {
            if let Some(sym) = scope.vars.get(n) {
                let mut prop = Prop::new(n.clone(), sym.ty.clone());
                prop.is_method = matches!(sym.kind, SymbolKind::Function { .. });
                merge_member(&mut module.exports, prop);
            }
        }
    }

    // ---- 段階 4: 本体の検査 ----

    /// ブロック内の宣言を巻き上げてから各文を検査する（大域では巻き上げ済み）。
    pub(crate) fn check_block_stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.check_stmt(s);
        }
    }

    fn check_nested_block(&mut self, stmts: &[Stmt]) {
        self.push_scope(false);
        self.hoist_type_names(stmts);
        self.define_types(stmts);
        self.hoist_values(stmts);
        self.check_block_stmts(stmts);
        self.pop_scope();
    }

    fn check_body_stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::Block { body, .. } => self.check_nested_block(body),
            other => self.check_nested_block(std::slice::from_ref(other)),
        }
    }

    pub(crate) fn check_stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::Var { kind, decls, declare, .. } => {
                if !*declare {
                    for d in decls {
                        self.check_var_decl(*kind, d);
                    }
                }
            }
            Stmt::Function { func, declare, .. } => {
                if !*declare && func.body.is_some() {
                    let sig = self.check_function(func, None, None, false);
                    self.refine_function_return(func, sig);
                }
            }
            Stmt::Class { class, declare, .. } => {
                if !*declare {
                    self.check_class(class);
                }
            }
            Stmt::Interface { .. } | Stmt::TypeAlias { .. } | Stmt::Module { .. } | Stmt::Import { .. } => {}
            Stmt::Expr { expr, .. } => {
                self.check_expr(expr, None);
            }
            Stmt::Block { body, .. } => self.check_nested_block(body),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_expr(cond, None);
                self.check_body_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.check_body_stmt(e);
                }
            }
            Stmt::While { cond, body, .. } | Stmt::DoWhile { body, cond, .. } => {
                self.check_expr(cond, None);
                self.enter_breakable();
                self.check_body_stmt(body);
                self.leave_breakable();
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                self.push_scope(false);
                match init {
                    Some(ForInit::Var { kind, decls }) => {
                        for d in decls {
                            self.hoist_var(*kind, d, false);
                            self.check_var_decl(*kind, d);
                        }
                    }
                    Some(ForInit::Expr(e)) => {
                        self.check_expr(e, None);
                    }
                    None => {}
                }
                if let Some(t) = test {
                    self.check_expr(t, None);
                }
                if let Some(u) = update {
                    self.check_expr(u, None);
                }
                self.enter_breakable();
                self.check_body_stmt(body);
                self.leave_breakable();
                self.pop_scope();
            }
            Stmt::ForOf {
                kind,
                name,
                iter,
                body,
                span,
            } => {
                let iter_ty = self.check_expr(iter, None);
                let elem = match self.resolve_alias(&iter_ty) {
                    Type::Array(e) => *e,
                    Type::String => Type::String,
                    Type::Any => Type::Any,
                    other => {
                        self.error(
                            iter.span(),
                            codes::NOT_ITERABLE,
                            format!("型 '{}' は配列型でも文字列型でもありません", other),
                        );
                        Type::Any
                    }
                };
                self.push_scope(false);
                self.declare_symbol(name, elem, SymbolKind::Var(*kind), *span, false);
                self.enter_breakable();
                self.check_body_stmt(body);
                self.leave_breakable();
                self.pop_scope();
            }
            Stmt::ForIn {
                kind,
                name,
                object,
                body,
                span,
            } => {
                self.check_expr(object, None);
                self.push_scope(false);
                match kind {
                    Some(k) => self.declare_symbol(name, Type::String, SymbolKind::Var(*k), *span, false),
                    None => {
                        if self.lookup(name).is_none() {
                            self.error(
                                *span,
                                codes::CANNOT_FIND_NAME,
                                format!("名前 '{}' が見つかりません", name),
                            );
                        }
                    }
                }
                self.enter_breakable();
                self.check_body_stmt(body);
                self.leave_breakable();
                self.pop_scope();
            }
            Stmt::Switch { disc, cases, .. } => {
                self.check_expr(disc, None);
                self.enter_breakable();
                self.push_scope(false);
                let all: Vec<Stmt> = cases.iter().flat_map(|c| c.body.iter().cloned()).collect();
                self.hoist_type_names(&all);
                self.define_types(&all);
                self.hoist_values(&all);
                for c in cases {
                    if let Some(t) = &c.test {
                        self.check_expr(t, None);
                    }
                    self.check_block_stmts(&c.body);
                }
                self.pop_scope();
                self.leave_breakable();
            }
            Stmt::Return { value, span } => self.check_return(value.as_ref(), *span),
            Stmt::Break { span } | Stmt::Continue { span } => {
                let inside = self.fn_stack.last().map_or(self.top_breakable > 0, |f| f.breakable > 0);
                if !inside {
                    self.error(
                        *span,
                        codes::JUMP_OUTSIDE,
                        "'break' / 'continue' は反復文か switch 文の中でのみ使用できます",
                    );
                }
            }
            Stmt::Throw { value, .. } => {
                self.check_expr(value, None);
            }
            Stmt::Try {
                block,
                catch,
                finally,
                ..
            } => {
                self.check_nested_block(block);
                if let Some(c) = catch {
                    self.push_scope(false);
                    if let Some(p) = &c.param {
                        self.declare_symbol(p, Type::Any, SymbolKind::Var(VarKind::Let), s.span(), false);
                    }
                    self.check_nested_block(&c.body);
                    self.pop_scope();
                }
                if let Some(f) = finally {
                    self.check_nested_block(f);
                }
            }
            Stmt::Empty { .. } => {}
        }
    }

    fn enter_breakable(&mut self) {
        match self.fn_stack.last_mut() {
            Some(f) => f.breakable += 1,
            None => self.top_breakable += 1,
        }
    }

    fn leave_breakable(&mut self) {
        match self.fn_stack.last_mut() {
            Some(f) => f.breakable = f.breakable.saturating_sub(1),
            None => self.top_breakable = self.top_breakable.saturating_sub(1),
        }
    }

    fn check_var_decl(&mut self, kind: VarKind, d: &VarDeclarator) {
        let declared = self
            .lookup(&d.name)
            .filter(|s| !s.pending)
            .map(|s| s.ty.clone());
        let annotated = d.ty.is_some();
        let Some(init) = &d.init else {
            return;
        };
        let ctx = if annotated { declared.clone() } else { None };
        let init_ty = self.check_expr(init, ctx.as_ref());
        if annotated {
            if let Some(target) = &declared {
                self.check_assignment(&init_ty, target, init, d.span);
            }
            return;
        }
        let inferred = init_ty.widen();
        let prev = self.lookup(&d.name).cloned();
        match prev {
            Some(sym) if sym.pending => {
                if let Some(slot) = self.lookup_mut(&d.name) {
                    slot.ty = inferred;
                    slot.pending = false;
                }
            }
            Some(sym) if kind == VarKind::Var && sym.ty != inferred => {
                self.error(
                    d.span,
                    codes::SUBSEQUENT_VAR,
                    format!(
                        "後続の変数宣言は同じ型である必要があります。変数 '{}' は型 '{}' ですが、ここでは型 '{}' です",
                        d.name, sym.ty, inferred
                    ),
                );
            }
            _ => {}
        }
    }

    /// 代入可能性を検査し、失敗時に診断を出す。新鮮なオブジェクトリテラルは余剰プロパティも調べる。
    pub(crate) fn check_assignment(&mut self, src: &Type, target: &Type, expr: &crate::ast::Expr, span: Span) {
        if !self.is_assignable(src, target) {
            self.error(
                span,
                codes::NOT_ASSIGNABLE,
                format!("型 '{}' を型 '{}' に割り当てることはできません", src, target),
            );
            return;
        }
        if let crate::ast::Expr::Object { props, .. } = expr {
            let resolved = self.resolve_alias(target);
            if !matches!(resolved, Type::Object(_) | Type::Ref { .. }) {
                return;
            }
            if matches!(&resolved, Type::Ref { name, .. } if name == "Object") {
                return;
            }
            let Some(obj) = self.apparent(&resolved) else {
                return;
            };
            if obj.index.is_some() {
                return;
            }
            for p in props {
                if let crate::ast::PropEntry::Property { key, span, .. } = p {
                    if obj.prop(key).is_none() {
                        self.error(
                            *span,
                            codes::EXCESS_PROPERTY,
                            format!(
                                "オブジェクトリテラルは既知のプロパティのみ指定できます。'{}' は型 '{}' に存在しません",
                                key, target
                            ),
                        );
                    }
                }
            }
        }
    }

    fn check_return(&mut self, value: Option<&crate::ast::Expr>, span: Span) {
        let Some(ctx) = self.fn_stack.last() else {
            self.error(span, codes::RETURN_OUTSIDE, "'return' 文は関数本体の中でのみ使用できます");
            if let Some(v) = value {
                self.check_expr(v, None);
            }
            return;
        };
        let declared = ctx.declared_ret.clone();
        let is_ctor = ctx.is_ctor;
        let ty = match value {
            Some(v) => {
                let t = self.check_expr(v, declared.as_ref());
                if let Some(d) = &declared {
                    if !is_ctor {
                        self.check_assignment(&t, d, v, v.span());
                    }
                }
                t
            }
            None => Type::Void,
        };
        if let Some(ctx) = self.fn_stack.last_mut() {
            ctx.returns.push(ty);
        }
    }

    /// 関数本体を検査し、推論した戻り値型を含むシグネチャを返す。
    pub(crate) fn check_function(
        &mut self,
        func: &Function,
        contextual: Option<&Signature>,
        this_type: Option<Type>,
        is_ctor: bool,
    ) -> Signature {
        let type_params = self.push_type_params(&func.type_params);
        let mut params = Vec::new();
        self.push_scope(true);
        for (i, p) in func.params.iter().enumerate() {
            let ctx_ty = contextual.and_then(|c| c.param_type_at(i)).filter(|t| !t.mentions_param());
            let ty = match (&p.ty, &p.default) {
                (Some(t), _) => self.resolve_type(t),
                (None, Some(d)) => self.check_expr(d, None).widen(),
                (None, None) => match ctx_ty {
                    Some(t) if p.rest => Type::Array(Box::new(t)),
                    Some(t) => t,
                    None => {
                        if self.options.no_implicit_any && contextual.is_none() {
                            self.error(
                                p.span,
                                codes::IMPLICIT_ANY,
                                format!("引数 '{}' の型が暗黙的に 'any' になっています", p.name),
                            );
                        }
                        if p.rest {
                            Type::Array(Box::new(Type::Any))
                        } else {
                            Type::Any
                        }
                    }
                },
            };
            if let (Some(_), Some(d)) = (&p.ty, &p.default) {
                let dt = self.check_expr(d, Some(&ty));
                self.check_assignment(&dt, &ty, d, d.span());
            }
            self.declare_symbol(&p.name, ty.clone(), SymbolKind::Param, p.span, false);
            params.push(ParamType {
                name: p.name.clone(),
                ty,
                optional: p.optional || p.default.is_some(),
                rest: p.rest,
            });
        }
        if !func.is_arrow {
            self.declare_symbol("arguments", Type::Any, SymbolKind::Param, func.span, false);
        }
        let declared_ret = func.ret.as_ref().map(|t| self.resolve_type(t));
        let pushed_this = match (&this_type, func.is_arrow) {
            (Some(t), _) => {
                self.this_stack.push(t.clone());
                true
            }
            (None, false) => {
                self.this_stack.push(Type::Any);
                true
            }
            (None, true) => false,
        };
        self.fn_stack.push(FnCtx {
            declared_ret: declared_ret.clone(),
            returns: Vec::new(),
            is_ctor,
            breakable: 0,
        });
        let body = func.body.as_deref().unwrap_or(&[]);
        self.hoist_type_names(body);
        self.define_types(body);
        self.hoist_values(body);
        self.check_block_stmts(body);
        let ctx = self.fn_stack.pop();
        if pushed_this {
            self.this_stack.pop();
        }
        self.pop_scope();
        self.pop_type_params(type_params.len());

        let returns = ctx.map(|c| c.returns).unwrap_or_default();
        let ret = match &declared_ret {
            Some(t) => t.clone(),
            None if func.expr_body => returns.first().cloned().unwrap_or(Type::Void),
            None => {
                let valued: Vec<Type> = returns.into_iter().filter(|t| *t != Type::Void).collect();
                if valued.is_empty() {
                    Type::Void
                } else {
                    union_of(valued).widen()
                }
            }
        };
        if func.body.is_some() && !func.expr_body && !is_ctor {
            self.check_missing_return(func, declared_ret.as_ref(), body);
        }
        Signature {
            type_params,
            params,
            ret,
        }
    }

    fn check_missing_return(&mut self, func: &Function, declared: Option<&Type>, body: &[Stmt]) {
        if always_exits(body) {
            return;
        }
        match declared {
            Some(t) => {
                let returns_nothing_ok = matches!(t, Type::Any | Type::Void | Type::Undefined)
                    || matches!(t, Type::Union(items) if items.iter().any(|i| matches!(i, Type::Void | Type::Any | Type::Undefined)));
                if !returns_nothing_ok {
                    self.error(
                        func.span,
                        codes::MISSING_RETURN,
                        "関数の戻り値型に 'undefined' が含まれず、末尾に 'return' 文がありません",
                    );
                }
            }
            None => {
                if self.options.no_implicit_returns && has_value_return(body) {
                    self.error(func.span, codes::NOT_ALL_PATHS_RETURN, "すべてのコードパスが値を返すわけではありません");
                }
            }
        }
    }

    /// 戻り値型を省略した関数の型を、推論結果で更新する。
    fn refine_function_return(&mut self, func: &Function, sig: Signature) {
        if func.ret.is_some() {
            return;
        }
        let Some(name) = &func.name else {
            return;
        };
        let Some(sym) = self.lookup_mut(name) else {
            return;
        };
        if let Type::Object(obj) = &sym.ty {
            if obj.calls.len() == 1 {
                let mut updated = (**obj).clone();
                updated.calls[0].ret = sig.ret;
                sym.ty = Type::object(updated);
            }
        }
    }

    fn check_class(&mut self, class: &ClassDecl) {
        let key = self.decl_key(&class.name);
        let Some(TypeDecl::Class(info)) = self.types.get(&key).cloned() else {
            return;
        };
        if let Some(base) = &info.base_name {
            let is_class = matches!(self.types.get(base), Some(TypeDecl::Class(_)));
            let newable = self
                .lookup(base)
                .map(|s| s.ty.clone())
                .and_then(|t| self.construct_signatures(&t))
                .is_some_and(|sigs| !sigs.is_empty());
            if !is_class && !newable {
                let span = class.extends.as_ref().map(|h| h.span).unwrap_or(class.span);
                self.error(
                    span,
                    codes::NOT_CONSTRUCTOR,
                    format!("'{}' はコンストラクタ関数型ではありません", base),
                );
            }
        }
        let tp_count = {
            let defs = self.push_type_params(&class.type_params);
            defs.len()
        };
        let instance_ty = Type::Ref {
            name: key.clone(),
            args: info
                .type_params
                .iter()
                .map(|tp| Type::Param(tp.name.clone()))
                .collect(),
        };
        self.class_stack.push(key.clone());
        for m in &class.members {
            match m {
                ClassMember::Property {
                    name,
                    ty,
                    init: Some(init),
                    is_static,
                    span,
                    ..
                } => {
                    let this_ty = if *is_static {
                        Type::Ctor(key.clone())
                    } else {
                        instance_ty.clone()
                    };
                    self.this_stack.push(this_ty);
                    let declared = ty.as_ref().map(|t| self.resolve_type(t));
                    let t = self.check_expr(init, declared.as_ref());
                    self.this_stack.pop();
                    match declared {
                        Some(d) => self.check_assignment(&t, &d, init, *span),
                        None => self.refine_class_prop(&key, name, *is_static, t.widen(), false),
                    }
                }
                ClassMember::Property { .. } => {}
                ClassMember::Method {
                    name,
                    func,
                    is_static,
                    ..
                } => {
                    if func.body.is_none() {
                        continue;
                    }
                    let this_ty = if *is_static {
                        Type::Ctor(key.clone())
                    } else {
                        instance_ty.clone()
                    };
                    let sig = self.check_function(func, None, Some(this_ty), false);
                    if func.ret.is_none() {
                        self.refine_class_prop(&key, name, *is_static, Type::func(sig), true);
                    }
                }
                ClassMember::Constructor { func, span } => {
                    if func.body.is_none() {
                        continue;
                    }
                    self.check_function(func, None, Some(instance_ty.clone()), true);
                    let body = func.body.as_deref().unwrap_or(&[]);
                    if info.base_name.is_some() && !has_super_call(body) {
                        self.error(
                            *span,
                            codes::MISSING_SUPER,
                            "派生クラスのコンストラクタには 'super' の呼び出しが必要です",
                        );
                    }
                }
            }
        }
        self.class_stack.pop();
        for iface in &info.implements {
            if !self.is_assignable(&instance_ty, iface) {
                self.error(
                    class.span,
                    codes::BAD_IMPLEMENTS,
                    format!(
                        "クラス '{}' はインタフェース '{}' を正しく実装していません",
                        class.name, iface
                    ),
                );
            }
        }
        self.pop_type_params(tp_count);
    }

    fn refine_class_prop(&mut self, key: &str, name: &str, is_static: bool, ty: Type, method: bool) {
        if let Some(TypeDecl::Class(info)) = self.types.get_mut(key) {
            let target = if is_static {
                &mut info.statics
            } else {
                &mut info.instance
            };
            if let Some(p) = target.props.iter_mut().find(|p| p.name == name) {
                if method {
                    // オーバーロードを持つメソッドは宣言済みの型を保つ
                    if p.ty.as_function().is_some() {
                        p.ty = ty;
                    }
                } else {
                    p.ty = ty;
                }
            }
        }
    }
}

/// リテラル初期化子の型（クラスプロパティの事前推論用）。
fn literal_type(e: &crate::ast::Expr) -> Type {
    use crate::ast::Expr;
    match e {
        Expr::Number { .. } => Type::Number,
        Expr::String { .. } | Expr::Template { .. } => Type::String,
        Expr::Bool { .. } => Type::Boolean,
        _ => Type::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::always_exits;
    use crate::parser::parse_program;

    #[test]
    /// return / throw の到達解析が分岐を考慮する。
    fn exit_analysis() {
        let exits = |src: &str| always_exits(&parse_program(src).unwrap().stmts);
        assert!(exits("return 1"));
        assert!(exits("if (a) { return 1 } else { throw e }"));
        assert!(!exits("if (a) { return 1 }"));
        assert!(exits("while (true) { x++ }"));
        assert!(!exits("while (true) { break }"));
        assert!(exits("switch (x) { case 1: return 1; default: return 2 }"));
    }
}
