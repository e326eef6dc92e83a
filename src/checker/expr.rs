// パス: src/checker/expr.rs
// 役割: 式の型を求め、演算子・呼び出し・メンバアクセスの誤りを診断する
// 意図: 文脈型（代入先や仮引数の型）を下向きに伝え、無注釈の関数式に型を与える
// 関連ファイル: src/checker/mod.rs, src/checker/relate.rs, src/checker/stmt.rs

use super::*;
use crate::ast::{AssignOp, BinaryOp, Expr, LogicalOp, PropEntry, UnaryOp};
use crate::typesys::{Subst, Visibility};

/// 文脈型が無いと型が決まらない引数（無注釈の仮引数を持つ関数式）。
fn is_context_sensitive(e: &Expr) -> bool {
    match e {
        Expr::Function { func, .. } => func.params.iter().any(|p| p.ty.is_none() && p.default.is_none()),
        _ => false,
    }
}

/// 呼び出し解決の途中結果。
enum Resolution {
    Chosen(Signature, Subst),
    ArgCount { expected: String, got: usize },
    BadArg { index: usize, arg: Type, param: Type },
}

impl Checker {
    pub(crate) fn check_expr(&mut self, e: &Expr, ctx: Option<&Type>) -> Type {
        match e {
            Expr::Number { .. } => Type::Number,
            Expr::String { .. } => Type::String,
            Expr::Template { exprs, .. } => {
                for x in exprs {
                    self.check_expr(x, None);
                }
                Type::String
            }
            Expr::Bool { .. } => Type::Boolean,
            Expr::Null { .. } => Type::Null,
            Expr::Ident { name, span } => self.check_ident(name, *span),
            Expr::This { .. } => self.this_stack.last().cloned().unwrap_or(Type::Any),
            Expr::Super { span } => self.super_instance(*span),
            Expr::Array { items, .. } => self.check_array(items, ctx),
            Expr::Object { props, .. } => self.check_object(props, ctx),
            Expr::Function { func, .. } => {
                let resolved = ctx.map(|t| self.resolve_alias(t));
                let contextual = resolved.as_ref().and_then(|t| self.single_call_signature(t));
                let this_type = if func.is_arrow { None } else { Some(Type::Any) };
                let sig = self.check_function(func, contextual.as_ref(), this_type, false);
                Type::func(sig)
            }
            Expr::Unary { op, expr, .. } => {
                let t = self.check_expr(expr, None);
                match op {
                    UnaryOp::Not | UnaryOp::Delete => Type::Boolean,
                    UnaryOp::TypeOf => Type::String,
                    UnaryOp::Void => Type::Undefined,
                    UnaryOp::Plus => Type::Number,
                    UnaryOp::Neg | UnaryOp::BitNot => {
                        if !t.is_numeric_like() {
                            self.error(
                                expr.span(),
                                codes::ARITH_OPERAND,
                                "算術演算の被演算子は 'any' / 'number' 型である必要があります",
                            );
                        }
                        Type::Number
                    }
                }
            }
            Expr::Update { target, .. } => {
                let t = self.check_assign_target(target);
                if !t.is_numeric_like() {
                    self.error(
                        target.span(),
                        codes::ARITH_OPERAND,
                        "算術演算の被演算子は 'any' / 'number' 型である必要があります",
                    );
                }
                Type::Number
            }
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let l = self.check_expr(left, None);
                let r = self.check_expr(right, None);
                self.check_binary(*op, &l, &r, left, right, *span)
            }
            Expr::Logical { op, left, right, .. } => {
                let l = self.check_expr(left, ctx);
                let r = self.check_expr(right, ctx.or(Some(&l)));
                match op {
                    LogicalOp::And => r,
                    LogicalOp::Or => union_of(vec![l, r]),
                }
            }
            Expr::Assign {
                op,
                target,
                value,
                span,
            } => self.check_assign(*op, target, value, *span),
            Expr::Conditional { test, cons, alt, .. } => {
                self.check_expr(test, None);
                let a = self.check_expr(cons, ctx);
                let b = self.check_expr(alt, ctx);
                if self.is_assignable(&a, &b) {
                    b
                } else if self.is_assignable(&b, &a) {
                    a
                } else {
                    union_of(vec![a, b])
                }
            }
            Expr::Call { callee, args, span } => self.check_call(callee, args, *span),
            Expr::New { callee, args, span } => self.check_new(callee, args, *span),
            Expr::Member {
                object,
                property,
                span,
            } => {
                let obj = self.check_expr(object, None);
                self.property_type(&obj, property, *span)
            }
            Expr::Index { object, index, .. } => {
                let obj = self.check_expr(object, None);
                let idx = self.check_expr(index, None);
                self.index_type(&obj, &idx, index)
            }
            Expr::As { expr, ty, span } => {
                let target = self.resolve_type(ty);
                let src = self.check_expr(expr, Some(&target));
                if !self.is_assignable(&src, &target) && !self.is_assignable(&target, &src) {
                    self.error(
                        *span,
                        codes::BAD_CONVERSION,
                        format!(
                            "型 '{}' から型 '{}' への変換は誤りの可能性があります",
                            src, target
                        ),
                    );
                }
                target
            }
        }
    }

    fn check_ident(&mut self, name: &str, span: Span) -> Type {
        if let Some(sym) = self.lookup(name) {
            return sym.ty.clone();
        }
        if name == "undefined" {
            return Type::Undefined;
        }
        self.error(
            span,
            codes::CANNOT_FIND_NAME,
            format!("名前 '{}' が見つかりません", name),
        );
        Type::Any
    }

    fn current_class(&self) -> Option<ClassInfo> {
        let key = self.class_stack.last()?;
        match self.types.get(key) {
            Some(TypeDecl::Class(info)) => Some(info.clone()),
            _ => None,
        }
    }

    fn super_instance(&mut self, span: Span) -> Type {
        let Some(info) = self.current_class() else {
            self.error(span, codes::SUPER_OUTSIDE, "'super' は派生クラスの中でのみ参照できます");
            return Type::Any;
        };
        match self.class_base_instance(&info) {
            Some(t) => t,
            None => {
                self.error(span, codes::SUPER_OUTSIDE, "'super' は派生クラスの中でのみ参照できます");
                Type::Any
            }
        }
    }

    fn single_call_signature(&self, ty: &Type) -> Option<Signature> {
        match ty {
            Type::Object(obj) if obj.calls.len() == 1 => obj.calls.first().cloned(),
            Type::Ref { .. } => {
                let obj = self.apparent(ty)?;
                (obj.calls.len() == 1).then(|| obj.calls[0].clone())
            }
            Type::Union(items) => items.iter().find_map(|t| self.single_call_signature(t)),
            _ => None,
        }
    }

    fn check_array(&mut self, items: &[Expr], ctx: Option<&Type>) -> Type {
        let elem_ctx = ctx.map(|t| self.resolve_alias(t)).and_then(|t| match t {
            Type::Array(inner) => Some(*inner),
            _ => None,
        });
        let types: Vec<Type> = items
            .iter()
            .map(|it| self.check_expr(it, elem_ctx.as_ref()))
            .collect();
        if types.is_empty() {
            return Type::Array(Box::new(elem_ctx.unwrap_or(Type::Any)));
        }
        let mut best: Vec<Type> = Vec::new();
        for t in types {
            let t = t.widen();
            if best.iter().any(|b| self.is_assignable(&t, b)) {
                continue;
            }
            best.retain(|b| !self.is_assignable(b, &t));
            best.push(t);
        }
        Type::Array(Box::new(union_of(best)))
    }

    fn check_object(&mut self, props: &[PropEntry], ctx: Option<&Type>) -> Type {
        let ctx_obj = ctx.and_then(|t| self.apparent(&self.resolve_alias(t)));
        let mut obj = ObjectType::default();
        for p in props {
            match p {
                PropEntry::Property { key, value, .. } => {
                    let member_ctx = ctx_obj.as_ref().and_then(|o| o.prop(key)).map(|p| p.ty.clone());
                    let t = self.check_expr(value, member_ctx.as_ref()).widen();
                    let mut prop = Prop::new(key.clone(), t);
                    prop.is_method = matches!(value, Expr::Function { func, .. } if !func.is_arrow);
                    obj.upsert(prop);
                }
                PropEntry::Spread { expr, .. } => {
                    let t = self.check_expr(expr, None);
                    if let Some(spread) = self.apparent(&t) {
                        for sp in spread.props {
                            if sp.is_method && spread_skips_method(&t) {
                                continue;
                            }
                            obj.upsert(sp);
                        }
                    }
                }
            }
        }
        Type::object(obj)
    }

    fn check_binary(&mut self, op: BinaryOp, l: &Type, r: &Type, left: &Expr, right: &Expr, span: Span) -> Type {
        let l = self.resolve_alias(l);
        let r = self.resolve_alias(r);
        match op {
            BinaryOp::Add => {
                if l.is_string_like() || r.is_string_like() {
                    return Type::String;
                }
                if l.is_any() || r.is_any() {
                    return Type::Any;
                }
                if l.is_numeric_like() && r.is_numeric_like() {
                    return Type::Number;
                }
                self.error(
                    span,
                    codes::BAD_OPERATOR,
                    format!(
                        "演算子 '+' を型 '{}' と型 '{}' に適用することはできません",
                        l, r
                    ),
                );
                Type::Any
            }
            BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Pow
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::UShr => {
                for (t, e) in [(&l, left), (&r, right)] {
                    if !t.is_numeric_like() {
                        self.error(
                            e.span(),
                            codes::ARITH_OPERAND,
                            format!(
                                "算術演算の{}被演算子は 'any' / 'number' 型である必要があります",
                                if std::ptr::eq(e, left) { "左" } else { "右" }
                            ),
                        );
                    }
                }
                Type::Number
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let ok = l.is_any()
                    || r.is_any()
                    || (l.is_numeric_like() && r.is_numeric_like())
                    || (l.is_string_like() && r.is_string_like());
                if !ok {
                    self.error(
                        span,
                        codes::BAD_OPERATOR,
                        format!(
                            "演算子 '{}' を型 '{}' と型 '{}' に適用することはできません",
                            op.as_str(),
                            l,
                            r
                        ),
                    );
                }
                Type::Boolean
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::StrictEq
            | BinaryOp::StrictNe
            | BinaryOp::In
            | BinaryOp::InstanceOf => Type::Boolean,
        }
    }

    /// 代入先の式を検査し、その型を返す。`const` や `readonly` への代入を診断する。
    fn check_assign_target(&mut self, target: &Expr) -> Type {
        match target {
            Expr::Ident { name, span } => match self.lookup(name).cloned() {
                Some(sym) => {
                    match sym.kind {
                        SymbolKind::Var(VarKind::Const) => self.error(
                            *span,
                            codes::ASSIGN_CONST,
                            format!("'{}' は定数のため代入できません", name),
                        ),
                        SymbolKind::Class | SymbolKind::Import => self.error(
                            *span,
                            codes::ASSIGN_CONST,
                            format!("'{}' は変数ではないため代入できません", name),
                        ),
                        _ => {}
                    }
                    sym.ty
                }
                None => self.check_ident(name, *span),
            },
            Expr::Member {
                object,
                property,
                span,
            } => {
                let obj = self.check_expr(object, None);
                if let MemberLookup::Found(p) = self.member(&obj, property) {
                    let in_ctor = self.fn_stack.last().is_some_and(|f| f.is_ctor);
                    if p.readonly && !in_ctor {
                        self.error(
                            *span,
                            codes::ASSIGN_READONLY,
                            format!("'{}' は読み取り専用プロパティのため代入できません", property),
                        );
                    }
                }
                self.property_type(&obj, property, *span)
            }
            other => self.check_expr(other, None),
        }
    }

    fn check_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, span: Span) -> Type {
        let target_ty = self.check_assign_target(target);
        match op.0 {
            None => {
                let ctx = (!target_ty.is_any()).then_some(&target_ty);
                let v = self.check_expr(value, ctx);
                self.check_assignment(&v, &target_ty, value, span);
                v
            }
            Some(bin) => {
                let v = self.check_expr(value, None);
                let result = self.check_binary(bin, &target_ty, &v, target, value, span);
                if !self.is_assignable(&result, &target_ty) {
                    self.error(
                        span,
                        codes::NOT_ASSIGNABLE,
                        format!(
                            "型 '{}' を型 '{}' に割り当てることはできません",
                            result, target_ty
                        ),
                    );
                }
                result
            }
        }
    }

    // ---- メンバアクセス ----

    pub(crate) fn property_type(&mut self, obj: &Type, name: &str, span: Span) -> Type {
        match self.member(obj, name) {
            MemberLookup::Found(p) => {
                self.check_visibility(&p, span);
                p.ty
            }
            MemberLookup::AnyType => Type::Any,
            MemberLookup::Missing => {
                self.error(
                    span,
                    codes::NO_PROPERTY,
                    format!("プロパティ '{}' は型 '{}' に存在しません", name, obj),
                );
                Type::Any
            }
        }
    }

    fn check_visibility(&mut self, p: &Prop, span: Span) {
        let Some(owner) = &p.owner else {
            return;
        };
        let current = self
            .class_stack
            .last()
            .map(|k| k.rsplit('.').next().unwrap_or(k).to_string());
        match p.visibility {
            Visibility::Public => {}
            Visibility::Private => {
                if current.as_deref() != Some(owner.as_str()) {
                    self.error(
                        span,
                        codes::PRIVATE_ACCESS,
                        format!(
                            "プロパティ '{}' はプライベートで、クラス '{}' 内でのみアクセスできます",
                            p.name, owner
                        ),
                    );
                }
            }
            Visibility::Protected => {
                let allowed = current
                    .as_deref()
                    .is_some_and(|c| self.derives_from(c, owner));
                if !allowed {
                    self.error(
                        span,
                        codes::PROTECTED_ACCESS,
                        format!(
                            "プロパティ '{}' は保護されており、クラス '{}' とそのサブクラス内でのみアクセスできます",
                            p.name, owner
                        ),
                    );
                }
            }
        }
    }

    fn derives_from(&self, class: &str, ancestor: &str) -> bool {
        let mut current = class.to_string();
        for _ in 0..32 {
            if current == ancestor {
                return true;
            }
            match self.types.get(&current) {
                Some(TypeDecl::Class(ClassInfo {
                    base_name: Some(base),
                    ..
                })) => current = base.clone(),
                _ => return false,
            }
        }
        false
    }

    fn index_type(&mut self, obj: &Type, idx: &Type, index: &Expr) -> Type {
        if let Expr::String { value, .. } = index {
            if !matches!(self.resolve_alias(obj), Type::Array(_)) {
                return match self.member(obj, value) {
                    MemberLookup::Found(p) => p.ty,
                    _ => Type::Any,
                };
            }
        }
        match self.resolve_alias(obj) {
            Type::Array(elem) if idx.is_numeric_like() => *elem,
            Type::String if idx.is_numeric_like() => Type::String,
            other => match self.apparent(&other).and_then(|o| o.index) {
                Some(t) => t,
                None => Type::Any,
            },
        }
    }

    // ---- 呼び出し ----

    fn check_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Type {
        if let Expr::Super { span: super_span } = callee {
            self.check_super_call(args, *super_span, span);
            return Type::Void;
        }
        let callee_ty = self.check_expr(callee, None);
        let resolved = self.resolve_alias(&callee_ty);
        match self.call_signatures(&resolved) {
            None => {
                for a in args {
                    self.check_expr(a, None);
                }
                Type::Any
            }
            Some(sigs) if sigs.is_empty() => {
                for a in args {
                    self.check_expr(a, None);
                }
                self.error(
                    span,
                    codes::NOT_CALLABLE,
                    format!(
                        "この式は呼び出し可能ではありません。型 '{}' には呼び出しシグネチャがありません",
                        callee_ty
                    ),
                );
                Type::Any
            }
            Some(sigs) => self.resolve_call(&sigs, args, span),
        }
    }

    fn check_super_call(&mut self, args: &[Expr], super_span: Span, span: Span) {
        let Some(info) = self.current_class() else {
            self.error(super_span, codes::SUPER_OUTSIDE, "'super' は派生クラスの中でのみ参照できます");
            return;
        };
        if info.base_name.is_none() {
            self.error(super_span, codes::SUPER_OUTSIDE, "'super' は派生クラスの中でのみ参照できます");
            return;
        }
        let params = self.class_base_ctor_params(&info);
        let sig = Signature::simple(params, Type::Void);
        self.resolve_call(&[sig], args, span);
    }

    fn class_base_ctor_params(&self, info: &ClassInfo) -> Vec<ParamType> {
        let Some(base) = &info.base_name else {
            return Vec::new();
        };
        match self.types.get(base) {
            Some(TypeDecl::Class(b)) => {
                let subst = super::relate::bind_params(&b.type_params, &info.base_args);
                self.class_ctor_params(b)
                    .into_iter()
                    .map(|p| ParamType {
                        ty: p.ty.substitute(&subst),
                        ..p
                    })
                    .collect()
            }
            _ => self
                .lookup(base)
                .and_then(|s| self.construct_signatures(&s.ty))
                .and_then(|sigs| sigs.into_iter().next())
                .map(|sig| sig.params)
                .unwrap_or_default(),
        }
    }

    fn check_new(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Type {
        let callee_ty = self.check_expr(callee, None);
        let resolved = self.resolve_alias(&callee_ty);
        match self.construct_signatures(&resolved) {
            None => {
                for a in args {
                    self.check_expr(a, None);
                }
                Type::Any
            }
            Some(sigs) if sigs.is_empty() => {
                for a in args {
                    self.check_expr(a, None);
                }
                self.error(
                    span,
                    codes::NOT_NEWABLE,
                    format!(
                        "この式は構築できません。型 '{}' には構築シグネチャがありません",
                        callee_ty
                    ),
                );
                Type::Any
            }
            Some(sigs) => self.resolve_call(&sigs, args, span),
        }
    }

    /// オーバーロードを先頭から試し、最初に適合したシグネチャの戻り値型を返す。
    fn resolve_call(&mut self, sigs: &[Signature], args: &[Expr], span: Span) -> Type {
        let single = if sigs.len() == 1 { sigs.first() } else { None };
        let mut arg_types: Vec<Option<Type>> = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            if is_context_sensitive(a) {
                arg_types.push(None);
                continue;
            }
            let ctx = single
                .and_then(|s| s.param_type_at(i))
                .filter(|t| !t.mentions_param());
            arg_types.push(Some(self.check_expr(a, ctx.as_ref())));
        }

        let mut failures = Vec::new();
        let mut chosen = None;
        for sig in sigs {
            match self.try_signature(sig, &arg_types) {
                Resolution::Chosen(sig, subst) => {
                    chosen = Some((sig, subst));
                    break;
                }
                other => failures.push(other),
            }
        }
        let Some((sig, mut subst)) = chosen else {
            for (a, t) in args.iter().zip(&arg_types) {
                if t.is_none() {
                    self.check_expr(a, None);
                }
            }
            self.report_call_failure(sigs.len(), failures, args, span);
            return Type::Any;
        };

        for (i, a) in args.iter().enumerate() {
            if arg_types[i].is_some() {
                continue;
            }
            let param = sig.param_type_at(i).unwrap_or(Type::Any);
            let expected = param.substitute(&subst);
            let t = self.check_expr(a, Some(&expected));
            self.infer_from(&param, &t, &sig.type_params, &mut subst);
            let expected = param.substitute(&subst);
            if !expected.mentions_param() && !self.is_assignable(&t, &expected) {
                self.error(
                    a.span(),
                    codes::BAD_ARGUMENT,
                    format!(
                        "型 '{}' の引数を型 '{}' のパラメータに割り当てることはできません",
                        t, expected
                    ),
                );
            }
        }
        for tp in &sig.type_params {
            subst
                .entry(tp.name.clone())
                .or_insert_with(|| tp.constraint.clone().unwrap_or(Type::Any));
        }
        sig.ret.substitute(&subst)
    }

    fn try_signature(&self, sig: &Signature, arg_types: &[Option<Type>]) -> Resolution {
        let got = arg_types.len();
        let min = sig.min_args();
        let too_many = sig.max_args().is_some_and(|max| got > max);
        if got < min || too_many {
            let expected = match sig.max_args() {
                Some(max) if max != min => format!("{}-{}", min, max),
                Some(max) => max.to_string(),
                None => format!("{} 個以上", min),
            };
            return Resolution::ArgCount { expected, got };
        }
        let mut subst = Subst::new();
        if !sig.type_params.is_empty() {
            for (i, t) in arg_types.iter().enumerate() {
                if let (Some(t), Some(p)) = (t, sig.param_type_at(i)) {
                    self.infer_from(&p, t, &sig.type_params, &mut subst);
                }
            }
        }
        for (i, t) in arg_types.iter().enumerate() {
            let (Some(t), Some(p)) = (t, sig.param_type_at(i)) else {
                continue;
            };
            let expected = p.substitute(&subst);
            if expected.mentions_param() {
                continue;
            }
            if !self.is_assignable(t, &expected) {
                return Resolution::BadArg {
                    index: i,
                    arg: t.clone(),
                    param: expected,
                };
            }
        }
        Resolution::Chosen(sig.clone(), subst)
    }

    fn report_call_failure(&mut self, candidates: usize, failures: Vec<Resolution>, args: &[Expr], span: Span) {
        if candidates > 1 {
            self.error(span, codes::NO_OVERLOAD, "この呼び出しに一致するオーバーロードがありません");
            return;
        }
        match failures.into_iter().next() {
            Some(Resolution::ArgCount { expected, got }) => self.error(
                span,
                codes::ARG_COUNT,
                format!("{} 個の引数が必要ですが、{} 個指定されました", expected, got),
            ),
            Some(Resolution::BadArg { index, arg, param }) => {
                let at = args.get(index).map(Expr::span).unwrap_or(span);
                self.error(
                    at,
                    codes::BAD_ARGUMENT,
                    format!(
                        "型 '{}' の引数を型 '{}' のパラメータに割り当てることはできません",
                        arg, param
                    ),
                );
            }
            _ => {}
        }
    }
}

/// クラスインスタンスを展開するときは、プロトタイプのメソッドを除外する。
fn spread_skips_method(t: &Type) -> bool {
    matches!(t, Type::Ref { .. })
}

#[cfg(test)]
mod tests {
    use super::is_context_sensitive;
    use crate::parser::parse_expr;

    #[test]
    /// 無注釈の仮引数を持つ関数式だけが後回しの対象になる。
    fn context_sensitivity() {
        assert!(is_context_sensitive(&parse_expr("x => x + 1").unwrap()));
        assert!(!is_context_sensitive(&parse_expr("(x: number) => x").unwrap()));
        assert!(!is_context_sensitive(&parse_expr("() => 1").unwrap()));
        assert!(!is_context_sensitive(&parse_expr("f(1)").unwrap()));
    }
}
