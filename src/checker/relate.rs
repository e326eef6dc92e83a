// パス: src/checker/relate.rs
// 役割: 名前付き型の展開・見かけの型・メンバ探索・代入可能性・型引数推論
// 意図: 構造的部分型の判定を一箇所に集め、式・文の検査から共有する
// 関連ファイル: src/checker/mod.rs, src/checker/expr.rs, src/typesys.rs

use super::*;
use crate::typesys::Subst;

/// 展開の入れ子上限（再帰型の安全弁）。
const MAX_EXPAND_DEPTH: usize = 16;

#[derive(Clone, Debug)]
pub enum MemberLookup {
    Found(Prop),
    /// 受け手が `any` か、メンバの有無を問えない型。
    AnyType,
    Missing,
}

impl Checker {
    /// `Ref{name, args}` をメンバの集合へ展開する。
    pub(crate) fn expand_ref(&self, name: &str, args: &[Type], depth: usize) -> Option<ObjectType> {
        if depth > MAX_EXPAND_DEPTH {
            return None;
        }
        let decl = self.types.get(name)?;
        let subst = bind_params(decl.type_params(), args);
        match decl {
            TypeDecl::Interface(info) => {
                let mut obj = info.members.substitute(&subst);
                for ext in &info.extends {
                    if let Some(base) = self.apparent_at(&ext.substitute(&subst), depth + 1) {
                        obj.inherit(&base);
                    }
                }
                Some(obj)
            }
            TypeDecl::Class(info) => {
                let mut obj = info.instance.substitute(&subst);
                if let Some(base) = self.class_base_instance(info) {
                    if let Some(base_obj) = self.apparent_at(&base.substitute(&subst), depth + 1) {
                        obj.inherit(&base_obj);
                    }
                }
                Some(obj)
            }
            TypeDecl::Alias(info) => self.apparent_at(&info.ty.substitute(&subst), depth + 1),
        }
    }

    /// クラスの基底インスタンス型。基底がクラス宣言でなければコンストラクタ値から求める。
    pub(crate) fn class_base_instance(&self, info: &ClassInfo) -> Option<Type> {
        let base = info.base_name.as_ref()?;
        if let Some(TypeDecl::Class(_)) = self.types.get(base) {
            return Some(Type::Ref {
                name: base.clone(),
                args: info.base_args.clone(),
            });
        }
        let sym = self.global_scope().vars.get(base)?;
        let ctors = self.construct_signatures(&sym.ty)?;
        ctors.first().map(|sig| sig.ret.clone())
    }

    /// コンストラクタ引数。宣言が無ければ基底から引き継ぐ。
    pub(crate) fn class_ctor_params(&self, info: &ClassInfo) -> Vec<ParamType> {
        let mut current = info;
        for _ in 0..MAX_EXPAND_DEPTH {
            if let Some(params) = &current.ctor_params {
                return params.clone();
            }
            let Some(base) = &current.base_name else {
                return Vec::new();
            };
            match self.types.get(base) {
                Some(TypeDecl::Class(next)) => current = next,
                _ => {
                    let ctor = self
                        .global_scope()
                        .vars
                        .get(base)
                        .and_then(|sym| self.construct_signatures(&sym.ty))
                        .and_then(|sigs| sigs.into_iter().next());
                    return ctor.map(|sig| sig.params).unwrap_or_default();
                }
            }
        }
        Vec::new()
    }

    /// `typeof C` の見かけの型（構築シグネチャ・静的メンバ・prototype）。
    pub(crate) fn class_ctor_object(&self, name: &str, depth: usize) -> Option<ObjectType> {
        let Some(TypeDecl::Class(info)) = self.types.get(name) else {
            return None;
        };
        let mut obj = info.statics.clone();
        let instance = Type::Ref {
            name: name.to_string(),
            args: info
                .type_params
                .iter()
                .map(|tp| Type::Param(tp.name.clone()))
                .collect(),
        };
        obj.constructs = vec![Signature {
            type_params: info.type_params.clone(),
            params: self.class_ctor_params(info),
            ret: instance.clone(),
        }];
        obj.upsert(Prop::new("prototype", instance));
        if let Some(base) = &info.base_name {
            if matches!(self.types.get(base), Some(TypeDecl::Class(_))) && depth < MAX_EXPAND_DEPTH {
                if let Some(base_obj) = self.class_ctor_object(base, depth + 1) {
                    let mut statics = base_obj;
                    statics.constructs.clear();
                    obj.inherit(&statics);
                }
            }
        }
        Some(obj)
    }

    pub(crate) fn apparent(&self, ty: &Type) -> Option<ObjectType> {
        self.apparent_at(ty, 0)
    }

    /// 型の「見かけのメンバ」。プリミティブは対応するラッパーインタフェースを使う。
    fn apparent_at(&self, ty: &Type, depth: usize) -> Option<ObjectType> {
        if depth > MAX_EXPAND_DEPTH {
            return None;
        }
        let mut obj = match ty {
            Type::Any | Type::Never | Type::Void | Type::Undefined | Type::Null => return None,
            Type::Number => self.expand_ref("Number", &[], depth + 1)?,
            Type::String => self.expand_ref("String", &[], depth + 1)?,
            Type::Boolean => self.expand_ref("Boolean", &[], depth + 1)?,
            Type::Array(elem) => self.expand_ref("Array", &[(**elem).clone()], depth + 1)?,
            Type::Object(o) => (**o).clone(),
            Type::Ref { name, args } => self.expand_ref(name, args, depth + 1)?,
            Type::Ctor(name) => self.class_ctor_object(name, depth + 1)?,
            Type::Module(name) => return self.modules.get(name).map(|m| m.exports.clone()),
            Type::Param(name) => match self.type_param_constraint(name) {
                Some(c) => return self.apparent_at(&c, depth + 1),
                None => ObjectType::default(),
            },
            Type::Union(items) => return self.union_apparent(items, depth),
        };
        if !obj.calls.is_empty() || !obj.constructs.is_empty() {
            if let Some(func) = self.expand_ref("Function", &[], depth + 1) {
                let mut members = func;
                members.calls.clear();
                members.constructs.clear();
                obj.inherit(&members);
            }
        }
        if let Some(base) = self.expand_ref("Object", &[], depth + 1) {
            obj.inherit(&ObjectType {
                props: base.props,
                ..ObjectType::default()
            });
        }
        Some(obj)
    }

    /// 共用体のメンバは全構成要素に共通するものだけ。
    fn union_apparent(&self, items: &[Type], depth: usize) -> Option<ObjectType> {
        let mut parts = Vec::new();
        for it in items {
            parts.push(self.apparent_at(it, depth + 1)?);
        }
        let (first, rest) = parts.split_first()?;
        let mut obj = ObjectType::default();
        for p in &first.props {
            let mut types = vec![p.ty.clone()];
            let mut everywhere = true;
            for other in rest {
                match other.prop(&p.name) {
                    Some(q) => types.push(q.ty.clone()),
                    None => {
                        everywhere = false;
                        break;
                    }
                }
            }
            if everywhere {
                let mut merged = p.clone();
                merged.ty = union_of(types);
                obj.props.push(merged);
            }
        }
        Some(obj)
    }

    pub(crate) fn member(&self, ty: &Type, name: &str) -> MemberLookup {
        match ty {
            Type::Any | Type::Never | Type::Null | Type::Undefined => return MemberLookup::AnyType,
            Type::Ref { name: n, .. } if n == "Function" && name != "prototype" => {
                if let Some(obj) = self.apparent(ty) {
                    if let Some(p) = obj.prop(name) {
                        return MemberLookup::Found(p.clone());
                    }
                }
                return MemberLookup::AnyType;
            }
            _ => {}
        }
        let Some(obj) = self.apparent(ty) else {
            return MemberLookup::Missing;
        };
        if let Some(p) = obj.prop(name) {
            return MemberLookup::Found(p.clone());
        }
        match &obj.index {
            Some(idx) if obj.index_applies_to(name) => {
                MemberLookup::Found(Prop::new(name, idx.clone()))
            }
            _ => MemberLookup::Missing,
        }
    }

    /// 呼び出しシグネチャ。`None` は型検査なしで呼び出せる（`any` や `Function`）。
    pub(crate) fn call_signatures(&self, ty: &Type) -> Option<Vec<Signature>> {
        match ty {
            Type::Any | Type::Never => return None,
            Type::Ref { name, .. } if name == "Function" => return None,
            _ => {}
        }
        Some(self.apparent(ty).map(|o| o.calls).unwrap_or_default())
    }

    pub(crate) fn construct_signatures(&self, ty: &Type) -> Option<Vec<Signature>> {
        match ty {
            Type::Any | Type::Never => return None,
            Type::Ref { name, .. } if name == "Function" => return None,
            _ => {}
        }
        Some(self.apparent(ty).map(|o| o.constructs).unwrap_or_default())
    }

    /// 型別名を展開する。
    pub(crate) fn resolve_alias(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        for _ in 0..MAX_EXPAND_DEPTH {
            let Type::Ref { name, args } = &current else {
                return current;
            };
            let Some(TypeDecl::Alias(info)) = self.types.get(name) else {
                return current;
            };
            current = info.ty.substitute(&bind_params(&info.type_params, args));
        }
        current
    }

    pub(crate) fn is_assignable(&self, src: &Type, tgt: &Type) -> bool {
        let mut seen = Vec::new();
        self.assignable_rec(src, tgt, &mut seen, 0)
    }

    fn assignable_rec(
        &self,
        src: &Type,
        tgt: &Type,
        seen: &mut Vec<(String, String)>,
        depth: usize,
    ) -> bool {
        if src == tgt || depth > MAX_EXPAND_DEPTH {
            return true;
        }
        match (src, tgt) {
            (Type::Any, _) | (_, Type::Any) | (Type::Never, _) => return true,
            (Type::Null | Type::Undefined, _) => return true,
            (_, Type::Void) => return false,
            _ => {}
        }
        let src = self.resolve_alias(src);
        let tgt = self.resolve_alias(tgt);
        if src == tgt {
            return true;
        }
        if let Type::Union(items) = &src {
            return items
                .iter()
                .all(|s| self.assignable_rec(s, &tgt, seen, depth + 1));
        }
        if let Type::Union(items) = &tgt {
            return items
                .iter()
                .any(|t| self.assignable_rec(&src, t, seen, depth + 1));
        }
        match (&src, &tgt) {
            (Type::Param(a), Type::Param(b)) => return a == b,
            (Type::Param(a), _) => {
                return match self.type_param_constraint(a) {
                    Some(c) => self.assignable_rec(&c, &tgt, seen, depth + 1),
                    None => self.is_empty_object_target(&tgt),
                }
            }
            (_, Type::Param(_)) => return false,
            (_, Type::Number | Type::String | Type::Boolean | Type::Undefined | Type::Null | Type::Never) => {
                return false
            }
            (Type::Void, _) => return false,
            (Type::Array(s), Type::Array(t)) => return self.assignable_rec(s, t, seen, depth + 1),
            (_, Type::Array(_)) => return false,
            (Type::Ref { name: a, args: sa }, Type::Ref { name: b, args: ta }) if a == b => {
                return sa.len() != ta.len()
                    || sa
                        .iter()
                        .zip(ta)
                        .all(|(s, t)| self.assignable_rec(s, t, seen, depth + 1));
            }
            _ => {}
        }
        let key = (src.to_string(), tgt.to_string());
        if seen.contains(&key) {
            return true;
        }
        seen.push(key);
        let result = self.structural(&src, &tgt, seen, depth);
        seen.pop();
        result
    }

    fn is_empty_object_target(&self, tgt: &Type) -> bool {
        match tgt {
            Type::Ref { name, .. } if name == "Object" => true,
            Type::Object(o) => o.props.is_empty() && o.calls.is_empty() && o.constructs.is_empty(),
            _ => false,
        }
    }

    fn structural(
        &self,
        src: &Type,
        tgt: &Type,
        seen: &mut Vec<(String, String)>,
        depth: usize,
    ) -> bool {
        let Some(t) = self.apparent(tgt) else {
            return true;
        };
        let Some(s) = self.apparent(src) else {
            return false;
        };
        for tp in &t.props {
            match s.prop(&tp.name) {
                Some(sp) => {
                    if !self.assignable_rec(&sp.ty, &tp.ty, seen, depth + 1) {
                        return false;
                    }
                }
                None if tp.optional => {}
                None => match &s.index {
                    Some(idx)
                        if s.index_applies_to(&tp.name)
                            && self.assignable_rec(idx, &tp.ty, seen, depth + 1) => {}
                    _ => return false,
                },
            }
        }
        for tc in &t.calls {
            if !s
                .calls
                .iter()
                .any(|sc| self.signature_assignable(sc, tc, seen, depth))
            {
                return false;
            }
        }
        for tc in &t.constructs {
            if !s
                .constructs
                .iter()
                .any(|sc| self.signature_assignable(sc, tc, seen, depth))
            {
                return false;
            }
        }
        if let Some(ti) = &t.index {
            if !matches!(src, Type::Array(_)) {
                for sp in &s.props {
                    if sp.is_method || t.prop(&sp.name).is_some() {
                        continue;
                    }
                    if matches!(src, Type::Object(_))
                        && !self.assignable_rec(&sp.ty, ti, seen, depth + 1)
                    {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// 引数は双変、戻り値は共変。`void` を返す型へは何でも代入できる。
    fn signature_assignable(
        &self,
        src: &Signature,
        tgt: &Signature,
        seen: &mut Vec<(String, String)>,
        depth: usize,
    ) -> bool {
        let src = erase_type_params(src);
        let tgt = erase_type_params(tgt);
        if tgt.max_args().is_some() && src.min_args() > tgt.params.len() {
            return false;
        }
        let shared = src.params.len().min(tgt.params.len());
        for i in 0..shared {
            let (Some(sp), Some(tp)) = (src.param_type_at(i), tgt.param_type_at(i)) else {
                continue;
            };
            if !self.assignable_rec(&tp, &sp, seen, depth + 1)
                && !self.assignable_rec(&sp, &tp, seen, depth + 1)
            {
                return false;
            }
        }
        matches!(tgt.ret, Type::Void) || self.assignable_rec(&src.ret, &tgt.ret, seen, depth + 1)
    }

    /// 仮引数型と実引数型を突き合わせて型パラメータを推論する。
    pub(crate) fn infer_from(&self, param: &Type, arg: &Type, names: &[TypeParamDef], out: &mut Subst) {
        self.infer_rec(param, arg, names, out, 0);
    }

    fn infer_rec(&self, param: &Type, arg: &Type, names: &[TypeParamDef], out: &mut Subst, depth: usize) {
        if depth > MAX_EXPAND_DEPTH || matches!(arg, Type::Any) && !matches!(param, Type::Param(_)) {
            return;
        }
        match (param, arg) {
            (Type::Param(n), _) if names.iter().any(|tp| &tp.name == n) => {
                let candidate = arg.clone().widen();
                match out.get(n) {
                    None => {
                        out.insert(n.clone(), candidate);
                    }
                    Some(existing) => {
                        let replace = matches!(existing, Type::Any | Type::Never)
                            || (!self.is_assignable(&candidate, existing)
                                && self.is_assignable(existing, &candidate));
                        if replace {
                            out.insert(n.clone(), candidate);
                        }
                    }
                }
            }
            (Type::Array(p), Type::Array(a)) => self.infer_rec(p, a, names, out, depth + 1),
            (Type::Ref { name: pn, args: pa }, Type::Ref { name: an, args: aa }) if pn == an => {
                for (p, a) in pa.iter().zip(aa) {
                    self.infer_rec(p, a, names, out, depth + 1);
                }
            }
            (Type::Union(items), _) => {
                for p in items.iter().filter(|p| p.mentions_param()) {
                    self.infer_rec(p, arg, names, out, depth + 1);
                }
            }
            (Type::Object(p), _) => {
                let Some(a) = self.apparent(arg) else {
                    return;
                };
                if let (Some(pc), Some(ac)) = (p.calls.first(), a.calls.first()) {
                    for (pp, ap) in pc.params.iter().zip(&ac.params) {
                        self.infer_rec(&pp.ty, &ap.ty, names, out, depth + 1);
                    }
                    self.infer_rec(&pc.ret, &ac.ret, names, out, depth + 1);
                }
                for pp in &p.props {
                    if let Some(ap) = a.prop(&pp.name) {
                        self.infer_rec(&pp.ty, &ap.ty, names, out, depth + 1);
                    }
                }
            }
            _ => {}
        }
    }
}

/// 型パラメータと型引数を対応付ける。不足分は制約か `any`。
pub(crate) fn bind_params(params: &[TypeParamDef], args: &[Type]) -> Subst {
    params
        .iter()
        .enumerate()
        .map(|(i, tp)| {
            let ty = args
                .get(i)
                .cloned()
                .or_else(|| tp.constraint.clone())
                .unwrap_or(Type::Any);
            (tp.name.clone(), ty)
        })
        .collect()
}

/// 比較のためにシグネチャ自身の型パラメータを `any` に置き換える。
fn erase_type_params(sig: &Signature) -> Signature {
    if sig.type_params.is_empty() {
        return sig.clone();
    }
    let s: Subst = sig
        .type_params
        .iter()
        .map(|tp| (tp.name.clone(), Type::Any))
        .collect();
    let stripped = Signature {
        type_params: Vec::new(),
        ..sig.clone()
    };
    stripped.substitute(&s)
}
