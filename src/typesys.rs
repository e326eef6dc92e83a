// パス: src/typesys.rs
// 役割: 構造的型の表現・置換・共用体の正規化・表示を提供する
// 意図: 検査器と REPL の型表示で同じ型文字列を得られるようにする
// 関連ファイル: src/checker/mod.rs, src/checker/relate.rs, src/ast.rs
//! 型システム（typesys）
//!
//! 目的:
//! - 型表現（`Type`）と、オブジェクト型・シグネチャの構造を定義する。
//! - 型パラメータの置換（`Subst`）と共用体の正規化（`union_of`）を提供する。
//!
//! 設計ノート:
//! - 関数型は「呼び出しシグネチャを 1 つだけ持つオブジェクト型」として表す。
//! - 名前付きの型（インタフェース・クラスのインスタンス・型別名）は `Ref` で参照し、
//!   展開は検査器側の宣言表を使って遅延的に行う（再帰型を扱うため）。
//! - null 安全検査は行わないため、共用体中の `null` / `undefined` は他の型に吸収される。

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Any,
    Number,
    String,
    Boolean,
    Void,
    Undefined,
    Null,
    Never,
    Array(Box<Type>),
    Object(Rc<ObjectType>),
    /// 名前付き型への参照。`args` は型引数。
    Ref {
        name: String,
        args: Vec<Type>,
    },
    /// クラス `C` のコンストラクタ値の型（`typeof C`）。
    Ctor(String),
    /// `import * as m from "name"` で得られるモジュール値の型。
    Module(String),
    /// 型パラメータ。
    Param(String),
    Union(Vec<Type>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prop {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
    pub readonly: bool,
    pub is_method: bool,
    pub visibility: Visibility,
    /// 宣言したクラス名（可視性検査に使う）。
    pub owner: Option<String>,
}

impl Prop {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            readonly: false,
            is_method: false,
            visibility: Visibility::Public,
            owner: None,
        }
    }

    pub fn method(name: impl Into<String>, sig: Signature) -> Self {
        Self {
            is_method: true,
            ..Self::new(name, Type::func(sig))
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParamDef {
    pub name: String,
    pub constraint: Option<Type>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamType {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub type_params: Vec<TypeParamDef>,
    pub params: Vec<ParamType>,
    pub ret: Type,
}

impl Signature {
    pub fn simple(params: Vec<ParamType>, ret: Type) -> Self {
        Self {
            type_params: Vec::new(),
            params,
            ret,
        }
    }

    /// 省略不可の引数の数。
    pub fn min_args(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| !p.optional && !p.rest)
            .count()
    }

    /// 受け取れる引数の最大数。残余引数があれば `None`。
    pub fn max_args(&self) -> Option<usize> {
        if self.params.iter().any(|p| p.rest) {
            None
        } else {
            Some(self.params.len())
        }
    }

    /// `index` 番目の実引数に対応する仮引数の型。残余引数は要素型を返す。
    pub fn param_type_at(&self, index: usize) -> Option<Type> {
        if let Some(p) = self.params.get(index) {
            if p.rest {
                return Some(p.ty.element_type());
            }
            return Some(p.ty.clone());
        }
        match self.params.last() {
            Some(p) if p.rest => Some(p.ty.element_type()),
            _ => None,
        }
    }

    pub fn substitute(&self, s: &Subst) -> Signature {
        let shadowed: Subst = s
            .iter()
            .filter(|(k, _)| !self.type_params.iter().any(|tp| &tp.name == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Signature {
            type_params: self.type_params.clone(),
            params: self
                .params
                .iter()
                .map(|p| ParamType {
                    ty: p.ty.substitute(&shadowed),
                    ..p.clone()
                })
                .collect(),
            ret: self.ret.substitute(&shadowed),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectType {
    pub props: Vec<Prop>,
    pub calls: Vec<Signature>,
    pub constructs: Vec<Signature>,
    pub index: Option<Type>,
    /// 添字シグネチャのキーが `number`。数値の名前にだけ当てはまる。
    pub index_numeric: bool,
}

impl ObjectType {
    pub fn prop(&self, name: &str) -> Option<&Prop> {
        self.props.iter().find(|p| p.name == name)
    }

    /// 添字シグネチャのキー型の綴り。
    pub fn index_key(&self) -> &'static str {
        if self.index_numeric {
            "number"
        } else {
            "string"
        }
    }

    /// 名前でのメンバ参照に添字シグネチャが当てはまるか。
    pub fn index_applies_to(&self, name: &str) -> bool {
        self.index.is_some() && (!self.index_numeric || is_numeric_name(name))
    }

    /// 同名のプロパティは置き換え、無ければ末尾に追加する。
    pub fn upsert(&mut self, prop: Prop) {
        match self.props.iter_mut().find(|p| p.name == prop.name) {
            Some(slot) => *slot = prop,
            None => self.props.push(prop),
        }
    }

    /// 基底の型から継承する。自身で宣言済みのメンバが優先される。
    pub fn inherit(&mut self, base: &ObjectType) {
        for p in &base.props {
            if self.prop(&p.name).is_none() {
                self.props.push(p.clone());
            }
        }
        if self.calls.is_empty() {
            self.calls = base.calls.clone();
        }
        if self.constructs.is_empty() {
            self.constructs = base.constructs.clone();
        }
        if self.index.is_none() {
            self.index = base.index.clone();
            self.index_numeric = base.index_numeric;
        }
    }

    pub fn substitute(&self, s: &Subst) -> ObjectType {
        ObjectType {
            props: self
                .props
                .iter()
                .map(|p| Prop {
                    ty: p.ty.substitute(s),
                    ..p.clone()
                })
                .collect(),
            calls: self.calls.iter().map(|c| c.substitute(s)).collect(),
            constructs: self.constructs.iter().map(|c| c.substitute(s)).collect(),
            index: self.index.as_ref().map(|t| t.substitute(s)),
            index_numeric: self.index_numeric,
        }
    }

    fn is_plain_function(&self) -> bool {
        self.props.is_empty()
            && self.calls.len() == 1
            && self.constructs.is_empty()
            && self.index.is_none()
    }
}

/// `"0"` や `"1.5"` のように数値として読める名前。
pub fn is_numeric_name(name: &str) -> bool {
    name.parse::<f64>().map_or(false, f64::is_finite)
}

/// 型パラメータ名から型への置換。
pub type Subst = HashMap<String, Type>;

impl Type {
    pub fn func(sig: Signature) -> Type {
        Type::Object(Rc::new(ObjectType {
            calls: vec![sig],
            ..ObjectType::default()
        }))
    }

    pub fn object(obj: ObjectType) -> Type {
        Type::Object(Rc::new(obj))
    }

    pub fn named(name: impl Into<String>) -> Type {
        Type::Ref {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// 数値演算の被演算子として受け入れられるか（`any` を含む）。
    pub fn is_numeric_like(&self) -> bool {
        match self {
            Type::Any | Type::Number | Type::Never | Type::Null | Type::Undefined => true,
            Type::Union(items) => items.iter().all(Type::is_numeric_like),
            _ => false,
        }
    }

    pub fn is_string_like(&self) -> bool {
        match self {
            Type::String => true,
            Type::Union(items) => items.iter().all(Type::is_string_like),
            _ => false,
        }
    }

    /// 配列なら要素型、それ以外は `any`。
    pub fn element_type(&self) -> Type {
        match self {
            Type::Array(inner) => (**inner).clone(),
            Type::Ref { name, args } if name == "Array" => {
                args.first().cloned().unwrap_or(Type::Any)
            }
            _ => Type::Any,
        }
    }

    /// 変数宣言の推論で使う拡幅。`null` / `undefined` は `any` になる。
    pub fn widen(self) -> Type {
        match self {
            Type::Null | Type::Undefined => Type::Any,
            Type::Array(inner) => Type::Array(Box::new(inner.widen())),
            other => other,
        }
    }

    pub fn substitute(&self, s: &Subst) -> Type {
        if s.is_empty() {
            return self.clone();
        }
        match self {
            Type::Param(name) => s.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Array(inner) => Type::Array(Box::new(inner.substitute(s))),
            Type::Object(obj) => Type::Object(Rc::new(obj.substitute(s))),
            Type::Ref { name, args } => Type::Ref {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(s)).collect(),
            },
            Type::Union(items) => union_of(items.iter().map(|t| t.substitute(s)).collect()),
            other => other.clone(),
        }
    }

    /// 型パラメータを含むかどうか。
    pub fn mentions_param(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Array(inner) => inner.mentions_param(),
            Type::Ref { args, .. } => args.iter().any(Type::mentions_param),
            Type::Union(items) => items.iter().any(Type::mentions_param),
            Type::Object(obj) => {
                obj.props.iter().any(|p| p.ty.mentions_param())
                    || obj
                        .calls
                        .iter()
                        .any(|c| c.ret.mentions_param() || c.params.iter().any(|p| p.ty.mentions_param()))
            }
            _ => false,
        }
    }

    /// 呼び出しシグネチャを 1 つだけ持つ関数型ならそれを返す。
    pub fn as_function(&self) -> Option<&Signature> {
        match self {
            Type::Object(obj) if obj.calls.len() == 1 => obj.calls.first(),
            _ => None,
        }
    }
}

/// 共用体を正規化する。入れ子を平坦化し、重複と `null` / `undefined` を取り除く。
pub fn union_of(types: Vec<Type>) -> Type {
    let mut flat: Vec<Type> = Vec::new();
    for t in types {
        match t {
            Type::Union(items) => {
                for it in items {
                    push_unique(&mut flat, it);
                }
            }
            other => push_unique(&mut flat, other),
        }
    }
    if flat.iter().any(Type::is_any) {
        return Type::Any;
    }
    flat.retain(|t| !matches!(t, Type::Never));
    if flat.iter().any(|t| !matches!(t, Type::Null | Type::Undefined)) {
        flat.retain(|t| !matches!(t, Type::Null | Type::Undefined));
    }
    match flat.len() {
        0 => Type::Never,
        1 => flat.remove(0),
        _ => Type::Union(flat),
    }
}

fn push_unique(out: &mut Vec<Type>, t: Type) {
    if !out.contains(&t) {
        out.push(t);
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::Boolean => write!(f, "boolean"),
            Type::Void => write!(f, "void"),
            Type::Undefined => write!(f, "undefined"),
            Type::Null => write!(f, "null"),
            Type::Never => write!(f, "never"),
            Type::Array(inner) => match inner.as_ref() {
                Type::Union(_) => write!(f, "({inner})[]"),
                Type::Object(obj) if obj.is_plain_function() => write!(f, "({inner})[]"),
                _ => write!(f, "{inner}[]"),
            },
            Type::Object(obj) => write!(f, "{}", obj),
            Type::Ref { name, args } => {
                if args.is_empty() {
                    write!(f, "{name}")
                } else {
                    let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "{name}<{}>", parts.join(", "))
                }
            }
            Type::Ctor(name) => write!(f, "typeof {name}"),
            Type::Module(name) => write!(f, "typeof \"{name}\""),
            Type::Param(name) => write!(f, "{name}"),
            Type::Union(items) => {
                let parts: Vec<String> = items.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_plain_function() {
            return write!(f, "{}", SignatureDisplay::arrow(&self.calls[0]));
        }
        let mut parts: Vec<String> = Vec::new();
        for c in &self.calls {
            parts.push(SignatureDisplay::colon(c).to_string());
        }
        for c in &self.constructs {
            parts.push(format!("new {}", SignatureDisplay::colon(c)));
        }
        if let Some(idx) = &self.index {
            parts.push(format!("[x: {}]: {idx}", self.index_key()));
        }
        for p in &self.props {
            parts.push(render_prop(p));
        }
        if parts.is_empty() {
            write!(f, "{{}}")
        } else {
            write!(f, "{{ {}; }}", parts.join("; "))
        }
    }
}

/// プロパティ 1 つを `name?: T` / `m(a: T): R` の形で描画する。
pub fn render_prop(p: &Prop) -> String {
    let q = if p.optional { "?" } else { "" };
    let ro = if p.readonly { "readonly " } else { "" };
    if p.is_method {
        if let Some(sig) = p.ty.as_function() {
            return format!("{}{q}{}", p.name, SignatureDisplay::colon(sig));
        }
    }
    format!("{ro}{}{q}: {}", p.name, p.ty)
}

/// シグネチャの表示形式。`(a: T) => R` か `(a: T): R` を選ぶ。
pub struct SignatureDisplay<'a> {
    sig: &'a Signature,
    arrow: bool,
}

impl<'a> SignatureDisplay<'a> {
    pub fn arrow(sig: &'a Signature) -> Self {
        Self { sig, arrow: true }
    }

    pub fn colon(sig: &'a Signature) -> Self {
        Self { sig, arrow: false }
    }
}

impl fmt::Display for SignatureDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.sig.type_params.is_empty() {
            let names: Vec<String> = self
                .sig
                .type_params
                .iter()
                .map(|tp| match &tp.constraint {
                    Some(c) => format!("{} extends {}", tp.name, c),
                    None => tp.name.clone(),
                })
                .collect();
            write!(f, "<{}>", names.join(", "))?;
        }
        let params: Vec<String> = self
            .sig
            .params
            .iter()
            .map(|p| {
                let rest = if p.rest { "..." } else { "" };
                let q = if p.optional { "?" } else { "" };
                format!("{rest}{}{q}: {}", p.name, p.ty)
            })
            .collect();
        let sep = if self.arrow { " =>" } else { ":" };
        write!(f, "({}){} {}", params.join(", "), sep, self.sig.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, ty: Type) -> ParamType {
        ParamType {
            name: name.into(),
            ty,
            optional: false,
            rest: false,
        }
    }

    #[test]
    /// 共用体は平坦化・重複除去され、null は吸収される。
    fn union_normalization() {
        let u = union_of(vec![
            Type::Number,
            Type::Union(vec![Type::String, Type::Number]),
            Type::Null,
        ]);
        assert_eq!(u, Type::Union(vec![Type::Number, Type::String]));
        assert_eq!(union_of(vec![Type::Null]), Type::Null);
        assert_eq!(union_of(vec![Type::Number, Type::Any]), Type::Any);
        assert_eq!(union_of(vec![]), Type::Never);
    }

    #[test]
    /// 関数型は矢印形式、メソッドはコロン形式で表示される。
    fn display_function_and_object() {
        let sig = Signature::simple(vec![param("x", Type::Number)], Type::String);
        assert_eq!(Type::func(sig.clone()).to_string(), "(x: number) => string");
        let mut obj = ObjectType::default();
        obj.props.push(Prop::new("a", Type::Array(Box::new(Type::Number))));
        obj.props.push(Prop::method("m", sig));
        assert_eq!(
            Type::object(obj).to_string(),
            "{ a: number[]; m(x: number): string; }"
        );
    }

    #[test]
    /// 置換は型パラメータだけを差し替え、シグネチャ自身の型パラメータは隠蔽される。
    fn substitution_respects_shadowing() {
        let mut s = Subst::new();
        s.insert("T".into(), Type::Number);
        let arr = Type::Array(Box::new(Type::Param("T".into())));
        assert_eq!(arr.substitute(&s), Type::Array(Box::new(Type::Number)));
        let generic = Signature {
            type_params: vec![TypeParamDef {
                name: "T".into(),
                constraint: None,
            }],
            params: vec![param("x", Type::Param("T".into()))],
            ret: Type::Param("T".into()),
        };
        assert_eq!(generic.substitute(&s), generic);
    }

    #[test]
    /// 残余引数の位置では要素型が返る。
    fn rest_parameter_lookup() {
        let sig = Signature::simple(
            vec![
                param("a", Type::String),
                ParamType {
                    name: "rest".into(),
                    ty: Type::Array(Box::new(Type::Number)),
                    optional: false,
                    rest: true,
                },
            ],
            Type::Void,
        );
        assert_eq!(sig.min_args(), 1);
        assert_eq!(sig.max_args(), None);
        assert_eq!(sig.param_type_at(3), Some(Type::Number));
    }
}
