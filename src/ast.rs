//! 抽象構文木（AST）
//!
//! 目的:
//! - 型付きソースと、型を消去した出力スクリプトの双方を同じ木で表す。
//!   出力スクリプトは型注釈や型専用宣言を含まない部分集合になる。
//!
//! 設計ノート:
//! - アロー関数の式本体は `return` 文 1 つの本体へ正規化する（`expr_body` で区別）。
//! - 型式（`TypeExpr`）は注釈用で、検査器の `Type` とは分離する。

use std::fmt;

/// ソース上の範囲。`pos`/`end` はバイトオフセット、`line`/`col` は 1-origin。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub pos: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(pos: usize, end: usize, line: usize, col: usize) -> Self {
        Self { pos, end, line, col }
    }

    pub fn dummy() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modifier {
    Public,
    Private,
    Protected,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDeclarator {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub optional: bool,
    pub default: Option<Expr>,
    pub rest: bool,
    /// コンストラクタ引数プロパティ (`constructor(private x: T)`) の修飾子。
    pub property: Option<Modifier>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub constraint: Option<TypeExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: Option<String>,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    /// 本体を持たない宣言（オーバーロード・ambient）では `None`。
    pub body: Option<Vec<Stmt>>,
    pub is_arrow: bool,
    pub expr_body: bool,
    pub span: Span,
}

/// `extends Base<T>` / `implements I` の参照。
#[derive(Clone, Debug, PartialEq)]
pub struct HeritageRef {
    pub name: String,
    pub args: Vec<TypeExpr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub extends: Option<HeritageRef>,
    pub implements: Vec<HeritageRef>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClassMember {
    Property {
        name: String,
        ty: Option<TypeExpr>,
        init: Option<Expr>,
        is_static: bool,
        modifier: Option<Modifier>,
        readonly: bool,
        optional: bool,
        span: Span,
    },
    Method {
        name: String,
        func: Function,
        is_static: bool,
        modifier: Option<Modifier>,
        span: Span,
    },
    Constructor {
        func: Function,
        span: Span,
    },
}

impl ClassMember {
    pub fn name(&self) -> &str {
        match self {
            ClassMember::Property { name, .. } | ClassMember::Method { name, .. } => name,
            ClassMember::Constructor { .. } => "constructor",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ClassMember::Property { span, .. }
            | ClassMember::Method { span, .. }
            | ClassMember::Constructor { span, .. } => *span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub extends: Vec<HeritageRef>,
    pub members: Vec<TypeMember>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FnTypeExpr {
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeMember {
    Property {
        name: String,
        ty: TypeExpr,
        optional: bool,
        readonly: bool,
        span: Span,
    },
    Method {
        name: String,
        sig: FnTypeExpr,
        optional: bool,
        span: Span,
    },
    Call {
        sig: FnTypeExpr,
        span: Span,
    },
    Construct {
        sig: FnTypeExpr,
        span: Span,
    },
    Index {
        key_name: String,
        key: TypeExpr,
        value: TypeExpr,
        span: Span,
    },
}

impl TypeMember {
    pub fn span(&self) -> Span {
        match self {
            TypeMember::Property { span, .. }
            | TypeMember::Method { span, .. }
            | TypeMember::Call { span, .. }
            | TypeMember::Construct { span, .. }
            | TypeMember::Index { span, .. } => *span,
        }
    }
}

// 型式（パーサ用）
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    /// `number` のような組み込み名も含む名前参照。
    Named {
        name: String,
        args: Vec<TypeExpr>,
        span: Span,
    },
    Array(Box<TypeExpr>),
    Function(Box<FnTypeExpr>),
    Object(Vec<TypeMember>),
    Union(Vec<TypeExpr>),
    StringLit(String),
    NumberLit(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ImportKind {
    /// `import * as ns from "m"`
    Namespace(String),
    /// `import { a, b as c } from "m"` の (公開名, ローカル名)。
    Named(Vec<(String, String)>),
    /// `import x = require("m")`
    Require(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ForInit {
    Var { kind: VarKind, decls: Vec<VarDeclarator> },
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Var {
        kind: VarKind,
        decls: Vec<VarDeclarator>,
        declare: bool,
        export: bool,
        span: Span,
    },
    Function {
        func: Function,
        declare: bool,
        export: bool,
        span: Span,
    },
    Class {
        class: ClassDecl,
        declare: bool,
        export: bool,
        span: Span,
    },
    Interface {
        decl: InterfaceDecl,
        span: Span,
    },
    TypeAlias {
        name: String,
        type_params: Vec<TypeParam>,
        ty: TypeExpr,
        span: Span,
    },
    /// `declare module "name" { ... }`
    Module {
        name: String,
        body: Vec<Stmt>,
        span: Span,
    },
    Import {
        kind: ImportKind,
        module: String,
        span: Span,
    },
    Expr {
        expr: Expr,
        span: Span,
    },
    Block {
        body: Vec<Stmt>,
        span: Span,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        span: Span,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    ForOf {
        kind: VarKind,
        name: String,
        iter: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    ForIn {
        kind: Option<VarKind>,
        name: String,
        object: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Switch {
        disc: Expr,
        cases: Vec<SwitchCase>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Throw {
        value: Expr,
        span: Span,
    },
    Try {
        block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
        span: Span,
    },
    Empty {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var { span, .. }
            | Stmt::Function { span, .. }
            | Stmt::Class { span, .. }
            | Stmt::Interface { span, .. }
            | Stmt::TypeAlias { span, .. }
            | Stmt::Module { span, .. }
            | Stmt::Import { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::For { span, .. }
            | Stmt::ForOf { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Throw { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Empty { span } => *span,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::BitNot => "~",
            UnaryOp::TypeOf => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::In => "in",
            BinaryOp::InstanceOf => "instanceof",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

/// 代入演算子。`None` は単純代入、`Some(op)` は複合代入。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssignOp(pub Option<BinaryOp>);

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self.0 {
            None => "=",
            Some(BinaryOp::Add) => "+=",
            Some(BinaryOp::Sub) => "-=",
            Some(BinaryOp::Mul) => "*=",
            Some(BinaryOp::Div) => "/=",
            Some(BinaryOp::Mod) => "%=",
            Some(_) => "=",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropEntry {
    /// `key: value`。短縮記法とメソッド記法もここへ正規化する。
    Property { key: String, value: Expr, span: Span },
    Spread { expr: Expr, span: Span },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number {
        value: f64,
        span: Span,
    },
    String {
        value: String,
        span: Span,
    },
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    Null {
        span: Span,
    },
    Ident {
        name: String,
        span: Span,
    },
    This {
        span: Span,
    },
    Super {
        span: Span,
    },
    Array {
        items: Vec<Expr>,
        span: Span,
    },
    Object {
        props: Vec<PropEntry>,
        span: Span,
    },
    Function {
        func: Box<Function>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    Conditional {
        test: Box<Expr>,
        cons: Box<Expr>,
        alt: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: String,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    As {
        expr: Box<Expr>,
        ty: TypeExpr,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. }
            | Expr::String { span, .. }
            | Expr::Template { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Null { span }
            | Expr::Ident { span, .. }
            | Expr::This { span }
            | Expr::Super { span }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Function { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Update { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::As { span, .. } => *span,
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident {
            name: name.into(),
            span: Span::dummy(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named { name, args, .. } => {
                if args.is_empty() {
                    write!(f, "{name}")
                } else {
                    let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "{name}<{}>", parts.join(", "))
                }
            }
            TypeExpr::Array(inner) => match inner.as_ref() {
                TypeExpr::Union(_) | TypeExpr::Function(_) => write!(f, "({inner})[]"),
                _ => write!(f, "{inner}[]"),
            },
            TypeExpr::Function(sig) => write!(f, "{}", FnTypeDisplay { sig, arrow: true }),
            TypeExpr::Object(members) => {
                if members.is_empty() {
                    return write!(f, "{{}}");
                }
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "{{ {}; }}", parts.join("; "))
            }
            TypeExpr::Union(items) => {
                let parts: Vec<String> = items.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
            TypeExpr::StringLit(s) => write!(f, "{s:?}"),
            TypeExpr::NumberLit(n) => write!(f, "{n}"),
        }
    }
}

impl fmt::Display for TypeMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeMember::Property {
                name,
                ty,
                optional,
                readonly,
                ..
            } => {
                let ro = if *readonly { "readonly " } else { "" };
                let q = if *optional { "?" } else { "" };
                write!(f, "{ro}{name}{q}: {ty}")
            }
            TypeMember::Method {
                name, sig, optional, ..
            } => {
                let q = if *optional { "?" } else { "" };
                write!(f, "{name}{q}{}", FnTypeDisplay { sig, arrow: false })
            }
            TypeMember::Call { sig, .. } => write!(f, "{}", FnTypeDisplay { sig, arrow: false }),
            TypeMember::Construct { sig, .. } => {
                write!(f, "new {}", FnTypeDisplay { sig, arrow: false })
            }
            TypeMember::Index {
                key_name,
                key,
                value,
                ..
            } => write!(f, "[{key_name}: {key}]: {value}"),
        }
    }
}

/// 関数型の表示。`arrow` なら `(a: T) => R`、そうでなければ `(a: T): R`。
struct FnTypeDisplay<'a> {
    sig: &'a FnTypeExpr,
    arrow: bool,
}

impl fmt::Display for FnTypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.sig.type_params.is_empty() {
            let names: Vec<&str> = self
                .sig
                .type_params
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            write!(f, "<{}>", names.join(", "))?;
        }
        let params: Vec<String> = self.sig.params.iter().map(render_param).collect();
        if self.arrow {
            write!(f, "({}) => {}", params.join(", "), self.sig.ret)
        } else {
            write!(f, "({}): {}", params.join(", "), self.sig.ret)
        }
    }
}

/// 引数 1 つを `...name?: T` 形式で描画する。
pub fn render_param(p: &Param) -> String {
    let rest = if p.rest { "..." } else { "" };
    let q = if p.optional || p.default.is_some() {
        "?"
    } else {
        ""
    };
    match &p.ty {
        Some(ty) => format!("{rest}{}{q}: {ty}", p.name),
        None => format!("{rest}{}{q}: any", p.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> TypeExpr {
        TypeExpr::Named {
            name: name.into(),
            args: vec![],
            span: Span::dummy(),
        }
    }

    #[test]
    /// 型式の表示が注釈の書式に従うことを確認する。
    fn type_expr_display() {
        let arr = TypeExpr::Array(Box::new(TypeExpr::Union(vec![
            named("string"),
            named("number"),
        ])));
        assert_eq!(arr.to_string(), "(string | number)[]");
        let generic = TypeExpr::Named {
            name: "Array".into(),
            args: vec![named("T")],
            span: Span::dummy(),
        };
        assert_eq!(generic.to_string(), "Array<T>");
        let func = TypeExpr::Function(Box::new(FnTypeExpr {
            type_params: vec![],
            params: vec![Param {
                name: "x".into(),
                ty: Some(named("number")),
                optional: true,
                default: None,
                rest: false,
                property: None,
                span: Span::dummy(),
            }],
            ret: named("void"),
        }));
        assert_eq!(func.to_string(), "(x?: number) => void");
    }
}
