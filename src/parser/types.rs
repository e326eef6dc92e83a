// パス: src/parser/types.rs
// 役割: 型注釈・型引数・型メンバの解析ロジックを提供する
// 意図: 型関連の処理を専用モジュールに集約し、Parser 実装を分割する
// 関連ファイル: src/parser/expr.rs, src/parser/program.rs, src/parser/mod.rs

use super::*;
use crate::ast::{FnTypeExpr, TypeMember, TypeParam};

impl Parser {
    /// 共用体 `A | B` を最上位とする型式。
    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        self.accept(TokenKind::BAR);
        let first = self.parse_array_type()?;
        if !self.at(TokenKind::BAR) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.accept(TokenKind::BAR).is_some() {
            items.push(self.parse_array_type()?);
        }
        Ok(TypeExpr::Union(items))
    }

    fn parse_array_type(&mut self) -> Result<TypeExpr, ParseError> {
        let mut ty = self.parse_type_atom()?;
        while self.at(TokenKind::LBRACK)
            && self.peek_kind(1) == Some(TokenKind::RBRACK)
            && !self.peek().newline_before
        {
            self.pop_any();
            self.pop_any();
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    pub(super) fn parse_type_atom(&mut self) -> Result<TypeExpr, ParseError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::IDENT => self.parse_type_reference(),
            TokenKind::VOID | TokenKind::NULL => {
                self.pop_any();
                Ok(TypeExpr::Named {
                    name: t.value.clone(),
                    args: vec![],
                    span: self.span_from(&t),
                })
            }
            TokenKind::STRING => {
                self.pop_any();
                Ok(TypeExpr::StringLit(decode_string(&t.value)?))
            }
            TokenKind::NUMBER => {
                self.pop_any();
                Ok(TypeExpr::NumberLit(decode_number(&t.value)?))
            }
            TokenKind::TRUE | TokenKind::FALSE => {
                self.pop_any();
                Ok(TypeExpr::Named {
                    name: "boolean".into(),
                    args: vec![],
                    span: self.span_from(&t),
                })
            }
            TokenKind::LBRACE => Ok(TypeExpr::Object(self.parse_type_members()?)),
            TokenKind::LT => Ok(TypeExpr::Function(Box::new(self.parse_fn_type()?))),
            TokenKind::NEW => {
                // コンストラクタ型 `new (...) => T` は構築シグネチャ 1 つの型リテラルとして表す
                self.pop_any();
                let sig = self.parse_fn_type()?;
                Ok(TypeExpr::Object(vec![TypeMember::Construct {
                    sig,
                    span: self.span_from(&t),
                }]))
            }
            TokenKind::LPAREN => {
                if let Some(sig) = self.try_parse(|p| p.parse_fn_type()) {
                    return Ok(TypeExpr::Function(Box::new(sig)));
                }
                self.pop_any();
                let inner = self.parse_type()?;
                self.pop(TokenKind::RPAREN)?;
                Ok(inner)
            }
            _ => Err(self.unexpected(&t, "型")),
        }
    }

    fn parse_type_reference(&mut self) -> Result<TypeExpr, ParseError> {
        let start = self.peek().clone();
        let mut name = self.pop_ident(false)?.value;
        while self.at(TokenKind::DOT) {
            self.pop_any();
            name.push('.');
            name.push_str(&self.pop_ident(true)?.value);
        }
        let args = if self.at(TokenKind::LT) && !self.peek().newline_before {
            self.pop_any();
            self.parse_type_list_until_gt()?
        } else {
            Vec::new()
        };
        Ok(TypeExpr::Named {
            name,
            args,
            span: self.span_from(&start),
        })
    }

    /// `<` の直後から `A, B>` を読む。
    pub(super) fn parse_type_list_until_gt(&mut self) -> Result<Vec<TypeExpr>, ParseError> {
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if self.accept(TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.pop_type_close()?;
        Ok(args)
    }

    /// `(a: T, b?: U) => R`（先頭の型引数も可）。
    fn parse_fn_type(&mut self) -> Result<FnTypeExpr, ParseError> {
        let type_params = self.parse_type_params_opt()?;
        let params = self.parse_params()?;
        self.pop(TokenKind::ARROW)?;
        let ret = self.parse_type()?;
        Ok(FnTypeExpr {
            type_params,
            params,
            ret,
        })
    }

    /// シグネチャ形式 `(a: T): R`。戻り値型を省略すると `any`。
    fn parse_signature(&mut self) -> Result<FnTypeExpr, ParseError> {
        let type_params = self.parse_type_params_opt()?;
        let params = self.parse_params()?;
        let ret = if self.accept(TokenKind::COLON).is_some() {
            self.parse_type()?
        } else {
            TypeExpr::Named {
                name: "any".into(),
                args: vec![],
                span: Span::dummy(),
            }
        };
        Ok(FnTypeExpr {
            type_params,
            params,
            ret,
        })
    }

    pub(super) fn parse_type_params_opt(&mut self) -> Result<Vec<TypeParam>, ParseError> {
        if self.accept(TokenKind::LT).is_none() {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            let name = self.pop_ident(false)?.value;
            let constraint = if self.accept(TokenKind::EXTENDS).is_some() {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(TypeParam { name, constraint });
            if self.accept(TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.pop_type_close()?;
        Ok(params)
    }

    /// `{ ... }` で囲まれたインタフェース本体・型リテラルのメンバ列。
    pub(super) fn parse_type_members(&mut self) -> Result<Vec<TypeMember>, ParseError> {
        self.pop(TokenKind::LBRACE)?;
        let mut members = Vec::new();
        while !self.at(TokenKind::RBRACE) {
            if self.at(TokenKind::EOF) {
                let t = self.peek().clone();
                return Err(self.unexpected(&t, "'}'"));
            }
            members.push(self.parse_type_member()?);
            if self.accept(TokenKind::SEMI).is_none() && self.accept(TokenKind::COMMA).is_none() {
                let t = self.peek();
                if t.kind != TokenKind::RBRACE && !t.newline_before {
                    let t = t.clone();
                    return Err(self.unexpected(&t, "';'"));
                }
            }
        }
        self.pop(TokenKind::RBRACE)?;
        Ok(members)
    }

    fn parse_type_member(&mut self) -> Result<TypeMember, ParseError> {
        let start = self.peek().clone();
        match start.kind {
            TokenKind::LPAREN | TokenKind::LT => {
                let sig = self.parse_signature()?;
                return Ok(TypeMember::Call {
                    sig,
                    span: self.span_from(&start),
                });
            }
            TokenKind::NEW if matches!(self.peek_kind(1), Some(TokenKind::LPAREN) | Some(TokenKind::LT)) => {
                self.pop_any();
                let sig = self.parse_signature()?;
                return Ok(TypeMember::Construct {
                    sig,
                    span: self.span_from(&start),
                });
            }
            TokenKind::LBRACK
                if self.peek_kind(1) == Some(TokenKind::IDENT)
                    && self.peek_kind(2) == Some(TokenKind::COLON) =>
            {
                self.pop_any();
                let key_name = self.pop_any().value;
                self.pop(TokenKind::COLON)?;
                let key = self.parse_type()?;
                self.pop(TokenKind::RBRACK)?;
                self.pop(TokenKind::COLON)?;
                let value = self.parse_type()?;
                return Ok(TypeMember::Index {
                    key_name,
                    key,
                    value,
                    span: self.span_from(&start),
                });
            }
            _ => {}
        }
        let readonly = self.at_word("readonly")
            && !matches!(
                self.peek_kind(1),
                Some(TokenKind::COLON) | Some(TokenKind::QMARK) | Some(TokenKind::LPAREN)
            );
        if readonly {
            self.pop_any();
        }
        let name = self.parse_property_key()?;
        let optional = self.accept(TokenKind::QMARK).is_some();
        if self.at(TokenKind::LPAREN) || self.at(TokenKind::LT) {
            let sig = self.parse_signature()?;
            return Ok(TypeMember::Method {
                name,
                sig,
                optional,
                span: self.span_from(&start),
            });
        }
        let ty = if self.accept(TokenKind::COLON).is_some() {
            self.parse_type()?
        } else {
            TypeExpr::Named {
                name: "any".into(),
                args: vec![],
                span: Span::dummy(),
            }
        };
        Ok(TypeMember::Property {
            name,
            ty,
            optional,
            readonly,
            span: self.span_from(&start),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{TypeExpr, TypeMember};
    use crate::parser::parse_type_text;

    #[test]
    /// 入れ子の型引数の `>>` を分割して閉じられる。
    fn nested_generic_close() {
        let ty = parse_type_text("Array<Array<number>>").unwrap();
        assert_eq!(ty.to_string(), "Array<Array<number>>");
    }

    #[test]
    /// 関数型と括弧付きの型を区別する。
    fn function_type_vs_parens() {
        let f = parse_type_text("(x: number, ...rest: string[]) => void").unwrap();
        assert!(matches!(f, TypeExpr::Function(_)));
        let p = parse_type_text("(string | number)[]").unwrap();
        assert!(matches!(p, TypeExpr::Array(_)));
    }

    #[test]
    /// 型リテラルのメンバ種別を解析できる。
    fn object_type_members() {
        let ty = parse_type_text(
            "{ (x: number): string; new (): Foo; [key: string]: any; readonly a?: number; m<T>(t: T): T }",
        )
        .unwrap();
        let TypeExpr::Object(members) = ty else {
            panic!("object type expected");
        };
        assert!(matches!(members[0], TypeMember::Call { .. }));
        assert!(matches!(members[1], TypeMember::Construct { .. }));
        assert!(matches!(members[2], TypeMember::Index { .. }));
        assert!(matches!(
            members[3],
            TypeMember::Property {
                readonly: true,
                optional: true,
                ..
            }
        ));
        assert!(matches!(members[4], TypeMember::Method { .. }));
    }
}
