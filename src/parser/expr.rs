// パス: src/parser/expr.rs
// 役割: 式解析に関する `Parser` 実装をまとめる
// 意図: 二項演算・アロー関数・メンバアクセスなど複雑なロジックを専用モジュールに切り分ける
// 関連ファイル: src/parser/program.rs, src/parser/types.rs, src/parser/mod.rs

use super::*;
use crate::ast::{
    AssignOp, BinaryOp, Function, LogicalOp, Param, PropEntry, Stmt, UnaryOp,
};

/// 二項演算子の優先順位表（小さいほど弱い）。
fn binary_op(kind: &TokenKind) -> Option<(u8, BinaryOp)> {
    use TokenKind as K;
    let entry = match kind {
        K::BAR => (3, BinaryOp::BitOr),
        K::CARET => (4, BinaryOp::BitXor),
        K::AMP => (5, BinaryOp::BitAnd),
        K::EQ => (6, BinaryOp::Eq),
        K::NE => (6, BinaryOp::Ne),
        K::EQEQ => (6, BinaryOp::StrictEq),
        K::NEEQ => (6, BinaryOp::StrictNe),
        K::LT => (7, BinaryOp::Lt),
        K::GT => (7, BinaryOp::Gt),
        K::LE => (7, BinaryOp::Le),
        K::GE => (7, BinaryOp::Ge),
        K::INSTANCEOF => (7, BinaryOp::InstanceOf),
        K::IN => (7, BinaryOp::In),
        K::SHL => (8, BinaryOp::Shl),
        K::SHR => (8, BinaryOp::Shr),
        K::USHR => (8, BinaryOp::UShr),
        K::PLUS => (9, BinaryOp::Add),
        K::MINUS => (9, BinaryOp::Sub),
        K::STAR => (10, BinaryOp::Mul),
        K::SLASH => (10, BinaryOp::Div),
        K::PERCENT => (10, BinaryOp::Mod),
        _ => return None,
    };
    Some(entry)
}

const RELATIONAL_LEVEL: u8 = 7;

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    let op = match kind {
        TokenKind::EQUAL => None,
        TokenKind::PLUSEQ => Some(BinaryOp::Add),
        TokenKind::MINUSEQ => Some(BinaryOp::Sub),
        TokenKind::STAREQ => Some(BinaryOp::Mul),
        TokenKind::SLASHEQ => Some(BinaryOp::Div),
        TokenKind::PERCENTEQ => Some(BinaryOp::Mod),
        _ => return None,
    };
    Some(AssignOp(op))
}

fn is_assign_target(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Ident { .. } | Expr::Member { .. } | Expr::Index { .. }
    )
}

impl Parser {
    /// カンマ演算子は扱わず、代入式を最上位とする。
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assign()
    }

    pub(super) fn parse_assign(&mut self) -> Result<Expr, ParseError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let start = self.peek().clone();
        let lhs = self.parse_conditional()?;
        let Some(op) = assign_op(&self.peek().kind) else {
            return Ok(lhs);
        };
        let op_tok = self.pop_any();
        if !is_assign_target(&lhs) {
            return Err(self.error_at(&op_tok, "SYN004", "代入先として不正な式です"));
        }
        let value = self.parse_assign()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(lhs),
            value: Box::new(value),
            span: self.span_from(&start),
        })
    }

    /// `x => ...` と `(a, b) => ...` を判定して解析する。該当しなければ `None`。
    fn try_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let start = self.peek().clone();
        if start.kind == TokenKind::IDENT && self.peek_kind(1) == Some(TokenKind::ARROW) {
            let name = self.pop_any();
            self.pop(TokenKind::ARROW)?;
            let param = Param {
                name: name.value.clone(),
                ty: None,
                optional: false,
                default: None,
                rest: false,
                property: None,
                span: self.span_from(&name),
            };
            return self.finish_arrow(&start, vec![], vec![param], None).map(Some);
        }
        if start.kind != TokenKind::LPAREN && start.kind != TokenKind::LT {
            return Ok(None);
        }
        if !self.looks_like_arrow_head() {
            return Ok(None);
        }
        let head = self.try_parse(|p| {
            let type_params = p.parse_type_params_opt()?;
            let params = p.parse_params()?;
            let ret = if p.accept(TokenKind::COLON).is_some() {
                Some(p.parse_type()?)
            } else {
                None
            };
            p.pop(TokenKind::ARROW)?;
            Ok((type_params, params, ret))
        });
        match head {
            Some((type_params, params, ret)) => self
                .finish_arrow(&start, type_params, params, ret)
                .map(Some),
            None => Ok(None),
        }
    }

    /// 括弧の対応を追い、閉じ括弧の直後に `=>` か `:` が来るかを先読みする。
    fn looks_like_arrow_head(&self) -> bool {
        let mut idx = self.i;
        if self.ts.get(idx).map(|t| &t.kind) == Some(&TokenKind::LT) {
            // ジェネリックアロー `<T>(x: T) => x`
            while let Some(t) = self.ts.get(idx) {
                if t.kind == TokenKind::GT {
                    break;
                }
                if t.kind == TokenKind::EOF {
                    return false;
                }
                idx += 1;
            }
            idx += 1;
            if self.ts.get(idx).map(|t| &t.kind) != Some(&TokenKind::LPAREN) {
                return false;
            }
        }
        let mut depth = 0usize;
        while let Some(t) = self.ts.get(idx) {
            match t.kind {
                TokenKind::LPAREN | TokenKind::LBRACK | TokenKind::LBRACE => depth += 1,
                TokenKind::RPAREN | TokenKind::RBRACK | TokenKind::RBRACE => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.ts.get(idx + 1).map(|t| &t.kind),
                            Some(TokenKind::ARROW) | Some(TokenKind::COLON)
                        );
                    }
                }
                TokenKind::EOF => return false,
                _ => {}
            }
            idx += 1;
        }
        false
    }

    fn finish_arrow(
        &mut self,
        start: &Token,
        type_params: Vec<crate::ast::TypeParam>,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
    ) -> Result<Expr, ParseError> {
        let (body, expr_body) = if self.at(TokenKind::LBRACE) {
            (self.parse_block_body()?, false)
        } else {
            let value_start = self.peek().clone();
            let value = self.parse_assign()?;
            let span = self.span_from(&value_start);
            (
                vec![Stmt::Return {
                    value: Some(value),
                    span,
                }],
                true,
            )
        };
        let span = self.span_from(start);
        Ok(Expr::Function {
            func: Box::new(Function {
                name: None,
                type_params,
                params,
                ret,
                body: Some(body),
                is_arrow: true,
                expr_body,
                span,
            }),
            span,
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let test = self.parse_logical_or()?;
        if self.accept(TokenKind::QMARK).is_none() {
            return Ok(test);
        }
        let cons = self.parse_assign()?;
        self.pop(TokenKind::COLON)?;
        let alt = self.parse_assign()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            cons: Box::new(cons),
            alt: Box::new(alt),
            span: self.span_from(&start),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let mut lhs = self.parse_logical_and()?;
        while self.accept(TokenKind::BARBAR).is_some() {
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(lhs),
                right: Box::new(rhs),
                span: self.span_from(&start),
            };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let mut lhs = self.parse_binary(0)?;
        while self.accept(TokenKind::AMPAMP).is_some() {
            let rhs = self.parse_binary(0)?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(lhs),
                right: Box::new(rhs),
                span: self.span_from(&start),
            };
        }
        Ok(lhs)
    }

    /// 優先順位上昇法で二項演算を解析する。`as` は関係演算子と同じ強さで扱う。
    fn parse_binary(&mut self, min_level: u8) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let mut lhs = self.parse_exponent()?;
        loop {
            if self.at_word("as") && !self.peek().newline_before && min_level <= RELATIONAL_LEVEL {
                self.pop_any();
                let ty = self.parse_type()?;
                lhs = Expr::As {
                    expr: Box::new(lhs),
                    ty,
                    span: self.span_from(&start),
                };
                continue;
            }
            let Some((level, op)) = binary_op(&self.peek().kind) else {
                break;
            };
            if level < min_level {
                break;
            }
            self.pop_any();
            let rhs = self.parse_binary(level + 1)?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                span: self.span_from(&start),
            };
        }
        Ok(lhs)
    }

    /// `**` は右結合。
    fn parse_exponent(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let base = self.parse_unary()?;
        if self.accept(TokenKind::DBLSTAR).is_some() {
            let exp = self.parse_exponent()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exp),
                span: self.span_from(&start),
            });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let op = match start.kind {
            TokenKind::BANG => Some(UnaryOp::Not),
            TokenKind::MINUS => Some(UnaryOp::Neg),
            TokenKind::PLUS => Some(UnaryOp::Plus),
            TokenKind::TILDE => Some(UnaryOp::BitNot),
            TokenKind::TYPEOF => Some(UnaryOp::TypeOf),
            TokenKind::VOID => Some(UnaryOp::Void),
            TokenKind::DELETE => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.pop_any();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
                span: self.span_from(&start),
            });
        }
        if matches!(start.kind, TokenKind::PLUSPLUS | TokenKind::MINUSMINUS) {
            let op_tok = self.pop_any();
            let target = self.parse_unary()?;
            if !is_assign_target(&target) {
                return Err(self.error_at(&op_tok, "SYN004", "更新演算の対象として不正な式です"));
            }
            return Ok(Expr::Update {
                increment: start.kind == TokenKind::PLUSPLUS,
                prefix: true,
                target: Box::new(target),
                span: self.span_from(&start),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let expr = self.parse_call_member()?;
        let t = self.peek().clone();
        if matches!(t.kind, TokenKind::PLUSPLUS | TokenKind::MINUSMINUS) && !t.newline_before {
            if !is_assign_target(&expr) {
                return Err(self.error_at(&t, "SYN004", "更新演算の対象として不正な式です"));
            }
            self.pop_any();
            return Ok(Expr::Update {
                increment: t.kind == TokenKind::PLUSPLUS,
                prefix: false,
                target: Box::new(expr),
                span: self.span_from(&start),
            });
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek().clone();
        let mut expr = if start.kind == TokenKind::NEW {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek().kind {
                TokenKind::DOT => {
                    self.pop_any();
                    let name = self.pop_ident(true)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: name.value,
                        span: self.span_from(&start),
                    };
                }
                TokenKind::LBRACK => {
                    self.pop_any();
                    let index = self.parse_expr()?;
                    self.pop(TokenKind::RBRACK)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        span: self.span_from(&start),
                    };
                }
                TokenKind::LPAREN => {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span: self.span_from(&start),
                    };
                }
                TokenKind::LT => {
                    // 明示的な型引数 `f<number>(x)`。型として読めなければ比較演算子。
                    let type_args = self.try_parse(|p| {
                        p.pop(TokenKind::LT)?;
                        let args = p.parse_type_list_until_gt()?;
                        if !p.at(TokenKind::LPAREN) {
                            return Err(ParseError::new("SYN001", "型引数の後に '(' が必要", None));
                        }
                        Ok(args)
                    });
                    if type_args.is_none() {
                        break;
                    }
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span: self.span_from(&start),
                    };
                }
                TokenKind::TEMPLATE | TokenKind::TEMPLATE_HEAD => {
                    let t = self.peek().clone();
                    return Err(self.error_at(&t, "SYN030", "タグ付きテンプレートは未対応です"));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        let start = self.pop(TokenKind::NEW)?;
        let mut callee = if self.at(TokenKind::NEW) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        while self.at(TokenKind::DOT) {
            self.pop_any();
            let name = self.pop_ident(true)?;
            callee = Expr::Member {
                object: Box::new(callee),
                property: name.value,
                span: self.span_from(&start),
            };
        }
        if self.at(TokenKind::LT) {
            self.pop_any();
            self.parse_type_list_until_gt()?;
        }
        let args = if self.at(TokenKind::LPAREN) {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
            span: self.span_from(&start),
        })
    }

    pub(super) fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.pop(TokenKind::LPAREN)?;
        let mut args = Vec::new();
        while !self.at(TokenKind::RPAREN) {
            args.push(self.parse_assign()?);
            if self.accept(TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.pop(TokenKind::RPAREN)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let t = self.peek().clone();
        let span = Span::new(t.pos, t.end, t.line, t.col);
        match t.kind {
            TokenKind::NUMBER => {
                self.pop_any();
                let value = decode_number(&t.value).map_err(|e| self.relocate(e, &t))?;
                Ok(Expr::Number { value, span })
            }
            TokenKind::STRING => {
                self.pop_any();
                let value = decode_string(&t.value).map_err(|e| self.relocate(e, &t))?;
                Ok(Expr::String { value, span })
            }
            TokenKind::TEMPLATE | TokenKind::TEMPLATE_HEAD => self.parse_template(),
            TokenKind::TRUE | TokenKind::FALSE => {
                self.pop_any();
                Ok(Expr::Bool {
                    value: t.kind == TokenKind::TRUE,
                    span,
                })
            }
            TokenKind::NULL => {
                self.pop_any();
                Ok(Expr::Null { span })
            }
            TokenKind::THIS => {
                self.pop_any();
                Ok(Expr::This { span })
            }
            TokenKind::SUPER => {
                self.pop_any();
                Ok(Expr::Super { span })
            }
            TokenKind::IDENT => {
                self.pop_any();
                Ok(Expr::Ident {
                    name: t.value,
                    span,
                })
            }
            TokenKind::LPAREN => {
                self.pop_any();
                let inner = self.parse_expr()?;
                self.pop(TokenKind::RPAREN)?;
                Ok(inner)
            }
            TokenKind::LBRACK => self.parse_array_literal(),
            TokenKind::LBRACE => self.parse_object_literal(),
            TokenKind::FUNCTION => {
                let func = self.parse_function(false)?;
                let span = func.span;
                Ok(Expr::Function {
                    func: Box::new(func),
                    span,
                })
            }
            TokenKind::CLASS => {
                Err(self.error_at(&t, "SYN031", "クラス式は未対応です（class 宣言を使ってください）"))
            }
            _ => Err(self.unexpected(&t, "式")),
        }
    }

    /// 位置を持たない内部エラーにトークン位置を付与する。
    fn relocate(&self, err: ParseError, t: &Token) -> ParseError {
        self.error_at(t, err.0.code, err.0.msg)
    }

    fn parse_template(&mut self) -> Result<Expr, ParseError> {
        let start = self.pop_any();
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        if start.kind == TokenKind::TEMPLATE {
            let raw = &start.value[1..start.value.len() - 1];
            quasis.push(decode_escapes(raw).map_err(|e| self.relocate(e, &start))?);
            return Ok(Expr::Template {
                quasis,
                exprs,
                span: self.span_from(&start),
            });
        }
        // "`abc${"
        let head = &start.value[1..start.value.len() - 2];
        quasis.push(decode_escapes(head).map_err(|e| self.relocate(e, &start))?);
        loop {
            exprs.push(self.parse_expr()?);
            let t = self.pop_any();
            match t.kind {
                TokenKind::TEMPLATE_MIDDLE => {
                    let body = &t.value[1..t.value.len() - 2];
                    quasis.push(decode_escapes(body).map_err(|e| self.relocate(e, &t))?);
                }
                TokenKind::TEMPLATE_TAIL => {
                    let body = &t.value[1..t.value.len() - 1];
                    quasis.push(decode_escapes(body).map_err(|e| self.relocate(e, &t))?);
                    break;
                }
                _ => return Err(self.unexpected(&t, "テンプレートの続き")),
            }
        }
        Ok(Expr::Template {
            quasis,
            exprs,
            span: self.span_from(&start),
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.pop(TokenKind::LBRACK)?;
        let mut items = Vec::new();
        while !self.at(TokenKind::RBRACK) {
            if self.at(TokenKind::ELLIPSIS) {
                let t = self.peek().clone();
                return Err(self.error_at(&t, "SYN032", "配列スプレッドは未対応です"));
            }
            items.push(self.parse_assign()?);
            if self.accept(TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.pop(TokenKind::RBRACK)?;
        Ok(Expr::Array {
            items,
            span: self.span_from(&start),
        })
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.pop(TokenKind::LBRACE)?;
        let mut props = Vec::new();
        while !self.at(TokenKind::RBRACE) {
            let entry_tok = self.peek().clone();
            if self.accept(TokenKind::ELLIPSIS).is_some() {
                let expr = self.parse_assign()?;
                props.push(PropEntry::Spread {
                    expr,
                    span: self.span_from(&entry_tok),
                });
            } else {
                let key = self.parse_property_key()?;
                let value = if self.accept(TokenKind::COLON).is_some() {
                    self.parse_assign()?
                } else if self.at(TokenKind::LPAREN) || self.at(TokenKind::LT) {
                    let func = self.parse_function_rest(Some(key.clone()), &entry_tok, false)?;
                    let span = func.span;
                    Expr::Function {
                        func: Box::new(func),
                        span,
                    }
                } else if entry_tok.kind == TokenKind::IDENT {
                    Expr::Ident {
                        name: key.clone(),
                        span: self.span_from(&entry_tok),
                    }
                } else {
                    let t = self.peek().clone();
                    return Err(self.unexpected(&t, "':'"));
                };
                props.push(PropEntry::Property {
                    key,
                    value,
                    span: self.span_from(&entry_tok),
                });
            }
            if self.accept(TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.pop(TokenKind::RBRACE)?;
        Ok(Expr::Object {
            props,
            span: self.span_from(&start),
        })
    }

    /// プロパティ名（識別子・予約語・文字列・数値・`["lit"]`）を読む。
    pub(super) fn parse_property_key(&mut self) -> Result<String, ParseError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::STRING => {
                self.pop_any();
                decode_string(&t.value).map_err(|e| self.relocate(e, &t))
            }
            TokenKind::NUMBER => {
                self.pop_any();
                let n = decode_number(&t.value).map_err(|e| self.relocate(e, &t))?;
                Ok(crate::runtime::number_to_string(n))
            }
            TokenKind::LBRACK => {
                self.pop_any();
                let inner = self.peek().clone();
                let key = match inner.kind {
                    TokenKind::STRING => {
                        self.pop_any();
                        decode_string(&inner.value).map_err(|e| self.relocate(e, &inner))?
                    }
                    TokenKind::NUMBER => {
                        self.pop_any();
                        inner.value.clone()
                    }
                    _ => {
                        return Err(self.error_at(
                            &inner,
                            "SYN033",
                            "計算されたプロパティ名はリテラルのみ対応しています",
                        ))
                    }
                };
                self.pop(TokenKind::RBRACK)?;
                Ok(key)
            }
            _ => Ok(self.pop_ident(true)?.value),
        }
    }
}
