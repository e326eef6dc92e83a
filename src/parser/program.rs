// パス: src/parser/program.rs
// 役割: 文・宣言（関数・クラス・インタフェース・モジュール）の構文解析ルーチンを実装する
// 意図: プログラム全体の解析ロジックを `Parser` から分離し可読性を高める
// 関連ファイル: src/parser/expr.rs, src/parser/types.rs, src/parser/mod.rs

use super::*;
use crate::ast::{
    CatchClause, ClassDecl, ClassMember, ForInit, Function, HeritageRef, ImportKind,
    InterfaceDecl, Modifier, Param, Stmt, SwitchCase, VarDeclarator, VarKind,
};

impl Parser {
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut stmts = Vec::new();
        while !self.at(TokenKind::EOF) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Program { stmts })
    }

    pub(super) fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek().clone();
        match start.kind {
            TokenKind::SEMI => {
                self.pop_any();
                Ok(Stmt::Empty {
                    span: self.span_from(&start),
                })
            }
            TokenKind::LBRACE => {
                let body = self.parse_block_body()?;
                Ok(Stmt::Block {
                    body,
                    span: self.span_from(&start),
                })
            }
            TokenKind::VAR | TokenKind::LET | TokenKind::CONST => {
                self.parse_var_stmt(&start, false, false)
            }
            TokenKind::FUNCTION => self.parse_function_stmt(&start, false, false),
            TokenKind::CLASS => self.parse_class_stmt(&start, false, false),
            TokenKind::IF => self.parse_if(),
            TokenKind::WHILE => {
                self.pop_any();
                self.pop(TokenKind::LPAREN)?;
                let cond = self.parse_expr()?;
                self.pop(TokenKind::RPAREN)?;
                let body = self.parse_stmt()?;
                Ok(Stmt::While {
                    cond,
                    body: Box::new(body),
                    span: self.span_from(&start),
                })
            }
            TokenKind::DO => {
                self.pop_any();
                let body = self.parse_stmt()?;
                self.pop(TokenKind::WHILE)?;
                self.pop(TokenKind::LPAREN)?;
                let cond = self.parse_expr()?;
                self.pop(TokenKind::RPAREN)?;
                self.accept(TokenKind::SEMI);
                Ok(Stmt::DoWhile {
                    body: Box::new(body),
                    cond,
                    span: self.span_from(&start),
                })
            }
            TokenKind::FOR => self.parse_for(),
            TokenKind::SWITCH => self.parse_switch(),
            TokenKind::RETURN => {
                self.pop_any();
                let t = self.peek();
                let value = if matches!(t.kind, TokenKind::SEMI | TokenKind::RBRACE | TokenKind::EOF)
                    || t.newline_before
                {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.consume_semi()?;
                Ok(Stmt::Return {
                    value,
                    span: self.span_from(&start),
                })
            }
            TokenKind::BREAK => {
                self.pop_any();
                self.consume_semi()?;
                Ok(Stmt::Break {
                    span: self.span_from(&start),
                })
            }
            TokenKind::CONTINUE => {
                self.pop_any();
                self.consume_semi()?;
                Ok(Stmt::Continue {
                    span: self.span_from(&start),
                })
            }
            TokenKind::THROW => {
                self.pop_any();
                let value = self.parse_expr()?;
                self.consume_semi()?;
                Ok(Stmt::Throw {
                    value,
                    span: self.span_from(&start),
                })
            }
            TokenKind::TRY => self.parse_try(),
            TokenKind::IMPORT => self.parse_import(),
            TokenKind::EXPORT => self.parse_export(),
            TokenKind::IDENT if self.starts_contextual_decl() => self.parse_contextual_decl(),
            _ => {
                let expr = self.parse_expr()?;
                self.consume_semi()?;
                Ok(Stmt::Expr {
                    expr,
                    span: self.span_from(&start),
                })
            }
        }
    }

    /// `type` / `interface` / `declare` などの文脈キーワードで始まる宣言か。
    fn starts_contextual_decl(&self) -> bool {
        let t = self.peek();
        let next = self.peek_at(1);
        let next_kind = next.map(|n| n.kind.clone());
        let next_on_same_line = next.is_some_and(|n| !n.newline_before);
        match t.value.as_str() {
            "type" => {
                next_kind == Some(TokenKind::IDENT)
                    && matches!(self.peek_kind(2), Some(TokenKind::EQUAL) | Some(TokenKind::LT))
            }
            "interface" => next_kind == Some(TokenKind::IDENT) && next_on_same_line,
            "declare" => {
                next_on_same_line
                    && matches!(
                        next_kind,
                        Some(TokenKind::VAR)
                            | Some(TokenKind::LET)
                            | Some(TokenKind::CONST)
                            | Some(TokenKind::FUNCTION)
                            | Some(TokenKind::CLASS)
                            | Some(TokenKind::IDENT)
                    )
            }
            _ => false,
        }
    }

    fn parse_contextual_decl(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek().clone();
        match start.value.as_str() {
            "type" => self.parse_type_alias(&start),
            "interface" => self.parse_interface(&start),
            _ => {
                self.pop_any(); // declare
                self.parse_declare_body(&start, false)
            }
        }
    }

    fn parse_declare_body(&mut self, start: &Token, export: bool) -> Result<Stmt, ParseError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::VAR | TokenKind::LET | TokenKind::CONST => {
                self.parse_var_stmt(start, true, export)
            }
            TokenKind::FUNCTION => self.parse_function_stmt(start, true, export),
            TokenKind::CLASS => self.parse_class_stmt(start, true, export),
            TokenKind::IDENT if t.value == "module" || t.value == "namespace" => {
                self.pop_any();
                let name_tok = self.peek().clone();
                let name = match name_tok.kind {
                    TokenKind::STRING => {
                        self.pop_any();
                        decode_string(&name_tok.value)?
                    }
                    _ => self.pop_ident(false)?.value,
                };
                let body = self.parse_block_body()?;
                Ok(Stmt::Module {
                    name,
                    body,
                    span: self.span_from(start),
                })
            }
            TokenKind::IDENT if t.value == "interface" => self.parse_interface(start),
            TokenKind::IDENT if t.value == "type" => self.parse_type_alias(start),
            _ => Err(self.unexpected(&t, "宣言")),
        }
    }

    fn parse_export(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pop(TokenKind::EXPORT)?;
        let t = self.peek().clone();
        match t.kind {
            TokenKind::VAR | TokenKind::LET | TokenKind::CONST => {
                self.parse_var_stmt(&start, false, true)
            }
            TokenKind::FUNCTION => self.parse_function_stmt(&start, false, true),
            TokenKind::CLASS => self.parse_class_stmt(&start, false, true),
            TokenKind::IDENT if t.value == "declare" => {
                self.pop_any();
                self.parse_declare_body(&start, true)
            }
            // 型専用の宣言は export しても出力に影響しない
            TokenKind::IDENT if t.value == "interface" => self.parse_interface(&start),
            TokenKind::IDENT if t.value == "type" => self.parse_type_alias(&start),
            _ => Err(self.unexpected(&t, "export される宣言")),
        }
    }

    pub(super) fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.pop(TokenKind::LBRACE)?;
        let mut body = Vec::new();
        while !self.at(TokenKind::RBRACE) {
            if self.at(TokenKind::EOF) {
                let t = self.peek().clone();
                return Err(self.unexpected(&t, "'}'"));
            }
            body.push(self.parse_stmt()?);
        }
        self.pop(TokenKind::RBRACE)?;
        Ok(body)
    }

    fn parse_var_kind(&mut self) -> Result<VarKind, ParseError> {
        let t = self.pop_any();
        match t.kind {
            TokenKind::VAR => Ok(VarKind::Var),
            TokenKind::LET => Ok(VarKind::Let),
            TokenKind::CONST => Ok(VarKind::Const),
            _ => Err(self.unexpected(&t, "var/let/const")),
        }
    }

    fn parse_var_stmt(
        &mut self,
        start: &Token,
        declare: bool,
        export: bool,
    ) -> Result<Stmt, ParseError> {
        let kind = self.parse_var_kind()?;
        let decls = self.parse_declarators(declare)?;
        self.consume_semi()?;
        Ok(Stmt::Var {
            kind,
            decls,
            declare,
            export,
            span: self.span_from(start),
        })
    }

    fn parse_declarators(&mut self, declare: bool) -> Result<Vec<VarDeclarator>, ParseError> {
        let mut decls = Vec::new();
        loop {
            let name = self.pop_ident(false)?;
            decls.push(self.parse_declarator_rest(&name, declare)?);
            if self.accept(TokenKind::COMMA).is_none() {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_declarator_rest(
        &mut self,
        name: &Token,
        declare: bool,
    ) -> Result<VarDeclarator, ParseError> {
        let ty = if self.accept(TokenKind::COLON).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.accept(TokenKind::EQUAL).is_some() {
            if declare {
                let t = self.peek().clone();
                return Err(self.error_at(&t, "SYN020", "ambient 宣言に初期化子は書けません"));
            }
            Some(self.parse_assign()?)
        } else {
            None
        };
        Ok(VarDeclarator {
            name: name.value.clone(),
            ty,
            init,
            span: self.span_from(name),
        })
    }

    fn parse_function_stmt(
        &mut self,
        start: &Token,
        declare: bool,
        export: bool,
    ) -> Result<Stmt, ParseError> {
        let func = self.parse_function(declare)?;
        if func.name.is_none() {
            return Err(self.error_at(start, "SYN021", "関数宣言には名前が必要です"));
        }
        if declare && func.body.is_some() {
            return Err(self.error_at(start, "SYN020", "ambient 関数に本体は書けません"));
        }
        Ok(Stmt::Function {
            func,
            declare,
            export,
            span: self.span_from(start),
        })
    }

    /// `function name?<T>(params): R { body }`。本体が無ければオーバーロード宣言とみなす。
    pub(super) fn parse_function(&mut self, bodyless: bool) -> Result<Function, ParseError> {
        let start = self.pop(TokenKind::FUNCTION)?;
        let name = if self.at(TokenKind::IDENT) {
            Some(self.pop_any().value)
        } else {
            None
        };
        self.parse_function_rest(name, &start, bodyless)
    }

    /// 引数リスト以降（型引数・引数・戻り値型・本体）を読む。
    pub(super) fn parse_function_rest(
        &mut self,
        name: Option<String>,
        start: &Token,
        bodyless: bool,
    ) -> Result<Function, ParseError> {
        let type_params = self.parse_type_params_opt()?;
        let params = self.parse_params()?;
        let ret = if self.accept(TokenKind::COLON).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = if self.at(TokenKind::LBRACE) && !bodyless {
            Some(self.parse_block_body()?)
        } else {
            self.consume_semi()?;
            None
        };
        Ok(Function {
            name,
            type_params,
            params,
            ret,
            body,
            is_arrow: false,
            expr_body: false,
            span: self.span_from(start),
        })
    }

    pub(super) fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.pop(TokenKind::LPAREN)?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RPAREN) {
            let start = self.peek().clone();
            let property = self.parse_modifier_opt();
            self.accept_word_before_name("readonly");
            let rest = self.accept(TokenKind::ELLIPSIS).is_some();
            let name = if self.at(TokenKind::THIS) {
                self.pop_any().value
            } else {
                self.pop_ident(false)?.value
            };
            let optional = self.accept(TokenKind::QMARK).is_some();
            let ty = if self.accept(TokenKind::COLON).is_some() {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.accept(TokenKind::EQUAL).is_some() {
                Some(self.parse_assign()?)
            } else {
                None
            };
            params.push(Param {
                name,
                ty,
                optional,
                default,
                rest,
                property,
                span: self.span_from(&start),
            });
            if rest && !self.at(TokenKind::RPAREN) {
                let t = self.peek().clone();
                return Err(self.error_at(&t, "SYN022", "残余引数は最後に置く必要があります"));
            }
            if self.accept(TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.pop(TokenKind::RPAREN)?;
        Ok(params)
    }

    /// 修飾子の後ろにメンバ名が続く場合だけ修飾子として消費する。
    fn parse_modifier_opt(&mut self) -> Option<Modifier> {
        let modifier = match self.peek().value.as_str() {
            "public" => Modifier::Public,
            "private" => Modifier::Private,
            "protected" => Modifier::Protected,
            _ => return None,
        };
        if self.peek().kind != TokenKind::IDENT || !self.followed_by_name() {
            return None;
        }
        self.pop_any();
        Some(modifier)
    }

    fn accept_word_before_name(&mut self, word: &str) -> bool {
        if self.at_word(word) && self.followed_by_name() {
            self.pop_any();
            true
        } else {
            false
        }
    }

    fn followed_by_name(&self) -> bool {
        match self.peek_at(1) {
            Some(t) => {
                matches!(
                    t.kind,
                    TokenKind::IDENT | TokenKind::STRING | TokenKind::NUMBER | TokenKind::ELLIPSIS
                ) || is_keyword_kind(&t.kind)
            }
            None => false,
        }
    }

    fn parse_heritage(&mut self) -> Result<HeritageRef, ParseError> {
        let start = self.peek().clone();
        let mut name = self.pop_ident(false)?.value;
        while self.accept(TokenKind::DOT).is_some() {
            name.push('.');
            name.push_str(&self.pop_ident(true)?.value);
        }
        let args = if self.accept(TokenKind::LT).is_some() {
            self.parse_type_list_until_gt()?
        } else {
            Vec::new()
        };
        Ok(HeritageRef {
            name,
            args,
            span: self.span_from(&start),
        })
    }

    fn parse_class_stmt(
        &mut self,
        start: &Token,
        declare: bool,
        export: bool,
    ) -> Result<Stmt, ParseError> {
        let class_tok = self.pop(TokenKind::CLASS)?;
        let name = self.pop_ident(false)?.value;
        let type_params = self.parse_type_params_opt()?;
        let extends = if self.accept(TokenKind::EXTENDS).is_some() {
            Some(self.parse_heritage()?)
        } else {
            None
        };
        let mut implements = Vec::new();
        if self.accept_word("implements") {
            loop {
                implements.push(self.parse_heritage()?);
                if self.accept(TokenKind::COMMA).is_none() {
                    break;
                }
            }
        }
        self.pop(TokenKind::LBRACE)?;
        let mut members = Vec::new();
        while !self.at(TokenKind::RBRACE) {
            if self.accept(TokenKind::SEMI).is_some() {
                continue;
            }
            if self.at(TokenKind::EOF) {
                let t = self.peek().clone();
                return Err(self.unexpected(&t, "'}'"));
            }
            members.push(self.parse_class_member(declare)?);
        }
        self.pop(TokenKind::RBRACE)?;
        let span = self.span_from(start);
        Ok(Stmt::Class {
            class: ClassDecl {
                name,
                type_params,
                extends,
                implements,
                members,
                span: self.span_from(&class_tok),
            },
            declare,
            export,
            span,
        })
    }

    fn parse_class_member(&mut self, declare: bool) -> Result<ClassMember, ParseError> {
        let start = self.peek().clone();
        let modifier = self.parse_modifier_opt();
        let is_static = self.accept_word_before_name("static");
        let readonly = self.accept_word_before_name("readonly");
        let name_tok = self.peek().clone();
        if name_tok.kind == TokenKind::IDENT
            && name_tok.value == "constructor"
            && self.peek_kind(1) == Some(TokenKind::LPAREN)
        {
            self.pop_any();
            let func = self.parse_function_rest(Some("constructor".into()), &name_tok, declare)?;
            return Ok(ClassMember::Constructor {
                func,
                span: self.span_from(&start),
            });
        }
        let name = self.parse_property_key()?;
        let optional = self.accept(TokenKind::QMARK).is_some();
        if self.at(TokenKind::LPAREN) || self.at(TokenKind::LT) {
            let func = self.parse_function_rest(Some(name.clone()), &name_tok, declare)?;
            return Ok(ClassMember::Method {
                name,
                func,
                is_static,
                modifier,
                span: self.span_from(&start),
            });
        }
        let ty = if self.accept(TokenKind::COLON).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.accept(TokenKind::EQUAL).is_some() {
            Some(self.parse_assign()?)
        } else {
            None
        };
        self.consume_semi()?;
        Ok(ClassMember::Property {
            name,
            ty,
            init,
            is_static,
            modifier,
            readonly,
            optional,
            span: self.span_from(&start),
        })
    }

    fn parse_interface(&mut self, start: &Token) -> Result<Stmt, ParseError> {
        let kw = self.pop_any(); // interface
        let name = self.pop_ident(false)?.value;
        let type_params = self.parse_type_params_opt()?;
        let mut extends = Vec::new();
        if self.accept(TokenKind::EXTENDS).is_some() {
            loop {
                extends.push(self.parse_heritage()?);
                if self.accept(TokenKind::COMMA).is_none() {
                    break;
                }
            }
        }
        let members = self.parse_type_members()?;
        Ok(Stmt::Interface {
            decl: InterfaceDecl {
                name,
                type_params,
                extends,
                members,
                span: self.span_from(&kw),
            },
            span: self.span_from(start),
        })
    }

    fn parse_type_alias(&mut self, start: &Token) -> Result<Stmt, ParseError> {
        self.pop_any(); // type
        let name = self.pop_ident(false)?.value;
        let type_params = self.parse_type_params_opt()?;
        self.pop(TokenKind::EQUAL)?;
        let ty = self.parse_type()?;
        self.consume_semi()?;
        Ok(Stmt::TypeAlias {
            name,
            type_params,
            ty,
            span: self.span_from(start),
        })
    }

    fn parse_import(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pop(TokenKind::IMPORT)?;
        let (kind, module) = if self.accept(TokenKind::STAR).is_some() {
            if !self.accept_word("as") {
                let t = self.peek().clone();
                return Err(self.unexpected(&t, "'as'"));
            }
            let local = self.pop_ident(false)?.value;
            let module = self.parse_from_clause()?;
            (ImportKind::Namespace(local), module)
        } else if self.at(TokenKind::LBRACE) {
            self.pop_any();
            let mut names = Vec::new();
            while !self.at(TokenKind::RBRACE) {
                let imported = self.pop_ident(true)?.value;
                let local = if self.accept_word("as") {
                    self.pop_ident(false)?.value
                } else {
                    imported.clone()
                };
                names.push((imported, local));
                if self.accept(TokenKind::COMMA).is_none() {
                    break;
                }
            }
            self.pop(TokenKind::RBRACE)?;
            let module = self.parse_from_clause()?;
            (ImportKind::Named(names), module)
        } else {
            let local = self.pop_ident(false)?.value;
            self.pop(TokenKind::EQUAL)?;
            if !self.accept_word("require") {
                let t = self.peek().clone();
                return Err(self.unexpected(&t, "'require'"));
            }
            self.pop(TokenKind::LPAREN)?;
            let m = self.pop(TokenKind::STRING)?;
            self.pop(TokenKind::RPAREN)?;
            (ImportKind::Require(local), decode_string(&m.value)?)
        };
        self.consume_semi()?;
        Ok(Stmt::Import {
            kind,
            module,
            span: self.span_from(&start),
        })
    }

    fn parse_from_clause(&mut self) -> Result<String, ParseError> {
        if !self.accept_word("from") {
            let t = self.peek().clone();
            return Err(self.unexpected(&t, "'from'"));
        }
        let m = self.pop(TokenKind::STRING)?;
        decode_string(&m.value)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pop(TokenKind::IF)?;
        self.pop(TokenKind::LPAREN)?;
        let cond = self.parse_expr()?;
        self.pop(TokenKind::RPAREN)?;
        let then_branch = self.parse_stmt()?;
        let else_branch = if self.accept(TokenKind::ELSE).is_some() {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch,
            span: self.span_from(&start),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pop(TokenKind::FOR)?;
        self.pop(TokenKind::LPAREN)?;
        let mut init = None;
        if matches!(
            self.peek().kind,
            TokenKind::VAR | TokenKind::LET | TokenKind::CONST
        ) {
            let kind = self.parse_var_kind()?;
            let name = self.pop_ident(false)?;
            if self.accept_word("of") {
                return self.finish_for_of(&start, kind, name.value);
            }
            if self.accept(TokenKind::IN).is_some() {
                return self.finish_for_in(&start, Some(kind), name.value);
            }
            let mut decls = vec![self.parse_declarator_rest(&name, false)?];
            while self.accept(TokenKind::COMMA).is_some() {
                let name = self.pop_ident(false)?;
                decls.push(self.parse_declarator_rest(&name, false)?);
            }
            init = Some(ForInit::Var { kind, decls });
        } else if self.at(TokenKind::IDENT) && self.peek_kind(1) == Some(TokenKind::IN) {
            let name = self.pop_any().value;
            self.pop(TokenKind::IN)?;
            return self.finish_for_in(&start, None, name);
        } else if !self.at(TokenKind::SEMI) {
            init = Some(ForInit::Expr(self.parse_expr()?));
        }
        self.pop(TokenKind::SEMI)?;
        let test = if self.at(TokenKind::SEMI) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.pop(TokenKind::SEMI)?;
        let update = if self.at(TokenKind::RPAREN) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.pop(TokenKind::RPAREN)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::For {
            init,
            test,
            update,
            body: Box::new(body),
            span: self.span_from(&start),
        })
    }

    fn finish_for_of(
        &mut self,
        start: &Token,
        kind: VarKind,
        name: String,
    ) -> Result<Stmt, ParseError> {
        let iter = self.parse_expr()?;
        self.pop(TokenKind::RPAREN)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::ForOf {
            kind,
            name,
            iter,
            body: Box::new(body),
            span: self.span_from(start),
        })
    }

    fn finish_for_in(
        &mut self,
        start: &Token,
        kind: Option<VarKind>,
        name: String,
    ) -> Result<Stmt, ParseError> {
        let object = self.parse_expr()?;
        self.pop(TokenKind::RPAREN)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::ForIn {
            kind,
            name,
            object,
            body: Box::new(body),
            span: self.span_from(start),
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pop(TokenKind::SWITCH)?;
        self.pop(TokenKind::LPAREN)?;
        let disc = self.parse_expr()?;
        self.pop(TokenKind::RPAREN)?;
        self.pop(TokenKind::LBRACE)?;
        let mut cases = Vec::new();
        while !self.at(TokenKind::RBRACE) {
            let test = if self.accept(TokenKind::DEFAULT).is_some() {
                None
            } else {
                self.pop(TokenKind::CASE)?;
                Some(self.parse_expr()?)
            };
            self.pop(TokenKind::COLON)?;
            let mut body = Vec::new();
            while !matches!(
                self.peek().kind,
                TokenKind::CASE | TokenKind::DEFAULT | TokenKind::RBRACE
            ) {
                if self.at(TokenKind::EOF) {
                    let t = self.peek().clone();
                    return Err(self.unexpected(&t, "'}'"));
                }
                body.push(self.parse_stmt()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.pop(TokenKind::RBRACE)?;
        Ok(Stmt::Switch {
            disc,
            cases,
            span: self.span_from(&start),
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        let start = self.pop(TokenKind::TRY)?;
        let block = self.parse_block_body()?;
        let catch = if self.accept(TokenKind::CATCH).is_some() {
            let param = if self.accept(TokenKind::LPAREN).is_some() {
                let name = self.pop_ident(false)?.value;
                if self.accept(TokenKind::COLON).is_some() {
                    self.parse_type()?;
                }
                self.pop(TokenKind::RPAREN)?;
                Some(name)
            } else {
                None
            };
            let body = self.parse_block_body()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finally = if self.accept(TokenKind::FINALLY).is_some() {
            Some(self.parse_block_body()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            let t = self.peek().clone();
            return Err(self.unexpected(&t, "'catch' か 'finally'"));
        }
        Ok(Stmt::Try {
            block,
            catch,
            finally,
            span: self.span_from(&start),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{ClassMember, Expr, Stmt};
    use crate::parser::parse_program;

    #[test]
    /// 改行による自動セミコロン挿入で 2 文に分かれることを確認する。
    fn asi_splits_statements() {
        let prog = parse_program("let a = 1\nlet b = a\nb").unwrap();
        assert_eq!(prog.stmts.len(), 3);
        assert!(parse_program("let a = 1 let b = 2").is_err());
    }

    #[test]
    /// 引数プロパティと static メンバを持つクラスを解析できる。
    fn class_with_parameter_properties() {
        let prog = parse_program(
            "class P extends Base { static count = 0; constructor(private x: number, public y?: string) { super(); } get(): number { return this.x } }",
        )
        .unwrap();
        let Stmt::Class { class, .. } = &prog.stmts[0] else {
            panic!("class expected");
        };
        assert_eq!(class.extends.as_ref().map(|h| h.name.as_str()), Some("Base"));
        assert_eq!(class.members.len(), 3);
        let ClassMember::Constructor { func, .. } = &class.members[1] else {
            panic!("constructor expected");
        };
        assert!(func.params.iter().all(|p| p.property.is_some()));
        assert!(func.params[1].optional);
    }

    #[test]
    /// 本体を持たない関数宣言はオーバーロードとして扱われる。
    fn overload_signatures() {
        let prog = parse_program("function f(x: string): string;\nfunction f(x: any) { return x }").unwrap();
        let Stmt::Function { func, .. } = &prog.stmts[0] else {
            panic!("function expected");
        };
        assert!(func.body.is_none());
    }

    #[test]
    /// アロー関数と括弧式・条件式を取り違えない。
    fn arrow_vs_parenthesized() {
        let prog = parse_program("var f = (a: number, b) => a + b; var g = (1 + 2); var h = c ? (d) : e;").unwrap();
        let Stmt::Var { decls, .. } = &prog.stmts[0] else {
            panic!("var expected");
        };
        assert!(matches!(decls[0].init, Some(Expr::Function { .. })));
        let Stmt::Var { decls, .. } = &prog.stmts[2] else {
            panic!("var expected");
        };
        assert!(matches!(decls[0].init, Some(Expr::Conditional { .. })));
    }

    #[test]
    /// 文脈キーワードは宣言位置以外では通常の識別子として使える。
    fn contextual_keywords_as_identifiers() {
        let prog = parse_program("var type = 1; type; declare var x: number; interface I { a: number }").unwrap();
        assert_eq!(prog.stmts.len(), 4);
        assert!(matches!(prog.stmts[1], Stmt::Expr { .. }));
        assert!(matches!(prog.stmts[2], Stmt::Var { declare: true, .. }));
        assert!(matches!(prog.stmts[3], Stmt::Interface { .. }));
    }

    #[test]
    /// for-of / for-in / 通常の for を区別する。
    fn for_variants() {
        let prog = parse_program(
            "for (const x of xs) {}\nfor (var k in o) {}\nfor (k in o) {}\nfor (let i = 0; i < 3; i++) {}",
        )
        .unwrap();
        assert!(matches!(prog.stmts[0], Stmt::ForOf { .. }));
        assert!(matches!(prog.stmts[1], Stmt::ForIn { kind: Some(_), .. }));
        assert!(matches!(prog.stmts[2], Stmt::ForIn { kind: None, .. }));
        assert!(matches!(prog.stmts[3], Stmt::For { .. }));
    }

    #[test]
    /// import の 3 形式を解析できる。
    fn import_forms() {
        let prog = parse_program(
            "import * as fs from \"fs\";\nimport { join, resolve as r } from 'path'\nimport os = require(\"os\")",
        )
        .unwrap();
        assert_eq!(prog.stmts.len(), 3);
        for s in &prog.stmts {
            assert!(matches!(s, Stmt::Import { .. }));
        }
    }
}
