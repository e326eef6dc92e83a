// パス: src/evaluator.rs
// 役割: 出力スクリプトを直接解釈する木構造インタプリタ
// 意図: REPL の実行文脈（大域束縛・組み込みプロトタイプ）を呼び出しを跨いで保持する
// 関連ファイル: src/runtime.rs, src/primitives.rs, src/capabilities.rs, src/intrinsics.rs
//! 評価器（evaluator）
//!
//! - 入力は ES5 相当のスクリプト。`var` と関数宣言は関数単位で巻き上げる。
//! - `run` は最後に実行したトップレベル式文の値を返す。
//! - 例外で中断しても、それまでに作られた束縛は残る。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, Expr, ForInit, Function, LogicalOp, PropEntry, Stmt, UnaryOp,
};
use crate::capabilities::CapabilityTable;
use crate::parser::parse_program;
use crate::runtime::{
    array_index, lookup_property, loose_equals, number_to_string, strict_equals, to_display_string,
    to_int32, to_number, truthy, type_of, Callable, Closure, Env, JsObject, ObjKind, ObjRef,
    RuntimeFailure, Unwind, Value,
};

/// JS の呼び出しの入れ子上限。
const MAX_CALL_DEPTH: usize = 256;

enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

type Exec = Result<Completion, Unwind>;
type Eval = Result<Value, Unwind>;

/// 組み込みプロトタイプ。
pub struct Realm {
    pub object_proto: ObjRef,
    pub function_proto: ObjRef,
    pub array_proto: ObjRef,
    pub string_proto: ObjRef,
    pub number_proto: ObjRef,
    pub boolean_proto: ObjRef,
    pub error_protos: HashMap<&'static str, ObjRef>,
}

pub struct Interpreter {
    global: Env,
    pub realm: Realm,
    pub(crate) capabilities: CapabilityTable,
    /// 読み込み済みモジュール（絶対パス → `module.exports`）。
    modules: HashMap<PathBuf, Value>,
    /// 実行中モジュールのディレクトリ（相対 `require` の基点）。
    module_dirs: Vec<PathBuf>,
    pub(crate) argv: Vec<String>,
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        let object_proto = JsObject::new(None, ObjKind::Ordinary);
        let proto = |o: &ObjRef| Some(Rc::clone(o));
        let realm = Realm {
            function_proto: JsObject::new(proto(&object_proto), ObjKind::Ordinary),
            array_proto: JsObject::new(proto(&object_proto), ObjKind::Array(Vec::new())),
            string_proto: JsObject::new(proto(&object_proto), ObjKind::Ordinary),
            number_proto: JsObject::new(proto(&object_proto), ObjKind::Ordinary),
            boolean_proto: JsObject::new(proto(&object_proto), ObjKind::Ordinary),
            error_protos: HashMap::new(),
            object_proto,
        };
        let mut interp = Self {
            global: Env::new(),
            realm,
            capabilities: CapabilityTable::default(),
            modules: HashMap::new(),
            module_dirs: Vec::new(),
            argv: Vec::new(),
            depth: 0,
        };
        crate::primitives::install(&mut interp);
        interp
    }

    pub fn global(&self) -> &Env {
        &self.global
    }

    pub fn set_argv(&mut self, argv: Vec<String>) {
        self.argv = argv;
        let args: Vec<Value> = self.argv.iter().map(Value::str).collect();
        let arr = self.new_array(args);
        if let Some(Value::Object(process)) = self.global.get("process") {
            process.borrow_mut().props.set("argv", arr);
        }
    }

    /// スクリプトを大域で実行し、最後のトップレベル式文の値を返す。
    pub fn run(&mut self, js: &str) -> Result<Value, RuntimeFailure> {
        let program = parse_program(js).map_err(RuntimeFailure::Syntax)?;
        let env = self.global.clone();
        log::debug!("run: {} statement(s)", program.stmts.len());
        self.hoist(&program.stmts, &env);
        let mut last = Value::Undefined;
        for s in &program.stmts {
            if let Stmt::Expr { expr, .. } = s {
                last = self.eval(expr, &env)?;
                continue;
            }
            match self.exec(s, &env)? {
                Completion::Normal => {}
                _ => break,
            }
        }
        Ok(last)
    }

    /// ファイルをモジュールとして実行し、その `module.exports` を返す。
    pub fn run_module(&mut self, path: &Path) -> Result<Value, RuntimeFailure> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if let Some(cached) = self.modules.get(&canonical) {
            return Ok(cached.clone());
        }
        let text = std::fs::read_to_string(&canonical).map_err(|e| {
            RuntimeFailure::Throw(self.make_error("Error", &format!("Cannot find module '{}': {}", path.display(), e)))
        })?;
        let program = parse_program(&text).map_err(RuntimeFailure::Syntax)?;
        let exports = self.new_object();
        let module = self.new_object();
        self.put(&module, "exports", exports.clone())?;
        self.modules.insert(canonical.clone(), exports.clone());
        let env = self.global.child();
        env.declare("exports", exports);
        env.declare("module", module.clone());
        env.declare("this", Value::Undefined);
        let dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        self.module_dirs.push(dir);
        self.hoist(&program.stmts, &env);
        let result = self.exec_block(&program.stmts, &env);
        self.module_dirs.pop();
        result?;
        let exported = self.get_member(&module, "exports")?;
        self.modules.insert(canonical, exported.clone());
        Ok(exported)
    }

    /// `require(name)` の解決。相対パスはモジュールとして読み込み、それ以外はケイパビリティ表を引く。
    pub(crate) fn require(&mut self, name: &str) -> Eval {
        if name.starts_with('.') || name.starts_with('/') {
            let base = self
                .module_dirs
                .last()
                .cloned()
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_default();
            let mut path = base.join(name);
            if path.extension().is_none() {
                path.set_extension("js");
            }
            return self.run_module(&path).map_err(|f| match f {
                RuntimeFailure::Throw(v) => Unwind::Throw(v),
                RuntimeFailure::Exit(code) => Unwind::Exit(code),
                RuntimeFailure::Syntax(e) => Unwind::Throw(self.make_error("SyntaxError", &e.0.msg)),
            });
        }
        match self.capability(name) {
            Some(v) => Ok(v),
            None => Err(self.throw_error("Error", &format!("Cannot find module '{}'", name))),
        }
    }

    // ---- 値の生成 ----

    pub fn new_object(&self) -> Value {
        Value::Object(JsObject::new(
            Some(Rc::clone(&self.realm.object_proto)),
            ObjKind::Ordinary,
        ))
    }

    pub fn new_array(&self, items: Vec<Value>) -> Value {
        Value::Object(JsObject::new(
            Some(Rc::clone(&self.realm.array_proto)),
            ObjKind::Array(items),
        ))
    }

    pub fn native_fn(&self, name: &'static str, f: crate::runtime::NativeFn) -> Value {
        Value::Object(JsObject::new(
            Some(Rc::clone(&self.realm.function_proto)),
            ObjKind::Function(Callable::Native { name, f }),
        ))
    }

    fn make_closure(&self, func: &Function, env: &Env, name: &str) -> Value {
        let closure = Closure {
            func: Rc::new(func.clone()),
            env: env.clone(),
            name: func.name.clone().unwrap_or_else(|| name.to_string()),
        };
        let obj = JsObject::new(
            Some(Rc::clone(&self.realm.function_proto)),
            ObjKind::Function(Callable::Closure(Rc::new(closure))),
        );
        if !func.is_arrow {
            let proto = JsObject::new(Some(Rc::clone(&self.realm.object_proto)), ObjKind::Ordinary);
            proto
                .borrow_mut()
                .props
                .set("constructor", Value::Object(Rc::clone(&obj)));
            obj.borrow_mut().props.set("prototype", Value::Object(proto));
        }
        Value::Object(obj)
    }

    /// 指定した種類のエラーオブジェクトを作る。
    pub fn make_error(&self, kind: &str, message: &str) -> Value {
        let proto = self
            .realm
            .error_protos
            .get(kind)
            .or_else(|| self.realm.error_protos.get("Error"))
            .cloned();
        let obj = JsObject::new(proto, ObjKind::Error);
        obj.borrow_mut().props.set("message", Value::str(message));
        let headline = if message.is_empty() {
            kind.to_string()
        } else {
            format!("{}: {}", kind, message)
        };
        obj.borrow_mut()
            .props
            .set("stack", Value::str(format!("{}\n    at <anonymous>", headline)));
        Value::Object(obj)
    }

    pub fn throw_error(&self, kind: &str, message: &str) -> Unwind {
        Unwind::Throw(self.make_error(kind, message))
    }

    // ---- 巻き上げ ----

    fn hoist(&mut self, stmts: &[Stmt], env: &Env) {
        for s in stmts {
            self.hoist_stmt(s, env);
        }
    }

    fn hoist_stmt(&mut self, s: &Stmt, env: &Env) {
        match s {
            Stmt::Var {
                decls,
                declare: false,
                ..
            } => {
                for d in decls {
                    env.reserve(&d.name);
                }
            }
            Stmt::Function {
                func,
                declare: false,
                ..
            } => {
                if let (Some(name), Some(_)) = (&func.name, &func.body) {
                    let f = self.make_closure(func, env, name);
                    env.declare(name.clone(), f);
                }
            }
            Stmt::Block { body, .. } => self.hoist(body, env),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.hoist_stmt(then_branch, env);
                if let Some(e) = else_branch {
                    self.hoist_stmt(e, env);
                }
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => self.hoist_stmt(body, env),
            Stmt::For { init, body, .. } => {
                if let Some(ForInit::Var { decls, .. }) = init {
                    for d in decls {
                        env.reserve(&d.name);
                    }
                }
                self.hoist_stmt(body, env);
            }
            Stmt::ForOf { name, body, .. } => {
                env.reserve(name);
                self.hoist_stmt(body, env);
            }
            Stmt::ForIn { kind, name, body, .. } => {
                if kind.is_some() {
                    env.reserve(name);
                }
                self.hoist_stmt(body, env);
            }
            Stmt::Switch { cases, .. } => {
                for c in cases {
                    self.hoist(&c.body, env);
                }
            }
            Stmt::Try {
                block,
                catch,
                finally,
                ..
            } => {
                self.hoist(block, env);
                if let Some(c) = catch {
                    self.hoist(&c.body, env);
                }
                if let Some(f) = finally {
                    self.hoist(f, env);
                }
            }
            _ => {}
        }
    }

    // ---- 文 ----

    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Exec {
        for s in stmts {
            match self.exec(s, env)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec(&mut self, s: &Stmt, env: &Env) -> Exec {
        match s {
            Stmt::Var { decls, declare, .. } => {
                if !*declare {
                    for d in decls {
                        if let Some(init) = &d.init {
                            let v = self.eval_named(init, env, &d.name)?;
                            self.assign_name(&d.name, v, env);
                        }
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Function { .. }
            | Stmt::Interface { .. }
            | Stmt::TypeAlias { .. }
            | Stmt::Module { .. }
            | Stmt::Empty { .. } => Ok(Completion::Normal),
            Stmt::Class { class, declare, .. } => {
                if *declare {
                    return Ok(Completion::Normal);
                }
                Err(self.throw_error(
                    "SyntaxError",
                    &format!("class '{}' must be lowered before execution", class.name),
                ))
            }
            Stmt::Import { kind, module, .. } => {
                let m = self.require(module)?;
                match kind {
                    crate::ast::ImportKind::Namespace(local) | crate::ast::ImportKind::Require(local) => {
                        env.declare(local.clone(), m);
                    }
                    crate::ast::ImportKind::Named(names) => {
                        for (imported, local) in names {
                            let v = self.get_member(&m, imported)?;
                            env.declare(local.clone(), v);
                        }
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Expr { expr, .. } => {
                self.eval(expr, env)?;
                Ok(Completion::Normal)
            }
            Stmt::Block { body, .. } => self.exec_block(body, env),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                if truthy(&self.eval(cond, env)?) {
                    self.exec(then_branch, env)
                } else if let Some(e) = else_branch {
                    self.exec(e, env)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::While { cond, body, .. } => {
                while truthy(&self.eval(cond, env)?) {
                    match self.exec(body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile { body, cond, .. } => {
                loop {
                    match self.exec(body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !truthy(&self.eval(cond, env)?) {
                        break;
                    }
                }
                Ok(Completion::Normal)
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
                        for d in decls {
                            if let Some(e) = &d.init {
                                let v = self.eval(e, env)?;
                                self.assign_name(&d.name, v, env);
                            }
                        }
                    }
                    Some(ForInit::Expr(e)) => {
                        self.eval(e, env)?;
                    }
                    None => {}
                }
                loop {
                    if let Some(t) = test {
                        if !truthy(&self.eval(t, env)?) {
                            break;
                        }
                    }
                    match self.exec(body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if let Some(u) = update {
                        self.eval(u, env)?;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::ForOf { name, iter, body, .. } => {
                let iterable = self.eval(iter, env)?;
                let items = self.iterate_values(&iterable)?;
                for item in items {
                    self.assign_name(name, item, env);
                    match self.exec(body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::ForIn { name, object, body, .. } => {
                let target = self.eval(object, env)?;
                for key in self.own_keys(&target) {
                    self.assign_name(name, Value::str(key), env);
                    match self.exec(body, env)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Switch { disc, cases, .. } => {
                let value = self.eval(disc, env)?;
                let mut start = None;
                for (i, c) in cases.iter().enumerate() {
                    if let Some(t) = &c.test {
                        if strict_equals(&value, &self.eval(t, env)?) {
                            start = Some(i);
                            break;
                        }
                    }
                }
                let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
                if let Some(start) = start {
                    for c in &cases[start..] {
                        match self.exec_block(&c.body, env)? {
                            Completion::Normal => {}
                            Completion::Break => break,
                            other => return Ok(other),
                        }
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Return { value, .. } => {
                let v = match value {
                    Some(e) => self.eval(e, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(v))
            }
            Stmt::Break { .. } => Ok(Completion::Break),
            Stmt::Continue { .. } => Ok(Completion::Continue),
            Stmt::Throw { value, .. } => {
                let v = self.eval(value, env)?;
                Err(Unwind::Throw(v))
            }
            Stmt::Try {
                block,
                catch,
                finally,
                ..
            } => {
                let mut result = self.exec_block(block, env);
                if let (Err(Unwind::Throw(thrown)), Some(c)) = (&result, catch) {
                    let catch_env = env.child();
                    if let Some(p) = &c.param {
                        catch_env.declare(p.clone(), thrown.clone());
                    }
                    result = self.exec_block(&c.body, &catch_env);
                }
                if let Some(f) = finally {
                    match self.exec_block(f, env)? {
                        Completion::Normal => {}
                        other => return Ok(other),
                    }
                }
                result
            }
        }
    }

    fn iterate_values(&mut self, v: &Value) -> Result<Vec<Value>, Unwind> {
        match v {
            Value::String(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::Object(o) => match &o.borrow().kind {
                ObjKind::Array(items) => Ok(items.clone()),
                _ => Err(self.throw_error("TypeError", "object is not iterable")),
            },
            other => Err(self.throw_error(
                "TypeError",
                &format!("{} is not iterable", to_display_string(other)),
            )),
        }
    }

    /// 列挙可能な自身のキー（配列は添字、文字列は位置）。
    pub fn own_keys(&self, v: &Value) -> Vec<String> {
        match v {
            Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            Value::Object(o) => {
                let borrowed = o.borrow();
                let mut keys: Vec<String> = match &borrowed.kind {
                    ObjKind::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
                    _ => Vec::new(),
                };
                keys.extend(borrowed.props.keys().iter().cloned());
                keys
            }
            _ => Vec::new(),
        }
    }

    fn assign_name(&mut self, name: &str, v: Value, env: &Env) {
        if let Err(v) = env.assign(name, v) {
            // 未宣言の代入は大域束縛を作る（同名ケイパビリティを覆い隠す）
            self.global.declare(name, v);
        }
    }

    // ---- 式 ----

    /// 無名関数式に束縛先の名前を与えて評価する。
    fn eval_named(&mut self, e: &Expr, env: &Env, name: &str) -> Eval {
        match e {
            Expr::Function { func, .. } if func.name.is_none() => Ok(self.make_closure(func, env, name)),
            _ => self.eval(e, env),
        }
    }

    pub(crate) fn eval(&mut self, e: &Expr, env: &Env) -> Eval {
        match e {
            Expr::Number { value, .. } => Ok(Value::Number(*value)),
            Expr::String { value, .. } => Ok(Value::str(value)),
            Expr::Template { quasis, exprs, .. } => {
                let mut out = String::new();
                for (i, q) in quasis.iter().enumerate() {
                    out.push_str(q);
                    if let Some(x) = exprs.get(i) {
                        let v = self.eval(x, env)?;
                        out.push_str(&to_display_string(&v));
                    }
                }
                Ok(Value::str(out))
            }
            Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expr::Null { .. } => Ok(Value::Null),
            Expr::Ident { name, .. } => self.lookup_ident(name, env),
            Expr::This { .. } => Ok(env.get("this").unwrap_or(Value::Undefined)),
            Expr::Super { .. } => Err(self.throw_error("SyntaxError", "'super' must be lowered before execution")),
            Expr::Array { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for it in items {
                    values.push(self.eval(it, env)?);
                }
                Ok(self.new_array(values))
            }
            Expr::Object { props, .. } => {
                let obj = self.new_object();
                for p in props {
                    match p {
                        PropEntry::Property { key, value, .. } => {
                            let v = self.eval_named(value, env, key)?;
                            self.put(&obj, key, v)?;
                        }
                        PropEntry::Spread { expr, .. } => {
                            let src = self.eval(expr, env)?;
                            for k in self.own_keys(&src) {
                                let v = self.get_member(&src, &k)?;
                                self.put(&obj, &k, v)?;
                            }
                        }
                    }
                }
                Ok(obj)
            }
            Expr::Function { func, .. } => Ok(self.make_closure(func, env, "")),
            Expr::Unary { op, expr, .. } => self.eval_unary(*op, expr, env),
            Expr::Update {
                increment,
                prefix,
                target,
                ..
            } => {
                let old = to_number(&self.eval(target, env)?);
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign_to(target, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right, .. } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                self.binary(*op, &l, &r)
            }
            Expr::Logical { op, left, right, .. } => {
                let l = self.eval(left, env)?;
                match op {
                    LogicalOp::And if !truthy(&l) => Ok(l),
                    LogicalOp::Or if truthy(&l) => Ok(l),
                    _ => self.eval(right, env),
                }
            }
            Expr::Assign {
                op, target, value, ..
            } => {
                let v = match op {
                    AssignOp(None) => match target.as_ref() {
                        Expr::Ident { name, .. } => self.eval_named(value, env, name)?,
                        _ => self.eval(value, env)?,
                    },
                    AssignOp(Some(bin)) => {
                        let current = self.eval(target, env)?;
                        let rhs = self.eval(value, env)?;
                        self.binary(*bin, &current, &rhs)?
                    }
                };
                self.assign_to(target, v.clone(), env)?;
                Ok(v)
            }
            Expr::Conditional { test, cons, alt, .. } => {
                if truthy(&self.eval(test, env)?) {
                    self.eval(cons, env)
                } else {
                    self.eval(alt, env)
                }
            }
            Expr::Call { callee, args, .. } => {
                let (func, this) = match callee.as_ref() {
                    Expr::Member {
                        object, property, ..
                    } => {
                        let obj = self.eval(object, env)?;
                        (self.get_member(&obj, property)?, obj)
                    }
                    Expr::Index { object, index, .. } => {
                        let obj = self.eval(object, env)?;
                        let key = self.eval(index, env)?;
                        (self.get_member(&obj, &property_key(&key))?, obj)
                    }
                    other => (self.eval(other, env)?, Value::Undefined),
                };
                let argv = self.eval_args(args, env)?;
                if !func.is_callable() {
                    return Err(self.throw_error(
                        "TypeError",
                        &format!("{} is not a function", describe_callee(callee)),
                    ));
                }
                self.call(&func, this, &argv)
            }
            Expr::New { callee, args, .. } => {
                let ctor = self.eval(callee, env)?;
                let argv = self.eval_args(args, env)?;
                if !ctor.is_callable() {
                    return Err(self.throw_error(
                        "TypeError",
                        &format!("{} is not a constructor", describe_callee(callee)),
                    ));
                }
                self.construct(&ctor, &argv)
            }
            Expr::Member {
                object, property, ..
            } => {
                let obj = self.eval(object, env)?;
                self.get_member(&obj, property)
            }
            Expr::Index { object, index, .. } => {
                let obj = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                self.get_member(&obj, &property_key(&key))
            }
            Expr::As { expr, .. } => self.eval(expr, env),
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, Unwind> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            out.push(self.eval(a, env)?);
        }
        Ok(out)
    }

    fn lookup_ident(&mut self, name: &str, env: &Env) -> Eval {
        if let Some(v) = env.get(name) {
            return Ok(v);
        }
        if let Some(v) = self.capability(name) {
            self.global.declare(name, v.clone());
            return Ok(v);
        }
        Err(self.throw_error("ReferenceError", &format!("{} is not defined", name)))
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &Expr, env: &Env) -> Eval {
        match op {
            UnaryOp::TypeOf => {
                if let Expr::Ident { name, .. } = expr {
                    if env.get(name).is_none() && !self.capabilities.is_known(name) {
                        return Ok(Value::str("undefined"));
                    }
                }
                let v = self.eval(expr, env)?;
                Ok(Value::str(type_of(&v)))
            }
            UnaryOp::Delete => match expr {
                Expr::Member {
                    object, property, ..
                } => {
                    let obj = self.eval(object, env)?;
                    Ok(Value::Bool(delete_property(&obj, property)))
                }
                Expr::Index { object, index, .. } => {
                    let obj = self.eval(object, env)?;
                    let key = self.eval(index, env)?;
                    Ok(Value::Bool(delete_property(&obj, &property_key(&key))))
                }
                _ => Ok(Value::Bool(false)),
            },
            _ => {
                let v = self.eval(expr, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!truthy(&v)),
                    UnaryOp::Neg => Value::Number(-to_number(&v)),
                    UnaryOp::Plus => Value::Number(to_number(&v)),
                    UnaryOp::BitNot => Value::Number(!to_int32(&v) as f64),
                    _ => Value::Undefined,
                })
            }
        }
    }

    pub(crate) fn binary(&mut self, op: BinaryOp, l: &Value, r: &Value) -> Eval {
        let num = |f: fn(f64, f64) -> f64| Value::Number(f(to_number(l), to_number(r)));
        let int = |f: fn(i32, i32) -> i32| Value::Number(f(to_int32(l), to_int32(r)) as f64);
        Ok(match op {
            BinaryOp::Add => {
                let lp = to_primitive(l);
                let rp = to_primitive(r);
                if matches!(lp, Value::String(_)) || matches!(rp, Value::String(_)) {
                    Value::str(format!("{}{}", to_display_string(&lp), to_display_string(&rp)))
                } else {
                    Value::Number(to_number(&lp) + to_number(&rp))
                }
            }
            BinaryOp::Sub => num(|a, b| a - b),
            BinaryOp::Mul => num(|a, b| a * b),
            BinaryOp::Div => num(|a, b| a / b),
            BinaryOp::Mod => num(|a, b| a % b),
            BinaryOp::Pow => num(f64::powf),
            BinaryOp::Eq => Value::Bool(loose_equals(l, r)),
            BinaryOp::Ne => Value::Bool(!loose_equals(l, r)),
            BinaryOp::StrictEq => Value::Bool(strict_equals(l, r)),
            BinaryOp::StrictNe => Value::Bool(!strict_equals(l, r)),
            BinaryOp::Lt => Value::Bool(compare(l, r, |o| o == std::cmp::Ordering::Less)),
            BinaryOp::Gt => Value::Bool(compare(l, r, |o| o == std::cmp::Ordering::Greater)),
            BinaryOp::Le => Value::Bool(compare(l, r, |o| o != std::cmp::Ordering::Greater)),
            BinaryOp::Ge => Value::Bool(compare(l, r, |o| o != std::cmp::Ordering::Less)),
            BinaryOp::BitAnd => int(|a, b| a & b),
            BinaryOp::BitOr => int(|a, b| a | b),
            BinaryOp::BitXor => int(|a, b| a ^ b),
            BinaryOp::Shl => int(|a, b| a.wrapping_shl(b as u32 & 31)),
            BinaryOp::Shr => int(|a, b| a.wrapping_shr(b as u32 & 31)),
            BinaryOp::UShr => {
                let a = to_int32(l) as u32;
                let b = to_int32(r) as u32 & 31;
                Value::Number((a >> b) as f64)
            }
            BinaryOp::In => {
                let Value::Object(o) = r else {
                    return Err(self.throw_error("TypeError", "Cannot use 'in' operator on a non-object"));
                };
                Value::Bool(lookup_property(o, &property_key(l)).is_some())
            }
            BinaryOp::InstanceOf => {
                if !r.is_callable() {
                    return Err(self.throw_error(
                        "TypeError",
                        "Right-hand side of 'instanceof' is not callable",
                    ));
                }
                let proto = self.get_member(r, "prototype")?;
                Value::Bool(instance_of(l, &proto))
            }
        })
    }

    fn assign_to(&mut self, target: &Expr, v: Value, env: &Env) -> Result<(), Unwind> {
        match target {
            Expr::Ident { name, .. } => {
                self.assign_name(name, v, env);
                Ok(())
            }
            Expr::Member {
                object, property, ..
            } => {
                let obj = self.eval(object, env)?;
                self.put(&obj, property, v)
            }
            Expr::Index { object, index, .. } => {
                let obj = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                self.put(&obj, &property_key(&key), v)
            }
            _ => Err(self.throw_error("ReferenceError", "Invalid left-hand side in assignment")),
        }
    }

    // ---- プロパティ ----

    pub fn get_member(&mut self, v: &Value, key: &str) -> Eval {
        match v {
            Value::Undefined | Value::Null => Err(self.throw_error(
                "TypeError",
                &format!(
                    "Cannot read properties of {} (reading '{}')",
                    to_display_string(v),
                    key
                ),
            )),
            Value::Object(o) => Ok(lookup_property(o, key).unwrap_or(Value::Undefined)),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map(|c| Value::str(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                Ok(lookup_property(&self.realm.string_proto, key).unwrap_or(Value::Undefined))
            }
            Value::Number(_) => {
                Ok(lookup_property(&self.realm.number_proto, key).unwrap_or(Value::Undefined))
            }
            Value::Bool(_) => {
                Ok(lookup_property(&self.realm.boolean_proto, key).unwrap_or(Value::Undefined))
            }
        }
    }

    pub fn put(&mut self, target: &Value, key: &str, v: Value) -> Result<(), Unwind> {
        let o = match target {
            Value::Object(o) => o,
            Value::Undefined | Value::Null => {
                return Err(self.throw_error(
                    "TypeError",
                    &format!(
                        "Cannot set properties of {} (setting '{}')",
                        to_display_string(target),
                        key
                    ),
                ))
            }
            _ => return Ok(()),
        };
        let mut borrowed = o.borrow_mut();
        if let ObjKind::Array(items) = &mut borrowed.kind {
            if let Some(i) = array_index(key) {
                if i >= items.len() {
                    items.resize(i + 1, Value::Undefined);
                }
                items[i] = v;
                return Ok(());
            }
            if key == "length" {
                let len = to_number(&v);
                if len >= 0.0 && len.fract() == 0.0 {
                    items.resize(len as usize, Value::Undefined);
                    return Ok(());
                }
                return Err(self.throw_error("RangeError", "Invalid array length"));
            }
        }
        borrowed.props.set(key, v);
        Ok(())
    }

    // ---- 呼び出し ----

    pub fn call(&mut self, func: &Value, this: Value, args: &[Value]) -> Eval {
        let callable = match func {
            Value::Object(o) => match &o.borrow().kind {
                ObjKind::Function(c) => c.clone(),
                _ => return Err(self.throw_error("TypeError", "value is not a function")),
            },
            _ => return Err(self.throw_error("TypeError", "value is not a function")),
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.throw_error("RangeError", "Maximum call stack size exceeded"));
        }
        self.depth += 1;
        let result = match callable {
            Callable::Native { f, .. } => f(self, this, args),
            Callable::Closure(c) => self.call_closure(&c, this, args),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(&mut self, c: &Closure, this: Value, args: &[Value]) -> Eval {
        let env = c.env.child();
        let func = &c.func;
        if !func.is_arrow {
            env.declare("this", this);
            let arguments = self.new_array(args.to_vec());
            env.declare("arguments", arguments);
        }
        for (i, p) in func.params.iter().enumerate() {
            let v = if p.rest {
                self.new_array(args.get(i..).map(<[Value]>::to_vec).unwrap_or_default())
            } else {
                match (args.get(i), &p.default) {
                    (Some(v), _) if !matches!(v, Value::Undefined) => v.clone(),
                    (_, Some(d)) => self.eval(d, &env)?,
                    _ => Value::Undefined,
                }
            };
            env.declare(p.name.clone(), v);
        }
        let body = func.body.as_deref().unwrap_or(&[]);
        self.hoist(body, &env);
        match self.exec_block(body, &env)? {
            Completion::Return(v) => Ok(v),
            _ => Ok(Value::Undefined),
        }
    }

    pub fn construct(&mut self, ctor: &Value, args: &[Value]) -> Eval {
        let is_native = matches!(
            ctor,
            Value::Object(o) if matches!(o.borrow().kind, ObjKind::Function(Callable::Native { .. }))
        );
        if is_native {
            let v = self.call(ctor, Value::Undefined, args)?;
            return Ok(match v {
                Value::Object(_) => v,
                _ => self.new_object(),
            });
        }
        let proto = match self.get_member(ctor, "prototype")? {
            Value::Object(p) => p,
            _ => Rc::clone(&self.realm.object_proto),
        };
        let obj = Value::Object(JsObject::new(Some(proto), ObjKind::Ordinary));
        let result = self.call(ctor, obj.clone(), args)?;
        Ok(match result {
            Value::Object(_) => result,
            _ => obj,
        })
    }

    /// ケイパビリティ表から大域モジュールを取り出す（初回のみ生成）。
    pub(crate) fn capability(&mut self, name: &str) -> Option<Value> {
        if let Some(v) = self.capabilities.cached(name) {
            return Some(v);
        }
        let provider = self.capabilities.provider(name)?;
        log::debug!("capability '{}' initialised", name);
        let value = provider(self);
        self.capabilities.store(name, value.clone());
        Some(value)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// プロパティキーへの変換。
pub fn property_key(v: &Value) -> String {
    match v {
        Value::Number(n) => number_to_string(*n),
        other => to_display_string(other),
    }
}

fn to_primitive(v: &Value) -> Value {
    match v {
        Value::Object(_) => Value::str(to_display_string(v)),
        other => other.clone(),
    }
}

fn compare(l: &Value, r: &Value, pred: fn(std::cmp::Ordering) -> bool) -> bool {
    let lp = to_primitive(l);
    let rp = to_primitive(r);
    if let (Value::String(a), Value::String(b)) = (&lp, &rp) {
        return pred(a.cmp(b));
    }
    match to_number(&lp).partial_cmp(&to_number(&rp)) {
        Some(o) => pred(o),
        None => false,
    }
}

fn instance_of(v: &Value, proto: &Value) -> bool {
    let (Value::Object(o), Value::Object(target)) = (v, proto) else {
        return false;
    };
    let mut current = o.borrow().proto.clone();
    while let Some(p) = current {
        if Rc::ptr_eq(&p, target) {
            return true;
        }
        current = p.borrow().proto.clone();
    }
    false
}

fn delete_property(v: &Value, key: &str) -> bool {
    match v {
        Value::Object(o) => {
            o.borrow_mut().props.remove(key);
            true
        }
        _ => true,
    }
}

fn describe_callee(e: &Expr) -> String {
    match e {
        Expr::Ident { name, .. } => name.clone(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{}", describe_callee(object), property),
        Expr::This { .. } => "this".into(),
        _ => "expression".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::inspect;

    fn run(src: &str) -> Value {
        let mut interp = Interpreter::new();
        interp.run(src).unwrap()
    }

    #[test]
    /// 最後のトップレベル式文の値が結果になる。
    fn completion_value() {
        assert_eq!(inspect(&run("1 + 1;")), "2");
        assert_eq!(inspect(&run("var x = 3; x * 2;")), "6");
        assert_eq!(inspect(&run("function f() {}")), "undefined");
    }

    #[test]
    /// 関数宣言と var は巻き上げられる。
    fn hoisting() {
        assert_eq!(inspect(&run("var y = g(); function g() { return 5; } y;")), "5");
        assert_eq!(inspect(&run("typeof z; var z = 1;")), "'undefined'");
    }

    #[test]
    /// クロージャとプロトタイプ連鎖。
    fn closures_and_prototypes() {
        let src = "function C(x) { this.x = x; }\n\
                   C.prototype.get = function () { return this.x; };\n\
                   var mk = function (n) { return function () { return n + 1; }; };\n\
                   new C(4).get() + mk(1)();";
        assert_eq!(inspect(&run(src)), "6");
        assert_eq!(inspect(&run("function D() {} new D() instanceof D;")), "true");
    }

    #[test]
    /// 例外は catch で捕捉でき、finally は必ず実行される。
    fn exceptions() {
        let src = "var log = [];\n\
                   try { throw new Error('boom'); } catch (e) { log.push(e.message); } finally { log.push('f'); }\n\
                   log.join(',');";
        assert_eq!(inspect(&run(src)), "'boom,f'");
        let mut interp = Interpreter::new();
        let err = interp.run("null.x;").unwrap_err();
        assert!(err.to_string().starts_with("TypeError: Cannot read properties of null"));
    }

    #[test]
    /// 例外で中断しても先行する束縛は残る。
    fn throw_keeps_bindings() {
        let mut interp = Interpreter::new();
        assert!(interp.run("var kept = 1; throw 'x'; var later = 2;").is_err());
        assert_eq!(inspect(&interp.run("kept;").unwrap()), "1");
        assert_eq!(inspect(&interp.run("later;").unwrap()), "undefined");
    }

    #[test]
    /// switch の fall-through と break。
    fn switch_fallthrough() {
        let src = "var out = '';\n\
                   switch (2) { case 1: out += 'a'; case 2: out += 'b'; case 3: out += 'c'; break; default: out += 'd'; }\n\
                   out;";
        assert_eq!(inspect(&run(src)), "'bc'");
    }

    #[test]
    /// 深い再帰は RangeError になる。
    fn call_depth_limit() {
        let mut interp = Interpreter::new();
        let err = interp.run("function r() { return r(); } r();").unwrap_err();
        assert!(err.to_string().contains("Maximum call stack size exceeded"));
    }
}
