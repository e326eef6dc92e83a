// パス: src/runtime.rs
// 役割: 実行時の値表現・環境フレーム・型変換と値の表示を提供する
// 意図: 評価器・組み込み関数・ケイパビリティから共有される基盤ロジックを分離する
// 関連ファイル: src/evaluator.rs, src/primitives.rs, src/capabilities.rs
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Function;
use crate::errors::ParseError;

thread_local! {
    static OUTPUT_CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

// ---- 環境 ----

#[derive(Clone)]
pub struct Env {
    inner: Rc<EnvFrame>,
}

struct EnvFrame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<EnvFrame>>,
}

impl EnvFrame {
    fn root() -> Self {
        Self {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }
    }

    fn child(parent: Rc<EnvFrame>) -> Self {
        Self {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent),
        }
    }
}

fn lookup_binding(frame: &Rc<EnvFrame>, key: &str) -> Option<Value> {
    if let Some(value) = frame.bindings.borrow().get(key) {
        return Some(value.clone());
    }
    frame
        .parent
        .as_ref()
        .and_then(|parent| lookup_binding(parent, key))
}

fn assign_binding(frame: &Rc<EnvFrame>, key: &str, val: Value) -> Result<(), Value> {
    {
        let mut bindings = frame.bindings.borrow_mut();
        if let Some(slot) = bindings.get_mut(key) {
            *slot = val;
            return Ok(());
        }
    }
    match &frame.parent {
        Some(parent) => assign_binding(parent, key, val),
        None => Err(val),
    }
}

impl Env {
    /// 空の大域環境を生成する。
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EnvFrame::root()),
        }
    }

    /// 関数呼び出し用の子環境を返す。
    pub fn child(&self) -> Self {
        Self {
            inner: Rc::new(EnvFrame::child(Rc::clone(&self.inner))),
        }
    }

    /// 現在のフレームに束縛を追加または更新する。
    pub fn declare(&self, key: impl Into<String>, val: Value) {
        self.inner.bindings.borrow_mut().insert(key.into(), val);
    }

    /// 現在のフレームに未束縛なら `undefined` で予約する（`var` の巻き上げ）。
    pub fn reserve(&self, key: &str) {
        self.inner
            .bindings
            .borrow_mut()
            .entry(key.to_string())
            .or_insert(Value::Undefined);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lookup_binding(&self.inner, key)
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.inner.bindings.borrow().contains_key(key)
    }

    /// 最も内側の既存束縛へ代入する。見つからなければ値を返して失敗する。
    pub fn assign(&self, key: &str, val: Value) -> Result<(), Value> {
        assign_binding(&self.inner, key, val)
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Env({} bindings)", self.inner.bindings.borrow().len())
    }
}

// ---- 値 ----

pub type ObjRef = Rc<RefCell<JsObject>>;

/// 組み込み関数。`this` と引数を受け取る。
pub type NativeFn = fn(&mut crate::evaluator::Interpreter, Value, &[Value]) -> Result<Value, Unwind>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjRef),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Object(o) if matches!(o.borrow().kind, ObjKind::Function(_)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&inspect(self))
    }
}

/// 挿入順を保つプロパティ表。
#[derive(Clone, Default)]
pub struct PropMap {
    keys: Vec<String>,
    values: HashMap<String, Value>,
}

impl PropMap {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, val: Value) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.values.insert(key, val);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if self.values.remove(key).is_some() {
            self.keys.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.keys
            .iter()
            .filter_map(move |k| self.values.get(k).map(|v| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub struct Closure {
    pub func: Rc<Function>,
    pub env: Env,
    pub name: String,
}

#[derive(Clone)]
pub enum Callable {
    Closure(Rc<Closure>),
    Native { name: &'static str, f: NativeFn },
}

pub enum ObjKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Callable),
    /// `Error` 系コンストラクタで生成されたオブジェクト。
    Error,
}

pub struct JsObject {
    pub props: PropMap,
    pub proto: Option<ObjRef>,
    pub kind: ObjKind,
}

impl JsObject {
    pub fn new(proto: Option<ObjRef>, kind: ObjKind) -> ObjRef {
        Rc::new(RefCell::new(JsObject {
            props: PropMap::default(),
            proto,
            kind,
        }))
    }
}

/// プロトタイプ連鎖を辿ってプロパティを探す（ゲッター無し）。
pub fn lookup_property(obj: &ObjRef, key: &str) -> Option<Value> {
    let mut current = Some(Rc::clone(obj));
    while let Some(o) = current {
        let borrowed = o.borrow();
        if let Some(v) = borrowed.props.get(key) {
            return Some(v.clone());
        }
        if let ObjKind::Array(items) = &borrowed.kind {
            if key == "length" {
                return Some(Value::Number(items.len() as f64));
            }
            if let Some(i) = array_index(key) {
                if let Some(v) = items.get(i) {
                    return Some(v.clone());
                }
            }
        }
        current = borrowed.proto.clone();
    }
    None
}

/// 配列の添字として有効な文字列なら数値へ変換する。
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse::<usize>().ok()
}

// ---- 制御の脱出 ----

/// 評価の途中脱出（例外・`process.exit`）。
#[derive(Debug, Clone)]
pub enum Unwind {
    Throw(Value),
    Exit(i32),
}

/// `run` の失敗。
#[derive(Debug, Clone)]
pub enum RuntimeFailure {
    /// 利用者コードが投げた例外。
    Throw(Value),
    /// 出力スクリプトを解析できなかった（内部エラー）。
    Syntax(ParseError),
    Exit(i32),
}

impl From<Unwind> for RuntimeFailure {
    fn from(u: Unwind) -> Self {
        match u {
            Unwind::Throw(v) => RuntimeFailure::Throw(v),
            Unwind::Exit(code) => RuntimeFailure::Exit(code),
        }
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFailure::Throw(v) => f.write_str(&describe_thrown(v)),
            RuntimeFailure::Syntax(e) => write!(f, "{}", e),
            RuntimeFailure::Exit(code) => write!(f, "process exited with code {}", code),
        }
    }
}

// ---- 型変換 ----

/// 数値を文字列へ変換する（`Number.prototype.toString` と同じ表記）。
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n == 0.0 {
        return "0".into();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    format!("{}", n)
}

pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => *n,
        Value::String(s) => string_to_number(s),
        Value::Object(o) => match &o.borrow().kind {
            ObjKind::Array(items) if items.is_empty() => 0.0,
            ObjKind::Array(items) if items.len() == 1 => to_number(&items[0]),
            _ => f64::NAN,
        },
    }
}

pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    match t {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) => {
            t.parse::<f64>().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// ToInt32 相当（ビット演算用）。
pub fn to_int32(v: &Value) -> i32 {
    let n = to_number(v);
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 & 0xffff_ffff) as u32 as i32
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => !(n.is_nan() || *n == 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Object(_) => true,
    }
}

pub fn type_of(v: &Value) -> &'static str {
    match v {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Object(_) if v.is_callable() => "function",
        Value::Object(_) => "object",
    }
}

/// 文字列化（`String(v)` 相当。オブジェクトは組み込みの規則で表す）。
pub fn to_display_string(v: &Value) -> String {
    match v {
        Value::Undefined => "undefined".into(),
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.to_string(),
        Value::Object(o) => {
            if matches!(o.borrow().kind, ObjKind::Error) {
                return error_headline(o);
            }
            let borrowed = o.borrow();
            match &borrowed.kind {
                ObjKind::Array(items) => items
                    .iter()
                    .map(|it| if it.is_nullish() { String::new() } else { to_display_string(it) })
                    .collect::<Vec<_>>()
                    .join(","),
                ObjKind::Function(_) => format!("function {}() {{ [code] }}", function_name(&borrowed)),
                ObjKind::Error | ObjKind::Ordinary => "[object Object]".into(),
            }
        }
    }
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Object(_), Value::Object(_)) => strict_equals(a, b),
        (Value::Object(_), _) => loose_equals(&Value::str(to_display_string(a)), b),
        (_, Value::Object(_)) => loose_equals(a, &Value::str(to_display_string(b))),
        (Value::String(x), Value::String(y)) => x == y,
        _ => to_number(a) == to_number(b),
    }
}

// ---- 表示 ----

fn function_name(obj: &JsObject) -> String {
    match &obj.kind {
        ObjKind::Function(Callable::Closure(c)) => c.name.clone(),
        ObjKind::Function(Callable::Native { name, .. }) => name.to_string(),
        _ => String::new(),
    }
}

/// `name: message` 形式の 1 行。
pub fn error_headline(o: &ObjRef) -> String {
    let name = lookup_property(o, "name")
        .map(|v| to_display_string(&v))
        .unwrap_or_else(|| "Error".into());
    let message = lookup_property(o, "message")
        .map(|v| to_display_string(&v))
        .unwrap_or_default();
    if message.is_empty() {
        name
    } else {
        format!("{}: {}", name, message)
    }
}

/// 投げられた値の説明。エラーなら `name: message`、それ以外は表示形式。
pub fn describe_thrown(v: &Value) -> String {
    match v {
        Value::Object(o) if is_error_like(o) => error_headline(o),
        other => format!("Uncaught {}", inspect(other)),
    }
}

fn is_error_like(o: &ObjRef) -> bool {
    let mut current = Some(Rc::clone(o));
    while let Some(obj) = current {
        let borrowed = obj.borrow();
        if matches!(borrowed.kind, ObjKind::Error) {
            return true;
        }
        current = borrowed.proto.clone();
    }
    false
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n");
    format!("'{}'", escaped)
}

/// 対話環境向けの値表示（文字列は引用符付き）。
pub fn inspect(v: &Value) -> String {
    let mut seen = Vec::new();
    inspect_at(v, 0, &mut seen)
}

const INSPECT_DEPTH: usize = 2;

fn inspect_at(v: &Value, depth: usize, seen: &mut Vec<*const RefCell<JsObject>>) -> String {
    let o = match v {
        Value::String(s) => return quote(s),
        Value::Object(o) => o,
        other => return to_display_string(other),
    };
    let ptr = Rc::as_ptr(o);
    if seen.contains(&ptr) {
        return "[Circular]".into();
    }
    if matches!(o.borrow().kind, ObjKind::Error) {
        return format!("[{}]", error_headline(o));
    }
    let borrowed = o.borrow();
    match &borrowed.kind {
        ObjKind::Function(_) => {
            let name = function_name(&borrowed);
            if name.is_empty() {
                "[Function (anonymous)]".into()
            } else {
                format!("[Function: {}]", name)
            }
        }
        ObjKind::Array(items) => {
            if items.is_empty() {
                return "[]".into();
            }
            if depth > INSPECT_DEPTH {
                return "[Array]".into();
            }
            seen.push(ptr);
            let parts: Vec<String> = items.iter().map(|it| inspect_at(it, depth + 1, seen)).collect();
            seen.pop();
            format!("[ {} ]", parts.join(", "))
        }
        ObjKind::Ordinary | ObjKind::Error => {
            if borrowed.props.is_empty() {
                return "{}".into();
            }
            if depth > INSPECT_DEPTH {
                return "[Object]".into();
            }
            seen.push(ptr);
            let parts: Vec<String> = borrowed
                .props
                .entries()
                .map(|(k, val)| {
                    let key = if is_identifier(k) { k.clone() } else { quote(k) };
                    format!("{}: {}", key, inspect_at(val, depth + 1, seen))
                })
                .collect();
            seen.pop();
            format!("{{ {} }}", parts.join(", "))
        }
    }
}

// ---- 出力 ----

fn intercept(text: &str) -> bool {
    OUTPUT_CAPTURE.with(|slot| {
        let mut guard = slot.borrow_mut();
        if let Some(buffer) = guard.as_mut() {
            buffer.push(text.to_string());
            true
        } else {
            false
        }
    })
}

/// 標準出力へ 1 行書く。テスト中は捕捉バッファへ積む。
pub fn emit_line(text: &str) {
    if !intercept(text) {
        println!("{}", text);
    }
}

/// 改行を付けずに標準出力へ書く（`process.stdout.write`）。
pub fn emit_raw(text: &str) {
    if intercept(text.trim_end_matches('\n')) {
        return;
    }
    let mut out = std::io::stdout();
    let _ = std::io::Write::write_all(&mut out, text.as_bytes());
    let _ = std::io::Write::flush(&mut out);
}

/// 標準エラーへ 1 行書く（捕捉中は標準出力と同じバッファへ積む）。
pub fn emit_error_line(text: &str) {
    if !intercept(text) {
        eprintln!("{}", text);
    }
}

/// `action` 実行中の `console.log` 出力を捕捉して返す。
pub fn capture_output<F, R>(action: F) -> (R, Vec<String>)
where
    F: FnOnce() -> R,
{
    let previous = OUTPUT_CAPTURE.with(|slot| slot.borrow_mut().replace(Vec::new()));
    let result = action();
    let lines = OUTPUT_CAPTURE.with(|slot| {
        let mut guard = slot.borrow_mut();
        let lines = guard.take().unwrap_or_default();
        *guard = previous;
        lines
    });
    (result, lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 子環境は親の束縛を読み、代入は既存の束縛へ届く。
    fn env_child_reads_and_assigns_parent() {
        let root = Env::new();
        root.declare("x", Value::Number(1.0));
        let child = root.child();
        assert!(matches!(child.get("x"), Some(Value::Number(n)) if n == 1.0));
        child.assign("x", Value::Number(2.0)).unwrap();
        assert!(matches!(root.get("x"), Some(Value::Number(n)) if n == 2.0));
        assert!(child.assign("missing", Value::Null).is_err());
    }

    #[test]
    /// 数値の文字列表記。
    fn number_formatting() {
        assert_eq!(number_to_string(2.0), "2");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(-f64::INFINITY), "-Infinity");
    }

    #[test]
    /// 緩い等価と厳密等価の差。
    fn equality_rules() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!strict_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::str("1"), &Value::Number(1.0)));
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    /// 配列とオブジェクトの表示形式。
    fn inspect_values() {
        let arr = JsObject::new(None, ObjKind::Array(vec![Value::Number(1.0), Value::str("a")]));
        assert_eq!(inspect(&Value::Object(arr)), "[ 1, 'a' ]");
        let obj = JsObject::new(None, ObjKind::Ordinary);
        obj.borrow_mut().props.set("a", Value::Bool(true));
        obj.borrow_mut().props.set("b-c", Value::Null);
        assert_eq!(inspect(&Value::Object(obj)), "{ a: true, 'b-c': null }");
        assert_eq!(inspect(&Value::str("x")), "'x'");
    }

    #[test]
    /// 出力捕捉は入れ子にしても外側のバッファを壊さない。
    fn capture_nests() {
        let (_, outer) = capture_output(|| {
            emit_line("a");
            let (_, inner) = capture_output(|| emit_line("b"));
            assert_eq!(inner, vec!["b".to_string()]);
            emit_line("c");
        });
        assert_eq!(outer, vec!["a".to_string(), "c".to_string()]);
    }
}
