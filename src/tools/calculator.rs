//! 计算器：受限算术表达式求值
//!
//! 只接受数字字面量、`+ - * / % ** //`、一元正负号与括号；标识符、函数调用、属性访问、下标、
//! 字符串等一律在词法阶段拒绝，不会被求值。整数与浮点语义：`/` 恒为浮点，`//` 与 `%` 向下取整，
//! 整数溢出报错而不是回绕。

use serde::Serialize;
use serde_json::Value;

const MAX_DEPTH: usize = 64;
const MAX_EXPR_CHARS: usize = 512;

/// 计算结果：`{ok: true, result}` 或 `{ok: false, error}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CalcReport {
    fn success(n: Num) -> Self {
        Self {
            ok: true,
            result: Some(n.to_json()),
            error: None,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn to_json(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
    Num(Num),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

fn lex(src: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().filter(|&&c| c != '_').collect();
                toks.push(Tok::Num(parse_number(&text)?));
                if i < chars.len() && (chars[i].is_alphabetic() || chars[i] == '_') {
                    return Err(format!("invalid number literal near '{}'", chars[i]));
                }
            }
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                toks.push(Tok::DoubleStar);
                i += 2;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                toks.push(Tok::DoubleSlash);
                i += 2;
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                toks.push(Tok::Percent);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                return Err(format!("disallowed expression: name '{}'", name));
            }
            other => return Err(format!("disallowed expression: unexpected '{}'", other)),
        }
    }
    Ok(toks)
}

fn parse_number(text: &str) -> Result<Num, String> {
    let is_float = text.contains('.') || text.contains('e') || text.contains('E');
    if is_float {
        text.parse::<f64>()
            .map(Num::Float)
            .map_err(|_| format!("invalid number literal '{}'", text))
    } else {
        text.parse::<i64>()
            .map(Num::Int)
            .map_err(|_| format!("integer literal too large '{}'", text))
    }
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Tok> {
        self.toks.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        Ok(())
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Num, String> {
        let mut acc = self.term()?;
        while let Some(op @ (Tok::Plus | Tok::Minus)) = self.peek() {
            self.bump();
            let rhs = self.term()?;
            acc = binary(op, acc, rhs)?;
        }
        Ok(acc)
    }

    // term := unary (('*' | '/' | '//' | '%') unary)*
    fn term(&mut self) -> Result<Num, String> {
        let mut acc = self.unary()?;
        while let Some(op @ (Tok::Star | Tok::Slash | Tok::DoubleSlash | Tok::Percent)) = self.peek() {
            self.bump();
            let rhs = self.unary()?;
            acc = binary(op, acc, rhs)?;
        }
        Ok(acc)
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Result<Num, String> {
        match self.peek() {
            Some(Tok::Plus) => {
                self.bump();
                self.enter()?;
                let v = self.unary();
                self.depth -= 1;
                v
            }
            Some(Tok::Minus) => {
                self.bump();
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                match v {
                    Num::Int(i) => i.checked_neg().map(Num::Int).ok_or_else(overflow),
                    Num::Float(f) => Ok(Num::Float(-f)),
                }
            }
            _ => self.power(),
        }
    }

    // power := atom ['**' unary]，右结合
    fn power(&mut self) -> Result<Num, String> {
        let base = self.atom()?;
        if self.peek() == Some(Tok::DoubleStar) {
            self.bump();
            self.enter()?;
            let exp = self.unary()?;
            self.depth -= 1;
            return pow(base, exp);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Num, String> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::LParen) => {
                self.enter()?;
                let v = self.expr()?;
                self.depth -= 1;
                match self.bump() {
                    Some(Tok::RParen) => Ok(v),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(t) => Err(format!("unexpected token {:?}", t)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn overflow() -> String {
    "integer overflow".to_string()
}

fn finite(f: f64) -> Result<Num, String> {
    if f.is_finite() {
        Ok(Num::Float(f))
    } else if f.is_nan() {
        Err("math domain error".to_string())
    } else {
        Err("numerical result out of range".to_string())
    }
}

fn floor_div_int(a: i64, b: i64) -> Result<i64, String> {
    if b == 0 {
        return Err("integer division or modulo by zero".to_string());
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn mod_int(a: i64, b: i64) -> Result<i64, String> {
    if b == 0 {
        return Err("integer division or modulo by zero".to_string());
    }
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn mod_float(a: f64, b: f64) -> Result<f64, String> {
    if b == 0.0 {
        return Err("float modulo".to_string());
    }
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn binary(op: Tok, lhs: Num, rhs: Num) -> Result<Num, String> {
    use Num::{Float, Int};
    match (op, lhs, rhs) {
        (Tok::Plus, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(overflow),
        (Tok::Minus, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or_else(overflow),
        (Tok::Star, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or_else(overflow),
        (Tok::DoubleSlash, Int(a), Int(b)) => floor_div_int(a, b).map(Int),
        (Tok::Percent, Int(a), Int(b)) => mod_int(a, b).map(Int),
        (Tok::Slash, a, b) => {
            if b.as_f64() == 0.0 {
                return Err("division by zero".to_string());
            }
            finite(a.as_f64() / b.as_f64())
        }
        (op, a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            match op {
                Tok::Plus => finite(a + b),
                Tok::Minus => finite(a - b),
                Tok::Star => finite(a * b),
                Tok::DoubleSlash => {
                    if b == 0.0 {
                        return Err("float floor division by zero".to_string());
                    }
                    finite((a / b).floor())
                }
                Tok::Percent => mod_float(a, b).and_then(finite),
                other => Err(format!("unsupported operator {:?}", other)),
            }
        }
    }
}

fn pow(base: Num, exp: Num) -> Result<Num, String> {
    match (base, exp) {
        (Num::Int(b), Num::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| overflow())?;
            b.checked_pow(e).map(Num::Int).ok_or_else(overflow)
        }
        (b, e) => {
            let (b, e) = (b.as_f64(), e.as_f64());
            if b == 0.0 && e < 0.0 {
                return Err("0.0 cannot be raised to a negative power".to_string());
            }
            if b < 0.0 && e.fract() != 0.0 {
                return Err("complex result not supported".to_string());
            }
            finite(b.powf(e))
        }
    }
}

/// 计算表达式；任何非法输入都返回 ok=false 而不是 panic
pub fn evaluate(expression: &str) -> CalcReport {
    let expression = expression.trim();
    if expression.is_empty() {
        return CalcReport::failure("empty expression");
    }
    if expression.chars().count() > MAX_EXPR_CHARS {
        return CalcReport::failure("expression too long");
    }
    let toks = match lex(expression) {
        Ok(t) => t,
        Err(e) => return CalcReport::failure(e),
    };
    let mut parser = Parser {
        toks,
        pos: 0,
        depth: 0,
    };
    let result = parser.expr().and_then(|v| {
        if parser.pos < parser.toks.len() {
            Err(format!("unexpected trailing token {:?}", parser.toks[parser.pos]))
        } else {
            Ok(v)
        }
    });
    match result {
        Ok(v) => CalcReport::success(v),
        Err(e) => CalcReport::failure(e),
    }
}
