//! Query expressions.
//!
//! An expression is either a bare term (`"exists"`) or a list whose first
//! element names the operator (`["suffix", "rs"]`). See the watchman
//! documentation on expressions for the meaning of each operator.
//!
//! ```
//! use watchman::expr::{self, CaseSensitivity::*, FileType, Scope};
//!
//! let e = expr::all_of(vec![
//!     expr::type_(FileType::Regular),
//!     expr::any_of(vec![expr::suffix("rs"), expr::suffix("toml")]),
//!     expr::not(expr::match_(Insensitive, Scope::Wholename, "target/**")),
//! ]);
//! assert_eq!(
//!     serde_json::to_value(&e).unwrap(),
//!     serde_json::json!([
//!         "allof",
//!         ["type", "f"],
//!         ["anyof", ["suffix", "rs"], ["suffix", "toml"]],
//!         ["not", ["imatch", "target/**", "wholename"]]
//!     ])
//! );
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::ser::{Serialize, SerializeSeq, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Term(String),
    Int(i64),
    List(Vec<Expr>),
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Expr::Term(s) => serializer.serialize_str(s),
            Expr::Int(i) => serializer.serialize_i64(*i),
            Expr::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Term(s.to_string())
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Term(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

/// Which part of the path a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Basename,
    Wholename,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Scope::Basename => "basename",
            Scope::Wholename => "wholename",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    BlockSpecial,
    CharacterSpecial,
    Directory,
    Regular,
    NamedPipe,
    SymbolicLink,
    Socket,
    SolarisDoor,
}

impl FileType {
    fn as_str(self) -> &'static str {
        match self {
            FileType::BlockSpecial => "b",
            FileType::CharacterSpecial => "c",
            FileType::Directory => "d",
            FileType::Regular => "f",
            FileType::NamedPipe => "p",
            FileType::SymbolicLink => "l",
            FileType::Socket => "s",
            FileType::SolarisDoor => "D",
        }
    }
}

/// The timestamp a `since` expression compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Modified,
    Created,
}

/// Comparison operator for `size` and `dirname` depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Relation {
    fn as_str(self) -> &'static str {
        match self {
            Relation::Eq => "eq",
            Relation::Ne => "ne",
            Relation::Gt => "gt",
            Relation::Ge => "ge",
            Relation::Lt => "lt",
            Relation::Le => "le",
        }
    }
}

fn term(s: &str) -> Expr {
    Expr::Term(s.to_string())
}

fn case_name(name: &str, case: CaseSensitivity) -> Expr {
    match case {
        CaseSensitivity::Sensitive => term(name),
        CaseSensitivity::Insensitive => Expr::Term(format!("i{}", name)),
    }
}

fn op(name: &str, mut args: Vec<Expr>) -> Expr {
    args.insert(0, term(name));
    Expr::List(args)
}

pub fn all_of(exprs: Vec<Expr>) -> Expr {
    op("allof", exprs)
}

pub fn any_of(exprs: Vec<Expr>) -> Expr {
    op("anyof", exprs)
}

pub fn not(expr: Expr) -> Expr {
    op("not", vec![expr])
}

pub fn true_() -> Expr {
    term("true")
}

pub fn false_() -> Expr {
    term("false")
}

pub fn empty() -> Expr {
    term("empty")
}

pub fn exists() -> Expr {
    term("exists")
}

/// Files below `dir`, optionally limited by their depth under it.
pub fn dirname(case: CaseSensitivity, dir: &str, depth: Option<(Relation, i64)>) -> Expr {
    let mut args = vec![term(dir)];
    if let Some((rel, n)) = depth {
        args.push(Expr::List(vec![term("depth"), term(rel.as_str()), Expr::Int(n)]));
    }
    let name = match case {
        CaseSensitivity::Sensitive => "dirname",
        CaseSensitivity::Insensitive => "idirname",
    };
    op(name, args)
}

pub fn match_(case: CaseSensitivity, scope: Scope, pattern: &str) -> Expr {
    Expr::List(vec![
        case_name("match", case),
        term(pattern),
        term(scope.as_str()),
    ])
}

pub fn name<I, S>(case: CaseSensitivity, scope: Scope, names: I) -> Expr
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names = names.into_iter().map(|n| Expr::Term(n.into())).collect();
    Expr::List(vec![
        case_name("name", case),
        Expr::List(names),
        term(scope.as_str()),
    ])
}

pub fn pcre(case: CaseSensitivity, scope: Scope, pattern: &str) -> Expr {
    Expr::List(vec![
        case_name("pcre", case),
        term(pattern),
        term(scope.as_str()),
    ])
}

pub fn since_clock(clock: &str) -> Expr {
    op("since", vec![term(clock), term("oclock")])
}

pub fn since_time(t: SystemTime, field: TimeField) -> Expr {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let field = match field {
        TimeField::Modified => "mtime",
        TimeField::Created => "ctime",
    };
    op("since", vec![Expr::Int(secs), term(field)])
}

pub fn size(rel: Relation, bytes: i64) -> Expr {
    op("size", vec![term(rel.as_str()), Expr::Int(bytes)])
}

pub fn suffix(suffix: &str) -> Expr {
    op("suffix", vec![term(suffix)])
}

pub fn type_(file_type: FileType) -> Expr {
    op("type", vec![term(file_type.as_str())])
}
